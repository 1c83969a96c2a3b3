use anyhow::{Context, Result};
use attend_core::{
    Announcer, AttendanceGate, AttendanceSink, Enrollment, FrameCycle, GreetingGate,
    IdentityStore, Registry,
};
use attend_store::Database;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod announcer;
mod config;
mod dbus_interface;
mod feed;
mod journal;
mod pipeline;
mod speech;

use announcer::{CommandAnnouncer, HttpAnnouncer};
use config::{AnnouncerKind, Config};
use dbus_interface::{AttendanceService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("attendd starting");
    let config = Config::load()?;

    let db = Arc::new(Database::open(&config.db_path).context("opening database")?);
    let store: Arc<dyn IdentityStore> = db.clone();
    let log: Arc<dyn AttendanceSink> = db;

    let registry = Arc::new(Registry::new(config.embedding_dim));
    let attendance = Arc::new(AttendanceGate::new(config.cooldown));
    let greetings = Arc::new(GreetingGate::new(config.greet_unknown));
    let enrollment = Arc::new(
        Enrollment::new(store, Arc::clone(&registry))
            .with_gates(Arc::clone(&attendance), Arc::clone(&greetings)),
    );
    let report = enrollment.reload().context("loading identities")?;
    if !report.skipped.is_empty() {
        tracing::warn!(
            skipped = report.skipped.len(),
            dimension = config.embedding_dim,
            "some enrolled identities do not match the configured embedding dimension"
        );
    }

    let cycle = FrameCycle::new(
        Arc::clone(&registry),
        Arc::clone(&attendance),
        Arc::clone(&greetings),
        config.tolerance,
    );

    let speech = speech::SpeechQueue::spawn(build_announcer(&config), speech::SPEECH_QUEUE_CAPACITY);
    let journal = journal::spawn_journal(Arc::clone(&log), attendance, greetings, speech.clone())
        .context("spawning journal thread")?;

    let service = AttendanceService::new(enrollment, log, config.tolerance, config.cooldown);
    let builder = if config.system_bus {
        zbus::connection::Builder::system()?
    } else {
        zbus::connection::Builder::session()?
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("registering on D-Bus")?;
    tracing::info!(bus = BUS_NAME, system = config.system_bus, "D-Bus interface registered");

    let feed = feed::JsonLinesFeed::open(&config.feed).await?;
    let pipeline = pipeline::Pipeline::new(
        feed,
        cycle,
        config.frame_stride,
        journal,
        speech,
        config.unknown_interval,
    );

    tracing::info!("attendd ready");

    // The control interface stays up after the feed ends, until signaled.
    let mut recognition = tokio::spawn(pipeline.run());
    tokio::select! {
        result = &mut recognition => {
            match result {
                Ok(Ok(stats)) => tracing::info!(?stats, "recognition loop finished"),
                Ok(Err(e)) => tracing::error!(error = %e, "recognition loop failed"),
                Err(e) => tracing::error!(error = %e, "recognition task panicked"),
            }
            tokio::signal::ctrl_c().await?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            recognition.abort();
        }
    }
    tracing::info!("attendd shutting down");

    Ok(())
}

fn build_announcer(config: &Config) -> Arc<dyn Announcer> {
    let local = CommandAnnouncer::new(config.speech_program.clone(), config.speech_args.clone());
    match (config.announcer, &config.tts_url) {
        (AnnouncerKind::Network, Some(url)) => {
            tracing::info!(url = %url, "using network speech with local fallback");
            Arc::new(HttpAnnouncer::new(
                url.clone(),
                config.tts_lang.clone(),
                config.tts_player.clone(),
                local,
            ))
        }
        _ => {
            tracing::info!(program = %config.speech_program, "using local speech");
            Arc::new(local)
        }
    }
}
