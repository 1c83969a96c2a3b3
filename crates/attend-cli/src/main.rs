use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[zbus::proxy(
    interface = "org.freedesktop.Attendance1",
    default_service = "org.freedesktop.Attendance1",
    default_path = "/org/freedesktop/Attendance1"
)]
trait Attendance {
    fn enroll(&self, key: &str, name: &str, capture: &str) -> zbus::Result<String>;
    fn remove(&self, key: &str) -> zbus::Result<bool>;
    fn list_identities(&self) -> zbus::Result<String>;
    fn today(&self) -> zbus::Result<String>;
    fn export(&self, destination: &str) -> zbus::Result<String>;
    fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "attend", about = "Face attendance CLI")]
struct Cli {
    /// Talk to a daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Enroll a person from a capture file (JSON array of face embeddings)
    Enroll {
        /// Unique identity key (e.g., employee ID)
        #[arg(short, long)]
        key: String,
        /// Display name used in logs and greetings
        #[arg(short, long)]
        name: String,
        /// Capture produced by the face embedder
        #[arg(short, long)]
        capture: PathBuf,
    },
    /// Remove an enrolled person
    Remove {
        /// Identity key to remove
        key: String,
    },
    /// List enrolled people
    List,
    /// Show today's attendance
    Today,
    /// Export the attendance log as CSV
    Export {
        /// Output file (default: timestamped file next to the database)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    tracing::debug!(system = cli.system, command = ?cli.command, "connecting to attendd");
    let conn = if cli.system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("connecting to D-Bus")?;
    let proxy = AttendanceProxy::new(&conn)
        .await
        .context("attendd not reachable")?;

    match cli.command {
        Commands::Enroll { key, name, capture } => {
            let text = std::fs::read_to_string(&capture)
                .with_context(|| format!("reading capture {}", capture.display()))?;
            tracing::debug!(path = %capture.display(), bytes = text.len(), "capture read");
            proxy.enroll(&key, &name, &text).await?;
            println!("Enrolled {name} ({key})");
        }
        Commands::Remove { key } => {
            if proxy.remove(&key).await? {
                println!("Removed {key}");
            } else {
                println!("No identity with key {key}");
            }
        }
        Commands::List => {
            let list: serde_json::Value = serde_json::from_str(&proxy.list_identities().await?)?;
            let entries = list.as_array().map(Vec::as_slice).unwrap_or_default();
            if entries.is_empty() {
                println!("No identities enrolled");
            }
            for entry in entries {
                println!(
                    "{}\t{}\t{}",
                    entry["key"].as_str().unwrap_or_default(),
                    entry["name"].as_str().unwrap_or_default(),
                    entry["created_at"].as_str().unwrap_or_default(),
                );
            }
        }
        Commands::Today => {
            let records: serde_json::Value = serde_json::from_str(&proxy.today().await?)?;
            let records = records.as_array().map(Vec::as_slice).unwrap_or_default();
            println!("{} check-in(s) today", records.len());
            for r in records {
                println!(
                    "{}\t{}\t{}\t{}",
                    r["timestamp"].as_str().unwrap_or_default(),
                    r["identity_key"].as_str().unwrap_or_default(),
                    r["name"].as_str().unwrap_or_default(),
                    r["kind"].as_str().unwrap_or_default(),
                );
            }
        }
        Commands::Export { output } => {
            let destination = output
                .as_deref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            let path = proxy.export(&destination).await?;
            println!("Exported to {path}");
        }
        Commands::Status => {
            let status: serde_json::Value = serde_json::from_str(&proxy.status().await?)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}
