use crate::feed::CaptureOracle;
use attend_core::{AttendanceSink, EnrollError, Enrollment, Registry};
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use zbus::interface;

pub const BUS_NAME: &str = "org.freedesktop.Attendance1";
pub const OBJECT_PATH: &str = "/org/freedesktop/Attendance1";

/// D-Bus interface for the attendance daemon.
///
/// Bus name: org.freedesktop.Attendance1
/// Object path: /org/freedesktop/Attendance1
pub struct AttendanceService {
    enrollment: Arc<Enrollment>,
    log: Arc<dyn AttendanceSink>,
    registry: Arc<Registry>,
    tolerance: f32,
    cooldown: Duration,
    started_at: DateTime<Local>,
}

impl AttendanceService {
    pub fn new(
        enrollment: Arc<Enrollment>,
        log: Arc<dyn AttendanceSink>,
        tolerance: f32,
        cooldown: Duration,
    ) -> Self {
        let registry = Arc::clone(enrollment.registry());
        Self {
            enrollment,
            log,
            registry,
            tolerance,
            cooldown,
            started_at: Local::now(),
        }
    }
}

/// Run store or log I/O on the blocking pool so SQLite never stalls the
/// executor that also drives the frame loop.
async fn blocking<T, F>(f: F) -> zbus::fdo::Result<T>
where
    F: FnOnce() -> zbus::fdo::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| zbus::fdo::Error::Failed(format!("worker task failed: {e}")))?
}

#[interface(name = "org.freedesktop.Attendance1")]
impl AttendanceService {
    /// Enroll an identity from a capture (JSON array of face embeddings).
    async fn enroll(&self, key: &str, name: &str, capture: &str) -> zbus::fdo::Result<String> {
        tracing::info!(key, name, "enroll requested");
        let enrollment = Arc::clone(&self.enrollment);
        let (key, name, capture) = (key.to_string(), name.to_string(), capture.to_string());
        blocking(move || {
            match enrollment.enroll(&CaptureOracle, &key, &name, capture.as_str(), Local::now()) {
                Ok(identity) => Ok(serde_json::json!({
                    "key": identity.key,
                    "name": identity.name,
                    "created_at": identity.created_at.to_rfc3339(),
                })
                .to_string()),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "enroll rejected");
                    Err(match e {
                        EnrollError::Store(_) => zbus::fdo::Error::Failed(e.to_string()),
                        _ => zbus::fdo::Error::InvalidArgs(e.to_string()),
                    })
                }
            }
        })
        .await
    }

    /// Remove an identity. Returns whether it existed.
    async fn remove(&self, key: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(key, "remove requested");
        let enrollment = Arc::clone(&self.enrollment);
        let key = key.to_string();
        blocking(move || {
            enrollment
                .remove(&key)
                .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
        })
        .await
    }

    /// Enrolled identities as JSON (without embeddings).
    async fn list_identities(&self) -> zbus::fdo::Result<String> {
        let store = Arc::clone(self.enrollment.store());
        let identities = blocking(move || {
            store
                .list_all()
                .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
        })
        .await?;
        let list: Vec<_> = identities
            .iter()
            .map(|i| {
                serde_json::json!({
                    "key": i.key,
                    "name": i.name,
                    "created_at": i.created_at.to_rfc3339(),
                })
            })
            .collect();
        Ok(serde_json::Value::from(list).to_string())
    }

    /// Today's attendance records as JSON.
    async fn today(&self) -> zbus::fdo::Result<String> {
        let log = Arc::clone(&self.log);
        let records = blocking(move || {
            log.query_by_date(Local::now().date_naive())
                .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
        })
        .await?;
        serde_json::to_string(&records).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Export the log as CSV. An empty destination picks a default file name.
    async fn export(&self, destination: &str) -> zbus::fdo::Result<String> {
        let destination = (!destination.is_empty()).then(|| PathBuf::from(destination));
        tracing::info!(destination = ?destination, "export requested");
        let log = Arc::clone(&self.log);
        let path = blocking(move || {
            log.export(destination.as_deref())
                .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
        })
        .await?;
        Ok(path.to_string_lossy().into_owned())
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let snapshot = self.registry.snapshot();
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "identities": snapshot.len(),
            "embedding_dim": snapshot.dimension(),
            "tolerance": self.tolerance,
            "cooldown_secs": self.cooldown.as_secs(),
            "started_at": self.started_at.to_rfc3339(),
        })
        .to_string())
    }
}
