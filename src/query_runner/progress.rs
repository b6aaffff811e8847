//! Progress side channel for procedures called with logging.
//!
//! The server tracks long-running procedures under a job id taken from the
//! `jobId` key of the call's `config` map. While such a call runs, a
//! background task polls the progress endpoint for that job and forwards
//! what it sees to a [`ProgressObserver`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::call_parameters::CallParameters;
use crate::server_version::ServerVersion;
use crate::transport::{CypherRequest, CypherTransport};

/// Parameter holding the procedure configuration map.
pub const CONFIG_PARAM: &str = "config";

/// Configuration key the server tracks progress under.
pub const JOB_ID_KEY: &str = "jobId";

/// First server version exposing progress outside the beta namespace.
const LIST_PROGRESS_GA: ServerVersion = ServerVersion::new(2, 5, 0);

/// Receives progress of running procedures.
pub trait ProgressObserver: Send + Sync {
    /// Called with the root task of a job each time it is polled.
    fn on_progress(&self, job_id: &str, task: &str, progress: &str);

    /// Called once the procedure call returned, successfully or not.
    fn on_finished(&self, _job_id: &str) {}
}

/// Logs progress through `tracing`, skipping unchanged reports.
#[derive(Debug, Default)]
pub struct TracingProgressObserver {
    last_seen: Mutex<HashMap<String, String>>,
}

impl ProgressObserver for TracingProgressObserver {
    fn on_progress(&self, job_id: &str, task: &str, progress: &str) {
        let mut last_seen = self
            .last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if last_seen.get(job_id).map(String::as_str) == Some(progress) {
            return;
        }
        last_seen.insert(job_id.to_string(), progress.to_string());
        tracing::info!(job_id, task, progress, "Procedure progress");
    }

    fn on_finished(&self, job_id: &str) {
        self.last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(job_id);
        tracing::debug!(job_id, "Procedure finished");
    }
}

/// Returns the job id of a call, generating and inserting one if needed.
///
/// Returns `None` when the call has no `config` map to carry the id.
pub fn ensure_job_id(params: &mut CallParameters) -> Option<String> {
    let config = params.get_mut(CONFIG_PARAM)?.as_object_mut()?;

    if let Some(existing) = config.get(JOB_ID_KEY).and_then(JsonValue::as_str) {
        return Some(existing.to_string());
    }

    let job_id = ulid::Ulid::new().to_string();
    config.insert(JOB_ID_KEY.to_string(), JsonValue::String(job_id.clone()));
    Some(job_id)
}

/// The progress procedure for a server version.
pub fn progress_endpoint(version: Option<ServerVersion>) -> &'static str {
    match version {
        Some(v) if v < LIST_PROGRESS_GA => "gds.beta.listProgress",
        _ => "gds.listProgress",
    }
}

/// One job's progress polling.
pub(crate) struct ProgressPoll {
    pub transport: Arc<dyn CypherTransport>,
    pub observer: Arc<dyn ProgressObserver>,
    pub endpoint: &'static str,
    pub job_id: String,
    pub database: Option<String>,
    pub interval: Duration,
}

impl ProgressPoll {
    /// Runs `work` to completion while polling progress in the background.
    ///
    /// Polling stops as soon as `work` completes or is dropped; its output is
    /// returned unchanged.
    pub async fn around<F: Future>(self, work: F) -> F::Output {
        let guard = PollGuard {
            job_id: self.job_id.clone(),
            observer: Arc::clone(&self.observer),
            poller: tokio::spawn(self.run()),
        };

        let output = work.await;
        drop(guard);
        output
    }

    async fn run(self) {
        let statement = format!("CALL {}($job_id) YIELD taskName, progress", self.endpoint);
        let params = CallParameters::new().with("job_id", self.job_id.clone());

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let request = CypherRequest {
                statement: &statement,
                params: &params,
                database: self.database.as_deref(),
                bookmarks: None,
            };

            match self.transport.execute(request).await {
                Ok(outcome) => {
                    // The first row is the job's root task.
                    if let Some(row) = outcome.result.row(0) {
                        let task: String = row.get("taskName").unwrap_or_default();
                        let progress: String = row.get("progress").unwrap_or_default();
                        self.observer.on_progress(&self.job_id, &task, &progress);
                    }
                }
                Err(e) => {
                    tracing::debug!(job_id = %self.job_id, error = %e, "Progress poll failed");
                }
            }
        }
    }
}

/// Stops a job's poller and reports it finished when dropped.
///
/// Dropping the future of an abandoned call drops the guard with it.
struct PollGuard {
    job_id: String,
    observer: Arc<dyn ProgressObserver>,
    poller: JoinHandle<()>,
}

impl Drop for PollGuard {
    fn drop(&mut self) {
        self.poller.abort();
        self.observer.on_finished(&self.job_id);
    }
}
