use std::{
    collections::VecDeque,
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info};

use super::{
    aggregator::SnapshotAggregator,
    staging::{StagingArea, StagingError, snapshot_file_name},
};
use crate::data_aquisition::credentials::{CredentialValidator, Host, TransportFactory};

/// Conditions that stop a run before commit.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Staging(#[from] StagingError),
    #[error("could not serialize snapshot of {host}: {source}")]
    Serialize {
        host: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("worker stopped: {0}")]
    Worker(#[from] JoinError),
}

/// Hosts written and skipped in one run, each sorted by hostname.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub written: Vec<String>,
    pub skipped: Vec<String>,
}

enum HostOutcome {
    Written(String),
    Skipped(String),
}

/// Polls a fleet and commits one snapshot file per reachable host.
pub struct HostOrchestrator {
    hosts: Vec<Host>,
    output: PathBuf,
    validator: Arc<CredentialValidator>,
    aggregator: Arc<SnapshotAggregator>,
    workers: usize,
}

impl HostOrchestrator {
    pub fn new(hosts: Vec<Host>, output: impl Into<PathBuf>, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            hosts,
            output: output.into(),
            validator: Arc::new(CredentialValidator::new(factory)),
            aggregator: Arc::new(SnapshotAggregator::default()),
            workers: 1,
        }
    }

    /// Number of hosts processed concurrently. Values below one mean one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Processes every host into a scratch directory, then swaps it in.
    ///
    /// On error nothing is committed: the permanent directory keeps its previous
    /// contents and the scratch directory stays on disk.
    pub async fn run(&self) -> Result<RunSummary, RunError> {
        let output = self.output.clone();
        let staging = tokio::task::spawn_blocking(move || StagingArea::create(&output)).await??;
        let scratch = staging.scratch().to_path_buf();
        info!(hosts = self.hosts.len(), workers = self.workers, scratch = %scratch.display(), "run started");

        let queue = Arc::new(Mutex::new(VecDeque::from(self.hosts.clone())));
        let mut workers = JoinSet::new();
        for _ in 0..self.workers.min(self.hosts.len()) {
            let queue = Arc::clone(&queue);
            let validator = Arc::clone(&self.validator);
            let aggregator = Arc::clone(&self.aggregator);
            let scratch = scratch.clone();
            workers.spawn(async move {
                let mut outcomes = Vec::new();
                while let Some(host) = next_host(&queue) {
                    outcomes.push(process_host(&validator, &aggregator, &scratch, host).await?);
                }
                Ok::<_, RunError>(outcomes)
            });
        }

        let mut summary = RunSummary::default();
        while let Some(joined) = workers.join_next().await {
            let outcomes = match joined? {
                Ok(outcomes) => outcomes,
                Err(e) => {
                    error!(error = %e, scratch = %scratch.display(), "run aborted before commit");
                    workers.abort_all();
                    return Err(e);
                }
            };
            for outcome in outcomes {
                match outcome {
                    HostOutcome::Written(host) => summary.written.push(host),
                    HostOutcome::Skipped(host) => summary.skipped.push(host),
                }
            }
        }
        summary.written.sort();
        summary.skipped.sort();

        tokio::task::spawn_blocking(move || staging.commit()).await??;
        info!(
            written = summary.written.len(),
            skipped = summary.skipped.len(),
            "run committed"
        );
        Ok(summary)
    }
}

fn next_host(queue: &Mutex<VecDeque<Host>>) -> Option<Host> {
    // Queued hosts stay valid if another worker panicked
    let mut queue = queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    queue.pop_front()
}

/// Validates, queries and stages one host.
async fn process_host(
    validator: &CredentialValidator,
    aggregator: &SnapshotAggregator,
    scratch: &Path,
    host: Host,
) -> Result<HostOutcome, RunError> {
    let Some(session) = validator.credentials(&host).await else {
        info!(host = %host.hostname, "no valid credentials or unreachable, skipping");
        return Ok(HostOutcome::Skipped(host.hostname));
    };

    let snapshot = aggregator.snapshot(&session).await;
    // Session ends here; the transport closes with it
    drop(session);

    let mut contents = serde_json::to_vec_pretty(&snapshot).map_err(|source| RunError::Serialize {
        host: host.hostname.clone(),
        source,
    })?;
    contents.push(b'\n');

    let path = scratch.join(snapshot_file_name(&host.hostname));
    tokio::fs::write(&path, contents)
        .await
        .map_err(|source| RunError::Write { path: path.clone(), source })?;
    debug!(host = %host.hostname, path = %path.display(), "snapshot staged");
    Ok(HostOutcome::Written(host.hostname))
}
