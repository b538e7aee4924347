//! Event source -- newline-delimited JSON deployment events.
//!
//! Each non-empty line is one delivery, handled as an independent invocation
//! on its own task. A line holding a JSON array is a batch; every element
//! is handled as its own event. At most `max_in_flight` lines are processed
//! at once.
//! When the shutdown future resolves, reading stops and in-flight events
//! run to completion so that every execution unit is cleaned up.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use deployscan_intake::{ContainerLookup, EventHandler, HandleReport};
use deployscan_scan_job::{ExecutionPlatform, SecretStore};
use deployscan_store::{BlobStore, KeyValueStore, RowStore};

/// Totals over every event read from the source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub events: usize,
    pub ignored: usize,
    pub images: usize,
    pub scanned: usize,
    pub cache_hits: usize,
    pub scan_errors: usize,
    pub invalid_references: usize,
    /// Event ids whose results could not be stored
    pub redelivery: Vec<String>,
    /// Handler tasks that panicked
    pub panicked: usize,
}

impl RunSummary {
    fn absorb(&mut self, joined: Result<Vec<HandleReport>, JoinError>) {
        match joined {
            Ok(reports) => reports.into_iter().for_each(|report| self.absorb_report(report)),
            Err(e) => {
                tracing::error!(error = %e, "event handler task failed");
                self.events += 1;
                self.panicked += 1;
            }
        }
    }

    fn absorb_report(&mut self, report: HandleReport) {
        self.events += 1;
        if report.ignored.is_some() {
            self.ignored += 1;
        }
        self.images += report.images.len();
        self.scanned += report.count("scanned");
        self.cache_hits += report.count("cache_hit");
        self.scan_errors += report.count("scan_error");
        self.invalid_references += report.count("invalid_reference");
        if report.requires_redelivery() {
            self.redelivery.push(report.event_id);
        }
    }

    /// Whether every event was fully handled and stored.
    pub fn is_clean(&self) -> bool {
        self.redelivery.is_empty() && self.panicked == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} events ({} ignored), {} images: scanned={} cached={} scan_errors={} invalid={} needs_redelivery={} panicked={}",
            self.events,
            self.ignored,
            self.images,
            self.scanned,
            self.cache_hits,
            self.scan_errors,
            self.invalid_references,
            self.redelivery.len(),
            self.panicked,
        )
    }
}

/// Read deliveries line by line and handle each on its own task.
///
/// # Errors
///
/// Returns an error if reading from the source fails. Events already
/// spawned are awaited before the error is returned.
pub async fn process_events<R, P, S, K, L, F>(
    reader: R,
    handler: Arc<EventHandler<P, S, K, L>>,
    max_in_flight: usize,
    shutdown: F,
) -> Result<RunSummary>
where
    R: AsyncBufRead + Unpin,
    P: ExecutionPlatform,
    S: BlobStore + RowStore + KeyValueStore,
    K: SecretStore,
    L: ContainerLookup,
    F: Future<Output = ()>,
{
    let semaphore = Arc::new(Semaphore::new(max_in_flight.max(1)));
    let mut tasks = JoinSet::new();
    let mut summary = RunSummary::default();
    let mut lines = reader.lines();
    tokio::pin!(shutdown);

    let read_result: Result<()> = loop {
        while let Some(joined) = tasks.try_join_next() {
            summary.absorb(joined);
        }

        let permit = tokio::select! {
            biased;
            () = &mut shutdown => {
                tracing::info!(in_flight = tasks.len(), "shutdown requested, no longer reading events");
                break Ok(());
            }
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(e) => break Err(anyhow::anyhow!("event semaphore closed: {}", e)),
            },
        };

        let line = tokio::select! {
            biased;
            () = &mut shutdown => {
                tracing::info!(in_flight = tasks.len(), "shutdown requested, no longer reading events");
                break Ok(());
            }
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(e) => break Err(anyhow::anyhow!("failed to read event source: {}", e)),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let raw = line.to_owned();
        let handler = Arc::clone(&handler);
        tasks.spawn(async move {
            let _permit = permit;
            handler.handle_batch(&raw).await
        });
    };

    while let Some(joined) = tasks.join_next().await {
        summary.absorb(joined);
    }
    tracing::info!(
        events = summary.events,
        images = summary.images,
        needs_redelivery = summary.redelivery.len(),
        "event source drained"
    );
    read_result.map(|()| summary)
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
pub async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(test)]
mod tests {
    use deployscan_intake::{IgnoreReason, ImageOutcome, ImageReport};

    use super::*;

    fn report(event_id: &str, outcomes: Vec<ImageOutcome>) -> HandleReport {
        HandleReport {
            event_id: event_id.to_owned(),
            ignored: None,
            images: outcomes
                .into_iter()
                .map(|outcome| ImageReport {
                    raw_image: "nginx".to_owned(),
                    canonical_id: None,
                    outcome,
                })
                .collect(),
        }
    }

    #[test]
    fn summary_tallies_reports() {
        let mut summary = RunSummary::default();
        summary.absorb(Ok(vec![report("e1", vec![ImageOutcome::CacheHit])]));
        summary.absorb(Ok(vec![
            report(
                "e2",
                vec![ImageOutcome::StoreFailed {
                    error: "disk full".to_owned(),
                }],
            ),
            HandleReport {
                event_id: "e3".to_owned(),
                ignored: Some(IgnoreReason::NoImages),
                images: Vec::new(),
            },
        ]));

        assert_eq!(summary.events, 3);
        assert_eq!(summary.ignored, 1);
        assert_eq!(summary.images, 2);
        assert_eq!(summary.cache_hits, 1);
        assert_eq!(summary.redelivery, vec!["e2".to_owned()]);
        assert!(!summary.is_clean());
        assert!(summary.to_string().contains("needs_redelivery=1"));
    }

    #[test]
    fn empty_summary_is_clean() {
        assert!(RunSummary::default().is_clean());
    }
}
