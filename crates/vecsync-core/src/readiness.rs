//! Blocks until an index reports ready, bounded by a deadline.

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::registry::{IndexDescriptor, IndexRegistry};

#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("index {index} not ready after {waited:?} ({polls} polls){suffix}", suffix = last_error_suffix(.last_error))]
    Timeout {
        index: String,
        waited: Duration,
        polls: u32,
        last_error: Option<String>,
    },
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    last_error
        .as_deref()
        .map(|e| format!("; last error: {e}"))
        .unwrap_or_default()
}

/// Polls `describe_index` every `poll_interval` until the index is ready.
///
/// Describe failures are logged and retried until the deadline. Each describe is
/// itself cut off at the deadline, so the call returns within `timeout + poll_interval`
/// however slow the registry is.
pub async fn wait_ready(
    registry: &dyn IndexRegistry,
    index: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<IndexDescriptor, ReadinessError> {
    let started = Instant::now();
    let deadline = started + timeout;
    let mut polls = 0u32;
    let mut last_error = None;
    tracing::info!("waiting for index {} to become ready (timeout {:?})", index, timeout);
    loop {
        polls += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, registry.describe_index(index)).await {
            Err(_) => {
                tracing::warn!("describe {} did not answer before the readiness deadline", index);
                last_error = Some(format!("describe {index} did not answer within {timeout:?}"));
            }
            Ok(Ok(d)) if d.ready => {
                tracing::info!("index {} ready after {:?}", index, started.elapsed());
                return Ok(d);
            }
            Ok(Ok(_)) => {
                tracing::debug!("index {} not ready yet (poll {})", index, polls);
            }
            Ok(Err(e)) => {
                tracing::warn!("describe {} failed while waiting for readiness: {}", index, e);
                last_error = Some(e.to_string());
            }
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(ReadinessError::Timeout {
                index: index.to_string(),
                waited: now - started,
                polls,
                last_error,
            });
        }
        tokio::time::sleep(poll_interval.min(deadline - now)).await;
    }
}
