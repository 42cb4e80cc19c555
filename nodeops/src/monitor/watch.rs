//! Periodic status rendering

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, info};

use crate::errors::OpsError;
use crate::monitor::health::{HealthMonitor, StatusReport};

/// Watch loop options
#[derive(Debug, Clone)]
pub struct Options {
    /// Delay between renders
    pub interval: Duration,

    /// Stop after this many renders
    pub max_iterations: Option<u64>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_iterations: None,
        }
    }
}

/// Render the full report every interval until `shutdown_signal` resolves.
///
/// Each report is gathered completely before the next sleep. Cancelling
/// mid-report only drops read-only queries. Returns the number of renders.
pub async fn run<R>(
    options: &Options,
    monitor: &HealthMonitor<'_>,
    mut render: R,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) -> u64
where
    R: FnMut(Result<StatusReport, OpsError>),
{
    info!("Watching node status every {:?}", options.interval);
    let mut iterations = 0;

    loop {
        if options.max_iterations.is_some_and(|max| iterations >= max) {
            break;
        }

        tokio::select! {
            biased;
            _ = &mut shutdown_signal => {
                info!("Watch interrupted");
                break;
            }
            report = monitor.report() => {
                render(report);
                iterations += 1;
            }
        }

        if options.max_iterations.is_some_and(|max| iterations >= max) {
            break;
        }

        tokio::select! {
            biased;
            _ = &mut shutdown_signal => {
                info!("Watch interrupted");
                break;
            }
            _ = tokio::time::sleep(options.interval) => {
                debug!("Refreshing status");
            }
        }
    }

    iterations
}
