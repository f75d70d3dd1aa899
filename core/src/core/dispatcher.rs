use std::sync::Arc;

use futures::future::join_all;
use log::{debug, warn};
use tokio::sync::Semaphore;

use super::retry::{self, RequestOutcome};
use super::EpochAction;
use crate::http::Transport;
use crate::TargetConfig;

/// Totals for one dispatcher round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub success_count: usize,
    pub attempts: u64,
}

/// Fans out `request_count` logical requests per round, never letting more
/// than `connection_ceiling` of them hit the network at once.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    target: Arc<TargetConfig>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, target: TargetConfig) -> Self {
        Self {
            transport,
            target: Arc::new(target),
        }
    }

    pub fn target(&self) -> &TargetConfig {
        &self.target
    }

    /// Runs one round under `action` and waits for every request to finish.
    pub async fn run(&self, action: EpochAction) -> DispatchReport {
        let gate = Arc::new(Semaphore::new(self.target.connection_ceiling));
        let mut tasks = Vec::with_capacity(self.target.request_count);

        for _ in 0..self.target.request_count {
            let transport = Arc::clone(&self.transport);
            let target = Arc::clone(&self.target);
            let gate = Arc::clone(&gate);

            tasks.push(tokio::spawn(async move {
                retry::run_logical_request(transport.as_ref(), &gate, &target, &action).await
            }));
        }

        let report = join_all(tasks)
            .await
            .into_iter()
            .fold(DispatchReport::default(), |mut acc, joined| {
                match joined {
                    Ok(RequestOutcome { succeeded, attempts }) => {
                        if succeeded {
                            acc.success_count += 1;
                        }
                        acc.attempts += u64::from(attempts);
                    }
                    Err(e) => warn!("Request task aborted: {}", e),
                }
                acc
            });

        debug!(
            "Round finished: {}/{} succeeded in {} attempts",
            report.success_count, self.target.request_count, report.attempts
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Tracks how many calls are in flight at once.
    #[derive(Default)]
    struct Instrumented {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for Instrumented {
        async fn get(&self, _url: &str) -> Result<u16, TransportError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(200)
        }
    }

    /// Every even-numbered call succeeds.
    #[derive(Default)]
    struct Alternating {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for Alternating {
        async fn get(&self, _url: &str) -> Result<u16, TransportError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                Ok(200)
            } else {
                Ok(500)
            }
        }
    }

    fn target(requests: usize, ceiling: usize) -> TargetConfig {
        TargetConfig::new("http://127.0.0.1:9/", requests, Duration::from_secs(5), ceiling).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_ceiling_is_enforced() {
        let transport = Arc::new(Instrumented::default());
        let dispatcher = Dispatcher::new(transport.clone(), target(60, 5));

        let report = dispatcher.run(EpochAction::new(0.1, 1)).await;

        assert_eq!(report.success_count, 60);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 60);
        let peak = transport.peak.load(Ordering::SeqCst);
        assert!(peak <= 5, "peak in-flight {} exceeded ceiling", peak);
        assert!(peak >= 1);
    }

    #[tokio::test]
    async fn test_counts_only_successes() {
        let transport = Arc::new(Alternating::default());
        let dispatcher = Dispatcher::new(transport, target(20, 4));

        let report = dispatcher.run(EpochAction::new(0.1, 1)).await;

        assert_eq!(report.success_count, 10);
        assert_eq!(report.attempts, 20);
    }

    #[tokio::test]
    async fn test_success_count_never_exceeds_request_count() {
        let transport = Arc::new(Instrumented::default());
        let dispatcher = Dispatcher::new(transport, target(7, 100));
        let report = dispatcher.run(EpochAction::new(0.1, 5)).await;
        assert_eq!(report.success_count, 7);
        assert_eq!(report.attempts, 7);
    }
}
