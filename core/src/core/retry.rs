use tokio::sync::Semaphore;
use tokio::time::sleep;

use super::EpochAction;
use crate::http::{self, Transport};
use crate::TargetConfig;

/// Final result of one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOutcome {
    pub succeeded: bool,
    pub attempts: u32,
}

/// Drives one logical request to a terminal state.
///
/// Each attempt holds a permit from `gate` for the duration of the network
/// call only; the backoff sleep between attempts runs without one. The delay
/// is the same for every retry. With `max_retries == 1` exactly one attempt
/// is made.
pub async fn run_logical_request(
    transport: &dyn Transport,
    gate: &Semaphore,
    target: &TargetConfig,
    action: &EpochAction,
) -> RequestOutcome {
    let max_attempts = action.max_retries.max(1);
    let mut attempts = 0;

    loop {
        let succeeded = {
            let Ok(_permit) = gate.acquire().await else {
                return RequestOutcome { succeeded: false, attempts };
            };
            attempts += 1;
            http::attempt(transport, target.url.as_str(), target.timeout).await
        };

        if succeeded {
            return RequestOutcome { succeeded: true, attempts };
        }
        if attempts >= max_attempts {
            return RequestOutcome { succeeded: false, attempts };
        }
        sleep(action.backoff()).await;
    }
}
