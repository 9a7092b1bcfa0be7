// File: testing-framework/src/tier2_integration/waiters.rs
//
// Convergence waiters
//
// Every cross-process condition in a scenario is observed by polling: probe
// the node, test the observation, sleep, repeat. A wait always has a timeout,
// the final probe happens at or after the deadline, and a timeout carries the
// last observation for diagnostics.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use dagnet_common::{H160, H256, U256};
use log::{debug, trace};
use thiserror::Error;
use tokio::time::Duration;

use super::{NodeRpc, TransactionReceipt};
use crate::orchestrator::Clock;

/// Default budget of a single wait
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default pause between two probes
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A wait that did not converge
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
    /// The condition never held within the budget
    #[error("timed out after {timeout:?} waiting for {description}; last observed: {last_observed}")]
    Timeout {
        /// What was being waited for
        description: String,
        /// Budget that elapsed
        timeout: Duration,
        /// Last probe result, or the error it returned
        last_observed: String,
    },
}

/// Polling policy plus the clock it runs on.
///
/// Cheap to clone; every wait in a scenario shares one.
#[derive(Clone)]
pub struct Waiter {
    clock: Arc<dyn Clock>,
    timeout: Duration,
    poll_interval: Duration,
}

impl Waiter {
    /// Waiter with the default timeout and poll interval
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            timeout: DEFAULT_WAIT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Same clock and interval with another budget
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            clock: self.clock.clone(),
            timeout,
            poll_interval: self.poll_interval,
        }
    }

    /// Same clock and budget with another interval. Zero is raised to 1ms.
    pub fn with_poll_interval(&self, poll_interval: Duration) -> Self {
        Self {
            clock: self.clock.clone(),
            timeout: self.timeout,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// Budget of each wait
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Pause between probes
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Clock the waiter sleeps on
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Probe until `accept` holds on an observation, or the budget runs out.
    ///
    /// A probe error counts as an observation that is not accepted. Each
    /// probe is itself bounded so a hung node cannot stall the wait past its
    /// deadline by more than one poll interval.
    ///
    /// # Errors
    ///
    /// [`WaitError::Timeout`] with the last observation once a probe at or
    /// after the deadline still fails.
    pub async fn until<T, P, Fut, A>(
        &self,
        description: &str,
        mut probe: P,
        mut accept: A,
    ) -> Result<T, WaitError>
    where
        T: Debug,
        P: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
        A: FnMut(&T) -> bool,
    {
        let deadline = self.clock.now() + self.timeout;
        let mut attempts = 0u64;

        loop {
            let final_attempt = self.clock.now() >= deadline;
            let probe_budget = deadline
                .saturating_duration_since(self.clock.now())
                .max(self.poll_interval);
            attempts += 1;

            let last_observed = match tokio::time::timeout(probe_budget, probe()).await {
                Ok(Ok(value)) => {
                    if accept(&value) {
                        debug!("{} converged after {} attempts", description, attempts);
                        return Ok(value);
                    }
                    format!("{:?}", value)
                }
                Ok(Err(e)) => format!("error: {:#}", e),
                Err(_) => format!("probe did not answer within {:?}", probe_budget),
            };
            trace!("{}: attempt {} observed {}", description, attempts, last_observed);

            if final_attempt {
                return Err(WaitError::Timeout {
                    description: description.to_string(),
                    timeout: self.timeout,
                    last_observed,
                });
            }

            let remaining = deadline.saturating_duration_since(self.clock.now());
            self.clock.sleep(self.poll_interval.min(remaining)).await;
        }
    }

    /// Wait for a condition that returns a plain boolean
    pub async fn until_true<P, Fut>(&self, description: &str, probe: P) -> Result<(), WaitError>
    where
        P: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<bool>>,
    {
        self.until(description, probe, |ok| *ok).await.map(|_| ())
    }
}

/// Wait until `node` knows at least `count` blocks, genesis included.
///
/// Returns the observed count.
pub async fn wait_for_block_count<N: NodeRpc + ?Sized>(
    waiter: &Waiter,
    node: &N,
    count: u64,
) -> Result<u64, WaitError> {
    waiter
        .until(
            &format!("block count >= {}", count),
            || node.get_block_count(),
            |observed| *observed >= count,
        )
        .await
}

/// Wait until `node` reports at least `min_peers` peers
pub async fn wait_for_peer_count<N: NodeRpc + ?Sized>(
    waiter: &Waiter,
    node: &N,
    min_peers: usize,
) -> Result<usize, WaitError> {
    waiter
        .until(
            &format!("peer count >= {}", min_peers),
            || async { Ok::<_, anyhow::Error>(node.get_peer_info().await?.len()) },
            |observed| *observed >= min_peers,
        )
        .await
}

/// Wait until `address` holds exactly `expected` on `node`
pub async fn wait_for_balance<N: NodeRpc + ?Sized>(
    waiter: &Waiter,
    node: &N,
    address: &H160,
    expected: U256,
) -> Result<U256, WaitError> {
    waiter
        .until(
            &format!("balance of {:#x} == {}", address, expected),
            || node.get_balance(address),
            |observed| *observed == expected,
        )
        .await
}

/// Wait until `tx_hash` has a receipt on `node`
pub async fn wait_for_receipt<N: NodeRpc + ?Sized>(
    waiter: &Waiter,
    node: &N,
    tx_hash: &H256,
) -> Result<TransactionReceipt, WaitError> {
    let receipt = waiter
        .until(
            &format!("receipt of {:#x}", tx_hash),
            || node.get_transaction_receipt(tx_hash),
            |observed| observed.is_some(),
        )
        .await?;
    // accepted observations are always Some
    receipt.ok_or_else(|| WaitError::Timeout {
        description: format!("receipt of {:#x}", tx_hash),
        timeout: waiter.timeout(),
        last_observed: "None".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::PausedClock;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn paused_waiter(timeout: Duration) -> Waiter {
        Waiter::new(Arc::new(PausedClock::new()))
            .with_timeout(timeout)
            .with_poll_interval(Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_immediate_success() {
        let waiter = paused_waiter(Duration::from_secs(1));
        let value = waiter
            .until("constant", || async { Ok::<_, anyhow::Error>(7u64) }, |v| *v == 7)
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_converges_after_some_attempts() {
        let waiter = paused_waiter(Duration::from_secs(10));
        let counter = AtomicU64::new(0);
        let value = waiter
            .until(
                "counter reaches 5",
                || async { Ok::<_, anyhow::Error>(counter.fetch_add(1, Ordering::SeqCst) + 1) },
                |v| *v >= 5,
            )
            .await
            .unwrap();
        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn test_timeout_reports_last_observation() {
        let waiter = paused_waiter(Duration::from_secs(1));
        let start = waiter.clock().now();
        let counter = AtomicU64::new(0);

        let err = waiter
            .until(
                "never",
                || async { Ok::<_, anyhow::Error>(counter.fetch_add(1, Ordering::SeqCst)) },
                |_| false,
            )
            .await
            .unwrap_err();

        let WaitError::Timeout {
            description,
            timeout,
            last_observed,
        } = err;
        assert_eq!(description, "never");
        assert_eq!(timeout, Duration::from_secs(1));
        let last: u64 = last_observed.parse().unwrap();
        assert_eq!(last + 1, counter.load(Ordering::SeqCst));
        // the final probe ran at or after the deadline
        assert!(waiter.clock().now() - start >= Duration::from_secs(1));
        // bounded polling: about one probe per interval, not a spin
        assert!(counter.load(Ordering::SeqCst) <= 12);
    }

    #[tokio::test]
    async fn test_probe_errors_are_observations() {
        let waiter = paused_waiter(Duration::from_millis(500));
        let err = waiter
            .until(
                "failing probe",
                || async { Err::<u64, _>(anyhow::anyhow!("connection refused")) },
                |_| true,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_hung_probe_is_bounded() {
        let waiter = paused_waiter(Duration::from_secs(1));
        let start = waiter.clock().now();
        let err = waiter
            .until(
                "hung probe",
                || async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok::<_, anyhow::Error>(1u64)
                },
                |_| true,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("did not answer"));
        assert!(waiter.clock().now() - start < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_zero_timeout_still_probes_once() {
        let waiter = paused_waiter(Duration::ZERO);
        let calls = AtomicU64::new(0);
        let result = waiter
            .until_true("single probe", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(true)
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
