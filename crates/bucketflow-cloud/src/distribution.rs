//! CDN distribution teardown
//!
//! A distribution cannot be deleted while it is enabled or while a
//! configuration change is still propagating, and every mutation needs the
//! latest concurrency token. Teardown is therefore a poll-driven state
//! machine:
//!
//! ```text
//! Enabled ──> Disabling ──> WaitingDeployed ──> Deleting ──> Deleted
//!    │            │               │                │
//!    └────────────┴───────────────┴────────────────┴──> Failed
//! ```
//!
//! Tokens are always fetched right before the mutation that consumes them.

use crate::error::{ErrorKind, GatewayResult, ResourceError, ResourceRef};
use crate::gateway::CloudGateway;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Polling and retry limits for distribution teardown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeardownPolicy {
    /// Delay between two status reads while waiting for propagation
    #[serde(rename = "poll_interval_secs", alias = "poll_interval", with = "duration_secs")]
    pub poll_interval: Duration,

    /// Status reads before giving up with a timeout
    pub max_poll_attempts: u32,

    /// Stale-token retries of a fetch-then-mutate pair
    pub max_conflict_retries: u32,
}

impl Default for TeardownPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_poll_attempts: 60,
            max_conflict_retries: 3,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Teardown state of one distribution
#[derive(Debug, Clone, PartialEq)]
pub enum DistributionState {
    /// Initial state, nothing known yet
    Enabled,
    /// Submitting the disable mutation. `conflicts` counts stale tokens seen.
    Disabling { conflicts: u32 },
    /// Polling until propagation settles. `attempts` counts status reads.
    WaitingDeployed { attempts: u32 },
    /// Issuing the delete with a freshly fetched token
    Deleting { conflicts: u32 },
    Deleted,
    Failed(ResourceError),
}

impl DistributionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DistributionState::Deleted | DistributionState::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            DistributionState::Enabled => "enabled",
            DistributionState::Disabling { .. } => "disabling",
            DistributionState::WaitingDeployed { .. } => "waiting-deployed",
            DistributionState::Deleting { .. } => "deleting",
            DistributionState::Deleted => "deleted",
            DistributionState::Failed(_) => "failed",
        }
    }
}

/// Drives one distribution from `Enabled` to `Deleted` (or `Failed`)
pub struct DistributionTeardown<'a, G: CloudGateway + ?Sized> {
    gateway: &'a G,
    id: String,
    policy: TeardownPolicy,
    state: DistributionState,
}

impl<'a, G: CloudGateway + ?Sized> DistributionTeardown<'a, G> {
    pub fn new(gateway: &'a G, id: impl Into<String>, policy: TeardownPolicy) -> Self {
        Self {
            gateway,
            id: id.into(),
            policy,
            state: DistributionState::Enabled,
        }
    }

    pub fn state(&self) -> &DistributionState {
        &self.state
    }

    /// Perform exactly one transition and return the new state.
    ///
    /// Terminal states are returned unchanged.
    pub async fn advance(&mut self) -> &DistributionState {
        let next = match &self.state {
            DistributionState::Enabled => self.inspect().await,
            DistributionState::Disabling { conflicts } => self.disable(*conflicts).await,
            DistributionState::WaitingDeployed { attempts } => self.wait_deployed(*attempts).await,
            DistributionState::Deleting { conflicts } => self.delete(*conflicts).await,
            DistributionState::Deleted | DistributionState::Failed(_) => return &self.state,
        };

        if next != self.state {
            tracing::debug!(
                "Distribution {}: {} -> {}",
                self.id,
                self.state.label(),
                next.label()
            );
        }
        self.state = next;
        &self.state
    }

    /// Advance until a terminal state is reached
    pub async fn run(mut self) -> GatewayResult<()> {
        tracing::info!("Tearing down distribution {}", self.id);
        loop {
            match self.advance().await {
                DistributionState::Deleted => {
                    tracing::info!("Distribution {} deleted", self.id);
                    return Ok(());
                }
                DistributionState::Failed(e) => return Err(e.clone()),
                _ => continue,
            }
        }
    }

    fn resource(&self) -> ResourceRef {
        ResourceRef::distribution(&self.id)
    }

    /// Find out where teardown has to start
    async fn inspect(&self) -> DistributionState {
        match self.gateway.get_distribution_config(&self.id).await {
            Ok(config) if config.enabled() => DistributionState::Disabling { conflicts: 0 },
            Ok(_) => DistributionState::WaitingDeployed { attempts: 0 },
            Err(e) if e.is_not_found() => DistributionState::Deleted,
            Err(e) => DistributionState::Failed(e),
        }
    }

    async fn disable(&self, conflicts: u32) -> DistributionState {
        let config = match self.gateway.get_distribution_config(&self.id).await {
            Ok(config) => config,
            Err(e) if e.is_not_found() => return DistributionState::Deleted,
            Err(e) => return DistributionState::Failed(e),
        };

        if !config.enabled() {
            return DistributionState::WaitingDeployed { attempts: 0 };
        }

        let disabled = config.with_enabled(false);
        match self
            .gateway
            .update_distribution(&self.id, &config.etag, &disabled)
            .await
        {
            Ok(_) => DistributionState::WaitingDeployed { attempts: 0 },
            Err(e) if e.is_conflict() => self.on_conflict(e, conflicts, |c| {
                DistributionState::Disabling { conflicts: c }
            }),
            Err(e) if e.is_not_found() => DistributionState::Deleted,
            Err(e) => DistributionState::Failed(e),
        }
    }

    async fn wait_deployed(&self, attempts: u32) -> DistributionState {
        if attempts >= self.policy.max_poll_attempts {
            return DistributionState::Failed(ResourceError::timeout(
                self.resource(),
                format!(
                    "not deployed after {} status checks ({}s apart)",
                    attempts,
                    self.policy.poll_interval.as_secs()
                ),
            ));
        }

        match self.gateway.get_distribution_status(&self.id).await {
            Ok(status) if status.is_deployed() => {
                if status.enabled {
                    // Re-enabled externally while we waited
                    DistributionState::Disabling { conflicts: 0 }
                } else {
                    DistributionState::Deleting { conflicts: 0 }
                }
            }
            Ok(status) => {
                tracing::debug!(
                    "Distribution {} is {} ({}/{})",
                    self.id,
                    status.status,
                    attempts + 1,
                    self.policy.max_poll_attempts
                );
                // No wait after the last allowed read
                if attempts + 1 < self.policy.max_poll_attempts {
                    tokio::time::sleep(self.policy.poll_interval).await;
                }
                DistributionState::WaitingDeployed {
                    attempts: attempts + 1,
                }
            }
            Err(e) if e.is_not_found() => DistributionState::Deleted,
            Err(e) => DistributionState::Failed(e),
        }
    }

    async fn delete(&self, conflicts: u32) -> DistributionState {
        // Tokens observed while polling may be stale
        let config = match self.gateway.get_distribution_config(&self.id).await {
            Ok(config) => config,
            Err(e) if e.is_not_found() => return DistributionState::Deleted,
            Err(e) => return DistributionState::Failed(e),
        };

        if config.enabled() {
            return DistributionState::Disabling { conflicts: 0 };
        }

        match self.gateway.delete_distribution(&self.id, &config.etag).await {
            Ok(()) => DistributionState::Deleted,
            Err(e) if e.is_not_found() => DistributionState::Deleted,
            Err(e) if e.is_conflict() => self.on_conflict(e, conflicts, |c| {
                DistributionState::Deleting { conflicts: c }
            }),
            Err(e) => DistributionState::Failed(e),
        }
    }

    fn on_conflict(
        &self,
        error: ResourceError,
        conflicts: u32,
        retry: impl FnOnce(u32) -> DistributionState,
    ) -> DistributionState {
        if conflicts >= self.policy.max_conflict_retries {
            return DistributionState::Failed(ResourceError::new(
                ErrorKind::Conflict,
                self.resource(),
                format!("gave up after {} stale tokens: {}", conflicts + 1, error.cause),
            ));
        }
        tracing::warn!(
            "Stale token for distribution {}, refetching ({})",
            self.id,
            error.cause
        );
        retry(conflicts + 1)
    }
}

/// Disable a distribution, wait for it to settle and delete it.
///
/// An already-deleted distribution is a success.
pub async fn disable_and_delete_distribution<G>(
    gateway: &G,
    id: &str,
    policy: &TeardownPolicy,
) -> GatewayResult<()>
where
    G: CloudGateway + ?Sized,
{
    DistributionTeardown::new(gateway, id, policy.clone()).run().await
}
