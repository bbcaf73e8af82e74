//! Proactive token refresh ahead of expiry.

use crate::AuthResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const DEFAULT_REFRESH_IMMEDIATELY_WITHIN: Duration = Duration::from_secs(300);
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(180);

/// When to refresh relative to a token's expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    /// Less than this left: refresh right away.
    pub refresh_immediately_within: Duration,
    /// Otherwise refresh this long before expiry.
    pub safety_margin: Duration,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            refresh_immediately_within: DEFAULT_REFRESH_IMMEDIATELY_WITHIN,
            safety_margin: DEFAULT_SAFETY_MARGIN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPlan {
    Immediate,
    After(Duration),
}

impl ExpiryPolicy {
    pub fn from_secs(refresh_immediately_within: u64, safety_margin: u64) -> Self {
        Self {
            refresh_immediately_within: Duration::from_secs(refresh_immediately_within),
            safety_margin: Duration::from_secs(safety_margin),
        }
    }

    pub fn plan(&self, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> RefreshPlan {
        // Already expired converts to an error; treat it as zero remaining.
        let remaining = (expires_at - now).to_std().unwrap_or(Duration::ZERO);

        if remaining < self.refresh_immediately_within {
            return RefreshPlan::Immediate;
        }

        match remaining.checked_sub(self.safety_margin) {
            Some(delay) if !delay.is_zero() => RefreshPlan::After(delay),
            _ => RefreshPlan::Immediate,
        }
    }
}

/// Whatever performs the refresh when the timer fires.
#[async_trait]
pub trait RefreshTrigger: Send + Sync {
    async fn trigger_refresh(&self) -> AuthResult<()>;
}

/// Owns at most one pending refresh timer. Scheduling replaces the previous
/// timer; dropping the monitor cancels it.
pub struct ExpiryMonitor {
    policy: ExpiryPolicy,
    trigger: Arc<dyn RefreshTrigger>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl ExpiryMonitor {
    pub fn new(policy: ExpiryPolicy, trigger: Arc<dyn RefreshTrigger>) -> Self {
        Self {
            policy,
            trigger,
            timer: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> ExpiryPolicy {
        self.policy
    }

    /// Arm the timer for a token expiring at `expires_at`. Must be called from
    /// within a Tokio runtime.
    pub fn schedule(&self, expires_at: DateTime<Utc>) -> RefreshPlan {
        let plan = self.policy.plan(expires_at, Utc::now());
        let delay = match plan {
            RefreshPlan::Immediate => Duration::ZERO,
            RefreshPlan::After(delay) => delay,
        };
        debug!(?plan, %expires_at, "Scheduling token refresh");

        let trigger = self.trigger.clone();
        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = trigger.trigger_refresh().await {
                warn!(error = %e, "Scheduled token refresh failed");
            }
        });

        if let Some(previous) = self.timer.lock().replace(handle) {
            previous.abort();
        }
        plan
    }

    pub fn cancel(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
            debug!("Token refresh timer cancelled");
        }
    }

    /// Whether a timer is armed and has not fired yet.
    pub fn is_scheduled(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ExpiryMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}
