use ahash::AHashSet;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::config::TransportConfig;

/// Upper bound on a single jail term.
const MAX_JAIL: Duration = Duration::from_secs(24 * 60 * 60);

/// Health and quota rules applied to every target of one pool.
#[derive(Debug, Clone, Copy)]
pub struct TargetPolicy {
    /// Jail time added per consecutive error.
    pub jail_unit: Duration,
    /// Consecutive successes after which both counters reset.
    pub success_threshold: u32,
    /// Fixed rate-limit window.
    pub rate_window: Duration,
    /// Whether jail expiry is honored when checking availability.
    pub jailing: bool,
}

impl TargetPolicy {
    #[must_use]
    pub fn primary(config: &TransportConfig) -> Self {
        Self {
            jail_unit: config.jail_unit(),
            success_threshold: config.success_threshold,
            rate_window: config.rate_window(),
            jailing: config.primary_jailing,
        }
    }

    #[must_use]
    pub fn failover(config: &TransportConfig) -> Self {
        Self { jailing: config.failover_jailing, ..Self::primary(config) }
    }
}

impl Default for TargetPolicy {
    fn default() -> Self {
        Self::primary(&TransportConfig::default())
    }
}

#[derive(Debug)]
struct TargetState {
    consecutive_errors: u32,
    consecutive_successes: u32,
    jailed_until: Option<Instant>,
    window_requests: u64,
    window_start: Instant,
}

/// Point-in-time copy of a target's health, for `/health` and tests.
#[derive(Debug, Clone, Serialize)]
pub struct TargetSnapshot {
    pub url: String,
    pub consecutive_errors: u32,
    pub consecutive_successes: u32,
    pub jailed_for_ms: u64,
    pub window_requests: u64,
    pub rate_limit: u64,
    pub methods: usize,
    pub available: bool,
}

/// One backend node plus its mutable health and rate state.
///
/// The network call never holds the state lock; only [`Target::update_stats`] and the
/// availability check take it.
#[derive(Debug)]
pub struct Target {
    url: String,
    methods: ArcSwap<AHashSet<String>>,
    rate_limit: u64,
    policy: TargetPolicy,
    state: Mutex<TargetState>,
}

impl Target {
    /// Creates a target. A `rate_limit` of `0` means unlimited.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        methods: AHashSet<String>,
        rate_limit: u64,
        policy: TargetPolicy,
    ) -> Self {
        Self {
            url: url.into(),
            methods: ArcSwap::from_pointee(methods),
            rate_limit,
            policy,
            state: Mutex::new(TargetState {
                consecutive_errors: 0,
                consecutive_successes: 0,
                jailed_until: None,
                window_requests: 0,
                window_start: Instant::now(),
            }),
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn rate_limit(&self) -> u64 {
        self.rate_limit
    }

    #[must_use]
    pub fn methods(&self) -> Arc<AHashSet<String>> {
        self.methods.load_full()
    }

    /// Replaces the supported-method set without touching health state.
    pub fn set_methods(&self, methods: AHashSet<String>) {
        self.methods.store(Arc::new(methods));
    }

    /// Returns `true` if every requested method is in the supported set.
    pub fn supports_all<S: AsRef<str>>(&self, requested: &[S]) -> bool {
        let methods = self.methods.load();
        requested.iter().all(|m| methods.contains(m.as_ref()))
    }

    /// Number of methods from `scanned` this target supports.
    #[must_use]
    pub fn supported_count(&self, scanned: &AHashSet<String>) -> usize {
        let methods = self.methods.load();
        scanned.iter().filter(|m| methods.contains(m.as_str())).count()
    }

    /// Records the outcome of one attempt against this target.
    pub fn update_stats(&self, success: bool) {
        self.update_stats_at(success, Instant::now());
    }

    pub(crate) fn update_stats_at(&self, success: bool, now: Instant) {
        let mut state = self.state.lock();

        if now.duration_since(state.window_start) >= self.policy.rate_window {
            state.window_start = now;
            state.window_requests = 0;
        }
        state.window_requests += 1;

        if success {
            if state.consecutive_successes < self.policy.success_threshold {
                state.consecutive_successes += 1;
            }
            if state.consecutive_successes >= self.policy.success_threshold {
                state.consecutive_successes = 0;
                state.consecutive_errors = 0;
            }
        } else {
            state.consecutive_successes = 0;
            state.consecutive_errors = state.consecutive_errors.saturating_add(1);
            let jail = self.policy.jail_unit.saturating_mul(state.consecutive_errors).min(MAX_JAIL);
            state.jailed_until = now.checked_add(jail).or(state.jailed_until);

            tracing::warn!(
                target_url = %self.url,
                consecutive_errors = state.consecutive_errors,
                jail_ms = u64::try_from(jail.as_millis()).unwrap_or(u64::MAX),
                "target jailed"
            );
        }
    }

    /// Returns `true` if the target may be selected right now.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.is_available_at(Instant::now())
    }

    pub(crate) fn is_available_at(&self, now: Instant) -> bool {
        let state = self.state.lock();

        if self.policy.jailing && state.jailed_until.is_some_and(|until| until > now) {
            return false;
        }

        if self.rate_limit > 0 {
            let window_current = now.duration_since(state.window_start) < self.policy.rate_window;
            if window_current && state.window_requests >= self.rate_limit {
                return false;
            }
        }

        true
    }

    /// Remaining jail time, zero when free.
    #[must_use]
    pub fn jail_remaining(&self) -> Duration {
        let now = Instant::now();
        self.state
            .lock()
            .jailed_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn consecutive_errors(&self) -> u32 {
        self.state.lock().consecutive_errors
    }

    #[must_use]
    pub fn consecutive_successes(&self) -> u32 {
        self.state.lock().consecutive_successes
    }

    #[must_use]
    pub fn snapshot(&self) -> TargetSnapshot {
        let available = self.is_available();
        let jailed_for_ms = u64::try_from(self.jail_remaining().as_millis()).unwrap_or(u64::MAX);
        let state = self.state.lock();
        TargetSnapshot {
            url: self.url.clone(),
            consecutive_errors: state.consecutive_errors,
            consecutive_successes: state.consecutive_successes,
            jailed_for_ms,
            window_requests: state.window_requests,
            rate_limit: self.rate_limit,
            methods: self.methods.load().len(),
            available,
        }
    }
}
