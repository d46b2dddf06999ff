use std::sync::RwLock;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use crossflow_core::TenantId;

/// State of a tenant's circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation — requests flow through.
    Closed,
    /// The tenant's processing path is failing — requests are rejected
    /// immediately.
    Open,
    /// Recovery probe — a single trial request is allowed through.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Configuration shared by all tenant breakers.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// How long to wait in `Open` state before allowing a recovery probe.
    pub cool_down: Duration,
}

impl BreakerConfig {
    /// Validate configuration values.
    ///
    /// `cool_down = 0` is intentionally allowed (useful for testing).
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold < 1 {
            return Err("failure_threshold must be >= 1".into());
        }
        Ok(())
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down: Duration::from_secs(30),
        }
    }
}

/// Internal mutable state for a single tenant's breaker.
#[derive(Debug)]
struct BreakerData {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    /// Whether a probe request is currently in flight during `HalfOpen`.
    /// Only one probe is admitted at a time.
    probe_in_flight: bool,
}

impl BreakerData {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure: None,
            probe_in_flight: false,
        }
    }
}

/// Circuit breaker for a single tenant.
///
/// Transitions:
/// - `Closed` -> `Open` when consecutive failures reach the threshold
/// - `Open` -> `HalfOpen` after the cool-down elapses (next request probes)
/// - `HalfOpen` -> `Closed` on the first probe success, failures zeroed
/// - `HalfOpen` -> `Open` on probe failure, cool-down timer restarted
struct TenantBreaker {
    data: RwLock<BreakerData>,
}

impl TenantBreaker {
    fn new() -> Self {
        Self {
            data: RwLock::new(BreakerData::new()),
        }
    }

    /// Check whether a request should be allowed through.
    ///
    /// May transition `Open` -> `HalfOpen` when the cool-down has elapsed.
    /// Returns the effective state — `Open` means reject.
    fn check(&self, config: &BreakerConfig, tenant: &TenantId) -> CircuitState {
        let mut data = self
            .data
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if data.state == CircuitState::Open
            && let Some(last_failure) = data.last_failure
            && last_failure.elapsed() >= config.cool_down
        {
            debug!(tenant = %tenant, "circuit transitioning from open to half-open");
            data.state = CircuitState::HalfOpen;
            data.probe_in_flight = true;
            return CircuitState::HalfOpen;
        }

        // In HalfOpen, admit only one probe at a time.
        if data.state == CircuitState::HalfOpen {
            if data.probe_in_flight {
                return CircuitState::Open;
            }
            data.probe_in_flight = true;
        }

        data.state
    }

    /// Record a successful processing attempt.
    fn record_success(&self, tenant: &TenantId) {
        let mut data = self
            .data
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        match data.state {
            CircuitState::HalfOpen => {
                info!(tenant = %tenant, "circuit closing after successful probe");
                data.state = CircuitState::Closed;
                data.consecutive_failures = 0;
                data.probe_in_flight = false;
            }
            CircuitState::Closed => {
                data.consecutive_failures = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed processing attempt.
    fn record_failure(&self, config: &BreakerConfig, tenant: &TenantId) {
        let mut data = self
            .data
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        match data.state {
            CircuitState::Closed => {
                data.consecutive_failures += 1;
                data.last_failure = Some(Instant::now());
                if data.consecutive_failures >= config.failure_threshold {
                    info!(
                        tenant = %tenant,
                        failures = data.consecutive_failures,
                        threshold = config.failure_threshold,
                        "circuit opening"
                    );
                    data.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                info!(tenant = %tenant, "circuit re-opening after half-open probe failure");
                data.state = CircuitState::Open;
                data.last_failure = Some(Instant::now());
                data.probe_in_flight = false;
            }
            CircuitState::Open => {
                data.last_failure = Some(Instant::now());
            }
        }
    }

    fn snapshot(&self) -> (CircuitState, u32) {
        let data = self
            .data
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        (data.state, data.consecutive_failures)
    }
}

/// Operator-facing snapshot of one tenant's breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    /// Tenant the breaker belongs to.
    pub tenant: TenantId,
    /// Current circuit state ("closed", "open", "`half_open`").
    pub state: String,
    /// Current consecutive failure count.
    pub consecutive_failures: u32,
}

/// Registry of per-tenant circuit breakers.
///
/// Entries are created lazily on the first recorded failure: a tenant that
/// has never failed carries no breaker state and passes every check.
/// Purely in-process — multi-instance deployments need a shared store for
/// correct breaker semantics, which this registry deliberately does not
/// attempt.
pub struct CircuitBreakerRegistry {
    breakers: DashMap<TenantId, TenantBreaker>,
    config: BreakerConfig,
}

impl CircuitBreakerRegistry {
    /// Create a registry with the given shared configuration.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    /// Check whether a request for `tenant` should be allowed through.
    ///
    /// Tenants with no breaker entry are always allowed; no entry is
    /// created by a check.
    pub fn check(&self, tenant: &TenantId) -> CircuitState {
        match self.breakers.get(tenant) {
            Some(breaker) => breaker.check(&self.config, tenant),
            None => CircuitState::Closed,
        }
    }

    /// Record a successful processing attempt. No-op if the tenant has no
    /// breaker entry.
    pub fn record_success(&self, tenant: &TenantId) {
        if let Some(breaker) = self.breakers.get(tenant) {
            breaker.record_success(tenant);
        }
    }

    /// Record a failed processing attempt, lazily creating the tenant's
    /// breaker entry.
    pub fn record_failure(&self, tenant: &TenantId) {
        self.breakers
            .entry(tenant.clone())
            .or_insert_with(TenantBreaker::new)
            .record_failure(&self.config, tenant);
    }

    /// Current state without triggering transitions. `Closed` for tenants
    /// with no entry.
    #[must_use]
    pub fn state(&self, tenant: &TenantId) -> CircuitState {
        self.breakers
            .get(tenant)
            .map_or(CircuitState::Closed, |b| b.snapshot().0)
    }

    /// Snapshot every tracked breaker, sorted by tenant.
    #[must_use]
    pub fn statuses(&self) -> Vec<BreakerStatus> {
        let mut statuses: Vec<BreakerStatus> = self
            .breakers
            .iter()
            .map(|entry| {
                let (state, consecutive_failures) = entry.value().snapshot();
                BreakerStatus {
                    tenant: entry.key().clone(),
                    state: state.to_string(),
                    consecutive_failures,
                }
            })
            .collect();
        statuses.sort_by(|a, b| a.tenant.cmp(&b.tenant));
        statuses
    }

    /// The shared breaker configuration.
    #[must_use]
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }
}

impl std::fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("tenants", &self.breakers.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(id: &str) -> TenantId {
        TenantId::new(id)
    }

    fn registry() -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(BreakerConfig::default())
    }

    // -- Config tests ---------------------------------------------------------

    #[test]
    fn default_config_values() {
        let cfg = BreakerConfig::default();
        assert_eq!(cfg.failure_threshold, 5);
        assert_eq!(cfg.cool_down, Duration::from_secs(30));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn config_validation_rejects_zero_threshold() {
        let cfg = BreakerConfig {
            failure_threshold: 0,
            ..BreakerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    // -- State transition tests -----------------------------------------------

    #[test]
    fn unknown_tenant_passes_without_creating_entry() {
        let reg = registry();
        let t = tenant("t1");
        assert_eq!(reg.check(&t), CircuitState::Closed);
        assert_eq!(reg.state(&t), CircuitState::Closed);
        assert!(reg.statuses().is_empty(), "check must not create an entry");
    }

    #[test]
    fn success_without_entry_is_noop() {
        let reg = registry();
        reg.record_success(&tenant("t1"));
        assert!(reg.statuses().is_empty());
    }

    #[test]
    fn failure_lazily_creates_entry() {
        let reg = registry();
        reg.record_failure(&tenant("t1"));
        let statuses = reg.statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].consecutive_failures, 1);
        assert_eq!(statuses[0].state, "closed");
    }

    #[test]
    fn opens_on_fifth_consecutive_failure() {
        let reg = registry();
        let t = tenant("t1");

        for _ in 0..4 {
            reg.record_failure(&t);
        }
        assert_eq!(reg.state(&t), CircuitState::Closed);

        reg.record_failure(&t);
        assert_eq!(reg.state(&t), CircuitState::Open);
        assert_eq!(reg.check(&t), CircuitState::Open);
    }

    #[test]
    fn success_resets_failure_count() {
        let reg = registry();
        let t = tenant("t1");

        for _ in 0..4 {
            reg.record_failure(&t);
        }
        reg.record_success(&t);

        // Needs a fresh run of 5 failures to open.
        for _ in 0..4 {
            reg.record_failure(&t);
        }
        assert_eq!(reg.state(&t), CircuitState::Closed);
        reg.record_failure(&t);
        assert_eq!(reg.state(&t), CircuitState::Open);
    }

    #[test]
    fn tenants_are_independent() {
        let reg = registry();
        let t1 = tenant("t1");
        let t2 = tenant("t2");

        for _ in 0..5 {
            reg.record_failure(&t1);
        }
        assert_eq!(reg.state(&t1), CircuitState::Open);
        assert_eq!(reg.state(&t2), CircuitState::Closed);
        assert_eq!(reg.check(&t2), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn open_rejects_until_cool_down_elapses() {
        let reg = registry();
        let t = tenant("t1");

        for _ in 0..5 {
            reg.record_failure(&t);
        }
        assert_eq!(reg.check(&t), CircuitState::Open);

        // Still inside the cool-down window.
        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(reg.check(&t), CircuitState::Open);

        // Cool-down elapsed: next check admits a half-open probe.
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(reg.check(&t), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_success_closes_and_zeroes_failures() {
        let reg = registry();
        let t = tenant("t1");

        for _ in 0..5 {
            reg.record_failure(&t);
        }
        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(reg.check(&t), CircuitState::HalfOpen);

        reg.record_success(&t);
        assert_eq!(reg.state(&t), CircuitState::Closed);
        assert_eq!(reg.statuses()[0].consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens_and_resets_timer() {
        let reg = registry();
        let t = tenant("t1");

        for _ in 0..5 {
            reg.record_failure(&t);
        }
        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(reg.check(&t), CircuitState::HalfOpen);

        reg.record_failure(&t);
        assert_eq!(reg.state(&t), CircuitState::Open);

        // The cool-down restarted at the probe failure: 29s later the
        // circuit is still open, 2s more and a new probe is admitted.
        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(reg.check(&t), CircuitState::Open);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(reg.check(&t), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_admits_single_probe() {
        let reg = registry();
        let t = tenant("t1");

        for _ in 0..5 {
            reg.record_failure(&t);
        }
        tokio::time::advance(Duration::from_secs(31)).await;

        // First check admits the probe, the second is rejected while the
        // probe is in flight.
        assert_eq!(reg.check(&t), CircuitState::HalfOpen);
        assert_eq!(reg.check(&t), CircuitState::Open);

        reg.record_success(&t);
        assert_eq!(reg.state(&t), CircuitState::Closed);
    }

    #[test]
    fn statuses_sorted_by_tenant() {
        let reg = registry();
        reg.record_failure(&tenant("zeta"));
        reg.record_failure(&tenant("alpha"));

        let statuses = reg.statuses();
        assert_eq!(statuses[0].tenant.as_str(), "alpha");
        assert_eq!(statuses[1].tenant.as_str(), "zeta");
    }

    #[test]
    fn concurrent_failures_open_exactly_once() {
        use std::sync::Arc;

        let reg = Arc::new(CircuitBreakerRegistry::new(BreakerConfig {
            failure_threshold: 100,
            ..BreakerConfig::default()
        }));
        let t = tenant("t1");

        let mut handles = Vec::new();
        for _ in 0..10 {
            let reg = Arc::clone(&reg);
            let t = t.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..10 {
                    reg.record_failure(&t);
                }
            }));
        }
        for handle in handles {
            handle.join().expect("thread should not panic");
        }

        // 10 threads * 10 failures = 100, which equals the threshold.
        assert_eq!(reg.state(&t), CircuitState::Open);
    }
}
