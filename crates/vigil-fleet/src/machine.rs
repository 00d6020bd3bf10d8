//! Per-account workflow state machine.
//!
//! Each account runs on its own task:
//!
//! ```text
//! Setup -> ( Login-gate -> Join-gate -> Heartbeat burst -> Reward wait )*
//! ```
//!
//! Every remote call goes through the [`RetryPolicy`], so the machine only
//! ever observes success. All suspension points are plain timed sleeps.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use vigil_client::ServiceClient;
use vigil_scheduler::{
    Clock, HEARTBEAT_TARGET_HOUR, RetryPolicy, pick_active_offset_minutes, reward_boundary,
    reward_wait,
};

use crate::{Account, AccountLogger, FleetConfig, WorkflowTiming};

/// Drives one account through its workflow forever.
pub struct AccountMachine<C> {
    account: Account,
    client: C,
    retry: RetryPolicy,
    timing: WorkflowTiming,
    logger: AccountLogger,
    clock: Arc<dyn Clock>,
    resource_reference: Arc<str>,
}

impl<C: ServiceClient> AccountMachine<C> {
    pub fn new(
        account: Account,
        client: C,
        logger: AccountLogger,
        config: &FleetConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            account,
            client,
            retry: config.retry,
            timing: config.workflow.clone(),
            logger,
            clock,
            resource_reference: Arc::from(config.resource_reference.as_str()),
        }
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Run setup once, then the gated loop. Never returns.
    pub async fn run(mut self) {
        self.setup().await;
        loop {
            self.run_cycle().await;
        }
    }

    /// One pass of login gate, join gate, heartbeat burst and reward wait.
    pub async fn run_cycle(&mut self) {
        self.login_gate().await;
        self.join_gate().await;
        self.heartbeat_burst().await;
        sleep(self.timing.process_cooldown).await;
        self.wait_for_reward().await;
    }

    /// Resolve the target resource and remember its id and invitation.
    pub async fn setup(&mut self) {
        let span = self.logger.span();
        let reference = &self.resource_reference;
        let client = &self.client;

        let info = self
            .retry
            .execute(span, "setup", || client.resolve_resource(reference))
            .await;

        if !self
            .account
            .set_resource(info.resource_id, info.invitation_id)
        {
            warn!(
                parent: span,
                resource_id = self.account.resource_id(),
                "resource already resolved, keeping existing id"
            );
        }

        debug!(
            parent: span,
            resource_id = self.account.resource_id(),
            invitation = ?self.account.invitation_token(),
            "resolved resource"
        );
        info!(parent: span, "starting");
    }

    /// Log in if the session is missing or stale, then pause.
    ///
    /// Returns whether a login ran.
    pub async fn login_gate(&mut self) -> bool {
        let span = self.logger.span();
        let max_age =
            chrono::Duration::from_std(self.timing.login_interval).unwrap_or(chrono::Duration::MAX);
        let due = self.account.login_due(self.clock.now(), max_age);

        if due {
            let client = &self.client;
            let (email, password) = (self.account.email(), self.account.password.as_str());

            self.retry
                .execute(span, "login", || client.authenticate(email, password))
                .await;

            self.account.record_login(self.clock.now());
            info!(parent: span, "authenticated");
        }

        sleep(self.timing.process_cooldown).await;
        due
    }

    /// Join the resource if not yet joined, then pause.
    ///
    /// Returns whether a join ran.
    pub async fn join_gate(&mut self) -> bool {
        let span = self.logger.span();
        let due = !self.account.has_joined_resource();

        if due {
            let client = &self.client;
            let resource_id = self.account.resource_id();
            let invitation = self.account.invitation_token();

            self.retry
                .execute(span, "join", || client.join_resource(resource_id, invitation))
                .await;

            self.account.mark_joined();
            info!(parent: span, resource_id, "resource joined");
        }

        sleep(self.timing.process_cooldown).await;
        due
    }

    /// Send the full burst of heartbeats, pausing after each one.
    ///
    /// Returns how many heartbeats were sent; an iteration with no matching
    /// timezone is skipped but still pauses.
    pub async fn heartbeat_burst(&mut self) -> u32 {
        let span = self.logger.span();
        let total = self.timing.activity_burst_count;
        let duration = self.timing.heartbeat_duration;
        let resource_id = self.account.resource_id();
        let client = &self.client;
        let mut sent = 0;

        for n in 1..=total {
            match pick_active_offset_minutes(self.clock.now(), HEARTBEAT_TARGET_HOUR) {
                Some(offset_minutes) => {
                    self.retry
                        .execute(span, "heartbeat", || {
                            client.send_heartbeat(resource_id, offset_minutes, duration)
                        })
                        .await;
                    sent += 1;
                    info!(parent: span, n, total, offset_minutes, "sent activity");
                }
                None => {
                    warn!(parent: span, n, total, "no timezone at target hour, skipping heartbeat");
                }
            }

            sleep(self.timing.activity_sleep).await;
        }

        sent
    }

    /// Sleep until the next reward epoch. Returns the time slept.
    pub async fn wait_for_reward(&self) -> Duration {
        let local_now = self.clock.now().with_timezone(&Local).time();
        let wait = reward_wait(local_now);
        let (hour, minute) = reward_boundary(local_now);

        info!(
            parent: self.logger.span(),
            wait_secs = wait.as_secs(),
            "waiting until {:02}:{:02}",
            hour,
            minute
        );

        sleep(wait).await;
        wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use tokio::time::Instant;
    use vigil_client::{ResourceInfo, ServiceError};
    use vigil_scheduler::ManualClock;

    use crate::LoggerRegistry;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Resolve,
        Authenticate,
        Join(u64, Option<String>),
        Heartbeat(i32, Duration),
    }

    /// Scripted client: records each successful call with its time.
    #[derive(Default)]
    struct MockClient {
        calls: Mutex<Vec<(Call, Instant)>>,
        resolve_failures: AtomicUsize,
        heartbeat_rate_limits: AtomicUsize,
    }

    impl MockClient {
        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push((call, Instant::now()));
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
        }

        fn heartbeat_times(&self) -> Vec<Instant> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| matches!(c, Call::Heartbeat(..)))
                .map(|(_, t)| *t)
                .collect()
        }

        fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls().iter().filter(|c| pred(c)).count()
        }

        fn take_failure(counter: &AtomicUsize) -> bool {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    #[async_trait]
    impl ServiceClient for MockClient {
        async fn resolve_resource(&self, _reference: &str) -> Result<ResourceInfo, ServiceError> {
            if Self::take_failure(&self.resolve_failures) {
                return Err(ServiceError::service("resource lookup failed"));
            }
            self.record(Call::Resolve);
            Ok(ResourceInfo {
                resource_id: 4242,
                invitation_id: Some("inv-9".to_string()),
            })
        }

        async fn authenticate(&self, _email: &str, _password: &str) -> Result<(), ServiceError> {
            self.record(Call::Authenticate);
            Ok(())
        }

        async fn join_resource(
            &self,
            resource_id: u64,
            invitation: Option<&str>,
        ) -> Result<(), ServiceError> {
            self.record(Call::Join(resource_id, invitation.map(str::to_string)));
            Ok(())
        }

        async fn send_heartbeat(
            &self,
            _resource_id: u64,
            offset_minutes: i32,
            duration: Duration,
        ) -> Result<(), ServiceError> {
            if Self::take_failure(&self.heartbeat_rate_limits) {
                return Err(ServiceError::RateLimited);
            }
            self.record(Call::Heartbeat(offset_minutes, duration));
            Ok(())
        }
    }

    fn noon() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn machine(client: Arc<MockClient>, clock: Arc<ManualClock>) -> AccountMachine<Arc<MockClient>> {
        let config = FleetConfig::new("http://example.com/c/garden");
        let account = Account::new("a@example.com", "pw", "device", None);
        let logger = LoggerRegistry::new().get(account.email());
        AccountMachine::new(account, client, logger, &config, clock)
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_retries_then_stores_resource() {
        let client = Arc::new(MockClient::default());
        client.resolve_failures.store(2, Ordering::SeqCst);
        let mut machine = machine(Arc::clone(&client), Arc::new(ManualClock::new(noon())));

        let start = Instant::now();
        machine.setup().await;

        assert_eq!(start.elapsed(), Duration::from_secs(20));
        assert_eq!(machine.account().resource_id(), 4242);
        assert_eq!(machine.account().invitation_token(), Some("inv-9"));
        assert_eq!(client.calls(), vec![Call::Resolve]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_account_logs_in() {
        let client = Arc::new(MockClient::default());
        let clock = Arc::new(ManualClock::new(noon()));
        let mut machine = machine(Arc::clone(&client), Arc::clone(&clock));

        let start = Instant::now();
        assert!(machine.login_gate().await);

        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert_eq!(machine.account().last_authenticated_at(), Some(noon()));
        assert_eq!(client.calls(), vec![Call::Authenticate]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_gate_respects_session_age() {
        let client = Arc::new(MockClient::default());
        let clock = Arc::new(ManualClock::new(noon()));
        let mut machine = machine(Arc::clone(&client), Arc::clone(&clock));

        machine
            .account
            .record_login(noon() - chrono::Duration::hours(11));
        let start = Instant::now();
        assert!(!machine.login_gate().await);
        assert_eq!(start.elapsed(), Duration::from_secs(10), "cooldown even when skipped");
        assert_eq!(client.count(|c| *c == Call::Authenticate), 0);

        machine
            .account
            .record_login(noon() - chrono::Duration::hours(13));
        assert!(machine.login_gate().await);
        assert_eq!(client.count(|c| *c == Call::Authenticate), 1);
        assert_eq!(machine.account().last_authenticated_at(), Some(noon()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_runs_once() {
        let client = Arc::new(MockClient::default());
        let mut machine = machine(Arc::clone(&client), Arc::new(ManualClock::new(noon())));
        machine.setup().await;

        assert!(machine.join_gate().await);
        for _ in 0..3 {
            assert!(!machine.join_gate().await);
            assert!(machine.account().has_joined_resource());
        }

        assert_eq!(
            client.count(|c| matches!(c, Call::Join(..))),
            1,
            "join must never be re-invoked"
        );
        assert!(client.calls().contains(&Call::Join(4242, Some("inv-9".to_string()))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_burst_sends_full_count() {
        let client = Arc::new(MockClient::default());
        client.heartbeat_rate_limits.store(2, Ordering::SeqCst);
        let mut machine = machine(Arc::clone(&client), Arc::new(ManualClock::new(noon())));

        let start = Instant::now();
        let sent = machine.heartbeat_burst().await;

        assert_eq!(sent, 24);
        assert_eq!(
            client.calls(),
            vec![Call::Heartbeat(660, Duration::from_secs(4 * 3600)); 24]
        );
        // Two rate-limit cooldowns plus one activity sleep per heartbeat.
        assert_eq!(
            start.elapsed(),
            Duration::from_secs(2 * 30) + Duration::from_secs(16) * 24
        );

        let times = client.heartbeat_times();
        for pair in times.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::from_secs(16));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_reward_sleeps_computed_duration() {
        let client = Arc::new(MockClient::default());
        let machine = machine(client, Arc::new(ManualClock::new(noon())));

        let start = Instant::now();
        let waited = machine.wait_for_reward().await;

        assert_eq!(start.elapsed(), waited);
        assert!(waited > Duration::from_secs(15 * 60));
        assert!(waited <= Duration::from_secs(75 * 60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycles_run_in_order() {
        let client = Arc::new(MockClient::default());
        let clock = Arc::new(ManualClock::new(noon()));
        let mut machine = machine(Arc::clone(&client), Arc::clone(&clock));

        machine.setup().await;
        machine.run_cycle().await;
        clock.advance(chrono::Duration::hours(1));
        machine.run_cycle().await;

        let calls = client.calls();
        let heartbeat = Call::Heartbeat(660, Duration::from_secs(4 * 3600));
        let heartbeat_next_hour = Call::Heartbeat(600, Duration::from_secs(4 * 3600));

        let mut expected = vec![
            Call::Resolve,
            Call::Authenticate,
            Call::Join(4242, Some("inv-9".to_string())),
        ];
        expected.extend(std::iter::repeat_n(heartbeat, 24));
        expected.extend(std::iter::repeat_n(heartbeat_next_hour, 24));
        assert_eq!(calls, expected);
    }
}
