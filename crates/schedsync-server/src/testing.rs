//! Test doubles: a scriptable calendar gateway, scripted broker producers
//! and a harness wiring the orchestrator over in-memory stores.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use schedsync_calendar::{
    BoxFuture, CalendarGateway, GatewayError, GatewayResult, OAuthToken, RemoteEvent,
};
use schedsync_core::{CalendarEvent, Group, TimeWindow, UserId};
use tokio::sync::Notify;

use crate::calendar_sync::CalendarSync;
use crate::credentials::CredentialVault;
use crate::publisher::{BrokerError, BrokerMessage, BrokerProducer, DeliveryFeeds};
use crate::store::memory::{
    MemoryBindingStore, MemoryCredentialStore, MemoryGroupStore, MemoryScheduleStore,
};
use crate::store::{CredentialStore, GroupStore, StoreError, StoreResult};

/// Gateway operations, for counting and scripting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    Exchange,
    Refresh,
    ListEvents,
    CreateEvent,
    DeleteEvent,
    CreateCalendar,
}

/// An event the fake accepted.
#[derive(Debug, Clone)]
pub struct CreatedEvent {
    pub calendar_id: String,
    pub title: String,
    pub access_token: String,
}

/// In-memory gateway with call counters and scripted failures.
///
/// Calendars are named `cal-1`, `cal-2`, ...; events `evt-1`, ...; a
/// refresh returns `access-refreshed-N` and keeps the refresh token.
#[derive(Default)]
pub struct FakeGateway {
    calls: Mutex<HashMap<GatewayOp, usize>>,
    /// Failures keyed by the 1-based call number they apply to.
    failures: Mutex<HashMap<GatewayOp, VecDeque<(usize, GatewayError)>>>,
    calendars: Mutex<Vec<String>>,
    events: Mutex<Vec<CreatedEvent>>,
    listed: Mutex<Vec<RemoteEvent>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next not-yet-scripted call of `op`.
    pub fn fail_next(&self, op: GatewayOp, error: GatewayError) {
        let mut failures = self.failures.lock().unwrap();
        let queue = failures.entry(op).or_default();
        let made = self.calls(op);
        let call = queue.back().map_or(made, |(n, _)| (*n).max(made)) + 1;
        queue.push_back((call, error));
    }

    /// Fails the `n`th call (1-based, counted from the start) of `op`.
    pub fn fail_nth(&self, op: GatewayOp, n: usize, error: GatewayError) {
        let mut failures = self.failures.lock().unwrap();
        let queue = failures.entry(op).or_default();
        queue.push_back((n, error));
        queue.make_contiguous().sort_by_key(|(n, _)| *n);
    }

    pub fn calls(&self, op: GatewayOp) -> usize {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    pub fn calendar_titles(&self) -> Vec<String> {
        self.calendars.lock().unwrap().clone()
    }

    pub fn created_events(&self) -> Vec<CreatedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn set_listed(&self, events: Vec<RemoteEvent>) {
        *self.listed.lock().unwrap() = events;
    }

    fn enter(&self, op: GatewayOp) -> GatewayResult<usize> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(op).or_default();
            *count += 1;
            *count
        };
        let mut failures = self.failures.lock().unwrap();
        if let Some(queue) = failures.get_mut(&op) {
            if queue.front().is_some_and(|(n, _)| *n == call) {
                let (_, error) = queue.pop_front().unwrap();
                return Err(error.with_provider("fake"));
            }
        }
        Ok(call)
    }
}

impl CalendarGateway for FakeGateway {
    fn name(&self) -> &str {
        "fake"
    }

    fn login_url(&self, state: &str) -> String {
        format!("https://accounts.example.com/auth?state={state}")
    }

    fn exchange_code(&self, _code: String) -> BoxFuture<'_, GatewayResult<OAuthToken>> {
        Box::pin(async move {
            self.enter(GatewayOp::Exchange)?;
            Ok(OAuthToken::new("access-from-code").with_refresh_token("refresh-from-code"))
        })
    }

    fn refresh_token(&self, token: OAuthToken) -> BoxFuture<'_, GatewayResult<OAuthToken>> {
        Box::pin(async move {
            let call = self.enter(GatewayOp::Refresh)?;
            Ok(OAuthToken::new(format!("access-refreshed-{call}")).inherit_refresh_token(&token))
        })
    }

    fn list_events(
        &self,
        _token: OAuthToken,
        _window: TimeWindow,
    ) -> BoxFuture<'_, GatewayResult<Vec<RemoteEvent>>> {
        Box::pin(async move {
            self.enter(GatewayOp::ListEvents)?;
            Ok(self.listed.lock().unwrap().clone())
        })
    }

    fn create_event(
        &self,
        token: OAuthToken,
        calendar_id: String,
        event: CalendarEvent,
    ) -> BoxFuture<'_, GatewayResult<String>> {
        Box::pin(async move {
            self.enter(GatewayOp::CreateEvent)?;
            let mut events = self.events.lock().unwrap();
            events.push(CreatedEvent {
                calendar_id,
                title: event.title,
                access_token: token.access_token,
            });
            Ok(format!("evt-{}", events.len()))
        })
    }

    fn delete_event(
        &self,
        _token: OAuthToken,
        _calendar_id: String,
        _event_id: String,
    ) -> BoxFuture<'_, GatewayResult<()>> {
        Box::pin(async move {
            self.enter(GatewayOp::DeleteEvent)?;
            Ok(())
        })
    }

    fn create_calendar(
        &self,
        _token: OAuthToken,
        title: String,
    ) -> BoxFuture<'_, GatewayResult<String>> {
        Box::pin(async move {
            self.enter(GatewayOp::CreateCalendar)?;
            let mut calendars = self.calendars.lock().unwrap();
            calendars.push(title);
            Ok(format!("cal-{}", calendars.len()))
        })
    }
}

/// A credential store whose backend is down.
pub struct BrokenCredentialStore;

impl CredentialStore for BrokenCredentialStore {
    fn set(&self, _key: String, _value: String, _ttl: Duration) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async { Err(StoreError::Unavailable("connection refused".to_string())) })
    }

    fn get(&self, _key: String) -> BoxFuture<'_, StoreResult<Option<String>>> {
        Box::pin(async { Err(StoreError::Unavailable("connection refused".to_string())) })
    }

    fn delete(&self, _key: String) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async { Err(StoreError::Unavailable("connection refused".to_string())) })
    }
}

/// Scripted producer:
/// - `failing`: accepts every message and reports it failed
/// - `gated`: holds each send until the gate opens, then delivers
/// - `deferred`: accepts at once and reports nothing until `settle` or `close`
#[derive(Default)]
pub struct ScriptedProducer {
    fail: bool,
    gate: Option<Notify>,
    defer: bool,
    pending: Mutex<Vec<(BrokerMessage, DeliveryFeeds)>>,
    attempts: AtomicUsize,
    delivered: Mutex<Vec<BrokerMessage>>,
    closed: AtomicBool,
}

impl ScriptedProducer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Notify::new()),
            ..Default::default()
        }
    }

    pub fn deferred() -> Self {
        Self {
            defer: true,
            ..Default::default()
        }
    }

    /// Lets the held send complete.
    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    /// Reports every accepted, unsettled message as delivered.
    pub fn settle(&self) {
        let pending = std::mem::take(&mut *self.pending.lock().unwrap());
        for (message, feeds) in pending {
            self.deliver(message, &feeds);
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<BrokerMessage> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn deliver(&self, message: BrokerMessage, feeds: &DeliveryFeeds) {
        feeds.delivered(message.topic.clone());
        self.delivered.lock().unwrap().push(message);
    }
}

impl BrokerProducer for ScriptedProducer {
    fn send(
        &self,
        message: BrokerMessage,
        feeds: DeliveryFeeds,
    ) -> BoxFuture<'_, Result<(), BrokerError>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                feeds.failed(
                    message.topic,
                    BrokerError::Rejected {
                        status: 503,
                        body: "unavailable".to_string(),
                    },
                );
            } else if self.defer {
                self.pending.lock().unwrap().push((message, feeds));
            } else {
                self.deliver(message, &feeds);
            }
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
            self.settle();
        })
    }
}

/// Polls `condition` until it holds, panicking after two seconds.
pub async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// The orchestrator over a fake gateway and in-memory stores.
pub struct Harness {
    pub gateway: Arc<FakeGateway>,
    pub vault: CredentialVault,
    pub bindings: Arc<MemoryBindingStore>,
    pub groups: Arc<MemoryGroupStore>,
    pub schedules: Arc<MemoryScheduleStore>,
    pub calendar: Arc<CalendarSync>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_credentials(Arc::new(MemoryCredentialStore::new()))
    }

    pub fn with_credentials(credentials: Arc<dyn CredentialStore>) -> Self {
        let gateway = Arc::new(FakeGateway::new());
        let vault = CredentialVault::new(credentials);
        let bindings = Arc::new(MemoryBindingStore::new());
        let groups = Arc::new(MemoryGroupStore::new());
        let calendar = Arc::new(CalendarSync::new(
            gateway.clone(),
            vault.clone(),
            bindings.clone(),
            groups.clone(),
        ));
        Self {
            gateway,
            vault,
            bindings,
            groups,
            schedules: Arc::new(MemoryScheduleStore::new()),
            calendar,
        }
    }

    /// Stores a session `access-{user}` / `refresh-{user}`.
    pub async fn sign_in(&self, user_id: UserId) {
        let token = OAuthToken::new(format!("access-{user_id}"))
            .with_refresh_token(format!("refresh-{user_id}"));
        self.vault.put_session(user_id, &token).await.unwrap();
    }

    /// Creates a group with a fresh trainer and `students` fresh students.
    pub async fn group_with_students(&self, students: usize) -> Group {
        let mut group = Group::new(
            "Morning lifts",
            UserId::generate(),
            crate::groups::generate_link(),
        );
        group.student_ids = (0..students).map(|_| UserId::generate()).collect();
        self.groups.create_group(group.clone()).await.unwrap();
        group
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 0).unwrap(),
        )
        .unwrap()
    }

    pub fn event(&self) -> CalendarEvent {
        let window = self.window();
        CalendarEvent::new("Deadlifts", window.start, window.end)
    }
}
