//! End-to-end engine scenarios against a scripted in-memory client.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use calsync::{Invalidator, OptimisticAction, QueryScope, SyncEngine};
use calsync_core::{
    Calendar, CalendarClient, CalendarEvent, CalendarEventSyncItem, CalendarFreeBusy, DateRange,
    EventInput, EventPage, EventTime, ParticipationStatus, ProviderId, SyncDelta, SyncError,
    SyncResult, SyncStatus,
};
use chrono::{TimeZone, Utc};
use chrono_tz::Tz;
use tokio::sync::Semaphore;

/// Pauses one scripted method so a test can observe the in-flight state.
struct Gate {
    entered: Semaphore,
    release: Semaphore,
}

impl Gate {
    fn new() -> Arc<Self> {
        Arc::new(Gate {
            entered: Semaphore::new(0),
            release: Semaphore::new(0),
        })
    }

    async fn wait_entered(&self) {
        self.entered.acquire().await.unwrap().forget();
    }

    fn open(&self) {
        self.release.add_permits(1);
    }
}

#[derive(Default)]
struct Script {
    /// Responses for successive `sync` calls.
    sync: VecDeque<SyncResult<SyncDelta>>,
    /// `list_events` pages by calendar id.
    list: HashMap<String, EventPage>,
    /// `get_event` and `move_event` source records by event id.
    events: HashMap<String, CalendarEvent>,
    /// Injected into the next mutation call.
    fail_mutation: Option<SyncError>,
    /// Id the server assigns on create.
    server_id: String,
}

struct ScriptedClient {
    account: String,
    provider: ProviderId,
    script: Arc<Mutex<Script>>,
    gates: Vec<(&'static str, Arc<Gate>)>,
}

impl ScriptedClient {
    fn new(provider: ProviderId, script: Arc<Mutex<Script>>) -> Self {
        ScriptedClient {
            account: "work".to_string(),
            provider,
            script,
            gates: Vec::new(),
        }
    }

    fn gated(mut self, method: &'static str, gate: Arc<Gate>) -> Self {
        self.gates.push((method, gate));
        self
    }

    async fn pass_gate(&self, method: &str) {
        for (gated, gate) in &self.gates {
            if *gated == method {
                gate.entered.add_permits(1);
                gate.release.acquire().await.unwrap().forget();
            }
        }
    }

    fn take_failure(&self) -> Option<SyncError> {
        self.script.lock().unwrap().fail_mutation.take()
    }
}

#[async_trait]
impl CalendarClient for ScriptedClient {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    fn account_id(&self) -> &str {
        &self.account
    }

    async fn list_calendars(&self) -> SyncResult<Vec<Calendar>> {
        Ok(Vec::new())
    }

    async fn list_events(
        &self,
        calendar: &Calendar,
        _range: &DateRange,
        _time_zone: Tz,
    ) -> SyncResult<EventPage> {
        let script = self.script.lock().unwrap();
        Ok(script.list.get(&calendar.id).cloned().unwrap_or_default())
    }

    async fn sync(
        &self,
        _calendar: &Calendar,
        _sync_token: Option<&str>,
        _range: Option<&DateRange>,
        _time_zone: Tz,
    ) -> SyncResult<SyncDelta> {
        let mut script = self.script.lock().unwrap();
        script.sync.pop_front().unwrap_or_else(|| Ok(SyncDelta::default()))
    }

    async fn get_event(&self, _calendar_id: &str, event_id: &str) -> SyncResult<CalendarEvent> {
        let script = self.script.lock().unwrap();
        script.events.get(event_id).cloned().ok_or_else(|| SyncError::NotFound {
            provider: self.provider,
            account_id: self.account.clone(),
            operation: "get_event",
            resource: event_id.to_string(),
        })
    }

    async fn create_event(
        &self,
        calendar: &Calendar,
        input: &EventInput,
    ) -> SyncResult<CalendarEvent> {
        self.pass_gate("create").await;
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        let server_id = self.script.lock().unwrap().server_id.clone();
        Ok(input.clone().into_event(server_id, calendar))
    }

    async fn update_event(
        &self,
        calendar: &Calendar,
        event_id: &str,
        input: &EventInput,
    ) -> SyncResult<CalendarEvent> {
        self.pass_gate("update").await;
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        Ok(input.clone().into_event(event_id.to_string(), calendar))
    }

    async fn delete_event(
        &self,
        _calendar_id: &str,
        _event_id: &str,
        _notify_attendees: bool,
    ) -> SyncResult<()> {
        self.pass_gate("delete").await;
        match self.take_failure() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn move_event(
        &self,
        _source: &Calendar,
        dest: &Calendar,
        event_id: &str,
        _notify_attendees: bool,
    ) -> SyncResult<CalendarEvent> {
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        let script = self.script.lock().unwrap();
        let mut moved = script.events[event_id].clone();
        moved.calendar_id = dest.id.clone();
        moved.account_id = dest.account_id.clone();
        moved.provider_account_id = dest.provider_account_id.clone();
        Ok(moved)
    }

    async fn respond_to_event(
        &self,
        _calendar_id: &str,
        _event_id: &str,
        _response: ParticipationStatus,
    ) -> SyncResult<()> {
        match self.take_failure() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn free_busy(
        &self,
        _schedule_ids: &[String],
        _range: &DateRange,
    ) -> SyncResult<Vec<CalendarFreeBusy>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct RecordingInvalidator {
    scopes: Mutex<Vec<QueryScope>>,
}

impl Invalidator for RecordingInvalidator {
    fn invalidate(&self, scope: &QueryScope) {
        self.scopes.lock().unwrap().push(scope.clone());
    }
}

fn calendar(id: &str) -> Calendar {
    Calendar {
        id: id.to_string(),
        account_id: "work".to_string(),
        provider: ProviderId::Google,
        provider_account_id: "user@example.com".to_string(),
        name: id.to_string(),
        time_zone: None,
        primary: false,
        read_only: false,
    }
}

fn event(id: &str, calendar_id: &str, hour: u32) -> CalendarEvent {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap();
    CalendarEvent {
        id: id.to_string(),
        calendar_id: calendar_id.to_string(),
        account_id: "work".to_string(),
        provider: ProviderId::Google,
        provider_account_id: "user@example.com".to_string(),
        title: id.to_string(),
        description: None,
        location: None,
        start: EventTime::utc(start),
        end: EventTime::utc(start + chrono::Duration::hours(1)),
        recurring_event_id: None,
        recurrence: None,
        read_only: false,
        organizer: None,
        attendees: Vec::new(),
        response_status: None,
        conference_url: None,
        updated: None,
    }
}

fn input(title: &str, hour: u32, minutes: i64) -> EventInput {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap();
    EventInput {
        title: title.to_string(),
        description: None,
        location: None,
        start: EventTime::utc(start),
        end: EventTime::utc(start + chrono::Duration::minutes(minutes)),
        attendees: Vec::new(),
        recurrence: None,
    }
}

fn updated(e: CalendarEvent) -> CalendarEventSyncItem {
    CalendarEventSyncItem::Updated { event: e }
}

fn engine_with(client: ScriptedClient) -> SyncEngine<ScriptedClient> {
    let account = client.account_id().to_string();
    SyncEngine::new(HashMap::from([(account, client)]))
}

fn provider_error() -> SyncError {
    SyncError::Provider {
        provider: ProviderId::Google,
        account_id: "work".to_string(),
        operation: "test",
        status: Some(500),
        message: "boom".to_string(),
    }
}

#[tokio::test]
async fn create_shows_optimistically_then_commits_with_server_id() {
    let script = Arc::new(Mutex::new(Script {
        server_id: "srv-1".to_string(),
        ..Script::default()
    }));
    {
        let mut standup = event("srv-1", "cal1", 9);
        standup.title = "Standup".to_string();
        script.lock().unwrap().list.insert(
            "cal1".to_string(),
            EventPage {
                events: vec![standup],
                recurring_masters: Vec::new(),
            },
        );
    }
    let gate = Gate::new();
    let engine = Arc::new(engine_with(
        ScriptedClient::new(ProviderId::Google, script).gated("create", gate.clone()),
    ));

    let cal = calendar("cal1");
    let task = {
        let engine = engine.clone();
        let cal = cal.clone();
        tokio::spawn(async move {
            engine
                .coordinator("work")
                .unwrap()
                .create_event(&cal, input("Standup", 9, 15))
                .await
        })
    };

    // The remote call is paused; the projection already shows the event
    // under its local placeholder id.
    gate.wait_entered().await;
    let projected = engine.projected_events();
    assert_eq!(projected.len(), 1);
    assert_eq!(projected[0].title, "Standup");
    assert!(projected[0].id.starts_with("local-"));

    gate.open();
    let created = task.await.unwrap().unwrap();
    assert_eq!(created.id, "srv-1");

    let projected = engine.projected_events();
    assert_eq!(projected.len(), 1);
    assert_eq!(projected[0].id, "srv-1");

    // The refetch lands the confirmed event and sweeps the settled action.
    let listed = engine
        .list_events(&[cal], &DateRange::default(), Tz::UTC)
        .await
        .unwrap();
    assert_eq!(listed.events.len(), 1);
    assert_eq!(listed.events[0].id, "srv-1");
    assert_eq!(listed.events[0].title, "Standup");
    assert!(engine.store().is_empty());
    assert_eq!(engine.cache().len(), 1);
}

#[tokio::test]
async fn settled_create_survives_a_refetch_of_another_calendar() {
    let script = Arc::new(Mutex::new(Script {
        server_id: "srv-1".to_string(),
        ..Script::default()
    }));
    {
        let mut standup = event("srv-1", "cal1", 9);
        standup.title = "Standup".to_string();
        let mut s = script.lock().unwrap();
        s.list.insert(
            "cal1".to_string(),
            EventPage {
                events: vec![standup],
                recurring_masters: Vec::new(),
            },
        );
        s.list.insert("cal2".to_string(), EventPage::default());
    }
    let engine = engine_with(ScriptedClient::new(ProviderId::Google, script));
    let cal1 = calendar("cal1");

    engine
        .coordinator("work")
        .unwrap()
        .create_event(&cal1, input("Standup", 9, 15))
        .await
        .unwrap();
    assert_eq!(engine.projected_events().len(), 1);

    // cal2 commits fresh data, but cal1's confirmed copy of the created
    // event has not landed; the settled action must keep it visible.
    engine
        .list_events(&[calendar("cal2")], &DateRange::default(), Tz::UTC)
        .await
        .unwrap();
    let projected = engine.projected_events();
    assert_eq!(projected.len(), 1);
    assert_eq!(projected[0].id, "srv-1");

    // Only cal1's own refetch supersedes it.
    engine
        .list_events(&[cal1], &DateRange::default(), Tz::UTC)
        .await
        .unwrap();
    assert!(engine.store().is_empty());
    assert_eq!(engine.projected_events().len(), 1);
}

#[tokio::test]
async fn later_delete_wins_over_in_flight_update() {
    let script = Arc::new(Mutex::new(Script::default()));
    script.lock().unwrap().sync.push_back(Ok(SyncDelta {
        changes: vec![updated(event("e", "cal1", 9))],
        sync_token: Some("t1".to_string()),
    }));
    let gate = Gate::new();
    let engine = Arc::new(engine_with(
        ScriptedClient::new(ProviderId::Google, script).gated("update", gate.clone()),
    ));
    let cal = calendar("cal1");
    engine.sync_calendar(&cal, None, None, Tz::UTC).await.unwrap();

    let task = {
        let engine = engine.clone();
        let cal = cal.clone();
        tokio::spawn(async move {
            engine
                .coordinator("work")
                .unwrap()
                .update_event(&cal, "e", input("edited", 10, 60))
                .await
        })
    };
    gate.wait_entered().await;

    engine
        .coordinator("work")
        .unwrap()
        .delete_event(&cal, "e", false)
        .await
        .unwrap();

    let actions = engine.store().snapshot();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions.get("e"), Some(&OptimisticAction::Delete));
    assert!(engine.projected_events().is_empty());

    // The update settles late; the delete still wins.
    gate.open();
    task.await.unwrap().unwrap();
    let actions = engine.store().snapshot();
    assert_eq!(actions.get("e"), Some(&OptimisticAction::Delete));
    assert!(engine.projected_events().is_empty());
}

#[tokio::test]
async fn update_issued_after_a_dispatched_delete_stays_pending() {
    let script = Arc::new(Mutex::new(Script::default()));
    script.lock().unwrap().sync.push_back(Ok(SyncDelta {
        changes: vec![updated(event("e", "cal1", 9))],
        sync_token: None,
    }));
    let delete_gate = Gate::new();
    let update_gate = Gate::new();
    let engine = Arc::new(engine_with(
        ScriptedClient::new(ProviderId::Google, script)
            .gated("delete", delete_gate.clone())
            .gated("update", update_gate.clone()),
    ));
    let cal = calendar("cal1");
    engine.sync_calendar(&cal, None, None, Tz::UTC).await.unwrap();

    let delete_task = {
        let engine = engine.clone();
        let cal = cal.clone();
        tokio::spawn(async move {
            engine
                .coordinator("work")
                .unwrap()
                .delete_event(&cal, "e", false)
                .await
        })
    };
    delete_gate.wait_entered().await;

    let update_task = {
        let engine = engine.clone();
        let cal = cal.clone();
        tokio::spawn(async move {
            engine
                .coordinator("work")
                .unwrap()
                .update_event(&cal, "e", input("edited", 10, 60))
                .await
        })
    };
    update_gate.wait_entered().await;

    // The delete settles while the newer update is still in flight; it
    // must not settle the update's action on its way out.
    delete_gate.open();
    delete_task.await.unwrap().unwrap();

    // A refetch of the calendar commits, but the update stays pending.
    engine.sync_calendar(&cal, None, None, Tz::UTC).await.unwrap();
    let actions = engine.store().snapshot();
    assert!(matches!(actions.get("e"), Some(OptimisticAction::Update(_))));

    update_gate.open();
    update_task.await.unwrap().unwrap();
    let projected = engine.projected_events();
    assert_eq!(projected.len(), 1);
    assert_eq!(projected[0].title, "edited");
}

#[tokio::test]
async fn failed_mutation_rolls_back_the_projection() {
    let script = Arc::new(Mutex::new(Script::default()));
    script.lock().unwrap().sync.push_back(Ok(SyncDelta {
        changes: vec![updated(event("e", "cal1", 9)), updated(event("f", "cal1", 11))],
        sync_token: None,
    }));
    let engine = engine_with(ScriptedClient::new(ProviderId::Google, script.clone()));
    let cal = calendar("cal1");
    engine.sync_calendar(&cal, None, None, Tz::UTC).await.unwrap();

    let before = engine.projected_events();
    script.lock().unwrap().fail_mutation = Some(provider_error());

    let err = engine
        .coordinator("work")
        .unwrap()
        .update_event(&cal, "e", input("edited", 15, 60))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Provider { .. }));
    assert_eq!(engine.projected_events(), before);
    assert!(engine.store().is_empty());
}

#[tokio::test]
async fn token_expiry_falls_back_to_full_resync() {
    let script = Arc::new(Mutex::new(Script::default()));
    {
        let mut s = script.lock().unwrap();
        s.sync.push_back(Err(SyncError::SyncTokenExpired {
            provider: ProviderId::Google,
            account_id: "work".to_string(),
            calendar_id: "cal1".to_string(),
        }));
        s.sync.push_back(Ok(SyncDelta {
            changes: vec![updated(event("a", "cal1", 9))],
            sync_token: Some("t2".to_string()),
        }));
    }
    let engine = engine_with(ScriptedClient::new(ProviderId::Google, script));
    let cal = calendar("cal1");

    let outcome = engine
        .sync_calendar(&cal, Some("t1"), None, Tz::UTC)
        .await
        .unwrap();
    assert_eq!(outcome.status, SyncStatus::Full);
    assert_eq!(outcome.sync_token.as_deref(), Some("t2"));
    assert_eq!(engine.cache().len(), 1);
}

#[tokio::test]
async fn out_of_order_pages_sort_by_start_not_arrival() {
    let script = Arc::new(Mutex::new(Script::default()));
    {
        let mut s = script.lock().unwrap();
        s.list.insert(
            "cal1".to_string(),
            EventPage {
                events: vec![event("a", "cal1", 9)],
                recurring_masters: Vec::new(),
            },
        );
        s.list.insert(
            "cal2".to_string(),
            EventPage {
                events: vec![event("b", "cal2", 8)],
                recurring_masters: Vec::new(),
            },
        );
    }
    let engine = engine_with(ScriptedClient::new(ProviderId::Google, script));

    let listed = engine
        .list_events(
            &[calendar("cal1"), calendar("cal2")],
            &DateRange::default(),
            Tz::UTC,
        )
        .await
        .unwrap();
    let ids: Vec<&str> = listed.events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["b", "a"]);
}

#[tokio::test]
async fn delete_of_an_already_gone_event_is_success() {
    let script = Arc::new(Mutex::new(Script::default()));
    script.lock().unwrap().fail_mutation = Some(SyncError::NotFound {
        provider: ProviderId::Google,
        account_id: "work".to_string(),
        operation: "delete_event",
        resource: "e".to_string(),
    });
    let invalidator = Arc::new(RecordingInvalidator::default());
    let engine = engine_with(ScriptedClient::new(ProviderId::Google, script))
        .with_invalidator(invalidator.clone());
    let cal = calendar("cal1");

    engine
        .coordinator("work")
        .unwrap()
        .delete_event(&cal, "e", false)
        .await
        .unwrap();

    let scopes = invalidator.scopes.lock().unwrap();
    assert_eq!(scopes.as_slice(), [QueryScope::of(&cal)]);
}

#[tokio::test]
async fn move_keeps_one_stable_identity() {
    let script = Arc::new(Mutex::new(Script::default()));
    {
        let mut s = script.lock().unwrap();
        s.sync.push_back(Ok(SyncDelta {
            changes: vec![updated(event("e", "cal1", 9))],
            sync_token: None,
        }));
        s.events.insert("e".to_string(), event("e", "cal1", 9));
    }
    let engine = engine_with(ScriptedClient::new(ProviderId::Google, script));
    let source = calendar("cal1");
    let dest = calendar("cal2");
    engine.sync_calendar(&source, None, None, Tz::UTC).await.unwrap();

    let moved = engine
        .coordinator("work")
        .unwrap()
        .move_event(&source, &dest, "e", false)
        .await
        .unwrap();
    assert_eq!(moved.id, "e");
    assert_eq!(moved.calendar_id, "cal2");

    let projected = engine.projected_events();
    let matching: Vec<&CalendarEvent> = projected.iter().filter(|e| e.id == "e").collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].calendar_id, "cal2");
}

#[tokio::test]
async fn google_sync_expands_series_masters_and_graph_does_not() {
    let mut instance = event("inst", "cal1", 9);
    instance.recurring_event_id = Some("m1".to_string());

    for (provider, expected_changes) in [(ProviderId::Google, 2), (ProviderId::Microsoft, 1)] {
        let script = Arc::new(Mutex::new(Script::default()));
        {
            let mut s = script.lock().unwrap();
            s.sync.push_back(Ok(SyncDelta {
                changes: vec![updated(instance.clone())],
                sync_token: None,
            }));
            s.events.insert("m1".to_string(), event("m1", "cal1", 8));
        }
        let engine = engine_with(ScriptedClient::new(provider, script));

        let outcome = engine
            .sync_calendar(&calendar("cal1"), None, None, Tz::UTC)
            .await
            .unwrap();
        assert_eq!(outcome.changes.len(), expected_changes, "{provider}");
    }
}

#[tokio::test]
async fn unknown_account_is_a_config_error() {
    let script = Arc::new(Mutex::new(Script::default()));
    let engine = engine_with(ScriptedClient::new(ProviderId::Google, script));
    let err = engine.coordinator("nope").unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
}
