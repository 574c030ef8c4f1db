use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use shared::{
    domain::{DateAnchor, HotelId, RoomTypeId},
    protocol::{
        HotelReservation, HotelRoomTypeNode, RoomTypePage, RoomTypesQuery,
        SaveHotelReservationPayload, SaveHotelReservationVariables,
    },
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub mod draft;
pub mod graphql;
pub mod session;

pub use draft::{DraftError, DraftReservation, ValidationMode};
pub use graphql::{GraphQlClient, GraphQlError};
pub use session::{
    FileSessionStore, MemorySessionStore, SessionContext, SessionError, SessionStore,
    SessionUser,
};

pub const RESERVATION_SAVED_TITLE: &str = "Reservation";
pub const RESERVATION_SAVED_BODY: &str = "Reservation saved!";
pub const ERROR_TITLE: &str = "Error";
pub const TRANSPORT_FAILURE_BODY: &str = "Something went wrong, please try again.";

#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn list_room_types(&self, query: RoomTypesQuery) -> Result<RoomTypePage>;
}

#[async_trait]
pub trait ReservationApi: Send + Sync {
    async fn save_reservation(
        &self,
        variables: SaveHotelReservationVariables,
    ) -> Result<SaveHotelReservationPayload>;
}

/// Fire-and-forget screen navigation.
pub trait NavigationService: Send + Sync {
    fn go_back(&self);
    fn navigate(&self, route: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Error,
}

/// A transient message for the user (a toast on mobile).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn success(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            title: title.into(),
            body: body.into(),
        }
    }

    pub fn error(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            title: title.into(),
            body: body.into(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Navigation used when no screen stack is attached; requests are only logged.
pub struct DetachedNavigation;

impl NavigationService for DetachedNavigation {
    fn go_back(&self) {
        info!("navigation: go_back requested with no navigator attached");
    }

    fn navigate(&self, route: &str) {
        info!("navigation: navigate route={route} requested with no navigator attached");
    }
}

pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Success => {
                info!("notify: {} - {}", notification.title, notification.body)
            }
            NotificationLevel::Error => {
                warn!("notify: {} - {}", notification.title, notification.body)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomTypeOption {
    pub id: RoomTypeId,
    pub name: String,
}

impl RoomTypeOption {
    /// Name with its first letter upper-cased, as shown in room type pickers.
    pub fn display_name(&self) -> String {
        let mut chars = self.name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl From<HotelRoomTypeNode> for RoomTypeOption {
    fn from(node: HotelRoomTypeNode) -> Self {
        Self {
            id: node.id,
            name: node.room_type.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CatalogState {
    #[default]
    NotLoaded,
    Loading,
    Loaded(Vec<RoomTypeOption>),
    Failed {
        message: String,
    },
}

impl CatalogState {
    /// Room types to offer; empty unless the catalog loaded.
    pub fn options(&self) -> &[RoomTypeOption] {
        match self {
            Self::Loaded(options) => options,
            _ => &[],
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { message } => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionResult {
    ValidationError { message: String },
    Success { reservation: HotelReservation },
    TransportFailure { cause: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Completed(SubmissionResult),
    /// A submission is already in flight; nothing was sent.
    Busy,
    /// The workflow was disposed or already booked; nothing was sent, or the
    /// late response was dropped.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    Idle,
    Editing,
    Submitting,
    Completed,
    Disposed,
}

impl WorkflowPhase {
    fn accepts_edits(self) -> bool {
        matches!(self, Self::Idle | Self::Editing | Self::Submitting)
    }
}

#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    PhaseChanged(WorkflowPhase),
    DraftUpdated(DraftReservation),
    CatalogUpdated(CatalogState),
}

#[derive(Debug, Clone, Default)]
pub struct WorkflowOptions {
    pub validation: ValidationMode,
    pub max_party_size: Option<u32>,
    pub submit_timeout: Option<Duration>,
    /// Route to open after a successful booking instead of going back.
    pub return_route: Option<String>,
}

pub struct WorkflowDependencies {
    pub catalog: Arc<dyn CatalogApi>,
    pub reservations: Arc<dyn ReservationApi>,
    pub navigation: Arc<dyn NavigationService>,
    pub notifier: Arc<dyn Notifier>,
}

impl WorkflowDependencies {
    pub fn from_api<A>(api: Arc<A>) -> Self
    where
        A: CatalogApi + ReservationApi + 'static,
    {
        Self {
            catalog: api.clone(),
            reservations: api,
            navigation: Arc::new(DetachedNavigation),
            notifier: Arc::new(TracingNotifier),
        }
    }
}

struct WorkflowState {
    draft: DraftReservation,
    phase: WorkflowPhase,
    catalog: CatalogState,
}

/// Clears the in-flight flag when dropped, whichever way submit returns.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// One booking session for one hotel: owns the draft, loads the room type
/// catalog and submits the reservation at most once at a time.
pub struct ReservationWorkflow {
    session_id: Uuid,
    hotel_id: HotelId,
    session: SessionContext,
    options: WorkflowOptions,
    catalog_api: Arc<dyn CatalogApi>,
    reservation_api: Arc<dyn ReservationApi>,
    navigation: Arc<dyn NavigationService>,
    notifier: Arc<dyn Notifier>,
    inner: Mutex<WorkflowState>,
    in_flight: AtomicBool,
    disposed: AtomicBool,
    events: broadcast::Sender<WorkflowEvent>,
}

impl ReservationWorkflow {
    pub fn new<A>(hotel_id: HotelId, session: SessionContext, api: Arc<A>) -> Arc<Self>
    where
        A: CatalogApi + ReservationApi + 'static,
    {
        Self::new_with_dependencies(
            hotel_id,
            session,
            WorkflowDependencies::from_api(api),
            WorkflowOptions::default(),
        )
    }

    pub fn new_with_dependencies(
        hotel_id: HotelId,
        session: SessionContext,
        dependencies: WorkflowDependencies,
        options: WorkflowOptions,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let session_id = Uuid::new_v4();
        info!(
            "workflow: session={session_id} opened hotel={hotel_id} user={}",
            session.user_id
        );
        Arc::new(Self {
            session_id,
            hotel_id: hotel_id.clone(),
            options,
            catalog_api: dependencies.catalog,
            reservation_api: dependencies.reservations,
            navigation: dependencies.navigation,
            notifier: dependencies.notifier,
            inner: Mutex::new(WorkflowState {
                draft: DraftReservation::new(hotel_id, session.user_id.clone()),
                phase: WorkflowPhase::Idle,
                catalog: CatalogState::NotLoaded,
            }),
            session,
            in_flight: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            events,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn hotel_id(&self) -> &HotelId {
        &self.hotel_id
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    pub async fn draft(&self) -> DraftReservation {
        self.inner.lock().await.draft.clone()
    }

    pub async fn phase(&self) -> WorkflowPhase {
        self.inner.lock().await.phase
    }

    pub async fn catalog(&self) -> CatalogState {
        self.inner.lock().await.catalog.clone()
    }

    /// Fetches the room type catalog once per session. Failures are reported
    /// as `CatalogState::Failed` and can be retried by calling again.
    pub async fn load_room_types(&self) -> CatalogState {
        {
            let mut guard = self.inner.lock().await;
            if self.is_disposed() {
                return guard.catalog.clone();
            }
            match &guard.catalog {
                CatalogState::Loaded(_) | CatalogState::Loading => return guard.catalog.clone(),
                CatalogState::NotLoaded | CatalogState::Failed { .. } => {}
            }
            guard.catalog = CatalogState::Loading;
            let _ = self
                .events
                .send(WorkflowEvent::CatalogUpdated(CatalogState::Loading));
        }

        // The catalog is fetched unfiltered; hotels with large catalogs would
        // need `filter.hotel_id` and paging here.
        debug!(
            "workflow: session={} fetching room type catalog hotel={}",
            self.session_id, self.hotel_id
        );
        let state = match self
            .catalog_api
            .list_room_types(RoomTypesQuery::default())
            .await
        {
            Ok(page) => {
                let options = page
                    .items
                    .into_iter()
                    .map(RoomTypeOption::from)
                    .collect::<Vec<_>>();
                info!(
                    "workflow: session={} catalog loaded room_types={}",
                    self.session_id,
                    options.len()
                );
                CatalogState::Loaded(options)
            }
            Err(err) => {
                warn!(
                    "workflow: session={} catalog fetch failed: {err:#}",
                    self.session_id
                );
                CatalogState::Failed {
                    message: err.to_string(),
                }
            }
        };

        let mut guard = self.inner.lock().await;
        if self.is_disposed() {
            debug!(
                "workflow: session={} dropping catalog response after dispose",
                self.session_id
            );
            return state;
        }
        guard.catalog = state.clone();
        let _ = self
            .events
            .send(WorkflowEvent::CatalogUpdated(state.clone()));
        state
    }

    /// Returns whether the selection changed. The id is not checked against
    /// the catalog.
    pub async fn select_room_type(&self, room_type_id: RoomTypeId) -> bool {
        self.edit_draft(|draft| {
            let changed = draft.select_room_type(room_type_id);
            (changed, changed)
        })
        .await
        .unwrap_or(false)
    }

    pub async fn set_date_range(&self, anchor: DateAnchor, date: NaiveDate) -> bool {
        self.edit_draft(|draft| {
            let changed = draft.set_date(anchor, date);
            (changed, changed)
        })
        .await
        .unwrap_or(false)
    }

    /// Returns the party size after the adjustment.
    pub async fn adjust_party_size(&self, delta: i32) -> u32 {
        match self
            .edit_draft(|draft| {
                let before = draft.party_size();
                let after = draft.adjust_party_size(delta);
                (after, after != before)
            })
            .await
        {
            Some(size) => size,
            None => self.inner.lock().await.draft.party_size(),
        }
    }

    async fn edit_draft<R>(
        &self,
        apply: impl FnOnce(&mut DraftReservation) -> (R, bool),
    ) -> Option<R> {
        let mut guard = self.inner.lock().await;
        if self.is_disposed() || !guard.phase.accepts_edits() {
            debug!(
                "workflow: session={} ignoring edit in phase {:?}",
                self.session_id, guard.phase
            );
            return None;
        }

        let (value, changed) = apply(&mut guard.draft);
        if changed {
            if guard.phase == WorkflowPhase::Idle {
                guard.phase = WorkflowPhase::Editing;
                let _ = self
                    .events
                    .send(WorkflowEvent::PhaseChanged(WorkflowPhase::Editing));
            }
            let _ = self
                .events
                .send(WorkflowEvent::DraftUpdated(guard.draft.clone()));
        }
        Some(value)
    }

    /// Sends the draft as a reservation. At most one submission is in flight;
    /// a call made meanwhile returns `Busy` without touching the network.
    pub async fn submit(&self) -> SubmitOutcome {
        if self.is_disposed() {
            return SubmitOutcome::Closed;
        }
        let Some(_in_flight) = InFlightGuard::acquire(&self.in_flight) else {
            debug!(
                "workflow: session={} submit ignored, request already in flight",
                self.session_id
            );
            return SubmitOutcome::Busy;
        };

        let variables = {
            let mut guard = self.inner.lock().await;
            if !matches!(guard.phase, WorkflowPhase::Idle | WorkflowPhase::Editing) {
                return SubmitOutcome::Closed;
            }
            if self.options.validation == ValidationMode::Local {
                let validation = guard.draft.validate(self.options.max_party_size);
                if let Err(err) = validation {
                    drop(guard);
                    info!(
                        "workflow: session={} submit rejected locally: {err}",
                        self.session_id
                    );
                    let message = err.to_string();
                    self.notifier
                        .notify(Notification::error(ERROR_TITLE, message.clone()));
                    return SubmitOutcome::Completed(SubmissionResult::ValidationError { message });
                }
            }
            guard.phase = WorkflowPhase::Submitting;
            let _ = self
                .events
                .send(WorkflowEvent::PhaseChanged(WorkflowPhase::Submitting));
            guard.draft.to_variables()
        };

        info!(
            "workflow: session={} submitting reservation hotel={} room_type={} nb_persons={}",
            self.session_id,
            variables.hotel_id,
            variables
                .hotel_room_type_id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "none".to_string()),
            variables.nb_persons
        );

        let response = self.dispatch(variables).await;
        let result = match response {
            Ok(SaveHotelReservationPayload::InputError { message }) => {
                SubmissionResult::ValidationError { message }
            }
            Ok(SaveHotelReservationPayload::HotelReservation(reservation)) => {
                SubmissionResult::Success { reservation }
            }
            Err(err) => SubmissionResult::TransportFailure {
                cause: format!("{err:#}"),
            },
        };

        if !self.finish_submission(&result).await {
            info!(
                "workflow: session={} dropping reservation response after dispose",
                self.session_id
            );
            return SubmitOutcome::Closed;
        }
        SubmitOutcome::Completed(result)
    }

    async fn dispatch(
        &self,
        variables: SaveHotelReservationVariables,
    ) -> Result<SaveHotelReservationPayload> {
        let request = self.reservation_api.save_reservation(variables);
        match self.options.submit_timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .unwrap_or_else(|_| {
                    Err(anyhow!(
                        "reservation request timed out after {}ms",
                        limit.as_millis()
                    ))
                }),
            None => request.await,
        }
    }

    /// Applies a response to the session. Returns `false`, touching nothing,
    /// once the workflow is disposed. Notification and navigation happen
    /// under the state lock.
    async fn finish_submission(&self, result: &SubmissionResult) -> bool {
        let mut guard = self.inner.lock().await;
        if self.is_disposed() {
            return false;
        }

        let phase = match result {
            SubmissionResult::Success { .. } => WorkflowPhase::Completed,
            SubmissionResult::ValidationError { .. } | SubmissionResult::TransportFailure { .. } => {
                WorkflowPhase::Editing
            }
        };
        guard.phase = phase;
        let _ = self.events.send(WorkflowEvent::PhaseChanged(phase));

        match result {
            SubmissionResult::Success { reservation } => {
                info!(
                    "workflow: session={} reservation saved id={}",
                    self.session_id, reservation.id
                );
                self.notifier.notify(Notification::success(
                    RESERVATION_SAVED_TITLE,
                    RESERVATION_SAVED_BODY,
                ));
                match &self.options.return_route {
                    Some(route) => self.navigation.navigate(route),
                    None => self.navigation.go_back(),
                }
            }
            SubmissionResult::ValidationError { message } => {
                warn!(
                    "workflow: session={} reservation rejected: {message}",
                    self.session_id
                );
                self.notifier
                    .notify(Notification::error(ERROR_TITLE, message.clone()));
            }
            SubmissionResult::TransportFailure { cause } => {
                error!(
                    "workflow: session={} reservation request failed: {cause}",
                    self.session_id
                );
                self.notifier
                    .notify(Notification::error(ERROR_TITLE, TRANSPORT_FAILURE_BODY));
            }
        }
        true
    }

    /// Tears the session down. Later edits are ignored and responses that
    /// arrive afterwards are dropped.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        {
            let mut guard = self.inner.lock().await;
            guard.phase = WorkflowPhase::Disposed;
        }
        info!("workflow: session={} disposed", self.session_id);
        let _ = self
            .events
            .send(WorkflowEvent::PhaseChanged(WorkflowPhase::Disposed));
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
