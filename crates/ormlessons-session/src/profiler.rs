//! Statement profiling and anti-pattern alerts.
//!
//! A [`Profiler`] is shared by every session of a factory. Sessions report the
//! statements they issue and the suspicious patterns they notice; the profiler
//! logs each alert on target `ormlessons::alert` and keeps it so a test can
//! assert on it afterwards.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// A suspicious data-access pattern noticed at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum Alert {
    /// A collection was lazily loaded once per parent.
    SelectNPlusOne {
        session: u64,
        parent: &'static str,
        relationship: &'static str,
        loads: usize,
    },
    /// A query was run without a row limit.
    UnboundedResultSet {
        session: u64,
        entity: &'static str,
        rows: usize,
    },
    /// A flush needed more write statements than the configured threshold.
    LargeNumberOfWrites {
        session: u64,
        statements: usize,
        threshold: usize,
    },
    /// More than one session was opened while serving one request.
    MultipleSessionsPerRequest { sessions: usize },
    /// A unit of work went out of scope without commit or rollback.
    ImplicitRollback { session: u64 },
}

/// Discriminant of [`Alert`], for assertions that do not care about details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
    SelectNPlusOne,
    UnboundedResultSet,
    LargeNumberOfWrites,
    MultipleSessionsPerRequest,
    ImplicitRollback,
}

impl Alert {
    pub fn kind(&self) -> AlertKind {
        match self {
            Alert::SelectNPlusOne { .. } => AlertKind::SelectNPlusOne,
            Alert::UnboundedResultSet { .. } => AlertKind::UnboundedResultSet,
            Alert::LargeNumberOfWrites { .. } => AlertKind::LargeNumberOfWrites,
            Alert::MultipleSessionsPerRequest { .. } => AlertKind::MultipleSessionsPerRequest,
            Alert::ImplicitRollback { .. } => AlertKind::ImplicitRollback,
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alert::SelectNPlusOne {
                parent,
                relationship,
                loads,
                ..
            } => write!(
                f,
                "SELECT N+1: {parent}.{relationship} lazily loaded {loads} times"
            ),
            Alert::UnboundedResultSet { entity, rows, .. } => {
                write!(f, "unbounded result set: {rows} {entity} rows without a limit")
            }
            Alert::LargeNumberOfWrites {
                statements,
                threshold,
                ..
            } => write!(
                f,
                "large number of individual writes: {statements} statements (threshold {threshold})"
            ),
            Alert::MultipleSessionsPerRequest { sessions } => {
                write!(f, "{sessions} sessions opened in one request")
            }
            Alert::ImplicitRollback { .. } => {
                write!(f, "unit of work released without commit; rolled back")
            }
        }
    }
}

#[derive(Debug, Default)]
struct ProfilerState {
    alerts: Vec<Alert>,
    statements: usize,
    /// Sessions opened in the current request, when one is active
    request_sessions: Option<usize>,
}

/// Collects statements and alerts across the sessions of one factory.
#[derive(Debug, Default)]
pub struct Profiler {
    state: Mutex<ProfilerState>,
    next_session: AtomicU64,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared state, recovered if a holder panicked.
    ///
    /// Unlike the session's locks this one never maps poisoning to
    /// `Error::poisoned`: alerts are raised from `Drop` impls
    /// (`UnitOfWork`, `RequestScope`) that have no way to return an error,
    /// and every field stays consistent after a partial update.
    fn state(&self) -> MutexGuard<'_, ProfilerState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register a newly opened session and return its id.
    pub(crate) fn session_opened(&self) -> u64 {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        let raise = {
            let mut state = self.state();
            match state.request_sessions.as_mut() {
                Some(count) => {
                    *count += 1;
                    (*count == 2).then_some(*count)
                }
                None => None,
            }
        };
        if let Some(sessions) = raise {
            self.raise(Alert::MultipleSessionsPerRequest { sessions });
        }
        id
    }

    pub(crate) fn statement_issued(&self) {
        self.state().statements += 1;
    }

    /// Record and log an alert.
    pub fn raise(&self, alert: Alert) {
        tracing::warn!(target: "ormlessons::alert", kind = ?alert.kind(), "{alert}");
        self.state().alerts.push(alert);
    }

    /// Every alert raised so far.
    pub fn alerts(&self) -> Vec<Alert> {
        self.state().alerts.clone()
    }

    pub fn has_alert(&self, kind: AlertKind) -> bool {
        self.state().alerts.iter().any(|a| a.kind() == kind)
    }

    pub fn alert_count(&self, kind: AlertKind) -> usize {
        self.state()
            .alerts
            .iter()
            .filter(|a| a.kind() == kind)
            .count()
    }

    /// Statements issued by all sessions.
    pub fn statement_count(&self) -> usize {
        self.state().statements
    }

    /// Forget alerts and counters.
    pub fn reset(&self) {
        let mut state = self.state();
        state.alerts.clear();
        state.statements = 0;
    }

    fn begin_request(&self) {
        self.state().request_sessions = Some(0);
    }

    fn end_request(&self) -> usize {
        self.state().request_sessions.take().unwrap_or(0)
    }
}

/// One logical request (a web request, a message handled).
///
/// Counts the sessions opened while it is alive; a second session raises
/// [`Alert::MultipleSessionsPerRequest`].
#[must_use = "the request ends when the scope is dropped"]
pub struct RequestScope {
    profiler: Arc<Profiler>,
}

impl RequestScope {
    pub(crate) fn new(profiler: Arc<Profiler>) -> Self {
        profiler.begin_request();
        tracing::debug!("request started");
        Self { profiler }
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        let sessions = self.profiler.end_request();
        tracing::debug!(sessions, "request finished");
    }
}

impl fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope").finish_non_exhaustive()
    }
}
