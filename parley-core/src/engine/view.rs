//! Borrowed intent view and its release ticket.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Process-unique session id, used to reject tickets from other sessions.
pub(crate) fn next_session_id() -> u64 {
    NEXT_SESSION.fetch_add(1, Ordering::Relaxed)
}

/// Proof that an [`IntentView`] was handed out. Pass it back to
/// `Engine::release` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseTicket {
    pub(crate) session: u64,
    pub(crate) serial: u64,
}

/// Read-only view of an understood result.
///
/// The strings live in the session; the view only borrows them. Turning the
/// view into its ticket ends the borrow, after which the session must be told
/// to release the result.
#[derive(Debug)]
pub struct IntentView<'a> {
    pub(crate) intent: &'a str,
    pub(crate) slots: &'a [String],
    pub(crate) values: &'a [String],
    pub(crate) confidence: f32,
    pub(crate) ticket: ReleaseTicket,
}

impl<'a> IntentView<'a> {
    pub fn intent(&self) -> &'a str {
        self.intent
    }

    /// Filled slot names in the intent's declared order.
    pub fn slots(&self) -> &'a [String] {
        self.slots
    }

    /// Canonical values, parallel to [`slots`](Self::slots).
    pub fn values(&self) -> &'a [String] {
        self.values
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.slots
            .iter()
            .zip(self.values)
            .map(|(s, v)| (s.as_str(), v.as_str()))
    }

    /// Give up the view.
    pub fn into_ticket(self) -> ReleaseTicket {
        self.ticket
    }
}
