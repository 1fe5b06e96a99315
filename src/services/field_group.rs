use serde::Serialize;

/// Resolution state of one per-station field group (flow, snowpack, reservoirs, weather).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldState {
    #[default]
    Unresolved,
    /// A fetch is in flight and no value has arrived yet.
    Pending,
    Resolved,
    /// A value is present but a newer fetch is still in flight.
    ResolvedStale,
    /// The last fetch failed and no value was ever resolved.
    Failed,
}

/// Monotonic id handed to each fetch issued for a field group.
pub type Ticket = u64;

/// A field value guarded by issue/settle tickets.
///
/// Responses can come back out of order across overlapping refreshes. A response
/// is only applied when its ticket is newer than the last one settled, so an old
/// request finishing late never overwrites a fresher value.
#[derive(Debug, Clone)]
pub struct FieldGroup<T> {
    value: Option<T>,
    issued: Ticket,
    settled: Ticket,
    last_error: Option<String>,
}

impl<T> Default for FieldGroup<T> {
    fn default() -> Self {
        Self {
            value: None,
            issued: 0,
            settled: 0,
            last_error: None,
        }
    }
}

impl<T> FieldGroup<T> {
    pub fn issue(&mut self) -> Ticket {
        self.issued += 1;
        self.issued
    }

    /// Stores `value` for `ticket`; returns false when the response is superseded.
    pub fn apply(&mut self, ticket: Ticket, value: T) -> bool {
        if !self.accepts(ticket) {
            return false;
        }
        self.value = Some(value);
        self.settled = ticket;
        self.last_error = None;
        true
    }

    /// Settles `ticket` without a value; any earlier value is kept.
    pub fn fail(&mut self, ticket: Ticket, error: impl Into<String>) -> bool {
        if !self.accepts(ticket) {
            return false;
        }
        self.settled = ticket;
        self.last_error = Some(error.into());
        true
    }

    fn accepts(&self, ticket: Ticket) -> bool {
        ticket > self.settled && ticket <= self.issued
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Error of the most recent settled fetch, cleared by the next success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn in_flight(&self) -> bool {
        self.issued > self.settled
    }

    pub fn state(&self) -> FieldState {
        match (self.value.is_some(), self.in_flight()) {
            (false, false) if self.last_error.is_some() => FieldState::Failed,
            (false, false) => FieldState::Unresolved,
            (false, true) => FieldState::Pending,
            (true, false) => FieldState::Resolved,
            (true, true) => FieldState::ResolvedStale,
        }
    }
}
