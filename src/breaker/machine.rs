//! Transition rules for a single category. Pure state, no locking and no I/O;
//! the board serializes access and emits notifications.

use chrono::{DateTime, Utc};

use super::{BreakerEvent, Category, Decision, DecisionRecord, Status};

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Changed {
        from: Status,
        to: Status,
        reason: &'static str,
        /// Event responsible for the transition
        event: Option<BreakerEvent>,
    },
    Ignored(&'static str),
    Unchanged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryBreaker {
    pub category: Category,
    pub status: Status,
    pub event: Option<BreakerEvent>,
    pub status_since: DateTime<Utc>,
    pub pending_since: Option<DateTime<Utc>>,
    pub outcome: Option<DecisionRecord>,
}

impl CategoryBreaker {
    pub fn new(category: Category, now: DateTime<Utc>) -> Self {
        Self {
            category,
            status: Status::Inactive,
            event: None,
            status_since: now,
            pending_since: None,
            outcome: None,
        }
    }

    fn move_to(&mut self, to: Status, now: DateTime<Utc>, reason: &'static str) -> Transition {
        let from = self.status;
        self.status = to;
        if from != to {
            self.status_since = now;
        }
        self.pending_since = if to == Status::PendingReset { Some(now) } else { None };
        Transition::Changed { from, to, reason, event: self.event.clone() }
    }

    pub fn on_trigger(&mut self, event: BreakerEvent, now: DateTime<Utc>) -> Transition {
        match self.status {
            Status::Inactive => {
                self.event = Some(event);
                self.outcome = None;
                self.move_to(Status::Active, now, "triggered")
            }
            Status::Active | Status::PendingReset => {
                let current = self.event.as_ref().map(|e| e.severity).unwrap_or(0);
                if event.severity <= current {
                    return Transition::Ignored("no_downgrade");
                }
                self.event = Some(event);
                self.move_to(Status::Active, now, "severity_upgrade")
            }
        }
    }

    /// Active → PendingReset only when the minimum duration has elapsed AND
    /// the condition check reports cleared. An unknown condition holds.
    pub fn poll_decay<F>(&mut self, now: DateTime<Utc>, condition_cleared: F) -> Transition
    where
        F: FnOnce(&BreakerEvent) -> Option<bool>,
    {
        if self.status != Status::Active {
            return Transition::Unchanged;
        }
        let Some(event) = &self.event else {
            return Transition::Unchanged;
        };
        if !event.min_duration_elapsed(now) {
            return Transition::Unchanged;
        }
        if condition_cleared(event) != Some(true) {
            return Transition::Unchanged;
        }
        self.move_to(Status::PendingReset, now, "condition_cleared")
    }

    pub fn on_decision(&mut self, decision: Decision, by: &str, now: DateTime<Utc>) -> Transition {
        if self.status != Status::PendingReset {
            return Transition::Ignored("not_pending_reset");
        }
        self.outcome = Some(DecisionRecord { decision, by: by.to_string(), at: now });
        match decision {
            Decision::Accept => {
                let t = self.move_to(Status::Inactive, now, "accepted");
                self.event = None;
                t
            }
            Decision::Reject => {
                if let Some(event) = self.event.as_mut() {
                    event.activated_at = now;
                }
                self.move_to(Status::Active, now, "rejected")
            }
        }
    }

    pub fn active_event(&self) -> Option<&BreakerEvent> {
        if self.status.applies_override() {
            self.event.as_ref()
        } else {
            None
        }
    }
}
