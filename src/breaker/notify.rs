//! Transition notices for alerting collaborators. Delivery is best effort
//! and at most once: a sink that cannot accept a notice drops it.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use super::{BreakerEvent, Category, Status};
use crate::logging::log_transition_dropped;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionNotice {
    pub category: Category,
    pub from: Status,
    pub to: Status,
    pub reason: &'static str,
    pub event: Option<BreakerEvent>,
    pub at: DateTime<Utc>,
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, notice: &TransitionNotice);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _notice: &TransitionNotice) {}
}

/// Keeps the most recent notices in memory.
#[derive(Debug)]
pub struct MemorySink {
    cap: usize,
    notices: Mutex<VecDeque<TransitionNotice>>,
}

impl MemorySink {
    pub fn new(cap: usize) -> Self {
        Self { cap: cap.max(1), notices: Mutex::new(VecDeque::new()) }
    }

    pub fn notices(&self) -> Vec<TransitionNotice> {
        self.notices.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.notices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.notices.lock().is_empty()
    }
}

impl NotificationSink for MemorySink {
    fn notify(&self, notice: &TransitionNotice) {
        let mut q = self.notices.lock();
        if q.len() >= self.cap {
            q.pop_front();
        }
        q.push_back(notice.clone());
    }
}

/// Forwards notices into a bounded tokio channel without waiting.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<TransitionNotice>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TransitionNotice>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notice: &TransitionNotice) {
        if let Err(err) = self.tx.try_send(notice.clone()) {
            let reason = match err {
                mpsc::error::TrySendError::Full(_) => "channel_full",
                mpsc::error::TrySendError::Closed(_) => "channel_closed",
            };
            log_transition_dropped(notice.category.as_str(), reason, "notice not delivered");
        }
    }
}

#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl NotificationSink for FanoutSink {
    fn notify(&self, notice: &TransitionNotice) {
        for sink in &self.sinks {
            sink.notify(notice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice(to: Status) -> TransitionNotice {
        TransitionNotice {
            category: Category::Downside,
            from: Status::Inactive,
            to,
            reason: "triggered",
            event: None,
            at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_memory_sink_bounded() {
        let sink = MemorySink::new(2);
        sink.notify(&notice(Status::Active));
        sink.notify(&notice(Status::PendingReset));
        sink.notify(&notice(Status::Inactive));
        let kept = sink.notices();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].to, Status::PendingReset);
    }

    #[test]
    fn test_channel_sink_drops_when_full() {
        let (sink, mut rx) = ChannelSink::new(1);
        sink.notify(&notice(Status::Active));
        sink.notify(&notice(Status::PendingReset));
        assert_eq!(rx.try_recv().unwrap().to, Status::Active);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_sink_survives_closed_receiver() {
        let (sink, rx) = ChannelSink::new(4);
        drop(rx);
        sink.notify(&notice(Status::Active));
    }

    #[test]
    fn test_fanout_reaches_all() {
        let a = Arc::new(MemorySink::new(8));
        let b = Arc::new(MemorySink::new(8));
        let fan = FanoutSink::new().with(a.clone()).with(b.clone());
        fan.notify(&notice(Status::Active));
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }
}
