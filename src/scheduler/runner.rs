//! Expiry scheduler loop.
//!
//! Every tick the scheduler scans the mirror for records whose expiry has
//! passed, delivers each one and, only after a successful send, asks the
//! mirror to delete it. A failed send leaves the record for the next tick;
//! a failed delete after a successful send means it is delivered again.

use crate::delivery::{DeliveryChannel, code_block};
use crate::mirror::Mirror;
use crate::records::{Poll, RecordKey, RecordKind, Reminder, now_epoch_secs};
use crate::scheduler::render::{render_poll_results, render_reminder};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default interval between scheduler ticks.
const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Records due for delivery at a given instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpiredRecords {
    pub polls: Vec<Poll>,
    pub reminders: Vec<Reminder>,
}

impl ExpiredRecords {
    pub fn is_empty(&self) -> bool {
        self.polls.is_empty() && self.reminders.is_empty()
    }
}

/// Select every record with `expiry <= now`.
pub fn collect_expired(
    polls: HashMap<String, Poll>,
    reminders: HashMap<String, Reminder>,
    now: i64,
) -> ExpiredRecords {
    ExpiredRecords {
        polls: polls.into_values().filter(|p| p.is_expired(now)).collect(),
        reminders: reminders
            .into_values()
            .filter(|r| r.is_expired(now))
            .collect(),
    }
}

/// Outcome counts for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Periodic delivery loop over the mirror.
pub struct ExpiryScheduler {
    mirror: Arc<Mirror>,
    delivery: Arc<dyn DeliveryChannel>,
    tick_interval: Duration,
}

impl ExpiryScheduler {
    pub fn new(mirror: Arc<Mirror>, delivery: Arc<dyn DeliveryChannel>) -> Self {
        Self {
            mirror,
            delivery,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }

    /// Override the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Run one scan as if the current time were `now`.
    pub async fn tick_at(&self, now: i64) -> TickReport {
        let expired = collect_expired(self.mirror.list_polls(), self.mirror.list_reminders(), now);
        let mut report = TickReport::default();
        if expired.is_empty() {
            return report;
        }

        for poll in &expired.polls {
            info!(poll_id = %poll.id, channel = %poll.channel, "sending poll results");
            let key = RecordKey::new(RecordKind::Poll, &poll.id);
            let text = code_block(&render_poll_results(poll));
            self.deliver(&key, &poll.channel, &text, &mut report).await;
        }

        for reminder in &expired.reminders {
            info!(reminder_id = %reminder.id, channel = %reminder.channel, "sending reminder");
            let key = RecordKey::new(RecordKind::Reminder, &reminder.id);
            let text = code_block(&render_reminder(reminder));
            self.deliver(&key, &reminder.channel, &text, &mut report).await;
        }

        debug!(
            delivered = report.delivered,
            failed = report.failed,
            "scheduler tick finished"
        );
        report
    }

    async fn deliver(&self, key: &RecordKey, channel: &str, text: &str, report: &mut TickReport) {
        match self.delivery.send(channel, text).await {
            Ok(()) => {
                report.delivered += 1;
                self.mirror.delete(&key.to_string()).await;
            }
            Err(e) => {
                report.failed += 1;
                warn!(%key, error = %e, "delivery failed; will retry on the next tick");
            }
        }
    }

    /// Tick until `cancel` fires.
    ///
    /// Cancellation is observed while waiting for the next tick; a tick in
    /// progress runs to completion.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            interval_ms = self.tick_interval.as_millis() as u64,
            "expiry scheduler started"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("expiry scheduler stopped");
                    return;
                }
                _ = tokio::time::sleep(self.tick_interval) => {
                    self.tick_at(now_epoch_secs()).await;
                }
            }
        }
    }

    /// Spawn [`run`](Self::run) as a background task.
    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
