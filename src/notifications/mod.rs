// ============================================================================
// Notification Fan-out
// ============================================================================
//
// One order event goes to every channel that cares about it. Each channel
// runs in its own task: the request that produced the event never waits for
// it, and a slow or failing channel cannot affect another one. Every result
// ends up in `OutcomeReporter` (log line + metrics), and nowhere else.
//
// ============================================================================

mod email;
mod events;
mod push;
mod websocket;
mod whatsapp;

#[cfg(test)]
pub(crate) mod testing;

pub use email::EmailChannel;
pub use events::*;
pub use push::PushChannel;
pub use websocket::WebsocketChannel;
pub use whatsapp::WhatsAppChannel;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::metrics::Metrics;

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelOutcome {
    Sent { messages: usize },
    /// A precondition was not met (no phone, no token, nobody listening).
    Skipped(String),
    Failed(String),
}

impl ChannelOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ChannelOutcome::Sent { .. } => "sent",
            ChannelOutcome::Skipped(_) => "skipped",
            ChannelOutcome::Failed(_) => "failed",
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        ChannelOutcome::Skipped(reason.into())
    }

    /// Folds the results of several independent sends on one channel.
    pub fn from_results(results: Vec<Result<(), String>>) -> Self {
        let total = results.len();
        let errors: Vec<String> = results.into_iter().filter_map(Result::err).collect();

        if total == 0 {
            ChannelOutcome::skipped("no recipients")
        } else if errors.is_empty() {
            ChannelOutcome::Sent { messages: total }
        } else {
            ChannelOutcome::Failed(format!(
                "{} of {} messages failed: {}",
                errors.len(),
                total,
                errors.join("; ")
            ))
        }
    }
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    fn handles(&self, kind: NotificationKind) -> bool;

    /// Never panics or errors past this boundary; failures are outcomes.
    async fn deliver(&self, notification: &OrderNotification) -> ChannelOutcome;
}

#[derive(Debug, Clone)]
pub struct ChannelReport {
    pub channel: &'static str,
    pub event: NotificationKind,
    pub order_id: Uuid,
    pub outcome: ChannelOutcome,
    pub elapsed: Duration,
}

/// The single place channel results are observed.
#[derive(Clone, Default)]
pub struct OutcomeReporter {
    metrics: Option<Arc<Metrics>>,
    observer: Option<mpsc::UnboundedSender<ChannelReport>>,
}

impl OutcomeReporter {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics: Some(metrics),
            observer: None,
        }
    }

    /// Also forward every report to `observer`.
    pub fn with_observer(mut self, observer: mpsc::UnboundedSender<ChannelReport>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn report(&self, report: ChannelReport) {
        let elapsed_ms = report.elapsed.as_millis() as u64;
        match &report.outcome {
            ChannelOutcome::Sent { messages } => tracing::info!(
                channel = report.channel,
                event = report.event.as_str(),
                order_id = %report.order_id,
                messages = *messages,
                elapsed_ms,
                "Notification sent"
            ),
            ChannelOutcome::Skipped(reason) => tracing::info!(
                channel = report.channel,
                event = report.event.as_str(),
                order_id = %report.order_id,
                reason = %reason,
                "Notification skipped"
            ),
            ChannelOutcome::Failed(error) => tracing::warn!(
                channel = report.channel,
                event = report.event.as_str(),
                order_id = %report.order_id,
                error = %error,
                elapsed_ms,
                "Notification failed"
            ),
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_notification(
                report.channel,
                report.event.as_str(),
                report.outcome.label(),
                report.elapsed.as_secs_f64(),
            );
        }

        if let Some(observer) = &self.observer {
            let _ = observer.send(report);
        }
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    channels: Vec<Arc<dyn NotificationChannel>>,
    reporter: OutcomeReporter,
}

impl NotificationDispatcher {
    pub fn new(reporter: OutcomeReporter) -> Self {
        Self {
            channels: Vec::new(),
            reporter,
        }
    }

    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Launches one task per interested channel and returns how many were
    /// launched. Does not wait for any of them.
    pub fn dispatch(&self, notification: OrderNotification) -> usize {
        let kind = notification.kind();
        let order_id = notification.order().id;
        let notification = Arc::new(notification);
        let mut launched = 0;

        for channel in self.channels.iter().filter(|c| c.handles(kind)) {
            let channel = Arc::clone(channel);
            let notification = Arc::clone(&notification);
            let reporter = self.reporter.clone();

            tokio::spawn(async move {
                let started = Instant::now();
                let outcome = channel.deliver(&notification).await;
                reporter.report(ChannelReport {
                    channel: channel.name(),
                    event: kind,
                    order_id,
                    outcome,
                    elapsed: started.elapsed(),
                });
            });
            launched += 1;
        }

        tracing::debug!(
            event = kind.as_str(),
            order_id = %order_id,
            channels = launched,
            "Notification fan-out launched"
        );
        launched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::testing::{collect_reports, sample_order};
    use crate::models::{Role, User};

    struct SlowChannel;

    #[async_trait]
    impl NotificationChannel for SlowChannel {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn handles(&self, _kind: NotificationKind) -> bool {
            true
        }

        async fn deliver(&self, _notification: &OrderNotification) -> ChannelOutcome {
            tokio::time::sleep(Duration::from_millis(200)).await;
            ChannelOutcome::Sent { messages: 1 }
        }
    }

    struct BrokenChannel;

    #[async_trait]
    impl NotificationChannel for BrokenChannel {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn handles(&self, kind: NotificationKind) -> bool {
            kind == NotificationKind::OrderCreated
        }

        async fn deliver(&self, _notification: &OrderNotification) -> ChannelOutcome {
            ChannelOutcome::Failed("provider outage".into())
        }
    }

    fn created() -> OrderNotification {
        OrderNotification::Created {
            order: sample_order(),
            customer: User::new("Ana", "ana@example.com", Role::Customer),
        }
    }

    #[tokio::test]
    async fn test_dispatch_returns_before_channels_finish() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = NotificationDispatcher::new(OutcomeReporter::default().with_observer(tx))
            .with_channel(Arc::new(SlowChannel))
            .with_channel(Arc::new(BrokenChannel));

        let started = Instant::now();
        assert_eq!(dispatcher.dispatch(created()), 2);
        assert!(started.elapsed() < Duration::from_millis(100));

        let reports = collect_reports(&mut rx, 2).await;
        let broken = reports.iter().find(|r| r.channel == "broken").unwrap();
        let slow = reports.iter().find(|r| r.channel == "slow").unwrap();
        assert_eq!(broken.outcome.label(), "failed");
        assert_eq!(slow.outcome, ChannelOutcome::Sent { messages: 1 });
    }

    #[tokio::test]
    async fn test_only_interested_channels_run() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = NotificationDispatcher::new(OutcomeReporter::default().with_observer(tx))
            .with_channel(Arc::new(SlowChannel))
            .with_channel(Arc::new(BrokenChannel));

        let notification = OrderNotification::Assigned {
            order: sample_order(),
            seller: User::new("Luis", "luis@example.com", Role::Seller),
        };
        assert_eq!(dispatcher.dispatch(notification), 1);

        let reports = collect_reports(&mut rx, 1).await;
        assert_eq!(reports[0].channel, "slow");
        assert_eq!(reports[0].event, NotificationKind::OrderAssigned);
    }

    #[test]
    fn test_outcome_from_results() {
        assert_eq!(
            ChannelOutcome::from_results(vec![Ok(()), Ok(())]),
            ChannelOutcome::Sent { messages: 2 }
        );
        assert_eq!(ChannelOutcome::from_results(vec![]).label(), "skipped");

        let mixed = ChannelOutcome::from_results(vec![Ok(()), Err("timeout".into())]);
        assert_eq!(mixed, ChannelOutcome::Failed("1 of 2 messages failed: timeout".into()));
    }

    #[tokio::test]
    async fn test_reporter_records_metrics() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let reporter = OutcomeReporter::new(metrics.clone());

        reporter.report(ChannelReport {
            channel: "push",
            event: NotificationKind::OrderAssigned,
            order_id: Uuid::new_v4(),
            outcome: ChannelOutcome::skipped("seller has no device token"),
            elapsed: Duration::from_millis(1),
        });

        let value = metrics
            .notifications_total
            .with_label_values(&["push", "order_assigned", "skipped"])
            .get();
        assert_eq!(value, 1);
    }
}
