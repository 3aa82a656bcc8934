use common::notification::Notification;

/// Where accepted notifications go to be shown.
///
/// The daemon's contract does not change with the sink: a real renderer can
/// replace the console sink without touching the service.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: &Notification);
}

/// Minimal presentation: write the notification fields to standard output.
pub struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    fn deliver(&self, notification: &Notification) {
        println!(
            "[{}] {}: {}",
            notification.id, notification.app_name, notification.summary
        );
        if !notification.body.is_empty() {
            println!("    {}", notification.body);
        }
        println!(
            "    urgency: {}, timeout: {}ms",
            notification.urgency.as_ref(),
            notification.expire_timeout
        );
    }
}
