use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::notification::{CloseReason, HintValue, Notification, SUPPORTED_CAPABILITIES, Urgency};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, warn};
use zbus::interface;
use zbus::object_server::SignalEmitter;
use zbus::zvariant::OwnedValue;

use crate::config::DaemonConfig;
use crate::sink::NotificationSink;

pub const BUS_NAME: &str = "org.freedesktop.Notifications";
pub const OBJECT_PATH: &str = "/org/freedesktop/Notifications";

/// Event fanned out to control-socket subscribers.
#[derive(Clone, Debug)]
pub enum DaemonEvent {
    Posted(Notification),
    Replaced(Notification),
    Closed { id: u32, reason: CloseReason },
}

struct ActiveEntry {
    notification: Notification,
    /// Bumped on every in-place replacement. An expiry timer only fires if
    /// the generation it was scheduled against is still current.
    generation: u64,
}

pub struct NotificationDaemon {
    next_id: u32,
    active: HashMap<u32, ActiveEntry>,
    silent: bool,
    default_timeout_ms: u32,
    sink: Arc<dyn NotificationSink>,
    events: broadcast::Sender<DaemonEvent>,
    connection: Option<zbus::Connection>,
}

impl NotificationDaemon {
    pub fn new(
        config: &DaemonConfig,
        sink: Arc<dyn NotificationSink>,
        events: broadcast::Sender<DaemonEvent>,
    ) -> Self {
        Self {
            next_id: 0,
            active: HashMap::new(),
            silent: config.silent,
            default_timeout_ms: config.default_timeout_ms,
            sink,
            events,
            connection: None,
        }
    }

    pub fn set_connection(&mut self, connection: zbus::Connection) {
        self.connection = Some(connection);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DaemonEvent> {
        self.events.subscribe()
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn get_by_id(&self, id: u32) -> Option<&Notification> {
        self.active.get(&id).map(|entry| &entry.notification)
    }

    pub fn pending_notifications(&self) -> Vec<Notification> {
        let mut pending: Vec<Notification> = self
            .active
            .values()
            .map(|entry| entry.notification.clone())
            .collect();
        pending.sort_by_key(|n| n.id);
        pending
    }

    /// Next free server-assigned id. Wraps past `u32::MAX`, never returns 0
    /// and never collides with a currently active id.
    fn alloc_id(&mut self) -> u32 {
        loop {
            self.next_id = self.next_id.wrapping_add(1);
            if self.next_id != 0 && !self.active.contains_key(&self.next_id) {
                return self.next_id;
            }
        }
    }

    /// Inserts or replaces in place. Returns the entry's generation and
    /// whether an existing notification was replaced.
    fn insert(&mut self, notification: Notification) -> (u64, bool) {
        use std::collections::hash_map::Entry;
        match self.active.entry(notification.id) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.generation += 1;
                entry.notification = notification;
                (entry.generation, true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(ActiveEntry {
                    notification,
                    generation: 0,
                });
                (0, false)
            }
        }
    }

    fn remove(&mut self, id: u32) -> bool {
        self.active.remove(&id).is_some()
    }

    fn remove_if_generation(&mut self, id: u32, generation: u64) -> bool {
        match self.active.get(&id) {
            Some(entry) if entry.generation == generation => {
                self.active.remove(&id);
                true
            }
            _ => false,
        }
    }

    fn effective_timeout(&self, requested_ms: i32) -> Option<Duration> {
        let ms = match requested_ms {
            0 => return None,
            x if x < 0 => u64::from(self.default_timeout_ms),
            x => x as u64,
        };
        if ms == 0 {
            None
        } else {
            Some(Duration::from_millis(ms))
        }
    }
}

pub fn capabilities() -> Vec<String> {
    SUPPORTED_CAPABILITIES
        .iter()
        .map(|capability| capability.as_ref().to_string())
        .collect()
}

pub fn server_information() -> (String, String, String, String) {
    (
        "herald".into(),
        "herald".into(),
        env!("CARGO_PKG_VERSION").into(),
        "1.2".into(),
    )
}

/// Accepts a `Notify` call: assigns or reuses the id, stores the payload,
/// delivers it to the sink, and schedules expiry.
#[allow(clippy::too_many_arguments)]
pub async fn post_notification(
    daemon: &Arc<RwLock<NotificationDaemon>>,
    app_name: String,
    replaces_id: u32,
    app_icon: String,
    summary: String,
    body: String,
    actions: Vec<String>,
    hints: HashMap<String, OwnedValue>,
    expire_timeout: i32,
) -> u32 {
    let urgency = Urgency::from_hints(&hints);
    let hints = HintValue::from_variant_map(&hints);

    let (notification, generation, replaced, timeout, silent, sink, events) = {
        let mut state = daemon.write().await;
        let id = if replaces_id == 0 {
            state.alloc_id()
        } else {
            replaces_id
        };

        let notification = Notification {
            id,
            app_name,
            app_icon,
            summary,
            body,
            actions,
            hints,
            urgency,
            replaces_id,
            expire_timeout,
            received_at: Utc::now(),
        };
        let (generation, replaced) = state.insert(notification.clone());
        let timeout = state.effective_timeout(expire_timeout);
        (
            notification,
            generation,
            replaced,
            timeout,
            state.silent,
            Arc::clone(&state.sink),
            state.events.clone(),
        )
    };

    let id = notification.id;
    debug!(id, replaced, "notification accepted");

    // Presentation and fan-out happen outside the lock.
    if !silent {
        sink.deliver(&notification);
    }
    let event = if replaced {
        DaemonEvent::Replaced(notification)
    } else {
        DaemonEvent::Posted(notification)
    };
    let _ = events.send(event);

    schedule_expiry(daemon, id, generation, timeout);
    id
}

/// Closes an active notification. Unknown ids are a silent no-op, as the
/// Desktop Notifications specification requires. Returns whether anything
/// was closed.
pub async fn close(
    daemon: &Arc<RwLock<NotificationDaemon>>,
    id: u32,
    reason: CloseReason,
) -> bool {
    let (removed, connection, events) = {
        let mut state = daemon.write().await;
        (state.remove(id), state.connection.clone(), state.events.clone())
    };
    if !removed {
        return false;
    }

    debug!(id, reason = reason.code(), "notification closed");
    let _ = events.send(DaemonEvent::Closed { id, reason });
    emit_closed(connection.as_ref(), id, reason).await;
    true
}

fn schedule_expiry(
    daemon: &Arc<RwLock<NotificationDaemon>>,
    id: u32,
    generation: u64,
    timeout: Option<Duration>,
) {
    let Some(timeout) = timeout else {
        return;
    };
    let daemon = Arc::clone(daemon);
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        expire(&daemon, id, generation).await;
    });
}

/// Expiry endpoint of a timer task. The generation check makes this a no-op
/// when the notification was replaced or closed in the meantime, so a timer
/// racing an explicit close produces at most one `NotificationClosed`.
async fn expire(daemon: &Arc<RwLock<NotificationDaemon>>, id: u32, generation: u64) {
    let (expired, connection, events) = {
        let mut state = daemon.write().await;
        (
            state.remove_if_generation(id, generation),
            state.connection.clone(),
            state.events.clone(),
        )
    };
    if !expired {
        return;
    }

    debug!(id, "notification expired");
    let _ = events.send(DaemonEvent::Closed {
        id,
        reason: CloseReason::Expired,
    });
    emit_closed(connection.as_ref(), id, CloseReason::Expired).await;
}

async fn emit_closed(connection: Option<&zbus::Connection>, id: u32, reason: CloseReason) {
    let Some(connection) = connection else {
        return;
    };
    match SignalEmitter::new(connection, OBJECT_PATH) {
        Ok(emitter) => {
            if let Err(e) =
                DaemonHandle::notification_closed(&emitter, id, reason.code()).await
            {
                warn!(id, error = %e, "failed to emit NotificationClosed");
            }
        }
        Err(e) => warn!(id, error = %e, "failed to build signal emitter"),
    }
}

pub struct DaemonHandle {
    daemon: Arc<RwLock<NotificationDaemon>>,
}
impl DaemonHandle {
    pub fn new(daemon: Arc<RwLock<NotificationDaemon>>) -> Self {
        Self { daemon }
    }
}

#[interface(name = "org.freedesktop.Notifications")]
impl DaemonHandle {
    #[allow(clippy::too_many_arguments)]
    async fn notify(
        &self,
        app_name: String,
        replaces_id: u32,
        app_icon: String,
        summary: String,
        body: String,
        actions: Vec<String>,
        hints: HashMap<String, OwnedValue>,
        expire_timeout: i32,
    ) -> u32 {
        post_notification(
            &self.daemon,
            app_name,
            replaces_id,
            app_icon,
            summary,
            body,
            actions,
            hints,
            expire_timeout,
        )
        .await
    }

    async fn close_notification(&self, id: u32) {
        close(&self.daemon, id, CloseReason::Closed).await;
    }

    fn get_capabilities(&self) -> Vec<String> {
        capabilities()
    }

    fn get_server_information(&self) -> (String, String, String, String) {
        server_information()
    }

    #[zbus(signal)]
    async fn notification_closed(
        emitter: &SignalEmitter<'_>,
        id: u32,
        reason: u32,
    ) -> zbus::Result<()>;
}
