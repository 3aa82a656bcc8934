use serde::{Deserialize, Serialize};

use crate::{
    errors::HeraldError,
    notification::{CloseReason, Notification},
};

pub struct SocketData;
impl SocketData {
    pub const SOCKET_ADDR: &'static str = "/tmp/herald.sock";
}

/// Requests a client may send over the control socket.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub enum Request {
    Ping,
    GetStatus,

    /// Fetch a single tracked notification by id.
    Notification(u32),
    /// Fetch every notification currently tracked as active.
    PendingNotifications,

    /// Close a notification on the user's behalf (reason 2).
    Dismiss(u32),
    /// Toggle do-not-disturb. Notifications are still tracked while silent,
    /// they just never reach the presentation sink.
    Silence(bool),

    /// Switch this connection into a push stream of daemon events.
    Subscribe,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub enum Response {
    Ok,
    Error(String),
    Pong,
    Status {
        running: bool,
        silent: bool,
        active: usize,
    },
    Notification(Option<Notification>),
    Notifications(Vec<Notification>),
    Closed {
        id: u32,
        reason: CloseReason,
    },
}

pub trait IntoResponse {
    fn into_response(self) -> Response;
}
impl<T> IntoResponse for Result<T, HeraldError> {
    fn into_response(self) -> Response {
        match self {
            Ok(_) => Response::Ok,
            Err(e) => Response::Error(e.message),
        }
    }
}
