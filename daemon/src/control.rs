use std::sync::Arc;

use common::errors::{HeraldError, HeraldErrorKind};
use common::herald_err;
use common::notification::CloseReason;
use common::protocol::{Request, Response};
use common::tokio::{ReadSized, WriteSized, decode, encode};
use tokio::net::{UnixListener, UnixStream};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::notify::{self, DaemonEvent, NotificationDaemon};

pub struct ControlServer {
    listener: UnixListener,
    daemon: Arc<RwLock<NotificationDaemon>>,
}

impl ControlServer {
    pub fn bind(path: &str, daemon: Arc<RwLock<NotificationDaemon>>) -> Result<Self, HeraldError> {
        // A stale socket from a previous run would make bind fail
        let _ = std::fs::remove_file(path);
        let listener = UnixListener::bind(path)
            .map_err(|e| herald_err!(HeraldErrorKind::StreamBind, "{} ({})", e, path))?;
        info!(socket = path, "control socket listening");
        Ok(Self { listener, daemon })
    }

    pub async fn serve(&self) -> Result<(), HeraldError> {
        loop {
            let (stream, _) = self
                .listener
                .accept()
                .await
                .map_err(|e| herald_err!(HeraldErrorKind::StreamBind, e.to_string()))?;
            let daemon = Arc::clone(&self.daemon);
            tokio::spawn(async move {
                handle_client(stream, daemon).await;
            });
        }
    }
}

async fn handle_client(stream: UnixStream, daemon: Arc<RwLock<NotificationDaemon>>) {
    let (mut reader, mut writer) = stream.into_split();

    loop {
        let buf = match reader.read_sized().await {
            Ok(b) => b,
            Err(_) => break, // client disconnected
        };

        let req: Request = match decode(&buf) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "dropping undecodable control request");
                continue;
            }
        };
        debug!(?req, "control request");

        let resp = match req {
            Request::Ping => Response::Pong,
            Request::GetStatus => {
                let state = daemon.read().await;
                Response::Status {
                    running: true,
                    silent: state.is_silent(),
                    active: state.active_count(),
                }
            }
            Request::Notification(id) => {
                Response::Notification(daemon.read().await.get_by_id(id).cloned())
            }
            Request::PendingNotifications => {
                Response::Notifications(daemon.read().await.pending_notifications())
            }
            Request::Dismiss(id) => {
                // Unknown ids are a no-op, mirroring CloseNotification
                notify::close(&daemon, id, CloseReason::Dismissed).await;
                Response::Ok
            }
            Request::Silence(silent) => {
                daemon.write().await.set_silent(silent);
                Response::Ok
            }
            Request::Subscribe => {
                let events = daemon.read().await.subscribe();
                if write_response(&mut writer, &Response::Ok).await.is_err() {
                    break;
                }
                stream_events(reader, writer, events).await;
                break;
            }
        };

        if write_response(&mut writer, &resp).await.is_err() {
            break;
        }
    }
}

/// Push-mode tail of a subscribed connection. Ends when the client hangs up
/// or the daemon shuts down.
async fn stream_events(
    mut reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    mut events: broadcast::Receiver<DaemonEvent>,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let resp = event_response(event);
                    if write_response(&mut writer, &resp).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "subscriber lagging, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            // Subscribed clients are not expected to send more requests;
            // reading only detects the hang-up.
            read = reader.read_sized() => {
                if read.is_err() {
                    break;
                }
            }
        }
    }
}

fn event_response(event: DaemonEvent) -> Response {
    match event {
        DaemonEvent::Posted(n) | DaemonEvent::Replaced(n) => Response::Notification(Some(n)),
        DaemonEvent::Closed { id, reason } => Response::Closed { id, reason },
    }
}

async fn write_response(writer: &mut OwnedWriteHalf, resp: &Response) -> Result<(), HeraldError> {
    let out = encode(resp)?;
    writer.write_sized(&out).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use crate::sink::{ConsoleSink, NotificationSink};

    fn test_daemon() -> Arc<RwLock<NotificationDaemon>> {
        let (events, _) = broadcast::channel(64);
        let sink: Arc<dyn NotificationSink> = Arc::new(ConsoleSink);
        Arc::new(RwLock::new(NotificationDaemon::new(
            &DaemonConfig::default(),
            sink,
            events,
        )))
    }

    async fn roundtrip(stream: &mut UnixStream, req: Request) -> Response {
        let out = encode(&req).unwrap();
        stream.write_sized(&out).await.unwrap();
        let buf = stream.read_sized().await.unwrap();
        decode(&buf).unwrap()
    }

    #[tokio::test]
    async fn ping_pong_and_status() {
        let daemon = test_daemon();
        let (mut client, server) = UnixStream::pair().unwrap();
        tokio::spawn(handle_client(server, Arc::clone(&daemon)));

        assert!(matches!(
            roundtrip(&mut client, Request::Ping).await,
            Response::Pong
        ));

        match roundtrip(&mut client, Request::GetStatus).await {
            Response::Status {
                running,
                silent,
                active,
            } => {
                assert!(running);
                assert!(!silent);
                assert_eq!(active, 0);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dismiss_and_silence_via_control() {
        let daemon = test_daemon();
        let (mut client, server) = UnixStream::pair().unwrap();
        tokio::spawn(handle_client(server, Arc::clone(&daemon)));

        let id = crate::notify::post_notification(
            &daemon,
            "test".into(),
            0,
            String::new(),
            "pending".into(),
            String::new(),
            Vec::new(),
            std::collections::HashMap::new(),
            0,
        )
        .await;

        match roundtrip(&mut client, Request::PendingNotifications).await {
            Response::Notifications(list) => {
                assert_eq!(list.len(), 1);
                assert_eq!(list[0].id, id);
            }
            other => panic!("unexpected response: {other:?}"),
        }

        assert!(matches!(
            roundtrip(&mut client, Request::Dismiss(id)).await,
            Response::Ok
        ));
        assert!(daemon.read().await.get_by_id(id).is_none());

        // Dismissing it again stays a no-op
        assert!(matches!(
            roundtrip(&mut client, Request::Dismiss(id)).await,
            Response::Ok
        ));

        assert!(matches!(
            roundtrip(&mut client, Request::Silence(true)).await,
            Response::Ok
        ));
        assert!(daemon.read().await.is_silent());
    }

    #[tokio::test]
    async fn subscriber_receives_close_events() {
        let daemon = test_daemon();
        let (mut client, server) = UnixStream::pair().unwrap();
        tokio::spawn(handle_client(server, Arc::clone(&daemon)));

        assert!(matches!(
            roundtrip(&mut client, Request::Subscribe).await,
            Response::Ok
        ));

        let id = crate::notify::post_notification(
            &daemon,
            "test".into(),
            0,
            String::new(),
            "watched".into(),
            String::new(),
            Vec::new(),
            std::collections::HashMap::new(),
            0,
        )
        .await;
        notify::close(&daemon, id, CloseReason::Dismissed).await;

        let buf = client.read_sized().await.unwrap();
        match decode::<Response>(&buf).unwrap() {
            Response::Notification(Some(n)) => assert_eq!(n.id, id),
            other => panic!("unexpected push: {other:?}"),
        }

        let buf = client.read_sized().await.unwrap();
        match decode::<Response>(&buf).unwrap() {
            Response::Closed {
                id: closed_id,
                reason,
            } => {
                assert_eq!(closed_id, id);
                assert_eq!(reason, CloseReason::Dismissed);
            }
            other => panic!("unexpected push: {other:?}"),
        }
    }
}
