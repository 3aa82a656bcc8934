use std::collections::HashMap;

use chrono::Local;
use common::errors::{HeraldError, HeraldErrorKind};
use common::herald_err;
use common::notification::Notification;
use common::protocol::{Request, Response};
use zbus::zvariant::Value;

use crate::connection::ClientConnection;

mod connection;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Status,
    List,
    Show(u32),
    Dismiss(u32),
    Silence(bool),
    Watch,
    Send { summary: String, body: String },
}

impl Command {
    fn parse(args: &[String]) -> Result<Self, HeraldError> {
        match args.first().map(String::as_str) {
            Some("status") => Ok(Self::Status),
            Some("list") => Ok(Self::List),
            Some("show") => Ok(Self::Show(parse_id(args)?)),
            Some("dismiss") => Ok(Self::Dismiss(parse_id(args)?)),
            Some("silence") => match args.get(1).map(String::as_str) {
                Some("on") => Ok(Self::Silence(true)),
                Some("off") => Ok(Self::Silence(false)),
                _ => Err(herald_err!(
                    HeraldErrorKind::InvalidArgument,
                    "silence expects 'on' or 'off'"
                )),
            },
            Some("watch") => Ok(Self::Watch),
            Some("send") => {
                let summary = args.get(1).cloned().ok_or_else(|| {
                    herald_err!(HeraldErrorKind::InvalidArgument, "send expects a summary")
                })?;
                let body = args.get(2).cloned().unwrap_or_default();
                Ok(Self::Send { summary, body })
            }
            _ => Err(herald_err!(
                HeraldErrorKind::InvalidArgument,
                "usage: herald status | list | show <id> | dismiss <id> | silence on|off | watch | send <summary> [body]"
            )),
        }
    }
}

fn parse_id(args: &[String]) -> Result<u32, HeraldError> {
    args.get(1)
        .and_then(|raw| raw.parse::<u32>().ok())
        .ok_or_else(|| {
            herald_err!(
                HeraldErrorKind::InvalidArgument,
                "expected a numeric notification id"
            )
        })
}

#[tokio::main]
async fn main() -> Result<(), HeraldError> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e.message);
            std::process::exit(2);
        }
    };

    match command {
        Command::Status => status().await,
        Command::List => list().await,
        Command::Show(id) => show(id).await,
        Command::Dismiss(id) => dismiss(id).await,
        Command::Silence(silent) => silence(silent).await,
        Command::Watch => watch().await,
        Command::Send { summary, body } => send(&summary, &body).await,
    }
}

async fn status() -> Result<(), HeraldError> {
    let mut conn = ClientConnection::new().await?;
    match conn.send(Request::GetStatus).await? {
        Response::Status {
            running,
            silent,
            active,
        } => {
            println!(
                "daemon: {}, silent: {}, active notifications: {}",
                if running { "running" } else { "stopped" },
                silent,
                active
            );
            Ok(())
        }
        other => Err(unexpected(other)),
    }
}

async fn list() -> Result<(), HeraldError> {
    let mut conn = ClientConnection::new().await?;
    match conn.send(Request::PendingNotifications).await? {
        Response::Notifications(list) => {
            if list.is_empty() {
                println!("no active notifications");
            }
            for notification in &list {
                print_notification(notification);
            }
            Ok(())
        }
        other => Err(unexpected(other)),
    }
}

async fn show(id: u32) -> Result<(), HeraldError> {
    let mut conn = ClientConnection::new().await?;
    match conn.send(Request::Notification(id)).await? {
        Response::Notification(Some(notification)) => {
            print_notification(&notification);
            Ok(())
        }
        Response::Notification(None) => {
            println!("no active notification with id {id}");
            Ok(())
        }
        other => Err(unexpected(other)),
    }
}

async fn dismiss(id: u32) -> Result<(), HeraldError> {
    let mut conn = ClientConnection::new().await?;
    match conn.send(Request::Dismiss(id)).await? {
        Response::Ok => Ok(()),
        other => Err(unexpected(other)),
    }
}

async fn silence(silent: bool) -> Result<(), HeraldError> {
    let mut conn = ClientConnection::new().await?;
    match conn.send(Request::Silence(silent)).await? {
        Response::Ok => {
            println!("silence {}", if silent { "on" } else { "off" });
            Ok(())
        }
        other => Err(unexpected(other)),
    }
}

async fn watch() -> Result<(), HeraldError> {
    let mut conn = ClientConnection::new().await?;
    match conn.send(Request::Subscribe).await? {
        Response::Ok => {}
        other => return Err(unexpected(other)),
    }

    println!("watching for notifications, ctrl-c to quit");
    loop {
        match conn.next_event().await {
            Ok(Response::Notification(Some(notification))) => print_notification(&notification),
            Ok(Response::Closed { id, reason }) => {
                println!("closed {} (reason {})", id, reason.code());
            }
            Ok(_) => {}
            Err(_) => {
                println!("daemon disconnected");
                return Ok(());
            }
        }
    }
}

/// Posts a notification over the session bus, exercising the daemon the way
/// any desktop application would.
async fn send(summary: &str, body: &str) -> Result<(), HeraldError> {
    let conn = zbus::Connection::session()
        .await
        .map_err(|e| herald_err!(HeraldErrorKind::BusConnect, e.to_string()))?;
    let proxy = zbus::Proxy::new(
        &conn,
        "org.freedesktop.Notifications",
        "/org/freedesktop/Notifications",
        "org.freedesktop.Notifications",
    )
    .await
    .map_err(|e| herald_err!(HeraldErrorKind::ProxyCreate, e.to_string()))?;

    let id: u32 = proxy
        .call(
            "Notify",
            &(
                "herald",
                0u32,
                "",
                summary,
                body,
                Vec::<String>::new(),
                HashMap::<String, Value>::new(),
                -1i32,
            ),
        )
        .await
        .map_err(|e| herald_err!(HeraldErrorKind::MethodCall, e.to_string()))?;

    println!("posted notification {id}");
    Ok(())
}

fn print_notification(notification: &Notification) {
    let received = notification
        .received_at
        .with_timezone(&Local)
        .format("%H:%M:%S");
    println!(
        "[{}] {} {} ({}): {}",
        notification.id,
        received,
        notification.app_name,
        notification.urgency.as_ref(),
        notification.summary
    );
    if !notification.body.is_empty() {
        println!("    {}", notification.body);
    }
}

fn unexpected(resp: Response) -> HeraldError {
    herald_err!(
        HeraldErrorKind::InvalidData,
        "unexpected daemon response: {:?}",
        resp
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_plain_commands() {
        assert_eq!(Command::parse(&args(&["status"])).unwrap(), Command::Status);
        assert_eq!(Command::parse(&args(&["list"])).unwrap(), Command::List);
        assert_eq!(Command::parse(&args(&["watch"])).unwrap(), Command::Watch);
    }

    #[test]
    fn parses_id_commands() {
        assert_eq!(
            Command::parse(&args(&["show", "3"])).unwrap(),
            Command::Show(3)
        );
        assert_eq!(
            Command::parse(&args(&["dismiss", "12"])).unwrap(),
            Command::Dismiss(12)
        );
        assert!(Command::parse(&args(&["dismiss", "twelve"])).is_err());
        assert!(Command::parse(&args(&["dismiss"])).is_err());
    }

    #[test]
    fn parses_silence_and_send() {
        assert_eq!(
            Command::parse(&args(&["silence", "on"])).unwrap(),
            Command::Silence(true)
        );
        assert_eq!(
            Command::parse(&args(&["silence", "off"])).unwrap(),
            Command::Silence(false)
        );
        assert!(Command::parse(&args(&["silence", "maybe"])).is_err());

        assert_eq!(
            Command::parse(&args(&["send", "Hello", "world"])).unwrap(),
            Command::Send {
                summary: "Hello".into(),
                body: "world".into()
            }
        );
        assert!(Command::parse(&args(&["send"])).is_err());
    }

    #[test]
    fn rejects_unknown_commands() {
        assert!(Command::parse(&args(&[])).is_err());
        assert!(Command::parse(&args(&["frobnicate"])).is_err());
    }
}
