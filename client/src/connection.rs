use common::errors::{HeraldError, HeraldErrorKind};
use common::herald_err;
use common::protocol::{Request, Response, SocketData};
use common::tokio::{ReadSized, WriteSized, decode, encode};
use tokio::net::UnixStream;

pub struct ClientConnection {
    stream: UnixStream,
}

impl ClientConnection {
    pub async fn new() -> Result<Self, HeraldError> {
        let stream = UnixStream::connect(SocketData::SOCKET_ADDR)
            .await
            .map_err(|e| {
                herald_err!(
                    HeraldErrorKind::StreamConnect,
                    "{} (is herald-daemon running? socket: {})",
                    e,
                    SocketData::SOCKET_ADDR
                )
            })?;

        Ok(Self { stream })
    }

    pub async fn send(&mut self, req: Request) -> Result<Response, HeraldError> {
        let out = encode(&req)?;
        self.stream.write_sized(&out).await?;

        let buf = self.stream.read_sized().await?;
        decode(&buf)
    }

    /// Reads the next pushed message on a subscribed connection.
    pub async fn next_event(&mut self) -> Result<Response, HeraldError> {
        let buf = self.stream.read_sized().await?;
        decode(&buf)
    }
}
