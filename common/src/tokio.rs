use std::future::Future;

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::{HeraldError, HeraldErrorKind};
use crate::herald_err;

/// Upper bound on a single control message. Anything larger is a corrupt
/// length prefix, not a legitimate request.
const MAX_MESSAGE_LEN: u32 = 16 * 1024 * 1024;

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, HeraldError> {
    serde_json::to_vec(value).map_err(|e| herald_err!(HeraldErrorKind::Serialize, e.to_string()))
}

pub fn decode<T: DeserializeOwned>(buf: &[u8]) -> Result<T, HeraldError> {
    serde_json::from_slice(buf).map_err(|e| herald_err!(HeraldErrorKind::Deserialize, e.to_string()))
}

/// Reads messages framed with a 4-byte big-endian length prefix.
pub trait ReadSized {
    fn read_sized(&mut self) -> impl Future<Output = Result<Vec<u8>, HeraldError>> + Send;
}

/// Writes messages framed with a 4-byte big-endian length prefix.
pub trait WriteSized {
    fn write_sized<'a>(
        &'a mut self,
        buf: &'a [u8],
    ) -> impl Future<Output = Result<(), HeraldError>> + Send + 'a;
}

impl<S: AsyncRead + Unpin + Send> ReadSized for S {
    async fn read_sized(&mut self) -> Result<Vec<u8>, HeraldError> {
        let mut len_bytes = [0u8; 4];
        self.read_exact(&mut len_bytes)
            .await
            .map_err(|e| herald_err!(HeraldErrorKind::StreamRead, e.to_string()))?;

        let msg_len = u32::from_be_bytes(len_bytes);
        if msg_len > MAX_MESSAGE_LEN {
            return Err(herald_err!(
                HeraldErrorKind::InvalidData,
                "message length {} exceeds limit",
                msg_len
            ));
        }

        let mut buf = vec![0u8; msg_len as usize];
        self.read_exact(&mut buf)
            .await
            .map_err(|e| herald_err!(HeraldErrorKind::StreamRead, e.to_string()))?;

        Ok(buf)
    }
}

impl<S: AsyncWrite + Unpin + Send> WriteSized for S {
    async fn write_sized<'a>(&'a mut self, buf: &'a [u8]) -> Result<(), HeraldError> {
        let msg_len: u32 = buf
            .len()
            .try_into()
            .map_err(|_| herald_err!(HeraldErrorKind::InvalidData, "message too long"))?;

        self.write_all(&msg_len.to_be_bytes())
            .await
            .map_err(|e| herald_err!(HeraldErrorKind::StreamWrite, e.to_string()))?;
        self.write_all(buf)
            .await
            .map_err(|e| herald_err!(HeraldErrorKind::StreamWrite, e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Request, Response};
    use tokio::net::UnixStream;

    #[tokio::test]
    async fn frames_survive_a_socket_pair() {
        let (mut a, mut b) = UnixStream::pair().unwrap();

        let out = encode(&Request::Notification(7)).unwrap();
        a.write_sized(&out).await.unwrap();

        let buf = b.read_sized().await.unwrap();
        let req: Request = decode(&buf).unwrap();
        match req {
            Request::Notification(id) => assert_eq!(id, 7),
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[tokio::test]
    async fn split_halves_carry_frames_both_ways() {
        let (a, b) = UnixStream::pair().unwrap();
        let (mut read_a, _write_a) = a.into_split();
        let (_read_b, mut write_b) = b.into_split();

        let out = encode(&Response::Pong).unwrap();
        write_b.write_sized(&out).await.unwrap();

        let buf = read_a.read_sized().await.unwrap();
        let resp: Response = decode(&buf).unwrap();
        assert!(matches!(resp, Response::Pong));
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut a, mut b) = UnixStream::pair().unwrap();

        let bogus = (MAX_MESSAGE_LEN + 1).to_be_bytes();
        tokio::io::AsyncWriteExt::write_all(&mut a, &bogus)
            .await
            .unwrap();

        let err = b.read_sized().await.unwrap_err();
        assert_eq!(err.kind, HeraldErrorKind::InvalidData);
    }
}
