//! Wire envelope and framing.
//!
//! One request frame and one response frame per connection. A frame is a
//! 4-byte big-endian length followed by a postcard body.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{RpcError, RpcResult};

/// Largest frame either side will accept.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// A single call: which operation, its encoded arguments, and the argument
/// type names used to pick the right signature on the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub interface: String,
    pub operation: String,
    pub arg_types: Vec<String>,
    /// Postcard-encoded argument tuple.
    pub args: Vec<u8>,
    /// W3C trace context of the caller (empty when not tracing).
    pub traceparent: String,
    pub tracestate: String,
}

/// Outcome of a call as seen on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    /// Postcard-encoded return value.
    Return(Vec<u8>),
    /// Postcard-encoded application failure (the interface's error type).
    Failure(Vec<u8>),
    /// The server could not run the call at all.
    Fault(RpcError),
}

impl Response {
    /// Encode an operation's result.
    pub fn encode<T: Serialize, E: Serialize>(result: Result<T, E>) -> RpcResult<Response> {
        Ok(match result {
            Ok(value) => Response::Return(encode(&value)?),
            Err(failure) => Response::Failure(encode(&failure)?),
        })
    }
}

/// Encode a value with postcard.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> RpcResult<Vec<u8>> {
    Ok(postcard::to_stdvec(value)?)
}

/// Decode a postcard value.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> RpcResult<T> {
    Ok(postcard::from_bytes(bytes)?)
}

/// Write one length-prefixed frame and flush.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> RpcResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = encode(value)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(RpcError::codec(format!(
            "frame of {} bytes exceeds limit of {MAX_FRAME_LEN}",
            body.len()
        )));
    }
    writer.write_all(&(body.len() as u32).to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame.
pub async fn read_frame<R, T>(reader: &mut R) -> RpcResult<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len = [0u8; 4];
    reader.read_exact(&mut len).await?;
    let len = u32::from_be_bytes(len) as usize;
    if len > MAX_FRAME_LEN {
        return Err(RpcError::codec(format!(
            "frame of {len} bytes exceeds limit of {MAX_FRAME_LEN}"
        )));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    decode(&body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_roundtrip_over_duplex() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let request = Request {
            interface: "Storage".to_string(),
            operation: "size".to_string(),
            arg_types: vec!["DfsPath".to_string()],
            args: encode(&("/a/b".to_string(),)).unwrap(),
            traceparent: String::new(),
            tracestate: String::new(),
        };

        write_frame(&mut client, &request).await.unwrap();
        let got: Request = read_frame(&mut server).await.unwrap();
        assert_eq!(got.operation, "size");
        assert_eq!(got.arg_types, vec!["DfsPath"]);
        let (path,): (String,) = decode(&got.args).unwrap();
        assert_eq!(path, "/a/b");
    }

    #[tokio::test]
    async fn test_truncated_frame_is_closed() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&10u32.to_be_bytes()).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        drop(client);

        let err = read_frame::<_, Request>(&mut server).await.unwrap_err();
        assert_eq!(err, RpcError::Closed);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client
            .write_all(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes())
            .await
            .unwrap();

        let err = read_frame::<_, Request>(&mut server).await.unwrap_err();
        assert!(matches!(err, RpcError::Codec(_)));
    }

    #[test]
    fn test_response_encode_failure() {
        let result: Result<u32, String> = Err("nope".to_string());
        match Response::encode(result).unwrap() {
            Response::Failure(bytes) => {
                let msg: String = decode(&bytes).unwrap();
                assert_eq!(msg, "nope");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
