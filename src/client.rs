//! Client for both server protocols.
//!
//! Used by `ipedia-cli` and the integration tests. A client request always
//! carries `Transaction-ID`, `Protocol-Version` and `Client-Info`; callers add
//! the rest.

use std::net::SocketAddr;

use rand::Rng;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::protocol::codec::DecodeError;
use crate::protocol::{decode_response, encode_request, DecodedResponse, FieldName};

/// Errors talking to a server.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad response: {0}")]
    Decode(#[from] DecodeError),

    #[error("server closed the connection")]
    Closed,
}

/// Client of the encyclopedia protocol.
#[derive(Debug, Clone)]
pub struct IpediaClient {
    addr: SocketAddr,
    protocol_version: String,
    client_info: String,
}

impl IpediaClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            protocol_version: "1".to_string(),
            client_info: format!("ipedia-cli {}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }

    /// Random transaction id, eight hex digits.
    pub fn transaction_id() -> String {
        format!("{:08x}", rand::thread_rng().gen::<u32>())
    }

    /// Send `fields` with the standard context fields in front. Returns the
    /// transaction id used and the decoded response.
    pub async fn request(
        &self,
        fields: &[(FieldName, Option<&str>)],
    ) -> Result<(String, DecodedResponse), ClientError> {
        let transaction_id = Self::transaction_id();
        let mut lines: Vec<(&str, Option<&str>)> = vec![
            (FieldName::TransactionId.as_str(), Some(transaction_id.as_str())),
            (FieldName::ProtocolVersion.as_str(), Some(self.protocol_version.as_str())),
            (FieldName::ClientInfo.as_str(), Some(self.client_info.as_str())),
        ];
        lines.extend(fields.iter().map(|(name, value)| (name.as_str(), *value)));

        let raw = self.send_raw(encode_request(lines).as_bytes()).await?;
        Ok((transaction_id, decode_response(&raw)?))
    }

    /// Send raw bytes and read until the server closes the connection.
    pub async fn send_raw(&self, request: &[u8]) -> Result<Vec<u8>, ClientError> {
        let mut stream = TcpStream::connect(self.addr).await?;
        stream.write_all(request).await?;
        stream.flush().await?;

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await?;
        Ok(response)
    }
}

/// Client of the administrative channel.
#[derive(Debug)]
pub struct AdminClient {
    reader: BufReader<TcpStream>,
}

impl AdminClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            reader: BufReader::new(stream),
        })
    }

    /// Send one command and collect the reply lines (without the empty
    /// terminating line).
    pub async fn command(&mut self, command: &str) -> Result<Vec<String>, ClientError> {
        let stream = self.reader.get_mut();
        stream.write_all(command.as_bytes()).await?;
        stream.write_all(b"\n").await?;
        stream.flush().await?;

        let mut reply = Vec::new();
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line).await? == 0 {
                return Err(ClientError::Closed);
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                return Ok(reply);
            }
            reply.push(line.to_owned());
        }
    }
}
