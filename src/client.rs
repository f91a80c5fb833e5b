//! One-shot DNS query transport: UDP with an overall timeout and a single
//! retry, falling back to TCP when the server truncates its answer.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{Instant, timeout};
use tracing::{debug, trace};

use crate::config::ResolverConfig;
use crate::dns::{Message, ParseError, enums::RecordType};
use crate::tsig::{self, TsigError, VerifyOutcome};

const MAX_UDP_RESPONSE: usize = 4096;

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("query timed out")]
    Timeout,
    #[error("IO error: {0}")]
    Io(String),
    #[error("response id does not match the query")]
    IdMismatch,
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Tsig(#[from] TsigError),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Protocol {
    Udp,
    Tcp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Udp => write!(f, "UDP"),
            Protocol::Tcp => write!(f, "TCP"),
        }
    }
}

/// A decoded response together with how it arrived and, when
/// authentication was requested, how verification went.
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub message: Message,
    pub protocol: Protocol,
    pub auth: Option<VerifyOutcome>,
}

pub struct DnsClient {
    config: ResolverConfig,
}

impl DnsClient {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Issue one query for `<qname, qtype, IN>` and return the decoded
    /// response. When the configuration carries key material the query is
    /// signed and the response verified; a failed verification is reported
    /// in the result, never as an error.
    pub async fn lookup(
        &self,
        qname: &str,
        qtype: RecordType,
    ) -> Result<QueryResponse, TransportError> {
        let labels: Vec<String> = qname
            .trim_end_matches('.')
            .split('.')
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        let id = rand::random::<u16>();
        let mut query = Message::query(id, labels, qtype);

        let key = self.config.tsig_key();
        if let Some(key) = &key {
            query = tsig::sign(&query, key, tsig::unix_now(), tsig::DEFAULT_FUDGE)?;
        }

        let (message, protocol) = self.exchange(&query).await?;
        let auth = key
            .as_ref()
            .map(|key| tsig::verify(&message, key, id, tsig::unix_now()));

        Ok(QueryResponse {
            message,
            protocol,
            auth,
        })
    }

    /// Send the query and wait for its response, retrying once on timeout
    /// or transport failure.
    async fn exchange(&self, query: &Message) -> Result<(Message, Protocol), TransportError> {
        let bytes = query.serialize()?;
        let server = self.config.server_addr();

        for attempt in 0..2 {
            match self.exchange_once(&bytes, query.header.id, server).await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!("query succeeded on retry");
                    }
                    return Ok(result);
                }
                Err(e) if attempt == 0
                    && matches!(e, TransportError::Timeout | TransportError::Io(_)) =>
                {
                    debug!("query attempt failed ({}), retrying", e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(TransportError::Timeout)
    }

    /// One UDP attempt under the configured timeout. Datagrams whose id
    /// does not match the outstanding query are discarded while budget
    /// remains; a truncated response re-issues the query over TCP.
    async fn exchange_once(
        &self,
        bytes: &[u8],
        id: u16,
        server: SocketAddr,
    ) -> Result<(Message, Protocol), TransportError> {
        let deadline = Instant::now() + self.config.timeout;

        let bind_addr: SocketAddr = if server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await.map_err(io_err)?;
        socket.connect(server).await.map_err(io_err)?;
        socket.send(bytes).await.map_err(io_err)?;
        trace!("sent {} bytes to {} over UDP", bytes.len(), server);

        let mut buf = vec![0u8; MAX_UDP_RESPONSE];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout);
            }
            let len = match timeout(remaining, socket.recv(&mut buf)).await {
                Ok(Ok(len)) => len,
                Ok(Err(e)) => return Err(io_err(e)),
                Err(_) => return Err(TransportError::Timeout),
            };

            let response = Message::parse(&buf[..len])?;
            if response.header.id != id {
                debug!(
                    "discarding datagram with stale id {} (want {})",
                    response.header.id, id
                );
                continue;
            }
            if response.header.tc {
                debug!("response truncated, re-issuing query over TCP");
                return self.exchange_tcp(bytes, id, server, deadline).await;
            }
            return Ok((response, Protocol::Udp));
        }
    }

    /// Re-issue the identical query over TCP within what remains of the
    /// attempt deadline. Messages are framed with a two-octet length prefix.
    async fn exchange_tcp(
        &self,
        bytes: &[u8],
        id: u16,
        server: SocketAddr,
        deadline: Instant,
    ) -> Result<(Message, Protocol), TransportError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(TransportError::Timeout);
        }

        timeout(remaining, async {
            let mut stream = TcpStream::connect(server).await.map_err(io_err)?;
            stream
                .write_all(&(bytes.len() as u16).to_be_bytes())
                .await
                .map_err(io_err)?;
            stream.write_all(bytes).await.map_err(io_err)?;
            stream.flush().await.map_err(io_err)?;

            let mut length_buf = [0u8; 2];
            stream.read_exact(&mut length_buf).await.map_err(io_err)?;
            let response_length = u16::from_be_bytes(length_buf) as usize;

            let mut response_buf = vec![0u8; response_length];
            stream.read_exact(&mut response_buf).await.map_err(io_err)?;
            trace!("read {} bytes from {} over TCP", response_length, server);

            let response = Message::parse(&response_buf)?;
            if response.header.id != id {
                return Err(TransportError::IdMismatch);
            }
            Ok((response, Protocol::Tcp))
        })
        .await
        .map_err(|_| TransportError::Timeout)?
    }
}

fn io_err(e: std::io::Error) -> TransportError {
    TransportError::Io(e.to_string())
}
