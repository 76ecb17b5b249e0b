use super::codec::Codec;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::{io, net::SocketAddr, time::Duration};
use tokio::{
    net::{TcpListener, TcpStream},
    time::timeout,
};
use tokio_util::codec::Framed;
use tracing::{debug, info};

/// Frame-oriented byte stream beneath a session.
///
/// One call moves exactly one TPKT frame. Timeouts belong to the caller.
#[async_trait]
pub trait Transport: Send {
    /// Send one complete frame.
    async fn send(&mut self, frame: Bytes) -> io::Result<()>;

    /// Receive one complete frame; `None` once the peer has closed.
    async fn recv(&mut self) -> io::Result<Option<Bytes>>;

    /// Drop the current stream, if any, and establish a new one.
    async fn reconnect(&mut self) -> io::Result<()>;

    /// Whether a stream is currently attached.
    fn is_open(&self) -> bool {
        true
    }
}

#[derive(Debug)]
enum Role {
    /// Dial out to the device
    Client { addr: String },
    /// Wait for the device to dial in
    Server { listener: TcpListener },
}

/// TCP transport in either client or inbound-server role.
#[derive(Debug)]
pub struct TcpTransport {
    role: Role,
    connect_timeout: Duration,
    framed: Option<Framed<TcpStream, Codec>>,
}

impl TcpTransport {
    /// Client role, not yet connected.
    pub fn client(addr: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            role: Role::Client { addr: addr.into() },
            connect_timeout,
            framed: None,
        }
    }

    /// Server role over an already bound listener, no peer yet.
    pub fn server(listener: TcpListener, connect_timeout: Duration) -> Self {
        Self {
            role: Role::Server { listener },
            connect_timeout,
            framed: None,
        }
    }

    /// Dial `addr` and return a connected transport.
    pub async fn connect(addr: impl Into<String>, connect_timeout: Duration) -> io::Result<Self> {
        let mut transport = Self::client(addr, connect_timeout);
        transport.reconnect().await?;
        Ok(transport)
    }

    /// Accept the first inbound peer on `listener`.
    pub async fn accept(listener: TcpListener, connect_timeout: Duration) -> io::Result<Self> {
        let mut transport = Self::server(listener, connect_timeout);
        transport.reconnect().await?;
        Ok(transport)
    }

    /// Address of the attached peer.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.framed
            .as_ref()
            .and_then(|f| f.get_ref().peer_addr().ok())
    }

    /// Listening address in server role.
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        match &self.role {
            Role::Server { listener } => listener.local_addr().ok(),
            Role::Client { .. } => None,
        }
    }

    fn attached(&mut self) -> io::Result<&mut Framed<TcpStream, Codec>> {
        self.framed
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "transport not connected"))
    }
}

fn timed_out(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("{what} timed out"))
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, frame: Bytes) -> io::Result<()> {
        let result = self.attached()?.send(frame).await;
        if result.is_err() {
            self.framed = None;
        }
        result
    }

    async fn recv(&mut self) -> io::Result<Option<Bytes>> {
        let next = self.attached()?.next().await;
        match next {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => {
                self.framed = None;
                Err(e)
            }
            None => {
                self.framed = None;
                Ok(None)
            }
        }
    }

    async fn reconnect(&mut self) -> io::Result<()> {
        self.framed = None;
        let stream = match &self.role {
            Role::Client { addr } => {
                debug!(addr = %addr, "S7 dialing");
                timeout(self.connect_timeout, TcpStream::connect(addr.as_str()))
                    .await
                    .map_err(|_| timed_out("connect"))??
            }
            Role::Server { listener } => {
                let (stream, peer) = timeout(self.connect_timeout, listener.accept())
                    .await
                    .map_err(|_| timed_out("accept"))??;
                info!(peer = %peer, "S7 accepted inbound peer");
                stream
            }
        };
        stream.set_nodelay(true)?;
        self.framed = Some(Framed::new(stream, Codec));
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.framed.is_some()
    }
}
