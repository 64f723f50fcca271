// Copyright 2024 The farcall contributors
// This file is part of the farcall library.

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:

// http://www.apache.org/licenses/LICENSE-2.0

// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::{Channel, Result};

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};

use tokio::{
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};
use tracing::{trace, warn};

/// The observed `(ip, port)` pair of a bound or connected socket.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SocketPort {
    ip: IpAddr,
    port: u16,
}

impl SocketPort {
    /// Returns the IP address of the socket.
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// Returns the port number of the socket.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl From<SocketAddr> for SocketPort {
    fn from(addr: SocketAddr) -> Self {
        Self { ip: addr.ip(), port: addr.port() }
    }
}

impl fmt::Display for SocketPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// A one-shot handle to a connected TCP stream.
///
/// A `Socket` can be upgraded to exactly one [`Channel`]; the upgrade consumes
/// the handle, so double-consumption is prevented by the type rather than by
/// runtime checks.
#[derive(Debug)]
pub struct Socket {
    stream: TcpStream,
    local: SocketPort,
    peer: SocketPort,
}

impl Socket {
    /// Connects to the given loopback port.
    pub async fn connect(port: u16) -> Result<Self> {
        let stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await?;
        Self::from_stream(stream)
    }

    /// Wraps an accepted or connected stream.
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let local = stream.local_addr()?.into();
        let peer = stream.peer_addr()?.into();
        Ok(Self { stream, local, peer })
    }

    /// Returns the locally-bound side of the socket.
    pub fn local_port(&self) -> SocketPort {
        self.local
    }

    /// Returns the peer side of the socket.
    pub fn peer_port(&self) -> SocketPort {
        self.peer
    }

    /// Upgrades the socket into a framed [`Channel`], transferring ownership
    /// of the descriptor.
    pub fn into_channel(self, max_frame_payload: usize) -> Channel {
        Channel::from_socket(self, max_frame_payload)
    }

    pub(crate) fn into_parts(self) -> (TcpStream, SocketPort, SocketPort) {
        (self.stream, self.local, self.peer)
    }
}

/// A bound loopback TCP listener producing [`Socket`]s.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local: SocketPort,
}

impl Listener {
    /// Binds to the given loopback port; `0` asks the OS for an ephemeral
    /// port, observable via [`Listener::local_port`].
    pub async fn bind(port: u16) -> Result<Self> {
        let inner = TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await?;
        let local = inner.local_addr()?.into();
        trace!("listening on {local}");
        Ok(Self { inner, local })
    }

    /// Returns the bound side of the listener.
    pub fn local_port(&self) -> SocketPort {
        self.local
    }

    /// Accepts the next inbound connection.
    pub async fn accept(&self) -> Result<Socket> {
        let (stream, _) = self.inner.accept().await?;
        Socket::from_stream(stream)
    }

    /// Spawns an accept loop offering each inbound [`Socket`] to `callback`.
    ///
    /// A callback that drops the socket drops the connection. The loop exits
    /// when the listener fails, or when the returned handle is aborted.
    pub fn spawn<F>(self, callback: F) -> JoinHandle<()>
    where
        F: Fn(Socket) + Send + Sync + 'static,
    {
        tokio::spawn(async move {
            loop {
                match self.accept().await {
                    Ok(socket) => {
                        trace!("accepted a connection from {} on {}", socket.peer_port(), self.local);
                        callback(socket);
                    }
                    Err(error) => {
                        warn!("the listener on {} failed to accept a connection: {error}", self.local);
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ephemeral_bind_reports_assigned_port() {
        let listener = Listener::bind(0).await.unwrap();
        assert_ne!(listener.local_port().port(), 0);
        assert_eq!(listener.local_port().ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[tokio::test]
    async fn connect_and_accept() {
        let listener = Listener::bind(0).await.unwrap();
        let port = listener.local_port().port();

        let client = tokio::spawn(async move { Socket::connect(port).await.unwrap() });
        let accepted = listener.accept().await.unwrap();
        let client = client.await.unwrap();

        assert_eq!(client.peer_port().port(), port);
        assert_eq!(accepted.local_port().port(), port);
    }
}
