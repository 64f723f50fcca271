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

use crate::{codec::FrameCodec, Error, HostPort, Result, Socket, SocketPort};

use std::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf},
    sync::{watch, Mutex},
};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::trace;

/// A bidirectional byte stream a [`Channel`] can be built over: a TCP stream,
/// or the stream a device multiplexer yields for a tunnelled connection.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ByteStream for T {}

type Reader = FramedRead<ReadHalf<Box<dyn ByteStream>>, FrameCodec>;
type Writer = FramedWrite<WriteHalf<Box<dyn ByteStream>>, FrameCodec>;

/// A framed bidirectional endpoint over one byte stream.
///
/// Payloads written by a single sender are observed by the peer in order;
/// concurrent senders are serialised by the internal write lock. A channel is
/// not safe for two concurrent readers, and the pool enforces single-user
/// lending; the read lock here only guards against misuse.
///
/// A transport or protocol failure poisons the channel: subsequent sends fail
/// with [`Error::Closed`] and a pool will refuse to re-admit it.
pub struct Channel {
    /// The host port this channel is bound to, assigned lazily for channels
    /// accepted before the peer identifies itself.
    host_port: RwLock<Option<HostPort>>,
    /// The local socket address, if the stream is a plain TCP connection.
    local: Option<SocketPort>,
    /// The peer socket address, if the stream is a plain TCP connection.
    peer: Option<SocketPort>,
    reader: Mutex<Reader>,
    writer: Mutex<Writer>,
    /// Set once `close` is called; receivers blocked on the stream observe EOF.
    closed: watch::Sender<bool>,
    /// Set on the first transport or protocol failure.
    broken: AtomicBool,
}

impl Channel {
    /// Initializes a channel over an arbitrary byte stream, e.g. a device
    /// tunnel. The socket addresses are unknown for such streams.
    pub fn new(stream: Box<dyn ByteStream>, max_frame_payload: usize) -> Self {
        Self::with_ports(stream, max_frame_payload, None, None)
    }

    /// Initializes a channel over a connected [`Socket`], consuming it.
    pub(crate) fn from_socket(socket: Socket, max_frame_payload: usize) -> Self {
        let (stream, local, peer) = socket.into_parts();
        Self::with_ports(Box::new(stream), max_frame_payload, Some(local), Some(peer))
    }

    fn with_ports(
        stream: Box<dyn ByteStream>,
        max_frame_payload: usize,
        local: Option<SocketPort>,
        peer: Option<SocketPort>,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            host_port: RwLock::new(None),
            local,
            peer,
            reader: Mutex::new(FramedRead::new(read_half, FrameCodec::new(max_frame_payload))),
            writer: Mutex::new(FramedWrite::new(write_half, FrameCodec::new(max_frame_payload))),
            closed: watch::channel(false).0,
            broken: AtomicBool::new(false),
        }
    }

    /// Returns the host port this channel is bound to, if assigned.
    pub fn host_port(&self) -> Option<HostPort> {
        self.host_port.read().clone()
    }

    /// Binds the channel to a host port; used after the peer identifies
    /// itself, or right after a dial.
    pub fn set_host_port(&self, host_port: HostPort) {
        *self.host_port.write() = Some(host_port);
    }

    /// Returns the local socket address, if the stream is a TCP connection.
    pub fn local_port(&self) -> Option<SocketPort> {
        self.local
    }

    /// Returns the peer socket address, if the stream is a TCP connection.
    pub fn peer_port(&self) -> Option<SocketPort> {
        self.peer
    }

    /// Sends one payload as a single frame.
    ///
    /// Payloads from concurrent senders are serialised whole; a frame is never
    /// interleaved with another.
    pub async fn send(&self, payload: Bytes) -> Result<()> {
        if self.is_closed() || self.is_broken() {
            return Err(Error::Closed);
        }

        let mut writer = self.writer.lock().await;
        match writer.send(payload).await {
            Ok(()) => Ok(()),
            Err(error) => {
                self.poison();
                Err(error)
            }
        }
    }

    /// Receives the next payload.
    ///
    /// Returns `Ok(None)` on a clean end of stream: the peer hung up, or the
    /// channel was closed locally while this receiver was blocked.
    pub async fn receive(&self) -> Result<Option<Bytes>> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Ok(None);
        }
        if self.is_broken() {
            return Err(Error::Closed);
        }

        let mut reader = self.reader.lock().await;
        tokio::select! {
            _ = closed.changed() => Ok(None),
            frame = reader.next() => match frame {
                Some(Ok(payload)) => Ok(Some(payload)),
                Some(Err(error)) => {
                    self.poison();
                    Err(error)
                }
                None => Ok(None),
            },
        }
    }

    /// Closes the channel: pending receivers observe EOF and subsequent sends
    /// fail with [`Error::Closed`]. Closing twice is a no-op.
    pub async fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        trace!("closing the channel to {}", self.describe());

        let mut writer = self.writer.lock().await;
        if let Err(error) = writer.close().await {
            trace!("failed to shut down the write half to {}: {error}", self.describe());
        }
    }

    /// Returns `true` if the channel was closed locally.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Returns `true` if the channel observed a transport or protocol failure.
    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::SeqCst)
    }

    /// Returns `true` if the channel can still be lent out by a pool.
    pub fn is_healthy(&self) -> bool {
        !self.is_closed() && !self.is_broken()
    }

    /// Marks the channel as failed so it can never rejoin a pool; used by
    /// callers that time out on a pending exchange and must evict it.
    pub fn poison(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    fn describe(&self) -> String {
        match (self.host_port(), self.peer) {
            (Some(host_port), _) => host_port.to_string(),
            (None, Some(peer)) => peer.to_string(),
            (None, None) => "an unbound peer".into(),
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("host_port", &self.host_port())
            .field("local", &self.local)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .field("broken", &self.is_broken())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Listener, DEFAULT_MAX_FRAME_PAYLOAD};

    use std::{sync::Arc, time::Duration};

    async fn channel_pair() -> (Channel, Channel) {
        let listener = Listener::bind(0).await.unwrap();
        let port = listener.local_port().port();

        let dialer = tokio::spawn(async move { Socket::connect(port).await.unwrap() });
        let accepted = listener.accept().await.unwrap();
        let dialed = dialer.await.unwrap();

        (dialed.into_channel(DEFAULT_MAX_FRAME_PAYLOAD), accepted.into_channel(DEFAULT_MAX_FRAME_PAYLOAD))
    }

    #[tokio::test]
    async fn payloads_round_trip_in_order() {
        let (alice, bob) = channel_pair().await;

        for i in 0..10u8 {
            alice.send(Bytes::from(vec![i; 8])).await.unwrap();
        }
        for i in 0..10u8 {
            let payload = bob.receive().await.unwrap().unwrap();
            assert_eq!(&payload[..], &[i; 8]);
        }
    }

    #[tokio::test]
    async fn empty_payload_round_trips() {
        let (alice, bob) = channel_pair().await;

        alice.send(Bytes::new()).await.unwrap();
        let payload = bob.receive().await.unwrap().unwrap();
        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn peer_hangup_is_eof() {
        let (alice, bob) = channel_pair().await;

        alice.close().await;
        drop(alice);
        assert!(bob.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn local_close_wakes_blocked_receiver() {
        let (_alice, bob) = channel_pair().await;
        let bob = Arc::new(bob);

        let receiver = {
            let bob = bob.clone();
            tokio::spawn(async move { bob.receive().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        bob.close().await;

        let received = tokio::time::timeout(Duration::from_secs(1), receiver).await.unwrap().unwrap();
        assert!(received.unwrap().is_none());
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (alice, _bob) = channel_pair().await;

        alice.close().await;
        assert!(matches!(alice.send(Bytes::from_static(b"late")).await, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn bad_frame_poisons_the_reader() {
        use tokio::io::AsyncWriteExt;

        let listener = Listener::bind(0).await.unwrap();
        let port = listener.local_port().port();

        let writer = tokio::spawn(async move {
            let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            // A frame with the third byte of the tag mutated.
            stream.write_all(&[0, 0, 0, 1, 0xC0, 0x80, 0x81, 0x80, 0, 0, 0, 5]).await.unwrap();
            stream.write_all(b"hello").await.unwrap();
            stream
        });

        let channel = listener.accept().await.unwrap().into_channel(DEFAULT_MAX_FRAME_PAYLOAD);
        let _stream = writer.await.unwrap();

        assert!(matches!(channel.receive().await, Err(Error::Protocol(..))));
        assert!(!channel.is_healthy());
    }
}
