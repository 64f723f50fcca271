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

use crate::{codec::DEFAULT_MAX_FRAME_PAYLOAD, Channel, Dialer, Error, HostPort, Listener, Result, Socket, TcpDialer};

use std::{
    collections::{HashMap, VecDeque},
    io,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::{sync::oneshot, task::JoinHandle, time::timeout};
use tracing::{debug, trace, warn};

/// The knobs governing a [`ChannelPool`].
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// The TCP port of the reverse-dial listener; `0` binds an ephemeral port,
    /// queried after the lazy bind.
    pub service_connection_port: u16,
    /// The longest a `fetch` waits on a connect or on a name registration.
    pub dial_timeout: Duration,
    /// The cap on decoded frame payloads for channels the pool creates.
    pub max_frame_payload: usize,
    /// The cap on idle channels kept per host port; excess released channels
    /// are closed.
    pub max_idle_channels_per_port: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            service_connection_port: 0,
            dial_timeout: Duration::from_secs(30),
            max_frame_payload: DEFAULT_MAX_FRAME_PAYLOAD,
            max_idle_channels_per_port: 16,
        }
    }
}

struct ServiceListener {
    port: u16,
    handle: JoinHandle<()>,
}

/// A reusable cache of idle [`Channel`]s keyed by [`HostPort`].
///
/// A channel is either in the pool (idle, nobody reading or writing) or lent
/// out to exactly one caller via [`fetch`](Self::fetch) until
/// [`release`](Self::release)d. The pool also owns the service-connection
/// listener: a lazily-bound port on which peers initiate reverse connections
/// and register themselves under a symbolic name.
pub struct ChannelPool {
    config: PoolConfig,
    tcp_dialer: TcpDialer,
    /// The dialer for device-keyed host ports, installed by integrations.
    device_dialer: RwLock<Option<Arc<dyn Dialer>>>,
    /// The idle channels per host port, most recently released first.
    idle: Mutex<HashMap<HostPort, VecDeque<Arc<Channel>>>>,
    /// The FIFO queues of fetchers blocked on a name registration.
    waiters: Mutex<HashMap<String, VecDeque<(u64, oneshot::Sender<Arc<Channel>>)>>>,
    next_waiter_id: AtomicU64,
    /// The lazily-bound reverse-dial listener.
    listener: tokio::sync::Mutex<Option<ServiceListener>>,
}

impl ChannelPool {
    /// Initializes a new pool with the given configuration.
    pub fn new(config: PoolConfig) -> Arc<Self> {
        let tcp_dialer = TcpDialer::new(config.max_frame_payload);
        Arc::new(Self {
            config,
            tcp_dialer,
            device_dialer: RwLock::new(None),
            idle: Default::default(),
            waiters: Default::default(),
            next_waiter_id: AtomicU64::new(0),
            listener: tokio::sync::Mutex::new(None),
        })
    }

    /// Returns the pool's configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Installs the dialer used for device-keyed host ports.
    pub fn set_device_dialer(&self, dialer: Arc<dyn Dialer>) {
        *self.device_dialer.write() = Some(dialer);
    }

    /// Fetches a channel to the given host port, reusing the most recently
    /// released idle channel when one exists and dialing otherwise.
    ///
    /// The returned channel is owned by the caller until it is passed back via
    /// [`release`](Self::release); a channel that reported a transport error
    /// must be dropped instead.
    pub async fn fetch(self: &Arc<Self>, host_port: &HostPort) -> Result<Arc<Channel>> {
        // Drain unhealthy idle channels until a live one is found.
        loop {
            let candidate = self.idle.lock().get_mut(host_port).and_then(|queue| queue.pop_front());
            match candidate {
                Some(channel) if channel.is_healthy() => return Ok(channel),
                Some(channel) => {
                    debug!("dropping an unhealthy idle channel to {host_port}");
                    tokio::spawn(async move { channel.close().await });
                }
                None => break,
            }
        }

        // The lock is never held across a dial; two racing fetches for the
        // same empty port may both dial, and the extra channel rejoins the
        // idle set on its first release.
        if host_port.device_serial().is_some() {
            let dialer = self.device_dialer.read().clone().ok_or_else(|| {
                Error::Transport(io::Error::new(io::ErrorKind::Unsupported, "no device dialer is installed"))
            })?;
            let channel = self.dial_with_deadline(&*dialer, host_port).await?;
            Ok(Arc::new(channel))
        } else if host_port.port() != 0 {
            let channel = self.dial_with_deadline(&self.tcp_dialer, host_port).await?;
            Ok(Arc::new(channel))
        } else if let Some(name) = host_port.name() {
            self.wait_for_named(name).await
        } else {
            Err(Error::Transport(io::Error::new(io::ErrorKind::InvalidInput, "cannot dial an empty host port")))
        }
    }

    /// Returns a still-healthy channel to the idle set, keyed by its bound
    /// host port. Unhealthy or unbound channels are closed and dropped, as
    /// are channels above the per-port idle cap.
    pub fn release(&self, channel: Arc<Channel>) {
        if !channel.is_healthy() {
            debug!("refusing to re-admit an unhealthy channel to {:?}", channel.host_port());
            tokio::spawn(async move { channel.close().await });
            return;
        }
        let Some(host_port) = channel.host_port() else {
            warn!("refusing to re-admit a channel with no bound host port");
            tokio::spawn(async move { channel.close().await });
            return;
        };

        // A released name-keyed channel may satisfy a blocked fetch.
        if let Some(name) = host_port.name() {
            if self.hand_to_waiter(name, &channel) {
                return;
            }
        }

        let mut idle = self.idle.lock();
        let queue = idle.entry(host_port.clone()).or_default();
        if queue.len() >= self.config.max_idle_channels_per_port {
            drop(idle);
            debug!("the idle set for {host_port} is full; closing the released channel");
            tokio::spawn(async move { channel.close().await });
            return;
        }
        queue.push_front(channel);
    }

    /// Closes and drops all idle channels for the given host port; used when
    /// the remote service is known invalid.
    pub fn remove_all(&self, host_port: &HostPort) {
        let channels = self.idle.lock().remove(host_port).unwrap_or_default();
        if !channels.is_empty() {
            debug!("dropping {} idle channel(s) to {host_port}", channels.len());
        }
        for channel in channels {
            tokio::spawn(async move { channel.close().await });
        }
    }

    /// Returns the number of idle channels for the given host port.
    pub fn count(&self, host_port: &HostPort) -> usize {
        self.idle.lock().get(host_port).map_or(0, |queue| queue.len())
    }

    /// Returns the port of the service-connection listener, binding it on
    /// first use.
    ///
    /// Peers connect to this port and send their chosen name as the first
    /// frame; the pool then records the channel under `HostPort::named(name)`,
    /// waking the longest-blocked fetch for that name if there is one.
    pub async fn service_connection_port(self: &Arc<Self>) -> Result<u16> {
        let mut guard = self.listener.lock().await;
        if let Some(listener) = guard.as_ref() {
            return Ok(listener.port);
        }

        let listener = Listener::bind(self.config.service_connection_port).await?;
        let port = listener.local_port().port();
        debug!("bound the service-connection listener on port {port}");

        let pool = Arc::downgrade(self);
        let handle = listener.spawn(move |socket| {
            let Some(pool) = pool.upgrade() else {
                return;
            };
            let channel = Arc::new(socket.into_channel(pool.config.max_frame_payload));
            tokio::spawn(async move { pool.admit(channel).await });
        });

        *guard = Some(ServiceListener { port, handle });
        Ok(port)
    }

    /// Registers this process under `name` on a peer's service-connection
    /// listener, returning the established channel. The peer can then reach
    /// us by fetching `HostPort::named(name)` from its own pool.
    pub async fn register_name(self: &Arc<Self>, name: &str, service_connection_port: u16) -> Result<Arc<Channel>> {
        let socket = match timeout(self.config.dial_timeout, Socket::connect(service_connection_port)).await {
            Ok(socket) => socket?,
            Err(_) => return Err(Error::Transport(io::ErrorKind::TimedOut.into())),
        };
        let channel = socket.into_channel(self.config.max_frame_payload);
        channel.set_host_port(HostPort::local(service_connection_port));
        channel.send(Bytes::copy_from_slice(name.as_bytes())).await?;
        trace!("registered under the name '{name}' on port {service_connection_port}");
        Ok(Arc::new(channel))
    }

    /// Shuts the pool down: the reverse-dial listener stops accepting and all
    /// idle channels are closed.
    pub async fn shut_down(&self) {
        if let Some(listener) = self.listener.lock().await.take() {
            listener.handle.abort();
        }
        let idle = std::mem::take(&mut *self.idle.lock());
        for channel in idle.into_values().flatten() {
            channel.close().await;
        }
    }

    async fn dial_with_deadline(&self, dialer: &dyn Dialer, host_port: &HostPort) -> Result<Channel> {
        match timeout(self.config.dial_timeout, dialer.dial(host_port)).await {
            Ok(channel) => channel,
            Err(_) => Err(Error::Transport(io::ErrorKind::TimedOut.into())),
        }
    }

    /// Blocks until a peer registers under `name`, first-come first-served
    /// with any other fetcher of the same name.
    async fn wait_for_named(self: &Arc<Self>, name: &str) -> Result<Arc<Channel>> {
        let (sender, receiver) = oneshot::channel();
        let id = self.next_waiter_id.fetch_add(1, Ordering::Relaxed);
        self.waiters.lock().entry(name.to_string()).or_default().push_back((id, sender));

        match timeout(self.config.dial_timeout, receiver).await {
            Ok(Ok(channel)) => Ok(channel),
            // The pool was shut down underneath the waiter.
            Ok(Err(_)) => Err(Error::NameUnavailable(name.to_string())),
            Err(_) => {
                let mut waiters = self.waiters.lock();
                if let Some(queue) = waiters.get_mut(name) {
                    queue.retain(|(waiter_id, _)| *waiter_id != id);
                    if queue.is_empty() {
                        waiters.remove(name);
                    }
                }
                Err(Error::NameUnavailable(name.to_string()))
            }
        }
    }

    /// Performs the name-registration handshake on a freshly accepted reverse
    /// connection.
    async fn admit(self: Arc<Self>, channel: Arc<Channel>) {
        let name = match timeout(self.config.dial_timeout, channel.receive()).await {
            Ok(Ok(Some(payload))) => match String::from_utf8(payload.to_vec()) {
                Ok(name) if !name.is_empty() => name,
                _ => {
                    warn!("dropping a reverse connection that sent a malformed name");
                    channel.close().await;
                    return;
                }
            },
            Ok(Ok(None)) => return,
            Ok(Err(error)) => {
                warn!("dropping a reverse connection that failed before naming itself: {error}");
                return;
            }
            Err(_) => {
                debug!("dropping a reverse connection that never named itself");
                channel.close().await;
                return;
            }
        };

        channel.set_host_port(HostPort::named(&name));
        debug!("a peer registered a reverse channel under the name '{name}'");

        if self.hand_to_waiter(&name, &channel) {
            return;
        }
        let mut idle = self.idle.lock();
        let queue = idle.entry(HostPort::named(&name)).or_default();
        if queue.len() >= self.config.max_idle_channels_per_port {
            drop(idle);
            tokio::spawn(async move { channel.close().await });
            return;
        }
        queue.push_front(channel);
    }

    /// Hands the channel to the longest-blocked fetcher for `name`, skipping
    /// waiters that already gave up. Returns `true` if a waiter took it.
    fn hand_to_waiter(&self, name: &str, channel: &Arc<Channel>) -> bool {
        let mut waiters = self.waiters.lock();
        let Some(queue) = waiters.get_mut(name) else {
            return false;
        };
        while let Some((_, sender)) = queue.pop_front() {
            if sender.send(channel.clone()).is_ok() {
                return true;
            }
        }
        waiters.remove(name);
        false
    }
}

impl Drop for ChannelPool {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Binds a listener that retains every accepted socket, so fetched
    /// channels stay open for the duration of a test.
    async fn accepting_port() -> (u16, JoinHandle<()>, Arc<Mutex<Vec<Socket>>>) {
        let listener = Listener::bind(0).await.unwrap();
        let port = listener.local_port().port();
        let retained = Arc::new(Mutex::new(Vec::new()));
        let handle = {
            let retained = retained.clone();
            listener.spawn(move |socket| retained.lock().push(socket))
        };
        (port, handle, retained)
    }

    fn test_pool(dial_timeout: Duration) -> Arc<ChannelPool> {
        ChannelPool::new(PoolConfig { dial_timeout, max_idle_channels_per_port: 2, ..Default::default() })
    }

    #[tokio::test]
    async fn fetch_dials_and_release_pools() {
        let (port, _accept, _retained) = accepting_port().await;

        let pool = test_pool(Duration::from_secs(1));
        let host_port = HostPort::local(port);

        assert_eq!(pool.count(&host_port), 0);
        let channel = pool.fetch(&host_port).await.unwrap();
        assert_eq!(pool.count(&host_port), 0);

        pool.release(channel);
        assert_eq!(pool.count(&host_port), 1);

        // The idle channel is reused rather than dialing anew.
        let channel = pool.fetch(&host_port).await.unwrap();
        assert_eq!(pool.count(&host_port), 0);
        pool.release(channel);
    }

    #[tokio::test]
    async fn broken_channels_are_not_pooled() {
        let (port, _accept, _retained) = accepting_port().await;

        let pool = test_pool(Duration::from_secs(1));
        let host_port = HostPort::local(port);

        let channel = pool.fetch(&host_port).await.unwrap();
        channel.poison();
        pool.release(channel);
        assert_eq!(pool.count(&host_port), 0);
    }

    #[tokio::test]
    async fn idle_cap_is_enforced() {
        let (port, _accept, _retained) = accepting_port().await;

        let pool = test_pool(Duration::from_secs(1));
        let host_port = HostPort::local(port);

        let mut lent = Vec::new();
        for _ in 0..3 {
            lent.push(pool.fetch(&host_port).await.unwrap());
        }
        for channel in lent {
            pool.release(channel);
        }
        // The cap is 2; the third release was closed instead of pooled.
        assert_eq!(pool.count(&host_port), 2);
    }

    #[tokio::test]
    async fn remove_all_empties_the_idle_set() {
        let (port, _accept, _retained) = accepting_port().await;

        let pool = test_pool(Duration::from_secs(1));
        let host_port = HostPort::local(port);

        let channel = pool.fetch(&host_port).await.unwrap();
        pool.release(channel);
        assert_eq!(pool.count(&host_port), 1);

        pool.remove_all(&host_port);
        assert_eq!(pool.count(&host_port), 0);
    }

    #[tokio::test]
    async fn name_fetch_times_out_without_a_peer() {
        let pool = test_pool(Duration::from_millis(200));
        let result = pool.fetch(&HostPort::named("svc-42")).await;
        assert!(matches!(result, Err(Error::NameUnavailable(name)) if name == "svc-42"));
    }

    #[tokio::test]
    async fn name_registration_satisfies_a_fetch() {
        let pool = test_pool(Duration::from_secs(2));
        let port = pool.service_connection_port().await.unwrap();

        // A peer registers itself under a name; its own pool drives the dial.
        let peer_pool = test_pool(Duration::from_secs(2));
        let peer_channel = peer_pool.register_name("svc-42", port).await.unwrap();

        let channel = pool.fetch(&HostPort::named("svc-42")).await.unwrap();
        assert_eq!(channel.host_port(), Some(HostPort::named("svc-42")));

        // The registered channel is live end to end.
        peer_channel.send(Bytes::from_static(b"ping")).await.unwrap();
        let payload = channel.receive().await.unwrap().unwrap();
        assert_eq!(&payload[..], b"ping");
    }

    #[tokio::test]
    async fn earlier_name_fetch_wins() {
        let pool = test_pool(Duration::from_secs(2));
        let port = pool.service_connection_port().await.unwrap();

        let first = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.fetch(&HostPort::named("svc")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.fetch(&HostPort::named("svc")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let peer_pool = test_pool(Duration::from_secs(2));
        let _peer_channel = peer_pool.register_name("svc", port).await.unwrap();

        // Exactly one connection arrived: the first waiter gets it, the
        // second keeps blocking until its deadline.
        let first = first.await.unwrap();
        assert!(first.is_ok());
        let second = tokio::time::timeout(Duration::from_secs(3), second).await.unwrap().unwrap();
        assert!(matches!(second, Err(Error::NameUnavailable(..))));
    }
}
