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

use crate::{
    helpers::{ContextId, ExecutionContext},
    registry::{LocalObject, NamingRegistry, ObjectRegistry},
    Config, Executor, Result,
};
use farcall_channel::{Channel, ChannelPool, HostPort, Listener, SocketPort};
use farcall_messages::{
    ClassLookupResponse, Message, NameRegisterResponse, ObjectAliveResponse, ObjectReleaseResponse, Request, Response,
    RootObjectResponse, ServicePort,
};

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// The state a request handler runs against: the service identity, its live
/// objects, and its naming registry.
pub struct ServiceContext {
    port: ServicePort,
    context_id: ContextId,
    objects: ObjectRegistry,
    /// The `class name → address` table behind `ClassLookup`.
    classes: RwLock<HashMap<String, u64>>,
    naming: NamingRegistry,
    root_address: u64,
}

impl ServiceContext {
    /// Initializes the context for a host service, registering the root
    /// object as the first entry of the object table.
    pub fn new(port: ServicePort, context_id: ContextId, root_object: LocalObject) -> Self {
        let objects = ObjectRegistry::new();
        let root_address = objects.register(root_object);
        Self { port, context_id, objects, classes: Default::default(), naming: NamingRegistry::new(), root_address }
    }

    /// Initializes the context for a pure client: no listener, a throwaway
    /// identity, and a unit root object.
    pub fn anonymous(context_id: ContextId) -> Self {
        Self::new(ServicePort::new(HostPort::local(0)), context_id, Arc::new(()))
    }

    /// Returns the identity of the owning service.
    pub fn port(&self) -> &ServicePort {
        &self.port
    }

    /// Returns the id of the execution context the service is bound to.
    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    /// Returns the live-object table.
    pub fn objects(&self) -> &ObjectRegistry {
        &self.objects
    }

    /// Returns the naming registry.
    pub fn naming(&self) -> &NamingRegistry {
        &self.naming
    }

    /// Returns the address of the root object.
    pub fn root_address(&self) -> u64 {
        self.root_address
    }

    /// Registers an object under a class name, returning its address.
    pub fn register_class(&self, class_name: impl Into<String>, object: LocalObject) -> u64 {
        let address = self.objects.register(object);
        self.classes.write().insert(class_name.into(), address);
        address
    }

    /// Resolves a registered class name to an object address.
    pub fn class_address(&self, class_name: &str) -> Option<u64> {
        self.classes.read().get(class_name).copied()
    }
}

/// A process-local server exposing live objects to peers.
///
/// The service listens on a TCP port, feeds every accepted channel's requests
/// into the [`Executor`] bound to its [`ExecutionContext`], and owns the
/// address table of objects reachable by the peer. Handlers for the built-in
/// request kinds are installed at construction; the host supplies the
/// `Invocation` handler, since argument marshalling belongs to the language
/// runtime embedding this crate.
pub struct HostService {
    config: Config,
    context: Arc<ServiceContext>,
    execution: Arc<ExecutionContext>,
    executor: Arc<Executor>,
    pool: Arc<ChannelPool>,
    listener_port: SocketPort,
    /// The accept loop and one reader task per adopted channel.
    handles: Mutex<Vec<JoinHandle<()>>>,
    /// The adopted channels, closed when the service is invalidated.
    channels: Mutex<Vec<Arc<Channel>>>,
    invalidated: AtomicBool,
}

impl HostService {
    /// Starts a service listening on `config.service_port` (`0` for an
    /// ephemeral port) with the given root object.
    pub async fn new(root_object: LocalObject, config: Config, pool: Arc<ChannelPool>) -> Result<Arc<Self>> {
        let listener = Listener::bind(config.service_port).await?;
        let listener_port = listener.local_port();

        let execution = ExecutionContext::new(format!("farcall.host.{}", listener_port.port()));
        let executor = Executor::new(&execution);
        let port = ServicePort::new(HostPort::local(listener_port.port()));
        let context = Arc::new(ServiceContext::new(port, execution.id(), root_object));

        let service = Arc::new(Self {
            config,
            context,
            execution,
            executor,
            pool,
            listener_port,
            handles: Default::default(),
            channels: Default::default(),
            invalidated: AtomicBool::new(false),
        });
        service.install_default_handlers();

        let accept = {
            let service = Arc::downgrade(&service);
            listener.spawn(move |socket| {
                let Some(service) = service.upgrade() else {
                    return;
                };
                let channel = Arc::new(socket.into_channel(service.config.max_frame_payload));
                service.adopt_channel(channel);
            })
        };
        service.handles.lock().push(accept);

        debug!("the service {} is listening", service.context.port());
        Ok(service)
    }

    /// Returns the service identity.
    pub fn service_port(&self) -> &ServicePort {
        self.context.port()
    }

    /// Returns the address peers dial to reach this service.
    pub fn host_port(&self) -> HostPort {
        HostPort::local(self.listener_port.port())
    }

    /// Returns the bound listener address.
    pub fn local_port(&self) -> SocketPort {
        self.listener_port
    }

    /// Returns the executor bound to this service's context.
    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    /// Returns the handler-facing service state.
    pub fn context(&self) -> &Arc<ServiceContext> {
        &self.context
    }

    /// Returns the execution context the service serialises on.
    pub fn execution(&self) -> &Arc<ExecutionContext> {
        &self.execution
    }

    /// Returns the pool the service shares with its clients.
    pub fn pool(&self) -> &Arc<ChannelPool> {
        &self.pool
    }

    /// Registers an additional object, returning the address peers can target.
    pub fn register_object(&self, object: LocalObject) -> u64 {
        self.context.objects().register(object)
    }

    /// Registers an object under a class name resolvable via `ClassLookup`.
    pub fn register_class(&self, class_name: impl Into<String>, object: LocalObject) -> u64 {
        self.context.register_class(class_name, object)
    }

    /// Registers this service under `name` on a peer's service-connection
    /// listener and starts serving requests arriving on the reverse channel.
    ///
    /// This is how a process the peer cannot dial directly (e.g. one on an
    /// attached device) makes itself reachable: the peer's pool hands the
    /// registered channel to a `fetch(HostPort::named(name))` on its side.
    pub async fn register_to(self: &Arc<Self>, name: &str, service_connection_port: u16) -> Result<()> {
        let channel = self.pool.register_name(name, service_connection_port).await?;
        self.adopt_channel(channel);
        Ok(())
    }

    /// Ties an established channel to this service: requests read off it are
    /// routed through the executor, responses are shipped back on it.
    pub fn adopt_channel(self: &Arc<Self>, channel: Arc<Channel>) {
        if self.invalidated.load(Ordering::SeqCst) {
            warn!("{} is invalidated; dropping a new channel", self.context.port());
            return;
        }
        self.channels.lock().push(channel.clone());

        let service = self.clone();
        let reader = tokio::spawn(async move {
            loop {
                match channel.receive().await {
                    Ok(Some(payload)) => match Message::deserialize(payload) {
                        Ok(Message::Request(request)) => {
                            trace!("{} received a '{}' request", service.context.port(), request.name());
                            service.executor.receive(request, &channel, &service.context);
                        }
                        Ok(Message::Response(response)) => {
                            debug!("ignoring an unsolicited '{}' response", response.name());
                        }
                        Err(error) => {
                            warn!("closing a channel that sent a malformed envelope: {error}");
                            channel.poison();
                            channel.close().await;
                            break;
                        }
                    },
                    Ok(None) => break,
                    Err(error) => {
                        debug!("a channel serving {} failed: {error}", service.context.port());
                        channel.close().await;
                        break;
                    }
                }
            }
        });
        self.handles.lock().push(reader);
    }

    /// Invalidates the service: the listener and readers stop, adopted
    /// channels close, the object table drains, and idle pooled channels to
    /// this service are dropped. Idempotent.
    pub async fn invalidate(&self) {
        if self.invalidated.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("invalidating the service {}", self.context.port());

        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
        let channels: Vec<_> = self.channels.lock().drain(..).collect();
        for channel in channels {
            channel.close().await;
        }
        self.context.objects().clear();
        self.pool.remove_all(self.context.port().host_port());
        self.execution.shut_down();
    }

    /// Installs the handlers for the built-in request kinds. `Invocation` is
    /// deliberately left to the host.
    fn install_default_handlers(&self) {
        self.executor.register_handler("RootObject", |request, context| async move {
            let Request::RootObject(request) = request else {
                anyhow::bail!("mismatched request kind");
            };
            Ok(Response::RootObject(RootObjectResponse::new(&request, context.root_address(), context.port().clone())))
        });

        self.executor.register_handler("ObjectAlive", |request, context| async move {
            let Request::ObjectAlive(request) = request else {
                anyhow::bail!("mismatched request kind");
            };
            let alive = context.objects().contains(request.address);
            Ok(Response::ObjectAlive(ObjectAliveResponse::new(&request, alive)))
        });

        self.executor.register_handler("ClassLookup", |request, context| async move {
            let Request::ClassLookup(request) = request else {
                anyhow::bail!("mismatched request kind");
            };
            let response = match context.class_address(&request.class_name) {
                Some(address) => ClassLookupResponse::found(&request, address, context.port().clone()),
                None => ClassLookupResponse::not_found(&request),
            };
            Ok(Response::ClassLookup(response))
        });

        self.executor.register_handler("ObjectRelease", |request, context| async move {
            let Request::ObjectRelease(request) = request else {
                anyhow::bail!("mismatched request kind");
            };
            // The root object stays pinned for the lifetime of the service.
            if request.address != context.root_address() && context.objects().remove(request.address) {
                trace!("released the object at address {}", request.address);
            }
            Ok(Response::ObjectRelease(ObjectReleaseResponse::new(&request)))
        });

        self.executor.register_handler("NameRegister", |request, context| async move {
            let Request::NameRegister(request) = request else {
                anyhow::bail!("mismatched request kind");
            };
            let registered = context.naming().register(&request.name, request.host_port.clone());
            Ok(Response::NameRegister(NameRegisterResponse::new(&request, registered)))
        });
    }
}

impl Drop for HostService {
    fn drop(&mut self) {
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}
