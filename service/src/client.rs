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

use crate::{helpers::ExecutionContext, Config, Error, Executor, Result, ServiceContext};
use farcall_channel::{ChannelPool, HostPort};
use farcall_messages::{
    ClassLookupRequest, ErrorKind, InvocationRequest, InvocationResponse, ObjectAliveRequest, ObjectReleaseRequest,
    Request, Response, RootObjectRequest, ServicePort,
};

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, trace};

/// The process-wide registry of remote-object proxies.
///
/// A remote object round-trips to the same [`RemoteObject`] instance while a
/// strong reference to it exists anywhere in the process, so identity
/// comparisons of proxies behave like identity comparisons of the objects
/// they stand for. Entries are weak; dropping the last reference schedules an
/// `ObjectRelease` to the originating service.
pub struct ClientService {
    config: Config,
    pool: Arc<ChannelPool>,
    /// The client's own serial context, used when the caller is not running
    /// on a host service's context.
    execution: Arc<ExecutionContext>,
    executor: Arc<Executor>,
    context: Arc<ServiceContext>,
    /// The proxies keyed by `(service UUID, object address)`.
    proxies: Mutex<HashMap<(String, u64), Weak<RemoteObject>>>,
}

static SHARED: Lazy<Arc<ClientService>> = Lazy::new(|| ClientService::new(Config::default()));

impl ClientService {
    /// Returns the process-wide client service. The first access must happen
    /// inside a tokio runtime.
    pub fn shared() -> Arc<Self> {
        SHARED.clone()
    }

    /// Initializes a standalone client service with its own pool.
    pub fn new(config: Config) -> Arc<Self> {
        let pool = ChannelPool::new(config.pool_config());
        Self::with_pool(config, pool)
    }

    /// Initializes a client service sharing an existing pool.
    pub fn with_pool(config: Config, pool: Arc<ChannelPool>) -> Arc<Self> {
        let execution = ExecutionContext::new("farcall.client");
        let executor = Executor::new(&execution);
        let context = Arc::new(ServiceContext::anonymous(execution.id()));
        Arc::new(Self { config, pool, execution, executor, context, proxies: Default::default() })
    }

    /// Returns the pool the client fetches channels from.
    pub fn pool(&self) -> &Arc<ChannelPool> {
        &self.pool
    }

    /// Returns the client's executor.
    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    /// Returns the client's serial context.
    pub fn execution(&self) -> &Arc<ExecutionContext> {
        &self.execution
    }

    /// Returns the state the client's executor runs handlers against.
    pub fn context(&self) -> &Arc<ServiceContext> {
        &self.context
    }

    /// Retrieves the root object of the service listening on `host_port`.
    pub async fn root_object(self: &Arc<Self>, host_port: &HostPort) -> Result<Arc<RemoteObject>> {
        let request = Request::RootObject(RootObjectRequest::new());
        match self.request(host_port, request).await? {
            Response::RootObject(response) => Ok(self.intern(host_port, response.address, response.service_port)),
            response => Err(unexpected("RootObject", &response)),
        }
    }

    /// Retrieves the object the peer registered under `class_name`, or `None`
    /// if the peer does not know the name.
    pub async fn class_object(self: &Arc<Self>, class_name: &str, host_port: &HostPort) -> Result<Option<Arc<RemoteObject>>> {
        let request = Request::ClassLookup(ClassLookupRequest::new(class_name));
        match self.request(host_port, request).await? {
            Response::ClassLookup(response) => match (response.address, response.service_port) {
                (Some(address), Some(service_port)) => Ok(Some(self.intern(host_port, address, service_port))),
                _ => Ok(None),
            },
            response => Err(unexpected("ClassLookup", &response)),
        }
    }

    /// Performs one request/response exchange with the service at
    /// `host_port`, riding a pooled channel.
    ///
    /// A successful exchange releases the channel back to the pool; a failed
    /// one drops it, so the pool count is unchanged by faulty channels.
    pub async fn request(self: &Arc<Self>, host_port: &HostPort, request: Request) -> Result<Response> {
        let channel = self.pool.fetch(host_port).await?;
        let result =
            self.executor.send_request(request, &channel, &self.context, Some(self.config.request_timeout)).await;

        match result {
            Ok(response) => {
                self.pool.release(channel);
                into_service_result(response)
            }
            Err(error) => {
                // The channel is poisoned or timed out; it never rejoins the pool.
                debug!("an exchange with {host_port} failed: {error}");
                Err(error)
            }
        }
    }

    fn intern(self: &Arc<Self>, host_port: &HostPort, address: u64, service_port: ServicePort) -> Arc<RemoteObject> {
        let key = (service_port.uuid().to_string(), address);
        let mut proxies = self.proxies.lock();
        if let Some(existing) = proxies.get(&key).and_then(Weak::upgrade) {
            return existing;
        }

        trace!("interning a proxy for {}@{}", address, service_port);
        let proxy = Arc::new(RemoteObject {
            address,
            service: service_port,
            dial: host_port.clone(),
            client: Arc::downgrade(self),
        });
        proxies.insert(key, Arc::downgrade(&proxy));
        proxy
    }

    fn forget(&self, service_uuid: &str, address: u64) {
        self.proxies.lock().remove(&(service_uuid.to_string(), address));
    }
}

/// A proxy standing for an object resident in a peer process.
pub struct RemoteObject {
    address: u64,
    service: ServicePort,
    /// The host port the proxy dials to reach its service.
    dial: HostPort,
    client: Weak<ClientService>,
}

impl RemoteObject {
    /// Returns the object's address inside its service.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Returns the identity of the service holding the object.
    pub fn service(&self) -> &ServicePort {
        &self.service
    }

    /// Returns the host port the proxy dials.
    pub fn host_port(&self) -> &HostPort {
        &self.dial
    }

    /// Invokes a method on the remote object, blocking until its result
    /// crosses back.
    pub async fn call(
        &self,
        selector: Option<&str>,
        arguments: Vec<u8>,
        return_by_value: bool,
    ) -> Result<InvocationResponse> {
        let client = self.client()?;
        let request = Request::Invocation(InvocationRequest::new(
            self.address,
            selector.map(Into::into),
            arguments,
            return_by_value,
            self.service.uuid(),
        ));
        match client.request(&self.dial, request).await? {
            Response::Invocation(response) => Ok(response),
            response => Err(unexpected("Invocation", &response)),
        }
    }

    /// Returns `true` if the object behind this proxy is still registered
    /// with its service.
    pub async fn is_alive(&self) -> Result<bool> {
        let client = self.client()?;
        let request = Request::ObjectAlive(ObjectAliveRequest::new(self.address, self.service.uuid()));
        match client.request(&self.dial, request).await? {
            Response::ObjectAlive(response) => Ok(response.alive),
            response => Err(unexpected("ObjectAlive", &response)),
        }
    }

    fn client(&self) -> Result<Arc<ClientService>> {
        self.client.upgrade().ok_or(Error::Channel(farcall_channel::Error::Closed))
    }
}

impl Drop for RemoteObject {
    fn drop(&mut self) {
        let Some(client) = self.client.upgrade() else {
            return;
        };
        client.forget(self.service.uuid(), self.address);

        // Fire-and-forget: let the service unpin the object. Outside a
        // runtime there is nothing to ride on, and the peer's periodic
        // aliveness sweep reclaims the entry instead.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let request = Request::ObjectRelease(ObjectReleaseRequest::new(self.address, self.service.uuid()));
        let host_port = self.dial.clone();
        handle.spawn(async move {
            if let Err(error) = client.request(&host_port, request).await {
                debug!("failed to release a remote object on {host_port}: {error}");
            }
        });
    }
}

/// Maps an error response from the peer into the matching error kind; regular
/// responses pass through.
fn into_service_result(response: Response) -> Result<Response> {
    match response {
        Response::Error(error) => Err(match error.kind {
            ErrorKind::UnsupportedRequest => Error::UnsupportedRequest(error.message),
            ErrorKind::Handler => Error::Handler(error.message),
            ErrorKind::ServiceMismatch => Error::ServiceMismatch(error.message),
        }),
        response => Ok(response),
    }
}

fn unexpected(expected: &str, response: &Response) -> Error {
    Error::Handler(format!("expected a '{expected}' response, received '{}'", response.name()))
}
