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
    helpers::{ContextId, ExecutionContext, MessageQueue},
    Error, ServiceContext,
};
use farcall_channel::Channel;
use farcall_messages::{ErrorResponse, Message, Request, Response};

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Weak},
    time::Duration,
};

use futures_util::future::BoxFuture;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace, warn};

/// A request handler: resolves one request kind into its response on behalf
/// of a service. Returning an error folds into an error *response*; it never
/// tears down the channel the request arrived on.
pub type RequestHandler =
    Arc<dyn Fn(Request, Arc<ServiceContext>) -> BoxFuture<'static, anyhow::Result<Response>> + Send + Sync>;

/// One unit of work for an executor's drain loop.
enum ExecutorMessage {
    /// An inbound request to handle on the bound context.
    Inbound { request: Request, channel: Arc<Channel>, context: Arc<ServiceContext> },
    /// The response matching the pending outbound request has arrived.
    Completed(Response),
    /// The exchange failed before a response was observed.
    Failed(Error),
}

/// The process-wide `context → executor` registry, letting inbound readers
/// resolve the executor for a service's context without thread-locals.
static EXECUTORS: Lazy<RwLock<HashMap<ContextId, Weak<Executor>>>> = Lazy::new(Default::default);

/// The per-context cooperative executor.
///
/// An executor binds to one [`ExecutionContext`] and interleaves outbound
/// synchronous requests with inbound dispatches targeted at the same context.
/// While [`send_request`](Self::send_request) waits for its response, the
/// calling task drains an internal queue and runs inbound handlers in place,
/// so a peer that calls back into us mid-request cannot deadlock the context.
pub struct Executor {
    /// The bound context; weak, so an abandoned service does not keep its
    /// worker alive through the registry.
    context: Weak<ExecutionContext>,
    context_id: ContextId,
    /// The handlers keyed by request-kind name.
    handlers: RwLock<HashMap<String, RequestHandler>>,
    /// The stack of open inbound queues: empty when idle, one entry per
    /// nested `send_request` while looping. Inbound routing targets the
    /// innermost open queue.
    queues: Mutex<Vec<Arc<MessageQueue<ExecutorMessage>>>>,
}

impl Executor {
    /// Initializes the executor for a context, replacing any previous one
    /// bound to it. A context has at most one executor at a time.
    pub fn new(context: &Arc<ExecutionContext>) -> Arc<Self> {
        let executor = Arc::new(Self {
            context: Arc::downgrade(context),
            context_id: context.id(),
            handlers: Default::default(),
            queues: Default::default(),
        });
        EXECUTORS.write().insert(context.id(), Arc::downgrade(&executor));
        executor
    }

    /// Resolves the executor bound to the given context, if one is alive.
    pub fn for_context(id: ContextId) -> Option<Arc<Self>> {
        EXECUTORS.read().get(&id)?.upgrade()
    }

    /// Returns the id of the bound context.
    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    /// Registers the handler for a request kind, replacing any previous one.
    pub fn register_handler<F, Fut>(&self, kind: impl Into<String>, handler: F)
    where
        F: Fn(Request, Arc<ServiceContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Response>> + Send + 'static,
    {
        let handler: RequestHandler = Arc::new(move |request, context| Box::pin(handler(request, context)));
        self.handlers.write().insert(kind.into(), handler);
    }

    /// Sends a request over the channel and waits for the matching response,
    /// handling any inbound requests for this context in the meantime.
    ///
    /// Must be called on the bound context (from a handler, or from the task
    /// that owns the context); the caller's task is the one that runs nested
    /// inbound handlers while waiting. On deadline expiry the channel is
    /// poisoned, so the caller must drop it rather than re-pool it, and
    /// [`Error::Timeout`] is returned.
    pub async fn send_request(
        self: &Arc<Self>,
        request: Request,
        channel: &Arc<Channel>,
        context: &Arc<ServiceContext>,
        deadline: Option<Duration>,
    ) -> Result<Response, Error> {
        let queue = Arc::new(MessageQueue::new());
        self.queues.lock().push(queue.clone());

        let message_id = request.message_id().to_string();
        trace!("sending a '{}' request ({message_id}) on {}", request.name(), self.context_id);

        let relay = tokio::spawn(relay_exchange(
            self.clone(),
            request,
            channel.clone(),
            context.clone(),
            queue.clone(),
        ));

        let expiry = deadline.map(|timeout| Instant::now() + timeout);
        let result = loop {
            let message = match expiry {
                Some(expiry) => match timeout_at(expiry, queue.dequeue()).await {
                    Ok(message) => message,
                    Err(_) => break Err(Error::Timeout),
                },
                None => queue.dequeue().await,
            };

            match message {
                Some(ExecutorMessage::Inbound { request, channel, context }) => {
                    // We are already on the bound context; run the handler in
                    // place and ship its response on the originating channel.
                    self.handle_request(request, &channel, &context).await;
                }
                Some(ExecutorMessage::Completed(response)) => break Ok(response),
                Some(ExecutorMessage::Failed(error)) => break Err(error),
                None => break Err(Error::Channel(farcall_channel::Error::Closed)),
            }
        };

        queue.close();
        relay.abort();
        self.pop_queue(&queue);

        // Anything still queued was enqueued before the close; re-route it so
        // an enclosing loop or the context itself picks it up.
        while let Some(message) = queue.dequeue().await {
            if let ExecutorMessage::Inbound { request, channel, context } = message {
                self.receive(request, &channel, &context);
            }
        }

        if matches!(result, Err(Error::Timeout)) {
            debug!("a request on {} timed out; evicting its channel", self.context_id);
            channel.poison();
        }

        result
    }

    /// Routes an inbound request to this executor.
    ///
    /// While a `send_request` loop is open the request is enqueued to the
    /// innermost loop and handled on the bound context as part of the drain;
    /// otherwise it is dispatched to the context as a standalone job.
    pub fn receive(self: &Arc<Self>, request: Request, channel: &Arc<Channel>, context: &Arc<ServiceContext>) {
        let queues: Vec<_> = self.queues.lock().iter().rev().cloned().collect();
        for queue in queues {
            let message =
                ExecutorMessage::Inbound { request: request.clone(), channel: channel.clone(), context: context.clone() };
            if queue.enqueue(message) {
                return;
            }
        }

        let Some(worker) = self.context.upgrade() else {
            warn!("the context behind {} is gone; dropping a '{}' request", self.context_id, request.name());
            return;
        };
        let executor = self.clone();
        let channel = channel.clone();
        let context = context.clone();
        let kind = request.name();
        let dispatched = worker.dispatch(async move {
            executor.handle_request(request, &channel, &context).await;
        });
        if !dispatched {
            warn!("{} has shut down; dropping a '{kind}' request", self.context_id);
        }
    }

    /// Resolves and runs the handler for one inbound request, then ships the
    /// response back on the originating channel. Handler failures and unknown
    /// kinds produce error responses; only a dead channel is logged and
    /// swallowed.
    pub(crate) async fn handle_request(&self, request: Request, channel: &Arc<Channel>, context: &Arc<ServiceContext>) {
        let message_id = request.message_id().to_string();
        let kind = request.name().into_owned();

        let response = if let Some(uuid) = request.service_uuid().filter(|uuid| !context.port().matches_uuid(uuid)) {
            debug!("rejecting a '{kind}' request for foreign service {uuid}");
            Response::Error(ErrorResponse::service_mismatch(message_id.as_str(), uuid))
        } else {
            let handler = self.handlers.read().get(&kind).cloned();
            match handler {
                None => Response::Error(ErrorResponse::unsupported(message_id.as_str(), &kind)),
                Some(handler) => match handler(request, context.clone()).await {
                    Ok(response) => response,
                    Err(error) => {
                        warn!("the '{kind}' handler failed: {error:#}");
                        Response::Error(ErrorResponse::handler_failure(message_id.as_str(), format!("{error:#}")))
                    }
                },
            }
        };

        let payload = match Message::Response(response).serialize() {
            Ok(payload) => payload,
            Err(error) => {
                warn!("failed to serialise the '{kind}' response ({message_id}): {error}");
                return;
            }
        };
        if let Err(error) = channel.send(payload).await {
            warn!("failed to ship the '{kind}' response ({message_id}): {error}");
        }
    }

    fn pop_queue(&self, queue: &Arc<MessageQueue<ExecutorMessage>>) {
        let mut queues = self.queues.lock();
        if let Some(position) = queues.iter().rposition(|candidate| Arc::ptr_eq(candidate, queue)) {
            queues.remove(position);
        }
    }
}

/// The background half of one exchange: writes the request, then reads frames
/// until the matching response, a transport failure, or EOF, routing inbound
/// requests back through the executor as they arrive.
async fn relay_exchange(
    executor: Arc<Executor>,
    request: Request,
    channel: Arc<Channel>,
    context: Arc<ServiceContext>,
    queue: Arc<MessageQueue<ExecutorMessage>>,
) {
    let message_id = request.message_id().to_string();

    let payload = match Message::Request(request).serialize() {
        Ok(payload) => payload,
        Err(error) => {
            queue.enqueue(ExecutorMessage::Failed(error.into()));
            queue.close();
            return;
        }
    };
    if let Err(error) = channel.send(payload).await {
        queue.enqueue(ExecutorMessage::Failed(error.into()));
        queue.close();
        return;
    }

    loop {
        match channel.receive().await {
            Ok(Some(payload)) => match Message::deserialize(payload) {
                Ok(Message::Response(response)) if response.message_id() == message_id => {
                    queue.enqueue(ExecutorMessage::Completed(response));
                    queue.close();
                    return;
                }
                Ok(Message::Response(stale)) => {
                    debug!("dropping a stale '{}' response ({})", stale.name(), stale.message_id());
                }
                Ok(Message::Request(inbound)) => {
                    executor.receive(inbound, &channel, &context);
                }
                Err(error) => {
                    // A malformed envelope on a healthy frame stream; the
                    // channel cannot be trusted with further exchanges.
                    channel.poison();
                    queue.enqueue(ExecutorMessage::Failed(error.into()));
                    queue.close();
                    return;
                }
            },
            Ok(None) => {
                queue.enqueue(ExecutorMessage::Failed(Error::Channel(farcall_channel::Error::Closed)));
                queue.close();
                return;
            }
            Err(error) => {
                queue.enqueue(ExecutorMessage::Failed(error.into()));
                queue.close();
                return;
            }
        }
    }
}
