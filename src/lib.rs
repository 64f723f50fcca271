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

//! farcall is a cross-process distributed-object runtime: two processes on
//! the same host (or a host and an attached device reached through a device
//! multiplexer) expose live objects to each other, so a method call in one
//! process executes against an object resident in the other and returns its
//! result, or a further proxy, across a framed socket.
//!
//! The crates compose bottom-up:
//! - [`channel`]: the framed transport with the codec, sockets, [`Channel`], and the
//!   [`ChannelPool`] with its reverse-dial listener;
//! - [`messages`]: the request/response envelopes riding the frames;
//! - [`service`]: the per-context cooperative [`Executor`], the
//!   [`HostService`] exposing objects, and the [`ClientService`] caching
//!   proxies.

#![forbid(unsafe_code)]

pub use farcall_channel as channel;
pub use farcall_messages as messages;
pub use farcall_service as service;

pub use farcall_channel::{
    ByteStream, Channel, ChannelPool, Dialer, FrameCodec, HostPort, Listener, PoolConfig, Socket, SocketPort,
};
pub use farcall_messages::{Message, Request, Response, ServicePort};
pub use farcall_service::{
    ClientService, Config, ExecutionContext, Executor, HostService, LocalObject, MessageQueue, RemoteObject,
    ServiceContext,
};
