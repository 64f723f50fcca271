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

//! The service layer of the farcall runtime: the per-context cooperative
//! [`Executor`], the [`HostService`] exposing live objects to peers, and the
//! process-wide [`ClientService`] caching remote-object proxies.

#![forbid(unsafe_code)]

mod client;
pub use client::{ClientService, RemoteObject};

mod config;
pub use config::Config;

mod error;
pub use error::Error;

mod executor;
pub use executor::{Executor, RequestHandler};

pub mod helpers;
pub use helpers::{ContextId, ExecutionContext, MessageQueue};

mod host;
pub use host::{HostService, ServiceContext};

mod registry;
pub use registry::{LocalObject, NamingRegistry, ObjectRegistry};

/// A convenience alias for results produced by the service layer.
pub type Result<T> = std::result::Result<T, Error>;
