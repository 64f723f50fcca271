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

use std::fmt;

use farcall_channel::HostPort;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The identity a host service stamps on the objects it vends: the address it
/// listens on plus a UUID generated at construction.
///
/// A request that carries an object address also carries the service UUID, so
/// a service restarted on a recycled port cannot be handed an address minted
/// by its predecessor.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServicePort {
    host_port: HostPort,
    service_uuid: String,
}

impl ServicePort {
    /// Initializes a service port with a freshly generated UUID.
    pub fn new(host_port: HostPort) -> Self {
        Self { host_port, service_uuid: Uuid::new_v4().to_string() }
    }

    /// Initializes a service port with the given UUID.
    pub fn with_uuid(host_port: HostPort, service_uuid: impl Into<String>) -> Self {
        Self { host_port, service_uuid: service_uuid.into() }
    }

    /// Returns the address the service listens on.
    pub fn host_port(&self) -> &HostPort {
        &self.host_port
    }

    /// Returns the service UUID.
    pub fn uuid(&self) -> &str {
        &self.service_uuid
    }

    /// Returns `true` if the given UUID belongs to this service.
    pub fn matches_uuid(&self, uuid: &str) -> bool {
        self.service_uuid == uuid
    }
}

impl fmt::Display for ServicePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.host_port, self.service_uuid)
    }
}
