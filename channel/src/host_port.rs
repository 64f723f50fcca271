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

use serde::{Deserialize, Serialize};

/// The identity of a reachable endpoint.
///
/// A `HostPort` addresses a peer in one of three ways: a loopback TCP port, a
/// symbolic name a peer has registered on our service-connection listener, or
/// a `(device serial, port)` pair reached through a device multiplexer. It is
/// an immutable value type; equality and hashing cover all three fields.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostPort {
    /// The TCP port of the endpoint; `0` if the endpoint is name-keyed.
    port: u16,
    /// The symbolic name the endpoint registered under, if any.
    name: Option<String>,
    /// The serial number of the device hosting the endpoint, if any.
    device_serial: Option<String>,
}

impl HostPort {
    /// Creates a host port addressing a loopback TCP port.
    pub fn local(port: u16) -> Self {
        Self { port, name: None, device_serial: None }
    }

    /// Creates a name-keyed host port; fetching it waits for a peer to
    /// register under `name` on the service-connection listener.
    pub fn named(name: impl Into<String>) -> Self {
        Self { port: 0, name: Some(name.into()), device_serial: None }
    }

    /// Creates a host port addressing a port on an attached device.
    pub fn device(device_serial: impl Into<String>, port: u16) -> Self {
        Self { port, name: None, device_serial: Some(device_serial.into()) }
    }

    /// Returns the TCP port, or `0` if the endpoint is name-keyed.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the symbolic name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the device serial, if any.
    pub fn device_serial(&self) -> Option<&str> {
        self.device_serial.as_deref()
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.device_serial, &self.name) {
            (Some(serial), _) => write!(f, "device:{serial}:{}", self.port),
            (None, Some(name)) => write!(f, "name:{name}"),
            (None, None) => write!(f, "127.0.0.1:{}", self.port),
        }
    }
}
