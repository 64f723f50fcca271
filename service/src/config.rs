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

use std::time::Duration;

use farcall_channel::{PoolConfig, DEFAULT_MAX_FRAME_PAYLOAD};

/// The runtime knobs for services and the pool they share.
///
/// Everything is configured here; the runtime reads no environment variables
/// and persists no state.
#[derive(Clone, Debug)]
pub struct Config {
    /// The TCP port a host service listens on; `0` binds an ephemeral port.
    pub service_port: u16,
    /// The TCP port of the reverse-dial listener; `0` binds an ephemeral
    /// port, queried after the lazy bind.
    pub service_connection_port: u16,
    /// The longest a pool `fetch` waits on a connect or a name registration.
    pub dial_timeout: Duration,
    /// The longest an outbound request waits for its response.
    pub request_timeout: Duration,
    /// The hard cap on decoded frame payloads.
    pub max_frame_payload: usize,
    /// The cap on idle pooled channels per host port.
    pub max_idle_channels_per_port: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_port: 0,
            service_connection_port: 0,
            dial_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            max_frame_payload: DEFAULT_MAX_FRAME_PAYLOAD,
            max_idle_channels_per_port: 16,
        }
    }
}

impl Config {
    /// Returns the pool-facing subset of the configuration.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            service_connection_port: self.service_connection_port,
            dial_timeout: self.dial_timeout,
            max_frame_payload: self.max_frame_payload,
            max_idle_channels_per_port: self.max_idle_channels_per_port,
        }
    }
}
