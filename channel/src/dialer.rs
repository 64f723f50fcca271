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

use crate::{Channel, HostPort, Result, Socket};

use async_trait::async_trait;

/// The mechanism that opens a [`Channel`] to a [`HostPort`].
///
/// The built-in [`TcpDialer`] covers loopback ports. Device-keyed host ports
/// go through an external dialer that tunnels a byte stream over the device
/// multiplexer; integrations install one on the pool.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Opens a fresh channel to the given host port.
    async fn dial(&self, host_port: &HostPort) -> Result<Channel>;
}

/// The loopback TCP dialer.
#[derive(Clone, Debug)]
pub struct TcpDialer {
    max_frame_payload: usize,
}

impl TcpDialer {
    /// Initializes a dialer whose channels cap decoded frames at the given size.
    pub fn new(max_frame_payload: usize) -> Self {
        Self { max_frame_payload }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, host_port: &HostPort) -> Result<Channel> {
        let socket = Socket::connect(host_port.port()).await?;
        let channel = socket.into_channel(self.max_frame_payload);
        channel.set_host_port(host_port.clone());
        Ok(channel)
    }
}
