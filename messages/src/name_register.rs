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

use crate::{Message, MessageTrait};

use std::borrow::Cow;

use farcall_channel::HostPort;
use serde::{Deserialize, Serialize};

/// A registration of a service under a symbolic name with a peer's naming
/// registry, so later callers can resolve the name to a host port.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRegisterRequest {
    pub message_id: String,
    /// The name the sender wants to be known by.
    pub name: String,
    /// The host port the name should resolve to.
    pub host_port: HostPort,
}

impl NameRegisterRequest {
    /// Initializes a name registration with a fresh message id.
    pub fn new(name: impl Into<String>, host_port: HostPort) -> Self {
        Self { message_id: Message::new_message_id(), name: name.into(), host_port }
    }
}

impl MessageTrait for NameRegisterRequest {
    fn name(&self) -> Cow<'static, str> {
        "NameRegister".into()
    }

    fn message_id(&self) -> &str {
        &self.message_id
    }
}

/// The acknowledgement of a name registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRegisterResponse {
    pub message_id: String,
    /// `false` if the name was already taken by another host port.
    pub registered: bool,
}

impl NameRegisterResponse {
    /// Initializes the acknowledgement for the given registration.
    pub fn new(request: &NameRegisterRequest, registered: bool) -> Self {
        Self { message_id: request.message_id.clone(), registered }
    }
}

impl MessageTrait for NameRegisterResponse {
    fn name(&self) -> Cow<'static, str> {
        "NameRegister".into()
    }

    fn message_id(&self) -> &str {
        &self.message_id
    }
}
