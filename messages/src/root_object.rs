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

use crate::{Message, MessageTrait, ServicePort};

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// A request for the root object a peer service was constructed with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootObjectRequest {
    pub message_id: String,
}

impl RootObjectRequest {
    /// Initializes a root-object request with a fresh message id.
    pub fn new() -> Self {
        Self { message_id: Message::new_message_id() }
    }
}

impl Default for RootObjectRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageTrait for RootObjectRequest {
    fn name(&self) -> Cow<'static, str> {
        "RootObject".into()
    }

    fn message_id(&self) -> &str {
        &self.message_id
    }
}

/// The identity of a service's root object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootObjectResponse {
    pub message_id: String,
    /// The address of the root object inside the answering service.
    pub address: u64,
    /// The identity of the answering service.
    pub service_port: ServicePort,
}

impl RootObjectResponse {
    /// Initializes the answer for the given request.
    pub fn new(request: &RootObjectRequest, address: u64, service_port: ServicePort) -> Self {
        Self { message_id: request.message_id.clone(), address, service_port }
    }
}

impl MessageTrait for RootObjectResponse {
    fn name(&self) -> Cow<'static, str> {
        "RootObject".into()
    }

    fn message_id(&self) -> &str {
        &self.message_id
    }
}
