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

use serde::{Deserialize, Serialize};

/// A query for whether the object behind a proxy is still registered with the
/// peer service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectAliveRequest {
    pub message_id: String,
    /// The address of the object inside the peer's registry.
    pub address: u64,
    /// The UUID of the service that minted `address`.
    pub service_uuid: String,
}

impl ObjectAliveRequest {
    /// Initializes an aliveness query with a fresh message id.
    pub fn new(address: u64, service_uuid: impl Into<String>) -> Self {
        Self { message_id: Message::new_message_id(), address, service_uuid: service_uuid.into() }
    }
}

impl MessageTrait for ObjectAliveRequest {
    fn name(&self) -> Cow<'static, str> {
        "ObjectAlive".into()
    }

    fn message_id(&self) -> &str {
        &self.message_id
    }
}

/// The answer to an aliveness query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectAliveResponse {
    pub message_id: String,
    /// `true` if the object is still registered with the service.
    pub alive: bool,
}

impl ObjectAliveResponse {
    /// Initializes the answer for the given query.
    pub fn new(request: &ObjectAliveRequest, alive: bool) -> Self {
        Self { message_id: request.message_id.clone(), alive }
    }
}

impl MessageTrait for ObjectAliveResponse {
    fn name(&self) -> Cow<'static, str> {
        "ObjectAlive".into()
    }

    fn message_id(&self) -> &str {
        &self.message_id
    }
}
