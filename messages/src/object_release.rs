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

/// A notification that the last proxy for an object was dropped, letting the
/// peer service unpin it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectReleaseRequest {
    pub message_id: String,
    /// The address of the object to unpin.
    pub address: u64,
    /// The UUID of the service that minted `address`.
    pub service_uuid: String,
}

impl ObjectReleaseRequest {
    /// Initializes a release notification with a fresh message id.
    pub fn new(address: u64, service_uuid: impl Into<String>) -> Self {
        Self { message_id: Message::new_message_id(), address, service_uuid: service_uuid.into() }
    }
}

impl MessageTrait for ObjectReleaseRequest {
    fn name(&self) -> Cow<'static, str> {
        "ObjectRelease".into()
    }

    fn message_id(&self) -> &str {
        &self.message_id
    }
}

/// The acknowledgement of a release; carried so the sender's executor loop
/// can complete like any other exchange.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectReleaseResponse {
    pub message_id: String,
}

impl ObjectReleaseResponse {
    /// Initializes the acknowledgement for the given release.
    pub fn new(request: &ObjectReleaseRequest) -> Self {
        Self { message_id: request.message_id.clone() }
    }
}

impl MessageTrait for ObjectReleaseResponse {
    fn name(&self) -> Cow<'static, str> {
        "ObjectRelease".into()
    }

    fn message_id(&self) -> &str {
        &self.message_id
    }
}
