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

/// A lookup of an object the peer service registered under a class name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLookupRequest {
    pub message_id: String,
    /// The class name to resolve.
    pub class_name: String,
}

impl ClassLookupRequest {
    /// Initializes a class lookup with a fresh message id.
    pub fn new(class_name: impl Into<String>) -> Self {
        Self { message_id: Message::new_message_id(), class_name: class_name.into() }
    }
}

impl MessageTrait for ClassLookupRequest {
    fn name(&self) -> Cow<'static, str> {
        "ClassLookup".into()
    }

    fn message_id(&self) -> &str {
        &self.message_id
    }
}

/// The result of a class lookup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLookupResponse {
    pub message_id: String,
    /// The address of the registered object, or `None` if the name is unknown.
    pub address: Option<u64>,
    /// The identity of the answering service; present when `address` is.
    pub service_port: Option<ServicePort>,
}

impl ClassLookupResponse {
    /// Initializes a hit for the given lookup.
    pub fn found(request: &ClassLookupRequest, address: u64, service_port: ServicePort) -> Self {
        Self { message_id: request.message_id.clone(), address: Some(address), service_port: Some(service_port) }
    }

    /// Initializes a miss for the given lookup.
    pub fn not_found(request: &ClassLookupRequest) -> Self {
        Self { message_id: request.message_id.clone(), address: None, service_port: None }
    }
}

impl MessageTrait for ClassLookupResponse {
    fn name(&self) -> Cow<'static, str> {
        "ClassLookup".into()
    }

    fn message_id(&self) -> &str {
        &self.message_id
    }
}
