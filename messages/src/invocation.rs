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

/// A remote method invocation against an object held by a peer service.
///
/// The argument tuple is an opaque blob produced by the host language's
/// marshaller; the runtime never looks inside it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub message_id: String,
    /// The address of the target object inside the peer's registry.
    pub target: u64,
    /// The method selector; `None` when the target itself is callable.
    pub selector: Option<String>,
    /// The marshalled argument tuple.
    pub arguments: Vec<u8>,
    /// `true` if the result should be copied back by value instead of being
    /// vended as a further proxy.
    pub return_by_value: bool,
    /// The UUID of the service that minted `target`.
    pub service_uuid: String,
}

impl InvocationRequest {
    /// Initializes an invocation request with a fresh message id.
    pub fn new(
        target: u64,
        selector: Option<String>,
        arguments: Vec<u8>,
        return_by_value: bool,
        service_uuid: impl Into<String>,
    ) -> Self {
        Self {
            message_id: Message::new_message_id(),
            target,
            selector,
            arguments,
            return_by_value,
            service_uuid: service_uuid.into(),
        }
    }
}

impl MessageTrait for InvocationRequest {
    fn name(&self) -> Cow<'static, str> {
        "Invocation".into()
    }

    fn message_id(&self) -> &str {
        &self.message_id
    }
}

/// The result of a remote invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResponse {
    pub message_id: String,
    /// The marshalled return value; `None` for void methods.
    pub return_value: Option<Vec<u8>>,
    /// The marshalled out-parameters, in declaration order.
    pub out_values: Vec<Vec<u8>>,
    /// The error raised by the target, if the invocation itself failed.
    pub exception: Option<String>,
}

impl InvocationResponse {
    /// Initializes a successful response for the given request.
    pub fn new(request: &InvocationRequest, return_value: Option<Vec<u8>>, out_values: Vec<Vec<u8>>) -> Self {
        Self { message_id: request.message_id.clone(), return_value, out_values, exception: None }
    }

    /// Initializes a response carrying the error the target raised.
    pub fn with_exception(request: &InvocationRequest, exception: impl Into<String>) -> Self {
        Self {
            message_id: request.message_id.clone(),
            return_value: None,
            out_values: Vec::new(),
            exception: Some(exception.into()),
        }
    }
}

impl MessageTrait for InvocationResponse {
    fn name(&self) -> Cow<'static, str> {
        "Invocation".into()
    }

    fn message_id(&self) -> &str {
        &self.message_id
    }
}
