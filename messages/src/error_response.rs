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

use crate::MessageTrait;

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Why a service answered with an error instead of a regular response.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// No handler is registered for the request kind.
    UnsupportedRequest,
    /// The handler ran and signalled failure.
    Handler,
    /// The request carried a service UUID minted by a different service.
    ServiceMismatch,
}

/// The response sent when the service failed to produce a regular one.
///
/// An error response never tears down the channel it travels on; it is an
/// ordinary answer to the request that provoked it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message_id: String,
    /// The failure category.
    pub kind: ErrorKind,
    /// The human-readable failure description.
    pub message: String,
}

impl ErrorResponse {
    /// Initializes an error response answering the request with `message_id`.
    pub fn new(message_id: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { message_id: message_id.into(), kind, message: message.into() }
    }

    /// Initializes the answer for a request kind nobody handles.
    pub fn unsupported(message_id: impl Into<String>, kind_name: &str) -> Self {
        Self::new(message_id, ErrorKind::UnsupportedRequest, format!("no handler registered for '{kind_name}' requests"))
    }

    /// Initializes the answer for a handler that signalled failure.
    pub fn handler_failure(message_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(message_id, ErrorKind::Handler, message)
    }

    /// Initializes the answer for a request addressed to a different service.
    pub fn service_mismatch(message_id: impl Into<String>, uuid: &str) -> Self {
        Self::new(message_id, ErrorKind::ServiceMismatch, format!("the service UUID '{uuid}' belongs to a different service"))
    }
}

impl MessageTrait for ErrorResponse {
    fn name(&self) -> Cow<'static, str> {
        "Error".into()
    }

    fn message_id(&self) -> &str {
        &self.message_id
    }
}
