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

//! The request and response envelopes carried as frame payloads by the
//! farcall runtime.
//!
//! Every payload starts with a small fixed header (direction, kind id, and
//! message id), so a relay can match responses to pending requests without
//! deserialising the body. Bodies are opaque to the transport and serialised
//! with `bincode`.

#![forbid(unsafe_code)]

mod class_lookup;
pub use class_lookup::{ClassLookupRequest, ClassLookupResponse};

mod error_response;
pub use error_response::{ErrorKind, ErrorResponse};

mod invocation;
pub use invocation::{InvocationRequest, InvocationResponse};

mod name_register;
pub use name_register::{NameRegisterRequest, NameRegisterResponse};

mod object_alive;
pub use object_alive::{ObjectAliveRequest, ObjectAliveResponse};

mod object_release;
pub use object_release::{ObjectReleaseRequest, ObjectReleaseResponse};

mod root_object;
pub use root_object::{RootObjectRequest, RootObjectResponse};

mod service_port;
pub use service_port::ServicePort;

use std::borrow::Cow;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// The common surface of every request and response kind.
pub trait MessageTrait {
    /// Returns the stable kind name used for handler dispatch.
    fn name(&self) -> Cow<'static, str>;

    /// Returns the id echoed between a request and its response.
    fn message_id(&self) -> &str;
}

/// The errors produced while encoding or decoding an envelope.
#[derive(Debug, Error)]
pub enum MessageError {
    /// The payload ended before the envelope header was complete.
    #[error("truncated message envelope")]
    Truncated,

    /// The envelope carried a direction or kind this runtime does not know.
    #[error("unknown message kind {0}")]
    UnknownKind(u8),

    /// The message id bytes were not valid UTF-8.
    #[error("the message id is not valid UTF-8")]
    InvalidMessageId,

    /// The body failed to (de)serialise.
    #[error("malformed message body: {0}")]
    Body(#[from] bincode::Error),
}

/// A request sent to a peer service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    Invocation(InvocationRequest),
    ObjectAlive(ObjectAliveRequest),
    ClassLookup(ClassLookupRequest),
    RootObject(RootObjectRequest),
    NameRegister(NameRegisterRequest),
    ObjectRelease(ObjectReleaseRequest),
}

impl Request {
    /// Returns the kind name.
    #[inline]
    pub fn name(&self) -> Cow<'static, str> {
        match self {
            Self::Invocation(request) => request.name(),
            Self::ObjectAlive(request) => request.name(),
            Self::ClassLookup(request) => request.name(),
            Self::RootObject(request) => request.name(),
            Self::NameRegister(request) => request.name(),
            Self::ObjectRelease(request) => request.name(),
        }
    }

    /// Returns the kind id.
    #[inline]
    pub fn id(&self) -> u8 {
        match self {
            Self::Invocation(..) => 0,
            Self::ObjectAlive(..) => 1,
            Self::ClassLookup(..) => 2,
            Self::RootObject(..) => 3,
            Self::NameRegister(..) => 4,
            Self::ObjectRelease(..) => 5,
        }
    }

    /// Returns the message id.
    pub fn message_id(&self) -> &str {
        match self {
            Self::Invocation(request) => request.message_id(),
            Self::ObjectAlive(request) => request.message_id(),
            Self::ClassLookup(request) => request.message_id(),
            Self::RootObject(request) => request.message_id(),
            Self::NameRegister(request) => request.message_id(),
            Self::ObjectRelease(request) => request.message_id(),
        }
    }

    /// Returns the UUID of the service the request targets, for the kinds
    /// that carry service-sensitive state such as an object address.
    pub fn service_uuid(&self) -> Option<&str> {
        match self {
            Self::Invocation(request) => Some(&request.service_uuid),
            Self::ObjectAlive(request) => Some(&request.service_uuid),
            Self::ObjectRelease(request) => Some(&request.service_uuid),
            Self::ClassLookup(..) | Self::RootObject(..) | Self::NameRegister(..) => None,
        }
    }
}

/// A response produced by a peer service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Invocation(InvocationResponse),
    ObjectAlive(ObjectAliveResponse),
    ClassLookup(ClassLookupResponse),
    RootObject(RootObjectResponse),
    NameRegister(NameRegisterResponse),
    ObjectRelease(ObjectReleaseResponse),
    /// The fallback response when the service failed to produce one.
    Error(ErrorResponse),
}

impl Response {
    /// Returns the kind name.
    #[inline]
    pub fn name(&self) -> Cow<'static, str> {
        match self {
            Self::Invocation(response) => response.name(),
            Self::ObjectAlive(response) => response.name(),
            Self::ClassLookup(response) => response.name(),
            Self::RootObject(response) => response.name(),
            Self::NameRegister(response) => response.name(),
            Self::ObjectRelease(response) => response.name(),
            Self::Error(response) => response.name(),
        }
    }

    /// Returns the kind id.
    #[inline]
    pub fn id(&self) -> u8 {
        match self {
            Self::Invocation(..) => 0,
            Self::ObjectAlive(..) => 1,
            Self::ClassLookup(..) => 2,
            Self::RootObject(..) => 3,
            Self::NameRegister(..) => 4,
            Self::ObjectRelease(..) => 5,
            Self::Error(..) => 6,
        }
    }

    /// Returns the message id, equal to the id of the request this response
    /// answers.
    pub fn message_id(&self) -> &str {
        match self {
            Self::Invocation(response) => response.message_id(),
            Self::ObjectAlive(response) => response.message_id(),
            Self::ClassLookup(response) => response.message_id(),
            Self::RootObject(response) => response.message_id(),
            Self::NameRegister(response) => response.message_id(),
            Self::ObjectRelease(response) => response.message_id(),
            Self::Error(response) => response.message_id(),
        }
    }
}

/// One envelope on the wire: a request or a response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Request(Request),
    Response(Response),
}

/// The fixed header extractable from a payload without touching the body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// `true` if the payload carries a response.
    pub is_response: bool,
    /// The kind id.
    pub kind: u8,
    /// The message id.
    pub message_id: String,
    header_len: usize,
}

impl Envelope {
    /// Reads the envelope header from the front of a payload.
    pub fn peek(payload: &[u8]) -> Result<Self, MessageError> {
        let mut reader = payload;
        if reader.remaining() < 4 {
            return Err(MessageError::Truncated);
        }
        let direction = reader.get_u8();
        if direction > 1 {
            return Err(MessageError::UnknownKind(direction));
        }
        let kind = reader.get_u8();
        let id_len = reader.get_u16() as usize;
        if reader.remaining() < id_len {
            return Err(MessageError::Truncated);
        }
        let message_id =
            String::from_utf8(reader[..id_len].to_vec()).map_err(|_| MessageError::InvalidMessageId)?;

        Ok(Self { is_response: direction == 1, kind, message_id, header_len: 4 + id_len })
    }
}

impl Message {
    /// Serialises the envelope header and body into one frame payload.
    pub fn serialize(&self) -> Result<Bytes, MessageError> {
        let mut buffer = BytesMut::new();
        let (direction, kind, message_id) = match self {
            Self::Request(request) => (0u8, request.id(), request.message_id()),
            Self::Response(response) => (1u8, response.id(), response.message_id()),
        };
        buffer.put_u8(direction);
        buffer.put_u8(kind);
        buffer.put_u16(message_id.len() as u16);
        buffer.extend_from_slice(message_id.as_bytes());

        let body = match self {
            Self::Request(Request::Invocation(request)) => bincode::serialize(request)?,
            Self::Request(Request::ObjectAlive(request)) => bincode::serialize(request)?,
            Self::Request(Request::ClassLookup(request)) => bincode::serialize(request)?,
            Self::Request(Request::RootObject(request)) => bincode::serialize(request)?,
            Self::Request(Request::NameRegister(request)) => bincode::serialize(request)?,
            Self::Request(Request::ObjectRelease(request)) => bincode::serialize(request)?,
            Self::Response(Response::Invocation(response)) => bincode::serialize(response)?,
            Self::Response(Response::ObjectAlive(response)) => bincode::serialize(response)?,
            Self::Response(Response::ClassLookup(response)) => bincode::serialize(response)?,
            Self::Response(Response::RootObject(response)) => bincode::serialize(response)?,
            Self::Response(Response::NameRegister(response)) => bincode::serialize(response)?,
            Self::Response(Response::ObjectRelease(response)) => bincode::serialize(response)?,
            Self::Response(Response::Error(response)) => bincode::serialize(response)?,
        };
        buffer.extend_from_slice(&body);

        Ok(buffer.freeze())
    }

    /// Deserialises a frame payload into an envelope.
    pub fn deserialize(payload: Bytes) -> Result<Self, MessageError> {
        let envelope = Envelope::peek(&payload)?;
        let body = &payload[envelope.header_len..];

        let message = match (envelope.is_response, envelope.kind) {
            (false, 0) => Self::Request(Request::Invocation(bincode::deserialize(body)?)),
            (false, 1) => Self::Request(Request::ObjectAlive(bincode::deserialize(body)?)),
            (false, 2) => Self::Request(Request::ClassLookup(bincode::deserialize(body)?)),
            (false, 3) => Self::Request(Request::RootObject(bincode::deserialize(body)?)),
            (false, 4) => Self::Request(Request::NameRegister(bincode::deserialize(body)?)),
            (false, 5) => Self::Request(Request::ObjectRelease(bincode::deserialize(body)?)),
            (true, 0) => Self::Response(Response::Invocation(bincode::deserialize(body)?)),
            (true, 1) => Self::Response(Response::ObjectAlive(bincode::deserialize(body)?)),
            (true, 2) => Self::Response(Response::ClassLookup(bincode::deserialize(body)?)),
            (true, 3) => Self::Response(Response::RootObject(bincode::deserialize(body)?)),
            (true, 4) => Self::Response(Response::NameRegister(bincode::deserialize(body)?)),
            (true, 5) => Self::Response(Response::ObjectRelease(bincode::deserialize(body)?)),
            (true, 6) => Self::Response(Response::Error(bincode::deserialize(body)?)),
            (_, kind) => return Err(MessageError::UnknownKind(kind)),
        };

        Ok(message)
    }

    /// Generates a fresh message id.
    pub fn new_message_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farcall_channel::HostPort;

    #[test]
    fn request_round_trip() {
        let request = Request::ObjectAlive(ObjectAliveRequest::new(7, "uuid-1"));
        let payload = Message::Request(request.clone()).serialize().unwrap();

        match Message::deserialize(payload).unwrap() {
            Message::Request(decoded) => assert_eq!(decoded, request),
            Message::Response(..) => panic!("decoded a response from a request payload"),
        }
    }

    #[test]
    fn response_round_trip() {
        let request = RootObjectRequest::new();
        let port = ServicePort::new(HostPort::local(4321));
        let response = Response::RootObject(RootObjectResponse::new(&request, 0, port));
        let payload = Message::Response(response.clone()).serialize().unwrap();

        match Message::deserialize(payload).unwrap() {
            Message::Response(decoded) => assert_eq!(decoded, response),
            Message::Request(..) => panic!("decoded a request from a response payload"),
        }
    }

    #[test]
    fn envelope_is_peekable_without_the_body() {
        let request = Request::RootObject(RootObjectRequest::new());
        let message_id = request.message_id().to_string();
        let payload = Message::Request(request).serialize().unwrap();

        let envelope = Envelope::peek(&payload).unwrap();
        assert!(!envelope.is_response);
        assert_eq!(envelope.kind, 3);
        assert_eq!(envelope.message_id, message_id);
    }

    #[test]
    fn response_echoes_the_request_id() {
        let request = ObjectAliveRequest::new(7, "uuid-1");
        let response = ObjectAliveResponse::new(&request, true);
        assert_eq!(request.message_id(), response.message_id());
    }

    #[test]
    fn truncated_envelope_is_rejected() {
        assert!(matches!(Envelope::peek(&[0, 1]), Err(MessageError::Truncated)));
        assert!(matches!(Envelope::peek(&[0, 1, 0, 10, b'a']), Err(MessageError::Truncated)));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let request = RootObjectRequest::new();
        let mut payload = Message::Request(Request::RootObject(request)).serialize().unwrap().to_vec();
        payload[1] = 17;
        assert!(matches!(Message::deserialize(Bytes::from(payload)), Err(MessageError::UnknownKind(17))));
    }
}
