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

use farcall_messages::MessageError;
use thiserror::Error;

/// The errors surfaced by the service layer.
#[derive(Debug, Error)]
pub enum Error {
    /// The outbound request's deadline expired; the channel it was pending on
    /// has been evicted.
    #[error("the request timed out")]
    Timeout,

    /// The peer has no handler for the request kind.
    #[error("the peer has no handler for '{0}' requests")]
    UnsupportedRequest(String),

    /// The peer's handler signalled failure.
    #[error("the remote handler failed: {0}")]
    Handler(String),

    /// The request targeted a service UUID the peer does not own.
    #[error("service mismatch: {0}")]
    ServiceMismatch(String),

    /// The channel the exchange was riding on failed.
    #[error(transparent)]
    Channel(#[from] farcall_channel::Error),

    /// An envelope failed to encode or decode.
    #[error(transparent)]
    Message(#[from] MessageError),
}
