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

use std::io;

use thiserror::Error;

/// The errors surfaced by the transport layer.
///
/// A `Protocol`, `FrameTooLarge`, or `Transport` error is fatal to the channel
/// it occurred on; the channel is poisoned and a pool will refuse to re-admit
/// it. None of these errors are fatal to the service the channel belongs to.
#[derive(Debug, Error)]
pub enum Error {
    /// The peer sent a frame with a malformed header.
    #[error("malformed frame: {0}")]
    Protocol(String),

    /// A frame payload exceeded the configured cap.
    #[error("frame payload of {len} bytes exceeds the cap of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    /// The channel was closed locally, or the peer has hung up.
    #[error("the channel is closed")]
    Closed,

    /// An unexpected I/O failure on the underlying stream.
    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),

    /// A name-keyed fetch timed out before a peer registered under the name.
    #[error("no peer registered under the name '{0}' before the deadline")]
    NameUnavailable(String),
}

impl Error {
    /// Returns `true` if the error poisons the channel it occurred on.
    pub fn is_fatal_to_channel(&self) -> bool {
        !matches!(self, Self::NameUnavailable(..))
    }
}
