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

//! The transport layer of the farcall runtime: a length-prefixed, tagged frame
//! codec, loopback socket plumbing, the bidirectional [`Channel`] endpoint,
//! and the [`ChannelPool`] that caches idle channels keyed by [`HostPort`].

#![forbid(unsafe_code)]

mod channel;
pub use channel::{ByteStream, Channel};

mod codec;
pub use codec::{FrameCodec, DEFAULT_MAX_FRAME_PAYLOAD, FRAME_HEADER_SIZE, FRAME_TAG, FRAME_TYPE};

mod dialer;
pub use dialer::{Dialer, TcpDialer};

mod error;
pub use error::Error;

mod host_port;
pub use host_port::HostPort;

mod pool;
pub use pool::{ChannelPool, PoolConfig};

mod socket;
pub use socket::{Listener, Socket, SocketPort};

/// A convenience alias for results produced by the transport layer.
pub type Result<T> = std::result::Result<T, Error>;
