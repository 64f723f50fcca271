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

use crate::Error;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// The frame type word; the wire knows exactly one frame type.
pub const FRAME_TYPE: u32 = 1;
/// The tag word stamped on every frame header.
pub const FRAME_TAG: u32 = 0xC080_C080;
/// The size of the frame header in bytes: three big-endian `u32` words.
pub const FRAME_HEADER_SIZE: usize = 12;
/// The default cap on a decoded frame payload.
pub const DEFAULT_MAX_FRAME_PAYLOAD: usize = 64 * 1024 * 1024; // 64 MiB

/// The codec used to decode and encode frames on a channel.
///
/// The frame layout is `[type | tag | payload_size]` as big-endian `u32`
/// words, followed by exactly `payload_size` opaque payload bytes. A zero
/// payload size is legal and decodes to an empty payload.
#[derive(Clone, Debug)]
pub struct FrameCodec {
    max_payload: usize,
}

impl FrameCodec {
    /// Initializes a new codec with the given cap on payload sizes.
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }

    /// Returns the cap on payload sizes.
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_PAYLOAD)
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if payload.len() > self.max_payload {
            return Err(Error::FrameTooLarge { len: payload.len(), max: self.max_payload });
        }

        dst.reserve(FRAME_HEADER_SIZE + payload.len());
        dst.put_u32(FRAME_TYPE);
        dst.put_u32(FRAME_TAG);
        dst.put_u32(payload.len() as u32);
        dst.extend_from_slice(&payload);

        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Error = Error;
    type Item = Bytes;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        // Validate the header without consuming it; the payload may still be in flight.
        let mut header = &src[..FRAME_HEADER_SIZE];
        let frame_type = header.get_u32();
        let tag = header.get_u32();
        let payload_size = header.get_u32() as usize;

        if frame_type != FRAME_TYPE {
            return Err(Error::Protocol(format!("unexpected frame type {frame_type}")));
        }
        if tag != FRAME_TAG {
            return Err(Error::Protocol(format!("unexpected frame tag {tag:#010x}")));
        }
        if payload_size > self.max_payload {
            return Err(Error::FrameTooLarge { len: payload_size, max: self.max_payload });
        }

        if src.len() < FRAME_HEADER_SIZE + payload_size {
            src.reserve(FRAME_HEADER_SIZE + payload_size - src.len());
            return Ok(None);
        }

        src.advance(FRAME_HEADER_SIZE);
        Ok(Some(src.split_to(payload_size).freeze()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(codec: &mut FrameCodec, payload: &[u8]) -> BytesMut {
        let mut dst = BytesMut::new();
        codec.encode(Bytes::copy_from_slice(payload), &mut dst).unwrap();
        dst
    }

    #[test]
    fn frame_round_trip() {
        let mut codec = FrameCodec::default();
        let mut wire = encode(&mut codec, b"hello");

        assert_eq!(&wire[..], &[0, 0, 0, 1, 0xC0, 0x80, 0xC0, 0x80, 0, 0, 0, 5, b'h', b'e', b'l', b'l', b'o']);

        let payload = codec.decode(&mut wire).unwrap().unwrap();
        assert_eq!(&payload[..], b"hello");
        assert!(wire.is_empty());
    }

    #[test]
    fn empty_payload_is_legal() {
        let mut codec = FrameCodec::default();
        let mut wire = encode(&mut codec, b"");

        assert_eq!(wire.len(), FRAME_HEADER_SIZE);
        let payload = codec.decode(&mut wire).unwrap().unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn partial_header_waits() {
        let mut codec = FrameCodec::default();
        let wire = encode(&mut codec, b"hello");

        let mut partial = BytesMut::from(&wire[..FRAME_HEADER_SIZE - 1]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn partial_payload_waits() {
        let mut codec = FrameCodec::default();
        let wire = encode(&mut codec, b"hello");

        let mut partial = BytesMut::from(&wire[..FRAME_HEADER_SIZE + 3]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&wire[FRAME_HEADER_SIZE + 3..]);
        let payload = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(&payload[..], b"hello");
    }

    #[test]
    fn bad_tag_is_detected_on_first_frame() {
        let mut codec = FrameCodec::default();
        let mut wire = encode(&mut codec, b"hello");

        // Mutate the third byte of the tag.
        wire[6] = 0x81;
        assert!(matches!(codec.decode(&mut wire), Err(Error::Protocol(..))));
    }

    #[test]
    fn bad_type_is_detected() {
        let mut codec = FrameCodec::default();
        let mut wire = encode(&mut codec, b"hello");

        wire[3] = 2;
        assert!(matches!(codec.decode(&mut wire), Err(Error::Protocol(..))));
    }

    #[test]
    fn payload_at_cap_succeeds() {
        let mut codec = FrameCodec::new(16);
        let mut wire = encode(&mut codec, &[0xAB; 16]);

        let payload = codec.decode(&mut wire).unwrap().unwrap();
        assert_eq!(payload.len(), 16);
    }

    #[test]
    fn payload_over_cap_is_rejected() {
        let mut encoder = FrameCodec::default();
        let mut wire = encode(&mut encoder, &[0xAB; 17]);

        let mut codec = FrameCodec::new(16);
        assert!(matches!(codec.decode(&mut wire), Err(Error::FrameTooLarge { len: 17, max: 16 })));
    }

    #[test]
    fn oversized_payload_is_not_encoded() {
        let mut codec = FrameCodec::new(16);
        let mut dst = BytesMut::new();
        let result = codec.encode(Bytes::from(vec![0u8; 17]), &mut dst);

        assert!(matches!(result, Err(Error::FrameTooLarge { len: 17, max: 16 })));
        assert!(dst.is_empty());
    }
}
