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

use farcall::{channel, Listener};

use bytes::Bytes;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

const MAX_PAYLOAD: usize = 64 * 1024;

/// The reference frame: `type = 1`, the protocol tag, a 5-byte payload.
const HELLO_FRAME: [u8; 17] =
    [0, 0, 0, 1, 0xC0, 0x80, 0xC0, 0x80, 0, 0, 0, 5, b'h', b'e', b'l', b'l', b'o'];

#[tokio::test]
async fn raw_frame_bytes_decode_exactly() {
    let listener = Listener::bind(0).await.unwrap();
    let port = listener.local_port().port();

    let writer = tokio::spawn(async move {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(&HELLO_FRAME).await.unwrap();
        stream
    });
    let receiver = listener.accept().await.unwrap().into_channel(MAX_PAYLOAD);
    let _stream = writer.await.unwrap();

    let payload = receiver.receive().await.unwrap().unwrap();
    assert_eq!(&payload[..], b"hello");
}

#[tokio::test]
async fn sent_frames_match_the_wire_format_bit_for_bit() {
    let listener = Listener::bind(0).await.unwrap();
    let port = listener.local_port().port();

    let reader = tokio::spawn(async move {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let mut wire = [0u8; HELLO_FRAME.len()];
        stream.read_exact(&mut wire).await.unwrap();
        wire
    });
    let sender = listener.accept().await.unwrap().into_channel(MAX_PAYLOAD);
    sender.send(Bytes::from_static(b"hello")).await.unwrap();

    let wire = reader.await.unwrap();
    assert_eq!(wire, HELLO_FRAME);
}

#[tokio::test]
async fn mutated_tag_is_a_protocol_error() {
    let listener = Listener::bind(0).await.unwrap();
    let port = listener.local_port().port();

    let writer = tokio::spawn(async move {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let mut frame = HELLO_FRAME;
        // Mutate the third byte of the tag.
        frame[6] = 0x81;
        stream.write_all(&frame).await.unwrap();
        stream
    });
    let receiver = listener.accept().await.unwrap().into_channel(MAX_PAYLOAD);
    let _stream = writer.await.unwrap();

    assert!(matches!(receiver.receive().await, Err(channel::Error::Protocol(..))));
    assert!(!receiver.is_healthy());
}

#[tokio::test]
async fn empty_frame_is_a_legal_heartbeat() {
    let listener = Listener::bind(0).await.unwrap();
    let port = listener.local_port().port();

    let writer = tokio::spawn(async move {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(&[0, 0, 0, 1, 0xC0, 0x80, 0xC0, 0x80, 0, 0, 0, 0]).await.unwrap();
        stream
    });
    let receiver = listener.accept().await.unwrap().into_channel(MAX_PAYLOAD);
    let _stream = writer.await.unwrap();

    let payload = receiver.receive().await.unwrap().unwrap();
    assert!(payload.is_empty());
}

#[tokio::test]
async fn oversized_frame_is_fatal() {
    let listener = Listener::bind(0).await.unwrap();
    let port = listener.local_port().port();

    let writer = tokio::spawn(async move {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        // A header promising one byte more than the receiver's cap.
        let mut frame = Vec::from(&HELLO_FRAME[..12]);
        frame[8..12].copy_from_slice(&((MAX_PAYLOAD as u32) + 1).to_be_bytes());
        stream.write_all(&frame).await.unwrap();
        stream
    });
    let receiver = listener.accept().await.unwrap().into_channel(MAX_PAYLOAD);
    let _stream = writer.await.unwrap();

    assert!(matches!(receiver.receive().await, Err(channel::Error::FrameTooLarge { .. })));
    assert!(!receiver.is_healthy());
}
