// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire format tests: length-prefix framing and JSON encoding.

use super::*;
use crate::{ClientFrame, ClientPayload};

#[tokio::test]
async fn write_message_adds_big_endian_length_prefix() {
    let mut buffer = Vec::new();
    write_message(&mut buffer, b"test data").await.unwrap();

    assert_eq!(&buffer[..4], &9u32.to_be_bytes());
    assert_eq!(&buffer[4..], b"test data");
}

#[tokio::test]
async fn frames_read_back_in_order() {
    let mut buffer = Vec::new();
    write_frame(&mut buffer, &ClientFrame::register("agent-a")).await.unwrap();
    write_message(&mut buffer, b"{}").await.unwrap();

    let mut cursor = std::io::Cursor::new(buffer);
    let first: ClientFrame = read_frame(&mut cursor).await.unwrap();
    assert_eq!(first.identity, "agent-a");
    assert!(matches!(first.payload, ClientPayload::Hello { .. }));
    assert_eq!(read_message(&mut cursor).await.unwrap(), b"{}");
}

#[tokio::test]
async fn eof_before_prefix_is_connection_closed() {
    let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
    assert!(matches!(read_message(&mut cursor).await, Err(ProtocolError::ConnectionClosed)));
}

#[tokio::test]
async fn truncated_body_is_io_error() {
    let mut buffer = 10u32.to_be_bytes().to_vec();
    buffer.extend_from_slice(b"short");
    let mut cursor = std::io::Cursor::new(buffer);
    assert!(matches!(read_message(&mut cursor).await, Err(ProtocolError::Io(_))));
}

#[tokio::test]
async fn oversized_prefix_is_rejected() {
    let buffer = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes().to_vec();
    let mut cursor = std::io::Cursor::new(buffer);
    assert!(matches!(read_message(&mut cursor).await, Err(ProtocolError::TooLarge(_))));
}

#[test]
fn decode_rejects_garbage() {
    assert!(matches!(decode::<ClientFrame>(b"not json"), Err(ProtocolError::Json(_))));
}
