// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signed datagram framing for the local-network UDP protocol.
//!
//! Requests are `"ETNM"`, a little-endian u32 sequence number, a
//! little-endian u16 message code, the body, then an HMAC-SHA256 over
//! everything before it, keyed with a rotated UDP key. Responses use the same
//! layout with an `"ETNS"` start.

use ring::hmac;

/// Port the breakers listen on.
pub const UDP_PORT: u16 = 32866;

pub const REQUEST_START: &[u8; 4] = b"ETNM";
pub const RESPONSE_START: &[u8; 4] = b"ETNS";

const HEADER_LEN: usize = 10;
const SIGNATURE_LEN: usize = 32;

/// Known message codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MessageCode {
    GetNextSequenceNumber = 0x0000,
    GetDeviceDebugData = 0x00FE,
    GetDeviceStatus = 0x00FF,
    GetRemoteHandlePosition = 0x0100,
    GetMeterTelemetryData = 0x0200,
}

impl MessageCode {
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            0x0000 => Some(Self::GetNextSequenceNumber),
            0x00FE => Some(Self::GetDeviceDebugData),
            0x00FF => Some(Self::GetDeviceStatus),
            0x0100 => Some(Self::GetRemoteHandlePosition),
            0x0200 => Some(Self::GetMeterTelemetryData),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("datagram of {0} bytes is shorter than header and signature")]
    TooShort(usize),
    #[error("datagram does not start with the expected marker")]
    BadStart,
    #[error("datagram signature does not verify")]
    BadSignature,
}

/// A decoded response datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpFrame {
    pub sequence: u32,
    pub message_code: u16,
    pub body: Vec<u8>,
}

impl UdpFrame {
    /// Build a signed request datagram.
    pub fn encode(sequence: u32, message_code: u16, body: &[u8], key: &[u8]) -> Vec<u8> {
        sign(REQUEST_START, sequence, message_code, body, key)
    }

    pub fn message(&self) -> Option<MessageCode> {
        MessageCode::from_u16(self.message_code)
    }
}

fn sign(start: &[u8; 4], sequence: u32, message_code: u16, body: &[u8], key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + body.len() + SIGNATURE_LEN);
    out.extend_from_slice(start);
    out.extend_from_slice(&sequence.to_le_bytes());
    out.extend_from_slice(&message_code.to_le_bytes());
    out.extend_from_slice(body);
    let tag = hmac::sign(&hmac::Key::new(hmac::HMAC_SHA256, key), &out);
    out.extend_from_slice(tag.as_ref());
    out
}

/// Verify and split a response datagram.
pub fn decode_response(datagram: &[u8], key: &[u8]) -> Result<UdpFrame, FrameError> {
    if datagram.len() < HEADER_LEN + SIGNATURE_LEN {
        return Err(FrameError::TooShort(datagram.len()));
    }
    if !datagram.starts_with(RESPONSE_START) {
        return Err(FrameError::BadStart);
    }
    let (signed, signature) = datagram.split_at(datagram.len() - SIGNATURE_LEN);
    hmac::verify(&hmac::Key::new(hmac::HMAC_SHA256, key), signed, signature)
        .map_err(|_| FrameError::BadSignature)?;

    let sequence = u32::from_le_bytes([signed[4], signed[5], signed[6], signed[7]]);
    let message_code = u16::from_le_bytes([signed[8], signed[9]]);
    Ok(UdpFrame { sequence, message_code, body: signed[HEADER_LEN..].to_vec() })
}

/// Advance a sequence number. Past `u32::MAX` it restarts at zero.
pub fn next_sequence(sequence: u32, amount: u32) -> u32 {
    sequence.checked_add(amount).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn request_layout() {
        let frame = UdpFrame::encode(0x0102_0304, MessageCode::GetDeviceStatus as u16, b"", KEY);
        assert_eq!(frame.len(), HEADER_LEN + SIGNATURE_LEN);
        assert_eq!(&frame[..4], b"ETNM");
        assert_eq!(&frame[4..8], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&frame[8..10], &[0xFF, 0x00]);
        let expected = hmac::sign(&hmac::Key::new(hmac::HMAC_SHA256, KEY), &frame[..HEADER_LEN]);
        assert_eq!(&frame[HEADER_LEN..], expected.as_ref());
    }

    #[test]
    fn response_is_verified_and_split() -> Result<(), FrameError> {
        let datagram = sign(RESPONSE_START, 7, 0x0100, &[1], KEY);
        let frame = decode_response(&datagram, KEY)?;
        assert_eq!(frame.sequence, 7);
        assert_eq!(frame.message(), Some(MessageCode::GetRemoteHandlePosition));
        assert_eq!(frame.body, vec![1]);
        Ok(())
    }

    #[test]
    fn response_with_wrong_key_is_rejected() {
        let datagram = sign(RESPONSE_START, 7, 0x0100, &[1], KEY);
        assert_eq!(decode_response(&datagram, b"other key"), Err(FrameError::BadSignature));
    }

    #[test]
    fn tampered_body_is_rejected() {
        let mut datagram = sign(RESPONSE_START, 7, 0x00FF, &[1, 2, 3], KEY);
        datagram[HEADER_LEN] ^= 0xFF;
        assert_eq!(decode_response(&datagram, KEY), Err(FrameError::BadSignature));
    }

    #[test]
    fn request_frame_is_not_a_response() {
        let datagram = UdpFrame::encode(1, 0, b"", KEY);
        assert_eq!(decode_response(&datagram, KEY), Err(FrameError::BadStart));
    }

    #[test]
    fn short_datagram_is_rejected() {
        assert_eq!(decode_response(b"ETNS", KEY), Err(FrameError::TooShort(4)));
    }

    #[test]
    fn sequence_wraps_to_zero() {
        assert_eq!(next_sequence(5, 1), 6);
        assert_eq!(next_sequence(u32::MAX - 1, 1), u32::MAX);
        assert_eq!(next_sequence(u32::MAX, 1), 0);
        assert_eq!(next_sequence(u32::MAX - 1, 5), 0);
    }

    #[test]
    fn unknown_message_code() {
        assert_eq!(MessageCode::from_u16(0x0300), None);
        assert_eq!(MessageCode::from_u16(0x0200), Some(MessageCode::GetMeterTelemetryData));
    }
}
