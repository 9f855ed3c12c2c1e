/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! FIX message framing codec.
//!
//! Splits a raw byte stream into complete FIX messages. The frame boundary
//! comes from walking the envelope prefix field by field - BeginString,
//! then BodyLength, whose value fixes where the checksum field must sit -
//! rather than scanning for delimiters ad hoc. Once a frame is extracted
//! its trailer is verified (optional) against the canonical checksum.
//! Implements the `tokio_util` codec traits so the framer can drive it over
//! any buffered byte source.

use bytes::BytesMut;
use fixgate_core::error::{DecodeError, GatewayError};
use fixgate_core::tags;
use fixgate_tagvalue::checksum::{calculate_checksum, parse_checksum};
use memchr::memchr;
use std::ops::Range;
use tokio_util::codec::{Decoder, Encoder};

/// SOH delimiter.
const SOH: u8 = 0x01;

/// Wire length of the trailing checksum field: `10=` plus three digits plus
/// SOH.
const CHECKSUM_FIELD_LEN: usize = 3 + 3 + 1;

/// Result of probing for one envelope field at a fixed offset.
enum FieldProbe {
    /// The buffer ends before the field does.
    NeedMore,
    /// The bytes at the offset do not carry the expected tag.
    Mismatch,
    /// The field is complete; the byte range of its value.
    Value(Range<usize>),
}

/// Probes the buffer for `tag=value<SOH>` starting at `from`.
fn probe_field(buf: &[u8], from: usize, tag: u32) -> FieldProbe {
    let mut tag_buf = itoa::Buffer::new();
    let digits = tag_buf.format(tag).as_bytes();
    let prefix_len = digits.len() + 1;

    let Some(field) = buf.get(from..) else {
        return FieldProbe::NeedMore;
    };
    if field.len() < prefix_len {
        // Partial prefixes still tell us when the tag cannot match.
        return if field.iter().zip(digits).any(|(a, b)| a != b) {
            FieldProbe::Mismatch
        } else {
            FieldProbe::NeedMore
        };
    }
    if &field[..digits.len()] != digits || field[digits.len()] != b'=' {
        return FieldProbe::Mismatch;
    }

    match memchr(SOH, &field[prefix_len..]) {
        Some(soh) => FieldProbe::Value(from + prefix_len..from + prefix_len + soh),
        None => FieldProbe::NeedMore,
    }
}

/// Parses an ASCII decimal BodyLength value.
fn parse_body_length(value: &[u8]) -> Option<usize> {
    if value.is_empty() || value.len() > 9 {
        return None;
    }

    let mut length = 0usize;
    for &b in value {
        if !b.is_ascii_digit() {
            return None;
        }
        length = length * 10 + usize::from(b - b'0');
    }
    Some(length)
}

/// Walks the envelope prefix and returns the full framed length of the
/// first message, or `None` when more bytes are needed to know it.
fn framed_length(buf: &[u8], max_message_size: usize) -> Result<Option<usize>, GatewayError> {
    let begin_string = match probe_field(buf, 0, tags::BEGIN_STRING) {
        FieldProbe::NeedMore => return Ok(None),
        FieldProbe::Mismatch => return Err(DecodeError::InvalidBeginString.into()),
        FieldProbe::Value(range) => range,
    };

    let body_length = match probe_field(buf, begin_string.end + 1, tags::BODY_LENGTH) {
        FieldProbe::NeedMore => return Ok(None),
        FieldProbe::Mismatch => return Err(DecodeError::MissingBodyLength.into()),
        FieldProbe::Value(range) => range,
    };
    let declared =
        parse_body_length(&buf[body_length.clone()]).ok_or(DecodeError::InvalidBodyLength)?;

    // BodyLength counts everything between its own SOH and the checksum
    // field, so the body start plus the declared length lands exactly on
    // the trailer.
    let total = body_length.end + 1 + declared + CHECKSUM_FIELD_LEN;
    if total > max_message_size {
        return Err(DecodeError::MessageTooLarge {
            size: total,
            max_size: max_message_size,
        }
        .into());
    }

    Ok(Some(total))
}

/// Verifies the checksum field that terminates a framed message.
fn verify_trailer(frame: &[u8]) -> Result<(), GatewayError> {
    let trailer_start = frame.len() - CHECKSUM_FIELD_LEN;

    let FieldProbe::Value(range) = probe_field(frame, trailer_start, tags::CHECK_SUM) else {
        return Err(DecodeError::MissingRequiredField {
            tag: tags::CHECK_SUM,
        }
        .into());
    };
    let declared = parse_checksum(&frame[range]).ok_or(DecodeError::InvalidFieldValue {
        tag: tags::CHECK_SUM,
        reason: "invalid checksum format".to_string(),
    })?;

    let calculated = calculate_checksum(&frame[..trailer_start]);
    if calculated != declared {
        return Err(DecodeError::ChecksumMismatch {
            calculated,
            declared,
        }
        .into());
    }
    Ok(())
}

/// FIX message framing codec.
#[derive(Debug, Clone)]
pub struct FixCodec {
    /// Maximum message size in bytes.
    max_message_size: usize,
    /// Whether to validate checksums.
    validate_checksum: bool,
}

impl FixCodec {
    /// Creates a new codec with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_message_size: 1024 * 1024,
            validate_checksum: true,
        }
    }

    /// Sets the maximum message size.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Sets whether to validate checksums.
    #[must_use]
    pub const fn with_checksum_validation(mut self, validate: bool) -> Self {
        self.validate_checksum = validate;
        self
    }
}

impl Default for FixCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FixCodec {
    type Item = BytesMut;
    type Error = GatewayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(total) = framed_length(src, self.max_message_size)? else {
            return Ok(None);
        };

        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        // The frame leaves the buffer either way; a bad checksum fails this
        // message without poisoning the ones queued behind it.
        let frame = src.split_to(total);
        if self.validate_checksum {
            verify_trailer(&frame)?;
        }
        Ok(Some(frame))
    }
}

impl Encoder<&[u8]> for FixCodec {
    type Error = GatewayError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(item);
        Ok(())
    }
}

impl Encoder<BytesMut> for FixCodec {
    type Error = GatewayError;

    fn encode(&mut self, item: BytesMut, dst: &mut BytesMut) -> Result<(), Self::Error> {
        // Already-assembled frames join without a copy when contiguous.
        dst.unsplit(item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixgate_tagvalue::encoder::Encoder as MessageEncoder;

    fn heartbeat_frame() -> BytesMut {
        let mut encoder = MessageEncoder::new("FIX.4.4");
        encoder.put_char(tags::MSG_TYPE, b'0');
        encoder.finish()
    }

    fn test_request_frame() -> BytesMut {
        let mut encoder = MessageEncoder::new("FIX.4.4");
        encoder.put_char(tags::MSG_TYPE, b'1');
        encoder.put_str(tags::TEST_REQ_ID, "PING");
        encoder.finish()
    }

    #[test]
    fn test_decode_complete_message() {
        let mut codec = FixCodec::new();
        let frame = heartbeat_frame();
        let mut buf = frame.clone();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_two_pipelined_messages() {
        let mut codec = FixCodec::new();
        let first = heartbeat_frame();
        let second = test_request_frame();

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&first);
        buf.extend_from_slice(&second);

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), first);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), second);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_incomplete() {
        let mut codec = FixCodec::new();
        let frame = heartbeat_frame();

        // No prefix of a valid frame may decode.
        for cut in 1..frame.len() {
            let mut buf = BytesMut::from(&frame[..cut]);
            assert!(
                codec.decode(&mut buf).unwrap().is_none(),
                "decoded a frame cut at {cut} bytes"
            );
            assert_eq!(buf.len(), cut, "buffer consumed at cut {cut}");
        }
    }

    #[test]
    fn test_decode_invalid_begin_string() {
        let mut codec = FixCodec::new();
        let mut buf = heartbeat_frame();
        buf[0] = b'9';

        let result = codec.decode(&mut buf);
        assert!(matches!(
            result,
            Err(GatewayError::Decode(DecodeError::InvalidBeginString))
        ));
    }

    #[test]
    fn test_decode_rejects_garbage_immediately() {
        let mut codec = FixCodec::new();
        let mut buf = BytesMut::from(&b"nope"[..]);

        let result = codec.decode(&mut buf);
        assert!(matches!(
            result,
            Err(GatewayError::Decode(DecodeError::InvalidBeginString))
        ));
    }

    #[test]
    fn test_decode_checksum_mismatch() {
        let mut codec = FixCodec::new();
        let mut buf = heartbeat_frame();
        // Flip one checksum digit; the envelope stays framable.
        let digit = buf.len() - 2;
        buf[digit] = if buf[digit] == b'0' { b'1' } else { b'0' };

        let result = codec.decode(&mut buf);
        assert!(matches!(
            result,
            Err(GatewayError::Decode(DecodeError::ChecksumMismatch { .. }))
        ));
        // The bad frame was consumed; the stream can continue.
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_without_checksum_validation() {
        let mut codec = FixCodec::new().with_checksum_validation(false);
        let mut buf = heartbeat_frame();
        let digit = buf.len() - 2;
        buf[digit] = if buf[digit] == b'0' { b'1' } else { b'0' };

        assert!(codec.decode(&mut buf).unwrap().is_some());
    }

    #[test]
    fn test_decode_message_too_large() {
        let mut codec = FixCodec::new().with_max_message_size(16);
        let mut buf = test_request_frame();

        let result = codec.decode(&mut buf);
        assert!(matches!(
            result,
            Err(GatewayError::Decode(DecodeError::MessageTooLarge { .. }))
        ));
    }

    #[test]
    fn test_encode_slice_passthrough() {
        let mut codec = FixCodec::new();
        let frame = heartbeat_frame();
        let mut dst = BytesMut::new();

        codec.encode(&frame[..], &mut dst).unwrap();
        assert_eq!(dst, frame);
    }

    #[test]
    fn test_encode_bytes_mut_appends() {
        let mut codec = FixCodec::new();
        let first = heartbeat_frame();
        let second = test_request_frame();

        let mut expected = BytesMut::new();
        expected.extend_from_slice(&first);
        expected.extend_from_slice(&second);

        let mut dst = BytesMut::new();
        codec.encode(first, &mut dst).unwrap();
        codec.encode(second, &mut dst).unwrap();
        assert_eq!(dst, expected);
    }
}
