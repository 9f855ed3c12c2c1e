/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Zero-copy FIX message decoder.
//!
//! Parses FIX messages without allocating for field values; every field is a
//! reference into the original buffer. The session layer and the replayer
//! both work from the resulting [`ParsedMessage`] view.

use crate::checksum::{calculate_checksum, parse_checksum};
use fixgate_core::error::DecodeError;
use fixgate_core::field::FieldRef;
use fixgate_core::tags;
use fixgate_core::types::MsgType;
use memchr::memchr;
use smallvec::SmallVec;

/// SOH (Start of Header) delimiter used in FIX messages.
pub const SOH: u8 = 0x01;

/// Equals sign delimiter between tag and value.
pub const EQUALS: u8 = b'=';

/// A fully parsed FIX message with zero-copy field references.
#[derive(Debug)]
pub struct ParsedMessage<'a> {
    /// The complete message bytes including envelope.
    bytes: &'a [u8],
    /// The message type from tag 35.
    msg_type: MsgType,
    /// All fields in wire order, envelope included.
    fields: SmallVec<[FieldRef<'a>; 32]>,
}

impl<'a> ParsedMessage<'a> {
    /// Returns the message type.
    #[inline]
    #[must_use]
    pub const fn msg_type(&self) -> MsgType {
        self.msg_type
    }

    /// Returns the complete message bytes.
    #[inline]
    #[must_use]
    pub const fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Returns all fields in wire order.
    #[must_use]
    pub fn fields(&self) -> &[FieldRef<'a>] {
        &self.fields
    }

    /// Finds the first field with the given tag.
    #[must_use]
    pub fn find(&self, tag: u32) -> Option<FieldRef<'a>> {
        self.fields.iter().copied().find(|f| f.tag == tag)
    }

    /// Returns the required field with the given tag.
    ///
    /// # Errors
    /// Returns `DecodeError::MissingRequiredField` if the tag is absent.
    pub fn required(&self, tag: u32) -> Result<FieldRef<'a>, DecodeError> {
        self.find(tag)
            .ok_or(DecodeError::MissingRequiredField { tag })
    }

    /// Returns the MsgSeqNum (tag 34) value.
    ///
    /// # Errors
    /// Returns a decode error if the field is absent or not an integer.
    pub fn msg_seq_num(&self) -> Result<u64, DecodeError> {
        self.required(tags::MSG_SEQ_NUM)?.as_u64()
    }

    /// Returns the PossDupFlag (tag 43), defaulting to false when absent.
    #[must_use]
    pub fn poss_dup(&self) -> bool {
        self.find(tags::POSS_DUP_FLAG)
            .and_then(|f| f.as_bool().ok())
            .unwrap_or(false)
    }
}

/// Zero-copy FIX message decoder.
#[derive(Debug)]
pub struct Decoder<'a> {
    /// Input buffer.
    input: &'a [u8],
    /// Current position in the buffer.
    offset: usize,
    /// Whether to validate checksums.
    validate_checksum: bool,
}

impl<'a> Decoder<'a> {
    /// Creates a new decoder for the given input buffer.
    ///
    /// # Arguments
    /// * `input` - The FIX message bytes to decode
    #[inline]
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            offset: 0,
            validate_checksum: true,
        }
    }

    /// Sets whether to validate checksums during decoding.
    #[inline]
    #[must_use]
    pub const fn with_checksum_validation(mut self, validate: bool) -> Self {
        self.validate_checksum = validate;
        self
    }

    /// Decodes one complete FIX message from the buffer.
    ///
    /// # Errors
    /// Returns `DecodeError` if the message is malformed or incomplete.
    pub fn decode(&mut self) -> Result<ParsedMessage<'a>, DecodeError> {
        let start_offset = self.offset;

        let begin_string = self.next_field().ok_or(DecodeError::Incomplete)?;
        if begin_string.tag != tags::BEGIN_STRING {
            return Err(DecodeError::InvalidBeginString);
        }

        let body_length = self.next_field().ok_or(DecodeError::MissingBodyLength)?;
        if body_length.tag != tags::BODY_LENGTH {
            return Err(DecodeError::MissingBodyLength);
        }
        let _: usize = body_length
            .as_str()?
            .parse()
            .map_err(|_| DecodeError::InvalidBodyLength)?;

        let msg_type_field = self.next_field().ok_or(DecodeError::MissingMsgType)?;
        if msg_type_field.tag != tags::MSG_TYPE || msg_type_field.value.is_empty() {
            return Err(DecodeError::MissingMsgType);
        }
        let msg_type = MsgType::from_wire_byte(msg_type_field.value[0]);

        let mut fields: SmallVec<[FieldRef<'a>; 32]> = SmallVec::new();
        fields.push(begin_string);
        fields.push(body_length);
        fields.push(msg_type_field);

        let mut checksum_field: Option<FieldRef<'a>> = None;
        while let Some(field) = self.next_field() {
            if field.tag == tags::CHECK_SUM {
                checksum_field = Some(field);
                break;
            }
            fields.push(field);
        }

        let checksum_ref = checksum_field.ok_or(DecodeError::Incomplete)?;
        if self.validate_checksum {
            let declared =
                parse_checksum(checksum_ref.value).ok_or(DecodeError::InvalidFieldValue {
                    tag: tags::CHECK_SUM,
                    reason: "invalid checksum format".to_string(),
                })?;

            // Everything before the "10=" of the checksum field.
            let checksum_start =
                checksum_ref.value.as_ptr() as usize - self.input.as_ptr() as usize - 3;
            let calculated = calculate_checksum(&self.input[start_offset..checksum_start]);

            if calculated != declared {
                return Err(DecodeError::ChecksumMismatch {
                    calculated,
                    declared,
                });
            }
        }

        Ok(ParsedMessage {
            bytes: &self.input[start_offset..self.offset],
            msg_type,
            fields,
        })
    }

    /// Parses the next field from the buffer.
    ///
    /// # Returns
    /// The next field, or `None` if the buffer is exhausted.
    #[inline]
    pub fn next_field(&mut self) -> Option<FieldRef<'a>> {
        let remaining = self.input.get(self.offset..)?;
        if remaining.is_empty() {
            return None;
        }

        let eq_pos = memchr(EQUALS, remaining)?;
        let tag = parse_tag(&remaining[..eq_pos])?;

        let value_start = eq_pos + 1;
        let soh_pos = memchr(SOH, &remaining[value_start..])?;
        let value = &remaining[value_start..value_start + soh_pos];

        self.offset += value_start + soh_pos + 1;

        Some(FieldRef::new(tag, value))
    }

    /// Returns the current offset in the buffer.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Returns true if the buffer has been fully consumed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offset >= self.input.len()
    }
}

/// Parses a tag number from ASCII bytes.
#[inline]
fn parse_tag(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() || bytes.len() > 10 {
        return None;
    }

    let mut result: u32 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        result = result.checked_mul(10)?.checked_add(u32::from(b - b'0'))?;
    }

    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::format_checksum;

    fn make_message(body: &str) -> Vec<u8> {
        let envelope = format!("8=FIX.4.4\x019={}\x01{}", body.len(), body);
        let checksum = format_checksum(calculate_checksum(envelope.as_bytes()));
        let mut bytes = envelope.into_bytes();
        bytes.extend_from_slice(b"10=");
        bytes.extend_from_slice(&checksum);
        bytes.push(SOH);
        bytes
    }

    #[test]
    fn test_parse_tag() {
        assert_eq!(parse_tag(b"8"), Some(8));
        assert_eq!(parse_tag(b"35"), Some(35));
        assert_eq!(parse_tag(b"12345"), Some(12345));
        assert_eq!(parse_tag(b""), None);
        assert_eq!(parse_tag(b"abc"), None);
        assert_eq!(parse_tag(b"12a"), None);
    }

    #[test]
    fn test_next_field() {
        let input = b"8=FIX.4.4\x019=5\x0135=0\x01";
        let mut decoder = Decoder::new(input);

        let field1 = decoder.next_field().unwrap();
        assert_eq!(field1.tag, 8);
        assert_eq!(field1.as_str().unwrap(), "FIX.4.4");

        let field2 = decoder.next_field().unwrap();
        assert_eq!(field2.tag, 9);

        let field3 = decoder.next_field().unwrap();
        assert_eq!(field3.tag, 35);

        assert!(decoder.next_field().is_none());
    }

    #[test]
    fn test_decode_heartbeat() {
        let msg = make_message("35=0\x0149=A\x0156=B\x0134=2\x01");
        let mut decoder = Decoder::new(&msg);

        let parsed = decoder.decode().unwrap();
        assert_eq!(parsed.msg_type(), MsgType::Heartbeat);
        assert_eq!(parsed.msg_seq_num().unwrap(), 2);
        assert_eq!(parsed.find(49).unwrap().as_str().unwrap(), "A");
        assert!(!parsed.poss_dup());
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_decode_poss_dup() {
        let msg = make_message("35=D\x0149=A\x0156=B\x0134=9\x0143=Y\x01");
        let parsed = Decoder::new(&msg).decode().unwrap();
        assert_eq!(parsed.msg_type(), MsgType::Application(b'D'));
        assert!(parsed.poss_dup());
    }

    #[test]
    fn test_decode_checksum_mismatch() {
        let mut msg = make_message("35=0\x0149=A\x0156=B\x0134=2\x01");
        let len = msg.len();
        msg[len - 2] = b'9';

        let result = Decoder::new(&msg).decode();
        assert!(matches!(result, Err(DecodeError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_decode_missing_required() {
        let msg = make_message("35=0\x0149=A\x0156=B\x01");
        let parsed = Decoder::new(&msg).decode().unwrap();
        assert!(matches!(
            parsed.msg_seq_num(),
            Err(DecodeError::MissingRequiredField { tag: 34 })
        ));
    }

    #[test]
    fn test_decode_incomplete() {
        let result = Decoder::new(b"8=FIX.4.4\x01").decode();
        assert!(matches!(result, Err(DecodeError::MissingBodyLength)));
    }
}
