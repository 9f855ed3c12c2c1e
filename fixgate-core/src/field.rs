/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Field types for FIX protocol messages.
//!
//! This module provides:
//! - [`FieldRef`]: Zero-copy reference to a field within a message buffer
//! - [`tags`]: the standard-header and session-level tag numbers the core
//!   works with

use crate::error::DecodeError;
use std::fmt;
use std::str::FromStr;

/// Tag numbers used by the session core.
pub mod tags {
    /// BeginString (8).
    pub const BEGIN_STRING: u32 = 8;
    /// BodyLength (9).
    pub const BODY_LENGTH: u32 = 9;
    /// CheckSum (10).
    pub const CHECK_SUM: u32 = 10;
    /// MsgSeqNum (34).
    pub const MSG_SEQ_NUM: u32 = 34;
    /// MsgType (35).
    pub const MSG_TYPE: u32 = 35;
    /// NewSeqNo (36).
    pub const NEW_SEQ_NO: u32 = 36;
    /// PossDupFlag (43).
    pub const POSS_DUP_FLAG: u32 = 43;
    /// RefSeqNum (45).
    pub const REF_SEQ_NUM: u32 = 45;
    /// SenderCompID (49).
    pub const SENDER_COMP_ID: u32 = 49;
    /// SendingTime (52).
    pub const SENDING_TIME: u32 = 52;
    /// TargetCompID (56).
    pub const TARGET_COMP_ID: u32 = 56;
    /// Text (58).
    pub const TEXT: u32 = 58;
    /// BeginSeqNo (7).
    pub const BEGIN_SEQ_NO: u32 = 7;
    /// EndSeqNo (16).
    pub const END_SEQ_NO: u32 = 16;
    /// EncryptMethod (98).
    pub const ENCRYPT_METHOD: u32 = 98;
    /// HeartBtInt (108).
    pub const HEART_BT_INT: u32 = 108;
    /// TestReqID (112).
    pub const TEST_REQ_ID: u32 = 112;
    /// GapFillFlag (123).
    pub const GAP_FILL_FLAG: u32 = 123;
    /// OrigSendingTime (122).
    pub const ORIG_SENDING_TIME: u32 = 122;
    /// ResetSeqNumFlag (141).
    pub const RESET_SEQ_NUM_FLAG: u32 = 141;
    /// RefTagID (371).
    pub const REF_TAG_ID: u32 = 371;
    /// RefMsgType (372).
    pub const REF_MSG_TYPE: u32 = 372;
    /// SessionRejectReason (373).
    pub const SESSION_REJECT_REASON: u32 = 373;
}

/// Zero-copy reference to a field within a FIX message buffer.
///
/// Holds references into the original message buffer, avoiding allocation
/// during parsing.
#[derive(Debug, Clone, Copy)]
pub struct FieldRef<'a> {
    /// The field tag number.
    pub tag: u32,
    /// Reference to the field value bytes (without delimiters).
    pub value: &'a [u8],
}

impl<'a> FieldRef<'a> {
    /// Creates a new field reference.
    ///
    /// # Arguments
    /// * `tag` - The field tag number
    /// * `value` - Reference to the value bytes
    #[inline]
    #[must_use]
    pub const fn new(tag: u32, value: &'a [u8]) -> Self {
        Self { tag, value }
    }

    /// Returns the value as a string slice.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidUtf8` if the value is not valid UTF-8.
    pub fn as_str(&self) -> Result<&'a str, DecodeError> {
        std::str::from_utf8(self.value).map_err(DecodeError::from)
    }

    /// Parses the value as the specified type.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if parsing fails.
    pub fn parse<T: FromStr>(&self) -> Result<T, DecodeError> {
        let s = self.as_str()?;
        s.parse().map_err(|_| DecodeError::InvalidFieldValue {
            tag: self.tag,
            reason: format!("failed to parse '{}' as {}", s, std::any::type_name::<T>()),
        })
    }

    /// Returns the value as a u64.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if the value is not a valid integer.
    pub fn as_u64(&self) -> Result<u64, DecodeError> {
        self.parse()
    }

    /// Returns the value as a bool (FIX uses 'Y'/'N').
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if the value is not 'Y' or 'N'.
    pub fn as_bool(&self) -> Result<bool, DecodeError> {
        match self.value {
            b"Y" => Ok(true),
            b"N" => Ok(false),
            _ => Err(DecodeError::InvalidFieldValue {
                tag: self.tag,
                reason: "expected 'Y' or 'N'".to_string(),
            }),
        }
    }
}

impl fmt::Display for FieldRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.tag, String::from_utf8_lossy(self.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_ref_as_str() {
        let field = FieldRef::new(49, b"SENDER");
        assert_eq!(field.as_str().unwrap(), "SENDER");
    }

    #[test]
    fn test_field_ref_as_u64() {
        let field = FieldRef::new(34, b"42");
        assert_eq!(field.as_u64().unwrap(), 42);

        let bad = FieldRef::new(34, b"xyz");
        assert!(bad.as_u64().is_err());
    }

    #[test]
    fn test_field_ref_as_bool() {
        assert!(FieldRef::new(43, b"Y").as_bool().unwrap());
        assert!(!FieldRef::new(43, b"N").as_bool().unwrap());
        assert!(FieldRef::new(43, b"X").as_bool().is_err());
    }

    #[test]
    fn test_field_ref_display() {
        let field = FieldRef::new(35, b"A");
        assert_eq!(field.to_string(), "35=A");
    }
}
