/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! FIX message encoder.
//!
//! Builds messages in the standard tag=value format. Body fields are
//! appended in order; `finish()` stamps BeginString, BodyLength, and
//! CheckSum so the envelope arithmetic is always consistent.

use crate::checksum::{calculate_checksum, format_checksum};
use crate::timestamp::{TimestampPrecision, UtcTimestamp};
use bytes::{BufMut, BytesMut};
use fixgate_core::types::SeqNum;

/// SOH (Start of Header) delimiter used in FIX messages.
pub const SOH: u8 = 0x01;

/// FIX message encoder.
///
/// The encoder accumulates the message body (everything between BodyLength
/// and CheckSum); the envelope fields are derived at `finish()` time.
#[derive(Debug)]
pub struct Encoder {
    /// Buffer for the message body.
    body: BytesMut,
    /// The BeginString value (e.g., "FIX.4.4").
    begin_string: &'static str,
}

impl Encoder {
    /// Creates a new encoder with the specified BeginString.
    ///
    /// # Arguments
    /// * `begin_string` - The FIX version string (e.g., "FIX.4.4")
    #[must_use]
    pub fn new(begin_string: &'static str) -> Self {
        Self::with_capacity(begin_string, 256)
    }

    /// Creates a new encoder with pre-allocated capacity.
    ///
    /// # Arguments
    /// * `begin_string` - The FIX version string
    /// * `capacity` - Initial buffer capacity in bytes
    #[must_use]
    pub fn with_capacity(begin_string: &'static str, capacity: usize) -> Self {
        Self {
            body: BytesMut::with_capacity(capacity),
            begin_string,
        }
    }

    /// Appends a field with raw bytes.
    ///
    /// # Arguments
    /// * `tag` - The field tag number
    /// * `value` - The field value bytes
    #[inline]
    pub fn put_raw(&mut self, tag: u32, value: &[u8]) {
        let mut tag_buf = itoa::Buffer::new();
        self.body.put_slice(tag_buf.format(tag).as_bytes());
        self.body.put_u8(b'=');
        self.body.put_slice(value);
        self.body.put_u8(SOH);
    }

    /// Appends a field with a string value.
    #[inline]
    pub fn put_str(&mut self, tag: u32, value: &str) {
        self.put_raw(tag, value.as_bytes());
    }

    /// Appends a field with an unsigned integer value.
    #[inline]
    pub fn put_uint(&mut self, tag: u32, value: u64) {
        let mut buf = itoa::Buffer::new();
        self.put_raw(tag, buf.format(value).as_bytes());
    }

    /// Appends a field with a signed integer value.
    #[inline]
    pub fn put_int(&mut self, tag: u32, value: i64) {
        let mut buf = itoa::Buffer::new();
        self.put_raw(tag, buf.format(value).as_bytes());
    }

    /// Appends a field with a boolean value (Y/N).
    #[inline]
    pub fn put_bool(&mut self, tag: u32, value: bool) {
        self.put_raw(tag, if value { b"Y" } else { b"N" });
    }

    /// Appends a field with a single ASCII character value.
    #[inline]
    pub fn put_char(&mut self, tag: u32, value: u8) {
        self.put_raw(tag, &[value]);
    }

    /// Appends a sequence number field.
    #[inline]
    pub fn put_seq_num(&mut self, tag: u32, value: SeqNum) {
        self.put_uint(tag, value.value());
    }

    /// Appends a UTC timestamp field at the given precision.
    #[inline]
    pub fn put_timestamp(&mut self, tag: u32, value: UtcTimestamp, precision: TimestampPrecision) {
        self.put_raw(tag, value.format(precision).as_bytes());
    }

    /// Finalizes the message and returns the complete encoded bytes.
    ///
    /// Prepends BeginString (tag 8) and BodyLength (tag 9), then appends
    /// CheckSum (tag 10) over the assembled envelope.
    #[must_use]
    pub fn finish(self) -> BytesMut {
        let body_len = self.body.len();
        let mut len_buf = itoa::Buffer::new();
        let len_str = len_buf.format(body_len);

        let mut message =
            BytesMut::with_capacity(self.begin_string.len() + len_str.len() + body_len + 16);
        message.put_slice(b"8=");
        message.put_slice(self.begin_string.as_bytes());
        message.put_u8(SOH);
        message.put_slice(b"9=");
        message.put_slice(len_str.as_bytes());
        message.put_u8(SOH);
        message.put_slice(&self.body);

        let checksum = format_checksum(calculate_checksum(&message));
        message.put_slice(b"10=");
        message.put_slice(&checksum);
        message.put_u8(SOH);

        message
    }

    /// Returns the current body length.
    #[inline]
    #[must_use]
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Clears the encoder for reuse.
    #[inline]
    pub fn clear(&mut self) {
        self.body.clear();
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new("FIX.4.4")
    }
}
