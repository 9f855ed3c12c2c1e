/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixGate TagValue
//!
//! Zero-copy tag=value encoding and decoding for the FixGate session core.
//!
//! This crate provides:
//! - **Checksum**: the canonical FIX byte-sum-mod-256 checksum
//! - **Encoder**: message assembly with automatic envelope stamping
//! - **Decoder**: zero-copy parsing into field references
//! - **Timestamps**: UTCTimestamp formatting and strict parsing at the four
//!   configured fraction widths

pub mod checksum;
pub mod decoder;
pub mod encoder;
pub mod timestamp;

pub use checksum::{calculate_checksum, format_checksum, parse_checksum};
pub use decoder::{Decoder, ParsedMessage, SOH};
pub use encoder::Encoder;
pub use timestamp::{TimestampPrecision, UtcTimestamp};
