//! Wire format for simulator datagrams.
//!
//! Both directions carry ASCII text: non-negative integers separated by
//! whitespace, no trailing delimiter required.
//!
//! ```text
//! front end -> simulator:  "<buttons> <switches>"
//! simulator -> front end:  "<leds> <segments> <anodes>"
//! ```
//!
//! Integers are decimal, or hexadecimal with a `0x` prefix.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest payload either side sends. Real payloads are a few dozen bytes.
pub const MAX_DATAGRAM_LEN: usize = 512;

/// Failure to decode a datagram payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Payload was empty or only whitespace.
    #[error("empty payload")]
    Empty,

    /// Payload was not valid UTF-8.
    #[error("payload is not valid UTF-8")]
    NotUtf8,

    /// Wrong number of fields.
    #[error("expected {expected} fields, found {found} in {payload:?}")]
    FieldCount {
        expected: usize,
        found: usize,
        payload: String,
    },

    /// A field was not a non-negative integer.
    #[error("field `{field}` is not a non-negative integer: {token:?}")]
    InvalidNumber { field: &'static str, token: String },

    /// A field parsed but does not fit its type.
    #[error("field `{field}` out of range: {value}")]
    OutOfRange { field: &'static str, value: u64 },
}

/// Button and switch bitmasks sent to the simulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputState {
    pub buttons: u32,
    pub switches: u32,
}

impl InputState {
    pub fn new(buttons: u32, switches: u32) -> Self {
        Self { buttons, switches }
    }

    /// Flip button `index`. Indices past the mask width are ignored.
    pub fn toggle_button(&mut self, index: u32) {
        if let Some(bit) = 1u32.checked_shl(index) {
            self.buttons ^= bit;
        }
    }

    /// Flip switch `index`. Indices past the mask width are ignored.
    pub fn toggle_switch(&mut self, index: u32) {
        if let Some(bit) = 1u32.checked_shl(index) {
            self.switches ^= bit;
        }
    }

    /// Encode as the outbound payload.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Decode from raw datagram bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::NotUtf8)?;
        text.parse()
    }
}

impl fmt::Display for InputState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.buttons, self.switches)
    }
}

impl FromStr for InputState {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let [buttons, switches] = split_fields(s, ["buttons", "switches"])?;
        Ok(Self {
            buttons: to_u32(buttons)?,
            switches: to_u32(switches)?,
        })
    }
}

/// LED, segment and anode state reported by the simulator.
///
/// `segments` is the active-low 7-segment pattern shared by all digits;
/// `anodes` selects which digits are lit (bit clear = lit).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputState {
    pub leds: u32,
    pub segments: u8,
    pub anodes: u32,
}

impl OutputState {
    pub fn new(leds: u32, segments: u8, anodes: u32) -> Self {
        Self {
            leds,
            segments,
            anodes,
        }
    }

    /// Digit value shown by the current segment pattern, if recognized.
    pub fn digit(&self) -> Option<u8> {
        crate::display::decode_digit(self.segments)
    }

    /// Encode as the inbound payload. Used by test simulators.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Decode from raw datagram bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::NotUtf8)?;
        text.parse()
    }
}

impl fmt::Display for OutputState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.leds, self.segments, self.anodes)
    }
}

impl FromStr for OutputState {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let [leds, segments, anodes] = split_fields(s, ["leds", "segments", "anodes"])?;
        let segments_value = parse_field(segments.0, segments.1)?;
        let segments = u8::try_from(segments_value).map_err(|_| ProtocolError::OutOfRange {
            field: "segments",
            value: segments_value,
        })?;
        Ok(Self {
            leds: to_u32(leds)?,
            segments,
            anodes: to_u32(anodes)?,
        })
    }
}

/// Split a payload into exactly `N` whitespace-separated tokens.
fn split_fields<'a, const N: usize>(
    payload: &'a str,
    names: [&'static str; N],
) -> Result<[(&'static str, &'a str); N], ProtocolError> {
    let tokens: Vec<&str> = payload.split_ascii_whitespace().collect();
    if tokens.is_empty() {
        return Err(ProtocolError::Empty);
    }
    if tokens.len() != N {
        return Err(ProtocolError::FieldCount {
            expected: N,
            found: tokens.len(),
            payload: payload.trim().to_string(),
        });
    }
    Ok(std::array::from_fn(|i| (names[i], tokens[i])))
}

fn parse_field(field: &'static str, token: &str) -> Result<u64, ProtocolError> {
    let invalid = || ProtocolError::InvalidNumber {
        field,
        token: token.to_string(),
    };
    let (digits, radix) = match token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        Some(hex) => (hex, 16),
        None => (token, 10),
    };
    // from_str_radix accepts a leading '+', which is not part of the format
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(invalid());
    }
    u64::from_str_radix(digits, radix).map_err(|_| invalid())
}

fn to_u32((field, token): (&'static str, &str)) -> Result<u32, ProtocolError> {
    let value = parse_field(field, token)?;
    u32::try_from(value).map_err(|_| ProtocolError::OutOfRange { field, value })
}
