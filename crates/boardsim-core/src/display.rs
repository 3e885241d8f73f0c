//! Decoding of simulator output into what a board front end shows.
//!
//! The simulator drives one shared active-low 7-segment bus plus one
//! active-low anode line per digit, the way a real FPGA board multiplexes its
//! display. A front end only needs the per-LED and per-digit result.

use serde::{Deserialize, Serialize};

use crate::ipc::OutputState;

/// Active-low 7-segment patterns for the hex digits 0-F.
const SEGMENT_TABLE: [(u8, u8); 16] = [
    (0xC0, 0x0),
    (0xF9, 0x1),
    (0xA4, 0x2),
    (0xB0, 0x3),
    (0x99, 0x4),
    (0x92, 0x5),
    (0x82, 0x6),
    (0xF8, 0x7),
    (0x80, 0x8),
    (0x90, 0x9),
    (0x88, 0xA),
    (0x83, 0xB),
    (0xC6, 0xC),
    (0xA1, 0xD),
    (0x86, 0xE),
    (0x8D, 0xF),
];

/// Decode a segment byte into the digit it draws.
///
/// Returns `None` for any pattern that is not one of the 16 hex digits.
pub fn decode_digit(segments: u8) -> Option<u8> {
    SEGMENT_TABLE
        .iter()
        .find(|(pattern, _)| *pattern == segments)
        .map(|&(_, digit)| digit)
}

/// Number of each I/O element on the simulated board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardLayout {
    pub buttons: u32,
    pub switches: u32,
    pub leds: u32,
    pub digits: u32,
}

impl Default for BoardLayout {
    fn default() -> Self {
        Self {
            buttons: 4,
            switches: 8,
            leds: 8,
            digits: 4,
        }
    }
}

/// State of one 7-segment digit position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DigitCell {
    /// Anode active. Holds the decoded digit, or `None` for an unknown pattern.
    Lit(Option<u8>),
    /// Anode inactive.
    Dark,
}

/// Everything a front end renders for one received [`OutputState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayFrame {
    /// LED `i` is lit when bit `i` of the LED mask is set.
    pub leds: Vec<bool>,
    /// Digit `i` is driven by anode bit `i`.
    pub digits: Vec<DigitCell>,
}

impl DisplayFrame {
    pub fn from_output(output: &OutputState, layout: &BoardLayout) -> Self {
        let leds = (0..layout.leds).map(|i| bit(output.leds, i)).collect();
        let digit = decode_digit(output.segments);
        let digits = (0..layout.digits)
            .map(|i| {
                if bit(output.anodes, i) {
                    DigitCell::Dark
                } else {
                    DigitCell::Lit(digit)
                }
            })
            .collect();
        Self { leds, digits }
    }

    /// Compact one-line rendering, most significant element first.
    ///
    /// LEDs print as `*`/`.`, digits as a hex character, `?` for an unknown
    /// pattern and `_` when dark.
    pub fn render(&self) -> String {
        let leds: String = self
            .leds
            .iter()
            .rev()
            .map(|&lit| if lit { '*' } else { '.' })
            .collect();
        let digits: String = self
            .digits
            .iter()
            .rev()
            .map(|cell| match cell {
                DigitCell::Lit(Some(d)) => char::from_digit(u32::from(*d), 16)
                    .map(|c| c.to_ascii_uppercase())
                    .unwrap_or('?'),
                DigitCell::Lit(None) => '?',
                DigitCell::Dark => '_',
            })
            .collect();
        format!("leds [{}] digits [{}]", leds, digits)
    }
}

fn bit(mask: u32, index: u32) -> bool {
    mask.checked_shr(index).is_some_and(|m| m & 1 == 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_recognized_patterns() {
        let expected = [
            0xC0, 0xF9, 0xA4, 0xB0, 0x99, 0x92, 0x82, 0xF8, 0x80, 0x90, 0x88, 0x83, 0xC6, 0xA1,
            0x86, 0x8D,
        ];
        for (digit, pattern) in expected.into_iter().enumerate() {
            assert_eq!(decode_digit(pattern), Some(digit as u8), "pattern {:#x}", pattern);
        }
    }

    #[test]
    fn test_unknown_patterns_decode_to_none() {
        let known: Vec<u8> = SEGMENT_TABLE.iter().map(|(p, _)| *p).collect();
        for byte in 0..=u8::MAX {
            if !known.contains(&byte) {
                assert_eq!(decode_digit(byte), None, "byte {:#x}", byte);
            }
        }
    }

    #[test]
    fn test_frame_from_output() {
        let layout = BoardLayout {
            leds: 4,
            digits: 4,
            ..BoardLayout::default()
        };
        // LEDs 0 and 2 on, digits 0 and 3 enabled (active low), showing "5"
        let output = OutputState::new(0b0101, 0x92, 0b0110);
        let frame = DisplayFrame::from_output(&output, &layout);

        assert_eq!(frame.leds, vec![true, false, true, false]);
        assert_eq!(
            frame.digits,
            vec![
                DigitCell::Lit(Some(5)),
                DigitCell::Dark,
                DigitCell::Dark,
                DigitCell::Lit(Some(5)),
            ]
        );
        assert_eq!(frame.render(), "leds [.*.*] digits [5__5]");
    }

    #[test]
    fn test_frame_unknown_pattern() {
        let layout = BoardLayout {
            leds: 0,
            digits: 1,
            ..BoardLayout::default()
        };
        let frame = DisplayFrame::from_output(&OutputState::new(0, 0xFF, 0), &layout);
        assert_eq!(frame.digits, vec![DigitCell::Lit(None)]);
        assert_eq!(frame.render(), "leds [] digits [?]");
    }

    #[test]
    fn test_large_layout_does_not_overflow() {
        let layout = BoardLayout {
            leds: 40,
            digits: 0,
            ..BoardLayout::default()
        };
        let frame = DisplayFrame::from_output(&OutputState::new(u32::MAX, 0, 0), &layout);
        assert_eq!(frame.leds.iter().filter(|&&lit| lit).count(), 32);
    }
}
