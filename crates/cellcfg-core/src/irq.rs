//! Interrupt pin bitmap codec.
//!
//! An irqchip entry routes up to 128 consecutive controller pins to a cell.
//! Bit `i` of the bitmap (word `i / 32`, bit `i % 32`) stands for pin
//! `pin_base + i`.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of pins covered by one bitmap.
pub const PINS_PER_BITMAP: u32 = 128;

/// Width of one bitmap word; `pin_base` must be a multiple of it.
pub const PINS_PER_WORD: u32 = 32;

/// Errors from encoding pins into a bitmap.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PinError {
    #[error("pin {pin} is outside the 128-pin window starting at {base}")]
    OutOfWindow { pin: u32, base: u32 },

    #[error("pin base {base} is not a multiple of 32")]
    MisalignedBase { base: u32 },
}

/// A 128-pin routing bitmap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PinBitmap {
    words: [u32; 4],
}

impl PinBitmap {
    /// An empty bitmap.
    pub const EMPTY: PinBitmap = PinBitmap { words: [0; 4] };

    pub fn from_words(words: [u32; 4]) -> Self {
        Self { words }
    }

    pub fn words(&self) -> [u32; 4] {
        self.words
    }

    /// Build from the raw 128-bit pattern (bit 0 = word 0, bit 0).
    pub fn from_u128(bits: u128) -> Self {
        let mut words = [0u32; 4];
        for (i, word) in words.iter_mut().enumerate() {
            *word = (bits >> (32 * i)) as u32;
        }
        Self { words }
    }

    /// The raw 128-bit pattern.
    pub fn as_u128(&self) -> u128 {
        self.words
            .iter()
            .enumerate()
            .fold(0u128, |acc, (i, &w)| acc | (u128::from(w) << (32 * i)))
    }

    /// Whether bit `index` is set. Indices past the window are never set.
    pub fn is_set(&self, index: u32) -> bool {
        index < PINS_PER_BITMAP && self.as_u128() & (1u128 << index) != 0
    }

    pub fn set(&mut self, index: u32) {
        if index < PINS_PER_BITMAP {
            self.words[(index / PINS_PER_WORD) as usize] |= 1 << (index % PINS_PER_WORD);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Number of routed pins.
    pub fn count(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    /// Bit indices that are set, in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = u32> + '_ {
        (0..PINS_PER_BITMAP).filter(move |&i| self.is_set(i))
    }

    /// Decode into absolute pin numbers `pin_base + i`.
    ///
    /// Pins that would exceed `u32::MAX` cannot be represented and are
    /// dropped here. Validation walks [`PinBitmap::indices`] and reports them.
    pub fn decode(&self, pin_base: u32) -> BTreeSet<u32> {
        self.indices()
            .filter_map(|i| pin_base.checked_add(i))
            .collect()
    }

    /// Encode absolute pin numbers relative to `pin_base`.
    ///
    /// Inverse of [`PinBitmap::decode`]: `encode(decode(p, b), b) == p`.
    pub fn encode<I>(pins: I, pin_base: u32) -> Result<Self, PinError>
    where
        I: IntoIterator<Item = u32>,
    {
        if pin_base % PINS_PER_WORD != 0 {
            return Err(PinError::MisalignedBase { base: pin_base });
        }
        let mut bitmap = Self::EMPTY;
        for pin in pins {
            let index = pin
                .checked_sub(pin_base)
                .filter(|&i| i < PINS_PER_BITMAP)
                .ok_or(PinError::OutOfWindow {
                    pin,
                    base: pin_base,
                })?;
            bitmap.set(index);
        }
        Ok(bitmap)
    }
}

impl fmt::Display for PinBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#010x} {:#010x} {:#010x} {:#010x}",
            self.words[0], self.words[1], self.words[2], self.words[3]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn decode_sample_chip() {
        // sdhci0 (SPI 35) and sproxy (SPI 71) on a chip based at 32
        let bitmap = PinBitmap::from_words([1 << (35 - 32), 1 << (71 - 64), 0, 0]);
        let pins: Vec<u32> = bitmap.decode(32).into_iter().collect();
        assert_eq!(pins, vec![35, 71]);
    }

    #[test]
    fn decode_high_word() {
        let bitmap = PinBitmap::from_words([0xffff_ff00, 0, 0, 0]);
        let pins = bitmap.decode(416);
        assert_eq!(pins.len(), 24);
        assert_eq!(pins.first(), Some(&424));
        assert_eq!(pins.last(), Some(&447));
    }

    #[test]
    fn encode_rejects_pins_outside_window() {
        let err = PinBitmap::encode([32, 160], 32).unwrap_err();
        assert_eq!(err, PinError::OutOfWindow { pin: 160, base: 32 });
        assert!(PinBitmap::encode([10], 32).is_err());
    }

    #[test]
    fn encode_rejects_misaligned_base() {
        assert_eq!(
            PinBitmap::encode([40], 33),
            Err(PinError::MisalignedBase { base: 33 })
        );
    }

    #[test]
    fn u128_view_matches_words() {
        let bitmap = PinBitmap::from_words([1, 0, 0, 0x8000_0000]);
        assert_eq!(bitmap.as_u128(), 1 | (1u128 << 127));
        assert_eq!(PinBitmap::from_u128(bitmap.as_u128()), bitmap);
        assert_eq!(bitmap.count(), 2);
    }

    proptest! {
        #[test]
        fn encode_inverts_decode(bits in any::<u128>(), word in 0u32..1024) {
            let base = word * PINS_PER_WORD;
            let bitmap = PinBitmap::from_u128(bits);
            let pins = bitmap.decode(base);
            prop_assert_eq!(pins.len() as u32, bitmap.count());
            prop_assert_eq!(PinBitmap::encode(pins, base).unwrap(), bitmap);
        }
    }
}
