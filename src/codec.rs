//! IEEE-754 single precision floats carried in two big-endian registers.
//!
//! The high cell holds bits 31..16 and the low cell bits 15..0, the
//! "ABCD" word order most chiller controllers use.

use crate::registers::RegisterStore;

/// Narrows `value` to `f32` and splits it into `(high, low)` register cells.
pub fn encode_f32(value: f64) -> (u16, u16) {
    #[allow(clippy::cast_possible_truncation)]
    let [b0, b1, b2, b3] = (value as f32).to_be_bytes();
    (u16::from_be_bytes([b0, b1]), u16::from_be_bytes([b2, b3]))
}

/// Joins two register cells back into a float, widened to `f64`.
pub fn decode_f32(high: u16, low: u16) -> f64 {
    let [b0, b1] = high.to_be_bytes();
    let [b2, b3] = low.to_be_bytes();
    f64::from(f32::from_be_bytes([b0, b1, b2, b3]))
}

impl RegisterStore {
    /// Writes `value` to `start` and `start + 1`. A pair that runs off the end
    /// of the map is written as far as it is valid; the rest is reported.
    pub fn set_float_at(&mut self, start: u16, value: f64) {
        let (high, low) = encode_f32(value);
        self.write_register(start, high);
        self.write_register(start.saturating_add(1), low);
    }

    pub fn get_float_at(&self, start: u16) -> f64 {
        decode_f32(
            self.read_register(start),
            self.read_register(start.saturating_add(1)),
        )
    }
}
