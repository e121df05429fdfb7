use serde::{Deserialize, Serialize};

pub const DEFAULT_SETTING_TEMP_C: f64 = 7.0;
pub const DEFAULT_ENTERING_TEMP_C: f64 = 12.0;
pub const DEFAULT_LEAVING_TEMP_C: f64 = 7.5;

// Client-written settings are only adopted strictly inside this range
const SETTING_MIN_C: f64 = 0.0;
const SETTING_MAX_C: f64 = 30.0;

// Return water: 12°C ± 2°C sinusoid over wall-clock time
const ENTERING_BASE_C: f64 = 12.0;
const ENTERING_AMPLITUDE_C: f64 = 2.0;
const ENTERING_TIME_SCALE_MS: f64 = 10_000.0;

// Fraction of the setting/leaving gap closed per tick
const LEAVING_APPROACH_RATE: f64 = 0.1;

/// The three physical quantities of the simulated chiller, in °C.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChillerState {
    pub setting_temp_c: f64,
    pub entering_temp_c: f64,
    pub leaving_temp_c: f64,
}

impl ChillerState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_valid_setting(candidate: f64) -> bool {
        candidate > SETTING_MIN_C && candidate < SETTING_MAX_C
    }

    /// Adopts a client-written setting when it lies in the open range
    /// (0, 30). Anything else, NaN included, leaves the setting untouched.
    pub fn ingest_setting(&mut self, candidate: f64) -> bool {
        if Self::is_valid_setting(candidate) {
            self.setting_temp_c = candidate;
            true
        } else {
            false
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn entering_temp_at(now_ms: u64) -> f64 {
        ENTERING_BASE_C + (now_ms as f64 / ENTERING_TIME_SCALE_MS).sin() * ENTERING_AMPLITUDE_C
    }

    /// Advances one tick: entering temperature follows wall-clock time and
    /// leaving temperature relaxes towards the setting.
    pub fn step(&mut self, now_ms: u64) {
        self.entering_temp_c = Self::entering_temp_at(now_ms);
        self.leaving_temp_c += (self.setting_temp_c - self.leaving_temp_c) * LEAVING_APPROACH_RATE;
    }
}

impl Default for ChillerState {
    fn default() -> Self {
        Self {
            setting_temp_c: DEFAULT_SETTING_TEMP_C,
            entering_temp_c: DEFAULT_ENTERING_TEMP_C,
            leaving_temp_c: DEFAULT_LEAVING_TEMP_C,
        }
    }
}
