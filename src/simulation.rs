use crate::chiller::ChillerState;
use crate::registers::{
    RegisterStore, SharedRegisters, COIL_PUBLISH, COIL_RESET, COIL_SIMULATE,
    ENTERING_TEMP_REGISTER, LEAVING_TEMP_REGISTER, SETTING_TEMP_REGISTER,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::info;

pub const TICK_PERIOD_MS: u64 = 2000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SimulatorStats {
    pub ticks: u64,
    pub resets: u64,
    pub published_ticks: u64,
    pub paused_ticks: u64,
}

/// What one tick observed and did.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub timestamp_ms: u64,
    pub reset: bool,
    pub setting_adopted: bool,
    pub simulated: bool,
    pub published: bool,
    pub state: ChillerState,
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "setting={:.2}°C entering={:.2}°C leaving={:.2}°C",
            self.state.setting_temp_c, self.state.entering_temp_c, self.state.leaving_temp_c
        )
    }
}

/// Drives the chiller model from the coil map and publishes it back into
/// the registers.
#[derive(Debug)]
pub struct ChillerSimulator {
    registers: SharedRegisters,
    state: ChillerState,
    stats: SimulatorStats,
}

impl ChillerSimulator {
    pub fn new(registers: SharedRegisters) -> Self {
        Self {
            registers,
            state: ChillerState::default(),
            stats: SimulatorStats::default(),
        }
    }

    /// Writes the initial state into registers 0..6, ahead of the first tick.
    pub fn start(&mut self) {
        let mut store = self.registers.lock();
        publish(&mut store, &self.state);
        info!(
            setting = self.state.setting_temp_c,
            entering = self.state.entering_temp_c,
            leaving = self.state.leaving_temp_c,
            "Chiller simulator started with default state"
        );
    }

    /// Runs one tick at wall-clock time `now_ms`.
    ///
    /// The store stays locked for the whole tick, so a client write lands
    /// either before or after it, never between the two cells of a float.
    pub fn tick(&mut self, now_ms: u64) -> TickReport {
        let mut store = self.registers.lock();

        let publish_enabled = store.read_coil(COIL_PUBLISH);
        let reset_requested = store.read_coil(COIL_RESET);
        let simulate_enabled = store.read_coil(COIL_SIMULATE);

        if reset_requested {
            self.state.reset();
            store.write_coil(COIL_RESET, false);
            self.stats.resets += 1;
            info!("Reset requested, chiller state restored to defaults");
        }

        let setting_adopted = self
            .state
            .ingest_setting(store.get_float_at(SETTING_TEMP_REGISTER));

        if simulate_enabled {
            self.state.step(now_ms);
        }

        if publish_enabled {
            publish(&mut store, &self.state);
        }
        drop(store);

        self.stats.ticks += 1;
        let report = TickReport {
            tick: self.stats.ticks,
            timestamp_ms: now_ms,
            reset: reset_requested,
            setting_adopted,
            simulated: simulate_enabled,
            published: publish_enabled,
            state: self.state,
        };

        if publish_enabled {
            self.stats.published_ticks += 1;
            info!("Published {}", report);
        } else {
            self.stats.paused_ticks += 1;
            info!("Publishing paused");
        }

        report
    }

    /// Starts the simulator and ticks every `period` until `shutdown` turns
    /// true or its sender is dropped. The first tick comes one full period
    /// after the defaults are published. Ticks run in this task only, so they
    /// never overlap; a late tick delays the schedule instead of bursting.
    pub async fn run(
        mut self,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> SimulatorStats {
        self.start();

        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(now_millis());
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(
            ticks = self.stats.ticks,
            resets = self.stats.resets,
            "Chiller simulator stopped"
        );
        self.stats
    }

    pub fn state(&self) -> ChillerState {
        self.state
    }

    pub fn set_state(&mut self, state: ChillerState) {
        self.state = state;
    }

    pub fn stats(&self) -> &SimulatorStats {
        &self.stats
    }

    pub fn registers(&self) -> &SharedRegisters {
        &self.registers
    }
}

fn publish(store: &mut RegisterStore, state: &ChillerState) {
    store.set_float_at(SETTING_TEMP_REGISTER, state.setting_temp_c);
    store.set_float_at(ENTERING_TEMP_REGISTER, state.entering_temp_c);
    store.set_float_at(LEAVING_TEMP_REGISTER, state.leaving_temp_c);
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
