//! Register and coil memory of the simulated controller.
//!
//! The map is fixed: 1000 holding registers addressed `0..1000` and three
//! control coils at 300, 301 and 302. Out-of-range accesses are reported and
//! absorbed; they never fail and never mutate anything.

use heapless::FnvIndexMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

pub const REGISTER_COUNT: usize = 1000;

/// Coil 300: publish simulated values into the register map.
pub const COIL_PUBLISH: u16 = 300;
/// Coil 301: restore the chiller state to defaults on the next tick.
pub const COIL_RESET: u16 = 301;
/// Coil 302: advance the simulated temperatures each tick.
pub const COIL_SIMULATE: u16 = 302;

pub const COIL_ADDRESSES: [u16; 3] = [COIL_PUBLISH, COIL_RESET, COIL_SIMULATE];

// float32 fields, two big-endian cells each
pub const SETTING_TEMP_REGISTER: u16 = 0;
pub const ENTERING_TEMP_REGISTER: u16 = 2;
pub const LEAVING_TEMP_REGISTER: u16 = 4;

// heapless index maps need a power-of-two capacity
const COIL_CAPACITY: usize = 4;

type CoilMap = FnvIndexMap<u16, bool, COIL_CAPACITY>;

#[derive(Debug, Clone)]
pub struct RegisterStore {
    registers: [u16; REGISTER_COUNT],
    coils: CoilMap,
}

impl RegisterStore {
    pub fn new() -> Self {
        let mut coils = CoilMap::new();
        // Capacity exceeds the coil set, so none of these inserts can overflow
        let _ = coils.insert(COIL_PUBLISH, true);
        let _ = coils.insert(COIL_RESET, false);
        let _ = coils.insert(COIL_SIMULATE, true);

        Self {
            registers: [0; REGISTER_COUNT],
            coils,
        }
    }

    pub fn is_valid_register(addr: u16) -> bool {
        usize::from(addr) < REGISTER_COUNT
    }

    pub fn is_valid_coil(addr: u16) -> bool {
        COIL_ADDRESSES.contains(&addr)
    }

    /// Returns the cell at `addr`, or 0 when the address is outside the map.
    pub fn read_register(&self, addr: u16) -> u16 {
        self.registers.get(usize::from(addr)).copied().unwrap_or(0)
    }

    pub fn write_register(&mut self, addr: u16, value: u16) {
        match self.registers.get_mut(usize::from(addr)) {
            Some(cell) => {
                *cell = value;
                debug!(addr, value, "Register written");
            }
            None => warn!(addr, "Invalid register write ignored"),
        }
    }

    /// Returns the coil at `addr`, or `false` for any address outside the coil set.
    pub fn read_coil(&self, addr: u16) -> bool {
        self.coils.get(&addr).copied().unwrap_or(false)
    }

    pub fn write_coil(&mut self, addr: u16, value: bool) {
        if !Self::is_valid_coil(addr) {
            warn!(addr, value, "Invalid coil write ignored");
            return;
        }

        // Capacity exceeds the coil set, so the insert cannot overflow
        let _ = self.coils.insert(addr, value);
        debug!(addr, value, "Coil written");
    }

    /// Copies `count` cells starting at `start`. Cells past the end of the
    /// map, including addresses beyond `u16::MAX`, read as 0.
    pub fn read_block(&self, start: u16, count: u16) -> Vec<u16> {
        (0..count)
            .map(|offset| start.checked_add(offset).map_or(0, |addr| self.read_register(addr)))
            .collect()
    }

    pub fn registers(&self) -> &[u16] {
        &self.registers
    }
}

impl Default for RegisterStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide handle on the register store.
///
/// Registers and coils sit behind a single mutex, so a multi-cell operation
/// performed through [`SharedRegisters::with`] is never interleaved with a
/// client write.
#[derive(Debug, Clone, Default)]
pub struct SharedRegisters {
    inner: Arc<Mutex<RegisterStore>>,
}

impl SharedRegisters {
    pub fn new() -> Self {
        Self::from_store(RegisterStore::new())
    }

    pub fn from_store(store: RegisterStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Locks the store. A poisoned lock is recovered: every store operation
    /// leaves the map consistent, so the data behind it is still valid.
    pub fn lock(&self) -> MutexGuard<'_, RegisterStore> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut RegisterStore) -> R) -> R {
        let mut store = self.lock();
        f(&mut store)
    }

    pub fn snapshot(&self) -> RegisterStore {
        self.lock().clone()
    }
}
