//! # Chiller Controller Simulator
//!
//! A stand-in for a real chiller controller, used when integration testing
//! supervisory control software. The device exposes a fixed Modbus memory
//! map and runs a periodic process model behind it.
//!
//! ## Memory map
//!
//! | Address | Kind | Meaning |
//! |---------|------|---------|
//! | 0–1 | Holding registers (float32, big-endian) | Leaving water setting, °C |
//! | 2–3 | Holding registers (float32, big-endian) | Entering water temperature, °C |
//! | 4–5 | Holding registers (float32, big-endian) | Leaving water temperature, °C |
//! | 6–999 | Holding registers | Free, read/write |
//! | 300 | Coil | Publish enabled (default on) |
//! | 301 | Coil | Reset requested (self-clearing) |
//! | 302 | Coil | Simulation enabled (default on) |
//!
//! ## Quick Start
//!
//! ```rust
//! use chiller_sim::{ChillerSimulator, SharedRegisters};
//! use chiller_sim::registers::LEAVING_TEMP_REGISTER;
//!
//! let registers = SharedRegisters::new();
//! let mut simulator = ChillerSimulator::new(registers.clone());
//! simulator.start();
//!
//! let report = simulator.tick(0);
//! assert!(report.published);
//!
//! let leaving = registers.lock().get_float_at(LEAVING_TEMP_REGISTER);
//! assert!((leaving - 7.45).abs() < 1e-5);
//! ```
//!
//! ## Architecture
//!
//! - [`registers`] - Register and coil store behind a single lock
//! - [`codec`] - float32 to register pair conversion
//! - [`chiller`] - The simulated physical state and its update rule
//! - [`simulation`] - The periodic tick that ties coils, model and registers together
//! - [`modbus`] - Modbus TCP bridge built on `tokio-modbus`
//! - [`config`] - Listen address, port, unit id and tick period

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod chiller;
pub mod codec;
pub mod config;
pub mod modbus;
pub mod registers;
pub mod simulation;

// Re-export main public types for convenience
pub use chiller::ChillerState;
pub use config::ServerConfig;
pub use modbus::{ChillerModbusService, FieldbusHandler};
pub use registers::{RegisterStore, SharedRegisters};
pub use simulation::{ChillerSimulator, TickReport};
