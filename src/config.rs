//! Transport configuration for the simulator daemon.
//!
//! Every setting is a `chiller-sim` flag backed by an environment variable
//! and a default, so clap resolves flag → environment → default. None of
//! them affect the register map or the simulation.

use clap::{App, Arg, ArgMatches};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::simulation::TICK_PERIOD_MS;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 503;
pub const DEFAULT_UNIT_ID: u8 = 1;

pub const ARG_HOST: &str = "host";
pub const ARG_PORT: &str = "port";
pub const ARG_UNIT_ID: &str = "unit-id";
pub const ARG_PERIOD: &str = "period";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
    #[error("tick period must be greater than zero")]
    ZeroTickPeriod,
    #[error("cannot resolve listen address {0}")]
    UnresolvableAddress(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    /// Stays at 2000 ms in normal operation; other values are for tests and
    /// diagnostics only.
    pub tick_period_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            unit_id: DEFAULT_UNIT_ID,
            tick_period_ms: TICK_PERIOD_MS,
        }
    }
}

/// Command line of the `chiller-sim` daemon.
pub fn app() -> App<'static, 'static> {
    App::new("chiller-sim")
        .version("0.1.0")
        .about("🧊 Chiller controller simulator - Modbus TCP register map with a live process model")
        .arg(
            Arg::with_name(ARG_HOST)
                .long("host")
                .value_name("HOST")
                .help("Listen address")
                .takes_value(true)
                .env("MODBUS_HOST")
                .default_value(DEFAULT_HOST),
        )
        .arg(
            Arg::with_name(ARG_PORT)
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Listen port")
                .takes_value(true)
                .env("MODBUS_PORT")
                .default_value("503"),
        )
        .arg(
            Arg::with_name(ARG_UNIT_ID)
                .short("u")
                .long("unit-id")
                .value_name("ID")
                .help("Modbus unit identifier")
                .takes_value(true)
                .env("MODBUS_UNIT_ID")
                .default_value("1"),
        )
        .arg(
            Arg::with_name(ARG_PERIOD)
                .long("period")
                .value_name("MS")
                .help("Tick period override in milliseconds, for testing only")
                .takes_value(true)
                .hidden(true)
                .env("TICK_PERIOD_MS")
                .default_value("2000"),
        )
}

impl ServerConfig {
    /// Builds the config from parsed `chiller-sim` arguments.
    pub fn from_matches(matches: &ArgMatches<'_>) -> Result<Self, ConfigError> {
        let host = matches.value_of(ARG_HOST).unwrap_or(DEFAULT_HOST).trim();
        if host.is_empty() {
            return Err(invalid(ARG_HOST, host));
        }

        let tick_period_ms = parse_arg(matches, ARG_PERIOD, TICK_PERIOD_MS)?;
        if tick_period_ms == 0 {
            return Err(ConfigError::ZeroTickPeriod);
        }

        Ok(Self {
            host: host.to_string(),
            port: parse_arg(matches, ARG_PORT, DEFAULT_PORT)?,
            unit_id: parse_arg(matches, ARG_UNIT_ID, DEFAULT_UNIT_ID)?,
            tick_period_ms,
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| ConfigError::UnresolvableAddress(format!("{}:{}", self.host, self.port)))
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }
}

fn invalid(key: &str, raw: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    }
}

fn parse_arg<T: FromStr>(matches: &ArgMatches<'_>, name: &str, default: T) -> Result<T, ConfigError> {
    match matches.value_of(name) {
        Some(raw) => raw.trim().parse().map_err(|_| invalid(name, raw)),
        None => Ok(default),
    }
}
