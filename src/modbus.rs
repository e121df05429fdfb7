//! Modbus TCP bridge onto the register store.
//!
//! The wire protocol is handled by `tokio-modbus`; this module only maps
//! function codes onto the [`FieldbusHandler`] capability. Addresses that
//! fall outside the map never raise Modbus exceptions: reads answer 0 or
//! `false` and writes are logged and dropped, while the normal echo
//! response goes back to the client.
//!
//! | Function code | Mapping |
//! |---------------|---------|
//! | 0x01 / 0x02 | Read coils / discrete inputs → coil reads |
//! | 0x03 | Read holding registers → register reads |
//! | 0x04 | Read input registers → register reads |
//! | 0x05 / 0x0F | Write single / multiple coils |
//! | 0x06 / 0x10 | Write single / multiple registers |
//!
//! Any other function code is answered with `IllegalFunction`.

use std::{future, io, net::SocketAddr};

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_modbus::{
    prelude::*,
    server::tcp::{accept_tcp_connection, Server},
};
use tracing::{debug, error, info, warn};

use crate::registers::{RegisterStore, SharedRegisters};

/// Callbacks a field-bus transport uses to reach the device memory.
pub trait FieldbusHandler {
    fn on_read_register(&self, addr: u16) -> u16;

    /// Holding register read addressed to a unit. The simulator is a single
    /// logical unit, so `unit_id` does not change the result.
    fn on_read_holding_register(&self, addr: u16, _unit_id: u8) -> u16 {
        self.on_read_register(addr)
    }

    fn on_write_register(&mut self, addr: u16, value: u16);

    fn on_read_coil(&self, addr: u16) -> bool;

    fn on_write_coil(&mut self, addr: u16, value: bool);
}

impl FieldbusHandler for RegisterStore {
    fn on_read_register(&self, addr: u16) -> u16 {
        self.read_register(addr)
    }

    fn on_write_register(&mut self, addr: u16, value: u16) {
        self.write_register(addr, value);
    }

    fn on_read_coil(&self, addr: u16) -> bool {
        self.read_coil(addr)
    }

    fn on_write_coil(&mut self, addr: u16, value: bool) {
        self.write_coil(addr, value);
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind Modbus listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("Modbus server I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Address of the `offset`-th cell after `start`, or `None` past `u16::MAX`.
fn address_at(start: u16, offset: usize) -> Option<u16> {
    u16::try_from(offset)
        .ok()
        .and_then(|offset| start.checked_add(offset))
}

fn quantity(len: usize) -> u16 {
    u16::try_from(len).unwrap_or(u16::MAX)
}

fn read_coils<H: FieldbusHandler>(handler: &H, start: u16, count: u16) -> Vec<bool> {
    (0..usize::from(count))
        .map(|offset| address_at(start, offset).is_some_and(|addr| handler.on_read_coil(addr)))
        .collect()
}

/// Applies one decoded Modbus request to `handler`.
pub fn handle_request<H: FieldbusHandler>(
    handler: &mut H,
    unit_id: u8,
    req: Request<'_>,
) -> Result<Response, ExceptionCode> {
    match req {
        Request::ReadCoils(addr, cnt) => Ok(Response::ReadCoils(read_coils(&*handler, addr, cnt))),
        Request::ReadDiscreteInputs(addr, cnt) => {
            Ok(Response::ReadDiscreteInputs(read_coils(&*handler, addr, cnt)))
        }
        Request::ReadHoldingRegisters(addr, cnt) => {
            let values = (0..usize::from(cnt))
                .map(|offset| {
                    address_at(addr, offset)
                        .map_or(0, |reg| handler.on_read_holding_register(reg, unit_id))
                })
                .collect();
            Ok(Response::ReadHoldingRegisters(values))
        }
        Request::ReadInputRegisters(addr, cnt) => {
            let values = (0..usize::from(cnt))
                .map(|offset| address_at(addr, offset).map_or(0, |reg| handler.on_read_register(reg)))
                .collect();
            Ok(Response::ReadInputRegisters(values))
        }
        Request::WriteSingleRegister(addr, value) => {
            handler.on_write_register(addr, value);
            Ok(Response::WriteSingleRegister(addr, value))
        }
        Request::WriteMultipleRegisters(addr, values) => {
            for (offset, value) in values.iter().enumerate() {
                match address_at(addr, offset) {
                    Some(reg) => handler.on_write_register(reg, *value),
                    None => warn!(addr, offset, "Invalid register write ignored"),
                }
            }
            Ok(Response::WriteMultipleRegisters(addr, quantity(values.len())))
        }
        Request::WriteSingleCoil(addr, value) => {
            handler.on_write_coil(addr, value);
            Ok(Response::WriteSingleCoil(addr, value))
        }
        Request::WriteMultipleCoils(addr, values) => {
            for (offset, value) in values.iter().enumerate() {
                match address_at(addr, offset) {
                    Some(coil) => handler.on_write_coil(coil, *value),
                    None => warn!(addr, offset, "Invalid coil write ignored"),
                }
            }
            Ok(Response::WriteMultipleCoils(addr, quantity(values.len())))
        }
        _ => {
            error!("Exception::IllegalFunction - Unimplemented function code in request: {req:?}");
            Err(ExceptionCode::IllegalFunction)
        }
    }
}

/// Per-connection `tokio-modbus` service. Every connection shares the same
/// register store; each request is applied under a single lock.
#[derive(Debug, Clone)]
pub struct ChillerModbusService {
    registers: SharedRegisters,
    unit_id: u8,
}

impl ChillerModbusService {
    pub fn new(registers: SharedRegisters, unit_id: u8) -> Self {
        Self { registers, unit_id }
    }
}

impl tokio_modbus::server::Service for ChillerModbusService {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        debug!("Received Modbus request: {:?}", req);
        let unit_id = self.unit_id;
        let res = self
            .registers
            .with(|store| handle_request(store, unit_id, req));
        future::ready(res)
    }
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Accepts Modbus TCP clients on `listener` until the task is aborted.
pub async fn serve(
    listener: TcpListener,
    registers: SharedRegisters,
    unit_id: u8,
) -> Result<(), ServerError> {
    let local_addr = listener.local_addr()?;
    info!("Modbus TCP server listening on {} (unit {})", local_addr, unit_id);

    let server = Server::new(listener);

    let on_connected = move |stream: TcpStream, socket_addr: SocketAddr| {
        let service = ChillerModbusService::new(registers.clone(), unit_id);
        async move {
            info!("Client connected: {}", socket_addr);
            accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                Ok(Some(service.clone()))
            })
        }
    };

    let on_process_error = |err: io::Error| {
        error!("Modbus connection error: {err}");
    };

    server.serve(&on_connected, on_process_error).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_f32;
    use crate::registers::{COIL_PUBLISH, COIL_RESET, COIL_SIMULATE};
    use std::borrow::Cow;

    #[test]
    fn test_read_holding_registers_past_end() {
        let mut store = RegisterStore::new();
        store.write_register(999, 77);

        let res = handle_request(&mut store, 1, Request::ReadHoldingRegisters(998, 4)).unwrap();
        assert_eq!(res, Response::ReadHoldingRegisters(vec![0, 77, 0, 0]));

        let res = handle_request(&mut store, 1, Request::ReadInputRegisters(u16::MAX, 2)).unwrap();
        assert_eq!(res, Response::ReadInputRegisters(vec![0, 0]));
    }

    #[test]
    fn test_write_multiple_registers_float() {
        let mut store = RegisterStore::new();
        let (high, low) = encode_f32(15.0);

        let res = handle_request(
            &mut store,
            1,
            Request::WriteMultipleRegisters(0, Cow::Owned(vec![high, low])),
        )
        .unwrap();
        assert_eq!(res, Response::WriteMultipleRegisters(0, 2));
        assert_eq!(store.get_float_at(0), 15.0);
    }

    #[test]
    fn test_invalid_writes_echo_without_mutation() {
        let mut store = RegisterStore::new();
        let before = store.clone();

        let res = handle_request(&mut store, 1, Request::WriteSingleRegister(1000, 5)).unwrap();
        assert_eq!(res, Response::WriteSingleRegister(1000, 5));

        let res = handle_request(&mut store, 1, Request::WriteSingleCoil(400, true)).unwrap();
        assert_eq!(res, Response::WriteSingleCoil(400, true));

        assert_eq!(store.registers(), before.registers());
        assert!(!store.read_coil(400));
    }

    #[test]
    fn test_coil_requests() {
        let mut store = RegisterStore::new();

        let res = handle_request(&mut store, 1, Request::ReadCoils(299, 5)).unwrap();
        assert_eq!(res, Response::ReadCoils(vec![false, true, false, true, false]));

        handle_request(
            &mut store,
            1,
            Request::WriteMultipleCoils(COIL_PUBLISH, Cow::Owned(vec![false, true, false])),
        )
        .unwrap();
        assert!(!store.read_coil(COIL_PUBLISH));
        assert!(store.read_coil(COIL_RESET));
        assert!(!store.read_coil(COIL_SIMULATE));
    }

    #[test]
    fn test_unsupported_function_is_rejected() {
        let mut store = RegisterStore::new();
        let res = handle_request(
            &mut store,
            1,
            Request::ReadWriteMultipleRegisters(0, 2, 0, Cow::Owned(vec![1, 2])),
        );
        assert_eq!(res, Err(ExceptionCode::IllegalFunction));
    }

    #[test]
    fn test_unit_id_does_not_change_reads() {
        let mut store = RegisterStore::new();
        store.write_register(3, 0xBEEF);
        assert_eq!(store.on_read_holding_register(3, 1), 0xBEEF);
        assert_eq!(store.on_read_holding_register(3, 17), 0xBEEF);
    }
}
