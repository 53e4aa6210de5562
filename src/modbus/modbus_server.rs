// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP server for the simulator
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module uses
//! the terms "server" and "client" instead. The server is the device that provides data,
//! while the client is the device that requests data.
//!
//! The Modbus master is the device that requests data, while the Modbus slave is the device
//! that provides data. In other words, the simulator is the Modbus slave and is here the
//! server.
//!
//! Every client connection gets its own [`SimulatorModbusService`], all of them
//! sharing one [`ModbusDataBank`]. The simulation engine writes into the same bank
//! from its own task, so serving clients never blocks the tick loop.

use std::{borrow::Cow, future, io, net::SocketAddr, sync::Arc};

use log::{debug, error, info};
use thiserror::Error;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_modbus::{
    prelude::*,
    server::tcp::{accept_tcp_connection, Server},
};

use super::data_bank::ModbusDataBank;

/// Errors preventing the Modbus server from listening.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("failed to bind Modbus server on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("Modbus server socket has no local address: {0}")]
    LocalAddr(#[source] io::Error),
}

/// Per-connection Modbus service backed by the shared data bank.
#[derive(Clone)]
pub struct SimulatorModbusService {
    bank: Arc<ModbusDataBank>,
}

impl SimulatorModbusService {
    pub fn new(bank: Arc<ModbusDataBank>) -> Self {
        Self { bank }
    }
}

impl tokio_modbus::server::Service for SimulatorModbusService {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    /// Process a Modbus request and provide a response
    ///
    /// Supported function codes:
    /// - 0x01: Read Coils
    /// - 0x02: Read Discrete Inputs
    /// - 0x03: Read Holding Registers
    /// - 0x04: Read Input Registers
    /// - 0x05: Write Single Coil
    /// - 0x06: Write Single Register
    /// - 0x0F: Write Multiple Coils
    /// - 0x10: Write Multiple Registers
    ///
    /// Any other function code will return an IllegalFunction exception.
    fn call(&self, req: Self::Request) -> Self::Future {
        debug!("Received Modbus request: {:?}", req);

        let res = match req {
            Request::ReadCoils(addr, cnt) => {
                self.bank.read_coils(addr, cnt).map(Response::ReadCoils)
            }
            Request::ReadDiscreteInputs(addr, cnt) => self
                .bank
                .read_discrete_inputs(addr, cnt)
                .map(Response::ReadDiscreteInputs),
            Request::ReadHoldingRegisters(addr, cnt) => self
                .bank
                .read_holding_registers(addr, cnt)
                .map(Response::ReadHoldingRegisters),
            Request::ReadInputRegisters(addr, cnt) => self
                .bank
                .read_input_registers(addr, cnt)
                .map(Response::ReadInputRegisters),
            Request::WriteSingleCoil(addr, value) => self
                .bank
                .write_coils(addr, std::slice::from_ref(&value))
                .map(|_| Response::WriteSingleCoil(addr, value))
                .map_err(ExceptionCode::from),
            Request::WriteMultipleCoils(addr, values) => write_many(&values, |v| {
                self.bank.write_coils(addr, v)
            })
            .map(|cnt| Response::WriteMultipleCoils(addr, cnt)),
            Request::WriteSingleRegister(addr, value) => self
                .bank
                .write_holding_registers(addr, std::slice::from_ref(&value))
                .map(|_| Response::WriteSingleRegister(addr, value))
                .map_err(ExceptionCode::from),
            Request::WriteMultipleRegisters(addr, values) => write_many(&values, |v| {
                self.bank.write_holding_registers(addr, v)
            })
            .map(|cnt| Response::WriteMultipleRegisters(addr, cnt)),
            _ => {
                error!(
                    "Exception::IllegalFunction - Unimplemented function code in request: {req:?}"
                );
                Err(ExceptionCode::IllegalFunction)
            }
        };

        if let Err(e) = &res {
            error!("Modbus request error: {:?}", e);
        }

        future::ready(res)
    }
}

/// Apply a multi-value client write, answering with the written quantity.
fn write_many<T: Clone>(
    values: &Cow<'static, [T]>,
    write: impl FnOnce(&[T]) -> Result<(), super::WriteError>,
) -> Result<u16, ExceptionCode> {
    let cnt = u16::try_from(values.len()).map_err(|_| ExceptionCode::IllegalDataValue)?;
    if cnt == 0 {
        return Err(ExceptionCode::IllegalDataValue);
    }
    write(values.as_ref())?;
    Ok(cnt)
}

/// A Modbus TCP server that is bound and serving in a background task.
pub struct ModbusServerHandle {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ModbusServerHandle {
    /// Bind the listener and start serving the data bank.
    ///
    /// Returns only once the socket is bound, so a failure to listen is
    /// reported here rather than from the background task.
    pub async fn start(
        address: &str,
        port: u16,
        bank: Arc<ModbusDataBank>,
    ) -> Result<Self, StartupError> {
        let listener = TcpListener::bind((address, port))
            .await
            .map_err(|source| StartupError::Bind {
                addr: format!("{}:{}", address, port),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(StartupError::LocalAddr)?;
        info!("Modbus server listening on {}", local_addr);

        let server = Server::new(listener);

        let on_connected = move |stream, socket_addr| {
            let bank = bank.clone();
            async move {
                accept_tcp_connection(stream, socket_addr, move |peer: SocketAddr| {
                    info!("Modbus client connected from {}", peer);
                    Ok(Some(SimulatorModbusService::new(bank.clone())))
                })
            }
        };

        let on_process_error = |err| {
            error!("Modbus server error: {err}");
        };

        let task = tokio::spawn(async move {
            if let Err(e) = server.serve(&on_connected, on_process_error).await {
                error!("Modbus server error: {}", e);
            }
        });

        Ok(Self { local_addr, task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the accept loop is still alive.
    pub fn is_listening(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop accepting connections.
    pub fn shutdown(self) {
        info!("Shutting down Modbus server on {}", self.local_addr);
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_modbus::server::Service;

    fn service() -> SimulatorModbusService {
        SimulatorModbusService::new(Arc::new(ModbusDataBank::new()))
    }

    #[tokio::test]
    async fn serves_reads_and_writes() {
        let svc = service();

        let res = svc.call(Request::WriteSingleRegister(10, 0xBEEF)).await;
        assert_eq!(res, Ok(Response::WriteSingleRegister(10, 0xBEEF)));

        let res = svc
            .call(Request::WriteMultipleCoils(4, Cow::Owned(vec![true, false, true])))
            .await;
        assert_eq!(res, Ok(Response::WriteMultipleCoils(4, 3)));

        let res = svc.call(Request::ReadHoldingRegisters(9, 2)).await;
        assert_eq!(res, Ok(Response::ReadHoldingRegisters(vec![0, 0xBEEF])));

        let res = svc.call(Request::ReadCoils(4, 3)).await;
        assert_eq!(res, Ok(Response::ReadCoils(vec![true, false, true])));
    }

    #[tokio::test]
    async fn rejects_invalid_requests() {
        let svc = service();

        let res = svc.call(Request::ReadInputRegisters(65535, 2)).await;
        assert_eq!(res, Err(ExceptionCode::IllegalDataAddress));

        let res = svc
            .call(Request::WriteMultipleRegisters(65535, Cow::Owned(vec![1, 2])))
            .await;
        assert_eq!(res, Err(ExceptionCode::IllegalDataAddress));

        let res = svc.call(Request::MaskWriteRegister(0, 0xFF, 0)).await;
        assert_eq!(res, Err(ExceptionCode::IllegalFunction));
    }

    #[tokio::test]
    async fn start_fails_fast_when_port_is_taken() {
        let bank = Arc::new(ModbusDataBank::new());
        let first = ModbusServerHandle::start("127.0.0.1", 0, bank.clone())
            .await
            .unwrap();
        let port = first.local_addr().port();
        assert!(first.is_listening());

        let second = ModbusServerHandle::start("127.0.0.1", port, bank).await;
        assert!(matches!(second, Err(StartupError::Bind { .. })));

        first.shutdown();
    }
}
