// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus communication module
//!
//! This module provides the Modbus TCP server the simulator exposes, and the
//! data bank it serves.
//!
//! ## Key Components
//!
//! - `ModbusDataBank`: coils, discrete inputs, input registers and holding
//!   registers over the whole 16-bit address range.
//! - `AddressSpace`: the write-only view of the bank used by the simulation
//!   engine.
//! - `ModbusServerHandle`: binds the TCP listener and serves the bank in a
//!   background task.
//!
//! ## Address ranges
//!
//! Configuration files written for classic Modbus tooling usually number
//! entries by range: 1-9999 for coils, 10001-19999 for discrete inputs,
//! 30001-39999 for input registers and 40001-49999 for holding registers.
//! The simulator uses plain zero-based protocol addresses within each table.

pub mod data_bank;
pub mod modbus_server;

pub use data_bank::{AddressSpace, ModbusDataBank, WriteError, TABLE_SIZE};
pub use modbus_server::{ModbusServerHandle, SimulatorModbusService, StartupError};
