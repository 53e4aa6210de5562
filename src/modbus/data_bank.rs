// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus data bank
//!
//! The data bank is the authoritative store behind the Modbus server. It keeps
//! the four Modbus tables over the complete 16-bit address range, every entry
//! starting at 0/false:
//!
//! | Table | Access | Function codes |
//! |-------|--------|----------------|
//! | Coils | read/write | 0x01, 0x05, 0x0F |
//! | Discrete inputs | read only | 0x02 |
//! | Input registers | read only | 0x04 |
//! | Holding registers | read/write | 0x03, 0x06, 0x10 |
//!
//! The simulation engine only sees the [`AddressSpace`] trait: it pushes
//! values and never reads them back, so client writes and engine writes may
//! race freely; each table is guarded by its own `Mutex`.

use std::sync::{Arc, Mutex};

use log::debug;
use thiserror::Error;
use tokio_modbus::prelude::ExceptionCode;

/// Number of addressable entries in each Modbus table.
pub const TABLE_SIZE: usize = 0x1_0000;

/// Errors returned when writing into the data bank.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    #[error("{count} value(s) starting at address {start} exceed the address space")]
    OutOfRange { start: u16, count: usize },
    #[error("data bank is unavailable (poisoned lock)")]
    Unavailable,
}

impl From<WriteError> for ExceptionCode {
    fn from(err: WriteError) -> Self {
        match err {
            WriteError::OutOfRange { .. } => ExceptionCode::IllegalDataAddress,
            WriteError::Unavailable => ExceptionCode::ServerDeviceFailure,
        }
    }
}

/// Write-only view of the Modbus address space used by the simulation engine.
pub trait AddressSpace: Send + Sync {
    /// Store signed register values starting at `start` (two's complement words).
    fn set_holding_registers(&self, start: u16, values: &[i16]) -> Result<(), WriteError>;

    fn set_coils(&self, start: u16, values: &[bool]) -> Result<(), WriteError>;
}

impl<T: AddressSpace + ?Sized> AddressSpace for Arc<T> {
    fn set_holding_registers(&self, start: u16, values: &[i16]) -> Result<(), WriteError> {
        (**self).set_holding_registers(start, values)
    }

    fn set_coils(&self, start: u16, values: &[bool]) -> Result<(), WriteError> {
        (**self).set_coils(start, values)
    }
}

/// In-memory storage for the four Modbus tables.
pub struct ModbusDataBank {
    coils: Mutex<Vec<bool>>,
    discrete_inputs: Mutex<Vec<bool>>,
    input_registers: Mutex<Vec<u16>>,
    holding_registers: Mutex<Vec<u16>>,
}

impl Default for ModbusDataBank {
    fn default() -> Self {
        Self::new()
    }
}

impl ModbusDataBank {
    pub fn new() -> Self {
        Self {
            coils: Mutex::new(vec![false; TABLE_SIZE]),
            discrete_inputs: Mutex::new(vec![false; TABLE_SIZE]),
            input_registers: Mutex::new(vec![0; TABLE_SIZE]),
            holding_registers: Mutex::new(vec![0; TABLE_SIZE]),
        }
    }

    pub fn read_coils(&self, addr: u16, cnt: u16) -> Result<Vec<bool>, ExceptionCode> {
        read_table(&self.coils, addr, cnt)
    }

    pub fn read_discrete_inputs(&self, addr: u16, cnt: u16) -> Result<Vec<bool>, ExceptionCode> {
        read_table(&self.discrete_inputs, addr, cnt)
    }

    pub fn read_input_registers(&self, addr: u16, cnt: u16) -> Result<Vec<u16>, ExceptionCode> {
        read_table(&self.input_registers, addr, cnt)
    }

    pub fn read_holding_registers(&self, addr: u16, cnt: u16) -> Result<Vec<u16>, ExceptionCode> {
        read_table(&self.holding_registers, addr, cnt)
    }

    /// Raw word write used by Modbus clients (function codes 0x06 and 0x10).
    pub fn write_holding_registers(&self, addr: u16, values: &[u16]) -> Result<(), WriteError> {
        write_table(&self.holding_registers, addr, values)
    }

    pub fn write_coils(&self, addr: u16, values: &[bool]) -> Result<(), WriteError> {
        write_table(&self.coils, addr, values)
    }

    /// Current value of one holding register, `None` if the table is unavailable.
    pub fn holding_register(&self, addr: u16) -> Option<u16> {
        self.holding_registers
            .lock()
            .ok()
            .map(|regs| regs[usize::from(addr)])
    }

    pub fn coil(&self, addr: u16) -> Option<bool> {
        self.coils.lock().ok().map(|coils| coils[usize::from(addr)])
    }
}

impl AddressSpace for ModbusDataBank {
    fn set_holding_registers(&self, start: u16, values: &[i16]) -> Result<(), WriteError> {
        let words: Vec<u16> = values.iter().map(|v| *v as u16).collect();
        self.write_holding_registers(start, &words)
    }

    fn set_coils(&self, start: u16, values: &[bool]) -> Result<(), WriteError> {
        self.write_coils(start, values)
    }
}

/// Read `cnt` consecutive entries from a table.
///
/// A zero quantity is rejected with `IllegalDataValue`, a range running past
/// the last address with `IllegalDataAddress`.
fn read_table<T: Copy>(
    table: &Mutex<Vec<T>>,
    addr: u16,
    cnt: u16,
) -> Result<Vec<T>, ExceptionCode> {
    if cnt == 0 {
        return Err(ExceptionCode::IllegalDataValue);
    }
    let start = usize::from(addr);
    let end = start + usize::from(cnt);
    if end > TABLE_SIZE {
        return Err(ExceptionCode::IllegalDataAddress);
    }
    let table = table
        .lock()
        .map_err(|_| ExceptionCode::ServerDeviceFailure)?;
    Ok(table[start..end].to_vec())
}

fn write_table<T: Copy + std::fmt::Debug>(
    table: &Mutex<Vec<T>>,
    addr: u16,
    values: &[T],
) -> Result<(), WriteError> {
    let start = usize::from(addr);
    let end = start + values.len();
    if end > TABLE_SIZE {
        return Err(WriteError::OutOfRange {
            start: addr,
            count: values.len(),
        });
    }
    let mut table = table.lock().map_err(|_| WriteError::Unavailable)?;
    table[start..end].copy_from_slice(values);
    debug!("Wrote {:?} at address {}", values, addr);
    Ok(())
}
