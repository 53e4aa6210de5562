// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Dynamic value table
//!
//! Holds the generator state of every live address. Coil and register
//! addresses live in independent namespaces, so each gets its own map.
//! Fixed addresses never appear here: they are written once at startup.
//!
//! Entries are created once and never removed; the address set is static
//! for the life of the process.

use std::collections::BTreeMap;

use super::generator::{CoilKind, RegisterKind};

/// Generator state of one dynamic holding register.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterGenerator {
    pub kind: RegisterKind,
    pub current_value: i16,
    /// Scheduler time of the last update, `None` until the first one.
    pub last_change: Option<f64>,
}

impl RegisterGenerator {
    pub fn new(kind: RegisterKind) -> Self {
        Self {
            kind,
            current_value: 0,
            last_change: None,
        }
    }

    /// Whether more than one period has elapsed since the last update.
    /// An entry never updated is always due.
    pub fn is_due(&self, now: f64) -> bool {
        match self.last_change {
            Some(last) => now - last > self.kind.period(),
            None => true,
        }
    }
}

/// Generator state of one dynamic coil.
#[derive(Debug, Clone, PartialEq)]
pub struct CoilGenerator {
    pub kind: CoilKind,
    pub current_value: bool,
    pub last_change: Option<f64>,
}

impl CoilGenerator {
    pub fn new(kind: CoilKind) -> Self {
        Self {
            kind,
            current_value: false,
            last_change: None,
        }
    }

    pub fn is_due(&self, now: f64) -> bool {
        match self.last_change {
            Some(last) => now - last > self.kind.period(),
            None => true,
        }
    }
}

/// All live addresses, ordered by address so ticks write in a stable order.
#[derive(Debug, Default, Clone)]
pub struct DynamicValueTable {
    registers: BTreeMap<u16, RegisterGenerator>,
    coils: BTreeMap<u16, CoilGenerator>,
}

impl DynamicValueTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dynamic holding register. A second insert for the same
    /// address replaces the first one.
    pub fn insert_register(&mut self, address: u16, kind: RegisterKind) {
        self.registers.insert(address, RegisterGenerator::new(kind));
    }

    pub fn insert_coil(&mut self, address: u16, kind: CoilKind) {
        self.coils.insert(address, CoilGenerator::new(kind));
    }

    pub fn register(&self, address: u16) -> Option<&RegisterGenerator> {
        self.registers.get(&address)
    }

    pub fn coil(&self, address: u16) -> Option<&CoilGenerator> {
        self.coils.get(&address)
    }

    pub fn registers(&self) -> impl Iterator<Item = (&u16, &RegisterGenerator)> {
        self.registers.iter()
    }

    pub fn coils(&self) -> impl Iterator<Item = (&u16, &CoilGenerator)> {
        self.coils.iter()
    }

    pub(crate) fn registers_mut(&mut self) -> impl Iterator<Item = (&u16, &mut RegisterGenerator)> {
        self.registers.iter_mut()
    }

    pub(crate) fn coils_mut(&mut self) -> impl Iterator<Item = (&u16, &mut CoilGenerator)> {
        self.coils.iter_mut()
    }

    pub fn register_count(&self) -> usize {
        self.registers.len()
    }

    pub fn coil_count(&self) -> usize {
        self.coils.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty() && self.coils.is_empty()
    }
}
