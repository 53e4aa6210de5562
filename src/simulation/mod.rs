// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Dynamic value simulation
//!
//! * [`generator`]: parsing of per-address specification strings.
//! * [`table`]: generator state for every live address.
//! * [`engine`]: recomputation of due values and write-through.
//! * [`scheduler`]: the tick loop driving the engine.

pub mod engine;
pub mod generator;
pub mod scheduler;
pub mod table;

pub use engine::{sine_value, TickReport, ValueEngine};
pub use generator::{
    CoilKind, CoilSpec, ConfigFormatError, GeneratorTables, RegisterKind, RegisterRange,
    RegisterSpec, TableError,
};
pub use scheduler::{LoadSummary, Simulator, SimulatorState, DEFAULT_TICK_INTERVAL};
pub use table::{CoilGenerator, DynamicValueTable, RegisterGenerator};
