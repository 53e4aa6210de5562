// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus simulator library
//!
//! A configurable Modbus TCP slave for exercising client software without real
//! hardware. Coils and holding registers are either fixed or driven by signal
//! generators (random values, sine waves, toggles) recomputed on a fixed tick.

pub mod config;
pub mod daemon;
pub mod modbus;
pub mod simulation;
