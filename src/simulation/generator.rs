// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Generator specifications
//!
//! Every configured address carries a short comma-separated specification
//! string describing how its value behaves. This module turns those strings
//! into typed specs once, at startup, so the tick loop only ever matches on
//! enum variants.
//!
//! ## Register grammar
//!
//! | Text | Meaning |
//! |------|---------|
//! | `<int>` | Fixed value |
//! | `rand,<min>,<max>,<period>` | Uniform random integer in `[min, max]` every `period` seconds |
//! | `risefall,<min>,<max>,<period>` | Sine wave between `min` and `max` with the given period |
//!
//! ## Coil grammar
//!
//! | Text | Meaning |
//! |------|---------|
//! | `0` / `1` | Fixed value |
//! | `rand,<period>` | Random boolean every `period` seconds |
//! | `toggle,<period>` | Inverts the coil every `period` seconds |

use std::collections::BTreeMap;
use std::str::FromStr;

use log::debug;
use thiserror::Error;

/// Errors raised while parsing a generator specification string.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigFormatError {
    #[error("unknown generator kind '{0}'")]
    UnknownKind(String),
    #[error("missing field '{field}' in '{spec}'")]
    MissingField { field: &'static str, spec: String },
    #[error("field '{field}' is not a valid number: '{value}'")]
    InvalidNumber { field: &'static str, value: String },
    #[error("min {min} is greater than max {max}")]
    MinGreaterThanMax { min: i16, max: i16 },
    #[error("period must be strictly positive, got {0}")]
    NonPositivePeriod(f64),
    #[error("invalid fixed value '{0}'")]
    InvalidFixedValue(String),
    #[error("unexpected trailing fields in '{0}'")]
    TrailingFields(String),
}

/// Parameters shared by the dynamic register generators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisterRange {
    pub min: i16,
    pub max: i16,
    /// Seconds between two updates, always > 0.
    pub period: f64,
}

/// Dynamic behaviour of a holding register.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegisterKind {
    RandomUniform(RegisterRange),
    SineWave(RegisterRange),
}

impl RegisterKind {
    pub fn range(&self) -> &RegisterRange {
        match self {
            RegisterKind::RandomUniform(range) | RegisterKind::SineWave(range) => range,
        }
    }

    pub fn period(&self) -> f64 {
        self.range().period
    }
}

/// Parsed specification of one holding register.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegisterSpec {
    /// Raw 16-bit word written once at startup.
    Fixed(u16),
    Dynamic(RegisterKind),
}

/// Dynamic behaviour of a coil.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoilKind {
    RandomBoolean { period: f64 },
    Toggle { period: f64 },
}

impl CoilKind {
    pub fn period(&self) -> f64 {
        match self {
            CoilKind::RandomBoolean { period } | CoilKind::Toggle { period } => *period,
        }
    }
}

/// Parsed specification of one coil.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoilSpec {
    Fixed(bool),
    Dynamic(CoilKind),
}

/// Cursor over the comma separated fields of one spec string.
struct Fields<'a> {
    spec: &'a str,
    parts: std::str::Split<'a, char>,
}

impl<'a> Fields<'a> {
    fn new(spec: &'a str) -> Self {
        Self {
            spec,
            parts: spec.split(','),
        }
    }

    fn next_raw(&mut self, field: &'static str) -> Result<&'a str, ConfigFormatError> {
        match self.parts.next().map(str::trim) {
            Some(part) if !part.is_empty() => Ok(part),
            _ => Err(ConfigFormatError::MissingField {
                field,
                spec: self.spec.to_string(),
            }),
        }
    }

    fn next_number<T: FromStr>(&mut self, field: &'static str) -> Result<T, ConfigFormatError> {
        let raw = self.next_raw(field)?;
        raw.parse().map_err(|_| ConfigFormatError::InvalidNumber {
            field,
            value: raw.to_string(),
        })
    }

    fn next_period(&mut self) -> Result<f64, ConfigFormatError> {
        let period: f64 = self.next_number("period")?;
        // NaN fails this comparison as well
        if !(period > 0.0) || !period.is_finite() {
            return Err(ConfigFormatError::NonPositivePeriod(period));
        }
        Ok(period)
    }

    fn finish(mut self) -> Result<(), ConfigFormatError> {
        match self.parts.next() {
            None => Ok(()),
            Some(_) => Err(ConfigFormatError::TrailingFields(self.spec.to_string())),
        }
    }
}

impl FromStr for RegisterSpec {
    type Err = ConfigFormatError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let spec = spec.trim();
        let mut fields = Fields::new(spec);
        let head = fields.next_raw("kind")?;

        let build: fn(RegisterRange) -> RegisterKind = match head {
            "rand" => RegisterKind::RandomUniform,
            "risefall" => RegisterKind::SineWave,
            _ => return parse_fixed_register(head, spec),
        };

        let min: i16 = fields.next_number("min")?;
        let max: i16 = fields.next_number("max")?;
        let period = fields.next_period()?;
        fields.finish()?;

        if min > max {
            return Err(ConfigFormatError::MinGreaterThanMax { min, max });
        }

        Ok(RegisterSpec::Dynamic(build(RegisterRange { min, max, period })))
    }
}

/// A fixed register accepts any signed 16-bit value or any unsigned 16-bit
/// word; negative values are stored in two's complement.
fn parse_fixed_register(head: &str, spec: &str) -> Result<RegisterSpec, ConfigFormatError> {
    if head != spec {
        return Err(unknown_or_invalid(head));
    }
    if let Ok(value) = head.parse::<i16>() {
        return Ok(RegisterSpec::Fixed(value as u16));
    }
    if let Ok(value) = head.parse::<u16>() {
        return Ok(RegisterSpec::Fixed(value));
    }
    Err(unknown_or_invalid(head))
}

fn unknown_or_invalid(head: &str) -> ConfigFormatError {
    let numeric = head
        .trim_start_matches(['-', '+'])
        .chars()
        .all(|c| c.is_ascii_digit());
    if numeric && !head.is_empty() {
        ConfigFormatError::InvalidFixedValue(head.to_string())
    } else {
        ConfigFormatError::UnknownKind(head.to_string())
    }
}

impl FromStr for CoilSpec {
    type Err = ConfigFormatError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let spec = spec.trim();
        let mut fields = Fields::new(spec);
        let head = fields.next_raw("kind")?;

        let kind = match head {
            "0" | "1" if head == spec => return Ok(CoilSpec::Fixed(head == "1")),
            "rand" => CoilKind::RandomBoolean {
                period: fields.next_period()?,
            },
            "toggle" => CoilKind::Toggle {
                period: fields.next_period()?,
            },
            _ => return Err(unknown_or_invalid(head)),
        };
        fields.finish()?;

        Ok(CoilSpec::Dynamic(kind))
    }
}

/// A spec string that failed to parse, with the table and address it belongs to.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    #[error("register {address}: {source}")]
    Register {
        address: u16,
        #[source]
        source: ConfigFormatError,
    },
    #[error("coil {address}: {source}")]
    Coil {
        address: u16,
        #[source]
        source: ConfigFormatError,
    },
}

/// Parsed specs for every configured address.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct GeneratorTables {
    pub registers: BTreeMap<u16, RegisterSpec>,
    pub coils: BTreeMap<u16, CoilSpec>,
}

impl GeneratorTables {
    /// Parse every register and coil spec, stopping at the first malformed one.
    pub fn parse<R, C, S, T>(registers: R, coils: C) -> Result<Self, TableError>
    where
        R: IntoIterator<Item = (u16, S)>,
        C: IntoIterator<Item = (u16, T)>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let mut tables = Self::default();
        for (address, spec) in registers {
            let spec = spec.as_ref();
            debug!("CONFIG: register {} spec '{}'", address, spec);
            let parsed: RegisterSpec = spec
                .parse()
                .map_err(|source| TableError::Register { address, source })?;
            tables.registers.insert(address, parsed);
        }
        for (address, spec) in coils {
            let spec = spec.as_ref();
            debug!("CONFIG: coil {} spec '{}'", address, spec);
            let parsed: CoilSpec = spec
                .parse()
                .map_err(|source| TableError::Coil { address, source })?;
            tables.coils.insert(address, parsed);
        }
        Ok(tables)
    }
}
