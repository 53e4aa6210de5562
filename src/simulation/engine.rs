// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Value Engine
//!
//! On every tick the engine walks the [`DynamicValueTable`], recomputes the
//! entries whose period has elapsed and pushes the new values into the
//! [`AddressSpace`]. Entries that are not due are left untouched.
//!
//! ## Register generators
//!
//! * `RandomUniform`: uniform integer in `[min, max]`, both ends included.
//! * `SineWave`: `amplitude * sin(2π / period * elapsed) + shift`, with
//!   `amplitude = (max - min) / 2` and `shift = max - amplitude`, truncated
//!   toward zero. The phase is driven by the time elapsed since the simulator
//!   started, never by the time since the last update, so the waveform stays
//!   continuous whatever the tick jitter.
//!
//! ## Coil generators
//!
//! * `RandomBoolean`: fair coin flip.
//! * `Toggle`: inverts the current value.
//!
//! ## Write failures
//!
//! A failed write is logged and skipped. The generator state still advances,
//! so the next due check is computed from the intended value and there is no
//! reconciliation with what the address space actually holds.

use std::f64::consts::PI;

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::generator::{CoilKind, RegisterKind, RegisterRange};
use super::table::DynamicValueTable;
use crate::modbus::AddressSpace;

/// Outcome of one engine tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub registers_updated: usize,
    pub coils_updated: usize,
    pub write_failures: usize,
}

/// Recomputes due generators and writes them through to the address space.
pub struct ValueEngine<R = StdRng> {
    rng: R,
}

impl ValueEngine<StdRng> {
    /// Engine seeded from the operating system.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Engine with a reproducible random sequence.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }
}

impl Default for ValueEngine<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> ValueEngine<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Run one full tick: registers first, then coils.
    ///
    /// `now` is the current timestamp in seconds, `elapsed` the number of
    /// seconds since the simulator entered its running state.
    pub fn tick<A: AddressSpace + ?Sized>(
        &mut self,
        table: &mut DynamicValueTable,
        space: &A,
        now: f64,
        elapsed: f64,
    ) -> TickReport {
        let mut report = TickReport::default();
        self.tick_registers(table, space, now, elapsed, &mut report);
        self.tick_coils(table, space, now, &mut report);
        report
    }

    fn tick_registers<A: AddressSpace + ?Sized>(
        &mut self,
        table: &mut DynamicValueTable,
        space: &A,
        now: f64,
        elapsed: f64,
        report: &mut TickReport,
    ) {
        for (&address, generator) in table.registers_mut() {
            if !generator.is_due(now) {
                continue;
            }

            let new_value = match &generator.kind {
                RegisterKind::RandomUniform(range) => self.random_value(range),
                RegisterKind::SineWave(range) => sine_value(range, elapsed),
            };

            debug!(
                "Changing register {} from {} to {}",
                address, generator.current_value, new_value
            );
            generator.current_value = new_value;
            generator.last_change = Some(now);
            report.registers_updated += 1;

            if let Err(e) = space.set_holding_registers(address, &[new_value]) {
                warn!(
                    "Failed to write value {} to register {}: {}",
                    new_value, address, e
                );
                report.write_failures += 1;
            }
        }
    }

    fn tick_coils<A: AddressSpace + ?Sized>(
        &mut self,
        table: &mut DynamicValueTable,
        space: &A,
        now: f64,
        report: &mut TickReport,
    ) {
        for (&address, generator) in table.coils_mut() {
            if !generator.is_due(now) {
                continue;
            }

            let new_value = match generator.kind {
                CoilKind::RandomBoolean { .. } => self.rng.random_bool(0.5),
                CoilKind::Toggle { .. } => !generator.current_value,
            };

            debug!(
                "Changing coil {} from {} to {}",
                address, generator.current_value as u8, new_value as u8
            );
            generator.current_value = new_value;
            generator.last_change = Some(now);
            report.coils_updated += 1;

            if let Err(e) = space.set_coils(address, &[new_value]) {
                warn!(
                    "Failed to write value {} to coil {}: {}",
                    new_value as u8, address, e
                );
                report.write_failures += 1;
            }
        }
    }

    fn random_value(&mut self, range: &RegisterRange) -> i16 {
        self.rng.random_range(range.min..=range.max)
    }
}

/// Closed form of the rise/fall waveform at `elapsed` seconds.
///
/// The result always lies in `[range.min, range.max]`; the extremes are
/// reached at phases π/2 (max) and 3π/2 (min).
pub fn sine_value(range: &RegisterRange, elapsed: f64) -> i16 {
    let min = f64::from(range.min);
    let max = f64::from(range.max);
    let amplitude = 0.5 * (max - min);
    let vertical_shift = max - amplitude;
    let phase = (2.0 * PI / range.period) * elapsed;

    let value = (amplitude * phase.sin() + vertical_shift).trunc();
    // Float error around a negative bound may truncate one step past it
    value.clamp(min, max) as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::WriteError;
    use std::sync::Mutex;

    /// Address space that records every write.
    #[derive(Default)]
    struct Recorder {
        registers: Mutex<Vec<(u16, i16)>>,
        coils: Mutex<Vec<(u16, bool)>>,
    }

    impl AddressSpace for Recorder {
        fn set_holding_registers(&self, start: u16, values: &[i16]) -> Result<(), WriteError> {
            let mut regs = self.registers.lock().unwrap();
            regs.extend(values.iter().map(|v| (start, *v)));
            Ok(())
        }

        fn set_coils(&self, start: u16, values: &[bool]) -> Result<(), WriteError> {
            let mut coils = self.coils.lock().unwrap();
            coils.extend(values.iter().map(|v| (start, *v)));
            Ok(())
        }
    }

    /// Address space rejecting writes to one register address.
    struct Failing {
        broken: u16,
        inner: Recorder,
    }

    impl AddressSpace for Failing {
        fn set_holding_registers(&self, start: u16, values: &[i16]) -> Result<(), WriteError> {
            if start == self.broken {
                return Err(WriteError::Unavailable);
            }
            self.inner.set_holding_registers(start, values)
        }

        fn set_coils(&self, start: u16, values: &[bool]) -> Result<(), WriteError> {
            self.inner.set_coils(start, values)
        }
    }

    const T0: f64 = 1_700_000_000.0;

    fn range(min: i16, max: i16, period: f64) -> RegisterRange {
        RegisterRange { min, max, period }
    }

    #[test]
    fn random_values_stay_in_range() {
        let mut engine = ValueEngine::seeded(7);
        for (min, max) in [(0, 10), (-5, 5), (3, 3), (i16::MIN, i16::MAX)] {
            let r = range(min, max, 1.0);
            for _ in 0..2000 {
                let v = engine.random_value(&r);
                assert!(v >= min && v <= max, "{v} outside [{min}, {max}]");
            }
        }
    }

    #[test]
    fn random_values_cover_both_ends() {
        let mut engine = ValueEngine::seeded(42);
        let r = range(0, 3, 1.0);
        let samples: Vec<i16> = (0..500).map(|_| engine.random_value(&r)).collect();
        assert!(samples.contains(&0));
        assert!(samples.contains(&3));
    }

    #[test]
    fn sine_reaches_bounds_at_extrema() {
        let r = range(0, 100, 4.0);
        // phase = 2π/4 * t, so t = 1 is π/2 and t = 3 is 3π/2
        assert_eq!(sine_value(&r, 1.0), 100);
        assert_eq!(sine_value(&r, 3.0), 0);
        assert_eq!(sine_value(&r, 0.0), 50);

        let negative = range(-100, -50, 4.0);
        assert_eq!(sine_value(&negative, 1.0), -50);
        assert_eq!(sine_value(&negative, 3.0), -100);
    }

    #[test]
    fn sine_stays_in_range_for_every_phase() {
        for r in [range(0, 1000, 60.0), range(-300, -7, 2.0), range(-5, 5, 0.3)] {
            for step in 0..10_000 {
                let t = f64::from(step) * 0.0137;
                let v = sine_value(&r, t);
                assert!(v >= r.min && v <= r.max, "{v} outside {r:?} at t={t}");
            }
        }
    }

    #[test]
    fn sine_is_periodic() {
        let r = range(0, 100, 10.0);
        for t in [0.3, 1.7, 4.2, 8.9] {
            assert_eq!(sine_value(&r, t), sine_value(&r, t + r.period));
        }
    }

    #[test]
    fn sine_with_empty_range_is_constant() {
        let r = range(42, 42, 1.0);
        assert_eq!(sine_value(&r, 0.25), 42);
        assert_eq!(sine_value(&r, 0.75), 42);
    }

    #[test]
    fn fresh_entries_are_due_on_first_tick() {
        let mut table = DynamicValueTable::new();
        table.insert_register(1, RegisterKind::SineWave(range(0, 10, 1.0e6)));
        table.insert_coil(1, CoilKind::Toggle { period: 1.0e6 });
        let space = Recorder::default();

        let report = ValueEngine::seeded(1).tick(&mut table, &space, T0, 0.0);

        assert_eq!(report.registers_updated, 1);
        assert_eq!(report.coils_updated, 1);
        assert_eq!(table.register(1).unwrap().last_change, Some(T0));
        assert_eq!(*space.coils.lock().unwrap(), vec![(1, true)]);
    }

    #[test]
    fn toggle_alternates_strictly() {
        let mut table = DynamicValueTable::new();
        table.insert_coil(1, CoilKind::Toggle { period: 0.5 });
        let space = Recorder::default();
        let mut engine = ValueEngine::seeded(1);

        for step in 0..100 {
            let t = f64::from(step) * 0.05;
            engine.tick(&mut table, &space, T0 + t, t);
        }

        let writes = space.coils.lock().unwrap();
        assert!(writes.len() >= 8);
        for pair in writes.windows(2) {
            assert_ne!(pair[0].1, pair[1].1);
        }
        assert!(writes[0].1);
    }

    #[test]
    fn updates_are_spaced_by_at_least_one_period() {
        let period = 1.0;
        let mut table = DynamicValueTable::new();
        table.insert_register(200, RegisterKind::RandomUniform(range(0, 10, period)));
        table.insert_coil(5, CoilKind::RandomBoolean { period });
        let space = Recorder::default();
        let mut engine = ValueEngine::seeded(3);

        let mut update_times = Vec::new();
        let mut coil_times = Vec::new();
        for step in 0..400 {
            // Cadence of period / 4
            let t = f64::from(step) * 0.25;
            let report = engine.tick(&mut table, &space, T0 + t, t);
            if report.registers_updated > 0 {
                update_times.push(t);
            }
            if report.coils_updated > 0 {
                coil_times.push(t);
            }
        }

        for times in [&update_times, &coil_times] {
            assert!(times.len() > 10);
            for pair in times.windows(2) {
                assert!(pair[1] - pair[0] >= period);
            }
        }
        for (address, value) in space.registers.lock().unwrap().iter() {
            assert_eq!(*address, 200);
            assert!((0..=10).contains(value));
        }
    }

    #[test]
    fn entries_not_due_are_untouched() {
        let mut table = DynamicValueTable::new();
        table.insert_register(3, RegisterKind::RandomUniform(range(1, 9, 5.0)));
        let space = Recorder::default();
        let mut engine = ValueEngine::seeded(11);

        engine.tick(&mut table, &space, T0, 0.0);
        let before = table.register(3).unwrap().clone();
        let report = engine.tick(&mut table, &space, T0 + 4.0, 4.0);

        assert_eq!(report, TickReport::default());
        assert_eq!(table.register(3).unwrap(), &before);
        assert_eq!(space.registers.lock().unwrap().len(), 1);
    }

    #[test]
    fn sine_phase_follows_elapsed_time() {
        let mut table = DynamicValueTable::new();
        let r = range(0, 100, 4.0);
        table.insert_register(9, RegisterKind::SineWave(r));
        let space = Recorder::default();

        // Becomes due late, but the value matches the waveform at elapsed = 1
        ValueEngine::seeded(0).tick(&mut table, &space, T0 + 1.0, 1.0);
        assert_eq!(table.register(9).unwrap().current_value, 100);
    }

    #[test]
    fn failed_write_does_not_stop_the_tick() {
        let mut table = DynamicValueTable::new();
        table.insert_register(1, RegisterKind::RandomUniform(range(5, 5, 1.0)));
        table.insert_register(2, RegisterKind::RandomUniform(range(6, 6, 1.0)));
        table.insert_coil(1, CoilKind::Toggle { period: 1.0 });
        let space = Failing {
            broken: 1,
            inner: Recorder::default(),
        };

        let report = ValueEngine::seeded(5).tick(&mut table, &space, T0, 0.0);

        assert_eq!(report.registers_updated, 2);
        assert_eq!(report.coils_updated, 1);
        assert_eq!(report.write_failures, 1);
        // State advances even though the write failed
        let failed = table.register(1).unwrap();
        assert_eq!(failed.current_value, 5);
        assert_eq!(failed.last_change, Some(T0));
        assert_eq!(*space.inner.registers.lock().unwrap(), vec![(2, 6)]);
        assert_eq!(*space.inner.coils.lock().unwrap(), vec![(1, true)]);
    }
}
