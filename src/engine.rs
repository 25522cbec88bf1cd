//! Per-cycle temperature acquisition and history bookkeeping.
//!
//! Conversions are pipelined: each cycle first reads the scratchpads holding
//! the result requested on the *previous* cycle, then broadcasts the next
//! CONVERT T. The sensor needs up to ~750 ms for a 12-bit conversion, so a
//! one-cycle lag at the nominal 1 Hz cadence is inherent to the hardware.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::directory::SensorDirectory;
use crate::error::Error;
use crate::onewire::{commands, Crc8, OneWireBus};
use crate::{TempDeci, CHANNEL_COUNT};

/// Hour slots in the rolling min/max history.
pub const HISTORY_SLOTS: usize = 24;

/// Converts a raw 12-bit DS18B20 reading (1/16 °C per LSB) to 0.1 °C
/// fixed point, rounding toward zero.
pub fn temp_from_raw(raw: i16) -> TempDeci {
    (i32::from(raw) * 10 / 16) as TempDeci
}

/// Latest temperature of one channel.
///
/// `valid` is cleared whenever the device did not answer or its scratchpad
/// failed the CRC; the stale value is kept for display purposes only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reading {
    pub value: TempDeci,
    pub valid: bool,
}

/// Software uptime counter driving the history bucketing.
///
/// The acquisition cycle is 83 scheduler ticks at 250/3 Hz, slightly faster
/// than a true second; every third cycle counts one extra leap second to
/// bound the long-term drift.
#[derive(Debug, Default)]
struct UptimeClock {
    seconds: u8,
    leap: u8,
    minutes: u8,
    hours: u8,
}

impl UptimeClock {
    /// Advances by one acquisition cycle; returns true on an hour boundary.
    fn tick(&mut self) -> bool {
        self.seconds += 1;

        self.leap += 1;
        if self.leap >= 3 {
            self.leap = 0;
            self.seconds += 1;
        }

        if self.seconds > 59 {
            self.seconds -= 60;
            self.minutes += 1;
        }

        if self.minutes > 59 {
            self.minutes = 0;
            // The hour count doubles as the number of browsable history
            // slots, so it stops at 23: the 24th slot is the one about to
            // be overwritten.
            if self.hours < 23 {
                self.hours += 1;
            }
            return true;
        }

        false
    }
}

#[derive(Debug)]
struct History {
    index: usize,
    min: [[TempDeci; HISTORY_SLOTS]; CHANNEL_COUNT],
    max: [[TempDeci; HISTORY_SLOTS]; CHANNEL_COUNT],
}

impl Default for History {
    fn default() -> Self {
        History {
            index: 0,
            min: [[TempDeci::MAX; HISTORY_SLOTS]; CHANNEL_COUNT],
            max: [[TempDeci::MIN; HISTORY_SLOTS]; CHANNEL_COUNT],
        }
    }
}

impl History {
    fn record(&mut self, channel: usize, value: TempDeci) {
        let slot = self.index;
        if self.min[channel][slot] > value {
            self.min[channel][slot] = value;
        }
        if self.max[channel][slot] < value {
            self.max[channel][slot] = value;
        }
    }

    fn advance_slot(&mut self) {
        self.index = (self.index + 1) % HISTORY_SLOTS;
        for channel in 0..CHANNEL_COUNT {
            self.min[channel][self.index] = TempDeci::MAX;
            self.max[channel][self.index] = TempDeci::MIN;
        }
    }

    fn slot_back(&self, hours_back: usize) -> usize {
        (self.index + HISTORY_SLOTS - hours_back) % HISTORY_SLOTS
    }
}

/// Drives the conversion/read cycle and owns readings, history and clock.
#[derive(Debug, Default)]
pub struct TemperatureEngine {
    readings: [Reading; CHANNEL_COUNT],
    history: History,
    clock: UptimeClock,
}

impl TemperatureEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reading(&self, channel: usize) -> Reading {
        self.readings[channel]
    }

    pub fn readings(&self) -> &[Reading; CHANNEL_COUNT] {
        &self.readings
    }

    /// How many full hours of history may be browsed, capped at 23.
    pub fn hours_seen(&self) -> u8 {
        self.clock.hours
    }

    /// The stored (min, max) pair `hours_back` hours ago; 0 is the hour
    /// currently accumulating. `None` beyond the hours seen so far.
    pub fn history_min_max(&self, channel: usize, hours_back: u8) -> Option<(TempDeci, TempDeci)> {
        if channel >= CHANNEL_COUNT || hours_back > self.clock.hours {
            return None;
        }
        let slot = self.history.slot_back(usize::from(hours_back));
        Some((self.history.min[channel][slot], self.history.max[channel][slot]))
    }

    /// Broadcasts CONVERT T to every device at once. SKIP ROM is safe here
    /// because the command carries no per-device response.
    pub fn start_conversions<T, E>(
        &mut self,
        bus: &mut OneWireBus<T>,
        directory: &SensorDirectory,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<E>>
    where
        T: InputPin<Error = E> + OutputPin<Error = E>,
    {
        if directory.is_empty() {
            return Ok(());
        }
        if !bus.reset(delay)? {
            return Err(Error::BusTimeout);
        }
        bus.write_byte(commands::SKIP_ROM, delay)?;
        bus.write_byte(commands::CONVERT_T, delay)?;
        Ok(())
    }

    /// Reads every directory slot's scratchpad and updates the readings.
    ///
    /// A select failure or CRC mismatch leaves that channel invalid for this
    /// cycle without touching the other channel; only a pin fault escalates.
    pub fn read_all<T, E>(
        &mut self,
        bus: &mut OneWireBus<T>,
        directory: &SensorDirectory,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<E>>
    where
        T: InputPin<Error = E> + OutputPin<Error = E>,
    {
        for reading in &mut self.readings {
            reading.valid = false;
        }

        for channel in 0..CHANNEL_COUNT.min(directory.len()) {
            if !directory.select(channel, bus, delay)? {
                continue;
            }

            bus.write_byte(commands::READ_SCRATCHPAD, delay)?;

            let mut crc = Crc8::new();
            let mut scratchpad = [0u8; 9];
            for byte in &mut scratchpad {
                *byte = bus.read_byte(delay)?;
                crc.update(*byte);
            }

            if crc.value() != 0 {
                continue;
            }

            let raw = i16::from_le_bytes([scratchpad[0], scratchpad[1]]);
            self.readings[channel] = Reading {
                value: temp_from_raw(raw),
                valid: true,
            };
        }
        Ok(())
    }

    /// Folds this cycle's valid readings into the current hour slot.
    pub fn update_rolling_min_max(&mut self) {
        for (channel, reading) in self.readings.iter().enumerate() {
            if reading.valid {
                self.history.record(channel, reading.value);
            }
        }
    }

    /// Advances the uptime clock by one cycle; true once per hour boundary.
    pub fn advance_clock(&mut self) -> bool {
        self.clock.tick()
    }

    /// Moves the history to the next hour slot and resets its bounds.
    pub fn on_hour_rolled(&mut self) {
        self.history.advance_slot();
    }
}
