//! Threshold setpoints: menu editing rules and the persisted block layout.

use crate::TempDeci;

/// Size of the persisted settings block.
pub const SETPOINT_BLOCK_LEN: usize = 8;

/// One editable threshold. Thresholds are whole degrees Celsius.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Param {
    Ch1On,
    Ch1Off,
    Ch2On,
    Ch2Off,
}

impl Param {
    /// Inclusive editing range.
    fn limits(self) -> (i8, i8) {
        match self {
            Param::Ch1On | Param::Ch1Off => (-10, 100),
            Param::Ch2On | Param::Ch2Off => (0, 100),
        }
    }

    /// The other threshold of the same channel. A channel's two
    /// thresholds may never be equal, since their order encodes the
    /// hysteresis polarity.
    fn partner(self) -> Param {
        match self {
            Param::Ch1On => Param::Ch1Off,
            Param::Ch1Off => Param::Ch1On,
            Param::Ch2On => Param::Ch2Off,
            Param::Ch2Off => Param::Ch2On,
        }
    }
}

/// Backing store for the settings block, typically a byte-addressed EEPROM.
pub trait SetpointStore {
    type Error;

    /// Reads the stored block, or `None` if the store has never been written.
    fn load(&mut self) -> Result<Option<[u8; SETPOINT_BLOCK_LEN]>, Self::Error>;

    fn save(&mut self, block: &[u8; SETPOINT_BLOCK_LEN]) -> Result<(), Self::Error>;
}

/// The four channel thresholds plus a write-generation counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Setpoints {
    counter: u8,
    ch1_on: i8,
    ch1_off: i8,
    ch2_on: i8,
    ch2_off: i8,
}

impl Default for Setpoints {
    /// Channel 1 acts on low temperatures (on below off), channel 2 on high.
    fn default() -> Self {
        Setpoints {
            counter: 0,
            ch1_on: 5,
            ch1_off: 10,
            ch2_on: 20,
            ch2_off: 10,
        }
    }
}

impl Setpoints {
    pub fn get(&self, param: Param) -> i8 {
        match param {
            Param::Ch1On => self.ch1_on,
            Param::Ch1Off => self.ch1_off,
            Param::Ch2On => self.ch2_on,
            Param::Ch2Off => self.ch2_off,
        }
    }

    fn set(&mut self, param: Param, value: i8) {
        match param {
            Param::Ch1On => self.ch1_on = value,
            Param::Ch1Off => self.ch1_off = value,
            Param::Ch2On => self.ch2_on = value,
            Param::Ch2Off => self.ch2_off = value,
        }
    }

    /// Number of times the block has been written back.
    pub fn generation(&self) -> u8 {
        self.counter
    }

    /// A channel's `(on, off)` thresholds scaled to tenths of a degree.
    pub fn thresholds_deci(&self, channel: usize) -> (TempDeci, TempDeci) {
        let (on, off) = match channel {
            0 => (self.ch1_on, self.ch1_off),
            _ => (self.ch2_on, self.ch2_off),
        };
        (TempDeci::from(on) * 10, TempDeci::from(off) * 10)
    }

    /// Steps a threshold up one degree, clamped to its range and skipping
    /// over its partner: landing on the partner hops one past it, or backs
    /// off one below when the partner sits at the upper limit.
    pub fn increment(&mut self, param: Param) {
        let (_, max) = param.limits();
        let partner = self.get(param.partner());
        let mut value = self.get(param);
        if value < max {
            value += 1;
        }
        if value == partner {
            value = if value < max { partner + 1 } else { max - 1 };
        }
        self.set(param, value);
    }

    /// Mirror of [`Setpoints::increment`] toward the lower limit.
    pub fn decrement(&mut self, param: Param) {
        let (min, _) = param.limits();
        let partner = self.get(param.partner());
        let mut value = self.get(param);
        if value > min {
            value -= 1;
        }
        if value == partner {
            value = if value > min { partner - 1 } else { min + 1 };
        }
        self.set(param, value);
    }

    fn to_block(self) -> [u8; SETPOINT_BLOCK_LEN] {
        [
            self.counter,
            self.ch1_on as u8,
            self.ch1_off as u8,
            self.ch2_on as u8,
            self.ch2_off as u8,
            0,
            0,
            0,
        ]
    }

    /// Decodes a stored block, rejecting anything outside the editing
    /// ranges or with a degenerate equal-threshold channel. A fresh
    /// erased EEPROM reads as all `0xFF` and fails both checks.
    fn from_block(block: &[u8; SETPOINT_BLOCK_LEN]) -> Option<Self> {
        let setpoints = Setpoints {
            counter: block[0],
            ch1_on: block[1] as i8,
            ch1_off: block[2] as i8,
            ch2_on: block[3] as i8,
            ch2_off: block[4] as i8,
        };
        for param in [Param::Ch1On, Param::Ch1Off, Param::Ch2On, Param::Ch2Off] {
            let (min, max) = param.limits();
            let value = setpoints.get(param);
            if value < min || value > max {
                return None;
            }
        }
        if setpoints.ch1_on == setpoints.ch1_off || setpoints.ch2_on == setpoints.ch2_off {
            return None;
        }
        Some(setpoints)
    }

    /// Loads from the store, falling back to the defaults when the block is
    /// missing or fails validation.
    pub fn load_from<S: SetpointStore>(store: &mut S) -> Result<Self, S::Error> {
        Ok(match store.load()? {
            Some(block) => Setpoints::from_block(&block).unwrap_or_default(),
            None => Setpoints::default(),
        })
    }

    /// Writes the block back, bumping the generation counter first.
    pub fn save_to<S: SetpointStore>(&mut self, store: &mut S) -> Result<(), S::Error> {
        self.counter = self.counter.wrapping_add(1);
        store.save(&self.to_block())
    }

    #[cfg(test)]
    pub(crate) fn set_for_test(&mut self, ch1_on: i8, ch1_off: i8, ch2_on: i8, ch2_off: i8) {
        self.ch1_on = ch1_on;
        self.ch1_off = ch1_off;
        self.ch2_on = ch2_on;
        self.ch2_off = ch2_off;
    }
}
