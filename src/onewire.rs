//! Bit-banged 1-Wire bus master.
//!
//! Read/write timing follows Maxim application note 126 ("1-Wire
//! Communication Through Software"), the search follows application note 187
//! ("1-Wire Search Algorithm"). The data line is a single open-drain pin:
//! `set_low` drives the bus, `set_high` releases it to the pull-up, and
//! `is_high` samples it.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::error::Error;

/// ROM-level commands understood by every 1-Wire device.
pub mod commands {
    pub const SEARCH_ROM: u8 = 0xF0;
    pub const READ_ROM: u8 = 0x33;
    pub const MATCH_ROM: u8 = 0x55;
    pub const SKIP_ROM: u8 = 0xCC;
    pub const ALARM_SEARCH: u8 = 0xEC;

    // DS18B20 function commands.
    pub const CONVERT_T: u8 = 0x44;
    pub const WRITE_SCRATCHPAD: u8 = 0x4E;
    pub const READ_SCRATCHPAD: u8 = 0xBE;
    pub const COPY_SCRATCHPAD: u8 = 0x48;
    pub const RECALL_EEPROM: u8 = 0xB8;
}

// Standard slot delays from AN126, in microseconds. These are part of the
// electrical contract: every device on the bus samples and drives relative
// to the master's falling edge, so they are not tunables.
const SLOT_LOW_SHORT_US: u32 = 6;
const WRITE_ONE_RELEASE_US: u32 = 64;
const WRITE_ZERO_LOW_US: u32 = 60;
const WRITE_ZERO_RELEASE_US: u32 = 10;
const READ_SAMPLE_US: u32 = 9;
const READ_RECOVER_US: u32 = 55;
const RESET_LOW_US: u32 = 480;
const PRESENCE_SAMPLE_US: u32 = 70;
const RESET_RECOVER_US: u32 = 410;

/// Whether interrupts are masked for the duration of each timing-critical
/// bus sequence (one bit slot, or one reset/presence exchange).
///
/// Masking guarantees slot timing even while a display-refresh or ADC
/// interrupt is active, at the cost of delaying those interrupts by up to
/// ~1 ms during a reset. With [`IrqMasking::Never`] the surrounding system
/// must itself guarantee that nothing preempts the bus driver mid-slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IrqMasking {
    #[default]
    DuringSlots,
    Never,
}

/// 64-bit device address: family byte, six serial bytes, CRC-8 byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Address(pub [u8; 8]);

impl Address {
    pub fn family_code(&self) -> u8 {
        self.0[0]
    }

    pub fn bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

/// Running CRC-8 accumulator, polynomial 0x31 (x^8 + x^5 + x^4 + 1).
///
/// Bytes are folded LSB-first to match the bus bit order; a message received
/// intact, including its trailing CRC byte, folds to 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc8(u8);

const CRC_POLY: u8 = 0x31;

impl Crc8 {
    pub fn new() -> Self {
        Crc8(0)
    }

    pub fn update(&mut self, mut byte: u8) {
        for _ in 0..8 {
            if ((self.0 & 0x80) != 0) != ((byte & 0x01) != 0) {
                self.0 = (self.0 << 1) ^ CRC_POLY;
            } else {
                self.0 <<= 1;
            }
            byte >>= 1;
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

/// State carried between the calls of one multi-pass discovery sequence.
///
/// `rom` retains the address found by the previous pass so the walk can
/// replay its branch choices up to the last discrepancy. Reset whenever a
/// pass fails or the last device has been reported.
#[derive(Debug, Clone, Default)]
pub struct SearchState {
    rom: [u8; 8],
    last_discrepancy: u8,
    last_device: bool,
}

impl SearchState {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset(&mut self) {
        self.last_discrepancy = 0;
        self.last_device = false;
    }
}

/// Bus master over one open-drain pin.
pub struct OneWireBus<T> {
    pin: T,
    masking: IrqMasking,
}

impl<T, E> OneWireBus<T>
where
    T: InputPin<Error = E> + OutputPin<Error = E>,
{
    pub fn new(pin: T, masking: IrqMasking) -> Self {
        OneWireBus { pin, masking }
    }

    pub fn into_inner(self) -> T {
        self.pin
    }

    /// Reset pulse and presence sample. Returns true iff at least one device
    /// answered with a presence pulse.
    pub fn reset(&mut self, delay: &mut impl DelayNs) -> Result<bool, Error<E>> {
        let masking = self.masking;
        match masking {
            IrqMasking::DuringSlots => critical_section::with(|_| self.reset_raw(delay)),
            IrqMasking::Never => self.reset_raw(delay),
        }
    }

    fn reset_raw(&mut self, delay: &mut impl DelayNs) -> Result<bool, Error<E>> {
        self.pin.set_low()?;
        delay.delay_us(RESET_LOW_US);

        self.pin.set_high()?;
        delay.delay_us(PRESENCE_SAMPLE_US);

        // A device signals presence by holding the released bus low.
        let present = self.pin.is_low()?;

        delay.delay_us(RESET_RECOVER_US);
        Ok(present)
    }

    pub fn write_bit(&mut self, bit: bool, delay: &mut impl DelayNs) -> Result<(), Error<E>> {
        let masking = self.masking;
        match masking {
            IrqMasking::DuringSlots => critical_section::with(|_| self.write_bit_raw(bit, delay)),
            IrqMasking::Never => self.write_bit_raw(bit, delay),
        }
    }

    fn write_bit_raw(&mut self, bit: bool, delay: &mut impl DelayNs) -> Result<(), Error<E>> {
        if bit {
            self.pin.set_low()?;
            delay.delay_us(SLOT_LOW_SHORT_US);
            self.pin.set_high()?;
            delay.delay_us(WRITE_ONE_RELEASE_US);
        } else {
            self.pin.set_low()?;
            delay.delay_us(WRITE_ZERO_LOW_US);
            self.pin.set_high()?;
            delay.delay_us(WRITE_ZERO_RELEASE_US);
        }
        Ok(())
    }

    pub fn read_bit(&mut self, delay: &mut impl DelayNs) -> Result<bool, Error<E>> {
        let masking = self.masking;
        match masking {
            IrqMasking::DuringSlots => critical_section::with(|_| self.read_bit_raw(delay)),
            IrqMasking::Never => self.read_bit_raw(delay),
        }
    }

    fn read_bit_raw(&mut self, delay: &mut impl DelayNs) -> Result<bool, Error<E>> {
        self.pin.set_low()?;
        delay.delay_us(SLOT_LOW_SHORT_US);

        self.pin.set_high()?;
        delay.delay_us(READ_SAMPLE_US);

        let bit = self.pin.is_high()?;
        delay.delay_us(READ_RECOVER_US);
        Ok(bit)
    }

    /// Writes one byte, LSB first.
    pub fn write_byte(&mut self, mut byte: u8, delay: &mut impl DelayNs) -> Result<(), Error<E>> {
        for _ in 0..8 {
            self.write_bit(byte & 0x01 != 0, delay)?;
            byte >>= 1;
        }
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8], delay: &mut impl DelayNs) -> Result<(), Error<E>> {
        for byte in bytes {
            self.write_byte(*byte, delay)?;
        }
        Ok(())
    }

    /// Reads one byte, LSB first.
    pub fn read_byte(&mut self, delay: &mut impl DelayNs) -> Result<u8, Error<E>> {
        let mut byte = 0u8;
        for _ in 0..8 {
            byte >>= 1;
            if self.read_bit(delay)? {
                byte |= 0x80;
            }
        }
        Ok(byte)
    }

    /// One pass of the binary-tree discovery walk.
    ///
    /// Call with a fresh [`SearchState`] to find the first device, then keep
    /// calling with the same state to find the rest; `Ok(None)` means the
    /// enumeration is exhausted (the pass after that starts over). An address
    /// whose CRC does not fold to 0 is discarded and the sequence reset.
    pub fn search(
        &mut self,
        state: &mut SearchState,
        delay: &mut impl DelayNs,
    ) -> Result<Option<Address>, Error<E>> {
        if state.last_device {
            state.reset();
            return Ok(None);
        }

        if !self.reset(delay)? {
            state.reset();
            return Err(Error::BusTimeout);
        }
        self.write_byte(commands::SEARCH_ROM, delay)?;

        let mut id_bit_no: u8 = 1;
        let mut last_zero: u8 = 0;
        let mut rom_byte_no: usize = 0;
        let mut rom_byte_mask: u8 = 1;
        let mut crc = Crc8::new();

        while rom_byte_no < 8 {
            // Every surviving device drives its address bit, then the
            // complement, in two consecutive read slots.
            let id_bit = self.read_bit(delay)?;
            let cmp_bit = self.read_bit(delay)?;

            if id_bit && cmp_bit {
                // Nobody responded; the walk cannot complete.
                break;
            }

            let direction = if id_bit != cmp_bit {
                // All remaining devices agree on this bit.
                id_bit
            } else {
                // Discrepancy: devices disagree, pick a branch.
                let chosen = if id_bit_no < state.last_discrepancy {
                    // Replay the branch taken on the previous pass.
                    state.rom[rom_byte_no] & rom_byte_mask != 0
                } else {
                    // Take '1' exactly at the old discrepancy, '0' beyond it.
                    id_bit_no == state.last_discrepancy
                };
                if !chosen {
                    last_zero = id_bit_no;
                }
                chosen
            };

            if direction {
                state.rom[rom_byte_no] |= rom_byte_mask;
            } else {
                state.rom[rom_byte_no] &= !rom_byte_mask;
            }

            // Steer every device not matching the chosen bit off the bus.
            self.write_bit(direction, delay)?;

            id_bit_no += 1;
            rom_byte_mask <<= 1;
            if rom_byte_mask == 0 {
                crc.update(state.rom[rom_byte_no]);
                rom_byte_no += 1;
                rom_byte_mask = 1;
            }
        }

        if rom_byte_no < 8 || state.rom[0] == 0 {
            state.reset();
            return Ok(None);
        }

        if crc.value() != 0 {
            state.reset();
            return Err(Error::ChecksumMismatch);
        }

        state.last_discrepancy = last_zero;
        if last_zero == 0 {
            // No unexplored '0' branch remains below this address.
            state.last_device = true;
        }

        Ok(Some(Address(state.rom)))
    }
}
