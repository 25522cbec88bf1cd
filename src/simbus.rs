//! Test-only behavioral model of a 1-Wire bus segment.
//!
//! The master's pin edges and busy-waits advance a shared simulated clock;
//! each attached device is a small state machine keyed on the width of the
//! master's low pulses (>= 400 µs is a reset, >= 15 µs inside a slot is a
//! '0', shorter is a '1' or a read slot). A device holds the bus low by
//! publishing a deadline; the wire level is the AND of the master drive and
//! every device hold, like the real open-drain line.

use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use crate::onewire::commands;

/// Reference CRC-8 in the shift-right form, for building test addresses.
pub fn dallas_crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for byte in data {
        let mut byte = *byte;
        for _ in 0..8 {
            let mix = (crc ^ byte) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            byte >>= 1;
        }
    }
    crc
}

/// Power-on DS18B20 scratchpad (+85 °C) with its correct trailing CRC.
pub const DEFAULT_SCRATCHPAD: [u8; 9] = [0x50, 0x05, 0x4B, 0x46, 0x7F, 0xFF, 0x0C, 0x10, 0x1C];

#[derive(Clone, Copy)]
enum Phase {
    Bit,
    Complement,
    Direction,
}

enum DevState {
    Inactive,
    RomCommand { byte: u8, bits: u8 },
    FnCommand { byte: u8, bits: u8 },
    MatchRom { bit: u8 },
    Transmit { bit: u16 },
    Search { bit: u8, phase: Phase },
    Receive { bits: u8 },
}

struct Device {
    rom: [u8; 8],
    scratchpad: [u8; 9],
    state: DevState,
    tx: [u8; 9],
    tx_bits: u16,
    hold_until: u64,
}

impl Device {
    fn rom_bit(&self, index: u8) -> bool {
        self.rom[usize::from(index / 8)] & (1 << (index % 8)) != 0
    }

    fn tx_bit(&self, index: u16) -> bool {
        if index >= self.tx_bits {
            return true;
        }
        self.tx[usize::from(index / 8)] & (1 << (index % 8)) != 0
    }

    fn hold(&mut self, until: u64) {
        self.hold_until = until;
    }

    /// Reacts to the master releasing the line after driving it low for
    /// `width` µs starting at `slot_start`.
    fn on_release(&mut self, width: u64, slot_start: u64, now: u64) {
        if width >= 400 {
            // Reset pulse: answer with a presence pulse and await a ROM command.
            self.hold(now + 150);
            self.state = DevState::RomCommand { byte: 0, bits: 0 };
            return;
        }

        let master_bit = width < 15;
        match self.state {
            DevState::Inactive => {}

            DevState::RomCommand { mut byte, mut bits } => {
                if master_bit {
                    byte |= 1 << bits;
                }
                bits += 1;
                self.state = if bits < 8 {
                    DevState::RomCommand { byte, bits }
                } else {
                    match byte {
                        commands::SKIP_ROM => DevState::FnCommand { byte: 0, bits: 0 },
                        commands::MATCH_ROM => DevState::MatchRom { bit: 0 },
                        commands::SEARCH_ROM => DevState::Search {
                            bit: 0,
                            phase: Phase::Bit,
                        },
                        commands::READ_ROM => {
                            self.tx[..8].copy_from_slice(&self.rom);
                            self.tx_bits = 64;
                            DevState::Transmit { bit: 0 }
                        }
                        _ => DevState::Inactive,
                    }
                };
            }

            DevState::FnCommand { mut byte, mut bits } => {
                if master_bit {
                    byte |= 1 << bits;
                }
                bits += 1;
                self.state = if bits < 8 {
                    DevState::FnCommand { byte, bits }
                } else {
                    match byte {
                        commands::CONVERT_T => DevState::Inactive,
                        commands::READ_SCRATCHPAD => {
                            self.tx = self.scratchpad;
                            self.tx_bits = 72;
                            DevState::Transmit { bit: 0 }
                        }
                        commands::WRITE_SCRATCHPAD => DevState::Receive { bits: 0 },
                        _ => DevState::Inactive,
                    }
                };
            }

            DevState::MatchRom { bit } => {
                if master_bit != self.rom_bit(bit) {
                    self.state = DevState::Inactive;
                } else if bit + 1 < 64 {
                    self.state = DevState::MatchRom { bit: bit + 1 };
                } else {
                    self.state = DevState::FnCommand { byte: 0, bits: 0 };
                }
            }

            DevState::Transmit { bit } => {
                if !self.tx_bit(bit) {
                    self.hold(slot_start + 30);
                }
                self.state = DevState::Transmit {
                    bit: bit.saturating_add(1),
                };
            }

            DevState::Search { bit, phase } => {
                let rom_bit = self.rom_bit(bit);
                self.state = match phase {
                    Phase::Bit => {
                        if !rom_bit {
                            self.hold(slot_start + 30);
                        }
                        DevState::Search {
                            bit,
                            phase: Phase::Complement,
                        }
                    }
                    Phase::Complement => {
                        if rom_bit {
                            self.hold(slot_start + 30);
                        }
                        DevState::Search {
                            bit,
                            phase: Phase::Direction,
                        }
                    }
                    Phase::Direction => {
                        if master_bit != rom_bit || bit + 1 >= 64 {
                            // Steered off the branch, or fully enumerated;
                            // either way wait for the next reset.
                            DevState::Inactive
                        } else {
                            DevState::Search {
                                bit: bit + 1,
                                phase: Phase::Bit,
                            }
                        }
                    }
                };
            }

            DevState::Receive { bits } => {
                self.state = if bits + 1 < 24 {
                    DevState::Receive { bits: bits + 1 }
                } else {
                    DevState::Inactive
                };
            }
        }
    }
}

struct Wire {
    now: u64,
    master_low: bool,
    low_since: u64,
    devices: Vec<Device>,
}

/// Master-side pin handle.
pub struct SimBus {
    wire: Rc<RefCell<Wire>>,
}

/// Master-side delay handle sharing the simulated clock.
pub struct SimDelay {
    wire: Rc<RefCell<Wire>>,
}

impl SimBus {
    /// Builds a bus carrying one device per ROM, all with the default
    /// scratchpad contents.
    pub fn new(roms: &[[u8; 8]]) -> (SimBus, SimDelay) {
        let devices = roms.iter().map(|rom| (*rom, DEFAULT_SCRATCHPAD)).collect::<Vec<_>>();
        Self::with_scratchpads(&devices)
    }

    pub fn with_scratchpads(devices: &[([u8; 8], [u8; 9])]) -> (SimBus, SimDelay) {
        let wire = Rc::new(RefCell::new(Wire {
            now: 0,
            master_low: false,
            low_since: 0,
            devices: devices
                .iter()
                .map(|(rom, scratchpad)| Device {
                    rom: *rom,
                    scratchpad: *scratchpad,
                    state: DevState::Inactive,
                    tx: [0; 9],
                    tx_bits: 0,
                    hold_until: 0,
                })
                .collect(),
        }));
        (
            SimBus { wire: wire.clone() },
            SimDelay { wire },
        )
    }

    /// Assembles a ROM from a family code and serial, with a correct CRC.
    pub fn rom(family: u8, serial: [u8; 6]) -> [u8; 8] {
        let mut rom = [0u8; 8];
        rom[0] = family;
        rom[1..7].copy_from_slice(&serial);
        rom[7] = dallas_crc8(&rom[..7]);
        rom
    }

    /// Replaces a device's scratchpad mid-test.
    pub fn set_scratchpad(&self, device: usize, scratchpad: [u8; 9]) {
        self.wire.borrow_mut().devices[device].scratchpad = scratchpad;
    }

    /// Builds a scratchpad holding `raw` as its 12-bit conversion result.
    pub fn scratchpad_for_raw(raw: i16) -> [u8; 9] {
        let [lo, hi] = (raw as u16).to_le_bytes();
        let mut scratchpad = [lo, hi, 0x4B, 0x46, 0x7F, 0xFF, 0x0C, 0x10, 0];
        scratchpad[8] = dallas_crc8(&scratchpad[..8]);
        scratchpad
    }
}

impl ErrorType for SimBus {
    type Error = Infallible;
}

impl OutputPin for SimBus {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        let mut wire = self.wire.borrow_mut();
        if !wire.master_low {
            wire.master_low = true;
            wire.low_since = wire.now;
        }
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let mut wire = self.wire.borrow_mut();
        if wire.master_low {
            wire.master_low = false;
            let width = wire.now - wire.low_since;
            let slot_start = wire.low_since;
            let now = wire.now;
            for device in &mut wire.devices {
                device.on_release(width, slot_start, now);
            }
        }
        Ok(())
    }
}

impl InputPin for SimBus {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let wire = self.wire.borrow();
        let held = wire.devices.iter().any(|d| wire.now < d.hold_until);
        Ok(!wire.master_low && !held)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        let mut wire = self.wire.borrow_mut();
        wire.now += u64::from(ns.div_ceil(1000));
    }

    fn delay_us(&mut self, us: u32) {
        let mut wire = self.wire.borrow_mut();
        wire.now += u64::from(us);
    }
}
