#![cfg_attr(not(test), no_std)]

//! Core logic for a two-channel DS18B20 thermostat.
//!
//! The crate is hardware-agnostic: the 1-Wire data line is any open-drain
//! capable pin implementing the `embedded-hal` digital traits, and all
//! protocol timing goes through a [`DelayNs`](embedded_hal::delay::DelayNs)
//! busy-wait. Board code owns the pin, the microsecond timer, the relay
//! outputs and the display; this crate owns the bus protocol, the
//! acquisition cycle, the rolling min/max history and the relay decisions.

pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod onewire;
pub mod output;
pub mod scheduler;
pub mod thermostat;

#[cfg(test)]
pub(crate) mod simbus;

/// Number of controlled channels (and of sensors the bus driver will enumerate).
pub const CHANNEL_COUNT: usize = 2;

/// Fixed-point temperature in units of 0.1 °C.
pub type TempDeci = i16;

/// Scheduler tick rate: 8 MHz / 256 / 125 / 3 = 250/3 Hz.
pub const TICK_RATE_MILLIHZ: u32 = 83_333;

/// Ticks per acquisition cycle (nominally one second).
pub const TICKS_PER_CYCLE: u8 = 83;

/// Stable cycles before a raw output decision reaches the relay register.
pub const STAGE1_DELAY_CYCLES: u8 = 30;

/// Stable cycles before a decision reaches the cross-channel coupling register.
pub const STAGE2_DELAY_CYCLES: u8 = 60;
