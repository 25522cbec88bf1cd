//! Bookkeeping for the devices found on the bus at startup.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use heapless::Vec;

use crate::error::Error;
use crate::onewire::{commands, Address, OneWireBus, SearchState};
use crate::CHANNEL_COUNT;

/// Ordered, capacity-bounded list of discovered device addresses.
///
/// Discovery runs once at startup; devices beyond the capacity stay
/// unenumerated, and devices attached later are never seen.
#[derive(Debug, Default)]
pub struct SensorDirectory {
    addresses: Vec<Address, CHANNEL_COUNT>,
}

impl SensorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Address> {
        self.addresses.get(index)
    }

    /// Runs repeated search passes until the bus signals the last device,
    /// a pass fails, or capacity is reached. Returns the device count.
    ///
    /// A failed pass (no presence, or an address that did not pass its CRC)
    /// ends discovery with whatever was found so far; the retry policy
    /// belongs to the caller.
    pub fn discover_all<T, E>(
        &mut self,
        bus: &mut OneWireBus<T>,
        delay: &mut impl DelayNs,
    ) -> usize
    where
        T: InputPin<Error = E> + OutputPin<Error = E>,
    {
        self.addresses.clear();
        let mut state = SearchState::new();
        while !self.addresses.is_full() {
            match bus.search(&mut state, delay) {
                Ok(Some(address)) => {
                    // Capacity was checked above.
                    let _ = self.addresses.push(address);
                }
                Ok(None) | Err(_) => break,
            }
        }
        self.addresses.len()
    }

    /// Addresses one specific device: reset, MATCH ROM, 64-bit address.
    ///
    /// Returns `Ok(false)` if the index is unoccupied or no presence pulse
    /// answered the reset. A broadcast SKIP ROM would be wrong here: with
    /// two devices sharing the bus both would answer the follow-up command.
    pub fn select<T, E>(
        &self,
        index: usize,
        bus: &mut OneWireBus<T>,
        delay: &mut impl DelayNs,
    ) -> Result<bool, Error<E>>
    where
        T: InputPin<Error = E> + OutputPin<Error = E>,
    {
        let address = match self.addresses.get(index) {
            Some(address) => address,
            None => return Ok(false),
        };
        if !bus.reset(delay)? {
            return Ok(false);
        }
        bus.write_byte(commands::MATCH_ROM, delay)?;
        bus.write_bytes(address.bytes(), delay)?;
        Ok(true)
    }
}
