//! The assembled controller: bus, directory, engine, outputs, setpoints.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::config::{Param, SetpointStore, Setpoints};
use crate::directory::SensorDirectory;
use crate::engine::{Reading, TemperatureEngine};
use crate::error::Error;
use crate::onewire::{IrqMasking, OneWireBus};
use crate::output::{OutputController, SourceSelect};
use crate::TempDeci;

/// Two-channel thermostat core.
///
/// Board code constructs this around the bus pin, calls [`Thermostat::startup`]
/// once (then waits out the first conversion, ~1 s), and afterwards calls
/// [`Thermostat::tick`] once per acquisition cycle. Relay drivers mirror
/// [`Thermostat::output`] after each tick.
pub struct Thermostat<T> {
    bus: OneWireBus<T>,
    directory: SensorDirectory,
    engine: TemperatureEngine,
    outputs: OutputController,
    setpoints: Setpoints,
}

impl<T, E> Thermostat<T>
where
    T: InputPin<Error = E> + OutputPin<Error = E>,
{
    pub fn new(pin: T, masking: IrqMasking) -> Self {
        Self::with_sources(pin, masking, [SourceSelect::EitherSensor, SourceSelect::Difference])
    }

    pub fn with_sources(
        pin: T,
        masking: IrqMasking,
        sources: [SourceSelect; crate::CHANNEL_COUNT],
    ) -> Self {
        Thermostat {
            bus: OneWireBus::new(pin, masking),
            directory: SensorDirectory::new(),
            engine: TemperatureEngine::new(),
            outputs: OutputController::new(sources),
            setpoints: Setpoints::default(),
        }
    }

    /// Enumerates the bus and requests the first conversion. Returns the
    /// number of devices found; with zero the controller stays dormant and
    /// every [`Thermostat::tick`] is a no-op.
    pub fn startup(&mut self, delay: &mut impl DelayNs) -> usize {
        let found = self.directory.discover_all(&mut self.bus, delay);
        if found > 0 {
            // A failure here surfaces as invalid readings on the first tick.
            let _ = self
                .engine
                .start_conversions(&mut self.bus, &self.directory, delay);
        }
        found
    }

    /// Runs one acquisition cycle: collect the previous conversion, request
    /// the next one, fold the history, advance the clock, decide outputs.
    ///
    /// An unanswered reset degrades to invalid readings for the cycle; only
    /// a pin fault escalates.
    pub fn tick(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<E>> {
        if self.directory.is_empty() {
            return Ok(());
        }

        self.engine.read_all(&mut self.bus, &self.directory, delay)?;
        match self
            .engine
            .start_conversions(&mut self.bus, &self.directory, delay)
        {
            Ok(()) | Err(Error::BusTimeout) => {}
            Err(e) => return Err(e),
        }

        self.engine.update_rolling_min_max();
        if self.engine.advance_clock() {
            self.engine.on_hour_rolled();
        }

        self.outputs.update(self.engine.readings(), &self.setpoints);
        Ok(())
    }

    pub fn sensor_count(&self) -> usize {
        self.directory.len()
    }

    pub fn reading(&self, channel: usize) -> Reading {
        self.engine.reading(channel)
    }

    /// Debounced relay state for one channel.
    pub fn output(&self, channel: usize) -> bool {
        self.outputs.committed(channel)
    }

    pub fn hours_seen(&self) -> u8 {
        self.engine.hours_seen()
    }

    pub fn history_min_max(&self, channel: usize, hours_back: u8) -> Option<(TempDeci, TempDeci)> {
        self.engine.history_min_max(channel, hours_back)
    }

    pub fn setpoint(&self, param: Param) -> i8 {
        self.setpoints.get(param)
    }

    pub fn adjust_up(&mut self, param: Param) {
        self.setpoints.increment(param);
    }

    pub fn adjust_down(&mut self, param: Param) {
        self.setpoints.decrement(param);
    }

    pub fn load_setpoints<S: SetpointStore>(&mut self, store: &mut S) -> Result<(), S::Error> {
        self.setpoints = Setpoints::load_from(store)?;
        Ok(())
    }

    pub fn save_setpoints<S: SetpointStore>(&mut self, store: &mut S) -> Result<(), S::Error> {
        self.setpoints.save_to(store)
    }
}
