//! Relay decisions: hysteresis bands, source selection, debounce stages and
//! the channel-1 → channel-2 coupling.

use crate::config::Setpoints;
use crate::engine::Reading;
use crate::{TempDeci, CHANNEL_COUNT, STAGE1_DELAY_CYCLES, STAGE2_DELAY_CYCLES};

/// Which measurement a channel's hysteresis band compares against.
///
/// Fixed per channel at construction; this is wiring, not run-time state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SourceSelect {
    Sensor0,
    Sensor1,
    /// The larger of the two readings when the band acts on high
    /// temperatures, the smaller when it acts on low ones.
    EitherSensor,
    /// Absolute difference between the two readings.
    Difference,
}

/// Per-channel output state machine.
///
/// The raw hysteresis decision must stay unchanged for
/// [`STAGE1_DELAY_CYCLES`] consecutive cycles before it reaches the relay
/// register, and [`STAGE2_DELAY_CYCLES`] before it reaches the register that
/// couples channel 1 into channel 2. Only stage 1 drives hardware.
#[derive(Debug)]
pub struct OutputController {
    sources: [SourceSelect; CHANNEL_COUNT],
    current: [bool; CHANNEL_COUNT],
    count: [u8; CHANNEL_COUNT],
    stage1: [bool; CHANNEL_COUNT],
    stage2: [bool; CHANNEL_COUNT],
}

impl Default for OutputController {
    fn default() -> Self {
        Self::new([SourceSelect::EitherSensor, SourceSelect::Difference])
    }
}

impl OutputController {
    pub fn new(sources: [SourceSelect; CHANNEL_COUNT]) -> Self {
        OutputController {
            sources,
            current: [false; CHANNEL_COUNT],
            count: [0; CHANNEL_COUNT],
            stage1: [false; CHANNEL_COUNT],
            stage2: [false; CHANNEL_COUNT],
        }
    }

    /// The debounced decision driving the physical relay.
    pub fn committed(&self, channel: usize) -> bool {
        self.stage1[channel]
    }

    /// The raw decision currently accumulating stable cycles.
    pub fn pending(&self, channel: usize) -> bool {
        self.current[channel]
    }

    /// Runs one decision cycle from the latest readings and setpoints.
    pub fn update(&mut self, readings: &[Reading; CHANNEL_COUNT], setpoints: &Setpoints) {
        let mut raw = [false; CHANNEL_COUNT];

        for channel in 0..CHANNEL_COUNT {
            // An invalid reading forces the channel off, dead-band or not.
            if !readings[channel].valid {
                continue;
            }

            let (t_on, t_off) = setpoints.thresholds_deci(channel);
            // The order of the two thresholds encodes the polarity: on above
            // off means "act on high temperatures".
            let high_on = t_on > t_off;

            let source = self.source_value(channel, high_on, readings);

            raw[channel] = if high_on {
                if source >= t_on {
                    true
                } else if source <= t_off {
                    false
                } else {
                    self.current[channel]
                }
            } else if source <= t_on {
                true
            } else if source >= t_off {
                false
            } else {
                self.current[channel]
            };
        }

        // Channel 2 also turns on once channel 1 has been on long enough to
        // pass its stage-2 delay, regardless of channel 2's own source.
        raw[1] |= self.stage2[0];

        for channel in 0..CHANNEL_COUNT {
            if self.current[channel] != raw[channel] {
                self.current[channel] = raw[channel];
                self.count[channel] = 0;
            } else {
                self.count[channel] = self.count[channel].saturating_add(1);

                if self.count[channel] >= STAGE1_DELAY_CYCLES - 1 {
                    self.stage1[channel] = raw[channel];
                }
                if self.count[channel] >= STAGE2_DELAY_CYCLES - 1 {
                    self.stage2[channel] = raw[channel];
                }
            }
        }
    }

    fn source_value(
        &self,
        channel: usize,
        high_on: bool,
        readings: &[Reading; CHANNEL_COUNT],
    ) -> TempDeci {
        let (a, b) = (readings[0].value, readings[1].value);
        match self.sources[channel] {
            SourceSelect::Sensor0 => a,
            SourceSelect::Sensor1 => b,
            SourceSelect::EitherSensor => {
                if high_on {
                    a.max(b)
                } else {
                    a.min(b)
                }
            }
            SourceSelect::Difference => (a - b).abs(),
        }
    }
}
