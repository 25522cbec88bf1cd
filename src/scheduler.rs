//! Interrupt-to-main-loop cadence plumbing.
//!
//! A periodic timer interrupt calls [`TickDivider::advance`] and, every
//! full cycle, [`CycleFlag::signal`]; the main loop polls
//! [`CycleFlag::take`] and runs one control cycle per observed flag.

use portable_atomic::{AtomicBool, Ordering};

use crate::TICKS_PER_CYCLE;

/// One-shot latch between the timer interrupt and the main loop.
#[derive(Debug, Default)]
pub struct CycleFlag(AtomicBool);

impl CycleFlag {
    pub const fn new() -> Self {
        CycleFlag(AtomicBool::new(false))
    }

    /// Interrupt side: marks a control cycle as due.
    pub fn signal(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Main-loop side: consumes the mark, if any.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// Divides the raw timer tick down to the control cycle rate.
#[derive(Debug)]
pub struct TickDivider {
    count: u8,
    period: u8,
}

impl Default for TickDivider {
    fn default() -> Self {
        TickDivider::new(TICKS_PER_CYCLE)
    }
}

impl TickDivider {
    pub fn new(period: u8) -> Self {
        TickDivider { count: 0, period }
    }

    /// Counts one tick; true once per `period` ticks.
    pub fn advance(&mut self) -> bool {
        self.count += 1;
        if self.count >= self.period {
            self.count = 0;
            true
        } else {
            false
        }
    }
}
