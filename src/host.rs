//! The host side of the device: interrupt line, frame timer and clock.

use std::time::Duration;

/// Services the surrounding machine provides to the APU.
///
/// The device model never sleeps or spawns anything itself. It asks the host to call [`crate::Apu::frame`] again after
/// a delay, and the host decides how that happens (a real timer, a virtual clock, or a test that fires frames by hand).
pub trait Host {
	/// Drive the interrupt line.
	fn set_irq(&mut self, asserted: bool);
	/// Arm the frame timer to fire once after `delay`, replacing any pending deadline.
	fn schedule_frame(&mut self, delay: Duration);
	/// Disarm the frame timer.
	fn cancel_frame(&mut self);
	/// Current virtual clock in nanoseconds.
	fn clock_ns(&self) -> u64;
}

/// A host whose clock and timer are advanced by its owner.
///
/// Scheduled frames are not executed automatically; the owner polls [`ManualHost::take_frame`] and runs the frame.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ManualHost {
	/// Current level of the interrupt line.
	pub irq:            bool,
	/// Every level change of the interrupt line, in order.
	pub irq_history:    Vec<bool>,
	/// Delay of the currently armed frame timer.
	pub pending_frame:  Option<Duration>,
	/// How often the frame timer was armed.
	pub schedule_count: usize,
	/// Virtual clock.
	pub now_ns:         u64,
}

impl ManualHost {
	/// Create a host with a disarmed timer, a deasserted interrupt line and the clock at zero.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Consume the armed frame timer, advancing the clock by its delay. Returns whether a frame is due.
	pub fn take_frame(&mut self) -> bool {
		self.pending_frame.take().is_some_and(|delay| {
			self.now_ns += u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX);
			true
		})
	}
}

impl Host for ManualHost {
	fn set_irq(&mut self, asserted: bool) {
		if self.irq != asserted {
			self.irq_history.push(asserted);
		}
		self.irq = asserted;
	}

	fn schedule_frame(&mut self, delay: Duration) {
		self.pending_frame = Some(delay);
		self.schedule_count += 1;
	}

	fn cancel_frame(&mut self) {
		self.pending_frame = None;
	}

	fn clock_ns(&self) -> u64 {
		self.now_ns
	}
}
