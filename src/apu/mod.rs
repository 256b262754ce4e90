//! The APU as a device on the host bus: MMIO dispatch across its register blocks and the audio frame.

use std::ops::Range;
use std::time::{Duration, Instant};

use log::debug;

use crate::dsp::{DspCore, InertCore, Processor, ProcessorLayout, ScratchPort};
use crate::error::ApuError;
use crate::frontend::FrontEnd;
use crate::host::Host;
use crate::memory::GuestMemory;
use crate::mixer;
use crate::registers::{self, Interrupts, Registers};
use crate::trace;


/// The global register block.
pub const GLOBAL_REGION: Range<u32> = 0x0_0000 .. 0x2_0000;
/// The voice processor's command port.
pub const VOICE_PORT_REGION: Range<u32> = 0x2_0000 .. 0x3_0000;
/// The global processor's register block.
pub const GP_REGION: Range<u32> = 0x3_0000 .. 0x4_0000;
/// The encode processor's register block.
pub const EP_REGION: Range<u32> = 0x5_0000 .. 0x6_0000;

/// XGSCNT counts in units of 100 ns.
const GLOBAL_COUNTER_PERIOD_NS: u64 = 100;

/// Tunables of the device model.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ApuConfig {
	/// Delay between two frames. Hardware runs frames far more often; 10 ms keeps the host load low.
	pub frame_interval: Duration,
	/// Instructions the global processor may execute per frame.
	pub gp_step_budget: usize,
	/// Instructions the encode processor may execute per frame.
	pub ep_step_budget: usize,
}

impl Default for ApuConfig {
	fn default() -> Self {
		Self { frame_interval: Duration::from_millis(10), gp_step_budget: 30000, ep_step_budget: 1000 }
	}
}

/// The audio processing unit.
///
/// The device holds no reference to guest memory or to its host; both are passed into every operation. A host that
/// accesses the device from more than one thread wraps it in [`crate::SharedApu`].
#[derive(Debug)]
pub struct Apu<C: DspCore> {
	config:        ApuConfig,
	pub registers: Registers,
	front_end:     FrontEnd,
	/// The global processor.
	pub gp:        Processor<C>,
	/// The encode processor.
	pub ep:        Processor<C>,
}

impl Apu<InertCore> {
	/// An APU whose processors keep their memories but execute nothing.
	#[must_use]
	pub fn inert(config: ApuConfig) -> Self {
		Self::new(config, InertCore::new(ProcessorLayout::GLOBAL), InertCore::new(ProcessorLayout::ENCODE))
	}
}

impl<C: DspCore> Apu<C> {
	#[must_use]
	pub fn new(config: ApuConfig, gp_core: C, ep_core: C) -> Self {
		Self {
			config,
			registers: Registers::new(),
			front_end: FrontEnd::new(),
			gp: Processor::new(gp_core, ProcessorLayout::GLOBAL),
			ep: Processor::new(ep_core, ProcessorLayout::ENCODE),
		}
	}

	#[must_use]
	pub const fn config(&self) -> &ApuConfig {
		&self.config
	}

	/// Read a 32-bit MMIO register. Addresses outside every block read as 0.
	#[must_use]
	#[allow(clippy::cast_possible_truncation)]
	pub fn read(&self, address: u32, host: &impl Host) -> u32 {
		if address == registers::XGSCNT {
			return (host.clock_ns() / GLOBAL_COUNTER_PERIOD_NS) as u32;
		}
		if GLOBAL_REGION.contains(&address) {
			self.registers.read(address)
		} else if VOICE_PORT_REGION.contains(&address) {
			FrontEnd::port_read(address - VOICE_PORT_REGION.start)
		} else if GP_REGION.contains(&address) {
			self.gp.read(address - GP_REGION.start)
		} else if EP_REGION.contains(&address) {
			self.ep.read(address - EP_REGION.start)
		} else {
			trace!("unmapped read [{:05x}]", address);
			0
		}
	}

	/// Write a 32-bit MMIO register. Writes outside every block are dropped.
	///
	/// # Errors
	/// Front-end methods written to the command port fail like [`FrontEnd::execute`].
	pub fn write(
		&mut self,
		address: u32,
		value: u32,
		memory: &mut impl GuestMemory,
		host: &mut impl Host,
	) -> Result<(), ApuError> {
		if GLOBAL_REGION.contains(&address) {
			self.write_global(address, value, memory, host);
		} else if VOICE_PORT_REGION.contains(&address) {
			let offset = address - VOICE_PORT_REGION.start;
			if FrontEnd::is_port_method(offset) {
				self.front_end.execute(&mut self.registers, memory, host, offset, value)?;
			} else {
				trace!("ignored command port write [{:04x}] = {:08x}", offset, value);
			}
		} else if GP_REGION.contains(&address) {
			self.gp.write(address - GP_REGION.start, value);
		} else if EP_REGION.contains(&address) {
			self.ep.write(address - EP_REGION.start, value);
		} else {
			trace!("unmapped write [{:05x}] = {:08x}", address, value);
		}
		Ok(())
	}

	fn write_global(&mut self, address: u32, value: u32, memory: &mut impl GuestMemory, host: &mut impl Host) {
		match address {
			registers::ISTS => {
				self.registers.interrupt_status.remove(Interrupts::from_bits_retain(value));
				self.registers.update_irq(host);
			},
			registers::IEN => {
				self.registers.store(address, value);
				self.registers.update_irq(host);
			},
			registers::SECTL => {
				self.registers.store(address, value);
				if self.registers.frame_counter_enabled() {
					host.schedule_frame(self.config.frame_interval);
				} else {
					debug!("frame timer stopped");
					host.cancel_frame();
				}
			},
			registers::FEMEMDATA => {
				// Completes a notifier right away.
				memory.write_u32(self.registers.fe_memory_address, value);
				self.registers.store(address, value);
			},
			_ => self.registers.store(address, value),
		}
	}

	/// Run one audio frame. The host calls this whenever the frame timer fires.
	///
	/// The timer is re-armed first, so the frame period does not drift with processing time. The voice lists are
	/// mixed into the global processor's mix buffer, and then each processor that is out of reset gets its step
	/// budget.
	///
	/// # Errors
	/// Any fatal condition raised by the voice processor or by one of the cores.
	pub fn frame(&mut self, memory: &mut impl GuestMemory, host: &mut impl Host) -> Result<(), ApuError> {
		if self.registers.frame_counter_enabled() {
			host.schedule_frame(self.config.frame_interval);
		}
		let start = Instant::now();

		let mix = mixer::process_voices(&mut self.registers, &mut self.front_end, memory, host)?;
		self.gp.write_mix_buffer(&mix);
		let voices_done = Instant::now();

		let mut gp_io = ScratchPort::new(&mut *memory, self.registers.gp_scratch, self.registers.gp_fifo);
		self.gp.run_frame(self.config.gp_step_budget, &mut gp_io)?;
		let gp_done = Instant::now();

		let mut ep_io = ScratchPort::new(&mut *memory, self.registers.ep_scratch, self.registers.ep_fifo);
		self.ep.run_frame(self.config.ep_step_budget, &mut ep_io)?;
		let ep_done = Instant::now();

		debug!(
			"frame took {:?} (voices {:?}, gp {:?}, ep {:?})",
			ep_done - start,
			voices_done - start,
			gp_done - voices_done,
			ep_done - gp_done
		);
		Ok(())
	}
}
