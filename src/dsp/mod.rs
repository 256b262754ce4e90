//! The two DSP cores of the APU (global processor GP and encode processor EP) as seen from the host bus.
//!
//! Instruction execution is not part of this crate; a core is anything implementing [`DspCore`]. This module owns
//! the register block in front of each core: the memory windows, the reset register and the scratch interface the
//! core's DMA engine moves data through.

use std::collections::BTreeMap;

use bitflags::bitflags;

use crate::error::ApuError;
use crate::memory::GuestMemory;
use crate::mixer::{FRAME_SAMPLES, MixBuffer};
use crate::sge::ScatterGather;
use crate::trace;

pub mod dma;
#[cfg(test)] mod test;

/// DSP data words are 24 bits wide.
pub const WORD_MASK: u32 = 0x00FF_FFFF;
/// First X memory word of the GP mix buffer.
pub const MIX_BUFFER_BASE: u32 = 3072;

/// The three memory spaces of a DSP56300-family core.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MemorySpace {
	X,
	Y,
	/// Program memory.
	P,
}

/// Word-addressed DSP memory.
pub trait DspMemory {
	fn read_memory(&self, space: MemorySpace, index: u32) -> u32;
	fn write_memory(&mut self, space: MemorySpace, index: u32, value: u32);
}

/// Byte access to the scratch and FIFO buffers of one core, by linear offset.
pub trait ScratchIo {
	/// Read scratch memory.
	///
	/// # Errors
	/// If the offset is not covered by the scratch page table.
	fn read_scratch(&mut self, address: u32, buffer: &mut [u8]) -> Result<(), ApuError>;
	/// Write scratch memory.
	///
	/// # Errors
	/// If the offset is not covered by the scratch page table.
	fn write_scratch(&mut self, address: u32, data: &[u8]) -> Result<(), ApuError>;
	/// Read from FIFO `index`.
	///
	/// # Errors
	/// If the offset is not covered by the FIFO page table.
	fn read_fifo(&mut self, index: u32, address: u32, buffer: &mut [u8]) -> Result<(), ApuError>;
	/// Write to FIFO `index`.
	///
	/// # Errors
	/// If the offset is not covered by the FIFO page table.
	fn write_fifo(&mut self, index: u32, address: u32, data: &[u8]) -> Result<(), ApuError>;
}

/// A DSP core driven by the APU.
pub trait DspCore: DspMemory {
	/// Put the core into reset.
	fn reset(&mut self);
	/// Leave reset and load the boot program.
	fn bootstrap(&mut self);
	/// Signal the start of an audio frame.
	fn start_frame(&mut self);
	/// Execute at most `max_steps` instructions.
	///
	/// # Errors
	/// Anything the core's DMA engine or peripherals report as fatal.
	fn run(&mut self, max_steps: usize, io: &mut dyn ScratchIo) -> Result<(), ApuError>;
}

/// Scratch and FIFO access of one core, translated through that core's page tables.
pub struct ScratchPort<'m, M: GuestMemory> {
	memory:  &'m mut M,
	scratch: ScatterGather,
	fifo:    ScatterGather,
}

impl<'m, M: GuestMemory> ScratchPort<'m, M> {
	pub const fn new(memory: &'m mut M, scratch: ScatterGather, fifo: ScatterGather) -> Self {
		Self { memory, scratch, fifo }
	}
}

impl<M: GuestMemory> ScratchIo for ScratchPort<'_, M> {
	fn read_scratch(&mut self, address: u32, buffer: &mut [u8]) -> Result<(), ApuError> {
		self.scratch.read(self.memory, address, buffer)
	}

	fn write_scratch(&mut self, address: u32, data: &[u8]) -> Result<(), ApuError> {
		self.scratch.write(self.memory, address, data)
	}

	fn read_fifo(&mut self, index: u32, address: u32, buffer: &mut [u8]) -> Result<(), ApuError> {
		trace!("fifo {} read {} bytes at {:06x}", index, buffer.len(), address);
		self.fifo.read(self.memory, address, buffer)
	}

	fn write_fifo(&mut self, index: u32, address: u32, data: &[u8]) -> Result<(), ApuError> {
		trace!("fifo {} write {} bytes at {:06x}", index, data.len(), address);
		self.fifo.write(self.memory, address, data)
	}
}

/// Memory sizes of one core and whether it has a mix buffer window.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProcessorLayout {
	pub x_words:          u32,
	pub y_words:          u32,
	pub p_words:          u32,
	/// Words of X memory exposed through the mix buffer window, starting at [`MIX_BUFFER_BASE`].
	pub mix_buffer_words: u32,
}

impl ProcessorLayout {
	/// The global processor.
	pub const GLOBAL: Self = Self { x_words: 0x1000, y_words: 0x800, p_words: 0x1000, mix_buffer_words: 0x400 };
	/// The encode processor.
	pub const ENCODE: Self = Self { x_words: 0xC00, y_words: 0x100, p_words: 0x1000, mix_buffer_words: 0 };

	const fn words(self, space: MemorySpace) -> u32 {
		match space {
			MemorySpace::X => self.x_words,
			MemorySpace::Y => self.y_words,
			MemorySpace::P => self.p_words,
		}
	}
}

bitflags! {
	/// The processor reset register. Both run bits must be set for the core to execute.
	#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
	pub struct ResetControl : u32 {
		/// Processor out of reset.
		const PROCESSOR = 1 << 0;
		/// DSP core out of reset.
		const DSP = 1 << 1;
		const NMI = 1 << 2;
		const ABORT = 1 << 3;
		const _ = !0;
	}
}

// Offsets inside the processor's MMIO region.
const X_WINDOW: u32 = 0x0000;
const MIX_BUFFER_WINDOW: u32 = 0x5000;
const Y_WINDOW: u32 = 0x6000;
const P_WINDOW: u32 = 0xA000;
const RESET_REGISTER: u32 = 0xFFFC;

/// The register block of one DSP core.
#[derive(Debug)]
pub struct Processor<C: DspCore> {
	pub core:  C,
	layout:    ProcessorLayout,
	reset:     ResetControl,
	/// Registers without known function read back what was written.
	registers: BTreeMap<u32, u32>,
}

impl<C: DspCore> Processor<C> {
	pub const fn new(core: C, layout: ProcessorLayout) -> Self {
		Self { core, layout, reset: ResetControl::empty(), registers: BTreeMap::new() }
	}

	#[must_use]
	pub const fn layout(&self) -> ProcessorLayout {
		self.layout
	}

	#[must_use]
	pub const fn reset_control(&self) -> ResetControl {
		self.reset
	}

	/// Whether the core takes part in frames.
	#[must_use]
	pub const fn is_running(&self) -> bool {
		self.reset.contains(ResetControl::PROCESSOR.union(ResetControl::DSP))
	}

	/// Which DSP memory word an MMIO offset addresses, if any.
	fn window(&self, offset: u32) -> Option<(MemorySpace, u32)> {
		let in_window = |base: u32, words: u32| (base .. base + words * 4).contains(&offset).then(|| (offset - base) / 4);
		in_window(X_WINDOW, self.layout.x_words)
			.map(|index| (MemorySpace::X, index))
			.or_else(|| {
				in_window(MIX_BUFFER_WINDOW, self.layout.mix_buffer_words)
					.map(|index| (MemorySpace::X, MIX_BUFFER_BASE + index))
			})
			.or_else(|| in_window(Y_WINDOW, self.layout.y_words).map(|index| (MemorySpace::Y, index)))
			.or_else(|| in_window(P_WINDOW, self.layout.p_words).map(|index| (MemorySpace::P, index)))
	}

	/// Read from the processor's MMIO region.
	#[must_use]
	pub fn read(&self, offset: u32) -> u32 {
		let value = match self.window(offset) {
			Some((space, index)) => self.core.read_memory(space, index),
			None if offset == RESET_REGISTER => self.reset.bits(),
			None => self.registers.get(&offset).copied().unwrap_or(0),
		};
		trace!("dsp read [{:04x}] -> {:08x}", offset, value);
		value
	}

	/// Write to the processor's MMIO region.
	pub fn write(&mut self, offset: u32, value: u32) {
		trace!("dsp write [{:04x}] = {:08x}", offset, value);
		match self.window(offset) {
			Some((space, index)) => self.core.write_memory(space, index, value),
			None if offset == RESET_REGISTER => self.write_reset(ResetControl::from_bits_retain(value)),
			None => {
				self.registers.insert(offset, value);
			},
		}
	}

	/// Entering reset resets the core every time; leaving it boots the core once.
	fn write_reset(&mut self, value: ResetControl) {
		let run = ResetControl::PROCESSOR | ResetControl::DSP;
		if !value.contains(run) {
			log::debug!("dsp enters reset ({:?})", value);
			self.core.reset();
		} else if !self.reset.contains(run) {
			log::debug!("dsp leaves reset, bootstrapping");
			self.core.bootstrap();
		}
		self.reset = value;
	}

	/// Copy a frame's mix buffer into X memory, one word per sample.
	pub fn write_mix_buffer(&mut self, mix: &MixBuffer) {
		for (bin, samples) in mix.iter().enumerate() {
			for (position, sample) in samples.iter().enumerate() {
				let index = MIX_BUFFER_BASE + (bin * FRAME_SAMPLES + position) as u32;
				self.core.write_memory(MemorySpace::X, index, *sample as u32 & WORD_MASK);
			}
		}
	}

	/// Run the core for one frame if it is out of reset.
	///
	/// # Errors
	/// Whatever the core reports.
	pub fn run_frame(&mut self, max_steps: usize, io: &mut dyn ScratchIo) -> Result<(), ApuError> {
		if !self.is_running() {
			return Ok(());
		}
		self.core.start_frame();
		self.core.run(max_steps, io)
	}
}

/// A core that executes nothing.
///
/// It keeps its memories and counts what the APU asks of it, which is enough to drive the voice processor and the
/// DMA engine without a DSP56300 interpreter.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InertCore {
	x:              Vec<u32>,
	y:              Vec<u32>,
	p:              Vec<u32>,
	pub resets:     usize,
	pub bootstraps: usize,
	pub frames:     usize,
	/// Total instruction budget handed to [`DspCore::run`].
	pub steps:      usize,
}

impl InertCore {
	#[must_use]
	pub fn new(layout: ProcessorLayout) -> Self {
		Self {
			x: vec![0; layout.words(MemorySpace::X) as usize],
			y: vec![0; layout.words(MemorySpace::Y) as usize],
			p: vec![0; layout.words(MemorySpace::P) as usize],
			..Self::default()
		}
	}

	fn space(&self, space: MemorySpace) -> &[u32] {
		match space {
			MemorySpace::X => &self.x,
			MemorySpace::Y => &self.y,
			MemorySpace::P => &self.p,
		}
	}
}

impl DspMemory for InertCore {
	fn read_memory(&self, space: MemorySpace, index: u32) -> u32 {
		self.space(space).get(index as usize).copied().unwrap_or(0)
	}

	fn write_memory(&mut self, space: MemorySpace, index: u32, value: u32) {
		let memory = match space {
			MemorySpace::X => &mut self.x,
			MemorySpace::Y => &mut self.y,
			MemorySpace::P => &mut self.p,
		};
		if let Some(word) = memory.get_mut(index as usize) {
			*word = value & WORD_MASK;
		} else {
			trace!("dropped write to {:?}:{:04x}", space, index);
		}
	}
}

impl DspCore for InertCore {
	fn reset(&mut self) {
		self.resets += 1;
	}

	fn bootstrap(&mut self) {
		self.bootstraps += 1;
	}

	fn start_frame(&mut self) {
		self.frames += 1;
	}

	fn run(&mut self, max_steps: usize, _io: &mut dyn ScratchIo) -> Result<(), ApuError> {
		self.steps += max_steps;
		Ok(())
	}
}
