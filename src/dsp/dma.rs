//! The DSP DMA engine: walks descriptor chains in DSP memory and moves words between DSP memory and scratch memory.

use bitflags::bitflags;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use super::{DspMemory, MemorySpace, ScratchIo};
use crate::error::ApuError;
use crate::trace;

/// Descriptor pointer bits: DSP address of the descriptor.
const POINTER_ADDRESS: u32 = 0x3FFF;
/// Descriptor pointer bit: end of list, no descriptor is referenced.
pub const POINTER_EOL: u32 = 1 << 14;
/// Descriptor control bit: transfer from DSP memory to scratch memory.
const CONTROL_TO_SCRATCH: u32 = 1 << 1;
/// Scratch buffer id of circular buffers.
const CIRCULAR_BUFFER: u32 = 0xE;
/// Words per descriptor.
const DESCRIPTOR_WORDS: u32 = 7;

/// Registers of the engine as seen from the DSP.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DmaRegister {
	Configuration,
	Control,
	StartBlock,
	NextBlock,
}

/// Requested action, the low three bits of a control write.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u8)]
pub enum DmaAction {
	Nop = 0,
	Start = 1,
	Stop = 2,
	Freeze = 3,
	Unfreeze = 4,
	Abort = 5,
}

bitflags! {
	/// Status bits of the control register.
	#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
	pub struct DmaControl : u32 {
		const FROZEN = 1 << 3;
		const RUNNING = 1 << 4;
		const STOPPED = 1 << 5;
	}

	/// The configuration register. The engine stores it but does not act on it.
	#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
	pub struct DmaConfiguration : u32 {
		const AUTOSTART = 1 << 0;
		const AUTOREADY = 1 << 1;
		const IOC_CLEAR = 1 << 2;
		const EOL_CLEAR = 1 << 3;
		const ERR_CLEAR = 1 << 4;
		const _ = !0;
	}
}

/// One descriptor of a chain, as stored in DSP memory.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct Descriptor {
	next_block:     u32,
	control:        u32,
	count:          u32,
	dsp_offset:     u32,
	scratch_offset: u32,
	scratch_base:   u32,
	/// Stored minus one.
	scratch_size:   u64,
}

impl Descriptor {
	fn load(memory: &dyn DspMemory, address: u32) -> Result<Self, ApuError> {
		let mut words = [0; DESCRIPTOR_WORDS as usize];
		for (word, index) in words.iter_mut().zip(address ..) {
			*word = read_mapped(memory, index)?;
		}
		let [next_block, control, count, dsp_offset, scratch_offset, scratch_base, size] = words;
		Ok(Self {
			next_block,
			control,
			count,
			dsp_offset,
			scratch_offset,
			scratch_base,
			scratch_size: u64::from(size) + 1,
		})
	}

	/// Bytes per item and the mask applied to items read from scratch memory.
	fn item_format(&self) -> Result<(u32, u32), ApuError> {
		match (self.control >> 10) & 7 {
			1 => Ok((2, u32::MAX)),
			2 | 6 => Ok((4, super::WORD_MASK)),
			format => Err(ApuError::UnknownDmaFormat { format }),
		}
	}

	const fn buffer_id(&self) -> u32 {
		(self.control >> 5) & 0xF
	}

	const fn to_scratch(&self) -> bool {
		self.control & CONTROL_TO_SCRATCH != 0
	}
}

/// Map a DSP bus address to a memory space and word index.
///
/// # Errors
/// If the address lies in none of the memory ranges.
pub const fn map_address(address: u32) -> Result<(MemorySpace, u32), ApuError> {
	match address {
		0 ..= 0x17FF => Ok((MemorySpace::X, address)),
		0x1800 ..= 0x1FFF => Ok((MemorySpace::Y, address - 0x1800)),
		0x2800 ..= 0x37FF => Ok((MemorySpace::P, address - 0x2800)),
		_ => Err(ApuError::UnmappedDspAddress { address }),
	}
}

fn read_mapped(memory: &dyn DspMemory, address: u32) -> Result<u32, ApuError> {
	let (space, index) = map_address(address)?;
	Ok(memory.read_memory(space, index))
}

fn write_mapped(memory: &mut dyn DspMemory, address: u32, value: u32) -> Result<(), ApuError> {
	let (space, index) = map_address(address)?;
	memory.write_memory(space, index, value);
	Ok(())
}

/// DMA engine state of one DSP core.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DmaEngine {
	pub configuration: DmaConfiguration,
	pub control:       DmaControl,
	pub start_block:   u32,
	pub next_block:    u32,
	/// Set once a chain reached its end-of-list descriptor.
	pub eol:           bool,
}

impl DmaEngine {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub const fn read(&self, register: DmaRegister) -> u32 {
		match register {
			DmaRegister::Configuration => self.configuration.bits(),
			DmaRegister::Control => self.control.bits(),
			DmaRegister::StartBlock => self.start_block,
			DmaRegister::NextBlock => self.next_block,
		}
	}

	/// Write a register. Control writes apply their action and then run the engine.
	///
	/// # Errors
	/// Abort and unknown actions are fatal, as is anything fatal while running the chain.
	pub fn write(
		&mut self,
		register: DmaRegister,
		value: u32,
		memory: &mut dyn DspMemory,
		io: &mut dyn ScratchIo,
	) -> Result<(), ApuError> {
		match register {
			DmaRegister::Configuration => self.configuration = DmaConfiguration::from_bits_retain(value),
			DmaRegister::StartBlock => self.start_block = value,
			DmaRegister::NextBlock => self.next_block = value,
			DmaRegister::Control => {
				let action = value & 7;
				match DmaAction::from_u32(action) {
					Some(DmaAction::Nop) => {},
					Some(DmaAction::Start) => {
						self.control.insert(DmaControl::RUNNING);
						self.control.remove(DmaControl::STOPPED);
					},
					Some(DmaAction::Stop) => {
						self.control.insert(DmaControl::STOPPED);
						self.control.remove(DmaControl::RUNNING);
					},
					Some(DmaAction::Freeze) => self.control.insert(DmaControl::FROZEN),
					Some(DmaAction::Unfreeze) => self.control.remove(DmaControl::FROZEN),
					Some(DmaAction::Abort) | None => return Err(ApuError::DmaAbort { action }),
				}
				self.run(memory, io)?;
			},
		}
		Ok(())
	}

	/// Process descriptors until the chain pointer is end-of-list. Does nothing unless running and not frozen.
	///
	/// # Errors
	/// Unknown item formats, unmapped DSP addresses and scratch offsets outside the page table.
	pub fn run(&mut self, memory: &mut dyn DspMemory, io: &mut dyn ScratchIo) -> Result<(), ApuError> {
		if !self.control.contains(DmaControl::RUNNING) || self.control.contains(DmaControl::FROZEN) {
			return Ok(());
		}

		while self.next_block & POINTER_EOL == 0 {
			let descriptor = Descriptor::load(memory, self.next_block & POINTER_ADDRESS)?;
			trace!("dma descriptor at {:04x}: {:x?}", self.next_block & POINTER_ADDRESS, descriptor);
			self.next_block = descriptor.next_block;
			if self.next_block & POINTER_EOL != 0 {
				self.eol = true;
			}

			let (item_size, item_mask) = descriptor.item_format()?;
			let scratch_address = if descriptor.buffer_id() == CIRCULAR_BUFFER {
				let end = u64::from(descriptor.scratch_offset) + u64::from(descriptor.count) * u64::from(item_size);
				if end >= descriptor.scratch_size {
					log::debug!(
						"skipping circular dma of {} items at offset {:#x}, buffer is only {:#x} bytes",
						descriptor.count,
						descriptor.scratch_offset,
						descriptor.scratch_size
					);
					continue;
				}
				descriptor.scratch_base.wrapping_add(descriptor.scratch_offset)
			} else {
				descriptor.scratch_offset
			};

			Self::transfer(&descriptor, scratch_address, item_size, item_mask, memory, io)?;
		}
		Ok(())
	}

	fn transfer(
		descriptor: &Descriptor,
		scratch_address: u32,
		item_size: u32,
		item_mask: u32,
		memory: &mut dyn DspMemory,
		io: &mut dyn ScratchIo,
	) -> Result<(), ApuError> {
		let mut item = [0; 4];
		let item = &mut item[.. item_size as usize];
		for index in 0 .. descriptor.count {
			let dsp_address = descriptor.dsp_offset.wrapping_add(index);
			let scratch = scratch_address.wrapping_add(index.wrapping_mul(item_size));
			if descriptor.to_scratch() {
				let value = read_mapped(memory, dsp_address)?;
				item.copy_from_slice(&value.to_le_bytes()[.. item_size as usize]);
				io.write_scratch(scratch, item)?;
			} else {
				io.read_scratch(scratch, item)?;
				let mut bytes = [0; 4];
				bytes[.. item.len()].copy_from_slice(item);
				write_mapped(memory, dsp_address, u32::from_le_bytes(bytes) & item_mask)?;
			}
		}
		Ok(())
	}
}
