//! The front end: decodes voice-processor methods written to the command port and applies them to registers and
//! voice records.
//!
//! Methods take effect immediately in the order they are written; there is no method queue.

use log::debug;

use crate::envelope::Envelope;
use crate::error::ApuError;
use crate::field::Field;
use crate::host::Host;
use crate::memory::GuestMemory;
use crate::registers::{self, Interrupts, Registers, VoiceList};
use crate::voice::{self, Voice};

#[cfg(test)] mod test;

/// Method numbers, which are also their offsets in the command port.
pub mod method {
	pub const SET_ANTECEDENT_VOICE: u32 = 0x120;
	pub const VOICE_ON: u32 = 0x124;
	pub const VOICE_OFF: u32 = 0x128;
	pub const VOICE_RELEASE: u32 = 0x12C;
	pub const VOICE_PAUSE: u32 = 0x140;
	pub const SET_CURRENT_VOICE: u32 = 0x2F8;
	pub const SET_VOICE_CFG_VBIN: u32 = 0x300;
	pub const SET_VOICE_CFG_FMT: u32 = 0x304;
	pub const SET_VOICE_CFG_ENV0: u32 = 0x308;
	pub const SET_VOICE_CFG_ENVA: u32 = 0x30C;
	pub const SET_VOICE_CFG_ENV1: u32 = 0x310;
	pub const SET_VOICE_CFG_ENVF: u32 = 0x314;
	pub const SET_VOICE_CFG_MISC: u32 = 0x318;
	pub const SET_VOICE_TAR_VOLA: u32 = 0x360;
	pub const SET_VOICE_TAR_VOLB: u32 = 0x364;
	pub const SET_VOICE_TAR_VOLC: u32 = 0x368;
	pub const SET_VOICE_TAR_LFO_ENV: u32 = 0x36C;
	pub const SET_VOICE_TAR_PITCH: u32 = 0x37C;
	pub const SET_VOICE_CFG_BUF_BASE: u32 = 0x3A0;
	pub const SET_VOICE_CFG_BUF_LBO: u32 = 0x3A4;
	pub const SET_VOICE_BUF_CBO: u32 = 0x3D8;
	pub const SET_VOICE_CFG_BUF_EBO: u32 = 0x3DC;
	pub const SET_CURRENT_INBUF_SGE: u32 = 0x804;
	pub const SET_CURRENT_INBUF_SGE_OFFSET: u32 = 0x808;
	/// Four slots with an 8-byte pitch.
	pub const SET_OUTBUF_BA: u32 = 0x1000;
	/// Four slots with an 8-byte pitch.
	pub const SET_OUTBUF_LEN: u32 = 0x1004;
	pub const SET_CURRENT_OUTBUF_SGE: u32 = 0x1800;
	pub const SET_CURRENT_OUTBUF_SGE_OFFSET: u32 = 0x1808;
	/// Raised by the voice walker for inactive voices; never written through the port.
	pub const SE2FE_IDLE_VOICE: u32 = 0x8000;
}

/// Port register with the number of free method queue slots.
pub const PIO_FREE: u32 = 0x10;
const PIO_FREE_EMPTY: u32 = 0x80;

const HANDLE_MASK: u32 = 0xFFFF;
const PAUSE_ACTION: u32 = 1 << 18;
const SGE_OFFSET_MASK: u32 = 0xFFFF_F000;
const OUTBUF_SLOTS: u32 = 4;
const OUTBUF_PITCH: u32 = 8;

/// Front-end state that lives outside the register file.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FrontEnd {
	inbuf_sge_handle:  u32,
	outbuf_sge_handle: u32,
}

impl FrontEnd {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Whether a port offset is a method the port forwards to the decoder.
	#[must_use]
	pub const fn is_port_method(offset: u32) -> bool {
		use method::*;
		matches!(
			offset,
			SET_ANTECEDENT_VOICE
				| VOICE_ON | VOICE_OFF
				| VOICE_RELEASE
				| VOICE_PAUSE
				| SET_CURRENT_VOICE
				| SET_VOICE_CFG_VBIN
				| SET_VOICE_CFG_FMT
				| SET_VOICE_CFG_ENV0
				| SET_VOICE_CFG_ENVA
				| SET_VOICE_CFG_ENV1
				| SET_VOICE_CFG_ENVF
				| SET_VOICE_CFG_MISC
				| SET_VOICE_TAR_VOLA
				| SET_VOICE_TAR_VOLB
				| SET_VOICE_TAR_VOLC
				| SET_VOICE_TAR_LFO_ENV
				| SET_VOICE_TAR_PITCH
				| SET_VOICE_CFG_BUF_BASE
				| SET_VOICE_CFG_BUF_LBO
				| SET_VOICE_BUF_CBO
				| SET_VOICE_CFG_BUF_EBO
				| SET_CURRENT_INBUF_SGE
				| SET_CURRENT_INBUF_SGE_OFFSET
				| SET_CURRENT_OUTBUF_SGE
				| SET_CURRENT_OUTBUF_SGE_OFFSET
		) || Self::outbuf_slot(offset).is_some()
	}

	/// Outbuf slot and whether it is the length (instead of the base address) method.
	const fn outbuf_slot(offset: u32) -> Option<(u32, bool)> {
		if offset < method::SET_OUTBUF_BA || offset >= method::SET_OUTBUF_BA + OUTBUF_SLOTS * OUTBUF_PITCH {
			return None;
		}
		let relative = offset - method::SET_OUTBUF_BA;
		match relative % OUTBUF_PITCH {
			0 => Some((relative / OUTBUF_PITCH, false)),
			4 => Some((relative / OUTBUF_PITCH, true)),
			_ => None,
		}
	}

	/// Read from the command port.
	#[must_use]
	pub const fn port_read(offset: u32) -> u32 {
		match offset {
			// The method queue is not modeled, so it is always empty.
			PIO_FREE => PIO_FREE_EMPTY,
			_ => 0,
		}
	}

	/// Decode and apply one method.
	///
	/// # Errors
	/// Unknown methods, invalid voice handles, and anything raised while writing the scatter-gather tables.
	pub fn execute(
		&mut self,
		registers: &mut Registers,
		memory: &mut impl GuestMemory,
		host: &mut impl Host,
		method: u32,
		argument: u32,
	) -> Result<(), ApuError> {
		debug!("front-end method {:#06x} ({:#010x})", method, argument);
		registers.fe_decoded_method = method;
		registers.fe_decoded_argument = argument;

		match method {
			method::SET_ANTECEDENT_VOICE => registers.fe_antecedent_voice = argument,
			method::VOICE_ON => Self::voice_on(registers, memory, argument)?,
			method::VOICE_OFF => {
				Voice::locate(registers.voice_table, argument & HANDLE_MASK)?.set_active(memory, false);
			},
			method::VOICE_RELEASE => {
				let voice = Voice::locate(registers.voice_table, argument & HANDLE_MASK)?;
				Envelope::AMPLITUDE.release(memory, voice);
				Envelope::FILTER.release(memory, voice);
			},
			method::VOICE_PAUSE => {
				let voice = Voice::locate(registers.voice_table, argument & HANDLE_MASK)?;
				voice.set(memory, voice::PAUSED, u32::from(argument & PAUSE_ACTION != 0));
			},
			method::SET_CURRENT_VOICE => registers.fe_current_voice = argument,
			method::SET_VOICE_CFG_VBIN => Self::set_current(registers, memory, Field::word(voice::CFG_VBIN), argument)?,
			method::SET_VOICE_CFG_FMT => Self::set_current(registers, memory, voice::FORMAT, argument)?,
			method::SET_VOICE_CFG_ENV0 => Self::set_current(registers, memory, Field::word(voice::CFG_ENV0), argument)?,
			method::SET_VOICE_CFG_ENVA => Self::set_current(registers, memory, Field::word(voice::CFG_ENVA), argument)?,
			method::SET_VOICE_CFG_ENV1 => Self::set_current(registers, memory, Field::word(voice::CFG_ENV1), argument)?,
			method::SET_VOICE_CFG_ENVF => Self::set_current(registers, memory, Field::word(voice::CFG_ENVF), argument)?,
			method::SET_VOICE_CFG_MISC => Self::set_current(registers, memory, Field::word(voice::CFG_MISC), argument)?,
			method::SET_VOICE_TAR_VOLA => Self::set_current(registers, memory, Field::word(voice::TAR_VOLA), argument)?,
			method::SET_VOICE_TAR_VOLB => Self::set_current(registers, memory, Field::word(voice::TAR_VOLB), argument)?,
			method::SET_VOICE_TAR_VOLC => Self::set_current(registers, memory, Field::word(voice::TAR_VOLC), argument)?,
			method::SET_VOICE_TAR_LFO_ENV =>
				Self::set_current(registers, memory, Field::word(voice::TAR_LFO_ENV), argument)?,
			method::SET_VOICE_TAR_PITCH => Self::set_current(registers, memory, voice::PITCH, argument >> 16)?,
			method::SET_VOICE_CFG_BUF_BASE => Self::set_current(registers, memory, voice::BASE_ADDRESS, argument)?,
			method::SET_VOICE_CFG_BUF_LBO => Self::set_current(registers, memory, voice::LOOP_OFFSET, argument)?,
			method::SET_VOICE_BUF_CBO => Self::set_current(registers, memory, voice::CURRENT_OFFSET, argument)?,
			method::SET_VOICE_CFG_BUF_EBO => Self::set_current(registers, memory, voice::END_OFFSET, argument)?,
			method::SET_CURRENT_INBUF_SGE => self.inbuf_sge_handle = argument,
			method::SET_CURRENT_INBUF_SGE_OFFSET => {
				Self::write_sge_entry(registers, memory, "inbuf", self.inbuf_sge_handle, argument);
			},
			method::SET_CURRENT_OUTBUF_SGE => self.outbuf_sge_handle = argument,
			method::SET_CURRENT_OUTBUF_SGE_OFFSET => {
				Self::write_sge_entry(registers, memory, "outbuf", self.outbuf_sge_handle, argument);
			},
			method::SE2FE_IDLE_VOICE => Self::idle_voice(registers, host),
			_ => match Self::outbuf_slot(method) {
				Some((slot, false)) => log::info!("outbuf base address [{}] = {:#010x}", slot, argument),
				Some((slot, true)) => log::info!("outbuf length [{}] = {:#010x}", slot, argument),
				None => return Err(ApuError::UnknownFrontEndMethod { method, argument }),
			},
		}
		Ok(())
	}

	/// Write a field of the voice selected by SET_CURRENT_VOICE.
	fn set_current(
		registers: &Registers,
		memory: &mut impl GuestMemory,
		field: Field,
		value: u32,
	) -> Result<(), ApuError> {
		Voice::locate(registers.voice_table, registers.fe_current_voice)?.set(memory, field, value);
		Ok(())
	}

	/// Link a voice into a list and activate it.
	fn voice_on(registers: &mut Registers, memory: &mut impl GuestMemory, argument: u32) -> Result<(), ApuError> {
		let voice = Voice::locate(registers.voice_table, argument & HANDLE_MASK)?;
		let list_selector = registers::FEAV_LIST.extract(registers.fe_antecedent_voice);

		if let Some(list) = list_selector.checked_sub(1).and_then(|index| VoiceList::ALL.get(index as usize)) {
			let list_registers = registers.voice_list_mut(*list);
			voice.set(memory, voice::NEXT_VOICE_HANDLE, list_registers.top);
			list_registers.top = voice.handle().into();
			debug!("voice {:04x} on, top of {:?} list", voice.handle(), list);
		} else {
			let antecedent_handle = registers::FEAV_HANDLE.extract(registers.fe_antecedent_voice);
			let antecedent = Voice::locate(registers.voice_table, antecedent_handle)?;
			voice.set_next(memory, antecedent.next(memory));
			antecedent.set_next(memory, voice.handle());
			debug!("voice {:04x} on, after voice {:04x}", voice.handle(), antecedent.handle());
		}

		voice.set_active(memory, true);
		Ok(())
	}

	/// Point an entry of the voice scatter-gather table at a new page.
	fn write_sge_entry(registers: &Registers, memory: &mut impl GuestMemory, kind: &str, handle: u32, argument: u32) {
		let address = registers.voice_sge_table.wrapping_add(handle.wrapping_mul(crate::sge::ENTRY_SIZE));
		let page = argument & SGE_OFFSET_MASK;
		memory.write_u32(address, page);
		debug!("{} sge[{:#x}] = {:#010x}", kind, handle, page);
	}

	/// The walker found an inactive voice. Traps the front end if the idle-voice trap is armed.
	fn idle_voice(registers: &mut Registers, host: &mut impl Host) {
		if registers.fe_trap_force[1] & registers::FETFORCE1_IDLE_VOICE == 0 {
			return;
		}
		let control = registers::FECTL_METHOD_MODE.insert(registers.fe_control, registers::METHOD_MODE_TRAPPED);
		registers.fe_control = registers::FECTL_TRAP_REASON.insert(control, registers::TRAP_REASON_REQUESTED);
		registers.interrupt_status.insert(Interrupts::FRONT_END_TRAP);
		registers.update_irq(host);
	}
}
