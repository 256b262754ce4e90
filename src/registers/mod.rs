//! The global register block of the APU.
#![allow(clippy::module_name_repetitions)]

use std::collections::BTreeMap;

use bitflags::bitflags;
use num_derive::FromPrimitive;

use crate::field::Field;
use crate::host::Host;
use crate::sge::ScatterGather;
use crate::trace;
use crate::voice::LIST_END;


pub const ISTS: u32 = 0x1000;
pub const IEN: u32 = 0x1004;
pub const FECTL: u32 = 0x1100;
pub const FECV: u32 = 0x1110;
pub const FEAV: u32 = 0x1118;
pub const FEDECMETH: u32 = 0x1300;
pub const FEDECPARAM: u32 = 0x1304;
pub const FEMEMADDR: u32 = 0x1324;
pub const FEMEMDATA: u32 = 0x1334;
pub const FETFORCE0: u32 = 0x1500;
pub const FETFORCE1: u32 = 0x1504;
pub const SECTL: u32 = 0x2000;
pub const XGSCNT: u32 = 0x200C;
pub const VPVADDR: u32 = 0x202C;
pub const VPSGEADDR: u32 = 0x2030;
pub const GPSADDR: u32 = 0x2040;
pub const GPFADDR: u32 = 0x2044;
pub const EPSADDR: u32 = 0x2048;
pub const EPFADDR: u32 = 0x204C;
pub const TVL2D: u32 = 0x2054;
pub const CVL2D: u32 = 0x2058;
pub const NVL2D: u32 = 0x205C;
pub const TVL3D: u32 = 0x2060;
pub const CVL3D: u32 = 0x2064;
pub const NVL3D: u32 = 0x2068;
pub const TVLMP: u32 = 0x206C;
pub const CVLMP: u32 = 0x2070;
pub const NVLMP: u32 = 0x2074;
pub const GPSMAXSGE: u32 = 0x20D4;
pub const GPFMAXSGE: u32 = 0x20D8;
pub const EPSMAXSGE: u32 = 0x20DC;
pub const EPFMAXSGE: u32 = 0x20E0;

/// Front-end method mode in FECTL.
pub const FECTL_METHOD_MODE: Field = Field::new(FECTL, 0xE0);
pub const METHOD_MODE_TRAPPED: u32 = 0x7;
/// Front-end trap reason in FECTL.
pub const FECTL_TRAP_REASON: Field = Field::new(FECTL, 0xF00);
pub const TRAP_REASON_REQUESTED: u32 = 0xF;
/// Antecedent voice handle in FEAV.
pub const FEAV_HANDLE: Field = Field::new(FEAV, 0xFFFF);
/// List selector in FEAV: 0 inherits the antecedent's list, 1 to 3 select the top of a list.
pub const FEAV_LIST: Field = Field::new(FEAV, 0x3_0000);
/// FETFORCE1 bit that arms the idle-voice trap.
pub const FETFORCE1_IDLE_VOICE: u32 = 1 << 15;
/// Frame counter mode in SECTL; zero stops the frame timer.
pub const SECTL_COUNTER_MODE: Field = Field::new(SECTL, 0x18);

bitflags! {
	/// Interrupt status and enable bits.
	#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
	pub struct Interrupts : u32 {
		/// Global interrupt: pending in ISTS, master enable in IEN.
		const GLOBAL = 1 << 0;
		/// Front-end trap.
		const FRONT_END_TRAP = 1 << 4;
		const _ = !0;
	}
}

/// The three voice lists.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u8)]
pub enum VoiceList {
	TwoD = 0,
	ThreeD = 1,
	Multipass = 2,
}

impl VoiceList {
	/// All lists in processing order.
	pub const ALL: [Self; 3] = [Self::TwoD, Self::ThreeD, Self::Multipass];
}

/// Head, current and next registers of one voice list.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VoiceListRegisters {
	pub top:     u32,
	pub current: u32,
	pub next:    u32,
}

impl Default for VoiceListRegisters {
	fn default() -> Self {
		Self { top: LIST_END.into(), current: LIST_END.into(), next: LIST_END.into() }
	}
}

/// The global register file.
///
/// Registers the device acts on have named fields; any other offset inside the block reads back what was last
/// written to it.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Registers {
	/// 1000, ISTS
	pub interrupt_status:    Interrupts,
	/// 1004, IEN
	pub interrupt_enable:    Interrupts,
	/// 1100, FECTL
	pub fe_control:          u32,
	/// 1110, FECV
	pub fe_current_voice:    u32,
	/// 1118, FEAV
	pub fe_antecedent_voice: u32,
	/// 1300, FEDECMETH
	pub fe_decoded_method:   u32,
	/// 1304, FEDECPARAM
	pub fe_decoded_argument: u32,
	/// 1324, FEMEMADDR
	pub fe_memory_address:   u32,
	/// 1334, FEMEMDATA
	pub fe_memory_data:      u32,
	/// 1500 and 1504, FETFORCE0/1
	pub fe_trap_force:       [u32; 2],
	/// 2000, SECTL
	pub se_control:          u32,
	/// 202C, VPVADDR
	pub voice_table:         u32,
	/// 2030, VPSGEADDR
	pub voice_sge_table:     u32,
	/// 2040 and 20D4, GPSADDR / GPSMAXSGE
	pub gp_scratch:          ScatterGather,
	/// 2044 and 20D8, GPFADDR / GPFMAXSGE
	pub gp_fifo:             ScatterGather,
	/// 2048 and 20DC, EPSADDR / EPSMAXSGE
	pub ep_scratch:          ScatterGather,
	/// 204C and 20E0, EPFADDR / EPFMAXSGE
	pub ep_fifo:             ScatterGather,
	/// 2054 - 2074, TVLxx / CVLxx / NVLxx
	pub voice_lists:         [VoiceListRegisters; 3],
	other:                   BTreeMap<u32, u32>,
}

impl Registers {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Read a register. XGSCNT is handled by the device, which owns the clock.
	#[must_use]
	pub fn read(&self, address: u32) -> u32 {
		let value = match address {
			ISTS => self.interrupt_status.bits(),
			IEN => self.interrupt_enable.bits(),
			FECTL => self.fe_control,
			FECV => self.fe_current_voice,
			FEAV => self.fe_antecedent_voice,
			FEDECMETH => self.fe_decoded_method,
			FEDECPARAM => self.fe_decoded_argument,
			FEMEMADDR => self.fe_memory_address,
			FEMEMDATA => self.fe_memory_data,
			FETFORCE0 => self.fe_trap_force[0],
			FETFORCE1 => self.fe_trap_force[1],
			SECTL => self.se_control,
			VPVADDR => self.voice_table,
			VPSGEADDR => self.voice_sge_table,
			GPSADDR => self.gp_scratch.base,
			GPFADDR => self.gp_fifo.base,
			EPSADDR => self.ep_scratch.base,
			EPFADDR => self.ep_fifo.base,
			GPSMAXSGE => self.gp_scratch.max_entries,
			GPFMAXSGE => self.gp_fifo.max_entries,
			EPSMAXSGE => self.ep_scratch.max_entries,
			EPFMAXSGE => self.ep_fifo.max_entries,
			TVL2D ..= NVLMP if address % 4 == 0 => {
				let (list, register) = Self::list_register(address);
				match register {
					0 => self.voice_lists[list].top,
					1 => self.voice_lists[list].current,
					_ => self.voice_lists[list].next,
				}
			},
			_ => self.other.get(&address).copied().unwrap_or(0),
		};
		trace!("register read [{:05x}] -> {:08x}", address, value);
		value
	}

	/// Store a register value without side effects.
	pub fn store(&mut self, address: u32, value: u32) {
		trace!("register write [{:05x}] = {:08x}", address, value);
		match address {
			ISTS => self.interrupt_status = Interrupts::from_bits_retain(value),
			IEN => self.interrupt_enable = Interrupts::from_bits_retain(value),
			FECTL => self.fe_control = value,
			FECV => self.fe_current_voice = value,
			FEAV => self.fe_antecedent_voice = value,
			FEDECMETH => self.fe_decoded_method = value,
			FEDECPARAM => self.fe_decoded_argument = value,
			FEMEMADDR => self.fe_memory_address = value,
			FEMEMDATA => self.fe_memory_data = value,
			FETFORCE0 => self.fe_trap_force[0] = value,
			FETFORCE1 => self.fe_trap_force[1] = value,
			SECTL => self.se_control = value,
			VPVADDR => self.voice_table = value,
			VPSGEADDR => self.voice_sge_table = value,
			GPSADDR => self.gp_scratch.base = value,
			GPFADDR => self.gp_fifo.base = value,
			EPSADDR => self.ep_scratch.base = value,
			EPFADDR => self.ep_fifo.base = value,
			GPSMAXSGE => self.gp_scratch.max_entries = value,
			GPFMAXSGE => self.gp_fifo.max_entries = value,
			EPSMAXSGE => self.ep_scratch.max_entries = value,
			EPFMAXSGE => self.ep_fifo.max_entries = value,
			TVL2D ..= NVLMP if address % 4 == 0 => {
				let (list, register) = Self::list_register(address);
				let registers = &mut self.voice_lists[list];
				match register {
					0 => registers.top = value,
					1 => registers.current = value,
					_ => registers.next = value,
				}
			},
			_ => {
				self.other.insert(address, value);
			},
		}
	}

	/// List index and register index (top, current, next) of a list register address.
	const fn list_register(address: u32) -> (usize, usize) {
		let index = ((address - TVL2D) / 4) as usize;
		(index / 3, index % 3)
	}

	#[must_use]
	pub const fn voice_list(&self, list: VoiceList) -> &VoiceListRegisters {
		&self.voice_lists[list as usize]
	}

	pub const fn voice_list_mut(&mut self, list: VoiceList) -> &mut VoiceListRegisters {
		&mut self.voice_lists[list as usize]
	}

	/// Whether the frame counter mode lets the frame timer run.
	#[must_use]
	pub const fn frame_counter_enabled(&self) -> bool {
		SECTL_COUNTER_MODE.extract(self.se_control) != 0
	}

	/// Recompute the global interrupt bit and drive the interrupt line accordingly.
	pub fn update_irq(&mut self, host: &mut impl Host) {
		let pending = self.interrupt_status.difference(Interrupts::GLOBAL).intersection(self.interrupt_enable);
		if self.interrupt_enable.contains(Interrupts::GLOBAL) && !pending.is_empty() {
			self.interrupt_status.insert(Interrupts::GLOBAL);
			host.set_irq(true);
		} else {
			self.interrupt_status.remove(Interrupts::GLOBAL);
			host.set_irq(false);
		}
	}
}
