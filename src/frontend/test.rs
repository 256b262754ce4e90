use rstest::{fixture, rstest};

use super::*;
use crate::envelope::EnvelopeState;
use crate::host::ManualHost;
use crate::memory::Ram;
use crate::voice::LIST_END;

const VOICE_TABLE: u32 = 0x1_0000;
const SGE_TABLE: u32 = 0x2_0000;

struct Machine {
	front_end: FrontEnd,
	registers: Registers,
	memory:    Ram,
	host:      ManualHost,
}

impl Machine {
	fn method(&mut self, method: u32, argument: u32) -> Result<(), ApuError> {
		self.front_end.execute(&mut self.registers, &mut self.memory, &mut self.host, method, argument)
	}

	fn voice(&self, handle: u32) -> Voice {
		Voice::locate(VOICE_TABLE, handle).unwrap()
	}

	fn next_of(&self, handle: u32) -> u16 {
		self.voice(handle).next(&self.memory)
	}
}

#[fixture]
fn machine() -> Machine {
	let mut registers = Registers::new();
	registers.voice_table = VOICE_TABLE;
	registers.voice_sge_table = SGE_TABLE;
	Machine { front_end: FrontEnd::new(), registers, memory: Ram::new(0x4_0000), host: ManualHost::new() }
}

#[rstest]
#[case::two_d(1, VoiceList::TwoD)]
#[case::three_d(2, VoiceList::ThreeD)]
#[case::multipass(3, VoiceList::Multipass)]
fn voice_on_inserts_at_list_head(mut machine: Machine, #[case] selector: u32, #[case] list: VoiceList) {
	machine.method(method::SET_ANTECEDENT_VOICE, selector << 16).unwrap();
	machine.method(method::VOICE_ON, 4).unwrap();
	assert_eq!(machine.registers.voice_list(list).top, 4);
	assert_eq!(machine.next_of(4), LIST_END);

	machine.method(method::VOICE_ON, 9).unwrap();
	assert_eq!(machine.registers.voice_list(list).top, 9);
	assert_eq!(machine.next_of(9), 4);
	assert!(machine.voice(9).is_active(&machine.memory));
	assert!(machine.voice(4).is_active(&machine.memory));
}

#[rstest]
fn voice_on_inserts_after_antecedent(mut machine: Machine) {
	machine.method(method::SET_ANTECEDENT_VOICE, 1 << 16).unwrap();
	machine.method(method::VOICE_ON, 1).unwrap();
	machine.method(method::VOICE_ON, 2).unwrap();
	// 2 -> 1 -> end; insert 3 after 2.
	machine.method(method::SET_ANTECEDENT_VOICE, 2).unwrap();
	machine.method(method::VOICE_ON, 3).unwrap();

	assert_eq!(machine.registers.voice_list(VoiceList::TwoD).top, 2);
	assert_eq!(machine.next_of(2), 3);
	assert_eq!(machine.next_of(3), 1);
	assert_eq!(machine.next_of(1), LIST_END);
}

#[rstest]
fn inherit_needs_an_antecedent(mut machine: Machine) {
	machine.method(method::SET_ANTECEDENT_VOICE, 0xFFFF).unwrap();
	assert_eq!(machine.method(method::VOICE_ON, 3), Err(ApuError::InvalidVoiceHandle { handle: 0xFFFF }));
}

#[rstest]
fn voice_off_keeps_list(mut machine: Machine) {
	machine.method(method::SET_ANTECEDENT_VOICE, 1 << 16).unwrap();
	machine.method(method::VOICE_ON, 1).unwrap();
	machine.method(method::VOICE_ON, 2).unwrap();
	machine.method(method::VOICE_OFF, 2).unwrap();

	assert!(!machine.voice(2).is_active(&machine.memory));
	assert_eq!(machine.registers.voice_list(VoiceList::TwoD).top, 2);
	assert_eq!(machine.next_of(2), 1);
}

#[rstest]
fn pause_and_resume(mut machine: Machine) {
	machine.method(method::VOICE_PAUSE, (1 << 18) | 7).unwrap();
	assert!(machine.voice(7).is_paused(&machine.memory));
	machine.method(method::VOICE_PAUSE, 7).unwrap();
	assert!(!machine.voice(7).is_paused(&machine.memory));
}

#[rstest]
fn parameter_writes_go_to_current_voice(mut machine: Machine) {
	machine.method(method::SET_CURRENT_VOICE, 5).unwrap();
	machine.method(method::SET_VOICE_CFG_FMT, 0x5000_0000).unwrap();
	machine.method(method::SET_VOICE_TAR_PITCH, 0xF000_1234).unwrap();
	machine.method(method::SET_VOICE_CFG_BUF_BASE, 0xFF12_3456).unwrap();
	machine.method(method::SET_VOICE_CFG_BUF_LBO, 0x10).unwrap();
	machine.method(method::SET_VOICE_BUF_CBO, 0x20).unwrap();
	machine.method(method::SET_VOICE_CFG_BUF_EBO, 0x30).unwrap();
	machine.method(method::SET_VOICE_TAR_VOLA, 0xABCD_EF01).unwrap();
	machine.method(method::SET_VOICE_CFG_ENVA, 0x1234_5678).unwrap();

	let voice = machine.voice(5);
	let memory = &machine.memory;
	assert_eq!(voice.get(memory, voice::FORMAT), 0x5000_0000);
	assert_eq!(voice.pitch(memory), -4096);
	assert_eq!(voice.get(memory, voice::BASE_ADDRESS), 0x12_3456);
	assert_eq!(voice.get(memory, voice::LOOP_OFFSET), 0x10);
	assert_eq!(voice.get(memory, voice::CURRENT_OFFSET), 0x20);
	assert_eq!(voice.get(memory, voice::END_OFFSET), 0x30);
	assert_eq!(memory.read_u32(voice.address() + voice::TAR_VOLA), 0xABCD_EF01);
	assert_eq!(voice.get(memory, voice::EA_SUSTAINLEVEL), 0x12);
	// The pitch write leaves the link alone.
	assert_eq!(voice.next(memory), 0);
}

#[rstest]
fn sge_offsets_rewrite_table_entries(mut machine: Machine) {
	machine.method(method::SET_CURRENT_INBUF_SGE, 3).unwrap();
	machine.method(method::SET_CURRENT_INBUF_SGE_OFFSET, 0x0012_3FFF).unwrap();
	machine.method(method::SET_CURRENT_OUTBUF_SGE, 4).unwrap();
	machine.method(method::SET_CURRENT_OUTBUF_SGE_OFFSET, 0x0045_6000).unwrap();
	assert_eq!(machine.memory.read_u32(SGE_TABLE + 3 * 8), 0x0012_3000);
	assert_eq!(machine.memory.read_u32(SGE_TABLE + 4 * 8), 0x0045_6000);
}

#[rstest]
fn release_retriggers_both_envelopes(mut machine: Machine) {
	let voice = machine.voice(6);
	voice.set(&mut machine.memory, voice::EA_RELEASERATE, 3);
	voice.set(&mut machine.memory, voice::EF_RELEASERATE, 5);
	Envelope::AMPLITUDE.set_state(&mut machine.memory, voice, EnvelopeState::Sustain);

	machine.method(method::VOICE_RELEASE, 6).unwrap();
	assert_eq!(Envelope::AMPLITUDE.state(&machine.memory, voice), Ok(EnvelopeState::Release));
	assert_eq!(Envelope::FILTER.state(&machine.memory, voice), Ok(EnvelopeState::Release));
	assert_eq!(voice.get(&machine.memory, voice::EA_COUNT), 48);
	assert_eq!(voice.get(&machine.memory, voice::EF_COUNT), 80);
}

#[rstest]
fn armed_idle_voice_traps_and_interrupts(mut machine: Machine) {
	machine.registers.interrupt_enable = Interrupts::GLOBAL | Interrupts::FRONT_END_TRAP;
	machine.registers.fe_trap_force[1] = registers::FETFORCE1_IDLE_VOICE;
	machine.method(method::SE2FE_IDLE_VOICE, 0).unwrap();

	assert_eq!(machine.registers.fe_control & 0xFE0, 0xFE0);
	assert!(machine.registers.interrupt_status.contains(Interrupts::FRONT_END_TRAP | Interrupts::GLOBAL));
	assert!(machine.host.irq);
}

#[rstest]
fn disarmed_idle_voice_is_ignored(mut machine: Machine) {
	machine.registers.interrupt_enable = Interrupts::all();
	machine.method(method::SE2FE_IDLE_VOICE, 0).unwrap();
	assert_eq!(machine.registers.fe_control, 0);
	assert!(machine.registers.interrupt_status.is_empty());
	assert!(machine.host.irq_history.is_empty());
}

#[rstest]
fn decoded_method_is_recorded(mut machine: Machine) {
	machine.method(method::SET_OUTBUF_LEN + 8, 0x100).unwrap();
	assert_eq!(machine.registers.fe_decoded_method, 0x100C);
	assert_eq!(machine.registers.fe_decoded_argument, 0x100);
}

#[rstest]
fn unknown_method_is_fatal(mut machine: Machine) {
	assert_eq!(
		machine.method(0x1234, 1),
		Err(ApuError::UnknownFrontEndMethod { method: 0x1234, argument: 1 })
	);
}

#[rstest]
#[case(method::VOICE_ON, true)]
#[case(method::SET_OUTBUF_BA + 0x18, true)]
#[case(method::SET_OUTBUF_LEN + 0x18, true)]
#[case(method::SET_OUTBUF_BA + 0x20, false)]
#[case(method::SET_OUTBUF_BA + 2, false)]
#[case(method::SE2FE_IDLE_VOICE, false)]
#[case(PIO_FREE, false)]
fn port_forwards_methods(#[case] offset: u32, #[case] forwarded: bool) {
	assert_eq!(FrontEnd::is_port_method(offset), forwarded);
}

#[test]
fn queue_is_always_empty() {
	assert_eq!(FrontEnd::port_read(PIO_FREE), 0x80);
	assert_eq!(FrontEnd::port_read(0x14), 0);
}
