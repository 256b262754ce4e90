use rstest::{fixture, rstest};

use super::dma::{DmaControl, DmaEngine, DmaRegister, POINTER_EOL};
use super::*;
use crate::memory::Ram;

const SCRATCH_TABLE: u32 = 0x1000;
const FIFO_TABLE: u32 = 0x2000;

/// Guest memory with a two-page scratch table (pages at 0x8000 and 0x9000) and a one-page FIFO table (0xA000).
#[fixture]
fn memory() -> Ram {
	let mut memory = Ram::new(0x1_0000);
	memory.write_u32(SCRATCH_TABLE, 0x8000);
	memory.write_u32(SCRATCH_TABLE + 8, 0x9000);
	memory.write_u32(FIFO_TABLE, 0xA000);
	memory
}

fn port(memory: &mut Ram) -> ScratchPort<'_, Ram> {
	ScratchPort::new(memory, ScatterGather::new(SCRATCH_TABLE, 1), ScatterGather::new(FIFO_TABLE, 0))
}

fn write_descriptor(core: &mut InertCore, address: u32, words: [u32; 7]) {
	for (index, word) in (address ..).zip(words) {
		core.write_memory(MemorySpace::X, index, word);
	}
}

const fn control(format: u32, buffer: u32, to_scratch: bool) -> u32 {
	(format << 10) | (buffer << 5) | if to_scratch { 1 << 1 } else { 0 }
}

fn start(engine: &mut DmaEngine, core: &mut InertCore, memory: &mut Ram, first: u32) -> Result<(), ApuError> {
	engine.next_block = first;
	engine.write(DmaRegister::Control, 1, core, &mut port(memory))
}

#[rstest]
fn chain_runs_to_end_of_list(mut memory: Ram) {
	let mut core = InertCore::new(ProcessorLayout::GLOBAL);
	let mut engine = DmaEngine::new();
	// Three 24-bit words from scratch 0x10 into X:0x200.
	write_descriptor(&mut core, 0x100, [0x108, control(2, 0xF, false), 3, 0x200, 0x10, 0, 0]);
	// Two 16-bit words from Y:0 into scratch 0xFFE, across the page boundary.
	write_descriptor(&mut core, 0x108, [POINTER_EOL, control(1, 0xF, true), 2, 0x1800, 0xFFE, 0, 0]);
	memory.write_u32(0x8010, 0x11AA_BBCC);
	memory.write_u32(0x8014, 1);
	memory.write_u32(0x8018, 0xFF00_0002);
	core.write_memory(MemorySpace::Y, 0, 0x1234);
	core.write_memory(MemorySpace::Y, 1, 0xAB_CDEF);

	start(&mut engine, &mut core, &mut memory, 0x100).unwrap();

	assert!(engine.eol);
	assert_eq!(engine.next_block, POINTER_EOL);
	assert_eq!(engine.control, DmaControl::RUNNING);
	assert_eq!(
		[0x200, 0x201, 0x202].map(|index| core.read_memory(MemorySpace::X, index)),
		[0xAA_BBCC, 1, 2]
	);
	assert_eq!(memory.read_u16(0x8FFE), 0x1234);
	assert_eq!(memory.read_u16(0x9000), 0xCDEF);
}

#[rstest]
fn oversized_circular_descriptor_is_skipped(mut memory: Ram) {
	let mut core = InertCore::new(ProcessorLayout::GLOBAL);
	let mut engine = DmaEngine::new();
	// 4 items of 4 bytes do not fit a 16-byte circular buffer.
	write_descriptor(&mut core, 0x100, [0x108, control(6, 0xE, false), 4, 0x300, 0, 0x40, 15]);
	// They fit a 32-byte one; the transfer starts at base + offset.
	write_descriptor(&mut core, 0x108, [POINTER_EOL, control(6, 0xE, false), 4, 0x400, 4, 0x40, 31]);
	for (index, value) in (0x8040 .. 0x8058).step_by(4).zip(10 ..) {
		memory.write_u32(index, value);
	}

	start(&mut engine, &mut core, &mut memory, 0x100).unwrap();

	assert!(engine.eol);
	assert_eq!(core.read_memory(MemorySpace::X, 0x300), 0);
	assert_eq!(
		[0x400, 0x401, 0x402, 0x403].map(|index| core.read_memory(MemorySpace::X, index)),
		[11, 12, 13, 14]
	);
}

#[rstest]
fn frozen_engine_waits(mut memory: Ram) {
	let mut core = InertCore::new(ProcessorLayout::GLOBAL);
	let mut engine = DmaEngine::new();
	write_descriptor(&mut core, 0x100, [POINTER_EOL, control(1, 0xF, false), 1, 0x10, 0, 0, 0]);
	memory.write_u16(0x8000, 0xBEEF);

	engine.write(DmaRegister::Control, 3, &mut core, &mut port(&mut memory)).unwrap();
	start(&mut engine, &mut core, &mut memory, 0x100).unwrap();
	assert_eq!(engine.control, DmaControl::RUNNING | DmaControl::FROZEN);
	assert_eq!(engine.next_block, 0x100);
	assert!(!engine.eol);

	engine.write(DmaRegister::Control, 4, &mut core, &mut port(&mut memory)).unwrap();
	assert!(engine.eol);
	assert_eq!(core.read_memory(MemorySpace::X, 0x10), 0xBEEF);
}

#[rstest]
fn stopped_engine_does_not_run(mut memory: Ram) {
	let mut core = InertCore::new(ProcessorLayout::GLOBAL);
	let mut engine = DmaEngine::new();
	engine.next_block = 0x100;
	engine.write(DmaRegister::Control, 2, &mut core, &mut port(&mut memory)).unwrap();
	assert_eq!(engine.read(DmaRegister::Control), DmaControl::STOPPED.bits());
	assert_eq!(engine.read(DmaRegister::NextBlock), 0x100);
}

#[rstest]
#[case::unknown_format(
	[POINTER_EOL, control(3, 0xF, false), 1, 0, 0, 0, 0],
	ApuError::UnknownDmaFormat { format: 3 }
)]
#[case::unmapped_dsp_address(
	[POINTER_EOL, control(1, 0xF, false), 1, 0x2000, 0, 0, 0],
	ApuError::UnmappedDspAddress { address: 0x2000 }
)]
#[case::scratch_past_table(
	[POINTER_EOL, control(1, 0xF, true), 1, 0, 0x2000, 0, 0],
	ApuError::SgeOutOfRange { entry: 2, max_entries: 1, linear_address: 0x2000 }
)]
fn fatal_descriptors(mut memory: Ram, #[case] descriptor: [u32; 7], #[case] error: ApuError) {
	let mut core = InertCore::new(ProcessorLayout::GLOBAL);
	let mut engine = DmaEngine::new();
	write_descriptor(&mut core, 0x100, descriptor);
	assert_eq!(start(&mut engine, &mut core, &mut memory, 0x100), Err(error));
}

#[rstest]
fn abort_is_fatal(mut memory: Ram) {
	let mut core = InertCore::new(ProcessorLayout::GLOBAL);
	let mut engine = DmaEngine::new();
	assert_eq!(
		engine.write(DmaRegister::Control, 5, &mut core, &mut port(&mut memory)),
		Err(ApuError::DmaAbort { action: 5 })
	);
}

#[rstest]
#[case::x(0x0000, MemorySpace::X, 0)]
#[case::x_last(0x3FFC, MemorySpace::X, 0xFFF)]
#[case::mix_buffer(0x5004, MemorySpace::X, MIX_BUFFER_BASE + 1)]
#[case::y(0x6008, MemorySpace::Y, 2)]
#[case::p(0xA010, MemorySpace::P, 4)]
fn global_processor_windows(#[case] offset: u32, #[case] space: MemorySpace, #[case] index: u32) {
	let mut processor = Processor::new(InertCore::new(ProcessorLayout::GLOBAL), ProcessorLayout::GLOBAL);
	processor.write(offset, 0x1234_5678);
	assert_eq!(processor.core.read_memory(space, index), 0x34_5678);
	assert_eq!(processor.read(offset), 0x34_5678);
}

#[test]
fn encode_processor_has_no_mix_buffer() {
	let mut processor = Processor::new(InertCore::new(ProcessorLayout::ENCODE), ProcessorLayout::ENCODE);
	processor.write(0x5000, 7);
	assert_eq!(processor.read(0x5000), 7);
	processor.write(0x2FFC, 9);
	assert_eq!(processor.core.read_memory(MemorySpace::X, 0xBFF), 9);
	// Past the end of X memory.
	processor.write(0x3000, 5);
	assert_eq!(processor.core.read_memory(MemorySpace::X, 0xC00), 0);
}

#[test]
fn reset_register_boots_once() {
	let mut processor = Processor::new(InertCore::new(ProcessorLayout::GLOBAL), ProcessorLayout::GLOBAL);
	assert!(!processor.is_running());

	processor.write(RESET_REGISTER, 0b11);
	assert!(processor.is_running());
	assert_eq!(processor.core.bootstraps, 1);
	processor.write(RESET_REGISTER, 0b111);
	assert_eq!(processor.core.bootstraps, 1);
	assert_eq!(processor.read(RESET_REGISTER), 0b111);

	processor.write(RESET_REGISTER, 0b01);
	assert!(!processor.is_running());
	assert_eq!(processor.core.resets, 1);
	processor.write(RESET_REGISTER, 0b00);
	assert_eq!(processor.core.resets, 2);

	processor.write(RESET_REGISTER, 0b11);
	assert_eq!(processor.core.bootstraps, 2);
}

#[rstest]
fn frames_only_run_out_of_reset(mut memory: Ram) {
	let mut processor = Processor::new(InertCore::new(ProcessorLayout::GLOBAL), ProcessorLayout::GLOBAL);
	processor.run_frame(1000, &mut port(&mut memory)).unwrap();
	assert_eq!(processor.core.frames, 0);

	processor.write(RESET_REGISTER, 0b11);
	processor.run_frame(1000, &mut port(&mut memory)).unwrap();
	processor.run_frame(1000, &mut port(&mut memory)).unwrap();
	assert_eq!(processor.core.frames, 2);
	assert_eq!(processor.core.steps, 2000);
}

#[test]
fn mix_buffer_lands_in_x_memory() {
	let mut processor = Processor::new(InertCore::new(ProcessorLayout::GLOBAL), ProcessorLayout::GLOBAL);
	let mut mix: MixBuffer = [[0; FRAME_SAMPLES]; crate::mixer::BIN_COUNT];
	mix[0][0] = 5;
	mix[1][2] = -1;
	mix[31][31] = 0x0100_0001;
	processor.write_mix_buffer(&mix);
	assert_eq!(processor.core.read_memory(MemorySpace::X, MIX_BUFFER_BASE), 5);
	assert_eq!(processor.read(MIX_BUFFER_WINDOW + (32 + 2) * 4), 0xFF_FFFF);
	assert_eq!(processor.core.read_memory(MemorySpace::X, 0xFFF), 1);
}

#[rstest]
fn fifo_uses_its_own_table(mut memory: Ram) {
	let mut port = port(&mut memory);
	port.write_fifo(0, 0x20, &[1, 2, 3]).unwrap();
	let mut buffer = [0; 3];
	port.read_fifo(0, 0x20, &mut buffer).unwrap();
	assert_eq!(buffer, [1, 2, 3]);
	assert!(port.read_fifo(1, 0x1000, &mut buffer).is_err());
	drop(port);
	assert_eq!(memory.read_u8(0xA021), 2);
}
