//! Frame-loop driver for the MCPX APU model.
//!
//! Builds a guest memory image with a voice table and generated waveforms, programs the voices through the command
//! port the way a guest driver does and then runs the frame timer, reporting what ends up in the mix buffer.

use std::f64::consts::TAU;
use std::time::Instant;

use ::log::{LevelFilter, debug, info, warn};
use anyhow::Result;
use clap::{Parser, ValueEnum};
use mcpx::apu::{GP_REGION, VOICE_PORT_REGION};
use mcpx::frontend::method;
use mcpx::mixer::{BIN_COUNT, FRAME_SAMPLES};
use mcpx::registers::{self, Interrupts};
use mcpx::sge::{PAGE_SIZE, ScatterGather};
use mcpx::voice::{ContainerSize, SampleFormat, SampleSize, Voice};
use mcpx::{Apu, ApuConfig, GuestMemory, ManualHost, Ram, SharedApu, adpcm};
use time::macros::format_description;

const MEMORY_SIZE: usize = 0x100_0000;
const VOICE_TABLE: u32 = 0x1_0000;
const SGE_TABLE: u32 = 0x2_0000;
const NOTIFIER: u32 = 0x3_0000;
/// Physical sample pages are handed out downwards from here.
const SAMPLE_MEMORY_END: u32 = 0x100_0000;
const SAMPLES_PER_VOICE: u32 = 2048;

const GP_RESET: u32 = GP_REGION.start + 0xFFFC;
const GP_MIX_BUFFER: u32 = GP_REGION.start + 0x5000;
const EP_RESET: u32 = 0x5_FFFC;

/// Sample encodings the generated voices can use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
	/// Unsigned 8-bit PCM.
	U8,
	/// Signed 16-bit PCM.
	S16,
	/// Signed 24-bit PCM in 32-bit containers.
	S24,
	/// Signed 32-bit PCM.
	S32,
	/// 65-sample ADPCM blocks.
	Adpcm,
}

impl Format {
	const fn sample_format(self, looping: bool) -> SampleFormat {
		let (sample_size, container_size) = match self {
			Self::U8 => (SampleSize::U8, ContainerSize::B8),
			Self::S16 => (SampleSize::S16, ContainerSize::B16),
			Self::S24 => (SampleSize::S24, ContainerSize::B32),
			Self::S32 => (SampleSize::S32, ContainerSize::B32),
			Self::Adpcm => (SampleSize::S24, ContainerSize::Adpcm),
		};
		SampleFormat { sample_size, container_size, stereo: false, looping, stream: false, samples_per_block: 1 }
	}

	/// Number of playable samples and their encoding.
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	fn encode(self, waveform: &[f64]) -> (u32, Vec<u8>) {
		let scaled = |sample: f64, maximum: f64| (sample * maximum).round();
		match self {
			Self::U8 => (waveform.len() as u32, waveform.iter().map(|s| (scaled(*s, 127.0) + 128.0) as u8).collect()),
			Self::S16 => (
				waveform.len() as u32,
				waveform.iter().flat_map(|s| (scaled(*s, f64::from(i16::MAX)) as i16).to_le_bytes()).collect(),
			),
			Self::S24 => (
				waveform.len() as u32,
				waveform.iter().flat_map(|s| (scaled(*s, f64::from(0x7F_FFFF)) as i32).to_le_bytes()).collect(),
			),
			Self::S32 => (
				waveform.len() as u32,
				waveform.iter().flat_map(|s| (scaled(*s, f64::from(i32::MAX)) as i32).to_le_bytes()).collect(),
			),
			Self::Adpcm => {
				// Only block headers carry the waveform; all-zero codes hold it for the rest of the block.
				let blocks: Vec<u8> = waveform
					.chunks(adpcm::BLOCK_SAMPLES)
					.flat_map(|block| {
						let mut encoded = [0; adpcm::MONO_BLOCK_SIZE];
						encoded[.. 2].copy_from_slice(&(scaled(block[0], f64::from(i16::MAX)) as i16).to_le_bytes());
						encoded
					})
					.collect();
				let samples = (blocks.len() / adpcm::MONO_BLOCK_SIZE * adpcm::BLOCK_SAMPLES) as u32;
				(samples, blocks)
			},
		}
	}
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct CliArguments {
	/// Number of frames to run.
	#[arg(long, default_value_t = 16)]
	frames:    usize,
	/// Number of voices to play, spread over the three voice lists.
	#[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u16).range(1 ..= 256))]
	voices:    u16,
	/// Sample format of all voices.
	#[arg(long, value_enum, default_value_t = Format::S16)]
	format:    Format,
	/// Pitch in 1/4096 octaves; 0 plays samples at the frame rate.
	#[arg(long, default_value_t = 0, allow_negative_numbers = true)]
	pitch:     i16,
	/// Attenuation of every voice, 0 (full volume) to 4095 (silent).
	#[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u16).range(0 ..= 0xFFF))]
	volume:    u16,
	/// Loop the sample buffers instead of playing them once.
	#[arg(long = "loop")]
	looping:   bool,
	/// Instructions the global processor may execute per frame.
	#[arg(long, default_value_t = ApuConfig::default().gp_step_budget)]
	gp_budget: usize,
	/// Instructions the encode processor may execute per frame.
	#[arg(long, default_value_t = ApuConfig::default().ep_step_budget)]
	ep_budget: usize,
	/// Verbosity level to use.
	#[arg(long, short, action = clap::ArgAction::Count)]
	verbose:   u8,
}

/// The guest side: memory, the machine's timer and interrupt line, and a handle to the device.
struct Machine {
	apu:              SharedApu<mcpx::InertCore>,
	memory:           Ram,
	host:             ManualHost,
	/// Next free physical page, counting down.
	next_page:        u32,
	/// Next free linear sample page.
	next_linear_page: u32,
	/// Handle of the voice the last front-end trap reported.
	last_idle_voice:  Option<u32>,
}

impl Machine {
	fn write(&mut self, address: u32, value: u32) -> Result<()> {
		Ok(self.apu.write(address, value, &mut self.memory, &mut self.host)?)
	}

	fn read(&self, address: u32) -> u32 {
		self.apu.read(address, &self.host)
	}

	fn method(&mut self, method: u32, argument: u32) -> Result<()> {
		self.write(VOICE_PORT_REGION.start + method, argument)
	}

	/// Map fresh pages for `data` into the voice scatter-gather table and copy it there. Returns the linear address.
	#[allow(clippy::cast_possible_truncation)]
	fn upload(&mut self, data: &[u8]) -> Result<u32> {
		let linear = self.next_linear_page * PAGE_SIZE;
		for _ in 0 .. (data.len() as u32).div_ceil(PAGE_SIZE) {
			self.next_page -= PAGE_SIZE;
			self.method(method::SET_CURRENT_INBUF_SGE, self.next_linear_page)?;
			self.method(method::SET_CURRENT_INBUF_SGE_OFFSET, self.next_page)?;
			self.next_linear_page += 1;
		}
		ScatterGather::unbounded(SGE_TABLE).write(&mut self.memory, linear, data)?;
		Ok(linear)
	}

	#[allow(clippy::cast_possible_truncation)]
	fn start_voice(&mut self, handle: u16, arguments: &CliArguments) -> Result<()> {
		let period = 32.0 + 16.0 * f64::from(handle);
		let waveform: Vec<f64> =
			(0 .. SAMPLES_PER_VOICE).map(|index| (TAU * f64::from(index) / period).sin() * 0.5).collect();
		let (samples, data) = arguments.format.encode(&waveform);
		let base = self.upload(&data)?;

		let bin = u32::from(handle) % BIN_COUNT as u32;
		let volume = u32::from(arguments.volume);
		let format = arguments.format.sample_format(arguments.looping);

		self.method(method::SET_CURRENT_VOICE, handle.into())?;
		self.method(method::SET_VOICE_CFG_VBIN, bin)?;
		self.method(method::SET_VOICE_CFG_FMT, format.encode())?;
		// Slot 0 carries the voice, slots 1 to 7 are silent.
		self.method(method::SET_VOICE_TAR_VOLA, 0xFFF0_0000 | (volume << 4) | 0xF_000F)?;
		self.method(method::SET_VOICE_TAR_VOLB, 0xFFFF_FFFF)?;
		self.method(method::SET_VOICE_TAR_VOLC, 0xFFFF_FFFF)?;
		self.method(method::SET_VOICE_TAR_PITCH, u32::from(arguments.pitch.cast_unsigned()) << 16)?;
		self.method(method::SET_VOICE_CFG_BUF_BASE, base)?;
		self.method(method::SET_VOICE_CFG_BUF_LBO, 0)?;
		self.method(method::SET_VOICE_BUF_CBO, 0)?;
		self.method(method::SET_VOICE_CFG_BUF_EBO, samples - 1)?;

		let list = u32::from(handle) % 3 + 1;
		self.method(method::SET_ANTECEDENT_VOICE, list << 16)?;
		self.method(method::VOICE_ON, handle.into())?;
		debug!("voice {} plays {} samples from {:#08x} into bin {}", handle, samples, base, bin);
		Ok(())
	}

	/// Peak magnitude per bin of the mix buffer the last frame produced.
	#[allow(clippy::cast_possible_truncation)]
	fn mix_buffer_peaks(&self) -> [u32; BIN_COUNT] {
		let mut peaks = [0; BIN_COUNT];
		for (bin, peak) in peaks.iter_mut().enumerate() {
			for position in 0 .. FRAME_SAMPLES {
				let word = self.read(GP_MIX_BUFFER + ((bin * FRAME_SAMPLES + position) * 4) as u32);
				let sample = (word << 8).cast_signed() >> 8;
				*peak = (*peak).max(sample.unsigned_abs());
			}
		}
		peaks
	}

	/// Acknowledge a front-end trap and complete the notifier the driver waits on.
	fn handle_interrupt(&mut self) -> Result<()> {
		let status = self.read(registers::ISTS);
		let idle_voice = self.read(registers::FEDECPARAM);
		info!("interrupt: status {:#x}, voice {} went idle", status, idle_voice);
		self.write(registers::FEMEMADDR, NOTIFIER)?;
		self.write(registers::FEMEMDATA, idle_voice)?;
		self.last_idle_voice = Some(idle_voice);
		self.write(registers::FECTL, 0)?;
		self.write(registers::ISTS, Interrupts::FRONT_END_TRAP.bits())
	}
}

#[allow(clippy::cast_precision_loss)]
fn main() -> Result<()> {
	human_panic::setup_panic!(human_panic::metadata!());

	let arguments = CliArguments::parse();
	let log_level = match arguments.verbose {
		0 => LevelFilter::Warn,
		1 => LevelFilter::Info,
		2 => LevelFilter::Debug,
		3 .. => LevelFilter::Trace,
	};
	simple_logger::SimpleLogger::new()
		.with_level(log_level)
		.with_local_timestamps()
		.with_timestamp_format(format_description!(version = 2, "[hour]:[minute]:[second]"))
		.init()?;

	let config =
		ApuConfig { gp_step_budget: arguments.gp_budget, ep_step_budget: arguments.ep_budget, ..ApuConfig::default() };
	let mut machine = Machine {
		apu:              SharedApu::new(Apu::inert(config)),
		memory:           Ram::new(MEMORY_SIZE),
		host:             ManualHost::new(),
		next_page:        SAMPLE_MEMORY_END,
		next_linear_page: 0,
		last_idle_voice:  None,
	};

	machine.write(registers::VPVADDR, VOICE_TABLE)?;
	machine.write(registers::VPSGEADDR, SGE_TABLE)?;
	machine.write(registers::FETFORCE1, registers::FETFORCE1_IDLE_VOICE)?;
	machine.write(registers::IEN, (Interrupts::GLOBAL | Interrupts::FRONT_END_TRAP).bits())?;
	for handle in 0 .. arguments.voices {
		machine.start_voice(handle, &arguments)?;
	}
	machine.write(GP_RESET, 0b11)?;
	machine.write(EP_RESET, 0b11)?;
	machine.write(registers::SECTL, 1 << 3)?;

	let start_time = Instant::now();
	let mut peaks = [0; BIN_COUNT];
	let mut frames = 0;
	while frames < arguments.frames {
		if !machine.host.take_frame() {
			warn!("frame timer is not armed, stopping");
			break;
		}
		machine.apu.frame(&mut machine.memory, &mut machine.host)?;
		frames += 1;

		let frame_peaks = machine.mix_buffer_peaks();
		debug!("frame {}: peaks {:?}", frames, frame_peaks);
		for (peak, frame_peak) in peaks.iter_mut().zip(frame_peaks) {
			*peak = (*peak).max(frame_peak);
		}
		if machine.host.irq {
			machine.handle_interrupt()?;
		}
	}
	let elapsed = start_time.elapsed();

	let active = (0 .. arguments.voices)
		.filter_map(|handle| Voice::locate(VOICE_TABLE, handle.into()).ok())
		.filter(|voice| voice.is_active(&machine.memory))
		.count();
	info!(
		"Ran {} frames in {:.2?}, {:.1} µs per frame, virtual time {} ms",
		frames,
		elapsed,
		elapsed.as_secs_f64() * 1e6 / frames.max(1) as f64,
		machine.host.now_ns / 1_000_000
	);
	println!("{active} of {} voices still active after {frames} frames", arguments.voices);
	for (bin, peak) in peaks.iter().enumerate().filter(|(_, peak)| **peak != 0) {
		println!("bin {bin:2}: peak {peak:#08x}");
	}
	if let Some(voice) = machine.last_idle_voice {
		println!("last idle notification for voice {voice}, notifier holds {}", machine.memory.read_u32(NOTIFIER));
	}

	Ok(())
}
