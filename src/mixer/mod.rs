//! The voice processor: walks the voice lists once per frame, renders every active voice and mixes the results into
//! the channel bins.
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap, clippy::cast_precision_loss)]

use log::warn;

use crate::adpcm::{self, BlockSamples};
use crate::envelope::Envelope;
use crate::error::ApuError;
use crate::frontend::{FrontEnd, method};
use crate::host::Host;
use crate::memory::GuestMemory;
use crate::registers::{Registers, VoiceList};
use crate::sge::ScatterGather;
use crate::trace;
use crate::voice::{self, ContainerSize, LIST_END, SampleFormat, SampleSize, Voice};


/// Samples per bin and frame.
pub const FRAME_SAMPLES: usize = 32;
/// Number of channel bins.
pub const BIN_COUNT: usize = 32;
/// One frame of mixed output, indexed by bin and then sample.
pub type MixBuffer = [[i32; FRAME_SAMPLES]; BIN_COUNT];

/// Volume value of a silent slot; volumes are attenuations.
const VOLUME_MAX: i64 = 0xFFF;
/// A list can visit each handle at most once; anything longer contains a cycle.
const MAX_LIST_LENGTH: usize = LIST_END as usize;

/// Render all voice lists into a fresh mix buffer.
///
/// Inactive voices are reported to the front end as idle and otherwise skipped.
///
/// # Errors
/// Any fatal condition of a voice: bad handles, envelope states or sample formats, or sample data outside the
/// scatter-gather table.
pub fn process_voices(
	registers: &mut Registers,
	front_end: &mut FrontEnd,
	memory: &mut impl GuestMemory,
	host: &mut impl Host,
) -> Result<MixBuffer, ApuError> {
	let mut mix = [[0; FRAME_SAMPLES]; BIN_COUNT];
	for list in VoiceList::ALL {
		walk_list(list, registers, front_end, memory, host, &mut mix)?;
	}
	Ok(mix)
}

fn walk_list(
	list: VoiceList,
	registers: &mut Registers,
	front_end: &mut FrontEnd,
	memory: &mut impl GuestMemory,
	host: &mut impl Host,
	mix: &mut MixBuffer,
) -> Result<(), ApuError> {
	let top = registers.voice_list(list).top;
	registers.voice_list_mut(list).current = top;

	let mut visited = 0;
	while registers.voice_list(list).current != u32::from(LIST_END) {
		if visited == MAX_LIST_LENGTH {
			warn!("{:?} voice list does not terminate, stopping after {} voices", list, visited);
			break;
		}
		visited += 1;

		let voice = Voice::locate(registers.voice_table, registers.voice_list(list).current)?;
		registers.voice_list_mut(list).next = voice.next(memory).into();

		if voice.is_active(memory) {
			render_voice(voice, ScatterGather::unbounded(registers.voice_sge_table), memory, mix)?;
		} else {
			trace!("voice {:04x} is idle", voice.handle());
			front_end.execute(registers, memory, host, method::SE2FE_IDLE_VOICE, voice.handle().into())?;
		}

		let next = registers.voice_list(list).next;
		registers.voice_list_mut(list).current = next;
	}
	Ok(())
}

/// Resampling rate for a pitch in 1/4096 octaves, modulated by the filter envelope.
#[must_use]
pub fn resample_rate(pitch: i16, pitch_scale: i8, filter_envelope: f32) -> f32 {
	let modulation = f32::from(pitch_scale) * 32.0 * filter_envelope;
	((f32::from(pitch) + modulation) / 4096.0).exp2()
}

/// Step one active voice through a frame and mix it into `mix`.
fn render_voice(
	voice: Voice,
	sge: ScatterGather,
	memory: &mut impl GuestMemory,
	mix: &mut MixBuffer,
) -> Result<(), ApuError> {
	let amplitude = Envelope::AMPLITUDE.step(memory, voice)?;
	let filter = Envelope::FILTER.step(memory, voice)?;

	let format = voice.format(memory);
	let mut source = SampleSource::new(voice, format, voice.get(memory, voice::BASE_ADDRESS), sge)?;
	let rate = resample_rate(voice.pitch(memory), voice.pitch_scale(memory), filter);
	let paused = voice.is_paused(memory);
	let end = voice.get(memory, voice::END_OFFSET);
	let loop_start = voice.get(memory, voice::LOOP_OFFSET).min(end);
	let mut current = voice.get(memory, voice::CURRENT_OFFSET);
	trace!(
		"voice {:04x}: {:?} rate {} cbo {:x} lbo {:x} ebo {:x} ea {} ef {}",
		voice.handle(),
		format,
		rate,
		current,
		loop_start,
		end,
		amplitude,
		filter
	);

	voice.set(memory, voice::NEW_VOICE, 0);

	let mut samples = [[0; FRAME_SAMPLES]; 2];
	let mut ended = false;
	if !paused {
		for index in 0 .. FRAME_SAMPLES {
			let step = (index as f32 * rate) as u32;
			let mut position = current.wrapping_add(step);
			if position > end {
				if !format.looping {
					// The rest of the frame stays silent.
					current = end;
					voice.set_active(memory, false);
					ended = true;
					break;
				}
				position = wrap_into_loop(position, loop_start, end);
				current = position.wrapping_sub(step);
			}
			let frame = source.fetch(memory, position)?;
			for (channel, value) in samples.iter_mut().zip(frame) {
				channel[index] = value;
			}
		}
	}

	for channel in &mut samples {
		for sample in channel.iter_mut() {
			*sample = (f64::from(*sample) * f64::from(amplitude)) as i32;
		}
	}

	let channels = format.channels();
	for (slot, (bin, volume)) in voice.bins(memory).into_iter().zip(voice.volumes(memory)).enumerate() {
		let gain = VOLUME_MAX - i64::from(volume);
		for (mixed, sample) in mix[bin].iter_mut().zip(samples[slot % channels]) {
			*mixed = mixed.wrapping_add((gain * i64::from(sample) / VOLUME_MAX) as i32);
		}
	}

	if !paused && !ended {
		current = current.wrapping_add((FRAME_SAMPLES as f32 * rate) as u32);
		if format.looping && current > end {
			current = wrap_into_loop(current, loop_start, end);
		}
	}
	voice.set(memory, voice::CURRENT_OFFSET, current);
	Ok(())
}

/// Map a position past the end of a loop back into `loop_start ..= end`.
const fn wrap_into_loop(position: u32, loop_start: u32, end: u32) -> u32 {
	loop_start + (position - loop_start) % (end - loop_start + 1)
}

/// Sample data of one voice for one frame.
struct SampleSource {
	handle:      u16,
	format:      SampleFormat,
	base:        u32,
	sge:         ScatterGather,
	/// Index and samples of the last decoded ADPCM block.
	adpcm_block: Option<(u32, [BlockSamples; 2])>,
}

impl SampleSource {
	/// Check that the format can be rendered.
	fn new(voice: Voice, format: SampleFormat, base: u32, sge: ScatterGather) -> Result<Self, ApuError> {
		let handle = voice.handle();
		if format.stream {
			return Err(ApuError::StreamVoice { handle });
		}
		if format.container_size == ContainerSize::Adpcm {
			if format.sample_size != SampleSize::S24 {
				return Err(ApuError::UnsupportedSampleFormat {
					handle,
					reason: "ADPCM containers need 24-bit samples",
				});
			}
			if format.samples_per_block != format.channels() as u32 {
				return Err(ApuError::UnsupportedSampleFormat {
					handle,
					reason: "ADPCM blocks hold one sample per channel",
				});
			}
		}
		Ok(Self { handle, format, base, sge, adpcm_block: None })
	}

	/// The samples of every channel at `position`; unused channels are 0.
	fn fetch(&mut self, memory: &impl GuestMemory, position: u32) -> Result<[i32; 2], ApuError> {
		match self.format.container_size.bytes() {
			Some(container) => self.fetch_pcm(memory, position, container),
			None => self.fetch_adpcm(memory, position),
		}
	}

	fn fetch_pcm(&self, memory: &impl GuestMemory, position: u32, container: u32) -> Result<[i32; 2], ApuError> {
		let stride = container * self.format.samples_per_block;
		let address = self.base.wrapping_add(position.wrapping_mul(stride));
		let mut frame = [0; 2];
		for (channel, sample) in frame.iter_mut().take(self.format.channels()).enumerate() {
			let mut bytes = [0; 4];
			let width = match self.format.sample_size {
				SampleSize::U8 => 1,
				SampleSize::S16 => 2,
				SampleSize::S24 | SampleSize::S32 => 4,
			};
			self.sge.read(memory, address.wrapping_add(channel as u32 * container), &mut bytes[.. width])?;
			*sample = match self.format.sample_size {
				SampleSize::U8 => i32::from(bytes[0]),
				SampleSize::S16 => i32::from(i16::from_le_bytes([bytes[0], bytes[1]])),
				SampleSize::S24 => (u32::from_le_bytes(bytes) << 8) as i32 >> 8,
				SampleSize::S32 => i32::from_le_bytes(bytes),
			};
		}
		Ok(frame)
	}

	fn fetch_adpcm(&mut self, memory: &impl GuestMemory, position: u32) -> Result<[i32; 2], ApuError> {
		let block_index = position / adpcm::BLOCK_SAMPLES as u32;
		let offset = position as usize % adpcm::BLOCK_SAMPLES;

		let blocks = match self.adpcm_block {
			Some((cached, blocks)) if cached == block_index => blocks,
			_ => {
				let blocks = self.decode_block(memory, block_index)?;
				trace!("voice {:04x} decoded ADPCM block {}", self.handle, block_index);
				self.adpcm_block = Some((block_index, blocks));
				blocks
			},
		};
		Ok([i32::from(blocks[0][offset]), i32::from(blocks[1][offset])])
	}

	fn decode_block(&self, memory: &impl GuestMemory, block_index: u32) -> Result<[BlockSamples; 2], ApuError> {
		if self.format.stereo {
			let mut block = [0; adpcm::STEREO_BLOCK_SIZE];
			let address = self.base.wrapping_add(block_index.wrapping_mul(adpcm::STEREO_BLOCK_SIZE as u32));
			self.sge.read(memory, address, &mut block)?;
			Ok(adpcm::decode_stereo(&block))
		} else {
			let mut block = [0; adpcm::MONO_BLOCK_SIZE];
			let address = self.base.wrapping_add(block_index.wrapping_mul(adpcm::MONO_BLOCK_SIZE as u32));
			self.sge.read(memory, address, &mut block)?;
			Ok([adpcm::decode_mono(&block), [0; adpcm::BLOCK_SAMPLES]])
		}
	}
}
