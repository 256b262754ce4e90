//! Voice records: 128-byte descriptors of one playing sound, kept in guest memory.
//!
//! The device only ever touches voices through [`Voice`], which knows the record address and applies the
//! [`Field`]s below. The field layout is fixed by hardware.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::error::ApuError;
use crate::field::Field;
use crate::memory::GuestMemory;

/// Handle value that terminates a voice list.
pub const LIST_END: u16 = 0xFFFF;
/// Size of one voice record.
pub const VOICE_SIZE: u32 = 0x80;
/// Number of mix bins a voice can send to.
pub const VOICE_BINS: usize = 8;

// Byte offsets of the record words.
pub const CFG_VBIN: u32 = 0x00;
pub const CFG_FMT: u32 = 0x04;
pub const CFG_ENV0: u32 = 0x08;
pub const CFG_ENVA: u32 = 0x0C;
pub const CFG_ENV1: u32 = 0x10;
pub const CFG_ENVF: u32 = 0x14;
pub const CFG_MISC: u32 = 0x18;
pub const CUR_PSL_START: u32 = 0x20;
pub const CUR_PSH_SAMPLE: u32 = 0x24;
pub const CUR_ECNT: u32 = 0x34;
pub const PAR_STATE: u32 = 0x54;
pub const PAR_OFFSET: u32 = 0x58;
pub const PAR_NEXT: u32 = 0x5C;
pub const TAR_VOLA: u32 = 0x60;
pub const TAR_VOLB: u32 = 0x64;
pub const TAR_VOLC: u32 = 0x68;
pub const TAR_LFO_ENV: u32 = 0x6C;
pub const TAR_PITCH_LINK: u32 = 0x7C;

/// Bins of volume slots 0 to 5 in `CFG_VBIN`.
pub const VBIN: [Field; 6] = [
	Field::new(CFG_VBIN, 0x1F),
	Field::new(CFG_VBIN, 0x1F << 5),
	Field::new(CFG_VBIN, 0x1F << 10),
	Field::new(CFG_VBIN, 0x1F << 16),
	Field::new(CFG_VBIN, 0x1F << 21),
	Field::new(CFG_VBIN, 0x1F << 26),
];
/// Bins of volume slots 6 and 7 live in the format word.
pub const V6BIN: Field = Field::new(CFG_FMT, 0x1F);
pub const V7BIN: Field = Field::new(CFG_FMT, 0x1F << 5);
pub const FORMAT: Field = Field::word(CFG_FMT);

pub const EA_ATTACKRATE: Field = Field::new(CFG_ENV0, 0xFFF);
pub const EA_DELAYTIME: Field = Field::new(CFG_ENV0, 0xFFF << 12);
/// Signed pitch modulation depth of the filter envelope.
pub const EF_PITCHSCALE: Field = Field::new(CFG_ENV0, 0xFF << 24);
pub const EA_DECAYRATE: Field = Field::new(CFG_ENVA, 0xFFF);
pub const EA_HOLDTIME: Field = Field::new(CFG_ENVA, 0xFFF << 12);
pub const EA_SUSTAINLEVEL: Field = Field::new(CFG_ENVA, 0xFF << 24);
pub const EF_ATTACKRATE: Field = Field::new(CFG_ENV1, 0xFFF);
pub const EF_DELAYTIME: Field = Field::new(CFG_ENV1, 0xFFF << 12);
pub const EF_FCSCALE: Field = Field::new(CFG_ENV1, 0xFF << 24);
pub const EF_DECAYRATE: Field = Field::new(CFG_ENVF, 0xFFF);
pub const EF_HOLDTIME: Field = Field::new(CFG_ENVF, 0xFFF << 12);
pub const EF_SUSTAINLEVEL: Field = Field::new(CFG_ENVF, 0xFF << 24);
pub const EF_RELEASERATE: Field = Field::new(CFG_MISC, 0xFFF);
pub const EA_RELEASERATE: Field = Field::new(TAR_LFO_ENV, 0xFFF);

/// Base offset of the sample buffer.
pub const BASE_ADDRESS: Field = Field::new(CUR_PSL_START, 0x00FF_FFFF);
/// Loop begin offset, in samples.
pub const LOOP_OFFSET: Field = Field::new(CUR_PSH_SAMPLE, 0x00FF_FFFF);
/// Current offset, in samples.
pub const CURRENT_OFFSET: Field = Field::new(PAR_OFFSET, 0x00FF_FFFF);
/// End offset, in samples.
pub const END_OFFSET: Field = Field::new(PAR_NEXT, 0x00FF_FFFF);

pub const EA_COUNT: Field = Field::new(CUR_ECNT, 0xFFFF);
pub const EF_COUNT: Field = Field::new(CUR_ECNT, 0xFFFF_0000);
pub const EA_LEVEL: Field = Field::new(PAR_OFFSET, 0xFF << 24);
pub const EF_LEVEL: Field = Field::new(PAR_NEXT, 0xFF << 24);

pub const PAUSED: Field = Field::new(PAR_STATE, 1 << 18);
pub const NEW_VOICE: Field = Field::new(PAR_STATE, 1 << 20);
pub const ACTIVE: Field = Field::new(PAR_STATE, 1 << 21);
pub const EF_STATE: Field = Field::new(PAR_STATE, 0xF << 24);
pub const EA_STATE: Field = Field::new(PAR_STATE, 0xF << 28);

/// The 12-bit attenuations of slots 0 to 5, two per target volume word.
pub const VOLUME: [Field; 6] = [
	Field::new(TAR_VOLA, 0xFFF0),
	Field::new(TAR_VOLA, 0xFFF0_0000),
	Field::new(TAR_VOLB, 0xFFF0),
	Field::new(TAR_VOLB, 0xFFF0_0000),
	Field::new(TAR_VOLC, 0xFFF0),
	Field::new(TAR_VOLC, 0xFFF0_0000),
];
/// Slots 6 and 7 are split into nibbles over the three target volume words, lowest nibble in `TAR_VOLA`.
pub const VOLUME6_NIBBLES: [Field; 3] =
	[Field::new(TAR_VOLA, 0xF), Field::new(TAR_VOLB, 0xF), Field::new(TAR_VOLC, 0xF)];
pub const VOLUME7_NIBBLES: [Field; 3] =
	[Field::new(TAR_VOLA, 0xF_0000), Field::new(TAR_VOLB, 0xF_0000), Field::new(TAR_VOLC, 0xF_0000)];

pub const NEXT_VOICE_HANDLE: Field = Field::new(TAR_PITCH_LINK, 0xFFFF);
/// Signed pitch in 1/4096 octaves.
pub const PITCH: Field = Field::new(TAR_PITCH_LINK, 0xFFFF_0000);

/// Width of one sample value.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u8)]
pub enum SampleSize {
	U8 = 0,
	S16 = 1,
	S24 = 2,
	S32 = 3,
}

/// Storage container of one sample.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u8)]
pub enum ContainerSize {
	B8 = 0,
	B16 = 1,
	Adpcm = 2,
	B32 = 3,
}

impl ContainerSize {
	/// Bytes per sample of a PCM container.
	#[must_use]
	pub const fn bytes(self) -> Option<u32> {
		match self {
			Self::B8 => Some(1),
			Self::B16 => Some(2),
			Self::B32 => Some(4),
			Self::Adpcm => None,
		}
	}
}

/// The decoded format word of a voice.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SampleFormat {
	pub sample_size:       SampleSize,
	pub container_size:    ContainerSize,
	pub stereo:            bool,
	pub looping:           bool,
	/// Stream voices are fed by the front end instead of a sample buffer.
	pub stream:            bool,
	/// Stored value plus one.
	pub samples_per_block: u32,
}

impl SampleFormat {
	const SAMPLES_PER_BLOCK: Field = Field::new(0, 0x1F << 16);
	const STREAM: Field = Field::new(0, 1 << 24);
	const LOOP: Field = Field::new(0, 1 << 25);
	const STEREO: Field = Field::new(0, 1 << 27);
	const SAMPLE_SIZE: Field = Field::new(0, 3 << 28);
	const CONTAINER_SIZE: Field = Field::new(0, 3 << 30);

	/// Decode a format word.
	#[must_use]
	pub fn decode(word: u32) -> Self {
		Self {
			// Two-bit fields cover every enum value.
			sample_size:       SampleSize::from_u32(Self::SAMPLE_SIZE.extract(word)).unwrap_or(SampleSize::U8),
			container_size:    ContainerSize::from_u32(Self::CONTAINER_SIZE.extract(word)).unwrap_or(ContainerSize::B8),
			stereo:            Self::STEREO.extract(word) != 0,
			looping:           Self::LOOP.extract(word) != 0,
			stream:            Self::STREAM.extract(word) != 0,
			samples_per_block: Self::SAMPLES_PER_BLOCK.extract(word) + 1,
		}
	}

	/// Encode into a format word, leaving the bin bits clear.
	#[must_use]
	pub fn encode(self) -> u32 {
		let mut word = 0;
		word = Self::SAMPLE_SIZE.insert(word, self.sample_size as u32);
		word = Self::CONTAINER_SIZE.insert(word, self.container_size as u32);
		word = Self::STEREO.insert(word, u32::from(self.stereo));
		word = Self::LOOP.insert(word, u32::from(self.looping));
		word = Self::STREAM.insert(word, u32::from(self.stream));
		Self::SAMPLES_PER_BLOCK.insert(word, self.samples_per_block.saturating_sub(1))
	}

	#[must_use]
	pub const fn channels(self) -> usize {
		if self.stereo { 2 } else { 1 }
	}
}

/// A voice record in guest memory.
///
/// This is only an address; every accessor goes to guest memory, so the record may be changed by the guest at any
/// time between accesses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Voice {
	handle:  u16,
	address: u32,
}

impl Voice {
	/// Locate the record of `handle` in the voice table at `table_address`.
	///
	/// # Errors
	/// If `handle` is the list terminator or does not fit into 16 bits.
	pub fn locate(table_address: u32, handle: u32) -> Result<Self, ApuError> {
		let handle = u16::try_from(handle)
			.ok()
			.filter(|handle| *handle != LIST_END)
			.ok_or(ApuError::InvalidVoiceHandle { handle })?;
		Ok(Self { handle, address: table_address.wrapping_add(u32::from(handle) * VOICE_SIZE) })
	}

	#[must_use]
	#[inline]
	pub const fn handle(self) -> u16 {
		self.handle
	}

	/// Physical address of the record.
	#[must_use]
	#[inline]
	pub const fn address(self) -> u32 {
		self.address
	}

	#[inline]
	pub fn get(self, memory: &impl GuestMemory, field: Field) -> u32 {
		field.read(memory, self.address)
	}

	#[inline]
	pub fn set(self, memory: &mut impl GuestMemory, field: Field, value: u32) {
		field.write(memory, self.address, value);
	}

	pub fn is_active(self, memory: &impl GuestMemory) -> bool {
		self.get(memory, ACTIVE) != 0
	}

	pub fn set_active(self, memory: &mut impl GuestMemory, active: bool) {
		self.set(memory, ACTIVE, u32::from(active));
	}

	pub fn is_paused(self, memory: &impl GuestMemory) -> bool {
		self.get(memory, PAUSED) != 0
	}

	/// The handle this voice links to; [`LIST_END`] ends the list.
	pub fn next(self, memory: &impl GuestMemory) -> u16 {
		self.get(memory, NEXT_VOICE_HANDLE) as u16
	}

	pub fn set_next(self, memory: &mut impl GuestMemory, next: u16) {
		self.set(memory, NEXT_VOICE_HANDLE, u32::from(next));
	}

	pub fn format(self, memory: &impl GuestMemory) -> SampleFormat {
		SampleFormat::decode(self.get(memory, FORMAT))
	}

	pub fn pitch(self, memory: &impl GuestMemory) -> i16 {
		self.get(memory, PITCH) as u16 as i16
	}

	pub fn pitch_scale(self, memory: &impl GuestMemory) -> i8 {
		self.get(memory, EF_PITCHSCALE) as u8 as i8
	}

	/// Target bins of the eight volume slots.
	pub fn bins(self, memory: &impl GuestMemory) -> [usize; VOICE_BINS] {
		let mut bins = [0; VOICE_BINS];
		for (bin, field) in bins.iter_mut().zip(VBIN) {
			*bin = self.get(memory, field) as usize;
		}
		bins[6] = self.get(memory, V6BIN) as usize;
		bins[7] = self.get(memory, V7BIN) as usize;
		bins
	}

	/// The 12-bit attenuations of the eight volume slots; 0 is full volume.
	pub fn volumes(self, memory: &impl GuestMemory) -> [u32; VOICE_BINS] {
		let mut volumes = [0; VOICE_BINS];
		for (volume, field) in volumes.iter_mut().zip(VOLUME) {
			*volume = self.get(memory, field);
		}
		volumes[6] = Self::assemble_nibbles(memory, self, &VOLUME6_NIBBLES);
		volumes[7] = Self::assemble_nibbles(memory, self, &VOLUME7_NIBBLES);
		volumes
	}

	fn assemble_nibbles(memory: &impl GuestMemory, voice: Self, nibbles: &[Field; 3]) -> u32 {
		nibbles.iter().rev().fold(0, |volume, nibble| (volume << 4) | voice.get(memory, *nibble))
	}
}
