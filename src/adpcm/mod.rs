//! IMA ADPCM block decoding.
//!
//! Voices with ADPCM containers store 65 samples per channel and block. A channel block starts with a 4-byte header
//! (signed 16-bit predictor, step index, reserved byte) which is also the first sample; the remaining 64 samples
//! are 4-bit codes, low nibble first. Stereo blocks carry both headers up front and then alternate 4-byte chunks of
//! left and right codes.


/// Decoded samples per channel and block.
pub const BLOCK_SAMPLES: usize = 65;
/// Encoded size of a mono block.
pub const MONO_BLOCK_SIZE: usize = 36;
/// Encoded size of a stereo block.
pub const STEREO_BLOCK_SIZE: usize = 72;

const HEADER_SIZE: usize = 4;
const CHUNK_SIZE: usize = 4;

/// Decoded samples of one channel block.
pub type BlockSamples = [i16; BLOCK_SAMPLES];

const INDEX_TABLE: [i8; 16] = [-1, -1, -1, -1, 2, 4, 6, 8, -1, -1, -1, -1, 2, 4, 6, 8];

#[rustfmt::skip]
const STEP_TABLE: [i32; 89] = [
	7, 8, 9, 10, 11, 12, 13, 14, 16, 17,
	19, 21, 23, 25, 28, 31, 34, 37, 41, 45,
	50, 55, 60, 66, 73, 80, 88, 97, 107, 118,
	130, 143, 157, 173, 190, 209, 230, 253, 279, 307,
	337, 371, 408, 449, 494, 544, 598, 658, 724, 796,
	876, 963, 1060, 1166, 1282, 1411, 1552, 1707, 1878, 2066,
	2272, 2499, 2749, 3024, 3327, 3660, 4026, 4428, 4871, 5358,
	5894, 6484, 7132, 7845, 8630, 9493, 10442, 11487, 12635, 13899,
	15289, 16818, 18500, 20350, 22385, 24623, 27086, 29794, 32767,
];

/// Predictor state of one channel.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct Channel {
	predictor:  i32,
	step_index: usize,
}

impl Channel {
	fn from_header(header: &[u8]) -> Self {
		Self {
			predictor:  i32::from(i16::from_le_bytes([header[0], header[1]])),
			step_index: usize::from(header[2]).min(STEP_TABLE.len() - 1),
		}
	}

	fn decode(&mut self, code: u8) -> i16 {
		let step = STEP_TABLE[self.step_index];
		let mut difference = step >> 3;
		if code & 4 != 0 {
			difference += step;
		}
		if code & 2 != 0 {
			difference += step >> 1;
		}
		if code & 1 != 0 {
			difference += step >> 2;
		}
		if code & 8 != 0 {
			self.predictor -= difference;
		} else {
			self.predictor += difference;
		}
		self.predictor = self.predictor.clamp(i32::from(i16::MIN), i32::from(i16::MAX));
		self.step_index = self
			.step_index
			.saturating_add_signed(isize::from(INDEX_TABLE[usize::from(code & 0xF)]))
			.min(STEP_TABLE.len() - 1);
		self.predictor as i16
	}

	/// Decode all codes of `data` into `samples`, low nibble first.
	fn decode_into(&mut self, data: &[u8], samples: &mut [i16]) {
		for (byte, pair) in data.iter().zip(samples.chunks_exact_mut(2)) {
			pair[0] = self.decode(byte & 0xF);
			pair[1] = self.decode(byte >> 4);
		}
	}
}

/// Decode a mono block.
#[must_use]
pub fn decode_mono(block: &[u8; MONO_BLOCK_SIZE]) -> BlockSamples {
	let mut samples = [0; BLOCK_SAMPLES];
	let mut channel = Channel::from_header(&block[.. HEADER_SIZE]);
	samples[0] = channel.predictor as i16;
	channel.decode_into(&block[HEADER_SIZE ..], &mut samples[1 ..]);
	samples
}

/// Decode a stereo block into its left and right channels.
#[must_use]
pub fn decode_stereo(block: &[u8; STEREO_BLOCK_SIZE]) -> [BlockSamples; 2] {
	let mut samples = [[0; BLOCK_SAMPLES]; 2];
	let mut channels = [
		Channel::from_header(&block[.. HEADER_SIZE]),
		Channel::from_header(&block[HEADER_SIZE .. 2 * HEADER_SIZE]),
	];
	for (channel, output) in channels.iter().zip(samples.iter_mut()) {
		output[0] = channel.predictor as i16;
	}

	// Each pair of chunks holds 8 codes for the left, then 8 for the right channel.
	let data = &block[2 * HEADER_SIZE ..];
	for (index, chunk) in data.chunks_exact(CHUNK_SIZE).enumerate() {
		let side = index % 2;
		let first_sample = 1 + (index / 2) * CHUNK_SIZE * 2;
		channels[side].decode_into(chunk, &mut samples[side][first_sample .. first_sample + CHUNK_SIZE * 2]);
	}
	samples
}
