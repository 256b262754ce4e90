//! Envelope generators.
//!
//! Every voice has two identical generators: the amplitude envelope (EA) scales the samples, the filter envelope
//! (EF) modulates pitch. They differ only in where their configuration and state live in the voice record, which is
//! what [`Envelope`] describes. A generator advances once per frame; all rates and times count in units of 16 frames.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::error::ApuError;
use crate::field::Field;
use crate::memory::GuestMemory;
use crate::trace;
use crate::voice::{self, Voice};


/// Per-frame decay factor of the exponential decay phase.
const DECAY_BASE: f32 = 0.999_887_99;
/// Maximum envelope level.
pub const MAX_LEVEL: u32 = 0xFF;

/// Phase of an envelope generator.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, FromPrimitive)]
#[repr(u8)]
pub enum EnvelopeState {
	#[default]
	Off = 0,
	Delay = 1,
	Attack = 2,
	Hold = 3,
	Decay = 4,
	Sustain = 5,
	Release = 6,
	ForceRelease = 7,
}

/// Location of one envelope generator inside the voice record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Envelope {
	pub delay_time:    Field,
	pub attack_rate:   Field,
	pub hold_time:     Field,
	pub decay_rate:    Field,
	pub sustain_level: Field,
	pub release_rate:  Field,
	/// Last output level, 0 to 255.
	pub level:         Field,
	/// Phase counter.
	pub count:         Field,
	pub state:         Field,
}

impl Envelope {
	/// The amplitude envelope.
	pub const AMPLITUDE: Self = Self {
		delay_time:    voice::EA_DELAYTIME,
		attack_rate:   voice::EA_ATTACKRATE,
		hold_time:     voice::EA_HOLDTIME,
		decay_rate:    voice::EA_DECAYRATE,
		sustain_level: voice::EA_SUSTAINLEVEL,
		release_rate:  voice::EA_RELEASERATE,
		level:         voice::EA_LEVEL,
		count:         voice::EA_COUNT,
		state:         voice::EA_STATE,
	};
	/// The filter envelope.
	pub const FILTER: Self = Self {
		delay_time:    voice::EF_DELAYTIME,
		attack_rate:   voice::EF_ATTACKRATE,
		hold_time:     voice::EF_HOLDTIME,
		decay_rate:    voice::EF_DECAYRATE,
		sustain_level: voice::EF_SUSTAINLEVEL,
		release_rate:  voice::EF_RELEASERATE,
		level:         voice::EF_LEVEL,
		count:         voice::EF_COUNT,
		state:         voice::EF_STATE,
	};

	/// The generator's current phase.
	///
	/// # Errors
	/// If the state field holds a value that is no phase.
	pub fn state(&self, memory: &impl GuestMemory, voice: Voice) -> Result<EnvelopeState, ApuError> {
		let state = voice.get(memory, self.state);
		EnvelopeState::from_u32(state).ok_or(ApuError::UnknownEnvelopeState { handle: voice.handle(), state })
	}

	pub fn set_state(&self, memory: &mut impl GuestMemory, voice: Voice, state: EnvelopeState) {
		voice.set(memory, self.state, state as u32);
	}

	/// Enter the release phase from wherever the generator is, keeping the current level as the release start.
	pub fn release(&self, memory: &mut impl GuestMemory, voice: Voice) {
		let rate = voice.get(memory, self.release_rate);
		voice.set(memory, self.count, rate * 16);
		self.set_state(memory, voice, EnvelopeState::Release);
	}

	/// Advance the generator by one frame and return its output normalized to 0.0 ..= 1.0.
	///
	/// A counter that reaches zero ends its phase even when the configured time or rate is zero, so no phase waits
	/// for a counter to wrap around.
	///
	/// # Errors
	/// If the state field is corrupt or the generator is in the force-release phase.
	pub fn step(&self, memory: &mut impl GuestMemory, voice: Voice) -> Result<f32, ApuError> {
		let state = self.state(memory, voice)?;
		let mut count = voice.get(memory, self.count);
		trace!("voice {:04x} envelope {:?} count {}", voice.handle(), state, count);

		let output = match state {
			EnvelopeState::Off => {
				count = 0;
				voice.set(memory, self.level, MAX_LEVEL);
				1.0
			},
			EnvelopeState::Delay => {
				count = count.saturating_sub(1);
				voice.set(memory, self.level, 0);
				if count == 0 {
					self.set_state(memory, voice, EnvelopeState::Attack);
				}
				0.0
			},
			EnvelopeState::Attack => {
				count += 1;
				let rate = voice.get(memory, self.attack_rate);
				let level = if count <= rate { count * MAX_LEVEL / rate } else { MAX_LEVEL };
				voice.set(memory, self.level, level);
				if count >= rate * 16 {
					self.set_state(memory, voice, EnvelopeState::Hold);
					count = voice.get(memory, self.hold_time) * 16;
				}
				level as f32 / MAX_LEVEL as f32
			},
			EnvelopeState::Hold => {
				count = count.saturating_sub(1);
				voice.set(memory, self.level, MAX_LEVEL);
				if count == 0 {
					self.set_state(memory, voice, EnvelopeState::Decay);
					count = voice.get(memory, self.decay_rate) * 16;
				}
				1.0
			},
			EnvelopeState::Decay => {
				count = count.saturating_sub(1);
				let rate = voice.get(memory, self.decay_rate);
				let sustain = voice.get(memory, self.sustain_level);
				let value = if rate == 0 {
					sustain as f32
				} else {
					let elapsed = (i64::from(rate) * 16 - i64::from(count)) * 4096 / i64::from(rate);
					MAX_LEVEL as f32 * DECAY_BASE.powf(elapsed as f32)
				};
				if value <= sustain as f32 + 0.2 || value > MAX_LEVEL as f32 {
					self.set_state(memory, voice, EnvelopeState::Sustain);
				}
				let value = value.clamp(0.0, MAX_LEVEL as f32);
				voice.set(memory, self.level, value as u32);
				value / MAX_LEVEL as f32
			},
			EnvelopeState::Sustain => {
				count = 0;
				let sustain = voice.get(memory, self.sustain_level);
				voice.set(memory, self.level, sustain);
				sustain as f32 / MAX_LEVEL as f32
			},
			EnvelopeState::Release => {
				count = count.saturating_sub(1);
				let rate = voice.get(memory, self.release_rate);
				let level = voice.get(memory, self.level);
				let value = if rate == 0 { 0 } else { count * level / (rate * 16) };
				if count == 0 {
					voice.set_active(memory, false);
					self.set_state(memory, voice, EnvelopeState::Off);
				}
				value as f32 / MAX_LEVEL as f32
			},
			EnvelopeState::ForceRelease => return Err(ApuError::ForceReleaseEnvelope { handle: voice.handle() }),
		};

		voice.set(memory, self.count, count);
		Ok(output)
	}
}
