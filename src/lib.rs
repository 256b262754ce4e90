//! Device model of the MCPX audio processing unit.
//!
//! The APU plays voices: sample buffers in guest memory described by 128-byte voice records and linked into three
//! voice lists. Once per frame the voice processor walks the lists, steps every voice's envelopes, decodes its
//! samples through the voice scatter-gather table and mixes them into 32 channel bins. The bins are handed to the
//! global DSP, and both DSP cores then run for a bounded number of instructions. Guests control all of this through
//! MMIO: a global register block, a command port that takes front-end methods and one register block per DSP core.
//!
//! The crate does not interpret DSP56300 code and owns neither guest memory nor timers. Those are supplied by the
//! embedding emulator through [`DspCore`], [`GuestMemory`] and [`Host`].

#![allow(clippy::module_name_repetitions)]

#[macro_use] mod log;

pub mod adpcm;
pub mod apu;
pub mod dsp;
pub mod envelope;
pub mod error;
pub mod field;
pub mod frontend;
pub mod host;
pub mod memory;
pub mod mixer;
pub mod registers;
pub mod sge;
pub mod sync;
pub mod voice;

pub use apu::{Apu, ApuConfig};
pub use dsp::{DspCore, DspMemory, InertCore, MemorySpace, ScratchIo};
pub use error::ApuError;
pub use host::{Host, ManualHost};
pub use memory::{GuestMemory, Ram};
pub use sync::SharedApu;
