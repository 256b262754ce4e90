//! Serialized access to one APU from several host threads.
//!
//! Voice lists and the register file are not consistent in the middle of a frame or a method, so an MMIO access must
//! never interleave with a frame. [`SharedApu`] holds the device behind one lock that every operation takes for its
//! whole duration.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::apu::Apu;
use crate::dsp::DspCore;
use crate::error::ApuError;
use crate::host::Host;
use crate::memory::GuestMemory;

/// A cloneable handle to an APU shared between threads.
#[derive(Debug)]
pub struct SharedApu<C: DspCore> {
	inner: Arc<Mutex<Apu<C>>>,
}

impl<C: DspCore> Clone for SharedApu<C> {
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone() }
	}
}

impl<C: DspCore> SharedApu<C> {
	#[must_use]
	pub fn new(apu: Apu<C>) -> Self {
		Self { inner: Arc::new(Mutex::new(apu)) }
	}

	/// See [`Apu::read`].
	#[must_use]
	pub fn read(&self, address: u32, host: &impl Host) -> u32 {
		self.inner.lock().read(address, host)
	}

	/// See [`Apu::write`].
	///
	/// # Errors
	/// As [`Apu::write`].
	pub fn write(
		&self,
		address: u32,
		value: u32,
		memory: &mut impl GuestMemory,
		host: &mut impl Host,
	) -> Result<(), ApuError> {
		self.inner.lock().write(address, value, memory, host)
	}

	/// See [`Apu::frame`].
	///
	/// # Errors
	/// As [`Apu::frame`].
	pub fn frame(&self, memory: &mut impl GuestMemory, host: &mut impl Host) -> Result<(), ApuError> {
		self.inner.lock().frame(memory, host)
	}

	/// Lock the device for a sequence of operations that must not be interleaved with others.
	pub fn lock(&self) -> MutexGuard<'_, Apu<C>> {
		self.inner.lock()
	}
}
