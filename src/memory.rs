//! Guest physical memory as seen by the device.

use crate::trace;

/// Byte-addressed guest physical memory.
///
/// Every structure the device works on (voice records, scatter-gather tables, sample data, DMA scratch space) lives
/// in guest memory; the device never keeps its own copy of any of them. All multi-byte accesses are little-endian.
pub trait GuestMemory {
	/// Read one byte of guest physical memory.
	fn read_u8(&self, address: u32) -> u8;
	/// Write one byte of guest physical memory.
	fn write_u8(&mut self, address: u32, value: u8);

	/// Fill `buffer` with guest memory starting at `address`.
	fn read_bytes(&self, address: u32, buffer: &mut [u8]) {
		let mut current = address;
		for byte in buffer {
			*byte = self.read_u8(current);
			current = current.wrapping_add(1);
		}
	}

	/// Copy `data` into guest memory starting at `address`.
	fn write_bytes(&mut self, address: u32, data: &[u8]) {
		let mut current = address;
		for byte in data {
			self.write_u8(current, *byte);
			current = current.wrapping_add(1);
		}
	}

	#[inline]
	fn read_u16(&self, address: u32) -> u16 {
		let mut bytes = [0; 2];
		self.read_bytes(address, &mut bytes);
		u16::from_le_bytes(bytes)
	}

	#[inline]
	fn read_u32(&self, address: u32) -> u32 {
		let mut bytes = [0; 4];
		self.read_bytes(address, &mut bytes);
		u32::from_le_bytes(bytes)
	}

	#[inline]
	fn write_u16(&mut self, address: u32, value: u16) {
		self.write_bytes(address, &value.to_le_bytes());
	}

	#[inline]
	fn write_u32(&mut self, address: u32, value: u32) {
		self.write_bytes(address, &value.to_le_bytes());
	}
}

/// Flat RAM starting at physical address 0.
///
/// Accesses past the end read as zero and drop writes, like an unpopulated bus.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Ram {
	bytes: Vec<u8>,
}

impl Ram {
	/// Create zeroed RAM of the given size in bytes.
	#[must_use]
	pub fn new(size: usize) -> Self {
		Self { bytes: vec![0; size] }
	}

	/// Size of the RAM in bytes.
	#[must_use]
	#[inline]
	pub fn len(&self) -> usize {
		self.bytes.len()
	}

	/// Whether the RAM has no bytes at all.
	#[must_use]
	#[inline]
	pub fn is_empty(&self) -> bool {
		self.bytes.is_empty()
	}

	/// The raw contents.
	#[must_use]
	pub fn as_slice(&self) -> &[u8] {
		&self.bytes
	}
}

impl GuestMemory for Ram {
	#[inline]
	fn read_u8(&self, address: u32) -> u8 {
		self.bytes.get(address as usize).copied().unwrap_or_else(|| {
			trace!("read from unpopulated address {:08x}", address);
			0
		})
	}

	#[inline]
	fn write_u8(&mut self, address: u32, value: u8) {
		if let Some(byte) = self.bytes.get_mut(address as usize) {
			*byte = value;
		} else {
			trace!("dropped write of {:02x} to unpopulated address {:08x}", value, address);
		}
	}

	fn read_bytes(&self, address: u32, buffer: &mut [u8]) {
		let start = address as usize;
		match self.bytes.get(start .. start + buffer.len()) {
			Some(source) => buffer.copy_from_slice(source),
			None =>
				for (offset, byte) in buffer.iter_mut().enumerate() {
					*byte = self.bytes.get(start + offset).copied().unwrap_or(0);
				},
		}
	}

	fn write_bytes(&mut self, address: u32, data: &[u8]) {
		let start = address as usize;
		match self.bytes.get_mut(start .. start + data.len()) {
			Some(target) => target.copy_from_slice(data),
			None =>
				for (offset, byte) in data.iter().enumerate() {
					if let Some(target) = self.bytes.get_mut(start + offset) {
						*target = *byte;
					}
				},
		}
	}
}
