//! Bit fields of 32-bit words, as used by voice records and device registers.

use crate::memory::GuestMemory;

/// A bit field: a contiguous mask inside the 32-bit little-endian word at `offset` bytes into some record.
///
/// Register fields use an offset of 0 and are applied with [`Field::extract`] and [`Field::insert`] directly.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Field {
	/// Byte offset of the containing word from the start of the record.
	pub offset: u32,
	/// Mask of the field inside the word; must be non-zero.
	pub mask:   u32,
}

impl Field {
	#[must_use]
	pub const fn new(offset: u32, mask: u32) -> Self {
		Self { offset, mask }
	}

	/// The entire word at `offset`.
	#[must_use]
	pub const fn word(offset: u32) -> Self {
		Self { offset, mask: u32::MAX }
	}

	/// Position of the lowest bit of the field.
	#[must_use]
	#[inline]
	pub const fn shift(self) -> u32 {
		self.mask.trailing_zeros()
	}

	/// The field's value, shifted down to bit 0.
	#[must_use]
	#[inline]
	pub const fn extract(self, word: u32) -> u32 {
		(word & self.mask) >> self.shift()
	}

	/// `word` with the field replaced by `value`. Bits of `value` that do not fit are discarded.
	#[must_use]
	#[inline]
	pub const fn insert(self, word: u32, value: u32) -> u32 {
		(word & !self.mask) | ((value << self.shift()) & self.mask)
	}

	/// Read the field of the record at `base`.
	#[inline]
	pub fn read(self, memory: &impl GuestMemory, base: u32) -> u32 {
		self.extract(memory.read_u32(base.wrapping_add(self.offset)))
	}

	/// Read-modify-write the field of the record at `base`. Other bits of the word are preserved.
	#[inline]
	pub fn write(self, memory: &mut impl GuestMemory, base: u32, value: u32) {
		let address = base.wrapping_add(self.offset);
		let word = memory.read_u32(address);
		memory.write_u32(address, self.insert(word, value));
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::memory::Ram;

	#[test]
	fn insert_preserves_neighbors() {
		let field = Field::new(0, 0xFFF0);
		assert_eq!(field.insert(0xAAAA_AAAA, 0x123), 0xAAAA_123A);
		assert_eq!(field.extract(0xAAAA_123A), 0x123);
		// Oversized values are truncated to the field width.
		assert_eq!(field.insert(0, 0xF_FFFF), 0xFFF0);
	}

	#[test]
	fn read_modify_write_in_memory() {
		let mut memory = Ram::new(0x100);
		memory.write_u32(0x44, 0xDEAD_BEEF);
		let field = Field::new(4, 0xFF << 24);
		field.write(&mut memory, 0x40, 0x12);
		assert_eq!(memory.read_u32(0x44), 0x12AD_BEEF);
		assert_eq!(field.read(&memory, 0x40), 0x12);
		assert_eq!(Field::word(4).read(&memory, 0x40), 0x12AD_BEEF);
	}
}
