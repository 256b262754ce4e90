//! Scatter-gather translation from linear buffer offsets to guest physical addresses.
//!
//! A table is an array of 8-byte entries in guest memory, one per 4 KiB page of the linear buffer. The first word of
//! an entry is the physical page address, the second is a control word the device does not interpret.

use crate::error::ApuError;
use crate::memory::GuestMemory;
use crate::trace;

/// Size of one page of a scatter-gather buffer.
pub const PAGE_SIZE: u32 = 4096;
/// Size of one table entry.
pub const ENTRY_SIZE: u32 = 8;

/// One entry of a scatter-gather table.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SgEntry {
	pub address: u32,
	pub control: u32,
}

/// A scatter-gather table: where it lives and its highest valid entry index.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ScatterGather {
	/// Physical address of entry 0.
	pub base:        u32,
	/// Highest entry index that may be used; the MAXSGE registers hold this value.
	pub max_entries: u32,
}

impl ScatterGather {
	#[must_use]
	pub const fn new(base: u32, max_entries: u32) -> Self {
		Self { base, max_entries }
	}

	/// A table without a size limit. Voice sample data is translated through such a table.
	#[must_use]
	pub const fn unbounded(base: u32) -> Self {
		Self { base, max_entries: u32::MAX }
	}

	/// Load the entry at `index`. The index is not checked against the limit.
	pub fn entry(self, memory: &impl GuestMemory, index: u32) -> SgEntry {
		let address = self.base.wrapping_add(index.wrapping_mul(ENTRY_SIZE));
		SgEntry { address: memory.read_u32(address), control: memory.read_u32(address.wrapping_add(4)) }
	}

	/// Translate a linear offset into a physical address.
	///
	/// # Errors
	/// If the page of the offset lies past the table limit.
	pub fn translate(self, memory: &impl GuestMemory, linear_address: u32) -> Result<u32, ApuError> {
		let entry = linear_address / PAGE_SIZE;
		if entry > self.max_entries {
			return Err(ApuError::SgeOutOfRange { entry, max_entries: self.max_entries, linear_address });
		}
		let physical = self.entry(memory, entry).address.wrapping_add(linear_address % PAGE_SIZE);
		trace!("sge {:08x}: linear {:08x} -> physical {:08x}", self.base, linear_address, physical);
		Ok(physical)
	}

	/// Read a linear range. The range may span pages; every page is translated separately.
	///
	/// # Errors
	/// If any page of the range lies past the table limit.
	pub fn read(self, memory: &impl GuestMemory, linear_address: u32, buffer: &mut [u8]) -> Result<(), ApuError> {
		let mut linear = linear_address;
		let mut remaining = buffer;
		while !remaining.is_empty() {
			let length = remaining.len().min(Self::bytes_left_in_page(linear));
			let (chunk, rest) = remaining.split_at_mut(length);
			memory.read_bytes(self.translate(memory, linear)?, chunk);
			linear = linear.wrapping_add(length as u32);
			remaining = rest;
		}
		Ok(())
	}

	/// Write a linear range. The range may span pages; every page is translated separately.
	///
	/// # Errors
	/// If any page of the range lies past the table limit. Pages before the failing one have already been written.
	pub fn write(self, memory: &mut impl GuestMemory, linear_address: u32, data: &[u8]) -> Result<(), ApuError> {
		let mut linear = linear_address;
		let mut remaining = data;
		while !remaining.is_empty() {
			let length = remaining.len().min(Self::bytes_left_in_page(linear));
			let (chunk, rest) = remaining.split_at(length);
			let physical = self.translate(memory, linear)?;
			memory.write_bytes(physical, chunk);
			linear = linear.wrapping_add(length as u32);
			remaining = rest;
		}
		Ok(())
	}

	#[inline]
	const fn bytes_left_in_page(linear_address: u32) -> usize {
		(PAGE_SIZE - linear_address % PAGE_SIZE) as usize
	}
}

#[cfg(test)]
mod test {
	use rstest::rstest;

	use super::*;
	use crate::memory::Ram;

	fn table_with_pages(pages: &[u32]) -> (Ram, ScatterGather) {
		let mut memory = Ram::new(0x10_0000);
		let table = ScatterGather::new(0x1000, pages.len() as u32 - 1);
		for (index, page) in pages.iter().enumerate() {
			memory.write_u32(0x1000 + index as u32 * ENTRY_SIZE, *page);
			memory.write_u32(0x1004 + index as u32 * ENTRY_SIZE, 0xFFFF_FFFF);
		}
		(memory, table)
	}

	#[rstest]
	#[case::first_page(0x0000, 0x8_0000)]
	#[case::page_offset(0x0123, 0x8_0123)]
	#[case::second_page(0x1000, 0x4_0000)]
	#[case::last_byte(0x1FFF, 0x4_0FFF)]
	fn translates_through_entries(#[case] linear: u32, #[case] physical: u32) {
		let (memory, table) = table_with_pages(&[0x8_0000, 0x4_0000]);
		assert_eq!(table.translate(&memory, linear), Ok(physical));
	}

	#[test]
	fn entry_past_limit_is_fatal() {
		let (memory, table) = table_with_pages(&[0x8_0000, 0x4_0000]);
		assert_eq!(
			table.translate(&memory, 0x2000),
			Err(ApuError::SgeOutOfRange { entry: 2, max_entries: 1, linear_address: 0x2000 })
		);
	}

	#[test]
	fn control_word_is_not_the_address() {
		let (memory, table) = table_with_pages(&[0x8_0000]);
		assert_eq!(table.entry(&memory, 0), SgEntry { address: 0x8_0000, control: 0xFFFF_FFFF });
	}

	#[test]
	fn access_across_page_boundary() {
		let (mut memory, table) = table_with_pages(&[0x8_0000, 0x4_0000]);
		table.write(&mut memory, 0x0FFE, &[1, 2, 3, 4]).unwrap();
		assert_eq!(memory.read_u16(0x8_0FFE), 0x0201);
		assert_eq!(memory.read_u16(0x4_0000), 0x0403);

		let mut buffer = [0; 4];
		table.read(&memory, 0x0FFE, &mut buffer).unwrap();
		assert_eq!(buffer, [1, 2, 3, 4]);
	}
}
