use crate::error::{StoreError, StoreResult};

/// Fixed-size record storage addressed by physical offset.
///
/// Offsets are 0-based (`rod_id - 1`). Every record is `element_size()`
/// bytes; slots inside a record are addressed by a byte `field_offset`.
/// Scalars are stored little-endian.
pub trait Container {
    /// Size in bytes of one record.
    fn element_size(&self) -> usize;

    /// Number of allocated records.
    fn element_count(&self) -> u64;

    /// Allocate `n` zeroed records and return the offset of the first one.
    fn allocate_elements(&mut self, n: u64) -> StoreResult<u64>;

    /// Borrow `len` bytes of the record at `offset`, starting at `field_offset`.
    fn read_slot(&self, offset: u64, field_offset: usize, len: usize) -> StoreResult<&[u8]>;

    /// Overwrite bytes of the record at `offset`, starting at `field_offset`.
    fn write_slot(&mut self, offset: u64, field_offset: usize, data: &[u8]) -> StoreResult<()>;

    fn read_u64(&self, offset: u64, field_offset: usize) -> StoreResult<u64> {
        Ok(u64::from_le_bytes(word(self.read_slot(offset, field_offset, 8)?)))
    }

    fn write_u64(&mut self, offset: u64, field_offset: usize, value: u64) -> StoreResult<()> {
        self.write_slot(offset, field_offset, &value.to_le_bytes())
    }

    fn read_i64(&self, offset: u64, field_offset: usize) -> StoreResult<i64> {
        Ok(i64::from_le_bytes(word(self.read_slot(offset, field_offset, 8)?)))
    }

    fn write_i64(&mut self, offset: u64, field_offset: usize, value: i64) -> StoreResult<()> {
        self.write_slot(offset, field_offset, &value.to_le_bytes())
    }

    fn read_f64(&self, offset: u64, field_offset: usize) -> StoreResult<f64> {
        Ok(f64::from_le_bytes(word(self.read_slot(offset, field_offset, 8)?)))
    }

    fn write_f64(&mut self, offset: u64, field_offset: usize, value: f64) -> StoreResult<()> {
        self.write_slot(offset, field_offset, &value.to_le_bytes())
    }

    /// Copy of the whole record at `offset`.
    fn read_record(&self, offset: u64) -> StoreResult<Vec<u8>> {
        Ok(self.read_slot(offset, 0, self.element_size())?.to_vec())
    }

    /// Replace the whole record at `offset`.
    fn write_record(&mut self, offset: u64, record: &[u8]) -> StoreResult<()> {
        if record.len() != self.element_size() {
            return Err(StoreError::SlotOutOfBounds {
                field_offset: 0,
                len: record.len(),
                element_size: self.element_size(),
            });
        }
        self.write_slot(offset, 0, record)
    }
}

fn word(bytes: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&bytes[..8]);
    out
}
