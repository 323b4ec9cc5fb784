use byteorder::{ByteOrder, LittleEndian};

/// Heap page header: 4 bytes per field * 5 fields.
pub const HEAP_HEADER_SIZE: usize = 20;

/// Slot entry: 4 bytes offset + 4 bytes length.
pub const SLOT_ENTRY_SIZE: usize = 8;

/// One entry of the slot array that grows from the end of the page.
/// A zero length marks a deleted record.
#[derive(Debug, Clone, Copy)]
pub struct SlotEntry {
    pub offset: u32,
    pub length: u32,
}

impl SlotEntry {
    pub fn to_bytes(self) -> [u8; SLOT_ENTRY_SIZE] {
        let mut bytes = [0u8; SLOT_ENTRY_SIZE];
        LittleEndian::write_u32(&mut bytes[0..4], self.offset);
        LittleEndian::write_u32(&mut bytes[4..8], self.length);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            offset: LittleEndian::read_u32(&bytes[0..4]),
            length: LittleEndian::read_u32(&bytes[4..8]),
        }
    }

    pub fn is_deleted(self) -> bool {
        self.length == 0
    }
}
