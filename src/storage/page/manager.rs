use crate::common::types::{Page, PageId, PAGE_SIZE};
use crate::storage::page::error::PageError;
use crate::storage::page::header::HeapPageHeader;
use crate::storage::page::layout::{SlotEntry, HEAP_HEADER_SIZE, SLOT_ENTRY_SIZE};

/// Operations on slotted heap pages. Record data is stored from the
/// beginning of the page (after the header); slot entries are stored from
/// the end of the page.
#[derive(Default)]
pub struct PageManager;

impl PageManager {
    pub fn new() -> Self {
        Self
    }

    pub fn init_page(&self, page: &mut Page) {
        let header = HeapPageHeader::new();
        page.data[0..HEAP_HEADER_SIZE].copy_from_slice(&header.to_bytes());
    }

    pub fn header(&self, page: &Page) -> HeapPageHeader {
        HeapPageHeader::from_bytes(&page.data[0..HEAP_HEADER_SIZE])
    }

    pub fn set_next_page_id(&self, page: &mut Page, next: PageId) {
        let mut header = self.header(page);
        header.next_page_id = next;
        self.write_header(page, header);
    }

    pub fn set_prev_page_id(&self, page: &mut Page, prev: PageId) {
        let mut header = self.header(page);
        header.prev_page_id = prev;
        self.write_header(page, header);
    }

    pub fn slot_count(&self, page: &Page) -> u32 {
        self.header(page).slot_count
    }

    /// Insert a record and return its slot number.
    pub fn insert_record(&self, page: &mut Page, data: &[u8]) -> Result<u32, PageError> {
        let mut header = self.header(page);

        let record_size = data.len() as u32;
        let total_needed = record_size + SLOT_ENTRY_SIZE as u32;
        if header.free_space_size < total_needed {
            return Err(PageError::InsufficientSpace);
        }

        let slot = header.slot_count;
        let slot_pos = Self::slot_position(slot);

        let entry = SlotEntry {
            offset: header.free_space_offset,
            length: record_size,
        };

        let data_start = header.free_space_offset as usize;
        page.data[data_start..data_start + data.len()].copy_from_slice(data);
        page.data[slot_pos..slot_pos + SLOT_ENTRY_SIZE].copy_from_slice(&entry.to_bytes());

        header.free_space_offset += record_size;
        header.free_space_size -= total_needed;
        header.slot_count += 1;
        self.write_header(page, header);

        Ok(slot)
    }

    /// Read a record by slot number.
    pub fn get_record(&self, page: &Page, slot: u32) -> Result<Vec<u8>, PageError> {
        let entry = self.slot_entry(page, slot)?;
        if entry.is_deleted() {
            return Err(PageError::SlotDeleted(slot));
        }

        let start = entry.offset as usize;
        let end = start + entry.length as usize;
        Ok(page.data[start..end].to_vec())
    }

    /// Tombstone a record. The slot stays; its bytes are not reclaimed
    /// (compaction belongs to a vacuum pass this engine does not have).
    pub fn delete_record(&self, page: &mut Page, slot: u32) -> Result<(), PageError> {
        let mut entry = self.slot_entry(page, slot)?;
        if entry.is_deleted() {
            return Err(PageError::SlotDeleted(slot));
        }

        entry.length = 0;
        let slot_pos = Self::slot_position(slot);
        page.data[slot_pos..slot_pos + SLOT_ENTRY_SIZE].copy_from_slice(&entry.to_bytes());
        Ok(())
    }

    fn slot_entry(&self, page: &Page, slot: u32) -> Result<SlotEntry, PageError> {
        let header = self.header(page);
        if slot >= header.slot_count {
            return Err(PageError::SlotOutOfRange(slot));
        }
        let slot_pos = Self::slot_position(slot);
        Ok(SlotEntry::from_bytes(&page.data[slot_pos..slot_pos + SLOT_ENTRY_SIZE]))
    }

    fn slot_position(slot: u32) -> usize {
        PAGE_SIZE - SLOT_ENTRY_SIZE * (slot as usize + 1)
    }

    fn write_header(&self, page: &mut Page, header: HeapPageHeader) {
        page.data[0..HEAP_HEADER_SIZE].copy_from_slice(&header.to_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::INVALID_PAGE_ID;

    fn fresh_page() -> (PageManager, Page) {
        let pm = PageManager::new();
        let mut page = Page::new(1);
        pm.init_page(&mut page);
        (pm, page)
    }

    #[test]
    fn test_insert_and_get() {
        let (pm, mut page) = fresh_page();

        let slot_a = pm.insert_record(&mut page, b"alpha").unwrap();
        let slot_b = pm.insert_record(&mut page, b"beta").unwrap();

        assert_eq!(slot_a, 0);
        assert_eq!(slot_b, 1);
        assert_eq!(pm.get_record(&page, slot_a).unwrap(), b"alpha");
        assert_eq!(pm.get_record(&page, slot_b).unwrap(), b"beta");
    }

    #[test]
    fn test_delete_tombstones_slot() {
        let (pm, mut page) = fresh_page();

        let slot = pm.insert_record(&mut page, b"doomed").unwrap();
        pm.delete_record(&mut page, slot).unwrap();

        assert!(matches!(pm.get_record(&page, slot), Err(PageError::SlotDeleted(_))));
        assert!(matches!(pm.delete_record(&mut page, slot), Err(PageError::SlotDeleted(_))));

        // Later inserts still work and get a new slot.
        let next = pm.insert_record(&mut page, b"alive").unwrap();
        assert_eq!(next, 1);
        assert_eq!(pm.get_record(&page, next).unwrap(), b"alive");
    }

    #[test]
    fn test_out_of_range_slot() {
        let (pm, page) = fresh_page();
        assert!(matches!(pm.get_record(&page, 7), Err(PageError::SlotOutOfRange(7))));
    }

    #[test]
    fn test_page_fills_up() {
        let (pm, mut page) = fresh_page();
        let record = vec![0xABu8; 512];

        let mut inserted = 0;
        loop {
            match pm.insert_record(&mut page, &record) {
                Ok(_) => inserted += 1,
                Err(PageError::InsufficientSpace) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        // 4KB page, 20-byte header, 512 + 8 bytes per record.
        assert_eq!(inserted, (PAGE_SIZE - HEAP_HEADER_SIZE) / (512 + SLOT_ENTRY_SIZE));
    }

    #[test]
    fn test_page_chain_fields() {
        let (pm, mut page) = fresh_page();
        assert_eq!(pm.header(&page).next_page_id, INVALID_PAGE_ID);

        pm.set_next_page_id(&mut page, 42);
        pm.set_prev_page_id(&mut page, 7);

        let header = pm.header(&page);
        assert_eq!(header.next_page_id, 42);
        assert_eq!(header.prev_page_id, 7);
    }
}
