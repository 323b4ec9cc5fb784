use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Page, PageId, PAGE_SIZE};
use crate::storage::page::error::PageError;

/// View over page 0, which persists the `index_name -> root_page_id` map.
///
/// Layout: a u16 record count, followed by packed records of
/// `[name_len: u16][name bytes][root_page_id: u32]`. Every tree writes
/// through this page whenever its root changes, so a reopened database can
/// find its indexes again.
pub struct RootDirectory;

const COUNT_SIZE: usize = 2;

impl RootDirectory {
    pub fn record_count(page: &Page) -> u16 {
        LittleEndian::read_u16(&page.data[0..COUNT_SIZE])
    }

    /// Look up the root page id recorded for an index.
    pub fn root_of(page: &Page, index_name: &str) -> Option<PageId> {
        Self::find(page, index_name).map(|(_, root)| root)
    }

    /// Append a record for a new index. The name must not already exist.
    pub fn insert_record(page: &mut Page, index_name: &str, root: PageId) -> Result<(), PageError> {
        debug_assert!(Self::find(page, index_name).is_none());

        let count = Self::record_count(page);
        let end = Self::records_end(page);
        let name = index_name.as_bytes();
        let record_size = 2 + name.len() + 4;

        if end + record_size > PAGE_SIZE {
            return Err(PageError::DirectoryFull);
        }

        LittleEndian::write_u16(&mut page.data[end..end + 2], name.len() as u16);
        page.data[end + 2..end + 2 + name.len()].copy_from_slice(name);
        LittleEndian::write_u32(&mut page.data[end + 2 + name.len()..end + record_size], root);
        LittleEndian::write_u16(&mut page.data[0..COUNT_SIZE], count + 1);

        Ok(())
    }

    /// Overwrite the root page id of an existing record. Returns whether
    /// the record was found.
    pub fn update_record(page: &mut Page, index_name: &str, root: PageId) -> bool {
        match Self::find(page, index_name) {
            Some((root_offset, _)) => {
                LittleEndian::write_u32(&mut page.data[root_offset..root_offset + 4], root);
                true
            }
            None => false,
        }
    }

    /// Locate a record; returns the byte offset of its root field.
    fn find(page: &Page, index_name: &str) -> Option<(usize, PageId)> {
        let count = Self::record_count(page);
        let mut offset = COUNT_SIZE;

        for _ in 0..count {
            let name_len = LittleEndian::read_u16(&page.data[offset..offset + 2]) as usize;
            let name = &page.data[offset + 2..offset + 2 + name_len];
            let root_offset = offset + 2 + name_len;
            if name == index_name.as_bytes() {
                let root = LittleEndian::read_u32(&page.data[root_offset..root_offset + 4]);
                return Some((root_offset, root));
            }
            offset = root_offset + 4;
        }

        None
    }

    fn records_end(page: &Page) -> usize {
        let count = Self::record_count(page);
        let mut offset = COUNT_SIZE;
        for _ in 0..count {
            let name_len = LittleEndian::read_u16(&page.data[offset..offset + 2]) as usize;
            offset += 2 + name_len + 4;
        }
        offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::ROOT_DIRECTORY_PAGE_ID;

    #[test]
    fn test_insert_update_lookup() {
        let mut page = Page::new(ROOT_DIRECTORY_PAGE_ID);

        assert_eq!(RootDirectory::root_of(&page, "orders_pk"), None);

        RootDirectory::insert_record(&mut page, "orders_pk", 3).unwrap();
        RootDirectory::insert_record(&mut page, "users_pk", 9).unwrap();

        assert_eq!(RootDirectory::root_of(&page, "orders_pk"), Some(3));
        assert_eq!(RootDirectory::root_of(&page, "users_pk"), Some(9));
        assert_eq!(RootDirectory::record_count(&page), 2);

        assert!(RootDirectory::update_record(&mut page, "orders_pk", 17));
        assert_eq!(RootDirectory::root_of(&page, "orders_pk"), Some(17));
        assert_eq!(RootDirectory::root_of(&page, "users_pk"), Some(9));

        assert!(!RootDirectory::update_record(&mut page, "missing", 1));
    }
}
