use anyhow::Result;

mod common;
use common::create_test_buffer_pool;

use tarndb::storage::buffer::{BufferPoolError, BufferPoolManager};

#[test]
fn test_new_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (page, page_id) = buffer_pool.new_page()?;

    // Page 0 is the root directory, so fresh pages start at 1.
    assert!(page_id > 0);
    {
        let page_guard = page.read();
        assert_eq!(page_guard.page_id, page_id);
        assert!(page_guard.data.iter().all(|&b| b == 0));
    }

    buffer_pool.unpin_page(page_id, false)?;
    Ok(())
}

#[test]
fn test_fetch_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (_, page_id) = buffer_pool.new_page()?;
    buffer_pool.unpin_page(page_id, false)?;

    let fetched_page = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = fetched_page.read();
        assert_eq!(page_guard.page_id, page_id);
    }

    buffer_pool.unpin_page(page_id, false)?;
    Ok(())
}

#[test]
fn test_unpin_errors() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (_, page_id) = buffer_pool.new_page()?;
    buffer_pool.unpin_page(page_id, false)?;

    // Second unpin: the pin count is already zero.
    assert!(matches!(
        buffer_pool.unpin_page(page_id, false),
        Err(BufferPoolError::PinCountZero(_))
    ));

    // Unknown page: not resident.
    assert!(matches!(
        buffer_pool.unpin_page(9999, false),
        Err(BufferPoolError::PageNotResident(9999))
    ));

    Ok(())
}

#[test]
fn test_dirty_bit_is_sticky() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (_, page_id) = buffer_pool.new_page()?;
    buffer_pool.unpin_page(page_id, true)?;
    // Flush so the resident page starts out clean.
    buffer_pool.flush_page(page_id)?;

    // Two pins, released as dirty then clean: the clean release must not
    // wash out the dirty bit.
    let page = buffer_pool.fetch_page(page_id)?;
    let _second = buffer_pool.fetch_page(page_id)?;
    {
        let mut page_guard = page.write();
        page_guard.data[0..4].copy_from_slice(b"mark");
    }
    buffer_pool.unpin_page(page_id, true)?;
    buffer_pool.unpin_page(page_id, false)?;

    // Evict by filling the pool; a lost dirty bit would drop the bytes.
    for _ in 0..10 {
        let (_, id) = buffer_pool.new_page()?;
        buffer_pool.unpin_page(id, false)?;
    }

    let fetched = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = fetched.read();
        assert_eq!(&page_guard.data[0..4], b"mark");
    }
    buffer_pool.unpin_page(page_id, false)?;
    Ok(())
}

#[test]
fn test_eviction_writes_dirty_page_to_disk() -> Result<()> {
    // Pool of 3, three pinned pages, unpin one dirty: fetching a fourth
    // must evict it and persist its bytes.
    let (buffer_pool, _temp_file) = create_test_buffer_pool(3)?;

    let (p1, id1) = buffer_pool.new_page()?;
    let (p2, id2) = buffer_pool.new_page()?;
    let (p3, id3) = buffer_pool.new_page()?;
    drop(p1);
    drop(p3);

    {
        let mut page_guard = p2.write();
        page_guard.data[100..105].copy_from_slice(b"hello");
    }
    drop(p2);
    buffer_pool.unpin_page(id2, true)?;

    // All other frames stay pinned, so the new page must take id2's frame.
    let (_, id4) = buffer_pool.new_page()?;
    assert_ne!(id4, id2);
    buffer_pool.unpin_page(id4, false)?;

    let fetched = buffer_pool.fetch_page(id2)?;
    {
        let page_guard = fetched.read();
        assert_eq!(&page_guard.data[100..105], b"hello");
    }

    buffer_pool.unpin_page(id2, false)?;
    buffer_pool.unpin_page(id1, false)?;
    buffer_pool.unpin_page(id3, false)?;
    Ok(())
}

#[test]
fn test_pool_exhaustion() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(3)?;

    let mut pages = Vec::new();
    for _ in 0..3 {
        pages.push(buffer_pool.new_page()?);
    }

    // Every frame is pinned: no victim.
    assert!(matches!(
        buffer_pool.new_page(),
        Err(BufferPoolError::PoolExhausted)
    ));
    assert!(matches!(
        buffer_pool.fetch_page(9999),
        Err(BufferPoolError::PoolExhausted)
    ));

    // Releasing one pin makes room again.
    let (_, id) = pages.pop().unwrap();
    buffer_pool.unpin_page(id, false)?;
    let (_, new_id) = buffer_pool.new_page()?;
    buffer_pool.unpin_page(new_id, false)?;

    for (_, id) in pages {
        buffer_pool.unpin_page(id, false)?;
    }
    Ok(())
}

#[test]
fn test_flush_page_writes_unconditionally() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (_, page_id) = buffer_pool.new_page()?;
    buffer_pool.unpin_page(page_id, true)?;
    buffer_pool.flush_page(page_id)?;

    // Modify the bytes but lie on unpin: the frame is considered clean.
    let page = buffer_pool.fetch_page(page_id)?;
    {
        let mut page_guard = page.write();
        page_guard.data[0..5].copy_from_slice(b"fsync");
    }
    buffer_pool.unpin_page(page_id, false)?;

    // flush_page writes regardless of the dirty bit.
    buffer_pool.flush_page(page_id)?;

    // Push the page out of the pool without another flush.
    for _ in 0..10 {
        let (_, id) = buffer_pool.new_page()?;
        buffer_pool.unpin_page(id, false)?;
    }

    let fetched = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = fetched.read();
        assert_eq!(&page_guard.data[0..5], b"fsync");
    }
    buffer_pool.unpin_page(page_id, false)?;
    Ok(())
}

#[test]
fn test_flush_all_pages() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let mut page_ids = Vec::new();
    for i in 0..5u8 {
        let (page, page_id) = buffer_pool.new_page()?;
        {
            let mut page_guard = page.write();
            page_guard.data[0] = i + 1;
        }
        buffer_pool.unpin_page(page_id, true)?;
        page_ids.push(page_id);
    }

    buffer_pool.flush_all_pages()?;

    for (i, &page_id) in page_ids.iter().enumerate() {
        let fetched = buffer_pool.fetch_page(page_id)?;
        {
            let page_guard = fetched.read();
            assert_eq!(page_guard.data[0], i as u8 + 1);
        }
        buffer_pool.unpin_page(page_id, false)?;
    }
    Ok(())
}

#[test]
fn test_delete_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (_, page_id) = buffer_pool.new_page()?;

    // Pinned pages cannot be deleted.
    assert!(matches!(
        buffer_pool.delete_page(page_id),
        Err(BufferPoolError::PagePinned(_))
    ));

    buffer_pool.unpin_page(page_id, false)?;
    buffer_pool.delete_page(page_id)?;

    // Deleting a non-resident page succeeds.
    buffer_pool.delete_page(page_id)?;

    // The freed disk page is reused by the next allocation.
    let (_, new_id) = buffer_pool.new_page()?;
    assert_eq!(new_id, page_id);
    buffer_pool.unpin_page(new_id, false)?;
    Ok(())
}

#[test]
fn test_concurrent_fetch_and_unpin() -> Result<()> {
    use std::thread;

    let (buffer_pool, _temp_file) = create_test_buffer_pool(16)?;

    let mut page_ids = Vec::new();
    for _ in 0..8 {
        let (_, id) = buffer_pool.new_page()?;
        buffer_pool.unpin_page(id, false)?;
        page_ids.push(id);
    }

    let mut handles = Vec::new();
    for t in 0..4 {
        let pool: std::sync::Arc<BufferPoolManager> = buffer_pool.clone();
        let ids = page_ids.clone();
        handles.push(thread::spawn(move || {
            for round in 0..50 {
                let id = ids[(t + round) % ids.len()];
                let page = pool.fetch_page(id).unwrap();
                {
                    let guard = page.read();
                    assert_eq!(guard.page_id, id);
                }
                pool.unpin_page(id, false).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    Ok(())
}
