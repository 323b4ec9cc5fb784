use anyhow::Result;

mod common;
use common::create_test_buffer_pool;

use tarndb::storage::page::{PageError, PageManager};
use tarndb::storage::table::TableHeap;

#[test]
fn test_records_survive_eviction() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(3)?;
    let page_manager = PageManager::new();

    let (page, page_id) = buffer_pool.new_page()?;
    let slot = {
        let mut guard = page.write();
        page_manager.init_page(&mut guard);
        page_manager.insert_record(&mut guard, b"persistent record")?
    };
    drop(page);
    buffer_pool.unpin_page(page_id, true)?;

    // Churn the pool so the page gets evicted and re-read.
    for _ in 0..3 {
        let (_, id) = buffer_pool.new_page()?;
        buffer_pool.unpin_page(id, false)?;
    }

    let page = buffer_pool.fetch_page(page_id)?;
    {
        let guard = page.read();
        assert_eq!(page_manager.get_record(&guard, slot)?, b"persistent record");
    }
    buffer_pool.unpin_page(page_id, false)?;
    Ok(())
}

#[test]
fn test_heap_insert_get_delete() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(16)?;
    let heap = TableHeap::new(buffer_pool)?;

    let rid_a = heap.insert_tuple(b"tuple a")?;
    let rid_b = heap.insert_tuple(b"tuple b")?;

    assert_eq!(heap.get_tuple(rid_a)?, b"tuple a");
    assert_eq!(heap.get_tuple(rid_b)?, b"tuple b");

    heap.delete_tuple(rid_a)?;
    assert!(heap.get_tuple(rid_a).is_err());
    assert_eq!(heap.get_tuple(rid_b)?, b"tuple b");
    Ok(())
}

#[test]
fn test_heap_grows_page_chain() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(16)?;
    let heap = TableHeap::new(buffer_pool)?;

    // ~500 bytes per tuple forces several pages.
    let payload = vec![0x5Au8; 500];
    let mut rids = Vec::new();
    for _ in 0..40 {
        rids.push(heap.insert_tuple(&payload)?);
    }

    let pages_used: std::collections::HashSet<_> = rids.iter().map(|r| r.page_id).collect();
    assert!(pages_used.len() > 1, "expected the heap to spill onto more pages");

    for rid in &rids {
        assert_eq!(heap.get_tuple(*rid)?.len(), 500);
    }
    Ok(())
}

#[test]
fn test_heap_iterator_skips_deleted() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(16)?;
    let heap = TableHeap::new(buffer_pool)?;

    let mut rids = Vec::new();
    for i in 0..10u8 {
        rids.push(heap.insert_tuple(&[i])?);
    }
    for rid in rids.iter().step_by(2) {
        heap.delete_tuple(*rid)?;
    }

    let mut seen = Vec::new();
    for item in heap.iter() {
        let (_, bytes) = item?;
        seen.push(bytes[0]);
    }
    assert_eq!(seen, vec![1, 3, 5, 7, 9]);
    Ok(())
}

#[test]
fn test_oversized_tuple_is_rejected() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(16)?;
    let heap = TableHeap::new(buffer_pool)?;

    let too_big = vec![0u8; 8192];
    assert!(heap.insert_tuple(&too_big).is_err());
    Ok(())
}

#[test]
fn test_page_error_variants() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(4)?;
    let page_manager = PageManager::new();

    let (page, page_id) = buffer_pool.new_page()?;
    {
        let mut guard = page.write();
        page_manager.init_page(&mut guard);
        assert!(matches!(
            page_manager.get_record(&guard, 0),
            Err(PageError::SlotOutOfRange(0))
        ));
    }
    buffer_pool.unpin_page(page_id, false)?;
    Ok(())
}
