//! Integration tests for heap files accessed through the buffer pool

use std::fs::OpenOptions;
use std::sync::Arc;

use heapdb::storage::heap::HeapFile;
use heapdb::storage::page::HeapPage;
use heapdb::tuple::{DataType, Schema, Tuple, TupleBuilder, Value};
use heapdb::{Database, DbConfig, DbError, PageId, SlotId};
use tempfile::TempDir;

/// One INTEGER column: 5-byte tuples, so a 12-byte page holds 2 slots.
const SMALL_PAGE: usize = 12;

fn setup(page_size: usize) -> (Database, Arc<HeapFile>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(DbConfig::default().with_page_size(page_size));
    let schema = Schema::builder().column("id", DataType::Integer).build_arc();
    let table = db.create_table(dir.path().join("t.dat"), schema).unwrap();
    (db, table, dir)
}

fn row(table: &HeapFile, id: i32) -> Tuple {
    TupleBuilder::new(table.schema().clone()).value(id).build()
}

fn file_len(table: &HeapFile) -> u64 {
    std::fs::metadata(table.path()).unwrap().len()
}

fn scan_ids(db: &Database, table: &HeapFile) -> Vec<i32> {
    let txn = db.begin();
    let ids = txn
        .scan(table)
        .map(|t| match t.unwrap().value(0) {
            Some(Value::Integer(id)) => *id,
            other => panic!("unexpected value {:?}", other),
        })
        .collect();
    txn.commit().unwrap();
    ids
}

#[test]
fn test_slot_count_for_small_page() {
    assert_eq!(HeapPage::slots_per_page(SMALL_PAGE, 5), 2);
}

#[test]
fn test_inserts_append_pages_on_demand() {
    let (db, table, _dir) = setup(SMALL_PAGE);

    let txn = db.begin();
    let mut rows: Vec<_> = (0..3).map(|i| row(&table, i)).collect();
    for r in rows.iter_mut() {
        let modified = txn.insert_tuple(table.table_id(), r).unwrap();
        assert_eq!(modified.len(), 1);
    }
    txn.commit().unwrap();

    assert_eq!(table.num_pages().unwrap(), 2);
    assert_eq!(file_len(&table), 2 * SMALL_PAGE as u64);

    let rids: Vec<_> = rows.iter().map(|r| r.record_id().unwrap()).collect();
    assert_eq!(rids[0].page_id, PageId::new(table.table_id(), 0));
    assert_eq!(rids[1].slot_id, SlotId::new(1));
    assert_eq!(rids[2].page_id, PageId::new(table.table_id(), 1));
    assert_eq!(rids[2].slot_id, SlotId::new(0));

    assert_eq!(scan_ids(&db, &table), vec![0, 1, 2]);
}

#[test]
fn test_freed_slot_is_reused_before_appending() {
    let (db, table, _dir) = setup(SMALL_PAGE);

    let txn = db.begin();
    let mut a = row(&table, 1);
    let mut b = row(&table, 2);
    txn.insert_tuple(table.table_id(), &mut a).unwrap();
    txn.insert_tuple(table.table_id(), &mut b).unwrap();
    txn.commit().unwrap();

    let txn = db.begin();
    txn.delete_tuple(&a).unwrap();
    let mut c = row(&table, 3);
    txn.insert_tuple(table.table_id(), &mut c).unwrap();
    txn.commit().unwrap();

    assert_eq!(c.record_id(), a.record_id());
    assert_eq!(table.num_pages().unwrap(), 1);
    assert_eq!(scan_ids(&db, &table), vec![3, 2]);
}

#[test]
fn test_file_length_tracks_page_count() {
    let (db, table, _dir) = setup(SMALL_PAGE);

    let mut stored = Vec::new();
    for round in 0..5 {
        let txn = db.begin();
        for i in 0..3 {
            let mut r = row(&table, round * 10 + i);
            txn.insert_tuple(table.table_id(), &mut r).unwrap();
            stored.push(r);
        }
        if round % 2 == 1 {
            let victim = stored.remove(0);
            txn.delete_tuple(&victim).unwrap();
        }
        txn.commit().unwrap();

        let pages = table.num_pages().unwrap() as u64;
        assert_eq!(pages * SMALL_PAGE as u64, file_len(&table));
    }

    assert_eq!(scan_ids(&db, &table).len(), stored.len());
}

#[test]
fn test_delete_missing_tuple() {
    let (db, table, _dir) = setup(SMALL_PAGE);

    let txn = db.begin();
    let mut r = row(&table, 1);
    txn.insert_tuple(table.table_id(), &mut r).unwrap();
    txn.delete_tuple(&r).unwrap();
    assert!(matches!(
        txn.delete_tuple(&r),
        Err(DbError::TupleNotOnPage { .. })
    ));
    assert!(matches!(
        txn.delete_tuple(&row(&table, 2)),
        Err(DbError::MissingRecordId)
    ));
    txn.commit().unwrap();
}

#[test]
fn test_read_past_end_and_truncated_file() {
    let (db, table, _dir) = setup(SMALL_PAGE);

    let txn = db.begin();
    for i in 0..4 {
        txn.insert_tuple(table.table_id(), &mut row(&table, i)).unwrap();
    }
    txn.commit().unwrap();
    assert_eq!(table.num_pages().unwrap(), 2);

    let past_end = table.read_page(PageId::new(table.table_id(), 2));
    assert!(matches!(past_end, Err(DbError::InvalidPage { .. })));

    // Cut the last page short
    let file = OpenOptions::new().write(true).open(table.path()).unwrap();
    file.set_len(2 * SMALL_PAGE as u64 - 3).unwrap();

    assert_eq!(table.num_pages().unwrap(), 1);
    let truncated = table.read_page(PageId::new(table.table_id(), 1));
    let err = truncated.unwrap_err();
    assert!(err.is_storage_error());
    assert!(table.read_page(PageId::new(table.table_id(), 0)).is_ok());
}

#[test]
fn test_iterator_rewind_and_close() {
    let (db, table, _dir) = setup(SMALL_PAGE);

    let txn = db.begin();
    for i in 0..5 {
        txn.insert_tuple(table.table_id(), &mut row(&table, i)).unwrap();
    }

    {
        let mut iter = txn.scan(&table);
        assert_eq!(iter.by_ref().take(3).count(), 3);

        iter.rewind();
        assert_eq!(iter.by_ref().count(), 5);
        assert!(iter.next().is_none());

        iter.close();
        assert!(!iter.is_open());
        assert!(iter.next().is_none());
    }
    txn.commit().unwrap();
}

#[test]
fn test_scan_takes_shared_locks() {
    let (db, table, _dir) = setup(SMALL_PAGE);

    let txn = db.begin();
    for i in 0..4 {
        txn.insert_tuple(table.table_id(), &mut row(&table, i)).unwrap();
    }
    txn.commit().unwrap();

    let reader = db.begin();
    assert_eq!(reader.scan(&table).count(), 4);
    for n in 0..2 {
        let pid = PageId::new(table.table_id(), n);
        assert!(db.lock_manager().holds_read(reader.id(), pid));
        assert!(!db.lock_manager().holds_write(reader.id(), pid));
    }
    reader.commit().unwrap();
}

#[test]
fn test_aborted_append_leaves_empty_page() {
    let (db, table, _dir) = setup(SMALL_PAGE);

    let txn = db.begin();
    txn.insert_tuple(table.table_id(), &mut row(&table, 42)).unwrap();
    txn.abort().unwrap();

    // The zeroed page was persisted before the insert; the tuple never was
    assert_eq!(table.num_pages().unwrap(), 1);
    let bytes = std::fs::read(table.path()).unwrap();
    assert!(bytes.iter().all(|&b| b == 0));
    assert!(scan_ids(&db, &table).is_empty());
}

#[test]
fn test_update_tuple_in_place() {
    let (db, table, _dir) = setup(SMALL_PAGE);

    let txn = db.begin();
    let mut r = row(&table, 1);
    txn.insert_tuple(table.table_id(), &mut r).unwrap();
    txn.commit().unwrap();

    let txn = db.begin();
    r.set_value(0, Value::Integer(99));
    txn.update_tuple(&r).unwrap();
    txn.commit().unwrap();

    assert_eq!(scan_ids(&db, &table), vec![99]);
}

#[test]
fn test_schema_mismatch_rejected() {
    let (db, table, _dir) = setup(SMALL_PAGE);
    let other = Schema::builder().column("x", DataType::BigInt).build_arc();

    let txn = db.begin();
    let mut wrong = TupleBuilder::new(other).value(1i64).build();
    assert!(matches!(
        txn.insert_tuple(table.table_id(), &mut wrong),
        Err(DbError::SchemaMismatch(_))
    ));
    txn.commit().unwrap();
    assert_eq!(table.num_pages().unwrap(), 0);
}
