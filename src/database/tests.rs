use super::*;
use crate::logger::init_test_logger;
use crate::record::{ColumnDef, Field, FieldType, Tuple};
use crate::storage::{DbFile, HeapPage, Page, PageId, Permissions, StorageResult};
use crate::transaction::TransactionId;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const PAGE_SIZE: usize = 4096;

fn scores_desc() -> TupleDesc {
    TupleDesc::new(vec![
        ColumnDef::new("id", FieldType::Int, true),
        ColumnDef::nullable("score", FieldType::Int),
    ])
}

fn row(id: i32, score: i32) -> Tuple {
    Tuple::new(vec![Field::Int(id), Field::Int(score)])
}

fn slots_per_page() -> usize {
    HeapPage::slots_per_page(PAGE_SIZE, scores_desc().tuple_size())
}

/// Database with one table `scores` whose file starts with `num_pages`
/// empty pages
fn setup_test_db(num_pages: usize) -> (TempDir, Database, TableId) {
    init_test_logger();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("scores.dat");
    std::fs::write(&path, vec![0u8; PAGE_SIZE * num_pages]).unwrap();

    let db = Database::new(DbConfig::default()).unwrap();
    let table_id = db.create_table(&path, "scores", scores_desc()).unwrap();
    (temp_dir, db, table_id)
}

fn scan_ids(db: &Database, table_id: TableId, tid: TransactionId) -> Vec<i32> {
    let file = db.catalog().database_file(table_id).unwrap();
    file.iter(db.buffer_pool(), tid)
        .map(|t| match t.unwrap().field(0) {
            Some(Field::Int(id)) => *id,
            other => panic!("unexpected id field {:?}", other),
        })
        .collect()
}

#[test]
fn test_database_defaults() {
    let (_temp, db, table_id) = setup_test_db(0);
    assert_eq!(db.config(), &DbConfig::default());
    assert_eq!(db.buffer_pool().capacity(), 50);
    assert_eq!(db.catalog().table_id("scores").unwrap(), table_id);
    assert_eq!(db.catalog().table_name(table_id).unwrap(), "scores");
}

#[test]
fn test_database_rejects_invalid_config() {
    let config = DbConfig {
        buffer_pool_pages: 0,
        ..DbConfig::default()
    };
    assert!(matches!(
        Database::new(config),
        Err(DatabaseError::ConfigError(_))
    ));
}

#[test]
fn test_capacity_two_evicts_clean_page() {
    let (_temp, mut db, table_id) = setup_test_db(3);
    db.reset_buffer_pool(2);
    let pool = db.buffer_pool();
    let tid = TransactionId::new();
    let a = PageId::new(table_id, 0);
    let b = PageId::new(table_id, 1);
    let c = PageId::new(table_id, 2);

    pool.get_page(tid, a, Permissions::ReadOnly).unwrap();
    pool.get_page(tid, b, Permissions::ReadOnly).unwrap();
    assert_eq!(pool.cached_page_count(), 2);

    pool.get_page(tid, c, Permissions::ReadOnly).unwrap();
    assert_eq!(pool.cached_page_count(), 2);
    assert!(pool.is_cached(c));
    assert!(pool.is_cached(a) ^ pool.is_cached(b));
}

#[test]
fn test_abort_reverts_insert() {
    let (_temp, db, table_id) = setup_test_db(1);
    let pool = db.buffer_pool();

    // leave exactly one free slot on the only page
    let loader = TransactionId::new();
    for i in 0..(slots_per_page() - 1) as i32 {
        pool.insert_tuple(loader, table_id, row(i, i)).unwrap();
    }
    pool.transaction_complete(loader, true).unwrap();

    let t1 = TransactionId::new();
    pool.insert_tuple(t1, table_id, row(9999, 0)).unwrap();
    let file = db.catalog().database_file(table_id).unwrap();
    assert_eq!(file.num_pages().unwrap(), 1);
    pool.transaction_complete(t1, false).unwrap();

    let t2 = TransactionId::new();
    let page = pool
        .get_page(t2, PageId::new(table_id, 0), Permissions::ReadOnly)
        .unwrap();
    let page = page.read();
    assert_eq!(page.num_empty_slots(), 1);
    assert!(
        page.tuples()
            .iter()
            .all(|t| t.field(0) != Some(&Field::Int(9999)))
    );
}

#[test]
fn test_exclusive_holder_aborts_waiter() {
    let (_temp, db, table_id) = setup_test_db(1);
    let pool = db.buffer_pool();
    let pid = PageId::new(table_id, 0);
    let t1 = TransactionId::new();
    let t2 = TransactionId::new();

    pool.get_page(t1, pid, Permissions::ReadWrite).unwrap();

    let start = Instant::now();
    let err = pool.get_page(t2, pid, Permissions::ReadWrite).unwrap_err();
    assert!(err.is_transaction_aborted());
    assert!(start.elapsed() >= Duration::from_millis(100));

    pool.transaction_complete(t2, false).unwrap();
    assert!(pool.holds_lock(t1, pid));
    assert!(!pool.holds_lock(t2, pid));
}

#[test]
fn test_waiter_granted_after_holder_commits() {
    let (_temp, db, table_id) = setup_test_db(1);
    let pool = db.buffer_pool();
    let pid = PageId::new(table_id, 0);
    let t1 = TransactionId::new();
    let t2 = TransactionId::new();

    pool.insert_tuple(t1, table_id, row(1, 1)).unwrap();

    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(20));
            pool.transaction_complete(t1, true).unwrap();
        });

        let page = pool.get_page(t2, pid, Permissions::ReadWrite).unwrap();
        assert_eq!(page.read().tuples().len(), 1);
    });

    assert!(pool.holds_lock(t2, pid));
    assert!(!pool.holds_lock(t1, pid));
}

#[test]
fn test_concurrent_shared_readers() {
    let (_temp, db, table_id) = setup_test_db(1);
    let pool = db.buffer_pool();
    let pid = PageId::new(table_id, 0);
    let readers: Vec<TransactionId> = (0..4).map(|_| TransactionId::new()).collect();

    thread::scope(|s| {
        for &tid in &readers {
            s.spawn(move || {
                pool.get_page(tid, pid, Permissions::ReadOnly).unwrap();
            });
        }
    });

    assert_eq!(pool.lock_manager().holder_count(pid), readers.len());
    assert_eq!(pool.cached_page_count(), 1);

    for tid in readers {
        pool.transaction_complete(tid, true).unwrap();
    }
    assert_eq!(pool.lock_manager().holder_count(pid), 0);
}

#[test]
fn test_upgrade_blocked_by_other_reader() {
    let (_temp, db, table_id) = setup_test_db(1);
    let pool = db.buffer_pool();
    let pid = PageId::new(table_id, 0);
    let t1 = TransactionId::new();
    let t2 = TransactionId::new();

    pool.get_page(t1, pid, Permissions::ReadOnly).unwrap();
    pool.get_page(t2, pid, Permissions::ReadOnly).unwrap();

    let err = pool.insert_tuple(t1, table_id, row(1, 1)).unwrap_err();
    assert!(err.is_transaction_aborted());

    pool.transaction_complete(t2, true).unwrap();
    pool.insert_tuple(t1, table_id, row(1, 1)).unwrap();
    assert_eq!(
        pool.lock_manager().lock_mode(pid, t1),
        Some(crate::storage::LockMode::Exclusive)
    );
}

#[test]
fn test_insert_is_first_fit_and_grows_by_one_page() {
    let (temp, db, table_id) = setup_test_db(0);
    let pool = db.buffer_pool();
    let path = temp.path().join("scores.dat");
    let tid = TransactionId::new();

    pool.insert_tuple(tid, table_id, row(0, 0)).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), PAGE_SIZE as u64);

    for i in 1..slots_per_page() as i32 {
        pool.insert_tuple(tid, table_id, row(i, i)).unwrap();
    }
    assert_eq!(std::fs::metadata(&path).unwrap().len(), PAGE_SIZE as u64);

    pool.insert_tuple(tid, table_id, row(-1, 0)).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 2 * PAGE_SIZE as u64);
    assert_eq!(
        pool.dirty_pages(tid),
        vec![PageId::new(table_id, 0), PageId::new(table_id, 1)]
    );
}

#[test]
fn test_commit_is_durable_across_fresh_pool() {
    let (_temp, mut db, table_id) = setup_test_db(0);
    let tid = TransactionId::new();
    for i in 0..3 {
        db.buffer_pool().insert_tuple(tid, table_id, row(i, i * 10)).unwrap();
    }
    db.buffer_pool().transaction_complete(tid, true).unwrap();

    db.reset_buffer_pool(8);
    assert_eq!(db.buffer_pool().cached_page_count(), 0);
    assert_eq!(scan_ids(&db, table_id, TransactionId::new()), vec![0, 1, 2]);
}

#[test]
fn test_uncommitted_insert_lost_with_pool() {
    let (_temp, mut db, table_id) = setup_test_db(1);
    let tid = TransactionId::new();
    db.buffer_pool().insert_tuple(tid, table_id, row(1, 1)).unwrap();

    db.reset_buffer_pool(8);
    assert!(scan_ids(&db, table_id, TransactionId::new()).is_empty());
}

#[test]
fn test_all_dirty_cannot_evict() {
    let (_temp, mut db, table_id) = setup_test_db(2);
    db.reset_buffer_pool(1);
    let pool = db.buffer_pool();
    let tid = TransactionId::new();

    pool.insert_tuple(tid, table_id, row(1, 1)).unwrap();
    let err = pool
        .get_page(tid, PageId::new(table_id, 1), Permissions::ReadOnly)
        .unwrap_err();
    assert!(matches!(err, StorageError::CannotEvict));
    assert!(!err.is_transaction_aborted());

    pool.transaction_complete(tid, true).unwrap();
    let t2 = TransactionId::new();
    pool.get_page(t2, PageId::new(table_id, 1), Permissions::ReadOnly)
        .unwrap();
    assert!(!pool.is_cached(PageId::new(table_id, 0)));
}

#[test]
fn test_delete_and_scan() {
    let (_temp, db, table_id) = setup_test_db(0);
    let pool = db.buffer_pool();
    let t1 = TransactionId::new();
    for i in 0..5 {
        pool.insert_tuple(t1, table_id, row(i, 0)).unwrap();
    }
    pool.transaction_complete(t1, true).unwrap();

    let t2 = TransactionId::new();
    let file = db.catalog().database_file(table_id).unwrap();
    let victims: Vec<Tuple> = file
        .iter(pool, t2)
        .map(|t| t.unwrap())
        .filter(|t| matches!(t.field(0), Some(Field::Int(id)) if id % 2 == 1))
        .collect();
    assert_eq!(victims.len(), 2);
    for tuple in &victims {
        pool.delete_tuple(t2, tuple).unwrap();
    }
    pool.transaction_complete(t2, true).unwrap();

    assert_eq!(scan_ids(&db, table_id, TransactionId::new()), vec![0, 2, 4]);
}

/// Run `op` in its own transaction, retrying whenever a lock wait times out
fn run_with_retry(db: &Database, op: impl Fn(TransactionId) -> StorageResult<()>) {
    let pool = db.buffer_pool();
    loop {
        let tid = TransactionId::new();
        match op(tid) {
            Ok(()) => {
                pool.transaction_complete(tid, true).unwrap();
                return;
            }
            Err(err) if err.is_transaction_aborted() => {
                pool.transaction_complete(tid, false).unwrap();
            }
            Err(err) => panic!("unexpected error: {}", err),
        }
    }
}

#[test]
fn test_concurrent_inserts_then_deletes() {
    let (_temp, db, table_id) = setup_test_db(1);
    let pool = db.buffer_pool();
    let writers = 4;
    let per_writer = 20;

    thread::scope(|s| {
        for w in 0..writers {
            let db = &db;
            s.spawn(move || {
                for i in 0..per_writer {
                    run_with_retry(db, |tid| {
                        pool.insert_tuple(tid, table_id, row(w * 100 + i, i))
                    });
                }
            });
        }
    });

    let mut expected: Vec<i32> = (0..writers)
        .flat_map(|w| (0..per_writer).map(move |i| w * 100 + i))
        .collect();
    expected.sort_unstable();
    let mut ids = scan_ids(&db, table_id, TransactionId::new());
    ids.sort_unstable();
    assert_eq!(ids, expected);
    let file = db.catalog().database_file(table_id).unwrap();
    assert_eq!(file.num_pages().unwrap(), 1);

    let reader = TransactionId::new();
    let victims: Vec<Tuple> = file
        .iter(pool, reader)
        .map(|t| t.unwrap())
        .filter(|t| matches!(t.field(0), Some(Field::Int(id)) if id % 2 == 0))
        .collect();
    pool.transaction_complete(reader, true).unwrap();
    assert_eq!(victims.len(), expected.len() / 2);

    thread::scope(|s| {
        for chunk in victims.chunks(victims.len() / writers as usize) {
            let db = &db;
            s.spawn(move || {
                for tuple in chunk {
                    run_with_retry(db, |tid| pool.delete_tuple(tid, tuple));
                }
            });
        }
    });

    let mut ids = scan_ids(&db, table_id, TransactionId::new());
    ids.sort_unstable();
    let odd: Vec<i32> = expected.into_iter().filter(|id| id % 2 == 1).collect();
    assert_eq!(ids, odd);
    assert!(pool.lock_manager().locked_pages(reader).is_empty());
}

#[test]
fn test_delete_row_holding_nan() {
    let (temp, db, _) = setup_test_db(0);
    let table_id = db
        .create_table(
            temp.path().join("readings.dat"),
            "readings",
            TupleDesc::new(vec![
                ColumnDef::new("id", FieldType::Int, true),
                ColumnDef::nullable("value", FieldType::Float),
            ]),
        )
        .unwrap();
    let pool = db.buffer_pool();

    let t1 = TransactionId::new();
    pool.insert_tuple(t1, table_id, Tuple::new(vec![Field::Int(1), Field::Float(f64::NAN)]))
        .unwrap();
    pool.transaction_complete(t1, true).unwrap();

    let t2 = TransactionId::new();
    let page = pool
        .get_page(t2, PageId::new(table_id, 0), Permissions::ReadOnly)
        .unwrap();
    let stored = page.read().tuples();
    assert_eq!(stored.len(), 1);
    assert!(matches!(stored[0].field(1), Some(Field::Float(v)) if v.is_nan()));

    pool.delete_tuple(t2, &stored[0]).unwrap();
    pool.transaction_complete(t2, true).unwrap();
    assert!(scan_ids(&db, table_id, TransactionId::new()).is_empty());
}

#[test]
fn test_tables_do_not_share_pages() {
    let (temp, db, scores) = setup_test_db(0);
    let other = db
        .create_table(
            temp.path().join("names.dat"),
            "names",
            TupleDesc::from_pairs([("name", FieldType::Char(8))]),
        )
        .unwrap();
    assert_ne!(scores, other);

    let pool = db.buffer_pool();
    let tid = TransactionId::new();
    pool.insert_tuple(tid, scores, row(1, 1)).unwrap();
    pool.insert_tuple(tid, other, Tuple::new(vec![Field::Str("ada".to_string())]))
        .unwrap();

    let dirty = pool.dirty_pages(tid);
    assert_eq!(dirty.len(), 2);
    assert!(dirty.contains(&PageId::new(scores, 0)));
    assert!(dirty.contains(&PageId::new(other, 0)));

    // a tuple of one table cannot be inserted into the other
    assert!(pool.insert_tuple(tid, other, row(2, 2)).is_err());
}

#[test]
fn test_load_schema() {
    init_test_logger();
    let temp_dir = TempDir::new().unwrap();
    let schema_path = temp_dir.path().join("schema.json");
    std::fs::write(
        &schema_path,
        r#"{"tables": [
            {"name": "users", "file": "users.dat",
             "columns": [{"name": "id", "type": "INT", "not_null": true},
                         {"name": "email", "type": "VARCHAR(32)"}],
             "primary_key": "id"}
        ]}"#,
    )
    .unwrap();

    let db = Database::new(DbConfig::default()).unwrap();
    let ids = db.load_schema(&schema_path).unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(db.catalog().table_id("users").unwrap(), ids[0]);
    assert_eq!(
        db.catalog().primary_key(ids[0]).unwrap(),
        Some("id".to_string())
    );

    let tid = TransactionId::new();
    db.buffer_pool()
        .insert_tuple(
            tid,
            ids[0],
            Tuple::new(vec![Field::Int(1), Field::Str("a@b.c".to_string())]),
        )
        .unwrap();
    db.buffer_pool().transaction_complete(tid, true).unwrap();
    assert!(temp_dir.path().join("users.dat").exists());
}
