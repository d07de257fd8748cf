use std::sync::Arc;
use std::thread;

use crossbeam_channel::unbounded;

use heapdb::storage::heap::HeapFile;
use heapdb::tuple::{DataType, Schema, TupleBuilder};
use heapdb::{Database, DbConfig, Result};

const WORKERS: usize = 4;
const ROWS_PER_WORKER: i32 = 25;
const MAX_ATTEMPTS: usize = 20;

/// Outcome of one worker thread
struct WorkerReport {
    worker: usize,
    inserted: i32,
    error: Option<String>,
}

fn run_worker(db: &Database, table: &HeapFile, schema: &Arc<Schema>, worker: usize) -> Result<i32> {
    let mut inserted = 0;
    for i in 0..ROWS_PER_WORKER {
        let id = worker as i32 * 1000 + i;
        db.run_transaction(MAX_ATTEMPTS, |txn| {
            let mut row = TupleBuilder::new(schema.clone())
                .value(id)
                .value(worker as i32)
                .build();
            txn.insert_tuple(table.table_id(), &mut row)
        })?;
        inserted += 1;
    }
    Ok(inserted)
}

fn main() -> Result<()> {
    println!("heapdb - heap file storage kernel");
    println!("=================================\n");

    let dir = std::env::temp_dir().join(format!("heapdb-demo-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;

    let db = Arc::new(Database::new(DbConfig::default().with_buffer_pool_pages(16)));
    let schema = Schema::builder()
        .column("id", DataType::Integer)
        .column("worker", DataType::Integer)
        .build_arc();
    let table = db.create_table(dir.join("demo.dat"), schema.clone())?;
    println!("Created table {} at {}", table.table_id(), table.path().display());

    let (tx, rx) = unbounded();
    let handles: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let db = Arc::clone(&db);
            let table = Arc::clone(&table);
            let schema = schema.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                let report = match run_worker(&db, &table, &schema, worker) {
                    Ok(inserted) => WorkerReport { worker, inserted, error: None },
                    Err(e) => WorkerReport { worker, inserted: 0, error: Some(e.to_string()) },
                };
                let _ = tx.send(report);
            })
        })
        .collect();
    drop(tx);

    for report in rx.iter() {
        match report.error {
            None => println!("  worker {}: inserted {} rows", report.worker, report.inserted),
            Some(e) => println!("  worker {}: failed: {}", report.worker, e),
        }
    }
    for handle in handles {
        let _ = handle.join();
    }

    let txn = db.begin();
    let mut count = 0;
    for tuple in txn.scan(&table) {
        tuple?;
        count += 1;
    }
    txn.commit()?;

    println!("\nScanned {} rows across {} pages", count, table.num_pages()?);
    println!("Page reads: {}, page writes: {}", table.num_reads(), table.num_writes());

    drop(table);
    std::fs::remove_dir_all(&dir).ok();
    println!("\nDemo completed successfully!");
    Ok(())
}
