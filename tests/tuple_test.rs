use std::sync::Arc;

use heapdb::storage::page::HeapPage;
use heapdb::tuple::{DataType, Schema, Tuple, TupleBuilder, Value};
use heapdb::{PageId, SlotId, TableId};

fn create_user_schema() -> Arc<Schema> {
    Schema::builder()
        .column("id", DataType::Integer)
        .column("name", DataType::Char(24))
        .nullable_column("email", DataType::Char(40))
        .column("age", DataType::SmallInt)
        .column("active", DataType::Boolean)
        .build_arc()
}

fn user(schema: &Arc<Schema>, id: i32, name: &str, email: Option<&str>, age: i16) -> Tuple {
    let builder = TupleBuilder::new(schema.clone()).value(id).value(name);
    let builder = match email {
        Some(email) => builder.value(email),
        None => builder.null(),
    };
    builder.value(age).value(id % 2 == 0).build()
}

fn pid(n: u32) -> PageId {
    PageId::new(TableId::new(1), n)
}

#[test]
fn test_tuple_size_calculation() {
    let schema = create_user_schema();
    // 1 null-bitmap byte + 4 + 24 + 40 + 2 + 1
    assert_eq!(schema.null_bitmap_size(), 1);
    assert_eq!(schema.tuple_size(), 72);
    assert_eq!(HeapPage::slots_per_page(4096, 72), 56);
}

#[test]
fn test_tuples_survive_page_encoding() {
    let schema = create_user_schema();
    let mut page = HeapPage::empty(pid(0), schema.clone(), 4096);

    let mut users = vec![
        user(&schema, 1, "Alice", Some("alice@example.com"), 30),
        user(&schema, 2, "Bob", None, 25),
        user(&schema, 3, "Charlie", Some("charlie@example.com"), 41),
    ];
    for u in users.iter_mut() {
        page.insert_tuple(u).unwrap();
    }

    let bytes = page.to_bytes();
    assert_eq!(bytes.len(), 4096);

    let decoded = HeapPage::new(pid(0), schema, &bytes).unwrap();
    let stored: Vec<_> = decoded.iter().cloned().collect();
    assert_eq!(stored, users);

    let bob = decoded.tuple(SlotId::new(1)).unwrap();
    assert_eq!(bob.value_by_name("name"), Some(&Value::from("Bob")));
    assert!(bob.value_by_name("email").unwrap().is_null());
    assert_eq!(bob.record_id(), users[1].record_id());
}

#[test]
fn test_all_data_types() {
    let schema = Schema::builder()
        .column("b", DataType::Boolean)
        .column("ti", DataType::TinyInt)
        .column("si", DataType::SmallInt)
        .column("i", DataType::Integer)
        .column("bi", DataType::BigInt)
        .column("f", DataType::Float)
        .column("d", DataType::Double)
        .column("c", DataType::Char(8))
        .column("ts", DataType::Timestamp)
        .build_arc();

    let mut tuple = Tuple::new(
        schema.clone(),
        vec![
            Value::Boolean(true),
            Value::TinyInt(-8),
            Value::SmallInt(-1600),
            Value::Integer(320_000),
            Value::BigInt(-64_000_000_000),
            Value::Float(1.5),
            Value::Double(-2.25),
            Value::String("abc".to_string()),
            Value::Timestamp(1_700_000_000),
        ],
    );
    assert!(tuple.conforms_to(&schema));

    let mut page = HeapPage::empty(pid(2), schema.clone(), 256);
    page.insert_tuple(&mut tuple).unwrap();

    let decoded = HeapPage::new(pid(2), schema, &page.to_bytes()).unwrap();
    assert_eq!(decoded.iter().next(), Some(&tuple));
}

#[test]
fn test_page_fills_to_exact_slot_count() {
    let schema = create_user_schema();
    let mut page = HeapPage::empty(pid(0), schema.clone(), 4096);

    for i in 0..56 {
        page.insert_tuple(&mut user(&schema, i, "x", None, 1)).unwrap();
    }
    assert_eq!(page.num_empty_slots(), 0);
    assert!(page.insert_tuple(&mut user(&schema, 99, "y", None, 1)).is_err());

    let decoded = HeapPage::new(pid(0), schema, &page.to_bytes()).unwrap();
    assert_eq!(decoded.iter().count(), 56);
}

#[test]
fn test_oversized_char_is_not_storable() {
    let schema = create_user_schema();
    let long_name = "n".repeat(25);
    let tuple = user(&schema, 1, &long_name, None, 1);
    assert!(!tuple.conforms_to(&schema));
}

#[test]
fn test_trailing_whitespace_survives_page_encoding() {
    let schema = Schema::builder().column("code", DataType::Char(4)).build_arc();
    let mut page = HeapPage::empty(pid(4), schema.clone(), 64);

    let mut stored = Vec::new();
    for code in ["a ", "x\t", "    ", ""] {
        let mut t = TupleBuilder::new(schema.clone()).value(code).build();
        page.insert_tuple(&mut t).unwrap();
        stored.push(t);
    }

    let decoded = HeapPage::new(pid(4), schema, &page.to_bytes()).unwrap();
    let reloaded: Vec<_> = decoded.iter().cloned().collect();
    assert_eq!(reloaded, stored);
    assert_eq!(decoded.iter().next().unwrap().value(0), Some(&Value::from("a ")));
}

#[test]
fn test_nul_in_char_is_not_storable() {
    let schema = Schema::builder().column("code", DataType::Char(4)).build_arc();
    let tuple = TupleBuilder::new(schema.clone()).value("a\0").build();
    assert!(!tuple.conforms_to(&schema));
}
