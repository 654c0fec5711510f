//! `len` is always answered by the backing store

use crate::common::*;

#[test]
fn length_counts_each_new_key() {
    let file = temp_store();
    let mut table_a = open_keyed::<i64, String>(file.path());

    table_a.set(&1, "Created".to_string()).unwrap();
    assert_eq!(table_a.len().unwrap(), 1);
    table_a.set(&2, "Created".to_string()).unwrap();
    assert_eq!(table_a.len().unwrap(), 2);
    table_a.set(&3, "Created".to_string()).unwrap();
    assert_eq!(table_a.len().unwrap(), 3);
    table_a.set(&4, "Created".to_string()).unwrap();
    assert_eq!(table_a.len().unwrap(), 4);
    table_a.set(&5, "Created".to_string()).unwrap();
    assert_eq!(table_a.len().unwrap(), 5);
}

#[test]
fn length_agrees_across_handles() {
    let file = temp_store();
    let mut writer = open_keyed::<i64, String>(file.path());
    let counter = open_keyed::<i64, String>(file.path());

    for n in 1..=5 {
        writer.set(&n, "Created".to_string()).unwrap();
        assert_eq!(counter.len().unwrap(), n as usize);
        assert_eq!(counter.cached_len(), 0);
    }
}

#[test]
fn overwrite_does_not_change_length() {
    let file = temp_store();
    let mut table = open::<String>(file.path());
    table.set("state", "Created".to_string()).unwrap();
    table.set("state", "Changed".to_string()).unwrap();
    assert_eq!(table.len().unwrap(), 1);
}

#[test]
fn length_ignores_cache_contents() {
    let file = temp_store();
    let mut table_a = open::<i64>(file.path());
    let mut table_b = open::<i64>(file.path());

    table_a.set("a", 1).unwrap();
    table_a.set("b", 2).unwrap();
    table_b.get("a").unwrap();
    table_b.get("b").unwrap();

    table_a.delete("a").unwrap();
    assert_eq!(table_b.cached_len(), 2);
    assert_eq!(table_b.len().unwrap(), 1);

    table_b.invalidate_all();
    assert_eq!(table_b.len().unwrap(), 1);
    assert!(!table_b.is_empty().unwrap());
}

#[test]
fn empty_store() {
    let file = temp_store();
    let table = open::<i64>(file.path());
    assert_eq!(table.len().unwrap(), 0);
    assert!(table.is_empty().unwrap());
}
