//! Opening handles with explicit settings

use crate::common::*;
use pdict::{BackendError, Dict, DictConfig, Durability, Error};
use std::time::Duration;

#[test]
fn missing_store_without_create() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.pdict");
    let config = DictConfig::default().create_if_missing(false);

    let result: pdict::Result<Dict<String, String>> = Dict::open_with_config(&path, config);
    match result {
        Err(Error::Backend(BackendError::StoreNotFound(p))) => assert_eq!(p, path),
        other => panic!("expected StoreNotFound, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn missing_store_is_created_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("new.pdict");
    let mut table = open::<String>(&path);
    table.set("state", "Created".to_string()).unwrap();
    assert!(path.exists());
}

#[test]
fn foreign_file_is_rejected() {
    let file = temp_store();
    std::fs::write(file.path(), b"{\"state\": \"Created\"} and some more bytes").unwrap();

    let result: pdict::Result<Dict<String, String>> = Dict::open(file.path());
    assert!(matches!(
        result,
        Err(Error::Backend(BackendError::InvalidFormat { .. }))
    ));
}

#[test]
fn config_loaded_from_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("pdict.toml");
    std::fs::write(
        &config_path,
        "durability = \"buffered\"\nlock_timeout_ms = 250\ncompact_on_open = true\n",
    )
    .unwrap();

    let config = DictConfig::from_file(&config_path).unwrap();
    assert_eq!(config.durability, Durability::Buffered);
    assert_eq!(config.lock_timeout_duration(), Some(Duration::from_millis(250)));
    assert!(config.create_if_missing);

    let store_path = dir.path().join("store.pdict");
    let mut table = open_with::<u32>(&store_path, config);
    table.set("k", 1).unwrap();
    assert_eq!(table.backend().durability(), Durability::Buffered);
}

#[test]
fn buffered_handles_see_each_other() {
    let file = temp_store();
    let config = DictConfig::default().durability(Durability::Buffered);
    let mut table_a = open_with::<u32>(file.path(), config.clone());
    let mut table_b = open_with::<u32>(file.path(), config);

    table_a.set("k", 1).unwrap();
    assert_eq!(*table_b.get("k").unwrap().read(), 1);
    table_a.set("k", 2).unwrap();
    assert_eq!(*table_b.get("k").unwrap().read(), 2);
}

#[test]
fn lock_timeout_surfaces_as_backend_error() {
    let file = temp_store();
    let config = DictConfig::default().lock_timeout(Duration::from_millis(30));
    let mut table = open_with::<u32>(file.path(), config);
    table.set("k", 1).unwrap();

    let holder = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(file.path())
        .unwrap();
    fs2::FileExt::lock_exclusive(&holder).unwrap();

    // A cached key still needs the version check, which needs the lock
    assert!(matches!(
        table.get("k"),
        Err(Error::Backend(BackendError::LockTimeout { .. }))
    ));
    assert_eq!(table.cached_len(), 1);

    fs2::FileExt::unlock(&holder).unwrap();
    assert_eq!(*table.get("k").unwrap().read(), 1);
}

#[test]
fn compact_on_open_shrinks_file() {
    let file = temp_store();
    {
        let mut table = open::<u32>(file.path());
        for i in 0..50 {
            table.set("k", i).unwrap();
        }
    }
    let before = std::fs::metadata(file.path()).unwrap().len();

    let config = DictConfig::default().compact_on_open(true);
    let mut table = open_with::<u32>(file.path(), config);
    assert!(std::fs::metadata(file.path()).unwrap().len() < before);
    assert_eq!(*table.get("k").unwrap().read(), 49);
}
