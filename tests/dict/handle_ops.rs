//! Single-handle operations beyond get/set

use crate::common::*;
use pdict::{BincodeCodec, CacheState, Codec, Dict, Error, JsonCodec, MemoryBackend, MsgpackCodec};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Job {
    name: String,
    attempts: u32,
    tags: Vec<String>,
}

fn job(name: &str) -> Job {
    Job {
        name: name.to_string(),
        attempts: 0,
        tags: strings(&["Created"]),
    }
}

#[test]
fn struct_values_round_trip() {
    let file = temp_store();
    let mut table_a = open::<Job>(file.path());
    let mut table_b = open::<Job>(file.path());

    table_a.set("ingest", job("ingest")).unwrap();
    assert_eq!(*table_b.get("ingest").unwrap().read(), job("ingest"));
}

#[test]
fn values_survive_reopen() {
    let file = temp_store();
    {
        let mut table = open::<Job>(file.path());
        table.set("ingest", job("ingest")).unwrap();
    }
    let mut table = open::<Job>(file.path());
    assert_eq!(table.get_cloned("ingest").unwrap(), job("ingest"));
}

#[test]
fn delete_then_get() {
    let file = temp_store();
    let mut table = open::<Job>(file.path());
    table.set("ingest", job("ingest")).unwrap();
    table.delete("ingest").unwrap();

    assert!(table.get("ingest").unwrap_err().is_key_not_found());
    assert!(table.delete("ingest").unwrap_err().is_key_not_found());
    assert_eq!(table.len().unwrap(), 0);
}

#[test]
fn key_not_found_carries_encoded_key() {
    let file = temp_store();
    let mut table = open::<Job>(file.path());
    match table.get("missing") {
        Err(Error::KeyNotFound(bytes)) => {
            assert_eq!(bytes, MsgpackCodec.encode("missing").unwrap());
        }
        other => panic!("expected KeyNotFound, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn pop_returns_value_and_removes_key() {
    let file = temp_store();
    let mut table_a = open::<Job>(file.path());
    let mut table_b = open::<Job>(file.path());
    table_a.set("ingest", job("ingest")).unwrap();

    assert_eq!(table_b.pop("ingest").unwrap(), job("ingest"));
    assert!(!table_a.contains("ingest").unwrap());
    assert!(table_a.get("ingest").unwrap_err().is_key_not_found());
}

#[test]
fn contains_does_not_populate_cache() {
    let file = temp_store();
    let mut table_a = open::<Job>(file.path());
    let mut table_b = open::<Job>(file.path());
    table_a.set("ingest", job("ingest")).unwrap();

    assert!(table_b.contains("ingest").unwrap());
    assert!(!table_b.contains("report").unwrap());
    assert_eq!(table_b.cached_len(), 0);
}

#[test]
fn keys_lists_live_keys() {
    let file = temp_store();
    let mut table = open::<u32>(file.path());
    for name in ["c", "a", "b"] {
        table.set(name, 1).unwrap();
    }
    table.delete("b").unwrap();

    let mut keys = table.keys().unwrap();
    keys.sort();
    assert_eq!(keys, strings(&["a", "c"]));
}

#[test]
fn clear_empties_store_for_every_handle() {
    let file = temp_store();
    let mut table_a = open::<u32>(file.path());
    let mut table_b = open::<u32>(file.path());
    for i in 0..10u32 {
        table_a.set(&i.to_string(), i).unwrap();
    }
    table_b.get("3").unwrap();

    assert_eq!(table_a.clear().unwrap(), 10);
    assert!(table_b.is_empty().unwrap());
    assert_eq!(table_b.cache_state("3").unwrap(), CacheState::Stale);
    assert!(table_b.get("3").unwrap_err().is_key_not_found());
}

#[test]
fn cache_state_transitions() {
    let file = temp_store();
    let mut table_a = open::<u32>(file.path());
    let mut table_b = open::<u32>(file.path());

    assert_eq!(table_b.cache_state("k").unwrap(), CacheState::Uncached);
    table_a.set("k", 1).unwrap();
    assert_eq!(table_b.cache_state("k").unwrap(), CacheState::Uncached);

    table_b.get("k").unwrap();
    assert_eq!(table_b.cache_state("k").unwrap(), CacheState::Fresh);

    table_a.set("k", 2).unwrap();
    assert_eq!(table_b.cache_state("k").unwrap(), CacheState::Stale);
    // Reporting does not refresh
    assert_eq!(table_b.cache_state("k").unwrap(), CacheState::Stale);

    table_b.get("k").unwrap();
    assert_eq!(table_b.cache_state("k").unwrap(), CacheState::Fresh);

    table_b.invalidate("k").unwrap();
    assert_eq!(table_b.cache_state("k").unwrap(), CacheState::Uncached);
}

#[test]
fn set_returns_increasing_stamps() {
    let file = temp_store();
    let mut table_a = open::<u32>(file.path());
    let mut table_b = open::<u32>(file.path());

    let v1 = table_a.set("k", 1).unwrap();
    let v2 = table_b.set("other", 1).unwrap();
    let v3 = table_a.set("k", 1).unwrap();
    assert!(v1 < v2 && v2 < v3);
}

#[test]
fn compaction_keeps_caches_fresh() {
    let file = temp_store();
    let mut table_a = open::<u32>(file.path());
    let mut table_b = open::<u32>(file.path());
    for i in 0..20 {
        table_a.set("hot", i).unwrap();
    }
    table_a.set("gone", 0).unwrap();
    table_a.delete("gone").unwrap();
    let cached = table_b.get("hot").unwrap();

    let stats = table_a.compact().unwrap();
    assert_eq!(stats.records_after, 1);
    assert!(stats.bytes_after < stats.bytes_before);

    assert_eq!(table_b.cache_state("hot").unwrap(), CacheState::Fresh);
    assert!(std::sync::Arc::ptr_eq(&table_b.get("hot").unwrap(), &cached));
    assert_eq!(*cached.read(), 19);

    table_b.set("gone", 5).unwrap();
    assert_eq!(*table_a.get("gone").unwrap().read(), 5);
    assert_eq!(table_a.path(), file.path());
}

#[test]
fn memory_backend_handles_share_store() {
    let store = MemoryBackend::new();
    let mut table_a: Dict<String, Vec<String>, _> =
        Dict::with_backend(store.clone(), MsgpackCodec);
    let mut table_b: Dict<String, Vec<String>, _> = Dict::with_backend(store, MsgpackCodec);

    table_a.set("state", strings(&["Created"])).unwrap();
    let l = table_a.get("state").unwrap();
    l.write().push("Another".to_string());
    assert_eq!(*table_b.get("state").unwrap().read(), strings(&["Created"]));

    table_a.set_shared("state", &l).unwrap();
    assert_eq!(
        *table_b.get("state").unwrap().read(),
        strings(&["Created", "Another"])
    );
}

#[test]
fn alternative_codecs() {
    let file = temp_store();
    let config = pdict::DictConfig::default();

    let backend = pdict::FileBackend::open(file.path(), &config).unwrap();
    let mut json: Dict<String, Job, _, JsonCodec> = Dict::with_backend(backend, JsonCodec);
    json.set("ingest", job("ingest")).unwrap();
    assert_eq!(json.get_cloned("ingest").unwrap(), job("ingest"));

    let store = MemoryBackend::new();
    let mut bin: Dict<u64, Job, _, BincodeCodec> = Dict::with_backend(store, BincodeCodec);
    bin.set(&7, job("seven")).unwrap();
    assert_eq!(bin.keys().unwrap(), vec![7]);
    assert_eq!(bin.get_cloned(&7).unwrap(), job("seven"));
}

#[test]
fn mismatched_value_type_is_codec_error() {
    let file = temp_store();
    let mut writer = open::<String>(file.path());
    let mut reader = open::<Job>(file.path());
    writer.set("ingest", "not a job".to_string()).unwrap();
    assert!(matches!(reader.get("ingest"), Err(Error::Codec(_))));
}
