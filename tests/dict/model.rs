//! Two handles on one file must agree with a plain map

use crate::common::*;
use pdict::{Dict, DictConfig, Durability};
use proptest::prelude::*;
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum Op {
    Set { handle: usize, key: u8, value: Vec<u8> },
    Get { handle: usize, key: u8 },
    Append { handle: usize, key: u8, byte: u8 },
    Delete { handle: usize, key: u8 },
    Contains { handle: usize, key: u8 },
    Len { handle: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let handle = 0..2usize;
    let key = 0..6u8;
    prop_oneof![
        4 => (handle.clone(), key.clone(), proptest::collection::vec(any::<u8>(), 0..8))
            .prop_map(|(handle, key, value)| Op::Set { handle, key, value }),
        4 => (handle.clone(), key.clone()).prop_map(|(handle, key)| Op::Get { handle, key }),
        2 => (handle.clone(), key.clone(), any::<u8>())
            .prop_map(|(handle, key, byte)| Op::Append { handle, key, byte }),
        2 => (handle.clone(), key.clone()).prop_map(|(handle, key)| Op::Delete { handle, key }),
        1 => (handle.clone(), key).prop_map(|(handle, key)| Op::Contains { handle, key }),
        1 => handle.prop_map(|handle| Op::Len { handle }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn handles_agree_with_model(ops in proptest::collection::vec(op_strategy(), 1..60)) {
        let file = temp_store();
        let config = DictConfig::default().durability(Durability::Buffered);
        let mut handles: Vec<Dict<u8, Vec<u8>>> = (0..2)
            .map(|_| Dict::open_with_config(file.path(), config.clone()).unwrap())
            .collect();
        let mut model: HashMap<u8, Vec<u8>> = HashMap::new();

        for op in ops {
            match op {
                Op::Set { handle, key, value } => {
                    handles[handle].set(&key, value.clone()).unwrap();
                    model.insert(key, value);
                }
                Op::Get { handle, key } => {
                    let result = handles[handle].get(&key).map(|shared| shared.read().clone());
                    match model.get(&key) {
                        Some(expected) => prop_assert_eq!(&result.unwrap(), expected),
                        None => prop_assert!(result.unwrap_err().is_key_not_found()),
                    }
                }
                Op::Append { handle, key, byte } => {
                    let table = &mut handles[handle];
                    match table.get(&key) {
                        Ok(shared) => {
                            shared.write().push(byte);
                            table.set_shared(&key, &shared).unwrap();
                            if let Some(value) = model.get_mut(&key) {
                                value.push(byte);
                            }
                        }
                        Err(err) => {
                            prop_assert!(err.is_key_not_found());
                            prop_assert!(!model.contains_key(&key));
                        }
                    }
                }
                Op::Delete { handle, key } => {
                    let result = handles[handle].delete(&key);
                    match model.remove(&key) {
                        Some(_) => prop_assert!(result.is_ok()),
                        None => prop_assert!(result.unwrap_err().is_key_not_found()),
                    }
                }
                Op::Contains { handle, key } => {
                    prop_assert_eq!(
                        handles[handle].contains(&key).unwrap(),
                        model.contains_key(&key)
                    );
                }
                Op::Len { handle } => {
                    prop_assert_eq!(handles[handle].len().unwrap(), model.len());
                }
            }
        }

        for table in &mut handles {
            for key in 0..6u8 {
                match model.get(&key) {
                    Some(expected) => {
                        let value = table.get_cloned(&key).unwrap();
                        prop_assert_eq!(&value, expected);
                    }
                    None => prop_assert!(!table.contains(&key).unwrap()),
                }
            }
        }
    }
}
