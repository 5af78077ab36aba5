//! Serde helper for maps keyed by structs.
//!
//! JSON objects only allow string keys, so these maps are written as a list of
//! `{"key": ..., "value": ...}` entries. Use with `#[serde(with = "keyed")]`.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub fn serialize<K, V, S>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
where
    K: Serialize,
    V: Serialize,
    S: Serializer,
{
    #[derive(Serialize)]
    struct Entry<'a, K, V> {
        key: &'a K,
        value: &'a V,
    }

    serializer.collect_seq(map.iter().map(|(key, value)| Entry { key, value }))
}

pub fn deserialize<'de, K, V, D>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
where
    K: Deserialize<'de> + Ord,
    V: Deserialize<'de>,
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Entry<K, V> {
        key: K,
        value: V,
    }

    let entries: Vec<Entry<K, V>> = Vec::deserialize(deserializer)?;
    let mut map = BTreeMap::new();
    for entry in entries {
        if map.insert(entry.key, entry.value).is_some() {
            return Err(D::Error::custom("duplicate key in keyed map"));
        }
    }
    Ok(map)
}
