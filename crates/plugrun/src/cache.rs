//! # Call Cache
//!
//! Process-wide memo table owned by one supervisor. Keys are opaque strings,
//! values are anything serializable. There is no expiry and no eviction:
//! entries live until `clear()`.

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

#[derive(Debug)]
pub enum Error {
    /// The value could not be converted to or from its stored form.
    Serialization { key: String, message: String },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serialization { key, message } => {
                write!(f, "cache entry '{}' could not be converted: {}", key, message)
            }
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Default)]
pub struct CallCache {
    entries: DashMap<String, Value>,
}

impl CallCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn exists(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stores a typed value under `key`.
    pub fn put<T: Serialize>(&self, key: impl Into<String>, value: &T) -> Result<()> {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|e| Error::Serialization {
            key: key.clone(),
            message: e.to_string(),
        })?;
        self.set(key, value);
        Ok(())
    }

    /// Reads back a typed value. A missing key is `Ok(None)`.
    pub fn fetch<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(value) = self.get(key) else { return Ok(None) };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| Error::Serialization {
                key: key.to_string(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exists_follows_set() {
        let cache = CallCache::new();
        assert!(!cache.exists("k"));
        cache.set("k", json!(1));
        assert!(cache.exists("k"));
        assert_eq!(cache.get("k"), Some(json!(1)));
    }

    #[test]
    fn test_clear_empties_everything() {
        let cache = CallCache::new();
        cache.set("a", json!("x"));
        cache.set("b", json!({ "y": [1, 2] }));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get("a"), None);
        assert!(!cache.exists("b"));
    }

    #[test]
    fn test_set_overwrites() {
        let cache = CallCache::new();
        cache.set("k", json!(1));
        cache.set("k", json!(2));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k"), Some(json!(2)));
    }

    #[test]
    fn test_typed_round_trip_and_mismatch() {
        let cache = CallCache::new();
        cache.put("names", &vec!["a".to_string(), "b".to_string()]).unwrap();
        let names: Option<Vec<String>> = cache.fetch("names").unwrap();
        assert_eq!(names, Some(vec!["a".to_string(), "b".to_string()]));

        let missing: Option<u32> = cache.fetch("nope").unwrap();
        assert!(missing.is_none());

        let err = cache.fetch::<u32>("names").unwrap_err();
        assert!(err.to_string().contains("names"));
    }
}
