//! Persistent state store.
//!
//! A versioned key-value memory with three kinds of scope: per agent, per
//! zone, and a handful of named global registries. Every record carries the
//! schema version it was written with so readers can migrate lazily.
//! Payloads are JSON so migrations can rewrite them as a tree.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::StoreError;
use crate::types::{AgentId, ZoneId};

/// Named global registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Registry {
    ExpansionTargets,
    ScoutedZones,
    TaskTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Scope {
    Agent(AgentId),
    Zone(ZoneId),
    Global(Registry),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Agent(id) => write!(f, "agent/{}", id.0),
            Scope::Zone(z) => write!(f, "zone/{z}"),
            Scope::Global(r) => write!(f, "global/{r:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub version: u32,
    pub data: Vec<u8>,
}

pub trait StateStore {
    fn get(&self, scope: &Scope) -> Option<Record>;
    fn set(&mut self, scope: Scope, record: Record);
    fn remove(&mut self, scope: &Scope) -> Option<Record>;
    fn scopes(&self) -> Vec<Scope>;
}

/// In-process store. Serializable so the engine can save it whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStore {
    records: BTreeMap<Scope, Record>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, scope: &Scope) -> Option<Record> {
        self.records.get(scope).cloned()
    }

    fn set(&mut self, scope: Scope, record: Record) {
        self.records.insert(scope, record);
    }

    fn remove(&mut self, scope: &Scope) -> Option<Record> {
        self.records.remove(scope)
    }

    fn scopes(&self) -> Vec<Scope> {
        self.records.keys().copied().collect()
    }
}

/// Writes `value` as JSON under `scope`.
pub fn save_json<T: Serialize>(
    store: &mut dyn StateStore,
    scope: Scope,
    version: u32,
    value: &T,
) -> Result<(), StoreError> {
    let data = serde_json::to_vec(value).map_err(|source| StoreError::Encode {
        scope: scope.to_string(),
        source,
    })?;
    store.set(scope, Record { version, data });
    Ok(())
}

/// Reads the raw JSON tree under `scope` with its version stamp.
pub fn load_value(
    store: &dyn StateStore,
    scope: &Scope,
) -> Result<Option<(u32, serde_json::Value)>, StoreError> {
    let Some(record) = store.get(scope) else {
        return Ok(None);
    };
    let value = serde_json::from_slice(&record.data).map_err(|source| StoreError::Decode {
        scope: scope.to_string(),
        source,
    })?;
    Ok(Some((record.version, value)))
}

/// Reads and decodes the record under `scope`, failing on a version other
/// than `version`.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn StateStore,
    scope: &Scope,
    version: u32,
) -> Result<Option<T>, StoreError> {
    let Some(record) = store.get(scope) else {
        return Ok(None);
    };
    if record.version != version {
        return Err(StoreError::Version {
            scope: scope.to_string(),
            found: record.version,
            expected: version,
        });
    }
    let value = serde_json::from_slice(&record.data).map_err(|source| StoreError::Decode {
        scope: scope.to_string(),
        source,
    })?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_records_are_independent() {
        let mut store = MemoryStore::new();
        save_json(&mut store, Scope::Agent(AgentId(1)), 3, &"a").unwrap();
        save_json(&mut store, Scope::Zone(ZoneId::new(0, 0)), 1, &"z").unwrap();
        save_json(&mut store, Scope::Global(Registry::ScoutedZones), 1, &[1, 2]).unwrap();
        assert_eq!(store.len(), 3);

        let a: Option<String> = load_json(&store, &Scope::Agent(AgentId(1)), 3).unwrap();
        assert_eq!(a.as_deref(), Some("a"));
        let missing: Option<String> = load_json(&store, &Scope::Agent(AgentId(2)), 3).unwrap();
        assert!(missing.is_none());

        store.remove(&Scope::Agent(AgentId(1)));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_version_mismatch_is_reported() {
        let mut store = MemoryStore::new();
        save_json(&mut store, Scope::Global(Registry::TaskTable), 1, &0u32).unwrap();
        let err = load_json::<u32>(&store, &Scope::Global(Registry::TaskTable), 2).unwrap_err();
        assert!(matches!(err, StoreError::Version { found: 1, .. }));
    }

    #[test]
    fn test_corrupt_record_is_decode_error() {
        let mut store = MemoryStore::new();
        store.set(
            Scope::Zone(ZoneId::new(1, 1)),
            Record {
                version: 1,
                data: b"{not json".to_vec(),
            },
        );
        let err = load_value(&store, &Scope::Zone(ZoneId::new(1, 1))).unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));
    }
}
