//! Relay registry: the static name → index → pin table.
//!
//! Built once at daemon startup from the `[[relays]]` configuration and
//! never mutated afterwards, so it is shared read-only without locking.

use std::collections::HashMap;

use relayctl_config::{RESERVED_RELAY_NAMES, RelayConfig};

/// One named relay and the expander pin that drives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayDefinition {
    pub name: String,
    pub index: usize,
    pub pin: u8,
}

impl From<&RelayConfig> for RelayDefinition {
    fn from(config: &RelayConfig) -> Self {
        Self {
            name: config.name.clone(),
            index: config.index,
            pin: config.pin,
        }
    }
}

/// Errors from building the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("relay table is empty")]
    Empty,

    #[error("relay name {0:?} is reserved")]
    ReservedName(String),

    #[error("duplicate relay name {0:?}")]
    DuplicateName(String),

    #[error("pin {pin} is assigned to both {first:?} and {second:?}")]
    DuplicatePin {
        pin: u8,
        first: String,
        second: String,
    },

    #[error("relay indices must cover 0..{expected} exactly once (offending index {index} on {name:?})")]
    NonDenseIndex {
        name: String,
        index: usize,
        expected: usize,
    },
}

/// Ordered, immutable relay table with name and index lookups.
#[derive(Debug, Clone)]
pub struct RelayRegistry {
    /// Sorted by index; position `i` holds the relay with index `i`.
    relays: Vec<RelayDefinition>,
    by_name: HashMap<String, usize>,
}

impl RelayRegistry {
    /// Build a registry, rejecting duplicate names, duplicate pins, and
    /// index sets that are not exactly `0..N`.
    pub fn new(definitions: Vec<RelayDefinition>) -> Result<Self, RegistryError> {
        if definitions.is_empty() {
            return Err(RegistryError::Empty);
        }

        let count = definitions.len();
        let mut slots: Vec<Option<RelayDefinition>> = vec![None; count];
        let mut pins: HashMap<u8, String> = HashMap::with_capacity(count);
        let mut by_name = HashMap::with_capacity(count);

        for def in definitions {
            if RESERVED_RELAY_NAMES.contains(&def.name.as_str()) {
                return Err(RegistryError::ReservedName(def.name));
            }
            if by_name.insert(def.name.clone(), def.index).is_some() {
                return Err(RegistryError::DuplicateName(def.name));
            }
            if let Some(first) = pins.insert(def.pin, def.name.clone()) {
                return Err(RegistryError::DuplicatePin {
                    pin: def.pin,
                    first,
                    second: def.name,
                });
            }
            match slots.get_mut(def.index) {
                Some(slot) if slot.is_none() => *slot = Some(def),
                _ => {
                    return Err(RegistryError::NonDenseIndex {
                        name: def.name,
                        index: def.index,
                        expected: count,
                    });
                }
            }
        }

        // Every slot is filled: N distinct indices all below N.
        let relays = slots.into_iter().flatten().collect();
        Ok(Self { relays, by_name })
    }

    /// Build a registry from the configured relay table.
    pub fn from_config(relays: &[RelayConfig]) -> Result<Self, RegistryError> {
        Self::new(relays.iter().map(RelayDefinition::from).collect())
    }

    /// Look up a relay by name.
    pub fn resolve(&self, name: &str) -> Option<&RelayDefinition> {
        self.by_name.get(name).and_then(|&index| self.relays.get(index))
    }

    /// Look up a relay by its index.
    pub fn by_index(&self, index: usize) -> Option<&RelayDefinition> {
        self.relays.get(index)
    }

    /// All relays, ordered by index.
    pub fn all(&self) -> &[RelayDefinition] {
        &self.relays
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.relays.iter().map(|r| r.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn def(name: &str, index: usize, pin: u8) -> RelayDefinition {
        RelayDefinition {
            name: name.to_string(),
            index,
            pin,
        }
    }

    #[test]
    fn test_default_board_registry() {
        let config = relayctl_config::AppConfig::default();
        let registry = RelayRegistry::from_config(&config.relays).unwrap();
        assert_eq!(registry.len(), 7);
        assert_eq!(registry.resolve("plants").unwrap().pin, 7);
        assert_eq!(registry.by_index(6).unwrap().name, "pump2");
    }

    #[test]
    fn test_all_is_ordered_by_index() {
        let registry = RelayRegistry::new(vec![
            def("pump", 2, 5),
            def("front", 0, 10),
            def("back", 1, 6),
        ])
        .unwrap();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names, vec!["front", "back", "pump"]);
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = RelayRegistry::new(vec![def("valve1", 0, 10)]).unwrap();
        assert_eq!(registry.resolve("valve99"), None);
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(RelayRegistry::new(vec![]).unwrap_err(), RegistryError::Empty);
    }

    #[test]
    fn test_rejects_duplicate_name() {
        let err = RelayRegistry::new(vec![def("valve1", 0, 10), def("valve1", 1, 6)]).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("valve1".to_string()));
    }

    #[test]
    fn test_rejects_duplicate_pin() {
        let err = RelayRegistry::new(vec![def("valve1", 0, 10), def("valve2", 1, 10)]).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicatePin { pin: 10, .. }));
    }

    #[test]
    fn test_rejects_gap_in_indices() {
        let err = RelayRegistry::new(vec![def("valve1", 0, 10), def("valve2", 2, 6)]).unwrap_err();
        assert!(matches!(err, RegistryError::NonDenseIndex { index: 2, .. }));
    }

    #[test]
    fn test_rejects_repeated_index() {
        let err = RelayRegistry::new(vec![def("valve1", 0, 10), def("valve2", 0, 6)]).unwrap_err();
        assert!(matches!(err, RegistryError::NonDenseIndex { index: 0, .. }));
    }

    #[test]
    fn test_rejects_reserved_name() {
        let err = RelayRegistry::new(vec![def("all", 0, 1)]).unwrap_err();
        assert_eq!(err, RegistryError::ReservedName("all".to_string()));
        let err = RelayRegistry::new(vec![def("error", 0, 1)]).unwrap_err();
        assert_eq!(err, RegistryError::ReservedName("error".to_string()));
    }
}
