//! Entity selection inside a persisted collection

use std::fmt;

use appnet_core::error::{ConflictError, NetworkError};
use appnet_core::Result;
use appnet_types::{InterfaceRecord, RouteKey, StaticRoute};

/// Which entities of a collection an operation touches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector<K> {
    All,
    One(K),
}

impl<K: fmt::Display> fmt::Display for Selector<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::All => write!(f, "*"),
            Selector::One(key) => write!(f, "{}", key),
        }
    }
}

/// A persisted entity with an identity and a merge policy
pub trait Keyed {
    type Key: PartialEq + Clone + fmt::Display;

    /// Entity kind used in `NotFound` errors
    const KIND: &'static str;

    fn key(&self) -> Self::Key;

    /// Fold `incoming` (same key) into `self`
    fn merge(&mut self, incoming: Self);
}

impl Keyed for InterfaceRecord {
    type Key = String;
    const KIND: &'static str = "interface";

    fn key(&self) -> String {
        self.name.clone()
    }

    fn merge(&mut self, incoming: Self) {
        InterfaceRecord::merge(self, incoming)
    }
}

impl Keyed for StaticRoute {
    type Key = RouteKey;
    const KIND: &'static str = "static route";

    fn key(&self) -> RouteKey {
        StaticRoute::key(self)
    }

    fn merge(&mut self, incoming: Self) {
        *self = incoming;
    }
}

/// `All` replaces the collection; `One` merges into the matching entity or
/// appends a new one.
pub fn apply_update<T: Keyed>(
    items: &mut Vec<T>,
    fragment: Vec<T>,
    selector: &Selector<T::Key>,
) -> Result<()> {
    match selector {
        Selector::All => {
            check_unique(&fragment)?;
            *items = fragment;
        }
        Selector::One(key) => {
            let mut fragment = fragment.into_iter();
            let incoming = match (fragment.next(), fragment.next()) {
                (Some(incoming), None) => incoming,
                _ => {
                    return Err(NetworkError::invalid(
                        "fragment",
                        format!("expected exactly one entry for {}", key),
                    ))
                }
            };
            if &incoming.key() != key {
                return Err(NetworkError::invalid(
                    "fragment",
                    format!("entry {} does not match selector {}", incoming.key(), key),
                ));
            }

            match items.iter_mut().find(|item| &item.key() == key) {
                Some(existing) => existing.merge(incoming),
                None => items.push(incoming),
            }
        }
    }
    Ok(())
}

/// `All` empties the collection; `One` removes the matching entity.
pub fn apply_delete<T: Keyed>(items: &mut Vec<T>, selector: &Selector<T::Key>) -> Result<()> {
    match selector {
        Selector::All => items.clear(),
        Selector::One(key) => {
            let position = items
                .iter()
                .position(|item| &item.key() == key)
                .ok_or_else(|| NetworkError::not_found(T::KIND, key.to_string()))?;
            items.remove(position);
        }
    }
    Ok(())
}

pub fn select<T: Keyed + Clone>(items: &[T], selector: &Selector<T::Key>) -> Result<Vec<T>> {
    match selector {
        Selector::All => Ok(items.to_vec()),
        Selector::One(key) => items
            .iter()
            .find(|item| &item.key() == key)
            .cloned()
            .map(|item| vec![item])
            .ok_or_else(|| NetworkError::not_found(T::KIND, key.to_string())),
    }
}

pub fn check_unique<T: Keyed>(items: &[T]) -> Result<()> {
    for (i, item) in items.iter().enumerate() {
        let key = item.key();
        if items[..i].iter().any(|other| other.key() == key) {
            return Err(NetworkError::Conflict(ConflictError::DuplicateKey {
                key: key.to_string(),
            }));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use appnet_types::{ConfigSpecificFields, LinkKind};

    fn record(name: &str, mtu: u32) -> InterfaceRecord {
        let mut record = InterfaceRecord::new(name, LinkKind::Physical);
        record.mtu = Some(mtu);
        record
    }

    #[test]
    fn test_update_one_merges() {
        let specific = ConfigSpecificFields {
            domain_name: Some("lab.local".to_string()),
            ..Default::default()
        };
        let mut items = vec![record("eth0", 1500).with_specific(specific.clone()), record("eth1", 1500)];

        apply_update(&mut items, vec![record("eth0", 9000)], &Selector::One("eth0".to_string())).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].mtu, Some(9000));
        // absent specific fields leave the persisted ones alone
        assert_eq!(items[0].specific, Some(specific));
        assert_eq!(items[1].mtu, Some(1500));
    }

    #[test]
    fn test_update_one_appends_and_checks_key() {
        let mut items = vec![record("eth0", 1500)];
        apply_update(&mut items, vec![record("eth2", 1500)], &Selector::One("eth2".to_string())).unwrap();
        assert_eq!(items.len(), 2);

        assert!(apply_update(&mut items, vec![record("eth3", 1500)], &Selector::One("eth4".to_string())).is_err());
        assert!(apply_update(&mut items, Vec::new(), &Selector::One("eth4".to_string())).is_err());
    }

    #[test]
    fn test_update_all_rejects_duplicates() {
        let mut items = Vec::new();
        let err = apply_update(&mut items, vec![record("eth0", 1), record("eth0", 2)], &Selector::All).unwrap_err();
        assert!(matches!(err, NetworkError::Conflict(ConflictError::DuplicateKey { .. })));
    }

    #[test]
    fn test_delete_absent_is_not_found() {
        let mut items = vec![record("eth0", 1500)];
        let err = apply_delete(&mut items, &Selector::One("eth5".to_string())).unwrap_err();
        assert!(matches!(err, NetworkError::NotFound { kind: "interface", .. }));

        apply_delete(&mut items, &Selector::One("eth0".to_string())).unwrap();
        assert!(items.is_empty());
    }
}
