//! Member set arithmetic for bridges and bonds

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{ConflictError, NetworkError, ValidationError};
use crate::registry::KernelSnapshot;
use crate::types::{HaConfig, LinkKind};
use crate::Result;

/// Requested member change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberChange {
    /// Desired full member set
    Replace(Vec<String>),
    /// Explicit additions and removals
    Delta {
        #[serde(default)]
        add: Vec<String>,
        #[serde(default)]
        remove: Vec<String>,
    },
}

/// Members to detach and attach, both sorted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDiff {
    pub to_add: Vec<String>,
    pub to_remove: Vec<String>,
}

impl MembershipDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// `current ∪ to_add \ to_remove`, sorted
    pub fn apply(&self, current: &[String]) -> Vec<String> {
        let mut result: BTreeSet<String> = current.iter().cloned().collect();
        result.extend(self.to_add.iter().cloned());
        for member in &self.to_remove {
            result.remove(member);
        }
        result.into_iter().collect()
    }
}

/// Compute which members to add and remove to go from `current` to
/// `requested`.
///
/// A delta that both adds and removes the same member is a conflict.
/// Adding an existing member or removing an absent one is a no-op.
pub fn fetch_add_remove_from_list(current: &[String], requested: &MemberChange) -> Result<MembershipDiff> {
    let current: BTreeSet<&String> = current.iter().collect();

    let (add, remove): (BTreeSet<&String>, BTreeSet<&String>) = match requested {
        MemberChange::Replace(members) => {
            let requested: BTreeSet<&String> = members.iter().collect();
            (
                requested.difference(&current).copied().collect(),
                current.difference(&requested).copied().collect(),
            )
        }
        MemberChange::Delta { add, remove } => (add.iter().collect(), remove.iter().collect()),
    };

    let overlap: Vec<String> = add.intersection(&remove).map(|m| m.to_string()).collect();
    if !overlap.is_empty() {
        return Err(NetworkError::Conflict(ConflictError::AddRemoveOverlap {
            members: overlap,
        }));
    }

    Ok(MembershipDiff {
        to_add: add
            .into_iter()
            .filter(|m| !current.contains(m))
            .cloned()
            .collect(),
        to_remove: remove
            .into_iter()
            .filter(|m| current.contains(m))
            .cloned()
            .collect(),
    })
}

/// Checks a bridge port or bond slave candidate can be attached to `owner`.
///
/// Candidates must exist, be physical ports, hold no other attachment
/// (bridge, bond or VLAN) and not be controlled by HA.
pub fn validate_candidates(
    owner: &str,
    candidates: &[String],
    snapshot: &KernelSnapshot,
    physical_ports: &[String],
    ha: Option<&HaConfig>,
) -> Result<()> {
    let index = snapshot.attachments();
    let mut seen = BTreeSet::new();

    for candidate in candidates {
        if !seen.insert(candidate) {
            return Err(NetworkError::invalid("members", format!("{} listed twice", candidate)));
        }
        if candidate == owner {
            return Err(NetworkError::invalid("members", format!("{} cannot contain itself", owner)));
        }

        let link = snapshot
            .links
            .iter()
            .find(|l| &l.name == candidate)
            .ok_or_else(|| NetworkError::not_found("link", candidate.clone()))?;

        if link.kind != LinkKind::Physical || !physical_ports.contains(candidate) {
            return Err(NetworkError::Validation(ValidationError::WrongKind {
                name: candidate.clone(),
                expected: LinkKind::Physical.to_string(),
                actual: link.kind.to_string(),
            }));
        }

        if let Some(attachment) = index
            .attachments(candidate)
            .iter()
            .find(|a| a.owner != owner)
        {
            return Err(NetworkError::Conflict(ConflictError::MemberOwned {
                member: candidate.clone(),
                owner: attachment.owner.clone(),
            }));
        }

        if ha.map_or(false, |ha| ha.owns_link(candidate)) {
            return Err(NetworkError::Conflict(ConflictError::HaOwned {
                name: candidate.clone(),
            }));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::KernelLink;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_replace_reaches_requested_set() {
        let cases: [(&[&str], &[&str]); 5] = [
            (&["eth1", "eth2"], &["eth2", "eth3"]),
            (&["eth1", "eth2"], &["eth1", "eth2"]),
            (&[], &["eth1", "eth2"]),
            (&["eth1", "eth2", "eth3"], &["eth4", "eth5"]),
            (&["eth1"], &[]),
        ];

        for (current, requested) in cases {
            let current = names(current);
            let requested = names(requested);
            let diff =
                fetch_add_remove_from_list(&current, &MemberChange::Replace(requested.clone()))
                    .unwrap();

            let mut expected = requested.clone();
            expected.sort();
            assert_eq!(diff.apply(&current), expected);
            assert!(diff.to_add.iter().all(|m| !diff.to_remove.contains(m)));
        }
    }

    #[test]
    fn test_replace_diff_contents() {
        let diff = fetch_add_remove_from_list(
            &names(&["eth1", "eth2"]),
            &MemberChange::Replace(names(&["eth2", "eth3"])),
        )
        .unwrap();
        assert_eq!(diff.to_add, vec!["eth3"]);
        assert_eq!(diff.to_remove, vec!["eth1"]);
    }

    #[test]
    fn test_delta_overlap_is_conflict() {
        let err = fetch_add_remove_from_list(
            &names(&["eth1", "eth2"]),
            &MemberChange::Delta {
                add: names(&["eth3"]),
                remove: names(&["eth3", "eth1"]),
            },
        )
        .unwrap_err();

        match err {
            NetworkError::Conflict(ConflictError::AddRemoveOverlap { members }) => {
                assert_eq!(members, vec!["eth3"]);
            }
            other => panic!("Expected overlap conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_delta_ignores_noops() {
        let diff = fetch_add_remove_from_list(
            &names(&["eth1", "eth2"]),
            &MemberChange::Delta {
                add: names(&["eth2", "eth3"]),
                remove: names(&["eth4"]),
            },
        )
        .unwrap();
        assert_eq!(diff.to_add, vec!["eth3"]);
        assert!(diff.to_remove.is_empty());
    }

    fn snapshot() -> KernelSnapshot {
        let mut eth1 = KernelLink::new("eth1", LinkKind::Physical);
        eth1.master = Some("BR_lan".to_string());
        let mut vlan = KernelLink::new("VLAN_5", LinkKind::Vlan);
        vlan.parent = Some("eth3".to_string());
        vlan.vlan_id = Some(5);
        KernelSnapshot {
            links: vec![
                KernelLink::new("BR_lan", LinkKind::Bridge),
                eth1,
                KernelLink::new("eth2", LinkKind::Physical),
                KernelLink::new("eth3", LinkKind::Physical),
                vlan,
            ],
            addresses: Vec::new(),
        }
    }

    fn ports() -> Vec<String> {
        names(&["eth1", "eth2", "eth3"])
    }

    #[test]
    fn test_bridge_port_cannot_join_bond() {
        let err = validate_candidates("BOND_A", &names(&["eth1", "eth2"]), &snapshot(), &ports(), None)
            .unwrap_err();
        match err {
            NetworkError::Conflict(ConflictError::MemberOwned { member, owner }) => {
                assert_eq!(member, "eth1");
                assert_eq!(owner, "BR_lan");
            }
            other => panic!("Expected MemberOwned, got {other:?}"),
        }
    }

    #[test]
    fn test_vlan_parent_counts_as_attachment() {
        let err = validate_candidates("BR_lan", &names(&["eth3"]), &snapshot(), &ports(), None)
            .unwrap_err();
        assert!(matches!(err, NetworkError::Conflict(ConflictError::MemberOwned { .. })));
    }

    #[test]
    fn test_existing_member_of_same_owner_is_fine() {
        assert!(validate_candidates("BR_lan", &names(&["eth1", "eth2"]), &snapshot(), &ports(), None).is_ok());
    }

    #[test]
    fn test_candidate_checks() {
        let snap = snapshot();
        assert!(matches!(
            validate_candidates("BR_x", &names(&["eth9"]), &snap, &ports(), None),
            Err(NetworkError::NotFound { .. })
        ));
        assert!(matches!(
            validate_candidates("BR_x", &names(&["VLAN_5"]), &snap, &ports(), None),
            Err(NetworkError::Validation(ValidationError::WrongKind { .. }))
        ));
        assert!(matches!(
            validate_candidates("BR_x", &names(&["eth2", "eth2"]), &snap, &ports(), None),
            Err(NetworkError::Validation(_))
        ));
    }
}
