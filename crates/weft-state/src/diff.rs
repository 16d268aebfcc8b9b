//! Contact diffing

use std::collections::HashMap;

use weft_core::ContactId;

use crate::snapshot::{AgentData, ContactData};

/// Partition of the contacts of two consecutive snapshots
///
/// `removed` and `common` follow the order of the old snapshot, `added` the
/// order of the new one. `common` pairs hold (old, new) data.
#[derive(Debug, Default)]
pub struct ContactDiff<'a> {
    pub added: Vec<&'a ContactData>,
    pub removed: Vec<&'a ContactData>,
    pub common: Vec<(&'a ContactData, &'a ContactData)>,
}

impl<'a> ContactDiff<'a> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.common.is_empty()
    }
}

/// Contacts keyed by id in first-seen order; a repeated id keeps the last entry
fn index(contacts: &[ContactData]) -> (Vec<&ContactId>, HashMap<&ContactId, &ContactData>) {
    let mut order = Vec::with_capacity(contacts.len());
    let mut map = HashMap::with_capacity(contacts.len());
    for contact in contacts {
        if map.insert(&contact.contact_id, contact).is_none() {
            order.push(&contact.contact_id);
        }
    }
    (order, map)
}

/// Diff `new` against `old`; with no previous snapshot every contact is added
pub fn diff_contacts<'a>(old: Option<&'a AgentData>, new: &'a AgentData) -> ContactDiff<'a> {
    let old_contacts = old.map(|o| o.snapshot.contacts.as_slice()).unwrap_or(&[]);
    let (old_order, old_map) = index(old_contacts);
    let (new_order, new_map) = index(&new.snapshot.contacts);

    let mut diff = ContactDiff::default();
    for id in old_order {
        let previous = old_map[id];
        match new_map.get(id) {
            Some(current) => diff.common.push((previous, *current)),
            None => diff.removed.push(previous),
        }
    }
    for id in new_order {
        if !old_map.contains_key(id) {
            diff.added.push(new_map[id]);
        }
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use weft_core::{ContactState, RoutingState};

    fn agent(ids: &[&str]) -> AgentData {
        ids.iter().fold(
            AgentData::new("Available", RoutingState::Routable),
            |data, id| data.with_contact(ContactData::new(*id, ContactState::Connected)),
        )
    }

    fn ids<'a>(contacts: impl IntoIterator<Item = &'a ContactData>) -> Vec<&'a str> {
        contacts.into_iter().map(|c| c.contact_id.as_str()).collect()
    }

    #[test]
    fn test_first_snapshot_is_all_added() {
        let new = agent(&["a", "b"]);
        let diff = diff_contacts(None, &new);
        assert_eq!(ids(diff.added.iter().copied()), vec!["a", "b"]);
        assert!(diff.removed.is_empty());
        assert!(diff.common.is_empty());
    }

    #[test]
    fn test_partition_and_order() {
        let old = agent(&["a", "b", "c"]);
        let new = agent(&["d", "c", "a"]);
        let diff = diff_contacts(Some(&old), &new);

        assert_eq!(ids(diff.added.iter().copied()), vec!["d"]);
        assert_eq!(ids(diff.removed.iter().copied()), vec!["b"]);
        assert_eq!(ids(diff.common.iter().map(|(o, _)| *o)), vec!["a", "c"]);
    }

    #[test]
    fn test_common_pairs_carry_both_states() {
        let old = AgentData::new("Available", RoutingState::Routable)
            .with_contact(ContactData::new("a", ContactState::Incoming));
        let new = AgentData::new("Available", RoutingState::Routable)
            .with_contact(ContactData::new("a", ContactState::Connected));
        let diff = diff_contacts(Some(&old), &new);
        let (before, after) = diff.common[0];
        assert_eq!(before.state(), ContactState::Incoming);
        assert_eq!(after.state(), ContactState::Connected);
    }

    #[test]
    fn test_identical_snapshots_are_all_common() {
        let snap = agent(&["a", "b"]);
        let diff = diff_contacts(Some(&snap), &snap);
        assert!(diff.added.is_empty() && diff.removed.is_empty());
        assert_eq!(diff.common.len(), 2);
        assert!(!diff.is_empty());
    }

    proptest! {
        #[test]
        fn prop_diff_is_a_partition(
            old in proptest::collection::vec(0u8..16, 0..10),
            new in proptest::collection::vec(0u8..16, 0..10),
        ) {
            let to_ids = |v: &[u8]| v.iter().map(|n| format!("c{}", n)).collect::<Vec<_>>();
            let old_ids = to_ids(&old);
            let new_ids = to_ids(&new);
            let old_data = agent(&old_ids.iter().map(String::as_str).collect::<Vec<_>>());
            let new_data = agent(&new_ids.iter().map(String::as_str).collect::<Vec<_>>());
            let diff = diff_contacts(Some(&old_data), &new_data);

            let added: HashSet<&str> = ids(diff.added.iter().copied()).into_iter().collect();
            let removed: HashSet<&str> = ids(diff.removed.iter().copied()).into_iter().collect();
            let common: HashSet<&str> = ids(diff.common.iter().map(|(o, _)| *o)).into_iter().collect();
            let old_set: HashSet<&str> = old_ids.iter().map(String::as_str).collect();
            let new_set: HashSet<&str> = new_ids.iter().map(String::as_str).collect();

            prop_assert!(added.is_disjoint(&removed));
            prop_assert!(added.is_disjoint(&common));
            prop_assert!(removed.is_disjoint(&common));
            prop_assert_eq!(&added, &new_set.difference(&old_set).copied().collect::<HashSet<_>>());
            prop_assert_eq!(&removed, &old_set.difference(&new_set).copied().collect::<HashSet<_>>());
            prop_assert_eq!(&common, &old_set.intersection(&new_set).copied().collect::<HashSet<_>>());
            prop_assert_eq!(diff.added.len(), added.len());
            prop_assert_eq!(diff.removed.len(), removed.len());
            prop_assert_eq!(diff.common.len(), common.len());
        }
    }
}
