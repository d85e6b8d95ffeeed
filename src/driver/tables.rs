// src/driver/tables.rs

use std::collections::HashMap;

use crate::driver::{ActionId, ProvisionId};
use crate::tag::Tag;

/// The tag index: which provisions are findable under which tag.
///
/// Indexed both ways so that lookups by tag and teardown by provision are
/// both cheap. Rows are deduplicated; registering the same (tag, provision)
/// pair twice is a no-op.
#[derive(Debug, Default)]
pub(crate) struct TagTable {
    by_tag: HashMap<Tag, Vec<ProvisionId>>,
    by_provision: HashMap<ProvisionId, Vec<Tag>>,
}

impl TagTable {
    pub fn add(&mut self, tag: Tag, provision: ProvisionId) {
        let provisions = self.by_tag.entry(tag.clone()).or_default();
        if provisions.contains(&provision) {
            return;
        }
        provisions.push(provision);
        self.by_provision.entry(provision).or_default().push(tag);
    }

    /// Provisions registered under `tag`, in registration order.
    pub fn providers(&self, tag: &Tag) -> &[ProvisionId] {
        self.by_tag.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Remove every row mentioning `provision`. Returns the number of rows
    /// removed.
    pub fn erase_provision(&mut self, provision: ProvisionId) -> usize {
        let tags = match self.by_provision.remove(&provision) {
            Some(tags) => tags,
            None => return 0,
        };
        let mut removed = 0;
        for tag in &tags {
            if let Some(provisions) = self.by_tag.get_mut(tag) {
                let before = provisions.len();
                provisions.retain(|p| *p != provision);
                removed += before - provisions.len();
                if provisions.is_empty() {
                    self.by_tag.remove(tag);
                }
            }
        }
        removed
    }
}

/// One recorded lookup: while running, `action` asked for `tag` and was
/// handed `provision` (or nothing).
#[derive(Debug, Clone)]
pub(crate) struct DepRow {
    pub tag: Tag,
    pub action: ActionId,
    pub provision: Option<ProvisionId>,
}

/// The dependency table: every lookup an action performed, kept so the
/// driver can tell when a later registration changes the answer.
///
/// Rows live in a slab keyed by an internal row id; secondary indexes map
/// each of the three columns to row ids, so the table supports iteration and
/// erasure by any single column.
#[derive(Debug, Default)]
pub(crate) struct DependencyTable {
    rows: HashMap<u64, DepRow>,
    by_tag: HashMap<Tag, Vec<u64>>,
    by_action: HashMap<ActionId, Vec<u64>>,
    by_provision: HashMap<ProvisionId, Vec<u64>>,
    next_row: u64,
}

impl DependencyTable {
    pub fn add(&mut self, tag: Tag, action: ActionId, provision: Option<ProvisionId>) {
        let id = self.next_row;
        self.next_row += 1;

        self.by_tag.entry(tag.clone()).or_default().push(id);
        self.by_action.entry(action).or_default().push(id);
        if let Some(p) = provision {
            self.by_provision.entry(p).or_default().push(id);
        }
        self.rows.insert(
            id,
            DepRow {
                tag,
                action,
                provision,
            },
        );
    }

    /// Snapshot of (action, chosen provision) for every lookup of `tag`.
    /// Returned by value so callers can mutate the table while iterating.
    pub fn rows_for_tag(&self, tag: &Tag) -> Vec<(ActionId, Option<ProvisionId>)> {
        self.by_tag
            .get(tag)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.rows.get(id))
                    .map(|row| (row.action, row.provision))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of the actions whose recorded lookup chose `provision`.
    pub fn actions_for_provision(&self, provision: ProvisionId) -> Vec<ActionId> {
        self.by_provision
            .get(&provision)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.rows.get(id))
                    .map(|row| row.action)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_action(&self, action: ActionId) -> bool {
        self.by_action
            .get(&action)
            .is_some_and(|ids| !ids.is_empty())
    }

    /// Remove every row recorded by `action`. Returns rows removed.
    pub fn erase_action(&mut self, action: ActionId) -> usize {
        let ids = self.by_action.remove(&action).unwrap_or_default();
        self.remove_rows(&ids)
    }

    /// Remove every row whose chosen provision is `provision`. Returns rows
    /// removed.
    pub fn erase_provision(&mut self, provision: ProvisionId) -> usize {
        let ids = self.by_provision.remove(&provision).unwrap_or_default();
        self.remove_rows(&ids)
    }

    fn remove_rows(&mut self, ids: &[u64]) -> usize {
        let mut removed = 0;
        for id in ids {
            let Some(row) = self.rows.remove(id) else {
                continue;
            };
            removed += 1;
            prune(&mut self.by_tag, &row.tag, *id);
            prune(&mut self.by_action, &row.action, *id);
            if let Some(p) = row.provision {
                prune(&mut self.by_provision, &p, *id);
            }
        }
        removed
    }
}

fn prune<K: std::hash::Hash + Eq>(index: &mut HashMap<K, Vec<u64>>, key: &K, id: u64) {
    if let Some(ids) = index.get_mut(key) {
        ids.retain(|i| *i != id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}
