//! Per-item deltas between two consecutive cart snapshots

use crate::models::{CartSnapshot, ItemMap, LineItem, TOTAL_EPSILON};

/// A single change between two item mappings
#[derive(Debug, Clone, PartialEq)]
pub enum DiffEntry {
    /// Name present only in the new mapping
    Added(LineItem),
    /// Name present in both, quantity or line total changed
    Updated { previous: LineItem, current: LineItem },
    /// Name present only in the old mapping
    Removed(LineItem),
}

impl DiffEntry {
    pub fn name(&self) -> &str {
        match self {
            DiffEntry::Added(item) | DiffEntry::Removed(item) => &item.name,
            DiffEntry::Updated { current, .. } => &current.name,
        }
    }
}

/// Ordered result of comparing two snapshots.
///
/// Added and updated entries come first, in the new snapshot's order, followed by
/// removed entries in the old snapshot's order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CartDiff {
    pub entries: Vec<DiffEntry>,
    pub total_changed: bool,
}

impl CartDiff {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn added(&self) -> impl Iterator<Item = &LineItem> {
        self.entries.iter().filter_map(|entry| match entry {
            DiffEntry::Added(item) => Some(item),
            _ => None,
        })
    }

    pub fn updated(&self) -> impl Iterator<Item = (&LineItem, &LineItem)> {
        self.entries.iter().filter_map(|entry| match entry {
            DiffEntry::Updated { previous, current } => Some((previous, current)),
            _ => None,
        })
    }

    pub fn removed(&self) -> impl Iterator<Item = &LineItem> {
        self.entries.iter().filter_map(|entry| match entry {
            DiffEntry::Removed(item) => Some(item),
            _ => None,
        })
    }
}

/// Compare two item mappings.
///
/// Quantity and line total are compared exactly; unit price changes alone do not
/// produce an update.
pub fn diff_items(old: &ItemMap, new: &ItemMap) -> Vec<DiffEntry> {
    let mut entries = Vec::new();

    for (name, current) in new {
        match old.get(name) {
            None => entries.push(DiffEntry::Added(current.clone())),
            Some(previous)
                if previous.quantity != current.quantity
                    || previous.line_total != current.line_total =>
            {
                entries.push(DiffEntry::Updated {
                    previous: previous.clone(),
                    current: current.clone(),
                });
            }
            Some(_) => {}
        }
    }

    for (name, previous) in old {
        if !new.contains_key(name) {
            entries.push(DiffEntry::Removed(previous.clone()));
        }
    }

    entries
}

/// Compare two snapshots, items and total.
pub fn diff_snapshots(old: &CartSnapshot, new: &CartSnapshot) -> CartDiff {
    CartDiff {
        entries: diff_items(&old.items, &new.items),
        total_changed: (new.total - old.total).abs() > TOTAL_EPSILON,
    }
}
