//! Delta resolution between a local and a remote snapshot.
//!
//! One algorithm serves both task items and task collections; each kind
//! supplies its notion of identity and staleness through [`Reconcilable`].

use std::collections::{HashMap, HashSet};

use tracing::{debug, error};

use crate::collection::TaskCollection;
use crate::delta::Delta;
use crate::error::{Error, Result};
use crate::task::TaskItem;

/// Identity and staleness rules for something that can be synced.
pub trait Reconcilable: Clone {
    fn id(&self) -> Option<&str>;

    fn modified_time(&self) -> i64;

    /// True when the user-visible fields match.
    fn has_same_properties(&self, other: &Self) -> bool;

    /// True when two id-less snapshots describe the same unsynced entry.
    fn same_snapshot(&self, other: &Self) -> bool;

    /// Remote-only entries are added locally only when their group already
    /// exists locally.
    fn group_key(&self) -> Option<&str>;

    /// True for the remote catch-all list (or items inside it).
    fn is_default_collection(&self) -> bool;

    /// Both sides carry the same non-empty id.
    fn equals(&self, other: &Self) -> bool {
        matches!((self.id(), other.id()), (Some(a), Some(b)) if a == b)
    }

    fn is_older_version_of(&self, other: &Self) -> bool {
        self.equals(other)
            && !self.has_same_properties(other)
            && self.modified_time() < other.modified_time()
    }

    fn same_unsynced(&self, other: &Self) -> bool {
        self.id().is_none() && other.id().is_none() && self.same_snapshot(other)
    }
}

pub fn compute_collection_deltas(
    origin: &[TaskCollection],
    remote: &[TaskCollection],
    known: Delta<TaskCollection>,
) -> Result<Delta<TaskCollection>> {
    resolve(origin, remote, known)
}

pub fn compute_item_deltas(
    origin: &[TaskItem],
    remote: &[TaskItem],
    known: Delta<TaskItem>,
) -> Result<Delta<TaskItem>> {
    resolve(origin, remote, known)
}

/// Like [`compute_item_deltas`], but remote-only items are accepted for any
/// group in `local_groups` as well as the groups of `origin` items.
pub fn compute_item_deltas_with_groups(
    origin: &[TaskItem],
    remote: &[TaskItem],
    known: Delta<TaskItem>,
    local_groups: &HashSet<Option<String>>,
) -> Result<Delta<TaskItem>> {
    let mut groups: HashSet<Option<&str>> = local_groups.iter().map(Option::as_deref).collect();
    groups.extend(origin.iter().map(|entry| entry.group_key()));
    resolve_within(origin, remote, known, &groups)
}

/// Classify every difference between `origin` and `remote` that `known`
/// does not already account for, appending to `known`.
pub fn resolve<T: Reconcilable>(origin: &[T], remote: &[T], known: Delta<T>) -> Result<Delta<T>> {
    let groups: HashSet<Option<&str>> = origin.iter().map(|entry| entry.group_key()).collect();
    resolve_within(origin, remote, known, &groups)
}

fn resolve_within<T: Reconcilable>(
    origin: &[T],
    remote: &[T],
    known: Delta<T>,
    groups: &HashSet<Option<&str>>,
) -> Result<Delta<T>> {
    let mut delta = known;

    let origin_set = filter_known(origin, delta.origin_filters())?;
    let mut remote_set = filter_known(remote, delta.remote_filters())?;
    let mut resolved = 0usize;

    for entry in origin_set {
        let id = match entry.id().map(str::to_owned) {
            Some(id) => id,
            None => {
                delta.to_remote.add.push(entry);
                continue;
            }
        };

        match remote_set
            .iter()
            .position(|candidate| candidate.id() == Some(id.as_str()))
        {
            None => {
                if !delta.to_origin.remove_id.iter().any(|queued| queued.equals(&entry)) {
                    delta.to_origin.remove_id.push(entry);
                }
            }
            Some(index) => {
                let counterpart = remote_set.remove(index);
                if entry.is_older_version_of(&counterpart) {
                    delta.to_origin.modify.push(counterpart);
                } else if counterpart.is_older_version_of(&entry) {
                    delta.to_remote.modify.push(entry);
                } else {
                    resolved += 1;
                }
            }
        }
    }

    for entry in remote_set {
        if entry.is_default_collection() {
            continue;
        }
        if !groups.contains(&entry.group_key()) {
            debug!(id = ?entry.id(), group = ?entry.group_key(), "skipping remote entry in unknown group");
            continue;
        }
        delta.to_origin.add.push(entry);
    }

    debug!(
        resolved,
        to_origin = delta.to_origin.len(),
        to_remote = delta.to_remote.len(),
        "resolved delta"
    );
    Ok(delta)
}

/// Drop every entry of `list` already covered by `filters`.
///
/// Each identified filter must remove exactly one entry; anything else means
/// ids are duplicated or a pending change lost its counterpart. Id-less
/// filters are matched by content and are not counted.
fn filter_known<'a, T>(list: &[T], filters: impl Iterator<Item = &'a T>) -> Result<Vec<T>>
where
    T: Reconcilable + 'a,
{
    let mut ids: HashMap<&str, usize> = HashMap::new();
    let mut unsynced: Vec<&T> = Vec::new();
    for filter in filters {
        match filter.id() {
            Some(id) => *ids.entry(id).or_default() += 1,
            None => unsynced.push(filter),
        }
    }

    let expected: usize = ids.values().sum();
    let mut removed = 0usize;
    let kept = list
        .iter()
        .filter(|entry| {
            if let Some(id) = entry.id() {
                if ids.contains_key(id) {
                    removed += 1;
                    return false;
                }
                return true;
            }
            match unsynced.iter().position(|filter| filter.same_unsynced(entry)) {
                Some(index) => {
                    unsynced.swap_remove(index);
                    false
                }
                None => true,
            }
        })
        .cloned()
        .collect();

    if removed != expected {
        error!(
            filters = expected,
            removed, "known delta does not match snapshot"
        );
        return Err(Error::IdentityMismatch {
            filters: expected,
            removed,
        });
    }
    Ok(kept)
}
