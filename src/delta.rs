//! Pending changes between the local vault and the remote service.
//!
//! A `Delta` is the ledger of work that has been discovered but not yet
//! applied. It survives across fetches so the same change is not reported
//! twice, and it is emptied only after a successful sync.

use serde::Serialize;

use crate::resolver::Reconcilable;

/// Changes discovered remotely that must be written locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OriginDelta<T> {
    pub add: Vec<T>,
    pub modify: Vec<T>,
    /// Local entries pointing at a remote entity that no longer exists.
    pub remove_id: Vec<T>,
}

/// Changes discovered locally that must be pushed to the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteDelta<T> {
    pub add: Vec<T>,
    pub modify: Vec<T>,
    pub delete: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delta<T> {
    pub to_origin: OriginDelta<T>,
    pub to_remote: RemoteDelta<T>,
}

impl<T> Default for OriginDelta<T> {
    fn default() -> Self {
        Self {
            add: Vec::new(),
            modify: Vec::new(),
            remove_id: Vec::new(),
        }
    }
}

impl<T> Default for RemoteDelta<T> {
    fn default() -> Self {
        Self {
            add: Vec::new(),
            modify: Vec::new(),
            delete: Vec::new(),
        }
    }
}

impl<T> Default for Delta<T> {
    fn default() -> Self {
        Self {
            to_origin: OriginDelta::default(),
            to_remote: RemoteDelta::default(),
        }
    }
}

impl<T> OriginDelta<T> {
    pub fn len(&self) -> usize {
        self.add.len() + self.modify.len() + self.remove_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> RemoteDelta<T> {
    pub fn len(&self) -> usize {
        self.add.len() + self.modify.len() + self.delete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Delta<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.to_origin.is_empty() && self.to_remote.is_empty()
    }
}

impl<T: Reconcilable> Delta<T> {
    /// Entries that already account for something present remotely.
    pub fn remote_filters(&self) -> impl Iterator<Item = &T> {
        self.to_remote
            .delete
            .iter()
            .chain(&self.to_origin.add)
            .chain(&self.to_origin.modify)
            .chain(&self.to_remote.modify)
    }

    /// Entries that already account for something present locally.
    pub fn origin_filters(&self) -> impl Iterator<Item = &T> {
        self.to_remote
            .add
            .iter()
            .chain(&self.to_origin.modify)
            .chain(&self.to_remote.modify)
    }

    /// Queue a push of `entry`, replacing any earlier push of the same entity.
    /// A pending pull of the same entity is dropped; the local edit is newer.
    pub fn replace_remote_modify(&mut self, entry: T) {
        self.to_remote.modify.retain(|queued| !queued.equals(&entry));
        self.to_remote.add.retain(|queued| !queued.equals(&entry));
        self.to_origin.modify.retain(|queued| !queued.equals(&entry));
        self.to_remote.modify.push(entry);
    }

    /// Queue a creation unless an identical one is already pending.
    pub fn push_remote_add(&mut self, entry: T) -> bool {
        let pending = self
            .to_remote
            .add
            .iter()
            .any(|queued| queued.equals(&entry) || queued.same_unsynced(&entry));
        if pending {
            return false;
        }
        self.to_remote.add.push(entry);
        true
    }

    /// Queue a remote deletion, dropping any pending push or pull of the same
    /// entity.
    pub fn push_remote_delete(&mut self, entry: T) {
        self.to_remote.modify.retain(|queued| !queued.equals(&entry));
        self.to_origin.modify.retain(|queued| !queued.equals(&entry));
        if !self.to_remote.delete.iter().any(|queued| queued.equals(&entry)) {
            self.to_remote.delete.push(entry);
        }
    }
}

/// Totals shown in the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DeltaCounts {
    pub to_origin: usize,
    pub to_remote: usize,
}

impl DeltaCounts {
    pub fn of<T>(delta: &Delta<T>) -> Self {
        Self {
            to_origin: delta.to_origin.len(),
            to_remote: delta.to_remote.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_origin == 0 && self.to_remote == 0
    }
}

impl std::ops::Add for DeltaCounts {
    type Output = DeltaCounts;

    fn add(self, rhs: DeltaCounts) -> DeltaCounts {
        DeltaCounts {
            to_origin: self.to_origin + rhs.to_origin,
            to_remote: self.to_remote + rhs.to_remote,
        }
    }
}
