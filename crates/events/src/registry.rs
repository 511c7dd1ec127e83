//! Registration records.
//!
//! Host listeners never capture user callbacks. They capture the router (weakly)
//! and a registration id or group key, and the record is resolved here at
//! dispatch time.

use crate::callback::Callback;
use crate::coalesce::{ClickGate, DebounceState, ThrottleState};
use core::mem::take;
use core::time::Duration;
use rustc_hash::FxHashMap;
use squirrel_host::{HostListenerId, NodeKey, ObserverId};
use std::collections::BTreeMap;

/// Identifier of one registration (a delegated selector or a direct listener).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegistrationId(pub u64);

/// One underlying delegated subscription exists per group.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub container: NodeKey,
    pub kind: String,
}

pub(crate) struct DelegateEntry {
    pub id: RegistrationId,
    pub selector: String,
    pub callback: Callback,
}

pub(crate) struct DelegateGroup {
    pub subscription: HostListenerId,
    /// In registration order.
    pub entries: Vec<DelegateEntry>,
}

/// How a direct registration reacts to events. Part of the dedup key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Mode {
    Plain,
    Throttle(Duration),
    Debounce(Duration),
    ClickGate(Duration),
    HoverEnter(Duration),
    HoverLeave,
}

/// Two registrations with equal keys are the same logical behaviour.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct DirectKey {
    pub target: NodeKey,
    pub kind: String,
    /// Identity of the user callback.
    pub identity: usize,
    pub mode: Mode,
}

pub(crate) enum Behavior {
    Plain,
    Gated(ClickGate),
    Throttle(ThrottleState),
    Debounce(DebounceState),
}

/// Runs once when a registration goes away, however it goes away.
pub(crate) type ReleaseHook = Box<dyn FnOnce()>;

pub(crate) struct DirectRecord {
    pub key: DirectKey,
    pub callback: Callback,
    pub subscription: HostListenerId,
    pub behavior: Behavior,
    /// Watches the target's parent for the target's removal.
    pub removal: Option<ObserverId>,
    pub release: Option<ReleaseHook>,
}

/// Everything removed from the registry in one go.
#[derive(Default)]
pub(crate) struct Drained {
    pub groups: Vec<DelegateGroup>,
    pub directs: Vec<DirectRecord>,
}

#[derive(Default)]
pub(crate) struct Registry {
    next_id: u64,
    groups: FxHashMap<GroupKey, DelegateGroup>,
    directs: BTreeMap<RegistrationId, DirectRecord>,
    dedup: FxHashMap<DirectKey, RegistrationId>,
}

impl Registry {
    pub fn next_id(&mut self) -> RegistrationId {
        self.next_id = self.next_id.wrapping_add(1);
        RegistrationId(self.next_id)
    }

    /// Append to an existing group. Returns the entry back when the group
    /// does not exist yet.
    pub fn push_delegate(
        &mut self,
        key: &GroupKey,
        entry: DelegateEntry,
    ) -> Result<(), DelegateEntry> {
        match self.groups.get_mut(key) {
            Some(group) => {
                group.entries.push(entry);
                Ok(())
            }
            None => Err(entry),
        }
    }

    pub fn insert_group(&mut self, key: GroupKey, group: DelegateGroup) {
        self.groups.insert(key, group);
    }

    /// Snapshot of a group's entries, in registration order.
    pub fn delegates(&self, key: &GroupKey) -> Vec<(RegistrationId, String, Callback)> {
        self.groups.get(key).map_or_else(Vec::new, |group| {
            group
                .entries
                .iter()
                .map(|entry| (entry.id, entry.selector.clone(), entry.callback.clone()))
                .collect()
        })
    }

    pub fn has_delegate(&self, key: &GroupKey, id: RegistrationId) -> bool {
        self.groups
            .get(key)
            .is_some_and(|group| group.entries.iter().any(|entry| entry.id == id))
    }

    /// Remove the entries selected by `doomed`. Returns how many went and,
    /// when the group became empty, its subscription.
    pub fn remove_delegates(
        &mut self,
        key: &GroupKey,
        mut doomed: impl FnMut(&DelegateEntry) -> bool,
    ) -> (usize, Option<HostListenerId>) {
        let Some(group) = self.groups.get_mut(key) else {
            return (0, None);
        };
        let before = group.entries.len();
        group.entries.retain(|entry| !doomed(entry));
        let removed = before - group.entries.len();
        if group.entries.is_empty() {
            let subscription = group.subscription;
            self.groups.remove(key);
            return (removed, Some(subscription));
        }
        (removed, None)
    }

    pub fn remove_group(&mut self, key: &GroupKey) -> Option<DelegateGroup> {
        self.groups.remove(key)
    }

    pub fn group_keys(&self) -> Vec<GroupKey> {
        self.groups.keys().cloned().collect()
    }

    pub fn find_direct(&self, key: &DirectKey) -> Option<RegistrationId> {
        self.dedup.get(key).copied()
    }

    pub fn insert_direct(&mut self, id: RegistrationId, record: DirectRecord) {
        self.dedup.insert(record.key.clone(), id);
        self.directs.insert(id, record);
    }

    pub fn direct_mut(&mut self, id: RegistrationId) -> Option<&mut DirectRecord> {
        self.directs.get_mut(&id)
    }

    pub fn has_direct(&self, id: RegistrationId) -> bool {
        self.directs.contains_key(&id)
    }

    pub fn remove_direct(&mut self, id: RegistrationId) -> Option<DirectRecord> {
        let record = self.directs.remove(&id)?;
        self.dedup.remove(&record.key);
        Some(record)
    }

    pub fn direct_target(&self, id: RegistrationId) -> Option<NodeKey> {
        self.directs.get(&id).map(|record| record.key.target)
    }

    /// Target of every direct registration.
    pub fn direct_targets(&self) -> Vec<(RegistrationId, NodeKey)> {
        self.directs
            .iter()
            .map(|(id, record)| (*id, record.key.target))
            .collect()
    }

    pub fn drain(&mut self) -> Drained {
        self.dedup.clear();
        Drained {
            groups: self.groups.drain().map(|(_, group)| group).collect(),
            directs: take(&mut self.directs).into_values().collect(),
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn selector_count(&self) -> usize {
        self.groups.values().map(|group| group.entries.len()).sum()
    }

    /// Direct registrations split into (plain, throttled, debounced).
    pub fn direct_counts(&self) -> (usize, usize, usize) {
        self.directs
            .values()
            .fold((0, 0, 0), |(plain, throttled, debounced), record| {
                match record.behavior {
                    Behavior::Plain | Behavior::Gated(_) => (plain + 1, throttled, debounced),
                    Behavior::Throttle(_) => (plain, throttled + 1, debounced),
                    Behavior::Debounce(_) => (plain, throttled, debounced + 1),
                }
            })
    }
}
