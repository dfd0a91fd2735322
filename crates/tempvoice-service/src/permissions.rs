//! Permission compiler: room settings + access list -> overwrite set.
//!
//! The compiled set is the complete permission state of a live room. It is a
//! pure function of its inputs: entries are keyed by subject in a
//! `BTreeMap`, so the order ACL entries arrive in never shows up in the
//! output, and every feature toggle maps to exactly one right that moves
//! between the ambient allow and deny masks.

use crate::models::{AccessControlEntry, RoomSettings};
use common::types::MemberId;
use std::collections::BTreeMap;

bitflags::bitflags! {
    /// Channel rights, using the provider's bit positions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
    pub struct Permissions: u64 {
        const ADD_REACTIONS = 1 << 6;
        const STREAM = 1 << 9;
        const VIEW_CHANNEL = 1 << 10;
        const SEND_MESSAGES = 1 << 11;
        const EMBED_LINKS = 1 << 14;
        const ATTACH_FILES = 1 << 15;
        const READ_MESSAGE_HISTORY = 1 << 16;
        const CONNECT = 1 << 20;
        const SPEAK = 1 << 21;
        const MUTE_MEMBERS = 1 << 22;
        const DEAFEN_MEMBERS = 1 << 23;
        const MOVE_MEMBERS = 1 << 24;
        const USE_VAD = 1 << 25;
        const USE_EMBEDDED_ACTIVITIES = 1 << 39;
        const USE_SOUNDBOARD = 1 << 42;
    }
}

impl Permissions {
    /// Rights that decide whether someone can enter the room.
    pub const ENTRY: Permissions = Permissions::VIEW_CHANNEL.union(Permissions::CONNECT);

    /// Communication rights everyone gets regardless of entry.
    pub const BASELINE: Permissions = Permissions::SEND_MESSAGES
        .union(Permissions::ADD_REACTIONS)
        .union(Permissions::READ_MESSAGE_HISTORY)
        .union(Permissions::EMBED_LINKS)
        .union(Permissions::ATTACH_FILES)
        .union(Permissions::SPEAK)
        .union(Permissions::USE_VAD);

    /// What the owner always holds in their own room.
    pub const OWNER: Permissions = Permissions::ENTRY
        .union(Permissions::SPEAK)
        .union(Permissions::MOVE_MEMBERS)
        .union(Permissions::MUTE_MEMBERS)
        .union(Permissions::DEAFEN_MEMBERS);
}

/// Who an overwrite applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subject {
    /// The community-wide default subject (everyone).
    Ambient,
    Member(MemberId),
}

/// Explicit allow and deny masks for one subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Overwrite {
    pub allow: Permissions,
    pub deny: Permissions,
}

impl Overwrite {
    #[must_use]
    pub const fn allow(allow: Permissions) -> Self {
        Self {
            allow,
            deny: Permissions::empty(),
        }
    }

    #[must_use]
    pub const fn deny(deny: Permissions) -> Self {
        Self {
            allow: Permissions::empty(),
            deny,
        }
    }
}

/// A change to push to the provider to move a room from one set to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteChange {
    Set(Subject, Overwrite),
    Remove(Subject),
}

/// The full permission state of a room.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OverwriteSet {
    entries: BTreeMap<Subject, Overwrite>,
}

impl OverwriteSet {
    #[must_use]
    pub fn get(&self, subject: Subject) -> Option<&Overwrite> {
        self.entries.get(&subject)
    }

    /// Entries in subject order.
    pub fn iter(&self) -> impl Iterator<Item = (Subject, Overwrite)> + '_ {
        self.entries.iter().map(|(subject, overwrite)| (*subject, *overwrite))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `subject` is explicitly allowed every right in `rights`.
    #[must_use]
    pub fn allows(&self, subject: Subject, rights: Permissions) -> bool {
        self.get(subject)
            .is_some_and(|overwrite| overwrite.allow.contains(rights))
    }

    /// Whether `subject` is explicitly denied every right in `rights`.
    #[must_use]
    pub fn denies(&self, subject: Subject, rights: Permissions) -> bool {
        self.get(subject)
            .is_some_and(|overwrite| overwrite.deny.contains(rights))
    }

    /// Changes that turn `self` into `target`, in subject order.
    #[must_use]
    pub fn diff(&self, target: &OverwriteSet) -> Vec<OverwriteChange> {
        let mut changes = Vec::new();

        for (subject, overwrite) in target.iter() {
            if self.get(subject) != Some(&overwrite) {
                changes.push(OverwriteChange::Set(subject, overwrite));
            }
        }
        for (subject, _) in self.iter() {
            if target.get(subject).is_none() {
                changes.push(OverwriteChange::Remove(subject));
            }
        }

        changes
    }

    fn insert(&mut self, subject: Subject, overwrite: Overwrite) {
        self.entries.insert(subject, overwrite);
    }
}

/// Compile the overwrite set for `owner`'s room.
///
/// ACL entries that restate the mode's default contribute nothing, and the
/// owner is never overridden by an entry about themselves.
#[must_use]
pub fn compile(
    settings: &RoomSettings,
    acl_entries: &[AccessControlEntry],
    owner: MemberId,
) -> OverwriteSet {
    let mut set = OverwriteSet::default();

    let mut ambient = Overwrite::allow(Permissions::BASELINE);
    let features = [
        (settings.soundboard_enabled, Permissions::USE_SOUNDBOARD),
        (settings.streams_enabled, Permissions::STREAM),
        (settings.activities_enabled, Permissions::USE_EMBEDDED_ACTIVITIES),
        (!settings.is_private, Permissions::ENTRY),
    ];
    for (enabled, right) in features {
        if enabled {
            ambient.allow |= right;
        } else {
            ambient.deny |= right;
        }
    }
    set.insert(Subject::Ambient, ambient);

    for entry in acl_entries {
        if entry.member_id == owner || entry.is_redundant(settings.is_private) {
            continue;
        }
        let overwrite = if settings.is_private {
            Overwrite::allow(Permissions::ENTRY)
        } else {
            Overwrite::deny(Permissions::ENTRY)
        };
        set.insert(Subject::Member(entry.member_id), overwrite);
    }

    set.insert(Subject::Member(owner), Overwrite::allow(Permissions::OWNER));

    set
}
