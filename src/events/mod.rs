//! Canonical game events.
//!
//! Every raw record the feed produces is normalized into a `CanonicalEvent`:
//! a common header (id, timestamp, acting player) plus a payload variant that
//! carries only the fields its kind needs.

use std::fmt;

/// A player as the feed identifies them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub username: String,
    pub display_name: Option<String>,
}

impl Player {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Name used in messages: display name when set, else username.
    pub fn label(&self) -> &str {
        match &self.display_name {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.username,
        }
    }

    pub(crate) fn unknown() -> Self {
        Self::new("unknown")
    }
}

/// Discriminator over the closed set of event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    GatherFood,
    ChopWood,
    BuildHut,
    CommitDefense,
    AttackVillage,
    RevealBattle,
    Generic,
}

impl EventKind {
    /// Known kinds, in the order the feed is queried.
    pub const KNOWN: [EventKind; 6] = [
        EventKind::GatherFood,
        EventKind::ChopWood,
        EventKind::BuildHut,
        EventKind::CommitDefense,
        EventKind::AttackVillage,
        EventKind::RevealBattle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::GatherFood => "GatherFood",
            EventKind::ChopWood => "ChopWood",
            EventKind::BuildHut => "BuildHut",
            EventKind::CommitDefense => "CommitDefense",
            EventKind::AttackVillage => "AttackVillage",
            EventKind::RevealBattle => "RevealBattle",
            EventKind::Generic => "Generic",
        }
    }

    /// Resolve a raw discriminator. Case-insensitive, ignores `_` and `-`,
    /// so `GatherFood`, `gather_food` and `gatherFood` all match.
    pub fn parse(raw: &str) -> Option<Self> {
        let folded: String = raw
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        Self::KNOWN
            .into_iter()
            .find(|kind| kind.as_str().to_lowercase() == folded)
    }

    /// Name of the field carrying this kind's timestamp in the feed.
    pub fn time_field(&self) -> Option<&'static str> {
        match self {
            EventKind::GatherFood => Some("timeGatherFood"),
            EventKind::ChopWood => Some("timeChopWood"),
            EventKind::BuildHut => Some("timeBuildHut"),
            EventKind::CommitDefense => Some("timeCommitDefense"),
            EventKind::AttackVillage => Some("timeAttackVillage"),
            EventKind::RevealBattle => Some("timeRevealBattle"),
            EventKind::Generic => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific event data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    GatherFood {
        amount: u64,
        villagers: u64,
    },
    ChopWood {
        amount: u64,
        villagers: u64,
    },
    BuildHut {
        huts_added: u64,
    },
    CommitDefense,
    AttackVillage {
        defender: Option<Player>,
        amount: u64,
    },
    RevealBattle {
        defender: Option<Player>,
        /// Raw winner-village identifier as recorded by the game.
        winner_village_id: Option<String>,
        amount: u64,
        resource: Option<String>,
    },
    /// Anything the normalizer does not recognise, passed through verbatim.
    Generic {
        kind: String,
        description: Option<String>,
    },
}

/// A normalized event, ready to be formatted and delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalEvent {
    /// Stable across re-fetches of the same record.
    pub id: String,
    /// Seconds since epoch.
    pub occurred_at: i64,
    pub actor: Player,
    pub payload: EventPayload,
}

impl CanonicalEvent {
    pub fn kind(&self) -> EventKind {
        match &self.payload {
            EventPayload::GatherFood { .. } => EventKind::GatherFood,
            EventPayload::ChopWood { .. } => EventKind::ChopWood,
            EventPayload::BuildHut { .. } => EventKind::BuildHut,
            EventPayload::CommitDefense => EventKind::CommitDefense,
            EventPayload::AttackVillage { .. } => EventKind::AttackVillage,
            EventPayload::RevealBattle { .. } => EventKind::RevealBattle,
            EventPayload::Generic { .. } => EventKind::Generic,
        }
    }
}
