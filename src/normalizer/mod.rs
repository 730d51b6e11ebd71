//! Raw feed records to an ordered sequence of canonical events.
//!
//! Records arrive as loosely-typed JSON objects, possibly split across
//! kind-specific batches and in any page order. Normalization classifies each
//! record, maps its kind-specific timestamp and payload fields, drops
//! duplicate ids, and sorts by `occurred_at` (stable, so ties keep fetch
//! order).
//!
//! A single bad record never fails the batch: unreadable payloads degrade to
//! `EventPayload::Generic`, and records without any usable timestamp are
//! skipped.

use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::events::{CanonicalEvent, EventKind, EventPayload, Player};
use crate::source::RawBatch;

/// Timestamp fields tried after the kind-specific one.
const FALLBACK_TIME_FIELDS: [&str; 3] = ["timestamp", "occurredAt", "blockTimestamp"];

/// Result of normalizing one fetch.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    /// Sorted by `occurred_at` ascending.
    pub events: Vec<CanonicalEvent>,
    /// Records dropped for lack of a timestamp.
    pub skipped: usize,
    /// Records dropped because their id was already seen.
    pub duplicates: usize,
    /// Newest timestamp that is complete across every slice. Set when at
    /// least one batch was truncated: that batch's newest record bounds it,
    /// and the lowest such bound wins. Events after it may have siblings the
    /// truncated slices have not returned yet.
    pub horizon: Option<i64>,
}

pub fn normalize(batches: &[RawBatch]) -> Normalized {
    let mut out = Normalized::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut position = 0usize;

    for batch in batches {
        let mut newest: Option<i64> = None;
        for record in &batch.records {
            position += 1;
            let Some(event) = normalize_record(record, batch.kind_hint.as_deref(), position) else {
                out.skipped += 1;
                continue;
            };
            newest = newest.max(Some(event.occurred_at));
            if !seen.insert(event.id.clone()) {
                out.duplicates += 1;
                debug!(id = %event.id, "duplicate record in fetch");
                continue;
            }
            out.events.push(event);
        }
        if let (true, Some(newest)) = (batch.truncated, newest) {
            out.horizon = Some(out.horizon.map_or(newest, |h| h.min(newest)));
        }
    }

    out.events.sort_by_key(|e| e.occurred_at);
    out
}

/// Normalize one record. `None` only when no timestamp can be read.
fn normalize_record(record: &Value, kind_hint: Option<&str>, position: usize) -> Option<CanonicalEvent> {
    let Some(obj) = record.as_object() else {
        warn!(position = position, "feed record is not an object, skipping");
        return None;
    };

    let discriminator = obj
        .get("kind")
        .and_then(Value::as_str)
        .or_else(|| obj.get("__typename").and_then(Value::as_str))
        .or(kind_hint)
        .unwrap_or("unknown");
    let kind = EventKind::parse(discriminator);

    let Some(occurred_at) = read_timestamp(obj, kind, discriminator) else {
        warn!(
            kind = %discriminator,
            position = position,
            "feed record has no readable timestamp, skipping"
        );
        return None;
    };

    let label = kind.map(|k| k.as_str()).unwrap_or(discriminator);
    let id = read_id(obj).unwrap_or_else(|| format!("{}:{}:{}", label, occurred_at, position));

    let payload = match kind {
        Some(kind) => match read_payload(kind, obj) {
            Ok(payload) => payload,
            Err(reason) => {
                warn!(id = %id, kind = %kind, reason = %reason, "unreadable payload, passing through as generic");
                generic(kind.as_str(), obj)
            }
        },
        None => {
            debug!(id = %id, kind = %discriminator, "unrecognised event kind");
            generic(discriminator, obj)
        }
    };

    let actor = read_player(obj, "player")
        .or_else(|| match kind {
            Some(EventKind::AttackVillage | EventKind::RevealBattle) => read_player(obj, "attacker"),
            _ => None,
        })
        .unwrap_or_else(Player::unknown);

    Some(CanonicalEvent {
        id,
        occurred_at,
        actor,
        payload,
    })
}

fn read_payload(kind: EventKind, obj: &Map<String, Value>) -> Result<EventPayload, String> {
    let payload = match kind {
        EventKind::GatherFood => EventPayload::GatherFood {
            amount: read_count(obj, "amount")?,
            villagers: read_count(obj, "villagers")?,
        },
        EventKind::ChopWood => EventPayload::ChopWood {
            amount: read_count(obj, "amount")?,
            villagers: read_count(obj, "villagers")?,
        },
        EventKind::BuildHut => EventPayload::BuildHut {
            huts_added: read_count(obj, "hutsAdded")?,
        },
        EventKind::CommitDefense => EventPayload::CommitDefense,
        EventKind::AttackVillage => EventPayload::AttackVillage {
            defender: read_player(obj, "defender"),
            amount: read_count(obj, "amount")?,
        },
        EventKind::RevealBattle => EventPayload::RevealBattle {
            defender: read_player(obj, "defender"),
            winner_village_id: read_text(obj, "winnerVillageId"),
            amount: read_count(obj, "amount")?,
            resource: read_text(obj, "resource"),
        },
        EventKind::Generic => generic(kind.as_str(), obj),
    };
    Ok(payload)
}

fn generic(kind: &str, obj: &Map<String, Value>) -> EventPayload {
    EventPayload::Generic {
        kind: kind.to_string(),
        description: read_text(obj, "description"),
    }
}

fn read_timestamp(obj: &Map<String, Value>, kind: Option<EventKind>, discriminator: &str) -> Option<i64> {
    let specific = match kind.and_then(|k| k.time_field()) {
        Some(field) => field.to_string(),
        // Unknown kinds usually follow the same `time<Kind>` convention.
        None => format!("time{}", discriminator),
    };
    let found = std::iter::once(specific.as_str())
        .chain(FALLBACK_TIME_FIELDS)
        .find_map(|field| obj.get(field).and_then(as_i64));
    found
}

fn read_id(obj: &Map<String, Value>) -> Option<String> {
    match obj.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Absent or null counts read as zero; anything else non-numeric is an error.
fn read_count(obj: &Map<String, Value>, field: &str) -> Result<u64, String> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| format!("{} is not a non-negative integer: {}", field, n)),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("{} is not a count: {:?}", field, s)),
        Some(other) => Err(format!("{} has unexpected type: {}", field, other)),
    }
}

fn read_text(obj: &Map<String, Value>, field: &str) -> Option<String> {
    match obj.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A player sub-object, or a bare username string.
fn read_player(obj: &Map<String, Value>, field: &str) -> Option<Player> {
    match obj.get(field)? {
        Value::String(username) if !username.is_empty() => Some(Player::new(username.as_str())),
        Value::Object(player) => {
            let username = player.get("username").and_then(Value::as_str)?;
            let display_name = player
                .get("displayName")
                .and_then(Value::as_str)
                .map(str::to_string);
            Some(Player {
                username: username.to_string(),
                display_name,
            })
        }
        _ => None,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
