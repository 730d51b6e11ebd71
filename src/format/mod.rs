//! Human-readable message text for canonical events.
//!
//! `format_message` is pure: the same event always yields the same string.

use crate::events::{CanonicalEvent, EventPayload, Player};

pub fn format_message(event: &CanonicalEvent) -> String {
    let actor = event.actor.label();
    match &event.payload {
        EventPayload::GatherFood { amount, villagers } => {
            format!("{} gathered {} food with {} villagers", actor, amount, villagers)
        }
        EventPayload::ChopWood { amount, villagers } => {
            format!("{} gathered {} wood with {} villagers", actor, amount, villagers)
        }
        EventPayload::BuildHut { huts_added } => {
            let noun = if *huts_added > 1 { "huts" } else { "hut" };
            format!("{} built {} {}", actor, huts_added, noun)
        }
        EventPayload::CommitDefense => format!("{} committed their defense", actor),
        EventPayload::AttackVillage { defender, amount } => format!(
            "{} raided {}'s village, attempting to steal {} resources",
            actor,
            defender_label(defender.as_ref()),
            amount
        ),
        EventPayload::RevealBattle {
            defender,
            winner_village_id,
            amount,
            resource,
        } => {
            let defender_name = defender_label(defender.as_ref());
            let winner = if attacker_won(&event.actor, winner_village_id.as_deref()) {
                actor
            } else {
                defender_name
            };
            format!(
                "{} revealed the battle against {}: {} won {} {}",
                actor,
                defender_name,
                winner,
                amount,
                resource.as_deref().unwrap_or("resources")
            )
        }
        EventPayload::Generic { kind, description } => match description {
            Some(description) => format!("{}: {}", actor, description),
            None => format!("{} triggered {}", actor, kind),
        },
    }
}

fn defender_label(defender: Option<&Player>) -> &str {
    defender.map(Player::label).unwrap_or("an unknown")
}

/// Attacker wins when their username appears anywhere in the recorded
/// winner-village id. Containment, not identity: a username that is a
/// substring of the defender's village id also counts as an attacker win.
fn attacker_won(attacker: &Player, winner_village_id: Option<&str>) -> bool {
    match winner_village_id {
        Some(village) => village.contains(attacker.username.as_str()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(actor: Player, payload: EventPayload) -> CanonicalEvent {
        CanonicalEvent {
            id: "e1".to_string(),
            occurred_at: 1,
            actor,
            payload,
        }
    }

    fn alice() -> Player {
        Player::new("alice").with_display_name("Alice")
    }

    #[test]
    fn test_resource_messages() {
        let food = event(alice(), EventPayload::GatherFood { amount: 40, villagers: 3 });
        assert_eq!(format_message(&food), "Alice gathered 40 food with 3 villagers");
        let wood = event(alice(), EventPayload::ChopWood { amount: 12, villagers: 1 });
        assert_eq!(format_message(&wood), "Alice gathered 12 wood with 1 villagers");
    }

    #[test]
    fn test_hut_pluralization() {
        let one = event(alice(), EventPayload::BuildHut { huts_added: 1 });
        let three = event(alice(), EventPayload::BuildHut { huts_added: 3 });
        assert_eq!(format_message(&one), "Alice built 1 hut");
        assert_eq!(format_message(&three), "Alice built 3 huts");
    }

    #[test]
    fn test_defense_and_attack() {
        assert_eq!(
            format_message(&event(alice(), EventPayload::CommitDefense)),
            "Alice committed their defense"
        );
        let attack = event(
            alice(),
            EventPayload::AttackVillage {
                defender: Some(Player::new("bob")),
                amount: 50,
            },
        );
        assert_eq!(
            format_message(&attack),
            "Alice raided bob's village, attempting to steal 50 resources"
        );
        let blind = event(alice(), EventPayload::AttackVillage { defender: None, amount: 5 });
        assert_eq!(
            format_message(&blind),
            "Alice raided an unknown's village, attempting to steal 5 resources"
        );
    }

    #[test]
    fn test_battle_winner_by_village_id() {
        let battle = |winner: &str| {
            event(
                alice(),
                EventPayload::RevealBattle {
                    defender: Some(Player::new("bob")),
                    winner_village_id: Some(winner.to_string()),
                    amount: 120,
                    resource: Some("food".to_string()),
                },
            )
        };
        assert_eq!(
            format_message(&battle("village-alice")),
            "Alice revealed the battle against bob: Alice won 120 food"
        );
        assert_eq!(
            format_message(&battle("village-bob")),
            "Alice revealed the battle against bob: bob won 120 food"
        );
    }

    #[test]
    fn test_battle_winner_substring_match_is_kept() {
        // "al" is contained in "village-alice", so the attacker is declared winner.
        let battle = event(
            Player::new("al"),
            EventPayload::RevealBattle {
                defender: Some(Player::new("alice")),
                winner_village_id: Some("village-alice".to_string()),
                amount: 1,
                resource: None,
            },
        );
        assert_eq!(
            format_message(&battle),
            "al revealed the battle against alice: al won 1 resources"
        );
    }

    #[test]
    fn test_generic_passthrough() {
        let described = event(
            alice(),
            EventPayload::Generic {
                kind: "TradeGoods".to_string(),
                description: Some("traded 3 sheep".to_string()),
            },
        );
        assert_eq!(format_message(&described), "Alice: traded 3 sheep");
        let bare = event(
            alice(),
            EventPayload::Generic {
                kind: "TradeGoods".to_string(),
                description: None,
            },
        );
        assert_eq!(format_message(&bare), "Alice triggered TradeGoods");
    }

    #[test]
    fn test_format_is_deterministic() {
        let battle = event(
            alice(),
            EventPayload::RevealBattle {
                defender: None,
                winner_village_id: None,
                amount: 9,
                resource: Some("wood".to_string()),
            },
        );
        assert_eq!(format_message(&battle), format_message(&battle.clone()));
    }
}
