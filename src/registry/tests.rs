use super::*;
use crate::action::SchemaCatalog;
use crate::event::{kinds, Event};
use serde_json::json;
use std::sync::Arc;
use std::thread;

const MIC_SPEAK: &str = "agent_speaks_into_microphone";

fn studio() -> EntityRegistry {
    let map = WorldMap::new(["roundtable", "hallway", "rooftop"]).with_path("roundtable", "hallway");
    let catalog = SchemaCatalog::standard().with_object_action(
        "microphone",
        MIC_SPEAK,
        "Speaks to the audience through the microphone",
    );
    let registry = EntityRegistry::new("world", map, catalog);

    for (id, name) in [("maria", "Maria"), ("jimmy", "Jimmy"), ("carla", "Carla")] {
        registry
            .register(Entity::agent(id, name, "podcast co-host", "roundtable"))
            .unwrap();
    }
    registry
        .register(
            Entity::object("microphone", "Microphone", "A podcast microphone", "roundtable")
                .held_by("maria"),
        )
        .unwrap();
    registry
}

fn give(from: &str, object: &str, to: &str) -> Event {
    Event::new(kinds::AGENT_GIVES_OBJECT_TO_AGENT, from)
        .with_target(to)
        .with_field(kinds::FIELD_OBJECT_ID, object)
        .with_field(kinds::FIELD_RECIPIENT_ID, to)
}

/// held_by and inventories agree for every object
fn assert_holder_consistency(registry: &EntityRegistry) {
    let entities = registry.all_entities();
    for object in entities.iter().filter(|e| e.is_object()) {
        let holders: Vec<&Entity> = entities
            .iter()
            .filter(|a| a.inventory().map_or(false, |inv| inv.contains(&object.id)))
            .collect();
        match &object.held_by {
            Some(holder) => {
                assert_eq!(holders.len(), 1, "{} must be in exactly one inventory", object.id);
                assert_eq!(&holders[0].id, holder);
            }
            None => assert!(holders.is_empty(), "{} is unheld but in an inventory", object.id),
        }
    }
}

#[test]
fn test_register_and_lookup() {
    let registry = studio();

    let maria = registry.lookup("maria").unwrap();
    assert!(maria.is_agent());
    assert!(maria.inventory().unwrap().contains("microphone"));

    let mic = registry.lookup("microphone").unwrap();
    assert_eq!(mic.held_by.as_deref(), Some("maria"));
    assert_eq!(registry.len(), 4);
    assert_holder_consistency(&registry);
}

#[test]
fn test_lookup_missing_entity() {
    let registry = studio();
    assert_eq!(
        registry.lookup("nobody"),
        Err(RegistryError::NotFound("nobody".to_string()))
    );
}

#[test]
fn test_register_rejects_duplicates_and_unknown_locations() {
    let registry = studio();

    assert_eq!(
        registry.register(Entity::agent("maria", "Maria", "", "roundtable")),
        Err(RegistryError::AlreadyExists("maria".to_string()))
    );
    assert_eq!(
        registry.register(Entity::agent("zed", "Zed", "", "basement")),
        Err(RegistryError::UnknownLocation("basement".to_string()))
    );
    assert_eq!(
        registry.register(Entity::object("cup", "Cup", "", "roundtable").held_by("microphone")),
        Err(RegistryError::NotAnAgent("microphone".to_string()))
    );
}

#[test]
fn test_held_object_takes_holder_location() {
    let registry = studio();
    registry
        .register(Entity::object("notes", "Notes", "", "rooftop").held_by("jimmy"))
        .unwrap();

    assert_eq!(registry.lookup("notes").unwrap().location, "roundtable");
    assert_holder_consistency(&registry);
}

#[test]
fn test_give_transfers_object() {
    let registry = studio();

    let outcome = registry.apply(&give("maria", "microphone", "jimmy")).unwrap();
    assert!(matches!(outcome, ApplyOutcome::Applied(_)));

    assert_eq!(
        registry.lookup("microphone").unwrap().held_by.as_deref(),
        Some("jimmy")
    );
    assert!(registry.lookup("jimmy").unwrap().inventory().unwrap().contains("microphone"));
    assert!(registry.lookup("maria").unwrap().inventory().unwrap().is_empty());
    assert_holder_consistency(&registry);
}

#[test]
fn test_duplicate_give_applies_once() {
    let registry = studio();
    let event = give("maria", "microphone", "jimmy");

    registry.apply(&event).unwrap();
    let second = registry.apply(&event).unwrap();

    assert_eq!(second, ApplyOutcome::Duplicate);
    assert_eq!(
        registry.lookup("microphone").unwrap().held_by.as_deref(),
        Some("jimmy")
    );
    assert_eq!(registry.lookup("jimmy").unwrap().inventory().unwrap().len(), 1);
    assert_holder_consistency(&registry);
}

#[test]
fn test_give_from_non_holder_conflicts() {
    let registry = studio();

    let err = registry.apply(&give("carla", "microphone", "jimmy")).unwrap_err();
    assert_eq!(
        err,
        RegistryError::Conflict {
            object_id: "microphone".to_string(),
            expected_holder: Some("carla".to_string()),
            actual_holder: Some("maria".to_string()),
        }
    );
    // Nothing moved
    assert_eq!(
        registry.lookup("microphone").unwrap().held_by.as_deref(),
        Some("maria")
    );
    assert_holder_consistency(&registry);
}

#[test]
fn test_give_to_self_or_object_is_rejected() {
    let registry = studio();

    assert!(matches!(
        registry.apply(&give("maria", "microphone", "maria")),
        Err(RegistryError::Malformed { .. })
    ));
    assert_eq!(
        registry.apply(&give("maria", "microphone", "microphone")),
        Err(RegistryError::NotAnAgent("microphone".to_string()))
    );
    assert_holder_consistency(&registry);
}

#[test]
fn test_give_without_object_id_is_malformed() {
    let registry = studio();
    let event = Event::new(kinds::AGENT_GIVES_OBJECT_TO_AGENT, "maria").with_target("jimmy");

    assert!(matches!(
        registry.apply(&event),
        Err(RegistryError::Malformed { .. })
    ));
}

#[test]
fn test_drop_then_take() {
    let registry = studio();

    let drop = Event::new(kinds::AGENT_DROPS_OBJECT, "maria")
        .with_field(kinds::FIELD_OBJECT_ID, "microphone");
    registry.apply(&drop).unwrap();
    assert!(registry.lookup("microphone").unwrap().held_by.is_none());
    assert_holder_consistency(&registry);

    let take = Event::new(kinds::AGENT_TAKES_OBJECT, "carla")
        .with_field(kinds::FIELD_OBJECT_ID, "microphone");
    registry.apply(&take).unwrap();
    assert_eq!(
        registry.lookup("microphone").unwrap().held_by.as_deref(),
        Some("carla")
    );
    assert_holder_consistency(&registry);

    // Taking a held object loses the compare-and-swap
    let steal = Event::new(kinds::AGENT_TAKES_OBJECT, "jimmy")
        .with_field(kinds::FIELD_OBJECT_ID, "microphone");
    assert!(matches!(
        registry.apply(&steal),
        Err(RegistryError::Conflict { .. })
    ));
}

#[test]
fn test_round_trip_gives_stay_consistent() {
    let registry = studio();

    registry.apply(&give("maria", "microphone", "jimmy")).unwrap();
    registry.apply(&give("jimmy", "microphone", "carla")).unwrap();
    registry.apply(&give("carla", "microphone", "maria")).unwrap();
    registry.apply(&give("maria", "microphone", "jimmy")).unwrap();

    assert_eq!(
        registry.lookup("microphone").unwrap().held_by.as_deref(),
        Some("jimmy")
    );
    assert_holder_consistency(&registry);
}

#[test]
fn test_move_carries_inventory() {
    let registry = studio();
    let event = Event::new(kinds::ENTITY_MOVES_TO_LOCATION, "maria")
        .with_field(kinds::FIELD_LOCATION, "hallway");

    let outcome = registry.apply(&event).unwrap();
    match outcome {
        ApplyOutcome::Applied(updates) => assert_eq!(updates.len(), 2),
        other => panic!("Expected Applied, got {:?}", other),
    }

    assert_eq!(registry.lookup("maria").unwrap().location, "hallway");
    assert_eq!(registry.lookup("microphone").unwrap().location, "hallway");
}

#[test]
fn test_move_rejects_unknown_location_and_held_objects() {
    let registry = studio();

    let nowhere = Event::new(kinds::ENTITY_MOVES_TO_LOCATION, "maria")
        .with_field(kinds::FIELD_LOCATION, "basement");
    assert_eq!(
        registry.apply(&nowhere),
        Err(RegistryError::UnknownLocation("basement".to_string()))
    );

    let carry_off = Event::new(kinds::ENTITY_MOVES_TO_LOCATION, "world")
        .with_field(kinds::FIELD_ENTITY_ID, "microphone")
        .with_field(kinds::FIELD_LOCATION, "hallway");
    assert!(matches!(
        registry.apply(&carry_off),
        Err(RegistryError::Malformed { .. })
    ));
}

#[test]
fn test_non_structural_events_pass_through() {
    let registry = studio();
    let event = Event::new(MIC_SPEAK, "maria").with_field("message", "Hello listeners");

    assert_eq!(registry.apply(&event).unwrap(), ApplyOutcome::PassThrough);
}

#[test]
fn test_create_and_destroy_entities() {
    let registry = studio();

    let created = Event::new(kinds::WORLD_CREATES_ENTITY, "world").with_field(
        kinds::FIELD_ENTITY,
        json!({
            "id": "guest",
            "name": "Guest",
            "location": "hallway",
            "kind": {"type": "agent"}
        }),
    );
    registry.apply(&created).unwrap();
    assert!(registry.lookup("guest").unwrap().is_agent());
    assert_eq!(registry.apply(&created).unwrap(), ApplyOutcome::Duplicate);

    let destroyed = Event::new(kinds::WORLD_DESTROYS_ENTITY, "world")
        .with_field(kinds::FIELD_ENTITY_ID, "maria");
    registry.apply(&destroyed).unwrap();

    assert!(registry.lookup("maria").is_err());
    // The microphone is released, not lost
    assert!(registry.lookup("microphone").unwrap().held_by.is_none());
    assert_holder_consistency(&registry);
}

#[test]
fn test_sleep_and_wake() {
    let registry = studio();

    registry
        .apply(&Event::new(kinds::AGENT_FALLS_ASLEEP, "jimmy"))
        .unwrap();
    assert!(registry.lookup("jimmy").unwrap().is_asleep());

    let wake = Event::new(kinds::AGENT_WAKES_UP, "world").with_target("jimmy");
    registry.apply(&wake).unwrap();
    assert!(!registry.lookup("jimmy").unwrap().is_asleep());
}

#[test]
fn test_nearby_respects_radius() {
    let registry = studio();
    registry
        .register(Entity::agent("producer", "Producer", "", "hallway"))
        .unwrap();
    registry
        .register(Entity::agent("pigeon", "Pigeon", "", "rooftop"))
        .unwrap();

    let here: Vec<String> = registry
        .nearby("roundtable", 0)
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(here, vec!["carla", "jimmy", "maria", "microphone"]);

    let around = registry.nearby("roundtable", 1);
    assert_eq!(around.len(), 5);
    assert!(around.iter().all(|e| e.id != "pigeon"));
}

#[test]
fn test_schemas_follow_the_microphone() {
    let registry = studio();

    let has_speak = |id: &str| {
        registry
            .schemas_for(id, 0)
            .unwrap()
            .iter()
            .any(|s| s.event_type == MIC_SPEAK)
    };

    assert!(has_speak("maria"));
    assert!(!has_speak("jimmy"));

    registry.apply(&give("maria", "microphone", "jimmy")).unwrap();

    assert!(!has_speak("maria"));
    assert!(has_speak("jimmy"));
}

#[test]
fn test_objects_expose_no_schemas() {
    let registry = studio();
    assert!(registry.schemas_for("microphone", 0).unwrap().is_empty());
    assert!(registry.schemas_for("ghost", 0).is_err());
}

#[test]
fn test_updates_are_broadcast() {
    let registry = studio();
    let mut rx = registry.subscribe();

    let event = give("maria", "microphone", "jimmy");
    registry.apply(&event).unwrap();

    let update = rx.try_recv().unwrap();
    assert_eq!(update.entity_id, "microphone");
    assert_eq!(update.event_id.as_deref(), Some(event.event_id()));
    assert_eq!(
        update.change,
        Change::HolderChanged {
            from: Some("maria".to_string()),
            to: Some("jimmy".to_string()),
        }
    );
}

#[test]
fn test_concurrent_gives_exactly_one_wins() {
    for _ in 0..50 {
        let registry = Arc::new(studio());

        // Two conflicting claims by the current holder to different recipients
        let handles: Vec<_> = ["jimmy", "carla"]
            .into_iter()
            .map(|to| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.apply(&give("maria", "microphone", to)))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let wins = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(RegistryError::Conflict { .. })))
            .count();
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 1);
        assert_holder_consistency(&registry);
    }
}

#[test]
fn test_concurrent_reads_during_writes() {
    let registry = Arc::new(studio());
    let mut handles = vec![];

    for i in 0..10 {
        let registry = Arc::clone(&registry);
        handles.push(thread::spawn(move || {
            if i % 2 == 0 {
                let location = if i % 4 == 0 { "hallway" } else { "roundtable" };
                let _ = registry.apply(
                    &Event::new(kinds::ENTITY_MOVES_TO_LOCATION, "carla")
                        .with_field(kinds::FIELD_LOCATION, location),
                );
            } else {
                let _ = registry.nearby("roundtable", 1);
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_holder_consistency(&registry);
    assert_eq!(registry.len(), 4);
}

#[test]
fn test_give_goes_to_target_only() {
    let registry = studio();
    registry
        .register(Entity::agent("zed", "Zed", "stranger", "rooftop"))
        .unwrap();

    let split = Event::new(kinds::AGENT_GIVES_OBJECT_TO_AGENT, "maria")
        .with_target("jimmy")
        .with_field(kinds::FIELD_OBJECT_ID, "microphone")
        .with_field(kinds::FIELD_RECIPIENT_ID, "zed");
    assert!(matches!(
        registry.apply(&split),
        Err(RegistryError::Malformed { .. })
    ));

    let untargeted = Event::new(kinds::AGENT_GIVES_OBJECT_TO_AGENT, "maria")
        .with_field(kinds::FIELD_OBJECT_ID, "microphone")
        .with_field(kinds::FIELD_RECIPIENT_ID, "zed");
    assert!(matches!(
        registry.apply(&untargeted),
        Err(RegistryError::Malformed { .. })
    ));

    assert_eq!(
        registry.lookup("microphone").unwrap().held_by.as_deref(),
        Some("maria")
    );
    assert_holder_consistency(&registry);
}

#[test]
fn test_agents_cannot_sleep_or_wake_others() {
    let registry = studio();

    let lullaby = Event::new(kinds::AGENT_FALLS_ASLEEP, "jimmy").with_target("maria");
    assert_eq!(
        registry.apply(&lullaby),
        Err(RegistryError::Unauthorized {
            event_type: kinds::AGENT_FALLS_ASLEEP.to_string(),
            sender_id: "jimmy".to_string(),
            subject: "maria".to_string(),
        })
    );
    let by_payload = Event::new(kinds::AGENT_FALLS_ASLEEP, "jimmy")
        .with_field(kinds::FIELD_AGENT_ID, "maria");
    assert!(matches!(
        registry.apply(&by_payload),
        Err(RegistryError::Unauthorized { .. })
    ));
    assert!(!registry.lookup("maria").unwrap().is_asleep());

    registry
        .apply(&Event::new(kinds::AGENT_FALLS_ASLEEP, "maria"))
        .unwrap();
    let alarm = Event::new(kinds::AGENT_WAKES_UP, "jimmy").with_target("maria");
    assert!(matches!(
        registry.apply(&alarm),
        Err(RegistryError::Unauthorized { .. })
    ));
    assert!(registry.lookup("maria").unwrap().is_asleep());
}

#[test]
fn test_only_the_world_creates_and_destroys() {
    let registry = studio();

    let destroy = Event::new(kinds::WORLD_DESTROYS_ENTITY, "jimmy")
        .with_field(kinds::FIELD_ENTITY_ID, "maria");
    assert!(matches!(
        registry.apply(&destroy),
        Err(RegistryError::Unauthorized { .. })
    ));
    assert!(registry.lookup("maria").is_ok());

    let create = Event::new(kinds::WORLD_CREATES_ENTITY, "jimmy").with_field(
        kinds::FIELD_ENTITY,
        json!({
            "id": "impostor",
            "name": "Impostor",
            "location": "roundtable",
            "kind": {"type": "agent"}
        }),
    );
    assert!(matches!(
        registry.apply(&create),
        Err(RegistryError::Unauthorized { .. })
    ));
    assert!(registry.lookup("impostor").is_err());
}

#[test]
fn test_agents_only_move_themselves() {
    let registry = studio();

    let shove = Event::new(kinds::ENTITY_MOVES_TO_LOCATION, "jimmy")
        .with_field(kinds::FIELD_ENTITY_ID, "maria")
        .with_field(kinds::FIELD_LOCATION, "hallway");
    assert!(matches!(
        registry.apply(&shove),
        Err(RegistryError::Unauthorized { .. })
    ));
    assert_eq!(registry.lookup("maria").unwrap().location, "roundtable");

    let escort = Event::new(kinds::ENTITY_MOVES_TO_LOCATION, "world")
        .with_field(kinds::FIELD_ENTITY_ID, "maria")
        .with_field(kinds::FIELD_LOCATION, "hallway");
    registry.apply(&escort).unwrap();
    assert_eq!(registry.lookup("maria").unwrap().location, "hallway");
}

#[test]
fn test_old_move_redelivered_after_round_trip_is_duplicate() {
    let registry = studio();
    let move_to = |location: &str| {
        Event::new(kinds::ENTITY_MOVES_TO_LOCATION, "carla").with_field(kinds::FIELD_LOCATION, location)
    };

    let first = move_to("hallway");
    registry.apply(&first).unwrap();
    registry.apply(&move_to("roundtable")).unwrap();
    registry.apply(&move_to("hallway")).unwrap();
    registry.apply(&move_to("roundtable")).unwrap();

    assert_eq!(registry.apply(&first).unwrap(), ApplyOutcome::Duplicate);
    assert_eq!(registry.lookup("carla").unwrap().location, "roundtable");
}
