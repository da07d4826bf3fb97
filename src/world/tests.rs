use super::*;
use crate::action::SchemaCatalog;
use crate::broker::EventBroker;
use crate::registry::WorldMap;
use std::time::Duration;

const MIC_SPEAK: &str = "agent_speaks_into_microphone";

fn registry() -> Arc<EntityRegistry> {
    let map = WorldMap::new(["roundtable", "hallway", "rooftop"])
        .with_path("roundtable", "hallway")
        .with_path("hallway", "rooftop");
    let catalog =
        SchemaCatalog::standard().with_object_action("microphone", MIC_SPEAK, "Speaks to the audience");
    let registry = EntityRegistry::new("world", map, catalog);
    registry
        .register(Entity::agent("maria", "Maria", "host", "roundtable"))
        .unwrap();
    registry
        .register(Entity::agent("jimmy", "Jimmy", "co-host", "roundtable"))
        .unwrap();
    registry
        .register(Entity::agent("carla", "Carla", "guest", "hallway"))
        .unwrap();
    registry
        .register(Entity::object("microphone", "Microphone", "", "roundtable").held_by("maria"))
        .unwrap();
    registry
        .register(Entity::object("lamp", "Lamp", "A desk lamp", "roundtable"))
        .unwrap();
    Arc::new(registry)
}

fn world(registry: Arc<EntityRegistry>, radius: usize) -> WorldRuntime {
    let broker = Arc::new(EventBroker::new());
    let (sender, _receiver) = broker.connect("world");
    WorldRuntime::new("world", registry, sender, radius)
}

fn ids(value: &Value) -> Vec<String> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["id"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_nearby_request_answered_to_requester() {
    let world = world(registry(), 0);
    let request = Event::new(kinds::AGENT_GETS_NEARBY_ENTITIES, "jimmy").with_target("world");

    let reply = world.handle_event(&request).unwrap();

    assert_eq!(reply.event_type(), kinds::WORLD_SENDS_NEARBY_ENTITIES);
    assert_eq!(reply.sender_id(), "world");
    assert!(reply.is_targeted_at("jimmy"));
    assert_eq!(
        ids(&reply.payload()["nearby_entities"]),
        vec!["lamp", "maria", "microphone"]
    );
    assert_eq!(reply.payload_str("request_event_id"), Some(request.event_id()));
}

#[test]
fn test_vision_radius_widens_nearby() {
    let world = world(registry(), 1);
    let request = Event::new(kinds::AGENT_GETS_NEARBY_ENTITIES, "jimmy").with_target("world");

    let reply = world.handle_event(&request).unwrap();

    assert!(ids(&reply.payload()["nearby_entities"]).contains(&"carla".to_string()));
}

#[test]
fn test_object_info_request() {
    let world = world(registry(), 0);
    let request = Event::new(kinds::AGENT_GETS_OBJECT_INFO, "jimmy")
        .with_target("world")
        .with_field(kinds::FIELD_OBJECT_ID, "microphone");

    let reply = world.handle_event(&request).unwrap();

    assert_eq!(reply.event_type(), kinds::WORLD_SENDS_OBJECT_INFO);
    assert_eq!(reply.payload()[kinds::FIELD_ENTITY]["held_by"], "maria");
}

#[test]
fn test_object_info_for_agent_rejected() {
    let world = world(registry(), 0);
    let request = Event::new(kinds::AGENT_GETS_OBJECT_INFO, "jimmy")
        .with_target("world")
        .with_field(kinds::FIELD_OBJECT_ID, "maria");

    let reply = world.handle_event(&request).unwrap();

    assert_eq!(reply.event_type(), kinds::WORLD_REJECTS_REQUEST);
    assert!(reply.is_targeted_at("jimmy"));
    assert!(reply.payload_str("reason").unwrap().contains("not an object"));
}

#[test]
fn test_agent_info_request() {
    let world = world(registry(), 0);
    let request = Event::new(kinds::AGENT_GETS_AGENT_INFO, "jimmy")
        .with_target("world")
        .with_field(kinds::FIELD_AGENT_ID, "maria");

    let reply = world.handle_event(&request).unwrap();

    assert_eq!(reply.event_type(), kinds::WORLD_SENDS_AGENT_INFO);
    assert_eq!(reply.payload()[kinds::FIELD_ENTITY]["kind"]["type"], "agent");
    assert_eq!(
        reply.payload()[kinds::FIELD_ENTITY]["kind"]["inventory"][0],
        "microphone"
    );
}

#[test]
fn test_world_state_update_lists_schemas() {
    let world = world(registry(), 0);
    let request =
        Event::new(kinds::ENTITY_REQUESTS_WORLD_STATE_UPDATE, "maria").with_target("world");

    let reply = world.handle_event(&request).unwrap();

    assert_eq!(reply.event_type(), kinds::WORLD_SENDS_AVAILABLE_ENTITIES);
    let schemas: Vec<&str> = reply.payload()["available_action_schemas"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["event_type"].as_str().unwrap())
        .collect();
    assert!(schemas.contains(&MIC_SPEAK));
    assert!(schemas.contains(&kinds::AGENT_GIVES_OBJECT_TO_AGENT));
}

#[test]
fn test_untargeted_request_still_answered() {
    let world = world(registry(), 0);
    let request = Event::new(kinds::AGENT_GETS_NEARBY_ENTITIES, "jimmy");

    assert!(world.handle_event(&request).is_some());
}

#[test]
fn test_unsupported_request_rejected() {
    let world = world(registry(), 0);
    let request = Event::new("agent_orders_pizza_event", "jimmy").with_target("world");

    let reply = world.handle_event(&request).unwrap();
    assert_eq!(reply.event_type(), kinds::WORLD_REJECTS_REQUEST);
    assert_eq!(
        reply.payload_str("request_event_type"),
        Some("agent_orders_pizza_event")
    );
}

#[test]
fn test_request_from_unknown_sender_rejected() {
    let world = world(registry(), 0);
    let request = Event::new(kinds::AGENT_GETS_NEARBY_ENTITIES, "ghost").with_target("world");

    let reply = world.handle_event(&request).unwrap();
    assert_eq!(reply.event_type(), kinds::WORLD_REJECTS_REQUEST);
}

#[test]
fn test_other_traffic_ignored() {
    let world = world(registry(), 0);
    let chatter = Event::new(kinds::AGENT_SPEAKS_WITH_AGENT, "maria").with_target("jimmy");

    assert!(world.handle_event(&chatter).is_none());
}

#[test]
fn test_structural_event_applied_once() {
    let registry = registry();
    let world = world(Arc::clone(&registry), 0);
    let give = Event::new(kinds::AGENT_GIVES_OBJECT_TO_AGENT, "maria")
        .with_target("jimmy")
        .with_field(kinds::FIELD_OBJECT_ID, "microphone")
        .with_field(kinds::FIELD_RECIPIENT_ID, "jimmy");

    assert!(world.handle_event(&give).is_none());
    assert!(world.handle_event(&give).is_none());

    let mic = registry.lookup("microphone").unwrap();
    assert_eq!(mic.held_by.as_deref(), Some("jimmy"));
}

#[test]
fn test_conflicting_structural_event_logged_not_applied() {
    let registry = registry();
    let world = world(Arc::clone(&registry), 0);
    let bogus = Event::new(kinds::AGENT_GIVES_OBJECT_TO_AGENT, "jimmy")
        .with_target("carla")
        .with_field(kinds::FIELD_OBJECT_ID, "microphone")
        .with_field(kinds::FIELD_RECIPIENT_ID, "carla");

    assert!(world.handle_event(&bogus).is_none());
    assert_eq!(
        registry.lookup("microphone").unwrap().held_by.as_deref(),
        Some("maria")
    );
}

#[test]
fn test_object_answers_interaction() {
    let registry = registry();
    let broker = Arc::new(EventBroker::new());
    let (sender, _receiver) = broker.connect("lamp");
    let lamp = ObjectRuntime::new("lamp", registry, sender);

    let poke = Event::new(kinds::AGENT_INTERACTS_WITH_OBJECT, "jimmy")
        .with_target("lamp")
        .with_field("interaction", "switch on");
    let reply = lamp.handle_event(&poke).unwrap();

    assert_eq!(reply.event_type(), kinds::OBJECT_RESPONDS_TO_INTERACTION);
    assert!(reply.is_targeted_at("jimmy"));
    assert_eq!(reply.payload_str("interaction"), Some("switch on"));
    assert_eq!(reply.payload()[kinds::FIELD_ENTITY]["name"], "Lamp");

    let elsewhere = Event::new(kinds::AGENT_INTERACTS_WITH_OBJECT, "jimmy").with_target("microphone");
    assert!(lamp.handle_event(&elsewhere).is_none());
}

#[tokio::test]
async fn test_world_run_replies_over_broker() {
    let registry = registry();
    let broker = Arc::new(EventBroker::new());
    let (world_tx, world_rx) = broker.connect("world");
    let (jimmy_tx, mut jimmy_rx) = broker.connect("jimmy");
    let (stop_tx, stop_rx) = watch::channel(false);

    let world = WorldRuntime::new("world", registry, world_tx, 0);
    let handle = tokio::spawn(world.run(world_rx, stop_rx));

    jimmy_tx.send(&Event::new(kinds::AGENT_GETS_NEARBY_ENTITIES, "jimmy").with_target("world"));

    let reply = tokio::time::timeout(Duration::from_secs(2), jimmy_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.event_type(), kinds::WORLD_SENDS_NEARBY_ENTITIES);

    stop_tx.send(true).unwrap();
    handle.await.unwrap();
    assert!(!broker.is_connected("world"));
}

#[test]
fn test_unauthorized_structural_events_not_applied() {
    let registry = registry();
    let world = world(Arc::clone(&registry), 0);

    let lullaby = Event::new(kinds::AGENT_FALLS_ASLEEP, "jimmy").with_target("maria");
    let erase = Event::new(kinds::WORLD_DESTROYS_ENTITY, "jimmy")
        .with_field(kinds::FIELD_ENTITY_ID, "maria");

    assert!(world.handle_event(&lullaby).is_none());
    assert!(world.handle_event(&erase).is_none());

    let maria = registry.lookup("maria").unwrap();
    assert!(!maria.is_asleep());
}
