use crate::action::{ActionSchema, SchemaCatalog};
use crate::event::{kinds, Event};
use crate::registry::entity::{Change, Entity, RegistryUpdate};
use crate::registry::world_map::WorldMap;
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Registry errors
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryError {
    NotFound(String),
    AlreadyExists(String),
    UnknownLocation(String),
    NotAnAgent(String),
    NotAnObject(String),
    /// Compare-and-swap on held_by failed
    Conflict {
        object_id: String,
        expected_holder: Option<String>,
        actual_holder: Option<String>,
    },
    /// Structural event whose payload cannot be applied
    Malformed { event_type: String, reason: String },
    /// Sender has no authority over the entity the event changes
    Unauthorized {
        event_type: String,
        sender_id: String,
        subject: String,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::NotFound(id) => write!(f, "entity '{}' not found", id),
            RegistryError::AlreadyExists(id) => write!(f, "entity '{}' already registered", id),
            RegistryError::UnknownLocation(l) => write!(f, "unknown location '{}'", l),
            RegistryError::NotAnAgent(id) => write!(f, "'{}' is not an agent", id),
            RegistryError::NotAnObject(id) => write!(f, "'{}' is not an object", id),
            RegistryError::Conflict {
                object_id,
                expected_holder,
                actual_holder,
            } => write!(
                f,
                "'{}' expected to be held by {} but is held by {}",
                object_id,
                expected_holder.as_deref().unwrap_or("nobody"),
                actual_holder.as_deref().unwrap_or("nobody")
            ),
            RegistryError::Malformed { event_type, reason } => {
                write!(f, "malformed '{}' event: {}", event_type, reason)
            }
            RegistryError::Unauthorized {
                event_type,
                sender_id,
                subject,
            } => write!(
                f,
                "'{}' may not apply '{}' to '{}'",
                sender_id, event_type, subject
            ),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Result of applying an event
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Applied(Vec<RegistryUpdate>),
    /// Same event already applied to the same entity pair
    Duplicate,
    /// Not a structural event type
    PassThrough,
}

/// Applied event ids remembered for redelivery checks
const APPLIED_ID_CAPACITY: usize = 10_000;

struct RegistryInner {
    world: WorldMap,
    entities: HashMap<String, Entity>,
    /// (entity, counterpart) -> last applied event id
    last_applied: HashMap<(String, String), String>,
    /// Recently applied event ids, oldest first
    applied_ids: HashSet<String>,
    applied_order: VecDeque<String>,
}

/// Canonical bookkeeping of the world's entities.
///
/// Mutations are serialized behind one write lock; reads run concurrently.
/// Each applied change is broadcast to subscribers after the lock is released.
pub struct EntityRegistry {
    /// Only this sender may create or destroy entities
    world_id: String,
    inner: RwLock<RegistryInner>,
    catalog: SchemaCatalog,
    update_tx: broadcast::Sender<RegistryUpdate>,
}

impl EntityRegistry {
    pub fn new(world_id: impl Into<String>, world: WorldMap, catalog: SchemaCatalog) -> Self {
        let (update_tx, _) = broadcast::channel(1000);

        Self {
            world_id: world_id.into(),
            inner: RwLock::new(RegistryInner {
                world,
                entities: HashMap::new(),
                last_applied: HashMap::new(),
                applied_ids: HashSet::new(),
                applied_order: VecDeque::new(),
            }),
            catalog,
            update_tx,
        }
    }

    /// Event types `apply` mutates state for
    pub fn is_structural(event_type: &str) -> bool {
        matches!(
            event_type,
            kinds::AGENT_GIVES_OBJECT_TO_AGENT
                | kinds::AGENT_TAKES_OBJECT
                | kinds::AGENT_DROPS_OBJECT
                | kinds::ENTITY_MOVES_TO_LOCATION
                | kinds::WORLD_CREATES_ENTITY
                | kinds::WORLD_DESTROYS_ENTITY
                | kinds::AGENT_FALLS_ASLEEP
                | kinds::AGENT_WAKES_UP
        )
    }

    /// Register an entity.
    ///
    /// Objects registered with `held_by` are placed in the holder's inventory
    /// and take the holder's location, so holders must be registered first.
    pub fn register(&self, entity: Entity) -> Result<(), RegistryError> {
        let updates = {
            let mut inner = self.inner.write().unwrap();
            inner.insert(entity, None)?
        };
        self.broadcast(updates);
        Ok(())
    }

    /// Get entity by ID
    pub fn lookup(&self, entity_id: &str) -> Result<Entity, RegistryError> {
        let inner = self.inner.read().unwrap();
        inner
            .entities
            .get(entity_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(entity_id.to_string()))
    }

    /// Get all entities, sorted by id
    pub fn all_entities(&self) -> Vec<Entity> {
        let inner = self.inner.read().unwrap();
        let mut entities: Vec<Entity> = inner.entities.values().cloned().collect();
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        entities
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn locations(&self) -> Vec<String> {
        self.inner.read().unwrap().world.locations()
    }

    /// Entities at most `radius` hops from `location`, sorted by id
    pub fn nearby(&self, location: &str, radius: usize) -> Vec<Entity> {
        let inner = self.inner.read().unwrap();
        inner.nearby(location, radius)
    }

    /// Schemas currently available to `entity_id`, using `radius` for
    /// proximity-dependent schemas
    pub fn schemas_for(
        &self,
        entity_id: &str,
        radius: usize,
    ) -> Result<Vec<ActionSchema>, RegistryError> {
        let inner = self.inner.read().unwrap();
        let entity = inner
            .entities
            .get(entity_id)
            .ok_or_else(|| RegistryError::NotFound(entity_id.to_string()))?;
        let nearby: Vec<Entity> = inner
            .nearby(&entity.location, radius)
            .into_iter()
            .filter(|e| e.id != entity_id)
            .collect();
        Ok(self.catalog.available_for(entity, &nearby))
    }

    pub fn world_id(&self) -> &str {
        &self.world_id
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Subscribe to registry changes
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryUpdate> {
        self.update_tx.subscribe()
    }

    /// Apply a structural event.
    ///
    /// Idempotent under redelivery: the last applied event id is tracked per
    /// affected entity pair, along with a bounded set of recently applied
    /// ids, and a repeat returns `Duplicate` without touching state.
    /// Transfers compare-and-swap `held_by` against the claimed holder.
    ///
    /// Senders only change what they own: their own location and sleep flag,
    /// objects they hold or pick up. The world may also move, create,
    /// destroy, put to sleep and wake any entity.
    pub fn apply(&self, event: &Event) -> Result<ApplyOutcome, RegistryError> {
        if !Self::is_structural(event.event_type()) {
            return Ok(ApplyOutcome::PassThrough);
        }

        let key = pair_key(event)?;
        self.authorize(event, &key.0)?;

        let updates = {
            let mut inner = self.inner.write().unwrap();

            if inner.applied_ids.contains(event.event_id())
                || inner.last_applied.get(&key).map(String::as_str) == Some(event.event_id())
            {
                debug!(
                    event_id = %event.event_id(),
                    event_type = %event.event_type(),
                    "Duplicate event, skipping"
                );
                return Ok(ApplyOutcome::Duplicate);
            }

            let updates = inner.mutate(event)?;
            inner.last_applied.insert(key, event.event_id().to_string());
            inner.remember(event.event_id());
            updates
        };

        info!(
            event_id = %event.event_id(),
            event_type = %event.event_type(),
            sender_id = %event.sender_id(),
            changes = updates.len(),
            "Applied event to registry"
        );

        self.broadcast(updates.clone());
        Ok(ApplyOutcome::Applied(updates))
    }

    /// Reject events whose sender does not own `subject`
    fn authorize(&self, event: &Event, subject: &str) -> Result<(), RegistryError> {
        let sender = event.sender_id();
        let allowed = match event.event_type() {
            kinds::WORLD_CREATES_ENTITY | kinds::WORLD_DESTROYS_ENTITY => sender == self.world_id,
            kinds::ENTITY_MOVES_TO_LOCATION | kinds::AGENT_FALLS_ASLEEP | kinds::AGENT_WAKES_UP => {
                sender == subject || sender == self.world_id
            }
            // Transfers are guarded by the held_by compare-and-swap
            _ => true,
        };
        if allowed {
            return Ok(());
        }

        warn!(
            event_id = %event.event_id(),
            event_type = %event.event_type(),
            sender_id = %sender,
            subject = %subject,
            "Unauthorized structural event"
        );
        Err(RegistryError::Unauthorized {
            event_type: event.event_type().to_string(),
            sender_id: sender.to_string(),
            subject: subject.to_string(),
        })
    }

    fn broadcast(&self, updates: Vec<RegistryUpdate>) {
        for update in updates {
            // No subscribers is fine
            let _ = self.update_tx.send(update);
        }
    }
}

/// The entity pair an event affects, used for duplicate detection
fn pair_key(event: &Event) -> Result<(String, String), RegistryError> {
    let key = match event.event_type() {
        kinds::AGENT_GIVES_OBJECT_TO_AGENT => (
            field(event, kinds::FIELD_OBJECT_ID)?,
            recipient(event)?,
        ),
        kinds::AGENT_TAKES_OBJECT | kinds::AGENT_DROPS_OBJECT => (
            field(event, kinds::FIELD_OBJECT_ID)?,
            event.sender_id().to_string(),
        ),
        kinds::ENTITY_MOVES_TO_LOCATION => (
            mover(event),
            field(event, kinds::FIELD_LOCATION)?,
        ),
        kinds::WORLD_CREATES_ENTITY => {
            let id = event
                .payload()
                .get(kinds::FIELD_ENTITY)
                .and_then(|e| e.get("id"))
                .and_then(|v| v.as_str())
                .ok_or_else(|| malformed(event, "payload field 'entity.id' is required"))?;
            (id.to_string(), "created".to_string())
        }
        kinds::WORLD_DESTROYS_ENTITY => (subject(event)?, "destroyed".to_string()),
        kinds::AGENT_FALLS_ASLEEP => (sleeper(event), "asleep".to_string()),
        kinds::AGENT_WAKES_UP => (sleeper(event), "awake".to_string()),
        other => return Err(malformed(event, &format!("'{}' is not structural", other))),
    };
    Ok(key)
}

fn malformed(event: &Event, reason: &str) -> RegistryError {
    RegistryError::Malformed {
        event_type: event.event_type().to_string(),
        reason: reason.to_string(),
    }
}

fn field(event: &Event, key: &str) -> Result<String, RegistryError> {
    event
        .payload_str(key)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| malformed(event, &format!("payload field '{}' is required", key)))
}

/// Recipient of a give: the target_id. A payload recipient_id must agree.
fn recipient(event: &Event) -> Result<String, RegistryError> {
    let target = event
        .target_id()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| malformed(event, "target_id names the recipient and is required"))?;
    match event.payload_str(kinds::FIELD_RECIPIENT_ID) {
        Some(named) if named != target => Err(malformed(
            event,
            &format!("recipient_id '{}' does not match target_id '{}'", named, target),
        )),
        _ => Ok(target.to_string()),
    }
}

/// Entity being moved: payload entity_id, or the sender itself
fn mover(event: &Event) -> String {
    event
        .payload_str(kinds::FIELD_ENTITY_ID)
        .unwrap_or(event.sender_id())
        .to_string()
}

/// Entity being destroyed: payload entity_id, falling back to target_id
fn subject(event: &Event) -> Result<String, RegistryError> {
    event
        .payload_str(kinds::FIELD_ENTITY_ID)
        .or_else(|| event.target_id())
        .map(str::to_string)
        .ok_or_else(|| malformed(event, "payload field 'entity_id' is required"))
}

/// Agent whose sleep flag changes: target_id, payload agent_id, or the sender
fn sleeper(event: &Event) -> String {
    event
        .target_id()
        .or_else(|| event.payload_str(kinds::FIELD_AGENT_ID))
        .unwrap_or(event.sender_id())
        .to_string()
}

fn update(entity_id: &str, change: Change, event_id: Option<&str>) -> RegistryUpdate {
    RegistryUpdate {
        entity_id: entity_id.to_string(),
        change,
        event_id: event_id.map(str::to_string),
        timestamp: Utc::now(),
    }
}

impl RegistryInner {
    fn remember(&mut self, event_id: &str) {
        if self.applied_ids.insert(event_id.to_string()) {
            self.applied_order.push_back(event_id.to_string());
        }
        while self.applied_order.len() > APPLIED_ID_CAPACITY {
            if let Some(oldest) = self.applied_order.pop_front() {
                self.applied_ids.remove(&oldest);
            }
        }
    }

    fn nearby(&self, location: &str, radius: usize) -> Vec<Entity> {
        let reachable = self.world.within(location, radius);
        let mut entities: Vec<Entity> = self
            .entities
            .values()
            .filter(|e| reachable.contains_key(&e.location))
            .cloned()
            .collect();
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        entities
    }

    fn agent_mut(&mut self, agent_id: &str) -> Result<&mut Entity, RegistryError> {
        let entity = self
            .entities
            .get_mut(agent_id)
            .ok_or_else(|| RegistryError::NotFound(agent_id.to_string()))?;
        if !entity.is_agent() {
            return Err(RegistryError::NotAnAgent(agent_id.to_string()));
        }
        Ok(entity)
    }

    fn insert(
        &mut self,
        mut entity: Entity,
        event_id: Option<&str>,
    ) -> Result<Vec<RegistryUpdate>, RegistryError> {
        if self.entities.contains_key(&entity.id) {
            return Err(RegistryError::AlreadyExists(entity.id));
        }
        if !self.world.contains(&entity.location) {
            return Err(RegistryError::UnknownLocation(entity.location));
        }

        // Inventories are derived from held_by, never trusted from input
        if let Some(state) = entity.agent_state_mut() {
            state.inventory.clear();
        }
        if entity.is_agent() {
            entity.held_by = None;
        }

        if let Some(holder_id) = entity.held_by.clone() {
            let holder = self.agent_mut(&holder_id)?;
            entity.location = holder.location.clone();
            if let Some(state) = holder.agent_state_mut() {
                state.inventory.insert(entity.id.clone());
            }
        }

        info!(entity_id = %entity.id, location = %entity.location, "Entity registered");
        let registered = update(&entity.id, Change::Registered, event_id);
        self.entities.insert(entity.id.clone(), entity);
        Ok(vec![registered])
    }

    fn mutate(&mut self, event: &Event) -> Result<Vec<RegistryUpdate>, RegistryError> {
        let event_id = Some(event.event_id());
        match event.event_type() {
            kinds::AGENT_GIVES_OBJECT_TO_AGENT => {
                let object_id = field(event, kinds::FIELD_OBJECT_ID)?;
                let to = recipient(event)?;
                if to == event.sender_id() {
                    return Err(malformed(event, "cannot give an object to yourself"));
                }
                self.agent_mut(&to)?;
                self.transfer(&object_id, Some(event.sender_id()), Some(&to), event_id)
            }
            kinds::AGENT_TAKES_OBJECT => {
                let object_id = field(event, kinds::FIELD_OBJECT_ID)?;
                self.transfer(&object_id, None, Some(event.sender_id()), event_id)
            }
            kinds::AGENT_DROPS_OBJECT => {
                let object_id = field(event, kinds::FIELD_OBJECT_ID)?;
                self.transfer(&object_id, Some(event.sender_id()), None, event_id)
            }
            kinds::ENTITY_MOVES_TO_LOCATION => {
                let entity_id = mover(event);
                let location = field(event, kinds::FIELD_LOCATION)?;
                self.move_entity(&entity_id, &location, event_id)
            }
            kinds::WORLD_CREATES_ENTITY => {
                let raw = event
                    .payload()
                    .get(kinds::FIELD_ENTITY)
                    .cloned()
                    .ok_or_else(|| malformed(event, "payload field 'entity' is required"))?;
                let entity: Entity = serde_json::from_value(raw)
                    .map_err(|e| malformed(event, &e.to_string()))?;
                self.insert(entity, event_id)
            }
            kinds::WORLD_DESTROYS_ENTITY => {
                let entity_id = subject(event)?;
                self.destroy(&entity_id, event_id)
            }
            kinds::AGENT_FALLS_ASLEEP | kinds::AGENT_WAKES_UP => {
                let agent_id = sleeper(event);
                let is_asleep = event.event_type() == kinds::AGENT_FALLS_ASLEEP;
                let agent = self.agent_mut(&agent_id)?;
                if let Some(state) = agent.agent_state_mut() {
                    if state.is_asleep == is_asleep {
                        return Ok(vec![]);
                    }
                    state.is_asleep = is_asleep;
                }
                Ok(vec![update(&agent_id, Change::SleepChanged { is_asleep }, event_id)])
            }
            other => Err(malformed(event, &format!("'{}' is not structural", other))),
        }
    }

    /// Move `object_id` from `expected` to `new_holder` iff it is still held
    /// by `expected`. Inventory and held_by change together.
    fn transfer(
        &mut self,
        object_id: &str,
        expected: Option<&str>,
        new_holder: Option<&str>,
        event_id: Option<&str>,
    ) -> Result<Vec<RegistryUpdate>, RegistryError> {
        let object = self
            .entities
            .get(object_id)
            .ok_or_else(|| RegistryError::NotFound(object_id.to_string()))?;
        if !object.is_object() {
            return Err(RegistryError::NotAnObject(object_id.to_string()));
        }
        if object.held_by.as_deref() != expected {
            warn!(
                object_id = %object_id,
                expected = ?expected,
                actual = ?object.held_by,
                "Transfer lost compare-and-swap"
            );
            return Err(RegistryError::Conflict {
                object_id: object_id.to_string(),
                expected_holder: expected.map(str::to_string),
                actual_holder: object.held_by.clone(),
            });
        }
        let old_location = object.location.clone();

        // Validate the new holder before touching anything
        let new_location = match new_holder {
            Some(agent_id) => self.agent_mut(agent_id)?.location.clone(),
            None => old_location.clone(),
        };

        if let Some(agent_id) = expected {
            if let Some(state) = self.agent_mut(agent_id)?.agent_state_mut() {
                state.inventory.remove(object_id);
            }
        }
        if let Some(agent_id) = new_holder {
            if let Some(state) = self.agent_mut(agent_id)?.agent_state_mut() {
                state.inventory.insert(object_id.to_string());
            }
        }

        let mut updates = vec![update(
            object_id,
            Change::HolderChanged {
                from: expected.map(str::to_string),
                to: new_holder.map(str::to_string),
            },
            event_id,
        )];

        if let Some(object) = self.entities.get_mut(object_id) {
            object.held_by = new_holder.map(str::to_string);
            if object.location != new_location {
                object.location = new_location.clone();
                updates.push(update(
                    object_id,
                    Change::Moved {
                        from: old_location,
                        to: new_location,
                    },
                    event_id,
                ));
            }
        }

        Ok(updates)
    }

    /// Move an entity; held objects travel with their holder
    fn move_entity(
        &mut self,
        entity_id: &str,
        location: &str,
        event_id: Option<&str>,
    ) -> Result<Vec<RegistryUpdate>, RegistryError> {
        if !self.world.contains(location) {
            return Err(RegistryError::UnknownLocation(location.to_string()));
        }

        let entity = self
            .entities
            .get_mut(entity_id)
            .ok_or_else(|| RegistryError::NotFound(entity_id.to_string()))?;
        if let Some(holder) = &entity.held_by {
            return Err(RegistryError::Malformed {
                event_type: kinds::ENTITY_MOVES_TO_LOCATION.to_string(),
                reason: format!("'{}' is held by {} and moves with it", entity_id, holder),
            });
        }
        if entity.location == location {
            return Ok(vec![]);
        }

        let from = std::mem::replace(&mut entity.location, location.to_string());
        let carried: Vec<String> = entity
            .inventory()
            .map(|inv| inv.iter().cloned().collect())
            .unwrap_or_default();

        let mut updates = vec![update(
            entity_id,
            Change::Moved {
                from,
                to: location.to_string(),
            },
            event_id,
        )];

        for object_id in carried {
            if let Some(object) = self.entities.get_mut(&object_id) {
                let object_from = std::mem::replace(&mut object.location, location.to_string());
                updates.push(update(
                    &object_id,
                    Change::Moved {
                        from: object_from,
                        to: location.to_string(),
                    },
                    event_id,
                ));
            }
        }

        Ok(updates)
    }

    /// Remove an entity, releasing anything it held or was held in
    fn destroy(
        &mut self,
        entity_id: &str,
        event_id: Option<&str>,
    ) -> Result<Vec<RegistryUpdate>, RegistryError> {
        let entity = self
            .entities
            .remove(entity_id)
            .ok_or_else(|| RegistryError::NotFound(entity_id.to_string()))?;

        let mut updates = vec![];

        if let Some(inventory) = entity.inventory() {
            for object_id in inventory {
                if let Some(object) = self.entities.get_mut(object_id) {
                    object.held_by = None;
                    updates.push(update(
                        object_id,
                        Change::HolderChanged {
                            from: Some(entity_id.to_string()),
                            to: None,
                        },
                        event_id,
                    ));
                }
            }
        }

        if let Some(holder_id) = &entity.held_by {
            if let Some(state) = self
                .entities
                .get_mut(holder_id)
                .and_then(|h| h.agent_state_mut())
            {
                state.inventory.remove(entity_id);
            }
        }

        info!(entity_id = %entity_id, "Entity destroyed");
        updates.push(update(entity_id, Change::Destroyed, event_id));
        Ok(updates)
    }
}
