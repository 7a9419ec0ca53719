//! Bookkeeping that ties engine handles to scene nodes and listeners.

use std::collections::HashMap;

use glam::{Mat4, Vec3};
use rapier3d::prelude::{ColliderHandle, RigidBodyHandle};
use rigidsync_common::{DrivenNode, NodeId};

use crate::events::{CollisionEnterPayload, CollisionPayload, ContactForcePayload};

/// Per-body data captured at registration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidBodyState {
    pub node: DrivenNode,
    /// Inverse of the driven node's parent frame, for converting simulation
    /// poses into the node's local space.
    pub inverse_world: Mat4,
    pub scale: Vec3,
    /// Sleep flag seen by the last transform sync.
    pub is_sleeping: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ColliderState {
    /// Parent body at registration, if any.
    pub body: Option<RigidBodyHandle>,
    pub node: Option<NodeId>,
    /// Node whose frame locates a standalone collider (typically a sensor).
    pub world_parent: Option<NodeId>,
}

pub type RigidBodyStateMap = HashMap<RigidBodyHandle, RigidBodyState>;
pub type ColliderStateMap = HashMap<ColliderHandle, ColliderState>;
pub type EventMap<H> = HashMap<H, EventCallbacks>;

pub type SleepCallback = Box<dyn FnMut()>;
pub type CollisionEnterCallback = Box<dyn FnMut(&CollisionEnterPayload)>;
pub type CollisionCallback = Box<dyn FnMut(&CollisionPayload)>;
pub type ContactForceCallback = Box<dyn FnMut(&ContactForcePayload)>;

/// Listeners for one body or collider. Every slot is optional.
#[derive(Default)]
pub struct EventCallbacks {
    sleep: Option<SleepCallback>,
    wake: Option<SleepCallback>,
    collision_enter: Option<CollisionEnterCallback>,
    collision_exit: Option<CollisionCallback>,
    intersection_enter: Option<CollisionCallback>,
    intersection_exit: Option<CollisionCallback>,
    contact_force: Option<ContactForceCallback>,
}

impl std::fmt::Debug for EventCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventCallbacks")
            .field("sleep", &self.sleep.is_some())
            .field("wake", &self.wake.is_some())
            .field("collision_enter", &self.collision_enter.is_some())
            .field("collision_exit", &self.collision_exit.is_some())
            .field("intersection_enter", &self.intersection_enter.is_some())
            .field("intersection_exit", &self.intersection_exit.is_some())
            .field("contact_force", &self.contact_force.is_some())
            .finish()
    }
}

impl EventCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_sleep(mut self, f: impl FnMut() + 'static) -> Self {
        self.sleep = Some(Box::new(f));
        self
    }

    pub fn on_wake(mut self, f: impl FnMut() + 'static) -> Self {
        self.wake = Some(Box::new(f));
        self
    }

    pub fn on_collision_enter(mut self, f: impl FnMut(&CollisionEnterPayload) + 'static) -> Self {
        self.collision_enter = Some(Box::new(f));
        self
    }

    pub fn on_collision_exit(mut self, f: impl FnMut(&CollisionPayload) + 'static) -> Self {
        self.collision_exit = Some(Box::new(f));
        self
    }

    pub fn on_intersection_enter(mut self, f: impl FnMut(&CollisionPayload) + 'static) -> Self {
        self.intersection_enter = Some(Box::new(f));
        self
    }

    pub fn on_intersection_exit(mut self, f: impl FnMut(&CollisionPayload) + 'static) -> Self {
        self.intersection_exit = Some(Box::new(f));
        self
    }

    pub fn on_contact_force(mut self, f: impl FnMut(&ContactForcePayload) + 'static) -> Self {
        self.contact_force = Some(Box::new(f));
        self
    }

    /// Take every slot `other` sets; keep the rest.
    pub fn merge(&mut self, other: EventCallbacks) {
        fn take<T>(slot: &mut Option<T>, incoming: Option<T>) {
            if incoming.is_some() {
                *slot = incoming;
            }
        }
        take(&mut self.sleep, other.sleep);
        take(&mut self.wake, other.wake);
        take(&mut self.collision_enter, other.collision_enter);
        take(&mut self.collision_exit, other.collision_exit);
        take(&mut self.intersection_enter, other.intersection_enter);
        take(&mut self.intersection_exit, other.intersection_exit);
        take(&mut self.contact_force, other.contact_force);
    }

    pub fn is_empty(&self) -> bool {
        self.sleep.is_none()
            && self.wake.is_none()
            && self.collision_enter.is_none()
            && self.collision_exit.is_none()
            && self.intersection_enter.is_none()
            && self.intersection_exit.is_none()
            && self.contact_force.is_none()
    }

    pub fn has_contact_force(&self) -> bool {
        self.contact_force.is_some()
    }

    // The fire_* helpers return whether a listener was present.

    pub(crate) fn fire_sleep(&mut self) -> bool {
        self.sleep.as_mut().map(|f| f()).is_some()
    }

    pub(crate) fn fire_wake(&mut self) -> bool {
        self.wake.as_mut().map(|f| f()).is_some()
    }

    pub(crate) fn fire_collision_enter(&mut self, payload: &CollisionEnterPayload) -> bool {
        self.collision_enter.as_mut().map(|f| f(payload)).is_some()
    }

    pub(crate) fn fire_collision_exit(&mut self, payload: &CollisionPayload) -> bool {
        self.collision_exit.as_mut().map(|f| f(payload)).is_some()
    }

    pub(crate) fn fire_intersection_enter(&mut self, payload: &CollisionPayload) -> bool {
        self.intersection_enter.as_mut().map(|f| f(payload)).is_some()
    }

    pub(crate) fn fire_intersection_exit(&mut self, payload: &CollisionPayload) -> bool {
        self.intersection_exit.as_mut().map(|f| f(payload)).is_some()
    }

    pub(crate) fn fire_contact_force(&mut self, payload: &ContactForcePayload) -> bool {
        self.contact_force.as_mut().map(|f| f(payload)).is_some()
    }
}

/// State and event maps for every registered body and collider.
///
/// Events are only stored for handles that have state, so an event entry
/// never outlives its handle's registration.
#[derive(Debug, Default)]
pub struct Registry {
    pub(crate) bodies: RigidBodyStateMap,
    pub(crate) colliders: ColliderStateMap,
    pub(crate) body_events: EventMap<RigidBodyHandle>,
    pub(crate) collider_events: EventMap<ColliderHandle>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_rigid_body(&mut self, handle: RigidBodyHandle, state: RigidBodyState) {
        self.bodies.insert(handle, state);
    }

    pub fn insert_collider(&mut self, handle: ColliderHandle, state: ColliderState) {
        self.colliders.insert(handle, state);
    }

    pub fn rigid_body(&self, handle: RigidBodyHandle) -> Option<&RigidBodyState> {
        self.bodies.get(&handle)
    }

    pub fn collider(&self, handle: ColliderHandle) -> Option<&ColliderState> {
        self.colliders.get(&handle)
    }

    pub fn rigid_bodies(&self) -> impl Iterator<Item = (RigidBodyHandle, &RigidBodyState)> {
        self.bodies.iter().map(|(h, s)| (*h, s))
    }

    pub fn colliders(&self) -> impl Iterator<Item = (ColliderHandle, &ColliderState)> {
        self.colliders.iter().map(|(h, s)| (*h, s))
    }

    pub fn rigid_body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn collider_count(&self) -> usize {
        self.colliders.len()
    }

    pub fn rigid_body_events(&self, handle: RigidBodyHandle) -> Option<&EventCallbacks> {
        self.body_events.get(&handle)
    }

    pub fn collider_events(&self, handle: ColliderHandle) -> Option<&EventCallbacks> {
        self.collider_events.get(&handle)
    }

    /// Merge listeners into a registered body's entry. Returns false (and
    /// stores nothing) if the body is not registered.
    pub fn subscribe_rigid_body(&mut self, handle: RigidBodyHandle, callbacks: EventCallbacks) -> bool {
        if !self.bodies.contains_key(&handle) {
            return false;
        }
        self.body_events.entry(handle).or_default().merge(callbacks);
        true
    }

    pub fn subscribe_collider(&mut self, handle: ColliderHandle, callbacks: EventCallbacks) -> bool {
        if !self.colliders.contains_key(&handle) {
            return false;
        }
        self.collider_events.entry(handle).or_default().merge(callbacks);
        true
    }

    /// Whether the collider should report contact forces: it, or the body it
    /// is attached to, has a contact-force listener.
    pub fn wants_contact_force(&self, collider: ColliderHandle) -> bool {
        let own = self
            .collider_events
            .get(&collider)
            .is_some_and(EventCallbacks::has_contact_force);
        let parent = self
            .colliders
            .get(&collider)
            .and_then(|s| s.body)
            .and_then(|b| self.body_events.get(&b))
            .is_some_and(EventCallbacks::has_contact_force);
        own || parent
    }

    /// Registered colliders attached to `body`.
    pub fn colliders_of(&self, body: RigidBodyHandle) -> Vec<ColliderHandle> {
        self.colliders
            .iter()
            .filter(|(_, s)| s.body == Some(body))
            .map(|(h, _)| *h)
            .collect()
    }

    /// Drop a body's state and events, along with those of its colliders.
    /// Returns the removed state.
    pub fn remove_rigid_body(&mut self, handle: RigidBodyHandle) -> Option<RigidBodyState> {
        for collider in self.colliders_of(handle) {
            self.remove_collider(collider);
        }
        self.body_events.remove(&handle);
        self.bodies.remove(&handle)
    }

    pub fn remove_collider(&mut self, handle: ColliderHandle) -> Option<ColliderState> {
        self.collider_events.remove(&handle);
        self.colliders.remove(&handle)
    }

    pub fn clear(&mut self) {
        self.bodies.clear();
        self.colliders.clear();
        self.body_events.clear();
        self.collider_events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapier3d::prelude::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn handles() -> (RigidBodyHandle, ColliderHandle, ColliderHandle) {
        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();
        let body = bodies.insert(RigidBodyBuilder::dynamic());
        let c1 = colliders.insert_with_parent(ColliderBuilder::ball(0.5), body, &mut bodies);
        let c2 = colliders.insert(ColliderBuilder::ball(0.5));
        (body, c1, c2)
    }

    fn body_state() -> RigidBodyState {
        RigidBodyState {
            node: DrivenNode::Single(NodeId(0)),
            inverse_world: Mat4::IDENTITY,
            scale: Vec3::ONE,
            is_sleeping: false,
        }
    }

    #[test]
    fn merge_keeps_unset_slots() {
        let sleeps = Rc::new(Cell::new(0));
        let wakes = Rc::new(Cell::new(0));
        let (s, w) = (Rc::clone(&sleeps), Rc::clone(&wakes));

        let mut events = EventCallbacks::new().on_sleep(move || s.set(s.get() + 1));
        events.merge(EventCallbacks::new().on_wake(move || w.set(w.get() + 1)));

        assert!(events.fire_sleep());
        assert!(events.fire_wake());
        assert!(!events.fire_contact_force(&ContactForcePayload {
            target: dummy_target(),
            other: dummy_target(),
            total_force: Vec3::ZERO,
            total_force_magnitude: 0.0,
            max_force_direction: Vec3::ZERO,
            max_force_magnitude: 0.0,
        }));
        assert_eq!((sleeps.get(), wakes.get()), (1, 1));
    }

    #[test]
    fn merge_replaces_set_slots() {
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let mut events = EventCallbacks::new().on_sleep(|| panic!("replaced"));
        events.merge(EventCallbacks::new().on_sleep(move || h.set(h.get() + 10)));
        events.fire_sleep();
        assert_eq!(hits.get(), 10);
    }

    fn dummy_target() -> crate::events::CollisionTarget {
        let (_, c1, _) = handles();
        crate::events::CollisionTarget {
            collider: c1,
            collider_node: None,
            collider_world_parent: None,
            rigid_body: None,
            rigid_body_node: None,
        }
    }

    #[test]
    fn subscribe_requires_registration() {
        let (body, c1, _) = handles();
        let mut registry = Registry::new();
        assert!(!registry.subscribe_rigid_body(body, EventCallbacks::new().on_sleep(|| {})));
        assert!(registry.rigid_body_events(body).is_none());

        registry.insert_rigid_body(body, body_state());
        assert!(registry.subscribe_rigid_body(body, EventCallbacks::new().on_sleep(|| {})));
        assert!(!registry.subscribe_collider(c1, EventCallbacks::new()));
    }

    #[test]
    fn removing_body_drops_attached_collider_entries() {
        let (body, c1, c2) = handles();
        let mut registry = Registry::new();
        registry.insert_rigid_body(body, body_state());
        registry.insert_collider(
            c1,
            ColliderState {
                body: Some(body),
                ..ColliderState::default()
            },
        );
        registry.insert_collider(c2, ColliderState::default());
        registry.subscribe_rigid_body(body, EventCallbacks::new().on_wake(|| {}));
        registry.subscribe_collider(c1, EventCallbacks::new().on_collision_exit(|_| {}));
        registry.subscribe_collider(c2, EventCallbacks::new().on_collision_exit(|_| {}));

        assert!(registry.remove_rigid_body(body).is_some());
        assert!(registry.rigid_body_events(body).is_none());
        assert!(registry.collider(c1).is_none());
        assert!(registry.collider_events(c1).is_none());
        assert!(registry.collider(c2).is_some());
        assert!(registry.collider_events(c2).is_some());
    }

    #[test]
    fn contact_force_interest_follows_parent_body() {
        let (body, c1, c2) = handles();
        let mut registry = Registry::new();
        registry.insert_rigid_body(body, body_state());
        registry.insert_collider(
            c1,
            ColliderState {
                body: Some(body),
                ..ColliderState::default()
            },
        );
        registry.insert_collider(c2, ColliderState::default());
        assert!(!registry.wants_contact_force(c1));

        registry.subscribe_rigid_body(body, EventCallbacks::new().on_contact_force(|_| {}));
        assert!(registry.wants_contact_force(c1));
        assert!(!registry.wants_contact_force(c2));

        registry.subscribe_collider(c2, EventCallbacks::new().on_contact_force(|_| {}));
        assert!(registry.wants_contact_force(c2));
    }
}
