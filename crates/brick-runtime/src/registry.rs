//! Brick Registry
//!
//! Built explicitly at startup and shared read-only behind an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use brick_core::{Brick, BrickId, BrickKind};

/// A registered brick with its kind resolved once at registration
#[derive(Clone)]
pub struct RegisteredBrick {
    pub brick: Arc<dyn Brick>,
    pub kind: BrickKind,
}

impl std::fmt::Debug for RegisteredBrick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredBrick")
            .field("id", &self.brick.id())
            .field("kind", &self.kind)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BrickRegistry {
    bricks: HashMap<BrickId, RegisteredBrick>,
}

impl BrickRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a brick, replacing and returning any brick with the same id
    pub fn register(&mut self, brick: Arc<dyn Brick>) -> Option<RegisteredBrick> {
        let id = BrickId::from(brick.id());
        let kind = brick.kind();
        debug!(brick_id = %id, kind = %kind, "registering brick");

        let previous = self.bricks.insert(id.clone(), RegisteredBrick { brick, kind });
        if previous.is_some() {
            warn!(brick_id = %id, "brick registered twice, replacing previous definition");
        }
        previous
    }

    pub fn lookup(&self, id: &BrickId) -> Option<&RegisteredBrick> {
        self.bricks.get(id)
    }

    pub fn contains(&self, id: &BrickId) -> bool {
        self.bricks.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.bricks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bricks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BrickId, &RegisteredBrick)> {
        self.bricks.iter()
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<&BrickId> {
        let mut ids: Vec<_> = self.bricks.keys().collect();
        ids.sort();
        ids
    }
}
