//! Composite registry: a container of child registries with no meters of
//! its own. Children may themselves be composites.

use std::sync::{Arc, PoisonError, RwLock};

use super::{Meter, MeterRegistry};

#[derive(Default)]
pub struct CompositeRegistry {
    children: RwLock<Vec<Arc<dyn MeterRegistry>>>,
}

impl CompositeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_children(children: Vec<Arc<dyn MeterRegistry>>) -> Self {
        Self { children: RwLock::new(children) }
    }

    pub fn add(&self, child: Arc<dyn MeterRegistry>) {
        self.children
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(child);
    }
}

impl MeterRegistry for CompositeRegistry {
    fn children(&self) -> Option<Vec<Arc<dyn MeterRegistry>>> {
        let children = self.children.read().unwrap_or_else(PoisonError::into_inner);
        Some(children.clone())
    }

    fn meters(&self) -> Vec<Arc<dyn Meter>> {
        Vec::new()
    }
}
