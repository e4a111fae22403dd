use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Goal, presets};
use crate::error::{GoalrunError, Result};

/// Maps goal names to implementations
#[derive(Clone, Default)]
pub struct GoalRegistry {
    goals: BTreeMap<String, Arc<dyn Goal>>,
}

impl GoalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the command presets
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for goal in presets::all() {
            registry.register(Arc::new(goal));
        }
        registry
    }

    /// Add a goal, replacing any goal with the same name
    pub fn register(&mut self, goal: Arc<dyn Goal>) {
        self.goals.insert(goal.name().to_string(), goal);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.goals.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Goal>> {
        self.goals.get(name).cloned().ok_or_else(|| GoalrunError::UnknownGoal {
            name: name.to_string(),
            available: self.names().join(", "),
        })
    }

    /// Sorted goal names
    pub fn names(&self) -> Vec<&str> {
        self.goals.keys().map(|k| k.as_str()).collect()
    }
}
