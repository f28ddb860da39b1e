//! Plan-based feature gating.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::CollaboratorError;

/// Features whose availability depends on the restaurant's plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Feature {
    TableGrouping,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::TableGrouping => "TABLE_GROUPING",
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Answers whether a restaurant's plan allows a feature.
#[async_trait]
pub trait FeatureGate: Send + Sync {
    async fn is_enabled(&self, restaurant_id: i64, feature: Feature)
    -> Result<bool, CollaboratorError>;
}

#[derive(Debug, Default)]
struct InMemoryGateState {
    disabled: HashSet<(i64, Feature)>,
    unavailable: bool,
}

/// Every feature is enabled unless explicitly disabled.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFeatureGate {
    state: Arc<RwLock<InMemoryGateState>>,
}

impl InMemoryFeatureGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disable(&self, restaurant_id: i64, feature: Feature) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .disabled
            .insert((restaurant_id, feature));
    }

    pub fn enable(&self, restaurant_id: i64, feature: Feature) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .disabled
            .remove(&(restaurant_id, feature));
    }

    /// Makes every query fail, as if the plan service were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .unavailable = unavailable;
    }
}

#[async_trait]
impl FeatureGate for InMemoryFeatureGate {
    async fn is_enabled(
        &self,
        restaurant_id: i64,
        feature: Feature,
    ) -> Result<bool, CollaboratorError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if state.unavailable {
            return Err(CollaboratorError::Unavailable(
                "plan service unreachable".to_string(),
            ));
        }
        Ok(!state.disabled.contains(&(restaurant_id, feature)))
    }
}
