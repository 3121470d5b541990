//! Feature gating.
//!
//! Some node types are only available once a feature is unlocked. How a
//! feature gets unlocked (a license check, a settings flag) is outside the
//! host; it only asks the gate, once per instantiation, on the control
//! thread.

use std::collections::BTreeSet;

/// Answers whether a feature is unlocked.
pub trait FeatureGate: Send + Sync {
    fn is_feature_unlocked(&self, feature: &str) -> bool;
}

/// A gate over a fixed set of unlocked feature ids.
#[derive(Clone, Debug, Default)]
pub struct StaticFeatureGate {
    unlocked: BTreeSet<String>,
    all: bool,
}

impl StaticFeatureGate {
    /// Unlocks exactly the given features.
    pub fn new<I, S>(unlocked: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            unlocked: unlocked.into_iter().map(Into::into).collect(),
            all: false,
        }
    }

    /// Unlocks everything.
    pub fn all_unlocked() -> Self {
        Self {
            unlocked: BTreeSet::new(),
            all: true,
        }
    }

    pub fn unlock(&mut self, feature: impl Into<String>) {
        self.unlocked.insert(feature.into());
    }
}

impl FeatureGate for StaticFeatureGate {
    fn is_feature_unlocked(&self, feature: &str) -> bool {
        self.all || self.unlocked.contains(feature)
    }
}
