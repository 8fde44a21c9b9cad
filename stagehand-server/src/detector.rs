//! Polling-based resource change detection.
//!
//! The host exposes no native change events, so the server loop polls. The
//! detector owns the only copy of the fingerprint snapshot; `tick` both
//! reports and updates it, behind an interface small enough that an
//! event-driven implementation could replace it without touching
//! subscription or notification logic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use stagehand_wire::{ResourceCategory, ResourceUri};

use crate::host::ResourceProvider;

/// Snapshot-comparing change detector.
///
/// Best-effort by construction: a mutate-and-revert inside one interval is
/// invisible, and a fingerprint collision suppresses a report. It never
/// reports a resource whose observed state is unchanged, and the first pass
/// only establishes the baseline.
pub struct ChangeDetector {
    provider: Arc<dyn ResourceProvider>,
    min_interval: Duration,
    last_tick: Option<Instant>,
    snapshot: HashMap<ResourceCategory, HashMap<String, String>>,
}

impl ChangeDetector {
    pub fn new(provider: Arc<dyn ResourceProvider>, min_interval: Duration) -> Self {
        Self {
            provider,
            min_interval,
            last_tick: None,
            snapshot: HashMap::new(),
        }
    }

    /// Poll every category and return the URIs whose fingerprint is new or
    /// differing, in category-then-provider order. Runs at most once per
    /// minimum interval; early calls return no changes.
    ///
    /// The very first pass primes the snapshot and reports nothing: state
    /// that existed before anyone was watching is not a change. Ids that
    /// vanish are dropped from the snapshot without a report, so a resource
    /// that reappears counts as newly observed again.
    pub fn tick(&mut self) -> Vec<ResourceUri> {
        let now = Instant::now();
        if let Some(last) = self.last_tick
            && now.duration_since(last) < self.min_interval
        {
            return Vec::new();
        }
        let baseline = self.last_tick.is_none();
        self.last_tick = Some(now);

        let mut changed = Vec::new();
        for category in ResourceCategory::ALL {
            let observed = self.provider.observe(category);
            let prev = self.snapshot.entry(category).or_default();
            let mut next = HashMap::with_capacity(observed.len());
            for resource in observed {
                let print = fingerprint(&resource.state);
                if !baseline && prev.get(&resource.id) != Some(&print) {
                    changed.push(ResourceUri::new(category, resource.id.clone()));
                }
                next.insert(resource.id, print);
            }
            *prev = next;
        }

        if !changed.is_empty() {
            debug!(count = changed.len(), "detector tick found changed resources");
        }
        changed
    }
}

/// Opaque summary of a resource's mutable state; compared for inequality
/// only. Canonical because `serde_json` maps keep sorted keys.
fn fingerprint(state: &Value) -> String {
    serde_json::to_string(state).unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::host::{HostError, ObservedResource};
    use parking_lot::Mutex;
    use serde_json::json;

    /// Scriptable provider: tests mutate the backing state between ticks.
    #[derive(Default)]
    struct ScriptedProvider {
        states: Mutex<Vec<(ResourceCategory, String, Value)>>,
        observe_calls: Mutex<usize>,
    }

    impl ScriptedProvider {
        fn set(&self, category: ResourceCategory, id: &str, state: Value) {
            let mut states = self.states.lock();
            if let Some(entry) = states
                .iter_mut()
                .find(|(c, i, _)| *c == category && i == id)
            {
                entry.2 = state;
            } else {
                states.push((category, id.to_string(), state));
            }
        }

        fn remove(&self, category: ResourceCategory, id: &str) {
            self.states
                .lock()
                .retain(|(c, i, _)| !(*c == category && i == id));
        }

        fn observe_count(&self) -> usize {
            *self.observe_calls.lock()
        }
    }

    impl ResourceProvider for ScriptedProvider {
        fn list(&self, category: ResourceCategory) -> Vec<String> {
            self.states
                .lock()
                .iter()
                .filter(|(c, _, _)| *c == category)
                .map(|(_, id, _)| id.clone())
                .collect()
        }

        fn read(&self, uri: &ResourceUri) -> Result<Value, HostError> {
            self.states
                .lock()
                .iter()
                .find(|(c, i, _)| *c == uri.category && *i == uri.id)
                .map(|(_, _, state)| state.clone())
                .ok_or_else(|| HostError::UnknownResource(uri.to_string()))
        }

        fn observe(&self, category: ResourceCategory) -> Vec<ObservedResource> {
            *self.observe_calls.lock() += 1;
            self.states
                .lock()
                .iter()
                .filter(|(c, _, _)| *c == category)
                .map(|(_, id, state)| ObservedResource::new(id.clone(), state.clone()))
                .collect()
        }
    }

    fn seeded_provider() -> Arc<ScriptedProvider> {
        let provider = Arc::new(ScriptedProvider::default());
        provider.set(
            ResourceCategory::Object,
            "Cube",
            json!({"location": [0.0, 0.0, 0.0]}),
        );
        provider.set(
            ResourceCategory::Object,
            "Sphere",
            json!({"location": [1.0, 0.0, 0.0]}),
        );
        provider.set(ResourceCategory::Scene, "Main", json!({"frame": 1}));
        provider
    }

    fn detector(provider: &Arc<ScriptedProvider>) -> ChangeDetector {
        let provider: Arc<dyn ResourceProvider> = Arc::clone(provider) as _;
        ChangeDetector::new(provider, Duration::ZERO)
    }

    fn uris(changed: &[ResourceUri]) -> Vec<String> {
        changed.iter().map(ResourceUri::to_string).collect()
    }

    #[test]
    fn test_first_tick_primes_without_reporting() {
        let provider = seeded_provider();
        let mut detector = detector(&provider);

        assert!(
            detector.tick().is_empty(),
            "pre-existing state is not a change"
        );
        assert!(provider.observe_count() > 0, "baseline pass must poll");
    }

    #[test]
    fn test_changes_reported_in_category_then_provider_order() {
        let provider = seeded_provider();
        let mut detector = detector(&provider);
        detector.tick();

        provider.set(ResourceCategory::Scene, "Main", json!({"frame": 7}));
        provider.set(
            ResourceCategory::Object,
            "Sphere",
            json!({"location": [0.5, 0.0, 0.0]}),
        );
        provider.set(
            ResourceCategory::Object,
            "Cube",
            json!({"location": [0.5, 0.0, 0.0]}),
        );
        assert_eq!(
            uris(&detector.tick()),
            vec![
                "stage://object/Cube",
                "stage://object/Sphere",
                "stage://scene/Main",
            ]
        );
    }

    #[test]
    fn test_quiet_tick_reports_nothing() {
        let provider = seeded_provider();
        let mut detector = detector(&provider);
        detector.tick();
        assert!(detector.tick().is_empty());
    }

    #[test]
    fn test_attribute_mutation_reported_exactly_once() {
        let provider = seeded_provider();
        let mut detector = detector(&provider);
        detector.tick();

        provider.set(
            ResourceCategory::Object,
            "Cube",
            json!({"location": [2.0, 0.0, 0.0]}),
        );
        assert_eq!(uris(&detector.tick()), vec!["stage://object/Cube"]);
        assert!(detector.tick().is_empty(), "change reported twice");
    }

    #[test]
    fn test_untouched_sibling_never_appears() {
        let provider = seeded_provider();
        let mut detector = detector(&provider);
        detector.tick();

        provider.set(ResourceCategory::Scene, "Main", json!({"frame": 2}));
        let changed = uris(&detector.tick());
        assert_eq!(changed, vec!["stage://scene/Main"]);
    }

    #[test]
    fn test_new_id_reported_on_first_observation() {
        let provider = seeded_provider();
        let mut detector = detector(&provider);
        detector.tick();

        provider.set(
            ResourceCategory::Light,
            "Key",
            json!({"energy": 1000.0}),
        );
        assert_eq!(uris(&detector.tick()), vec!["stage://light/Key"]);
    }

    #[test]
    fn test_removed_id_is_silent_but_reappearance_reports() {
        let provider = seeded_provider();
        let mut detector = detector(&provider);
        detector.tick();

        provider.remove(ResourceCategory::Object, "Sphere");
        assert!(detector.tick().is_empty(), "removal is not a change report");

        provider.set(
            ResourceCategory::Object,
            "Sphere",
            json!({"location": [1.0, 0.0, 0.0]}),
        );
        assert_eq!(uris(&detector.tick()), vec!["stage://object/Sphere"]);
    }

    #[test]
    fn test_min_interval_gates_ticks() {
        let provider = seeded_provider();
        let arc: Arc<dyn ResourceProvider> = Arc::clone(&provider) as _;
        let mut detector = ChangeDetector::new(arc, Duration::from_secs(60));

        detector.tick();
        let polled = provider.observe_count();
        assert!(polled > 0, "baseline pass must poll");

        provider.set(ResourceCategory::Scene, "Main", json!({"frame": 99}));
        assert!(detector.tick().is_empty());
        assert_eq!(
            provider.observe_count(),
            polled,
            "tick inside the minimum interval must not poll"
        );
    }

    #[test]
    fn test_identical_states_are_per_id() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.set(ResourceCategory::Object, "A", json!({"location": [0.0]}));
        provider.set(ResourceCategory::Object, "B", json!({"location": [0.0]}));
        let mut detector = detector(&provider);
        detector.tick();

        // Equal fingerprints on different ids still diff per id.
        provider.set(ResourceCategory::Object, "A", json!({"location": [5.0]}));
        provider.set(ResourceCategory::Object, "B", json!({"location": [5.0]}));
        assert_eq!(detector.tick().len(), 2);
    }
}
