use crate::llm::SharedModel;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identifies one kind of shared capability by its Rust type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CapabilityKind {
    id: TypeId,
    name: &'static str,
}

impl CapabilityKind {
    pub fn of<C: Any>() -> Self {
        Self {
            id: TypeId::of::<C>(),
            name: std::any::type_name::<C>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Process-lifetime values the runtime hands to agents (language model,
/// clients, config). One value per type; the runtime only reads them.
#[derive(Clone, Default)]
pub struct Capabilities {
    store: HashMap<CapabilityKind, Arc<dyn Any + Send + Sync>>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a capability, replacing any earlier value of the same type.
    pub fn with<C: Clone + Any + Send + Sync>(mut self, capability: C) -> Self {
        self.store
            .insert(CapabilityKind::of::<C>(), Arc::new(capability));
        self
    }

    pub fn with_language_model(self, model: SharedModel) -> Self {
        self.with(model)
    }

    /// The current instance of capability `C`, if one is held.
    pub fn get<C: Clone + Any>(&self) -> Option<C> {
        self.store
            .get(&CapabilityKind::of::<C>())
            .and_then(|c| c.downcast_ref::<C>())
            .cloned()
    }

    pub fn language_model(&self) -> Option<SharedModel> {
        self.get::<SharedModel>()
    }

    pub fn contains(&self, kind: &CapabilityKind) -> bool {
        self.store.contains_key(kind)
    }

    /// Every capability kind held, sorted by type name so iteration order is
    /// stable across runs.
    pub fn kinds(&self) -> Vec<CapabilityKind> {
        let mut kinds: Vec<_> = self.store.keys().copied().collect();
        kinds.sort_by_key(|k| k.name);
        kinds
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.kinds()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLanguageModel;

    #[test]
    fn get_returns_stored_value() {
        let caps = Capabilities::new().with(42u32).with(String::from("cfg"));
        assert_eq!(caps.get::<u32>(), Some(42));
        assert_eq!(caps.get::<String>().as_deref(), Some("cfg"));
        assert_eq!(caps.get::<i64>(), None);
    }

    #[test]
    fn with_replaces_same_kind() {
        let caps = Capabilities::new().with(1u8).with(2u8);
        assert_eq!(caps.get::<u8>(), Some(2));
        assert_eq!(caps.kinds().len(), 1);
    }

    #[test]
    fn language_model_is_shared_not_copied() {
        let model: SharedModel = Arc::new(MockLanguageModel::new());
        let caps = Capabilities::new().with_language_model(model.clone());
        let got = caps.language_model().unwrap();
        assert!(Arc::ptr_eq(&got, &model));
        assert!(caps.contains(&CapabilityKind::of::<SharedModel>()));
    }

    #[test]
    fn kinds_are_sorted_by_name() {
        let caps = Capabilities::new().with(String::new()).with(0u64).with(true);
        let names: Vec<_> = caps.kinds().iter().map(CapabilityKind::name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn empty_by_default() {
        assert!(Capabilities::default().is_empty());
    }
}
