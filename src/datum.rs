//! Values passed between phases and the rules for routing them into
//! action arguments.

use crate::agent::AgentError;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// A type-erased, cheaply clonable value produced or consumed by a phase.
#[derive(Clone)]
pub struct Datum {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Datum {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn is<T: Any>(&self) -> bool {
        (*self.value).type_id() == TypeId::of::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Name of the concrete type held, for error messages.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Datum<{}>", self.type_name)
    }
}

/// The named places a value can be read from during the action phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// The payload the workflow was started with.
    Trigger,
    /// The payload of the decision verdict.
    Decision,
    /// The baton: the most recent value produced by an action, or the
    /// decision payload if no action has produced one yet.
    LastResult,
}

/// How one action argument is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Read a specific slot, whatever its type.
    Slot(Slot),
    /// Take the first of trigger, decision, last result whose type is `T`.
    Typed {
        type_id: TypeId,
        type_name: &'static str,
    },
}

impl Binding {
    pub fn of<T: Any>() -> Self {
        Binding::Typed {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn slot(slot: Slot) -> Self {
        Binding::Slot(slot)
    }
}

/// The routing candidates for one action call.
#[derive(Debug, Clone)]
pub(crate) struct Slots {
    pub trigger: Datum,
    pub decision: Datum,
    pub last: Datum,
}

impl Slots {
    pub(crate) fn new(trigger: Datum, decision: Datum) -> Self {
        let last = decision.clone();
        Self {
            trigger,
            decision,
            last,
        }
    }

    fn get(&self, slot: Slot) -> &Datum {
        match slot {
            Slot::Trigger => &self.trigger,
            Slot::Decision => &self.decision,
            Slot::LastResult => &self.last,
        }
    }

    fn resolve(&self, binding: &Binding) -> Option<Datum> {
        match binding {
            Binding::Slot(slot) => Some(self.get(*slot).clone()),
            Binding::Typed { type_id, .. } => [&self.trigger, &self.decision, &self.last]
                .into_iter()
                .find(|d| (*d.value).type_id() == *type_id)
                .cloned(),
        }
    }
}

/// Arguments handed to an action, one per declared binding.
///
/// A binding that matched nothing is `None`; reading it yields `None` rather
/// than failing, unless the action asks for it with [`Args::require`].
#[derive(Debug, Clone)]
pub struct Args {
    values: Vec<Option<Datum>>,
    bindings: Vec<Binding>,
}

impl Args {
    pub(crate) fn resolve(bindings: &[Binding], slots: &Slots) -> Self {
        Self {
            values: bindings.iter().map(|b| slots.resolve(b)).collect(),
            bindings: bindings.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The raw value at `index`, if the binding matched.
    pub fn datum(&self, index: usize) -> Option<&Datum> {
        self.values.get(index).and_then(Option::as_ref)
    }

    /// The value at `index` as a `T`, or `None` if absent or of another type.
    pub fn get<T: Any>(&self, index: usize) -> Option<&T> {
        self.datum(index).and_then(Datum::downcast_ref::<T>)
    }

    /// Like [`Args::get`], but an absent or mistyped argument is an error.
    pub fn require<T: Any>(&self, index: usize) -> Result<&T, AgentError> {
        self.get(index).ok_or_else(|| {
            let found = self.datum(index).map_or("nothing", Datum::type_name);
            let wanted = match self.bindings.get(index) {
                Some(Binding::Slot(slot)) => format!("{slot:?} slot"),
                Some(Binding::Typed { type_name, .. }) => (*type_name).to_string(),
                None => "no binding".to_string(),
            };
            AgentError::invalid(format!(
                "argument {index} ({wanted}): expected {}, found {found}",
                std::any::type_name::<T>()
            ))
        })
    }
}
