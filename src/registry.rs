//! Capability discovery: the role-to-operation table for an agent type.

use crate::agent::{Agent, AgentError, Verdict};
use crate::capability::{Capabilities, CapabilityKind};
use crate::datum::{Args, Binding, Datum};
use crate::runtime::WorkflowError;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use tracing::{debug, warn};

/// The place an operation occupies in the phase sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Trigger,
    Decision,
    Action,
    Outcome,
    ExceptionHandler,
}

impl Role {
    /// Every role, in phase order.
    pub const ALL: [Role; 5] = [
        Role::Trigger,
        Role::Decision,
        Role::Action,
        Role::Outcome,
        Role::ExceptionHandler,
    ];

    /// Roles for which only the first registered operation is used.
    pub fn is_singular(self) -> bool {
        !matches!(self, Role::Action)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Trigger => "trigger",
            Self::Decision => "decision",
            Self::Action => "action",
            Self::Outcome => "outcome",
            Self::ExceptionHandler => "exception handler",
        };
        f.write_str(name)
    }
}

/// Why an erased operation could not produce a value.
#[derive(Debug)]
pub(crate) enum CallError {
    Mismatch {
        expected: &'static str,
        found: &'static str,
    },
    Agent(AgentError),
}

impl From<AgentError> for CallError {
    fn from(e: AgentError) -> Self {
        CallError::Agent(e)
    }
}

type TriggerFn<A> = Box<dyn Fn(&mut A, &Datum) -> Result<(), CallError> + Send + Sync>;
type DecisionFn<A> = Box<dyn Fn(&mut A, &Datum) -> Result<Verdict<Datum>, CallError> + Send + Sync>;
type ActionFn<A> = Box<dyn Fn(&mut A, &Args) -> Result<Option<Datum>, CallError> + Send + Sync>;
type OutcomeFn<A> = Box<dyn Fn(&mut A, &Datum) -> Result<(), CallError> + Send + Sync>;
type HandlerFn<A> =
    Box<dyn Fn(&mut A, &WorkflowError, &Datum) -> Result<(), CallError> + Send + Sync>;
type InjectFn<A> = Box<dyn Fn(&mut A, &Capabilities) -> bool + Send + Sync>;

pub(crate) enum Handler<A> {
    Trigger(TriggerFn<A>),
    Decision(DecisionFn<A>),
    Action {
        bindings: Vec<Binding>,
        call: ActionFn<A>,
    },
    Outcome(OutcomeFn<A>),
    ExceptionHandler(HandlerFn<A>),
}

/// One registered operation.
pub struct Operation<A> {
    pub(crate) name: &'static str,
    pub(crate) handler: Handler<A>,
}

impl<A> Operation<A> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn role(&self) -> Role {
        match self.handler {
            Handler::Trigger(_) => Role::Trigger,
            Handler::Decision(_) => Role::Decision,
            Handler::Action { .. } => Role::Action,
            Handler::Outcome(_) => Role::Outcome,
            Handler::ExceptionHandler(_) => Role::ExceptionHandler,
        }
    }

    /// Declared argument bindings; empty for every role but Action.
    pub fn bindings(&self) -> &[Binding] {
        match &self.handler {
            Handler::Action { bindings, .. } => bindings,
            _ => &[],
        }
    }
}

impl<A> fmt::Debug for Operation<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("role", &self.role())
            .finish()
    }
}

/// An agent-owned `Option<C>` field the runtime fills before each run.
pub struct InjectionTarget<A> {
    field: &'static str,
    kind: CapabilityKind,
    assign: InjectFn<A>,
}

impl<A> InjectionTarget<A> {
    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn kind(&self) -> CapabilityKind {
        self.kind
    }

    /// Copy the matching capability into the slot. Returns `false` when the
    /// capabilities hold nothing of this kind; the slot is left untouched.
    pub fn inject(&self, agent: &mut A, capabilities: &Capabilities) -> bool {
        (self.assign)(agent, capabilities)
    }
}

impl<A> fmt::Debug for InjectionTarget<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectionTarget")
            .field("field", &self.field)
            .field("kind", &self.kind)
            .finish()
    }
}

fn downcast<'a, T: Any>(datum: &'a Datum) -> Result<&'a T, CallError> {
    datum.downcast_ref::<T>().ok_or(CallError::Mismatch {
        expected: std::any::type_name::<T>(),
        found: datum.type_name(),
    })
}

/// Collects an agent's operations, in declaration order.
///
/// Handed to [`Agent::register`]; each method declares one operation under
/// exactly one role.
pub struct Registry<A> {
    operations: Vec<Operation<A>>,
    injections: Vec<InjectionTarget<A>>,
}

impl<A: Agent> Registry<A> {
    fn new() -> Self {
        Self {
            operations: Vec::new(),
            injections: Vec::new(),
        }
    }

    /// Entry point, called with the trigger payload. Its result is discarded.
    pub fn trigger<T, F>(&mut self, name: &'static str, f: F) -> &mut Self
    where
        T: Any,
        F: Fn(&mut A, &T) -> Result<(), AgentError> + Send + Sync + 'static,
    {
        let call = move |agent: &mut A, payload: &Datum| -> Result<(), CallError> {
            Ok(f(agent, downcast::<T>(payload)?)?)
        };
        self.push(name, Handler::Trigger(Box::new(call)))
    }

    /// Gate, called with the trigger payload. `Verdict::Reject` ends the run.
    pub fn decision<T, D, F>(&mut self, name: &'static str, f: F) -> &mut Self
    where
        T: Any,
        D: Any + Send + Sync,
        F: Fn(&mut A, &T) -> Result<Verdict<D>, AgentError> + Send + Sync + 'static,
    {
        let call = move |agent: &mut A, payload: &Datum| -> Result<Verdict<Datum>, CallError> {
            Ok(match f(agent, downcast::<T>(payload)?)? {
                Verdict::Proceed(d) => Verdict::Proceed(Datum::new(d)),
                Verdict::Reject { reason } => Verdict::Reject { reason },
            })
        };
        self.push(name, Handler::Decision(Box::new(call)))
    }

    /// A step of the action phase. Arguments are filled from `bindings`; a
    /// `Some` result becomes the new last result.
    pub fn action<F>(
        &mut self,
        name: &'static str,
        bindings: impl IntoIterator<Item = Binding>,
        f: F,
    ) -> &mut Self
    where
        F: Fn(&mut A, &Args) -> Result<Option<Datum>, AgentError> + Send + Sync + 'static,
    {
        let call = move |agent: &mut A, args: &Args| -> Result<Option<Datum>, CallError> {
            Ok(f(agent, args)?)
        };
        self.push(
            name,
            Handler::Action {
                bindings: bindings.into_iter().collect(),
                call: Box::new(call),
            },
        )
    }

    /// Final step, called with the last result. A last result of another
    /// type arrives as `None`.
    pub fn outcome<T, F>(&mut self, name: &'static str, f: F) -> &mut Self
    where
        T: Any,
        F: Fn(&mut A, Option<&T>) -> Result<(), AgentError> + Send + Sync + 'static,
    {
        let call = move |agent: &mut A, result: &Datum| -> Result<(), CallError> {
            Ok(f(agent, result.downcast_ref::<T>())?)
        };
        self.push(name, Handler::Outcome(Box::new(call)))
    }

    /// Recovery point for any failure in the other phases, called with the
    /// error and the trigger payload.
    pub fn exception_handler<T, F>(&mut self, name: &'static str, f: F) -> &mut Self
    where
        T: Any,
        F: Fn(&mut A, &WorkflowError, &T) -> Result<(), AgentError> + Send + Sync + 'static,
    {
        let call =
            move |agent: &mut A, error: &WorkflowError, payload: &Datum| -> Result<(), CallError> {
                Ok(f(agent, error, downcast::<T>(payload)?)?)
            };
        self.push(name, Handler::ExceptionHandler(Box::new(call)))
    }

    /// Declare an `Option<C>` field to be filled with capability `C` before
    /// every run.
    pub fn inject<C, F>(&mut self, field: &'static str, slot: F) -> &mut Self
    where
        C: Clone + Any + Send + Sync,
        F: Fn(&mut A) -> &mut Option<C> + Send + Sync + 'static,
    {
        let assign = move |agent: &mut A, caps: &Capabilities| -> bool {
            match caps.get::<C>() {
                Some(capability) => {
                    *slot(agent) = Some(capability);
                    true
                }
                None => false,
            }
        };
        self.injections.push(InjectionTarget {
            field,
            kind: CapabilityKind::of::<C>(),
            assign: Box::new(assign),
        });
        self
    }

    fn push(&mut self, name: &'static str, handler: Handler<A>) -> &mut Self {
        self.operations.push(Operation { name, handler });
        self
    }

    fn build(self) -> Operations<A> {
        let ops = Operations {
            operations: self.operations,
            injections: self.injections,
        };
        for role in Role::ALL.into_iter().filter(|r| r.is_singular()) {
            let names: Vec<_> = ops.find_operations(role).map(Operation::name).collect();
            if names.len() > 1 {
                warn!(
                    agent = std::any::type_name::<A>(),
                    %role,
                    using = names[0],
                    ignored = ?&names[1..],
                    "multiple operations registered for a single-operation role"
                );
            }
        }
        ops
    }
}

/// The discovered operations of one agent type.
pub struct Operations<A> {
    operations: Vec<Operation<A>>,
    injections: Vec<InjectionTarget<A>>,
}

static DISCOVERED: LazyLock<Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

impl<A: Agent> Operations<A> {
    /// The operation table for `A`, built from [`Agent::register`] on first
    /// use and shared afterwards.
    pub fn discover() -> Arc<Self> {
        let key = TypeId::of::<A>();
        let cached = DISCOVERED
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        if let Some(ops) = cached.and_then(|c| c.downcast::<Self>().ok()) {
            return ops;
        }

        // Built outside the lock: register() is agent code.
        let mut registry = Registry::new();
        A::register(&mut registry);
        let built = Arc::new(registry.build());
        debug!(
            agent = std::any::type_name::<A>(),
            operations = built.operations.len(),
            injections = built.injections.len(),
            "discovered agent operations"
        );

        let erased: Arc<dyn Any + Send + Sync> = built.clone();
        let mut cache = DISCOVERED.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = cache.entry(key).or_insert(erased).clone();
        entry.downcast::<Self>().unwrap_or(built)
    }

    /// The first operation registered under `role`, if any.
    pub fn find_operation(&self, role: Role) -> Option<&Operation<A>> {
        self.find_operations(role).next()
    }

    /// Every operation registered under `role`, in declaration order.
    pub fn find_operations(&self, role: Role) -> impl Iterator<Item = &Operation<A>> {
        self.operations.iter().filter(move |op| op.role() == role)
    }

    /// Injection slots declared for capability `kind`, in declaration order.
    pub fn find_injection_targets(
        &self,
        kind: CapabilityKind,
    ) -> impl Iterator<Item = &InjectionTarget<A>> {
        self.injections.iter().filter(move |t| t.kind == kind)
    }

    pub fn operations(&self) -> &[Operation<A>] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.injections.is_empty()
    }
}

impl<A> fmt::Debug for Operations<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operations")
            .field("operations", &self.operations)
            .field("injections", &self.injections)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::Slot;

    struct Request;

    #[derive(Default)]
    struct Full {
        config: Option<String>,
        other: Option<String>,
        count: Option<u32>,
    }

    impl Agent for Full {
        fn name(&self) -> &'static str {
            "full"
        }
        fn register(r: &mut Registry<Self>) {
            r.inject("config", |a: &mut Self| &mut a.config)
                .inject("count", |a: &mut Self| &mut a.count)
                .inject("other", |a: &mut Self| &mut a.other)
                .trigger("receive", |_, _: &Request| Ok(()))
                .decision("decide", |_, _: &Request| Ok(Verdict::proceed(1u8)))
                .action("first", [Binding::slot(Slot::Trigger)], |_, _| Ok(None))
                .outcome("report", |_, _: Option<&u8>| Ok(()))
                .action("second", [], |_, _| Ok(None))
                .exception_handler("recover", |_, _, _: &Request| Ok(()))
                .action("third", [Binding::of::<u8>()], |_, _| Ok(None));
        }
    }

    struct Empty;
    impl Agent for Empty {
        fn name(&self) -> &'static str {
            "empty"
        }
        fn register(_: &mut Registry<Self>) {}
    }

    struct TwoDecisions;
    impl Agent for TwoDecisions {
        fn name(&self) -> &'static str {
            "two_decisions"
        }
        fn register(r: &mut Registry<Self>) {
            r.decision("a", |_, _: &u8| Ok(Verdict::proceed(())))
                .decision("b", |_, _: &u8| Ok(Verdict::<()>::reject("never used")));
        }
    }

    #[test]
    fn finds_each_singular_role() {
        let ops = Operations::<Full>::discover();
        assert_eq!(ops.find_operation(Role::Trigger).unwrap().name(), "receive");
        assert_eq!(ops.find_operation(Role::Decision).unwrap().name(), "decide");
        assert_eq!(ops.find_operation(Role::Outcome).unwrap().name(), "report");
        assert_eq!(
            ops.find_operation(Role::ExceptionHandler).unwrap().name(),
            "recover"
        );
    }

    #[test]
    fn actions_in_declaration_order() {
        let ops = Operations::<Full>::discover();
        let names: Vec<_> = ops.find_operations(Role::Action).map(Operation::name).collect();
        assert_eq!(names, ["first", "second", "third"]);
        let first = ops.find_operation(Role::Action).unwrap();
        assert_eq!(first.bindings(), &[Binding::Slot(Slot::Trigger)]);
    }

    #[test]
    fn discovery_is_cached_per_type() {
        let a = Operations::<Full>::discover();
        let b = Operations::<Full>::discover();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn empty_agent_has_no_operations() {
        let ops = Operations::<Empty>::discover();
        assert!(ops.is_empty());
        assert!(ops.find_operation(Role::Trigger).is_none());
        assert_eq!(ops.find_operations(Role::Action).count(), 0);
    }

    #[test]
    fn first_registered_wins_for_singular_role() {
        let ops = Operations::<TwoDecisions>::discover();
        assert_eq!(ops.find_operation(Role::Decision).unwrap().name(), "a");
        assert_eq!(ops.find_operations(Role::Decision).count(), 2);
    }

    #[test]
    fn injection_targets_filtered_by_kind() {
        let ops = Operations::<Full>::discover();
        let fields: Vec<_> = ops
            .find_injection_targets(CapabilityKind::of::<String>())
            .map(InjectionTarget::field)
            .collect();
        assert_eq!(fields, ["config", "other"]);
        assert_eq!(
            ops.find_injection_targets(CapabilityKind::of::<bool>()).count(),
            0
        );
    }

    #[test]
    fn injection_target_assigns_only_when_capability_held() {
        let ops = Operations::<Full>::discover();
        let target = ops
            .find_injection_targets(CapabilityKind::of::<u32>())
            .next()
            .unwrap();
        let mut agent = Full::default();

        assert!(!target.inject(&mut agent, &Capabilities::new()));
        assert_eq!(agent.count, None);

        assert!(target.inject(&mut agent, &Capabilities::new().with(9u32)));
        assert_eq!(agent.count, Some(9));
    }

    #[test]
    fn role_display_and_singularity() {
        assert_eq!(Role::ExceptionHandler.to_string(), "exception handler");
        assert!(Role::Decision.is_singular());
        assert!(!Role::Action.is_singular());
    }
}
