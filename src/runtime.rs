use crate::agent::{Agent, AgentError, FromCapabilities, Verdict};
use crate::capability::Capabilities;
use crate::datum::{Args, Datum, Slots};
use crate::llm::SharedModel;
use crate::registry::{CallError, Handler, Operation, Operations, Role};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

// ---------------------------------------------------------------------------
// Phase / WorkflowError / WorkflowStatus
// ---------------------------------------------------------------------------

/// The fixed stages of one workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Inject,
    Trigger,
    Decide,
    Act,
    Outcome,
    ErrorHandling,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Inject => "inject",
            Self::Trigger => "trigger",
            Self::Decide => "decide",
            Self::Act => "act",
            Self::Outcome => "outcome",
            Self::ErrorHandling => "error handling",
        };
        f.write_str(name)
    }
}

/// A failure captured during a run, with where it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowError {
    /// The operation returned an error.
    Operation {
        phase: Phase,
        operation: &'static str,
        source: AgentError,
    },
    /// The operation could not be called with the value at hand.
    ArgumentMismatch {
        phase: Phase,
        operation: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    /// The operation panicked; `message` is the panic payload when it was a string.
    Panicked {
        phase: Phase,
        operation: &'static str,
        message: String,
    },
}

impl WorkflowError {
    pub(crate) fn from_call(call: CallError, phase: Phase, operation: &'static str) -> Self {
        match call {
            CallError::Agent(source) => Self::Operation {
                phase,
                operation,
                source,
            },
            CallError::Mismatch { expected, found } => Self::ArgumentMismatch {
                phase,
                operation,
                expected,
                found,
            },
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            Self::Operation { phase, .. }
            | Self::ArgumentMismatch { phase, .. }
            | Self::Panicked { phase, .. } => *phase,
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Self::Operation { operation, .. }
            | Self::ArgumentMismatch { operation, .. }
            | Self::Panicked { operation, .. } => *operation,
        }
    }

    /// The agent's own error, if the operation returned one.
    pub fn agent_error(&self) -> Option<&AgentError> {
        match self {
            Self::Operation { source, .. } => Some(source),
            Self::ArgumentMismatch { .. } | Self::Panicked { .. } => None,
        }
    }
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operation {
                phase,
                operation,
                source,
            } => write!(f, "{phase} operation '{operation}' failed: {source}"),
            Self::ArgumentMismatch {
                phase,
                operation,
                expected,
                found,
            } => write!(
                f,
                "{phase} operation '{operation}' expected {expected}, got {found}"
            ),
            Self::Panicked {
                phase,
                operation,
                message,
            } => write!(f, "{phase} operation '{operation}' panicked: {message}"),
        }
    }
}

impl std::error::Error for WorkflowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.agent_error().map(|e| e as _)
    }
}

/// How a call to [`Runtime::execute_workflow`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowStatus {
    /// Every phase ran.
    Completed,
    /// The decision rejected the payload; no actions or outcome ran.
    Rejected { reason: String },
    /// A phase failed and the agent's exception handler dealt with it.
    Recovered { error: WorkflowError },
    /// A phase failed and there was no handler, or the handler failed too.
    /// Already reported on the diagnostic channel.
    Unhandled {
        error: WorkflowError,
        handler_error: Option<WorkflowError>,
    },
}

impl WorkflowStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// The failure that interrupted the run, handled or not.
    pub fn error(&self) -> Option<&WorkflowError> {
        match self {
            Self::Recovered { error } | Self::Unhandled { error, .. } => Some(error),
            Self::Completed | Self::Rejected { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Hook events
// ---------------------------------------------------------------------------

/// Passed to the `on_phase` hook after each phase completes.
pub struct PhaseEvent<'a> {
    pub agent: &'a str,
    pub phase: Phase,
    pub duration: Duration,
}

/// Passed to the `on_error` hook when a phase fails, before error handling.
pub struct ErrorEvent<'a> {
    pub agent: &'a str,
    pub error: &'a WorkflowError,
}

/// A failure the agent's exception handler did not contain.
pub struct Diagnostic<'a> {
    pub agent: &'a str,
    pub error: &'a WorkflowError,
    /// Set when the handler ran and failed; `None` means there was no handler.
    pub handler_error: Option<&'a WorkflowError>,
}

impl fmt::Display for Diagnostic<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: unhandled workflow failure: {}", self.agent, self.error)?;
        match self.handler_error {
            Some(handler_error) => write!(f, " (exception handler failed: {handler_error})"),
            None => write!(f, " (no exception handler)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

type PhaseHook = Box<dyn Fn(&PhaseEvent) + Send + Sync>;
type ErrorHook = Box<dyn Fn(&ErrorEvent) + Send + Sync>;
type DiagnosticSink = Box<dyn Fn(&Diagnostic) + Send + Sync>;

/// Runs agent workflows: inject, trigger, decide, act, outcome, with one
/// error-handling phase catching failures from all of them.
///
/// A `Runtime` holds only read-only capabilities and hooks, so it can be
/// shared between threads. Each run borrows its agent mutably.
pub struct Runtime {
    capabilities: Capabilities,
    on_phase: Option<PhaseHook>,
    on_error: Option<ErrorHook>,
    on_diagnostic: Option<DiagnosticSink>,
}

impl Runtime {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            on_phase: None,
            on_error: None,
            on_diagnostic: None,
        }
    }

    /// A runtime whose only capability is `model`.
    pub fn with_language_model(model: SharedModel) -> Self {
        Self::new(Capabilities::new().with_language_model(model))
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Register a callback that fires after each phase completes.
    pub fn on_phase(mut self, cb: impl Fn(&PhaseEvent) + Send + Sync + 'static) -> Self {
        self.on_phase = Some(Box::new(cb));
        self
    }

    /// Register a callback that fires when a phase fails.
    pub fn on_error(mut self, cb: impl Fn(&ErrorEvent) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(cb));
        self
    }

    /// Send diagnostics to `cb` instead of stderr.
    ///
    /// An `error` event is logged through `tracing` either way. Until a global
    /// `tracing` subscriber is installed that event goes nowhere, so stderr
    /// keeps receiving diagnostics alongside `cb`.
    pub fn on_diagnostic(mut self, cb: impl Fn(&Diagnostic) + Send + Sync + 'static) -> Self {
        self.on_diagnostic = Some(Box::new(cb));
        self
    }

    /// Set the phase and error hooks to print transitions to stderr.
    pub fn with_tracing(self) -> Self {
        self.on_phase(|e| {
            eprintln!(
                "[phase] {} -> {} ({:.3}s)",
                e.agent,
                e.phase,
                e.duration.as_secs_f64()
            );
        })
        .on_error(|e| {
            eprintln!("[error] {} in {}: {}", e.agent, e.error.phase(), e.error);
        })
    }

    /// Build an agent with this runtime's capabilities passed at construction.
    pub fn create_agent<A: FromCapabilities>(&self) -> A {
        A::from_capabilities(&self.capabilities)
    }

    /// Run one workflow for `agent` with `payload`.
    ///
    /// Never fails: failures raised by the agent go to its exception handler,
    /// or to the diagnostic channel when it has none. The returned status
    /// says which path the run took.
    pub fn execute_workflow<A, T>(&self, agent: &mut A, payload: T) -> WorkflowStatus
    where
        A: Agent,
        T: Any + Send + Sync,
    {
        let name = agent.name();
        let ops = Operations::<A>::discover();
        let trigger = Datum::new(payload);
        info!(agent = name, payload = trigger.type_name(), "starting workflow");

        match self.run_phases(agent, &ops, &trigger) {
            Ok(status) => {
                match &status {
                    WorkflowStatus::Rejected { reason } => {
                        info!(agent = name, %reason, "workflow stopped by decision");
                    }
                    _ => info!(agent = name, "workflow completed"),
                }
                status
            }
            Err(error) => self.recover(agent, &ops, error, &trigger),
        }
    }

    fn run_phases<A: Agent>(
        &self,
        agent: &mut A,
        ops: &Operations<A>,
        trigger: &Datum,
    ) -> Result<WorkflowStatus, WorkflowError> {
        let name = agent.name();

        self.timed(name, Phase::Inject, || self.inject(agent, ops))?;

        self.timed(name, Phase::Trigger, || invoke_trigger(agent, ops, trigger))?;

        let decision = match self.timed(name, Phase::Decide, || invoke_decision(agent, ops, trigger))? {
            Verdict::Proceed(decision) => decision,
            Verdict::Reject { reason } => return Ok(WorkflowStatus::Rejected { reason }),
        };

        let last = self.timed(name, Phase::Act, || {
            invoke_actions(agent, ops, trigger, decision)
        })?;

        self.timed(name, Phase::Outcome, || invoke_outcome(agent, ops, &last))?;

        Ok(WorkflowStatus::Completed)
    }

    fn timed<R>(
        &self,
        agent: &str,
        phase: Phase,
        f: impl FnOnce() -> Result<R, WorkflowError>,
    ) -> Result<R, WorkflowError> {
        debug!(agent, %phase, "entering phase");
        let start = Instant::now();
        let result = f()?;
        if let Some(cb) = &self.on_phase {
            cb(&PhaseEvent {
                agent,
                phase,
                duration: start.elapsed(),
            });
        }
        Ok(result)
    }

    fn inject<A: Agent>(&self, agent: &mut A, ops: &Operations<A>) -> Result<(), WorkflowError> {
        for kind in self.capabilities.kinds() {
            for target in ops.find_injection_targets(kind) {
                let injected = guarded(Phase::Inject, target.field(), || {
                    Ok(target.inject(agent, &self.capabilities))
                })?;
                if injected {
                    debug!(field = target.field(), %kind, "injected capability");
                }
            }
        }
        Ok(())
    }

    fn recover<A: Agent>(
        &self,
        agent: &mut A,
        ops: &Operations<A>,
        error: WorkflowError,
        trigger: &Datum,
    ) -> WorkflowStatus {
        let name = agent.name();
        if let Some(cb) = &self.on_error {
            cb(&ErrorEvent {
                agent: name,
                error: &error,
            });
        }

        let Some(Operation {
            name: handler_name,
            handler: Handler::ExceptionHandler(call),
        }) = ops.find_operation(Role::ExceptionHandler)
        else {
            self.diagnose(name, &error, None);
            return WorkflowStatus::Unhandled {
                error,
                handler_error: None,
            };
        };

        let handled = self.timed(name, Phase::ErrorHandling, || {
            guarded(Phase::ErrorHandling, *handler_name, || call(agent, &error, trigger))
        });

        match handled {
            Ok(()) => {
                info!(agent = name, handler = *handler_name, %error, "workflow failure handled");
                WorkflowStatus::Recovered { error }
            }
            Err(handler_error) => {
                self.diagnose(name, &error, Some(&handler_error));
                WorkflowStatus::Unhandled {
                    error,
                    handler_error: Some(handler_error),
                }
            }
        }
    }

    fn diagnose(&self, agent: &str, failure: &WorkflowError, handler_error: Option<&WorkflowError>) {
        let diagnostic = Diagnostic {
            agent,
            error: failure,
            handler_error,
        };
        error!(
            agent,
            error = %failure,
            handler_error = ?handler_error.map(ToString::to_string),
            "workflow failure not contained by an exception handler"
        );
        if let Some(cb) = &self.on_diagnostic {
            cb(&diagnostic);
        }
        if self.echoes_diagnostics() {
            eprintln!("[diagnostic] {diagnostic}");
        }
    }

    fn echoes_diagnostics(&self) -> bool {
        self.on_diagnostic.is_none() || !tracing::dispatcher::has_been_set()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(Capabilities::default())
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("capabilities", &self.capabilities)
            .field("on_phase", &self.on_phase.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_diagnostic", &self.on_diagnostic.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Phase bodies
// ---------------------------------------------------------------------------

fn invoke_trigger<A: Agent>(
    agent: &mut A,
    ops: &Operations<A>,
    payload: &Datum,
) -> Result<(), WorkflowError> {
    let Some(Operation {
        name,
        handler: Handler::Trigger(call),
    }) = ops.find_operation(Role::Trigger)
    else {
        return Ok(());
    };
    guarded(Phase::Trigger, *name, || call(agent, payload))
}

fn invoke_decision<A: Agent>(
    agent: &mut A,
    ops: &Operations<A>,
    payload: &Datum,
) -> Result<Verdict<Datum>, WorkflowError> {
    let Some(Operation {
        name,
        handler: Handler::Decision(call),
    }) = ops.find_operation(Role::Decision)
    else {
        // No decision operation: approved, no reason given.
        return Ok(Verdict::Proceed(Datum::new(true)));
    };
    guarded(Phase::Decide, *name, || call(agent, payload))
}

fn invoke_actions<A: Agent>(
    agent: &mut A,
    ops: &Operations<A>,
    trigger: &Datum,
    decision: Datum,
) -> Result<Datum, WorkflowError> {
    let mut slots = Slots::new(trigger.clone(), decision);
    for op in ops.find_operations(Role::Action) {
        let Operation {
            name,
            handler: Handler::Action { bindings, call },
        } = op
        else {
            continue;
        };
        let args = Args::resolve(bindings, &slots);
        debug!(action = *name, args = args.len(), "invoking action");
        let produced = guarded(Phase::Act, *name, || call(agent, &args))?;
        if let Some(result) = produced {
            slots.last = result;
        }
    }
    Ok(slots.last)
}

fn invoke_outcome<A: Agent>(
    agent: &mut A,
    ops: &Operations<A>,
    result: &Datum,
) -> Result<(), WorkflowError> {
    let Some(Operation {
        name,
        handler: Handler::Outcome(call),
    }) = ops.find_operation(Role::Outcome)
    else {
        return Ok(());
    };
    guarded(Phase::Outcome, *name, || call(agent, result))
}

/// Call one agent operation, turning both its error and a panic into a
/// [`WorkflowError`] for `phase`.
fn guarded<R>(
    phase: Phase,
    operation: &'static str,
    call: impl FnOnce() -> Result<R, CallError>,
) -> Result<R, WorkflowError> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result.map_err(|e| WorkflowError::from_call(e, phase, operation)),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(%phase, operation, %message, "agent operation panicked");
            Err(WorkflowError::Panicked {
                phase,
                operation,
                message,
            })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
