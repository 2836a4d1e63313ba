//! A minimal runtime for role-based agent workflows.
//!
//! An agent registers operations under five roles: trigger, decision,
//! action, outcome and exception handler. [`Runtime::execute_workflow`] runs
//! them in that order, threading values between phases, stopping early when
//! the decision returns [`Verdict::Reject`], and routing any failure to the
//! agent's exception handler.
//!
//! # Quick start
//!
//! ```rust
//! use agent_runtime::{
//!     Agent, Args, Binding, Datum, Registry, Runtime, Verdict, WorkflowStatus,
//! };
//!
//! #[derive(Default)]
//! struct Doubler { result: Option<u32> }
//!
//! impl Agent for Doubler {
//!     fn name(&self) -> &'static str { "doubler" }
//!     fn register(r: &mut Registry<Self>) {
//!         r.decision("positive", |_: &mut Self, n: &u32| {
//!             Ok(if *n > 0 { Verdict::proceed(()) } else { Verdict::reject("zero") })
//!         })
//!         .action("double", [Binding::of::<u32>()], |_: &mut Self, args: &Args| {
//!             let n = args.require::<u32>(0)?;
//!             Ok(Some(Datum::new(n * 2)))
//!         })
//!         .outcome("store", |a: &mut Self, n: Option<&u32>| {
//!             a.result = n.copied();
//!             Ok(())
//!         });
//!     }
//! }
//!
//! let runtime = Runtime::default();
//! let mut agent = Doubler::default();
//! assert_eq!(runtime.execute_workflow(&mut agent, 21u32), WorkflowStatus::Completed);
//! assert_eq!(agent.result, Some(42));
//! assert!(runtime.execute_workflow(&mut agent, 0u32).is_rejected());
//! ```

mod agent;
mod capability;
mod datum;
pub mod llm;
pub mod logging;
mod registry;
mod runtime;

pub use agent::{Agent, AgentError, FromCapabilities, Verdict};
pub use capability::{Capabilities, CapabilityKind};
pub use datum::{Args, Binding, Datum, Slot};
pub use llm::{LanguageModel, SharedModel};
pub use registry::{InjectionTarget, Operation, Operations, Registry, Role};
pub use runtime::{
    Diagnostic, ErrorEvent, Phase, PhaseEvent, Runtime, WorkflowError, WorkflowStatus,
};
