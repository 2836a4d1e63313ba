use crate::capability::Capabilities;
use crate::registry::Registry;
use std::fmt;

/// An object whose registered operations make up one workflow.
///
/// Implement this trait on your own structs and hand them to
/// [`crate::Runtime::execute_workflow`]. The runtime never inspects the
/// agent's fields; everything it can do is declared in [`Agent::register`].
pub trait Agent: Send + Sized + 'static {
    /// A human-readable name, used in logs, hook events and diagnostics.
    fn name(&self) -> &'static str;

    /// Declare this agent's role operations and injection targets.
    ///
    /// Called once per agent type; the resulting table is cached and reused
    /// for every workflow run on any instance of the type.
    fn register(registry: &mut Registry<Self>);
}

/// An agent that can be built directly from the runtime's shared
/// capabilities, instead of receiving them through injection slots.
pub trait FromCapabilities: Agent {
    fn from_capabilities(capabilities: &Capabilities) -> Self;
}

/// The answer of a Decision operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict<D> {
    /// Continue the workflow, threading the payload into later phases.
    Proceed(D),
    /// Stop here. Not an error: no actions or outcome run.
    Reject { reason: String },
}

impl<D> Verdict<D> {
    pub fn proceed(payload: D) -> Self {
        Verdict::Proceed(payload)
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Verdict::Reject {
            reason: reason.into(),
        }
    }

    pub fn is_proceed(&self) -> bool {
        matches!(self, Verdict::Proceed(_))
    }
}

/// What an agent operation returns when it fails.
///
/// The runtime never retries. It wraps the error into
/// [`WorkflowError::Operation`](crate::WorkflowError::Operation) with the
/// phase and operation name, and hands that to the agent's exception handler,
/// which can match on the variant to decide how to react.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentError {
    /// The payload or the agent's own state made the operation meaningless.
    Invalid(String),
    /// A capability call failed in a way that may pass on a later run,
    /// such as an unreachable model endpoint.
    Transient(String),
    /// The operation chose to fail.
    Failed(String),
    Other(String),
}

impl From<ureq::Error> for AgentError {
    fn from(e: ureq::Error) -> Self {
        AgentError::Transient(e.to_string())
    }
}

impl From<std::io::Error> for AgentError {
    fn from(e: std::io::Error) -> Self {
        AgentError::Other(e.to_string())
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::Invalid(e.to_string())
    }
}

impl AgentError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        AgentError::Invalid(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        AgentError::Failed(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        AgentError::Other(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        AgentError::Transient(msg.into())
    }

    /// The message without the variant prefix `Display` adds.
    pub fn message(&self) -> &str {
        match self {
            Self::Invalid(msg) | Self::Transient(msg) | Self::Failed(msg) | Self::Other(msg) => {
                msg
            }
        }
    }
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(msg) => write!(f, "invalid: {msg}"),
            Self::Other(msg) => write!(f, "{msg}"),
            Self::Transient(msg) => write!(f, "transient: {msg}"),
            Self::Failed(msg) => write!(f, "failed: {msg}"),
        }
    }
}

impl std::error::Error for AgentError {}

#[cfg(test)]
mod tests {
    use super::*;

    // --- AgentError constructors ---

    #[test]
    fn invalid_constructor() {
        let err = AgentError::invalid("bad input");
        assert!(matches!(err, AgentError::Invalid(msg) if msg == "bad input"));
    }

    #[test]
    fn failed_constructor() {
        let err = AgentError::failed("nope");
        assert!(matches!(err, AgentError::Failed(msg) if msg == "nope"));
    }

    #[test]
    fn transient_constructor() {
        let err = AgentError::transient("timeout");
        assert!(matches!(err, AgentError::Transient(msg) if msg == "timeout"));
    }

    // --- AgentError Display ---

    #[test]
    fn display_variants() {
        assert_eq!(AgentError::Invalid("x".into()).to_string(), "invalid: x");
        assert_eq!(AgentError::Other("x".into()).to_string(), "x");
        assert_eq!(AgentError::Transient("x".into()).to_string(), "transient: x");
        assert_eq!(AgentError::Failed("x".into()).to_string(), "failed: x");
    }

    #[test]
    fn message_drops_variant_prefix() {
        assert_eq!(AgentError::transient("endpoint down").message(), "endpoint down");
        assert_eq!(AgentError::failed("refused").message(), "refused");
    }

    // --- From conversions ---

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: AgentError = io_err.into();
        assert!(matches!(err, AgentError::Other(msg) if msg.contains("file missing")));
    }

    #[test]
    fn from_json_error_is_invalid() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: AgentError = json_err.into();
        assert!(matches!(err, AgentError::Invalid(_)));
    }

    // --- Verdict ---

    #[test]
    fn verdict_constructors() {
        assert_eq!(Verdict::proceed(3), Verdict::Proceed(3));
        let rejected: Verdict<i32> = Verdict::reject("low priority");
        assert!(!rejected.is_proceed());
        assert!(matches!(rejected, Verdict::Reject { reason } if reason == "low priority"));
    }
}
