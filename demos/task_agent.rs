// Task triage agent.
//
// Receives a task, asks the language model to analyze it, approves high and
// normal priority work, rejects low priority work, processes what was
// approved and reports the result.
//
// Uses the mock model by default. Set AGENT_RUNTIME_LLM_ENDPOINT (and
// optionally AGENT_RUNTIME_LLM_MODEL / AGENT_RUNTIME_LLM_API_KEY) to talk to
// an OpenAI-compatible server instead.
//
// Run: RUST_LOG=info cargo run --example task_agent

use agent_runtime::llm::{HttpLanguageModel, MockLanguageModel};
use agent_runtime::{
    Agent, AgentError, Args, Binding, Datum, Registry, Runtime, SharedModel, Verdict,
    WorkflowError, logging,
};
use serde::Serialize;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
struct TaskRequest {
    id: String,
    title: String,
    description: String,
    priority: String,
}

impl TaskRequest {
    fn new(id: &str, title: &str, description: &str, priority: &str) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            priority: priority.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct TaskAnalysis {
    reason: String,
}

#[derive(Debug, Clone)]
struct TaskResult {
    task_id: String,
    status: &'static str,
    message: String,
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TriageAgent {
    model: Option<SharedModel>,
}

impl TriageAgent {
    fn receive_task(&mut self, task: &TaskRequest) -> Result<(), AgentError> {
        println!("  Received task: {}", task.title);
        println!("  Description: {}", task.description);
        println!("  Priority: {}", task.priority);
        Ok(())
    }

    fn analyze_task(&mut self, task: &TaskRequest) -> Result<Verdict<TaskAnalysis>, AgentError> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| AgentError::invalid("no language model injected"))?;
        let prompt = format!(
            "Analyze this task and determine if it should be approved: {}",
            task.title
        );
        let reply = model.invoke(&prompt, &serde_json::to_value(task)?)?;
        println!("  Model says: {reply}");

        let verdict = match task.priority.to_lowercase().as_str() {
            "high" => {
                println!("  Decision: APPROVED (high priority)");
                Verdict::proceed(TaskAnalysis {
                    reason: "High priority task approved".into(),
                })
            }
            "low" => {
                println!("  Decision: REJECTED (low priority)");
                Verdict::reject("low priority task")
            }
            _ => {
                println!("  Decision: APPROVED (normal priority)");
                Verdict::proceed(TaskAnalysis {
                    reason: "Task approved for processing".into(),
                })
            }
        };
        Ok(verdict)
    }

    fn process_task(&mut self, args: &Args) -> Result<Option<Datum>, AgentError> {
        let task = args.require::<TaskRequest>(0)?;
        let analysis = args.require::<TaskAnalysis>(1)?;
        println!("  Processing task: {}", task.title);
        println!("  Analysis reason: {}", analysis.reason);

        Ok(Some(Datum::new(TaskResult {
            task_id: task.id.clone(),
            status: "COMPLETED",
            message: "Task processed successfully".into(),
        })))
    }

    fn report_result(&mut self, result: Option<&TaskResult>) -> Result<(), AgentError> {
        let result = result.ok_or_else(|| AgentError::invalid("no task result to report"))?;
        println!(
            "  Task {} finished with status: {}",
            result.task_id, result.status
        );
        println!("  Message: {}", result.message);
        Ok(())
    }

    fn handle_error(&mut self, error: &WorkflowError, task: &TaskRequest) -> Result<(), AgentError> {
        match error.agent_error() {
            Some(AgentError::Transient(msg)) => {
                eprintln!("  Task {} hit a transient failure, try again later: {msg}", task.id)
            }
            Some(e) => eprintln!("  Error processing task {}: {}", task.id, e.message()),
            None => eprintln!("  Error processing task {}: {error}", task.id),
        }
        Ok(())
    }
}

impl Agent for TriageAgent {
    fn name(&self) -> &'static str {
        "triage_agent"
    }

    fn register(r: &mut Registry<Self>) {
        r.inject("model", |a: &mut Self| &mut a.model)
            .trigger("receive_task", Self::receive_task)
            .decision("analyze_task", Self::analyze_task)
            .action(
                "process_task",
                [Binding::of::<TaskRequest>(), Binding::of::<TaskAnalysis>()],
                Self::process_task,
            )
            .outcome("report_result", Self::report_result)
            .exception_handler("handle_error", Self::handle_error);
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

fn language_model() -> SharedModel {
    if std::env::var_os("AGENT_RUNTIME_LLM_ENDPOINT").is_some() {
        match HttpLanguageModel::from_env() {
            Ok(model) => return Arc::new(model),
            Err(e) => eprintln!("falling back to mock model: {e}"),
        }
    }
    Arc::new(MockLanguageModel::new())
}

fn main() {
    logging::init("warn");

    let runtime = Runtime::with_language_model(language_model());
    let mut agent = TriageAgent::default();

    let tasks = [
        TaskRequest::new(
            "TASK-001",
            "Fix Critical Security Bug",
            "Urgent security vulnerability needs immediate attention",
            "high",
        ),
        TaskRequest::new(
            "TASK-002",
            "Update Documentation",
            "Documentation needs updating for new API",
            "normal",
        ),
        TaskRequest::new(
            "TASK-003",
            "Refactor Old Code",
            "Non-critical code cleanup",
            "low",
        ),
    ];

    for task in tasks {
        println!("\n>>> {} ({} priority)", task.id, task.priority);
        let status = runtime.execute_workflow(&mut agent, task);
        println!("<<< {status:?}");
    }
}
