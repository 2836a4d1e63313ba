// Exports workflow phases as OpenTelemetry spans on stdout.
//
// Each run is a "workflow" span; the runtime's on_phase hook records a child
// span per completed phase, and on_error attaches failures as span events.
// The second run fails in its action phase and has no exception handler, so
// the failure also shows up on the diagnostic channel (stderr).
//
// Run: cargo run --example traced_workflow

use agent_runtime::llm::MockLanguageModel;
use agent_runtime::{
    Agent, AgentError, Args, Binding, Datum, Registry, Runtime, SharedModel, Slot,
};
use opentelemetry::KeyValue;
use opentelemetry::trace::{Span, Tracer, TracerProvider as _, get_active_span};
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Topic(String);

#[derive(Debug, Clone)]
struct Draft(String);

#[derive(Default)]
struct Writer {
    model: Option<SharedModel>,
    published: Vec<String>,
}

impl Agent for Writer {
    fn name(&self) -> &'static str {
        "writer"
    }

    fn register(r: &mut Registry<Self>) {
        r.inject("model", |a: &mut Self| &mut a.model)
            .action("draft", [Binding::of::<Topic>()], |a: &mut Self, args: &Args| {
                let topic = args.require::<Topic>(0)?;
                if topic.0.is_empty() {
                    return Err(AgentError::invalid("empty topic"));
                }
                let model = a
                    .model
                    .as_ref()
                    .ok_or_else(|| AgentError::invalid("no language model injected"))?;
                let text = model.invoke(
                    &format!("Generate a short paragraph about {}", topic.0),
                    &serde_json::json!({ "topic": topic.0 }),
                )?;
                Ok(Some(Datum::new(Draft(text))))
            })
            .action(
                "edit",
                [Binding::slot(Slot::LastResult)],
                |_: &mut Self, args: &Args| {
                    let draft = args.require::<Draft>(0)?;
                    Ok(Some(Datum::new(Draft(draft.0.trim().to_string()))))
                },
            )
            .outcome("publish", |a: &mut Self, draft: Option<&Draft>| {
                if let Some(draft) = draft {
                    a.published.push(draft.0.clone());
                }
                Ok(())
            });
    }
}

fn main() {
    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
        .build();
    let tracer = provider.tracer("agent-runtime");

    let phase_tracer = tracer.clone();
    let runtime = Runtime::with_language_model(Arc::new(MockLanguageModel::new()))
        .on_phase(move |e| {
            let mut span = phase_tracer.start(format!("phase {}", e.phase));
            span.set_attribute(KeyValue::new("agent", e.agent.to_string()));
            span.set_attribute(KeyValue::new(
                "duration_ms",
                e.duration.as_secs_f64() * 1000.0,
            ));
            span.end();
        })
        .on_error(|e| {
            get_active_span(|span| {
                span.add_event(
                    "workflow failure",
                    vec![
                        KeyValue::new("phase", e.error.phase().to_string()),
                        KeyValue::new("error", e.error.to_string()),
                    ],
                );
            });
        });

    let mut agent = Writer::default();
    for topic in ["rust on microcontrollers", ""] {
        let status = tracer.in_span("workflow", |_cx| {
            runtime.execute_workflow(&mut agent, Topic(topic.to_string()))
        });
        println!("topic {topic:?}: {status:?}");
    }
    println!("published {} article(s)", agent.published.len());

    if let Err(e) = provider.shutdown() {
        eprintln!("failed to flush spans: {e}");
    }
}
