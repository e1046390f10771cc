//! The toolchain run loop.

use std::sync::Arc;
use std::time::Duration;

use policy::Policy;
use storage::{EventKind, EventStore, SessionId};
use tools::{Tool, ToolContext, ToolSpec};

use crate::host::{DEFAULT_TOOL_TIMEOUT, ToolHost};
use crate::model::{Backend, Message, ModelRequest, ToolCall, ToolResult, Usage};
use crate::recorder::Recorder;
use crate::selector::SemanticToolSelector;
use crate::{Error, Result};

pub const DEFAULT_MAX_ITERATIONS: u32 = 8;

/// One tool call and what it returned.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub call: ToolCall,
    pub result: ToolResult,
}

/// Everything that happened while answering one prompt.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The model's final answer.
    pub text: String,
    /// Names of the tools offered to the model.
    pub selected_tools: Vec<String>,
    pub tool_calls: Vec<ToolInvocation>,
    /// Tokens summed over every model call.
    pub usage: Usage,
    /// Number of model calls made.
    pub iterations: u32,
}

/// Builder for a [`Toolchain`].
pub struct ToolchainBuilder<B> {
    backend: B,
    tools: Vec<Arc<dyn Tool>>,
    selector: Option<SemanticToolSelector>,
    policy: Policy,
    context: Option<ToolContext>,
    system: Option<String>,
    max_iterations: u32,
    tool_timeout: Duration,
    keep_history: bool,
    store: Option<EventStore>,
}

impl<B: Backend> ToolchainBuilder<B> {
    fn new(backend: B) -> Self {
        Self {
            backend,
            tools: Vec::new(),
            selector: None,
            policy: Policy::restrictive(),
            context: None,
            system: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            keep_history: false,
            store: None,
        }
    }

    /// A tool offered with every prompt.
    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Tools offered with every prompt.
    pub fn tools(mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    /// Offer the tools this selector picks for each prompt, on top of the static ones.
    pub fn selector(mut self, selector: SemanticToolSelector) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Working directory and HTTP endpoints for the tools. Defaults to the current directory.
    pub fn context(mut self, context: ToolContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Model calls allowed per prompt before giving up.
    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Carry the conversation over from one prompt to the next.
    pub fn keep_history(mut self, keep: bool) -> Self {
        self.keep_history = keep;
        self
    }

    /// Record every step of the session to `store`.
    pub fn recorder(mut self, store: EventStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<Toolchain<B>> {
        let context = match self.context {
            Some(ctx) => ctx,
            None => ToolContext::from_current_dir()
                .map_err(|e| Error::Config(format!("cannot read current directory: {e}")))?,
        };

        let mut host = ToolHost::new(context, self.policy).with_timeout(self.tool_timeout);
        let mut static_tools: Vec<String> = Vec::new();
        for tool in self.tools {
            let name = tool.name().to_string();
            if !static_tools.contains(&name) {
                static_tools.push(name);
            }
            host.register(tool);
        }
        if let Some(selector) = &self.selector {
            host.register_all(selector.tools().iter().cloned());
        }

        let recorder = self
            .store
            .map(|store| Recorder::start(store, self.backend.name(), self.backend.model()))
            .transpose()?;

        Ok(Toolchain {
            backend: self.backend,
            host,
            static_tools,
            selector: self.selector,
            system: self.system,
            max_iterations: self.max_iterations,
            keep_history: self.keep_history,
            history: Vec::new(),
            recorder,
        })
    }
}

/// Answers prompts with a model that can call tools.
///
/// Each prompt goes to the backend together with the offered tools. Tool
/// calls in the reply are executed through the [`ToolHost`] and their
/// results sent back, until the model answers without calling a tool.
pub struct Toolchain<B> {
    backend: B,
    host: ToolHost,
    static_tools: Vec<String>,
    selector: Option<SemanticToolSelector>,
    system: Option<String>,
    max_iterations: u32,
    keep_history: bool,
    history: Vec<Message>,
    recorder: Option<Recorder>,
}

impl<B: Backend> Toolchain<B> {
    pub fn builder(backend: B) -> ToolchainBuilder<B> {
        ToolchainBuilder::new(backend)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn host(&self) -> &ToolHost {
        &self.host
    }

    pub fn selector(&self) -> Option<&SemanticToolSelector> {
        self.selector.as_ref()
    }

    /// Messages of earlier prompts, kept only with `keep_history`.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.recorder.as_ref().map(Recorder::session_id)
    }

    /// Static tools first, then the selector's picks not already offered.
    pub async fn offered_tools(&self, prompt: &str) -> Result<Vec<ToolSpec>> {
        let mut names = self.static_tools.clone();
        if let Some(selector) = &self.selector {
            for tool in selector.select(prompt).await? {
                let name = tool.name().to_string();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }

        Ok(names
            .iter()
            .filter_map(|name| self.host.get(name))
            .map(|tool| tool.spec())
            .collect())
    }

    /// Answer `prompt`, returning the model's final text.
    pub async fn run(&mut self, prompt: &str) -> Result<String> {
        Ok(self.run_report(prompt).await?.text)
    }

    /// Answer `prompt`, returning the final text and everything that led to it.
    pub async fn run_report(&mut self, prompt: &str) -> Result<RunReport> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(Error::EmptyPrompt);
        }

        self.record(EventKind::Prompt {
            text: prompt.to_string(),
        });

        let result = self.run_inner(prompt).await;
        match &result {
            Ok(report) => {
                tracing::info!(
                    iterations = report.iterations,
                    tool_calls = report.tool_calls.len(),
                    input_tokens = report.usage.input_tokens,
                    output_tokens = report.usage.output_tokens,
                    "run finished"
                );
                self.record(EventKind::Response {
                    text: report.text.clone(),
                    input_tokens: report.usage.input_tokens,
                    output_tokens: report.usage.output_tokens,
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "run failed");
                self.record(EventKind::RunFailed {
                    message: e.to_string(),
                });
            }
        }
        result
    }

    async fn run_inner(&mut self, prompt: &str) -> Result<RunReport> {
        let offered = self.offered_tools(prompt).await?;
        let selected_tools: Vec<String> = offered.iter().map(|s| s.name.clone()).collect();
        self.record(EventKind::ToolsSelected {
            names: selected_tools.clone(),
        });

        let mut messages = if self.keep_history {
            self.history.clone()
        } else {
            Vec::new()
        };
        messages.push(Message::user(prompt));

        let mut usage = Usage::default();
        let mut invocations = Vec::new();

        for iteration in 1..=self.max_iterations {
            let response = self
                .backend
                .call(ModelRequest {
                    system: self.system.as_deref(),
                    messages: &messages,
                    tools: &offered,
                })
                .await?;
            usage += response.usage;

            let calls = response.message.tool_calls();
            tracing::debug!(iteration, tool_calls = calls.len(), "model replied");

            if calls.is_empty() {
                let text = response.message.text();
                messages.push(response.message);
                if self.keep_history {
                    self.history = messages;
                }
                return Ok(RunReport {
                    text,
                    selected_tools,
                    tool_calls: invocations,
                    usage,
                    iterations: iteration,
                });
            }

            messages.push(response.message);
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                self.record(EventKind::ToolCall {
                    name: call.name.clone(),
                    input: call.input.clone(),
                });
                let result = self.host.execute(&call).await;
                self.record(EventKind::ToolResult {
                    name: call.name.clone(),
                    output: result.to_value(),
                    is_error: result.is_error(),
                });
                results.push(result.clone());
                invocations.push(ToolInvocation { call, result });
            }
            messages.push(Message::tool_results(results));
        }

        Err(Error::MaxIterations(self.max_iterations))
    }

    fn record(&self, kind: EventKind) {
        if let Some(recorder) = &self.recorder {
            recorder.record(kind);
        }
    }

    /// Close the session, returning the event store if one was attached.
    pub fn end(self) -> Option<EventStore> {
        self.recorder.map(Recorder::end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FinishReason, ModelError, ModelResponse, Part, Role};
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tools::ToolError;

    #[derive(Debug)]
    struct SeenRequest {
        system: Option<String>,
        messages: Vec<Message>,
        tools: Vec<String>,
    }

    /// Replays canned responses and remembers each request.
    #[derive(Default)]
    struct ScriptedBackend {
        replies: Mutex<VecDeque<std::result::Result<ModelResponse, ModelError>>>,
        seen: Mutex<Vec<SeenRequest>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<std::result::Result<ModelResponse, ModelError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::default(),
            }
        }

        fn requests(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl Backend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "test-model"
        }

        async fn call(
            &self,
            request: ModelRequest<'_>,
        ) -> std::result::Result<ModelResponse, ModelError> {
            self.seen.lock().unwrap().push(SeenRequest {
                system: request.system.map(str::to_string),
                messages: request.messages.to_vec(),
                tools: request.tools.iter().map(|t| t.name.clone()).collect(),
            });
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ModelError::InvalidResponse("script exhausted".into())))
        }
    }

    fn text(reply: &str) -> std::result::Result<ModelResponse, ModelError> {
        Ok(ModelResponse {
            message: Message::assistant(reply),
            usage: Usage {
                input_tokens: 10,
                output_tokens: 5,
            },
            finish_reason: FinishReason::Stop,
        })
    }

    fn call(name: &str, input: Value) -> std::result::Result<ModelResponse, ModelError> {
        Ok(ModelResponse {
            message: Message {
                role: Role::Assistant,
                parts: vec![Part::ToolCall(ToolCall {
                    id: format!("{name}-0"),
                    name: name.to_string(),
                    input,
                })],
            },
            usage: Usage {
                input_tokens: 20,
                output_tokens: 3,
            },
            finish_reason: FinishReason::ToolCalls,
        })
    }

    fn builder(backend: ScriptedBackend) -> ToolchainBuilder<ScriptedBackend> {
        Toolchain::builder(backend).context(ToolContext::new(std::env::temp_dir()))
    }

    fn convert_units() -> Arc<dyn Tool> {
        tools::builtin::by_names(&["convert_units"]).unwrap().remove(0)
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected() {
        let mut chain = builder(ScriptedBackend::default()).build().unwrap();
        let err = chain.run("  \n").await.unwrap_err();
        assert!(matches!(err, Error::EmptyPrompt));
        assert_eq!(chain.backend().requests(), 0);
    }

    #[tokio::test]
    async fn plain_answer_needs_one_call() {
        let backend = ScriptedBackend::new(vec![text("Hello!")]);
        let mut chain = builder(backend).system("Be brief.").build().unwrap();

        let report = chain.run_report("hi").await.unwrap();
        assert_eq!(report.text, "Hello!");
        assert_eq!(report.iterations, 1);
        assert!(report.tool_calls.is_empty());

        let seen = chain.backend().seen.lock().unwrap();
        assert_eq!(seen[0].system.as_deref(), Some("Be brief."));
        assert_eq!(seen[0].messages, vec![Message::user("hi")]);
    }

    #[tokio::test]
    async fn executes_tool_calls_until_answer() {
        let backend = ScriptedBackend::new(vec![
            call(
                "convert_units",
                json!({"value": 10, "from_unit": "km", "to_unit": "mi"}),
            ),
            text("10 km is about 6.21 miles."),
        ]);
        let mut chain = builder(backend).tool(convert_units()).build().unwrap();

        let report = chain.run_report("Convert 10 km to miles").await.unwrap();
        assert_eq!(report.text, "10 km is about 6.21 miles.");
        assert_eq!(report.iterations, 2);
        assert_eq!(report.selected_tools, vec!["convert_units"]);
        assert_eq!(
            report.usage,
            Usage {
                input_tokens: 30,
                output_tokens: 8
            }
        );

        let invocation = &report.tool_calls[0];
        match &invocation.result {
            ToolResult::Success { output, .. } => assert_eq!(output["result"], 6.21371192237),
            other => panic!("unexpected result: {other:?}"),
        }

        let seen = chain.backend().seen.lock().unwrap();
        assert_eq!(seen[1].messages.len(), 3);
        assert_eq!(seen[1].messages[1].role, Role::Assistant);
        assert!(matches!(
            seen[1].messages[2].parts[0],
            Part::ToolResult(ToolResult::Success { .. })
        ));
    }

    #[tokio::test]
    async fn tool_failures_go_back_to_the_model() {
        let backend = ScriptedBackend::new(vec![
            call("launch_rocket", json!({})),
            text("I can't do that."),
        ]);
        let mut chain = builder(backend).build().unwrap();

        let report = chain.run_report("launch it").await.unwrap();
        assert_eq!(report.text, "I can't do that.");
        assert_eq!(
            report.tool_calls[0].result,
            ToolResult::Failure {
                tool_call_id: "launch_rocket-0".into(),
                name: "launch_rocket".into(),
                error: ToolError::NotFound("launch_rocket".into()),
            }
        );
    }

    #[tokio::test]
    async fn stops_after_max_iterations() {
        let input = json!({"value": 1, "from_unit": "m", "to_unit": "cm"});
        let backend = ScriptedBackend::new(vec![
            call("convert_units", input.clone()),
            call("convert_units", input.clone()),
            call("convert_units", input),
        ]);
        let mut chain = builder(backend)
            .tool(convert_units())
            .max_iterations(3)
            .build()
            .unwrap();

        let err = chain.run("loop forever").await.unwrap_err();
        assert!(matches!(err, Error::MaxIterations(3)));
        assert_eq!(chain.backend().requests(), 3);
    }

    #[tokio::test]
    async fn selector_adds_tools_after_static_ones() {
        let backend = ScriptedBackend::new(vec![text("Sunny.")]);
        let selector = SemanticToolSelector::new(tools::builtin::all()).top_k(2);
        let mut chain = builder(backend)
            .tool(convert_units())
            .selector(selector)
            .build()
            .unwrap();

        let report = chain
            .run_report("What's the weather in New York City?")
            .await
            .unwrap();
        assert_eq!(report.selected_tools[0], "convert_units");
        assert_eq!(report.selected_tools[1], "get_weather");
        assert!(report.selected_tools.len() <= 3);
        assert_eq!(chain.host().tools().len(), tools::builtin::all().len());
    }

    #[tokio::test]
    async fn history_is_kept_only_when_enabled() {
        let backend = ScriptedBackend::new(vec![text("one"), text("two")]);
        let mut chain = builder(backend).keep_history(true).build().unwrap();
        chain.run("first").await.unwrap();
        chain.run("second").await.unwrap();
        {
            let seen = chain.backend().seen.lock().unwrap();
            assert_eq!(seen[1].messages.len(), 3);
            assert_eq!(seen[1].messages[0], Message::user("first"));
        }
        assert_eq!(chain.history().len(), 4);
        chain.clear_history();
        assert!(chain.history().is_empty());

        let backend = ScriptedBackend::new(vec![text("one"), text("two")]);
        let mut chain = builder(backend).build().unwrap();
        chain.run("first").await.unwrap();
        chain.run("second").await.unwrap();
        let seen = chain.backend().seen.lock().unwrap();
        assert_eq!(seen[1].messages, vec![Message::user("second")]);
    }

    #[tokio::test]
    async fn records_every_step() {
        let backend = ScriptedBackend::new(vec![
            call(
                "convert_units",
                json!({"value": 0, "from_unit": "c", "to_unit": "f"}),
            ),
            text("32 F"),
        ]);
        let mut chain = builder(backend)
            .tool(convert_units())
            .recorder(EventStore::in_memory().unwrap())
            .build()
            .unwrap();
        let session = chain.session_id().unwrap();

        chain.run("0 C in F?").await.unwrap();
        let store = chain.end().unwrap();

        let events = store.load_session(session, None).unwrap();
        let kinds: Vec<&str> = events.iter().map(|e| e.kind.name()).collect();
        assert_eq!(
            kinds,
            vec![
                "session_start",
                "prompt",
                "tools_selected",
                "tool_call",
                "tool_result",
                "response",
                "session_end"
            ]
        );
        assert_eq!(
            events[0].kind,
            EventKind::SessionStart {
                provider: "scripted".into(),
                model: "test-model".into()
            }
        );
    }

    #[tokio::test]
    async fn backend_errors_are_recorded_and_returned() {
        let backend = ScriptedBackend::new(vec![Err(ModelError::Api {
            status: 500,
            body: "boom".into(),
        })]);
        let mut chain = builder(backend)
            .recorder(EventStore::in_memory().unwrap())
            .build()
            .unwrap();
        let session = chain.session_id().unwrap();

        let err = chain.run("hi").await.unwrap_err();
        assert!(matches!(err, Error::Model(ModelError::Api { status: 500, .. })));

        let store = chain.end().unwrap();
        let failed = store.load_session(session, Some("run_failed")).unwrap();
        assert_eq!(failed.len(), 1);
    }
}
