//! Run Completion use case (streaming completion engine).
//!
//! Drives one [`LlmCompletion`] to the end:
//!
//! 1. Build the transcript: system message, prior conversation, new user
//!    message. The seed is carried from the last prior message.
//! 2. Stream one provider turn, accumulating content, reasoning and tool
//!    call fragments into a single assistant message. Every delta refreshes
//!    the snapshot visible through `llm_find` and checks for cancellation.
//! 3. Invoke every tool call through the dispatcher and append the `Out_*`
//!    rendering of each reply as a `tool` message.
//! 4. Repeat while the model keeps calling tools, at most `Max_iteration`
//!    provider turns.
//!
//! Failures stop the loop but keep the transcript built so far.

use crate::config::CompletionParams;
use crate::ports::conversation_logger::{
    ConversationEvent, ConversationLogger, NoConversationLogger,
};
use crate::ports::llm_gateway::{ChatEvent, ChatRequest, GatewayError, LlmGateway};
use crate::registry::{CompletionTicket, RegistryError, SessionGuard, SessionRegistry};
use crate::use_cases::dispatch_tool::ToolDispatcher;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tooldesk_domain::{
    ChatMessage, Interruption, LlmCompletion, MsgId, Role, ToolCall, ToolSchema,
    TranscribeRequest, UsageCounters, is_interrupted, merge_tool_call_deltas, truncate_str,
};
use tracing::{debug, info, warn};

/// How long a stopped completion waits for a running tool call to notice.
const TOOL_STOP_GRACE: std::time::Duration = std::time::Duration::from_secs(1);

/// Errors that end a completion early.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompletionError {
    #[error("{0}")]
    Interrupted(Interruption),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Result of [`RunCompletionUseCase::execute`]: the request with its `Out_*`
/// fields filled, plus the error that stopped it, if any.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub completion: LlmCompletion,
    pub error: Option<CompletionError>,
}

pub struct RunCompletionUseCase {
    gateway: Arc<dyn LlmGateway>,
    dispatcher: Arc<ToolDispatcher>,
    sessions: Arc<SessionRegistry>,
    conversation_logger: Arc<dyn ConversationLogger>,
    params: CompletionParams,
    /// One lock per provider: stream parsing for a provider never interleaves.
    provider_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

struct Turn<'a> {
    completion: &'a LlmCompletion,
    tools: &'a [ToolSchema],
    seed: i64,
    iteration: u32,
    max: u32,
    session: &'a SessionGuard,
    cancel: &'a CancellationToken,
    ticket: &'a CompletionTicket,
}

impl RunCompletionUseCase {
    pub fn new(
        gateway: Arc<dyn LlmGateway>,
        dispatcher: Arc<ToolDispatcher>,
        params: CompletionParams,
    ) -> Self {
        let sessions = dispatcher.sessions().clone();
        Self {
            gateway,
            dispatcher,
            sessions,
            conversation_logger: Arc::new(NoConversationLogger),
            params,
            provider_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create with a conversation logger.
    pub fn with_conversation_logger(mut self, logger: Arc<dyn ConversationLogger>) -> Self {
        self.conversation_logger = logger;
        self
    }

    fn provider_lock(&self, provider: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.provider_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(provider.to_string())
            .or_default()
            .clone()
    }

    /// Run `completion` on behalf of session `msg_id`.
    pub async fn execute(
        &self,
        msg_id: MsgId,
        mut completion: LlmCompletion,
        ticket: &CompletionTicket,
    ) -> CompletionOutcome {
        let session = self
            .sessions
            .open("llm", (!msg_id.is_none()).then_some(msg_id));
        let cancel = ticket.cancel_token();
        let max = if completion.max_iteration == 0 {
            self.params.default_max_iteration
        } else {
            completion.max_iteration
        };
        let (mut messages, start) = completion.initial_messages();
        let seed = completion.seed();

        let mut tools = Vec::with_capacity(completion.tools.len());
        for name in &completion.tools {
            match self.dispatcher.catalog().find_function(name) {
                Some(schema) => tools.push(schema),
                None => warn!(function = %name, "Unknown tool in allowlist"),
            }
        }

        info!(
            uid = %completion.uid,
            provider = %completion.app_name,
            model = %completion.model,
            tools = tools.len(),
            max_iteration = max,
            "Starting completion"
        );
        ticket.publish(|s| {
            s.messages = messages.clone();
            s.seed = seed;
        });

        let mut total = UsageCounters::default();
        let mut error = None;
        'turns: for iteration in 0..max {
            let turn = Turn {
                completion: &completion,
                tools: &tools,
                seed,
                iteration,
                max,
                session: &session,
                cancel: &cancel,
                ticket,
            };
            let assistant = match self.stream_turn(&turn, &messages).await {
                Ok(msg) => msg,
                Err(e) => {
                    error = Some(e);
                    break;
                }
            };
            if let Some(usage) = &assistant.usage {
                total.add(usage);
            }
            let calls = assistant.tool_calls.clone();
            messages.push(assistant);
            ticket.publish(|s| {
                s.messages = messages.clone();
                s.usage = total.clone();
            });

            if calls.is_empty() {
                break;
            }
            for call in &calls {
                match self.invoke_tool(&session, &cancel, call).await {
                    Ok(content) => messages.push(ChatMessage::tool_result(&call.id, content)),
                    Err(e) => {
                        error = Some(e);
                        break 'turns;
                    }
                }
            }
            ticket.publish(|s| s.messages = messages.clone());
            if iteration + 1 == max {
                info!(uid = %completion.uid, max, "Max_iteration reached with tool calls pending");
            }
        }

        // Commands from tool sub-calls belong to the caller's response.
        let commands = session.take_cmds();
        if !msg_id.is_none()
            && let Err(e) = self.sessions.add_cmds(msg_id, commands)
        {
            debug!(%msg_id, error = %e, "Caller session gone; completion commands dropped");
        }

        let last_assistant = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .cloned()
            .unwrap_or_default();
        completion.out_answer = last_assistant.content;
        completion.out_reasoning = last_assistant.reasoning_content;
        completion.out_messages = messages.split_off(start.min(messages.len()));
        completion.out_usage = total;

        ticket.finish(error.as_ref().map(|e| e.to_string()));
        match &error {
            Some(e) => warn!(uid = %completion.uid, error = %e, "Completion stopped"),
            None => info!(
                uid = %completion.uid,
                price = completion.out_usage.total_price(),
                "Completion finished"
            ),
        }
        CompletionOutcome { completion, error }
    }

    fn interrupted(&self, turn_session: &SessionGuard, cancel: &CancellationToken) -> bool {
        cancel.is_cancelled() || turn_session.is_cancelled()
    }

    async fn stream_turn(
        &self,
        turn: &Turn<'_>,
        messages: &[ChatMessage],
    ) -> Result<ChatMessage, CompletionError> {
        if self.interrupted(turn.session, turn.cancel) {
            return Err(CompletionError::Interrupted(Interruption::Request));
        }
        let request = ChatRequest::from_completion(turn.completion, messages, turn.tools, turn.seed);
        self.conversation_logger.log(ConversationEvent::new(
            "llm_request",
            serde_json::json!({
                "uid": turn.completion.uid,
                "provider": request.provider,
                "model": request.model,
                "iteration": turn.iteration,
                "messages": request.messages.len(),
                "tools": request.tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            }),
        ));

        let lock = self.provider_lock(&request.provider);
        let _serialized = lock.lock().await;

        let started = Instant::now();
        let mut stream = tokio::select! {
            _ = turn.cancel.cancelled() => {
                return Err(CompletionError::Interrupted(Interruption::Request));
            }
            opened = self.gateway.stream_chat(&request) => opened?,
        };

        let mut assistant = ChatMessage::assistant("");
        assistant.seed = turn.seed;
        let mut usage = UsageCounters::default();
        let mut first_token: Option<f64> = None;
        let mut last_progress: Option<Instant> = None;
        let base = turn.iteration as f64 / turn.max as f64;

        loop {
            let event = tokio::select! {
                _ = turn.cancel.cancelled() => {
                    return Err(CompletionError::Interrupted(Interruption::Request));
                }
                event = stream.recv() => event,
            };
            let Some(event) = event else { break };
            match event {
                ChatEvent::Content(text) => {
                    first_token.get_or_insert_with(|| started.elapsed().as_secs_f64());
                    assistant.content.push_str(&text);
                }
                ChatEvent::Reasoning(text) => {
                    first_token.get_or_insert_with(|| started.elapsed().as_secs_f64());
                    assistant.reasoning_content.push_str(&text);
                }
                ChatEvent::ToolCalls(deltas) => {
                    first_token.get_or_insert_with(|| started.elapsed().as_secs_f64());
                    merge_tool_call_deltas(&mut assistant.tool_calls, &deltas);
                }
                ChatEvent::Usage(counters) => usage = counters,
                ChatEvent::Done => break,
                ChatEvent::Error(e) => return Err(e.into()),
            }

            turn.ticket.publish(|s| {
                s.answer.clone_from(&assistant.content);
                s.reasoning.clone_from(&assistant.reasoning_content);
            });
            let due = last_progress.is_none_or(|t| t.elapsed() >= self.params.progress_interval);
            if due {
                last_progress = Some(Instant::now());
                if self.sessions.progress(turn.session.id(), base, "streaming") {
                    return Err(CompletionError::Interrupted(Interruption::Request));
                }
            } else if turn.session.is_cancelled() {
                return Err(CompletionError::Interrupted(Interruption::Request));
            }
        }
        drop(stream);

        let total_sec = started.elapsed().as_secs_f64();
        usage.provider.clone_from(&request.provider);
        if usage.model.is_empty() {
            usage.model.clone_from(&request.model);
        }
        usage.first_token_sec = first_token.unwrap_or(total_sec);
        usage.total_sec = total_sec;
        usage.apply_prices();
        assistant.usage = Some(usage);

        self.conversation_logger.log(ConversationEvent::new(
            "llm_response",
            serde_json::json!({
                "uid": turn.completion.uid,
                "iteration": turn.iteration,
                "bytes": assistant.content.len(),
                "preview": truncate_str(&assistant.content, 200),
                "tool_calls": assistant.tool_calls.len(),
                "first_token_sec": first_token,
                "total_sec": total_sec,
            }),
        ));
        debug!(
            uid = %turn.completion.uid,
            iteration = turn.iteration,
            tool_calls = assistant.tool_calls.len(),
            "Provider turn finished"
        );
        Ok(assistant)
    }

    async fn invoke_tool(
        &self,
        session: &SessionGuard,
        cancel: &CancellationToken,
        call: &ToolCall,
    ) -> Result<String, CompletionError> {
        if self.interrupted(session, cancel) {
            return Err(CompletionError::Interrupted(Interruption::Request));
        }
        self.conversation_logger.log(ConversationEvent::new(
            "tool_call",
            serde_json::json!({
                "id": call.id,
                "function": call.name(),
                "arguments": truncate_str(call.arguments_json(), 500),
            }),
        ));

        let pending = self
            .dispatcher
            .call_function(session.id(), call.name(), call.arguments_json());
        tokio::pin!(pending);
        let result = tokio::select! {
            result = &mut pending => result,
            _ = cancel.cancelled() => {
                // The tool's sub-session is parented here, so its next
                // `progress` answers stop.
                if let Err(e) = self.sessions.stop(session.id()) {
                    debug!(msg_id = %session.id(), error = %e, "Completion session already gone");
                }
                if tokio::time::timeout(self.params.progress_interval + TOOL_STOP_GRACE, &mut pending)
                    .await
                    .is_err()
                {
                    warn!(function = call.name(), "Tool still running after completion stop");
                }
                return Err(CompletionError::Interrupted(Interruption::Request));
            }
        };
        let content = match result {
            Ok(reply) => reply.tool_result(),
            Err(e) => {
                let text = e.to_string();
                if is_interrupted(&text) {
                    let kind = if self.interrupted(session, cancel) {
                        Interruption::Request
                    } else {
                        Interruption::Tool
                    };
                    return Err(CompletionError::Interrupted(kind));
                }
                warn!(function = call.name(), error = %text, "Tool call failed");
                format!("Error: {}", text)
            }
        };

        self.conversation_logger.log(ConversationEvent::new(
            "tool_result",
            serde_json::json!({
                "id": call.id,
                "function": call.name(),
                "bytes": content.len(),
                "preview": truncate_str(&content, 200),
            }),
        ));
        Ok(content)
    }

    /// Post an audio blob to the provider's transcription endpoint.
    pub async fn transcribe(&self, request: &TranscribeRequest) -> Result<Vec<u8>, GatewayError> {
        info!(
            provider = %request.app_name,
            bytes = request.blob.len(),
            "Transcribing audio"
        );
        self.gateway.transcribe(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchParams;
    use crate::ports::app_catalog::{AppCatalog, CatalogError};
    use crate::ports::llm_gateway::StreamHandle;
    use crate::ports::tool_launcher::NoLauncher;
    use crate::ports::tool_transport::TransportError;
    use crate::registry::{CompletionRegistry, EndpointRegistry};
    use crate::use_cases::dispatch_tool::tests::FakeTransport;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tooldesk_domain::llm::tool_call::{FunctionCall, FunctionDelta};
    use tooldesk_domain::{BuildReply, Command, SHOWN_ON_SCREEN, ToolCallDelta, Uid};

    enum Script {
        Events(Vec<ChatEvent>),
        Hang(Vec<ChatEvent>),
        Fail(GatewayError),
    }

    #[derive(Default)]
    struct FakeGateway {
        turns: Mutex<VecDeque<Script>>,
        requests: Mutex<Vec<ChatRequest>>,
        held: Mutex<Vec<mpsc::Sender<ChatEvent>>>,
        repeat_tool_call: bool,
    }

    fn tool_call_event(id: &str, name: &str, args: &str) -> ChatEvent {
        ChatEvent::ToolCalls(vec![ToolCallDelta {
            index: Some(0),
            id: Some(id.to_string()),
            function: Some(FunctionDelta {
                name: Some(name.to_string()),
                arguments: Some(args.to_string()),
            }),
        }])
    }

    #[async_trait]
    impl LlmGateway for FakeGateway {
        async fn stream_chat(&self, request: &ChatRequest) -> Result<StreamHandle, GatewayError> {
            self.requests.lock().unwrap().push(request.clone());
            let script = self.turns.lock().unwrap().pop_front();
            let script = match script {
                Some(s) => s,
                None if self.repeat_tool_call => Script::Events(vec![
                    tool_call_event("call_n", "ShowActivityStatistic", "{}"),
                    ChatEvent::Done,
                ]),
                None => Script::Events(vec![ChatEvent::Content("done".into()), ChatEvent::Done]),
            };
            let (tx, rx) = mpsc::channel(16);
            match script {
                Script::Fail(e) => return Err(e),
                Script::Events(events) => {
                    for ev in events {
                        tx.send(ev).await.unwrap();
                    }
                }
                Script::Hang(events) => {
                    for ev in events {
                        tx.send(ev).await.unwrap();
                    }
                    self.held.lock().unwrap().push(tx);
                }
            }
            Ok(StreamHandle::new(rx))
        }

        async fn transcribe(&self, request: &TranscribeRequest) -> Result<Vec<u8>, GatewayError> {
            Ok(request.blob.clone())
        }
    }

    struct FakeCatalog;

    impl AppCatalog for FakeCatalog {
        fn schemas(&self, _app: &str) -> Vec<ToolSchema> {
            vec![self.find_function("ShowActivityStatistic").unwrap()]
        }

        fn find_function(&self, function: &str) -> Option<ToolSchema> {
            (function == "ShowActivityStatistic").then(|| {
                ToolSchema::new(
                    "Activities",
                    "ShowActivityStatistic",
                    "Show statistics of one activity",
                    serde_json::json!({"type":"object","properties":{"ActivityID":{"type":"string"}}}),
                )
            })
        }

        fn generate_app(&self, _name: &str) -> Result<(), CatalogError> {
            Ok(())
        }

        fn rename_app(&self, _old: &str, _new: &str) -> Result<(), CatalogError> {
            Ok(())
        }
    }

    struct Harness {
        gateway: Arc<FakeGateway>,
        transport: Arc<FakeTransport>,
        use_case: RunCompletionUseCase,
        completions: Arc<CompletionRegistry>,
        sessions: Arc<SessionRegistry>,
    }

    fn harness(gateway: FakeGateway) -> Harness {
        let gateway = Arc::new(gateway);
        let transport = Arc::new(FakeTransport::default());
        let sessions = SessionRegistry::new();
        let dispatcher = Arc::new(ToolDispatcher::new(
            Arc::new(EndpointRegistry::new()),
            sessions.clone(),
            transport.clone(),
            Arc::new(NoLauncher),
            Arc::new(FakeCatalog),
            DispatchParams::default(),
        ));
        dispatcher.register("Activities", 9000);
        let use_case = RunCompletionUseCase::new(
            gateway.clone(),
            dispatcher,
            CompletionParams::default().with_progress_interval(Duration::ZERO),
        );
        Harness {
            gateway,
            transport,
            use_case,
            completions: CompletionRegistry::new(),
            sessions,
        }
    }

    fn ping() -> LlmCompletion {
        LlmCompletion {
            uid: "chat-1".to_string(),
            app_name: "openai".to_string(),
            model: "gpt-4o".to_string(),
            tools: vec!["ShowActivityStatistic".to_string()],
            user_message: "ping".to_string(),
            ..LlmCompletion::default()
        }
    }

    fn stat_reply(params: &str) -> Result<BuildReply, TransportError> {
        Ok(BuildReply {
            params_json: params.to_string(),
            ui_json: String::new(),
            commands: vec![Command::open_centered(Uid(9))],
        })
    }

    #[tokio::test]
    async fn one_tool_call_loops_exactly_once_more() {
        let gateway = FakeGateway::default();
        gateway.turns.lock().unwrap().extend([
            Script::Events(vec![
                tool_call_event("call_1", "ShowActivityStatistic", "{\"ActivityID\":"),
                ChatEvent::ToolCalls(vec![ToolCallDelta {
                    index: Some(0),
                    id: None,
                    function: Some(FunctionDelta {
                        name: None,
                        arguments: Some("\"42\"}".to_string()),
                    }),
                }]),
                ChatEvent::Done,
            ]),
            Script::Events(vec![ChatEvent::Content("42 km".into()), ChatEvent::Done]),
        ]);
        let h = harness(gateway);
        h.transport.replies.lock().unwrap().insert(
            "ShowActivityStatistic".to_string(),
            stat_reply(r#"{"ActivityID":"42","Out_distance":"42 km"}"#),
        );

        let caller = h.sessions.open("Chat", None);
        let ticket = h.completions.begin("chat-1").unwrap();
        let outcome = h.use_case.execute(caller.id(), ping(), &ticket).await;
        assert!(outcome.error.is_none());

        let requests = h.gateway.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tools.len(), 1);
        assert_eq!(requests[1].messages.len(), 3);

        let out = &outcome.completion.out_messages;
        let roles: Vec<Role> = out.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        assert_eq!(
            out[1].tool_calls[0].function,
            FunctionCall {
                name: "ShowActivityStatistic".to_string(),
                arguments: "{\"ActivityID\":\"42\"}".to_string(),
            }
        );
        assert_eq!(out[2].content, "42 km");
        assert_eq!(out[2].tool_call_id, "call_1");
        assert_eq!(outcome.completion.out_answer, "42 km");
        assert_eq!(
            *h.transport.calls.lock().unwrap(),
            vec!["Activities.ShowActivityStatistic".to_string()]
        );
        // The sub-call's commands reach the caller's session.
        assert_eq!(caller.take_cmds(), vec![Command::open_centered(Uid(9))]);
    }

    #[tokio::test]
    async fn visible_ui_yields_sentinel() {
        let gateway = FakeGateway::default();
        gateway.turns.lock().unwrap().push_back(Script::Events(vec![
            tool_call_event("call_1", "ShowActivityStatistic", "{\"ActivityID\":\"42\"}"),
            ChatEvent::Done,
        ]));
        let h = harness(gateway);
        let ui = serde_json::json!({
            "Uid": 1, "Name": "root", "Grid": {"x":0,"y":0,"w":0,"h":0},
            "Widget": {"Kind": "Layout"},
            "Children": [{
                "Uid": 2, "Name": "chart", "Grid": {"x":0,"y":0,"w":1,"h":1},
                "Widget": {"Kind": "Text", "label": "chart"}
            }]
        });
        h.transport.replies.lock().unwrap().insert(
            "ShowActivityStatistic".to_string(),
            Ok(BuildReply {
                params_json: r#"{"ActivityID":"42"}"#.to_string(),
                ui_json: ui.to_string(),
                commands: Vec::new(),
            }),
        );
        let ticket = h.completions.begin("chat-1").unwrap();
        let outcome = h.use_case.execute(MsgId::NONE, ping(), &ticket).await;
        assert_eq!(outcome.completion.out_messages[2].content, SHOWN_ON_SCREEN);
    }

    #[tokio::test]
    async fn max_iteration_bounds_provider_calls() {
        let h = harness(FakeGateway {
            repeat_tool_call: true,
            ..FakeGateway::default()
        });
        let completion = LlmCompletion {
            max_iteration: 3,
            ..ping()
        };
        let ticket = h.completions.begin("chat-1").unwrap();
        let outcome = h.use_case.execute(MsgId::NONE, completion, &ticket).await;
        assert!(outcome.error.is_none());
        assert_eq!(h.gateway.requests.lock().unwrap().len(), 3);
        // user + 3 × (assistant + tool)
        assert_eq!(outcome.completion.out_messages.len(), 7);
    }

    #[tokio::test]
    async fn stop_interrupts_streaming() {
        let gateway = FakeGateway::default();
        gateway
            .turns
            .lock()
            .unwrap()
            .push_back(Script::Hang(vec![ChatEvent::Content("par".into())]));
        let h = Arc::new(harness(gateway));
        let ticket = h.completions.begin("chat-1").unwrap();

        let runner = {
            let h = h.clone();
            tokio::spawn(async move { h.use_case.execute(MsgId::NONE, ping(), &ticket).await })
        };
        for _ in 0..100 {
            if h.completions.find("chat-1").is_some_and(|s| s.answer == "par") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        h.completions.stop("chat-1").unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(2), runner)
            .await
            .unwrap()
            .unwrap();
        let err = outcome.error.unwrap();
        assert_eq!(err, CompletionError::Interrupted(Interruption::Request));
        assert_eq!(err.to_string(), "_interrupted_");
    }

    #[tokio::test]
    async fn stop_reaches_running_tool_call() {
        let gateway = FakeGateway::default();
        gateway.turns.lock().unwrap().push_back(Script::Events(vec![
            tool_call_event("call_1", "ShowActivityStatistic", "{}"),
            ChatEvent::Done,
        ]));
        let h = Arc::new(harness(gateway));
        *h.transport.sessions.lock().unwrap() = Some(h.sessions.clone());
        h.transport
            .polls_progress
            .store(true, std::sync::atomic::Ordering::Relaxed);
        let ticket = h.completions.begin("chat-1").unwrap();

        let started = Instant::now();
        let runner = {
            let h = h.clone();
            tokio::spawn(async move { h.use_case.execute(MsgId::NONE, ping(), &ticket).await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        h.completions.stop("chat-1").unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(3), runner)
            .await
            .unwrap()
            .unwrap();

        assert!(started.elapsed() < Duration::from_millis(1000));
        assert_eq!(
            outcome.error,
            Some(CompletionError::Interrupted(Interruption::Request))
        );
        assert!(
            outcome
                .completion
                .out_messages
                .iter()
                .all(|m| m.role != Role::Tool)
        );
        assert_eq!(h.gateway.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stopping_caller_session_interrupts() {
        let gateway = FakeGateway::default();
        gateway
            .turns
            .lock()
            .unwrap()
            .push_back(Script::Hang(vec![ChatEvent::Content("a".into())]));
        let h = Arc::new(harness(gateway));
        let caller = h.sessions.open("Chat", None);
        let caller_id = caller.id();
        let ticket = h.completions.begin("chat-1").unwrap();
        let runner = {
            let h = h.clone();
            tokio::spawn(async move { h.use_case.execute(caller_id, ping(), &ticket).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.sessions.stop(caller_id).unwrap();
        // The held stream delivers nothing more; a fresh delta triggers the check.
        let tx = loop {
            if let Some(tx) = h.gateway.held.lock().unwrap().first().cloned() {
                break tx;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        tx.send(ChatEvent::Content("b".into())).await.unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(2), runner)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            outcome.error,
            Some(CompletionError::Interrupted(Interruption::Request))
        );
    }

    #[tokio::test]
    async fn gateway_failure_keeps_partial_transcript() {
        let gateway = FakeGateway::default();
        gateway.turns.lock().unwrap().extend([
            Script::Events(vec![
                tool_call_event("call_1", "ShowActivityStatistic", "{}"),
                ChatEvent::Done,
            ]),
            Script::Fail(GatewayError::Status {
                status: 500,
                body: "boom".to_string(),
            }),
        ]);
        let h = harness(gateway);
        let ticket = h.completions.begin("chat-1").unwrap();
        let outcome = h.use_case.execute(MsgId::NONE, ping(), &ticket).await;
        assert!(matches!(outcome.error, Some(CompletionError::Gateway(_))));
        assert_eq!(outcome.completion.out_messages.len(), 3);
        let snap = h.completions.find("chat-1").unwrap();
        assert!(!snap.running);
        assert!(snap.error.contains("500"));
    }

    #[tokio::test]
    async fn tool_errors_are_fed_back_to_the_model() {
        let gateway = FakeGateway::default();
        gateway.turns.lock().unwrap().push_back(Script::Events(vec![
            tool_call_event("call_1", "ShowActivityStatistic", "{}"),
            ChatEvent::Done,
        ]));
        let h = harness(gateway);
        h.transport.replies.lock().unwrap().insert(
            "ShowActivityStatistic".to_string(),
            Err(TransportError::Remote("no such activity".to_string())),
        );
        let ticket = h.completions.begin("chat-1").unwrap();
        let outcome = h.use_case.execute(MsgId::NONE, ping(), &ticket).await;
        assert!(outcome.error.is_none());
        assert_eq!(
            outcome.completion.out_messages[2].content,
            "Error: no such activity"
        );
    }

    #[tokio::test]
    async fn tool_interruption_surfaces_tool_sentinel() {
        let gateway = FakeGateway::default();
        gateway.turns.lock().unwrap().push_back(Script::Events(vec![
            tool_call_event("call_1", "ShowActivityStatistic", "{}"),
            ChatEvent::Done,
        ]));
        let h = harness(gateway);
        h.transport.replies.lock().unwrap().insert(
            "ShowActivityStatistic".to_string(),
            Err(TransportError::Remote("_interrupted_".to_string())),
        );
        let ticket = h.completions.begin("chat-1").unwrap();
        let outcome = h.use_case.execute(MsgId::NONE, ping(), &ticket).await;
        assert_eq!(
            outcome.error.map(|e| e.to_string()),
            Some("_tool_interrupted_".to_string())
        );
    }

    #[tokio::test]
    async fn usage_is_priced_and_timed() {
        let gateway = FakeGateway::default();
        gateway.turns.lock().unwrap().push_back(Script::Events(vec![
            ChatEvent::Content("pong".into()),
            ChatEvent::Usage(UsageCounters {
                prompt_tokens: 1_000_000,
                completion_tokens: 1_000_000,
                ..UsageCounters::default()
            }),
            ChatEvent::Done,
        ]));
        let h = harness(gateway);
        let ticket = h.completions.begin("chat-1").unwrap();
        let outcome = h.use_case.execute(MsgId::NONE, ping(), &ticket).await;
        let usage = &outcome.completion.out_usage;
        assert_eq!(usage.provider, "openai");
        assert_eq!(usage.model, "gpt-4o");
        assert!((usage.total_price() - 12.5).abs() < 1e-9);
        assert!(usage.first_token_sec <= usage.total_sec);
        let msg_usage = outcome.completion.out_messages[1].usage.as_ref().unwrap();
        assert_eq!(msg_usage.prompt_tokens, 1_000_000);
    }
}
