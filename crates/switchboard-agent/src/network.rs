//! Agent network: the routing / execution loop.
//!
//! Each iteration asks the completion oracle whether the last contribution
//! already satisfies the task, otherwise asks the router for the next
//! resource, invokes it and appends its output to the thread. The user's
//! input is written together with the first resource answer, so a run that
//! fails before any resource answers leaves the thread as it was. A resource
//! may suspend instead of answering; the loop then parks a
//! [`PendingRunHandle`] on the thread and returns a waiting outcome until
//! [`AgentNetwork::resume`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use switchboard_core::error::{NetworkError, Result};
use switchboard_core::thread::{ConversationStore, ThreadLocks};
use switchboard_core::types::{
    ConfirmationKind, PendingRunHandle, ResolvedRun, ResourceType, RunOutcome, RunStatus,
    ThreadMessage,
};

use crate::events::{EventSink, NetworkEvent};
use crate::oracle::{CompletionOracle, RoutingOracle};
use crate::registry::ResourceRegistry;
use crate::resource::{Confirmation, InvocationContext, RegisteredResource, ResourceDescriptor, ResourceOutput};
use crate::state::IterationState;

/// Capacity of the event channel behind [`AgentNetwork::stream`].
const STREAM_BUFFER: usize = 64;

/// User input for a run: one text or a list of messages.
#[derive(Clone, Debug)]
pub enum RunInput {
    Text(String),
    Messages(Vec<ThreadMessage>),
}

impl RunInput {
    fn into_messages(self) -> Vec<ThreadMessage> {
        match self {
            RunInput::Text(text) => vec![ThreadMessage::user(text)],
            RunInput::Messages(messages) => messages,
        }
    }
}

impl From<&str> for RunInput {
    fn from(text: &str) -> Self {
        RunInput::Text(text.to_string())
    }
}

impl From<String> for RunInput {
    fn from(text: String) -> Self {
        RunInput::Text(text)
    }
}

impl From<Vec<ThreadMessage>> for RunInput {
    fn from(messages: Vec<ThreadMessage>) -> Self {
        RunInput::Messages(messages)
    }
}

/// Per-call options.
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    /// Thread to run on; a fresh id is generated when absent.
    pub thread_id: Option<String>,
    /// Owner of a newly created thread; defaults to the network name.
    pub resource_id: Option<String>,
    /// Overrides the network budget. `Some(0)` means unbounded.
    pub max_iterations: Option<u32>,
}

impl RunOptions {
    pub fn thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            ..Default::default()
        }
    }
}

/// A streaming run: events as they happen, the outcome once it ends.
///
/// The channel is bounded, so the run waits for the consumer. Drain
/// `events` before calling [`NetworkStream::finish`], or call it directly to
/// discard the remaining events.
pub struct NetworkStream {
    pub events: mpsc::Receiver<NetworkEvent>,
    pub handle: JoinHandle<Result<RunOutcome>>,
}

impl NetworkStream {
    pub async fn next(&mut self) -> Option<NetworkEvent> {
        self.events.recv().await
    }

    /// Wait for the run to end.
    pub async fn finish(self) -> anyhow::Result<RunOutcome> {
        drop(self.events);
        Ok(self.handle.await??)
    }
}

/// Whether `iteration` routing decisions use up the budget.
fn exhausted(iteration: u32, budget: Option<u32>) -> bool {
    matches!(budget, Some(max) if max > 0 && iteration >= max)
}

fn suspension_text(payload: &Value) -> String {
    match payload.get("message").and_then(Value::as_str) {
        Some(message) => message.to_string(),
        None => payload.to_string(),
    }
}

/// Routes tasks across a fixed set of resources.
pub struct AgentNetwork {
    name: String,
    registry: ResourceRegistry,
    catalog: Vec<ResourceDescriptor>,
    router: Arc<dyn RoutingOracle>,
    completion: Arc<dyn CompletionOracle>,
    store: Arc<dyn ConversationStore>,
    locks: ThreadLocks,
    max_iterations: Option<u32>,
    history_limit: usize,
    run_timeout: Option<Duration>,
    verbose_introspection: bool,
}

impl AgentNetwork {
    pub fn new(
        name: impl Into<String>,
        registry: ResourceRegistry,
        router: Arc<dyn RoutingOracle>,
        completion: Arc<dyn CompletionOracle>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        let catalog = registry.catalog();
        Self {
            name: name.into(),
            registry,
            catalog,
            router,
            completion,
            store,
            locks: ThreadLocks::new(),
            max_iterations: None,
            history_limit: 20,
            run_timeout: None,
            verbose_introspection: false,
        }
    }

    /// Default budget of routing decisions per run; 0 means unbounded.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = (max > 0).then_some(max);
        self
    }

    /// Thread messages shown to the oracles.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn with_verbose_introspection(mut self, verbose: bool) -> Self {
        self.verbose_introspection = verbose;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    // ─────────────────────────────────────────
    // Public entry points
    // ─────────────────────────────────────────

    /// Multi-step run until completion, budget exhaustion or suspension.
    pub async fn run(&self, input: impl Into<RunInput>, opts: RunOptions) -> Result<RunOutcome> {
        let input = input.into();
        self.with_timeout(self.start(input, opts, false, EventSink::none()))
            .await
    }

    /// Route once and return that resource's output, without a completion check.
    pub async fn generate(
        &self,
        input: impl Into<RunInput>,
        opts: RunOptions,
    ) -> Result<RunOutcome> {
        let input = input.into();
        self.with_timeout(self.start(input, opts, true, EventSink::none()))
            .await
    }

    /// Multi-step run on a background task, reporting progress as events.
    pub fn stream(self: &Arc<Self>, input: impl Into<RunInput>, opts: RunOptions) -> NetworkStream {
        let (tx, events) = mpsc::channel(STREAM_BUFFER);
        let network = Arc::clone(self);
        let input = input.into();
        let handle = tokio::spawn(async move {
            let sink = EventSink::new(tx);
            network
                .with_timeout(network.start(input, opts, false, sink))
                .await
        });
        NetworkStream { events, handle }
    }

    /// Continue the run suspended on `thread_id` with the user's answer.
    ///
    /// Repeating the confirmation that already resolved the run returns the
    /// recorded outcome without invoking anything.
    pub async fn resume(&self, thread_id: &str, confirmation: Confirmation) -> Result<RunOutcome> {
        self.with_timeout(self.continue_run(thread_id, confirmation, EventSink::none()))
            .await
    }

    /// [`AgentNetwork::resume`] reporting progress as events.
    pub fn resume_stream(
        self: &Arc<Self>,
        thread_id: impl Into<String>,
        confirmation: Confirmation,
    ) -> NetworkStream {
        let (tx, events) = mpsc::channel(STREAM_BUFFER);
        let network = Arc::clone(self);
        let thread_id = thread_id.into();
        let handle = tokio::spawn(async move {
            let sink = EventSink::new(tx);
            network
                .with_timeout(network.continue_run(&thread_id, confirmation, sink))
                .await
        });
        NetworkStream { events, handle }
    }

    /// The suspended run waiting on a thread, if any.
    pub async fn pending(&self, thread_id: &str) -> Result<Option<PendingRunHandle>> {
        self.store.pending_run(thread_id).await
    }

    /// Drop the suspended run of a thread without resuming it.
    pub async fn cancel_pending(&self, thread_id: &str) -> Result<Option<PendingRunHandle>> {
        let _guard = self.locks.acquire(thread_id).await;
        let handle = self.store.take_pending_run(thread_id).await?;
        if let Some(h) = &handle {
            info!(thread = thread_id, run_id = %h.run_id, resource = %h.resource_id, "suspended run cancelled");
        }
        Ok(handle)
    }

    // ─────────────────────────────────────────
    // Loop
    // ─────────────────────────────────────────

    async fn with_timeout<F>(&self, fut: F) -> Result<RunOutcome>
    where
        F: Future<Output = Result<RunOutcome>>,
    {
        match self.run_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| NetworkError::Timeout(limit))?,
            None => fut.await,
        }
    }

    async fn start(
        &self,
        input: RunInput,
        opts: RunOptions,
        one_off: bool,
        events: EventSink,
    ) -> Result<RunOutcome> {
        let thread_id = opts
            .thread_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let owner = opts.resource_id.unwrap_or_else(|| self.name.clone());
        let messages = input.into_messages();
        let task = messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let _guard = self.locks.acquire(&thread_id).await;
        let thread = self.store.get_or_create(&thread_id, &owner).await?;
        if let Some(pending) = thread.pending_run {
            return Err(NetworkError::ThreadSuspended {
                thread_id,
                run_id: pending.run_id,
            });
        }

        self.store.set_resolved_run(&thread_id, None).await?;

        let budget = match opts.max_iterations {
            Some(0) => None,
            Some(max) => Some(max),
            None => self.max_iterations,
        };

        let mut state = IterationState::new(task, &thread_id, &thread.resource_id);
        state.is_one_off = one_off;
        state.verbose_introspection = self.verbose_introspection || one_off;

        info!(
            network = %self.name,
            thread = %thread_id,
            one_off,
            budget = ?budget,
            "run started"
        );
        self.drive(state, messages, budget, &events).await
    }

    /// Thread history plus input not written yet, newest `history_limit` kept.
    async fn history(&self, thread_id: &str, unsaved: &[ThreadMessage]) -> Result<Vec<ThreadMessage>> {
        let mut history = self.store.history(thread_id, self.history_limit).await?;
        if !unsaved.is_empty() {
            history.extend_from_slice(unsaved);
            let excess = history.len().saturating_sub(self.history_limit);
            history.drain(..excess);
        }
        Ok(history)
    }

    async fn drive(
        &self,
        mut state: IterationState,
        mut unsaved: Vec<ThreadMessage>,
        budget: Option<u32>,
        events: &EventSink,
    ) -> Result<RunOutcome> {
        loop {
            let history = self.history(&state.thread_id, &unsaved).await?;

            if state.awaits_verdict() {
                let verdict = self.completion.check_completion(&state, &history).await?;
                if verdict.is_complete {
                    let resource_id = std::mem::take(&mut state.resource_id);
                    let resource_type =
                        std::mem::replace(&mut state.resource_type, ResourceType::None);
                    state.is_complete = true;
                    if !verdict.final_result.is_empty() {
                        state.result = verdict.final_result;
                    }
                    state.completion_reason = Some(verdict.completion_reason);
                    info!(
                        thread = %state.thread_id,
                        iterations = state.iteration,
                        resource = %resource_id,
                        "task complete"
                    );
                    let outcome =
                        self.outcome(&state, resource_id, resource_type, RunStatus::Completed);
                    return Ok(self.finish(outcome, events).await);
                }
                debug!(
                    iteration = state.iteration,
                    reason = %verdict.completion_reason,
                    "task not complete yet"
                );
                state.feedback = Some(verdict.final_result).filter(|f| !f.is_empty());
            }

            if exhausted(state.iteration, budget) {
                let max = budget.unwrap_or_default();
                warn!(thread = %state.thread_id, max, "iteration budget exhausted");
                state.completion_reason = Some(format!("Max iterations reached: {max}"));
                let outcome = self.outcome(
                    &state,
                    state.resource_id.clone(),
                    state.resource_type,
                    RunStatus::BudgetExhausted,
                );
                return Ok(self.finish(outcome, events).await);
            }

            let decision = self
                .router
                .select_resource(&state, &self.catalog, &history)
                .await?;
            if decision.is_none() {
                return Err(NetworkError::RoutingParse(
                    "router selected no resource for an incomplete task".to_string(),
                ));
            }

            state.iteration += 1;
            state.resource_id = decision.resource_id;
            state.resource_type = decision.resource_type;
            state.prompt = decision.prompt;
            state.selection_reason = decision.selection_reason;
            info!(
                thread = %state.thread_id,
                iteration = state.iteration,
                resource = %state.resource_id,
                kind = %state.resource_type,
                "resource selected"
            );
            events
                .emit(NetworkEvent::RoutingSelected {
                    iteration: state.iteration,
                    resource_id: state.resource_id.clone(),
                    resource_type: state.resource_type,
                    prompt: state.prompt.clone(),
                    selection_reason: state.selection_reason.clone(),
                })
                .await;

            let resource = self
                .registry
                .get(&state.resource_id)
                .ok_or_else(|| NetworkError::UnknownResource(state.resource_id.clone()))?;
            if resource.kind() != state.resource_type {
                warn!(
                    resource = %state.resource_id,
                    routed = %state.resource_type,
                    registered = %resource.kind(),
                    "router mislabelled resource kind"
                );
                state.resource_type = resource.kind();
            }

            let ctx = InvocationContext::new(&state.thread_id, resource.name(), events.clone());
            let output = resource
                .handler
                .invoke(&state.prompt, &ctx)
                .await
                .map_err(|e| NetworkError::execution(resource.name(), format!("{e:#}")))?;

            for message in unsaved.drain(..) {
                self.store.append(&state.thread_id, message).await?;
            }

            match output {
                ResourceOutput::Completed(text) => {
                    self.record_result(&mut state, resource, text, events).await?;
                    if state.is_one_off {
                        let outcome = self.outcome(
                            &state,
                            state.resource_id.clone(),
                            state.resource_type,
                            RunStatus::Completed,
                        );
                        return Ok(self.finish(outcome, events).await);
                    }
                }
                ResourceOutput::Suspended {
                    run_id,
                    payload,
                    expects,
                } => {
                    return self
                        .suspend(&state, budget, run_id, payload, expects, events)
                        .await;
                }
            }
        }
    }

    async fn record_result(
        &self,
        state: &mut IterationState,
        resource: &RegisteredResource,
        text: String,
        events: &EventSink,
    ) -> Result<()> {
        self.store
            .append(
                &state.thread_id,
                ThreadMessage::assistant(&text).from_resource(resource.name()),
            )
            .await?;
        debug!(resource = %resource.name(), chars = text.len(), "resource finished");
        events
            .emit(NetworkEvent::ResourceFinished {
                iteration: state.iteration,
                resource_id: resource.name().to_string(),
                resource_type: resource.kind(),
                result: text.clone(),
            })
            .await;
        state.result = text;
        state.is_complete = false;
        Ok(())
    }

    async fn suspend(
        &self,
        state: &IterationState,
        budget: Option<u32>,
        run_id: String,
        payload: Value,
        expects: ConfirmationKind,
        events: &EventSink,
    ) -> Result<RunOutcome> {
        let handle = PendingRunHandle {
            run_id: run_id.clone(),
            resource_id: state.resource_id.clone(),
            resource_type: state.resource_type,
            payload: payload.clone(),
            expects,
            task: state.task.clone(),
            iteration: state.iteration,
            max_iterations: budget,
            one_off: state.is_one_off,
            created_at: Utc::now(),
        };
        self.store.set_pending_run(&state.thread_id, handle).await?;
        info!(
            thread = %state.thread_id,
            resource = %state.resource_id,
            run_id = %run_id,
            "resource suspended, waiting for confirmation"
        );
        events
            .emit(NetworkEvent::ResourceSuspended {
                resource_id: state.resource_id.clone(),
                run_id: run_id.clone(),
                payload: payload.clone(),
            })
            .await;

        let mut outcome = self.outcome(
            state,
            state.resource_id.clone(),
            state.resource_type,
            RunStatus::Waiting { run_id, payload },
        );
        if let RunStatus::Waiting { payload, .. } = &outcome.status {
            outcome.result = suspension_text(payload);
        }
        Ok(self.finish(outcome, events).await)
    }

    async fn continue_run(
        &self,
        thread_id: &str,
        confirmation: Confirmation,
        events: EventSink,
    ) -> Result<RunOutcome> {
        let _guard = self.locks.acquire(thread_id).await;

        let Some(handle) = self.store.pending_run(thread_id).await? else {
            if let Some(resolved) = self.store.resolved_run(thread_id).await? {
                if resolved.confirmation == confirmation.to_value() {
                    info!(thread = thread_id, run_id = %resolved.run_id, "replaying resolved run");
                    return Ok(resolved.outcome);
                }
            }
            return Err(NetworkError::StaleResume(thread_id.to_string()));
        };

        if !confirmation.satisfies(handle.expects) {
            return Err(NetworkError::InvalidConfirmation(format!(
                "run '{}' of '{}' expects a yes/no answer, got '{}'",
                handle.run_id,
                handle.resource_id,
                confirmation.as_text()
            )));
        }

        let resource = self
            .registry
            .get(&handle.resource_id)
            .ok_or_else(|| NetworkError::UnknownResource(handle.resource_id.clone()))?;
        let owner = self
            .store
            .load(thread_id)
            .await?
            .map(|t| t.resource_id)
            .unwrap_or_else(|| self.name.clone());

        info!(thread = thread_id, run_id = %handle.run_id, resource = %handle.resource_id, "resuming suspended run");

        // The handle stays parked until the resource answers; a resume that
        // is abandoned midway leaves the run resumable.
        let ctx = InvocationContext::new(thread_id, resource.name(), events.clone());
        let resumed = resource.handler.resume(&handle, &confirmation, &ctx).await;
        self.store.take_pending_run(thread_id).await?;
        let output =
            resumed.map_err(|e| NetworkError::execution(resource.name(), format!("{e:#}")))?;

        self.store
            .append(thread_id, ThreadMessage::user(confirmation.as_text()))
            .await?;

        let mut state = IterationState::resumed(&handle, thread_id, owner, self.verbose_introspection);
        let outcome = match output {
            ResourceOutput::Suspended {
                run_id,
                payload,
                expects,
            } => {
                self.suspend(&state, handle.max_iterations, run_id, payload, expects, &events)
                    .await?
            }
            ResourceOutput::Completed(text) => {
                self.record_result(&mut state, resource, text, &events).await?;
                if state.is_one_off {
                    let outcome = self.outcome(
                        &state,
                        state.resource_id.clone(),
                        state.resource_type,
                        RunStatus::Completed,
                    );
                    self.finish(outcome, &events).await
                } else {
                    self.drive(state, Vec::new(), handle.max_iterations, &events).await?
                }
            }
        };

        if !outcome.is_waiting() {
            self.store
                .set_resolved_run(
                    thread_id,
                    Some(ResolvedRun {
                        run_id: handle.run_id.clone(),
                        confirmation: confirmation.to_value(),
                        outcome: outcome.clone(),
                        resolved_at: Utc::now(),
                    }),
                )
                .await?;
        }
        Ok(outcome)
    }

    fn outcome(
        &self,
        state: &IterationState,
        resource_id: String,
        resource_type: ResourceType,
        status: RunStatus,
    ) -> RunOutcome {
        RunOutcome {
            task: state.task.clone(),
            result: state.result.clone(),
            resource_id,
            resource_type,
            iterations: state.iteration,
            completion_reason: state.completion_reason.clone(),
            thread_id: state.thread_id.clone(),
            status,
        }
    }

    async fn finish(&self, outcome: RunOutcome, events: &EventSink) -> RunOutcome {
        events
            .emit(NetworkEvent::LoopComplete {
                outcome: outcome.clone(),
            })
            .await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{CompletionVerdict, RoutingDecision};
    use crate::registry::DEFAULT_AGENT;
    use crate::resource::{Invocable, RegisteredResource};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use switchboard_core::thread::{InMemoryThreadStore, JsonlThreadStore};

    // ── Scripted oracles ──

    /// Pops decisions in order and repeats the last one when the script runs out.
    struct ScriptedRouter {
        script: Mutex<Vec<RoutingDecision>>,
        last: Mutex<Option<RoutingDecision>>,
        seen: Mutex<Vec<IterationState>>,
    }

    impl ScriptedRouter {
        fn new(script: Vec<RoutingDecision>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                last: Mutex::new(None),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RoutingOracle for ScriptedRouter {
        async fn select_resource(
            &self,
            state: &IterationState,
            _catalog: &[ResourceDescriptor],
            _history: &[ThreadMessage],
        ) -> Result<RoutingDecision> {
            self.seen.lock().unwrap().push(state.clone());
            let mut script = self.script.lock().unwrap();
            let mut last = self.last.lock().unwrap();
            if !script.is_empty() {
                *last = Some(script.remove(0));
            }
            last.clone()
                .ok_or_else(|| NetworkError::RoutingParse("(no more decisions)".into()))
        }
    }

    /// Pops verdicts in order; incomplete once the script runs out.
    struct ScriptedCompletion {
        script: Mutex<Vec<CompletionVerdict>>,
        calls: AtomicU32,
    }

    impl ScriptedCompletion {
        fn new(script: Vec<CompletionVerdict>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            })
        }

        fn never() -> Arc<Self> {
            Self::new(Vec::new())
        }
    }

    #[async_trait]
    impl CompletionOracle for ScriptedCompletion {
        async fn check_completion(
            &self,
            state: &IterationState,
            _history: &[ThreadMessage],
        ) -> Result<CompletionVerdict> {
            assert!(!state.is_complete);
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            Ok(if script.is_empty() {
                incomplete("")
            } else {
                script.remove(0)
            })
        }
    }

    fn pick(id: &str, kind: ResourceType, prompt: &str) -> RoutingDecision {
        RoutingDecision {
            resource_id: id.into(),
            resource_type: kind,
            prompt: prompt.into(),
            selection_reason: "scripted".into(),
        }
    }

    fn complete(final_result: &str) -> CompletionVerdict {
        CompletionVerdict {
            is_complete: true,
            completion_reason: "answered".into(),
            final_result: final_result.into(),
        }
    }

    fn incomplete(draft: &str) -> CompletionVerdict {
        CompletionVerdict {
            is_complete: false,
            completion_reason: "not yet".into(),
            final_result: draft.into(),
        }
    }

    // ── Scripted resources ──

    struct Fixed(&'static str);

    #[async_trait]
    impl Invocable for Fixed {
        async fn invoke(&self, _prompt: &str, ctx: &InvocationContext) -> anyhow::Result<ResourceOutput> {
            ctx.emit_delta(self.0).await;
            Ok(ResourceOutput::Completed(self.0.to_string()))
        }
    }

    struct Failing;

    #[async_trait]
    impl Invocable for Failing {
        async fn invoke(&self, _prompt: &str, _ctx: &InvocationContext) -> anyhow::Result<ResourceOutput> {
            anyhow::bail!("hub returned 500")
        }
    }

    struct Slow;

    #[async_trait]
    impl Invocable for Slow {
        async fn invoke(&self, _prompt: &str, _ctx: &InvocationContext) -> anyhow::Result<ResourceOutput> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ResourceOutput::Completed("late".into()))
        }
    }

    /// Suspends on invoke; counts the side effects performed on resume.
    #[derive(Default)]
    struct Confirming {
        side_effects: AtomicU32,
    }

    #[async_trait]
    impl Invocable for Confirming {
        async fn invoke(&self, _prompt: &str, _ctx: &InvocationContext) -> anyhow::Result<ResourceOutput> {
            Ok(ResourceOutput::Suspended {
                run_id: "run-1".into(),
                payload: json!({"message": "confirm? yes/no"}),
                expects: ConfirmationKind::YesNo,
            })
        }

        async fn resume(
            &self,
            handle: &PendingRunHandle,
            confirmation: &Confirmation,
            _ctx: &InvocationContext,
        ) -> anyhow::Result<ResourceOutput> {
            assert_eq!(handle.run_id, "run-1");
            self.side_effects.fetch_add(1, Ordering::SeqCst);
            Ok(ResourceOutput::Completed(match confirmation {
                Confirmation::Yes => "invites sent".into(),
                _ => "invites cancelled".into(),
            }))
        }
    }

    /// Suspends; the first resume attempt stalls, later ones confirm at once.
    #[derive(Default)]
    struct StallingConfirm {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl Invocable for StallingConfirm {
        async fn invoke(&self, _prompt: &str, _ctx: &InvocationContext) -> anyhow::Result<ResourceOutput> {
            Ok(ResourceOutput::Suspended {
                run_id: "run-1".into(),
                payload: json!({"message": "confirm? yes/no"}),
                expects: ConfirmationKind::YesNo,
            })
        }

        async fn resume(
            &self,
            _handle: &PendingRunHandle,
            _confirmation: &Confirmation,
            _ctx: &InvocationContext,
        ) -> anyhow::Result<ResourceOutput> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(ResourceOutput::Completed("invites sent".into()))
        }
    }

    /// Answers after a pause, tracking how many calls overlap.
    #[derive(Default)]
    struct Paced {
        active: AtomicU32,
        peak: AtomicU32,
        served: AtomicU32,
    }

    #[async_trait]
    impl Invocable for Paced {
        async fn invoke(&self, _prompt: &str, _ctx: &InvocationContext) -> anyhow::Result<ResourceOutput> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            let n = self.served.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(ResourceOutput::Completed(format!("answer {n}")))
        }
    }

    fn single_resource_network(
        descriptor: ResourceDescriptor,
        handler: Arc<dyn Invocable>,
        script: Vec<RoutingDecision>,
        verdicts: Arc<ScriptedCompletion>,
        store: Arc<dyn ConversationStore>,
    ) -> AgentNetwork {
        let mut registry = ResourceRegistry::new();
        registry
            .register(RegisteredResource::new(descriptor, handler))
            .unwrap();
        AgentNetwork::new(
            "order-agent-network",
            registry,
            ScriptedRouter::new(script),
            verdicts,
            store,
        )
    }

    fn invite_descriptor() -> ResourceDescriptor {
        ResourceDescriptor::new(
            "meeting-invite-workflow",
            "Sends invites",
            ResourceType::Workflow,
            json!({"type": "object"}),
        )
    }

    struct Fixture {
        network: Arc<AgentNetwork>,
        store: Arc<InMemoryThreadStore>,
        router: Arc<ScriptedRouter>,
        completion: Arc<ScriptedCompletion>,
        confirming: Arc<Confirming>,
    }

    fn fixture(script: Vec<RoutingDecision>, verdicts: Arc<ScriptedCompletion>) -> Fixture {
        let confirming = Arc::new(Confirming::default());
        let mut registry = ResourceRegistry::new();
        registry
            .register(RegisteredResource::new(
                ResourceDescriptor::agent("orderAgentSingle", "Order details"),
                Arc::new(Fixed("status: completed, date: 2024-07-23")),
            ))
            .unwrap();
        registry
            .register(RegisteredResource::new(
                ResourceDescriptor::new(
                    "meeting-invite-workflow",
                    "Sends invites",
                    ResourceType::Workflow,
                    json!({"type": "object"}),
                ),
                confirming.clone(),
            ))
            .unwrap();
        registry
            .register(RegisteredResource::new(
                ResourceDescriptor::new("get-order-list", "Lists orders", ResourceType::Tool, json!({})),
                Arc::new(Failing),
            ))
            .unwrap();
        registry
            .register(RegisteredResource::new(
                ResourceDescriptor::agent("slowAgent", "Takes forever"),
                Arc::new(Slow),
            ))
            .unwrap();
        registry
            .set_default(RegisteredResource::new(
                ResourceDescriptor::agent("generalAgent", "Fallback"),
                Arc::new(Fixed("I can help with orders.")),
            ))
            .unwrap();

        let store = Arc::new(InMemoryThreadStore::new());
        let router = ScriptedRouter::new(script);
        let network = AgentNetwork::new(
            "order-agent-network",
            registry,
            router.clone(),
            verdicts.clone(),
            store.clone(),
        )
        .with_max_iterations(10);

        Fixture {
            network: Arc::new(network),
            store,
            router,
            completion: verdicts,
            confirming,
        }
    }

    fn invite() -> RoutingDecision {
        pick(
            "meeting-invite-workflow",
            ResourceType::Workflow,
            r#"{"query": "invite bob@example.com"}"#,
        )
    }

    // ── Completion ──

    #[tokio::test]
    async fn order_question_completes_in_one_iteration() {
        let fx = fixture(
            vec![pick("orderAgentSingle", ResourceType::Agent, "Order ABC123")],
            ScriptedCompletion::new(vec![complete("Order ABC123 is completed (2024-07-23)")]),
        );

        let outcome = fx
            .network
            .run("What is the status of order ABC123?", RunOptions::thread("t1"))
            .await
            .unwrap();

        assert_eq!(outcome.result, "Order ABC123 is completed (2024-07-23)");
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.resource_id, "orderAgentSingle");
        assert_eq!(outcome.resource_type, ResourceType::Agent);
        assert_eq!(outcome.task, "What is the status of order ABC123?");
        assert_eq!(outcome.status, RunStatus::Completed);

        let thread = fx.store.load("t1").await.unwrap().unwrap();
        assert_eq!(thread.messages.len(), 2);
        assert_eq!(thread.messages[1].content, "status: completed, date: 2024-07-23");
        assert_eq!(thread.messages[1].resource.as_deref(), Some("orderAgentSingle"));
        assert_eq!(thread.resource_id, "order-agent-network");
        assert!(thread.pending_run.is_none());
    }

    #[tokio::test]
    async fn budget_exhaustion_is_a_normal_outcome() {
        let fx = fixture(
            vec![pick(DEFAULT_AGENT, ResourceType::Agent, "help")],
            ScriptedCompletion::never(),
        );

        let outcome = fx
            .network
            .run(
                "Something vague",
                RunOptions {
                    thread_id: Some("t1".into()),
                    max_iterations: Some(3),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.status, RunStatus::BudgetExhausted);
        assert_eq!(
            outcome.completion_reason.as_deref(),
            Some("Max iterations reached: 3")
        );
        assert_eq!(outcome.result, "I can help with orders.");
        assert_eq!(fx.router.calls(), 3);
        assert_eq!(fx.store.message_count("t1").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn iterations_are_monotonic_and_never_route_after_completion() {
        let fx = fixture(
            vec![pick(DEFAULT_AGENT, ResourceType::Agent, "help")],
            ScriptedCompletion::new(vec![incomplete(""), incomplete(""), complete("done")]),
        );

        let mut stream = fx.network.stream("Help me", RunOptions::default());
        let mut selected = Vec::new();
        let mut kinds = Vec::new();
        while let Some(event) = stream.next().await {
            kinds.push(event.event_type());
            if let NetworkEvent::RoutingSelected { iteration, .. } = event {
                selected.push(iteration);
            }
        }
        let outcome = stream.finish().await.unwrap();

        assert_eq!(selected, vec![1, 2, 3]);
        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.result, "done");
        assert_eq!(kinds.last(), Some(&"loop-complete"));
        assert!(kinds.contains(&"resource-output-delta"));
        assert!(kinds.contains(&"resource-finished"));

        for (i, state) in fx.router.seen.lock().unwrap().iter().enumerate() {
            assert_eq!(state.iteration, i as u32);
            assert!(!state.is_complete);
        }
    }

    #[tokio::test]
    async fn incomplete_draft_is_fed_back_to_router() {
        let fx = fixture(
            vec![pick(DEFAULT_AGENT, ResourceType::Agent, "help")],
            ScriptedCompletion::new(vec![incomplete("Need the order number."), complete("ok")]),
        );

        fx.network.run("Help", RunOptions::default()).await.unwrap();

        let seen = fx.router.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].feedback.is_none());
        assert_eq!(seen[1].feedback.as_deref(), Some("Need the order number."));
        assert_eq!(seen[1].result, "I can help with orders.");
    }

    #[tokio::test]
    async fn generate_runs_one_resource_without_verdict() {
        let fx = fixture(
            vec![pick("orderAgentSingle", ResourceType::Agent, "Order ABC123")],
            ScriptedCompletion::never(),
        );

        let outcome = fx
            .network
            .generate("Status of ABC123?", RunOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.result, "status: completed, date: 2024-07-23");
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(fx.completion.calls.load(Ordering::SeqCst), 0);

        let seen = fx.router.seen.lock().unwrap();
        assert!(seen[0].is_one_off);
        assert!(seen[0].verbose_introspection);
    }

    #[tokio::test]
    async fn message_list_input_uses_last_message_as_task() {
        let fx = fixture(
            vec![pick(DEFAULT_AGENT, ResourceType::Agent, "help")],
            ScriptedCompletion::new(vec![complete("ok")]),
        );

        let outcome = fx
            .network
            .run(
                vec![ThreadMessage::user("Hi"), ThreadMessage::user("List my orders")],
                RunOptions::thread("t1"),
            )
            .await
            .unwrap();

        assert_eq!(outcome.task, "List my orders");
        assert_eq!(fx.store.message_count("t1").await.unwrap(), 3);
    }

    // ── Failures ──

    #[tokio::test]
    async fn unknown_resource_is_terminal_and_leaves_thread_alone() {
        let fx = fixture(
            vec![pick("travelAgent", ResourceType::Agent, "Book a flight")],
            ScriptedCompletion::never(),
        );
        fx.store.get_or_create("t1", "order-agent-network").await.unwrap();
        fx.store.append("t1", ThreadMessage::user("Hi")).await.unwrap();
        fx.store
            .append("t1", ThreadMessage::assistant("Hello! How can I help?"))
            .await
            .unwrap();
        let before = fx.store.load("t1").await.unwrap().unwrap().messages;

        let err = fx
            .network
            .run("Book me a flight", RunOptions::thread("t1"))
            .await
            .unwrap_err();

        match err {
            NetworkError::UnknownResource(name) => assert_eq!(name, "travelAgent"),
            other => panic!("expected unknown resource, got {other:?}"),
        }
        let after = fx.store.load("t1").await.unwrap().unwrap().messages;
        assert_eq!(after, before);
        assert_eq!(fx.router.calls(), 1);
    }

    #[tokio::test]
    async fn failing_resource_appends_nothing() {
        let fx = fixture(
            vec![pick("get-order-list", ResourceType::Tool, "{}")],
            ScriptedCompletion::never(),
        );

        let err = fx
            .network
            .run("List orders", RunOptions::thread("t1"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "resource_execution");
        assert!(err.to_string().contains("hub returned 500"));
        assert_eq!(fx.store.message_count("t1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn none_selection_is_a_routing_error() {
        let fx = fixture(
            vec![pick("none", ResourceType::None, "")],
            ScriptedCompletion::never(),
        );

        let err = fx.network.run("Hi", RunOptions::thread("t1")).await.unwrap_err();
        assert!(matches!(err, NetworkError::RoutingParse(_)));
        assert_eq!(fx.store.message_count("t1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn registered_kind_overrides_router_label() {
        let fx = fixture(
            vec![pick("orderAgentSingle", ResourceType::Tool, "ABC123")],
            ScriptedCompletion::new(vec![complete("done")]),
        );

        let outcome = fx.network.run("ABC123?", RunOptions::default()).await.unwrap();
        assert_eq!(outcome.resource_type, ResourceType::Agent);
    }

    #[tokio::test]
    async fn run_timeout_aborts_the_call() {
        let fx = fixture(
            vec![pick("slowAgent", ResourceType::Agent, "wait")],
            ScriptedCompletion::never(),
        );
        let network = Arc::try_unwrap(fx.network)
            .ok()
            .unwrap()
            .with_run_timeout(Some(Duration::from_millis(50)));

        let err = network.run("wait", RunOptions::default()).await.unwrap_err();
        assert!(matches!(err, NetworkError::Timeout(_)));
    }

    // ── Suspend / resume ──

    #[tokio::test]
    async fn suspension_parks_a_handle_and_stops_routing() {
        let fx = fixture(vec![invite()], ScriptedCompletion::never());

        let outcome = fx
            .network
            .run("Invite bob@example.com", RunOptions::thread("t1"))
            .await
            .unwrap();

        assert!(outcome.is_waiting());
        assert_eq!(outcome.result, "confirm? yes/no");
        assert_eq!(outcome.resource_id, "meeting-invite-workflow");
        match &outcome.status {
            RunStatus::Waiting { run_id, payload } => {
                assert_eq!(run_id, "run-1");
                assert_eq!(payload["message"], "confirm? yes/no");
            }
            other => panic!("expected waiting, got {other:?}"),
        }

        let handle = fx.network.pending("t1").await.unwrap().unwrap();
        assert_eq!(handle.run_id, "run-1");
        assert_eq!(handle.iteration, 1);
        assert_eq!(handle.max_iterations, Some(10));
        assert_eq!(fx.router.calls(), 1);

        let err = fx
            .network
            .run("Something else", RunOptions::thread("t1"))
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::ThreadSuspended { .. }));
        assert_eq!(fx.router.calls(), 1);
        assert_eq!(fx.store.message_count("t1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn resume_continues_the_suspended_run() {
        let fx = fixture(
            vec![invite()],
            ScriptedCompletion::new(vec![complete("Invites sent to bob@example.com")]),
        );
        fx.network
            .run("Invite bob@example.com", RunOptions::thread("t1"))
            .await
            .unwrap();

        let outcome = fx.network.resume("t1", Confirmation::Yes).await.unwrap();

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.result, "Invites sent to bob@example.com");
        assert_eq!(outcome.iterations, 1);
        assert_eq!(fx.router.calls(), 1);
        assert!(fx.network.pending("t1").await.unwrap().is_none());

        let thread = fx.store.load("t1").await.unwrap().unwrap();
        let contents: Vec<&str> = thread.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["Invite bob@example.com", "yes", "invites sent"]);
    }

    #[tokio::test]
    async fn repeated_resume_replays_without_side_effects() {
        let fx = fixture(
            vec![invite()],
            ScriptedCompletion::new(vec![complete("Invites sent")]),
        );
        fx.network
            .run("Invite bob@example.com", RunOptions::thread("t1"))
            .await
            .unwrap();

        let first = fx.network.resume("t1", Confirmation::Yes).await.unwrap();
        let count = fx.store.message_count("t1").await.unwrap();
        let second = fx.network.resume("t1", Confirmation::Yes).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fx.confirming.side_effects.load(Ordering::SeqCst), 1);
        assert_eq!(fx.store.message_count("t1").await.unwrap(), count);

        let err = fx.network.resume("t1", Confirmation::No).await.unwrap_err();
        assert!(matches!(err, NetworkError::StaleResume(_)));
    }

    #[tokio::test]
    async fn stale_resume_changes_nothing() {
        let fx = fixture(
            vec![pick("orderAgentSingle", ResourceType::Agent, "ABC123")],
            ScriptedCompletion::new(vec![complete("done")]),
        );
        fx.network.run("ABC123?", RunOptions::thread("t1")).await.unwrap();
        let before = fx.store.load("t1").await.unwrap().unwrap();

        let err = fx.network.resume("t1", Confirmation::Yes).await.unwrap_err();
        assert!(matches!(err, NetworkError::StaleResume(ref t) if t == "t1"));

        let after = fx.store.load("t1").await.unwrap().unwrap();
        assert_eq!(after.messages, before.messages);
        assert_eq!(after.updated_at, before.updated_at);

        let err = fx.network.resume("never-seen", Confirmation::No).await.unwrap_err();
        assert!(matches!(err, NetworkError::StaleResume(_)));
        assert!(fx.store.load("never-seen").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mismatched_confirmation_keeps_handle() {
        let fx = fixture(vec![invite()], ScriptedCompletion::never());
        fx.network
            .run("Invite bob@example.com", RunOptions::thread("t1"))
            .await
            .unwrap();

        let err = fx
            .network
            .resume("t1", Confirmation::Data(json!({"date": "tomorrow"})))
            .await
            .unwrap_err();

        assert!(matches!(err, NetworkError::InvalidConfirmation(_)));
        assert!(fx.network.pending("t1").await.unwrap().is_some());
        assert_eq!(fx.confirming.side_effects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn one_off_resume_returns_resource_output() {
        let fx = fixture(vec![invite()], ScriptedCompletion::never());
        let waiting = fx
            .network
            .generate("Invite bob@example.com", RunOptions::thread("t1"))
            .await
            .unwrap();
        assert!(waiting.is_waiting());

        let outcome = fx.network.resume("t1", Confirmation::No).await.unwrap();
        assert_eq!(outcome.result, "invites cancelled");
        assert_eq!(fx.completion.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_pending_frees_the_thread() {
        let fx = fixture(
            vec![invite(), pick("orderAgentSingle", ResourceType::Agent, "ABC123")],
            ScriptedCompletion::new(vec![complete("done")]),
        );
        fx.network
            .run("Invite bob@example.com", RunOptions::thread("t1"))
            .await
            .unwrap();

        let cancelled = fx.network.cancel_pending("t1").await.unwrap();
        assert_eq!(cancelled.unwrap().run_id, "run-1");
        assert!(fx.network.cancel_pending("t1").await.unwrap().is_none());

        let outcome = fx.network.run("ABC123?", RunOptions::thread("t1")).await.unwrap();
        assert_eq!(outcome.result, "done");
    }

    #[tokio::test]
    async fn streamed_suspension_reports_waiting() {
        let fx = fixture(vec![invite()], ScriptedCompletion::never());

        let mut stream = fx.network.stream("Invite bob@example.com", RunOptions::thread("t1"));
        let mut kinds = Vec::new();
        while let Some(event) = stream.next().await {
            kinds.push(event.event_type());
        }
        let outcome = stream.finish().await.unwrap();

        assert_eq!(
            kinds,
            vec!["routing-selected", "resource-suspended", "loop-complete"]
        );
        assert!(outcome.is_waiting());
    }

    #[tokio::test]
    async fn suspended_run_survives_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let build = |confirming: Arc<Confirming>| {
            single_resource_network(
                invite_descriptor(),
                confirming,
                vec![invite()],
                ScriptedCompletion::new(vec![complete("Invites sent to bob@example.com")]),
                Arc::new(JsonlThreadStore::new(Some(dir.path().to_path_buf())).unwrap()),
            )
        };

        let first = build(Arc::new(Confirming::default()));
        let outcome = first
            .run("Invite bob@example.com", RunOptions::thread("t-persist"))
            .await
            .unwrap();
        assert!(outcome.is_waiting());
        drop(first);

        let confirming = Arc::new(Confirming::default());
        let second = build(confirming.clone());
        let pending = second.pending("t-persist").await.unwrap().unwrap();
        assert_eq!(pending.run_id, "run-1");
        assert_eq!(pending.resource_id, "meeting-invite-workflow");

        let outcome = second.resume("t-persist", Confirmation::Yes).await.unwrap();
        assert_eq!(outcome.result, "Invites sent to bob@example.com");
        assert_eq!(confirming.side_effects.load(Ordering::SeqCst), 1);
        assert!(second.pending("t-persist").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn abandoned_resume_keeps_the_run_resumable() {
        let network = single_resource_network(
            invite_descriptor(),
            Arc::new(StallingConfirm::default()),
            vec![invite()],
            ScriptedCompletion::new(vec![complete("Invites sent")]),
            Arc::new(InMemoryThreadStore::new()),
        )
        .with_run_timeout(Some(Duration::from_millis(100)));

        let waiting = network
            .run("Invite bob@example.com", RunOptions::thread("t1"))
            .await
            .unwrap();
        assert!(waiting.is_waiting());

        let err = network.resume("t1", Confirmation::Yes).await.unwrap_err();
        assert!(matches!(err, NetworkError::Timeout(_)));
        let handle = network.pending("t1").await.unwrap().unwrap();
        assert_eq!(handle.run_id, "run-1");

        let outcome = network.resume("t1", Confirmation::Yes).await.unwrap();
        assert_eq!(outcome.result, "Invites sent");
        assert!(network.pending("t1").await.unwrap().is_none());

        let thread = network.store().load("t1").await.unwrap().unwrap();
        let contents: Vec<&str> = thread.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["Invite bob@example.com", "yes", "invites sent"]);
    }

    // ── Concurrency ──

    #[tokio::test]
    async fn runs_on_one_thread_are_serialized() {
        let paced = Arc::new(Paced::default());
        let network = single_resource_network(
            ResourceDescriptor::agent("pacedAgent", "Answers slowly"),
            paced.clone(),
            vec![pick("pacedAgent", ResourceType::Agent, "answer")],
            ScriptedCompletion::new(vec![complete("a"), complete("b"), complete("c"), complete("d")]),
            Arc::new(InMemoryThreadStore::new()),
        );

        let (first, second) = tokio::join!(
            network.run("first", RunOptions::thread("t1")),
            network.run("second", RunOptions::thread("t1")),
        );
        first.unwrap();
        second.unwrap();
        assert_eq!(paced.peak.load(Ordering::SeqCst), 1);

        let thread = network.store().load("t1").await.unwrap().unwrap();
        let contents: Vec<&str> = thread.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents.len(), 4);
        assert_eq!(contents[1], "answer 1");
        assert_eq!(contents[3], "answer 2");
        let mut asked = vec![contents[0], contents[2]];
        asked.sort();
        assert_eq!(asked, vec!["first", "second"]);

        // Different threads run side by side.
        let (a, b) = tokio::join!(
            network.run("third", RunOptions::thread("t2")),
            network.run("fourth", RunOptions::thread("t3")),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(paced.peak.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn budget_zero_is_unbounded() {
        assert!(!exhausted(100, None));
        assert!(!exhausted(100, Some(0)));
        assert!(exhausted(3, Some(3)));
        assert!(!exhausted(2, Some(3)));
    }
}
