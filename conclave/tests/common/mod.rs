//! Scripted registry fixture shared by the integration tests.
#![allow(dead_code)]


use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use conclave::{
    CapabilityRegistry, Completion, ModelProfile, ModelRef, ProviderError, SendRequest, TokenUsage,
};

/// One recorded provider call.
#[derive(Debug, Clone)]
pub struct LoggedCall {
    pub model: String,
    pub prompt: String,
}

/// Registry whose models reply from scripted queues, with call logging and
/// concurrency tracking.
pub struct MockRegistry {
    profiles: Vec<ModelProfile>,
    queues: Mutex<HashMap<String, VecDeque<String>>>,
    default_replies: HashMap<String, String>,
    failing: HashSet<String>,
    unhealthy: HashSet<String>,
    usage: TokenUsage,
    delay: Duration,
    prompt_delays: Vec<(String, Duration)>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    call_log: Mutex<Vec<LoggedCall>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self {
            profiles: Vec::new(),
            queues: Mutex::new(HashMap::new()),
            default_replies: HashMap::new(),
            failing: HashSet::new(),
            unhealthy: HashSet::new(),
            usage: TokenUsage {
                input_tokens: 1_000,
                output_tokens: 500,
            },
            delay: Duration::from_millis(0),
            prompt_delays: Vec::new(),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            call_log: Mutex::new(Vec::new()),
        }
    }

    /// Register a model. Output rate doubles as the capability proxy.
    pub fn model(mut self, name: &str, output_rate: f64, proposer_eligible: bool) -> Self {
        self.profiles.push(ModelProfile {
            model: ModelRef::new(name),
            display_name: name.to_string(),
            context_window: 128_000,
            input_cost_per_million: output_rate / 5.0,
            output_cost_per_million: output_rate,
            proposer_eligible,
        });
        self
    }

    /// Fixed reply a model gives when its queue is empty.
    pub fn reply(mut self, model: &str, text: &str) -> Self {
        self.default_replies
            .insert(model.to_string(), text.to_string());
        self
    }

    /// Queue ordered replies for a model, consumed one per call.
    pub fn queue(self, model: &str, replies: &[&str]) -> Self {
        self.queues
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .extend(replies.iter().map(|r| r.to_string()));
        self
    }

    /// Every call to this model fails with a transport error.
    pub fn failing(mut self, model: &str) -> Self {
        self.failing.insert(model.to_string());
        self
    }

    /// This model fails its health check.
    pub fn unhealthy(mut self, model: &str) -> Self {
        self.unhealthy.insert(model.to_string());
        self
    }

    /// Token usage reported for every call.
    pub fn with_usage(mut self, input: u64, output: u64) -> Self {
        self.usage = TokenUsage {
            input_tokens: input,
            output_tokens: output,
        };
        self
    }

    /// Hold each call open for this long, to make overlap observable.
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    /// Hold calls whose prompt contains the needle open for this long,
    /// overriding the global delay. Lets one branch of work run slow.
    pub fn delay_when(mut self, needle: &str, ms: u64) -> Self {
        self.prompt_delays
            .push((needle.to_string(), Duration::from_millis(ms)));
        self
    }

    /// Highest number of calls ever in flight at once.
    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Every call made, in completion order.
    pub fn calls(&self) -> Vec<LoggedCall> {
        self.call_log.lock().unwrap().clone()
    }

    /// Index of the first call whose prompt contains the needle.
    pub fn first_call_containing(&self, needle: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.prompt.contains(needle))
    }

    /// Index of the last call whose prompt contains the needle.
    pub fn last_call_containing(&self, needle: &str) -> Option<usize> {
        let calls = self.calls();
        calls.iter().rposition(|c| c.prompt.contains(needle))
    }

    fn next_reply(&self, model: &str) -> String {
        if let Some(queued) = self
            .queues
            .lock()
            .unwrap()
            .get_mut(model)
            .and_then(|q| q.pop_front())
        {
            return queued;
        }
        self.default_replies
            .get(model)
            .cloned()
            .unwrap_or_else(|| format!("reply from {model}"))
    }
}

impl Default for MockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapabilityRegistry for MockRegistry {
    async fn list_models(&self) -> Vec<ModelProfile> {
        self.profiles.clone()
    }

    async fn send(
        &self,
        model: &ModelRef,
        request: SendRequest,
    ) -> Result<Completion, ProviderError> {
        if self.failing.contains(model.as_str()) {
            return Err(ProviderError::Transport {
                model: model.to_string(),
                message: "scripted failure".to_string(),
            });
        }

        let prompt = request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let delay = self
            .prompt_delays
            .iter()
            .find(|(needle, _)| prompt.contains(needle))
            .map(|(_, d)| *d)
            .unwrap_or(self.delay);

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        self.call_log.lock().unwrap().push(LoggedCall {
            model: model.to_string(),
            prompt,
        });

        Ok(Completion {
            content: self.next_reply(model.as_str()),
            usage: self.usage,
        })
    }

    async fn stream(
        &self,
        model: &ModelRef,
        request: SendRequest,
    ) -> Result<BoxStream<'static, Result<String, ProviderError>>, ProviderError> {
        let completion = self.send(model, request).await?;
        Ok(futures::stream::iter(vec![Ok(completion.content)]).boxed())
    }

    async fn health_check(&self, model: &ModelRef) -> bool {
        !self.unhealthy.contains(model.as_str())
    }
}
