//! In-memory mock target for tests (feature `test-support`).
//!
//! A [`MockTarget`] answers the driver's commands from a table of scripted
//! handlers, so driver, gatherer and orchestrator code can run without a
//! browser. Unscripted commands succeed with an empty result, navigation
//! fires `Page.loadEventFired`, and `Tracing.end` replays the configured
//! trace events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use pagescope_types::{DriverConfig, TraceEvent};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::cdp::Connection;
use crate::driver::Driver;

type Handler = Box<dyn FnMut(&Value) -> MockReply + Send>;

/// A command the mock received.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCommand {
    pub id: u64,
    pub method: String,
    pub params: Value,
}

/// How the mock answers one command.
#[derive(Debug, Clone)]
pub struct MockReply {
    outcome: Option<Result<Value, (i64, String)>>,
    events: Vec<(String, Value)>,
}

impl MockReply {
    /// Respond with a raw `result` object.
    pub fn ok(result: Value) -> Self {
        Self {
            outcome: Some(Ok(result)),
            events: Vec::new(),
        }
    }

    /// Respond to `Runtime.evaluate` with a by-value result.
    pub fn value(value: Value) -> Self {
        Self::ok(serde_json::json!({ "result": { "type": "object", "value": value } }))
    }

    /// Respond to `Runtime.evaluate` as if the script threw.
    pub fn exception(description: &str) -> Self {
        Self::ok(serde_json::json!({
            "result": { "type": "object", "subtype": "error" },
            "exceptionDetails": {
                "text": "Uncaught",
                "exception": { "description": description }
            }
        }))
    }

    /// Respond with a protocol error.
    pub fn error(code: i64, message: &str) -> Self {
        Self {
            outcome: Some(Err((code, message.to_string()))),
            events: Vec::new(),
        }
    }

    /// Never respond.
    pub fn silent() -> Self {
        Self {
            outcome: None,
            events: Vec::new(),
        }
    }

    /// Emit an event after the response.
    #[must_use]
    pub fn then_emit(mut self, method: &str, params: Value) -> Self {
        self.events.push((method.to_string(), params));
        self
    }
}

/// Builder for a [`MockTarget`].
pub struct MockTargetBuilder {
    handlers: HashMap<String, Handler>,
    evaluate_routes: Vec<(String, Handler)>,
    trace_events: Vec<TraceEvent>,
    config: DriverConfig,
}

impl MockTargetBuilder {
    /// Script the answer to every call of `method`.
    #[must_use]
    pub fn on_command<F>(mut self, method: &str, handler: F) -> Self
    where
        F: FnMut(&Value) -> MockReply + Send + 'static,
    {
        self.handlers.insert(method.to_string(), Box::new(handler));
        self
    }

    /// Script the answer to `Runtime.evaluate` calls whose expression
    /// contains `needle`. The most recently registered matching route wins.
    #[must_use]
    pub fn on_evaluate<F>(mut self, needle: &str, handler: F) -> Self
    where
        F: FnMut(&Value) -> MockReply + Send + 'static,
    {
        self.evaluate_routes.push((needle.to_string(), Box::new(handler)));
        self
    }

    /// Events delivered through `Tracing.dataCollected` when a trace ends.
    #[must_use]
    pub fn with_trace_events(mut self, events: Vec<TraceEvent>) -> Self {
        self.trace_events = events;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    /// Spawn the mock and return a driver connected to it.
    ///
    /// Must be called from within a tokio runtime. Keep the returned
    /// [`MockTarget`] alive: dropping it disconnects the driver.
    pub fn start(self) -> (Driver, MockTarget) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = oneshot::channel();
        let log = Arc::new(Mutex::new(Vec::new()));

        let responder = Responder {
            handlers: self.handlers,
            evaluate_routes: self.evaluate_routes,
            trace_events: self.trace_events,
            url: "about:blank".to_string(),
            next_script: 1,
        };
        let task = tokio::spawn(responder.run(out_rx, in_tx.clone(), kill_rx, Arc::clone(&log)));

        let connection = Connection::from_channels(out_tx, in_rx, self.config.log_protocol);
        let driver = Driver::from_connection(connection, self.config);
        let target = MockTarget {
            log,
            inbound: in_tx,
            kill: Some(kill_tx),
            task,
        };
        (driver, target)
    }
}

/// Handle to a running mock target.
pub struct MockTarget {
    log: Arc<Mutex<Vec<RecordedCommand>>>,
    inbound: mpsc::UnboundedSender<String>,
    kill: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl MockTarget {
    pub fn builder() -> MockTargetBuilder {
        MockTargetBuilder {
            handlers: HashMap::new(),
            evaluate_routes: Vec::new(),
            trace_events: Vec::new(),
            config: DriverConfig {
                page_load_timeout_ms: 5_000,
                ..DriverConfig::default()
            },
        }
    }

    /// Every command received so far, in arrival order.
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Method names of every command received so far.
    pub fn methods(&self) -> Vec<String> {
        self.commands().into_iter().map(|c| c.method).collect()
    }

    /// Push an event to the driver.
    pub fn emit(&self, method: &str, params: Value) {
        let _ = self
            .inbound
            .send(serde_json::json!({ "method": method, "params": params }).to_string());
    }

    /// Push a raw frame (for example a chunk fragment) to the driver.
    pub fn send_raw(&self, frame: String) {
        let _ = self.inbound.send(frame);
    }

    /// Simulate the target going away: the driver sees the channel close.
    pub async fn drop_connection(mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
        let MockTarget { inbound, task, .. } = self;
        drop(inbound);
        let _ = task.await;
    }
}

struct Responder {
    handlers: HashMap<String, Handler>,
    evaluate_routes: Vec<(String, Handler)>,
    trace_events: Vec<TraceEvent>,
    url: String,
    next_script: u64,
}

impl Responder {
    async fn run(
        mut self,
        mut outbound: mpsc::UnboundedReceiver<String>,
        inbound: mpsc::UnboundedSender<String>,
        mut kill: oneshot::Receiver<()>,
        log: Arc<Mutex<Vec<RecordedCommand>>>,
    ) {
        loop {
            let frame = tokio::select! {
                _ = &mut kill => break,
                frame = outbound.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };
            let Ok(command) = serde_json::from_str::<Value>(&frame) else {
                continue;
            };
            let recorded = RecordedCommand {
                id: command.get("id").and_then(Value::as_u64).unwrap_or(0),
                method: command
                    .get("method")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                params: command.get("params").cloned().unwrap_or(Value::Null),
            };
            if let Ok(mut log) = log.lock() {
                log.push(recorded.clone());
            }

            let reply = self.reply(&recorded);
            if let Some(outcome) = reply.outcome {
                let message = match outcome {
                    Ok(result) => serde_json::json!({ "id": recorded.id, "result": result }),
                    Err((code, message)) => serde_json::json!({
                        "id": recorded.id,
                        "error": { "code": code, "message": message }
                    }),
                };
                if inbound.send(message.to_string()).is_err() {
                    break;
                }
            }
            for (method, params) in reply.events {
                let event = serde_json::json!({ "method": method, "params": params });
                if inbound.send(event.to_string()).is_err() {
                    break;
                }
            }
        }
    }

    fn reply(&mut self, command: &RecordedCommand) -> MockReply {
        if command.method == "Page.navigate" {
            if let Some(url) = command.params.get("url").and_then(Value::as_str) {
                self.url = url.to_string();
            }
        }

        if let Some(handler) = self.handlers.get_mut(&command.method) {
            return handler(&command.params);
        }

        match command.method.as_str() {
            "Runtime.evaluate" => self.evaluate(&command.params),
            "Page.navigate" => MockReply::ok(serde_json::json!({ "frameId": "mock-frame" }))
                .then_emit("Page.loadEventFired", serde_json::json!({ "timestamp": 1.0 })),
            "Page.addScriptToEvaluateOnNewDocument" => {
                let identifier = self.next_script.to_string();
                self.next_script += 1;
                MockReply::ok(serde_json::json!({ "identifier": identifier }))
            }
            "Tracing.end" => {
                let events = serde_json::to_value(&self.trace_events).unwrap_or(Value::Null);
                MockReply::ok(serde_json::json!({}))
                    .then_emit("Tracing.dataCollected", serde_json::json!({ "value": events }))
                    .then_emit("Tracing.tracingComplete", serde_json::json!({}))
            }
            _ => MockReply::ok(serde_json::json!({})),
        }
    }

    fn evaluate(&mut self, params: &Value) -> MockReply {
        let expression = params
            .get("expression")
            .and_then(Value::as_str)
            .unwrap_or_default();
        for (needle, handler) in self.evaluate_routes.iter_mut().rev() {
            if expression.contains(needle.as_str()) {
                return handler(params);
            }
        }
        if expression.contains("window.location.href") {
            return MockReply::value(Value::String(self.url.clone()));
        }
        MockReply::ok(serde_json::json!({ "result": { "type": "undefined" } }))
    }
}
