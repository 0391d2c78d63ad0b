//! High-level page driver wrapping the CDP connection.
//!
//! Provides the operations passes and gatherers need: navigation, page-script
//! evaluation, call-site capture, network emulation, and trace recording.
//! The driver is cheap to clone; clones share one [`Connection`].

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use pagescope_types::{DriverConfig, Trace, TraceEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cdp::{Connection, EventWaiter, SubscriptionId};
use crate::error::{DriverError, EvaluationError};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One recorded call of a captured function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSite {
    /// Arguments of the call, as far as they survive JSON transfer.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Script URL of the outermost stack frame.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub line: u64,
    #[serde(default)]
    pub col: u64,
}

/// Target descriptor returned by the `/json/list` endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub web_socket_debugger_url: Option<String>,
}

struct TraceSession {
    subscription: SubscriptionId,
    events: Arc<Mutex<Vec<TraceEvent>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Page driver for one target.
#[derive(Clone)]
pub struct Driver {
    connection: Arc<Connection>,
    config: DriverConfig,
    trace: Arc<Mutex<Option<TraceSession>>>,
}

impl Driver {
    /// Resolve the page target behind the debugging endpoint, connect to it,
    /// and enable the `Page` and `Runtime` domains.
    pub async fn connect(config: &DriverConfig) -> Result<Self, DriverError> {
        let ws_url = resolve_page_target(config).await?;
        let connection = Connection::open(&ws_url, config.log_protocol).await?;
        let driver = Self::from_connection(connection, config.clone());
        driver.enable_domains().await?;
        Ok(driver)
    }

    /// Wrap an already-open connection.
    pub fn from_connection(connection: Connection, config: DriverConfig) -> Self {
        Self {
            connection: Arc::new(connection),
            config,
            trace: Arc::new(Mutex::new(None)),
        }
    }

    /// Enable the domains every pass relies on.
    pub async fn enable_domains(&self) -> Result<(), DriverError> {
        self.send_command("Page.enable", serde_json::json!({})).await?;
        self.send_command("Runtime.enable", serde_json::json!({})).await?;
        Ok(())
    }

    /// Close the channel. Outstanding commands fail; always succeeds locally.
    pub fn disconnect(&self) {
        tracing::info!("disconnecting from target");
        self.connection.close();
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_open()
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// The underlying connection, for direct subscription access.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value, DriverError> {
        self.connection.send_command(method, params).await
    }

    pub fn on<F>(&self, method: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.connection.on(method, callback)
    }

    pub fn off(&self, method: &str, id: SubscriptionId) -> bool {
        self.connection.off(method, id)
    }

    pub fn once(&self, method: &str) -> EventWaiter {
        self.connection.once(method)
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    /// Navigate to a URL and wait for `Page.loadEventFired`.
    pub async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let loaded = self.once("Page.loadEventFired");
        let result = self
            .send_command("Page.navigate", build_navigate_params(url))
            .await?;

        if let Some(error_text) = result.get("errorText").and_then(Value::as_str) {
            return Err(DriverError::Navigation {
                url: url.to_string(),
                reason: error_text.to_string(),
            });
        }

        let timeout = Duration::from_millis(self.config.page_load_timeout_ms);
        tokio::time::timeout(timeout, loaded.wait())
            .await
            .map_err(|_| DriverError::Timeout {
                what: format!("load event of {url}"),
                duration: timeout,
            })??;
        tracing::debug!(url, "page loaded");
        Ok(())
    }

    /// The URL the page currently shows.
    pub async fn current_url(&self) -> Result<String, DriverError> {
        let value = self
            .evaluate_async("__returnResults(window.location.href)")
            .await?;
        value.as_str().map(str::to_string).ok_or_else(|| {
            EvaluationError::InvalidResult {
                reason: format!("location.href was not a string: {value}"),
            }
            .into()
        })
    }

    /// Emulate (or stop emulating) an offline network.
    pub async fn set_offline(&self, offline: bool) -> Result<(), DriverError> {
        self.send_command("Network.enable", serde_json::json!({})).await?;
        self.send_command(
            "Network.emulateNetworkConditions",
            build_network_conditions_params(offline),
        )
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Page-script evaluation
    // -----------------------------------------------------------------------

    /// Evaluate a script in the page and wait for it to report a result.
    ///
    /// The script runs inside a native promise and reports its value by
    /// calling `__returnResults(value)`.
    pub async fn evaluate_async(&self, script: &str) -> Result<Value, DriverError> {
        let result = match self
            .send_command("Runtime.evaluate", build_evaluate_params(&wrap_in_native_promise(script)))
            .await
        {
            Ok(result) => result,
            Err(DriverError::Protocol { message, .. }) if is_context_destroyed(&message) => {
                return Err(EvaluationError::ContextDestroyed.into());
            }
            Err(e) => return Err(e),
        };
        parse_evaluate_result(&result).map_err(DriverError::from)
    }

    // -----------------------------------------------------------------------
    // Call-site capture
    // -----------------------------------------------------------------------

    /// Start recording calls to a page function on every new document.
    ///
    /// The returned collector stops recording and yields the calls, minus
    /// those made from extension scripts.
    pub async fn capture_function_call_sites(
        &self,
        function_name: &str,
    ) -> Result<CallSiteCollector, DriverError> {
        let store = call_site_store_name(function_name);
        let script = build_capture_script(function_name, &store);
        let result = self
            .send_command(
                "Page.addScriptToEvaluateOnNewDocument",
                serde_json::json!({ "source": script }),
            )
            .await?;
        let identifier = result
            .get("identifier")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        tracing::debug!(function = function_name, %identifier, "capturing call sites");
        Ok(CallSiteCollector {
            driver: self.clone(),
            function_name: function_name.to_string(),
            store,
            identifier,
        })
    }

    // -----------------------------------------------------------------------
    // Tracing
    // -----------------------------------------------------------------------

    /// Start recording a trace with the given categories.
    pub async fn begin_trace(&self, categories: &[String]) -> Result<(), DriverError> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let subscription = self.on("Tracing.dataCollected", move |params| {
            let Some(batch) = params.get("value").and_then(Value::as_array) else {
                return;
            };
            let mut events = lock(&sink);
            for raw in batch {
                match serde_json::from_value::<TraceEvent>(raw.clone()) {
                    Ok(event) => events.push(event),
                    Err(e) => tracing::debug!(error = %e, "skipping undecodable trace event"),
                }
            }
        });

        let previous = lock(&self.trace).replace(TraceSession {
            subscription,
            events,
        });
        if let Some(previous) = previous {
            tracing::warn!("trace already in progress, discarding it");
            self.off("Tracing.dataCollected", previous.subscription);
        }

        self.send_command("Tracing.start", build_tracing_start_params(categories))
            .await?;
        tracing::debug!(categories = categories.len(), "tracing started");
        Ok(())
    }

    /// Stop recording and return the collected trace.
    pub async fn end_trace(&self) -> Result<Trace, DriverError> {
        let session = lock(&self.trace).take().ok_or_else(|| DriverError::Protocol {
            method: "Tracing.end".to_string(),
            code: -1,
            message: "no trace in progress".to_string(),
        })?;

        let complete = self.once("Tracing.tracingComplete");
        let ended = self.send_command("Tracing.end", serde_json::json!({})).await;
        let waited = match ended {
            Ok(_) => complete.wait().await.map(|_| ()),
            Err(e) => Err(e),
        };
        self.off("Tracing.dataCollected", session.subscription);
        waited?;

        let events = std::mem::take(&mut *lock(&session.events));
        tracing::debug!(events = events.len(), "tracing complete");
        Ok(Trace::new(events))
    }
}

/// Handle returned by [`Driver::capture_function_call_sites`].
pub struct CallSiteCollector {
    driver: Driver,
    function_name: String,
    store: String,
    identifier: String,
}

impl CallSiteCollector {
    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    /// Stop collecting, remove the injected script, and return the calls.
    pub async fn collect(self) -> Result<Vec<CallSite>, DriverError> {
        let script = format!(
            "window['{store}Stopped'] = true;\n\
             __returnResults(Array.from(window['{store}'] || []).map(item => JSON.parse(item)));",
            store = self.store
        );
        let value = self.driver.evaluate_async(&script).await;

        if !self.identifier.is_empty() {
            if let Err(e) = self
                .driver
                .send_command(
                    "Page.removeScriptToEvaluateOnNewDocument",
                    serde_json::json!({ "identifier": self.identifier }),
                )
                .await
            {
                if e.is_channel_error() {
                    return Err(e);
                }
                tracing::debug!(error = %e, "failed to remove call-site capture script");
            }
        }

        let sites: Vec<CallSite> = serde_json::from_value(value?).map_err(|e| {
            EvaluationError::InvalidResult {
                reason: format!("call sites for {}: {e}", self.function_name),
            }
        })?;
        Ok(filter_extension_call_sites(sites))
    }
}

// ---------------------------------------------------------------------------
// Endpoint discovery
// ---------------------------------------------------------------------------

/// Find the WebSocket URL of a page target, creating one if none exists.
pub async fn resolve_page_target(config: &DriverConfig) -> Result<String, DriverError> {
    let base = config.http_base();
    let connection_error = |reason: String| DriverError::Connection {
        endpoint: base.clone(),
        reason,
    };

    let client = reqwest::Client::new();
    let targets: Vec<TargetInfo> = client
        .get(format!("{base}/json/list"))
        .send()
        .await
        .map_err(|e| connection_error(format!("target list request failed: {e}")))?
        .json()
        .await
        .map_err(|e| connection_error(format!("invalid target list: {e}")))?;

    if let Some(ws) = select_page_target(&targets) {
        return Ok(ws);
    }

    tracing::info!(endpoint = %base, "no page target found, opening a new tab");
    let created: TargetInfo = client
        .put(format!("{base}/json/new"))
        .send()
        .await
        .map_err(|e| connection_error(format!("new target request failed: {e}")))?
        .json()
        .await
        .map_err(|e| connection_error(format!("invalid new target response: {e}")))?;
    created
        .web_socket_debugger_url
        .ok_or_else(|| connection_error("new target has no WebSocket URL".to_string()))
}

/// First target of type `page` that exposes a WebSocket URL.
pub fn select_page_target(targets: &[TargetInfo]) -> Option<String> {
    targets
        .iter()
        .filter(|t| t.kind == "page")
        .find_map(|t| t.web_socket_debugger_url.clone())
}

// ---------------------------------------------------------------------------
// CDP parameter builders and result parsing
// ---------------------------------------------------------------------------

pub fn build_navigate_params(url: &str) -> Value {
    serde_json::json!({ "url": url })
}

pub fn build_evaluate_params(expression: &str) -> Value {
    serde_json::json!({
        "expression": expression,
        "includeCommandLineAPI": true,
        "awaitPromise": true,
        "returnByValue": true,
    })
}

pub fn build_network_conditions_params(offline: bool) -> Value {
    serde_json::json!({
        "offline": offline,
        "latency": 0,
        "downloadThroughput": -1,
        "uploadThroughput": -1,
    })
}

pub fn build_tracing_start_params(categories: &[String]) -> Value {
    serde_json::json!({
        "categories": categories.join(","),
        "transferMode": "ReportEvents",
        "options": "sampling-frequency=10000",
    })
}

/// Wrap a script so it runs inside a native promise with `__returnResults`
/// in scope. Pages that replace `window.Promise` do not affect the wrapper.
pub fn wrap_in_native_promise(script: &str) -> String {
    format!(
        "(function wrapInNativePromise() {{\n\
         \x20 const __nativePromise = window.__nativePromise || Promise;\n\
         \x20 return new __nativePromise(function (resolve) {{\n\
         \x20   const __returnResults = resolve;\n\
         \x20   {script}\n\
         \x20 }});\n\
         }}())"
    )
}

fn is_context_destroyed(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("context was destroyed") || lower.contains("cannot find context")
}

/// Extract the value of a `Runtime.evaluate` result.
pub fn parse_evaluate_result(result: &Value) -> Result<Value, EvaluationError> {
    if let Some(exception) = result.get("exceptionDetails") {
        let message = exception
            .get("exception")
            .and_then(|e| e.get("description"))
            .and_then(Value::as_str)
            .or_else(|| exception.get("text").and_then(Value::as_str))
            .unwrap_or("unknown exception")
            .to_string();
        if is_context_destroyed(&message) {
            return Err(EvaluationError::ContextDestroyed);
        }
        return Err(EvaluationError::Threw { message });
    }

    let remote = result.get("result").ok_or_else(|| EvaluationError::InvalidResult {
        reason: "missing result object".to_string(),
    })?;
    match remote.get("value") {
        Some(value) => Ok(value.clone()),
        None if remote.get("type").and_then(Value::as_str) == Some("undefined") => Ok(Value::Null),
        None => Err(EvaluationError::InvalidResult {
            reason: format!(
                "{} could not be returned by value",
                remote
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("result")
            ),
        }),
    }
}

/// Page-global name holding the captured calls of `function_name`.
pub fn call_site_store_name(function_name: &str) -> String {
    let sanitized: String = function_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("__{sanitized}CallSites")
}

/// Script that replaces `function_name` with a recording wrapper.
///
/// Each call records its arguments and the outermost stack frame into a
/// page-global set of JSON strings, until the `...Stopped` flag is set.
pub fn build_capture_script(function_name: &str, store: &str) -> String {
    format!(
        r#"(function () {{
  const store = window['{store}'] = new Set();
  const original = {function_name};
  if (typeof original !== 'function') return;
  {function_name} = function () {{
    if (!window['{store}Stopped']) {{
      const args = Array.from(arguments).map(arg => {{
        try {{ JSON.stringify(arg); return arg; }} catch (e) {{ return String(arg); }}
      }});
      const originalPrepare = Error.prepareStackTrace;
      Error.prepareStackTrace = function (error, frames) {{
        const last = frames[frames.length - 1];
        return {{
          url: last.getFileName() || '',
          line: last.getLineNumber() || 0,
          col: last.getColumnNumber() || 0,
        }};
      }};
      const site = new Error().stack;
      Error.prepareStackTrace = originalPrepare;
      site.args = args;
      store.add(JSON.stringify(site));
    }}
    return original.apply(this, arguments);
  }};
}})();"#
    )
}

pub fn is_extension_url(url: &str) -> bool {
    url.starts_with("chrome-extension://") || url.starts_with("extensions::")
}

pub fn filter_extension_call_sites(sites: Vec<CallSite>) -> Vec<CallSite> {
    sites.into_iter().filter(|s| !is_extension_url(&s.url)).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn site(url: &str) -> CallSite {
        CallSite {
            args: vec![Value::String("DOMNodeInserted".into())],
            url: url.to_string(),
            line: 3,
            col: 14,
        }
    }

    #[test]
    fn evaluate_params_await_and_return_by_value() {
        let params = build_evaluate_params("1 + 1");
        assert_eq!(params["expression"], "1 + 1");
        assert_eq!(params["returnByValue"], true);
        assert_eq!(params["awaitPromise"], true);
    }

    #[test]
    fn wrapper_exposes_return_results() {
        let wrapped = wrap_in_native_promise("__returnResults(42);");
        assert!(wrapped.starts_with("(function wrapInNativePromise()"));
        assert!(wrapped.contains("const __returnResults = resolve;"));
        assert!(wrapped.contains("__returnResults(42);"));
        assert!(wrapped.ends_with("}())"));
    }

    #[test]
    fn tracing_start_joins_categories() {
        let cats = vec!["-*".to_string(), "toplevel".to_string()];
        let params = build_tracing_start_params(&cats);
        assert_eq!(params["categories"], "-*,toplevel");
        assert_eq!(params["transferMode"], "ReportEvents");
    }

    #[test]
    fn network_conditions() {
        assert_eq!(build_network_conditions_params(true)["offline"], true);
        assert_eq!(build_network_conditions_params(false)["offline"], false);
    }

    #[test]
    fn parse_value_result() {
        let result = serde_json::json!({"result": {"type": "number", "value": 42}});
        assert_eq!(parse_evaluate_result(&result).unwrap(), 42);

        let undefined = serde_json::json!({"result": {"type": "undefined"}});
        assert_eq!(parse_evaluate_result(&undefined).unwrap(), Value::Null);
    }

    #[test]
    fn parse_exception_result() {
        let result = serde_json::json!({
            "result": {"type": "object", "subtype": "error"},
            "exceptionDetails": {
                "text": "Uncaught",
                "exception": {"description": "ReferenceError: foo is not defined"}
            }
        });
        assert_eq!(
            parse_evaluate_result(&result).unwrap_err(),
            EvaluationError::Threw {
                message: "ReferenceError: foo is not defined".into()
            }
        );
    }

    #[test]
    fn parse_destroyed_context() {
        let result = serde_json::json!({
            "exceptionDetails": {"text": "Execution context was destroyed."}
        });
        assert_eq!(
            parse_evaluate_result(&result).unwrap_err(),
            EvaluationError::ContextDestroyed
        );
    }

    #[test]
    fn parse_unserializable_result() {
        let result = serde_json::json!({"result": {"type": "object", "description": "Window"}});
        assert!(matches!(
            parse_evaluate_result(&result),
            Err(EvaluationError::InvalidResult { .. })
        ));
    }

    #[test]
    fn store_name_is_a_valid_identifier() {
        assert_eq!(
            call_site_store_name("document.addEventListener"),
            "__document_addEventListenerCallSites"
        );
        assert_eq!(call_site_store_name("addEventListener"), "__addEventListenerCallSites");
    }

    #[test]
    fn capture_script_wraps_named_function() {
        let script = build_capture_script("document.addEventListener", "__store");
        assert!(script.contains("const original = document.addEventListener;"));
        assert!(script.contains("document.addEventListener = function ()"));
        assert!(script.contains("window['__storeStopped']"));
    }

    #[test]
    fn extension_call_sites_are_dropped() {
        let sites = vec![
            site("https://example.com/app.js"),
            site("chrome-extension://abcdef/content.js"),
            site("extensions::SafeBuiltins"),
            site("https://cdn.example.com/lib.js"),
        ];
        let kept = filter_extension_call_sites(sites);
        let urls: Vec<&str> = kept.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com/app.js", "https://cdn.example.com/lib.js"]);
    }

    #[test]
    fn call_site_decodes_with_missing_fields() {
        let decoded: CallSite =
            serde_json::from_value(serde_json::json!({"url": "https://a.test/x.js", "line": 9})).unwrap();
        assert!(decoded.args.is_empty());
        assert_eq!(decoded.line, 9);
        assert_eq!(decoded.col, 0);
    }

    #[test]
    fn selects_first_page_target() {
        let targets: Vec<TargetInfo> = serde_json::from_value(serde_json::json!([
            {"id": "1", "type": "service_worker", "url": "x", "webSocketDebuggerUrl": "ws://sw"},
            {"id": "2", "type": "page", "url": "about:blank"},
            {"id": "3", "type": "page", "url": "about:blank", "webSocketDebuggerUrl": "ws://page3"},
            {"id": "4", "type": "page", "url": "about:blank", "webSocketDebuggerUrl": "ws://page4"}
        ]))
        .unwrap();
        assert_eq!(select_page_target(&targets).as_deref(), Some("ws://page3"));
        assert_eq!(select_page_target(&targets[..2]), None);
    }
}
