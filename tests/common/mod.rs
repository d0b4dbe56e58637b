#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use warden::config::Config;
use warden::core::errors::WardenError;
use warden::core::models::JsonRpcError;
use warden::guard::client::{GuardCall, GuardResponse, GuardTransport};
use warden::guard::gateway::GuardGateway;
use warden::mcp::upstream::UpstreamPeer;
use warden::proxy::pipeline::ToolCallPipeline;

/// Scripted guard transport: pops one pre-programmed response per call and
/// records every submission for inspection.
pub struct ScriptedGuard {
    script: Mutex<VecDeque<Result<GuardResponse, String>>>,
    calls: Mutex<Vec<GuardCall>>,
}

impl ScriptedGuard {
    pub fn new(script: Vec<Result<GuardResponse, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded(&self) -> Vec<GuardCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.recorded().iter().map(|c| c.event_type.clone()).collect()
    }
}

#[async_trait]
impl GuardTransport for ScriptedGuard {
    async fn submit(&self, call: &GuardCall) -> Result<GuardResponse, WardenError> {
        self.calls.lock().unwrap().push(call.clone());
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(WardenError::GuardTransport(message)),
            None => panic!("guard transport called more times than scripted"),
        }
    }
}

pub fn allow() -> Result<GuardResponse, String> {
    Ok(response(json!({"blocked": false, "transformed": false})))
}

pub fn block(extra: Value) -> Result<GuardResponse, String> {
    let mut result = json!({"blocked": true});
    if let (Some(target), Value::Object(extra)) = (result.as_object_mut(), extra) {
        for (key, value) in extra {
            target.insert(key, value);
        }
    }
    Ok(response(result))
}

pub fn transform(content: &str) -> Result<GuardResponse, String> {
    Ok(response(json!({
        "transformed": true,
        "guard_output": {"messages": [{"role": "user", "content": content}]},
    })))
}

pub fn failure(status: &str) -> Result<GuardResponse, String> {
    Ok(serde_json::from_value(json!({"status": status})).unwrap())
}

pub fn unreachable_guard() -> Result<GuardResponse, String> {
    Err("connection refused".to_string())
}

fn response(result: Value) -> GuardResponse {
    serde_json::from_value(json!({"status": "Success", "result": result})).unwrap()
}

/// Scripted upstream peer: canned result per method, every request recorded.
pub struct FakeUpstream {
    results: Mutex<HashMap<String, Value>>,
    requests: Mutex<Vec<(String, Option<Value>)>>,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn respond_to(self, method: &str, result: Value) -> Self {
        self.results.lock().unwrap().insert(method.to_string(), result);
        self
    }

    pub fn recorded(&self) -> Vec<(String, Option<Value>)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<Option<Value>> {
        self.recorded()
            .into_iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params)
            .collect()
    }
}

#[async_trait]
impl UpstreamPeer for FakeUpstream {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, WardenError> {
        self.requests
            .lock()
            .unwrap()
            .push((method.to_string(), params));
        match self.results.lock().unwrap().get(method) {
            Some(result) => Ok(result.clone()),
            None => Err(WardenError::Upstream(JsonRpcError {
                code: -32601,
                message: format!("method '{}' not found", method),
                data: None,
            })),
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), WardenError> {
        self.requests
            .lock()
            .unwrap()
            .push((format!("notify:{}", method), params));
        Ok(())
    }
}

pub fn pipeline_with(guard: Arc<ScriptedGuard>, upstream: Arc<FakeUpstream>) -> ToolCallPipeline {
    let config = Config::default();
    let gateway = GuardGateway::new(guard, &config, "upstream-tool".to_string());
    ToolCallPipeline::new(upstream, gateway)
}
