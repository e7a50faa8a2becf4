#![allow(dead_code)]

use dapbridge::config::AdapterConfig;
use dapbridge::dap::protocol::{DapRequest, Inbound};
use dapbridge::dap::session::{Flow, Session};
use dapbridge::dap::transport::MessageWriter;
use dapbridge::engine::script::{Scenario, ScriptedEngine};
use dapbridge::engine::Engine;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};

pub const CLIENT_SOURCE: &str = "/home/dev/demo/src/main.c";

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn demo_scenario() -> Scenario {
    Scenario::from_file(&fixture("demo.toml")).unwrap()
}

/// Collects every message the session sends.
#[derive(Clone, Default)]
pub struct RecordingWriter {
    messages: Arc<Mutex<Vec<Value>>>,
    broken: Arc<Mutex<bool>>,
}

impl RecordingWriter {
    pub fn messages(&self) -> Vec<Value> {
        self.messages.lock().unwrap().clone()
    }

    /// Fail every following write.
    pub fn break_pipe(&self) {
        *self.broken.lock().unwrap() = true;
    }
}

impl MessageWriter for RecordingWriter {
    fn write_message(&mut self, message: &Value) -> anyhow::Result<()> {
        if *self.broken.lock().unwrap() {
            anyhow::bail!("broken pipe");
        }
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// In-process client of a [`Session`] driven by the scripted engine.
pub struct Harness {
    session: Session,
    inbound: Receiver<Inbound>,
    pub writer: RecordingWriter,
    pub flow: Flow,
    next_seq: i64,
    seen: usize,
}

impl Harness {
    pub fn new(scenario: Scenario) -> Self {
        Self::with_config(scenario, AdapterConfig::default())
    }

    pub fn with_config(scenario: Scenario, config: AdapterConfig) -> Self {
        let (queue, inbound) = mpsc::channel();
        let writer = RecordingWriter::default();
        let session = Session::new(
            config,
            Box::new(move || {
                let engine: Box<dyn Engine> = Box::new(ScriptedEngine::new(scenario.clone()));
                Ok(engine)
            }),
            Box::new(writer.clone()),
            queue,
        );
        Self {
            session,
            inbound,
            writer,
            flow: Flow::Continue,
            next_seq: 1,
            seen: 0,
        }
    }

    /// Feed a message and everything it enqueued (engine events, logs) to the session.
    pub fn feed(&mut self, message: Inbound) -> anyhow::Result<Flow> {
        let mut flow = self.session.handle(message)?;
        while flow == Flow::Continue {
            match self.inbound.try_recv() {
                Ok(next) => flow = self.session.handle(next)?,
                Err(_) => break,
            }
        }
        self.flow = flow;
        Ok(flow)
    }

    /// Send a request without waiting for its response, return its sequence number.
    pub fn send(&mut self, command: &str, arguments: Value) -> i64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        let req: DapRequest = serde_json::from_value(json!({
            "seq": seq,
            "type": "request",
            "command": command,
            "arguments": arguments,
        }))
        .unwrap();
        self.feed(Inbound::Request(req)).unwrap();
        seq
    }

    pub fn response(&self, seq: i64) -> Option<Value> {
        self.writer
            .messages()
            .into_iter()
            .find(|m| m["type"] == "response" && m["request_seq"] == seq)
    }

    /// Send a request, return its response.
    pub fn request(&mut self, command: &str, arguments: Value) -> Value {
        let seq = self.send(command, arguments);
        self.response(seq)
            .unwrap_or_else(|| panic!("no response to `{command}`"))
    }

    /// Successful response body.
    pub fn body(&mut self, command: &str, arguments: Value) -> Value {
        let rsp = self.request(command, arguments);
        assert_eq!(rsp["success"], true, "`{command}` failed: {rsp}");
        rsp["body"].clone()
    }

    /// Messages sent since the previous call.
    pub fn take(&mut self) -> Vec<Value> {
        let messages = self.writer.messages();
        let new = messages[self.seen..].to_vec();
        self.seen = messages.len();
        new
    }

    /// Events sent since the previous [`Harness::take`] with the given name.
    pub fn take_events(&mut self, name: &str) -> Vec<Value> {
        self.take()
            .into_iter()
            .filter(|m| m["type"] == "event" && m["event"] == name)
            .collect()
    }

    pub fn initialize(&mut self) -> Value {
        self.body(
            "initialize",
            json!({
                "adapterID": "dapbridge",
                "clientName": "test",
                "linesStartAt1": true,
                "columnsStartAt1": true,
            }),
        )
    }

    /// Initialize and launch the demo program with the client source tree mapping.
    /// The launch response is deferred until `configurationDone`, its sequence is returned.
    pub fn launch(&mut self, extra: Value) -> i64 {
        self.initialize();
        let mut args = json!({
            "program": "/opt/demo/bin/demo",
            "pathMappings": [{"local": "/home/dev/demo", "remote": "/build"}],
        });
        if let (Some(args), Some(extra)) = (args.as_object_mut(), extra.as_object()) {
            args.extend(extra.clone());
        }
        self.send("launch", args)
    }

    /// Launch with breakpoints at `lines` and run to the first stop.
    pub fn run_to(&mut self, lines: &[i64]) {
        self.launch(json!({}));
        let breakpoints: Vec<_> = lines.iter().map(|l| json!({"line": l})).collect();
        self.body(
            "setBreakpoints",
            json!({"source": {"path": CLIENT_SOURCE}, "breakpoints": breakpoints}),
        );
        self.body("configurationDone", json!({}));
    }

    pub fn top_frame(&mut self) -> Value {
        let trace = self.body("stackTrace", json!({"threadId": 1}));
        trace["stackFrames"][0].clone()
    }

    /// References of the scopes of the top frame.
    pub fn scopes(&mut self) -> Vec<i64> {
        let frame = self.top_frame();
        let body = self.body("scopes", json!({"frameId": frame["id"]}));
        body["scopes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["variablesReference"].as_i64().unwrap())
            .collect()
    }

    pub fn variables(&mut self, reference: i64) -> Vec<Value> {
        let body = self.body("variables", json!({"variablesReference": reference}));
        body["variables"].as_array().unwrap().clone()
    }
}
