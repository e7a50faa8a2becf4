mod common;

use common::{demo_scenario, Harness, CLIENT_SOURCE};
use dapbridge::config::AdapterConfig;
use dapbridge::dap::protocol::Inbound;
use dapbridge::dap::session::Flow;
use serde_json::{json, Value};

fn names(variables: &[Value]) -> Vec<&str> {
    variables
        .iter()
        .map(|v| v["name"].as_str().unwrap())
        .collect()
}

fn find<'a>(variables: &'a [Value], name: &str) -> &'a Value {
    variables
        .iter()
        .find(|v| v["name"] == name)
        .unwrap_or_else(|| panic!("no variable {name}"))
}

fn position(messages: &[Value], pred: impl Fn(&Value) -> bool) -> usize {
    messages
        .iter()
        .position(pred)
        .expect("message not found")
}

#[test]
fn test_requests_before_initialize() {
    let mut h = Harness::new(demo_scenario());

    let rsp = h.request("launch", json!({"program": "/opt/demo/bin/demo"}));
    assert_eq!(rsp["success"], false);
    assert_eq!(
        rsp["message"],
        "No `initialize` request was sent before `launch`."
    );

    h.initialize();
    let rsp = h.request("configurationDone", json!({}));
    assert_eq!(rsp["success"], false);
    assert_eq!(
        rsp["message"],
        "No `launch` or `attach` request was sent before `configurationDone`."
    );

    let rsp = h.request("initialize", json!({"adapterID": "dapbridge"}));
    assert_eq!(rsp["success"], false);
}

#[test]
fn test_capabilities() {
    let mut h = Harness::new(demo_scenario());
    let caps = h.initialize();

    assert_eq!(caps["supportsConfigurationDoneRequest"], true);
    assert_eq!(caps["supportsConditionalBreakpoints"], true);
    assert_eq!(caps["supportsReadMemoryRequest"], true);
    let filters: Vec<_> = caps["exceptionBreakpointFilters"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["filter"].as_str().unwrap())
        .collect();
    assert_eq!(
        filters,
        vec!["cpp_throw", "cpp_catch", "objc_throw", "objc_catch", "swift_throw"]
    );
}

#[test]
fn test_launch_payload_errors() {
    let mut h = Harness::new(demo_scenario());
    h.initialize();

    let rsp = h.request("launch", json!({"stopOnEntry": true}));
    assert_eq!(rsp["success"], false);
    assert_eq!(rsp["message"], "missing required field `program`");

    let rsp = h.request("launch", json!({"program": 7}));
    assert_eq!(
        rsp["message"],
        "field `program` has a wrong type, string expected"
    );

    let rsp = h.request(
        "launch",
        json!({"program": "/opt/demo/bin/demo", "arch": "sparc"}),
    );
    assert_eq!(rsp["success"], false);
    assert!(rsp["message"]
        .as_str()
        .unwrap()
        .starts_with("unknown architecture `sparc`"));

    let rsp = h.request("launch", json!({"program": "/opt/other"}));
    assert_eq!(
        rsp["message"],
        "unable to find executable for '/opt/other'"
    );
}

#[test]
fn test_launch_to_breakpoint() {
    let mut h = Harness::new(demo_scenario());
    let launch = h.launch(json!({}));
    assert!(h.response(launch).is_none());
    assert_eq!(h.take_events("initialized").len(), 1);

    let body = h.body(
        "setBreakpoints",
        json!({"source": {"path": CLIENT_SOURCE}, "breakpoints": [{"line": 20}, {"line": 25}]}),
    );
    let bp = &body["breakpoints"];
    assert_eq!(bp[0]["verified"], true);
    assert_eq!(bp[0]["line"], 20);
    assert_eq!(bp[0]["source"]["path"], CLIENT_SOURCE);
    assert_eq!(bp[1]["verified"], false);
    let id = bp[0]["id"].clone();

    let done = h.send("configurationDone", json!({}));
    let messages = h.take();
    let done_rsp = position(&messages, |m| m["request_seq"] == done);
    let launch_rsp = position(&messages, |m| m["request_seq"] == launch);
    let process = position(&messages, |m| m["event"] == "process");
    let stopped = position(&messages, |m| m["event"] == "stopped");
    assert!(done_rsp < launch_rsp);
    assert!(launch_rsp < process);
    assert!(process < stopped);
    assert_eq!(messages[launch_rsp]["success"], true);

    assert_eq!(messages[process]["body"]["name"], "demo");
    assert_eq!(messages[process]["body"]["systemProcessId"], 4242);
    assert_eq!(messages[process]["body"]["startMethod"], "launch");

    let output: Vec<_> = messages
        .iter()
        .filter(|m| m["event"] == "output")
        .map(|m| m["body"].clone())
        .collect();
    assert_eq!(output, vec![json!({"category": "stdout", "output": "starting\n"})]);

    let stop = &messages[stopped]["body"];
    assert_eq!(stop["reason"], "breakpoint");
    assert_eq!(stop["threadId"], 1);
    assert_eq!(stop["allThreadsStopped"], true);
    assert_eq!(stop["hitBreakpointIds"], json!([id]));

    let trace = h.body("stackTrace", json!({"threadId": 1}));
    assert_eq!(trace["totalFrames"], 2);
    let frame = &trace["stackFrames"][0];
    assert_eq!(frame["name"], "compute");
    assert_eq!(frame["line"], 20);
    assert_eq!(frame["source"]["path"], CLIENT_SOURCE);
    assert_eq!(frame["source"]["name"], "main.c");
    assert_eq!(frame["instructionPointerReference"], "0x1100");

    let page = h.body(
        "stackTrace",
        json!({"threadId": 1, "startFrame": 1, "levels": 1}),
    );
    assert_eq!(page["stackFrames"].as_array().unwrap().len(), 1);
    assert_eq!(page["stackFrames"][0]["name"], "main");
    assert_eq!(page["totalFrames"], 2);
}

#[test]
fn test_breakpoint_identity_survives_resubmit() {
    let mut h = Harness::new(demo_scenario());
    h.launch(json!({}));

    let set = |h: &mut Harness, lines: &[i64]| -> Vec<Value> {
        let breakpoints: Vec<_> = lines.iter().map(|l| json!({"line": l})).collect();
        let body = h.body(
            "setBreakpoints",
            json!({"source": {"path": CLIENT_SOURCE}, "breakpoints": breakpoints}),
        );
        body["breakpoints"].as_array().unwrap().clone()
    };

    let first = set(&mut h, &[10, 20]);
    let second = set(&mut h, &[20, 30]);
    assert_eq!(first[1]["id"], second[0]["id"]);
    assert_ne!(second[1]["id"], first[0]["id"]);
    assert_ne!(second[1]["id"], first[1]["id"]);

    // line 10 is gone, the first stop is at line 20
    h.take();
    h.body("configurationDone", json!({}));
    let stopped = h.take_events("stopped");
    assert_eq!(stopped.len(), 1);
    assert_eq!(stopped[0]["body"]["hitBreakpointIds"], json!([second[0]["id"]]));
}

#[test]
fn test_relative_breakpoint_path() {
    let mut h = Harness::new(demo_scenario());
    h.initialize();
    h.send("launch", json!({"program": "/opt/demo/bin/demo"}));

    let body = h.body(
        "setBreakpoints",
        json!({"source": {"path": "/build/src/../src/./main.c"}, "breakpoints": [{"line": 20}]}),
    );
    assert_eq!(body["breakpoints"][0]["verified"], true);
    assert_eq!(body["breakpoints"][0]["source"]["path"], "/build/src/main.c");
}

#[test]
fn test_conditional_breakpoint() {
    let mut h = Harness::new(demo_scenario());
    h.launch(json!({}));
    h.body(
        "setBreakpoints",
        json!({
            "source": {"path": CLIENT_SOURCE},
            "breakpoints": [{"line": 20, "condition": "x == 9"}],
        }),
    );
    h.take();
    h.body("configurationDone", json!({}));
    assert!(h.take_events("stopped").is_empty());

    let mut h = Harness::new(demo_scenario());
    h.launch(json!({}));
    h.body(
        "setBreakpoints",
        json!({
            "source": {"path": CLIENT_SOURCE},
            "breakpoints": [{"line": 20, "condition": "x == 5"}],
        }),
    );
    h.take();
    h.body("configurationDone", json!({}));
    assert_eq!(h.take_events("stopped").len(), 1);
}

#[test]
fn test_function_breakpoints() {
    let mut h = Harness::new(demo_scenario());
    h.launch(json!({}));
    let body = h.body(
        "setFunctionBreakpoints",
        json!({"breakpoints": [{"name": "compute"}, {"name": "missing"}]}),
    );
    assert_eq!(body["breakpoints"][0]["verified"], true);
    assert_eq!(body["breakpoints"][1]["verified"], false);

    h.take();
    h.body("configurationDone", json!({}));
    let stopped = h.take_events("stopped");
    assert_eq!(stopped[0]["body"]["reason"], "breakpoint");
    assert_eq!(h.top_frame()["name"], "compute");
}

#[test]
fn test_exception_filters() {
    let mut h = Harness::new(demo_scenario());
    h.launch(json!({}));

    let body = h.body("setExceptionBreakpoints", json!({"filters": ["cpp_throw"]}));
    let id = body["breakpoints"][0]["id"].clone();

    let rsp = h.request(
        "setExceptionBreakpoints",
        json!({"filters": ["cpp_throw", "bogus"]}),
    );
    assert_eq!(rsp["success"], false);
    assert_eq!(rsp["message"], "unknown exception filter `bogus`");

    let body = h.body("setExceptionBreakpoints", json!({"filters": ["cpp_throw"]}));
    assert_eq!(body["breakpoints"][0]["id"], id);
}

#[test]
fn test_shadowed_locals() {
    let mut h = Harness::new(demo_scenario());
    h.run_to(&[20]);

    let scopes = h.scopes();
    assert_eq!(scopes.len(), 4);

    let locals = h.variables(scopes[0]);
    assert_eq!(names(&locals), vec!["x", "point", "items"]);
    assert_eq!(find(&locals, "x")["value"], "5");
    assert_eq!(find(&locals, "x")["variablesReference"], 0);
    assert_eq!(find(&locals, "items")["value"], "size=1");
    // synthetic values are never expandable
    assert_eq!(find(&locals, "items")["variablesReference"], 0);

    let point = find(&locals, "point");
    assert_eq!(point["value"], "{x:1, y:2}");
    assert_eq!(point["type"], "Point");
    let children = h.variables(point["variablesReference"].as_i64().unwrap());
    assert_eq!(names(&children), vec!["px", "py"]);
    assert_eq!(children[0]["evaluateName"], "point.px");

    assert!(h.variables(scopes[1]).is_empty());
    let globals = h.variables(scopes[2]);
    assert_eq!(names(&globals), vec!["counter"]);
    assert_eq!(globals[0]["memoryReference"], "0x2000");
}

#[test]
fn test_statics_and_registers() {
    let mut h = Harness::new(demo_scenario());
    h.run_to(&[10]);

    let scopes = h.scopes();
    let statics = h.variables(scopes[1]);
    assert_eq!(names(&statics), vec!["calls"]);

    let registers = h.variables(scopes[3]);
    assert_eq!(names(&registers), vec!["General Purpose Registers"]);
    assert_eq!(registers[0]["value"], "<unavailable>");
    let gpr = h.variables(registers[0]["variablesReference"].as_i64().unwrap());
    assert_eq!(gpr[0]["name"], "rip");
    assert_eq!(gpr[0]["value"], "0x1000");
}

#[test]
fn test_continue_invalidates_references() {
    let mut h = Harness::new(demo_scenario());
    h.run_to(&[10, 12]);

    let frame = h.top_frame()["id"].clone();
    let scopes = h.scopes();
    assert_eq!(h.variables(scopes[0])[0]["name"], "x");

    let rsp = h.request("continue", json!({"threadId": 1}));
    assert_eq!(rsp["body"]["allThreadsContinued"], true);
    let stopped = h.take_events("stopped");
    assert_eq!(stopped.last().unwrap()["body"]["reason"], "breakpoint");

    let rsp = h.request("variables", json!({"variablesReference": scopes[0]}));
    assert_eq!(rsp["success"], false);

    // the same frame and scope get their old references back
    assert_eq!(h.top_frame()["id"], frame);
    assert_eq!(h.scopes(), scopes);
}

#[test]
fn test_stepping() {
    let mut h = Harness::new(demo_scenario());
    h.run_to(&[10]);
    h.take();

    h.body("stepIn", json!({"threadId": 1}));
    let stopped = h.take_events("stopped");
    assert_eq!(stopped[0]["body"]["reason"], "step");
    assert_eq!(h.top_frame()["name"], "compute");

    h.body("stepOut", json!({"threadId": 1}));
    assert_eq!(h.top_frame()["line"], 12);

    h.take();
    h.body("next", json!({"threadId": 1}));
    assert_eq!(h.take_events("exited")[0]["body"]["exitCode"], 0);

    let rsp = h.request("next", json!({"threadId": 1}));
    assert_eq!(rsp["message"], "no debuggee is running");
}

#[test]
fn test_stop_on_entry() {
    let mut h = Harness::new(demo_scenario());
    h.launch(json!({"stopOnEntry": true}));
    h.take();
    h.body("configurationDone", json!({}));

    let messages = h.take();
    assert!(messages.iter().all(|m| m["event"] != "continued"));
    let stopped: Vec<_> = messages.iter().filter(|m| m["event"] == "stopped").collect();
    assert_eq!(stopped.len(), 1);
    assert_eq!(stopped[0]["body"]["reason"], "entry");
    assert_eq!(stopped[0]["body"]["threadId"], 1);

    let threads = h.body("threads", json!({}));
    assert_eq!(
        threads["threads"],
        json!([{"id": 1, "name": "Thread #1"}, {"id": 2, "name": "worker"}])
    );
}

#[test]
fn test_run_to_exit() {
    let mut h = Harness::new(demo_scenario());
    h.run_to(&[]);

    let messages = h.take();
    let output: Vec<_> = messages
        .iter()
        .filter(|m| m["event"] == "output")
        .map(|m| (m["body"]["category"].clone(), m["body"]["output"].clone()))
        .collect();
    assert_eq!(
        output,
        vec![
            (json!("stdout"), json!("starting\n")),
            (json!("stderr"), json!("done\n"))
        ]
    );
    let exited = position(&messages, |m| m["event"] == "exited");
    let terminated = position(&messages, |m| m["event"] == "terminated");
    assert!(exited < terminated);

    let requests = [
        ("threads", json!({})),
        ("continue", json!({"threadId": 1})),
        ("evaluate", json!({"expression": "counter", "context": "repl"})),
        ("scopes", json!({"frameId": 1000})),
        ("variables", json!({"variablesReference": 1000})),
    ];
    for (command, arguments) in requests {
        let rsp = h.request(command, arguments);
        assert_eq!(rsp["success"], false, "`{command}` succeeded after exit");
        assert_eq!(rsp["message"], "no debuggee is running");
    }
}

#[test]
fn test_inspection_before_launch() {
    let mut h = Harness::new(demo_scenario());
    h.initialize();

    let requests = [
        ("evaluate", json!({"expression": "counter", "context": "repl"})),
        ("evaluate", json!({"expression": "`bt", "context": "repl"})),
        ("completions", json!({"text": "cou", "column": 4})),
        ("scopes", json!({"frameId": 1000})),
        ("variables", json!({"variablesReference": 1000})),
        (
            "setVariable",
            json!({"variablesReference": 1000, "name": "x", "value": "1"}),
        ),
    ];
    for (command, arguments) in requests {
        let rsp = h.request(command, arguments);
        assert_eq!(rsp["success"], false, "`{command}` succeeded before launch");
        assert_eq!(rsp["message"], "no debuggee is running");
    }
}

#[test]
fn test_references_dropped_on_exit() {
    let mut h = Harness::new(demo_scenario());
    h.run_to(&[20]);
    let scopes = h.scopes();
    assert!(!h.variables(scopes[0]).is_empty());

    h.take();
    h.body("continue", json!({"threadId": 1}));
    assert_eq!(h.take_events("exited").len(), 1);

    let rsp = h.request("variables", json!({"variablesReference": scopes[0]}));
    assert_eq!(rsp["message"], "no debuggee is running");
}

#[test]
fn test_output_chunks() {
    let config = AdapterConfig {
        output_chunk_size: 4,
        ..Default::default()
    };
    let mut h = Harness::with_config(demo_scenario(), config);
    h.run_to(&[10]);

    let output: Vec<_> = h
        .take_events("output")
        .iter()
        .map(|m| m["body"]["output"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(output, vec!["star", "ting", "\n"]);
}

#[test]
fn test_pause() {
    let mut h = Harness::new(demo_scenario());
    h.run_to(&[10]);
    h.take();

    h.body("pause", json!({"threadId": 1}));
    let stopped = h.take_events("stopped");
    assert_eq!(stopped[0]["body"]["reason"], "signal");
}

#[test]
fn test_evaluate() {
    let mut h = Harness::new(demo_scenario());
    h.run_to(&[20]);
    let frame = h.top_frame()["id"].clone();

    let body = h.body(
        "evaluate",
        json!({"expression": "point.px", "frameId": frame, "context": "watch"}),
    );
    assert_eq!(body["result"], "1");

    let body = h.body(
        "evaluate",
        json!({"expression": "point", "frameId": frame, "context": "hover"}),
    );
    assert!(body["variablesReference"].as_i64().unwrap() > 0);

    let body = h.body("evaluate", json!({"expression": "?x", "frameId": frame, "context": "repl"}));
    assert_eq!(body["result"], "5");
    let body = h.body("evaluate", json!({"expression": "x", "frameId": frame, "context": "repl"}));
    assert_eq!(body["result"], "5");
    let body = h.body("evaluate", json!({"expression": "42", "context": "repl"}));
    assert_eq!(body["result"], "42");

    let body = h.body(
        "evaluate",
        json!({"expression": "`bt", "frameId": frame, "context": "repl"}),
    );
    assert!(body["result"].as_str().unwrap().starts_with("frame #0: 0x1100 compute"));

    let rsp = h.request("evaluate", json!({"expression": "`frobnicate", "context": "repl"}));
    assert_eq!(rsp["success"], false);
    assert_eq!(rsp["message"], "error: 'frobnicate' is not a valid command.");

    let rsp = h.request("evaluate", json!({"expression": "nope", "frameId": frame}));
    assert_eq!(rsp["message"], "error: use of undeclared identifier 'nope'");
}

#[test]
fn test_set_variable() {
    let mut h = Harness::new(demo_scenario());
    h.run_to(&[20]);
    let scopes = h.scopes();

    let body = h.body(
        "setVariable",
        json!({"variablesReference": scopes[0], "name": "x", "value": "42"}),
    );
    assert_eq!(body["value"], "42");
    let locals = h.variables(scopes[0]);
    assert_eq!(find(&locals, "x")["value"], "42");

    let point = find(&locals, "point")["variablesReference"].clone();
    let body = h.body(
        "setVariable",
        json!({"variablesReference": point, "name": "py", "value": "counter"}),
    );
    assert_eq!(body["value"], "7");

    let rsp = h.request(
        "setVariable",
        json!({"variablesReference": scopes[0], "name": "missing", "value": "1"}),
    );
    assert_eq!(rsp["message"], "no variable named `missing`");

    let rsp = h.request(
        "setVariable",
        json!({"variablesReference": scopes[0], "name": "point", "value": "1"}),
    );
    assert_eq!(rsp["success"], false);
}

#[test]
fn test_completions() {
    let mut h = Harness::new(demo_scenario());
    h.run_to(&[20]);
    let frame = h.top_frame()["id"].clone();

    let body = h.body(
        "completions",
        json!({"text": "p = po", "column": 7, "frameId": frame}),
    );
    assert_eq!(body["targets"], json!([{"label": "point"}]));
}

#[test]
fn test_memory() {
    let mut h = Harness::new(demo_scenario());
    h.run_to(&[10]);

    let body = h.body("readMemory", json!({"memoryReference": "0x2000", "count": 4}));
    assert_eq!(body["address"], "0x2000");
    assert_eq!(body["data"], "BwAAAA==");
    assert_eq!(body["unreadableBytes"], 0);

    let body = h.body("readMemory", json!({"memoryReference": "0x2000", "count": 8}));
    assert_eq!(body["unreadableBytes"], 4);

    let body = h.body(
        "writeMemory",
        json!({"memoryReference": "0x2000", "offset": 1, "data": "AQI="}),
    );
    assert_eq!(body["bytesWritten"], 2);
    let body = h.body("readMemory", json!({"memoryReference": "0x2000", "count": 4}));
    assert_eq!(body["data"], "BwECAA==");

    let rsp = h.request(
        "writeMemory",
        json!({"memoryReference": "0x2000", "data": "not base64!"}),
    );
    assert_eq!(rsp["success"], false);
}

#[test]
fn test_exception_info_is_not_implemented() {
    let mut h = Harness::new(demo_scenario());
    h.run_to(&[10]);
    let rsp = h.request("exceptionInfo", json!({"threadId": 1}));
    assert_eq!(rsp["success"], false);
    assert_eq!(rsp["message"], "`exceptionInfo` is not implemented");

    let rsp = h.request("disassemble", json!({}));
    assert_eq!(rsp["message"], "Unsupported DAP command: disassemble");
}

#[test]
fn test_zero_based_lines() {
    let mut h = Harness::new(demo_scenario());
    h.body(
        "initialize",
        json!({"adapterID": "dapbridge", "linesStartAt1": false, "columnsStartAt1": false}),
    );
    h.send("launch", json!({"program": "/opt/demo/bin/demo"}));
    let body = h.body(
        "setBreakpoints",
        json!({"source": {"path": "/build/src/main.c"}, "breakpoints": [{"line": 19}]}),
    );
    assert_eq!(body["breakpoints"][0]["line"], 19);
    assert_eq!(body["breakpoints"][0]["verified"], true);

    h.body("configurationDone", json!({}));
    let frame = h.top_frame();
    assert_eq!(frame["name"], "compute");
    assert_eq!(frame["line"], 19);
}

#[test]
fn test_attach_to_pid() {
    let mut h = Harness::new(demo_scenario());
    h.initialize();
    let attach = h.send("attach", json!({"pid": 4242, "stopOnEntry": true}));
    h.take();
    h.body("configurationDone", json!({}));

    assert_eq!(h.response(attach).unwrap()["success"], true);
    let messages = h.take();
    let process = position(&messages, |m| m["event"] == "process");
    assert_eq!(messages[process]["body"]["startMethod"], "attach");
    let stopped = position(&messages, |m| m["event"] == "stopped");
    assert_eq!(messages[stopped]["body"]["reason"], "entry");

    let rsp = h.request("disconnect", json!({}));
    assert_eq!(rsp["success"], true);
    assert_eq!(h.flow, Flow::Exit(0));
}

#[test]
fn test_attach_wait_for_launch() {
    let mut h = Harness::new(demo_scenario());
    h.initialize();
    let attach = h.send(
        "attach",
        json!({"program": "/opt/demo/bin/demo", "waitFor": true}),
    );
    let done = h.send("configurationDone", json!({}));

    let messages = h.take();
    let done_rsp = position(&messages, |m| m["request_seq"] == done);
    let attach_rsp = position(&messages, |m| m["request_seq"] == attach);
    let process = position(&messages, |m| m["event"] == "process");
    assert!(done_rsp < attach_rsp);
    assert!(attach_rsp < process);
    assert_eq!(messages[attach_rsp]["success"], true);
    // no stop on entry, the process runs to its end
    assert!(messages.iter().any(|m| m["event"] == "exited"));
}

#[test]
fn test_attach_errors() {
    let mut h = Harness::new(demo_scenario());
    h.initialize();
    let rsp = h.request("attach", json!({"waitFor": true}));
    assert_eq!(rsp["success"], false);

    let attach = h.send("attach", json!({"pid": 1}));
    h.body("configurationDone", json!({}));
    let rsp = h.response(attach).unwrap();
    assert_eq!(rsp["success"], false);
    assert_eq!(rsp["message"], "no such process: 1");
}

#[test]
fn test_launch_failure_is_reported_on_launch() {
    let mut scenario = demo_scenario();
    scenario.faults.launch = Some("process exited during launch".to_string());
    let mut h = Harness::new(scenario);
    let launch = h.launch(json!({}));
    h.body("configurationDone", json!({}));

    let rsp = h.response(launch).unwrap();
    assert_eq!(rsp["success"], false);
    assert_eq!(rsp["message"], "process exited during launch");

    let rsp = h.request("launch", json!({"program": "/opt/demo/bin/demo"}));
    assert_eq!(rsp["success"], false);
}

#[test]
fn test_disconnect_despite_kill_failure() {
    let mut scenario = demo_scenario();
    scenario.faults.kill = Some("kill failed".to_string());
    let mut h = Harness::new(scenario);
    h.run_to(&[10]);

    let rsp = h.request("disconnect", json!({"terminateDebuggee": true}));
    assert_eq!(rsp["success"], true);
    assert_eq!(h.flow, Flow::Exit(0));
}

#[test]
fn test_disconnect_before_configuration_done() {
    let mut h = Harness::new(demo_scenario());
    let launch = h.launch(json!({}));
    let rsp = h.request("disconnect", json!(null));
    assert_eq!(rsp["success"], true);
    assert_eq!(h.response(launch).unwrap()["success"], false);
}

#[test]
fn test_console_log_forwarding() {
    let mut h = Harness::new(demo_scenario());
    h.feed(Inbound::Log("[INFO] dapbridge hello\n".to_string()))
        .unwrap();
    let output = h.take_events("output");
    assert_eq!(
        output[0]["body"],
        json!({"category": "console", "output": "[INFO] dapbridge hello\n"})
    );
}

#[test]
fn test_transport_failure() {
    let mut h = Harness::new(demo_scenario());
    h.initialize();

    assert_eq!(h.feed(Inbound::Closed(Some("reset".into()))).unwrap(), Flow::Exit(1));

    let mut h = Harness::new(demo_scenario());
    h.writer.break_pipe();
    assert!(h.feed(Inbound::Shutdown).is_err());
}
