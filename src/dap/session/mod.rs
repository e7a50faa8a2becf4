//! Session controller.
//!
//! A [`Session`] owns the engine and all per-client state. It consumes [`Inbound`] messages one
//! at a time: client requests are dispatched to handlers, engine notifications are translated
//! into protocol events. Handlers never wait for the debuggee, a resumed process reports its
//! next stop through the same inbound queue.
//!
//! Lifecycle:
//! `Uninitialized -> Initialized -> StartPending -> [AwaitingProcess]`, then
//! `Running <-> Stopped` until `Terminated`.

pub mod breakpoint;
pub mod event;
pub mod reference;
pub mod variable;

use crate::config::AdapterConfig;
use crate::dap::error::{Error, Result};
use crate::dap::protocol::{DapEvent, DapRequest, DapResponse, Inbound};
use crate::dap::request::{
    decode, AttachArguments, DisconnectArguments, InitializeArguments, LaunchArguments,
    ReadMemoryArguments, SetBreakpointsArguments, SetExceptionBreakpointsArguments,
    SetFunctionBreakpointsArguments, ThreadArguments, WriteMemoryArguments,
};
use crate::dap::session::breakpoint::{
    normalize_path, reconcile, Breakpoints, ExceptionFilter, ExceptionKind, FunctionDescriptor,
    FunctionKind, SourceDescriptor, SourceKind,
};
use crate::dap::session::event::QueueSink;
use crate::dap::session::reference::{Container, ReferenceTree};
use crate::dap::sourcemap::SourceMap;
use crate::dap::transport::MessageWriter;
use crate::dap::types::{
    Breakpoint, BreakpointsResponseBody, Capabilities, ContinueResponseBody, ProcessEventBody,
    ReadMemoryResponseBody, Source, Thread, ThreadsResponseBody, WriteMemoryResponseBody,
};
use crate::engine::{
    AttachOptions, AttachTarget, BreakpointId, Engine, EngineError, EventClass, LaunchOptions,
    ListenerId, ProcessId, ProcessInfo, ProcessState, TargetId, ThreadId,
};
use crate::{muted_error, weak_error};
use base64::Engine as _;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, Sender};

/// Builds the engine on `initialize`.
pub type EngineBuilder = Box<dyn Fn() -> anyhow::Result<Box<dyn Engine>>>;

/// Architectures accepted by `launch`.
const ARCHITECTURES: &[&str] = &[
    "systemArch",
    "systemArch64",
    "systemArch32",
    "arm64",
    "x86_64",
    "x86",
];

/// What to do after an inbound message is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop the adapter with the exit code.
    Exit(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Uninitialized,
    Initialized,
    /// Target is created, the process starts on `configurationDone`.
    StartPending,
    /// Waiting for a process to appear (attach with `waitFor`).
    AwaitingProcess,
    Running,
    Stopped,
    Terminated,
}

pub(crate) enum Configuration {
    Launch {
        options: LaunchOptions,
        stop_on_entry: bool,
    },
    Attach {
        options: AttachOptions,
        stop_on_entry: bool,
    },
}

impl Configuration {
    fn stop_on_entry(&self) -> bool {
        match self {
            Configuration::Launch { stop_on_entry, .. }
            | Configuration::Attach { stop_on_entry, .. } => *stop_on_entry,
        }
    }

    fn start_method(&self) -> &'static str {
        match self {
            Configuration::Launch { .. } => "launch",
            Configuration::Attach { .. } => "attach",
        }
    }
}

/// Reply of a `launch` or `attach` request, sent once the process is started.
struct PendingReply {
    seq: i64,
    command: String,
}

pub struct Session {
    pub(crate) config: AdapterConfig,
    builder: EngineBuilder,
    writer: Box<dyn MessageWriter>,
    queue: Sender<Inbound>,
    outbox: Vec<Value>,
    server_seq: i64,

    pub(crate) phase: Phase,
    pub(crate) engine: Option<Box<dyn Engine>>,
    listener: Option<ListenerId>,
    client: Option<InitializeArguments>,
    target: Option<TargetId>,
    pub(crate) process: Option<ProcessInfo>,
    pub(crate) configuration: Option<Configuration>,
    terminate_on_disconnect: bool,
    pending: Option<PendingReply>,

    pub(crate) source_map: SourceMap,
    breakpoints: Breakpoints,
    pub(crate) references: ReferenceTree<Container>,
    cwd: PathBuf,
}

impl Session {
    pub fn new(
        config: AdapterConfig,
        builder: EngineBuilder,
        writer: Box<dyn MessageWriter>,
        queue: Sender<Inbound>,
    ) -> Self {
        let references = ReferenceTree::new(config.reference_base);
        Self {
            config,
            builder,
            writer,
            queue,
            outbox: vec![],
            server_seq: 1,
            phase: Phase::Uninitialized,
            engine: None,
            listener: None,
            client: None,
            target: None,
            process: None,
            configuration: None,
            terminate_on_disconnect: false,
            pending: None,
            source_map: SourceMap::default(),
            breakpoints: Breakpoints::default(),
            references,
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
        }
    }

    /// Handle a single inbound message. Fails only if the client connection is broken.
    pub fn handle(&mut self, inbound: Inbound) -> anyhow::Result<Flow> {
        let flow = match inbound {
            Inbound::Request(req) => self.dispatch(&req),
            Inbound::Engine(event) => {
                self.on_engine_event(event);
                Flow::Continue
            }
            Inbound::Log(output) => {
                self.send_output("console", output);
                Flow::Continue
            }
            Inbound::Closed(None) => {
                log::info!(target: "session", "client is gone, shutting down");
                self.teardown(self.terminate_on_disconnect);
                Flow::Exit(0)
            }
            Inbound::Closed(Some(err)) => {
                log::error!(target: "session", "transport failure: {err}");
                self.teardown(self.terminate_on_disconnect);
                Flow::Exit(1)
            }
            Inbound::Shutdown => {
                log::info!(target: "session", "shutdown requested");
                self.teardown(self.terminate_on_disconnect);
                self.send_event("terminated");
                Flow::Exit(0)
            }
        };
        self.flush()?;
        Ok(flow)
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        for message in std::mem::take(&mut self.outbox) {
            self.writer.write_message(&message)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, req: &DapRequest) -> Flow {
        log::debug!(target: "session", "request #{} `{}`", req.seq, req.command);

        if self.phase == Phase::Uninitialized && req.command != "initialize" {
            self.send_err(
                req,
                format!("No `initialize` request was sent before `{}`.", req.command),
            );
            return Flow::Continue;
        }

        let result = match req.command.as_str() {
            "initialize" => self.handle_initialize(req),
            "launch" => self.handle_launch(req),
            "attach" => self.handle_attach(req),
            "configurationDone" => self.handle_configuration_done(req),
            "setBreakpoints" => self.handle_set_breakpoints(req),
            "setFunctionBreakpoints" => self.handle_set_function_breakpoints(req),
            "setExceptionBreakpoints" => self.handle_set_exception_breakpoints(req),
            "disconnect" => {
                return match self.handle_disconnect(req) {
                    Ok(()) => Flow::Exit(0),
                    Err(e) => {
                        self.send_err(req, e);
                        Flow::Continue
                    }
                };
            }
            "pause" => self.handle_pause(req),
            "continue" => self.handle_continue(req),
            "next" => self.handle_step(req, Step::Over),
            "stepIn" => self.handle_step(req, Step::In),
            "stepOut" => self.handle_step(req, Step::Out),
            "threads" => self.handle_threads(req),
            "stackTrace" => self.handle_stack_trace(req),
            "scopes" => self.handle_scopes(req),
            "variables" => self.handle_variables(req),
            "setVariable" => self.handle_set_variable(req),
            "evaluate" => self.handle_evaluate(req),
            "completions" => self.handle_completions(req),
            "exceptionInfo" => Err(Error::NotImplemented("exceptionInfo")),
            "readMemory" => self.handle_read_memory(req),
            "writeMemory" => self.handle_write_memory(req),
            other => Err(Error::invalid(format!("Unsupported DAP command: {other}"))),
        };

        if let Err(e) = result {
            log::debug!(target: "session", "request #{} `{}` failed: {e}", req.seq, req.command);
            self.send_err(req, e);
        }
        Flow::Continue
    }

    // ------------------------------------ outgoing messages ------------------------------------

    fn next_seq(&mut self) -> i64 {
        let s = self.server_seq;
        self.server_seq += 1;
        s
    }

    fn respond(
        &mut self,
        request_seq: i64,
        command: &str,
        success: bool,
        message: Option<String>,
        body: Option<Value>,
    ) {
        let rsp = DapResponse {
            seq: self.next_seq(),
            r#type: "response",
            request_seq,
            success,
            command: command.to_string(),
            message,
            body,
        };
        if let Some(rsp) = weak_error!(serde_json::to_value(rsp), "response serialization:") {
            self.outbox.push(rsp);
        }
    }

    pub(crate) fn send_success(&mut self, req: &DapRequest) {
        self.respond(req.seq, &req.command, true, None, None)
    }

    pub(crate) fn send_success_body<T: Serialize>(&mut self, req: &DapRequest, body: T) {
        let body = weak_error!(serde_json::to_value(body), "body serialization:");
        self.respond(req.seq, &req.command, true, None, body)
    }

    fn send_err(&mut self, req: &DapRequest, message: impl ToString) {
        self.respond(req.seq, &req.command, false, Some(message.to_string()), None)
    }

    pub(crate) fn send_event(&mut self, name: &'static str) {
        self.send_event_raw(name, None)
    }

    pub(crate) fn send_event_body<T: Serialize>(&mut self, name: &'static str, body: T) {
        let body = weak_error!(serde_json::to_value(body), "body serialization:");
        self.send_event_raw(name, body)
    }

    fn send_event_raw(&mut self, name: &'static str, body: Option<Value>) {
        let ev = DapEvent {
            seq: self.next_seq(),
            r#type: "event",
            event: name,
            body,
        };
        if let Some(ev) = weak_error!(serde_json::to_value(ev), "event serialization:") {
            self.outbox.push(ev);
        }
    }

    // ------------------------------------ preconditions ----------------------------------------

    pub(crate) fn engine(&self) -> Result<&dyn Engine> {
        self.engine
            .as_deref()
            .ok_or_else(|| Error::invalid("debugger engine is not initialized"))
    }

    pub(crate) fn engine_mut(&mut self) -> Result<&mut dyn Engine> {
        match self.engine.as_deref_mut() {
            Some(engine) => Ok(engine),
            None => Err(Error::invalid("debugger engine is not initialized")),
        }
    }

    fn target(&self) -> Result<TargetId> {
        self.target
            .ok_or_else(|| Error::invalid("no target, send `launch` or `attach` first"))
    }

    /// Process that accepts execution control and inspection requests.
    pub(crate) fn live_process(&self) -> Result<ProcessId> {
        match (&self.process, self.phase) {
            (Some(process), Phase::Running | Phase::Stopped) => Ok(process.id),
            _ => Err(Error::invalid("no debuggee is running")),
        }
    }

    // ------------------------------------ coordinates ------------------------------------------

    fn lines_start_at1(&self) -> bool {
        self.client.as_ref().map_or(true, |c| c.lines_start_at1)
    }

    pub(crate) fn columns_start_at1(&self) -> bool {
        self.client.as_ref().map_or(true, |c| c.columns_start_at1)
    }

    fn line_from_client(&self, line: i64) -> Result<u32> {
        let line = if self.lines_start_at1() { line } else { line + 1 };
        u32::try_from(line)
            .ok()
            .filter(|l| *l > 0)
            .ok_or_else(|| Error::invalid(format!("invalid line {line}")))
    }

    fn column_from_client(&self, column: i64) -> Result<u32> {
        let column = if self.columns_start_at1() {
            column
        } else {
            column + 1
        };
        u32::try_from(column)
            .ok()
            .filter(|c| *c > 0)
            .ok_or_else(|| Error::invalid(format!("invalid column {column}")))
    }

    pub(crate) fn line_to_client(&self, line: u32) -> i64 {
        if self.lines_start_at1() {
            line as i64
        } else {
            line as i64 - 1
        }
    }

    pub(crate) fn column_to_client(&self, column: u32) -> i64 {
        if self.columns_start_at1() {
            column as i64
        } else {
            column as i64 - 1
        }
    }

    pub(crate) fn client_source(&self, target_path: &Path) -> Source {
        let path = self
            .source_map
            .map_target_to_client(&target_path.to_string_lossy());
        Source {
            name: target_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
            path: Some(path),
        }
    }

    // ------------------------------------ lifecycle --------------------------------------------

    fn handle_initialize(&mut self, req: &DapRequest) -> Result<()> {
        if self.phase != Phase::Uninitialized {
            return Err(Error::invalid("`initialize` was already sent"));
        }
        let args: InitializeArguments = decode(&req.arguments)?;

        let mut engine =
            (self.builder)().map_err(|e| EngineError::new(format!("{e:#}")))?;
        let listener = engine.subscribe(
            &[EventClass::Target, EventClass::Process, EventClass::Thread],
            Box::new(QueueSink::new(self.queue.clone())),
        );
        log::info!(
            target: "session",
            "session initialized for {} ({})",
            args.client_name.as_deref().unwrap_or("unknown client"),
            args.adapter_id
        );

        self.engine = Some(engine);
        self.listener = Some(listener);
        self.client = Some(args);
        self.phase = Phase::Initialized;

        self.send_success_body(
            req,
            Capabilities {
                supports_configuration_done_request: true,
                supports_function_breakpoints: true,
                supports_conditional_breakpoints: true,
                supports_set_variable: true,
                support_terminate_debuggee: true,
                supports_exception_info_request: true,
                supports_evaluate_for_hovers: true,
                supports_read_memory_request: true,
                supports_write_memory_request: true,
                supports_completions_request: true,
                exception_breakpoint_filters: ExceptionFilter::descriptors(),
            },
        );
        Ok(())
    }

    fn ensure_not_configured(&self) -> Result<()> {
        if self.configuration.is_some() || self.phase != Phase::Initialized {
            return Err(Error::invalid(
                "the session already has a debuggee, only one `launch` or `attach` is allowed",
            ));
        }
        Ok(())
    }

    fn resolve_program(&self, program: &str) -> PathBuf {
        let path = PathBuf::from(program);
        if path.exists() {
            return path;
        }
        match which::which(program) {
            Ok(resolved) => resolved,
            Err(_) => path,
        }
    }

    fn handle_launch(&mut self, req: &DapRequest) -> Result<()> {
        self.ensure_not_configured()?;
        let args: LaunchArguments = decode(&req.arguments)?;

        let arch = match (args.arch.as_deref(), args.run_in_rosetta) {
            (Some(arch), _) if !ARCHITECTURES.contains(&arch) => {
                return Err(Error::invalid(format!(
                    "unknown architecture `{arch}`, expected one of: {}",
                    ARCHITECTURES.join(", ")
                )));
            }
            (None, true) => Some("x86_64"),
            (arch, _) => arch,
        };

        let program = self.resolve_program(&args.program);
        let target = self.engine_mut()?.create_target(Some(program.as_path()), arch)?;
        log::info!(target: "session", "target created for {}", program.display());

        self.target = Some(target);
        self.source_map = SourceMap::new(&args.path_mappings);
        self.configuration = Some(Configuration::Launch {
            options: LaunchOptions {
                arguments: args.args,
                environment: args.env,
                cwd: args.cwd.map(PathBuf::from),
                stop_at_entry: args.stop_on_entry,
            },
            stop_on_entry: args.stop_on_entry,
        });
        self.terminate_on_disconnect = true;
        self.pending = Some(PendingReply {
            seq: req.seq,
            command: req.command.clone(),
        });
        self.phase = Phase::StartPending;

        self.send_event("initialized");
        Ok(())
    }

    fn handle_attach(&mut self, req: &DapRequest) -> Result<()> {
        self.ensure_not_configured()?;
        let args: AttachArguments = decode(&req.arguments)?;

        let (attach_target, program) = match (args.pid, args.program) {
            (Some(pid), program) => {
                if program.is_some() {
                    log::debug!(
                        target: "session",
                        "both pid and program given, attach to pid {pid}"
                    );
                }
                if args.wait_for {
                    log::warn!(target: "session", "`waitFor` is ignored when attaching to a pid");
                }
                (AttachTarget::Pid(pid), None)
            }
            (None, Some(program)) => {
                let program = PathBuf::from(program);
                (AttachTarget::Program(program.clone()), Some(program))
            }
            (None, None) => {
                return Err(Error::invalid(
                    "`attach` requires either a `pid` or a `program`",
                ));
            }
        };
        let wait_for_launch = args.wait_for && matches!(attach_target, AttachTarget::Program(_));

        let target = self
            .engine_mut()?
            .create_target(program.as_deref(), None)?;

        self.target = Some(target);
        self.source_map = SourceMap::new(&args.path_mappings);
        self.configuration = Some(Configuration::Attach {
            options: AttachOptions {
                target: attach_target,
                wait_for_launch,
            },
            stop_on_entry: args.stop_on_entry,
        });
        self.terminate_on_disconnect = false;
        self.pending = Some(PendingReply {
            seq: req.seq,
            command: req.command.clone(),
        });
        self.phase = Phase::StartPending;

        self.send_event("initialized");
        Ok(())
    }

    fn handle_configuration_done(&mut self, req: &DapRequest) -> Result<()> {
        if self.phase != Phase::StartPending {
            return Err(Error::invalid(
                "No `launch` or `attach` request was sent before `configurationDone`.",
            ));
        }
        self.send_success(req);

        let target = self.target()?;
        let started = {
            let Some(engine) = self.engine.as_deref_mut() else {
                return Err(Error::invalid("debugger engine is not initialized"));
            };
            match &self.configuration {
                Some(Configuration::Launch { options, .. }) => engine.launch(target, options),
                Some(Configuration::Attach { options, .. }) => engine.attach(target, options),
                None => return Err(Error::invalid("no start configuration")),
            }
        };

        match started {
            Ok(process) => {
                log::info!(
                    target: "session",
                    "process {} started, state: {}",
                    process.id,
                    process.state
                );
                let awaiting = process.state == ProcessState::Attaching;
                self.process = Some(process);
                if awaiting {
                    self.phase = Phase::AwaitingProcess;
                } else {
                    self.process_started();
                }
            }
            Err(e) => {
                log::warn!(target: "session", "process start failed: {e}");
                self.phase = Phase::Terminated;
                if let Some(pending) = self.pending.take() {
                    self.respond(pending.seq, &pending.command, false, Some(e.to_string()), None);
                }
            }
        }
        Ok(())
    }

    /// Complete a start: reply to `launch`/`attach`, announce the process, then either report
    /// a stop at entry or let the debuggee run.
    pub(crate) fn process_started(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.respond(pending.seq, &pending.command, true, None, None);
        }
        let Some(process) = self.process.clone() else {
            return;
        };
        let stop_on_entry = self
            .configuration
            .as_ref()
            .is_some_and(Configuration::stop_on_entry);
        let start_method = self
            .configuration
            .as_ref()
            .map_or("launch", Configuration::start_method);
        let is_launch = matches!(self.configuration, Some(Configuration::Launch { .. }));

        self.send_event_body(
            "process",
            ProcessEventBody {
                name: process.name.clone().unwrap_or_else(|| "debuggee".to_string()),
                system_process_id: process.pid,
                is_local_process: true,
                start_method,
            },
        );

        if stop_on_entry {
            self.phase = Phase::Stopped;
            self.send_entry_stop(process.id);
            return;
        }

        self.phase = Phase::Running;
        if !is_launch {
            if let Ok(engine) = self.engine_mut() {
                if let Err(e) = engine.resume(process.id) {
                    log::warn!(target: "session", "resume after attach failed: {e}");
                }
            }
        }
    }

    fn handle_disconnect(&mut self, req: &DapRequest) -> Result<()> {
        let args = muted_error!(decode::<DisconnectArguments>(&req.arguments)).unwrap_or_default();
        let terminate = args
            .terminate_debuggee
            .unwrap_or(self.terminate_on_disconnect);

        self.teardown(terminate);
        self.send_success(req);
        Ok(())
    }

    /// Best effort release of the debuggee and the target, errors are only logged.
    fn teardown(&mut self, terminate: bool) {
        if let Some(pending) = self.pending.take() {
            self.respond(
                pending.seq,
                &pending.command,
                false,
                Some("session ended before the debuggee started".to_string()),
                None,
            );
        }

        let phase = self.phase;
        let process = self.process.take();
        let target = self.target.take();
        let conditional: Vec<BreakpointId> = self.breakpoints.conditional().collect();
        let listener = self.listener.take();

        if let Some(engine) = self.engine.as_deref_mut() {
            if let Some(process) = process {
                match phase {
                    Phase::AwaitingProcess => {
                        weak_error!(engine.interrupt(process.id), "stop waiting for process:");
                    }
                    Phase::Running | Phase::Stopped if terminate => {
                        weak_error!(engine.kill(process.id), "kill debuggee:");
                    }
                    Phase::Running | Phase::Stopped => {
                        weak_error!(engine.detach(process.id), "detach debuggee:");
                    }
                    Phase::Uninitialized
                    | Phase::Initialized
                    | Phase::StartPending
                    | Phase::Terminated => {}
                }
            }
            if let Some(target) = target {
                for id in conditional {
                    muted_error!(
                        engine.set_breakpoint_condition(target, id, None),
                        "clear breakpoint condition:"
                    );
                }
                engine.delete_target(target);
            }
            if let Some(listener) = listener {
                engine.unsubscribe(listener);
            }
        }

        self.breakpoints.clear();
        self.references.clear();
        self.configuration = None;
        self.phase = Phase::Terminated;
    }

    // ------------------------------------ breakpoints ------------------------------------------

    fn handle_set_breakpoints(&mut self, req: &DapRequest) -> Result<()> {
        let args: SetBreakpointsArguments = decode(&req.arguments)?;
        let target = self.target()?;

        let target_path = self.source_map.map_client_to_target(&args.source_path);
        let path = normalize_path(Path::new(&target_path), &self.cwd);
        let requested = args
            .breakpoints
            .iter()
            .map(|bp| -> Result<SourceDescriptor> {
                Ok(SourceDescriptor {
                    path: path.clone(),
                    line: self.line_from_client(bp.line)?,
                    column: bp.column.map(|c| self.column_from_client(c)).transpose()?,
                    condition: bp.condition.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let Some(engine) = self.engine.as_deref_mut() else {
            return Err(Error::invalid("debugger engine is not initialized"));
        };
        let table = self.breakpoints.sources.entry(path.clone()).or_default();
        let ids = reconcile::<SourceKind>(engine, target, table, &requested)?;
        if table.is_empty() {
            self.breakpoints.sources.remove(&path);
        }

        let source = self.client_source(&path);
        let engine = self.engine()?;
        let breakpoints = ids
            .iter()
            .zip(&requested)
            .map(|(id, d)| Breakpoint {
                id: id.0 as i64,
                verified: engine.breakpoint_locations(target, *id) > 0,
                line: Some(self.line_to_client(d.line)),
                column: d.column.map(|c| self.column_to_client(c)),
                source: Some(source.clone()),
            })
            .collect();
        self.send_success_body(req, BreakpointsResponseBody { breakpoints });
        Ok(())
    }

    fn handle_set_function_breakpoints(&mut self, req: &DapRequest) -> Result<()> {
        let args: SetFunctionBreakpointsArguments = decode(&req.arguments)?;
        let target = self.target()?;
        let requested: Vec<_> = args
            .breakpoints
            .into_iter()
            .map(|bp| FunctionDescriptor {
                name: bp.name,
                condition: bp.condition,
            })
            .collect();

        let Some(engine) = self.engine.as_deref_mut() else {
            return Err(Error::invalid("debugger engine is not initialized"));
        };
        let ids =
            reconcile::<FunctionKind>(engine, target, &mut self.breakpoints.functions, &requested)?;

        let breakpoints = self.verified(target, &ids)?;
        self.send_success_body(req, BreakpointsResponseBody { breakpoints });
        Ok(())
    }

    fn handle_set_exception_breakpoints(&mut self, req: &DapRequest) -> Result<()> {
        let args: SetExceptionBreakpointsArguments = decode(&req.arguments)?;
        let target = self.target()?;

        let Some(engine) = self.engine.as_deref_mut() else {
            return Err(Error::invalid("debugger engine is not initialized"));
        };
        let ids = reconcile::<ExceptionKind>(
            engine,
            target,
            &mut self.breakpoints.exceptions,
            &args.filters,
        )?;

        let breakpoints = self.verified(target, &ids)?;
        self.send_success_body(req, BreakpointsResponseBody { breakpoints });
        Ok(())
    }

    fn verified(&self, target: TargetId, ids: &[BreakpointId]) -> Result<Vec<Breakpoint>> {
        let engine = self.engine()?;
        Ok(ids
            .iter()
            .map(|id| Breakpoint {
                id: id.0 as i64,
                verified: engine.breakpoint_locations(target, *id) > 0,
                line: None,
                column: None,
                source: None,
            })
            .collect())
    }

    // ------------------------------------ execution control ------------------------------------

    fn handle_pause(&mut self, req: &DapRequest) -> Result<()> {
        decode::<ThreadArguments>(&req.arguments)?;
        let process = self.live_process()?;
        self.engine_mut()?.interrupt(process)?;
        self.send_success(req);
        Ok(())
    }

    fn handle_continue(&mut self, req: &DapRequest) -> Result<()> {
        decode::<ThreadArguments>(&req.arguments)?;
        let process = self.live_process()?;
        self.references.clear();
        self.engine_mut()?.resume(process)?;
        self.send_success_body(
            req,
            ContinueResponseBody {
                all_threads_continued: true,
            },
        );
        Ok(())
    }

    fn handle_step(&mut self, req: &DapRequest, step: Step) -> Result<()> {
        let args: ThreadArguments = decode(&req.arguments)?;
        self.live_process()?;
        let thread = thread_id(args.thread_id)?;
        self.references.clear();

        let engine = self.engine_mut()?;
        match step {
            Step::Over => engine.step_over(thread)?,
            Step::In => engine.step_into(thread)?,
            Step::Out => engine.step_out(thread)?,
        }
        self.send_success(req);
        Ok(())
    }

    fn handle_threads(&mut self, req: &DapRequest) -> Result<()> {
        let process = self.live_process()?;
        let threads = self
            .engine()?
            .threads(process)
            .into_iter()
            .map(|t| Thread {
                id: t.id.0 as i64,
                name: match (t.name, t.queue) {
                    (Some(name), _) => name,
                    (None, Some(queue)) => format!("Thread #{} ({queue})", t.index),
                    (None, None) => format!("Thread #{}", t.index),
                },
            })
            .collect();
        self.send_success_body(req, ThreadsResponseBody { threads });
        Ok(())
    }

    // ------------------------------------ memory -----------------------------------------------

    fn handle_read_memory(&mut self, req: &DapRequest) -> Result<()> {
        let args: ReadMemoryArguments = decode(&req.arguments)?;
        let process = self.live_process()?;
        let address = memory_address(&args.memory_reference, args.offset)?;
        let count = usize::try_from(args.count)
            .map_err(|_| Error::invalid(format!("invalid count {}", args.count)))?;

        let data = self.engine()?.read_memory(process, address, count)?;
        self.send_success_body(
            req,
            ReadMemoryResponseBody {
                address: format!("{address:#x}"),
                unreadable_bytes: count - data.len().min(count),
                data: base64::engine::general_purpose::STANDARD.encode(&data),
            },
        );
        Ok(())
    }

    fn handle_write_memory(&mut self, req: &DapRequest) -> Result<()> {
        let args: WriteMemoryArguments = decode(&req.arguments)?;
        let process = self.live_process()?;
        let address = memory_address(&args.memory_reference, args.offset)?;
        let data = base64::engine::general_purpose::STANDARD
            .decode(args.data.as_bytes())
            .map_err(|e| Error::invalid(format!("`data` is not valid base64: {e}")))?;

        let bytes_written = self.engine_mut()?.write_memory(process, address, &data)?;
        self.send_success_body(req, WriteMemoryResponseBody { bytes_written });
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Step {
    Over,
    In,
    Out,
}

pub(crate) fn thread_id(id: i64) -> Result<ThreadId> {
    u64::try_from(id)
        .map(ThreadId)
        .map_err(|_| Error::invalid(format!("invalid thread id {id}")))
}

fn memory_address(reference: &str, offset: i64) -> Result<u64> {
    let digits = reference
        .strip_prefix("0x")
        .or_else(|| reference.strip_prefix("0X"))
        .unwrap_or(reference);
    let base = u64::from_str_radix(digits, 16)
        .map_err(|_| Error::invalid(format!("invalid memory reference `{reference}`")))?;
    base.checked_add_signed(offset)
        .ok_or_else(|| Error::invalid(format!("memory offset {offset} is out of range")))
}

/// Serve inbound messages until the session ends, return the process exit code.
pub fn run(mut session: Session, inbound: Receiver<Inbound>) -> anyhow::Result<i32> {
    for message in inbound {
        if let Flow::Exit(code) = session.handle(message)? {
            return Ok(code);
        }
    }
    Ok(0)
}
