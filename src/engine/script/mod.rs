//! Deterministic engine replaying a [`Scenario`].

mod scenario;

pub use scenario::{
    Faults, FrameSpec, MemorySpec, PlatformSpec, Scenario, StopSpec, ThreadSpec, ValueSpec,
};

use crate::engine::{
    AttachOptions, AttachTarget, BreakpointId, CommandOutput, Engine, EngineError, EngineEvent,
    EngineResult, EventClass, EventSink, FrameId, FrameInfo, Language, LaunchOptions, ListenerId,
    Platform, ProcessEvent, ProcessId, ProcessInfo, ProcessState, StopReason, TargetId,
    ThreadEvent, ThreadId, ThreadInfo, ValueId, ValueInfo, ValueKind, VariableQuery,
};
use itertools::Itertools;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const SIGSTOP: u64 = 19;
const FRAME_INDEX_BITS: u64 = 16;
const COMMANDS: &[&str] = &["bt", "frame variable", "help", "thread list", "version"];

struct Node {
    name: String,
    type_name: Option<String>,
    value: Option<String>,
    summary: Option<String>,
    kind: ValueKind,
    synthetic: bool,
    address: Option<u64>,
    path: String,
    children: Vec<usize>,
}

struct Frame {
    function: Option<String>,
    file: Option<PathBuf>,
    line: Option<u32>,
    column: Option<u32>,
    pc: u64,
    locals: Vec<usize>,
    statics: Vec<usize>,
    registers: Vec<usize>,
}

struct Stop {
    thread: ThreadId,
    frames: Vec<Frame>,
    stdout: Option<String>,
    stderr: Option<String>,
    signal: Option<u64>,
    exception: Option<String>,
}

#[derive(Clone)]
enum BreakpointSpec {
    Source {
        path: PathBuf,
        line: u32,
        column: Option<u32>,
    },
    Function(String),
    Exception,
}

struct Breakpoint {
    spec: BreakpointSpec,
    condition: Option<String>,
}

struct Target {
    id: TargetId,
    breakpoints: BTreeMap<BreakpointId, Breakpoint>,
}

struct StopInfo {
    thread: ThreadId,
    reason: StopReason,
    data: Vec<u64>,
    description: Option<String>,
}

struct Process {
    id: ProcessId,
    state: ProcessState,
    position: usize,
    exit_code: Option<i32>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    stop: Option<StopInfo>,
}

struct Listener {
    id: ListenerId,
    classes: Vec<EventClass>,
    sink: Box<dyn EventSink>,
}

/// Where a resume operation should land.
#[derive(Clone, Copy)]
enum Destination {
    /// Next point at or above the given stack depth.
    Depth(usize),
    Anywhere,
    /// Run until a breakpoint or the end.
    Nowhere,
}

pub struct ScriptedEngine {
    program: PathBuf,
    pid: u32,
    exit_code: i32,
    platforms: Vec<Platform>,
    idle_threads: Vec<ThreadInfo>,
    nodes: Vec<Node>,
    globals: Vec<usize>,
    stops: Vec<Stop>,
    memory: BTreeMap<u64, u8>,
    faults: Faults,
    listeners: Vec<Listener>,
    target: Option<Target>,
    process: Option<Process>,
    next_id: u64,
    next_breakpoint_id: u64,
}

impl ScriptedEngine {
    pub fn new(scenario: Scenario) -> Self {
        let mut engine = ScriptedEngine {
            program: scenario.program.clone(),
            pid: scenario.pid,
            exit_code: scenario.exit_code,
            platforms: scenario.platforms.iter().map(Platform::from).collect(),
            idle_threads: scenario
                .threads
                .iter()
                .map(|t| ThreadInfo {
                    id: ThreadId(t.id),
                    index: 0,
                    name: t.name.clone(),
                    queue: t.queue.clone(),
                    stop_reason: StopReason::None,
                    stop_data: vec![],
                    stop_description: None,
                })
                .collect(),
            nodes: vec![],
            globals: vec![],
            stops: vec![],
            memory: BTreeMap::new(),
            faults: scenario.faults.clone(),
            listeners: vec![],
            target: None,
            process: None,
            next_id: 1,
            next_breakpoint_id: 1,
        };

        engine.globals = engine.alloc_values(&scenario.globals, ValueKind::Global, None);
        for stop in &scenario.stops {
            let frames = stop
                .frames
                .iter()
                .map(|f| Frame {
                    function: f.function.clone(),
                    file: f.file.clone(),
                    line: f.line,
                    column: f.column,
                    pc: f.pc,
                    locals: engine.alloc_values(&f.locals, ValueKind::Local, None),
                    statics: engine.alloc_values(&f.statics, ValueKind::Static, None),
                    registers: engine.alloc_values(&f.registers, ValueKind::RegisterSet, None),
                })
                .collect();
            engine.stops.push(Stop {
                thread: ThreadId(stop.thread),
                frames,
                stdout: stop.stdout.clone(),
                stderr: stop.stderr.clone(),
                signal: stop.signal,
                exception: stop.exception.clone(),
            });
        }
        for region in &scenario.memory {
            for (offset, byte) in region.bytes.iter().enumerate() {
                engine.memory.insert(region.address + offset as u64, *byte);
            }
        }

        engine
    }

    fn alloc_values(
        &mut self,
        specs: &[ValueSpec],
        default_kind: ValueKind,
        parent_path: Option<&str>,
    ) -> Vec<usize> {
        specs
            .iter()
            .map(|spec| {
                // kinds are checked when the scenario is parsed
                let kind = spec.kind().ok().flatten().unwrap_or(default_kind);
                let path = match parent_path {
                    Some(parent) => format!("{parent}.{}", spec.name),
                    None => spec.name.clone(),
                };
                let child_kind = if kind == ValueKind::RegisterSet {
                    ValueKind::Register
                } else {
                    kind
                };
                let children = self.alloc_values(&spec.children, child_kind, Some(&path));
                self.nodes.push(Node {
                    name: spec.name.clone(),
                    type_name: spec.type_name.clone(),
                    value: spec.value.clone(),
                    summary: spec.summary.clone(),
                    kind,
                    synthetic: spec.synthetic,
                    address: spec.address,
                    path,
                    children,
                });
                self.nodes.len() - 1
            })
            .collect()
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn emit(&mut self, event: EngineEvent) {
        let class = event.class();
        self.listeners.retain(|listener| {
            !listener.classes.contains(&class) || listener.sink.deliver(event.clone())
        });
    }

    fn emit_state(&mut self, process: ProcessId, state: ProcessState) {
        self.emit(EngineEvent::Process {
            process,
            event: ProcessEvent::StateChanged {
                state,
                restarted: false,
            },
        });
    }

    fn process(&self, id: ProcessId) -> EngineResult<&Process> {
        self.process
            .as_ref()
            .filter(|p| p.id == id)
            .ok_or_else(|| EngineError::new(format!("invalid process {id}")))
    }

    fn process_mut(&mut self, id: ProcessId) -> EngineResult<&mut Process> {
        self.process
            .as_mut()
            .filter(|p| p.id == id)
            .ok_or_else(|| EngineError::new(format!("invalid process {id}")))
    }

    fn stopped_process(&self) -> EngineResult<&Process> {
        match &self.process {
            Some(p) if p.state == ProcessState::Stopped => Ok(p),
            Some(_) => Err(EngineError::new("process is not stopped")),
            None => Err(EngineError::new("no process")),
        }
    }

    fn frame_id(position: usize, index: usize) -> FrameId {
        FrameId(((position as u64) << FRAME_INDEX_BITS) | index as u64)
    }

    fn frame(&self, id: FrameId) -> EngineResult<&Frame> {
        let process = self.stopped_process()?;
        let position = (id.0 >> FRAME_INDEX_BITS) as usize;
        let index = (id.0 & ((1 << FRAME_INDEX_BITS) - 1)) as usize;
        if position != process.position {
            return Err(EngineError::new(format!("frame {id} is no longer valid")));
        }
        self.stops
            .get(position)
            .and_then(|stop| stop.frames.get(index))
            .ok_or_else(|| EngineError::new(format!("invalid frame {id}")))
    }

    fn node(&self, id: ValueId) -> EngineResult<&Node> {
        self.nodes
            .get(id.0 as usize)
            .ok_or_else(|| EngineError::new(format!("invalid value {id}")))
    }

    fn value_info(&self, idx: usize) -> ValueInfo {
        let node = &self.nodes[idx];
        ValueInfo {
            id: ValueId(idx as u64),
            name: node.name.clone(),
            type_name: node.type_name.clone(),
            summary: node.summary.clone(),
            value: node.value.clone(),
            kind: node.kind,
            num_children: node.children.len(),
            synthetic: node.synthetic,
            expression_path: Some(node.path.clone()),
            address: node.address,
        }
    }

    fn lookup_in_frame(&self, frame: Option<&Frame>, name: &str) -> Option<usize> {
        let by_name = |idx: &&usize| self.nodes[**idx].name == name;
        frame
            .and_then(|f| {
                // the innermost declaration shadows outer ones
                f.locals
                    .iter()
                    .rev()
                    .find(by_name)
                    .or_else(|| f.statics.iter().find(by_name))
            })
            .or_else(|| self.globals.iter().find(by_name))
            .copied()
    }

    fn resolve_path(&self, frame: Option<&Frame>, path: &str) -> Option<usize> {
        let mut segments = path.split('.').map(str::trim);
        let mut current = self.lookup_in_frame(frame, segments.next()?)?;
        for segment in segments {
            current = *self.nodes[current]
                .children
                .iter()
                .find(|c| self.nodes[**c].name == segment)?;
        }
        Some(current)
    }

    fn condition_holds(&self, frame: &Frame, condition: &str) -> bool {
        let (path, expected, negate) = if let Some((l, r)) = condition.split_once("!=") {
            (l, Some(r), true)
        } else if let Some((l, r)) = condition.split_once("==") {
            (l, Some(r), false)
        } else {
            (condition, None, false)
        };

        // an unresolvable condition stops the process
        let Some(idx) = self.resolve_path(Some(frame), path.trim()) else {
            return true;
        };
        let actual = self.nodes[idx].value.as_deref().unwrap_or_default();
        match expected {
            Some(expected) => (actual == expected.trim()) != negate,
            None => !matches!(actual, "" | "0" | "false"),
        }
    }

    fn breakpoint_hits(&self, position: usize) -> Vec<BreakpointId> {
        let Some(target) = &self.target else {
            return vec![];
        };
        let frame = &self.stops[position].frames[0];
        target
            .breakpoints
            .iter()
            .filter(|(_, bp)| match &bp.spec {
                BreakpointSpec::Source { path, line, column } => {
                    frame.file.as_deref() == Some(path.as_path())
                        && frame.line == Some(*line)
                        && (column.is_none() || *column == frame.column)
                }
                BreakpointSpec::Function(name) => frame.function.as_deref() == Some(name),
                BreakpointSpec::Exception => false,
            })
            .filter(|(_, bp)| match &bp.condition {
                Some(condition) => self.condition_holds(frame, condition),
                None => true,
            })
            .map(|(id, _)| *id)
            .collect()
    }

    fn has_exception_breakpoint(&self) -> bool {
        self.target.as_ref().is_some_and(|t| {
            t.breakpoints
                .values()
                .any(|bp| matches!(bp.spec, BreakpointSpec::Exception))
        })
    }

    fn flush_output(&mut self, position: usize) {
        let Some(process) = self.process.as_mut() else {
            return;
        };
        let pid = process.id;
        let stop = &self.stops[position];
        let mut events = vec![];
        if let Some(out) = &stop.stdout {
            process.stdout.extend_from_slice(out.as_bytes());
            events.push(ProcessEvent::Stdout);
        }
        if let Some(err) = &stop.stderr {
            process.stderr.extend_from_slice(err.as_bytes());
            events.push(ProcessEvent::Stderr);
        }
        for event in events {
            self.emit(EngineEvent::Process {
                process: pid,
                event,
            });
        }
    }

    fn stop_at(
        &mut self,
        position: usize,
        reason: StopReason,
        data: Vec<u64>,
        desc: Option<String>,
    ) {
        let thread = self.stops[position].thread;
        let Some(process) = self.process.as_mut() else {
            return;
        };
        process.position = position;
        process.state = ProcessState::Stopped;
        process.stop = Some(StopInfo {
            thread,
            reason,
            data,
            description: desc,
        });
        let pid = process.id;
        self.emit(EngineEvent::Thread {
            thread,
            event: ThreadEvent::StackChanged,
        });
        self.emit_state(pid, ProcessState::Stopped);
    }

    fn exit(&mut self) {
        let code = self.exit_code;
        let Some(process) = self.process.as_mut() else {
            return;
        };
        process.state = ProcessState::Exited;
        process.exit_code = Some(code);
        process.stop = None;
        let pid = process.id;
        self.emit_state(pid, ProcessState::Exited);
    }

    /// Walk the stop points starting right after `from`.
    fn advance(&mut self, from: Option<usize>, destination: Destination, state: ProcessState) {
        let Some(pid) = self.process.as_ref().map(|p| p.id) else {
            return;
        };
        if let Some(process) = self.process.as_mut() {
            process.state = state;
            process.stop = None;
        }
        self.emit_state(pid, state);

        let start = from.map(|p| p + 1).unwrap_or(0);
        for position in start..self.stops.len() {
            self.flush_output(position);

            let stop = &self.stops[position];
            if let Some(signal) = stop.signal {
                self.stop_at(
                    position,
                    StopReason::Signal,
                    vec![signal],
                    Some(format!("signal {signal}")),
                );
                return;
            }
            if let Some(exception) = stop.exception.clone() {
                if self.has_exception_breakpoint() {
                    self.stop_at(position, StopReason::Exception, vec![], Some(exception));
                    return;
                }
            }

            let arrived = match destination {
                Destination::Depth(depth) => self.stops[position].frames.len() <= depth,
                Destination::Anywhere => true,
                Destination::Nowhere => false,
            };
            if arrived {
                self.stop_at(position, StopReason::PlanComplete, vec![], None);
                return;
            }

            let hits = self.breakpoint_hits(position);
            if !hits.is_empty() {
                let data = hits.iter().flat_map(|id| [id.0, 1]).collect();
                let desc = format!("breakpoint {}", hits.iter().join(", "));
                self.stop_at(position, StopReason::Breakpoint, data, Some(desc));
                return;
            }
        }

        self.exit();
    }

    fn step(
        &mut self,
        thread: ThreadId,
        destination: impl Fn(usize) -> Destination,
    ) -> EngineResult<()> {
        let process = self.stopped_process()?;
        let position = process.position;
        if self.stops.get(position).map(|s| s.thread) != Some(thread) {
            return Err(EngineError::new(format!("thread {thread} can't be stepped")));
        }
        let depth = self.stops[position].frames.len();
        self.advance(Some(position), destination(depth), ProcessState::Stepping);
        Ok(())
    }

    fn create_breakpoint(
        &mut self,
        target: TargetId,
        spec: BreakpointSpec,
    ) -> EngineResult<BreakpointId> {
        let id = BreakpointId(self.next_breakpoint_id);
        let t = self
            .target
            .as_mut()
            .filter(|t| t.id == target)
            .ok_or_else(|| EngineError::new(format!("invalid target {target}")))?;
        t.breakpoints.insert(
            id,
            Breakpoint {
                spec,
                condition: None,
            },
        );
        self.next_breakpoint_id += 1;
        Ok(id)
    }

    fn breakpoint_mut(
        &mut self,
        target: TargetId,
        id: BreakpointId,
    ) -> EngineResult<&mut Breakpoint> {
        self.target
            .as_mut()
            .filter(|t| t.id == target)
            .and_then(|t| t.breakpoints.get_mut(&id))
            .ok_or_else(|| EngineError::new(format!("invalid breakpoint {id}")))
    }

    fn same_program(&self, path: &Path) -> bool {
        path == self.program || (path.is_relative() && self.program.ends_with(path))
    }

    fn new_process(&mut self, state: ProcessState, position: usize) -> ProcessInfo {
        let id = ProcessId(self.next_id());
        self.process = Some(Process {
            id,
            state,
            position,
            exit_code: None,
            stdout: vec![],
            stderr: vec![],
            stop: None,
        });
        ProcessInfo {
            id,
            pid: Some(self.pid),
            name: self
                .program
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
            state,
        }
    }

    fn drain(buffer: &mut Vec<u8>, buf: &mut [u8]) -> usize {
        let n = buffer.len().min(buf.len());
        buf[..n].copy_from_slice(&buffer[..n]);
        buffer.drain(..n);
        n
    }
}

impl Engine for ScriptedEngine {
    fn platforms(&self) -> Vec<Platform> {
        self.platforms.clone()
    }

    fn subscribe(&mut self, classes: &[EventClass], sink: Box<dyn EventSink>) -> ListenerId {
        let id = ListenerId(self.next_id());
        self.listeners.push(Listener {
            id,
            classes: classes.to_vec(),
            sink,
        });
        id
    }

    fn unsubscribe(&mut self, listener: ListenerId) {
        self.listeners.retain(|l| l.id != listener);
    }

    fn create_target(
        &mut self,
        program: Option<&Path>,
        arch: Option<&str>,
    ) -> EngineResult<TargetId> {
        if let Some(program) = program {
            if !self.same_program(program) {
                return Err(EngineError::new(format!(
                    "unable to find executable for '{}'",
                    program.display()
                )));
            }
        }
        if let Some(arch) = arch {
            log::debug!(target: "engine", "target architecture: {arch}");
        }
        let id = TargetId(self.next_id());
        self.target = Some(Target {
            id,
            breakpoints: BTreeMap::new(),
        });
        Ok(id)
    }

    fn delete_target(&mut self, target: TargetId) {
        if self.target.as_ref().is_some_and(|t| t.id == target) {
            self.target = None;
            self.process = None;
        }
    }

    fn launch(&mut self, target: TargetId, options: &LaunchOptions) -> EngineResult<ProcessInfo> {
        if self.target.as_ref().map(|t| t.id) != Some(target) {
            return Err(EngineError::new(format!("invalid target {target}")));
        }
        if let Some(message) = &self.faults.launch {
            return Err(EngineError::new(message.clone()));
        }
        if self.stops.is_empty() || !options.stop_at_entry {
            let info = self.new_process(ProcessState::Launching, 0);
            self.advance(None, Destination::Nowhere, ProcessState::Running);
            let state = self.process_state(info.id);
            return Ok(ProcessInfo { state, ..info });
        }

        let info = self.new_process(ProcessState::Stopped, 0);
        let thread = self.stops[0].thread;
        if let Some(process) = self.process.as_mut() {
            process.stop = Some(StopInfo {
                thread,
                reason: StopReason::None,
                data: vec![],
                description: None,
            });
        }
        Ok(info)
    }

    fn attach(&mut self, target: TargetId, options: &AttachOptions) -> EngineResult<ProcessInfo> {
        if self.target.as_ref().map(|t| t.id) != Some(target) {
            return Err(EngineError::new(format!("invalid target {target}")));
        }
        if let Some(message) = &self.faults.attach {
            return Err(EngineError::new(message.clone()));
        }
        match &options.target {
            AttachTarget::Pid(pid) if *pid != self.pid => {
                return Err(EngineError::new(format!("no such process: {pid}")));
            }
            AttachTarget::Program(path) if !self.same_program(path) => {
                return Err(EngineError::new(format!(
                    "no process found for '{}'",
                    path.display()
                )));
            }
            _ => {}
        }
        if self.stops.is_empty() {
            return Err(EngineError::new("process has nothing to attach to"));
        }

        let stop = Some(StopInfo {
            thread: self.stops[0].thread,
            reason: StopReason::Signal,
            data: vec![SIGSTOP],
            description: None,
        });
        if options.wait_for_launch {
            let info = self.new_process(ProcessState::Attaching, 0);
            if let Some(process) = self.process.as_mut() {
                process.stop = stop;
                process.state = ProcessState::Stopped;
            }
            // the awaited process shows up on its own schedule
            self.emit_state(info.id, ProcessState::Stopped);
            return Ok(info);
        }

        let info = self.new_process(ProcessState::Stopped, 0);
        if let Some(process) = self.process.as_mut() {
            process.stop = stop;
        }
        Ok(info)
    }

    fn resume(&mut self, process: ProcessId) -> EngineResult<()> {
        let p = self.process(process)?;
        if p.state != ProcessState::Stopped {
            return Err(EngineError::new("process is not stopped"));
        }
        let position = p.position;
        self.advance(Some(position), Destination::Nowhere, ProcessState::Running);
        Ok(())
    }

    fn interrupt(&mut self, process: ProcessId) -> EngineResult<()> {
        let p = self.process_mut(process)?;
        match p.state {
            ProcessState::Attaching => {
                p.state = ProcessState::Detached;
                Ok(())
            }
            ProcessState::Stopped | ProcessState::Running | ProcessState::Stepping => {
                let position = p.position;
                self.stop_at(
                    position,
                    StopReason::Signal,
                    vec![SIGSTOP],
                    Some("signal SIGSTOP".to_string()),
                );
                Ok(())
            }
            state => Err(EngineError::new(format!("can't interrupt a process in state {state}"))),
        }
    }

    fn kill(&mut self, process: ProcessId) -> EngineResult<()> {
        self.process(process)?;
        if let Some(message) = &self.faults.kill {
            return Err(EngineError::new(message.clone()));
        }
        self.exit_code = 9;
        self.exit();
        Ok(())
    }

    fn detach(&mut self, process: ProcessId) -> EngineResult<()> {
        self.process(process)?;
        if let Some(message) = &self.faults.detach {
            return Err(EngineError::new(message.clone()));
        }
        if let Some(p) = self.process.as_mut() {
            p.state = ProcessState::Detached;
        }
        self.emit_state(process, ProcessState::Detached);
        Ok(())
    }

    fn process_state(&self, process: ProcessId) -> ProcessState {
        self.process(process)
            .map(|p| p.state)
            .unwrap_or(ProcessState::Invalid)
    }

    fn exit_status(&self, process: ProcessId) -> Option<i32> {
        self.process(process).ok()?.exit_code
    }

    fn read_stdout(&mut self, process: ProcessId, buf: &mut [u8]) -> usize {
        match self.process_mut(process) {
            Ok(p) => Self::drain(&mut p.stdout, buf),
            Err(_) => 0,
        }
    }

    fn read_stderr(&mut self, process: ProcessId, buf: &mut [u8]) -> usize {
        match self.process_mut(process) {
            Ok(p) => Self::drain(&mut p.stderr, buf),
            Err(_) => 0,
        }
    }

    fn read_memory(&self, process: ProcessId, address: u64, count: usize) -> EngineResult<Vec<u8>> {
        self.process(process)?;
        let bytes = (address..address.saturating_add(count as u64))
            .map_while(|addr| self.memory.get(&addr).copied())
            .collect_vec();
        if bytes.is_empty() && count > 0 {
            return Err(EngineError::new(format!(
                "memory read failed for {address:#x}"
            )));
        }
        Ok(bytes)
    }

    fn write_memory(
        &mut self,
        process: ProcessId,
        address: u64,
        data: &[u8],
    ) -> EngineResult<usize> {
        self.process(process)?;
        let writable = (0..data.len() as u64)
            .take_while(|offset| self.memory.contains_key(&(address + offset)))
            .count();
        if writable == 0 && !data.is_empty() {
            return Err(EngineError::new(format!(
                "memory write failed for {address:#x}"
            )));
        }
        for (offset, byte) in data.iter().take(writable).enumerate() {
            self.memory.insert(address + offset as u64, *byte);
        }
        Ok(writable)
    }

    fn threads(&self, process: ProcessId) -> Vec<ThreadInfo> {
        let Ok(p) = self.process(process) else {
            return vec![];
        };
        if matches!(p.state, ProcessState::Exited | ProcessState::Detached) {
            return vec![];
        }

        let current = self.stops.get(p.position).map(|s| s.thread);
        let mut threads = vec![];
        if let Some(id) = current {
            let (reason, data, description) = match &p.stop {
                Some(stop) if stop.thread == id => {
                    (stop.reason, stop.data.clone(), stop.description.clone())
                }
                _ => (StopReason::None, vec![], None),
            };
            let spec = self.idle_threads.iter().find(|t| t.id == id);
            threads.push(ThreadInfo {
                id,
                index: 1,
                name: spec.and_then(|t| t.name.clone()),
                queue: spec.and_then(|t| t.queue.clone()),
                stop_reason: reason,
                stop_data: data,
                stop_description: description,
            });
        }
        threads.extend(
            self.idle_threads
                .iter()
                .filter(|t| Some(t.id) != current)
                .cloned(),
        );
        for (idx, thread) in threads.iter_mut().enumerate() {
            thread.index = idx as u32 + 1;
        }
        threads
    }

    fn selected_thread(&self, process: ProcessId) -> Option<ThreadId> {
        let p = self.process(process).ok()?;
        self.stops.get(p.position).map(|s| s.thread)
    }

    fn step_over(&mut self, thread: ThreadId) -> EngineResult<()> {
        self.step(thread, Destination::Depth)
    }

    fn step_into(&mut self, thread: ThreadId) -> EngineResult<()> {
        self.step(thread, |_| Destination::Anywhere)
    }

    fn step_out(&mut self, thread: ThreadId) -> EngineResult<()> {
        self.step(thread, |depth| Destination::Depth(depth.saturating_sub(1)))
    }

    fn frames(&self, thread: ThreadId) -> EngineResult<Vec<FrameInfo>> {
        let process = self.stopped_process()?;
        let position = process.position;
        let Some(stop) = self.stops.get(position).filter(|s| s.thread == thread) else {
            if self.idle_threads.iter().any(|t| t.id == thread) {
                return Ok(vec![]);
            }
            return Err(EngineError::new(format!("invalid thread {thread}")));
        };
        Ok(stop
            .frames
            .iter()
            .enumerate()
            .map(|(index, frame)| FrameInfo {
                id: Self::frame_id(position, index),
                index: index as u32,
                function: frame.function.clone(),
                path: frame.file.clone(),
                line: frame.line,
                column: frame.column,
                pc: frame.pc,
            })
            .collect())
    }

    fn frame_variables(
        &self,
        frame: FrameId,
        query: VariableQuery,
    ) -> EngineResult<Vec<ValueInfo>> {
        let f = self.frame(frame)?;
        let mut values = vec![];
        for idx in &f.locals {
            let kind = self.nodes[*idx].kind;
            if (query.arguments && kind == ValueKind::Argument)
                || (query.locals && kind != ValueKind::Argument)
            {
                values.push(self.value_info(*idx));
            }
        }
        if query.statics {
            values.extend(f.statics.iter().map(|idx| self.value_info(*idx)));
            values.extend(self.globals.iter().map(|idx| self.value_info(*idx)));
        }
        Ok(values)
    }

    fn registers(&self, frame: FrameId) -> EngineResult<Vec<ValueInfo>> {
        let f = self.frame(frame)?;
        Ok(f.registers.iter().map(|idx| self.value_info(*idx)).collect())
    }

    fn find_variable(&self, frame: FrameId, name: &str) -> EngineResult<Option<ValueInfo>> {
        let f = self.frame(frame)?;
        Ok(self
            .lookup_in_frame(Some(f), name)
            .map(|idx| self.value_info(idx)))
    }

    fn children(&self, value: ValueId) -> EngineResult<Vec<ValueInfo>> {
        let node = self.node(value)?;
        Ok(node.children.iter().map(|c| self.value_info(*c)).collect())
    }

    fn child_by_name(&self, value: ValueId, name: &str) -> EngineResult<Option<ValueInfo>> {
        let node = self.node(value)?;
        Ok(node
            .children
            .iter()
            .find(|c| self.nodes[**c].name == name)
            .map(|c| self.value_info(*c)))
    }

    fn set_value(&mut self, value: ValueId, expression: &str) -> EngineResult<ValueInfo> {
        let idx = value.0 as usize;
        let node = self.node(value)?;
        if !node.children.is_empty() {
            return Err(EngineError::new(format!(
                "can't assign to aggregate value '{}'",
                node.name
            )));
        }
        let expression = expression.trim();
        let new_value = match self.resolve_path(None, expression) {
            Some(source) => self.nodes[source].value.clone(),
            None => Some(expression.to_string()),
        };
        let node = &mut self.nodes[idx];
        node.value = new_value;
        node.summary = None;
        Ok(self.value_info(idx))
    }

    fn evaluate(&mut self, frame: Option<FrameId>, expression: &str) -> EngineResult<ValueInfo> {
        let expression = expression.trim();
        if let Ok(number) = expression.parse::<i64>() {
            self.nodes.push(Node {
                name: expression.to_string(),
                type_name: Some("int".to_string()),
                value: Some(number.to_string()),
                summary: None,
                kind: ValueKind::ConstResult,
                synthetic: true,
                address: None,
                path: expression.to_string(),
                children: vec![],
            });
            return Ok(self.value_info(self.nodes.len() - 1));
        }

        let f = frame.map(|id| self.frame(id)).transpose()?;
        self.resolve_path(f, expression)
            .map(|idx| self.value_info(idx))
            .ok_or_else(|| {
                EngineError::new(format!("error: use of undeclared identifier '{expression}'"))
            })
    }

    fn run_command(&mut self, frame: Option<FrameId>, command: &str) -> CommandOutput {
        let frame = frame.and_then(|id| self.frame(id).ok());
        let command = command.trim();
        let output = match command {
            "help" => COMMANDS.iter().map(|c| format!("{c}\n")).collect(),
            "version" => format!("scripted engine {}\n", env!("CARGO_PKG_VERSION")),
            "thread list" => match &self.process {
                Some(p) => self
                    .threads(p.id)
                    .iter()
                    .map(|t| format!("thread #{}: tid = {}\n", t.index, t.id))
                    .collect(),
                None => String::new(),
            },
            "bt" => match self.process.as_ref().and_then(|p| self.stops.get(p.position)) {
                Some(stop) => stop
                    .frames
                    .iter()
                    .enumerate()
                    .map(|(i, f)| {
                        format!(
                            "frame #{i}: {:#x} {}\n",
                            f.pc,
                            f.function.as_deref().unwrap_or("???")
                        )
                    })
                    .collect(),
                None => String::new(),
            },
            "frame variable" => match frame {
                Some(f) => f
                    .locals
                    .iter()
                    .map(|idx| {
                        let node = &self.nodes[*idx];
                        format!(
                            "({}) {} = {}\n",
                            node.type_name.as_deref().unwrap_or("?"),
                            node.name,
                            node.value.as_deref().unwrap_or("{...}")
                        )
                    })
                    .collect(),
                None => {
                    return CommandOutput {
                        output: String::new(),
                        error: Some("error: invalid frame".to_string()),
                    }
                }
            },
            other => {
                return CommandOutput {
                    output: String::new(),
                    error: Some(format!("error: '{other}' is not a valid command.")),
                }
            }
        };
        CommandOutput {
            output,
            error: None,
        }
    }

    fn complete(&self, frame: Option<FrameId>, text: &str, cursor: usize) -> Vec<String> {
        let head = text.get(..cursor.min(text.len())).unwrap_or(text);
        let word_start = head
            .char_indices()
            .rev()
            .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        let word = &head[word_start..];

        let frame = frame.and_then(|id| self.frame(id).ok());
        let names = frame
            .into_iter()
            .flat_map(|f| f.locals.iter().chain(&f.statics))
            .chain(&self.globals)
            .map(|idx| self.nodes[*idx].name.as_str());
        let commands = COMMANDS.iter().copied().filter(|_| word_start == 0);

        names
            .chain(commands)
            .filter(|candidate| candidate.starts_with(word))
            .map(ToString::to_string)
            .sorted()
            .dedup()
            .collect()
    }

    fn create_source_breakpoint(
        &mut self,
        target: TargetId,
        path: &Path,
        line: u32,
        column: Option<u32>,
    ) -> EngineResult<BreakpointId> {
        self.create_breakpoint(
            target,
            BreakpointSpec::Source {
                path: path.to_path_buf(),
                line,
                column,
            },
        )
    }

    fn create_function_breakpoint(
        &mut self,
        target: TargetId,
        name: &str,
    ) -> EngineResult<BreakpointId> {
        self.create_breakpoint(target, BreakpointSpec::Function(name.to_string()))
    }

    fn create_exception_breakpoint(
        &mut self,
        target: TargetId,
        language: Language,
        on_catch: bool,
        on_throw: bool,
    ) -> EngineResult<BreakpointId> {
        log::debug!(
            target: "engine",
            "{language} exception breakpoint (catch: {on_catch}, throw: {on_throw})"
        );
        self.create_breakpoint(target, BreakpointSpec::Exception)
    }

    fn set_breakpoint_condition(
        &mut self,
        target: TargetId,
        breakpoint: BreakpointId,
        condition: Option<&str>,
    ) -> EngineResult<()> {
        self.breakpoint_mut(target, breakpoint)?.condition = condition.map(ToString::to_string);
        Ok(())
    }

    fn breakpoint_locations(&self, target: TargetId, breakpoint: BreakpointId) -> usize {
        let Some(bp) = self
            .target
            .as_ref()
            .filter(|t| t.id == target)
            .and_then(|t| t.breakpoints.get(&breakpoint))
        else {
            return 0;
        };
        let frames = self.stops.iter().flat_map(|s| s.frames.first());
        match &bp.spec {
            BreakpointSpec::Source { path, line, .. } => frames
                .filter(|f| f.file.as_deref() == Some(path.as_path()) && f.line == Some(*line))
                .map(|f| f.pc)
                .unique()
                .count(),
            BreakpointSpec::Function(name) => usize::from(
                self.stops
                    .iter()
                    .flat_map(|s| &s.frames)
                    .any(|f| f.function.as_deref() == Some(name)),
            ),
            BreakpointSpec::Exception => 1,
        }
    }

    fn remove_breakpoint(&mut self, target: TargetId, breakpoint: BreakpointId) -> bool {
        self.target
            .as_mut()
            .filter(|t| t.id == target)
            .is_some_and(|t| t.breakpoints.remove(&breakpoint).is_some())
    }
}
