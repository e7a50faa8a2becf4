//! Debugger engine seam.
//!
//! The adapter never touches a debuggee directly: every target, process, thread, frame, value
//! and breakpoint is reached through an [`Engine`] implementation. Handles returned by the
//! engine are plain identifiers into engine-managed state, they stay valid only while the
//! process generation that produced them is alive.

pub mod script;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use strum_macros::{Display, EnumString, IntoStaticStr};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

handle!(
    /// Executable target (program image plus settings).
    TargetId
);
handle!(
    /// Running or stopped debuggee.
    ProcessId
);
handle!(ThreadId);
handle!(FrameId);
handle!(ValueId);
handle!(
    /// Engine-assigned breakpoint identity, the only identity a breakpoint has.
    BreakpointId
);
handle!(ListenerId);

/// Error reported by the engine, its message is shown to a client as is.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, IntoStaticStr)]
pub enum ProcessState {
    Invalid,
    Unloaded,
    Connected,
    Attaching,
    Launching,
    Stopped,
    Running,
    Stepping,
    Crashed,
    Detached,
    Exited,
    Suspended,
}

/// Why a thread stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum StopReason {
    Invalid,
    None,
    Trace,
    Breakpoint,
    Watchpoint,
    Signal,
    Exception,
    Exec,
    PlanComplete,
    ThreadExiting,
    Instrumentation,
    ProcessorTrace,
    Fork,
    VFork,
    VForkDone,
}

/// Storage classification of a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ValueKind {
    Invalid,
    Global,
    Static,
    Argument,
    Local,
    ThreadLocal,
    Register,
    RegisterSet,
    ConstResult,
}

/// Exception-throwing runtimes the engine can break on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum Language {
    #[strum(serialize = "C++")]
    CPlusPlus,
    #[strum(serialize = "Objective-C")]
    ObjC,
    #[strum(serialize = "Swift")]
    Swift,
}

/// Notification classes a listener subscribes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventClass {
    Target,
    Process,
    Thread,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    Target {
        target: TargetId,
        event: TargetEvent,
    },
    Process {
        process: ProcessId,
        event: ProcessEvent,
    },
    Thread {
        thread: ThreadId,
        event: ThreadEvent,
    },
}

impl EngineEvent {
    pub fn class(&self) -> EventClass {
        match self {
            EngineEvent::Target { .. } => EventClass::Target,
            EngineEvent::Process { .. } => EventClass::Process,
            EngineEvent::Thread { .. } => EventClass::Thread,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TargetEvent {
    ModulesLoaded(Vec<String>),
    ModulesUnloaded(Vec<String>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ProcessEvent {
    StateChanged {
        state: ProcessState,
        /// The process stopped and was resumed by the engine itself.
        restarted: bool,
    },
    /// Bytes are available on the debuggee standard output.
    Stdout,
    /// Bytes are available on the debuggee standard error.
    Stderr,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ThreadEvent {
    StackChanged,
    Suspended,
    Resumed,
    SelectedFrameChanged,
}

/// Receiving end of an engine subscription.
pub trait EventSink: Send {
    /// Deliver an event. Returns `false` if the receiving side is gone.
    fn deliver(&self, event: EngineEvent) -> bool;
}

impl EventSink for mpsc::Sender<EngineEvent> {
    fn deliver(&self, event: EngineEvent) -> bool {
        self.send(event).is_ok()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Platform {
    pub name: String,
    pub description: String,
}

#[derive(Clone, Debug, Default)]
pub struct LaunchOptions {
    pub arguments: Vec<String>,
    pub environment: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub stop_at_entry: bool,
}

#[derive(Clone, Debug)]
pub enum AttachTarget {
    Pid(u32),
    Program(PathBuf),
}

#[derive(Clone, Debug)]
pub struct AttachOptions {
    pub target: AttachTarget,
    /// Wait until a process with the given program appears instead of attaching right away.
    pub wait_for_launch: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProcessInfo {
    pub id: ProcessId,
    pub pid: Option<u32>,
    pub name: Option<String>,
    pub state: ProcessState,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub index: u32,
    pub name: Option<String>,
    pub queue: Option<String>,
    pub stop_reason: StopReason,
    /// Raw stop reason data, for breakpoints it is a sequence of (breakpoint, location) pairs.
    pub stop_data: Vec<u64>,
    pub stop_description: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FrameInfo {
    pub id: FrameId,
    pub index: u32,
    pub function: Option<String>,
    pub path: Option<PathBuf>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub pc: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValueInfo {
    pub id: ValueId,
    pub name: String,
    pub type_name: Option<String>,
    pub summary: Option<String>,
    pub value: Option<String>,
    pub kind: ValueKind,
    pub num_children: usize,
    /// Produced by a formatter or an expression rather than read from memory.
    pub synthetic: bool,
    pub expression_path: Option<String>,
    pub address: Option<u64>,
}

/// Result of an interpreter command.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandOutput {
    pub output: String,
    pub error: Option<String>,
}

/// Which frame variables to collect.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VariableQuery {
    pub arguments: bool,
    pub locals: bool,
    pub statics: bool,
    pub in_scope_only: bool,
}

/// A debugger engine instance.
///
/// One engine hosts at most one target with one process at a time. All methods are called from
/// the adapter's single serialized context, an implementation may run the debuggee on its own
/// threads and must deliver notifications through the subscribed [`EventSink`]s.
pub trait Engine {
    fn platforms(&self) -> Vec<Platform>;

    fn subscribe(&mut self, classes: &[EventClass], sink: Box<dyn EventSink>) -> ListenerId;
    fn unsubscribe(&mut self, listener: ListenerId);

    fn create_target(&mut self, program: Option<&Path>, arch: Option<&str>)
        -> EngineResult<TargetId>;
    fn delete_target(&mut self, target: TargetId);

    fn launch(&mut self, target: TargetId, options: &LaunchOptions) -> EngineResult<ProcessInfo>;
    /// Attach to a process. With `wait_for_launch` the call returns a process in the
    /// [`ProcessState::Attaching`] state, its appearance is reported by a later stop event.
    fn attach(&mut self, target: TargetId, options: &AttachOptions) -> EngineResult<ProcessInfo>;

    fn resume(&mut self, process: ProcessId) -> EngineResult<()>;
    fn interrupt(&mut self, process: ProcessId) -> EngineResult<()>;
    fn kill(&mut self, process: ProcessId) -> EngineResult<()>;
    fn detach(&mut self, process: ProcessId) -> EngineResult<()>;
    fn process_state(&self, process: ProcessId) -> ProcessState;
    fn exit_status(&self, process: ProcessId) -> Option<i32>;
    fn read_stdout(&mut self, process: ProcessId, buf: &mut [u8]) -> usize;
    fn read_stderr(&mut self, process: ProcessId, buf: &mut [u8]) -> usize;
    fn read_memory(&self, process: ProcessId, address: u64, count: usize) -> EngineResult<Vec<u8>>;
    fn write_memory(&mut self, process: ProcessId, address: u64, data: &[u8])
        -> EngineResult<usize>;

    fn threads(&self, process: ProcessId) -> Vec<ThreadInfo>;
    fn selected_thread(&self, process: ProcessId) -> Option<ThreadId>;
    fn step_over(&mut self, thread: ThreadId) -> EngineResult<()>;
    fn step_into(&mut self, thread: ThreadId) -> EngineResult<()>;
    fn step_out(&mut self, thread: ThreadId) -> EngineResult<()>;

    fn frames(&self, thread: ThreadId) -> EngineResult<Vec<FrameInfo>>;
    fn frame_variables(&self, frame: FrameId, query: VariableQuery) -> EngineResult<Vec<ValueInfo>>;
    fn registers(&self, frame: FrameId) -> EngineResult<Vec<ValueInfo>>;
    fn find_variable(&self, frame: FrameId, name: &str) -> EngineResult<Option<ValueInfo>>;
    fn children(&self, value: ValueId) -> EngineResult<Vec<ValueInfo>>;
    fn child_by_name(&self, value: ValueId, name: &str) -> EngineResult<Option<ValueInfo>>;
    fn set_value(&mut self, value: ValueId, expression: &str) -> EngineResult<ValueInfo>;
    fn evaluate(&mut self, frame: Option<FrameId>, expression: &str) -> EngineResult<ValueInfo>;
    fn run_command(&mut self, frame: Option<FrameId>, command: &str) -> CommandOutput;
    fn complete(&self, frame: Option<FrameId>, text: &str, cursor: usize) -> Vec<String>;

    fn create_source_breakpoint(
        &mut self,
        target: TargetId,
        path: &Path,
        line: u32,
        column: Option<u32>,
    ) -> EngineResult<BreakpointId>;
    fn create_function_breakpoint(&mut self, target: TargetId, name: &str)
        -> EngineResult<BreakpointId>;
    fn create_exception_breakpoint(
        &mut self,
        target: TargetId,
        language: Language,
        on_catch: bool,
        on_throw: bool,
    ) -> EngineResult<BreakpointId>;
    fn set_breakpoint_condition(
        &mut self,
        target: TargetId,
        breakpoint: BreakpointId,
        condition: Option<&str>,
    ) -> EngineResult<()>;
    fn breakpoint_locations(&self, target: TargetId, breakpoint: BreakpointId) -> usize;
    fn remove_breakpoint(&mut self, target: TargetId, breakpoint: BreakpointId) -> bool;
}
