//! Engine notifications to protocol events.

use crate::dap::protocol::Inbound;
use crate::dap::session::{Phase, Session};
use crate::dap::types::{ContinuedEventBody, ExitedEventBody, OutputEventBody, StoppedEventBody};
use crate::engine::{
    EngineEvent, EventSink, ProcessEvent, ProcessId, ProcessState, StopReason, ThreadInfo,
};
use std::sync::mpsc::Sender;

/// Feeds engine notifications into the session queue.
pub struct QueueSink(Sender<Inbound>);

impl QueueSink {
    pub fn new(queue: Sender<Inbound>) -> Self {
        Self(queue)
    }
}

impl EventSink for QueueSink {
    fn deliver(&self, event: EngineEvent) -> bool {
        self.0.send(Inbound::Engine(event)).is_ok()
    }
}

/// Protocol `reason` of a stopped event.
pub fn stop_reason(reason: StopReason) -> &'static str {
    match reason {
        StopReason::Breakpoint => "breakpoint",
        StopReason::Exception => "exception",
        StopReason::Trace | StopReason::PlanComplete => "step",
        StopReason::Signal => "signal",
        StopReason::Watchpoint => "dataBreakpoint",
        StopReason::Invalid
        | StopReason::None
        | StopReason::Exec
        | StopReason::ThreadExiting
        | StopReason::Instrumentation
        | StopReason::ProcessorTrace
        | StopReason::Fork
        | StopReason::VFork
        | StopReason::VForkDone => "unknown",
    }
}

/// Breakpoints that caused a stop, stop data holds (breakpoint, location) pairs.
pub fn hit_breakpoints(thread: &ThreadInfo) -> Vec<i64> {
    if thread.stop_reason != StopReason::Breakpoint {
        return vec![];
    }
    thread
        .stop_data
        .iter()
        .step_by(2)
        .map(|id| *id as i64)
        .collect()
}

fn has_stop_reason(thread: &ThreadInfo) -> bool {
    !matches!(thread.stop_reason, StopReason::Invalid | StopReason::None)
}

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

impl Session {
    pub(crate) fn on_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Process { process, event } => {
                if self.process.as_ref().map(|p| p.id) != Some(process) {
                    log::debug!(target: "session", "event of unknown process {process} ignored");
                    return;
                }
                match event {
                    ProcessEvent::StateChanged { state, restarted } => {
                        self.on_state_changed(process, state, restarted)
                    }
                    ProcessEvent::Stdout => self.drain_output(process, Stream::Stdout),
                    ProcessEvent::Stderr => self.drain_output(process, Stream::Stderr),
                }
            }
            EngineEvent::Target { target, event } => {
                log::debug!(target: "session", "target {target}: {event:?}");
            }
            EngineEvent::Thread { thread, event } => {
                log::debug!(target: "session", "thread {thread}: {event:?}");
            }
        }
    }

    fn on_state_changed(&mut self, process: ProcessId, state: ProcessState, restarted: bool) {
        log::debug!(target: "session", "process {process} is {state}");

        if self.phase == Phase::Terminated {
            return;
        }
        if self.phase == Phase::AwaitingProcess {
            if state == ProcessState::Stopped {
                log::info!(target: "session", "awaited process {process} is up");
                if let Some(info) = self.process.as_mut() {
                    info.state = state;
                }
                self.process_started();
            } else if matches!(state, ProcessState::Detached | ProcessState::Exited) {
                self.phase = Phase::Terminated;
                self.send_event("terminated");
            }
            return;
        }

        if let Some(info) = self.process.as_mut() {
            info.state = state;
        }

        match state {
            ProcessState::Running | ProcessState::Stepping => {
                self.phase = Phase::Running;
                let thread_id = self
                    .engine
                    .as_deref()
                    .and_then(|e| e.selected_thread(process))
                    .map_or(0, |t| t.0 as i64);
                self.send_event_body(
                    "continued",
                    ContinuedEventBody {
                        thread_id,
                        all_threads_continued: true,
                    },
                );
            }
            ProcessState::Stopped if restarted => {}
            ProcessState::Stopped | ProcessState::Crashed | ProcessState::Suspended => {
                self.phase = Phase::Stopped;
                self.send_stopped(process);
            }
            ProcessState::Exited => {
                self.phase = Phase::Terminated;
                self.references.clear();
                let exit_code = self
                    .engine
                    .as_deref()
                    .and_then(|e| e.exit_status(process))
                    .unwrap_or(0);
                self.send_event_body("exited", ExitedEventBody { exit_code });
                self.send_event("terminated");
            }
            ProcessState::Detached => {
                self.phase = Phase::Terminated;
                self.references.clear();
                self.send_event("terminated");
            }
            ProcessState::Invalid
            | ProcessState::Unloaded
            | ProcessState::Connected
            | ProcessState::Attaching
            | ProcessState::Launching => {}
        }
    }

    /// Report a stop, the stopped thread is the first one with a stop reason.
    fn send_stopped(&mut self, process: ProcessId) {
        let Some(engine) = self.engine.as_deref() else {
            return;
        };
        let threads = engine.threads(process);
        let thread = threads
            .iter()
            .find(|t| has_stop_reason(t))
            .or_else(|| {
                let selected = engine.selected_thread(process)?;
                threads.iter().find(|t| t.id == selected)
            });

        let body = match thread {
            Some(thread) => StoppedEventBody {
                reason: stop_reason(thread.stop_reason),
                description: thread.stop_description.clone(),
                thread_id: Some(thread.id.0 as i64),
                all_threads_stopped: true,
                hit_breakpoint_ids: hit_breakpoints(thread),
            },
            None => StoppedEventBody {
                reason: stop_reason(StopReason::None),
                description: None,
                thread_id: None,
                all_threads_stopped: true,
                hit_breakpoint_ids: vec![],
            },
        };
        self.send_event_body("stopped", body);
    }

    pub(crate) fn send_entry_stop(&mut self, process: ProcessId) {
        let thread_id = self
            .engine
            .as_deref()
            .and_then(|e| e.selected_thread(process))
            .map(|t| t.0 as i64);
        self.send_event_body(
            "stopped",
            StoppedEventBody {
                reason: "entry",
                description: None,
                thread_id,
                all_threads_stopped: true,
                hit_breakpoint_ids: vec![],
            },
        );
    }

    fn drain_output(&mut self, process: ProcessId, stream: Stream) {
        let mut buf = vec![0; self.config.output_chunk_size];
        let mut chunks = vec![];
        if let Some(engine) = self.engine.as_deref_mut() {
            loop {
                let n = match stream {
                    Stream::Stdout => engine.read_stdout(process, &mut buf),
                    Stream::Stderr => engine.read_stderr(process, &mut buf),
                };
                if n == 0 {
                    break;
                }
                chunks.push(String::from_utf8_lossy(&buf[..n]).into_owned());
            }
        }

        let category = match stream {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        };
        for output in chunks {
            self.send_output(category, output);
        }
    }

    pub(crate) fn send_output(&mut self, category: &'static str, output: String) {
        self.send_event_body("output", OutputEventBody { category, output });
    }
}
