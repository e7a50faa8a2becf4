//! Typed request arguments, each decoded once from the untyped request body.

use crate::dap::error::PayloadError;
use crate::dap::payload::Payload;
use serde_json::Value;
use std::collections::HashMap;

type Result<T> = std::result::Result<T, PayloadError>;

pub trait FromPayload: Sized {
    /// Whether the request must carry an `arguments` object.
    const BODY_REQUIRED: bool = true;

    fn from_payload(payload: Payload) -> Result<Self>;
}

/// Decode request arguments into `T`.
pub fn decode<T: FromPayload>(arguments: &Value) -> Result<T> {
    let payload = if T::BODY_REQUIRED {
        Payload::new(arguments)?
    } else {
        Payload::optional(arguments)?
    };
    T::from_payload(payload)
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitializeArguments {
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    pub adapter_id: String,
    pub lines_start_at1: bool,
    pub columns_start_at1: bool,
}

impl FromPayload for InitializeArguments {
    fn from_payload(p: Payload) -> Result<Self> {
        Ok(Self {
            client_id: p.opt_string("clientID")?,
            client_name: p.opt_string("clientName")?,
            adapter_id: p.string("adapterID")?,
            lines_start_at1: p.flag("linesStartAt1", true)?,
            columns_start_at1: p.flag("columnsStartAt1", true)?,
        })
    }
}

/// Path prefix pair, `local` is a client side path, `remote` is a debuggee side one.
#[derive(Debug, Clone, PartialEq)]
pub struct PathMapping {
    pub local: String,
    pub remote: String,
}

fn path_mappings(p: &Payload) -> Result<Vec<PathMapping>> {
    p.objects("pathMappings")?
        .into_iter()
        .map(|m| {
            Ok(PathMapping {
                local: m.string("local")?,
                remote: m.string("remote")?,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaunchArguments {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<String>,
    pub arch: Option<String>,
    pub run_in_rosetta: bool,
    pub stop_on_entry: bool,
    pub path_mappings: Vec<PathMapping>,
}

impl FromPayload for LaunchArguments {
    fn from_payload(p: Payload) -> Result<Self> {
        Ok(Self {
            program: p.string("program")?,
            args: p.strings("args")?,
            env: p.string_map("env")?,
            cwd: p.opt_string("cwd")?,
            arch: p.opt_string("arch")?,
            run_in_rosetta: p.flag("runInRosetta", false)?,
            stop_on_entry: p.flag("stopOnEntry", false)?,
            path_mappings: path_mappings(&p)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttachArguments {
    pub pid: Option<u32>,
    pub program: Option<String>,
    pub wait_for: bool,
    pub stop_on_entry: bool,
    pub path_mappings: Vec<PathMapping>,
}

impl FromPayload for AttachArguments {
    fn from_payload(p: Payload) -> Result<Self> {
        Ok(Self {
            pid: p.opt_u32("pid")?,
            program: p.opt_string("program")?,
            wait_for: p.flag("waitFor", false)?,
            stop_on_entry: p.flag("stopOnEntry", false)?,
            path_mappings: path_mappings(&p)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceBreakpoint {
    pub line: i64,
    pub column: Option<i64>,
    pub condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetBreakpointsArguments {
    pub source_path: String,
    pub breakpoints: Vec<SourceBreakpoint>,
}

impl FromPayload for SetBreakpointsArguments {
    fn from_payload(p: Payload) -> Result<Self> {
        let breakpoints = p
            .objects("breakpoints")?
            .into_iter()
            .map(|bp| {
                Ok(SourceBreakpoint {
                    line: bp.i64("line")?,
                    column: bp.opt_i64("column")?,
                    condition: non_empty(bp.opt_string("condition")?),
                })
            })
            .collect::<Result<_>>()?;
        Ok(Self {
            source_path: p.object("source")?.string("path")?,
            breakpoints,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionBreakpoint {
    pub name: String,
    pub condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetFunctionBreakpointsArguments {
    pub breakpoints: Vec<FunctionBreakpoint>,
}

impl FromPayload for SetFunctionBreakpointsArguments {
    fn from_payload(p: Payload) -> Result<Self> {
        let breakpoints = p
            .objects("breakpoints")?
            .into_iter()
            .map(|bp| {
                Ok(FunctionBreakpoint {
                    name: bp.string("name")?,
                    condition: non_empty(bp.opt_string("condition")?),
                })
            })
            .collect::<Result<_>>()?;
        Ok(Self { breakpoints })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetExceptionBreakpointsArguments {
    pub filters: Vec<String>,
}

impl FromPayload for SetExceptionBreakpointsArguments {
    fn from_payload(p: Payload) -> Result<Self> {
        Ok(Self {
            filters: p.strings("filters")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DisconnectArguments {
    pub terminate_debuggee: Option<bool>,
}

impl FromPayload for DisconnectArguments {
    const BODY_REQUIRED: bool = false;

    fn from_payload(p: Payload) -> Result<Self> {
        Ok(Self {
            terminate_debuggee: p.opt_bool("terminateDebuggee")?,
        })
    }
}

/// Arguments of requests addressed to a single thread (pause, continue, steps).
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadArguments {
    pub thread_id: i64,
}

impl FromPayload for ThreadArguments {
    fn from_payload(p: Payload) -> Result<Self> {
        Ok(Self {
            thread_id: p.i64("threadId")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StackTraceArguments {
    pub thread_id: i64,
    pub start_frame: Option<i64>,
    pub levels: Option<i64>,
}

impl FromPayload for StackTraceArguments {
    fn from_payload(p: Payload) -> Result<Self> {
        Ok(Self {
            thread_id: p.i64("threadId")?,
            start_frame: p.opt_i64("startFrame")?,
            levels: p.opt_i64("levels")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScopesArguments {
    pub frame_id: i64,
}

impl FromPayload for ScopesArguments {
    fn from_payload(p: Payload) -> Result<Self> {
        Ok(Self {
            frame_id: p.i64("frameId")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariablesArguments {
    pub variables_reference: i64,
}

impl FromPayload for VariablesArguments {
    fn from_payload(p: Payload) -> Result<Self> {
        Ok(Self {
            variables_reference: p.i64("variablesReference")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetVariableArguments {
    pub variables_reference: i64,
    pub name: String,
    pub value: String,
}

impl FromPayload for SetVariableArguments {
    fn from_payload(p: Payload) -> Result<Self> {
        Ok(Self {
            variables_reference: p.i64("variablesReference")?,
            name: p.string("name")?,
            value: p.string("value")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluateArguments {
    pub expression: String,
    pub frame_id: Option<i64>,
    pub context: Option<String>,
}

impl EvaluateArguments {
    pub fn is_repl(&self) -> bool {
        self.context.as_deref() == Some("repl")
    }
}

impl FromPayload for EvaluateArguments {
    fn from_payload(p: Payload) -> Result<Self> {
        Ok(Self {
            expression: p.string("expression")?,
            frame_id: p.opt_i64("frameId")?,
            context: p.opt_string("context")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionsArguments {
    pub text: String,
    pub column: i64,
    pub frame_id: Option<i64>,
}

impl FromPayload for CompletionsArguments {
    fn from_payload(p: Payload) -> Result<Self> {
        Ok(Self {
            text: p.string("text")?,
            column: p.i64("column")?,
            frame_id: p.opt_i64("frameId")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadMemoryArguments {
    pub memory_reference: String,
    pub offset: i64,
    pub count: i64,
}

impl FromPayload for ReadMemoryArguments {
    fn from_payload(p: Payload) -> Result<Self> {
        Ok(Self {
            memory_reference: p.string("memoryReference")?,
            offset: p.opt_i64("offset")?.unwrap_or_default(),
            count: p.i64("count")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteMemoryArguments {
    pub memory_reference: String,
    pub offset: i64,
    pub data: String,
}

impl FromPayload for WriteMemoryArguments {
    fn from_payload(p: Payload) -> Result<Self> {
        Ok(Self {
            memory_reference: p.string("memoryReference")?,
            offset: p.opt_i64("offset")?.unwrap_or_default(),
            data: p.string("data")?,
        })
    }
}

fn non_empty(condition: Option<String>) -> Option<String> {
    condition.filter(|c| !c.trim().is_empty())
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_launch() {
        let args: LaunchArguments = decode(&json!({
            "program": "/bin/demo",
            "args": ["--fast"],
            "env": {"RUST_LOG": "debug"},
            "stopOnEntry": true,
            "pathMappings": [{"local": "/home/me/src", "remote": "/src"}],
        }))
        .unwrap();

        assert_eq!(args.program, "/bin/demo");
        assert_eq!(args.args, vec!["--fast"]);
        assert_eq!(args.env["RUST_LOG"], "debug");
        assert!(args.stop_on_entry);
        assert!(!args.run_in_rosetta);
        assert_eq!(args.path_mappings[0].remote, "/src");
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            decode::<LaunchArguments>(&json!({"args": []})).unwrap_err(),
            PayloadError::Missing {
                field: "program".to_string()
            }
        );
        assert_eq!(
            decode::<LaunchArguments>(&Value::Null).unwrap_err(),
            PayloadError::MissingBody
        );
        assert_eq!(
            decode::<SetBreakpointsArguments>(&json!({
                "source": {"path": "/a.c"},
                "breakpoints": [{"line": "ten"}],
            }))
            .unwrap_err(),
            PayloadError::TypeMismatch {
                field: "breakpoints.line".to_string(),
                expected: "integer"
            }
        );
    }

    #[test]
    fn test_optional_body() {
        let args: DisconnectArguments = decode(&Value::Null).unwrap();
        assert_eq!(args.terminate_debuggee, None);
    }

    #[test]
    fn test_empty_condition_is_none() {
        let args: SetFunctionBreakpointsArguments = decode(&json!({
            "breakpoints": [
                {"name": "main", "condition": " "},
                {"name": "f", "condition": "x > 1"},
            ],
        }))
        .unwrap();
        assert_eq!(args.breakpoints[0].condition, None);
        assert_eq!(args.breakpoints[1].condition.as_deref(), Some("x > 1"));
    }
}
