//! Frames, scopes and values as client visible references.

use crate::dap::error::{Error, Result};
use crate::dap::protocol::DapRequest;
use crate::dap::request::{
    decode, CompletionsArguments, EvaluateArguments, ScopesArguments, SetVariableArguments,
    StackTraceArguments, VariablesArguments,
};
use crate::dap::session::reference::{Container, ReferenceTree};
use crate::dap::session::{thread_id, Session};
use crate::dap::types::{
    CompletionItem, CompletionsResponseBody, EvaluateResponseBody, Scope, ScopesResponseBody,
    SetVariableResponseBody, StackFrame, StackTraceResponseBody, Variable,
    VariablesResponseBody,
};
use crate::engine::{EngineError, FrameId, ValueInfo, ValueKind, VariableQuery};
use indexmap::IndexMap;
use std::collections::HashMap;

const LOCALS: VariableQuery = VariableQuery {
    arguments: true,
    locals: true,
    statics: false,
    in_scope_only: true,
};

const STATICS: VariableQuery = VariableQuery {
    arguments: false,
    locals: false,
    statics: true,
    in_scope_only: false,
};

/// Text shown for a value: summary, then value, then the placeholder.
pub fn display_value(value: &ValueInfo, unavailable: &str) -> String {
    value
        .summary
        .clone()
        .or_else(|| value.value.clone())
        .unwrap_or_else(|| unavailable.to_string())
}

/// Only real aggregates get a reference, synthetic children are not stable between stops.
fn expandable(value: &ValueInfo) -> bool {
    value.num_children > 0 && !value.synthetic
}

/// Keep one entry per name, a later (inner scope) entry wins but the first position is kept.
pub fn dedup_by_name(values: Vec<ValueInfo>) -> Vec<ValueInfo> {
    let mut unique: IndexMap<String, ValueInfo> = IndexMap::new();
    for value in values {
        unique.insert(value.name.clone(), value);
    }
    unique.into_values().collect()
}

/// Sibling keys for the reference tree, repeated names get a `#n` suffix.
fn sibling_keys(values: &[ValueInfo]) -> Vec<String> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    values
        .iter()
        .map(|v| {
            let n = seen.entry(v.name.as_str()).or_default();
            *n += 1;
            if *n == 1 {
                v.name.clone()
            } else {
                format!("{}#{n}", v.name)
            }
        })
        .collect()
}

fn memory_reference(value: &ValueInfo) -> Option<String> {
    value.address.map(|addr| format!("{addr:#x}"))
}

/// Reference of a value child container, 0 for leaves.
fn child_reference(
    references: &mut ReferenceTree<Container>,
    parent: Option<i64>,
    key: String,
    value: &ValueInfo,
) -> i64 {
    if expandable(value) {
        references.insert(parent, key, Container::Value(value.id))
    } else {
        0
    }
}

impl Session {
    fn container(&self, reference: i64) -> Result<Container> {
        self.references
            .get(reference)
            .copied()
            .ok_or_else(|| Error::invalid(format!("invalid variable reference {reference}")))
    }

    fn frame_of(&self, frame_id: Option<i64>) -> Result<Option<FrameId>> {
        match frame_id {
            None => Ok(None),
            Some(reference) => match self.container(reference)? {
                Container::Frame(frame) => Ok(Some(frame)),
                _ => Err(Error::invalid(format!("{reference} is not a stack frame"))),
            },
        }
    }

    pub(super) fn handle_stack_trace(&mut self, req: &DapRequest) -> Result<()> {
        let args: StackTraceArguments = decode(&req.arguments)?;
        self.live_process()?;
        let thread = thread_id(args.thread_id)?;

        let frames = self.engine()?.frames(thread)?;
        let total_frames = frames.len();
        let start = args.start_frame.unwrap_or(0).max(0) as usize;
        let levels = match args.levels {
            Some(levels) if levels > 0 => levels as usize,
            _ => total_frames,
        };

        let mut stack_frames = Vec::with_capacity(levels.min(total_frames));
        for frame in frames.into_iter().skip(start).take(levels) {
            let id = self.references.insert(
                None,
                format!("frame:{thread}:{}", frame.index),
                Container::Frame(frame.id),
            );
            let source = frame.path.as_deref().map(|p| self.client_source(p));
            stack_frames.push(StackFrame {
                id,
                name: frame
                    .function
                    .clone()
                    .unwrap_or_else(|| format!("{:#x}", frame.pc)),
                presentation_hint: source.is_none().then_some("subtle"),
                source,
                line: frame.line.map_or(0, |l| self.line_to_client(l)),
                column: frame.column.map_or(0, |c| self.column_to_client(c)),
                instruction_pointer_reference: format!("{:#x}", frame.pc),
            });
        }

        self.send_success_body(
            req,
            StackTraceResponseBody {
                stack_frames,
                total_frames,
            },
        );
        Ok(())
    }

    pub(super) fn handle_scopes(&mut self, req: &DapRequest) -> Result<()> {
        let args: ScopesArguments = decode(&req.arguments)?;
        self.live_process()?;
        let Container::Frame(frame) = self.container(args.frame_id)? else {
            return Err(Error::invalid(format!("{} is not a stack frame", args.frame_id)));
        };

        let parent = Some(args.frame_id);
        let mut scope = |key: &str, name, hint, container| Scope {
            name,
            presentation_hint: hint,
            variables_reference: self.references.insert(parent, key, container),
            expensive: false,
        };
        let scopes = vec![
            scope("locals", "Locals", Some("locals"), Container::Locals(frame)),
            scope("statics", "Statics", None, Container::Statics(frame)),
            scope("globals", "Globals", None, Container::Globals(frame)),
            scope("registers", "Registers", Some("registers"), Container::Registers(frame)),
        ];
        self.send_success_body(req, ScopesResponseBody { scopes });
        Ok(())
    }

    fn container_values(&self, container: Container) -> Result<Vec<ValueInfo>> {
        let engine = self.engine()?;
        let values = match container {
            Container::Frame(_) => {
                return Err(Error::invalid("a stack frame has no variables, use its scopes"));
            }
            Container::Locals(frame) => dedup_by_name(engine.frame_variables(frame, LOCALS)?),
            Container::Statics(frame) => engine
                .frame_variables(frame, STATICS)?
                .into_iter()
                .filter(|v| v.kind == ValueKind::Static)
                .collect(),
            Container::Globals(frame) => engine
                .frame_variables(frame, STATICS)?
                .into_iter()
                .filter(|v| v.kind == ValueKind::Global)
                .collect(),
            Container::Registers(frame) => engine.registers(frame)?,
            Container::Value(value) => engine.children(value)?,
        };
        Ok(values)
    }

    pub(super) fn handle_variables(&mut self, req: &DapRequest) -> Result<()> {
        let args: VariablesArguments = decode(&req.arguments)?;
        self.live_process()?;
        let reference = args.variables_reference;
        let values = self.container_values(self.container(reference)?)?;

        let keys = sibling_keys(&values);
        let unavailable = self.config.unavailable_marker.clone();
        let variables = values
            .into_iter()
            .zip(keys)
            .map(|(value, key)| Variable {
                variables_reference: child_reference(
                    &mut self.references,
                    Some(reference),
                    key,
                    &value,
                ),
                value: display_value(&value, &unavailable),
                evaluate_name: value.expression_path.clone(),
                memory_reference: memory_reference(&value),
                type_name: value.type_name,
                name: value.name,
            })
            .collect();

        self.send_success_body(req, VariablesResponseBody { variables });
        Ok(())
    }

    pub(super) fn handle_set_variable(&mut self, req: &DapRequest) -> Result<()> {
        let args: SetVariableArguments = decode(&req.arguments)?;
        self.live_process()?;
        let reference = args.variables_reference;
        let container = self.container(reference)?;

        let engine = self.engine()?;
        let found = match container {
            Container::Frame(_) => {
                return Err(Error::invalid("a stack frame has no variables, use its scopes"));
            }
            Container::Value(value) => engine.child_by_name(value, &args.name)?,
            Container::Locals(frame) | Container::Statics(frame) | Container::Globals(frame) => {
                engine.find_variable(frame, &args.name)?
            }
            Container::Registers(frame) => engine
                .registers(frame)?
                .into_iter()
                .find(|r| r.name == args.name),
        };
        let Some(target) = found else {
            return Err(Error::invalid(format!("no variable named `{}`", args.name)));
        };

        let updated = self.engine_mut()?.set_value(target.id, &args.value)?;
        let variables_reference =
            child_reference(&mut self.references, Some(reference), args.name, &updated);
        self.send_success_body(
            req,
            SetVariableResponseBody {
                value: display_value(&updated, &self.config.unavailable_marker),
                type_name: updated.type_name,
                variables_reference,
            },
        );
        Ok(())
    }

    pub(super) fn handle_evaluate(&mut self, req: &DapRequest) -> Result<()> {
        let args: EvaluateArguments = decode(&req.arguments)?;
        self.live_process()?;
        let frame = self.frame_of(args.frame_id)?;
        let expression = args.expression.trim_start();

        if args.is_repl() {
            if let Some(command) = expression.strip_prefix(self.config.command_sigil.as_str()) {
                let output = self.engine_mut()?.run_command(frame, command);
                if let Some(error) = output.error {
                    return Err(EngineError::new(error.trim_end()).into());
                }
                self.send_success_body(
                    req,
                    EvaluateResponseBody {
                        result: output.output,
                        type_name: None,
                        variables_reference: 0,
                        memory_reference: None,
                    },
                );
                return Ok(());
            }
        }
        let expression = expression
            .strip_prefix(self.config.expression_sigil.as_str())
            .unwrap_or(expression);

        let value = self.engine_mut()?.evaluate(frame, expression)?;
        let variables_reference = child_reference(
            &mut self.references,
            None,
            format!("evaluate:{expression}"),
            &value,
        );
        self.send_success_body(
            req,
            EvaluateResponseBody {
                result: display_value(&value, &self.config.unavailable_marker),
                memory_reference: memory_reference(&value),
                type_name: value.type_name,
                variables_reference,
            },
        );
        Ok(())
    }

    pub(super) fn handle_completions(&mut self, req: &DapRequest) -> Result<()> {
        let args: CompletionsArguments = decode(&req.arguments)?;
        self.live_process()?;
        let frame = self.frame_of(args.frame_id)?;

        let column = if self.columns_start_at1() {
            args.column - 1
        } else {
            args.column
        };
        let chars = column.max(0) as usize;
        let cursor = args
            .text
            .char_indices()
            .nth(chars)
            .map_or(args.text.len(), |(idx, _)| idx);

        let targets = self
            .engine()?
            .complete(frame, &args.text, cursor)
            .into_iter()
            .map(|label| CompletionItem { label })
            .collect();
        self.send_success_body(req, CompletionsResponseBody { targets });
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::ValueId;

    fn value(id: u64, name: &str, val: Option<&str>) -> ValueInfo {
        ValueInfo {
            id: ValueId(id),
            name: name.to_string(),
            type_name: Some("int".to_string()),
            summary: None,
            value: val.map(ToString::to_string),
            kind: ValueKind::Local,
            num_children: 0,
            synthetic: false,
            expression_path: Some(name.to_string()),
            address: None,
        }
    }

    #[test]
    fn test_shadowed_locals() {
        let values = vec![
            value(1, "x", Some("1")),
            value(2, "y", Some("2")),
            value(3, "x", Some("3")),
        ];
        let unique = dedup_by_name(values);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].name, "x");
        assert_eq!(unique[0].value.as_deref(), Some("3"));
        assert_eq!(unique[1].name, "y");
    }

    #[test]
    fn test_display_value() {
        let mut v = value(1, "s", None);
        assert_eq!(display_value(&v, "<unavailable>"), "<unavailable>");
        v.value = Some("0x1000".to_string());
        assert_eq!(display_value(&v, "<unavailable>"), "0x1000");
        v.summary = Some("\"hello\"".to_string());
        assert_eq!(display_value(&v, "<unavailable>"), "\"hello\"");
    }

    #[test]
    fn test_sibling_keys() {
        let values = vec![value(1, "a", None), value(2, "b", None), value(3, "a", None)];
        assert_eq!(sibling_keys(&values), vec!["a", "b", "a#2"]);
    }

    #[test]
    fn test_synthetic_values_are_leaves() {
        let mut tree = ReferenceTree::new(1000);
        let mut v = value(1, "vec", None);
        v.num_children = 3;
        assert_eq!(child_reference(&mut tree, None, "vec".into(), &v), 1000);

        v.synthetic = true;
        assert_eq!(child_reference(&mut tree, None, "vec".into(), &v), 0);
    }
}
