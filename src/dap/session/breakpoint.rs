//! Breakpoint reconciliation.
//!
//! A client always sends the complete breakpoint set of a scope (one source file, all
//! function breakpoints or all exception filters). Engine breakpoints are matched against the
//! new set by a key, a matched breakpoint keeps its engine identity.

use crate::dap::error::{Error, Result};
use crate::dap::types::ExceptionBreakpointsFilter;
use crate::engine::{BreakpointId, Engine, Language, TargetId};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::hash::Hash;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use strum::IntoEnumIterator;
use strum_macros::{EnumIter, EnumString, IntoStaticStr};

/// One kind of breakpoint, tells how to key, create and update it.
pub trait BreakpointKind {
    type Key: Hash + Eq + Clone;
    type Descriptor: Clone;

    fn key(descriptor: &Self::Descriptor) -> Self::Key;

    fn install(
        engine: &mut dyn Engine,
        target: TargetId,
        descriptor: &Self::Descriptor,
    ) -> Result<BreakpointId>;

    /// Apply changes of an existing breakpoint descriptor.
    fn update(
        _engine: &mut dyn Engine,
        _target: TargetId,
        _id: BreakpointId,
        _old: &Self::Descriptor,
        _new: &Self::Descriptor,
    ) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Installed<D> {
    pub id: BreakpointId,
    pub descriptor: D,
}

/// Installed breakpoints of a single scope, in the order a client sent them.
pub type Table<K> =
    IndexMap<<K as BreakpointKind>::Key, Installed<<K as BreakpointKind>::Descriptor>>;

/// Bring engine breakpoints of a scope in line with the `requested` set.
///
/// Return identifiers in the request order. On failure the breakpoints created so far stay
/// installed and recorded, breakpoints of the previous set that were not matched yet are
/// left untouched.
pub fn reconcile<K: BreakpointKind>(
    engine: &mut dyn Engine,
    target: TargetId,
    table: &mut Table<K>,
    requested: &[K::Descriptor],
) -> Result<Vec<BreakpointId>> {
    let mut previous = std::mem::take(table);
    let mut ids = Vec::with_capacity(requested.len());

    for descriptor in requested {
        let key = K::key(descriptor);

        let installed = match previous
            .shift_remove(&key)
            .or_else(|| table.shift_remove(&key))
        {
            Some(mut installed) => {
                let updated = K::update(
                    engine,
                    target,
                    installed.id,
                    &installed.descriptor,
                    descriptor,
                );
                installed.descriptor = descriptor.clone();
                table.insert(key, installed.clone());
                if let Err(e) = updated {
                    table.extend(previous);
                    return Err(e);
                }
                installed
            }
            None => match K::install(engine, target, descriptor) {
                Ok(id) => {
                    let installed = Installed {
                        id,
                        descriptor: descriptor.clone(),
                    };
                    table.insert(key, installed.clone());
                    installed
                }
                Err(e) => {
                    table.extend(previous);
                    return Err(e);
                }
            },
        };
        ids.push(installed.id);
    }

    for (_, stale) in previous {
        if !engine.remove_breakpoint(target, stale.id) {
            log::debug!(target: "session", "breakpoint {} was already gone", stale.id);
        }
    }

    Ok(ids)
}

fn apply_condition(
    engine: &mut dyn Engine,
    target: TargetId,
    id: BreakpointId,
    old: Option<&str>,
    new: Option<&str>,
) -> Result<()> {
    if old != new {
        engine.set_breakpoint_condition(target, id, new)?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescriptor {
    pub path: PathBuf,
    pub line: u32,
    pub column: Option<u32>,
    pub condition: Option<String>,
}

pub struct SourceKind;

impl BreakpointKind for SourceKind {
    type Key = (u32, Option<u32>);
    type Descriptor = SourceDescriptor;

    fn key(d: &SourceDescriptor) -> Self::Key {
        (d.line, d.column)
    }

    fn install(
        engine: &mut dyn Engine,
        target: TargetId,
        d: &SourceDescriptor,
    ) -> Result<BreakpointId> {
        let id = engine.create_source_breakpoint(target, &d.path, d.line, d.column)?;
        apply_condition(engine, target, id, None, d.condition.as_deref())?;
        Ok(id)
    }

    fn update(
        engine: &mut dyn Engine,
        target: TargetId,
        id: BreakpointId,
        old: &SourceDescriptor,
        new: &SourceDescriptor,
    ) -> Result<()> {
        apply_condition(engine, target, id, old.condition.as_deref(), new.condition.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDescriptor {
    pub name: String,
    pub condition: Option<String>,
}

pub struct FunctionKind;

impl BreakpointKind for FunctionKind {
    type Key = String;
    type Descriptor = FunctionDescriptor;

    fn key(d: &FunctionDescriptor) -> String {
        d.name.clone()
    }

    fn install(
        engine: &mut dyn Engine,
        target: TargetId,
        d: &FunctionDescriptor,
    ) -> Result<BreakpointId> {
        let id = engine.create_function_breakpoint(target, &d.name)?;
        apply_condition(engine, target, id, None, d.condition.as_deref())?;
        Ok(id)
    }

    fn update(
        engine: &mut dyn Engine,
        target: TargetId,
        id: BreakpointId,
        old: &FunctionDescriptor,
        new: &FunctionDescriptor,
    ) -> Result<()> {
        apply_condition(engine, target, id, old.condition.as_deref(), new.condition.as_deref())
    }
}

/// Supported exception breakpoint filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, EnumIter, IntoStaticStr)]
pub enum ExceptionFilter {
    #[strum(serialize = "cpp_throw")]
    CppThrow,
    #[strum(serialize = "cpp_catch")]
    CppCatch,
    #[strum(serialize = "objc_throw")]
    ObjcThrow,
    #[strum(serialize = "objc_catch")]
    ObjcCatch,
    #[strum(serialize = "swift_throw")]
    SwiftThrow,
}

impl ExceptionFilter {
    /// Engine exception breakpoint parameters: language, on catch, on throw.
    pub fn breakpoint(self) -> (Language, bool, bool) {
        match self {
            ExceptionFilter::CppThrow => (Language::CPlusPlus, false, true),
            ExceptionFilter::CppCatch => (Language::CPlusPlus, true, false),
            ExceptionFilter::ObjcThrow => (Language::ObjC, false, true),
            ExceptionFilter::ObjcCatch => (Language::ObjC, true, false),
            ExceptionFilter::SwiftThrow => (Language::Swift, false, true),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ExceptionFilter::CppThrow => "C++: on throw",
            ExceptionFilter::CppCatch => "C++: on catch",
            ExceptionFilter::ObjcThrow => "Objective-C: on throw",
            ExceptionFilter::ObjcCatch => "Objective-C: on catch",
            ExceptionFilter::SwiftThrow => "Swift: on throw",
        }
    }

    /// Filter descriptors advertised to a client.
    pub fn descriptors() -> Vec<ExceptionBreakpointsFilter> {
        ExceptionFilter::iter()
            .map(|f| ExceptionBreakpointsFilter {
                filter: f.into(),
                label: f.label(),
                default: false,
            })
            .collect()
    }
}

pub struct ExceptionKind;

impl BreakpointKind for ExceptionKind {
    type Key = String;
    /// Filter name as sent by a client, validated on install.
    type Descriptor = String;

    fn key(d: &String) -> String {
        d.clone()
    }

    fn install(engine: &mut dyn Engine, target: TargetId, d: &String) -> Result<BreakpointId> {
        let filter = ExceptionFilter::from_str(d)
            .map_err(|_| Error::invalid(format!("unknown exception filter `{d}`")))?;
        let (language, on_catch, on_throw) = filter.breakpoint();
        Ok(engine.create_exception_breakpoint(target, language, on_catch, on_throw)?)
    }
}

/// Installed breakpoints of a session.
#[derive(Default)]
pub struct Breakpoints {
    pub sources: HashMap<PathBuf, Table<SourceKind>>,
    pub functions: Table<FunctionKind>,
    pub exceptions: Table<ExceptionKind>,
}

impl Breakpoints {
    /// Every installed breakpoint with its condition.
    pub fn conditional(&self) -> impl Iterator<Item = BreakpointId> + '_ {
        let sources = self
            .sources
            .values()
            .flat_map(|t| t.values())
            .filter(|bp| bp.descriptor.condition.is_some())
            .map(|bp| bp.id);
        let functions = self
            .functions
            .values()
            .filter(|bp| bp.descriptor.condition.is_some())
            .map(|bp| bp.id);
        sources.chain(functions)
    }

    pub fn clear(&mut self) {
        self.sources.clear();
        self.functions.clear();
        self.exceptions.clear();
    }
}

/// Make `path` absolute and drop `.` and `..` components without touching the file system.
pub fn normalize_path(path: &Path, cwd: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
