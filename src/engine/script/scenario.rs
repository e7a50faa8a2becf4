use crate::engine::{Platform, ValueKind};
use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Debuggee description replayed by [`super::ScriptedEngine`].
///
/// The program is a sequence of stop points. Execution walks the sequence in order, a
/// continue runs until a point matches a breakpoint (or raises a signal), a step moves to
/// the next suitable point. Walking past the last point exits the process.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub program: PathBuf,
    #[serde(default = "default_pid")]
    pub pid: u32,
    #[serde(default)]
    pub exit_code: i32,
    #[serde(default = "default_platforms")]
    pub platforms: Vec<PlatformSpec>,
    #[serde(default)]
    pub threads: Vec<ThreadSpec>,
    #[serde(default)]
    pub globals: Vec<ValueSpec>,
    #[serde(default)]
    pub memory: Vec<MemorySpec>,
    #[serde(default)]
    pub faults: Faults,
    #[serde(default, rename = "stop")]
    pub stops: Vec<StopSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl From<&PlatformSpec> for Platform {
    fn from(spec: &PlatformSpec) -> Self {
        Platform {
            name: spec.name.clone(),
            description: spec.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadSpec {
    pub id: u64,
    pub name: Option<String>,
    pub queue: Option<String>,
}

/// Engine operations forced to fail with the given message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Faults {
    pub launch: Option<String>,
    pub attach: Option<String>,
    pub kill: Option<String>,
    pub detach: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StopSpec {
    #[serde(default = "default_thread")]
    pub thread: u64,
    pub frames: Vec<FrameSpec>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub signal: Option<u64>,
    pub exception: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrameSpec {
    pub function: Option<String>,
    pub file: Option<PathBuf>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    #[serde(default)]
    pub pc: u64,
    #[serde(default)]
    pub locals: Vec<ValueSpec>,
    #[serde(default)]
    pub statics: Vec<ValueSpec>,
    #[serde(default)]
    pub registers: Vec<ValueSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValueSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    pub value: Option<String>,
    pub summary: Option<String>,
    pub kind: Option<String>,
    #[serde(default)]
    pub synthetic: bool,
    pub address: Option<u64>,
    #[serde(default)]
    pub children: Vec<ValueSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemorySpec {
    pub address: u64,
    pub bytes: Vec<u8>,
}

fn default_pid() -> u32 {
    4242
}

fn default_thread() -> u64 {
    1
}

fn default_platforms() -> Vec<PlatformSpec> {
    vec![PlatformSpec {
        name: "host".to_string(),
        description: "Local scripted host".to_string(),
    }]
}

impl Scenario {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read scenario {}", path.display()))?;
        data.parse()
            .with_context(|| format!("parse scenario {}", path.display()))
    }
}

impl FromStr for Scenario {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let scenario: Scenario = toml::from_str(s)?;
        scenario.validate()?;
        Ok(scenario)
    }
}

impl Scenario {
    fn validate(&self) -> anyhow::Result<()> {
        for (idx, stop) in self.stops.iter().enumerate() {
            if stop.frames.is_empty() {
                return Err(anyhow!("stop #{idx} has no frames"));
            }
        }
        let mut values: Vec<&ValueSpec> = self.globals.iter().collect();
        for frame in self.stops.iter().flat_map(|s| s.frames.iter()) {
            values.extend(&frame.locals);
            values.extend(&frame.statics);
            values.extend(&frame.registers);
        }
        while let Some(value) = values.pop() {
            value.kind()?;
            values.extend(&value.children);
        }
        Ok(())
    }
}

impl ValueSpec {
    pub fn kind(&self) -> anyhow::Result<Option<ValueKind>> {
        self.kind
            .as_deref()
            .map(|k| ValueKind::from_str(k).map_err(|_| anyhow!("unknown value kind `{k}`")))
            .transpose()
    }
}
