use anyhow::Context;
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Simple file-based tracer for adapter diagnostics.
#[derive(Clone)]
pub struct FileTracer {
    file: Arc<Mutex<std::fs::File>>,
    /// Write protocol traffic, not only lifecycle lines.
    traffic: bool,
}

impl FileTracer {
    pub fn new(path: &std::path::Path, traffic: bool) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file {}", path.display()))?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
            traffic,
        })
    }

    pub fn line(&self, text: &str) {
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{text}");
        }
    }

    pub fn inbound(&self, message: &Value) {
        self.message("<-", message);
    }

    pub fn outbound(&self, message: &Value) {
        self.message("->", message);
    }

    fn message(&self, direction: &str, message: &Value) {
        if !self.traffic {
            return;
        }
        if let Ok(line) = serde_json::to_string(message) {
            self.line(&format!("{direction} {line}"));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trace_traffic() {
        let path = std::env::temp_dir().join(format!("dapbridge-trace-{}.log", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let tracer = FileTracer::new(&path, true).unwrap();
        tracer.line("client connected");
        tracer.inbound(&json!({"seq": 1}));
        tracer.outbound(&json!({"seq": 2}));

        let quiet = FileTracer::new(&path, false).unwrap();
        quiet.inbound(&json!({"seq": 3}));

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "client connected\n<- {\"seq\":1}\n-> {\"seq\":2}\n"
        );
        let _ = std::fs::remove_file(&path);
    }
}
