//! Path translation between the client file system and the debuggee one.

use crate::dap::request::PathMapping;

#[derive(Debug, Default, Clone)]
pub struct SourceMap {
    /// Mapping from debuggee paths to the client paths.
    target_to_client: Vec<(String, String)>,
    /// Reverse mapping from client paths to debuggee paths.
    client_to_target: Vec<(String, String)>,
}

impl SourceMap {
    pub fn new(mappings: &[PathMapping]) -> Self {
        let mut sm = SourceMap::default();
        for mapping in mappings {
            sm.target_to_client
                .push((Self::norm_prefix(&mapping.remote), mapping.local.clone()));
            sm.client_to_target
                .push((Self::norm_prefix(&mapping.local), mapping.remote.clone()));
        }

        // Longest prefix wins.
        sm.target_to_client
            .sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        sm.client_to_target
            .sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        sm
    }

    pub fn map_target_to_client(&self, target_path: &str) -> String {
        Self::apply_map(target_path, &self.target_to_client)
    }

    pub fn map_client_to_target(&self, client_path: &str) -> String {
        Self::apply_map(client_path, &self.client_to_target)
    }

    fn apply_map(path: &str, mapping: &[(String, String)]) -> String {
        let normalized = Self::norm_path(path);
        for (from_norm, to_raw) in mapping {
            if normalized == from_norm.trim_end_matches('/') {
                return to_raw.clone();
            }
            if let Some(suffix) = normalized.strip_prefix(from_norm.as_str()) {
                return Self::join_with_style(to_raw, suffix);
            }
        }
        path.to_string()
    }

    fn join_with_style(prefix: &str, suffix_norm: &str) -> String {
        if suffix_norm.is_empty() {
            return prefix.to_string();
        }
        let mut out = prefix.to_string();

        if !out.ends_with('/') && !out.ends_with('\\') {
            // separator style follows the prefix
            out.push(if out.contains('\\') { '\\' } else { '/' });
        }

        if out.contains('\\') {
            out.push_str(&suffix_norm.replace('/', "\\"));
        } else {
            out.push_str(suffix_norm);
        }
        out
    }

    fn norm_prefix(s: &str) -> String {
        let mut out = Self::norm_path(s);
        if !out.ends_with('/') {
            out.push('/');
        }
        out
    }

    fn norm_path(s: &str) -> String {
        s.replace('\\', "/")
    }
}
