use std::time::Duration;

use serde::Deserialize;

/// This structure contains all client-side configuration settings,
/// which user can specify in the code editor.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Schedule a compilation after each change, once the document has
    /// been idle for `debounce_ms` milliseconds.
    pub compile_on_change: bool,
    /// Compile the document as soon as it is saved.
    pub compile_on_save: bool,
    pub debounce_ms: u64,
    /// Index every YARA file in the workspace folder, not only the open
    /// documents.
    pub cache_workspace: bool,
    /// Path to the external rule compiler.
    pub compiler_path: String,
}

impl Config {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            compile_on_change: true,
            compile_on_save: true,
            debounce_ms: 300,
            cache_workspace: false,
            compiler_path: "yarac".to_string(),
        }
    }
}
