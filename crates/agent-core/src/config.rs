use serde::{Deserialize, Serialize};

fn default_max_loops() -> u32 {
    3000
}
fn default_max_retries() -> u32 {
    10
}
fn default_max_compensation_retries() -> u32 {
    1
}
fn default_retry_delay_ms() -> u64 {
    5000
}
fn default_request_timeout_secs() -> u64 {
    120
}
fn default_idle_timeout_secs() -> u64 {
    30
}
fn default_max_buffer_size() -> usize {
    100_000
}
fn default_true() -> bool {
    true
}
fn default_compaction_max_tokens() -> usize {
    128_000
}
fn default_keep_last() -> usize {
    6
}
fn default_trigger_ratio() -> f32 {
    0.85
}
fn default_tool_result_char_cap() -> usize {
    80_000
}

/// Automatic-summarization thresholds, layered over defaults the same way a
/// partial YAML/TOML override layers over the rest of this config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    #[serde(default = "default_compaction_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_keep_last")]
    pub keep_last: usize,
    #[serde(default = "default_trigger_ratio")]
    pub trigger_ratio: f32,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self { max_tokens: default_compaction_max_tokens(), keep_last: default_keep_last(), trigger_ratio: default_trigger_ratio() }
    }
}

/// The full configuration surface for one [`crate::AgentLoop`]. Every field
/// has a `#[serde(default = ...)]` so a partial override document only needs
/// to name what it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLoopConfig {
    #[serde(default = "default_max_loops")]
    pub max_loops: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_compensation_retries")]
    pub max_compensation_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,
    #[serde(default = "default_true")]
    pub stream: bool,
    #[serde(default)]
    pub thinking: bool,
    #[serde(default = "default_true")]
    pub enable_compaction: bool,
    #[serde(default)]
    pub compaction: CompactionConfig,
    #[serde(default = "default_tool_result_char_cap")]
    pub tool_result_char_cap: usize,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_loops: default_max_loops(),
            max_retries: default_max_retries(),
            max_compensation_retries: default_max_compensation_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_buffer_size: default_max_buffer_size(),
            stream: true,
            thinking: false,
            enable_compaction: true,
            compaction: CompactionConfig::default(),
            tool_result_char_cap: default_tool_result_char_cap(),
            system_prompt: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_override_layers_over_defaults() {
        let cfg: AgentLoopConfig = serde_json::from_value(serde_json::json!({"max_retries": 0})).unwrap();
        assert_eq!(cfg.max_retries, 0);
        assert_eq!(cfg.max_loops, 3000);
    }
}
