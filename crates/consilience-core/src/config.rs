use crate::error::Result;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// TriggerConfig
// ---------------------------------------------------------------------------

/// Context-accumulation wait for direct triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default = "default_wait_seconds")]
    pub wait_seconds: u64,
    #[serde(default = "default_message_count")]
    pub message_count: u64,
}

fn default_wait_seconds() -> u64 {
    5
}

fn default_message_count() -> u64 {
    5
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            wait_seconds: default_wait_seconds(),
            message_count: default_message_count(),
        }
    }
}

impl TriggerConfig {
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_seconds)
    }
}

// ---------------------------------------------------------------------------
// MonitorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_startup_delay")]
    pub startup_delay_seconds: u64,
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    /// Upper bound on one check: detection plus specialist fan-out.
    #[serde(default = "default_check_timeout")]
    pub check_timeout_seconds: u64,
}

fn default_startup_delay() -> u64 {
    120
}

fn default_interval() -> u64 {
    90
}

fn default_check_timeout() -> u64 {
    60
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            startup_delay_seconds: default_startup_delay(),
            interval_seconds: default_interval(),
            check_timeout_seconds: default_check_timeout(),
        }
    }
}

impl MonitorConfig {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_seconds)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_seconds)
    }
}

// ---------------------------------------------------------------------------
// DedupConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_window")]
    pub window_seconds: u64,
    /// Cap on remembered delivered responses. Admitted findings are bounded
    /// by the window alone.
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

fn default_window() -> u64 {
    300
}

fn default_max_records() -> usize {
    5
}

fn default_max_parallel() -> usize {
    4
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window(),
            max_records: default_max_records(),
            max_parallel: default_max_parallel(),
        }
    }
}

impl DedupConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

// ---------------------------------------------------------------------------
// SpecialistConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistConfig {
    #[serde(default = "default_max_domains")]
    pub max_domains: usize,
    #[serde(default = "default_specialist_timeout")]
    pub timeout_seconds: u64,
}

fn default_max_domains() -> usize {
    2
}

fn default_specialist_timeout() -> u64 {
    30
}

impl Default for SpecialistConfig {
    fn default() -> Self {
        Self {
            max_domains: default_max_domains(),
            timeout_seconds: default_specialist_timeout(),
        }
    }
}

impl SpecialistConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

// ---------------------------------------------------------------------------
// BridgeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_call_timeout")]
    pub call_timeout_seconds: u64,
    /// Extra attempts for `classify_trigger` when the service is unreachable.
    /// None by default: an unreachable classifier drops the trigger.
    #[serde(default = "default_classify_retries")]
    pub classify_retries: u32,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

fn default_call_timeout() -> u64 {
    20
}

fn default_classify_retries() -> u32 {
    0
}

fn default_retry_backoff() -> u64 {
    250
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            call_timeout_seconds: default_call_timeout(),
            classify_retries: default_classify_retries(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

impl BridgeConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_seconds)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

// ---------------------------------------------------------------------------
// QueueConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_write_backoff")]
    pub write_retry_backoff_ms: u64,
}

fn default_write_backoff() -> u64 {
    100
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            write_retry_backoff_ms: default_write_backoff(),
        }
    }
}

impl QueueConfig {
    pub fn write_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.write_retry_backoff_ms)
    }
}

// ---------------------------------------------------------------------------
// ResponseTexts
// ---------------------------------------------------------------------------

/// Fixed texts the core emits without consulting a specialist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseTexts {
    #[serde(default = "default_clarification")]
    pub clarification: String,
    #[serde(default = "default_unclear_question")]
    pub unclear_question: String,
    #[serde(default = "default_correction_prefix")]
    pub correction_prefix: String,
}

fn default_clarification() -> String {
    "I didn't catch that clearly, could you repeat?".to_string()
}

fn default_unclear_question() -> String {
    "I'm not sure I understand the question. Could you clarify?".to_string()
}

fn default_correction_prefix() -> String {
    "Quick correction:".to_string()
}

impl Default for ResponseTexts {
    fn default() -> Self {
        Self {
            clarification: default_clarification(),
            unclear_question: default_unclear_question(),
            correction_prefix: default_correction_prefix(),
        }
    }
}

// ---------------------------------------------------------------------------
// LlmConfig
// ---------------------------------------------------------------------------

/// Endpoint and models for the HTTP-backed collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_decision_model")]
    pub decision_model: String,
    #[serde(default = "default_analysis_model")]
    pub analysis_model: String,
    #[serde(default = "default_specialist_model")]
    pub specialist_model: String,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_decision_model() -> String {
    "gpt-4o".to_string()
}

fn default_analysis_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_specialist_model() -> String {
    "gpt-4o".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            decision_model: default_decision_model(),
            analysis_model: default_analysis_model(),
            specialist_model: default_specialist_model(),
        }
    }
}

// ---------------------------------------------------------------------------
// OrchestratorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub specialists: SpecialistConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub responses: ResponseTexts,
    #[serde(default)]
    pub llm: LlmConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            trigger: TriggerConfig::default(),
            monitor: MonitorConfig::default(),
            dedup: DedupConfig::default(),
            specialists: SpecialistConfig::default(),
            bridge: BridgeConfig::default(),
            queue: QueueConfig::default(),
            responses: ResponseTexts::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Load `<root>/.consilience/config.yaml`, or defaults when absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: OrchestratorConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut error = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            })
        };

        if self.trigger.wait_seconds == 0 && self.trigger.message_count == 0 {
            error("trigger.wait_seconds and trigger.message_count are both 0".into());
        }
        if self.monitor.interval_seconds == 0 {
            error("monitor.interval_seconds must be greater than 0".into());
        }
        if self.specialists.max_domains == 0 {
            error("specialists.max_domains must be at least 1".into());
        }
        if self.dedup.max_parallel == 0 {
            error("dedup.max_parallel must be at least 1".into());
        }
        for (name, secs) in [
            ("bridge.call_timeout_seconds", self.bridge.call_timeout_seconds),
            ("specialists.timeout_seconds", self.specialists.timeout_seconds),
            ("monitor.check_timeout_seconds", self.monitor.check_timeout_seconds),
        ] {
            if secs == 0 {
                error(format!("{name} must be greater than 0"));
            }
        }

        if self.specialists.max_domains > 2 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "specialists.max_domains is {}; responses above 2 perspectives get long",
                    self.specialists.max_domains
                ),
            });
        }
        if self.monitor.check_timeout_seconds > self.monitor.interval_seconds {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "monitor.check_timeout_seconds exceeds monitor.interval_seconds; \
                          ticks may run back to back"
                    .into(),
            });
        }
        if self.dedup.max_records == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "dedup.max_records is 0; only queued items are checked for repeats"
                    .into(),
            });
        }
        for (name, text) in [
            ("responses.clarification", &self.responses.clarification),
            ("responses.unclear_question", &self.responses.unclear_question),
        ] {
            if text.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("{name} is empty"),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let cfg = OrchestratorConfig::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: OrchestratorConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.trigger.wait_seconds, 5);
        assert_eq!(parsed.monitor.startup_delay_seconds, 120);
        assert_eq!(parsed.llm, LlmConfig::default());
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "monitor:\n  interval_seconds: 30\n";
        let cfg: OrchestratorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.monitor.interval_seconds, 30);
        assert_eq!(cfg.monitor.startup_delay_seconds, 120);
        assert_eq!(cfg.dedup.window_seconds, 300);
        assert_eq!(cfg.specialists.max_domains, 2);
        assert_eq!(cfg.responses.correction_prefix, "Quick correction:");
    }

    #[test]
    fn load_without_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = OrchestratorConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.trigger.message_count, 5);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = OrchestratorConfig::default();
        cfg.bridge.classify_retries = 3;
        cfg.save(dir.path()).unwrap();
        let loaded = OrchestratorConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.bridge.classify_retries, 3);
    }

    #[test]
    fn default_config_validates_clean() {
        assert!(OrchestratorConfig::default().validate().is_empty());
    }

    #[test]
    fn zero_interval_is_an_error() {
        let mut cfg = OrchestratorConfig::default();
        cfg.monitor.interval_seconds = 0;
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("interval_seconds")));
    }

    #[test]
    fn wide_fanout_is_a_warning() {
        let mut cfg = OrchestratorConfig::default();
        cfg.specialists.max_domains = 4;
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, WarnLevel::Warning);
    }
}
