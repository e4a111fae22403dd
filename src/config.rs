use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use goalrun::domain::{DEFAULT_MAX_ITERATIONS, DEFAULT_MODEL};
use goalrun::events::DEFAULT_QUEUE_CAPACITY;
use goalrun::goals::{CommandGoal, GoalRegistry};
use goalrun::llm::{ANTHROPIC_API_URL, AnthropicConfig};
use goalrun::manager::RunManagerConfig;
use goalrun::runner::{DEFAULT_HISTORY_WINDOW, DEFAULT_MAX_HISTORY_OUTPUT_CHARS, OrchestratorConfig};
use goalrun::tools::{DEFAULT_MAX_OUTPUT_CHARS, DEFAULT_TOOL_TIMEOUT, SafetyGuard, ToolRegistry};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub llm: LlmConfig,
    pub run: RunDefaults,
    pub tools: ToolsConfig,
    pub storage: StorageConfig,
    /// Extra command goals, registered next to the presets
    pub goals: BTreeMap<String, GoalConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
    pub api_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 8192,
            timeout_ms: 300000,
            api_url: ANTHROPIC_API_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunDefaults {
    pub max_iterations: u32,
    pub history_window: usize,
    pub max_history_output_chars: usize,
    pub event_queue_capacity: usize,
    pub human_in_the_loop: bool,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            history_window: DEFAULT_HISTORY_WINDOW,
            max_history_output_chars: DEFAULT_MAX_HISTORY_OUTPUT_CHARS,
            event_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            human_in_the_loop: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub default_timeout_ms: u64,
    pub max_output_bytes: usize,
    /// Substrings that block a shell command outright
    pub blocked_commands: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TOOL_TIMEOUT.as_millis() as u64,
            max_output_bytes: DEFAULT_MAX_OUTPUT_CHARS,
            blocked_commands: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub checkpoint_dir: PathBuf,
    pub history_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("goalrun");
        Self {
            checkpoint_dir: base.join("checkpoints"),
            history_dir: base,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalConfig {
    pub command: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            llm: LlmConfig::default(),
            run: RunDefaults::default(),
            tools: ToolsConfig::default(),
            storage: StorageConfig::default(),
            goals: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    pub fn anthropic_config(&self) -> AnthropicConfig {
        AnthropicConfig {
            model: self.llm.model.clone(),
            max_tokens: self.llm.max_tokens,
            timeout: Duration::from_millis(self.llm.timeout_ms),
            api_url: self.llm.api_url.clone(),
        }
    }

    pub fn run_manager_config(&self) -> RunManagerConfig {
        RunManagerConfig {
            orchestrator: OrchestratorConfig {
                history_window: self.run.history_window,
                max_history_output_chars: self.run.max_history_output_chars,
            },
            event_queue_capacity: self.run.event_queue_capacity,
        }
    }

    pub fn safety_guard(&self) -> Arc<SafetyGuard> {
        Arc::new(SafetyGuard::with_blocked_commands(self.tools.blocked_commands.iter().cloned()))
    }

    pub fn tool_registry(&self) -> ToolRegistry {
        ToolRegistry::standard()
            .with_default_timeout(Duration::from_millis(self.tools.default_timeout_ms))
            .with_max_output_chars(self.tools.max_output_bytes)
    }

    /// Presets plus config-defined goals. A config goal replaces a preset of
    /// the same name.
    pub fn goal_registry(&self) -> GoalRegistry {
        let mut registry = GoalRegistry::standard();
        for (name, goal) in &self.goals {
            let mut command_goal = CommandGoal::new(name, &goal.command);
            if let Some(prompt) = &goal.prompt {
                command_goal = command_goal.with_prompt(prompt);
            }
            if let Some(timeout_ms) = goal.timeout_ms {
                command_goal = command_goal.with_timeout(Duration::from_millis(timeout_ms));
            }
            registry.register(Arc::new(command_goal));
        }
        registry
    }
}
