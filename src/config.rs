//! Runtime configuration types.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// How float registers are re-quantized after every write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FloatMode {
    /// Native f64 -> f32 -> f64 round-trip
    #[default]
    Native,
    /// Bit-level decode that treats an unbiased exponent of 0 as 2^-126
    Legacy,
}

/// Output format for `--dump-program`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DumpFormat {
    #[default]
    Human,
    Json,
}

/// Runtime configuration for the interpreter
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub float_mode: FloatMode,
    /// Number of scalar slots on the PUSH/POP stack
    pub stack_size: usize,
    /// Maximum number of nested CALL frames
    pub max_call_depth: usize,
    /// Abort with a fatal error after this many executed statements (None = unlimited)
    pub max_steps: Option<u64>,
    /// Print every executed statement to the diagnostic channel
    pub trace: bool,
    /// Print execution counters after the run
    pub stats: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            float_mode: FloatMode::Native,
            stack_size: 256,
            max_call_depth: 256,
            max_steps: None,
            trace: false,
            stats: false,
        }
    }
}

/// Name of the optional config file looked up next to a program.
pub const CONFIG_FILE_NAME: &str = "vasm.toml";

/// On-disk configuration (vasm.toml)
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub runtime: RuntimeSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RuntimeSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub float_mode: Option<FloatMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_call_depth: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<bool>,
}

impl ConfigFile {
    /// Load a config file from an explicit path.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
        toml::from_str(&content)
            .map_err(|e| format!("failed to parse {}: {}", path.display(), e))
    }

    /// Load `vasm.toml` from a directory if it exists.
    pub fn find(dir: &Path) -> Result<Option<Self>, String> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }
        Self::load(&path).map(Some)
    }

    /// Overlay the file's values on top of a base configuration.
    pub fn apply(&self, config: &mut RuntimeConfig) {
        let runtime = &self.runtime;
        if let Some(mode) = runtime.float_mode {
            config.float_mode = mode;
        }
        if let Some(size) = runtime.stack_size {
            config.stack_size = size;
        }
        if let Some(depth) = runtime.max_call_depth {
            config.max_call_depth = depth;
        }
        if let Some(steps) = runtime.max_steps {
            config.max_steps = if steps == 0 { None } else { Some(steps) };
        }
        if let Some(trace) = runtime.trace {
            config.trace = trace;
        }
    }
}

impl RuntimeConfig {
    /// Configuration for running `program`: the explicit config file if
    /// given, otherwise `vasm.toml` next to the program, over the defaults.
    pub fn for_program(program: &Path, explicit: Option<&Path>) -> Result<Self, String> {
        let mut config = RuntimeConfig::default();
        let file = match explicit {
            Some(path) => Some(ConfigFile::load(path)?),
            None => ConfigFile::find(program.parent().unwrap_or(Path::new(".")))?,
        };
        if let Some(file) = file {
            file.apply(&mut config);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.float_mode, FloatMode::Native);
        assert_eq!(config.stack_size, 256);
        assert_eq!(config.max_steps, None);
    }

    #[test]
    fn test_parse_config_file() {
        let file: ConfigFile = toml::from_str(
            r#"
[runtime]
float_mode = "legacy"
max_steps = 500
trace = true
"#,
        )
        .unwrap();

        let mut config = RuntimeConfig::default();
        file.apply(&mut config);
        assert_eq!(config.float_mode, FloatMode::Legacy);
        assert_eq!(config.max_steps, Some(500));
        assert!(config.trace);
        assert_eq!(config.max_call_depth, 256);
    }

    #[test]
    fn test_empty_config_file() {
        let file: ConfigFile = toml::from_str("").unwrap();
        let mut config = RuntimeConfig::default();
        file.apply(&mut config);
        assert_eq!(config.stack_size, 256);
    }

    #[test]
    fn test_zero_max_steps_means_unlimited() {
        let file: ConfigFile = toml::from_str("[runtime]\nmax_steps = 0\n").unwrap();
        let mut config = RuntimeConfig {
            max_steps: Some(10),
            ..Default::default()
        };
        file.apply(&mut config);
        assert_eq!(config.max_steps, None);
    }

    #[test]
    fn test_find_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ConfigFile::find(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_find_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "[runtime]\nstack_size = 8\n").unwrap();
        let file = ConfigFile::find(dir.path()).unwrap().unwrap();
        assert_eq!(file.runtime.stack_size, Some(8));
    }

    #[test]
    fn test_config_for_program() {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("main.vasm");
        fs::write(dir.path().join(CONFIG_FILE_NAME), "[runtime]\nmax_call_depth = 3\n").unwrap();
        let config = RuntimeConfig::for_program(&program, None).unwrap();
        assert_eq!(config.max_call_depth, 3);

        let other = dir.path().join("other.toml");
        fs::write(&other, "[runtime]\nfloat_mode = \"legacy\"\n").unwrap();
        let config = RuntimeConfig::for_program(&program, Some(&other)).unwrap();
        assert_eq!(config.float_mode, FloatMode::Legacy);
        assert_eq!(config.max_call_depth, 256);
    }

    #[test]
    fn test_invalid_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[runtime]\nfloat_mode = \"fast\"\n").unwrap();
        let err = ConfigFile::load(&path).unwrap_err();
        assert!(err.contains("failed to parse"));
    }
}
