//! Ambient configuration: JSON, UTF-8, object-valued, with unknown keys
//! preserved for host access. Schema per SPEC_FULL §6.1.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// The recognized configuration keys, plus any unrecognized ones merged in
/// via `#[serde(flatten)]` so a host extension survives a round trip through
/// this crate untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_true")]
    pub cheats_enabled: bool,
    #[serde(default = "default_log_level")]
    pub log_level: u8,
    #[serde(default = "default_save_last_directory")]
    pub save_last_directory: String,
    #[serde(default)]
    pub additional_search_paths: Vec<String>,
    #[serde(flatten)]
    pub unknown: Map<String, Json>,
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> u8 {
    2
}

fn default_save_last_directory() -> String {
    "cheats/saved/".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cheats_enabled: default_true(),
            log_level: default_log_level(),
            save_last_directory: default_save_last_directory(),
            additional_search_paths: Vec::new(),
            unknown: Map::new(),
        }
    }
}

impl Config {
    /// Parses a config from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let mut config: Config = serde_json::from_str(text)?;
        config.normalize_save_last_directory();
        Ok(config)
    }

    /// A trailing `/` is appended to `save_last_directory` if missing.
    fn normalize_save_last_directory(&mut self) {
        if !self.save_last_directory.ends_with('/') {
            self.save_last_directory.push('/');
        }
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).expect("Config always serializes")
    }

    /// Log level 0-3 (0=critical only .. 3=debug) translated to an
    /// `EnvFilter` directive string, per §9.1.
    pub fn env_filter_directive(&self) -> &'static str {
        match self.log_level {
            0 => "error",
            1 => "warn",
            2 => "info",
            _ => "debug",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_schema() {
        let c = Config::default();
        assert!(c.cheats_enabled);
        assert_eq!(c.log_level, 2);
        assert_eq!(c.save_last_directory, "cheats/saved/");
        assert!(c.additional_search_paths.is_empty());
    }

    #[test]
    fn unknown_keys_are_preserved() {
        let text = r#"{"cheats_enabled": false, "host_extension_flag": true}"#;
        let c = Config::from_json(text).unwrap();
        assert!(!c.cheats_enabled);
        assert_eq!(c.unknown.get("host_extension_flag"), Some(&Json::Bool(true)));
        let round_tripped = c.to_json_pretty();
        assert!(round_tripped.contains("host_extension_flag"));
    }

    #[test]
    fn save_last_directory_gets_trailing_slash() {
        let text = r#"{"save_last_directory": "cheats/saved"}"#;
        let c = Config::from_json(text).unwrap();
        assert_eq!(c.save_last_directory, "cheats/saved/");
    }

    #[test]
    fn log_level_maps_to_env_filter_directive() {
        let mut c = Config::default();
        c.log_level = 0;
        assert_eq!(c.env_filter_directive(), "error");
        c.log_level = 3;
        assert_eq!(c.env_filter_directive(), "debug");
    }
}
