//! Editdesk configuration.
//!
//! Loaded from `~/.editdesk/config.toml`. Every key is optional; a missing
//! file means defaults.
//!
//! ```toml
//! projects-root = "/srv/manuscripts"
//! agent-command = "llm-editor --model big"
//! ```
//!
//! The agent command is resolved through a chain:
//!
//! 1. `--agent <command>`: explicit per-invocation override
//! 2. `EDITDESK_AGENT` env var
//! 3. `agent-command` in the config file

use std::path::PathBuf;
use std::{env, fs, io};

use serde::{Deserialize, Serialize};

use crate::storage::Storage;

/// Environment variable naming the agent command.
pub const AGENT_ENV: &str = "EDITDESK_AGENT";

/// Error message shown when no agent command can be resolved.
pub const AGENT_REQUIRED: &str = "agent required: pass --agent <command>, \
    set EDITDESK_AGENT, or add `agent-command = \"...\"` to ~/.editdesk/config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Where projects are stored. Defaults to `~/.editdesk/projects`.
    pub projects_root: Option<PathBuf>,

    /// Command implementing the agent protocol, split like a shell would.
    pub agent_command: Option<String>,
}

impl Config {
    /// Load config from `~/.editdesk/config.toml`, or defaults if absent.
    pub fn load() -> Result<Self, String> {
        let Some(path) = Self::path() else {
            return Ok(Self::default());
        };

        let contents = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(format!("failed to read {}: {e}", path.display())),
        };

        toml::from_str(&contents).map_err(|e| format!("invalid config at {}: {e}", path.display()))
    }

    /// The config file path: `~/.editdesk/config.toml`.
    #[must_use]
    pub fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".editdesk").join("config.toml"))
    }

    /// The storage root: the configured one, else the default.
    pub fn projects_root(&self) -> Result<PathBuf, String> {
        self.projects_root
            .clone()
            .or_else(Storage::default_root)
            .ok_or_else(|| "could not determine home directory".to_string())
    }

    /// Resolve the agent command: explicit flag, then env var, then config.
    pub fn resolve_agent_command(&self, explicit: Option<&str>) -> Result<String, String> {
        first_nonempty([
            explicit.map(str::to_string),
            env::var(AGENT_ENV).ok(),
            self.agent_command.clone(),
        ])
        .ok_or_else(|| AGENT_REQUIRED.to_string())
    }
}

fn first_nonempty<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .find(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kebab_case_keys() {
        let config: Config = toml::from_str(
            r#"
            projects-root = "/srv/manuscripts"
            agent-command = "llm-editor --model big"
            "#,
        )
        .unwrap();

        assert_eq!(config.projects_root, Some(PathBuf::from("/srv/manuscripts")));
        assert_eq!(config.agent_command.as_deref(), Some("llm-editor --model big"));
        assert_eq!(
            config.projects_root().unwrap(),
            PathBuf::from("/srv/manuscripts")
        );
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn unknown_keys_are_ignored_but_bad_types_are_not() {
        assert!(toml::from_str::<Config>("editor = \"vim\"").is_ok());
        assert!(toml::from_str::<Config>("agent-command = 3").is_err());
    }

    #[test]
    fn explicit_wins() {
        let config = Config {
            agent_command: Some("from-config".into()),
            ..Config::default()
        };
        assert_eq!(
            config.resolve_agent_command(Some("from-flag")).unwrap(),
            "from-flag"
        );
    }

    #[test]
    fn blank_candidates_are_skipped() {
        assert_eq!(
            first_nonempty([Some(" ".into()), None, Some("agent".into())]),
            Some("agent".into())
        );
        assert_eq!(first_nonempty::<2>([None, Some(String::new())]), None);
    }
}
