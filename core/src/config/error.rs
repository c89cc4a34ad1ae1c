//! Error types for configuration loading and validation

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load settings from {path}")]
    LoadSettings {
        path: PathBuf,
        #[source]
        source: confy::ConfyError,
    },

    #[error("failed to read {path}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read directory {path}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML in {path}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("no dungeon types configured")]
    EmptySelection,

    #[error("selection weight at position {index} is zero")]
    ZeroWeight { index: usize },

    #[error("invalid dungeon type '{id}': {reason}")]
    InvalidDungeon { id: String, reason: String },

    #[error("dungeon type '{id}' is defined more than once")]
    DuplicateDungeon { id: String },

    #[error("invalid skill '{skill}': {reason}")]
    InvalidSkill { skill: String, reason: String },

    #[error("invalid settings: {reason}")]
    InvalidSettings { reason: String },

    #[error("unknown skill '{skill}'")]
    UnknownSkill { skill: String },
}
