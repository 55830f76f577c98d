use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration-integrity faults. These are programming or packaging
/// errors in the animation table and are fatal at load time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no animation configured for `{0}`")]
    MissingConfig(String),
    #[error("animation `{name}` has an empty sprite sequence")]
    EmptySequence { name: String },
    #[error("animation `{name}` has a zero frame delay")]
    ZeroDelay { name: String },
    #[error("animation `{name}` is finite but plays zero loops")]
    ZeroLoops { name: String },
    #[error("animation `{name}` names successor `{successor}` which does not resolve")]
    UnknownSuccessor { name: String, successor: String },
    #[error("animation `{0}` is finite but has no successor")]
    MissingSuccessor(String),
    #[error("unknown animation name `{0}`")]
    UnknownName(String),
    #[error("failed to parse animation table: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid settings file {path}: {source}")]
    Settings {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// I/O faults on the shared position channel. Callers treat them as
/// best-effort: a failed publish is retried on the next cadence.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to write position record {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove position record {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode position record: {0}")]
    Encode(#[from] serde_json::Error),
}
