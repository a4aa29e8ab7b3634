use std::{io, path::PathBuf};

use crate::instance::Instance;

/// An error in an [`ordercast`][crate] operation.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("node has shut down")]
    Closed,
}

/// The group configuration could not be loaded; the node must not start.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read configuration file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("provide a comma-separated list of `instances`")]
    MissingInstances,
    #[error("invalid instance {0:?}, expected host:port")]
    Instance(String),
    #[error("instance {0} is listed more than once")]
    DuplicateInstance(Instance),
    #[error("invalid value {value:?} for `{key}`")]
    Option { key: &'static str, value: String },
    #[error("no instance at index {0} in the group")]
    UnknownInstance(usize),
}

/// A message received from the network could not be understood.
///
/// Protocol errors are logged and the offending message discarded; they never
/// stop a node.
#[derive(thiserror::Error, Clone, PartialEq, Eq, Debug)]
#[non_exhaustive]
pub enum ProtocolError {
    #[error("bad frame magic")]
    Magic,
    #[error("unsupported wire version {0}")]
    Version(u8),
    #[error("truncated frame")]
    Truncated,
    #[error("{0} unexpected bytes after message")]
    Trailing(usize),
    #[error("frame of {0} bytes exceeds the size limit")]
    TooLarge(usize),
    #[error("unknown message kind {0:#04x}")]
    Kind(u8),
    #[error("malformed message id {0:?}")]
    Id(String),
    #[error("message text is not valid UTF-8")]
    Utf8,
    #[error("originator {origin} is outside a group of {group}")]
    Origin { origin: u32, group: usize },
    #[error("acknowledgment for malformed id {0:?}")]
    AckTarget(String),
}
