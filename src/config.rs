use std::{path::Path, str::FromStr, time::Duration};

use crate::{error::ConfigError, instance::Group};

/// A node's group membership and tuning, as read from a properties file.
///
/// ```
/// use ordercast::Config;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config: Config = "
///     # members, in originator order
///     instances = 127.0.0.1:7000, 127.0.0.1:7001
///     stall_timeout_ms = 2500
/// "
/// .parse()?;
///
/// assert_eq!(config.group.len(), 2);
/// assert_eq!(config.options.stall_timeout.map(|t| t.as_millis()), Some(2500));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    pub group: Group,
    pub options: Options,
}

impl Config {
    /// Read and parse the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;

        text.parse()
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut group: Option<Group> = None;
        let mut options = Options::default();

        for line in s.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }

            match line.split_once('=').map(|(k, v)| (k.trim(), v.trim())) {
                Some(("instances", value)) => group = Some(value.parse()?),
                Some(("stall_timeout_ms", value)) => {
                    let timeout = millis("stall_timeout_ms", value)?;
                    if timeout.is_zero() {
                        return Err(ConfigError::Option {
                            key: "stall_timeout_ms",
                            value: value.to_owned(),
                        });
                    }
                    options.stall_timeout = Some(timeout)
                }
                Some(("read_timeout_ms", value)) => {
                    options.read_timeout = millis("read_timeout_ms", value)?
                }
                Some(("max_message_size", value)) => {
                    options.max_message_size =
                        value.parse().map_err(|_| ConfigError::Option {
                            key: "max_message_size",
                            value: value.to_owned(),
                        })?
                }
                _ => continue,
            }
        }

        Ok(Self {
            group: group.ok_or(ConfigError::MissingInstances)?,
            options,
        })
    }
}

/// Tuning for a running [`Node`][crate::Node].
#[derive(Clone, Debug)]
pub struct Options {
    /// Warn when the same multicast has blocked the head of the pending queue
    /// for longer than this. Disabled when `None`.
    pub stall_timeout: Option<Duration>,
    /// How long an inbound connection may take to deliver its message.
    pub read_timeout: Duration,
    /// The largest encoded message accepted from a peer, in bytes.
    pub max_message_size: usize,
}

impl Options {
    pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1 << 20;
}

impl Default for Options {
    fn default() -> Self {
        Self {
            stall_timeout: None,
            read_timeout: Self::DEFAULT_READ_TIMEOUT,
            max_message_size: Self::DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

fn millis(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::Option {
            key,
            value: value.to_owned(),
        })
}
