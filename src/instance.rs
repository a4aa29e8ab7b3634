use std::{fmt, ops::Deref, str::FromStr, sync::Arc};

use crate::error::ConfigError;

/// A group member's network identity: a host name or address and a TCP port.
///
/// ```
/// use ordercast::Instance;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let instance: Instance = "127.0.0.1:7001".parse()?;
///
/// assert_eq!(instance, Instance::new("127.0.0.1", 7001));
/// assert_eq!(instance.to_string(), "127.0.0.1:7001");
/// # Ok(())
/// # }
/// ```
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Debug)]
pub struct Instance {
    pub host: String,
    pub port: u16,
}

impl Instance {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The `(host, port)` pair, suitable for [`tokio::net::TcpStream::connect`]
    /// and [`tokio::net::TcpListener::bind`].
    pub fn addr(&self) -> (&str, u16) {
        (self.host.trim_start_matches('[').trim_end_matches(']'), self.port)
    }
}

impl FromStr for Instance {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        match s.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => match port.parse::<u16>() {
                Ok(port) => Ok(Self::new(host, port)),
                Err(_) => Err(ConfigError::Instance(s.to_owned())),
            },
            _ => Err(ConfigError::Instance(s.to_owned())),
        }
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// The fixed membership of a group, in originator-index order.
///
/// A member's position in the group is the originator index stamped into the
/// ids of every message it creates. `Group` is immutable once built and cheap
/// to clone.
///
/// ```
/// use ordercast::{Group, Instance};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let group: Group = "10.0.0.1:7000, 10.0.0.2:7000,10.0.0.3:7000".parse()?;
///
/// assert_eq!(group.len(), 3);
/// assert_eq!(group.index_of(&Instance::new("10.0.0.2", 7000)), Some(1));
/// # Ok(())
/// # }
/// ```
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Group(Arc<[Instance]>);

impl Group {
    pub fn new(instances: impl IntoIterator<Item = Instance>) -> Result<Self, ConfigError> {
        let instances: Vec<Instance> = instances.into_iter().collect();

        if instances.is_empty() {
            return Err(ConfigError::MissingInstances);
        }

        for (i, instance) in instances.iter().enumerate() {
            if instances[..i].contains(instance) {
                return Err(ConfigError::DuplicateInstance(instance.clone()));
            }
        }

        Ok(Self(instances.into()))
    }

    /// The originator index of `instance`, if it is a member.
    pub fn index_of(&self, instance: &Instance) -> Option<usize> {
        self.0.iter().position(|member| member == instance)
    }
}

impl Deref for Group {
    type Target = [Instance];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromStr for Group {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ConfigError::MissingInstances);
        }

        s.split(',')
            .map(str::parse::<Instance>)
            .collect::<Result<Vec<_>, _>>()
            .and_then(Group::new)
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, instance) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{instance}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{Group, Instance};
    use crate::error::ConfigError;

    #[test]
    fn test_parse_instance() {
        assert_eq!(
            "localhost:9000".parse::<Instance>().unwrap(),
            Instance::new("localhost", 9000)
        );
        assert_eq!(
            "[::1]:9000".parse::<Instance>().unwrap().addr(),
            ("::1", 9000)
        );

        for bad in ["localhost", ":9000", "localhost:", "localhost:99999", "a:b"] {
            assert!(
                matches!(bad.parse::<Instance>(), Err(ConfigError::Instance(_))),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn test_parse_group() {
        let group: Group = "a:1 ,b:2,  c:3".parse().unwrap();

        assert_eq!(
            &group[..],
            &[
                Instance::new("a", 1),
                Instance::new("b", 2),
                Instance::new("c", 3)
            ]
        );
        assert_eq!(group.index_of(&Instance::new("c", 3)), Some(2));
        assert_eq!(group.index_of(&Instance::new("c", 4)), None);
        assert_eq!(group.to_string(), "a:1,b:2,c:3");
    }

    #[test]
    fn test_reject_group() {
        assert!(matches!(
            "  ".parse::<Group>(),
            Err(ConfigError::MissingInstances)
        ));
        assert!(matches!(
            "a:1,,b:2".parse::<Group>(),
            Err(ConfigError::Instance(_))
        ));
        assert!(matches!(
            "a:1,b:2,a:1".parse::<Group>(),
            Err(ConfigError::DuplicateInstance(instance)) if instance == Instance::new("a", 1)
        ));
    }
}
