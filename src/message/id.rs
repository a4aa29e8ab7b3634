//! Logical-clock [message ID's][MessageId], and the group-wide total order they
//! define.

use std::{fmt, str::FromStr};

use crate::error::ProtocolError;

/// A composite Lamport timestamp identifying one message: the sender's clock
/// value at send time, and the sender's originator index in the group.
///
/// IDs are totally ordered by `clock`, with ties broken by `origin`. Two
/// members never stamp the same `(clock, origin)` pair, so the order is the
/// same at every node.
///
/// ```
/// use ordercast::MessageId;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let early: MessageId = "2.10".parse()?;
/// let late: MessageId = "10.2".parse()?;
///
/// assert!(early < late);
/// assert_eq!(late, MessageId::new(10, 2));
/// assert_eq!(late.to_string(), "10.2");
/// # Ok(())
/// # }
/// ```
#[derive(Hash, PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Debug)]
pub struct MessageId {
    pub clock: u64,
    pub origin: u32,
}

impl MessageId {
    #[inline]
    pub const fn new(clock: u64, origin: u32) -> Self {
        Self { clock, origin }
    }
}

impl FromStr for MessageId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::Id(s.to_owned());

        let (clock, origin) = s.split_once('.').ok_or_else(invalid)?;
        if !digits(clock) || !digits(origin) {
            return Err(invalid());
        }

        match (clock.parse(), origin.parse()) {
            (Ok(clock), Ok(origin)) => Ok(Self { clock, origin }),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.clock, self.origin)
    }
}

#[inline]
fn digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
