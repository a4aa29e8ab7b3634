//! Totally ordered delivery of point-to-point and multicast messages among a
//! fixed group of peers, using Lamport clocks and acknowledgment quorums.
//!
//! ```no_run
//! use ordercast::{Config, Node};
//!
//! # async fn run() -> Result<(), ordercast::Error> {
//! let config = Config::load("group.properties")?;
//! let node = Node::start(config.group, 0, config.options).await?;
//!
//! node.multicast("hello, group").await?;
//! while let Ok(text) = node.receive().await {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

mod clock;
mod config;
mod engine;
mod error;
mod instance;
mod mailbox;
pub mod message;
mod node;
mod time;
mod transport;

pub use clock::LamportClock;
pub use config::{Config, Options};
pub use engine::{Effect, Engine, Head, Summary};
pub use error::{ConfigError, Error, ProtocolError};
pub use instance::{Group, Instance};
pub use mailbox::Mailbox;
pub use message::{Kind, Message, MessageId};
pub use node::Node;
