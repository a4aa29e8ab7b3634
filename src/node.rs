use std::{io, net::SocketAddr};

use tokio::{
    net::TcpListener,
    select, spawn,
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    config::Options,
    engine::{Effect, Engine, Head, Summary},
    error::{ConfigError, Error},
    instance::{Group, Instance},
    mailbox::{mailbox, Mailbox, Postbox},
    message::{Kind, Message, MessageId},
    time::interval,
    transport::{listen, Transport},
};

/// One member of a [`Group`], delivering point-to-point and multicast messages
/// to its application in the group-wide total order.
///
/// A `Node` runs two tasks: a listener accepting inbound connections, and the
/// single ordering worker that owns the Lamport clock and pending queue. Both
/// stop on [`Node::shutdown`], or when the `Node` is dropped.
#[derive(Debug)]
pub struct Node {
    group: Group,
    local: usize,
    addr: SocketAddr,
    transport: Transport,
    commands: mpsc::UnboundedSender<Command>,
    mailbox: Mailbox,
    close: watch::Sender<bool>,
    listener: JoinHandle<()>,
    worker: JoinHandle<Summary>,
}

impl Node {
    /// Bind the listener for member `local` of `group`, and start the node.
    ///
    /// Returns once the listener is bound and accepting connections.
    pub async fn start(group: Group, local: usize, options: Options) -> Result<Self, Error> {
        let instance = group.get(local).ok_or(ConfigError::UnknownInstance(local))?;
        let listener = TcpListener::bind(instance.addr()).await?;

        Self::with_listener(group, local, options, listener)
    }

    /// Start member `local` of `group`, accepting connections on an already
    /// bound `listener`.
    pub fn with_listener(
        group: Group,
        local: usize,
        options: Options,
        listener: TcpListener,
    ) -> Result<Self, Error> {
        if local >= group.len() {
            return Err(ConfigError::UnknownInstance(local).into());
        }

        let addr = listener.local_addr()?;

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = watch::channel(false);
        let (postbox, mailbox) = mailbox();

        let transport = Transport::new(
            group.clone(),
            local,
            inbound_tx.clone(),
            options.max_message_size,
        );

        let listener = spawn(listen(
            listener,
            inbound_tx,
            options.read_timeout,
            options.max_message_size,
            close_rx.clone(),
        ));

        let worker = {
            let worker = Worker {
                engine: Engine::new(local as u32, group.len()),
                transport: transport.clone(),
                postbox,
                inbound: inbound_rx,
                commands: commands_rx,
                stall_timeout: options.stall_timeout,
                blocked: None,
                close: close_rx,
            };
            spawn(async move { worker.run().await })
        };

        info!(%addr, local, group = %group, "node started");

        Ok(Self {
            group,
            local,
            addr,
            transport,
            commands: commands_tx,
            mailbox,
            close: close_tx,
            listener,
            worker,
        })
    }

    /// Send `text` to the single member `to`.
    ///
    /// Sends are best-effort: a failed connection is logged, not retried, and
    /// not reported. Returns the ID stamped on the message.
    pub async fn send(&self, text: impl Into<String>, to: &Instance) -> Result<MessageId, Error> {
        let local = to == self.instance();
        let message = self.stamp(Kind::P2p, text.into(), local).await?;

        if !local {
            if let Err(err) = self.transport.send(&message, to).await {
                warn!(id = %message.id, %to, error = %err, "send failed");
            }
        }

        Ok(message.id)
    }

    /// Send `text` to every member of the group, this one included. Every
    /// member delivers it in the same order relative to other multicasts.
    ///
    /// Like [`Node::send`], this is best-effort; a member that misses the
    /// message (or whose acknowledgment is lost) blocks delivery of this and
    /// every later multicast.
    pub async fn multicast(&self, text: impl Into<String>) -> Result<MessageId, Error> {
        let message = self.stamp(Kind::Multicast, text.into(), true).await?;
        self.transport.multicast_peers(&message).await;

        Ok(message.id)
    }

    /// Wait for the next delivered message payload.
    ///
    /// After [shutdown][Node::shutdown], returns the payloads delivered so far
    /// and then [`Error::Closed`].
    pub async fn receive(&self) -> Result<String, Error> {
        self.mailbox.receive().await
    }

    /// The application's [`Mailbox`], for non-async or non-blocking access.
    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// A snapshot of the ordering worker's state.
    pub async fn summary(&self) -> Result<Summary, Error> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Summary { reply })
            .map_err(|_| Error::Closed)?;

        rx.await.map_err(|_| Error::Closed)
    }

    /// The group this node is a member of.
    pub fn group(&self) -> &Group {
        &self.group
    }

    /// This node's originator index in the group.
    pub fn index(&self) -> usize {
        self.local
    }

    /// This node's own group member identity.
    pub fn instance(&self) -> &Instance {
        &self.group[self.local]
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal the listener and ordering worker to stop.
    pub fn shutdown(&self) {
        self.close.send_replace(true);
    }

    /// [Shut down][Node::shutdown] and wait for both tasks to finish,
    /// returning the ordering worker's final [`Summary`].
    pub async fn stop(self) -> Result<Summary, Error> {
        self.shutdown();
        let Node {
            listener, worker, ..
        } = self;

        let interrupted = |err| io::Error::new(io::ErrorKind::Interrupted, err);

        listener.await.map_err(interrupted)?;
        Ok(worker.await.map_err(interrupted)?)
    }

    async fn stamp(&self, kind: Kind, payload: String, loopback: bool) -> Result<Message, Error> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Stamp {
                kind,
                payload,
                loopback,
                reply,
            })
            .map_err(|_| Error::Closed)?;

        rx.await.map_err(|_| Error::Closed)
    }
}

#[derive(Debug)]
enum Command {
    /// Create a message with a fresh ID. With `loopback`, this member receives
    /// it before processing any other arrival.
    Stamp {
        kind: Kind,
        payload: String,
        loopback: bool,
        reply: oneshot::Sender<Message>,
    },
    Summary {
        reply: oneshot::Sender<Summary>,
    },
}

/// The single task that owns a node's [`Engine`].
#[derive(Debug)]
struct Worker {
    engine: Engine,
    transport: Transport,
    postbox: Postbox,
    inbound: mpsc::UnboundedReceiver<Message>,
    commands: mpsc::UnboundedReceiver<Command>,
    stall_timeout: Option<Duration>,
    blocked: Option<Blocked>,
    close: watch::Receiver<bool>,
}

#[derive(Copy, Clone, Debug)]
struct Blocked {
    id: MessageId,
    since: Instant,
    reported: bool,
}

impl Worker {
    async fn run(mut self) -> Summary {
        let stall_timeout = self.stall_timeout;
        let mut watchdog = interval(stall_timeout.unwrap_or(Duration::from_secs(60)) / 2);

        loop {
            select! {
                Some(message) = self.inbound.recv() => self.arrive(message),

                Some(command) = self.commands.recv() => self.command(command),

                _ = watchdog.tick(), if stall_timeout.is_some() => {
                    self.check_stall();
                }

                _ = self.close.changed() => break,

                else => break,
            }
        }

        let summary = self.engine.summary();
        info!(
            delivered = summary.delivered,
            pending = summary.pending,
            "ordering worker stopped"
        );

        summary
    }

    fn arrive(&mut self, message: Message) {
        let id = message.id;

        match self.engine.receive(message) {
            Ok(effects) => self.apply(effects),
            Err(err) => warn!(%id, error = %err, "discarding message"),
        }

        self.track_head();
    }

    fn command(&mut self, command: Command) {
        match command {
            Command::Stamp {
                kind,
                payload,
                loopback,
                reply,
            } => {
                let message = self.engine.stamp(kind, payload);
                if loopback {
                    self.arrive(message.clone());
                }
                let _ = reply.send(message);
            }
            Command::Summary { reply } => {
                let _ = reply.send(self.engine.summary());
            }
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Deliver(message) => {
                    debug!(id = %message.id, kind = ?message.kind, "delivered");
                    if !self.postbox.post(message.payload) {
                        debug!(id = %message.id, "mailbox dropped");
                    }
                }
                Effect::Broadcast(ack) => {
                    let transport = self.transport.clone();
                    spawn(async move { transport.multicast(&ack).await });
                }
            }
        }
    }

    fn track_head(&mut self) {
        let head = self.engine.head().map(|head| head.id);

        self.blocked = match (self.blocked, head) {
            (Some(blocked), Some(id)) if blocked.id == id => Some(blocked),
            (_, Some(id)) => Some(Blocked {
                id,
                since: Instant::now(),
                reported: false,
            }),
            (_, None) => None,
        };
    }

    /// Warn, once per head, about a multicast that has blocked delivery for
    /// longer than the stall timeout. Returns the head it warned about.
    fn check_stall(&mut self) -> Option<Head> {
        let timeout = self.stall_timeout?;
        let blocked = self.blocked.as_mut()?;
        if blocked.reported || blocked.since.elapsed() < timeout {
            return None;
        }

        let head = self.engine.head()?;
        warn!(
            id = %head.id,
            acks = head.acks,
            group = head.group,
            waited = ?blocked.since.elapsed(),
            "multicast is blocking delivery"
        );
        blocked.reported = true;

        Some(head)
    }
}
