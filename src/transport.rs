//! TCP transport: one connection per message.
//!
//! ## Wire format
//!
//! Each connection carries exactly one frame, written by the sender, which
//! then closes the connection:
//!
//! ```text
//! [4 bytes: body length (u32-be)] [N bytes: encoded Message]
//! ```
//!
//! Messages addressed to the local member never touch the network; they are
//! handed straight to the ordering worker.

use std::{mem::size_of, net::SocketAddr, time::Duration};

use bytes::{BufMut, BytesMut};
use futures::future::join_all;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    select, spawn,
    sync::{mpsc, watch},
};
use tracing::{debug, info, warn};

use crate::{
    error::{Error, ProtocolError},
    instance::{Group, Instance},
    message::Message,
};

/// Where decoded inbound messages are handed to the ordering worker.
pub(crate) type Inbound = mpsc::UnboundedSender<Message>;

/// Sends [messages][Message] to members of a [`Group`] on behalf of one local
/// member.
#[derive(Clone, Debug)]
pub(crate) struct Transport {
    group: Group,
    local: usize,
    inbound: Inbound,
    max_message_size: usize,
}

impl Transport {
    pub fn new(group: Group, local: usize, inbound: Inbound, max_message_size: usize) -> Self {
        Self {
            group,
            local,
            inbound,
            max_message_size,
        }
    }

    /// Deliver `message` to `to`: directly to the local ordering worker if `to`
    /// is this member, otherwise over a fresh TCP connection.
    ///
    /// Failed sends are not retried.
    pub async fn send(&self, message: &Message, to: &Instance) -> Result<(), Error> {
        if *to == self.group[self.local] {
            debug!(id = %message.id, kind = ?message.kind, "loopback");
            return self.inbound.send(message.clone()).map_err(|_| Error::Closed);
        }

        let frame = frame(message, self.max_message_size)?;

        let mut stream = TcpStream::connect(to.addr()).await?;
        stream.write_all(&frame).await?;
        stream.shutdown().await?;

        debug!(id = %message.id, kind = ?message.kind, %to, "sent");
        Ok(())
    }

    /// [Send][Transport::send] `message` to every member of the group,
    /// including this one. Returns the number of failed sends, which have
    /// already been logged.
    pub async fn multicast(&self, message: &Message) -> usize {
        self.fan_out(message, self.group.iter()).await
    }

    /// [Send][Transport::send] `message` to every member except this one.
    pub async fn multicast_peers(&self, message: &Message) -> usize {
        let local = &self.group[self.local];
        self.fan_out(message, self.group.iter().filter(|to| *to != local))
            .await
    }

    async fn fan_out<'a>(
        &self,
        message: &Message,
        members: impl Iterator<Item = &'a Instance>,
    ) -> usize {
        let sends = members.map(|to| async move { (to, self.send(message, to).await) });

        join_all(sends)
            .await
            .into_iter()
            .filter_map(|(to, result)| result.err().map(|err| (to, err)))
            .inspect(|(to, err)| warn!(id = %message.id, %to, error = %err, "send failed"))
            .count()
    }
}

/// Encode `message` as a length-prefixed frame.
pub(crate) fn frame(message: &Message, max_message_size: usize) -> Result<BytesMut, ProtocolError> {
    let mut body = BytesMut::with_capacity(64 + message.payload.len());
    let len = message.write(&mut body)?;

    if len > max_message_size {
        return Err(ProtocolError::TooLarge(len));
    }

    let mut frame = BytesMut::with_capacity(size_of::<u32>() + len);
    frame.put_u32(len.try_into().map_err(|_| ProtocolError::TooLarge(len))?);
    frame.unsplit(body);

    Ok(frame)
}

/// Read one length-prefixed frame from `reader` and decode it.
pub(crate) async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_message_size: usize,
) -> Result<Message, Error> {
    let len = reader.read_u32().await? as usize;
    if len > max_message_size {
        return Err(ProtocolError::TooLarge(len).into());
    }

    let mut body = BytesMut::zeroed(len);
    reader.read_exact(&mut body[..]).await?;

    Ok(Message::read(&mut body.freeze())?)
}

/// Accept inbound connections until `close` is set (or its sender dropped),
/// handing each decoded message to `inbound`.
///
/// Every connection is read on its own task; a connection that fails, times
/// out, or carries a malformed message is logged and dropped without
/// disturbing the accept loop.
pub(crate) async fn listen(
    listener: TcpListener,
    inbound: Inbound,
    read_timeout: Duration,
    max_message_size: usize,
    mut close: watch::Receiver<bool>,
) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "listening");
    }

    loop {
        select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let inbound = inbound.clone();
                    spawn(async move {
                        receive(stream, addr, inbound, read_timeout, max_message_size).await
                    });
                }
                Err(err) => warn!(error = %err, "accept failed"),
            },

            _ = close.changed() => break,
        }
    }

    info!("listener closed");
}

async fn receive(
    mut stream: TcpStream,
    addr: SocketAddr,
    inbound: Inbound,
    read_timeout: Duration,
    max_message_size: usize,
) {
    let read = tokio::time::timeout(read_timeout, read_frame(&mut stream, max_message_size));

    match read.await {
        Ok(Ok(message)) => {
            debug!(id = %message.id, kind = ?message.kind, %addr, "received");
            if inbound.send(message).is_err() {
                debug!(%addr, "ordering worker stopped; dropping message");
            }
        }
        Ok(Err(err)) => warn!(%addr, error = %err, "discarding inbound message"),
        Err(_) => warn!(%addr, "timed out reading inbound message"),
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio::{
        io::AsyncWriteExt,
        net::{TcpListener, TcpStream},
        sync::{mpsc, watch},
    };

    use super::{frame, listen, read_frame, Transport};
    use crate::{
        error::{Error, ProtocolError},
        instance::{Group, Instance},
        message::{Kind, Message, MessageId},
    };

    const MAX: usize = 1024;

    #[tokio::test]
    async fn test_frame() {
        let message = Message::new(MessageId::new(3, 1), Kind::P2p, "over the wire");
        let data = frame(&message, MAX).unwrap();

        let mut reader = &data[..];
        assert_eq!(read_frame(&mut reader, MAX).await.unwrap(), message);
        assert!(reader.is_empty());

        assert!(matches!(
            read_frame(&mut &data[..], 8).await,
            Err(Error::Protocol(ProtocolError::TooLarge(_)))
        ));
        assert!(matches!(
            read_frame(&mut &data[..10], MAX).await,
            Err(Error::Transport(_))
        ));

        let huge = Message::new(MessageId::new(3, 1), Kind::P2p, "x".repeat(MAX));
        assert!(matches!(frame(&huge, MAX), Err(ProtocolError::TooLarge(_))));
    }

    #[tokio::test]
    async fn test_loopback_skips_network() {
        // nothing listens at the local member's address
        let group = Group::new([Instance::new("127.0.0.1", 1), Instance::new("127.0.0.1", 2)]).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = Transport::new(group.clone(), 0, tx, MAX);

        let hello = Message::new(MessageId::new(1, 0), Kind::P2p, "hello");
        transport.send(&hello, &group[0]).await.unwrap();

        assert_eq!(rx.recv().await, Some(hello));
    }

    #[tokio::test]
    async fn test_listener_survives_bad_connections() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let local = Instance::new("127.0.0.1", addr.port());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = watch::channel(false);
        let server = tokio::spawn(listen(
            listener,
            tx,
            Duration::from_millis(200),
            MAX,
            close_rx,
        ));

        // garbage, then a connection that never writes anything
        let mut garbage = TcpStream::connect(addr).await.unwrap();
        garbage.write_all(b"\x00\x00\x00\x04junk").await.unwrap();
        garbage.shutdown().await.unwrap();
        let _silent = TcpStream::connect(addr).await.unwrap();

        let group = Group::new([Instance::new("127.0.0.1", 1), local.clone()]).unwrap();
        let (own_tx, _own_rx) = mpsc::unbounded_channel();
        let transport = Transport::new(group, 0, own_tx, MAX);

        let message = Message::new(MessageId::new(8, 0), Kind::Multicast, "still here");
        transport.send(&message, &local).await.unwrap();

        assert_eq!(rx.recv().await, Some(message));

        close_tx.send_replace(true);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_multicast_counts_failures() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // reserve a port that then refuses connections
        let refused = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let refused_port = refused.local_addr().unwrap().port();
        drop(refused);

        let group = Group::new([
            Instance::new("127.0.0.1", 0),
            Instance::new("127.0.0.1", port),
            Instance::new("127.0.0.1", refused_port),
        ])
        .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = watch::channel(false);
        let server = tokio::spawn(listen(listener, tx, Duration::from_secs(1), MAX, close_rx));

        let (own_tx, mut own_rx) = mpsc::unbounded_channel();
        let transport = Transport::new(group, 0, own_tx, MAX);

        let ack = Message::ack(MessageId::new(2, 0), MessageId::new(1, 1));
        assert_eq!(transport.multicast(&ack).await, 1);
        assert_eq!(own_rx.recv().await, Some(ack.clone()));
        assert_eq!(rx.recv().await, Some(ack.clone()));

        assert_eq!(transport.multicast_peers(&ack).await, 1);
        assert!(own_rx.try_recv().is_err());

        close_tx.send_replace(true);
        server.await.unwrap();
    }
}
