use std::time::Duration;

use ordercast::{Error, Group, Instance, Node, Options};
use tokio::{net::TcpListener, time::timeout};

const WAIT: Duration = Duration::from_secs(10);

async fn start_group(size: usize) -> Vec<Node> {
    let mut listeners = Vec::with_capacity(size);
    for _ in 0..size {
        listeners.push(TcpListener::bind("127.0.0.1:0").await.unwrap());
    }

    let group = Group::new(listeners.iter().map(|listener| {
        Instance::new("127.0.0.1", listener.local_addr().unwrap().port())
    }))
    .unwrap();

    listeners
        .into_iter()
        .enumerate()
        .map(|(local, listener)| {
            Node::with_listener(group.clone(), local, Options::default(), listener).unwrap()
        })
        .collect()
}

async fn receive(node: &Node, count: usize) -> Vec<String> {
    let mut inbox = Vec::with_capacity(count);
    for _ in 0..count {
        inbox.push(timeout(WAIT, node.receive()).await.unwrap().unwrap());
    }
    inbox
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_total_order() {
    let nodes = start_group(3).await;

    let sends = nodes.iter().enumerate().map(|(i, node)| async move {
        for round in 0..4 {
            node.multicast(format!("{i}:{round}")).await.unwrap();
        }
    });
    futures::future::join_all(sends).await;

    let mut orders = Vec::new();
    for node in &nodes {
        orders.push(receive(node, 12).await);
    }

    for order in &orders[1..] {
        assert_eq!(order, &orders[0]);
    }

    // each member's own multicasts keep their send order
    for i in 0..3 {
        let own: Vec<_> = orders[0]
            .iter()
            .filter(|text| text.starts_with(&format!("{i}:")))
            .cloned()
            .collect();
        let expected: Vec<_> = (0..4).map(|round| format!("{i}:{round}")).collect();
        assert_eq!(own, expected);
    }

    for node in nodes {
        let summary = node.stop().await.unwrap();
        assert_eq!(summary.delivered, 12);
        assert_eq!(summary.pending, 0);
        assert_eq!(summary.awaiting_acks, 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_point_to_point() {
    let nodes = start_group(3).await;
    let group = nodes[0].group().clone();

    nodes[0].send("to one", &group[1]).await.unwrap();
    nodes[2].send("also to one", &group[1]).await.unwrap();

    let mut inbox = receive(&nodes[1], 2).await;
    inbox.sort();
    assert_eq!(inbox, ["also to one", "to one"]);

    assert!(nodes[0].mailbox().try_receive().unwrap().is_none());
    assert!(nodes[2].mailbox().try_receive().unwrap().is_none());
}

#[tokio::test]
async fn test_loopback_without_peers() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    // nothing ever listens on the second member's port
    let group = Group::new([
        Instance::new("127.0.0.1", port),
        Instance::new("127.0.0.1", 1),
    ])
    .unwrap();
    let node = Node::with_listener(group.clone(), 0, Options::default(), listener).unwrap();

    node.send("just me", node.instance()).await.unwrap();
    assert_eq!(receive(&node, 1).await, ["just me"]);

    // a failed send is logged, not returned
    node.send("nobody home", &group[1]).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown() {
    let nodes = start_group(2).await;

    nodes[0].multicast("before").await.unwrap();
    for node in &nodes {
        assert_eq!(receive(node, 1).await, ["before"]);
    }

    for node in &nodes {
        node.shutdown();
    }

    for node in &nodes {
        let result = timeout(WAIT, node.receive()).await.unwrap();
        assert!(matches!(result, Err(Error::Closed)));
        assert!(matches!(node.multicast("after").await, Err(Error::Closed)));
    }
}

#[tokio::test]
async fn test_start_binds_configured_port() {
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);

    let group = Group::new([Instance::new("127.0.0.1", port)]).unwrap();
    let node = Node::start(group, 0, Options::default()).await.unwrap();
    assert_eq!(node.local_addr().port(), port);

    node.multicast("solo").await.unwrap();
    assert_eq!(receive(&node, 1).await, ["solo"]);

    let summary = node.stop().await.unwrap();
    assert_eq!(summary.delivered, 1);
}
