//! 두 UDP 메시 노드 사이 송수신 통합 테스트

use std::sync::Arc;
use std::time::Duration;

use meshvoice::frame::MARKER;
use meshvoice::{Config, Receiver, Sender, UdpMeshNode};

fn recording(len: usize, seed: u8) -> Vec<u8> {
    let mut data = MARKER.to_vec();
    data.extend((0..len).map(|i| ((i as u8).wrapping_mul(7).wrapping_add(seed)) % 0xB0));
    data
}

#[tokio::test]
async fn test_voice_stream_over_udp() {
    let config = Config {
        keep_start_marker: true,
        ..Config::default()
    };

    let tx_node = Arc::new(
        UdpMeshNode::bind(0x0A, "127.0.0.1:0".parse().unwrap(), config.data_payload_len)
            .await
            .unwrap(),
    );
    let rx_node = Arc::new(
        UdpMeshNode::bind(0x0B, "127.0.0.1:0".parse().unwrap(), config.data_payload_len)
            .await
            .unwrap(),
    );
    tx_node.add_peer(0x0B, rx_node.local_addr().unwrap());

    let inbound = rx_node.spawn_inbound(config.port, 256);
    let (receiver, mut streams) = Receiver::start(config.clone(), inbound);

    let (outbound, send_task) = tx_node.spawn_outbound(256);
    let sender = Sender::new(config, outbound).unwrap();

    let first = recording(2000, 1);
    let second = recording(150, 2);
    sender.send_payload(&first, 0x0B).await.unwrap();
    sender.send_payload(&second, 0x0B).await.unwrap();
    drop(sender);
    send_task.await.unwrap();

    for expected in [&first, &second] {
        let stream = tokio::time::timeout(Duration::from_secs(5), streams.recv())
            .await
            .expect("stream timeout")
            .expect("channel closed");
        assert_eq!(stream.sender, 0x0A);
        assert_eq!(stream.payload.as_ref(), expected.as_slice());
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(receiver.completed_streams(), 2);
    rx_node.stop();
}

#[tokio::test]
async fn test_two_senders_isolated() {
    let config = Config::default();

    let rx_node = Arc::new(
        UdpMeshNode::bind(0x0C, "127.0.0.1:0".parse().unwrap(), config.data_payload_len)
            .await
            .unwrap(),
    );
    let inbound = rx_node.spawn_inbound(config.port, 256);
    let (_receiver, mut streams) = Receiver::start(config.clone(), inbound);

    let mut tasks = Vec::new();
    for (node_id, len) in [(0x01u32, 900usize), (0x02, 1300)] {
        let node = Arc::new(
            UdpMeshNode::bind(node_id, "127.0.0.1:0".parse().unwrap(), config.data_payload_len)
                .await
                .unwrap(),
        );
        node.add_peer(0x0C, rx_node.local_addr().unwrap());
        let (outbound, send_task) = node.spawn_outbound(64);
        let sender = Sender::new(config.clone(), outbound).unwrap();
        let data = recording(len, node_id as u8);

        tasks.push(tokio::spawn(async move {
            sender.send_payload(&data, 0x0C).await.unwrap();
            drop(sender);
            send_task.await.unwrap();
            (node_id, data)
        }));
    }

    let mut sent = Vec::new();
    for task in tasks {
        sent.push(task.await.unwrap());
    }

    let mut received = Vec::new();
    for _ in 0..2 {
        let stream = tokio::time::timeout(Duration::from_secs(5), streams.recv())
            .await
            .expect("stream timeout")
            .expect("channel closed");
        received.push(stream);
    }
    received.sort_by_key(|s| s.sender);

    for ((node_id, data), stream) in sent.iter().zip(&received) {
        assert_eq!(stream.sender, *node_id);
        // 기본 설정은 시작 마커 제거
        assert_eq!(stream.payload.as_ref(), &data[MARKER.len()..]);
    }
    rx_node.stop();
}
