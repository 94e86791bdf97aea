//! 메시 전송 계층 경계
//!
//! - 송신 드라이버는 `OutboundPacket`을 큐에 넣고, 전송 계층이 패킷 ID를 부여해 전송
//! - 수신 드라이버는 전송 계층이 만든 `InboundPacket` 이벤트를 큐에서 소비
//! - `UdpMeshNode`: UDP로 메시 무선 노드를 흉내내는 전송 계층
//! - `loopback_link`: 프로세스 내 직결 링크 (테스트/데모)

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chunk::{Chunk, SenderKey, SequenceId};
use crate::message::MeshEnvelope;
use crate::{Error, Result};

/// 메시 노드 번호
pub type NodeId = SenderKey;

/// 패킷 ID
pub type PacketId = SequenceId;

/// 논리 포트 번호
pub type PortNum = u32;

/// 브로드캐스트 목적지
pub const BROADCAST_NODE: NodeId = 0xFFFF_FFFF;

/// 노드 번호 파싱: `!a1b2c3d4`, `0xa1b2c3d4`, 10진수
pub fn parse_node_id(s: &str) -> Option<NodeId> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('!').or_else(|| s.strip_prefix("0x")) {
        return u32::from_str_radix(hex, 16).ok();
    }
    s.parse().ok()
}

/// 송신 요청 (ID는 전송 계층이 부여)
#[derive(Debug, Clone)]
pub struct OutboundPacket {
    pub destination: NodeId,
    pub port: PortNum,
    pub payload: Bytes,
}

/// 수신 이벤트
#[derive(Debug, Clone)]
pub struct InboundPacket {
    pub from: NodeId,
    pub id: PacketId,
    pub port: PortNum,
    pub payload: Bytes,
}

impl InboundPacket {
    /// 재조립기 입력으로 변환
    pub fn into_chunk(self) -> Chunk {
        Chunk::new(self.from, self.id, self.payload)
    }
}

/// UDP 메시 노드
pub struct UdpMeshNode {
    node_id: NodeId,
    socket: Arc<UdpSocket>,
    peers: RwLock<HashMap<NodeId, SocketAddr>>,
    next_packet_id: AtomicU32,
    max_payload_len: usize,
    running: AtomicBool,
}

impl UdpMeshNode {
    /// 소켓 바인딩
    ///
    /// 패킷 ID는 무작위 시작값에서 1씩 증가한다.
    pub async fn bind(node_id: NodeId, bind_addr: SocketAddr, max_payload_len: usize) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await?;
        let first_id = rand::thread_rng().gen_range(1..=u32::MAX / 2);

        info!(
            "Mesh node {:08x} bound on {}",
            node_id,
            socket.local_addr()?
        );

        Ok(Self {
            node_id,
            socket: Arc::new(socket),
            peers: RwLock::new(HashMap::new()),
            next_packet_id: AtomicU32::new(first_id),
            max_payload_len,
            running: AtomicBool::new(true),
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 이웃 노드 주소 등록
    pub fn add_peer(&self, node_id: NodeId, addr: SocketAddr) {
        self.peers.write().insert(node_id, addr);
    }

    pub fn peers(&self) -> Vec<(NodeId, SocketAddr)> {
        let mut peers: Vec<_> = self.peers.read().iter().map(|(k, v)| (*k, *v)).collect();
        peers.sort_unstable_by_key(|(id, _)| *id);
        peers
    }

    /// 패킷 한 개 전송 (응답 대기 없음)
    pub async fn send(&self, packet: &OutboundPacket) -> Result<PacketId> {
        if packet.payload.len() > self.max_payload_len {
            return Err(Error::PayloadTooLarge {
                len: packet.payload.len(),
                max_len: self.max_payload_len,
            });
        }

        let targets: Vec<SocketAddr> = {
            let peers = self.peers.read();
            if packet.destination == BROADCAST_NODE {
                peers.values().copied().collect()
            } else {
                peers.get(&packet.destination).copied().into_iter().collect()
            }
        };
        if targets.is_empty() {
            return Err(Error::ConnectionClosed);
        }

        let id = self.next_packet_id.fetch_add(1, Ordering::SeqCst);
        let envelope = MeshEnvelope::new(
            self.node_id,
            packet.destination,
            id,
            packet.port,
            packet.payload.clone(),
        );
        let bytes = envelope.to_bytes()?;

        for addr in targets {
            self.socket.send_to(&bytes, addr).await?;
        }

        Ok(id)
    }

    /// 송신 큐 태스크 시작
    ///
    /// 큐의 모든 송신 핸들이 닫히면 남은 패킷을 다 보내고 태스크가 끝난다.
    pub fn spawn_outbound(
        self: &Arc<Self>,
        queue_size: usize,
    ) -> (mpsc::Sender<OutboundPacket>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<OutboundPacket>(queue_size);
        let node = self.clone();

        let handle = tokio::spawn(async move {
            while let Some(packet) = rx.recv().await {
                match node.send(&packet).await {
                    Ok(id) => debug!(
                        "packet {} -> {:08x}: {} bytes",
                        id,
                        packet.destination,
                        packet.payload.len()
                    ),
                    Err(e) => warn!("송신 실패: {}", e),
                }
            }
        });

        (tx, handle)
    }

    /// 수신 태스크 시작. `port`로 들어온 데이터 패킷만 전달
    pub fn spawn_inbound(self: &Arc<Self>, port: PortNum, queue_size: usize) -> mpsc::Receiver<InboundPacket> {
        let (tx, rx) = mpsc::channel::<InboundPacket>(queue_size);
        let node = self.clone();

        tokio::spawn(async move {
            let mut buf = vec![0u8; 65535];

            while node.running.load(Ordering::SeqCst) {
                match tokio::time::timeout(
                    Duration::from_millis(50),
                    node.socket.recv_from(&mut buf),
                )
                .await
                {
                    Ok(Ok((len, addr))) => {
                        let envelope = match MeshEnvelope::from_bytes(&buf[..len]) {
                            Ok(envelope) => envelope,
                            Err(e) => {
                                debug!("잘못된 데이터그램 ({}): {}", addr, e);
                                continue;
                            }
                        };

                        let header = &envelope.header;
                        if header.to != node.node_id && header.to != BROADCAST_NODE {
                            continue;
                        }

                        // 응답 경로 학습
                        node.peers.write().entry(header.from).or_insert(addr);

                        if header.port != port {
                            continue;
                        }

                        let packet = InboundPacket {
                            from: header.from,
                            id: header.id,
                            port: header.port,
                            payload: envelope.payload,
                        };
                        if tx.send(packet).await.is_err() {
                            break;
                        }
                    }
                    Ok(Err(e)) => {
                        warn!("수신 에러: {}", e);
                    }
                    Err(_) => {
                        // 타임아웃, 계속
                    }
                }
            }
        });

        rx
    }

    /// 수신 태스크 정지
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// 프로세스 내 직결 링크
///
/// 송신 큐에 들어온 패킷을 `from` 노드가 보낸 것처럼 `first_id`부터 ID를 매겨
/// 수신 큐로 넘긴다.
pub fn loopback_link(
    from: NodeId,
    first_id: PacketId,
    queue_size: usize,
) -> (mpsc::Sender<OutboundPacket>, mpsc::Receiver<InboundPacket>) {
    let (out_tx, mut out_rx) = mpsc::channel::<OutboundPacket>(queue_size);
    let (in_tx, in_rx) = mpsc::channel::<InboundPacket>(queue_size);

    tokio::spawn(async move {
        let mut next_id = first_id;
        while let Some(packet) = out_rx.recv().await {
            let inbound = InboundPacket {
                from,
                id: next_id,
                port: packet.port,
                payload: packet.payload,
            };
            next_id = next_id.wrapping_add(1);
            if in_tx.send(inbound).await.is_err() {
                break;
            }
        }
    });

    (out_tx, in_rx)
}
