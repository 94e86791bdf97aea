//! 수신 드라이버
//!
//! - 전송 계층 수신 이벤트를 단일 태스크에서 처리 (재조립기 단독 소유, 락 없음)
//! - 완료된 스트림은 마커를 떼어내고 채널로 전달
//! - 타임아웃 설정 시 주기적으로 오래된 스트림 정리

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::frame;
use crate::reassembler::Reassembler;
use crate::stats::TransferStats;
use crate::transport::{InboundPacket, NodeId};
use crate::Config;

/// 완료된 스트림
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedStream {
    /// 송신 노드
    pub sender: NodeId,

    /// 페이로드 (종료 마커 제거, 설정에 따라 시작 마커 제거)
    pub payload: Bytes,
}

/// 완료 스트림 채널 수신기 타입
pub type StreamReceiver = mpsc::Receiver<CompletedStream>;

/// 내부 명령
enum ReceiverCmd {
    Packet(InboundPacket),
    Sweep,
    Stop,
}

/// 수신자 내부 상태 (단일 태스크에서만 접근)
struct ReceiverInner {
    config: Config,
    reassembler: Reassembler,
    stats: TransferStats,
    completed_tx: mpsc::Sender<CompletedStream>,
    completed_count: u64,
}

impl ReceiverInner {
    fn new(config: Config, completed_tx: mpsc::Sender<CompletedStream>) -> Self {
        Self {
            reassembler: Reassembler::with_config(config.reassembler_config()),
            config,
            stats: TransferStats::new(),
            completed_tx,
            completed_count: 0,
        }
    }

    async fn handle_packet(&mut self, packet: InboundPacket) {
        if packet.port != self.config.port {
            self.stats.ignored_packets += 1;
            return;
        }

        let sender = packet.from;
        debug!(
            "chunk 수신: sender={:08x}, id={}, {} bytes",
            sender,
            packet.id,
            packet.payload.len()
        );

        let assembled = self.reassembler.ingest_chunk(packet.into_chunk());
        self.stats.apply_counters(self.reassembler.counters());

        if let Some(raw) = assembled {
            self.handle_stream_complete(sender, raw).await;
        }
    }

    async fn handle_stream_complete(&mut self, sender: NodeId, raw: Bytes) {
        let Some(payload) = extract_payload(&raw, self.config.keep_start_marker) else {
            warn!("완료 스트림 형식 오류: sender={:08x}", sender);
            return;
        };

        info!(
            "스트림 수신 완료: sender={:08x}, {} bytes (raw {} bytes)",
            sender,
            payload.len(),
            raw.len()
        );

        if self
            .completed_tx
            .send(CompletedStream { sender, payload })
            .await
            .is_err()
        {
            warn!("완료 채널 닫힘: sender={:08x} 스트림 버림", sender);
            return;
        }
        self.completed_count += 1;
    }

    fn sweep(&mut self) {
        let pruned = self.reassembler.prune_stale(Instant::now());
        if pruned > 0 {
            info!("타임아웃 스트림 {}개 정리", pruned);
            self.stats.apply_counters(self.reassembler.counters());
        }
    }

    fn get_stats(&self) -> TransferStats {
        self.stats.clone()
    }
}

/// 조립 버퍼에서 전달할 페이로드 추출
fn extract_payload(raw: &Bytes, keep_start_marker: bool) -> Option<Bytes> {
    let body = if keep_start_marker {
        if !frame::has_start(raw) {
            return None;
        }
        frame::strip_terminator(raw)?
    } else {
        frame::strip_frame(raw)?
    };
    Some(raw.slice_ref(body))
}

/// 수신자 핸들 (외부에서 제어용)
pub struct Receiver {
    cmd_tx: mpsc::Sender<ReceiverCmd>,
    stats: Arc<RwLock<TransferStats>>,
    running: Arc<AtomicBool>,
    completed_count: Arc<AtomicU64>,
}

impl Receiver {
    /// 새 수신자 생성 및 시작
    ///
    /// `inbound`는 전송 계층의 수신 이벤트 큐. 큐가 닫히면 수신자도 종료된다.
    pub fn start(config: Config, mut inbound: mpsc::Receiver<InboundPacket>) -> (Self, StreamReceiver) {
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<ReceiverCmd>(config.inbound_queue_size);
        let (completed_tx, completed_rx) =
            mpsc::channel::<CompletedStream>(config.completed_queue_size);

        let stats = Arc::new(RwLock::new(TransferStats::new()));
        let running = Arc::new(AtomicBool::new(true));
        let completed_count = Arc::new(AtomicU64::new(0));

        info!(
            "Receiver started: port {}, timeout {:?}, max stream {:?} bytes",
            config.port, config.stream_timeout_ms, config.max_stream_bytes
        );

        let mut inner = ReceiverInner::new(config.clone(), completed_tx);

        // 수신 이벤트 전달 태스크
        let cmd_tx_recv = cmd_tx.clone();
        tokio::spawn(async move {
            while let Some(packet) = inbound.recv().await {
                if cmd_tx_recv.send(ReceiverCmd::Packet(packet)).await.is_err() {
                    return;
                }
            }
            let _ = cmd_tx_recv.send(ReceiverCmd::Stop).await;
        });

        // 타임아웃 정리 타이머 태스크
        if config.stream_timeout_ms.is_some() {
            let cmd_tx_sweep = cmd_tx.clone();
            let running_sweep = running.clone();
            let interval = Duration::from_millis(config.sweep_interval_ms.max(1));

            tokio::spawn(async move {
                while running_sweep.load(Ordering::SeqCst) {
                    tokio::time::sleep(interval).await;
                    if cmd_tx_sweep.send(ReceiverCmd::Sweep).await.is_err() {
                        break;
                    }
                }
            });
        }

        // 메인 처리 태스크
        let stats_main = stats.clone();
        let running_main = running.clone();
        let completed_count_main = completed_count.clone();

        tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                match cmd {
                    ReceiverCmd::Packet(packet) => {
                        inner.handle_packet(packet).await;
                    }
                    ReceiverCmd::Sweep => {
                        inner.sweep();
                    }
                    ReceiverCmd::Stop => {
                        break;
                    }
                }

                // 통계 업데이트
                *stats_main.write().await = inner.get_stats();
                completed_count_main.store(inner.completed_count, Ordering::Relaxed);
            }

            *stats_main.write().await = inner.get_stats();
            completed_count_main.store(inner.completed_count, Ordering::Relaxed);
            running_main.store(false, Ordering::SeqCst);
            info!("Receiver stopped: {}", inner.stats.summary());
        });

        let receiver = Self {
            cmd_tx,
            stats,
            running,
            completed_count,
        };

        (receiver, completed_rx)
    }

    /// 정지
    pub async fn stop(&self) {
        let _ = self.cmd_tx.send(ReceiverCmd::Stop).await;
    }

    /// 통계 반환
    pub async fn get_stats(&self) -> TransferStats {
        self.stats.read().await.clone()
    }

    /// 완료된 스트림 수
    pub fn completed_streams(&self) -> u64 {
        self.completed_count.load(Ordering::Relaxed)
    }

    /// 실행 중 여부
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk;
    use crate::frame::{MARKER, TERMINATOR};
    use crate::sender::Sender;
    use crate::transport::loopback_link;

    fn packet(from: NodeId, id: u32, payload: Bytes) -> InboundPacket {
        InboundPacket {
            from,
            id,
            port: crate::DEFAULT_PORT,
            payload,
        }
    }

    async fn recv_stream(rx: &mut StreamReceiver) -> CompletedStream {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("stream timeout")
            .expect("channel closed")
    }

    #[test]
    fn test_extract_payload() {
        let mut payload = MARKER.to_vec();
        payload.extend_from_slice(b"c2 frames");
        let raw = Bytes::from(frame::frame(&payload));

        assert_eq!(extract_payload(&raw, false).unwrap().as_ref(), b"c2 frames");
        assert_eq!(extract_payload(&raw, true).unwrap().as_ref(), payload.as_slice());
        assert!(extract_payload(&Bytes::from_static(&TERMINATOR), false)
            .unwrap()
            .is_empty());
        assert!(extract_payload(&Bytes::from_static(b"noise"), false).is_none());
    }

    #[tokio::test]
    async fn test_receiver_strips_markers() {
        let (tx, inbound) = mpsc::channel(16);
        let (receiver, mut streams) = Receiver::start(Config::default(), inbound);

        let mut payload = MARKER.to_vec();
        payload.extend_from_slice(&[0x41; 9]);
        let chunks = chunk(&payload, 10).unwrap();

        // 역순 도착
        tx.send(packet(5, 2, chunks[1].clone())).await.unwrap();
        tx.send(packet(5, 1, chunks[0].clone())).await.unwrap();

        let stream = recv_stream(&mut streams).await;
        assert_eq!(stream.sender, 5);
        assert_eq!(stream.payload.as_ref(), &[0x41; 9]);

        drop(tx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!receiver.is_running());
        assert_eq!(receiver.completed_streams(), 1);
        assert_eq!(receiver.get_stats().await.chunks_received, 2);
    }

    #[tokio::test]
    async fn test_receiver_ignores_other_ports() {
        let (tx, inbound) = mpsc::channel(16);
        let (receiver, mut streams) = Receiver::start(Config::default(), inbound);

        tx.send(InboundPacket {
            from: 1,
            id: 1,
            port: 999,
            payload: Bytes::from_static(&TERMINATOR),
        })
        .await
        .unwrap();
        tx.send(packet(1, 2, Bytes::from_static(&TERMINATOR)))
            .await
            .unwrap();

        let stream = recv_stream(&mut streams).await;
        assert!(stream.payload.is_empty());

        receiver.stop().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(receiver.get_stats().await.ignored_packets, 1);
    }

    #[tokio::test]
    async fn test_sender_to_receiver_over_loopback() {
        let config = Config {
            keep_start_marker: true,
            ..Config::default()
        };
        let (out_tx, inbound) = loopback_link(0x77, 5000, 64);
        let sender = Sender::new(config.clone(), out_tx).unwrap();
        let (_receiver, mut streams) = Receiver::start(config, inbound);

        let mut recording = MARKER.to_vec();
        recording.extend((0..1500u32).map(|i| (i % 0xB0) as u8));
        sender.send_payload(&recording, 0x11).await.unwrap();

        let stream = recv_stream(&mut streams).await;
        assert_eq!(stream.sender, 0x77);
        assert_eq!(stream.payload.as_ref(), recording.as_slice());
    }

    #[tokio::test]
    async fn test_stale_stream_swept() {
        let config = Config {
            stream_timeout_ms: Some(20),
            sweep_interval_ms: 10,
            ..Config::default()
        };
        let (tx, inbound) = mpsc::channel(16);
        let (receiver, _streams) = Receiver::start(config, inbound);

        tx.send(packet(3, 1, Bytes::from_static(&MARKER))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let stats = receiver.get_stats().await;
        assert_eq!(stats.chunks_received, 1);
        assert_eq!(stats.streams_evicted, 1);
        receiver.stop().await;
    }
}
