//! 송신 드라이버
//!
//! - 페이로드 + 종료 마커를 청크로 분할한 뒤 순서대로 전송 큐에 넣음
//! - ACK 대기 없음, 재전송 없음

use std::path::Path;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::chunk::Chunker;
use crate::stats::TransferStats;
use crate::transport::{NodeId, OutboundPacket};
use crate::{Config, Error, Result};

/// 송신자
pub struct Sender {
    /// 설정
    config: Config,

    /// 청크 분할기
    chunker: Chunker,

    /// 전송 계층 송신 큐
    outbound: mpsc::Sender<OutboundPacket>,

    /// 전송 통계
    stats: RwLock<TransferStats>,
}

impl Sender {
    /// 새 송신자 생성 (설정 검증 포함)
    pub fn new(config: Config, outbound: mpsc::Sender<OutboundPacket>) -> Result<Self> {
        config.validate()?;
        let chunker = Chunker::new(config.max_chunk_len())?;

        Ok(Self {
            config,
            chunker,
            outbound,
            stats: RwLock::new(TransferStats::new()),
        })
    }

    /// 페이로드 전송. 보낸 청크 수 반환
    pub async fn send_payload(&self, payload: &[u8], destination: NodeId) -> Result<usize> {
        let chunks = self.chunker.split(payload);
        let total_chunks = chunks.len();
        let total_bytes: usize = chunks.iter().map(|c| c.len()).sum();

        info!(
            "스트림 전송 시작: {} bytes -> {:08x}, {} chunks (max {} bytes)",
            payload.len(),
            destination,
            total_chunks,
            self.chunker.max_chunk_len()
        );

        for (index, chunk) in chunks.into_iter().enumerate() {
            let len = chunk.len();
            self.outbound
                .send(OutboundPacket {
                    destination,
                    port: self.config.port,
                    payload: chunk,
                })
                .await
                .map_err(|_| Error::ChannelError)?;

            debug!("chunk {}/{} queued: {} bytes", index + 1, total_chunks, len);

            // 전송 간격
            if self.config.chunk_interval_ms > 0 && index + 1 < total_chunks {
                tokio::time::sleep(Duration::from_millis(self.config.chunk_interval_ms)).await;
            }
        }

        self.stats.write().record_sent(total_chunks, total_bytes);
        Ok(total_chunks)
    }

    /// 파일 내용을 한 스트림으로 전송
    pub async fn send_file(&self, path: impl AsRef<Path>, destination: NodeId) -> Result<usize> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        info!("Loading file: {:?} ({} bytes)", path, data.len());
        self.send_payload(&data, destination).await
    }

    pub fn max_chunk_len(&self) -> usize {
        self.chunker.max_chunk_len()
    }

    /// 통계 반환
    pub fn get_stats(&self) -> TransferStats {
        self.stats.read().clone()
    }
}
