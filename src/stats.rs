//! 전송 통계

use std::time::{Duration, Instant};

use crate::reassembler::ReassemblyCounters;

/// 전체 전송 통계 (송신/수신 드라이버 공용)
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 송신한 스트림 수
    pub streams_sent: u64,

    /// 송신한 청크 수
    pub chunks_sent: u64,

    /// 송신한 바이트 (종료 마커 포함)
    pub bytes_sent: u64,

    /// 수신한 청크 수
    pub chunks_received: u64,

    /// 수신한 바이트
    pub bytes_received: u64,

    /// 완료된 스트림 수
    pub streams_completed: u64,

    /// 중복 시퀀스 ID 수
    pub duplicate_ids: u64,

    /// 폐기된 미완성 스트림 수 (크기 초과 / 타임아웃)
    pub streams_evicted: u64,

    /// 다른 포트로 들어와 무시한 패킷 수
    pub ignored_packets: u64,

    /// 마지막 스트림 완료 시간
    pub last_completed: Option<Instant>,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            streams_sent: 0,
            chunks_sent: 0,
            bytes_sent: 0,
            chunks_received: 0,
            bytes_received: 0,
            streams_completed: 0,
            duplicate_ids: 0,
            streams_evicted: 0,
            ignored_packets: 0,
            last_completed: None,
        }
    }

    /// 송신 기록
    pub fn record_sent(&mut self, chunks: usize, bytes: usize) {
        self.streams_sent += 1;
        self.chunks_sent += chunks as u64;
        self.bytes_sent += bytes as u64;
    }

    /// 재조립기 카운터 반영
    pub fn apply_counters(&mut self, counters: ReassemblyCounters) {
        if counters.streams_completed > self.streams_completed {
            self.last_completed = Some(Instant::now());
        }
        self.chunks_received = counters.chunks_ingested;
        self.bytes_received = counters.bytes_ingested;
        self.streams_completed = counters.streams_completed;
        self.duplicate_ids = counters.duplicate_ids;
        self.streams_evicted = counters.streams_evicted;
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 송신 처리율 (bytes/sec)
    pub fn send_throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.bytes_sent as f64 / elapsed
    }

    /// 수신 처리율 (bytes/sec)
    pub fn receive_throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.bytes_received as f64 / elapsed
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Sent: {} streams / {} chunks / {} bytes ({:.1} B/s) | Received: {} chunks / {} bytes ({:.1} B/s) | Completed: {} | Evicted: {} | Duplicate ids: {}",
            self.elapsed().as_secs_f64(),
            self.streams_sent,
            self.chunks_sent,
            self.bytes_sent,
            self.send_throughput(),
            self.chunks_received,
            self.bytes_received,
            self.receive_throughput(),
            self.streams_completed,
            self.streams_evicted,
            self.duplicate_ids,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}
