//! 프로토콜 설정

use std::time::Duration;

use crate::frame::TERMINATOR;
use crate::reassembler::ReassemblerConfig;
use crate::{Error, Result, DEFAULT_DATA_PAYLOAD_LEN, DEFAULT_HEADER_RESERVE, DEFAULT_PORT};

/// meshvoice 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 전송 계층 메시지당 최대 데이터 길이 (Meshtastic DATA_PAYLOAD_LEN)
    pub data_payload_len: usize,

    /// 프로토콜 헤더용 예약 바이트
    pub header_reserve: usize,

    /// 논리 포트 번호
    pub port: u32,

    /// 청크 전송 간격 (밀리초)
    /// 0이면 간격 없이 큐에 넣음
    pub chunk_interval_ms: u64,

    /// 송신자별 최대 누적 바이트 (None = 무제한)
    pub max_stream_bytes: Option<usize>,

    /// 미완성 스트림 타임아웃 (밀리초, None = 무제한)
    pub stream_timeout_ms: Option<u64>,

    /// 타임아웃 검사 주기 (밀리초)
    pub sweep_interval_ms: u64,

    /// 완료 판정에 연속 시퀀스 ID 요구
    pub contiguous_ids: bool,

    /// 완료 스트림 전달 시 시작 마커 유지
    /// Codec2 파일 헤더가 마커로 시작하므로 디코더로 바로 넘길 때 사용
    pub keep_start_marker: bool,

    /// 수신 이벤트 큐 크기
    pub inbound_queue_size: usize,

    /// 완료 스트림 큐 크기
    pub completed_queue_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_payload_len: DEFAULT_DATA_PAYLOAD_LEN,
            header_reserve: DEFAULT_HEADER_RESERVE,
            port: DEFAULT_PORT,
            chunk_interval_ms: 0,
            max_stream_bytes: None,
            stream_timeout_ms: None,
            sweep_interval_ms: 1000,
            contiguous_ids: false,
            keep_start_marker: false,
            inbound_queue_size: 1000,
            completed_queue_size: 16,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 청크 최대 길이
    pub fn max_chunk_len(&self) -> usize {
        self.data_payload_len.saturating_sub(self.header_reserve)
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.header_reserve >= self.data_payload_len {
            return Err(Error::InvalidPayloadBudget {
                data_payload_len: self.data_payload_len,
                header_reserve: self.header_reserve,
            });
        }
        let max_chunk_len = self.max_chunk_len();
        if max_chunk_len < TERMINATOR.len() {
            return Err(Error::UndersizedChunkLength {
                max_chunk_len,
                required: TERMINATOR.len(),
            });
        }
        Ok(())
    }

    /// 재조립기 설정 추출
    pub fn reassembler_config(&self) -> ReassemblerConfig {
        ReassemblerConfig {
            max_stream_bytes: self.max_stream_bytes,
            stale_after: self.stream_timeout_ms.map(Duration::from_millis),
            contiguous_ids: self.contiguous_ids,
        }
    }

    /// 강화 설정: 크기 제한 + 타임아웃 + 연속 ID
    pub fn hardened() -> Self {
        Self {
            max_stream_bytes: Some(1024 * 1024),  // 1MB
            stream_timeout_ms: Some(120_000),     // 2분
            sweep_interval_ms: 5000,
            contiguous_ids: true,
            ..Self::default()
        }
    }

    /// 장거리(저속) 프리셋: 채널 점유를 줄이기 위해 청크 간격을 둔다
    pub fn long_range() -> Self {
        Self {
            chunk_interval_ms: 2000,
            stream_timeout_ms: Some(600_000), // 10분
            sweep_interval_ms: 10_000,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_max_chunk_len() {
        let config = Config::default();
        assert_eq!(config.max_chunk_len(), 233 - 37);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_undersized() {
        let config = Config {
            data_payload_len: 40,
            header_reserve: 37,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::UndersizedChunkLength { max_chunk_len: 3, required: 6 })
        ));

        let config = Config {
            data_payload_len: 30,
            header_reserve: 37,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidPayloadBudget { .. })
        ));
    }

    #[test]
    fn test_presets() {
        let hardened = Config::hardened();
        assert!(hardened.validate().is_ok());
        let rc = hardened.reassembler_config();
        assert!(rc.contiguous_ids);
        assert_eq!(rc.stale_after, Some(Duration::from_secs(120)));

        let plain = Config::default().reassembler_config();
        assert!(plain.max_stream_bytes.is_none());
        assert!(plain.stale_after.is_none());
        assert!(!plain.contiguous_ids);

        assert!(Config::long_range().validate().is_ok());
    }
}
