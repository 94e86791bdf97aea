//! 에러 타입 정의

use thiserror::Error;

/// meshvoice 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("직렬화 에러: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("청크 최대 길이 부족: max_chunk_len={max_chunk_len}, 최소 {required} 필요")]
    UndersizedChunkLength { max_chunk_len: usize, required: usize },

    #[error("헤더 예약이 페이로드 한도를 초과: data_payload_len={data_payload_len}, header_reserve={header_reserve}")]
    InvalidPayloadBudget {
        data_payload_len: usize,
        header_reserve: usize,
    },

    #[error("유효하지 않은 매직 넘버: expected {expected:08X}, got {got:08X}")]
    InvalidMagicNumber { expected: u32, got: u32 },

    #[error("유효하지 않은 프로토콜 버전: expected {expected}, got {got}")]
    InvalidVersion { expected: u8, got: u8 },

    #[error("CRC 불일치: expected {expected:08X}, got {got:08X}")]
    CrcMismatch { expected: u32, got: u32 },

    #[error("잘린 패킷: {len} bytes")]
    TruncatedPacket { len: usize },

    #[error("페이로드 크기 초과: {len} > {max_len}")]
    PayloadTooLarge { len: usize, max_len: usize },

    #[error("코덱 실행 파일 없음: {program}")]
    CodecUnavailable { program: String },

    #[error("코덱 실패: {program} exit status {status}")]
    CodecFailed { program: String, status: String },

    #[error("채널 에러")]
    ChannelError,

    #[error("연결 종료")]
    ConnectionClosed,
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
