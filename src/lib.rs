//! # meshvoice
//!
//! 메시 무선망으로 Codec2 음성 녹음을 보내는 조각화/재조립 프로토콜
//!
//! ## 핵심 특징
//! - **마커 프레이밍**: Codec2 매직 `C0 DE C2`가 시작, 두 번 반복한 6바이트가 종료
//! - **종료 마커 보존**: 청크 분할 시 종료 마커가 두 청크에 걸치지 않음
//! - **순서 무관 재조립**: 송신자별로 누적, 시퀀스 ID 정렬 후 매 도착마다 완료 검사
//! - **다중 송신자**: 송신자 키별 독립 상태
//! - **선택적 강화**: 크기 제한, 타임아웃, 연속 ID 검사 (기본 비활성)

pub mod chunk;
pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod message;
pub mod reassembler;
pub mod receiver;
pub mod sender;
pub mod stats;
pub mod transport;

pub use chunk::{chunk, Chunk, Chunker, SenderKey, SequenceId};
pub use codec::Codec2;
pub use config::Config;
pub use error::{Error, Result};
pub use frame::{MARKER, TERMINATOR};
pub use reassembler::{Reassembler, ReassemblerConfig, SharedReassembler};
pub use receiver::{CompletedStream, Receiver, StreamReceiver};
pub use sender::Sender;
pub use stats::TransferStats;
pub use transport::{InboundPacket, NodeId, OutboundPacket, PacketId, PortNum, UdpMeshNode};

/// 봉투 프로토콜 버전
pub const PROTOCOL_VERSION: u8 = 1;

/// 메시지당 최대 데이터 길이 (Meshtastic DATA_PAYLOAD_LEN)
pub const DEFAULT_DATA_PAYLOAD_LEN: usize = 233;

/// 프로토콜 헤더 예약 바이트
pub const DEFAULT_HEADER_RESERVE: usize = 37;

/// 음성 스트림 논리 포트
pub const DEFAULT_PORT: u32 = 456;

/// 매직 넘버 (UDP 봉투 식별용)
pub const MAGIC_NUMBER: u32 = 0x4D455348; // "MESH"
