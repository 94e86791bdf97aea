//! UDP 메시 에뮬레이션용 데이터그램 봉투
//!
//! 메시 무선 패킷(from, to, id, port, payload)을 UDP 데이터그램 하나로 감싼다.
//!
//! ```text
//! header_len(u16 LE) | EnvelopeHeader(bincode) | payload
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::transport::{NodeId, PacketId, PortNum};
use crate::{Error, Result, MAGIC_NUMBER, PROTOCOL_VERSION};

/// 봉투 헤더
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeHeader {
    /// 매직 넘버
    pub magic: u32,

    /// 프로토콜 버전
    pub version: u8,

    /// 송신 노드
    pub from: NodeId,

    /// 수신 노드 (BROADCAST_NODE = 전체)
    pub to: NodeId,

    /// 패킷 ID (송신 노드가 단조 증가로 부여)
    pub id: PacketId,

    /// 논리 포트
    pub port: PortNum,

    /// 페이로드 길이
    pub payload_len: u16,

    /// 페이로드 CRC32
    pub crc32: u32,
}

/// 메시 패킷 봉투
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshEnvelope {
    pub header: EnvelopeHeader,
    pub payload: Bytes,
}

impl MeshEnvelope {
    pub fn new(from: NodeId, to: NodeId, id: PacketId, port: PortNum, payload: Bytes) -> Self {
        Self {
            header: EnvelopeHeader {
                magic: MAGIC_NUMBER,
                version: PROTOCOL_VERSION,
                from,
                to,
                id,
                port,
                payload_len: payload.len() as u16,
                crc32: crc32fast::hash(&payload),
            },
            payload,
        }
    }

    /// 바이트로 직렬화
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let header_bytes = bincode::serialize(&self.header)?;
        let header_len = header_bytes.len() as u16;

        let mut buf = Vec::with_capacity(2 + header_bytes.len() + self.payload.len());
        buf.extend_from_slice(&header_len.to_le_bytes());
        buf.extend_from_slice(&header_bytes);
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// 바이트에서 역직렬화 및 검증
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 2 {
            return Err(Error::TruncatedPacket { len: bytes.len() });
        }

        let header_len = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
        let body = bytes
            .get(2..)
            .filter(|b| b.len() >= header_len)
            .ok_or(Error::TruncatedPacket { len: bytes.len() })?;

        let header: EnvelopeHeader = bincode::deserialize(&body[..header_len])?;

        if header.magic != MAGIC_NUMBER {
            return Err(Error::InvalidMagicNumber {
                expected: MAGIC_NUMBER,
                got: header.magic,
            });
        }
        if header.version != PROTOCOL_VERSION {
            return Err(Error::InvalidVersion {
                expected: PROTOCOL_VERSION,
                got: header.version,
            });
        }

        let payload = &body[header_len..];
        if payload.len() != header.payload_len as usize {
            return Err(Error::TruncatedPacket { len: bytes.len() });
        }

        let crc = crc32fast::hash(payload);
        if crc != header.crc32 {
            return Err(Error::CrcMismatch {
                expected: header.crc32,
                got: crc,
            });
        }

        Ok(Self {
            header,
            payload: Bytes::copy_from_slice(payload),
        })
    }
}
