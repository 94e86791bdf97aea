//! 청크 정의와 청크 분할기
//!
//! - Stream: 한 송신자가 보내는 페이로드 + 종료 마커
//! - Chunk: 메시 무선 메시지 한 개에 들어가는 조각 (max_chunk_len 이하)

use bytes::Bytes;

use crate::frame::{self, TERMINATOR};
use crate::{Error, Result};

/// 송신자 키 (메시 노드 번호)
pub type SenderKey = u32;

/// 시퀀스 ID (전송 계층이 부여하는 패킷 ID)
pub type SequenceId = u32;

/// 수신된 청크
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 송신자 키
    pub sender: SenderKey,

    /// 시퀀스 ID
    pub sequence_id: SequenceId,

    /// 청크 데이터
    pub data: Bytes,
}

impl Chunk {
    pub fn new(sender: SenderKey, sequence_id: SequenceId, data: Bytes) -> Self {
        Self {
            sender,
            sequence_id,
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// 청크 분할기 (송신측)
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    max_chunk_len: usize,
}

impl Chunker {
    /// 새 분할기 생성
    ///
    /// 종료 마커가 한 청크에 통째로 들어갈 수 없으면 실패한다.
    pub fn new(max_chunk_len: usize) -> Result<Self> {
        if max_chunk_len < TERMINATOR.len() {
            return Err(Error::UndersizedChunkLength {
                max_chunk_len,
                required: TERMINATOR.len(),
            });
        }
        Ok(Self { max_chunk_len })
    }

    pub fn max_chunk_len(&self) -> usize {
        self.max_chunk_len
    }

    /// 페이로드에 종료 마커를 붙여 청크들로 분할
    ///
    /// 종료 마커는 절대 두 청크에 걸치지 않는다. 보폭 경계가 종료 마커 내부에
    /// 떨어지면 마커 앞부분을 짧은 청크로 내보내고 마커를 단독 청크로 보낸다.
    pub fn split(&self, payload: &[u8]) -> Vec<Bytes> {
        let framed = Bytes::from(frame::frame(payload));
        let total = framed.len();
        let terminator_start = total - TERMINATOR.len();

        let mut chunks = Vec::with_capacity(total / self.max_chunk_len + 2);
        let mut offset = 0;

        while offset < total {
            let boundary = offset + self.max_chunk_len;

            if boundary > terminator_start && boundary < total {
                if offset < terminator_start {
                    chunks.push(framed.slice(offset..terminator_start));
                }
                chunks.push(framed.slice(terminator_start..));
                break;
            }

            let end = boundary.min(total);
            chunks.push(framed.slice(offset..end));
            offset = end;
        }

        chunks
    }

    /// 분할 결과의 청크 수 (전송 전 로그용)
    ///
    /// 종료 마커 앞에서 끊어도 마지막 두 청크의 경계만 옮겨지므로
    /// 직선 분할과 개수가 같다.
    pub fn chunk_count(&self, payload_len: usize) -> usize {
        (payload_len + TERMINATOR.len()).div_ceil(self.max_chunk_len)
    }
}

/// 페이로드를 종료 마커 포함 청크들로 분할
pub fn chunk(payload: &[u8], max_chunk_len: usize) -> Result<Vec<Bytes>> {
    Ok(Chunker::new(max_chunk_len)?.split(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MARKER;
    use proptest::prelude::*;

    fn terminator_intact(chunks: &[Bytes], payload_len: usize) -> bool {
        let terminator_start = payload_len;
        let terminator_end = terminator_start + TERMINATOR.len();
        let mut offset = 0;
        for c in chunks {
            let (start, end) = (offset, offset + c.len());
            // 종료 마커 구간과 겹치면 마커 전체를 포함해야 함
            let overlaps = start < terminator_end && end > terminator_start;
            let covers = start <= terminator_start && end >= terminator_end;
            if overlaps && !covers {
                return false;
            }
            offset = end;
        }
        true
    }

    #[test]
    fn test_undersized_chunk_len_rejected() {
        assert!(matches!(
            Chunker::new(5),
            Err(Error::UndersizedChunkLength { max_chunk_len: 5, required: 6 })
        ));
        assert!(chunk(b"abc", 0).is_err());
        assert!(Chunker::new(6).is_ok());
    }

    #[test]
    fn test_empty_payload() {
        let chunks = chunk(b"", 64).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref(), &TERMINATOR);
    }

    #[test]
    fn test_split_scenario() {
        let payload = vec![0x41u8; 12];
        let chunks = chunk(&payload, 10).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].as_ref(), &[0x41u8; 10]);
        assert_eq!(&chunks[1][..2], &[0x41, 0x41]);
        assert_eq!(&chunks[1][2..], &TERMINATOR);
    }

    #[test]
    fn test_boundary_inside_terminator() {
        // framed = 14바이트, 종료 마커 8..14, 직선 경계 10은 마커 내부
        let payload = vec![0x11u8; 8];
        let chunks = chunk(&payload, 10).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].as_ref(), &[0x11u8; 8]);
        assert_eq!(chunks[1].as_ref(), &TERMINATOR);
    }

    #[test]
    fn test_terminator_alone_after_full_stride() {
        // framed = 26바이트, 경계 10, 20 -> 20은 마커(20..26)의 시작이므로 분할 아님
        let payload = vec![0x22u8; 20];
        let chunks = chunk(&payload, 10).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].as_ref(), &TERMINATOR);
    }

    #[test]
    fn test_max_len_equal_to_terminator() {
        let mut payload = MARKER.to_vec();
        payload.extend_from_slice(&[1, 2, 3, 4]);
        let chunks = chunk(&payload, 6).unwrap();

        assert!(chunks.iter().all(|c| c.len() <= 6));
        assert_eq!(chunks.last().unwrap().as_ref(), &TERMINATOR);
        assert!(terminator_intact(&chunks, payload.len()));
    }

    #[test]
    fn test_chunk_count_matches_split() {
        for max in 6..40 {
            let chunker = Chunker::new(max).unwrap();
            for len in 0..120 {
                let payload = vec![0x5Au8; len];
                assert_eq!(
                    chunker.chunk_count(len),
                    chunker.split(&payload).len(),
                    "max={} len={}",
                    max,
                    len
                );
            }
        }
    }

    proptest! {
        #[test]
        fn prop_chunks_bounded_and_terminator_whole(
            payload in proptest::collection::vec(any::<u8>(), 0..600),
            max_chunk_len in 6usize..260,
        ) {
            let chunks = chunk(&payload, max_chunk_len).unwrap();

            prop_assert!(!chunks.is_empty());
            prop_assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= max_chunk_len));
            prop_assert!(terminator_intact(&chunks, payload.len()));

            let joined: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
            prop_assert_eq!(joined, frame::frame(&payload));
        }
    }
}
