//! 송신자별 스트림 재조립기
//!
//! - 청크는 순서 없이, 여러 송신자로부터 섞여서 도착
//! - 송신자별로 (시퀀스 ID, 데이터) 목록을 누적하고 도착할 때마다 완료 검사
//! - 시작 마커로 시작하고 종료 마커로 끝나면 스트림 완료, 상태 초기화

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::chunk::{Chunk, SenderKey, SequenceId};
use crate::frame;

/// 재조립 강화 옵션 (기본값은 모두 비활성)
#[derive(Debug, Clone, Default)]
pub struct ReassemblerConfig {
    /// 송신자별 최대 누적 바이트. 초과 시 해당 스트림 폐기
    pub max_stream_bytes: Option<usize>,

    /// 마지막 청크 이후 이 시간이 지나면 `prune_stale`에서 폐기
    pub stale_after: Option<Duration>,

    /// 완료 판정 시 시퀀스 ID가 빈틈 없이 연속이어야 함
    pub contiguous_ids: bool,
}

/// `ingest` 결과 외 관찰용 카운터
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblyCounters {
    pub chunks_ingested: u64,
    pub bytes_ingested: u64,
    pub streams_completed: u64,
    pub duplicate_ids: u64,
    pub streams_evicted: u64,
}

/// 한 송신자의 진행 중 스트림
#[derive(Debug)]
struct StreamBuffer {
    /// (시퀀스 ID, 데이터), 항상 시퀀스 ID 오름차순
    parts: Vec<(SequenceId, Bytes)>,
    buffered_bytes: usize,
    last_arrival: Instant,
}

/// 스트림 버퍼에 청크 하나를 넣은 결과
enum Push {
    Pending,
    Complete(Bytes),
    Evicted,
}

impl StreamBuffer {
    fn new(now: Instant) -> Self {
        Self {
            parts: Vec::new(),
            buffered_bytes: 0,
            last_arrival: now,
        }
    }

    fn push(
        &mut self,
        sender: SenderKey,
        sequence_id: SequenceId,
        data: Bytes,
        config: &ReassemblerConfig,
        counters: &mut ReassemblyCounters,
        now: Instant,
    ) -> Push {
        counters.chunks_ingested += 1;
        counters.bytes_ingested += data.len() as u64;

        if self.parts.iter().any(|(id, _)| *id == sequence_id) {
            counters.duplicate_ids += 1;
            warn!(
                "중복 시퀀스 ID: sender={:08x}, id={} (조립 결과가 손상될 수 있음)",
                sender, sequence_id
            );
        }

        // 같은 ID끼리는 도착 순서 유지 (stable)
        let pos = self.parts.partition_point(|(id, _)| *id <= sequence_id);
        self.buffered_bytes += data.len();
        self.parts.insert(pos, (sequence_id, data));
        self.last_arrival = now;

        if let Some(max) = config.max_stream_bytes {
            if self.buffered_bytes > max {
                warn!(
                    "스트림 폐기: sender={:08x}, {} bytes > {} bytes",
                    sender, self.buffered_bytes, max
                );
                counters.streams_evicted += 1;
                return Push::Evicted;
            }
        }

        if config.contiguous_ids && !self.ids_contiguous() {
            return Push::Pending;
        }

        let candidate = self.assemble();
        if frame::is_complete(&candidate) {
            counters.streams_completed += 1;
            debug!(
                "스트림 완료: sender={:08x}, {} chunks, {} bytes",
                sender,
                self.parts.len(),
                candidate.len()
            );
            Push::Complete(candidate)
        } else {
            Push::Pending
        }
    }

    fn ids_contiguous(&self) -> bool {
        self.parts
            .windows(2)
            .all(|w| w[1].0 == w[0].0.wrapping_add(1))
    }

    fn assemble(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.buffered_bytes);
        for (_, data) in &self.parts {
            buf.extend_from_slice(data);
        }
        buf.freeze()
    }

    fn is_stale(&self, now: Instant, stale_after: Duration) -> bool {
        now.saturating_duration_since(self.last_arrival) > stale_after
    }
}

/// 재조립기 (단일 소유자)
///
/// 수신 이벤트 루프 하나가 소유하고 호출한다. 여러 스레드에서 공유하려면
/// [`SharedReassembler`]를 쓴다.
#[derive(Debug, Default)]
pub struct Reassembler {
    config: ReassemblerConfig,
    streams: HashMap<SenderKey, StreamBuffer>,
    counters: ReassemblyCounters,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ReassemblerConfig) -> Self {
        Self {
            config,
            streams: HashMap::new(),
            counters: ReassemblyCounters::default(),
        }
    }

    /// 청크 하나 수신
    ///
    /// 스트림이 완성되면 시작 마커와 종료 마커를 포함한 조립 버퍼를 돌려주고
    /// 해당 송신자 상태를 비운다. 아직 미완성이면 `None`.
    pub fn ingest(
        &mut self,
        sender: SenderKey,
        sequence_id: SequenceId,
        data: Bytes,
    ) -> Option<Bytes> {
        let now = Instant::now();
        let stream = self
            .streams
            .entry(sender)
            .or_insert_with(|| StreamBuffer::new(now));

        match stream.push(sender, sequence_id, data, &self.config, &mut self.counters, now) {
            Push::Pending => None,
            Push::Complete(payload) => {
                self.streams.remove(&sender);
                Some(payload)
            }
            Push::Evicted => {
                self.streams.remove(&sender);
                None
            }
        }
    }

    /// [`Chunk`] 단위 수신
    pub fn ingest_chunk(&mut self, chunk: Chunk) -> Option<Bytes> {
        self.ingest(chunk.sender, chunk.sequence_id, chunk.data)
    }

    /// 오래된 미완성 스트림 정리. 폐기한 송신자 수 반환
    pub fn prune_stale(&mut self, now: Instant) -> usize {
        let Some(stale_after) = self.config.stale_after else {
            return 0;
        };

        let before = self.streams.len();
        self.streams.retain(|sender, stream| {
            if stream.is_stale(now, stale_after) {
                warn!(
                    "스트림 타임아웃: sender={:08x}, {} chunks, {} bytes",
                    sender,
                    stream.parts.len(),
                    stream.buffered_bytes
                );
                false
            } else {
                true
            }
        });
        let pruned = before - self.streams.len();
        self.counters.streams_evicted += pruned as u64;
        pruned
    }

    /// 진행 중 스트림이 있는 송신자 목록
    pub fn pending_senders(&self) -> Vec<SenderKey> {
        let mut senders: Vec<SenderKey> = self.streams.keys().copied().collect();
        senders.sort_unstable();
        senders
    }

    /// 송신자의 누적 바이트 (없으면 0)
    pub fn buffered_bytes(&self, sender: SenderKey) -> usize {
        self.streams.get(&sender).map_or(0, |s| s.buffered_bytes)
    }

    /// 송신자의 진행 중 스트림 폐기
    pub fn clear(&mut self, sender: SenderKey) -> bool {
        self.streams.remove(&sender).is_some()
    }

    pub fn counters(&self) -> ReassemblyCounters {
        self.counters
    }
}

/// 공유 재조립기 (`&self`로 호출)
///
/// 송신자 키별 엔트리 락으로 같은 송신자의 변경을 직렬화한다.
/// 서로 다른 송신자는 동시에 진행 가능.
#[derive(Debug, Default)]
pub struct SharedReassembler {
    config: ReassemblerConfig,
    streams: DashMap<SenderKey, StreamBuffer>,
    counters: parking_lot::Mutex<ReassemblyCounters>,
}

impl SharedReassembler {
    pub fn new(config: ReassemblerConfig) -> Self {
        Self {
            config,
            streams: DashMap::new(),
            counters: parking_lot::Mutex::new(ReassemblyCounters::default()),
        }
    }

    /// [`Reassembler::ingest`]와 같은 의미
    pub fn ingest(&self, sender: SenderKey, sequence_id: SequenceId, data: Bytes) -> Option<Bytes> {
        let now = Instant::now();
        let mut local = ReassemblyCounters::default();

        // 완료/폐기된 스트림은 엔트리 락을 쥔 채로 제거
        let outcome = match self.streams.entry(sender) {
            Entry::Occupied(mut occupied) => {
                let outcome = occupied.get_mut().push(
                    sender,
                    sequence_id,
                    data,
                    &self.config,
                    &mut local,
                    now,
                );
                if !matches!(outcome, Push::Pending) {
                    occupied.remove();
                }
                outcome
            }
            Entry::Vacant(vacant) => {
                let mut stream = StreamBuffer::new(now);
                let outcome = stream.push(sender, sequence_id, data, &self.config, &mut local, now);
                if matches!(outcome, Push::Pending) {
                    vacant.insert(stream);
                }
                outcome
            }
        };

        {
            let mut counters = self.counters.lock();
            counters.chunks_ingested += local.chunks_ingested;
            counters.bytes_ingested += local.bytes_ingested;
            counters.streams_completed += local.streams_completed;
            counters.duplicate_ids += local.duplicate_ids;
            counters.streams_evicted += local.streams_evicted;
        }

        match outcome {
            Push::Complete(payload) => Some(payload),
            Push::Pending | Push::Evicted => None,
        }
    }

    pub fn prune_stale(&self, now: Instant) -> usize {
        let Some(stale_after) = self.config.stale_after else {
            return 0;
        };

        let mut pruned = 0usize;
        self.streams.retain(|sender, stream| {
            if stream.is_stale(now, stale_after) {
                warn!(
                    "스트림 타임아웃: sender={:08x}, {} chunks, {} bytes",
                    sender,
                    stream.parts.len(),
                    stream.buffered_bytes
                );
                pruned += 1;
                false
            } else {
                true
            }
        });
        self.counters.lock().streams_evicted += pruned as u64;
        pruned
    }

    pub fn buffered_bytes(&self, sender: SenderKey) -> usize {
        self.streams.get(&sender).map_or(0, |s| s.buffered_bytes)
    }

    pub fn counters(&self) -> ReassemblyCounters {
        *self.counters.lock()
    }
}
