//! 스트림 프레이밍
//!
//! - Marker: Codec2 파일 매직 `C0 DE C2`. 스트림의 첫 바이트들
//! - Terminator: Marker 두 번 반복 (6바이트). 페이로드 끝에 붙여 전송 종료 표시

/// 스트림 시작 마커 (Codec2 매직)
pub const MARKER: [u8; 3] = [0xC0, 0xDE, 0xC2];

/// 스트림 종료 마커 (MARKER x2)
pub const TERMINATOR: [u8; 6] = [0xC0, 0xDE, 0xC2, 0xC0, 0xDE, 0xC2];

/// 페이로드 뒤에 종료 마커를 붙인 버퍼 생성
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(payload.len() + TERMINATOR.len());
    framed.extend_from_slice(payload);
    framed.extend_from_slice(&TERMINATOR);
    framed
}

/// 버퍼가 시작 마커로 시작하는지
pub fn has_start(buf: &[u8]) -> bool {
    buf.starts_with(&MARKER)
}

/// 버퍼가 종료 마커로 끝나는지
pub fn has_end(buf: &[u8]) -> bool {
    buf.ends_with(&TERMINATOR)
}

/// 완성된 스트림인지 (시작 + 종료 마커 모두)
pub fn is_complete(buf: &[u8]) -> bool {
    has_start(buf) && has_end(buf)
}

/// 종료 마커 제거
pub fn strip_terminator(buf: &[u8]) -> Option<&[u8]> {
    buf.strip_suffix(&TERMINATOR)
}

/// 시작 마커와 종료 마커를 모두 제거
///
/// 종료 마커만으로 이루어진 6바이트 스트림은 빈 슬라이스가 된다
/// (종료 마커의 앞쪽 MARKER가 시작 마커 역할).
pub fn strip_frame(buf: &[u8]) -> Option<&[u8]> {
    if !is_complete(buf) {
        return None;
    }
    if buf.len() <= TERMINATOR.len() {
        return Some(&buf[..0]);
    }
    let end = buf.len() - TERMINATOR.len();
    // 시작 마커와 종료 마커가 겹치는 경우 (7~8바이트) 빈 페이로드
    let start = MARKER.len().min(end);
    Some(&buf[start..end])
}
