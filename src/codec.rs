//! 외부 Codec2 코덱 연동
//!
//! `c2enc` / `c2dec` 프로세스에 표준입출력으로 바이트를 흘려보낸다.
//! 코덱 자체의 의미는 다루지 않는다 (불투명 바이트 입출력).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::transport::NodeId;
use crate::{Error, Result};

/// 기본 Codec2 모드
pub const DEFAULT_CODEC2_MODE: &str = "700C";

/// Codec2 외부 코덱
#[derive(Debug, Clone)]
pub struct Codec2 {
    /// 코덱 모드 (예: 700C, 1200, 3200)
    pub mode: String,

    /// 인코더 실행 파일
    pub encoder: String,

    /// 디코더 실행 파일
    pub decoder: String,
}

impl Default for Codec2 {
    fn default() -> Self {
        Self {
            mode: DEFAULT_CODEC2_MODE.to_string(),
            encoder: "c2enc".to_string(),
            decoder: "c2dec".to_string(),
        }
    }
}

impl Codec2 {
    pub fn new(mode: impl Into<String>) -> Self {
        Self {
            mode: mode.into(),
            ..Self::default()
        }
    }

    /// 16비트 8kHz 모노 PCM -> Codec2 스트림
    pub async fn encode(&self, pcm: &[u8]) -> Result<Vec<u8>> {
        let out = pipe_through(&self.encoder, &[self.mode.as_str(), "-", "-"], pcm).await?;
        info!(
            "Codec2 {} 인코딩: {} bytes PCM -> {} bytes",
            self.mode,
            pcm.len(),
            out.len()
        );
        Ok(out)
    }

    /// Codec2 스트림 -> 16비트 8kHz 모노 PCM
    pub async fn decode(&self, encoded: &[u8]) -> Result<Vec<u8>> {
        let out = pipe_through(&self.decoder, &[self.mode.as_str(), "-", "-"], encoded).await?;
        info!(
            "Codec2 {} 디코딩: {} bytes -> {} bytes PCM",
            self.mode,
            encoded.len(),
            out.len()
        );
        Ok(out)
    }
}

/// 외부 프로세스에 입력을 넣고 표준출력 전체를 받는다
async fn pipe_through(program: &str, args: &[&str], input: &[u8]) -> Result<Vec<u8>> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::CodecUnavailable {
                program: program.to_string(),
            },
            _ => Error::Io(e),
        })?;

    debug!("{} {:?} 시작, 입력 {} bytes", program, args, input.len());

    // 표준출력이 차서 막히지 않도록 입력은 별도 태스크에서 기록
    let mut stdin = child.stdin.take().ok_or(Error::ChannelError)?;
    let input = input.to_vec();
    let writer = tokio::spawn(async move {
        stdin.write_all(&input).await?;
        stdin.shutdown().await
    });

    let output = child.wait_with_output().await?;
    // 프로세스가 입력을 다 읽기 전에 종료하면 BrokenPipe, 종료 코드로 판정
    let _ = writer.await;

    if !output.status.success() {
        return Err(Error::CodecFailed {
            program: program.to_string(),
            status: output.status.to_string(),
        });
    }

    Ok(output.stdout)
}

/// 수신 스트림을 `<sender>.c2` 파일로 저장
pub async fn save_recording(dir: impl AsRef<Path>, sender: NodeId, data: &[u8]) -> Result<PathBuf> {
    let path = dir.as_ref().join(format!("{}.c2", sender));
    tokio::fs::write(&path, data).await?;
    info!("Saved {} bytes to {:?}", data.len(), path);
    Ok(path)
}
