//! mesh-recv - 메시 노드에서 음성 스트림을 받아 `<sender>.c2`로 저장
//!
//! 사용법:
//!   cargo run --release --bin mesh-recv -- --bind 0.0.0.0:4403 --node-id '!0000000b'
//!
//! 예시:
//!   # 수신 후 c2dec로 PCM 디코딩 (<sender>.raw)
//!   cargo run --release --bin mesh-recv -- --node-id 11 --out-dir recordings --decode
//!
//!   # 강화 모드 (크기 제한 + 타임아웃 + 연속 ID)
//!   cargo run --release --bin mesh-recv -- --node-id 11 --hardened

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use meshvoice::codec::save_recording;
use meshvoice::transport::parse_node_id;
use meshvoice::{Codec2, CompletedStream, Config, NodeId, Receiver, UdpMeshNode};

/// 메시 무선 음성 수신기
#[derive(Parser, Debug)]
#[command(name = "mesh-recv")]
#[command(about = "Reassemble Codec2 recordings received over the mesh")]
struct Args {
    /// 로컬 바인드 주소
    #[arg(short, long, default_value = "0.0.0.0:4403")]
    bind: SocketAddr,

    /// 이 노드 번호 (!hex, 0xhex, 10진수)
    #[arg(long, default_value = "!0000000b", value_parser = node_id)]
    node_id: NodeId,

    /// 논리 포트
    #[arg(long, default_value_t = meshvoice::DEFAULT_PORT)]
    port: u32,

    /// 메시지당 최대 데이터 길이
    #[arg(long, default_value_t = meshvoice::DEFAULT_DATA_PAYLOAD_LEN)]
    payload_len: usize,

    /// 저장 디렉터리
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    /// 시작 마커 유지. 기본은 제거하므로 저장된 .c2에 Codec2 헤더가 없다
    #[arg(long)]
    keep_marker: bool,

    /// c2dec로 디코딩해서 <sender>.raw도 저장 (--keep-marker 포함)
    #[arg(long)]
    decode: bool,

    /// Codec2 모드
    #[arg(long, default_value = meshvoice::codec::DEFAULT_CODEC2_MODE)]
    mode: String,

    /// 미완성 스트림 타임아웃 (밀리초)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// 송신자별 최대 누적 바이트
    #[arg(long)]
    max_stream_bytes: Option<usize>,

    /// 완료 판정에 연속 시퀀스 ID 요구
    #[arg(long)]
    contiguous_ids: bool,

    /// 강화 프리셋 사용
    #[arg(long)]
    hardened: bool,
}

fn node_id(s: &str) -> Result<NodeId, String> {
    parse_node_id(s).ok_or_else(|| format!("유효한 노드 번호 필요: {}", s))
}

fn build_config(args: &Args) -> Config {
    let base = if args.hardened {
        Config::hardened()
    } else {
        Config::default()
    };

    Config {
        data_payload_len: args.payload_len,
        port: args.port,
        // c2dec는 Codec2 헤더가 필요
        keep_start_marker: args.keep_marker || args.decode,
        stream_timeout_ms: args.timeout_ms.or(base.stream_timeout_ms),
        max_stream_bytes: args.max_stream_bytes.or(base.max_stream_bytes),
        contiguous_ids: args.contiguous_ids || base.contiguous_ids,
        ..base
    }
}

async fn handle_stream(args: &Args, codec: &Codec2, stream: CompletedStream) -> meshvoice::Result<()> {
    let path = save_recording(&args.out_dir, stream.sender, &stream.payload).await?;

    if args.decode {
        let pcm = codec.decode(&stream.payload).await?;
        let raw_path = path.with_extension("raw");
        tokio::fs::write(&raw_path, &pcm).await?;
        info!("Decoded PCM saved to {:?}", raw_path);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = build_config(&args);
    config.validate()?;

    info!("mesh-recv starting...");
    info!("Node: {:08x}, port {}", args.node_id, config.port);
    info!("Output directory: {:?}", args.out_dir);
    if !config.keep_start_marker {
        info!("Start marker stripped: saved .c2 files have no Codec2 header");
    }

    tokio::fs::create_dir_all(&args.out_dir).await?;

    let node = Arc::new(UdpMeshNode::bind(args.node_id, args.bind, config.data_payload_len).await?);
    let inbound = node.spawn_inbound(config.port, config.inbound_queue_size);
    let (receiver, mut streams) = Receiver::start(config, inbound);
    let codec = Codec2::new(args.mode.clone());

    info!("Waiting for voice streams... (Ctrl+C to stop)");

    loop {
        tokio::select! {
            stream = streams.recv() => {
                let Some(stream) = stream else { break };
                if let Err(e) = handle_stream(&args, &codec, stream).await {
                    warn!("스트림 처리 실패: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping...");
                break;
            }
        }
    }

    node.stop();
    receiver.stop().await;
    info!("{}", receiver.get_stats().await.summary());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_config_hardened_overrides() {
        let args = Args::parse_from(["mesh-recv", "--hardened", "--timeout-ms", "500"]);
        let config = build_config(&args);

        assert_eq!(config.stream_timeout_ms, Some(500));
        assert!(config.contiguous_ids);
        assert!(config.max_stream_bytes.is_some());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_build_config_defaults() {
        let args = Args::parse_from(["mesh-recv", "--node-id", "!a1b2c3d4"]);
        let config = build_config(&args);

        assert_eq!(args.node_id, 0xa1b2c3d4);
        assert_eq!(config.port, meshvoice::DEFAULT_PORT);
        assert!(config.stream_timeout_ms.is_none());
        assert!(!config.keep_start_marker);
    }

    #[test]
    fn test_decode_keeps_start_marker() {
        let args = Args::parse_from(["mesh-recv", "--decode"]);
        let config = build_config(&args);

        assert!(!args.keep_marker);
        assert!(config.keep_start_marker);
    }
}
