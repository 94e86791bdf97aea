//! mesh-send - Codec2 녹음 파일을 메시 노드로 전송
//!
//! 사용법:
//!   cargo run --release --bin mesh-send -- --dest '!0000000b' --peer '!0000000b=127.0.0.1:4403'
//!
//! 예시:
//!   # recording.c2 전송
//!   cargo run --release --bin mesh-send -- --dest '!0000000b' --peer '!0000000b=10.0.0.2:4403'
//!
//!   # PCM을 c2enc로 인코딩 후 전송, 청크 사이 2초 간격
//!   cargo run --release --bin mesh-send -- --pcm voice.raw --interval-ms 2000 --dest 11 --peer 11=10.0.0.2:4403

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use meshvoice::transport::parse_node_id;
use meshvoice::{Codec2, Config, NodeId, Sender, UdpMeshNode};

/// 메시 무선 음성 송신기
#[derive(Parser, Debug)]
#[command(name = "mesh-send")]
#[command(about = "Send a Codec2 recording over the mesh as marker-framed chunks")]
struct Args {
    /// 로컬 바인드 주소
    #[arg(short, long, default_value = "0.0.0.0:0")]
    bind: SocketAddr,

    /// 이 노드 번호 (!hex, 0xhex, 10진수)
    #[arg(long, default_value = "!00000001", value_parser = node_id)]
    node_id: NodeId,

    /// 목적지 노드 번호
    #[arg(short, long, value_parser = node_id)]
    dest: NodeId,

    /// 이웃 노드 주소 (NODE=ADDR, 여러 번 지정 가능)
    #[arg(short, long = "peer", value_parser = peer)]
    peers: Vec<(NodeId, SocketAddr)>,

    /// 전송할 Codec2 파일
    #[arg(short, long, default_value = "recording.c2")]
    file: PathBuf,

    /// 이 PCM 파일을 c2enc로 인코딩해서 전송 (--file 대신)
    #[arg(long)]
    pcm: Option<PathBuf>,

    /// Codec2 모드
    #[arg(long, default_value = meshvoice::codec::DEFAULT_CODEC2_MODE)]
    mode: String,

    /// 메시지당 최대 데이터 길이
    #[arg(long, default_value_t = meshvoice::DEFAULT_DATA_PAYLOAD_LEN)]
    payload_len: usize,

    /// 헤더 예약 바이트
    #[arg(long, default_value_t = meshvoice::DEFAULT_HEADER_RESERVE)]
    reserve: usize,

    /// 논리 포트
    #[arg(long, default_value_t = meshvoice::DEFAULT_PORT)]
    port: u32,

    /// 청크 간격 (밀리초)
    #[arg(long, default_value_t = 0)]
    interval_ms: u64,
}

fn node_id(s: &str) -> Result<NodeId, String> {
    parse_node_id(s).ok_or_else(|| format!("유효한 노드 번호 필요: {}", s))
}

fn peer(s: &str) -> Result<(NodeId, SocketAddr), String> {
    let (id, addr) = s
        .split_once('=')
        .ok_or_else(|| format!("NODE=ADDR 형식 필요: {}", s))?;
    let addr = addr
        .parse()
        .map_err(|e| format!("유효한 주소 필요: {} ({})", addr, e))?;
    Ok((node_id(id)?, addr))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let config = Config {
        data_payload_len: args.payload_len,
        header_reserve: args.reserve,
        port: args.port,
        chunk_interval_ms: args.interval_ms,
        ..Config::default()
    };
    config.validate()?;

    info!("mesh-send starting...");
    info!("Node: {:08x} -> {:08x}, port {}", args.node_id, args.dest, config.port);
    info!("Max chunk length: {} bytes", config.max_chunk_len());

    // 전송할 데이터 준비
    let data = match &args.pcm {
        Some(path) => {
            info!("Encoding PCM: {:?}", path);
            let pcm = tokio::fs::read(path).await?;
            Codec2::new(args.mode.clone()).encode(&pcm).await?
        }
        None => {
            info!("Loading file: {:?}", args.file);
            tokio::fs::read(&args.file).await?
        }
    };

    // 메시 노드
    let node = Arc::new(UdpMeshNode::bind(args.node_id, args.bind, config.data_payload_len).await?);
    for (id, addr) in &args.peers {
        node.add_peer(*id, *addr);
    }

    let (outbound, send_task) = node.spawn_outbound(1000);
    let sender = Sender::new(config, outbound)?;

    let chunks = sender.send_payload(&data, args.dest).await?;
    let stats = sender.get_stats();

    // 송신 큐 비우기
    drop(sender);
    send_task.await?;

    info!("Transfer queued and flushed: {} chunks", chunks);
    info!("{}", stats.summary());
    Ok(())
}
