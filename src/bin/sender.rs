//! RFT 송신자 - Reliable File Transfer
//!
//! ARQ 기반 UDP 파일 전송 프로토콜 송신측
//! - Stop-and-Wait 또는 Selective-Repeat으로 전 패킷 전달 보장
//! - SHA-256 해시로 종단 간 검증
//!
//! 사용법:
//!   cargo run --release --bin rft-sender -- [OPTIONS]
//!
//! 예시:
//!   # 기본 전송 (Selective-Repeat)
//!   cargo run --release --bin rft-sender -- --target 127.0.0.1:9000 --file data.bin
//!
//!   # Stop-and-Wait 모드
//!   cargo run --release --bin rft-sender -- -t 127.0.0.1:9000 -f data.bin --mode saw

use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use rft::{ArqMode, Config, DeliveryReport, Sender, UdpTransport};

/// 송신자 설정
struct SenderArgs {
    bind_addr: SocketAddr,
    target_addr: SocketAddr,
    file_path: Option<PathBuf>,
    config: Config,
}

impl Default for SenderArgs {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:0".parse().unwrap(),
            target_addr: "127.0.0.1:9000".parse().unwrap(),
            file_path: None,
            config: Config::default(),
        }
    }
}

fn parse_args() -> SenderArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = SenderArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    parsed.bind_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--target" | "-t" => {
                if i + 1 < args.len() {
                    parsed.target_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--file" | "-f" => {
                if i + 1 < args.len() {
                    parsed.file_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--mode" | "-m" => {
                if i + 1 < args.len() {
                    parsed.config.mode = match args[i + 1].as_str() {
                        "saw" | "stop-and-wait" => ArqMode::StopAndWait,
                        "sr" | "selective-repeat" => ArqMode::SelectiveRepeat,
                        other => panic!("알 수 없는 모드: {other} (saw|sr)"),
                    };
                    i += 1;
                }
            }
            "--window" | "-w" => {
                if i + 1 < args.len() {
                    parsed.config.window_size = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--chunk-size" => {
                if i + 1 < args.len() {
                    parsed.config.chunk_payload = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--ack-timeout" => {
                if i + 1 < args.len() {
                    parsed.config.ack_timeout_ms = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--lossy" => {
                let mode = parsed.config.mode;
                parsed.config = Config::lossy_network();
                parsed.config.mode = mode;
            }
            "--help" | "-h" => {
                println!(
                    r#"RFT Sender - Reliable File Transfer 송신자

ARQ 기반 UDP 파일 전송 프로토콜 송신측
- Stop-and-Wait / Selective-Repeat으로 전 패킷 전달 보장
- 패킷별 CRC-32 + 파일 전체 SHA-256 검증

사용법:
  cargo run --release --bin rft-sender -- [OPTIONS]

옵션:
  -b, --bind <ADDR>      로컬 바인드 주소 (기본: 0.0.0.0:0 = 자동 할당)
  -t, --target <ADDR>    수신자 주소 (기본: 127.0.0.1:9000)
  -f, --file <PATH>      전송할 파일 경로 (필수)
  -m, --mode <MODE>      ARQ 모드: saw | sr (기본: sr)
  -w, --window <N>       Selective-Repeat 윈도우 크기 (기본: 4)
  --chunk-size <BYTES>   DATA 페이로드 크기 (기본: 1008, 최대 1008)
  --ack-timeout <MS>     응답 대기 타임아웃 (기본: 500)
  --lossy                불안정 네트워크 프리셋 사용
  -h, --help             이 도움말 출력

예시:
  # Selective-Repeat으로 파일 전송
  cargo run --release --bin rft-sender -- -t 192.168.0.10:9000 -f photo.png

  # Stop-and-Wait + 작은 청크 (불안정 네트워크)
  cargo run --release --bin rft-sender -- -f data.bin --mode saw --chunk-size 512 --lossy
"#
                );
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    parsed
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = parse_args();
    let file_path = args.file_path.ok_or("전송할 파일을 --file로 지정하세요")?;

    info!("RFT Sender starting...");
    info!("Target address: {}", args.target_addr);
    info!("File: {:?}", file_path);
    info!("Mode: {:?}", args.config.mode);

    let transport = UdpTransport::bind(args.bind_addr).await?;
    info!("Bound to local address: {}", transport.local_addr()?);

    let sender = Sender::new(args.config, transport, args.target_addr);

    match sender.send_file(&file_path).await? {
        DeliveryReport::Verified => {
            info!("Transfer complete: receiver confirmed hash match (FACK)");
        }
        DeliveryReport::Indeterminate => {
            info!("Transfer complete: all packets acknowledged, file-level reply not observed");
        }
    }

    Ok(())
}
