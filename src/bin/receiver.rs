//! RFT 수신자 - Reliable File Transfer
//!
//! ARQ 기반 UDP 파일 전송 프로토콜 수신측
//! - 패킷 단위 ACK/NACK + 중복 제거
//! - 완료 시 재조립/SHA-256 검증 후에만 저장
//!
//! 사용법:
//!   cargo run --release --bin rft-receiver -- [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin rft-receiver -- --bind 0.0.0.0:9000 --output ./received

use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use rft::{Config, Receiver, TransferOutcome, UdpTransport};

/// 수신자 설정
struct ReceiverArgs {
    bind_addr: SocketAddr,
    output_dir: PathBuf,
    once: bool,
    config: Config,
}

impl Default for ReceiverArgs {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9000".parse().unwrap(),
            output_dir: PathBuf::from("."),
            once: false,
            config: Config::default(),
        }
    }
}

fn parse_args() -> ReceiverArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = ReceiverArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    parsed.bind_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--output" | "-o" => {
                if i + 1 < args.len() {
                    parsed.output_dir = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--reply-port" => {
                if i + 1 < args.len() {
                    parsed.config.reply_port =
                        Some(args[i + 1].parse().expect("유효한 포트 필요"));
                    i += 1;
                }
            }
            "--once" => {
                parsed.once = true;
            }
            "--lossy" => {
                parsed.config = Config::lossy_network();
            }
            "--help" | "-h" => {
                println!(
                    r#"RFT Receiver - Reliable File Transfer 수신자

ARQ 기반 UDP 파일 전송 프로토콜 수신측
- 패킷 단위 ACK/NACK, first-seen-wins 중복 제거
- SHA-256 검증 통과 시에만 파일 저장

사용법:
  cargo run --release --bin rft-receiver -- [OPTIONS]

옵션:
  -b, --bind <ADDR>     바인드 주소 (기본: 0.0.0.0:9000)
  -o, --output <DIR>    저장 디렉터리 (기본: 현재 디렉터리)
  --reply-port <PORT>   응답을 보낼 고정 포트 (기본: 관측된 출발지 포트)
  --once                전송 하나만 받고 종료
  --lossy               불안정 네트워크 프리셋 사용
  -h, --help            이 도움말 출력

예시:
  # 9000번 포트에서 수신, ./received에 저장
  cargo run --release --bin rft-receiver -- -b 0.0.0.0:9000 -o ./received
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

    info!("RFT Receiver starting...");
    info!("Bind address: {}", args.bind_addr);
    info!("Output directory: {:?}", args.output_dir);

    std::fs::create_dir_all(&args.output_dir)?;

    let transport = UdpTransport::bind(args.bind_addr).await?;
    info!("Listening on {}", transport.local_addr()?);

    let receiver = Receiver::new(args.config, transport, args.output_dir);

    // 전송 시도마다 새 세션으로 수신
    loop {
        match receiver.receive_file().await {
            Ok(TransferOutcome::Delivered { path, bytes }) => {
                info!("File received: {:?} ({} bytes)", path, bytes);
            }
            Ok(TransferOutcome::VerificationFailed) => {
                warn!("Transfer failed verification - nothing written");
            }
            Err(e) => {
                warn!("수신 중 에러: {}", e);
            }
        }

        if args.once {
            break;
        }
    }

    Ok(())
}
