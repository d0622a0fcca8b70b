//! # RFT (Reliable File Transfer)
//!
//! UDP 기반 ARQ 파일 전송 프로토콜
//!
//! ## 핵심 특징
//! - **고정 프레임**: 1024바이트 이하, CRC-32 검증 패킷
//! - **두 가지 ARQ 모드**: Stop-and-Wait / Selective-Repeat
//! - **순서 무관 재조립**: offset 기반으로 퍼즐처럼 조립
//! - **정확히 한 번 반영**: 시퀀스 기반 중복 제거
//! - **종단 간 검증**: SHA-256 해시로 파일 전체 무결성 확인

pub mod config;
pub mod error;
pub mod message;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod transport;

pub use config::{ArqMode, Config};
pub use error::{Error, Result};
pub use message::Reply;
pub use packet::{Command, Packet};
pub use receiver::{Receiver, TransferOutcome};
pub use sender::{DeliveryReport, Sender};
pub use session::TransferSession;
pub use transport::{LossPolicy, LossyLink, Transport, UdpTransport};

/// 패킷 최대 길이 (바이트)
pub const PACKET_MAX_LEN: usize = 1024;

/// 헤더 길이: checksum(4) + sequence(4) + command(4) + offset(4)
pub const HEADER_LEN: usize = 16;

/// 페이로드 최대 길이
pub const MAX_PAYLOAD: usize = PACKET_MAX_LEN - HEADER_LEN;

/// SHA-256 다이제스트 크기 (바이트)
pub const DIGEST_LEN: usize = 32;
