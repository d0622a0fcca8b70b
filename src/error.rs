//! 에러 타입 정의

use thiserror::Error;

/// RFT 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("패킷이 너무 짧음: {len}바이트 (최소 {min})")]
    TooShort { len: usize, min: usize },

    #[error("패킷 크기 초과: {len}바이트 (최대 {max})")]
    OversizedPacket { len: usize, max: usize },

    #[error("알 수 없는 커맨드 태그: {tag:?}")]
    UnknownCommand { tag: [u8; 4] },

    #[error("CRC 불일치: expected {expected:08X}, got {got:08X}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("컨트롤 패킷 손상: {command} ({reason})")]
    MalformedControlPacket {
        command: &'static str,
        reason: &'static str,
    },

    #[error("파일이 offset 한도(4GiB) 초과: {size}바이트")]
    FileTooLarge { size: u64 },

    #[error("해시 검증 실패")]
    HashVerificationFailed,

    #[error("세션이 불완전하거나 손상됨 - 저장 불가")]
    IncompleteOrCorrupt,

    #[error("수신 타임아웃")]
    Timeout,

    #[error("연결 종료")]
    ConnectionClosed,
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
