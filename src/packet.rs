//! 패킷 코덱
//!
//! - 고정 16바이트 헤더 + 페이로드, 총 1024바이트 이하
//! - CRC-32는 checksum 필드를 제외한 전체(프레임 바이트 4..)를 커버
//! - 모든 정수 필드는 big-endian (플랫폼 간 비트 단위 호환)
//!
//! 와이어 레이아웃:
//! ```text
//! [0..4)   checksum   u32 BE
//! [4..8)   sequence   u32 BE
//! [8..12)  command    ASCII 4바이트 태그
//! [12..16) offset     u32 BE
//! [16..]   payload    0 ~ 1008바이트
//! ```

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::{HEADER_LEN, MAX_PAYLOAD, PACKET_MAX_LEN};

/// 커맨드 태그 (디코드 시점에 한 번만 판별)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// 파일 이름 (payload = UTF-8 파일명)
    Name,
    /// 파일 전체 크기 (payload = u64 BE)
    Size,
    /// 파일 해시 (offset = 해시 타입 태그, payload = 32바이트 다이제스트)
    Hash,
    /// 파일 조각 (offset = 파일 내 바이트 위치)
    Data,
    /// 전송 종료 표시 (payload 없음)
    Stop,
}

impl Command {
    /// 와이어 태그 반환
    pub const fn tag(self) -> [u8; 4] {
        match self {
            Command::Name => *b"NAME",
            Command::Size => *b"SIZE",
            Command::Hash => *b"HASH",
            Command::Data => *b"DATA",
            Command::Stop => *b"STOP",
        }
    }

    /// 태그에서 커맨드 판별 (패딩 포함 4바이트 정확히 일치해야 함)
    pub fn from_tag(tag: [u8; 4]) -> Result<Self> {
        match &tag {
            b"NAME" => Ok(Command::Name),
            b"SIZE" => Ok(Command::Size),
            b"HASH" => Ok(Command::Hash),
            b"DATA" => Ok(Command::Data),
            b"STOP" => Ok(Command::Stop),
            _ => Err(Error::UnknownCommand { tag }),
        }
    }
}

/// 전송 단위 패킷
#[derive(Debug, Clone)]
pub struct Packet {
    /// 세션 내 단조 증가 시퀀스 번호
    pub sequence: u32,

    /// 커맨드
    pub command: Command,

    /// 파일 내 오프셋 (DATA 전용, 나머지는 보조 필드)
    pub offset: u32,

    /// 페이로드
    pub payload: Bytes,

    /// 인코딩/수신 당시의 CRC-32
    checksum: u32,
}

/// 프레임 바이트 4.. 구간의 CRC-32 계산
fn frame_crc(sequence: u32, tag: [u8; 4], offset: u32, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&sequence.to_be_bytes());
    hasher.update(&tag);
    hasher.update(&offset.to_be_bytes());
    hasher.update(payload);
    hasher.finalize()
}

impl Packet {
    /// 새 패킷 인코딩 (CRC 계산 포함)
    pub fn encode(sequence: u32, command: Command, offset: u32, payload: Bytes) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD {
            return Err(Error::OversizedPacket {
                len: HEADER_LEN + payload.len(),
                max: PACKET_MAX_LEN,
            });
        }

        let checksum = frame_crc(sequence, command.tag(), offset, &payload);

        Ok(Self {
            sequence,
            command,
            offset,
            payload,
            checksum,
        })
    }

    /// 와이어 프레임으로 직렬화
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.extend_from_slice(&self.checksum.to_be_bytes());
        buf.extend_from_slice(&self.sequence.to_be_bytes());
        buf.extend_from_slice(&self.command.tag());
        buf.extend_from_slice(&self.offset.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// 와이어 프레임에서 디코딩
    ///
    /// 헤더 16바이트 미만이면 `TooShort`, 태그가 미지의 값이면 `UnknownCommand`
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < HEADER_LEN {
            return Err(Error::TooShort {
                len: frame.len(),
                min: HEADER_LEN,
            });
        }
        if frame.len() > PACKET_MAX_LEN {
            return Err(Error::OversizedPacket {
                len: frame.len(),
                max: PACKET_MAX_LEN,
            });
        }

        let checksum = read_u32(frame, 0);
        let sequence = read_u32(frame, 4);
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&frame[8..12]);
        let command = Command::from_tag(tag)?;
        let offset = read_u32(frame, 12);
        let payload = Bytes::copy_from_slice(&frame[HEADER_LEN..]);

        Ok(Self {
            sequence,
            command,
            offset,
            payload,
            checksum,
        })
    }

    /// CRC 재계산 후 저장된 값과 비교
    pub fn verify_checksum(&self) -> bool {
        frame_crc(self.sequence, self.command.tag(), self.offset, &self.payload) == self.checksum
    }

    /// 원시 프레임의 CRC 검증 (디코드 전에 다른 필드를 신뢰하지 않기 위함)
    pub fn verify_frame(frame: &[u8]) -> Result<()> {
        if frame.len() < HEADER_LEN {
            return Err(Error::TooShort {
                len: frame.len(),
                min: HEADER_LEN,
            });
        }
        let expected = read_u32(frame, 0);
        let got = crc32fast::hash(&frame[4..]);
        if expected != got {
            return Err(Error::ChecksumMismatch { expected, got });
        }
        Ok(())
    }

    /// `verify_frame`의 bool 축약형
    pub fn checksum_ok(frame: &[u8]) -> bool {
        Self::verify_frame(frame).is_ok()
    }

    /// 원시 프레임에서 시퀀스 번호만 추출 (NACK 응답용)
    pub fn frame_sequence(frame: &[u8]) -> Option<u32> {
        if frame.len() < HEADER_LEN {
            return None;
        }
        Some(read_u32(frame, 4))
    }

    /// 프레임 전체 길이
    pub fn frame_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}
