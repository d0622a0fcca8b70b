//! 컨트롤 채널 메시지
//!
//! 바이너리 패킷 채널과 분리된 ASCII 텍스트 응답 채널:
//! `ACK=<seq>` / `NACK=<seq>` / `FACK` / `FNACK`
//!
//! 역방향 채널 자체도 신뢰성이 없으므로 파일 단위 결과(FACK/FNACK)는
//! 반복 송신으로만 보정한다.

/// 수신자 -> 송신자 응답
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// 패킷 단위 긍정 응답
    Ack(u32),

    /// 패킷 단위 부정 응답 (CRC 불일치)
    Nack(u32),

    /// 파일 단위 긍정 응답 (해시 일치, 저장 완료)
    FileAck,

    /// 파일 단위 부정 응답 (해시 불일치)
    FileNack,
}

impl Reply {
    /// ASCII 직렬화
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Reply::Ack(seq) => format!("ACK={seq}").into_bytes(),
            Reply::Nack(seq) => format!("NACK={seq}").into_bytes(),
            Reply::FileAck => b"FACK".to_vec(),
            Reply::FileNack => b"FNACK".to_vec(),
        }
    }

    /// ASCII 파싱 (형식이 다르면 None)
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(bytes).ok()?;
        match text {
            "FACK" => return Some(Reply::FileAck),
            "FNACK" => return Some(Reply::FileNack),
            _ => {}
        }
        if let Some(seq) = text.strip_prefix("ACK=") {
            return seq.parse().ok().map(Reply::Ack);
        }
        if let Some(seq) = text.strip_prefix("NACK=") {
            return seq.parse().ok().map(Reply::Nack);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_roundtrip() {
        for reply in [
            Reply::Ack(0),
            Reply::Ack(4294967295),
            Reply::Nack(17),
            Reply::FileAck,
            Reply::FileNack,
        ] {
            assert_eq!(Reply::parse(&reply.to_bytes()), Some(reply));
        }
    }

    #[test]
    fn test_reply_wire_text() {
        assert_eq!(Reply::Ack(42).to_bytes(), b"ACK=42");
        assert_eq!(Reply::Nack(7).to_bytes(), b"NACK=7");
        assert_eq!(Reply::FileAck.to_bytes(), b"FACK");
        assert_eq!(Reply::FileNack.to_bytes(), b"FNACK");
    }

    #[test]
    fn test_reply_rejects_garbage() {
        assert_eq!(Reply::parse(b"ACK="), None);
        assert_eq!(Reply::parse(b"ACK=abc"), None);
        assert_eq!(Reply::parse(b"FACKX"), None);
        assert_eq!(Reply::parse(&[0xFF, 0xFE]), None);
        assert_eq!(Reply::parse(b""), None);
    }
}
