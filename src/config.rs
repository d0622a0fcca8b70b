//! 프로토콜 설정

use std::time::Duration;

use crate::MAX_PAYLOAD;

/// ARQ 동작 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArqMode {
    /// 패킷 하나 전송 후 해당 시퀀스 응답 대기 (전송 중 패킷 최대 1개)
    StopAndWait,

    /// 윈도우 단위로 전송, 개별 재전송 (전송 중 패킷 최대 window_size개)
    SelectiveRepeat,
}

/// RFT 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// ARQ 모드
    pub mode: ArqMode,

    /// DATA 페이로드 크기 (바이트, 1..=1008로 클램프됨)
    pub chunk_payload: usize,

    /// 패킷/핸드쉐이크 응답 대기 타임아웃 (밀리초)
    pub ack_timeout_ms: u64,

    /// 수신 루프 폴링 타임아웃 (밀리초)
    pub recv_timeout_ms: u64,

    /// Selective-Repeat 윈도우 크기
    pub window_size: usize,

    /// 파일 단위 핸드쉐이크 최대 시도 횟수
    pub handshake_attempts: u32,

    /// 파일 단위 결과(FACK/FNACK) 반복 송신 횟수
    pub result_repeat: u32,

    /// 완료 후 재전송을 받아주는 대기 시간 (밀리초)
    pub linger_ms: u64,

    /// 응답을 보낼 포트 (None이면 관측된 출발지 주소 그대로 사용)
    pub reply_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: ArqMode::SelectiveRepeat,
            chunk_payload: MAX_PAYLOAD,
            ack_timeout_ms: 500,
            recv_timeout_ms: 200,
            window_size: 4,
            handshake_attempts: 10,
            result_repeat: 5,
            linger_ms: 3000,
            reply_port: None,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 불안정한 네트워크용 설정 (긴 타임아웃, 더 많은 결과 반복)
    pub fn lossy_network() -> Self {
        Self {
            chunk_payload: 1000,
            ack_timeout_ms: 800,
            recv_timeout_ms: 300,
            window_size: 8,
            result_repeat: 10,
            linger_ms: 5000,
            ..Self::default()
        }
    }

    /// 루프백/테스트용 설정 (짧은 타임아웃)
    pub fn loopback() -> Self {
        Self {
            ack_timeout_ms: 100,
            recv_timeout_ms: 50,
            result_repeat: 3,
            linger_ms: 200,
            ..Self::default()
        }
    }

    /// 응답 대기 타임아웃
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// 수신 폴링 타임아웃
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    /// 완료 후 대기 시간
    pub fn linger(&self) -> Duration {
        Duration::from_millis(self.linger_ms)
    }

    /// 클램프된 DATA 페이로드 크기
    pub fn effective_chunk_payload(&self) -> usize {
        self.chunk_payload.clamp(1, MAX_PAYLOAD)
    }
}
