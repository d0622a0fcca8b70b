//! ARQ 수신 엔진
//!
//! - 패킷 단위 ACK/NACK + first-seen-wins 중복 제거
//! - 완료 감지 시 재조립/검증/저장
//! - 파일 단위 결과는 신뢰성 없는 역방향 채널이므로 반복 송신
//! - 완료 후에도 잠시 수신을 유지해 완료 신호를 놓친 송신자의 재전송을 받아줌
//!
//! 응답 주소는 관측된 출발지 주소에서 유도한다 (reply_port 설정 시 포트 교체).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::message::Reply;
use crate::packet::Packet;
use crate::session::TransferSession;
use crate::transport::Transport;

/// 전송 시도 하나의 최종 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// 해시 일치, 파일 저장 완료
    Delivered {
        /// 저장된 경로
        path: PathBuf,
        /// 파일 크기 (바이트)
        bytes: u64,
    },

    /// 해시 불일치 또는 컨트롤 패킷 손상 - 파일을 쓰지 않음
    VerificationFailed,
}

/// ARQ 수신자
pub struct Receiver<T: Transport> {
    config: Config,
    transport: T,
    output_dir: PathBuf,
}

impl<T: Transport> Receiver<T> {
    /// 새 수신자 생성
    pub fn new(config: Config, transport: T, output_dir: PathBuf) -> Self {
        Self {
            config,
            transport,
            output_dir,
        }
    }

    /// 전송 시도 하나를 끝까지 수신
    ///
    /// 완료될 때까지 블로킹 (짧은 타임아웃 폴링). 시도마다 새 세션을 만든다.
    pub async fn receive_file(&self) -> Result<TransferOutcome> {
        let mut session = TransferSession::new();
        let mut reply_to: Option<SocketAddr> = None;
        let mut accepted = 0u64;
        let mut duplicates = 0u64;
        let mut rejected = 0u64;

        // 1단계: 완료까지 패킷 수신
        loop {
            match self.transport.recv_timeout(self.config.recv_timeout()).await {
                Ok((frame, src)) => {
                    let dest = self.reply_addr(src);
                    reply_to = Some(dest);
                    self.handle_frame(
                        &mut session,
                        &frame,
                        dest,
                        &mut accepted,
                        &mut duplicates,
                        &mut rejected,
                    )
                    .await;

                    if session.is_complete() {
                        break;
                    }
                }
                Err(Error::Timeout) => continue, // 송신자가 아직 없거나 잠시 조용함
                Err(e) => return Err(e),
            }
        }

        info!(
            "세션 완료 감지: {}패킷 (중복 {}, 거부 {})",
            accepted, duplicates, rejected
        );

        // 2단계: 컨트롤 파싱 + 재조립/검증/저장
        let outcome = self.finalize(&mut session);
        let result_reply = match &outcome {
            TransferOutcome::Delivered { path, bytes } => {
                info!("파일 저장 완료: {:?} ({}바이트)", path, bytes);
                Reply::FileAck
            }
            TransferOutcome::VerificationFailed => {
                warn!("검증 실패 - 파일을 쓰지 않음");
                Reply::FileNack
            }
        };

        // 3단계: 파일 단위 결과 반복 송신 (역방향 채널도 유실 가능)
        let dest = reply_to.ok_or(Error::ConnectionClosed)?;
        for _ in 0..self.config.result_repeat {
            self.send_reply(result_reply, dest).await;
        }

        // 4단계: linger - 완료 신호를 놓친 송신자의 재전송에 응답
        self.linger(result_reply).await;

        Ok(outcome)
    }

    /// 데이터그램 하나 처리: CRC 검증 -> 응답 -> 디코드 -> 삽입
    async fn handle_frame(
        &self,
        session: &mut TransferSession,
        frame: &[u8],
        dest: SocketAddr,
        accepted: &mut u64,
        duplicates: &mut u64,
        rejected: &mut u64,
    ) {
        // 헤더조차 없는 프레임은 응답할 시퀀스도 없음
        let Some(sequence) = Packet::frame_sequence(frame) else {
            debug!("헤더 미만 길이의 프레임 드롭: {}바이트", frame.len());
            *rejected += 1;
            return;
        };

        // 다른 필드를 해석하기 전에 CRC부터
        if let Err(e) = Packet::verify_frame(frame) {
            warn!("패킷 거부: seq={}, {}", sequence, e);
            *rejected += 1;
            self.send_reply(Reply::Nack(sequence), dest).await;
            return;
        }

        let packet = match Packet::decode(frame) {
            Ok(packet) => packet,
            Err(e) => {
                // 태그 불명 등 - 세션 상태는 건드리지 않음
                warn!("패킷 드롭: {}", e);
                *rejected += 1;
                return;
            }
        };

        // 중복이어도 ACK는 다시 보낸다 (이전 ACK가 유실됐을 수 있음)
        self.send_reply(Reply::Ack(sequence), dest).await;

        if session.insert(packet) {
            *accepted += 1;
        } else {
            debug!("중복 패킷 무시: seq={}", sequence);
            *duplicates += 1;
        }
    }

    /// 완료된 세션을 재조립/검증/저장하고 결과 판정
    fn finalize(&self, session: &mut TransferSession) -> TransferOutcome {
        if let Err(e) = session.parse_control_packets() {
            warn!("컨트롤 패킷 손상: {}", e);
            return TransferOutcome::VerificationFailed;
        }

        match session.save_verified(&self.output_dir) {
            Ok(path) => TransferOutcome::Delivered {
                path,
                bytes: session.total_size,
            },
            Err(Error::IncompleteOrCorrupt) => TransferOutcome::VerificationFailed,
            Err(e) => {
                // 디스크 쓰기 실패 등은 검증 실패와 구분해 기록만 남김
                warn!("저장 실패: {}", e);
                TransferOutcome::VerificationFailed
            }
        }
    }

    /// 완료 후 잠시 수신을 유지하며 재전송에 ACK와 파일 결과를 다시 보냄
    async fn linger(&self, result_reply: Reply) {
        let deadline = Instant::now() + self.config.linger();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let wait = remaining.min(self.config.recv_timeout());
            match self.transport.recv_timeout(wait).await {
                Ok((frame, src)) => {
                    let dest = self.reply_addr(src);
                    if Packet::checksum_ok(&frame) {
                        if let Some(sequence) = Packet::frame_sequence(&frame) {
                            self.send_reply(Reply::Ack(sequence), dest).await;
                        }
                    }
                    self.send_reply(result_reply, dest).await;
                }
                Err(Error::Timeout) => {}
                Err(e) => {
                    warn!("linger 중 수신 실패: {}", e);
                    break;
                }
            }
        }
    }

    /// 관측된 출발지 주소에서 응답 주소 유도
    fn reply_addr(&self, src: SocketAddr) -> SocketAddr {
        match self.config.reply_port {
            Some(port) => SocketAddr::new(src.ip(), port),
            None => src,
        }
    }

    /// 응답 송신 (최선 노력 - 실패는 기록만)
    async fn send_reply(&self, reply: Reply, dest: SocketAddr) {
        if let Err(e) = self.transport.send(&reply.to_bytes(), dest).await {
            warn!("응답 전송 실패: {}", e);
        }
    }
}
