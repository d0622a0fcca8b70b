//! ARQ 송신 엔진
//!
//! - Stop-and-Wait: 패킷 하나 전송 후 해당 시퀀스 응답을 기다림 (무한 재시도)
//! - Selective-Repeat: 재전송 우선으로 윈도우를 채워 전송, 응답은 순서 무관 수집
//! - 전 구간 전달 후 파일 단위 핸드쉐이크 (FACK/FNACK, 제한 횟수)
//!
//! 엔진 내부에 동시 작업 없음 - 송신과 응답 대기는 하나의 제어 흐름에서
//! 순차적으로 일어난다.

use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::{ArqMode, Config};
use crate::error::{Error, Result};
use crate::message::Reply;
use crate::session::TransferSession;
use crate::transport::Transport;

/// 파일 단위 핸드쉐이크 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryReport {
    /// 수신측이 해시 일치를 확인함 (FACK)
    Verified,

    /// 응답 시도 소진 - 수신측 판정 미확인, 성공으로 간주
    Indeterminate,
}

/// ARQ 송신자
pub struct Sender<T: Transport> {
    config: Config,
    transport: T,
    target: SocketAddr,
}

impl<T: Transport> Sender<T> {
    /// 새 송신자 생성
    pub fn new(config: Config, transport: T, target: SocketAddr) -> Self {
        Self {
            config,
            transport,
            target,
        }
    }

    /// 파일 하나를 세션으로 구성해 전송
    pub async fn send_file(&self, path: &Path) -> Result<DeliveryReport> {
        let session =
            TransferSession::build_from_file(path, self.config.effective_chunk_payload())?;
        self.send_session(&session).await
    }

    /// 미리 구성된 세션 전송
    pub async fn send_session(&self, session: &TransferSession) -> Result<DeliveryReport> {
        info!(
            "전송 시작: {} ({}바이트, {}패킷, {:?})",
            session.file_name,
            session.total_size,
            session.packet_count(),
            self.config.mode
        );
        let start = Instant::now();

        match self.config.mode {
            ArqMode::StopAndWait => self.stop_and_wait(session).await?,
            ArqMode::SelectiveRepeat => self.selective_repeat(session).await?,
        }

        info!(
            "전 패킷 전달 확인: {:.2}s 경과, 파일 단위 핸드쉐이크 시작",
            start.elapsed().as_secs_f64()
        );

        self.file_handshake().await
    }

    /// Stop-and-Wait: 시퀀스 오름차순으로 하나씩, 응답 올 때까지 재전송
    async fn stop_and_wait(&self, session: &TransferSession) -> Result<()> {
        for (&sequence, packet) in session.packets() {
            let frame = packet.to_bytes();
            let mut attempt = 0u64;

            loop {
                attempt += 1;
                self.send_frame(&frame).await?;

                if self.wait_ack_for(sequence).await? {
                    break;
                }
                warn!("시퀀스 {} 응답 없음, 재전송 (시도 {})", sequence, attempt);
            }
        }
        Ok(())
    }

    /// 해당 시퀀스의 ACK/NACK를 ack_timeout 한도 내에서 대기
    ///
    /// 다른 시퀀스에 대한 늦은 응답은 무시하고 남은 시간만큼 계속 기다린다.
    async fn wait_ack_for(&self, sequence: u32) -> Result<bool> {
        let deadline = Instant::now() + self.config.ack_timeout();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }

            match self.transport.recv_timeout(remaining).await {
                Ok((buf, _)) => match Reply::parse(&buf) {
                    Some(Reply::Ack(seq)) if seq == sequence => return Ok(true),
                    Some(Reply::Nack(seq)) if seq == sequence => return Ok(false),
                    _ => continue, // 다른 시퀀스의 늦은 응답이나 잡음
                },
                Err(Error::Timeout) => return Ok(false),
                Err(Error::ConnectionClosed) => return Err(Error::ConnectionClosed),
                Err(e) => {
                    warn!("응답 수신 실패 (재전송으로 처리): {}", e);
                    return Ok(false);
                }
            }
        }
    }

    /// Selective-Repeat: 윈도우 채움 -> 일괄 전송 -> 응답 수집 반복
    async fn selective_repeat(&self, session: &TransferSession) -> Result<()> {
        let total = session.packet_count() as u32;
        let window = self.config.window_size.max(1);

        let mut delivered: HashSet<u32> = HashSet::new();
        let mut pending_resend: VecDeque<u32> = VecDeque::new();
        let mut next_seq: u32 = 0;

        while (delivered.len() as u32) < total {
            let window_seqs = fill_window(
                window,
                total,
                session,
                &delivered,
                &mut pending_resend,
                &mut next_seq,
            );

            if window_seqs.is_empty() {
                // 응답이 전부 유실된 라운드 - 미전달 시퀀스를 다시 대기열에 적재
                for seq in 0..total {
                    if !delivered.contains(&seq) {
                        pending_resend.push_back(seq);
                    }
                }
                continue;
            }

            // 윈도우 일괄 전송
            for &seq in &window_seqs {
                if let Some(packet) = session.packet(seq) {
                    self.send_frame(&packet.to_bytes()).await?;
                }
            }

            // 방금 보낸 개수만큼 응답 대기 (응답 순서는 전송 순서와 무관)
            for _ in 0..window_seqs.len() {
                match self.transport.recv_timeout(self.config.ack_timeout()).await {
                    Ok((buf, _)) => match Reply::parse(&buf) {
                        Some(Reply::Ack(seq)) => {
                            // 범위 밖이거나 이미 전달된 시퀀스 응답은 무시 (멱등)
                            if seq < total {
                                delivered.insert(seq);
                            }
                        }
                        Some(Reply::Nack(seq)) => {
                            if seq < total
                                && !delivered.contains(&seq)
                                && !pending_resend.contains(&seq)
                            {
                                pending_resend.push_back(seq);
                            }
                        }
                        _ => {}
                    },
                    Err(Error::Timeout) => {}
                    Err(Error::ConnectionClosed) => return Err(Error::ConnectionClosed),
                    Err(e) => warn!("응답 수신 실패 (다음 라운드에서 재전송): {}", e),
                }
            }

            // 윈도우 중 미확인 시퀀스는 재전송 대기열로
            for &seq in &window_seqs {
                if !delivered.contains(&seq) && !pending_resend.contains(&seq) {
                    pending_resend.push_back(seq);
                }
            }

            debug!(
                "라운드 종료: {}/{} 전달, 재전송 대기 {}",
                delivered.len(),
                total,
                pending_resend.len()
            );
        }

        Ok(())
    }

    /// 파일 단위 핸드쉐이크: 제한된 횟수만큼 FACK/FNACK 대기
    ///
    /// 역방향 채널도 유실될 수 있으므로 시도 소진은 불확정 성공으로 처리한다.
    async fn file_handshake(&self) -> Result<DeliveryReport> {
        for attempt in 1..=self.config.handshake_attempts {
            match self.transport.recv_timeout(self.config.ack_timeout()).await {
                Ok((buf, _)) => match Reply::parse(&buf) {
                    Some(Reply::FileAck) => {
                        info!("파일 단위 FACK 수신 - 전송 검증 완료");
                        return Ok(DeliveryReport::Verified);
                    }
                    Some(Reply::FileNack) => {
                        warn!("파일 단위 FNACK 수신 - 수신측 해시 불일치");
                        return Err(Error::HashVerificationFailed);
                    }
                    _ => {} // 늦게 도착한 패킷 ACK는 무시
                },
                Err(Error::Timeout) => {
                    debug!(
                        "핸드쉐이크 무응답 ({}/{})",
                        attempt, self.config.handshake_attempts
                    );
                }
                Err(Error::ConnectionClosed) => return Err(Error::ConnectionClosed),
                Err(e) => warn!("핸드쉐이크 수신 실패: {}", e),
            }
        }

        warn!("파일 단위 응답 없음 - 불확정 성공으로 간주");
        Ok(DeliveryReport::Indeterminate)
    }

    /// 프레임 전송. 일시적 IO 실패는 기록만 하고 재전송 루프에 맡긴다.
    async fn send_frame(&self, frame: &[u8]) -> Result<()> {
        match self.transport.send(frame, self.target).await {
            Ok(()) => Ok(()),
            Err(Error::ConnectionClosed) => Err(Error::ConnectionClosed),
            Err(e) => {
                warn!("전송 실패 (재시도 예정): {}", e);
                Ok(())
            }
        }
    }
}

/// 윈도우 구성: 재전송 대기열 우선, 그 다음 신규 시퀀스
///
/// 반환되는 시퀀스는 중복 없고 `window`개를 넘지 않는다.
fn fill_window(
    window: usize,
    total: u32,
    session: &TransferSession,
    delivered: &HashSet<u32>,
    pending_resend: &mut VecDeque<u32>,
    next_seq: &mut u32,
) -> Vec<u32> {
    let mut window_seqs: Vec<u32> = Vec::with_capacity(window);

    while window_seqs.len() < window {
        if let Some(seq) = pending_resend.pop_front() {
            if delivered.contains(&seq) || window_seqs.contains(&seq) {
                continue;
            }
            window_seqs.push(seq);
            continue;
        }
        if *next_seq >= total {
            break;
        }
        let seq = *next_seq;
        *next_seq += 1;
        if delivered.contains(&seq) || session.packet(seq).is_none() {
            continue;
        }
        window_seqs.push(seq);
    }

    window_seqs
}
