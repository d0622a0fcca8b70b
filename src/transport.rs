//! 전송 포트 추상화
//!
//! 코어는 원시 데이터그램 송수신만 요구한다:
//! - `UdpTransport`: tokio UDP 소켓 래퍼 (실제 네트워크)
//! - `LossyLink`: 손실/변조를 주입할 수 있는 인메모리 점대점 채널 (테스트용)
//!
//! 수신은 항상 제한 시간이 있으며, 시간 내 도착이 없으면 `Error::Timeout`을
//! 돌려준다 (무한 대기 없음).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::error::{Error, Result};

/// 데이터그램 송수신 포트
#[async_trait]
pub trait Transport: Send + Sync {
    /// 데이터그램 하나 전송
    async fn send(&self, buf: &[u8], dest: SocketAddr) -> Result<()>;

    /// 제한 시간 내 데이터그램 하나 수신, 없으면 `Error::Timeout`
    async fn recv_timeout(&self, wait: Duration) -> Result<(Vec<u8>, SocketAddr)>;
}

// 카운터 관찰 등으로 끝점을 공유해야 할 때를 위한 위임 구현
#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(&self, buf: &[u8], dest: SocketAddr) -> Result<()> {
        (**self).send(buf, dest).await
    }

    async fn recv_timeout(&self, wait: Duration) -> Result<(Vec<u8>, SocketAddr)> {
        (**self).recv_timeout(wait).await
    }
}

/// tokio UDP 소켓 기반 전송 포트
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// 주소에 바인딩
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self { socket })
    }

    /// 실제 바인딩된 로컬 주소
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, buf: &[u8], dest: SocketAddr) -> Result<()> {
        self.socket.send_to(buf, dest).await?;
        Ok(())
    }

    async fn recv_timeout(&self, wait: Duration) -> Result<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; 2048];
        match tokio::time::timeout(wait, self.socket.recv_from(&mut buf)).await {
            Ok(Ok((len, addr))) => {
                buf.truncate(len);
                Ok((buf, addr))
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(Error::Timeout),
        }
    }
}

/// 송신 데이터그램 유실 정책
#[derive(Debug, Clone, Copy)]
pub enum LossPolicy {
    /// 유실 없음
    None,

    /// n번째 데이터그램마다 유실 (n, 2n, 3n, ...)
    EveryNth(u64),

    /// 확률 p (0.0 ~ 1.0)로 유실
    Random(f64),
}

impl LossPolicy {
    fn should_drop(&self, sent_count: u64) -> bool {
        match *self {
            LossPolicy::None => false,
            LossPolicy::EveryNth(n) => n > 0 && sent_count % n == 0,
            LossPolicy::Random(p) => rand::random::<f64>() < p,
        }
    }
}

/// 송신 데이터그램 변조 훅 (프레임을 제자리에서 수정)
pub type TamperFn = Box<dyn Fn(&mut Vec<u8>) + Send + Sync>;

/// 인메모리 점대점 손실 채널의 한쪽 끝
///
/// `send`의 목적지 주소는 무시된다 (상대 끝점으로만 전달).
/// 수신측에 전달되는 출발지 주소는 이 끝점의 가상 주소다.
pub struct LossyLink {
    tx: mpsc::UnboundedSender<(Vec<u8>, SocketAddr)>,
    rx: Mutex<mpsc::UnboundedReceiver<(Vec<u8>, SocketAddr)>>,
    local_addr: SocketAddr,
    policy: LossPolicy,
    sent: AtomicU64,
    dropped: AtomicU64,
    tamper: Option<TamperFn>,
}

impl LossyLink {
    /// 연결된 끝점 쌍 생성 (a -> b 방향에 policy_a, b -> a 방향에 policy_b 적용)
    pub fn pair(policy_a: LossPolicy, policy_b: LossPolicy) -> (Self, Self) {
        let addr_a: SocketAddr = "10.0.0.1:7000".parse().expect("고정 가상 주소");
        let addr_b: SocketAddr = "10.0.0.2:7000".parse().expect("고정 가상 주소");

        let (tx_ab, rx_ab) = mpsc::unbounded_channel();
        let (tx_ba, rx_ba) = mpsc::unbounded_channel();

        let a = Self {
            tx: tx_ab,
            rx: Mutex::new(rx_ba),
            local_addr: addr_a,
            policy: policy_a,
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            tamper: None,
        };
        let b = Self {
            tx: tx_ba,
            rx: Mutex::new(rx_ab),
            local_addr: addr_b,
            policy: policy_b,
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            tamper: None,
        };

        (a, b)
    }

    /// 이 끝점의 가상 주소
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 상대 끝점의 가상 주소
    pub fn peer_addr(&self) -> SocketAddr {
        let mut addr = self.local_addr;
        addr.set_ip(match addr.ip() {
            std::net::IpAddr::V4(ip) if ip.octets()[3] == 1 => "10.0.0.2".parse().unwrap(),
            _ => "10.0.0.1".parse().unwrap(),
        });
        addr
    }

    /// 송신 변조 훅 설정
    pub fn set_tamper(&mut self, tamper: TamperFn) {
        self.tamper = Some(tamper);
    }

    /// 지금까지 송신 시도한 데이터그램 수
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// 지금까지 유실시킨 데이터그램 수
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for LossyLink {
    async fn send(&self, buf: &[u8], _dest: SocketAddr) -> Result<()> {
        let count = self.sent.fetch_add(1, Ordering::Relaxed) + 1;

        if self.policy.should_drop(count) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("손실 주입: {}번째 데이터그램 유실", count);
            return Ok(());
        }

        let mut frame = buf.to_vec();
        if let Some(tamper) = &self.tamper {
            tamper(&mut frame);
        }

        self.tx
            .send((frame, self.local_addr))
            .map_err(|_| Error::ConnectionClosed)
    }

    async fn recv_timeout(&self, wait: Duration) -> Result<(Vec<u8>, SocketAddr)> {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(wait, rx.recv()).await {
            Ok(Some(datagram)) => Ok(datagram),
            Ok(None) => Err(Error::ConnectionClosed),
            Err(_) => Err(Error::Timeout),
        }
    }
}
