//! ARQ 엔진 종단 간 테스트
//!
//! 송신자와 수신자를 별도 태스크로 띄우고 손실 주입이 가능한
//! 인메모리 채널(LossyLink)로 연결한다. 실제 소켓은 쓰지 않는다.

use std::io::Write;
use std::path::PathBuf;

use rft::{
    ArqMode, Config, DeliveryReport, Error, LossPolicy, LossyLink, Receiver, Sender,
    TransferOutcome,
};

/// 테스트용 원본 파일 생성
fn source_file(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents).unwrap();
    path
}

/// 테스트용 설정 (짧은 타임아웃 + 넉넉한 linger)
fn test_config(mode: ArqMode) -> Config {
    let mut config = Config::loopback();
    config.mode = mode;
    config.linger_ms = 1000;
    config
}

async fn run_transfer(
    contents: Vec<u8>,
    mut sender_config: Config,
    link_s: LossyLink,
    link_r: LossyLink,
) -> (
    rft::Result<DeliveryReport>,
    rft::Result<TransferOutcome>,
    tempfile::TempDir,
) {
    sender_config.chunk_payload = 1000;
    let receiver_config = test_config(sender_config.mode);

    let src_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let src_path = source_file(&src_dir, "transfer.bin", &contents);
    let out_path = out_dir.path().to_path_buf();

    let target = link_s.peer_addr();
    let sender = Sender::new(sender_config, link_s, target);
    let receiver = Receiver::new(receiver_config, link_r, out_path);

    let recv_task = tokio::spawn(async move { receiver.receive_file().await });
    let send_task = tokio::spawn(async move { sender.send_file(&src_path).await });

    let (send_result, recv_result) = tokio::join!(send_task, recv_task);
    (send_result.unwrap(), recv_result.unwrap(), out_dir)
}

// ---------------------------------------------------------------------------
// 손실 없는 채널: 패킷이 정확히 한 번씩만 나가야 함
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_selective_repeat_lossless_sends_each_packet_once() {
    let contents: Vec<u8> = (0..2500u32).map(|i| (i % 256) as u8).collect();
    let (link_s, link_r) = LossyLink::pair(LossPolicy::None, LossPolicy::None);
    let link_s = std::sync::Arc::new(link_s);
    let data_side = link_s.clone();

    let mut sender_config = test_config(ArqMode::SelectiveRepeat);
    sender_config.chunk_payload = 1000;
    let receiver_config = test_config(ArqMode::SelectiveRepeat);

    let src_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let src_path = source_file(&src_dir, "transfer.bin", &contents);

    let target = link_s.peer_addr();
    let sender = Sender::new(sender_config, link_s, target);
    let receiver = Receiver::new(receiver_config, link_r, out_dir.path().to_path_buf());

    let recv_task = tokio::spawn(async move { receiver.receive_file().await });
    let send_task = tokio::spawn(async move { sender.send_file(&src_path).await });
    let (send_result, recv_result) = tokio::join!(send_task, recv_task);

    assert_eq!(send_result.unwrap().unwrap(), DeliveryReport::Verified);
    match recv_result.unwrap().unwrap() {
        TransferOutcome::Delivered { path, bytes } => {
            assert_eq!(bytes, 2500);
            assert_eq!(std::fs::read(path).unwrap(), contents);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    // 2500바이트 / 1000바이트 청크 = DATA 3개 + 컨트롤 3개 + STOP = 7패킷,
    // 손실이 없으면 재전송 없이 각 1회씩만 나가야 함
    assert_eq!(data_side.sent_count(), 7);
    assert_eq!(data_side.dropped_count(), 0);
}

// ---------------------------------------------------------------------------
// 명세 시나리오: 2500바이트, 윈도우 4, 청크 1000, 3번째 패킷마다 유실
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_selective_repeat_survives_every_third_drop() {
    let contents: Vec<u8> = (0..2500u32).map(|i| (i * 31 % 256) as u8).collect();
    let (link_s, link_r) = LossyLink::pair(LossPolicy::EveryNth(3), LossPolicy::EveryNth(3));

    let mut config = test_config(ArqMode::SelectiveRepeat);
    config.window_size = 4;

    let (send_result, recv_result, _out_dir) =
        run_transfer(contents.clone(), config, link_s, link_r).await;

    // 역방향 채널 유실로 FACK 관측은 보장되지 않지만 실패여서는 안 됨
    assert!(matches!(
        send_result.unwrap(),
        DeliveryReport::Verified | DeliveryReport::Indeterminate
    ));
    match recv_result.unwrap() {
        TransferOutcome::Delivered { path, bytes } => {
            assert_eq!(bytes, 2500);
            assert_eq!(std::fs::read(path).unwrap(), contents);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_stop_and_wait_survives_every_third_drop() {
    let contents: Vec<u8> = (0..2500u32).map(|i| (i * 7 % 256) as u8).collect();
    let (link_s, link_r) = LossyLink::pair(LossPolicy::EveryNth(3), LossPolicy::EveryNth(3));

    let (send_result, recv_result, _out_dir) =
        run_transfer(contents.clone(), test_config(ArqMode::StopAndWait), link_s, link_r).await;

    assert!(matches!(
        send_result.unwrap(),
        DeliveryReport::Verified | DeliveryReport::Indeterminate
    ));
    match recv_result.unwrap() {
        TransferOutcome::Delivered { path, bytes } => {
            assert_eq!(bytes, 2500);
            assert_eq!(std::fs::read(path).unwrap(), contents);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// 무작위 손실에서도 완주해야 함 (liveness)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_selective_repeat_survives_random_loss() {
    let contents: Vec<u8> = (0..10_000u32).map(|i| (i * 13 % 256) as u8).collect();
    let (link_s, link_r) = LossyLink::pair(LossPolicy::Random(0.2), LossPolicy::Random(0.2));

    let mut config = test_config(ArqMode::SelectiveRepeat);
    config.window_size = 8;

    let (send_result, recv_result, _out_dir) =
        run_transfer(contents.clone(), config, link_s, link_r).await;

    assert!(send_result.is_ok());
    match recv_result.unwrap() {
        TransferOutcome::Delivered { path, .. } => {
            assert_eq!(std::fs::read(path).unwrap(), contents);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// CRC는 통과하지만 내용이 변조된 패킷: 해시가 최종 판정자
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_tampered_payload_fails_hash_verification() {
    let contents: Vec<u8> = (0..2500u32).map(|i| (i % 256) as u8).collect();
    let (mut link_s, link_r) = LossyLink::pair(LossPolicy::None, LossPolicy::None);

    // 첫 DATA 패킷(seq=3)의 마지막 페이로드 바이트를 뒤집고 CRC를 다시 맞춰
    // 패킷 단위 검사는 통과시키되 파일 해시는 틀어지게 만든다.
    link_s.set_tamper(Box::new(|frame: &mut Vec<u8>| {
        if frame.len() > 16 && &frame[8..12] == b"DATA" {
            let seq = u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]);
            if seq == 3 {
                let last = frame.len() - 1;
                frame[last] ^= 0x01;
                let crc = crc32fast::hash(&frame[4..]);
                frame[..4].copy_from_slice(&crc.to_be_bytes());
            }
        }
    }));

    let (send_result, recv_result, out_dir) = run_transfer(
        contents,
        test_config(ArqMode::SelectiveRepeat),
        link_s,
        link_r,
    )
    .await;

    assert!(matches!(
        send_result.unwrap_err(),
        Error::HashVerificationFailed
    ));
    assert_eq!(recv_result.unwrap(), TransferOutcome::VerificationFailed);

    // 파일이 절대 쓰이면 안 됨
    let written: Vec<_> = std::fs::read_dir(out_dir.path()).unwrap().collect();
    assert!(written.is_empty(), "검증 실패 시 아무것도 저장하지 않아야 함");
}
