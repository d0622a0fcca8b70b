//! 파일 전송 세션
//!
//! - 송신측: 파일 전체를 한 번 읽어 순서 있는 패킷 시퀀스를 미리 생성
//! - 수신측: 도착 순서와 무관하게 패킷을 수집, offset 기반 재조립
//! - 패킷별 CRC와 별개로 SHA-256 해시가 최종 무결성을 판정

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::packet::{Command, Packet};
use crate::{DIGEST_LEN, MAX_PAYLOAD};

/// HASH 패킷의 offset 필드에 실리는 해시 타입 태그 ("S256")
pub const HASH_TYPE_SHA256: u32 = u32::from_be_bytes(*b"S256");

/// SIZE 패킷 페이로드 폭 (u64 BE)
const SIZE_PAYLOAD_LEN: usize = 8;

/// 파일 전송 시도 하나의 상태
///
/// 시도마다 새로 생성하고 저장(또는 포기) 후 버린다.
/// 패킷 맵과 메타데이터는 이 세션만이 소유하며 엔진은 삽입/조회만 한다.
#[derive(Debug, Default)]
pub struct TransferSession {
    /// 파일 이름 (송신: 원본 base name, 수신: NAME 패킷)
    pub file_name: String,

    /// 파일 전체 크기 (바이트)
    pub total_size: u64,

    /// 파일 전체 SHA-256 다이제스트
    pub digest: [u8; DIGEST_LEN],

    /// 시퀀스 번호 -> 패킷 (오름차순 의미 있음)
    packets: BTreeMap<u32, Packet>,

    /// STOP 패킷 관측 여부
    pub stop_received: bool,
}

impl TransferSession {
    /// 빈 수신용 세션 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 파일을 읽어 전체 패킷 시퀀스를 구성 (송신측)
    ///
    /// 순서: NAME, SIZE, HASH, DATA..., STOP
    /// `chunk_payload`는 DATA 페이로드 크기이며 1..=1008로 클램프됨
    pub fn build_from_file(path: &Path, chunk_payload: usize) -> Result<Self> {
        let chunk_payload = chunk_payload.clamp(1, MAX_PAYLOAD);

        let mut file = File::open(path)?;
        let total_size = file.metadata()?.len();
        if total_size > u32::MAX as u64 {
            return Err(Error::FileTooLarge { size: total_size });
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "파일 이름이 없는 경로",
                ))
            })?;

        // 스트리밍 해시 (단일 패스)
        let digest = hash_file(&mut file)?;
        file.seek(SeekFrom::Start(0))?;

        let mut session = Self {
            file_name: file_name.clone(),
            total_size,
            digest,
            packets: BTreeMap::new(),
            stop_received: false,
        };

        let mut sequence = 0u32;
        let mut push = |session: &mut Self, command, offset, payload| -> Result<()> {
            let packet = Packet::encode(sequence, command, offset, payload)?;
            session.packets.insert(sequence, packet);
            sequence += 1;
            Ok(())
        };

        // 컨트롤 패킷 3개
        push(
            &mut session,
            Command::Name,
            0,
            Bytes::copy_from_slice(file_name.as_bytes()),
        )?;
        push(
            &mut session,
            Command::Size,
            0,
            Bytes::copy_from_slice(&total_size.to_be_bytes()),
        )?;
        push(
            &mut session,
            Command::Hash,
            HASH_TYPE_SHA256,
            Bytes::copy_from_slice(&digest),
        )?;

        // DATA 패킷: sequence는 전송 순서, offset은 재조립 위치 (서로 독립)
        let mut buf = vec![0u8; chunk_payload];
        let mut offset = 0u32;
        loop {
            let read = file.read(&mut buf)?;
            if read == 0 {
                break;
            }
            push(
                &mut session,
                Command::Data,
                offset,
                Bytes::copy_from_slice(&buf[..read]),
            )?;
            offset += read as u32;
        }

        push(&mut session, Command::Stop, 0, Bytes::new())?;

        session.stop_received = true;
        debug!(
            "세션 구성 완료: {} ({}바이트, {}패킷)",
            session.file_name,
            session.total_size,
            session.packets.len()
        );

        Ok(session)
    }

    /// 수신 패킷 삽입 (first-seen-wins 중복 제거)
    ///
    /// 새로 삽입되면 true, 이미 본 시퀀스면 false
    pub fn insert(&mut self, packet: Packet) -> bool {
        if self.packets.contains_key(&packet.sequence) {
            return false;
        }
        if packet.command == Command::Stop {
            self.stop_received = true;
        }
        self.packets.insert(packet.sequence, packet);
        true
    }

    /// 보유 중인 컨트롤 패킷에서 세션 필드 추출
    pub fn parse_control_packets(&mut self) -> Result<()> {
        let mut file_name = None;
        let mut total_size = None;
        let mut digest = None;

        for packet in self.packets.values() {
            match packet.command {
                Command::Name => {
                    if packet.payload.is_empty() {
                        return Err(Error::MalformedControlPacket {
                            command: "NAME",
                            reason: "빈 페이로드",
                        });
                    }
                    let name = std::str::from_utf8(&packet.payload).map_err(|_| {
                        Error::MalformedControlPacket {
                            command: "NAME",
                            reason: "UTF-8 아님",
                        }
                    })?;
                    if !safe_file_name(name) {
                        return Err(Error::MalformedControlPacket {
                            command: "NAME",
                            reason: "경로 구분자 또는 상위 디렉터리 참조 포함",
                        });
                    }
                    file_name = Some(name.to_owned());
                }
                Command::Size => {
                    if packet.payload.len() < SIZE_PAYLOAD_LEN {
                        return Err(Error::MalformedControlPacket {
                            command: "SIZE",
                            reason: "페이로드 8바이트 미만",
                        });
                    }
                    let mut raw = [0u8; SIZE_PAYLOAD_LEN];
                    raw.copy_from_slice(&packet.payload[..SIZE_PAYLOAD_LEN]);
                    let size = u64::from_be_bytes(raw);
                    // 송신측 한도와 동일 - 재조립 버퍼 할당 전에 거른다
                    if size > u32::MAX as u64 {
                        return Err(Error::MalformedControlPacket {
                            command: "SIZE",
                            reason: "offset 한도(4GiB) 초과",
                        });
                    }
                    total_size = Some(size);
                }
                Command::Hash => {
                    if packet.payload.len() < DIGEST_LEN {
                        return Err(Error::MalformedControlPacket {
                            command: "HASH",
                            reason: "페이로드 32바이트 미만",
                        });
                    }
                    if packet.offset != HASH_TYPE_SHA256 {
                        return Err(Error::MalformedControlPacket {
                            command: "HASH",
                            reason: "지원하지 않는 해시 타입",
                        });
                    }
                    let mut raw = [0u8; DIGEST_LEN];
                    raw.copy_from_slice(&packet.payload[..DIGEST_LEN]);
                    digest = Some(raw);
                }
                Command::Data | Command::Stop => {}
            }
        }

        if let Some(name) = file_name {
            self.file_name = name;
        }
        if let Some(size) = total_size {
            self.total_size = size;
        }
        if let Some(hash) = digest {
            self.digest = hash;
        }

        Ok(())
    }

    /// DATA 패킷을 offset 위치에 복사해 파일 버퍼 재구성
    ///
    /// 반환값은 (버퍼, 해시 일치 여부). 불일치 시 호출자는 버퍼를 저장하면 안 됨.
    /// 범위를 벗어나는 패킷은 건너뛰고 재조립은 계속한다.
    pub fn reassemble(&self) -> (BytesMut, bool) {
        let mut data = BytesMut::zeroed(self.total_size as usize);
        let mut skipped = 0usize;

        for packet in self.packets.values() {
            if packet.command != Command::Data {
                continue;
            }
            let offset = packet.offset as usize;
            let end = offset + packet.payload.len();
            if end > data.len() {
                warn!(
                    "범위 초과 DATA 패킷 건너뜀: seq={}, offset={}, len={}, total={}",
                    packet.sequence,
                    offset,
                    packet.payload.len(),
                    self.total_size
                );
                skipped += 1;
                continue;
            }
            data[offset..end].copy_from_slice(&packet.payload);
        }

        if skipped > 0 {
            warn!("재조립 중 {}개 패킷 범위 위반", skipped);
        }

        let computed: [u8; DIGEST_LEN] = Sha256::digest(&data).into();
        let verified = computed == self.digest;

        (data, verified)
    }

    /// 검증 성공 시에만 `dir/file_name`으로 저장
    pub fn save_verified(&self, dir: &Path) -> Result<PathBuf> {
        if self.file_name.is_empty() || !safe_file_name(&self.file_name) {
            return Err(Error::IncompleteOrCorrupt);
        }

        let (data, verified) = self.reassemble();
        if !verified {
            return Err(Error::IncompleteOrCorrupt);
        }

        let path = dir.join(&self.file_name);
        let mut out = File::create(&path)?;
        out.write_all(&data)?;
        Ok(path)
    }

    /// 완료 여부: STOP 관측 + 시퀀스 0..=max 사이에 빈 자리 없음
    ///
    /// 시퀀스 개수 기반 판정이며 offset 커버리지는 보지 않는다 (해시 검증이 최종 판정)
    pub fn is_complete(&self) -> bool {
        if !self.stop_received || self.packets.is_empty() {
            return false;
        }
        match self.max_sequence() {
            Some(max) => self.packets.len() as u64 == max as u64 + 1,
            None => false,
        }
    }

    /// 지금까지 본 최대 시퀀스 번호
    pub fn max_sequence(&self) -> Option<u32> {
        self.packets.keys().next_back().copied()
    }

    /// 보유 패킷 수
    pub fn packet_count(&self) -> usize {
        self.packets.len()
    }

    /// 시퀀스로 패킷 조회
    pub fn packet(&self, sequence: u32) -> Option<&Packet> {
        self.packets.get(&sequence)
    }

    /// 시퀀스 오름차순 패킷 순회
    pub fn packets(&self) -> impl DoubleEndedIterator<Item = (&u32, &Packet)> {
        self.packets.iter()
    }
}

/// 파일 이름이 출력 디렉터리를 벗어날 수 없는지 확인
fn safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != ".."
        && name != "."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

/// 스트리밍 SHA-256 (8KiB 버퍼 단일 패스)
fn hash_file(file: &mut File) -> Result<[u8; DIGEST_LEN]> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn temp_file(contents: &[u8]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.bin");
        let mut file = File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_build_from_file_layout() {
        let contents: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
        let (_dir, path) = temp_file(&contents);

        let session = TransferSession::build_from_file(&path, 1000).unwrap();

        // NAME + SIZE + HASH + DATA x3 + STOP = 7
        assert_eq!(session.packet_count(), 7);
        assert_eq!(session.total_size, 2500);
        assert_eq!(session.packet(0).unwrap().command, Command::Name);
        assert_eq!(session.packet(1).unwrap().command, Command::Size);
        assert_eq!(session.packet(2).unwrap().command, Command::Hash);
        assert_eq!(session.packet(3).unwrap().command, Command::Data);
        assert_eq!(session.packet(3).unwrap().offset, 0);
        assert_eq!(session.packet(4).unwrap().offset, 1000);
        assert_eq!(session.packet(5).unwrap().offset, 2000);
        assert_eq!(session.packet(5).unwrap().payload.len(), 500);
        assert_eq!(session.packet(6).unwrap().command, Command::Stop);
        assert!(session.is_complete());
    }

    #[test]
    fn test_reassemble_out_of_order_matches_source() {
        let contents: Vec<u8> = (0..5000u32).map(|i| (i * 7 % 256) as u8).collect();
        let (_dir, path) = temp_file(&contents);
        let built = TransferSession::build_from_file(&path, 777).unwrap();

        // 역순으로 삽입해도 동일하게 재조립되어야 함
        let mut receiving = TransferSession::new();
        let sequences: Vec<u32> = built.packets().map(|(&seq, _)| seq).rev().collect();
        for seq in sequences {
            assert!(receiving.insert(built.packet(seq).unwrap().clone()));
        }

        receiving.parse_control_packets().unwrap();
        assert_eq!(receiving.file_name, "source.bin");
        assert_eq!(receiving.total_size, 5000);
        assert!(receiving.is_complete());

        let (data, verified) = receiving.reassemble();
        assert!(verified);
        assert_eq!(data.as_ref(), &contents[..]);
    }

    #[test]
    fn test_insert_duplicate_is_ignored() {
        let (_dir, path) = temp_file(b"hello duplicate world");
        let built = TransferSession::build_from_file(&path, 8).unwrap();

        let mut receiving = TransferSession::new();
        let first = built.packet(3).unwrap().clone();
        assert!(receiving.insert(first.clone()));
        assert!(!receiving.insert(first));
        assert_eq!(receiving.packet_count(), 1);
    }

    #[test]
    fn test_bounds_violation_is_skipped() {
        let contents = vec![0x5Au8; 100];
        let (_dir, path) = temp_file(&contents);
        let built = TransferSession::build_from_file(&path, 50).unwrap();

        let mut receiving = TransferSession::new();
        for (_, packet) in built.packets() {
            receiving.insert(packet.clone());
        }
        // totalSize 너머를 가리키는 악성 DATA 패킷 추가
        let bogus = Packet::encode(99, Command::Data, 90, Bytes::from(vec![0xFF; 50])).unwrap();
        receiving.insert(bogus);

        receiving.parse_control_packets().unwrap();
        let (data, verified) = receiving.reassemble();
        assert!(verified, "악성 패킷은 건너뛰고 원본은 그대로여야 함");
        assert_eq!(data.as_ref(), &contents[..]);
    }

    #[test]
    fn test_malformed_size_packet() {
        let mut receiving = TransferSession::new();
        let short = Packet::encode(1, Command::Size, 0, Bytes::from(vec![0u8; 4])).unwrap();
        receiving.insert(short);

        assert!(matches!(
            receiving.parse_control_packets(),
            Err(Error::MalformedControlPacket {
                command: "SIZE",
                ..
            })
        ));
    }

    #[test]
    fn test_oversized_size_packet_rejected_before_allocation() {
        // DATA 없이도 완결 조건을 만족하는 세션: NAME + SIZE + HASH + STOP
        let mut receiving = TransferSession::new();
        receiving.insert(
            Packet::encode(0, Command::Name, 0, Bytes::from_static(b"big.bin")).unwrap(),
        );
        receiving.insert(
            Packet::encode(
                1,
                Command::Size,
                0,
                Bytes::copy_from_slice(&u64::MAX.to_be_bytes()),
            )
            .unwrap(),
        );
        receiving.insert(
            Packet::encode(
                2,
                Command::Hash,
                HASH_TYPE_SHA256,
                Bytes::from(vec![0u8; DIGEST_LEN]),
            )
            .unwrap(),
        );
        receiving.insert(Packet::encode(3, Command::Stop, 0, Bytes::new()).unwrap());
        assert!(receiving.is_complete());

        // 수신측도 송신측과 같은 4GiB 한도를 적용해야 함 (할당 시도 금지)
        assert!(matches!(
            receiving.parse_control_packets(),
            Err(Error::MalformedControlPacket {
                command: "SIZE",
                ..
            })
        ));
    }

    #[test]
    fn test_unsafe_file_name_rejected() {
        let mut receiving = TransferSession::new();
        let evil = Packet::encode(0, Command::Name, 0, Bytes::from_static(b"../evil.sh")).unwrap();
        receiving.insert(evil);

        assert!(matches!(
            receiving.parse_control_packets(),
            Err(Error::MalformedControlPacket {
                command: "NAME",
                ..
            })
        ));
    }

    #[test]
    fn test_is_complete_requires_no_gaps() {
        let (_dir, path) = temp_file(&vec![1u8; 3000]);
        let built = TransferSession::build_from_file(&path, 1000).unwrap();

        let mut receiving = TransferSession::new();
        for (&seq, packet) in built.packets() {
            if seq == 4 {
                continue; // DATA 하나 누락
            }
            receiving.insert(packet.clone());
        }

        assert!(receiving.stop_received);
        assert!(!receiving.is_complete());

        receiving.insert(built.packet(4).unwrap().clone());
        assert!(receiving.is_complete());
    }

    #[test]
    fn test_save_verified_writes_only_on_match() {
        let contents = b"verified contents".to_vec();
        let (_dir, path) = temp_file(&contents);
        let built = TransferSession::build_from_file(&path, 8).unwrap();

        let mut receiving = TransferSession::new();
        for (_, packet) in built.packets() {
            receiving.insert(packet.clone());
        }
        receiving.parse_control_packets().unwrap();

        let out_dir = tempfile::tempdir().unwrap();
        let saved = receiving.save_verified(out_dir.path()).unwrap();
        assert_eq!(std::fs::read(&saved).unwrap(), contents);

        // 다이제스트를 깨뜨리면 저장 거부
        receiving.digest[0] ^= 0xFF;
        let err = receiving.save_verified(out_dir.path()).unwrap_err();
        assert!(matches!(err, Error::IncompleteOrCorrupt));
    }
}
