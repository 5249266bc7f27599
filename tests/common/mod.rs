//! 통합 테스트 공용 도구
//!
//! 루프백 UDP 소켓과 손상 주입 전송 래퍼.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use sarq::{Result, Segment, SegmentKind, Transport, UdpTransport};

/// 루프백의 OS 할당 포트에 바인딩
pub async fn ephemeral() -> UdpTransport {
    UdpTransport::bind("127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind failed")
}

/// `n`개의 정상 CSV 레코드
pub fn csv_records(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            format!(
                "sensor-{},{},{}.25,{}.5,-{}.75",
                i % 3,
                1_700_000_000_000i64 + i as i64 * 1000,
                20 + i,
                i,
                i
            )
        })
        .collect()
}

/// 첫 `corrupt_first` 개의 Data 세그먼트 payload 한 바이트를 뒤집어 보내는 전송
///
/// 실제로 보내려던 원본 프레임은 `frames`에 기록된다.
pub struct CorruptingTransport {
    inner: UdpTransport,
    corrupt_first: usize,
    pub frames: Vec<Vec<u8>>,
    pub corrupted: usize,
}

impl CorruptingTransport {
    pub fn new(inner: UdpTransport, corrupt_first: usize) -> Self {
        Self {
            inner,
            corrupt_first,
            frames: Vec::new(),
            corrupted: 0,
        }
    }

    fn corrupt(frame: &[u8]) -> Option<Vec<u8>> {
        let segment = Segment::decode(frame).ok()?;
        if segment.kind != SegmentKind::Data {
            return None;
        }

        let payload = segment.payload.as_bytes();
        let start = frame
            .windows(payload.len())
            .position(|window| window == payload)?;

        // ASCII 하위 비트만 뒤집어 UTF-8은 유지하고 체크섬만 깨뜨린다
        let mut damaged = frame.to_vec();
        damaged[start] ^= 0x01;
        Some(damaged)
    }
}

impl Transport for CorruptingTransport {
    async fn send_to(&mut self, bytes: &[u8], dest: SocketAddr) -> Result<()> {
        self.frames.push(bytes.to_vec());

        if self.corrupted < self.corrupt_first {
            if let Some(damaged) = Self::corrupt(bytes) {
                self.corrupted += 1;
                return self.inner.send_to(&damaged, dest).await;
            }
        }
        self.inner.send_to(bytes, dest).await
    }

    async fn recv_from(
        &mut self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<Option<(usize, SocketAddr)>> {
        self.inner.recv_from(buf, timeout).await
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.local_addr()
    }
}
