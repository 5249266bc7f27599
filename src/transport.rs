//! 데이터그램 전송 계층
//!
//! 프로토콜 로직은 이 트레이트만 본다. 실제 구현은 `tokio::net::UdpSocket`.
//! 소켓은 세션이 소유하며 drop 시 닫힌다.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::debug;

use crate::{Error, Result};

/// 비신뢰 데이터그램 전송
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// `dest`로 데이터그램 하나 전송
    async fn send_to(&mut self, bytes: &[u8], dest: SocketAddr) -> Result<()>;

    /// 데이터그램 하나 수신
    ///
    /// `timeout`이 `None`이면 블로킹, 시간 초과 시 `Ok(None)`
    async fn recv_from(
        &mut self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<Option<(usize, SocketAddr)>>;

    /// 바인딩된 로컬 주소
    fn local_addr(&self) -> Result<SocketAddr>;
}

/// UDP 전송
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// 소켓 바인딩 (`0.0.0.0:0`이면 OS가 포트 선택)
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        debug!("UDP socket bound on {}", socket.local_addr()?);
        Ok(Self { socket })
    }
}

impl Transport for UdpTransport {
    async fn send_to(&mut self, bytes: &[u8], dest: SocketAddr) -> Result<()> {
        self.socket
            .send_to(bytes, dest)
            .await
            .map_err(Error::Transmit)?;
        Ok(())
    }

    async fn recv_from(
        &mut self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<Option<(usize, SocketAddr)>> {
        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.socket.recv_from(buf)).await {
                Ok(result) => result?,
                Err(_) => return Ok(None),
            },
            None => self.socket.recv_from(buf).await?,
        };
        Ok(Some(received))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}
