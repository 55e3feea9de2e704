//! # Serial Transport
//!
//! The client only needs a half-duplex byte pipe: write a frame, then read
//! whatever the device answers within the timeout. [`SerialTransport`]
//! captures exactly that, so tests can script the bus and the RS-485
//! adapter stays behind the `rtu` feature.
//!
//! RTU has no length header. A frame ends when the expected number of
//! bytes has arrived or the line goes quiet for `frame_gap`; see
//! [`read_frame`].

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;

use crate::constants::MAX_RTU_FRAME_SIZE;
use crate::error::ModbusResult;

/// Byte pipe to the inverter.
///
/// `read` returns an empty vector when nothing arrived within `timeout`;
/// it is up to the caller to call that a timeout.
pub trait SerialTransport: Send {
    fn connect(&mut self) -> impl Future<Output = ModbusResult<()>> + Send;

    fn disconnect(&mut self) -> impl Future<Output = ModbusResult<()>> + Send;

    fn is_connected(&self) -> bool;

    fn write(&mut self, frame: &[u8]) -> impl Future<Output = ModbusResult<()>> + Send;

    fn read(
        &mut self,
        max_bytes: usize,
        timeout: Duration,
    ) -> impl Future<Output = ModbusResult<Vec<u8>>> + Send;

    fn get_stats(&self) -> TransportStats;
}

/// Transport layer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Read one RTU frame from `reader`.
///
/// Waits up to `timeout` for the first byte. After that, reading stops at
/// `max_bytes`, after `frame_gap` of silence, at end of stream or when the
/// overall timeout expires, whichever comes first.
pub async fn read_frame<R>(
    reader: &mut R,
    max_bytes: usize,
    timeout: Duration,
    frame_gap: Duration,
) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let max_bytes = max_bytes.min(MAX_RTU_FRAME_SIZE);
    let deadline = Instant::now() + timeout;
    let mut frame = Vec::with_capacity(max_bytes);
    let mut buffer = [0u8; MAX_RTU_FRAME_SIZE];

    while frame.len() < max_bytes {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let wait = if frame.is_empty() {
            remaining
        } else {
            frame_gap.min(remaining)
        };

        let want = max_bytes - frame.len();
        match tokio::time::timeout(wait, reader.read(&mut buffer[..want])).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => frame.extend_from_slice(&buffer[..n]),
            Ok(Err(e)) => return Err(e),
            Err(_) => break,
        }
    }

    Ok(frame)
}

#[cfg(feature = "rtu")]
pub use self::rtu_serial::RtuTransport;

#[cfg(feature = "rtu")]
mod rtu_serial {
    use std::time::Duration;

    use tokio::io::AsyncWriteExt;
    use tokio::time::timeout;
    use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
    use tracing::{debug, warn};

    use super::{read_frame, SerialTransport, TransportStats};
    use crate::config::{Parity, SerialConfig};
    use crate::error::{ModbusError, ModbusResult};

    impl From<Parity> for tokio_serial::Parity {
        fn from(parity: Parity) -> Self {
            match parity {
                Parity::None => tokio_serial::Parity::None,
                Parity::Even => tokio_serial::Parity::Even,
                Parity::Odd => tokio_serial::Parity::Odd,
            }
        }
    }

    fn data_bits(bits: u8) -> ModbusResult<tokio_serial::DataBits> {
        match bits {
            5 => Ok(tokio_serial::DataBits::Five),
            6 => Ok(tokio_serial::DataBits::Six),
            7 => Ok(tokio_serial::DataBits::Seven),
            8 => Ok(tokio_serial::DataBits::Eight),
            other => Err(ModbusError::configuration(format!(
                "Unsupported data bits: {}",
                other
            ))),
        }
    }

    fn stop_bits(bits: u8) -> ModbusResult<tokio_serial::StopBits> {
        match bits {
            1 => Ok(tokio_serial::StopBits::One),
            2 => Ok(tokio_serial::StopBits::Two),
            other => Err(ModbusError::configuration(format!(
                "Unsupported stop bits: {}",
                other
            ))),
        }
    }

    /// RS-485 link through a tokio-serial port.
    ///
    /// The port is opened on [`connect`](SerialTransport::connect) and
    /// dropped after an I/O failure, so the next exchange reopens it.
    pub struct RtuTransport {
        port: Option<SerialStream>,
        config: SerialConfig,
        /// Line silence before each request: 3.5 character times
        frame_delay: Duration,
        stats: TransportStats,
    }

    impl RtuTransport {
        pub fn new(config: SerialConfig) -> Self {
            // 11 bits per character on the wire
            let char_time_us = 11_000_000 / u64::from(config.baud_rate.max(1));
            let frame_delay = Duration::from_micros(char_time_us * 35 / 10);

            Self {
                port: None,
                config,
                frame_delay,
                stats: TransportStats::default(),
            }
        }

        pub fn config(&self) -> &SerialConfig {
            &self.config
        }

        fn port(&mut self) -> ModbusResult<&mut SerialStream> {
            self.port
                .as_mut()
                .ok_or_else(|| ModbusError::connection("Serial port not connected"))
        }

        fn fail(&mut self, error: ModbusError) -> ModbusError {
            warn!("Serial port {}: {}, closing", self.config.port, error);
            self.stats.errors += 1;
            self.port = None;
            error
        }
    }

    impl SerialTransport for RtuTransport {
        async fn connect(&mut self) -> ModbusResult<()> {
            if self.port.is_some() {
                return Ok(());
            }

            let port = tokio_serial::new(&self.config.port, self.config.baud_rate)
                .data_bits(data_bits(self.config.data_bits)?)
                .stop_bits(stop_bits(self.config.stop_bits)?)
                .parity(self.config.parity.into())
                .timeout(self.config.timeout())
                .open_native_async()
                .map_err(|e| {
                    ModbusError::connection(format!(
                        "Failed to open serial port {}: {}",
                        self.config.port, e
                    ))
                })?;

            debug!(
                "Opened {} at {} baud",
                self.config.port, self.config.baud_rate
            );
            self.port = Some(port);
            Ok(())
        }

        async fn disconnect(&mut self) -> ModbusResult<()> {
            if self.port.take().is_some() {
                debug!("Closed {}", self.config.port);
            }
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.port.is_some()
        }

        async fn write(&mut self, frame: &[u8]) -> ModbusResult<()> {
            let limit = self.config.timeout();
            tokio::time::sleep(self.frame_delay).await;

            let port = self.port()?;
            if let Err(e) = port.clear(ClearBuffer::Input) {
                debug!("Could not clear input buffer: {}", e);
            }

            let result = timeout(limit, async {
                port.write_all(frame).await?;
                port.flush().await
            })
            .await;

            match result {
                Ok(Ok(())) => {
                    self.stats.requests_sent += 1;
                    self.stats.bytes_sent += frame.len() as u64;
                    Ok(())
                }
                Ok(Err(e)) => Err(self.fail(ModbusError::io(format!(
                    "Failed to send RTU frame: {}",
                    e
                )))),
                Err(_) => {
                    self.stats.timeouts += 1;
                    Err(self.fail(ModbusError::timeout(
                        "send request",
                        limit.as_millis() as u64,
                    )))
                }
            }
        }

        async fn read(&mut self, max_bytes: usize, limit: Duration) -> ModbusResult<Vec<u8>> {
            let frame_gap = self.config.frame_gap();
            let port = self.port()?;

            match read_frame(port, max_bytes, limit, frame_gap).await {
                Ok(frame) if frame.is_empty() => {
                    self.stats.timeouts += 1;
                    Ok(frame)
                }
                Ok(frame) => {
                    self.stats.responses_received += 1;
                    self.stats.bytes_received += frame.len() as u64;
                    Ok(frame)
                }
                Err(e) => Err(self.fail(ModbusError::from(e))),
            }
        }

        fn get_stats(&self) -> TransportStats {
            self.stats.clone()
        }
    }

}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted in-memory bus for client tests.

    use std::collections::VecDeque;
    use std::time::Duration;

    use super::{SerialTransport, TransportStats};
    use crate::error::{ModbusError, ModbusResult};

    #[derive(Debug, Default)]
    pub struct ScriptedTransport {
        pub connected: bool,
        pub connects: usize,
        pub refuse_connect: bool,
        pub written: Vec<Vec<u8>>,
        pub replies: VecDeque<ModbusResult<Vec<u8>>>,
        pub last_read_len: Option<usize>,
        pub stats: TransportStats,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a raw reply. Bytes are returned as-is, up to `max_bytes`.
        pub fn reply(mut self, bytes: impl Into<Vec<u8>>) -> Self {
            self.replies.push_back(Ok(bytes.into()));
            self
        }

        pub fn reply_err(mut self, error: ModbusError) -> Self {
            self.replies.push_back(Err(error));
            self
        }
    }

    impl SerialTransport for ScriptedTransport {
        async fn connect(&mut self) -> ModbusResult<()> {
            if self.refuse_connect {
                return Err(ModbusError::connection("scripted refusal"));
            }
            if !self.connected {
                self.connected = true;
                self.connects += 1;
            }
            Ok(())
        }

        async fn disconnect(&mut self) -> ModbusResult<()> {
            self.connected = false;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn write(&mut self, frame: &[u8]) -> ModbusResult<()> {
            if !self.connected {
                return Err(ModbusError::connection("not connected"));
            }
            self.stats.requests_sent += 1;
            self.stats.bytes_sent += frame.len() as u64;
            self.written.push(frame.to_vec());
            Ok(())
        }

        async fn read(&mut self, max_bytes: usize, _timeout: Duration) -> ModbusResult<Vec<u8>> {
            self.last_read_len = Some(max_bytes);
            match self.replies.pop_front() {
                Some(Ok(mut bytes)) => {
                    bytes.truncate(max_bytes);
                    if bytes.is_empty() {
                        self.stats.timeouts += 1;
                    } else {
                        self.stats.responses_received += 1;
                        self.stats.bytes_received += bytes.len() as u64;
                    }
                    Ok(bytes)
                }
                Some(Err(e)) => {
                    self.stats.errors += 1;
                    Err(e)
                }
                None => {
                    self.stats.timeouts += 1;
                    Ok(Vec::new())
                }
            }
        }

        fn get_stats(&self) -> TransportStats {
            self.stats.clone()
        }
    }
}
