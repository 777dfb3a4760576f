//! Serial port transport backed by the `serialport` crate.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use super::traits::{SerialTransport, TransportError};

/// Granularity of the read deadline loop. `serialport` timeouts are capped
/// to this slice so the outer deadline stays authoritative.
const POLL_SLICE: Duration = Duration::from_millis(50);

/// UART transport over a host serial port, 8N1 without flow control.
pub struct SerialPortTransport {
    /// `None` once deinitialized.
    port: Option<Box<dyn SerialPort>>,
    name: String,
}

impl SerialPortTransport {
    /// Open `device` at `baud`, configured 8N1 with no flow control.
    pub fn open(device: &str, baud: u32) -> Result<Self, TransportError> {
        let port = serialport::new(device, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(POLL_SLICE)
            .open()
            .map_err(|e| TransportError::OpenFailed {
                port: device.to_string(),
                message: e.to_string(),
            })?;

        info!(port = %device, baud, "Opened serial port");

        Ok(Self {
            port: Some(port),
            name: device.to_string(),
        })
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>, TransportError> {
        self.port.as_mut().ok_or(TransportError::Closed)
    }
}

impl SerialTransport for SerialPortTransport {
    fn send(&mut self, byte: u8) -> Result<(), TransportError> {
        self.send_all(&[byte])
    }

    fn send_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let port = self.port_mut()?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn recv_byte(&mut self, timeout: Duration) -> Result<u8, TransportError> {
        let port = self.port_mut()?;
        // Explicit monotonic deadline; the port's own timeout only bounds a
        // single poll slice.
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 1];
        loop {
            match port.read(&mut buf) {
                Ok(1) => return Ok(buf[0]),
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
            if Instant::now() >= deadline {
                return Err(TransportError::Timeout { timeout });
            }
        }
    }

    fn deinit(&mut self) -> Result<(), TransportError> {
        if let Some(mut port) = self.port.take() {
            port.flush()?;
            debug!(port = %self.name, "Serial port deinitialized");
        }
        Ok(())
    }
}
