//! Serial transport backed by an OS serial port

use std::io::{self, Read};
use std::time::Duration;

use serialport::SerialPort;
use tether_core::{DataBits, LineParameters, Parity, PlatformError, SerialTransport, StopBits};
use tracing::debug;

/// An open host serial port
pub struct NativeTransport {
    path: String,
    port: Option<Box<dyn SerialPort>>,
    packet_size: usize,
    timeout: Option<Duration>,
}

impl NativeTransport {
    pub fn new(path: impl Into<String>, port: Box<dyn SerialPort>, packet_size: usize) -> Self {
        Self {
            path: path.into(),
            port: Some(port),
            packet_size,
            timeout: None,
        }
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, PlatformError> {
        self.port
            .as_mut()
            .ok_or_else(|| PlatformError::Detached(self.path.clone()))
    }
}

impl SerialTransport for NativeTransport {
    fn set_parameters(&mut self, params: &LineParameters) -> Result<(), PlatformError> {
        let port = self.port()?;
        port.set_baud_rate(params.baud_rate).map_err(configuration)?;
        port.set_data_bits(data_bits(params.data_bits)).map_err(configuration)?;
        port.set_stop_bits(stop_bits(params.stop_bits)).map_err(configuration)?;
        port.set_parity(parity(params.parity)).map_err(configuration)?;
        debug!("Configured {} for {}", self.path, params);
        Ok(())
    }

    fn set_dtr(&mut self, asserted: bool) -> Result<(), PlatformError> {
        self.port()?
            .write_data_terminal_ready(asserted)
            .map_err(configuration)
    }

    fn max_packet_size(&self) -> usize {
        self.packet_size
    }

    fn read(&mut self, buffer: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port closed"))?;
        if self.timeout != Some(timeout) {
            port.set_timeout(timeout).map_err(io::Error::from)?;
            self.timeout = Some(timeout);
        }
        port.read(buffer)
    }

    fn close(&mut self) -> Result<(), PlatformError> {
        // The OS handle is released when the port is dropped
        if self.port.take().is_some() {
            debug!("Closed {}", self.path);
        }
        Ok(())
    }
}

fn configuration(err: serialport::Error) -> PlatformError {
    PlatformError::Configuration(err.to_string())
}

fn data_bits(bits: DataBits) -> serialport::DataBits {
    match bits {
        DataBits::Five => serialport::DataBits::Five,
        DataBits::Six => serialport::DataBits::Six,
        DataBits::Seven => serialport::DataBits::Seven,
        DataBits::Eight => serialport::DataBits::Eight,
    }
}

fn stop_bits(bits: StopBits) -> serialport::StopBits {
    match bits {
        StopBits::One => serialport::StopBits::One,
        StopBits::Two => serialport::StopBits::Two,
    }
}

fn parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Odd => serialport::Parity::Odd,
        Parity::Even => serialport::Parity::Even,
    }
}
