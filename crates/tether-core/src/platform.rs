//! Platform USB stack boundary
//!
//! Everything the bridge needs from the host environment goes through
//! [`UsbPlatform`]: driver enumeration, the permission check and request, and
//! obtaining an open [`SerialTransport`] for one port of a device.

use std::fmt;
use std::io;
use std::sync::mpsc::Sender;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::PlatformError;

/// Platform-assigned identifier of a physical USB device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A physical USB device as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UsbDevice {
    /// Platform identifier
    pub id: DeviceId,
    /// USB Vendor ID
    pub vid: u16,
    /// USB Product ID
    pub pid: u16,
    /// USB manufacturer string
    pub manufacturer: Option<String>,
    /// USB product string
    pub product: Option<String>,
    /// USB serial number
    pub serial_number: Option<String>,
}

impl UsbDevice {
    /// Manufacturer string, or "Unknown" when the device does not report one
    pub fn manufacturer_name(&self) -> &str {
        self.manufacturer.as_deref().unwrap_or("Unknown")
    }

    /// Product string, or "Unknown" when the device does not report one
    pub fn product_name(&self) -> &str {
        self.product.as_deref().unwrap_or("Unknown")
    }
}

impl fmt::Display for UsbDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:04X}:{:04X})",
            self.product_name(),
            self.vid,
            self.pid
        )
    }
}

/// Family of USB serial driver handling a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DriverKind {
    /// USB CDC-ACM class device
    CdcAcm,
    /// WCH CH340/CH341
    Ch34x,
    /// Silicon Labs CP210x
    Cp21xx,
    /// FTDI FT232 family
    Ftdi,
    /// Prolific PL2303
    Prolific,
}

impl DriverKind {
    /// Short label used in device descriptions
    pub fn label(&self) -> &'static str {
        match self {
            DriverKind::CdcAcm => "CdcAcm",
            DriverKind::Ch34x => "Ch34x",
            DriverKind::Cp21xx => "Cp21xx",
            DriverKind::Ftdi => "Ftdi",
            DriverKind::Prolific => "Prolific",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One serial-capable device together with the driver that handles it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbSerialDriver {
    /// Driver family
    pub kind: DriverKind,
    /// The physical device
    pub device: UsbDevice,
    /// Number of serial ports the device exposes (may be zero)
    pub port_count: usize,
}

impl UsbSerialDriver {
    /// Create a driver entry
    pub fn new(kind: DriverKind, device: UsbDevice, port_count: usize) -> Self {
        Self {
            kind,
            device,
            port_count,
        }
    }
}

/// Number of data bits per character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

/// Parity checking mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Serial line configuration applied when a port is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineParameters {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
}

impl LineParameters {
    /// 9600 baud, 8N1. Not configurable at this layer.
    pub const FIXED: LineParameters = LineParameters {
        baud_rate: 9600,
        data_bits: DataBits::Eight,
        stop_bits: StopBits::One,
        parity: Parity::None,
    };
}

impl Default for LineParameters {
    fn default() -> Self {
        Self::FIXED
    }
}

impl fmt::Display for LineParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = match self.data_bits {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        };
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        };
        let stop = match self.stop_bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        };
        write!(f, "{} {}{}{}", self.baud_rate, data, parity, stop)
    }
}

/// Answer to a permission request, delivered out of band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionEvent {
    /// Device the answer concerns
    pub device: DeviceId,
    /// Request generation the answer belongs to
    pub generation: u64,
    /// Whether access was granted
    pub granted: bool,
}

/// Token handed to the platform with a permission request
///
/// The platform keeps it until the user (or policy) answers and then calls
/// [`grant`](Self::grant) or [`deny`](Self::deny), possibly from another thread.
#[derive(Debug, Clone)]
pub struct PermissionCallback {
    device: DeviceId,
    generation: u64,
    tx: Sender<PermissionEvent>,
}

impl PermissionCallback {
    pub(crate) fn new(device: DeviceId, generation: u64, tx: Sender<PermissionEvent>) -> Self {
        Self {
            device,
            generation,
            tx,
        }
    }

    /// Device the request was issued for
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Deliver the answer to the requesting gate
    pub fn deliver(self, granted: bool) {
        let event = PermissionEvent {
            device: self.device,
            generation: self.generation,
            granted,
        };
        // The gate may already be gone; the answer is then irrelevant.
        let _ = self.tx.send(event);
    }

    /// Report that access was granted
    pub fn grant(self) {
        self.deliver(true);
    }

    /// Report that access was denied
    pub fn deny(self) {
        self.deliver(false);
    }
}

/// An open serial port
pub trait SerialTransport: Send {
    /// Apply line parameters
    fn set_parameters(&mut self, params: &LineParameters) -> Result<(), PlatformError>;

    /// Drive the DTR control line
    fn set_dtr(&mut self, asserted: bool) -> Result<(), PlatformError>;

    /// Maximum size of one inbound packet, used to size the read buffer
    fn max_packet_size(&self) -> usize;

    /// Read into `buffer`, waiting at most `timeout`
    ///
    /// `Ok(0)` and `Err` with [`io::ErrorKind::TimedOut`] both mean that no
    /// data arrived in time.
    fn read(&mut self, buffer: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Release the port
    fn close(&mut self) -> Result<(), PlatformError>;
}

/// Host USB stack
pub trait UsbPlatform {
    /// Enumerate every device a serial driver can handle
    fn find_all_drivers(&mut self) -> Result<Vec<UsbSerialDriver>, PlatformError>;

    /// Whether the process currently holds access permission for `device`
    fn has_permission(&self, device: &UsbDevice) -> bool;

    /// Ask for access permission; the answer arrives later through `callback`
    fn request_permission(&mut self, device: &UsbDevice, callback: PermissionCallback);

    /// Open one port of `device`
    ///
    /// `Ok(None)` means the platform handed out no handle, which is usually a
    /// missing permission. `Err` is a genuine failure.
    fn open_device(
        &mut self,
        device: &UsbDevice,
        port_index: usize,
    ) -> Result<Option<Box<dyn SerialTransport>>, PlatformError>;
}

impl<P: UsbPlatform + ?Sized> UsbPlatform for Box<P> {
    fn find_all_drivers(&mut self) -> Result<Vec<UsbSerialDriver>, PlatformError> {
        (**self).find_all_drivers()
    }

    fn has_permission(&self, device: &UsbDevice) -> bool {
        (**self).has_permission(device)
    }

    fn request_permission(&mut self, device: &UsbDevice, callback: PermissionCallback) {
        (**self).request_permission(device, callback)
    }

    fn open_device(
        &mut self,
        device: &UsbDevice,
        port_index: usize,
    ) -> Result<Option<Box<dyn SerialTransport>>, PlatformError> {
        (**self).open_device(device, port_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_fixed_line_parameters() {
        let params = LineParameters::FIXED;
        assert_eq!(params.baud_rate, 9600);
        assert_eq!(params.data_bits, DataBits::Eight);
        assert_eq!(params.stop_bits, StopBits::One);
        assert_eq!(params.parity, Parity::None);
        assert_eq!(params.to_string(), "9600 8N1");
    }

    #[test]
    fn test_callback_delivers_event() {
        let (tx, rx) = mpsc::channel();
        let callback = PermissionCallback::new(DeviceId(7), 3, tx);
        assert_eq!(callback.device(), DeviceId(7));

        callback.grant();

        let event = rx.try_recv().unwrap();
        assert_eq!(
            event,
            PermissionEvent {
                device: DeviceId(7),
                generation: 3,
                granted: true
            }
        );
    }

    #[test]
    fn test_callback_after_receiver_dropped() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        PermissionCallback::new(DeviceId(1), 1, tx).deny();
    }

    #[test]
    fn test_unknown_strings() {
        let device = UsbDevice {
            id: DeviceId(1),
            vid: 0x0403,
            pid: 0x6001,
            manufacturer: None,
            product: None,
            serial_number: None,
        };
        assert_eq!(device.manufacturer_name(), "Unknown");
        assert_eq!(device.to_string(), "Unknown (0403:6001)");
    }
}
