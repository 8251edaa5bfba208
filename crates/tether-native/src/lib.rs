//! Native USB Serial Platform
//!
//! This crate implements [`tether_core::UsbPlatform`] on desktop hosts using
//! the `serialport` crate. Ports that belong to the same physical device
//! (same VID, PID and serial number) are grouped into one driver, and the
//! driver family is derived from the USB vendor ID.
//!
//! # Example
//!
//! ```rust,no_run
//! use tether_core::SerialBridge;
//! use tether_native::NativePlatform;
//!
//! let mut bridge = SerialBridge::new(NativePlatform::new());
//! for idx in 0..bridge.discover() {
//!     println!("{idx}: {}", bridge.describe(idx));
//! }
//! ```

pub mod platform;
pub mod scanner;
pub mod transport;
pub mod usb_ids;

pub use platform::NativePlatform;
pub use scanner::{PortGroup, PortScanner, ScannerConfig};
pub use transport::NativeTransport;
