//! USB Serial Bridge Core
//!
//! This crate bridges a host application to a single USB-attached serial
//! device. It covers the whole lifecycle the caller needs:
//!
//! - **DeviceCatalog**: enumerates serial-capable drivers and maps a flat,
//!   caller-facing index onto `(driver, port)` pairs
//! - **PermissionGate**: sequences the asynchronous access-permission grant
//! - **PortConnection**: owns the open transport, line parameters and buffer
//! - **ReadChannel**: timeout-bounded reads with a sticky error flag
//!
//! The platform USB stack is reached through the [`UsbPlatform`] trait, so the
//! same bridge runs against real hardware (`tether-native`) or the simulation
//! layer (`tether-sim`).
//!
//! # Example
//!
//! ```rust,ignore
//! use tether_core::SerialBridge;
//!
//! let mut bridge = SerialBridge::new(platform);
//! for idx in 0..bridge.discover() {
//!     println!("{idx}: {}", bridge.describe(idx));
//! }
//!
//! if bridge.connect(0) {
//!     while !bridge.has_error() {
//!         let bytes = bridge.read_batch();
//!         // hand bytes to the application
//!     }
//!     bridge.close();
//! }
//! ```

pub mod bridge;
pub mod catalog;
pub mod channel;
pub mod connection;
pub mod error;
pub mod fifo;
pub mod permission;
pub mod platform;
pub mod stream;

pub use bridge::SerialBridge;
pub use catalog::{DeviceCatalog, DeviceDescriptor, PortAddress};
pub use channel::{ReadChannel, READ_TIMEOUT};
pub use connection::PortConnection;
pub use error::{ConnectError, PlatformError};
pub use fifo::ByteFifo;
pub use permission::{AccessDecision, PermissionGate, PermissionState};
pub use platform::{
    DataBits, DeviceId, DriverKind, LineParameters, Parity, PermissionCallback, PermissionEvent,
    SerialTransport, StopBits, UsbDevice, UsbPlatform, UsbSerialDriver,
};
pub use stream::{SerialStream, DEFAULT_STREAM_CAPACITY};
