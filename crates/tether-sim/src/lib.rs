//! Simulated USB Serial Platform
//!
//! This crate provides a [`UsbPlatform`](tether_core::UsbPlatform) that needs
//! no hardware. It includes:
//!
//! - **VirtualDevice**: a configurable device with any number of ports
//! - **SimPlatform**: the platform handed to the bridge
//! - **SimController**: a handle that keeps steering the simulation after the
//!   platform has been moved into the bridge (answer permission prompts,
//!   script reads, unplug devices)
//!
//! # Example
//!
//! ```rust
//! use tether_core::SerialBridge;
//! use tether_sim::{PermissionMode, SimPlatform, VirtualDevice};
//!
//! let platform = SimPlatform::new();
//! let sim = platform.controller();
//! let id = sim.add_device(VirtualDevice::ftdi("Sensor").permission(PermissionMode::Prompt));
//!
//! let mut bridge = SerialBridge::new(platform);
//! assert_eq!(bridge.discover(), 1);
//! assert!(!bridge.connect(0)); // prompt is showing
//!
//! sim.grant(id);
//! assert!(bridge.connect(0));
//!
//! sim.push_data(id, 0, b"hello");
//! assert_eq!(bridge.read_batch(), b"hello");
//! ```

pub mod device;
pub mod platform;

pub use device::{PermissionMode, ReadStep, VirtualDevice};
pub use platform::{SimController, SimPlatform};
