//! Connect to one port and print what it sends

use std::io::Write;
use std::thread;
use std::time::Duration;

use tether_core::{ConnectError, SerialBridge, UsbPlatform};
use tracing::{info, warn};

/// Which port to monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Index(usize),
    Name(String),
}

/// Monitor loop options
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub target: Target,
    /// Connect attempts while permission is pending
    pub connect_attempts: u32,
    pub connect_retry: Duration,
    /// Pause after an empty batch
    pub poll_interval: Duration,
    /// Stop after this many batches
    pub count: Option<usize>,
    pub hex: bool,
}

/// What a monitor run saw
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorSummary {
    pub batches: usize,
    pub bytes: usize,
    /// The channel reported a read failure
    pub failed: bool,
}

/// Connect, retrying while the platform has not answered a permission request
pub fn connect_with_retry<P: UsbPlatform>(
    bridge: &mut SerialBridge<P>,
    target: &Target,
    attempts: u32,
    retry: Duration,
) -> Result<(), ConnectError> {
    let mut attempt = 1;
    loop {
        let result = match target {
            Target::Index(index) => bridge.try_connect(*index),
            Target::Name(name) => bridge.try_connect_by_name(name),
        };

        match result {
            Err(e) if e.is_pending() && attempt < attempts => {
                info!("{} (attempt {}/{})", e, attempt, attempts);
                attempt += 1;
                thread::sleep(retry);
            }
            other => return other,
        }
    }
}

/// Connect to the target and copy batches to `out` until the channel fails
/// or `count` batches have been read
pub fn run<P: UsbPlatform, W: Write>(
    bridge: &mut SerialBridge<P>,
    options: &MonitorOptions,
    out: &mut W,
) -> anyhow::Result<MonitorSummary> {
    connect_with_retry(
        bridge,
        &options.target,
        options.connect_attempts,
        options.connect_retry,
    )?;

    if let Some(endpoint) = bridge.connection().endpoint() {
        info!("Monitoring {} port {}", endpoint.0, endpoint.1);
    }

    let mut summary = MonitorSummary::default();
    while options.count.map_or(true, |limit| summary.batches < limit) {
        let batch = bridge.read_batch();
        if bridge.has_error() {
            warn!("Read failed, closing connection");
            summary.failed = true;
            break;
        }
        summary.batches += 1;

        if batch.is_empty() {
            thread::sleep(options.poll_interval);
            continue;
        }
        summary.bytes += batch.len();
        out.write_all(format_batch(&batch, options.hex).as_bytes())?;
        out.flush()?;
    }

    bridge.close();
    info!("Read {} byte(s) in {} batch(es)", summary.bytes, summary.batches);
    Ok(summary)
}

/// Render a batch as hex (one line per batch) or lossy UTF-8
pub fn format_batch(batch: &[u8], hex: bool) -> String {
    if hex {
        let mut line = batch
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ");
        line.push('\n');
        line
    } else {
        String::from_utf8_lossy(batch).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tether_core::DeviceId;
    use tether_sim::{PermissionMode, ReadStep, SimPlatform, VirtualDevice};

    fn options(target: Target, count: Option<usize>) -> MonitorOptions {
        MonitorOptions {
            target,
            connect_attempts: 3,
            connect_retry: Duration::ZERO,
            poll_interval: Duration::ZERO,
            count,
            hex: false,
        }
    }

    #[test]
    fn test_format_batch() {
        assert_eq!(format_batch(b"OK\r\n", false), "OK\r\n");
        assert_eq!(format_batch(&[0x01, 0xAB], true), "01 AB\n");
        assert_eq!(format_batch(&[0xFF], false), "\u{FFFD}");
    }

    #[test]
    fn test_run_prints_banner_and_data() {
        let platform = SimPlatform::with_devices([VirtualDevice::cdc_acm("Uno").banner("hi\n")]);
        let sim = platform.controller();
        let mut bridge = SerialBridge::new(platform);
        let mut out = Vec::new();

        let summary = run(&mut bridge, &options(Target::Index(0), Some(3)), &mut out).unwrap();

        assert_eq!(out, b"hi\n");
        assert_eq!(summary.batches, 3);
        assert_eq!(summary.bytes, 3);
        assert!(!summary.failed);
        assert!(!bridge.is_connected());
        assert_eq!(sim.close_count(DeviceId(1), 0), 1);
    }

    #[test]
    fn test_run_stops_on_read_error() {
        let platform = SimPlatform::new();
        let sim = platform.controller();
        let id = sim.add_device(VirtualDevice::ftdi("FT232R"));
        sim.push_data(id, 0, b"abc");
        sim.push_read(id, 0, ReadStep::Error(io::ErrorKind::Other));
        let mut bridge = SerialBridge::new(platform);
        let mut out = Vec::new();

        let summary = run(&mut bridge, &options(Target::Index(0), None), &mut out).unwrap();

        assert_eq!(out, b"abc");
        assert!(summary.failed);
        assert_eq!(summary.batches, 1);
    }

    #[test]
    fn test_connect_by_name() {
        let platform = SimPlatform::with_devices([
            VirtualDevice::cdc_acm("Uno"),
            VirtualDevice::ftdi("FT232R"),
        ]);
        let mut bridge = SerialBridge::new(platform);
        let name = bridge.device_names()[1].clone();

        connect_with_retry(&mut bridge, &Target::Name(name), 1, Duration::ZERO).unwrap();

        assert_eq!(bridge.connection().endpoint(), Some((DeviceId(2), 0)));
    }

    #[test]
    fn test_retry_gives_up_while_pending() {
        let platform = SimPlatform::with_devices([
            VirtualDevice::cdc_acm("Uno").permission(PermissionMode::Prompt),
        ]);
        let mut bridge = SerialBridge::new(platform);

        let err =
            connect_with_retry(&mut bridge, &Target::Index(0), 3, Duration::ZERO).unwrap_err();

        assert!(err.is_pending());
        assert_eq!(bridge.permission_requests(), 1);
    }

    #[test]
    fn test_denied_is_not_retried() {
        let platform = SimPlatform::with_devices([
            VirtualDevice::cdc_acm("Uno").permission(PermissionMode::Deny),
        ]);
        let mut bridge = SerialBridge::new(platform);

        let err =
            connect_with_retry(&mut bridge, &Target::Index(0), 5, Duration::ZERO).unwrap_err();

        assert!(matches!(err, ConnectError::PermissionDenied(_)));
        assert_eq!(bridge.permission_requests(), 1);
    }
}
