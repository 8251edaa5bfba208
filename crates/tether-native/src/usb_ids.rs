//! USB vendor IDs of serial adapter chips
//!
//! Anything with a vendor ID outside this table is assumed to be a CDC-ACM
//! class device.

use tether_core::DriverKind;

/// FTDI (Future Technology Devices International)
pub const FTDI_VID: u16 = 0x0403;
/// Silicon Labs CP210x
pub const CP210X_VID: u16 = 0x10C4;
/// WCH CH340/CH341
pub const CH34X_VID: u16 = 0x1A86;
/// Prolific PL2303
pub const PROLIFIC_VID: u16 = 0x067B;

/// Driver family for a vendor ID
pub fn driver_kind(vid: u16) -> DriverKind {
    match vid {
        FTDI_VID => DriverKind::Ftdi,
        CP210X_VID => DriverKind::Cp21xx,
        CH34X_VID => DriverKind::Ch34x,
        PROLIFIC_VID => DriverKind::Prolific,
        _ => DriverKind::CdcAcm,
    }
}
