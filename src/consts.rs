//! Constants for the SPI-mode storage protocol and the raw image format.
//!
//! This module defines the command indices, fixed arguments, response codes
//! and framing tokens of the storage-device handshake, plus the geometry of
//! sectors, the raw image header, and the fixed display canvas.
//!
//! These values are wire-visible: a real SD-class device in SPI mode only
//! initializes and serves block reads when the six-byte command frames are
//! reproduced exactly.
//!
//! ## Key Concepts
//!
//! - **Commands**: each command frame is an index byte, four argument bytes
//!   (most-significant first) and a trailing checksum byte.
//! - **Checksums**: only the reset and interface-condition commands carry a
//!   meaningful checksum; the remaining commands send a permissive
//!   placeholder, which devices accept once checksum validation is off.
//! - **Polling**: while waiting for a response the host keeps the clock
//!   running by sending all-ones filler bytes.
//! - **Sectors**: the device is addressed in fixed 512-byte sectors; each
//!   block-read response carries two trailing CRC bytes.

/// Command index for the software-reset command (CMD0): go to idle state.
pub const CMD_RESET: u8 = 0x40;

/// Checksum byte for the reset command. This is the one command whose
/// checksum is always validated by the device, so it must be correct.
pub const CMD_RESET_CRC: u8 = 0x95;

/// Command index for the interface-condition query (CMD8): voltage check
/// plus an echo pattern.
pub const CMD_IF_COND: u8 = 0x48;

/// Argument for the interface-condition query: 2.7-3.6 V supply range in
/// the upper nibble, echo pattern [`IF_COND_ECHO`] in the low byte.
pub const IF_COND_ARG: u32 = 0x0000_01AA;

/// Checksum byte for the interface-condition query.
pub const CMD_IF_COND_CRC: u8 = 0x87;

/// Voltage-accepted marker expected in the third trailing payload byte of
/// the interface-condition acknowledgment.
pub const IF_COND_VOLTAGE_OK: u8 = 0x01;

/// Echo pattern expected back in the last trailing payload byte of the
/// interface-condition acknowledgment.
pub const IF_COND_ECHO: u8 = 0xAA;

/// Command index for the app-command prefix (CMD55): the next command is an
/// application command.
pub const CMD_APP_PREFIX: u8 = 0x77;

/// Command index for the initialization operation (ACMD41).
pub const CMD_INIT_OP: u8 = 0x69;

/// Argument for the initialization operation: high-capacity support hint.
pub const INIT_OP_ARG: u32 = 0x4000_0000;

/// Command index for the single-block read command (CMD17).
pub const CMD_READ_BLOCK: u8 = 0x51;

/// Placeholder checksum byte sent with commands after the reset and
/// interface-condition pair.
pub const CMD_DUMMY_CRC: u8 = 0x01;

/// Length of one command frame in bytes: index, four argument bytes, and a
/// checksum.
pub const CMD_LEN: usize = 6;

/// All-ones filler byte clocked while waiting for a device response.
pub const FILLER: u8 = 0xFF;

/// Start-of-block token preceding the 512 payload bytes of a block read.
pub const DATA_TOKEN: u8 = 0xFE;

/// Response code: device is in the idle state, still initializing.
pub const R1_IDLE: u8 = 0x01;

/// Response code: command accepted, initialization complete.
pub const R1_READY: u8 = 0x00;

/// Number of trailing payload bytes in the interface-condition
/// acknowledgment.
pub const IF_COND_PAYLOAD_LEN: u8 = 4;

/// Fixed sector size of the storage device in bytes.
pub const SECTOR_LEN: u16 = 512;

/// Number of CRC bytes trailing each sector payload.
pub const SECTOR_CRC_LEN: u8 = 2;

/// Length of the raw image header in bytes: width, height (both
/// little-endian 16-bit), a format byte, and three reserved bytes.
pub const HEADER_LEN: u8 = 8;

/// Widest image the pixel store can hold.
pub const MAX_WIDTH: u16 = 320;

/// Tallest image the pixel store can hold.
pub const MAX_HEIGHT: u16 = 240;

/// Capacity of the pixel store in pixels.
pub const CANVAS_PIXELS: usize = MAX_WIDTH as usize * MAX_HEIGHT as usize;

/// Image-header format tag for 8-bit grayscale samples.
pub const BPP_GRAY8: u8 = 8;

/// Image-header format tag for 24-bit RGB samples.
pub const BPP_RGB24: u8 = 24;
