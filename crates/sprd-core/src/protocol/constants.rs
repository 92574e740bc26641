//! Protocol constants for the Spreadtrum/Unisoc BootROM and Socrates agents.

use std::time::Duration;

// ============================================================================
// Device Identification
// ============================================================================

/// Spreadtrum Communications Vendor ID
pub const SPRD_VENDOR_ID: u16 = 0x1782;

/// BootROM / FDL download mode Product ID
pub const SPRD_BOOT_PRODUCT_ID: u16 = 0x4D00;

/// Vendor-specific interface class carrying the bulk pipe
pub const VENDOR_INTERFACE_CLASS: u8 = 0xFF;

/// Number of endpoints on the download interface (one IN, one OUT)
pub const DOWNLOAD_INTERFACE_ENDPOINTS: usize = 2;

// ============================================================================
// Mode Switch Control Request
// ============================================================================

/// Class request used to coax the device out of an alternate protocol mode.
pub const MODE_SWITCH_REQUEST: u8 = 0x22;
pub const MODE_SWITCH_VALUE: u16 = 0x0601;
pub const MODE_SWITCH_INDEX: u16 = 0;

pub const CONTROL_TIMEOUT: Duration = Duration::from_millis(1000);

// ============================================================================
// HDLC Framing (BootROM)
// ============================================================================

pub const HDLC_FLAG: u8 = 0x7E;
pub const HDLC_ESCAPE: u8 = 0x7D;
pub const HDLC_ESCAPE_MASK: u8 = 0x20;

/// Largest payload carried by a single BootROM frame.
pub const HDLC_DATA_MAX_SIZE: usize = 512;

/// type(2) + length(2) + crc(2)
pub const HDLC_HEADER_SIZE: usize = 4;
pub const HDLC_CRC_SIZE: usize = 2;

/// Flags + header + crc around an empty payload.
pub const HDLC_FRAME_MIN_SIZE: usize = 1 + HDLC_HEADER_SIZE + HDLC_CRC_SIZE + 1;

/// Unescaped frame bytes (no flags) for a full payload.
pub const HDLC_CANONICAL_MAX_SIZE: usize = HDLC_HEADER_SIZE + HDLC_DATA_MAX_SIZE + HDLC_CRC_SIZE;

/// Capacity of the BootROM receive accumulator.
pub const HDLC_FRAME_MAX_SIZE: usize = HDLC_FRAME_MIN_SIZE + HDLC_DATA_MAX_SIZE;

/// Bytes sent per `CMD_MIDST_DATA` step. Older loaders used 528, which no
/// longer fits under `HDLC_DATA_MAX_SIZE`.
pub const MIDST_CHUNK_SIZE: usize = HDLC_DATA_MAX_SIZE;

// ============================================================================
// Socrates Framing
// ============================================================================

/// type(2) + length(2)
pub const DIAG_HEADER_SIZE: usize = 4;

/// Fixed send buffer and receive accumulator size.
pub const DIAG_BUFFER_SIZE: usize = 1024;

pub const DIAG_DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// eMMC block size used by the single-block commands.
pub const MMC_BLOCK_SIZE: usize = 512;

// ============================================================================
// Conventional Addresses
// ============================================================================

/// Where loaders are conventionally uploaded.
pub const DEFAULT_LOAD_ADDRESS: u32 = 0x5500;

/// Entry point offset from the load address.
pub const DEFAULT_JUMP_OFFSET: u32 = 0x200;

/// Version string reported by the BootROM variants this tool was written against.
pub const BOOTROM_VERSION_SPRD3: &str = "SPRD3";
