// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Host-level error type
//!
//! Only conditions that originate on the host side surface as [`EmulatorError`]:
//! file I/O, configuration parsing, snapshot decoding and decode-table setup.
//! Everything the emulated machine does wrong (bad opcodes, misaligned accesses,
//! reads of unmapped memory) is handled inside the emulation and never reaches
//! this type.

use thiserror::Error;

/// Errors reported by the emulation core to its host
#[derive(Debug, Error)]
pub enum EmulatorError {
    /// BIOS image path does not exist
    #[error("BIOS file not found: {0}")]
    BiosNotFound(String),

    /// BIOS image has the wrong size
    #[error("Invalid BIOS size: expected {expected} bytes, got {got} bytes")]
    InvalidBiosSize { expected: usize, got: usize },

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Session configuration could not be parsed or serialized
    #[error("Configuration error: {0}")]
    Config(String),

    /// Snapshot could not be encoded
    #[error("Snapshot encode error: {0}")]
    SnapshotEncode(String),

    /// Snapshot blob could not be decoded
    #[error("Snapshot decode error: {0}")]
    SnapshotDecode(String),

    /// Snapshot was produced by an incompatible format revision
    #[error("Snapshot version mismatch: expected {expected}, got {got}")]
    SnapshotVersion { expected: u32, got: u32 },

    /// Snapshot does not describe the running session's layout
    #[error("Snapshot does not match session: {0}")]
    SnapshotMismatch(String),

    /// A device was registered over a window that already has an owner
    #[error("Address window 0x{start:08X}-0x{end:08X} overlaps {existing}")]
    AddressConflict {
        start: u32,
        end: u32,
        existing: String,
    },

    /// DMA channel index outside 0-6
    #[error("Invalid DMA channel: {0}")]
    InvalidDmaChannel(usize),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, EmulatorError>;

impl From<toml::de::Error> for EmulatorError {
    fn from(err: toml::de::Error) -> Self {
        EmulatorError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for EmulatorError {
    fn from(err: toml::ser::Error) -> Self {
        EmulatorError::Config(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for EmulatorError {
    fn from(err: bincode::error::EncodeError) -> Self {
        EmulatorError::SnapshotEncode(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for EmulatorError {
    fn from(err: bincode::error::DecodeError) -> Self {
        EmulatorError::SnapshotDecode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_bios_size_message() {
        let err = EmulatorError::InvalidBiosSize {
            expected: 524288,
            got: 100,
        };
        assert_eq!(
            err.to_string(),
            "Invalid BIOS size: expected 524288 bytes, got 100 bytes"
        );
    }

    #[test]
    fn test_address_conflict_message() {
        let err = EmulatorError::AddressConflict {
            start: 0x1F801800,
            end: 0x1F801803,
            existing: "CD-ROM".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Address window 0x1F801800-0x1F801803 overlaps CD-ROM"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: EmulatorError = io.into();
        assert!(matches!(err, EmulatorError::Io(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let parse: std::result::Result<toml::Value, _> = toml::from_str("= broken");
        let err: EmulatorError = parse.unwrap_err().into();
        assert!(matches!(err, EmulatorError::Config(_)));
    }
}
