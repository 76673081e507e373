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

//! Save-state blob format
//!
//! A snapshot is a bincode encoding of [`SystemState`]. Devices contribute
//! opaque blobs tagged with their names, so a snapshot can only be restored
//! into a session with the same device layout.

use crate::core::cpu::CPU;
use crate::core::error::{EmulatorError, Result};
use crate::core::memory::MemoryState;
use crate::core::timing::Scheduler;
use serde::{Deserialize, Serialize};

/// Format revision written into every snapshot
pub const SNAPSHOT_VERSION: u32 = 1;

/// Upper bound on the bytes a snapshot may claim while decoding
const DECODE_LIMIT: usize = 16 * 1024 * 1024;

/// Complete session state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SystemState {
    pub(crate) version: u32,
    pub(crate) cpu: CPU,
    pub(crate) memory: MemoryState,
    pub(crate) scheduler: Scheduler,
    /// `(device name, device blob)` in registration order
    pub(crate) devices: Vec<(String, Vec<u8>)>,
}

pub(crate) fn encode(state: &SystemState) -> Result<Vec<u8>> {
    Ok(bincode::serde::encode_to_vec(
        state,
        bincode::config::standard(),
    )?)
}

/// Decode a blob and check its format revision
pub(crate) fn decode(data: &[u8]) -> Result<SystemState> {
    let config = bincode::config::standard().with_limit::<DECODE_LIMIT>();
    let (state, _): (SystemState, usize) = bincode::serde::decode_from_slice(data, config)?;
    if state.version != SNAPSHOT_VERSION {
        return Err(EmulatorError::SnapshotVersion {
            expected: SNAPSHOT_VERSION,
            got: state.version,
        });
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory::Bus;

    fn create_test_state() -> SystemState {
        let mut scheduler = Scheduler::new();
        scheduler.register_event("test");
        SystemState {
            version: SNAPSHOT_VERSION,
            cpu: CPU::new(),
            memory: Bus::new().memory_state(),
            scheduler,
            devices: vec![("Device".to_string(), vec![1, 2, 3])],
        }
    }

    #[test]
    fn test_encode_decode() {
        let state = create_test_state();
        let decoded = decode(&encode(&state).unwrap()).unwrap();
        assert_eq!(decoded.memory, state.memory);
        assert_eq!(decoded.scheduler, state.scheduler);
        assert_eq!(decoded.devices, state.devices);
        assert_eq!(decoded.cpu.pc(), 0xBFC0_0000);
    }

    #[test]
    fn test_decode_rejects_other_version() {
        let mut state = create_test_state();
        state.version = SNAPSHOT_VERSION + 1;
        let err = decode(&encode(&state).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            EmulatorError::SnapshotVersion { expected, got }
                if expected == SNAPSHOT_VERSION && got == SNAPSHOT_VERSION + 1
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_blob() {
        let data = encode(&create_test_state()).unwrap();
        let err = decode(&data[..data.len() / 2]).unwrap_err();
        assert!(matches!(err, EmulatorError::SnapshotDecode(_)));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode(&[0xFF; 4]).unwrap_err();
        assert!(matches!(err, EmulatorError::SnapshotDecode(_)));
    }
}
