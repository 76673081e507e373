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

//! Multiply/divide unit instructions
//!
//! Results land in HI/LO. Division never traps; division by zero and
//! `i32::MIN / -1` produce the fixed results the R3000A hardware produces.

use super::super::CPU;

impl CPU {
    /// MULT: signed 32x32 -> 64 multiply
    pub(crate) fn op_mult(&mut self, rs: u8, rt: u8) {
        let a = self.reg(rs) as i32 as i64;
        let b = self.reg(rt) as i32 as i64;
        let result = (a * b) as u64;

        self.lo = result as u32;
        self.hi = (result >> 32) as u32;
    }

    /// MULTU: unsigned 32x32 -> 64 multiply
    pub(crate) fn op_multu(&mut self, rs: u8, rt: u8) {
        let result = self.reg(rs) as u64 * self.reg(rt) as u64;

        self.lo = result as u32;
        self.hi = (result >> 32) as u32;
    }

    /// DIV: signed divide, LO = quotient, HI = remainder
    pub(crate) fn op_div(&mut self, rs: u8, rt: u8) {
        let numerator = self.reg(rs) as i32;
        let denominator = self.reg(rt) as i32;

        if denominator == 0 {
            self.lo = if numerator >= 0 { 0xFFFF_FFFF } else { 1 };
            self.hi = numerator as u32;
        } else if numerator == i32::MIN && denominator == -1 {
            self.lo = 0x8000_0000;
            self.hi = 0;
        } else {
            self.lo = (numerator / denominator) as u32;
            self.hi = (numerator % denominator) as u32;
        }
    }

    /// DIVU: unsigned divide
    pub(crate) fn op_divu(&mut self, rs: u8, rt: u8) {
        let numerator = self.reg(rs);
        let denominator = self.reg(rt);

        if denominator == 0 {
            self.lo = 0xFFFF_FFFF;
            self.hi = numerator;
        } else {
            self.lo = numerator / denominator;
            self.hi = numerator % denominator;
        }
    }

    pub(crate) fn op_mfhi(&mut self, rd: u8) {
        self.set_reg(rd, self.hi);
    }

    pub(crate) fn op_mflo(&mut self, rd: u8) {
        self.set_reg(rd, self.lo);
    }

    pub(crate) fn op_mthi(&mut self, rs: u8) {
        self.hi = self.reg(rs);
    }

    pub(crate) fn op_mtlo(&mut self, rs: u8) {
        self.lo = self.reg(rs);
    }
}
