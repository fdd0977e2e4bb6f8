// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2024.

//! Reset and clock control (RCC) driver for the STM32MP15x SoC family.
//!
//! The RCC block owns the oscillators, the four PLLs, the bus and kernel
//! clock muxes and the peripheral clock gates of the SoC. This crate
//! drives all of them: cold-boot clock tree bring-up from a board
//! topology descriptor, runtime gating with reference counts, rate
//! queries along the parent tree, MPU DVFS through PLL1 and the
//! suspend/resume and Stop-mode register save/restore paths.
//!
//! The driver is register-complete but platform-agnostic: everything the
//! SoC integration must provide (a microsecond timebase, optional
//! spinlocks, the STGEN counter update, the OPP table) enters through the
//! [`platform::ClockPlatform`] trait.

#![cfg_attr(not(test), no_std)]

pub mod clocks;
pub mod config;
pub mod platform;
pub mod rcc;
pub mod tree;
