// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2024.

//! Oscillator state machines.
//!
//! The high speed oscillators (HSI, HSE, CSI) switch through the
//! OCENSETR/OCENCLRR pair and report readiness in OCRDYR. The low speed
//! ones live in the backup domain (BDCR) and the LSI control register,
//! which are shared with the other world and therefore written under the
//! shared-register lock.

use crate::config::OscillatorSettings;
use crate::platform::{ClockPlatform, Error};
use crate::rcc;
use crate::rcc::{Rcc, RegOffset};

/// Highest HSI rate; lower rates are reached through the HSI divider.
pub const MAX_HSI_HZ: u64 = 64_000_000;

#[derive(Clone, Copy)]
pub struct Oscillators<'a> {
    rcc: Rcc<'a>,
    platform: &'a dyn ClockPlatform,
}

impl<'a> Oscillators<'a> {
    pub fn new(rcc: Rcc<'a>, platform: &'a dyn ClockPlatform) -> Oscillators<'a> {
        Oscillators { rcc, platform }
    }

    fn wait_ready(&self, enable: bool, reg: RegOffset, ready_mask: u32) -> Result<(), Error> {
        let expected = if enable { ready_mask } else { 0 };
        self.rcc
            .poll_bits(self.platform, reg, ready_mask, expected, rcc::OSCRDY_TIMEOUT_US)
    }

    /// Start the LSE without waiting for it: crystal startup takes up to
    /// a second, so readiness is polled late with [`wait_lse_ready`].
    ///
    /// [`wait_lse_ready`]: Oscillators::wait_lse_ready
    pub fn enable_lse(&self, settings: &OscillatorSettings) {
        if settings.digital_bypass {
            self.rcc
                .set_bits_shregs(self.platform, rcc::BDCR, rcc::BDCR_DIGBYP);
        }
        if settings.bypass || settings.digital_bypass {
            self.rcc
                .set_bits_shregs(self.platform, rcc::BDCR, rcc::BDCR_LSEBYP);
        }

        // The drive strength may only move one step at a time.
        let target = settings.drive & (rcc::BDCR_LSEDRV_MASK >> rcc::BDCR_LSEDRV_SHIFT);
        let mut value =
            (self.rcc.read(rcc::BDCR) & rcc::BDCR_LSEDRV_MASK) >> rcc::BDCR_LSEDRV_SHIFT;
        while value != target {
            if value > target {
                value -= 1;
            } else {
                value += 1;
            }
            self.rcc.modify_shregs(
                self.platform,
                rcc::BDCR,
                rcc::BDCR_LSEDRV_MASK,
                value << rcc::BDCR_LSEDRV_SHIFT,
            );
        }

        self.rcc
            .set_bits_shregs(self.platform, rcc::BDCR, rcc::BDCR_LSEON);
    }

    pub fn wait_lse_ready(&self) -> Result<(), Error> {
        self.wait_ready(true, rcc::BDCR, rcc::BDCR_LSERDY)
    }

    pub fn set_lse_css(&self) {
        self.rcc
            .set_bits_shregs(self.platform, rcc::BDCR, rcc::BDCR_LSECSSON);
    }

    pub fn set_lsi(&self, enable: bool) -> Result<(), Error> {
        if enable {
            self.rcc
                .set_bits_shregs(self.platform, rcc::RDLSICR, rcc::RDLSICR_LSION);
        } else {
            self.rcc
                .clear_bits_shregs(self.platform, rcc::RDLSICR, rcc::RDLSICR_LSION);
        }
        self.wait_ready(enable, rcc::RDLSICR, rcc::RDLSICR_LSIRDY)
    }

    pub fn enable_hse(&self, settings: &OscillatorSettings) -> Result<(), Error> {
        if settings.digital_bypass {
            self.rcc.set_bits(rcc::OCENSETR, rcc::OCENR_DIGBYP);
        }
        if settings.bypass || settings.digital_bypass {
            self.rcc.set_bits(rcc::OCENSETR, rcc::OCENR_HSEBYP);
        }

        self.rcc.set_bits(rcc::OCENSETR, rcc::OCENR_HSEON);
        self.wait_ready(true, rcc::OCRDYR, rcc::OCRDYR_HSERDY)?;

        if settings.css {
            self.rcc.set_bits(rcc::OCENSETR, rcc::OCENR_HSECSSON);
        }

        // The bootrom straps HSEBYP on a serial or USB boot; the strap
        // must agree with the board description.
        if self.platform.boot_on_usb()
            && self.rcc.read(rcc::OCENSETR) & rcc::OCENR_HSEBYP != 0
            && !(settings.bypass || settings.digital_bypass)
        {
            log::error!("HSEBYP is strapped but the HSE descriptor declares no bypass");
            return Err(Error::BadValue);
        }
        Ok(())
    }

    pub fn set_csi(&self, enable: bool) -> Result<(), Error> {
        let reg = if enable { rcc::OCENSETR } else { rcc::OCENCLRR };
        self.rcc.write(reg, rcc::OCENR_CSION);
        self.wait_ready(enable, rcc::OCRDYR, rcc::OCRDYR_CSIRDY)
    }

    pub fn set_hsi(&self, enable: bool) -> Result<(), Error> {
        let reg = if enable { rcc::OCENSETR } else { rcc::OCENCLRR };
        self.rcc.write(reg, rcc::OCENR_HSION);
        self.wait_ready(enable, rcc::OCRDYR, rcc::OCRDYR_HSIRDY)
    }

    /// Program the raw HSIDIV field (divide by `1 << hsidiv`) and wait
    /// for the divider handshake.
    pub fn set_hsi_divider(&self, hsidiv: u32) -> Result<(), Error> {
        self.rcc.modify(
            rcc::HSICFGR,
            rcc::HSICFGR_HSIDIV_MASK,
            hsidiv & rcc::HSICFGR_HSIDIV_MASK,
        );
        self.rcc.poll_bits(
            self.platform,
            rcc::OCRDYR,
            rcc::OCRDYR_HSIDIVRDY,
            rcc::OCRDYR_HSIDIVRDY,
            rcc::HSIDIV_TIMEOUT_US,
        )
    }

    /// Derive and apply the HSI divider for a declared HSI rate.
    pub fn apply_hsi_frequency(&self, hsi_hz: u64) -> Result<(), Error> {
        for hsidiv in 0..4 {
            if (MAX_HSI_HZ >> hsidiv) == hsi_hz {
                return self.set_hsi_divider(hsidiv);
            }
        }
        log::error!("invalid HSI frequency {} Hz", hsi_hz);
        Err(Error::InvalidArgument)
    }
}

#[cfg(test)]
mod tests {
    use super::super::sim;
    use super::*;
    use crate::platform::Role;

    fn oscillators() -> (Oscillators<'static>, Rcc<'static>) {
        let (ctl, platform) = sim::controller(Role::BringUp);
        let rcc = ctl.rcc;
        (Oscillators::new(rcc, platform), rcc)
    }

    #[test]
    fn lse_drive_walks_one_step_at_a_time() {
        let (osc, rcc) = oscillators();
        let settings = OscillatorSettings {
            drive: 3,
            ..OscillatorSettings::crystal(32_768)
        };
        osc.enable_lse(&settings);
        let bdcr = rcc.read(rcc::BDCR);
        assert_eq!(
            (bdcr & rcc::BDCR_LSEDRV_MASK) >> rcc::BDCR_LSEDRV_SHIFT,
            3
        );
        assert_ne!(bdcr & rcc::BDCR_LSEON, 0);
        assert_eq!(bdcr & rcc::BDCR_LSEBYP, 0);
        assert!(osc.wait_lse_ready().is_ok());
    }

    #[test]
    fn lse_bypass_modes_set_the_bypass_bits() {
        let (osc, rcc) = oscillators();
        let settings = OscillatorSettings {
            digital_bypass: true,
            ..OscillatorSettings::crystal(32_768)
        };
        osc.enable_lse(&settings);
        let bdcr = rcc.read(rcc::BDCR);
        assert_ne!(bdcr & rcc::BDCR_DIGBYP, 0);
        assert_ne!(bdcr & rcc::BDCR_LSEBYP, 0);
    }

    #[test]
    fn hse_enable_waits_for_ready_then_arms_css() {
        let (osc, rcc) = oscillators();
        let settings = OscillatorSettings {
            css: true,
            ..OscillatorSettings::crystal(24_000_000)
        };
        assert!(osc.enable_hse(&settings).is_ok());
        assert_ne!(rcc.read(rcc::OCENSETR) & rcc::OCENR_HSECSSON, 0);
        assert_ne!(rcc.read(rcc::OCRDYR) & rcc::OCRDYR_HSERDY, 0);
    }

    #[test]
    fn usb_boot_rejects_an_undeclared_strapped_bypass() {
        let (ctl, platform) = sim::controller(Role::BringUp);
        platform.usb_boot.set(true);
        let osc = Oscillators::new(ctl.rcc, platform);

        // HSEBYP left strapped by the bootrom, plain crystal declared.
        ctl.rcc.set_bits(rcc::OCENSETR, rcc::OCENR_HSEBYP);
        assert_eq!(
            osc.enable_hse(&OscillatorSettings::crystal(24_000_000)),
            Err(Error::BadValue)
        );

        let bypassed = OscillatorSettings {
            bypass: true,
            ..OscillatorSettings::crystal(24_000_000)
        };
        assert!(osc.enable_hse(&bypassed).is_ok());
    }

    #[test]
    fn lsi_toggles_and_waits_both_ways() {
        let (osc, rcc) = oscillators();
        assert!(osc.set_lsi(true).is_ok());
        assert_ne!(rcc.read(rcc::RDLSICR) & rcc::RDLSICR_LSION, 0);
        assert!(osc.set_lsi(false).is_ok());
        assert_eq!(rcc.read(rcc::RDLSICR) & rcc::RDLSICR_LSION, 0);
    }

    #[test]
    fn hsi_divider_follows_the_declared_rate() {
        let (osc, rcc) = oscillators();
        assert!(osc.apply_hsi_frequency(16_000_000).is_ok());
        assert_eq!(rcc.read(rcc::HSICFGR) & rcc::HSICFGR_HSIDIV_MASK, 2);
        assert_eq!(
            osc.apply_hsi_frequency(10_000_000),
            Err(Error::InvalidArgument)
        );
    }
}
