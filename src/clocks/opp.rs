// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2024.

//! CPU operating point switching.
//!
//! The platform publishes a table of MPU operating points (frequency
//! and supply voltage). Each one is solved once into PLL1 register
//! settings; switching then either nudges the MPU prescaler, updates
//! the fraction on the fly, or parks the MPU on HSI while PLL1
//! restarts.

use crate::config::{self, PllDividers, PllSettings};
use crate::platform::Error;
use crate::rcc;
use crate::tree::{ClockId, Oscillator};

use super::pll::{compute_pll1_settings, PllId, PllOutput, PllReconfig};
use super::ClockController;

/// Operating points the platform may publish.
pub const MAX_OPP: usize = 2;

/// Solved PLL1 settings for every published operating point.
#[derive(Clone, Copy, Debug, Default)]
pub struct Pll1Settings {
    pub(crate) valid: bool,
    pub(crate) freq_khz: [u32; MAX_OPP],
    pub(crate) volt_mv: [u32; MAX_OPP],
    /// An all-zero output mask marks a slot not yet solved.
    pub(crate) dividers: [PllDividers; MAX_OPP],
    pub(crate) frac: [u32; MAX_OPP],
}

impl<'a> ClockController<'a> {
    /// Round a frequency request down to a supported operating point.
    /// Without a valid table the system can only run where it is, so
    /// the current point is returned.
    pub fn round_opp_khz(&self, freq_khz: u32) -> u32 {
        if !self.pll1.valid {
            return self.current_opp_khz;
        }
        let mut round = 0;
        for &opp in self.pll1.freq_khz.iter() {
            if opp <= freq_khz && opp > round {
                round = opp;
            }
        }
        round
    }

    pub fn current_opp_khz(&self) -> u32 {
        self.current_opp_khz
    }

    /// Highest published operating point, with its voltage.
    pub fn max_opp(&self) -> Result<(u32, u32), Error> {
        if !self.pll1.valid {
            return Err(Error::NotFound);
        }
        let mut best = (0, 0);
        for (&freq, &volt) in self.pll1.freq_khz.iter().zip(self.pll1.volt_mv.iter()) {
            if freq > best.0 {
                best = (freq, volt);
            }
        }
        if best.0 == 0 || best.1 == 0 {
            return Err(Error::NotFound);
        }
        Ok(best)
    }

    /// Move the MPU to another operating point. Rolls back to the
    /// current one when the target cannot be applied.
    pub fn set_opp_khz(&mut self, freq_khz: u32) -> Result<(), Error> {
        if freq_khz == self.current_opp_khz {
            return Ok(());
        }
        if !self.pll1.valid {
            return Err(Error::AccessDenied);
        }

        // The engine only drives PLL1, the MPU must already be on it.
        let mpu_src = self.rcc.read(rcc::MPCKSELR) & rcc::SELR_SRC_MASK;
        if mpu_src != 2 && mpu_src != 3 {
            return Err(Error::PermissionDenied);
        }

        if let Err(err) = self.pll1_config_from_opp_khz(freq_khz) {
            if self.pll1_config_from_opp_khz(self.current_opp_khz).is_err() {
                log::error!("no CPU operating point can be set");
                panic!("no CPU operating point can be set");
            }
            return Err(err);
        }

        self.current_opp_khz = freq_khz;
        Ok(())
    }

    fn opp_index(&self, freq_khz: u32) -> Option<usize> {
        self.pll1.freq_khz.iter().position(|&f| f == freq_khz)
    }

    /// MPU prescaler shift reaching `freq_khz` from the running PLL1_P,
    /// when the target is an exact 1/2/4/8/16 division of it.
    fn mpu_div_shift(&self, freq_khz: u32) -> Option<u32> {
        let pll1_p_khz = self.pll_p1_khz();
        if pll1_p_khz == 0 || pll1_p_khz % freq_khz as u64 != 0 {
            return None;
        }
        match pll1_p_khz / freq_khz as u64 {
            div @ (1 | 2 | 4 | 8 | 16) => Some(div.trailing_zeros()),
            _ => None,
        }
    }

    fn pll_p1_khz(&self) -> u64 {
        self.pll
            .output_rate(PllId::Pll1, PllOutput::P, self.pll_refclk_hz(PllId::Pll1))
            / 1_000
    }

    fn pll1_config_from_opp_khz(&mut self, freq_khz: u32) -> Result<(), Error> {
        let i = self.opp_index(freq_khz).ok_or(Error::NotFound)?;

        match self.mpu_div_shift(freq_khz) {
            Some(0) => return self.set_clksrc(config::CLK_MPU_PLL1P),
            Some(shift) => {
                self.set_clkdiv(shift, rcc::MPCKDIVR)?;
                return self.set_clksrc(config::CLK_MPU_PLL1P_DIV);
            }
            None => {}
        }

        let settings = PllSettings {
            dividers: self.pll1.dividers[i],
            frac: self.pll1.frac[i],
            csg: None,
        };
        let refclk_hz = self.pll_refclk_hz(PllId::Pll1);
        let kind = self.pll.reconfig_kind(PllId::Pll1, &settings, refclk_hz)?;

        if kind == PllReconfig::Same {
            return Ok(());
        }
        if kind == PllReconfig::StopAndRestart {
            // Park the MPU on HSI while the VCO moves.
            self.set_clksrc(config::CLK_MPU_HSI)?;
            self.pll.stop(PllId::Pll1)?;
        }

        self.pll.config(PllId::Pll1, &settings, refclk_hz)?;

        if kind == PllReconfig::StopAndRestart {
            self.pll.start(PllId::Pll1);
            self.pll
                .enable_outputs(PllId::Pll1, settings.dividers.output)?;
            self.set_clksrc(config::CLK_MPU_PLL1P)?;
        }
        Ok(())
    }

    /// Read the running PLL1 registers back into the table slot of the
    /// operating point the MPU currently runs at.
    fn save_current_pll1_settings(&mut self, buck1_voltage_mv: u32) -> Option<usize> {
        let freq_khz = ((self.rate_of(ClockId::CkMpu) + 500) / 1_000) as u32;
        let i = self.opp_index(freq_khz)?;
        if buck1_voltage_mv != 0 && self.pll1.volt_mv[i] != buck1_voltage_mv {
            return None;
        }

        let cfgr1 = self.rcc.read(rcc::PLL1CFGR1);
        let cfgr2 = self.rcc.read(rcc::PLL1CFGR2);
        self.pll1.dividers[i] = PllDividers {
            m: (cfgr1 & rcc::PLLNCFGR1_DIVM_MASK) >> rcc::PLLNCFGR1_DIVM_SHIFT,
            n: cfgr1 & rcc::PLLNCFGR1_DIVN_MASK,
            p: (cfgr2 >> rcc::PLLNCFGR2_DIVP_SHIFT) & rcc::PLLNCFGR2_DIVX_MASK,
            q: (cfgr2 >> rcc::PLLNCFGR2_DIVQ_SHIFT) & rcc::PLLNCFGR2_DIVX_MASK,
            r: (cfgr2 >> rcc::PLLNCFGR2_DIVR_SHIFT) & rcc::PLLNCFGR2_DIVX_MASK,
            output: self.rcc.read(rcc::PLL1CR) >> rcc::PLLNCR_DIVEN_SHIFT,
        };
        self.pll1.frac[i] =
            (self.rcc.read(rcc::PLL1FRACR) & rcc::PLLNFRACR_FRACV_MASK)
                >> rcc::PLLNFRACR_FRACV_SHIFT;
        Some(i)
    }

    fn pll1_refclk_hz_checked(&self) -> u64 {
        match self.pll.refclk_oscillator(PllId::Pll1) {
            Some(osc @ (Oscillator::Hsi | Oscillator::Hse)) => self.osc_hz[osc.index()],
            _ => panic!("PLL1 reference is neither HSI nor HSE"),
        }
    }

    /// PLL1 settings for a target MPU frequency: a solved table slot is
    /// reused when one matches, otherwise the settings are computed from
    /// the declared PLL12 reference.
    pub(crate) fn pll1_settings_for_khz(
        &self,
        pll12_word: u32,
        freq_khz: u32,
    ) -> Result<PllSettings, Error> {
        let slot = self.opp_index(freq_khz);
        if let Some(i) = slot {
            if self.pll1.dividers[i].output != 0 {
                return Ok(PllSettings {
                    dividers: self.pll1.dividers[i],
                    frac: self.pll1.frac[i],
                    csg: None,
                });
            }
        }
        if slot.is_none() && self.pll1.valid {
            return Err(Error::NotFound);
        }

        let input_hz = match pll12_word {
            config::CLK_PLL12_HSI => self.osc_hz[Oscillator::Hsi.index()],
            config::CLK_PLL12_HSE => self.osc_hz[Oscillator::Hse.index()],
            _ => {
                log::error!("PLL1 reference is neither HSI nor HSE");
                panic!("PLL1 reference is neither HSI nor HSE");
            }
        };
        let (dividers, frac) = compute_pll1_settings(input_hz, freq_khz)?;
        Ok(PllSettings {
            dividers,
            frac,
            csg: None,
        })
    }

    /// Solve PLL1 settings for every operating point the platform
    /// publishes. A missing table is not an error, the system just
    /// stays pinned to the boot operating point.
    pub fn compute_all_pll1_settings(&mut self, buck1_voltage_mv: u32) -> Result<(), Error> {
        let mut freq_khz = [0u32; MAX_OPP];
        let mut volt_mv = [0u32; MAX_OPP];
        let count = match self.platform.opp_freqvolt(&mut freq_khz, &mut volt_mv) {
            Ok(count) => count,
            Err(Error::NotFound) => {
                log::debug!("no operating point table, using boot settings");
                return Ok(());
            }
            Err(_) => {
                log::error!("inconsistent operating point table, ignored");
                return Ok(());
            }
        };
        self.pll1.freq_khz = freq_khz;
        self.pll1.volt_mv = volt_mv;

        let current = self.save_current_pll1_settings(buck1_voltage_mv);
        let input_hz = self.pll1_refclk_hz_checked();

        for i in 0..count.min(MAX_OPP) {
            if Some(i) == current {
                continue;
            }
            // Settings restored from a low-power context are reused.
            if self.pll1.dividers[i].output != 0 {
                continue;
            }
            let (dividers, frac) = compute_pll1_settings(input_hz, self.pll1.freq_khz[i])?;
            self.pll1.dividers[i] = dividers;
            self.pll1.frac[i] = frac;
        }

        self.pll1.valid = true;
        Ok(())
    }

    /// The solved table, for stashing across a low-power cycle.
    pub fn pll1_settings(&self) -> Result<Pll1Settings, Error> {
        if !self.pll1.valid {
            return Err(Error::AccessDenied);
        }
        Ok(self.pll1)
    }

    pub fn restore_pll1_settings(&mut self, settings: Pll1Settings) {
        self.pll1 = settings;
    }
}
