// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2024.

//! PLL control and rate arithmetic.
//!
//! PLL1 and PLL2 are 1600 MHz parts fed from the shared RCK12 selector,
//! PLL3 and PLL4 are 800 MHz parts with their own reference selectors.
//! All rate math is done in u64 against the 13-bit fractional scale of
//! the hardware; the VCO figures the registers encode are the post-
//! divider (half-VCO) values.

use crate::config::{pll_outputs, CsgSettings, PllDividers, PllSettings};
use crate::platform::{ClockPlatform, Error};
use crate::rcc;
use crate::rcc::{Rcc, RegOffset};
use crate::tree::{Oscillator, NB_OSC};

pub const POST_DIVM_MIN_HZ: u64 = 8_000_000;
pub const POST_DIVM_MAX_HZ: u64 = 16_000_000;
pub const DIVM_MAX: u32 = 63;
pub const DIVN_MIN: u32 = 24;
pub const DIVN_MAX: u32 = 99;
pub const DIVP_MAX: u32 = 127;
pub const FRAC_MAX: u32 = 8192;
pub const VCO_MIN_HZ: u64 = 800_000_000;
pub const VCO_MAX_HZ: u64 = 1_600_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PllId {
    Pll1,
    Pll2,
    Pll3,
    Pll4,
}

impl PllId {
    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    pub(crate) const fn descriptor(self) -> PllDescriptor {
        match self {
            PllId::Pll1 => PllDescriptor {
                typ: PllType::Pll1600,
                rckxselr: rcc::RCK12SELR,
                cfgr1: rcc::PLL1CFGR1,
                cfgr2: rcc::PLL1CFGR2,
                fracr: rcc::PLL1FRACR,
                cr: rcc::PLL1CR,
                csgr: rcc::PLL1CSGR,
                refclk: [Some(Oscillator::Hsi), Some(Oscillator::Hse), None, None],
            },
            PllId::Pll2 => PllDescriptor {
                typ: PllType::Pll1600,
                rckxselr: rcc::RCK12SELR,
                cfgr1: rcc::PLL2CFGR1,
                cfgr2: rcc::PLL2CFGR2,
                fracr: rcc::PLL2FRACR,
                cr: rcc::PLL2CR,
                csgr: rcc::PLL2CSGR,
                refclk: [Some(Oscillator::Hsi), Some(Oscillator::Hse), None, None],
            },
            PllId::Pll3 => PllDescriptor {
                typ: PllType::Pll800,
                rckxselr: rcc::RCK3SELR,
                cfgr1: rcc::PLL3CFGR1,
                cfgr2: rcc::PLL3CFGR2,
                fracr: rcc::PLL3FRACR,
                cr: rcc::PLL3CR,
                csgr: rcc::PLL3CSGR,
                refclk: [
                    Some(Oscillator::Hsi),
                    Some(Oscillator::Hse),
                    Some(Oscillator::Csi),
                    None,
                ],
            },
            PllId::Pll4 => PllDescriptor {
                typ: PllType::Pll800,
                rckxselr: rcc::RCK4SELR,
                cfgr1: rcc::PLL4CFGR1,
                cfgr2: rcc::PLL4CFGR2,
                fracr: rcc::PLL4FRACR,
                cr: rcc::PLL4CR,
                csgr: rcc::PLL4CSGR,
                refclk: [
                    Some(Oscillator::Hsi),
                    Some(Oscillator::Hse),
                    Some(Oscillator::Csi),
                    Some(Oscillator::I2sCkin),
                ],
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PllType {
    Pll800,
    Pll1600,
}

impl PllType {
    const fn refclk_min_hz(self) -> u64 {
        match self {
            PllType::Pll800 => 4_000_000,
            PllType::Pll1600 => 8_000_000,
        }
    }

    const fn refclk_max_hz(self) -> u64 {
        16_000_000
    }

    const fn divn_max(self) -> u32 {
        match self {
            PllType::Pll800 => 99,
            PllType::Pll1600 => 199,
        }
    }
}

#[derive(Clone, Copy)]
pub(crate) struct PllDescriptor {
    pub typ: PllType,
    pub rckxselr: RegOffset,
    pub cfgr1: RegOffset,
    pub cfgr2: RegOffset,
    pub fracr: RegOffset,
    pub cr: RegOffset,
    pub csgr: RegOffset,
    pub refclk: [Option<Oscillator>; 4],
}

/// Post dividers of a PLL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PllOutput {
    P,
    Q,
    R,
}

impl PllOutput {
    const fn cfgr2_shift(self) -> u32 {
        match self {
            PllOutput::P => rcc::PLLNCFGR2_DIVP_SHIFT,
            PllOutput::Q => rcc::PLLNCFGR2_DIVQ_SHIFT,
            PllOutput::R => rcc::PLLNCFGR2_DIVR_SHIFT,
        }
    }
}

/// How far a new PLL1 configuration is from the running one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PllReconfig {
    /// Registers already hold the target configuration.
    Same,
    /// Only the fraction or post dividers move, safe while locked.
    OnTheFly,
    /// M or N change, the PLL must be stopped first.
    StopAndRestart,
}

fn cfgr2_value(div: &PllDividers) -> u32 {
    ((div.p & rcc::PLLNCFGR2_DIVX_MASK) << rcc::PLLNCFGR2_DIVP_SHIFT)
        | ((div.q & rcc::PLLNCFGR2_DIVX_MASK) << rcc::PLLNCFGR2_DIVQ_SHIFT)
        | ((div.r & rcc::PLLNCFGR2_DIVX_MASK) << rcc::PLLNCFGR2_DIVR_SHIFT)
}

fn fracr_value(frac: u32) -> u32 {
    (frac << rcc::PLLNFRACR_FRACV_SHIFT) | rcc::PLLNFRACR_FRACLE
}

#[derive(Clone, Copy)]
pub struct Pll<'a> {
    rcc: Rcc<'a>,
    platform: &'a dyn ClockPlatform,
}

impl<'a> Pll<'a> {
    pub fn new(rcc: Rcc<'a>, platform: &'a dyn ClockPlatform) -> Pll<'a> {
        Pll { rcc, platform }
    }

    /// The oscillator currently selected as reference, if any.
    pub(crate) fn refclk_oscillator(&self, id: PllId) -> Option<Oscillator> {
        let desc = id.descriptor();
        let src = (self.rcc.read(desc.rckxselr) & rcc::SELR_SRC_MASK) as usize;
        desc.refclk[src]
    }

    pub(crate) fn is_on(&self, id: PllId) -> bool {
        self.rcc.read(id.descriptor().cr) & rcc::PLLNCR_PLLON != 0
    }

    /// Half-VCO rate encoded by the divider registers.
    pub(crate) fn vco_rate(&self, id: PllId, refclk_hz: u64) -> u64 {
        let desc = id.descriptor();
        let cfgr1 = self.rcc.read(desc.cfgr1);
        let fracr = self.rcc.read(desc.fracr);
        let divm = ((cfgr1 & rcc::PLLNCFGR1_DIVM_MASK) >> rcc::PLLNCFGR1_DIVM_SHIFT) as u64;
        let divn = (cfgr1 & rcc::PLLNCFGR1_DIVN_MASK) as u64;

        if fracr & rcc::PLLNFRACR_FRACLE != 0 {
            let fracv =
                ((fracr & rcc::PLLNFRACR_FRACV_MASK) >> rcc::PLLNFRACR_FRACV_SHIFT) as u64;
            refclk_hz * (((divn + 1) << 13) + fracv) / ((divm + 1) << 13)
        } else {
            refclk_hz * (divn + 1) / (divm + 1)
        }
    }

    pub(crate) fn output_rate(&self, id: PllId, output: PllOutput, refclk_hz: u64) -> u64 {
        let desc = id.descriptor();
        let divy =
            ((self.rcc.read(desc.cfgr2) >> output.cfgr2_shift()) & rcc::PLLNCFGR2_DIVX_MASK) as u64;
        self.vco_rate(id, refclk_hz) / (divy + 1)
    }

    /// Compute the CFGR1 image for a divider set, validating the post-M
    /// reference range and picking the input frequency range bit.
    pub(crate) fn compute_cfgr1(
        &self,
        id: PllId,
        div: &PllDividers,
        refclk_hz: u64,
    ) -> Result<u32, Error> {
        let desc = id.descriptor();
        if div.n > desc.typ.divn_max() {
            return Err(Error::InvalidArgument);
        }

        let post_divm = refclk_hz / (div.m as u64 + 1);
        if post_divm < desc.typ.refclk_min_hz() || post_divm > desc.typ.refclk_max_hz() {
            return Err(Error::InvalidArgument);
        }

        let mut value = div.n & rcc::PLLNCFGR1_DIVN_MASK;
        value |= (div.m << rcc::PLLNCFGR1_DIVM_SHIFT) & rcc::PLLNCFGR1_DIVM_MASK;
        if desc.typ == PllType::Pll800 && post_divm >= POST_DIVM_MIN_HZ {
            value |= 1 << rcc::PLLNCFGR1_IFRGE_SHIFT;
        }
        Ok(value)
    }

    /// Whether the PLL is running with exactly the given source and
    /// configuration, as left behind by an earlier boot stage.
    pub(crate) fn matches(
        &self,
        id: PllId,
        clksrc_word: u32,
        settings: &PllSettings,
        osc_hz: &[u64; NB_OSC],
    ) -> bool {
        let desc = id.descriptor();
        if self.rcc.read(desc.cr) != rcc::PLLNCR_PLLON {
            return false;
        }

        let clksrc_reg = RegOffset::new(((clksrc_word >> 4) & 0xFFF) as u16);
        if self.rcc.read(clksrc_reg) & rcc::SELR_SRC_MASK != clksrc_word & rcc::SELR_SRC_MASK {
            return false;
        }

        let refclk_hz = match self.refclk_oscillator(id) {
            Some(osc) => osc_hz[osc.index()],
            None => return false,
        };
        let cfgr1 = match self.compute_cfgr1(id, &settings.dividers, refclk_hz) {
            Ok(value) => value,
            Err(_) => return false,
        };
        if self.rcc.read(desc.cfgr1) != cfgr1 {
            return false;
        }
        if self.rcc.read(desc.fracr) != fracr_value(settings.frac) {
            return false;
        }
        self.rcc.read(desc.cfgr2) == cfgr2_value(&settings.dividers)
    }

    /// How the running PLL relates to a target configuration.
    pub(crate) fn reconfig_kind(
        &self,
        id: PllId,
        settings: &PllSettings,
        refclk_hz: u64,
    ) -> Result<PllReconfig, Error> {
        let desc = id.descriptor();
        let cfgr1 = self.compute_cfgr1(id, &settings.dividers, refclk_hz)?;
        if self.rcc.read(desc.cfgr1) != cfgr1 {
            return Ok(PllReconfig::StopAndRestart);
        }
        if self.rcc.read(desc.fracr) == fracr_value(settings.frac)
            && self.rcc.read(desc.cfgr2) == cfgr2_value(&settings.dividers)
        {
            Ok(PllReconfig::Same)
        } else {
            Ok(PllReconfig::OnTheFly)
        }
    }

    /// Program dividers and fraction. The fraction latch is cycled so
    /// the sigma-delta reloads the new value.
    pub fn config(&self, id: PllId, settings: &PllSettings, refclk_hz: u64) -> Result<(), Error> {
        let desc = id.descriptor();
        let cfgr1 = self.compute_cfgr1(id, &settings.dividers, refclk_hz)?;
        self.rcc.write(desc.cfgr1, cfgr1);
        self.rcc.write(desc.fracr, 0);
        self.rcc
            .write(desc.fracr, settings.frac << rcc::PLLNFRACR_FRACV_SHIFT);
        self.rcc.set_bits(desc.fracr, rcc::PLLNFRACR_FRACLE);
        self.rcc.write(desc.cfgr2, cfgr2_value(&settings.dividers));
        Ok(())
    }

    /// Program only the post dividers, for a PLL whose VCO must not be
    /// disturbed.
    pub fn config_output(&self, id: PllId, div: &PllDividers) {
        self.rcc.write(id.descriptor().cfgr2, cfgr2_value(div));
    }

    pub fn csg(&self, id: PllId, csg: &CsgSettings) {
        let desc = id.descriptor();
        let value = (csg.mod_per & rcc::PLLNCSGR_MOD_PER_MASK)
            | ((csg.inc_step << rcc::PLLNCSGR_INC_STEP_SHIFT) & rcc::PLLNCSGR_INC_STEP_MASK)
            | if csg.sscg_mode != 0 {
                rcc::PLLNCSGR_SSCG_MODE
            } else {
                0
            };
        self.rcc.write(desc.csgr, value);
        self.rcc.set_bits(desc.cr, rcc::PLLNCR_SSCG_CTRL);
    }

    /// Power the VCO up with all outputs masked.
    pub fn start(&self, id: PllId) {
        self.rcc.modify(
            id.descriptor().cr,
            rcc::PLLNCR_DIVPEN | rcc::PLLNCR_DIVQEN | rcc::PLLNCR_DIVREN,
            rcc::PLLNCR_PLLON,
        );
    }

    /// Wait for lock, then unmask the outputs given as a
    /// [`pll_outputs`] mask.
    pub fn enable_outputs(&self, id: PllId, output_mask: u32) -> Result<(), Error> {
        let cr = id.descriptor().cr;
        self.rcc.poll_bits(
            self.platform,
            cr,
            rcc::PLLNCR_PLLRDY,
            rcc::PLLNCR_PLLRDY,
            rcc::PLLRDY_TIMEOUT_US,
        )?;
        self.rcc
            .set_bits(cr, output_mask << rcc::PLLNCR_DIVEN_SHIFT);
        Ok(())
    }

    /// Mask the outputs, power the VCO down and wait for unlock.
    pub fn stop(&self, id: PllId) -> Result<(), Error> {
        let cr = id.descriptor().cr;
        self.rcc.clear_bits(
            cr,
            rcc::PLLNCR_DIVPEN | rcc::PLLNCR_DIVQEN | rcc::PLLNCR_DIVREN,
        );
        self.rcc.clear_bits(cr, rcc::PLLNCR_PLLON);
        self.rcc
            .poll_bits(self.platform, cr, rcc::PLLNCR_PLLRDY, 0, rcc::PLLRDY_TIMEOUT_US)
    }
}

/// Solve PLL1 M/N/P and fraction for a target MPU frequency, P output
/// only. Scans M for a post divider reference in range, then P, deriving
/// N and refining the fraction against the half-VCO limits. Exact hits
/// return immediately, otherwise the closest candidate wins.
pub fn compute_pll1_settings(input_hz: u64, freq_khz: u32) -> Result<(PllDividers, u32), Error> {
    let output_hz = freq_khz as u64 * 1_000;
    let mut best_diff = u64::MAX;
    let mut best: Option<(PllDividers, u32)> = None;

    for divm in (0..=DIVM_MAX).rev() {
        let post_divm = input_hz / (divm as u64 + 1);
        if !(POST_DIVM_MIN_HZ..=POST_DIVM_MAX_HZ).contains(&post_divm) {
            continue;
        }

        for divp in 0..=DIVP_MAX {
            let freq = output_hz * (divm as u64 + 1) * (divp as u64 + 1);
            let divn_calc = freq / input_hz;
            if divn_calc == 0 {
                continue;
            }
            let divn = (divn_calc - 1) as u32;
            if !(DIVN_MIN..=DIVN_MAX).contains(&divn) {
                continue;
            }

            let mut frac =
                ((freq * FRAC_MAX as u64) / input_hz - (divn as u64 + 1) * FRAC_MAX as u64) as u32;

            // Two passes to refine the fraction around the target.
            for _ in 0..2 {
                if frac > FRAC_MAX {
                    break;
                }
                let vco = post_divm * (divn as u64 + 1)
                    + (post_divm * frac as u64) / FRAC_MAX as u64;
                if !(VCO_MIN_HZ / 2..=VCO_MAX_HZ / 2).contains(&vco) {
                    frac += 1;
                    continue;
                }
                let candidate = vco / (divp as u64 + 1);
                let diff = candidate.abs_diff(output_hz);
                if diff < best_diff {
                    let dividers = PllDividers {
                        m: divm,
                        n: divn,
                        p: divp,
                        q: 0,
                        r: 0,
                        output: pll_outputs(true, false, false),
                    };
                    if diff == 0 {
                        return Ok((dividers, frac));
                    }
                    best_diff = diff;
                    best = Some((dividers, frac));
                }
                frac += 1;
            }
        }
    }

    best.ok_or_else(|| {
        log::error!("no PLL1 solution for {} kHz from {} Hz", freq_khz, input_hz);
        Error::InvalidArgument
    })
}
