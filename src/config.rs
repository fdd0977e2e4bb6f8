// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2024.

//! Board clock topology descriptor.
//!
//! Mux and kernel clock choices are carried as packed configuration
//! words: the selector register byte offset in bits 4.. and the source
//! value in the low bits. [`src_word`] and [`kernel_word`] build them;
//! the named `CLK_*` constants cover the common choices.

use crate::rcc;
use crate::rcc::RegOffset;
use crate::tree::Oscillator;

/// Build a system mux word: selector register offset plus source value.
pub const fn src_word(reg: RegOffset, src: u32) -> u32 {
    ((reg.byte() as u32) << 4) | src
}

/// Build a kernel clock word for a selector field in bits 3..0.
pub const fn kernel_word(reg: RegOffset, src: u32) -> u32 {
    ((reg.byte() as u32) << 4) | src
}

/// Build a kernel clock word for a selector field in bits 7..4.
pub const fn kernel_word_high(reg: RegOffset, src: u32) -> u32 {
    KERNEL_WORD_SHIFTED | ((reg.byte() as u32) << 4) | src
}

/// Flag marking a kernel word whose field and value sit four bits up.
pub const KERNEL_WORD_SHIFTED: u32 = 1 << 31;

pub const CLK_MPU_HSI: u32 = src_word(rcc::MPCKSELR, 0);
pub const CLK_MPU_HSE: u32 = src_word(rcc::MPCKSELR, 1);
pub const CLK_MPU_PLL1P: u32 = src_word(rcc::MPCKSELR, 2);
pub const CLK_MPU_PLL1P_DIV: u32 = src_word(rcc::MPCKSELR, 3);

pub const CLK_AXI_HSI: u32 = src_word(rcc::ASSCKSELR, 0);
pub const CLK_AXI_HSE: u32 = src_word(rcc::ASSCKSELR, 1);
pub const CLK_AXI_PLL2P: u32 = src_word(rcc::ASSCKSELR, 2);

pub const CLK_MCU_HSI: u32 = src_word(rcc::MSSCKSELR, 0);
pub const CLK_MCU_HSE: u32 = src_word(rcc::MSSCKSELR, 1);
pub const CLK_MCU_CSI: u32 = src_word(rcc::MSSCKSELR, 2);
pub const CLK_MCU_PLL3P: u32 = src_word(rcc::MSSCKSELR, 3);

pub const CLK_PLL12_HSI: u32 = src_word(rcc::RCK12SELR, 0);
pub const CLK_PLL12_HSE: u32 = src_word(rcc::RCK12SELR, 1);

pub const CLK_PLL3_HSI: u32 = src_word(rcc::RCK3SELR, 0);
pub const CLK_PLL3_HSE: u32 = src_word(rcc::RCK3SELR, 1);
pub const CLK_PLL3_CSI: u32 = src_word(rcc::RCK3SELR, 2);

pub const CLK_PLL4_HSI: u32 = src_word(rcc::RCK4SELR, 0);
pub const CLK_PLL4_HSE: u32 = src_word(rcc::RCK4SELR, 1);
pub const CLK_PLL4_CSI: u32 = src_word(rcc::RCK4SELR, 2);
pub const CLK_PLL4_I2SCKIN: u32 = src_word(rcc::RCK4SELR, 3);

pub const CLK_RTC_DISABLED: u32 = src_word(rcc::BDCR, 0);
pub const CLK_RTC_LSE: u32 = src_word(rcc::BDCR, 1);
pub const CLK_RTC_LSI: u32 = src_word(rcc::BDCR, 2);
pub const CLK_RTC_HSE: u32 = src_word(rcc::BDCR, 3);

/// MCO words carry the source in bits 2..0; bit 3 disables the output.
pub const CLK_MCO_DISABLED_FLAG: u32 = 0x8;
pub const CLK_MCO1_HSI: u32 = src_word(rcc::MCO1CFGR, 0);
pub const CLK_MCO1_HSE: u32 = src_word(rcc::MCO1CFGR, 1);
pub const CLK_MCO1_CSI: u32 = src_word(rcc::MCO1CFGR, 2);
pub const CLK_MCO1_LSI: u32 = src_word(rcc::MCO1CFGR, 3);
pub const CLK_MCO1_LSE: u32 = src_word(rcc::MCO1CFGR, 4);
pub const CLK_MCO1_DISABLED: u32 = src_word(rcc::MCO1CFGR, CLK_MCO_DISABLED_FLAG);
pub const CLK_MCO2_MPU: u32 = src_word(rcc::MCO2CFGR, 0);
pub const CLK_MCO2_AXI: u32 = src_word(rcc::MCO2CFGR, 1);
pub const CLK_MCO2_MCU: u32 = src_word(rcc::MCO2CFGR, 2);
pub const CLK_MCO2_PLL4: u32 = src_word(rcc::MCO2CFGR, 3);
pub const CLK_MCO2_HSE: u32 = src_word(rcc::MCO2CFGR, 4);
pub const CLK_MCO2_HSI: u32 = src_word(rcc::MCO2CFGR, 5);
pub const CLK_MCO2_DISABLED: u32 = src_word(rcc::MCO2CFGR, CLK_MCO_DISABLED_FLAG);

pub const CLK_CKPER_HSI: u32 = kernel_word(rcc::CPERCKSELR, 0);
pub const CLK_CKPER_CSI: u32 = kernel_word(rcc::CPERCKSELR, 1);
pub const CLK_CKPER_HSE: u32 = kernel_word(rcc::CPERCKSELR, 2);
pub const CLK_CKPER_DISABLED: u32 = kernel_word(rcc::CPERCKSELR, 3);

pub const CLK_STGEN_HSI: u32 = kernel_word(rcc::STGENCKSELR, 0);
pub const CLK_STGEN_HSE: u32 = kernel_word(rcc::STGENCKSELR, 1);
pub const CLK_I2C46_PCLK5: u32 = kernel_word(rcc::I2C46CKSELR, 0);
pub const CLK_SPI6_PCLK5: u32 = kernel_word(rcc::SPI6CKSELR, 0);
pub const CLK_UART1_PCLK5: u32 = kernel_word(rcc::UART1CKSELR, 0);
pub const CLK_RNG1_CSI: u32 = kernel_word(rcc::RNG1CKSELR, 0);
pub const CLK_RNG1_LSI: u32 = kernel_word(rcc::RNG1CKSELR, 3);
pub const CLK_UART24_HSI: u32 = kernel_word(rcc::UART24CKSELR, 2);
pub const CLK_UART35_HSI: u32 = kernel_word(rcc::UART35CKSELR, 2);
pub const CLK_UART6_HSI: u32 = kernel_word(rcc::UART6CKSELR, 2);
pub const CLK_UART78_HSI: u32 = kernel_word(rcc::UART78CKSELR, 2);
pub const CLK_SDMMC12_PLL4P: u32 = kernel_word(rcc::SDMMC12CKSELR, 2);
pub const CLK_SDMMC3_PLL4P: u32 = kernel_word(rcc::SDMMC3CKSELR, 2);
pub const CLK_QSPI_ACLK: u32 = kernel_word(rcc::QSPICKSELR, 0);
pub const CLK_FMC_ACLK: u32 = kernel_word(rcc::FMCCKSELR, 0);
pub const CLK_USBPHY_HSE: u32 = kernel_word(rcc::USBCKSELR, 0);
pub const CLK_USBPHY_PLL4R: u32 = kernel_word(rcc::USBCKSELR, 1);
pub const CLK_USBPHY_HSE_DIV2: u32 = kernel_word(rcc::USBCKSELR, 2);
pub const CLK_USBO_PLL4R: u32 = kernel_word_high(rcc::USBCKSELR, 0);
pub const CLK_USBO_USBPHY48: u32 = kernel_word_high(rcc::USBCKSELR, 1);

/// One oscillator slot of the board descriptor. An absent oscillator
/// (`present == false`) is left untouched and reports a 0 Hz rate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OscillatorSettings {
    pub present: bool,
    pub frequency_hz: u64,
    pub bypass: bool,
    pub digital_bypass: bool,
    pub css: bool,
    /// LSE only: crystal drive strength, 0 (lowest) to 3 (highest).
    pub drive: u32,
}

impl OscillatorSettings {
    pub const OFF: Self = OscillatorSettings {
        present: false,
        frequency_hz: 0,
        bypass: false,
        digital_bypass: false,
        css: false,
        drive: 0,
    };

    pub const fn crystal(frequency_hz: u64) -> Self {
        OscillatorSettings {
            present: true,
            frequency_hz,
            bypass: false,
            digital_bypass: false,
            css: false,
            drive: 0,
        }
    }
}

/// The six clock inputs of the SoC.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OscillatorBank {
    pub hsi: OscillatorSettings,
    pub hse: OscillatorSettings,
    pub csi: OscillatorSettings,
    pub lsi: OscillatorSettings,
    pub lse: OscillatorSettings,
    pub i2s_ckin: OscillatorSettings,
}

impl OscillatorBank {
    pub(crate) fn get(&self, osc: Oscillator) -> &OscillatorSettings {
        match osc {
            Oscillator::Hsi => &self.hsi,
            Oscillator::Hse => &self.hse,
            Oscillator::Csi => &self.csi,
            Oscillator::Lsi => &self.lsi,
            Oscillator::Lse => &self.lse,
            Oscillator::I2sCkin => &self.i2s_ckin,
        }
    }
}

/// System mux configuration words (`CLK_*` constants above).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClockSourceWords {
    pub mpu: u32,
    pub axi: u32,
    pub mcu: u32,
    pub pll12: u32,
    pub pll3: u32,
    pub pll4: u32,
    pub rtc: u32,
    pub mco1: u32,
    pub mco2: u32,
}

/// Raw divider field values for the bus prescaler registers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClockDividerWords {
    pub mpu: u32,
    pub axi: u32,
    pub mcu: u32,
    pub apb1: u32,
    pub apb2: u32,
    pub apb3: u32,
    pub apb4: u32,
    pub apb5: u32,
    pub rtc: u32,
    pub mco1: u32,
    pub mco2: u32,
}

/// PLL divider set. `output` is the P/Q/R enable mask built with
/// [`pll_outputs`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PllDividers {
    pub m: u32,
    pub n: u32,
    pub p: u32,
    pub q: u32,
    pub r: u32,
    pub output: u32,
}

/// Build the P/Q/R output enable mask of [`PllDividers::output`].
pub const fn pll_outputs(p: bool, q: bool, r: bool) -> u32 {
    (p as u32) | ((q as u32) << 1) | ((r as u32) << 2)
}

/// Clock spreading generator settings for one PLL.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CsgSettings {
    pub mod_per: u32,
    pub inc_step: u32,
    pub sscg_mode: u32,
}

/// Full configuration of one PLL: dividers, fractional part and the
/// optional spreading generator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PllSettings {
    pub dividers: PllDividers,
    pub frac: u32,
    pub csg: Option<CsgSettings>,
}

/// The whole board clock topology consumed by bring-up.
#[derive(Clone, Copy, Debug)]
pub struct Topology<'a> {
    /// Whether RCC registers are restricted to the secure world.
    pub rcc_secure: bool,
    /// Whether the MCU subsystem clocking stays under secure control.
    pub mckprot: bool,
    pub osc: OscillatorBank,
    pub clksrc: ClockSourceWords,
    pub clkdiv: ClockDividerWords,
    /// PLL1..PLL4. `None` leaves the PLL stopped.
    pub pll: [Option<PllSettings>; 4],
    /// Kernel clock words applied at the end of bring-up.
    pub kernel_words: &'a [u32],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_encoding_matches_the_binding_layout() {
        assert_eq!(CLK_MPU_PLL1P, 0x0202);
        assert_eq!(CLK_AXI_PLL2P, 0x0242);
        assert_eq!(CLK_PLL12_HSE, 0x0281);
        assert_eq!(CLK_MCU_HSI, 0x0480);
        assert_eq!(CLK_RTC_LSE, 0x1401);
        assert_eq!(CLK_CKPER_DISABLED, 0x0D03);
        assert_eq!(CLK_USBO_USBPHY48, 0x8000_91C1);
    }

    #[test]
    fn output_mask_packs_p_q_r_bits() {
        assert_eq!(pll_outputs(true, false, false), 0x1);
        assert_eq!(pll_outputs(true, true, true), 0x7);
        assert_eq!(pll_outputs(false, false, true), 0x4);
    }
}
