// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2024.

//! Cold and warm boot bring-up of the clock tree.
//!
//! [`ClockController::init`] walks the board [`Topology`] in a fixed
//! order: secure the block, raise the oscillators, park the system
//! clocks on HSI, restart the PLLs and only then move the system and
//! kernel clocks to their final sources. An MPU-only warm reset keeps
//! PLL3/PLL4 running when their registers already match the topology,
//! and a USB boot adopts the PLL4 setup the bootrom left behind.

use crate::config::{self, Topology};
use crate::platform::Error;
use crate::rcc;
use crate::rcc::RegOffset;
use crate::tree::{ClockId, Parent};

use super::pll::PllId;
use super::ClockController;

const PLL_IDS: [PllId; 4] = [PllId::Pll1, PllId::Pll2, PllId::Pll3, PllId::Pll4];

const USB_BOOT_SRC_MASK: u32 = rcc::USBCKSELR_USBPHYSRC_MASK | rcc::USBCKSELR_USBOSRC;

impl<'a> ClockController<'a> {
    /// Bring the clock tree to the state the topology describes. When
    /// the topology carries no PLL1 node, `pll1_khz` names the target
    /// MPU frequency and the settings are taken from the operating
    /// point table or solved on the spot.
    pub fn init(&mut self, topo: &Topology, pll1_khz: Option<u32>) -> Result<(), Error> {
        // Parents as the bootrom left them, read before anything moves.
        let stgen_parent = self.parent_of(ClockId::Stgen);
        let usbphy_parent = self.parent_of(ClockId::Usbphy);

        // TZEN and MCKPROT are reset defaults; init only ever lifts
        // protection, it never raises it.
        if !topo.rcc_secure {
            self.rcc.write(rcc::TZCR, 0);
        } else if !topo.mckprot {
            self.rcc.clear_bits(rcc::TZCR, rcc::TZCR_MCKPROT);
        }

        let mut pll = topo.pll;
        if pll[PllId::Pll1.index()].is_none() {
            if let Some(khz) = pll1_khz {
                pll[PllId::Pll1.index()] =
                    Some(self.pll1_settings_for_khz(topo.clksrc.pll12, khz)?);
            }
        }

        self.mco_configure(topo.clksrc.mco1, topo.clkdiv.mco1);
        self.mco_configure(topo.clksrc.mco2, topo.clkdiv.mco2);

        // HSI is already running from the bootrom. CSI is kept on in
        // all cases, the I/O compensation cell needs it.
        if topo.osc.lsi.present {
            self.osc.set_lsi(true)?;
        }
        if topo.osc.lse.present {
            self.osc.enable_lse(&topo.osc.lse);
        }
        if topo.osc.hse.present {
            self.osc.enable_hse(&topo.osc.hse)?;
        }
        self.osc.set_csi(true)?;

        // Park the system clocks on HSI while the PLLs move.
        self.set_clksrc(config::CLK_MPU_HSI)?;
        self.set_clksrc(config::CLK_AXI_HSI)?;
        self.set_clksrc(config::CLK_MCU_HSI)?;

        let mut pll3_preserve = false;
        let mut pll4_preserve = false;
        if self.rcc.read(rcc::MP_RSTSCLRR) & rcc::RSTSCLRR_MPUP0RSTF != 0 {
            pll3_preserve = pll[PllId::Pll3.index()]
                .map_or(false, |s| {
                    self.pll
                        .matches(PllId::Pll3, topo.clksrc.pll3, &s, &self.osc_hz)
                });
            pll4_preserve = pll[PllId::Pll4.index()]
                .map_or(false, |s| {
                    self.pll
                        .matches(PllId::Pll4, topo.clksrc.pll4, &s, &self.osc_hz)
                });
        }

        // The bootrom drives the boot interface from PLL4 on a USB
        // boot, leave the PLL alone and check later that the topology
        // agrees on the USB clock path.
        let pll4_bootrom = self.platform.boot_on_usb()
            && (stgen_parent == Ok(Parent::Pll4R) || usbphy_parent == Ok(Parent::Pll4R));
        if pll4_bootrom {
            pll4_preserve = true;
        }

        for id in PLL_IDS {
            if (id == PllId::Pll3 && pll3_preserve) || (id == PllId::Pll4 && pll4_preserve) {
                continue;
            }
            self.pll.stop(id)?;
        }

        if topo.osc.hsi.present {
            self.osc.apply_hsi_frequency(topo.osc.hsi.frequency_hz)?;
            self.platform.stgen_update(self.rate_of(ClockId::Stgen));
        }

        // No divider handshake on the MPU register while MPUDIV is
        // disabled, nor on the RTC divider.
        self.rcc
            .write(rcc::MPCKDIVR, topo.clkdiv.mpu & rcc::DIVR_DIV_MASK);
        self.set_clkdiv(topo.clkdiv.axi, rcc::AXIDIVR)?;
        self.set_clkdiv(topo.clkdiv.apb4, rcc::APB4DIVR)?;
        self.set_clkdiv(topo.clkdiv.apb5, rcc::APB5DIVR)?;
        self.set_clkdiv(topo.clkdiv.mcu, rcc::MCUDIVR)?;
        self.set_clkdiv(topo.clkdiv.apb1, rcc::APB1DIVR)?;
        self.set_clkdiv(topo.clkdiv.apb2, rcc::APB2DIVR)?;
        self.set_clkdiv(topo.clkdiv.apb3, rcc::APB3DIVR)?;
        self.rcc
            .write(rcc::RTCDIVR, topo.clkdiv.rtc & rcc::DIVR_DIV_MASK);

        self.set_clksrc(topo.clksrc.pll12)?;
        if !pll3_preserve {
            self.set_clksrc(topo.clksrc.pll3)?;
        }
        if !pll4_preserve {
            self.set_clksrc(topo.clksrc.pll4)?;
        }

        for (id, settings) in PLL_IDS.iter().zip(pll.iter()) {
            if (*id == PllId::Pll3 && pll3_preserve)
                || (*id == PllId::Pll4 && pll4_preserve && !pll4_bootrom)
            {
                continue;
            }
            let Some(settings) = settings else {
                continue;
            };
            if *id == PllId::Pll4 && pll4_bootrom {
                // Only the output dividers the bootrom did not program.
                self.pll.config_output(*id, &settings.dividers);
                continue;
            }
            self.pll.config(*id, settings, self.pll_refclk_hz(*id))?;
            if let Some(csg) = settings.csg.as_ref() {
                self.pll.csg(*id, csg);
            }
            self.pll.start(*id);
        }
        for (id, settings) in PLL_IDS.iter().zip(pll.iter()) {
            let Some(settings) = settings else {
                continue;
            };
            self.pll.enable_outputs(*id, settings.dividers.output)?;
        }

        if topo.osc.lse.present {
            self.osc.wait_lse_ready()?;
        }

        self.set_clksrc(topo.clksrc.mpu)?;
        self.set_clksrc(topo.clksrc.axi)?;
        self.set_clksrc(topo.clksrc.mcu)?;
        self.set_rtcsrc(topo.clksrc.rtc, topo.osc.lse.present && topo.osc.lse.css);

        let usb_boot_sel = if pll4_bootrom {
            self.rcc.read(rcc::USBCKSELR) & USB_BOOT_SRC_MASK
        } else {
            0
        };

        // CK_PER may still feed FMC and QSPI; turn it off only after
        // every other kernel clock moved.
        let mut ckper_disabled = false;
        for &word in topo.kernel_words {
            if word == config::CLK_CKPER_DISABLED {
                ckper_disabled = true;
                continue;
            }
            self.kernel_clock_config(word);
        }
        if ckper_disabled {
            self.kernel_clock_config(config::CLK_CKPER_DISABLED);
        }

        if pll4_bootrom {
            let usb_sel = self.rcc.read(rcc::USBCKSELR) & USB_BOOT_SRC_MASK;
            if usb_sel != usb_boot_sel {
                log::error!(
                    "USB clock path {:#x} differs from the bootrom's {:#x}",
                    usb_sel,
                    usb_boot_sel
                );
                return Err(Error::BadValue);
            }
        }

        if !topo.osc.hsi.present {
            self.osc.set_hsi(false)?;
        }
        self.platform.stgen_update(self.rate_of(ClockId::Stgen));

        // Keep the DDR interface in software self-refresh until the
        // DDR controller is up.
        self.rcc.modify(
            rcc::DDRITFCR,
            rcc::DDRITFCR_DDRCKMOD_MASK,
            rcc::DDRITFCR_DDRCKMOD_SSR << rcc::DDRITFCR_DDRCKMOD_SHIFT,
        );

        Ok(())
    }

    /// Program a system mux from a packed source word and wait for the
    /// selector handshake.
    pub(crate) fn set_clksrc(&self, word: u32) -> Result<(), Error> {
        let reg = RegOffset::new(((word >> 4) & 0xFFF) as u16);
        self.rcc
            .modify(reg, rcc::SELR_SRC_MASK, word & rcc::SELR_SRC_MASK);
        self.rcc.poll_bits(
            self.platform,
            reg,
            rcc::SELR_SRCRDY,
            rcc::SELR_SRCRDY,
            rcc::CLKSRC_TIMEOUT_US,
        )
    }

    /// Program a bus divider field and wait for the divider handshake.
    pub(crate) fn set_clkdiv(&self, div: u32, reg: RegOffset) -> Result<(), Error> {
        self.rcc
            .modify(reg, rcc::DIVR_DIV_MASK, div & rcc::DIVR_DIV_MASK);
        self.rcc.poll_bits(
            self.platform,
            reg,
            rcc::DIVR_DIVRDY,
            rcc::DIVR_DIVRDY,
            rcc::CLKDIV_TIMEOUT_US,
        )
    }

    fn mco_configure(&self, word: u32, div: u32) {
        let reg = RegOffset::new(((word >> 4) & 0xFFF) as u16);
        if word & config::CLK_MCO_DISABLED_FLAG != 0 {
            self.rcc.clear_bits(reg, rcc::MCOCFGR_MCOON);
        } else {
            self.rcc
                .modify(reg, rcc::MCOCFGR_MCOSEL_MASK, word & rcc::MCOCFGR_MCOSEL_MASK);
            self.rcc.modify(
                reg,
                rcc::MCOCFGR_MCODIV_MASK,
                (div << rcc::MCOCFGR_MCODIV_SHIFT) & rcc::MCOCFGR_MCODIV_MASK,
            );
            self.rcc.set_bits(reg, rcc::MCOCFGR_MCOON);
        }
    }

    /// RTCSRC is write-once until the next backup domain reset, so it
    /// is only touched when the RTC clock is off or being disabled.
    fn set_rtcsrc(&self, word: u32, lse_css: bool) {
        if self.rcc.read(rcc::BDCR) & rcc::BDCR_RTCCKEN == 0 || word != config::CLK_RTC_DISABLED {
            self.rcc.modify(
                rcc::BDCR,
                rcc::BDCR_RTCSRC_MASK,
                (word & rcc::SELR_SRC_MASK) << rcc::BDCR_RTCSRC_SHIFT,
            );
            self.rcc.set_bits(rcc::BDCR, rcc::BDCR_RTCCKEN);
        }
        if lse_css {
            self.osc.set_lse_css();
        }
    }

    /// Apply one packed kernel clock word. Bit 31 marks a selector
    /// field living in bits 7..4 instead of 3..0.
    pub(crate) fn kernel_clock_config(&self, word: u32) {
        let reg = RegOffset::new(((word >> 4) & 0xFFF) as u16);
        let mut mask = 0xF;
        let mut value = word & 0xF;
        if word & config::KERNEL_WORD_SHIFTED != 0 {
            mask <<= 4;
            value <<= 4;
        }
        self.rcc.modify(reg, mask, value);
    }
}

#[cfg(test)]
mod tests {
    use super::super::sim;
    use super::*;
    use crate::config::{
        pll_outputs, ClockDividerWords, ClockSourceWords, OscillatorSettings, PllDividers,
        PllSettings,
    };
    use super::super::opp::Pll1Settings;
    use crate::platform::Role;
    use crate::tree::Parent;

    fn board_topology(kernel_words: &[u32]) -> Topology<'_> {
        let mut osc = sim::default_osc_bank();
        osc.lse = OscillatorSettings::crystal(32_768);
        Topology {
            rcc_secure: true,
            mckprot: false,
            osc,
            clksrc: ClockSourceWords {
                mpu: config::CLK_MPU_PLL1P,
                axi: config::CLK_AXI_PLL2P,
                mcu: config::CLK_MCU_PLL3P,
                pll12: config::CLK_PLL12_HSE,
                pll3: config::CLK_PLL3_HSE,
                pll4: config::CLK_PLL4_HSE,
                rtc: config::CLK_RTC_LSE,
                mco1: config::CLK_MCO1_DISABLED,
                mco2: config::CLK_MCO2_DISABLED,
            },
            clkdiv: ClockDividerWords {
                apb1: 1,
                apb2: 1,
                apb3: 1,
                apb4: 1,
                apb5: 2,
                ..ClockDividerWords::default()
            },
            pll: [
                // 650 MHz MPU.
                Some(PllSettings {
                    dividers: PllDividers {
                        m: 2,
                        n: 80,
                        p: 0,
                        q: 0,
                        r: 0,
                        output: pll_outputs(true, false, false),
                    },
                    frac: 2048,
                    csg: None,
                }),
                // 266 MHz AXI.
                Some(PllSettings {
                    dividers: PllDividers {
                        m: 2,
                        n: 65,
                        p: 1,
                        q: 1,
                        r: 1,
                        output: pll_outputs(true, true, true),
                    },
                    frac: 4096,
                    csg: None,
                }),
                // 204 MHz MCU.
                Some(PllSettings {
                    dividers: PllDividers {
                        m: 1,
                        n: 33,
                        p: 1,
                        q: 1,
                        r: 1,
                        output: pll_outputs(true, true, true),
                    },
                    frac: 0,
                    csg: None,
                }),
                None,
            ],
            kernel_words,
        }
    }

    #[test]
    fn full_bring_up_lands_on_the_declared_tree() {
        let (mut ctl, platform) = sim::controller(Role::BringUp);
        let words = [
            config::CLK_STGEN_HSE,
            config::CLK_CKPER_DISABLED,
            config::CLK_UART24_HSI,
        ];
        let topo = board_topology(&words);
        ctl.probe(&topo.osc);
        ctl.rcc
            .write(rcc::TZCR, rcc::TZCR_TZEN | rcc::TZCR_MCKPROT);
        ctl.init(&topo, None).unwrap();

        assert_eq!(ctl.rcc.read(rcc::TZCR), rcc::TZCR_TZEN);
        assert_eq!(ctl.rcc.read(rcc::MPCKSELR) & rcc::SELR_SRC_MASK, 2);
        assert_eq!(ctl.rcc.read(rcc::ASSCKSELR) & rcc::SELR_SRC_MASK, 2);
        assert_eq!(ctl.rcc.read(rcc::MSSCKSELR) & rcc::SELR_SRC_MASK, 3);

        assert_eq!(ctl.parent_rate(Parent::CkMpu), 650_000_000);
        assert_eq!(ctl.rate_of(ClockId::CkAxi), 266_000_000);
        assert_eq!(ctl.rate_of(ClockId::CkMcu), 204_000_000);

        // RTC runs from LSE, CK_PER was parked last.
        let bdcr = ctl.rcc.read(rcc::BDCR);
        assert_ne!(bdcr & rcc::BDCR_RTCCKEN, 0);
        assert_eq!((bdcr & rcc::BDCR_RTCSRC_MASK) >> rcc::BDCR_RTCSRC_SHIFT, 1);
        assert_eq!(ctl.rcc.read(rcc::CPERCKSELR) & 0xF, 3);
        assert_eq!(ctl.rcc.read(rcc::UART24CKSELR) & 0xF, 2);

        // STGEN moved to HSE and the counter hook saw the new rate.
        assert_eq!(ctl.rcc.read(rcc::STGENCKSELR) & 0xF, 1);
        assert_eq!(platform.stgen_rate.get(), 24_000_000);

        // DDR parked in software self-refresh.
        assert_eq!(
            ctl.rcc.read(rcc::DDRITFCR) & rcc::DDRITFCR_DDRCKMOD_MASK,
            rcc::DDRITFCR_DDRCKMOD_SSR << rcc::DDRITFCR_DDRCKMOD_SHIFT
        );
    }

    #[test]
    fn warm_reset_with_a_running_pll3_reaches_the_declared_tree() {
        let (mut ctl, _) = sim::controller(Role::BringUp);
        let topo = board_topology(&[]);
        ctl.probe(&topo.osc);

        // PLL3 configured and running from the previous boot, MPU-only
        // reset flagged.
        ctl.rcc.write(rcc::RCK3SELR, 0x1);
        let pll3 = topo.pll[2].unwrap();
        ctl.pll.config(PllId::Pll3, &pll3, 24_000_000).unwrap();
        ctl.rcc.write(rcc::PLL3CR, rcc::PLLNCR_PLLON);
        ctl.rcc.write(rcc::MP_RSTSCLRR, rcc::RSTSCLRR_MPUP0RSTF);

        ctl.init(&topo, None).unwrap();

        assert_ne!(ctl.rcc.read(rcc::PLL3CR) & rcc::PLLNCR_PLLON, 0);
        assert_eq!(ctl.rcc.read(rcc::RCK3SELR) & rcc::SELR_SRC_MASK, 1);
        assert_eq!(ctl.rate_of(ClockId::CkMcu), 204_000_000);
    }

    #[test]
    fn usb_boot_refuses_a_diverging_usb_clock_path() {
        let (mut ctl, platform) = sim::controller(Role::BringUp);
        platform.usb_boot.set(true);
        let words = [config::CLK_USBPHY_PLL4R, config::CLK_USBO_PLL4R];
        let topo = board_topology(&words);
        ctl.probe(&topo.osc);

        // Bootrom left the OTG on USBPHY48, the topology wants PLL4_R.
        ctl.rcc.write(
            rcc::USBCKSELR,
            rcc::USBCKSELR_USBOSRC | 0x1,
        );
        assert_eq!(ctl.init(&topo, None), Err(Error::BadValue));
    }

    #[test]
    fn usb_boot_adopts_the_bootrom_pll4() {
        let (mut ctl, platform) = sim::controller(Role::BringUp);
        platform.usb_boot.set(true);
        let words = [config::CLK_USBPHY_PLL4R, config::CLK_USBO_PLL4R];
        let mut topo = board_topology(&words);
        // Declared PLL4 must not be applied over the bootrom's.
        topo.pll[3] = Some(PllSettings {
            dividers: PllDividers {
                m: 3,
                n: 98,
                p: 5,
                q: 7,
                r: 7,
                output: pll_outputs(true, true, true),
            },
            frac: 0,
            csg: None,
        });
        ctl.probe(&topo.osc);

        // Bootrom state: PLL4 running from HSI with its own dividers,
        // USB path already on PLL4_R.
        ctl.rcc.write(rcc::RCK4SELR, 0x0);
        ctl.rcc.write(
            rcc::PLL4CFGR1,
            (1 << rcc::PLLNCFGR1_DIVM_SHIFT) | 49,
        );
        ctl.rcc.write(rcc::PLL4CFGR2, 3 << rcc::PLLNCFGR2_DIVR_SHIFT);
        ctl.rcc
            .write(rcc::PLL4CR, rcc::PLLNCR_PLLON | rcc::PLLNCR_DIVREN);
        ctl.rcc.write(rcc::USBCKSELR, 0x1);

        ctl.init(&topo, None).unwrap();

        // Source and VCO untouched, outputs re-armed from the topology.
        assert_eq!(ctl.rcc.read(rcc::RCK4SELR) & rcc::SELR_SRC_MASK, 0);
        assert_eq!(
            ctl.rcc.read(rcc::PLL4CFGR1),
            (1 << rcc::PLLNCFGR1_DIVM_SHIFT) | 49
        );
        assert_eq!(
            ctl.rcc.read(rcc::USBCKSELR) & USB_BOOT_SRC_MASK,
            0x1
        );
    }

    #[test]
    fn bring_up_derives_pll1_from_a_target_frequency() {
        let (mut ctl, _) = sim::controller(Role::BringUp);
        let mut topo = board_topology(&[]);
        topo.pll[0] = None;
        ctl.probe(&topo.osc);

        ctl.init(&topo, Some(650_000)).unwrap();

        assert_ne!(ctl.rcc.read(rcc::PLL1CR) & rcc::PLLNCR_PLLON, 0);
        assert_eq!(ctl.parent_rate(Parent::CkMpu), 650_000_000);
    }

    #[test]
    fn bring_up_reuses_a_stashed_pll1_operating_point() {
        let (mut ctl, _) = sim::controller(Role::BringUp);
        let mut topo = board_topology(&[]);
        topo.pll[0] = None;
        ctl.probe(&topo.osc);

        // A solved 650 MHz slot with M=1, where the solver would pick
        // M=2: the divider field tells the two paths apart.
        let mut table = Pll1Settings::default();
        table.valid = true;
        table.freq_khz[0] = 650_000;
        table.dividers[0] = PllDividers {
            m: 1,
            n: 53,
            p: 0,
            q: 0,
            r: 0,
            output: pll_outputs(true, false, false),
        };
        table.frac[0] = 1365;
        ctl.restore_pll1_settings(table);

        // A frequency outside the table cannot be derived.
        assert_eq!(ctl.init(&topo, Some(123_456)), Err(Error::NotFound));

        ctl.init(&topo, Some(650_000)).unwrap();
        let cfgr1 = ctl.rcc.read(rcc::PLL1CFGR1);
        assert_eq!(
            (cfgr1 & rcc::PLLNCFGR1_DIVM_MASK) >> rcc::PLLNCFGR1_DIVM_SHIFT,
            1
        );
        assert_eq!(cfgr1 & rcc::PLLNCFGR1_DIVN_MASK, 53);
    }

    #[test]
    fn bring_up_only_lifts_trustzone_protection() {
        let (mut ctl, _) = sim::controller(Role::BringUp);
        let mut topo = board_topology(&[]);
        ctl.probe(&topo.osc);

        // Reset state: fully protected. The secure descriptor without
        // mckprot drops only the MCU subsystem protection.
        ctl.rcc
            .write(rcc::TZCR, rcc::TZCR_TZEN | rcc::TZCR_MCKPROT);
        ctl.init(&topo, None).unwrap();
        assert_eq!(ctl.rcc.read(rcc::TZCR), rcc::TZCR_TZEN);

        topo.rcc_secure = false;
        ctl.rcc
            .write(rcc::TZCR, rcc::TZCR_TZEN | rcc::TZCR_MCKPROT);
        ctl.init(&topo, None).unwrap();
        assert_eq!(ctl.rcc.read(rcc::TZCR), 0);
    }
}
