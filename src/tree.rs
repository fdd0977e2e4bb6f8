// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2024.

//! Static description of the STM32MP15x clock tree: consumer clock
//! identities, gate table and kernel mux table.

use crate::rcc;
use crate::rcc::RegOffset;

/// The clock inputs of the SoC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Oscillator {
    Hsi,
    Hse,
    Csi,
    Lsi,
    Lse,
    I2sCkin,
}

pub const NB_OSC: usize = 6;

impl Oscillator {
    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

/// Internal parent identity of a clock, the nodes of the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parent {
    Hsi,
    Hse,
    Csi,
    Lsi,
    Lse,
    I2sCkin,
    HsiKer,
    HseKer,
    HseKerDiv2,
    HseRtc,
    CsiKer,
    Pll1P,
    Pll1Q,
    Pll1R,
    Pll2P,
    Pll2Q,
    Pll2R,
    Pll3P,
    Pll3Q,
    Pll3R,
    Pll4P,
    Pll4Q,
    Pll4R,
    Aclk,
    Pclk1,
    Pclk2,
    Pclk3,
    Pclk4,
    Pclk5,
    Hclk2,
    Hclk6,
    CkPer,
    CkMpu,
    CkMcu,
    /// Fixed 48 MHz clock the bootrom leaves behind for the USB PHY.
    UsbPhy48,
    /// Mux slot without a usable parent (for example RTC source off).
    Unknown,
}

/// Consumer-visible clock identities.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockId {
    // Oscillator outputs.
    CkHse,
    CkCsi,
    CkLsi,
    CkLse,
    CkHsi,
    CkHseDiv2,
    // PLL outputs.
    Pll1P,
    Pll1Q,
    Pll1R,
    Pll2P,
    Pll2Q,
    Pll2R,
    Pll3P,
    Pll3Q,
    Pll3R,
    Pll4P,
    Pll4Q,
    Pll4R,
    // System clocks.
    CkPer,
    CkMpu,
    CkAxi,
    CkMcu,
    Rtc,
    CkDbg,
    // DDR interface gates.
    Ddrc1,
    Ddrc1Lp,
    Ddrc2,
    Ddrc2Lp,
    Ddrphyc,
    DdrphycLp,
    Ddrcapb,
    DdrcapbLp,
    Axidcg,
    Ddrphycapb,
    DdrphycapbLp,
    // APB1 peripherals.
    Tim12,
    Usart2,
    Usart3,
    Uart4,
    Uart5,
    Uart7,
    Uart8,
    // APB2 peripherals.
    Tim15,
    Usart6,
    // APB3 peripherals.
    Syscfg,
    // APB4 peripherals.
    LtdcPx,
    Ddrperfm,
    Iwdg2,
    Usbphy,
    // APB5 (secure) peripherals.
    Spi6,
    I2c4,
    I2c6,
    Usart1,
    Rtcapb,
    Tzc1,
    Tzc2,
    Tzpc,
    Iwdg1,
    Bsec,
    Stgen,
    // AHB2 peripherals.
    Dma1,
    Dma2,
    Usbo,
    Sdmmc3,
    // AHB4 GPIO banks.
    GpioA,
    GpioB,
    GpioC,
    GpioD,
    GpioE,
    GpioF,
    GpioG,
    GpioH,
    GpioI,
    GpioJ,
    GpioK,
    // AHB5 (secure) peripherals.
    GpioZ,
    Cryp1,
    Hash1,
    Rng1,
    Bkpsram,
    // TZAHB6 peripherals.
    Mdma,
    // AHB6 peripherals.
    Gpu,
    Ethmac,
    Fmc,
    Qspi,
    Sdmmc1,
    Sdmmc2,
    Usbh,
}

/// Kernel and system clock muxes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MuxId {
    I2c12,
    I2c35,
    Stgen,
    I2c46,
    Spi6,
    Usart1,
    Rng1,
    Uart6,
    Uart24,
    Uart35,
    Uart78,
    Sdmmc12,
    Sdmmc3,
    Qspi,
    Fmc,
    Axiss,
    Mcuss,
    Usbphy,
    Usbo,
    Rtc,
    Mpu,
    Per,
}

/// One mux: selector register, field position and parent slots.
#[derive(Clone, Copy)]
pub(crate) struct Mux {
    pub reg: RegOffset,
    pub shift: u32,
    /// Field mask, already shifted down to bit 0.
    pub mask: u32,
    pub parents: &'static [Parent],
}

impl MuxId {
    pub(crate) const fn descriptor(self) -> Mux {
        use Parent::*;
        match self {
            MuxId::I2c12 => Mux {
                reg: rcc::I2C12CKSELR,
                shift: 0,
                mask: 0x7,
                parents: &[Pclk1, Pll4R, HsiKer, CsiKer],
            },
            MuxId::I2c35 => Mux {
                reg: rcc::I2C35CKSELR,
                shift: 0,
                mask: 0x7,
                parents: &[Pclk1, Pll4R, HsiKer, CsiKer],
            },
            MuxId::Stgen => Mux {
                reg: rcc::STGENCKSELR,
                shift: 0,
                mask: 0x3,
                parents: &[HsiKer, HseKer],
            },
            MuxId::I2c46 => Mux {
                reg: rcc::I2C46CKSELR,
                shift: 0,
                mask: 0x7,
                parents: &[Pclk5, Pll3Q, HsiKer, CsiKer],
            },
            MuxId::Spi6 => Mux {
                reg: rcc::SPI6CKSELR,
                shift: 0,
                mask: 0x7,
                parents: &[Pclk5, Pll4Q, HsiKer, CsiKer, HseKer, Pll3Q],
            },
            MuxId::Usart1 => Mux {
                reg: rcc::UART1CKSELR,
                shift: 0,
                mask: 0x7,
                parents: &[Pclk5, Pll3Q, HsiKer, CsiKer, Pll4Q, HseKer],
            },
            MuxId::Rng1 => Mux {
                reg: rcc::RNG1CKSELR,
                shift: 0,
                mask: 0x3,
                parents: &[Csi, Pll4R, Lse, Lsi],
            },
            MuxId::Uart6 => Mux {
                reg: rcc::UART6CKSELR,
                shift: 0,
                mask: 0x7,
                parents: &[Pclk2, Pll4Q, HsiKer, CsiKer, HseKer],
            },
            MuxId::Uart24 => Mux {
                reg: rcc::UART24CKSELR,
                shift: 0,
                mask: 0x7,
                parents: &[Pclk1, Pll4Q, HsiKer, CsiKer, HseKer],
            },
            MuxId::Uart35 => Mux {
                reg: rcc::UART35CKSELR,
                shift: 0,
                mask: 0x7,
                parents: &[Pclk1, Pll4Q, HsiKer, CsiKer, HseKer],
            },
            MuxId::Uart78 => Mux {
                reg: rcc::UART78CKSELR,
                shift: 0,
                mask: 0x7,
                parents: &[Pclk1, Pll4Q, HsiKer, CsiKer, HseKer],
            },
            MuxId::Sdmmc12 => Mux {
                reg: rcc::SDMMC12CKSELR,
                shift: 0,
                mask: 0x7,
                parents: &[Hclk6, Pll3R, Pll4P, HsiKer],
            },
            MuxId::Sdmmc3 => Mux {
                reg: rcc::SDMMC3CKSELR,
                shift: 0,
                mask: 0x7,
                parents: &[Hclk2, Pll3R, Pll4P, HsiKer],
            },
            MuxId::Qspi => Mux {
                reg: rcc::QSPICKSELR,
                shift: 0,
                mask: 0x3,
                parents: &[Aclk, Pll3R, Pll4P, CkPer],
            },
            MuxId::Fmc => Mux {
                reg: rcc::FMCCKSELR,
                shift: 0,
                mask: 0x3,
                parents: &[Aclk, Pll3R, Pll4P, CkPer],
            },
            MuxId::Axiss => Mux {
                reg: rcc::ASSCKSELR,
                shift: 0,
                mask: 0x3,
                parents: &[Hsi, Hse, Pll2P],
            },
            MuxId::Mcuss => Mux {
                reg: rcc::MSSCKSELR,
                shift: 0,
                mask: 0x3,
                parents: &[Hsi, Hse, Csi, Pll3P],
            },
            MuxId::Usbphy => Mux {
                reg: rcc::USBCKSELR,
                shift: 0,
                mask: 0x3,
                parents: &[HseKer, Pll4R, HseKerDiv2],
            },
            MuxId::Usbo => Mux {
                reg: rcc::USBCKSELR,
                shift: 4,
                mask: 0x1,
                parents: &[Pll4R, UsbPhy48],
            },
            MuxId::Rtc => Mux {
                reg: rcc::BDCR,
                shift: rcc::BDCR_RTCSRC_SHIFT,
                mask: 0x3,
                parents: &[Unknown, Lse, Lsi, HseRtc],
            },
            MuxId::Mpu => Mux {
                reg: rcc::MPCKSELR,
                shift: 0,
                mask: 0x3,
                parents: &[Hsi, Hse, Pll1P, Pll1P],
            },
            MuxId::Per => Mux {
                reg: rcc::CPERCKSELR,
                shift: 0,
                mask: 0x3,
                parents: &[HsiKer, CsiKer, HseKer],
            },
        }
    }
}

/// Where a gated clock takes its rate from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum GateParent {
    Fixed(Parent),
    Mux(MuxId),
    Unknown,
}

/// One entry of the gate table.
#[derive(Clone, Copy)]
pub(crate) struct Gate {
    pub id: ClockId,
    pub reg: RegOffset,
    pub bit: u32,
    /// Whether `reg` is a set register with an ENCLRR companion.
    pub set_clr: bool,
    pub secure: bool,
    pub parent: GateParent,
}

pub(crate) const SEC: bool = true;
pub(crate) const N_S: bool = false;

const fn fixed(secure: bool, reg: RegOffset, bit: u32, id: ClockId, parent: Parent) -> Gate {
    Gate {
        id,
        reg,
        bit,
        set_clr: false,
        secure,
        parent: GateParent::Fixed(parent),
    }
}

const fn selec(secure: bool, reg: RegOffset, bit: u32, id: ClockId, mux: MuxId) -> Gate {
    Gate {
        id,
        reg,
        bit,
        set_clr: false,
        secure,
        parent: GateParent::Mux(mux),
    }
}

const fn unknown(secure: bool, reg: RegOffset, bit: u32, id: ClockId) -> Gate {
    Gate {
        id,
        reg,
        bit,
        set_clr: false,
        secure,
        parent: GateParent::Unknown,
    }
}

const fn sc_fixed(secure: bool, reg: RegOffset, bit: u32, id: ClockId, parent: Parent) -> Gate {
    Gate {
        id,
        reg,
        bit,
        set_clr: true,
        secure,
        parent: GateParent::Fixed(parent),
    }
}

const fn sc_selec(secure: bool, reg: RegOffset, bit: u32, id: ClockId, mux: MuxId) -> Gate {
    Gate {
        id,
        reg,
        bit,
        set_clr: true,
        secure,
        parent: GateParent::Mux(mux),
    }
}

const fn sc_unknown(secure: bool, reg: RegOffset, bit: u32, id: ClockId) -> Gate {
    Gate {
        id,
        reg,
        bit,
        set_clr: true,
        secure,
        parent: GateParent::Unknown,
    }
}

pub(crate) const GATE_COUNT: usize = 66;

#[rustfmt::skip]
pub(crate) static GATES: [Gate; GATE_COUNT] = [
    fixed(SEC, rcc::DDRITFCR, 0, ClockId::Ddrc1, Parent::Aclk),
    fixed(SEC, rcc::DDRITFCR, 1, ClockId::Ddrc1Lp, Parent::Aclk),
    fixed(SEC, rcc::DDRITFCR, 2, ClockId::Ddrc2, Parent::Aclk),
    fixed(SEC, rcc::DDRITFCR, 3, ClockId::Ddrc2Lp, Parent::Aclk),
    fixed(SEC, rcc::DDRITFCR, 4, ClockId::Ddrphyc, Parent::Pll2R),
    fixed(SEC, rcc::DDRITFCR, 5, ClockId::DdrphycLp, Parent::Pll2R),
    fixed(SEC, rcc::DDRITFCR, 6, ClockId::Ddrcapb, Parent::Pclk4),
    fixed(SEC, rcc::DDRITFCR, 7, ClockId::DdrcapbLp, Parent::Pclk4),
    fixed(SEC, rcc::DDRITFCR, 8, ClockId::Axidcg, Parent::Aclk),
    fixed(SEC, rcc::DDRITFCR, 9, ClockId::Ddrphycapb, Parent::Pclk4),
    fixed(SEC, rcc::DDRITFCR, 10, ClockId::DdrphycapbLp, Parent::Pclk4),

    sc_fixed(N_S, rcc::MP_APB1ENSETR, 6, ClockId::Tim12, Parent::Pclk1),
    sc_selec(N_S, rcc::MP_APB1ENSETR, 14, ClockId::Usart2, MuxId::Uart24),
    sc_selec(N_S, rcc::MP_APB1ENSETR, 15, ClockId::Usart3, MuxId::Uart35),
    sc_selec(N_S, rcc::MP_APB1ENSETR, 16, ClockId::Uart4, MuxId::Uart24),
    sc_selec(N_S, rcc::MP_APB1ENSETR, 17, ClockId::Uart5, MuxId::Uart35),
    sc_selec(N_S, rcc::MP_APB1ENSETR, 18, ClockId::Uart7, MuxId::Uart78),
    sc_selec(N_S, rcc::MP_APB1ENSETR, 19, ClockId::Uart8, MuxId::Uart78),

    sc_fixed(N_S, rcc::MP_APB2ENSETR, 2, ClockId::Tim15, Parent::Pclk2),
    sc_selec(N_S, rcc::MP_APB2ENSETR, 13, ClockId::Usart6, MuxId::Uart6),

    sc_unknown(N_S, rcc::MP_APB3ENSETR, 11, ClockId::Syscfg),

    sc_unknown(N_S, rcc::MP_APB4ENSETR, 0, ClockId::LtdcPx),
    sc_unknown(N_S, rcc::MP_APB4ENSETR, 8, ClockId::Ddrperfm),
    sc_unknown(N_S, rcc::MP_APB4ENSETR, 15, ClockId::Iwdg2),
    sc_selec(N_S, rcc::MP_APB4ENSETR, 16, ClockId::Usbphy, MuxId::Usbphy),

    sc_selec(SEC, rcc::MP_APB5ENSETR, 0, ClockId::Spi6, MuxId::Spi6),
    sc_selec(SEC, rcc::MP_APB5ENSETR, 2, ClockId::I2c4, MuxId::I2c46),
    sc_selec(SEC, rcc::MP_APB5ENSETR, 3, ClockId::I2c6, MuxId::I2c46),
    sc_selec(SEC, rcc::MP_APB5ENSETR, 4, ClockId::Usart1, MuxId::Usart1),
    sc_fixed(SEC, rcc::MP_APB5ENSETR, 8, ClockId::Rtcapb, Parent::Pclk5),
    sc_fixed(SEC, rcc::MP_APB5ENSETR, 11, ClockId::Tzc1, Parent::Pclk5),
    sc_fixed(SEC, rcc::MP_APB5ENSETR, 12, ClockId::Tzc2, Parent::Pclk5),
    sc_fixed(SEC, rcc::MP_APB5ENSETR, 13, ClockId::Tzpc, Parent::Pclk5),
    sc_fixed(SEC, rcc::MP_APB5ENSETR, 15, ClockId::Iwdg1, Parent::Pclk5),
    sc_fixed(SEC, rcc::MP_APB5ENSETR, 16, ClockId::Bsec, Parent::Pclk5),
    sc_selec(SEC, rcc::MP_APB5ENSETR, 20, ClockId::Stgen, MuxId::Stgen),

    selec(SEC, rcc::BDCR, 20, ClockId::Rtc, MuxId::Rtc),

    sc_unknown(N_S, rcc::MP_AHB2ENSETR, 0, ClockId::Dma1),
    sc_unknown(N_S, rcc::MP_AHB2ENSETR, 1, ClockId::Dma2),
    sc_selec(N_S, rcc::MP_AHB2ENSETR, 8, ClockId::Usbo, MuxId::Usbo),
    sc_selec(N_S, rcc::MP_AHB2ENSETR, 16, ClockId::Sdmmc3, MuxId::Sdmmc3),

    sc_unknown(N_S, rcc::MP_AHB4ENSETR, 0, ClockId::GpioA),
    sc_unknown(N_S, rcc::MP_AHB4ENSETR, 1, ClockId::GpioB),
    sc_unknown(N_S, rcc::MP_AHB4ENSETR, 2, ClockId::GpioC),
    sc_unknown(N_S, rcc::MP_AHB4ENSETR, 3, ClockId::GpioD),
    sc_unknown(N_S, rcc::MP_AHB4ENSETR, 4, ClockId::GpioE),
    sc_unknown(N_S, rcc::MP_AHB4ENSETR, 5, ClockId::GpioF),
    sc_unknown(N_S, rcc::MP_AHB4ENSETR, 6, ClockId::GpioG),
    sc_unknown(N_S, rcc::MP_AHB4ENSETR, 7, ClockId::GpioH),
    sc_unknown(N_S, rcc::MP_AHB4ENSETR, 8, ClockId::GpioI),
    sc_unknown(N_S, rcc::MP_AHB4ENSETR, 9, ClockId::GpioJ),
    sc_unknown(N_S, rcc::MP_AHB4ENSETR, 10, ClockId::GpioK),

    sc_fixed(SEC, rcc::MP_AHB5ENSETR, 0, ClockId::GpioZ, Parent::Pclk5),
    sc_fixed(SEC, rcc::MP_AHB5ENSETR, 4, ClockId::Cryp1, Parent::Pclk5),
    sc_fixed(SEC, rcc::MP_AHB5ENSETR, 5, ClockId::Hash1, Parent::Pclk5),
    sc_selec(SEC, rcc::MP_AHB5ENSETR, 6, ClockId::Rng1, MuxId::Rng1),
    sc_fixed(SEC, rcc::MP_AHB5ENSETR, 8, ClockId::Bkpsram, Parent::Pclk5),

    sc_fixed(SEC, rcc::MP_TZAHB6ENSETR, 0, ClockId::Mdma, Parent::Aclk),

    sc_unknown(N_S, rcc::MP_AHB6ENSETR, 5, ClockId::Gpu),
    sc_fixed(N_S, rcc::MP_AHB6ENSETR, 10, ClockId::Ethmac, Parent::Aclk),
    sc_selec(N_S, rcc::MP_AHB6ENSETR, 12, ClockId::Fmc, MuxId::Fmc),
    sc_selec(N_S, rcc::MP_AHB6ENSETR, 14, ClockId::Qspi, MuxId::Qspi),
    sc_selec(N_S, rcc::MP_AHB6ENSETR, 16, ClockId::Sdmmc1, MuxId::Sdmmc12),
    sc_selec(N_S, rcc::MP_AHB6ENSETR, 17, ClockId::Sdmmc2, MuxId::Sdmmc12),
    sc_unknown(N_S, rcc::MP_AHB6ENSETR, 24, ClockId::Usbh),

    unknown(N_S, rcc::DBGCFGR, 8, ClockId::CkDbg),
];

pub(crate) fn gate_index(id: ClockId) -> Option<usize> {
    GATES.iter().position(|g| g.id == id)
}

/// Parent of the clocks that are not entries of the gate table.
pub(crate) fn fixed_parent(id: ClockId) -> Option<Parent> {
    match id {
        ClockId::CkHse => Some(Parent::Hse),
        ClockId::CkHsi => Some(Parent::Hsi),
        ClockId::CkCsi => Some(Parent::Csi),
        ClockId::CkLse => Some(Parent::Lse),
        ClockId::CkLsi => Some(Parent::Lsi),
        ClockId::CkHseDiv2 => Some(Parent::HseKerDiv2),
        ClockId::Pll1P => Some(Parent::Pll1P),
        ClockId::Pll1Q => Some(Parent::Pll1Q),
        ClockId::Pll1R => Some(Parent::Pll1R),
        ClockId::Pll2P => Some(Parent::Pll2P),
        ClockId::Pll2Q => Some(Parent::Pll2Q),
        ClockId::Pll2R => Some(Parent::Pll2R),
        ClockId::Pll3P => Some(Parent::Pll3P),
        ClockId::Pll3Q => Some(Parent::Pll3Q),
        ClockId::Pll3R => Some(Parent::Pll3R),
        ClockId::Pll4P => Some(Parent::Pll4P),
        ClockId::Pll4Q => Some(Parent::Pll4Q),
        ClockId::Pll4R => Some(Parent::Pll4R),
        ClockId::CkAxi => Some(Parent::Aclk),
        ClockId::CkPer => Some(Parent::CkPer),
        ClockId::CkMpu => Some(Parent::CkMpu),
        ClockId::CkMcu => Some(Parent::CkMcu),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_table_has_no_duplicate_identities() {
        for (i, a) in GATES.iter().enumerate() {
            for b in GATES.iter().skip(i + 1) {
                assert_ne!(a.id, b.id, "duplicate gate for {:?}", a.id);
            }
        }
    }

    #[test]
    fn set_clear_gates_sit_in_peripheral_enable_banks() {
        for gate in GATES.iter() {
            if gate.set_clr {
                let byte = gate.reg.byte();
                assert!(
                    (0x200..=0x220).contains(&byte) || (0xA00..=0xA38).contains(&byte),
                    "gate {:?} claims a set/clear pair at {:#x}",
                    gate.id,
                    byte
                );
            }
        }
    }

    #[test]
    fn mux_slots_fit_the_selector_field() {
        let all = [
            MuxId::I2c12,
            MuxId::I2c35,
            MuxId::Stgen,
            MuxId::I2c46,
            MuxId::Spi6,
            MuxId::Usart1,
            MuxId::Rng1,
            MuxId::Uart6,
            MuxId::Uart24,
            MuxId::Uart35,
            MuxId::Uart78,
            MuxId::Sdmmc12,
            MuxId::Sdmmc3,
            MuxId::Qspi,
            MuxId::Fmc,
            MuxId::Axiss,
            MuxId::Mcuss,
            MuxId::Usbphy,
            MuxId::Usbo,
            MuxId::Rtc,
            MuxId::Mpu,
            MuxId::Per,
        ];
        for id in all {
            let mux = id.descriptor();
            assert!(
                mux.parents.len() <= (mux.mask + 1) as usize,
                "{:?} has more parents than the field encodes",
                id
            );
        }
    }

    #[test]
    fn gate_lookup_finds_secure_and_non_secure_entries() {
        assert!(gate_index(ClockId::Rtcapb).is_some());
        assert!(gate_index(ClockId::Sdmmc1).is_some());
        assert!(gate_index(ClockId::CkMpu).is_none());
        assert_eq!(fixed_parent(ClockId::CkMpu), Some(Parent::CkMpu));
        assert_eq!(fixed_parent(ClockId::Rtcapb), None);
    }
}
