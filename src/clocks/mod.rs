// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2024.

//! Clock tree controller.
//!
//! [`ClockController`] ties the register bank, the platform services and
//! the static tree tables together. The oscillator and PLL state
//! machines live in [`osc`] and [`pll`]; bring-up, DVFS and the
//! low-power paths are in their own modules and all hang off the
//! controller.

pub mod osc;
pub mod pll;

mod init;
pub mod lowpower;
pub mod opp;

use crate::config::OscillatorBank;
use crate::platform::{ClockPlatform, Error, Role, SharedResource};
use crate::rcc;
use crate::rcc::{Rcc, RccRegisters};
use crate::tree::{
    gate_index, fixed_parent, ClockId, Gate, GateParent, MuxId, Oscillator, Parent, GATES,
    GATE_COUNT, NB_OSC,
};

use osc::Oscillators;
use pll::{Pll, PllId, PllOutput};

/// Rate of the clock the bootrom leaves behind for the USB PHY.
pub(crate) const USB_PHY_48_HZ: u64 = 48_000_000;

// Bus prescaler decode tables. MPU, MCU and APB fields encode a shift,
// the AXI field encodes a divisor.
static MPU_DIV: [u32; 8] = [0, 1, 2, 3, 4, 4, 4, 4];
static AXI_DIV: [u32; 8] = [1, 2, 3, 4, 4, 4, 4, 4];
static MCU_DIV: [u32; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 9, 9, 9, 9, 9, 9];
static APBX_DIV: [u32; 8] = [0, 1, 2, 3, 4, 4, 4, 4];

const APBXDIV_MASK: u32 = 0x7;
const AXIDIV_MASK: u32 = 0x7;
const MPUDIV_MASK: u32 = 0x7;
const MCUDIV_MASK: u32 = 0xF;
const RTCDIV_MASK: u32 = 0x3F;

/// Driver for the whole RCC clock tree.
pub struct ClockController<'a> {
    pub(crate) rcc: Rcc<'a>,
    pub(crate) platform: &'a dyn ClockPlatform,
    pub(crate) osc: Oscillators<'a>,
    pub(crate) pll: Pll<'a>,
    pub(crate) role: Role,
    pub(crate) osc_hz: [u64; NB_OSC],
    pub(crate) refcounts: [u32; GATE_COUNT],
    pub(crate) pll1: opp::Pll1Settings,
    pub(crate) current_opp_khz: u32,
    pub(crate) stop: lowpower::StopModeState,
    pub(crate) pm: lowpower::PmSaved,
}

impl<'a> ClockController<'a> {
    pub fn new(
        registers: &'a RccRegisters,
        platform: &'a dyn ClockPlatform,
        role: Role,
    ) -> ClockController<'a> {
        let rcc = Rcc::new(registers);
        ClockController {
            rcc,
            platform,
            osc: Oscillators::new(rcc, platform),
            pll: Pll::new(rcc, platform),
            role,
            osc_hz: [0; NB_OSC],
            refcounts: [0; GATE_COUNT],
            pll1: opp::Pll1Settings::default(),
            current_opp_khz: 0,
            stop: lowpower::StopModeState::default(),
            pm: lowpower::PmSaved::default(),
        }
    }

    /// Record the board oscillator rates and capture the state the
    /// earlier boot stages left behind. Must run before any rate query;
    /// on the secure runtime it also claims the secure gates' parents
    /// and takes references on the clocks the system already depends on.
    pub fn probe(&mut self, osc: &OscillatorBank) {
        for input in [
            Oscillator::Hsi,
            Oscillator::Hse,
            Oscillator::Csi,
            Oscillator::Lsi,
            Oscillator::Lse,
            Oscillator::I2sCkin,
        ] {
            let slot = osc.get(input);
            self.osc_hz[input.index()] = if slot.present { slot.frequency_hz } else { 0 };
        }

        if self.role == Role::SecureRuntime {
            self.sync_earlyboot_state();
        }

        let mpu_hz = self.rate_of(ClockId::CkMpu);
        self.current_opp_khz = ((mpu_hz + 500) / 1_000) as u32;
    }

    /// Whether the RCC registers are restricted to the secure world.
    pub fn is_secure(&self) -> bool {
        self.rcc.read(rcc::TZCR) & rcc::TZCR_TZEN != 0
    }

    /// Whether the MCU subsystem clocking is also under secure control.
    pub fn is_mckprot(&self) -> bool {
        let tzcr = self.rcc.read(rcc::TZCR);
        tzcr & (rcc::TZCR_TZEN | rcc::TZCR_MCKPROT) == (rcc::TZCR_TZEN | rcc::TZCR_MCKPROT)
    }

    pub fn oscillator_rate(&self, osc: Oscillator) -> u64 {
        self.osc_hz[osc.index()]
    }

    // Gate engine ------------------------------------------------------

    /// Take a reference on `id`, ungating it on the first one.
    pub fn enable(&mut self, id: ClockId) {
        self.set_gate(id, true);
    }

    /// Drop a reference on `id`, gating it on the last one.
    pub fn disable(&mut self, id: ClockId) {
        self.set_gate(id, false);
    }

    /// Whether `id` sits behind a secure-class gate while the RCC is
    /// itself secured. Always-on rails are never gate-protected.
    pub fn is_gate_secure(&self, id: ClockId) -> bool {
        if !self.is_secure() || clock_is_always_on(id) {
            return false;
        }
        let Some(i) = gate_index(id) else {
            log::error!("clock {:?} has no gate", id);
            panic!("clock {:?} has no gate", id);
        };
        GATES[i].secure
    }

    pub fn is_enabled(&self, id: ClockId) -> bool {
        if clock_is_always_on(id) {
            return true;
        }
        let Some(i) = gate_index(id) else {
            log::error!("clock {:?} has no gate", id);
            panic!("clock {:?} has no gate", id);
        };
        let gate = &GATES[i];
        self.rcc.read(gate.reg) & (1 << gate.bit) != 0
    }

    fn set_gate(&mut self, id: ClockId, enable: bool) {
        if clock_is_always_on(id) {
            return;
        }
        let Some(i) = gate_index(id) else {
            log::error!(
                "clock {:?} can't be {}",
                id,
                if enable { "enabled" } else { "disabled" }
            );
            panic!("clock {:?} has no gate", id);
        };
        let gate = &GATES[i];

        match self.role {
            // The secure runtime passes non-secure enables through
            // without counting and never turns such clocks off.
            Role::SecureRuntime if !gate.secure => {
                if enable {
                    self.gate_write(gate, true);
                }
                return;
            }
            Role::NonSecureRuntime if gate.secure => {
                log::warn!("refusing {:?}: secure gate", id);
                return;
            }
            _ => {}
        }

        let lock = self.platform.lock_available();
        if lock {
            self.platform.refcount_lock();
        }
        if enable {
            if self.refcounts[i] == 0 {
                self.gate_write(gate, true);
            }
            if self.refcounts[i] == u32::MAX {
                panic!("clock {:?} refcount saturated", id);
            }
            self.refcounts[i] += 1;
        } else {
            if self.refcounts[i] == 0 {
                panic!("clock {:?} refcount underflow", id);
            }
            self.refcounts[i] -= 1;
            if self.refcounts[i] == 0 {
                self.gate_write(gate, false);
            }
        }
        if lock {
            self.platform.refcount_unlock();
        }
    }

    pub(crate) fn gate_write(&self, gate: &Gate, enable: bool) {
        if gate.set_clr {
            let reg = if enable {
                gate.reg
            } else {
                gate.reg.clear_pair()
            };
            self.rcc.write(reg, 1 << gate.bit);
        } else if enable {
            self.rcc
                .set_bits_shregs(self.platform, gate.reg, 1 << gate.bit);
        } else {
            self.rcc
                .clear_bits_shregs(self.platform, gate.reg, 1 << gate.bit);
        }
    }

    // Parent and rate engine -------------------------------------------

    /// Resolve the tree parent of a consumer clock.
    pub fn parent_of(&self, id: ClockId) -> Result<Parent, Error> {
        if let Some(parent) = fixed_parent(id) {
            return Ok(parent);
        }
        let i = gate_index(id).ok_or(Error::NotFound)?;
        match GATES[i].parent {
            GateParent::Fixed(parent) => Ok(parent),
            GateParent::Unknown => Err(Error::InvalidArgument),
            GateParent::Mux(mux_id) => {
                let mux = mux_id.descriptor();
                let slot = ((self.rcc.read(mux.reg) >> mux.shift) & mux.mask) as usize;
                let parent = *mux.parents.get(slot).ok_or(Error::InvalidArgument)?;
                if parent == Parent::Unknown {
                    Err(Error::NotFound)
                } else {
                    Ok(parent)
                }
            }
        }
    }

    /// Rate of a consumer clock, 0 Hz when its parent is unresolvable.
    pub fn rate_of(&self, id: ClockId) -> u64 {
        match self.parent_of(id) {
            Ok(parent) => self.parent_rate(parent),
            Err(_) => 0,
        }
    }

    pub(crate) fn pll_refclk_hz(&self, id: PllId) -> u64 {
        match self.pll.refclk_oscillator(id) {
            Some(osc) => self.osc_hz[osc.index()],
            None => 0,
        }
    }

    fn pll_output_hz(&self, id: PllId, output: PllOutput) -> u64 {
        self.pll.output_rate(id, output, self.pll_refclk_hz(id))
    }

    fn axi_hz(&self) -> u64 {
        let base = match self.rcc.read(rcc::ASSCKSELR) & rcc::SELR_SRC_MASK {
            0 => self.osc_hz[Oscillator::Hsi.index()],
            1 => self.osc_hz[Oscillator::Hse.index()],
            2 => self.pll_output_hz(PllId::Pll2, PllOutput::P),
            _ => 0,
        };
        let div = AXI_DIV[(self.rcc.read(rcc::AXIDIVR) & AXIDIV_MASK) as usize];
        base / div as u64
    }

    fn mcu_hz(&self) -> u64 {
        let base = match self.rcc.read(rcc::MSSCKSELR) & rcc::SELR_SRC_MASK {
            0 => self.osc_hz[Oscillator::Hsi.index()],
            1 => self.osc_hz[Oscillator::Hse.index()],
            2 => self.osc_hz[Oscillator::Csi.index()],
            3 => self.pll_output_hz(PllId::Pll3, PllOutput::P),
            _ => 0,
        };
        base >> MCU_DIV[(self.rcc.read(rcc::MCUDIVR) & MCUDIV_MASK) as usize]
    }

    fn apb_shift(&self, divr: rcc::RegOffset) -> u32 {
        APBX_DIV[(self.rcc.read(divr) & APBXDIV_MASK) as usize]
    }

    pub(crate) fn parent_rate(&self, parent: Parent) -> u64 {
        match parent {
            Parent::Hsi | Parent::HsiKer => self.osc_hz[Oscillator::Hsi.index()],
            Parent::Hse | Parent::HseKer => self.osc_hz[Oscillator::Hse.index()],
            Parent::HseKerDiv2 => self.osc_hz[Oscillator::Hse.index()] >> 1,
            Parent::HseRtc => {
                let div = (self.rcc.read(rcc::RTCDIVR) & RTCDIV_MASK) as u64 + 1;
                self.osc_hz[Oscillator::Hse.index()] / div
            }
            Parent::Csi | Parent::CsiKer => self.osc_hz[Oscillator::Csi.index()],
            Parent::Lsi => self.osc_hz[Oscillator::Lsi.index()],
            Parent::Lse => self.osc_hz[Oscillator::Lse.index()],
            Parent::I2sCkin => self.osc_hz[Oscillator::I2sCkin.index()],
            Parent::UsbPhy48 => USB_PHY_48_HZ,
            Parent::Pll1P => self.pll_output_hz(PllId::Pll1, PllOutput::P),
            Parent::Pll1Q => self.pll_output_hz(PllId::Pll1, PllOutput::Q),
            Parent::Pll1R => self.pll_output_hz(PllId::Pll1, PllOutput::R),
            Parent::Pll2P => self.pll_output_hz(PllId::Pll2, PllOutput::P),
            Parent::Pll2Q => self.pll_output_hz(PllId::Pll2, PllOutput::Q),
            Parent::Pll2R => self.pll_output_hz(PllId::Pll2, PllOutput::R),
            Parent::Pll3P => self.pll_output_hz(PllId::Pll3, PllOutput::P),
            Parent::Pll3Q => self.pll_output_hz(PllId::Pll3, PllOutput::Q),
            Parent::Pll3R => self.pll_output_hz(PllId::Pll3, PllOutput::R),
            Parent::Pll4P => self.pll_output_hz(PllId::Pll4, PllOutput::P),
            Parent::Pll4Q => self.pll_output_hz(PllId::Pll4, PllOutput::Q),
            Parent::Pll4R => self.pll_output_hz(PllId::Pll4, PllOutput::R),
            Parent::CkMpu => match self.rcc.read(rcc::MPCKSELR) & rcc::SELR_SRC_MASK {
                0 => self.osc_hz[Oscillator::Hsi.index()],
                1 => self.osc_hz[Oscillator::Hse.index()],
                2 => self.pll_output_hz(PllId::Pll1, PllOutput::P),
                3 => {
                    let shift = MPU_DIV[(self.rcc.read(rcc::MPCKDIVR) & MPUDIV_MASK) as usize];
                    self.pll_output_hz(PllId::Pll1, PllOutput::P) >> shift
                }
                _ => 0,
            },
            Parent::Aclk | Parent::Hclk2 | Parent::Hclk6 => self.axi_hz(),
            Parent::Pclk4 => self.axi_hz() >> self.apb_shift(rcc::APB4DIVR),
            Parent::Pclk5 => self.axi_hz() >> self.apb_shift(rcc::APB5DIVR),
            Parent::CkMcu => self.mcu_hz(),
            Parent::Pclk1 => self.mcu_hz() >> self.apb_shift(rcc::APB1DIVR),
            Parent::Pclk2 => self.mcu_hz() >> self.apb_shift(rcc::APB2DIVR),
            Parent::Pclk3 => self.mcu_hz() >> self.apb_shift(rcc::APB3DIVR),
            Parent::CkPer => match self.rcc.read(rcc::CPERCKSELR) & rcc::SELR_SRC_MASK {
                0 => self.osc_hz[Oscillator::Hsi.index()],
                1 => self.osc_hz[Oscillator::Csi.index()],
                2 => self.osc_hz[Oscillator::Hse.index()],
                _ => 0,
            },
            Parent::Unknown => 0,
        }
    }

    /// Rate of an APB timer kernel clock: timers run at bus rate when
    /// the bus is undivided, twice the bus rate (times the group
    /// prescaler) otherwise.
    pub fn timer_rate(&self, id: ClockId) -> u64 {
        let rate = self.rate_of(id);
        let (divr, prer) = match id {
            ClockId::Tim12 => (rcc::APB1DIVR, rcc::TIMG1PRER),
            ClockId::Tim15 => (rcc::APB2DIVR, rcc::TIMG2PRER),
            _ => return rate,
        };
        if self.rcc.read(divr) & APBXDIV_MASK == 0 {
            return rate;
        }
        let timpre = (self.rcc.read(prer) & rcc::TIMGXPRER_TIMGXPRE) as u64;
        rate * (timpre + 1) * 2
    }

    fn rtc_hz(&self) -> u64 {
        match (self.rcc.read(rcc::BDCR) & rcc::BDCR_RTCSRC_MASK) >> rcc::BDCR_RTCSRC_SHIFT {
            1 => self.osc_hz[Oscillator::Lse.index()],
            2 => self.osc_hz[Oscillator::Lsi.index()],
            3 => self.parent_rate(Parent::HseRtc),
            _ => panic!("RTC clock source is disabled"),
        }
    }

    /// Whether the RTC calendar registers must be read twice: required
    /// when APB1 runs slower than seven RTC cycles.
    pub fn rtc_read_twice(&self) -> bool {
        let apb1_hz = self.parent_rate(Parent::Pclk1);
        apb1_hz < self.rtc_hz() * 7
    }

    // Secure world bookkeeping -----------------------------------------

    fn grandparent_of(&self, parent: Parent) -> Option<Parent> {
        match parent {
            Parent::Aclk | Parent::Hclk2 | Parent::Hclk6 | Parent::Pclk4 | Parent::Pclk5 => {
                let mux = MuxId::Axiss.descriptor();
                let slot = ((self.rcc.read(mux.reg) >> mux.shift) & mux.mask) as usize;
                mux.parents.get(slot).copied()
            }
            Parent::Pll1P | Parent::Pll1Q | Parent::Pll1R | Parent::Pll2P | Parent::Pll2Q
            | Parent::Pll2R => self
                .pll
                .refclk_oscillator(PllId::Pll1)
                .map(oscillator_parent),
            Parent::Pll3P | Parent::Pll3Q | Parent::Pll3R => self
                .pll
                .refclk_oscillator(PllId::Pll3)
                .map(oscillator_parent),
            _ => None,
        }
    }

    fn secure_parent_clocks(&self, parent: Parent) {
        match parent {
            // Intermediate nodes: continue down the tree.
            Parent::Aclk | Parent::Hclk2 | Parent::Hclk6 | Parent::Pclk4 | Parent::Pclk5 => {}
            Parent::Pll3P | Parent::Pll3Q | Parent::Pll3R => {
                self.platform.register_secure_parent(SharedResource::Pll3);
            }
            // Always-secure clocks, nothing to claim.
            Parent::Hsi
            | Parent::HsiKer
            | Parent::Lsi
            | Parent::Csi
            | Parent::CsiKer
            | Parent::Hse
            | Parent::HseKer
            | Parent::HseKerDiv2
            | Parent::HseRtc
            | Parent::Lse
            | Parent::Pll1P
            | Parent::Pll1Q
            | Parent::Pll1R
            | Parent::Pll2P
            | Parent::Pll2Q
            | Parent::Pll2R => return,
            _ => {
                log::error!("cannot secure parent clock {:?}", parent);
                panic!("cannot secure parent clock {:?}", parent);
            }
        }
        if let Some(grandparent) = self.grandparent_of(parent) {
            self.secure_parent_clocks(grandparent);
        }
    }

    /// Claim the parents of a secure consumer so the shared-resource
    /// bookkeeping knows they may not be handed to the other world.
    pub fn register_clock_parents_secure(&self, id: ClockId) {
        if !self.is_secure() {
            return;
        }
        if let Ok(parent) = self.parent_of(id) {
            self.secure_parent_clocks(parent);
        }
    }

    fn sync_earlyboot_state(&mut self) {
        for gate in GATES.iter().filter(|g| g.secure) {
            self.register_clock_parents_secure(gate.id);
        }
        for id in [
            ClockId::Axidcg,
            ClockId::Ddrc1,
            ClockId::Ddrc1Lp,
            ClockId::Ddrc2,
            ClockId::Ddrc2Lp,
            ClockId::Ddrcapb,
            ClockId::Ddrphyc,
            ClockId::DdrphycLp,
            ClockId::Ddrphycapb,
            ClockId::DdrphycapbLp,
            ClockId::Tzpc,
            ClockId::Tzc1,
            ClockId::Tzc2,
            ClockId::Stgen,
            ClockId::Rtcapb,
        ] {
            self.enable(id);
        }
    }
}

fn clock_is_always_on(id: ClockId) -> bool {
    matches!(
        id,
        ClockId::CkHse
            | ClockId::CkCsi
            | ClockId::CkLsi
            | ClockId::CkLse
            | ClockId::CkHsi
            | ClockId::CkHseDiv2
            | ClockId::Pll1P
            | ClockId::Pll1Q
            | ClockId::Pll1R
            | ClockId::Pll2P
            | ClockId::Pll2Q
            | ClockId::Pll2R
            | ClockId::Pll3P
            | ClockId::Pll3Q
            | ClockId::Pll3R
            | ClockId::CkAxi
            | ClockId::CkMpu
            | ClockId::CkMcu
            | ClockId::Rtc
    )
}

fn oscillator_parent(osc: Oscillator) -> Parent {
    match osc {
        Oscillator::Hsi => Parent::Hsi,
        Oscillator::Hse => Parent::Hse,
        Oscillator::Csi => Parent::Csi,
        Oscillator::Lsi => Parent::Lsi,
        Oscillator::Lse => Parent::Lse,
        Oscillator::I2sCkin => Parent::I2sCkin,
    }
}

/// Passive RCC model for host tests: ready flags track the matching
/// enable bits each time the simulated clock ticks.
#[cfg(test)]
pub(crate) mod sim {
    use super::*;
    use std::cell::{Cell, RefCell};

    pub(crate) struct SimPlatform {
        rcc: Rcc<'static>,
        pub now: Cell<u64>,
        pub stgen_rate: Cell<u64>,
        pub usb_boot: Cell<bool>,
        pub opps: RefCell<Vec<(u32, u32)>>,
        pub secure_registrations: Cell<u32>,
    }

    impl SimPlatform {
        pub fn new(registers: &'static RccRegisters) -> SimPlatform {
            SimPlatform {
                rcc: Rcc::new(registers),
                now: Cell::new(0),
                stgen_rate: Cell::new(0),
                usb_boot: Cell::new(false),
                opps: RefCell::new(Vec::new()),
                secure_registrations: Cell::new(0),
            }
        }

        fn step_hardware(&self) {
            let rcc = self.rcc;
            for cr in [rcc::PLL1CR, rcc::PLL2CR, rcc::PLL3CR, rcc::PLL4CR] {
                let v = rcc.read(cr);
                if v & rcc::PLLNCR_PLLON != 0 {
                    rcc.write(cr, v | rcc::PLLNCR_PLLRDY);
                } else {
                    rcc.write(cr, v & !rcc::PLLNCR_PLLRDY);
                }
            }

            let clr = rcc.read(rcc::OCENCLRR);
            if clr != 0 {
                rcc.clear_bits(rcc::OCENSETR, clr);
                rcc.write(rcc::OCENCLRR, 0);
            }

            let ocen = rcc.read(rcc::OCENSETR);
            let mut rdy = rcc::OCRDYR_HSIDIVRDY;
            if ocen & rcc::OCENR_HSION != 0 {
                rdy |= rcc::OCRDYR_HSIRDY;
            }
            if ocen & rcc::OCENR_CSION != 0 {
                rdy |= rcc::OCRDYR_CSIRDY;
            }
            if ocen & rcc::OCENR_HSEON != 0 {
                rdy |= rcc::OCRDYR_HSERDY;
            }
            rcc.write(rcc::OCRDYR, rdy);

            let bdcr = rcc.read(rcc::BDCR);
            if bdcr & rcc::BDCR_LSEON != 0 {
                rcc.write(rcc::BDCR, bdcr | rcc::BDCR_LSERDY);
            } else {
                rcc.write(rcc::BDCR, bdcr & !rcc::BDCR_LSERDY);
            }
            let rdlsicr = rcc.read(rcc::RDLSICR);
            if rdlsicr & rcc::RDLSICR_LSION != 0 {
                rcc.write(rcc::RDLSICR, rdlsicr | rcc::RDLSICR_LSIRDY);
            } else {
                rcc.write(rcc::RDLSICR, rdlsicr & !rcc::RDLSICR_LSIRDY);
            }

            for selr in [
                rcc::MPCKSELR,
                rcc::ASSCKSELR,
                rcc::MSSCKSELR,
                rcc::RCK12SELR,
                rcc::RCK3SELR,
                rcc::RCK4SELR,
            ] {
                rcc.set_bits(selr, rcc::SELR_SRCRDY);
            }
            for divr in [
                rcc::MPCKDIVR,
                rcc::AXIDIVR,
                rcc::MCUDIVR,
                rcc::APB1DIVR,
                rcc::APB2DIVR,
                rcc::APB3DIVR,
                rcc::APB4DIVR,
                rcc::APB5DIVR,
            ] {
                rcc.set_bits(divr, rcc::DIVR_DIVRDY);
            }
        }
    }

    impl ClockPlatform for SimPlatform {
        fn now_us(&self) -> u64 {
            self.step_hardware();
            let t = self.now.get();
            self.now.set(t + 10);
            t
        }

        fn stgen_update(&self, rate_hz: u64) {
            self.stgen_rate.set(rate_hz);
        }

        fn boot_on_usb(&self) -> bool {
            self.usb_boot.get()
        }

        fn register_secure_parent(&self, _resource: SharedResource) {
            self.secure_registrations
                .set(self.secure_registrations.get() + 1);
        }

        fn opp_freqvolt(
            &self,
            freq_khz: &mut [u32],
            volt_mv: &mut [u32],
        ) -> Result<usize, Error> {
            let opps = self.opps.borrow();
            if opps.is_empty() {
                return Err(Error::NotFound);
            }
            if opps.len() > freq_khz.len() {
                return Err(Error::InvalidArgument);
            }
            for (i, (freq, volt)) in opps.iter().enumerate() {
                freq_khz[i] = *freq;
                volt_mv[i] = *volt;
            }
            Ok(opps.len())
        }
    }

    /// A controller over a fresh zeroed bank plus its simulator.
    pub(crate) fn controller(role: Role) -> (ClockController<'static>, &'static SimPlatform) {
        let registers = RccRegisters::test_bank();
        let platform = Box::leak(Box::new(SimPlatform::new(registers)));
        (ClockController::new(registers, platform, role), platform)
    }

    pub(crate) fn default_osc_bank() -> crate::config::OscillatorBank {
        use crate::config::OscillatorSettings;
        crate::config::OscillatorBank {
            hsi: OscillatorSettings::crystal(64_000_000),
            hse: OscillatorSettings::crystal(24_000_000),
            csi: OscillatorSettings::crystal(4_000_000),
            lsi: OscillatorSettings::crystal(32_000),
            lse: OscillatorSettings::crystal(32_768),
            i2s_ckin: OscillatorSettings::OFF,
        }
    }
}
