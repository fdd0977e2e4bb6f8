// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2024.

//! Low-power context save and restore.
//!
//! System suspend powers the RCC down, so the registers the non-secure
//! world owns are captured into [`PmSaved`] beforehand and replayed on
//! resume. Restoring muxes and gates requires the consumer IPs to run
//! on their kernel clocks, which is why resume keeps the kernel
//! oscillator clocks up until the very end.
//!
//! Stop mode is shallower: only PLL3, PLL4 and the MCU subsystem
//! selector and divider are lost, tracked in [`StopModeState`].

use super::pll::PllId;
use super::{clock_is_always_on, ClockController, MCUDIV_MASK};
use crate::platform::Error;
use crate::rcc;
use crate::rcc::RegOffset;
use crate::tree::{GATES, GATE_COUNT};

/// A mux selector field captured across suspend.
struct MuxField {
    reg: RegOffset,
    shift: u32,
    width: u32,
}

impl MuxField {
    const fn low(reg: RegOffset, width: u32) -> MuxField {
        MuxField {
            reg,
            shift: 0,
            width,
        }
    }

    const fn mask(&self) -> u32 {
        ((1 << self.width) - 1) << self.shift
    }
}

const MUX_FIELD_COUNT: usize = 35;

/// Every kernel clock selector field the non-secure world may have
/// moved, plus the USB OTG selector bit which shares its register with
/// the USB PHY field.
static MUX_FIELDS: [MuxField; MUX_FIELD_COUNT] = [
    MuxField::low(rcc::SDMMC12CKSELR, 3),
    MuxField::low(rcc::SPI2S23CKSELR, 3),
    MuxField::low(rcc::SPI45CKSELR, 3),
    MuxField::low(rcc::I2C12CKSELR, 3),
    MuxField::low(rcc::I2C35CKSELR, 3),
    MuxField::low(rcc::LPTIM23CKSELR, 3),
    MuxField::low(rcc::LPTIM45CKSELR, 3),
    MuxField::low(rcc::UART24CKSELR, 3),
    MuxField::low(rcc::UART35CKSELR, 3),
    MuxField::low(rcc::UART78CKSELR, 3),
    MuxField::low(rcc::SAI1CKSELR, 3),
    MuxField::low(rcc::ETHCKSELR, 2),
    MuxField::low(rcc::I2C46CKSELR, 3),
    MuxField::low(rcc::RNG2CKSELR, 2),
    MuxField::low(rcc::SDMMC3CKSELR, 3),
    MuxField::low(rcc::FMCCKSELR, 2),
    MuxField::low(rcc::QSPICKSELR, 2),
    MuxField::low(rcc::USBCKSELR, 2),
    MuxField::low(rcc::SPDIFCKSELR, 2),
    MuxField::low(rcc::SPI2S1CKSELR, 3),
    MuxField::low(rcc::CECCKSELR, 2),
    MuxField::low(rcc::LPTIM1CKSELR, 3),
    MuxField::low(rcc::UART6CKSELR, 3),
    MuxField::low(rcc::FDCANCKSELR, 2),
    MuxField::low(rcc::SAI2CKSELR, 3),
    MuxField::low(rcc::SAI3CKSELR, 3),
    MuxField::low(rcc::SAI4CKSELR, 3),
    MuxField::low(rcc::ADCCKSELR, 2),
    MuxField::low(rcc::DSICKSELR, 1),
    MuxField::low(rcc::CPERCKSELR, 2),
    MuxField::low(rcc::RNG1CKSELR, 2),
    MuxField::low(rcc::STGENCKSELR, 2),
    MuxField::low(rcc::UART1CKSELR, 3),
    MuxField::low(rcc::SPI6CKSELR, 3),
    MuxField {
        reg: rcc::USBCKSELR,
        shift: 4,
        width: 1,
    },
];

const SC_BANK_COUNT: usize = 11;

// Set/clear gate banks: restored by writing the saved value to the set
// register and its complement to the clear register.
static SC_BANKS: [RegOffset; SC_BANK_COUNT] = [
    rcc::MP_APB1ENSETR,
    rcc::MP_APB2ENSETR,
    rcc::MP_APB3ENSETR,
    rcc::MP_APB4ENSETR,
    rcc::MP_APB5ENSETR,
    rcc::MP_AHB2ENSETR,
    rcc::MP_AHB3ENSETR,
    rcc::MP_AHB4ENSETR,
    rcc::MP_AHB5ENSETR,
    rcc::MP_AHB6ENSETR,
    rcc::MP_MLAHBENSETR,
];

const PLAIN_REG_COUNT: usize = 7;

// Registers restored with a full write.
static PLAIN_REGS: [RegOffset; PLAIN_REG_COUNT] = [
    rcc::MCO1CFGR,
    rcc::MCO2CFGR,
    rcc::PLL3CR,
    rcc::PLL4CR,
    rcc::PLL4CFGR2,
    rcc::MCUDIVR,
    rcc::MSSCKSELR,
];

/// Register values captured by [`ClockController::clock_suspend`].
#[derive(Clone, Copy)]
pub struct PmSaved {
    mux: [u32; MUX_FIELD_COUNT],
    banks: [u32; SC_BANK_COUNT],
    plain: [u32; PLAIN_REG_COUNT],
}

impl Default for PmSaved {
    fn default() -> PmSaved {
        PmSaved {
            mux: [0; MUX_FIELD_COUNT],
            banks: [0; SC_BANK_COUNT],
            plain: [0; PLAIN_REG_COUNT],
        }
    }
}

/// Registers the hardware loses across stop mode.
#[derive(Clone, Copy, Default)]
pub struct StopModeState {
    pll3cr: u32,
    pll4cr: u32,
    mssckselr: u32,
    mcudivr: u32,
}

/// A suspend snapshot together with the gate references, for the
/// caller to stash across a power cycle. Serialization is the caller's
/// concern.
#[derive(Clone, Copy)]
pub struct PmContext {
    saved: PmSaved,
    refcounts: [u32; GATE_COUNT],
}

impl<'a> ClockController<'a> {
    /// Capture the clock tree configuration ahead of system suspend and
    /// clear the reset status flags so the next boot reads as cold.
    pub fn clock_suspend(&mut self) {
        for (slot, reg) in PLAIN_REGS.iter().enumerate() {
            self.pm.plain[slot] = self.rcc.read(*reg);
        }
        for (slot, bank) in SC_BANKS.iter().enumerate() {
            self.pm.banks[slot] = self.rcc.read(*bank);
        }
        for (slot, field) in MUX_FIELDS.iter().enumerate() {
            self.pm.mux[slot] = self.rcc.read(field.reg) & field.mask();
        }
        self.clear_reset_status();
    }

    /// Replay the suspend snapshot, re-align the secure gates with the
    /// reference counts and drop the kernel oscillator clocks again.
    pub fn clock_resume(&mut self) {
        for (slot, field) in MUX_FIELDS.iter().enumerate() {
            self.rcc
                .modify(field.reg, field.mask(), self.pm.mux[slot] & field.mask());
        }
        for (slot, bank) in SC_BANKS.iter().enumerate() {
            self.rcc.write(*bank, self.pm.banks[slot]);
            self.rcc.write(bank.clear_pair(), !self.pm.banks[slot]);
        }
        for (slot, reg) in PLAIN_REGS.iter().enumerate() {
            self.rcc.write(*reg, self.pm.plain[slot]);
        }

        // Sync the secure and shared gates' physical state on their
        // functional state.
        for (i, gate) in GATES.iter().enumerate() {
            if clock_is_always_on(gate.id) || !gate.secure {
                continue;
            }
            let enable = self.refcounts[i] != 0;
            log::trace!(
                "resume {} clock {:?}",
                if enable { "enables" } else { "disables" },
                gate.id
            );
            self.gate_write(gate, enable);
        }

        self.disable_kernel_clocks();
    }

    /// Capture the registers stop mode wipes and raise the kernel
    /// oscillator clocks so the wakeup sources keep ticking.
    pub fn stopmode_save(&mut self) {
        self.stop = StopModeState {
            pll3cr: self.rcc.read(rcc::PLL3CR),
            pll4cr: self.rcc.read(rcc::PLL4CR),
            mssckselr: self.rcc.read(rcc::MSSCKSELR),
            mcudivr: self.rcc.read(rcc::MCUDIVR) & MCUDIV_MASK,
        };
        self.enable_kernel_clocks();
    }

    /// Bring PLL3 and PLL4 back if stop mode took them down, then
    /// restore the MCU subsystem selector and divider.
    pub fn stopmode_resume(&mut self) -> Result<(), Error> {
        let pll3_was_on = self.stop.pll3cr & rcc::PLLNCR_PLLON != 0;
        let pll4_was_on = self.stop.pll4cr & rcc::PLLNCR_PLLON != 0;

        if pll4_was_on && !self.pll.is_on(PllId::Pll4) {
            self.pll.start(PllId::Pll4);
        }
        if pll3_was_on {
            if !self.pll.is_on(PllId::Pll3) {
                self.pll.start(PllId::Pll3);
            }
            self.pll
                .enable_outputs(PllId::Pll3, self.stop.pll3cr >> rcc::PLLNCR_DIVEN_SHIFT)?;
        }
        if pll4_was_on {
            self.pll
                .enable_outputs(PllId::Pll4, self.stop.pll4cr >> rcc::PLLNCR_DIVEN_SHIFT)?;
        }

        // The MCU selector may point at PLL3, so only after its lock.
        self.rcc.write(rcc::MSSCKSELR, self.stop.mssckselr);
        self.set_clkdiv(self.stop.mcudivr, rcc::MCUDIVR)?;

        self.disable_kernel_clocks();
        Ok(())
    }

    /// Raise the kernel clock of every oscillator whose main output is
    /// on.
    pub(crate) fn enable_kernel_clocks(&self) {
        let ker = self.rcc.read(rcc::OCENSETR) << 1;
        self.rcc.write(rcc::OCENSETR, ker & rcc::OCENR_KER_MASK);
    }

    /// Gate all the oscillator kernel clocks.
    pub(crate) fn disable_kernel_clocks(&self) {
        self.rcc.write(rcc::OCENCLRR, rcc::OCENR_KER_MASK);
    }

    /// Clear the MPU reset status flags.
    pub fn clear_reset_status(&self) {
        self.rcc.write(rcc::MP_RSTSCLRR, 0);
    }

    /// Export the suspend snapshot and the gate references.
    pub fn save_pm_context(&self) -> PmContext {
        PmContext {
            saved: self.pm,
            refcounts: self.refcounts,
        }
    }

    /// Adopt a snapshot exported by [`save_pm_context`], typically in a
    /// fresh controller after a power cycle. The registers themselves
    /// are only touched by the next [`clock_resume`].
    ///
    /// [`save_pm_context`]: ClockController::save_pm_context
    /// [`clock_resume`]: ClockController::clock_resume
    pub fn restore_pm_context(&mut self, context: &PmContext) {
        self.pm = context.saved;
        self.refcounts = context.refcounts;
    }
}

#[cfg(test)]
mod tests {
    use super::super::sim;
    use super::*;
    use crate::platform::Role;
    use crate::tree::{gate_index, ClockId};

    #[test]
    fn suspend_snapshot_survives_a_scrambled_tree() {
        let (mut ctl, _) = sim::controller(Role::BringUp);
        let rcc_h = ctl.rcc;

        rcc_h.write(rcc::SDMMC12CKSELR, 0x3);
        rcc_h.write(rcc::UART24CKSELR, 0x2);
        rcc_h.write(rcc::USBCKSELR, rcc::USBCKSELR_USBOSRC | 0x2);
        rcc_h.write(rcc::MP_APB5ENSETR, (1 << 8) | (1 << 11));
        rcc_h.write(rcc::MCO1CFGR, (1 << 12) | (2 << 4) | 3);
        rcc_h.write(rcc::MCUDIVR, 0x2);
        rcc_h.write(rcc::MP_RSTSCLRR, rcc::RSTSCLRR_MPUP0RSTF);

        ctl.clock_suspend();
        assert_eq!(ctl.rcc.read(rcc::MP_RSTSCLRR), 0);

        // What a cold RCC would look like, plus junk outside the saved
        // selector fields.
        rcc_h.write(rcc::SDMMC12CKSELR, 0x48 | 0x5);
        rcc_h.write(rcc::UART24CKSELR, 0);
        rcc_h.write(rcc::USBCKSELR, 0);
        rcc_h.write(rcc::MP_APB5ENSETR, 0);
        rcc_h.write(rcc::MCO1CFGR, 0);
        rcc_h.write(rcc::MCUDIVR, 0);

        ctl.clock_resume();

        // Field-masked restore: bits outside the selector keep the
        // scrambled value.
        assert_eq!(ctl.rcc.read(rcc::SDMMC12CKSELR), 0x48 | 0x3);
        assert_eq!(ctl.rcc.read(rcc::UART24CKSELR), 0x2);
        assert_eq!(
            ctl.rcc.read(rcc::USBCKSELR),
            rcc::USBCKSELR_USBOSRC | 0x2
        );
        assert_eq!(ctl.rcc.read(rcc::MP_APB5ENSETR), (1 << 8) | (1 << 11));
        assert_eq!(ctl.rcc.read(rcc::MCO1CFGR), (1 << 12) | (2 << 4) | 3);
        assert_eq!(ctl.rcc.read(rcc::MCUDIVR), 0x2);
        assert_eq!(ctl.rcc.read(rcc::OCENCLRR), rcc::OCENR_KER_MASK);
    }

    #[test]
    fn resume_resyncs_secure_gates_to_their_references() {
        let (mut ctl, _) = sim::controller(Role::SecureRuntime);
        ctl.refcounts[gate_index(ClockId::Stgen).unwrap()] = 1;
        ctl.refcounts[gate_index(ClockId::Ddrc1).unwrap()] = 2;
        // DDR interface gates as an earlier boot stage leaves them.
        ctl.rcc.write(rcc::DDRITFCR, 0x7FF);

        ctl.clock_suspend();
        ctl.clock_resume();

        // Referenced gates come back up, unreferenced ones go down.
        assert_eq!(ctl.rcc.read(rcc::MP_APB5ENSETR), 1 << 20);
        assert_eq!(ctl.rcc.read(rcc::DDRITFCR), 0x1);
        assert_eq!(ctl.rcc.read(rcc::OCENCLRR), rcc::OCENR_KER_MASK);
    }

    #[test]
    fn stop_mode_restarts_the_plls_it_found_running() {
        let (mut ctl, _) = sim::controller(Role::SecureRuntime);
        let rcc_h = ctl.rcc;

        let pll3cr = rcc::PLLNCR_PLLON
            | rcc::PLLNCR_PLLRDY
            | rcc::PLLNCR_DIVPEN
            | rcc::PLLNCR_DIVQEN;
        let pll4cr = rcc::PLLNCR_PLLON | rcc::PLLNCR_PLLRDY | rcc::PLLNCR_DIVREN;
        rcc_h.write(rcc::PLL3CR, pll3cr);
        rcc_h.write(rcc::PLL4CR, pll4cr);
        rcc_h.write(rcc::MSSCKSELR, 0x3);
        rcc_h.write(rcc::MCUDIVR, 0x1);
        rcc_h.write(rcc::OCENSETR, rcc::OCENR_HSION | rcc::OCENR_HSEON);

        ctl.stopmode_save();
        assert_eq!(
            rcc_h.read(rcc::OCENSETR) & rcc::OCENR_KER_MASK,
            rcc::OCENR_HSIKERON | rcc::OCENR_HSEKERON
        );

        // Stop mode wipes the saved registers.
        rcc_h.write(rcc::PLL3CR, 0);
        rcc_h.write(rcc::PLL4CR, 0);
        rcc_h.write(rcc::MSSCKSELR, 0);
        rcc_h.write(rcc::MCUDIVR, 0);

        assert!(ctl.stopmode_resume().is_ok());

        let p3 = ctl.rcc.read(rcc::PLL3CR);
        assert_ne!(p3 & rcc::PLLNCR_PLLON, 0);
        assert_ne!(p3 & rcc::PLLNCR_DIVPEN, 0);
        assert_ne!(p3 & rcc::PLLNCR_DIVQEN, 0);
        assert_eq!(p3 & rcc::PLLNCR_DIVREN, 0);
        let p4 = ctl.rcc.read(rcc::PLL4CR);
        assert_ne!(p4 & rcc::PLLNCR_PLLON, 0);
        assert_ne!(p4 & rcc::PLLNCR_DIVREN, 0);
        assert_eq!(ctl.rcc.read(rcc::MSSCKSELR) & rcc::SELR_SRC_MASK, 0x3);
        assert_eq!(ctl.rcc.read(rcc::MCUDIVR) & 0xF, 0x1);
        assert_eq!(ctl.rcc.read(rcc::OCENCLRR), rcc::OCENR_KER_MASK);
    }

    #[test]
    fn kernel_clocks_follow_the_main_oscillator_enables() {
        let (ctl, _) = sim::controller(Role::BringUp);
        ctl.rcc
            .write(rcc::OCENSETR, rcc::OCENR_HSION | rcc::OCENR_CSION);
        ctl.enable_kernel_clocks();
        assert_eq!(
            ctl.rcc.read(rcc::OCENSETR) & rcc::OCENR_KER_MASK,
            rcc::OCENR_HSIKERON | rcc::OCENR_CSIKERON
        );
        ctl.disable_kernel_clocks();
        assert_eq!(ctl.rcc.read(rcc::OCENCLRR), rcc::OCENR_KER_MASK);
    }

    #[test]
    fn pm_context_round_trips_into_a_fresh_controller() {
        let (mut donor, _) = sim::controller(Role::SecureRuntime);
        donor.rcc.write(rcc::SDMMC12CKSELR, 0x3);
        donor.rcc.write(rcc::MP_APB5ENSETR, 1 << 8);
        donor.rcc.write(rcc::MCO2CFGR, 0x55);
        let ddrc1 = gate_index(ClockId::Ddrc1).unwrap();
        donor.refcounts[ddrc1] = 3;
        donor.clock_suspend();
        let context = donor.save_pm_context();

        let (mut ctl, _) = sim::controller(Role::SecureRuntime);
        ctl.restore_pm_context(&context);
        ctl.clock_resume();

        assert_eq!(ctl.refcounts[ddrc1], 3);
        assert_eq!(ctl.rcc.read(rcc::SDMMC12CKSELR), 0x3);
        assert_eq!(ctl.rcc.read(rcc::MP_APB5ENSETR), 1 << 8);
        assert_eq!(ctl.rcc.read(rcc::MCO2CFGR), 0x55);
        assert_ne!(ctl.rcc.read(rcc::DDRITFCR) & 0x1, 0);
    }
}
