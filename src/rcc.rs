// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2024.

//! RCC register bank and raw accessors.
//!
//! The register map is addressed through [`RegOffset`] byte offsets so the
//! mux, divider and gate tables in [`crate::tree`] can carry plain
//! offsets, mirroring how the reference manual documents the block.

use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::registers::InMemoryRegister;

use crate::platform::{ClockPlatform, Error};

/// Byte offset of a register inside the RCC block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegOffset(u16);

impl RegOffset {
    pub const fn new(byte_offset: u16) -> Self {
        RegOffset(byte_offset)
    }

    pub const fn byte(self) -> u16 {
        self.0
    }

    pub(crate) const fn word(self) -> usize {
        (self.0 >> 2) as usize
    }

    /// The companion clear register of a set/clear enable register pair.
    pub(crate) const fn clear_pair(self) -> Self {
        RegOffset(self.0 + MP_ENCLRR_OFFSET)
    }
}

pub const TZCR: RegOffset = RegOffset::new(0x000);
pub const OCENSETR: RegOffset = RegOffset::new(0x00C);
pub const OCENCLRR: RegOffset = RegOffset::new(0x010);
pub const HSICFGR: RegOffset = RegOffset::new(0x018);
pub const CSICFGR: RegOffset = RegOffset::new(0x01C);
pub const MPCKSELR: RegOffset = RegOffset::new(0x020);
pub const ASSCKSELR: RegOffset = RegOffset::new(0x024);
pub const RCK12SELR: RegOffset = RegOffset::new(0x028);
pub const MPCKDIVR: RegOffset = RegOffset::new(0x02C);
pub const AXIDIVR: RegOffset = RegOffset::new(0x030);
pub const APB4DIVR: RegOffset = RegOffset::new(0x03C);
pub const APB5DIVR: RegOffset = RegOffset::new(0x040);
pub const RTCDIVR: RegOffset = RegOffset::new(0x044);
pub const MSSCKSELR: RegOffset = RegOffset::new(0x048);
pub const MCUDIVR: RegOffset = RegOffset::new(0x04C);
pub const APB1DIVR: RegOffset = RegOffset::new(0x050);
pub const APB2DIVR: RegOffset = RegOffset::new(0x054);
pub const APB3DIVR: RegOffset = RegOffset::new(0x058);
pub const PLL1CR: RegOffset = RegOffset::new(0x080);
pub const PLL1CFGR1: RegOffset = RegOffset::new(0x084);
pub const PLL1CFGR2: RegOffset = RegOffset::new(0x088);
pub const PLL1FRACR: RegOffset = RegOffset::new(0x08C);
pub const PLL1CSGR: RegOffset = RegOffset::new(0x090);
pub const PLL2CR: RegOffset = RegOffset::new(0x094);
pub const PLL2CFGR1: RegOffset = RegOffset::new(0x098);
pub const PLL2CFGR2: RegOffset = RegOffset::new(0x09C);
pub const PLL2FRACR: RegOffset = RegOffset::new(0x0A0);
pub const PLL2CSGR: RegOffset = RegOffset::new(0x0A4);
pub const I2C46CKSELR: RegOffset = RegOffset::new(0x0C0);
pub const SPI6CKSELR: RegOffset = RegOffset::new(0x0C4);
pub const UART1CKSELR: RegOffset = RegOffset::new(0x0C8);
pub const RNG1CKSELR: RegOffset = RegOffset::new(0x0CC);
pub const CPERCKSELR: RegOffset = RegOffset::new(0x0D0);
pub const STGENCKSELR: RegOffset = RegOffset::new(0x0D4);
pub const DDRITFCR: RegOffset = RegOffset::new(0x0D8);
pub const BDCR: RegOffset = RegOffset::new(0x140);
pub const RDLSICR: RegOffset = RegOffset::new(0x144);
pub const MP_APB4ENSETR: RegOffset = RegOffset::new(0x200);
pub const MP_APB5ENSETR: RegOffset = RegOffset::new(0x208);
pub const MP_AHB5ENSETR: RegOffset = RegOffset::new(0x210);
pub const MP_AHB6ENSETR: RegOffset = RegOffset::new(0x218);
pub const MP_TZAHB6ENSETR: RegOffset = RegOffset::new(0x220);
pub const MP_RSTSCLRR: RegOffset = RegOffset::new(0x408);
pub const MCO1CFGR: RegOffset = RegOffset::new(0x800);
pub const MCO2CFGR: RegOffset = RegOffset::new(0x804);
pub const OCRDYR: RegOffset = RegOffset::new(0x808);
pub const DBGCFGR: RegOffset = RegOffset::new(0x80C);
pub const RCK3SELR: RegOffset = RegOffset::new(0x820);
pub const RCK4SELR: RegOffset = RegOffset::new(0x824);
pub const TIMG1PRER: RegOffset = RegOffset::new(0x828);
pub const TIMG2PRER: RegOffset = RegOffset::new(0x82C);
pub const PLL3CR: RegOffset = RegOffset::new(0x880);
pub const PLL3CFGR1: RegOffset = RegOffset::new(0x884);
pub const PLL3CFGR2: RegOffset = RegOffset::new(0x888);
pub const PLL3FRACR: RegOffset = RegOffset::new(0x88C);
pub const PLL3CSGR: RegOffset = RegOffset::new(0x890);
pub const PLL4CR: RegOffset = RegOffset::new(0x894);
pub const PLL4CFGR1: RegOffset = RegOffset::new(0x898);
pub const PLL4CFGR2: RegOffset = RegOffset::new(0x89C);
pub const PLL4FRACR: RegOffset = RegOffset::new(0x8A0);
pub const PLL4CSGR: RegOffset = RegOffset::new(0x8A4);
pub const I2C12CKSELR: RegOffset = RegOffset::new(0x8C0);
pub const I2C35CKSELR: RegOffset = RegOffset::new(0x8C4);
pub const SAI1CKSELR: RegOffset = RegOffset::new(0x8C8);
pub const SAI2CKSELR: RegOffset = RegOffset::new(0x8CC);
pub const SAI3CKSELR: RegOffset = RegOffset::new(0x8D0);
pub const SAI4CKSELR: RegOffset = RegOffset::new(0x8D4);
pub const SPI2S1CKSELR: RegOffset = RegOffset::new(0x8D8);
pub const SPI2S23CKSELR: RegOffset = RegOffset::new(0x8DC);
pub const SPI45CKSELR: RegOffset = RegOffset::new(0x8E0);
pub const UART6CKSELR: RegOffset = RegOffset::new(0x8E4);
pub const UART24CKSELR: RegOffset = RegOffset::new(0x8E8);
pub const UART35CKSELR: RegOffset = RegOffset::new(0x8EC);
pub const UART78CKSELR: RegOffset = RegOffset::new(0x8F0);
pub const SDMMC12CKSELR: RegOffset = RegOffset::new(0x8F4);
pub const SDMMC3CKSELR: RegOffset = RegOffset::new(0x8F8);
pub const ETHCKSELR: RegOffset = RegOffset::new(0x8FC);
pub const QSPICKSELR: RegOffset = RegOffset::new(0x900);
pub const FMCCKSELR: RegOffset = RegOffset::new(0x904);
pub const FDCANCKSELR: RegOffset = RegOffset::new(0x90C);
pub const SPDIFCKSELR: RegOffset = RegOffset::new(0x914);
pub const CECCKSELR: RegOffset = RegOffset::new(0x918);
pub const USBCKSELR: RegOffset = RegOffset::new(0x91C);
pub const RNG2CKSELR: RegOffset = RegOffset::new(0x920);
pub const DSICKSELR: RegOffset = RegOffset::new(0x924);
pub const ADCCKSELR: RegOffset = RegOffset::new(0x928);
pub const LPTIM45CKSELR: RegOffset = RegOffset::new(0x92C);
pub const LPTIM23CKSELR: RegOffset = RegOffset::new(0x930);
pub const LPTIM1CKSELR: RegOffset = RegOffset::new(0x934);
pub const MP_APB1ENSETR: RegOffset = RegOffset::new(0xA00);
pub const MP_APB2ENSETR: RegOffset = RegOffset::new(0xA08);
pub const MP_APB3ENSETR: RegOffset = RegOffset::new(0xA10);
pub const MP_AHB2ENSETR: RegOffset = RegOffset::new(0xA18);
pub const MP_AHB3ENSETR: RegOffset = RegOffset::new(0xA20);
pub const MP_AHB4ENSETR: RegOffset = RegOffset::new(0xA28);
pub const MP_MLAHBENSETR: RegOffset = RegOffset::new(0xA38);

/// Distance from a peripheral ENSETR register to its ENCLRR companion.
pub const MP_ENCLRR_OFFSET: u16 = 0x4;

// TZCR
pub const TZCR_TZEN: u32 = 1 << 0;
pub const TZCR_MCKPROT: u32 = 1 << 1;

// OCENSETR / OCENCLRR
pub const OCENR_HSION: u32 = 1 << 0;
pub const OCENR_HSIKERON: u32 = 1 << 1;
pub const OCENR_CSION: u32 = 1 << 4;
pub const OCENR_CSIKERON: u32 = 1 << 5;
pub const OCENR_DIGBYP: u32 = 1 << 7;
pub const OCENR_HSEON: u32 = 1 << 8;
pub const OCENR_HSEKERON: u32 = 1 << 9;
pub const OCENR_HSEBYP: u32 = 1 << 10;
pub const OCENR_HSECSSON: u32 = 1 << 11;
pub const OCENR_KER_MASK: u32 = OCENR_HSIKERON | OCENR_CSIKERON | OCENR_HSEKERON;

// OCRDYR
pub const OCRDYR_HSIRDY: u32 = 1 << 0;
pub const OCRDYR_HSIDIVRDY: u32 = 1 << 2;
pub const OCRDYR_CSIRDY: u32 = 1 << 4;
pub const OCRDYR_HSERDY: u32 = 1 << 8;

// HSICFGR
pub const HSICFGR_HSIDIV_MASK: u32 = 0x3;

// BDCR
pub const BDCR_LSEON: u32 = 1 << 0;
pub const BDCR_LSEBYP: u32 = 1 << 1;
pub const BDCR_LSERDY: u32 = 1 << 2;
pub const BDCR_DIGBYP: u32 = 1 << 3;
pub const BDCR_LSEDRV_SHIFT: u32 = 4;
pub const BDCR_LSEDRV_MASK: u32 = 0x3 << BDCR_LSEDRV_SHIFT;
pub const BDCR_LSECSSON: u32 = 1 << 8;
pub const BDCR_RTCSRC_SHIFT: u32 = 16;
pub const BDCR_RTCSRC_MASK: u32 = 0x3 << BDCR_RTCSRC_SHIFT;
pub const BDCR_RTCCKEN: u32 = 1 << 20;

// RDLSICR
pub const RDLSICR_LSION: u32 = 1 << 0;
pub const RDLSICR_LSIRDY: u32 = 1 << 1;

// Clock source selector registers (MPCKSELR, ASSCKSELR, MSSCKSELR,
// RCKxSELR) share the source field and ready flag layout.
pub const SELR_SRC_MASK: u32 = 0x3;
pub const SELR_SRCRDY: u32 = 1 << 31;

// Divider registers (xxDIVR) share the divider field and ready flag layout.
pub const DIVR_DIV_MASK: u32 = 0x3F;
pub const DIVR_DIVRDY: u32 = 1 << 31;

// PLLxCR
pub const PLLNCR_PLLON: u32 = 1 << 0;
pub const PLLNCR_PLLRDY: u32 = 1 << 1;
pub const PLLNCR_SSCG_CTRL: u32 = 1 << 2;
pub const PLLNCR_DIVPEN: u32 = 1 << 4;
pub const PLLNCR_DIVQEN: u32 = 1 << 5;
pub const PLLNCR_DIVREN: u32 = 1 << 6;
pub const PLLNCR_DIVEN_SHIFT: u32 = 4;

// PLLxCFGR1
pub const PLLNCFGR1_DIVN_MASK: u32 = 0x1FF;
pub const PLLNCFGR1_DIVM_SHIFT: u32 = 16;
pub const PLLNCFGR1_DIVM_MASK: u32 = 0x3F << PLLNCFGR1_DIVM_SHIFT;
pub const PLLNCFGR1_IFRGE_SHIFT: u32 = 24;

// PLLxCFGR2
pub const PLLNCFGR2_DIVX_MASK: u32 = 0x7F;
pub const PLLNCFGR2_DIVP_SHIFT: u32 = 0;
pub const PLLNCFGR2_DIVQ_SHIFT: u32 = 8;
pub const PLLNCFGR2_DIVR_SHIFT: u32 = 16;

// PLLxFRACR
pub const PLLNFRACR_FRACV_SHIFT: u32 = 3;
pub const PLLNFRACR_FRACV_MASK: u32 = 0x1FFF << PLLNFRACR_FRACV_SHIFT;
pub const PLLNFRACR_FRACLE: u32 = 1 << 16;

// PLLxCSGR
pub const PLLNCSGR_MOD_PER_MASK: u32 = 0x1FFF;
pub const PLLNCSGR_SSCG_MODE: u32 = 1 << 15;
pub const PLLNCSGR_INC_STEP_SHIFT: u32 = 16;
pub const PLLNCSGR_INC_STEP_MASK: u32 = 0x7FFF << PLLNCSGR_INC_STEP_SHIFT;

// MCOxCFGR
pub const MCOCFGR_MCOSEL_MASK: u32 = 0x7;
pub const MCOCFGR_MCODIV_SHIFT: u32 = 4;
pub const MCOCFGR_MCODIV_MASK: u32 = 0xF << MCOCFGR_MCODIV_SHIFT;
pub const MCOCFGR_MCOON: u32 = 1 << 12;

// USBCKSELR
pub const USBCKSELR_USBPHYSRC_MASK: u32 = 0x3;
pub const USBCKSELR_USBOSRC: u32 = 1 << 4;

// TIMGxPRER
pub const TIMGXPRER_TIMGXPRE: u32 = 1 << 0;

// DDRITFCR
pub const DDRITFCR_DDRCKMOD_SHIFT: u32 = 20;
pub const DDRITFCR_DDRCKMOD_MASK: u32 = 0x7 << DDRITFCR_DDRCKMOD_SHIFT;
pub const DDRITFCR_DDRCKMOD_SSR: u32 = 0x1;

// MP_RSTSCLRR
pub const RSTSCLRR_MPUP0RSTF: u32 = 1 << 13;

// DBGCFGR
pub const DBGCFGR_DBGCKEN: u32 = 1 << 8;

// Handshake time budgets.
pub const OSCRDY_TIMEOUT_US: u64 = 1_000_000;
pub const PLLRDY_TIMEOUT_US: u64 = 200_000;
pub const CLKSRC_TIMEOUT_US: u64 = 200_000;
pub const CLKDIV_TIMEOUT_US: u64 = 200_000;
pub const HSIDIV_TIMEOUT_US: u64 = 200_000;

/// Size of the RCC register bank in 32-bit words (0xA80 bytes).
pub const REG_WORDS: usize = 0x2A0;

/// The memory-mapped RCC register bank.
#[repr(transparent)]
pub struct RccRegisters([InMemoryRegister<u32>; REG_WORDS]);

impl RccRegisters {
    /// Obtain the register bank at a hardware base address.
    ///
    /// # Safety
    ///
    /// `base` must be the physical or virtual address the RCC block is
    /// mapped at, and no other owner may drive the block concurrently
    /// outside the locks provided by the platform.
    pub unsafe fn from_base(base: usize) -> &'static Self {
        &*(base as *const Self)
    }
}

#[cfg(test)]
impl RccRegisters {
    /// A zeroed in-memory bank for host tests.
    pub(crate) fn test_bank() -> &'static Self {
        Box::leak(Box::new(RccRegisters(core::array::from_fn(|_| {
            InMemoryRegister::new(0)
        }))))
    }
}

/// Cheap handle on the register bank shared by the driver components.
#[derive(Clone, Copy)]
pub struct Rcc<'a> {
    registers: &'a RccRegisters,
}

impl<'a> Rcc<'a> {
    pub fn new(registers: &'a RccRegisters) -> Rcc<'a> {
        Rcc { registers }
    }

    pub fn read(&self, reg: RegOffset) -> u32 {
        self.registers.0[reg.word()].get()
    }

    pub fn write(&self, reg: RegOffset, value: u32) {
        self.registers.0[reg.word()].set(value);
    }

    pub fn set_bits(&self, reg: RegOffset, mask: u32) {
        self.write(reg, self.read(reg) | mask);
    }

    pub fn clear_bits(&self, reg: RegOffset, mask: u32) {
        self.write(reg, self.read(reg) & !mask);
    }

    pub fn modify(&self, reg: RegOffset, clear: u32, set: u32) {
        self.write(reg, (self.read(reg) & !clear) | set);
    }

    /// Read-modify-write under the shared-register lock. Registers that
    /// both security worlds touch must go through these variants.
    pub fn set_bits_shregs(&self, platform: &dyn ClockPlatform, reg: RegOffset, mask: u32) {
        self.locked(platform, |rcc| rcc.set_bits(reg, mask));
    }

    pub fn clear_bits_shregs(&self, platform: &dyn ClockPlatform, reg: RegOffset, mask: u32) {
        self.locked(platform, |rcc| rcc.clear_bits(reg, mask));
    }

    pub fn modify_shregs(
        &self,
        platform: &dyn ClockPlatform,
        reg: RegOffset,
        clear: u32,
        set: u32,
    ) {
        self.locked(platform, |rcc| rcc.modify(reg, clear, set));
    }

    fn locked(&self, platform: &dyn ClockPlatform, op: impl FnOnce(&Self)) {
        let lock = platform.lock_available();
        if lock {
            platform.shared_regs_lock();
        }
        op(self);
        if lock {
            platform.shared_regs_unlock();
        }
    }

    /// Spin until `reg & mask == expected` or the microsecond budget runs
    /// out. The register is sampled once more after the deadline so a
    /// late flip still counts.
    pub fn poll_bits(
        &self,
        platform: &dyn ClockPlatform,
        reg: RegOffset,
        mask: u32,
        expected: u32,
        budget_us: u64,
    ) -> Result<(), Error> {
        let deadline = platform.now_us().saturating_add(budget_us);
        loop {
            if self.read(reg) & mask == expected {
                return Ok(());
            }
            if platform.now_us() > deadline {
                if self.read(reg) & mask == expected {
                    return Ok(());
                }
                log::error!(
                    "RCC+{:#05x} handshake timeout: {:#010x} (mask {:#010x}, want {:#010x})",
                    reg.byte(),
                    self.read(reg),
                    mask,
                    expected
                );
                return Err(Error::Timeout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FakeTime {
        now: Cell<u64>,
    }

    impl ClockPlatform for FakeTime {
        fn now_us(&self) -> u64 {
            let t = self.now.get();
            self.now.set(t + 1000);
            t
        }
    }

    #[test]
    fn clear_pair_addresses_the_companion_register() {
        assert_eq!(MP_APB5ENSETR.clear_pair().byte(), 0x20C);
        assert_eq!(MP_AHB6ENSETR.clear_pair().byte(), 0x21C);
        assert_eq!(MP_APB1ENSETR.clear_pair().byte(), 0xA04);
    }

    #[test]
    fn modify_touches_only_the_requested_field() {
        let rcc = Rcc::new(RccRegisters::test_bank());
        rcc.write(MPCKSELR, SELR_SRCRDY | 0x1);
        rcc.modify(MPCKSELR, SELR_SRC_MASK, 0x2);
        assert_eq!(rcc.read(MPCKSELR), SELR_SRCRDY | 0x2);

        rcc.set_bits(BDCR, BDCR_LSEON);
        rcc.clear_bits(BDCR, BDCR_LSEON);
        assert_eq!(rcc.read(BDCR), 0);
    }

    #[test]
    fn poll_succeeds_when_bits_already_match() {
        let rcc = Rcc::new(RccRegisters::test_bank());
        let time = FakeTime { now: Cell::new(0) };
        rcc.write(OCRDYR, OCRDYR_HSERDY);
        assert_eq!(
            rcc.poll_bits(&time, OCRDYR, OCRDYR_HSERDY, OCRDYR_HSERDY, 1_000),
            Ok(())
        );
    }

    #[test]
    fn poll_times_out_on_a_stuck_flag() {
        let rcc = Rcc::new(RccRegisters::test_bank());
        let time = FakeTime { now: Cell::new(0) };
        assert_eq!(
            rcc.poll_bits(&time, OCRDYR, OCRDYR_HSERDY, OCRDYR_HSERDY, 10_000),
            Err(Error::Timeout)
        );
    }

    #[test]
    fn shared_register_write_works_without_lock_service() {
        let rcc = Rcc::new(RccRegisters::test_bank());
        let time = FakeTime { now: Cell::new(0) };
        rcc.set_bits_shregs(&time, RDLSICR, RDLSICR_LSION);
        assert_eq!(rcc.read(RDLSICR), RDLSICR_LSION);
        rcc.modify_shregs(&time, BDCR, BDCR_LSEDRV_MASK, 0x2 << BDCR_LSEDRV_SHIFT);
        assert_eq!(rcc.read(BDCR), 0x2 << BDCR_LSEDRV_SHIFT);
    }
}
