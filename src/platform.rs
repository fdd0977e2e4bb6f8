// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2024.

//! Services the SoC integration provides to the clock driver.

/// Errors surfaced by the clock driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// A hardware handshake did not complete within its time budget.
    Timeout,
    /// The requested clock, operating point or selector entry does not exist.
    NotFound,
    /// A caller-supplied value is outside the range the hardware accepts.
    InvalidArgument,
    /// The operation is not permitted in the current clock configuration.
    PermissionDenied,
    /// Required state (for example the PLL1 settings table) is not valid.
    AccessDenied,
    /// The hardware ended up in a configuration the driver cannot accept.
    BadValue,
}

/// Execution context the driver instance runs in. The gate engine policy
/// depends on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Cold-boot firmware: owns the whole tree, reference counts every gate.
    BringUp,
    /// Secure runtime: reference counts secure gates, writes non-secure
    /// gates through on enable and never disables them.
    SecureRuntime,
    /// Non-secure runtime: reference counts non-secure gates, refuses
    /// secure ones.
    NonSecureRuntime,
}

/// Shared hardware resource whose ownership the secure runtime tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SharedResource {
    Pll3,
}

/// Platform services the driver calls out to.
///
/// Every method except [`now_us`](ClockPlatform::now_us) has a default
/// no-op implementation so a minimal platform only needs a timebase.
pub trait ClockPlatform {
    /// Monotonic microsecond counter used for handshake time budgets.
    fn now_us(&self) -> u64;

    /// Whether the spinlock services below may be used yet. Early boot
    /// runs before the lock infrastructure is up.
    fn lock_available(&self) -> bool {
        false
    }

    /// Lock protecting RCC registers shared with the other security world.
    fn shared_regs_lock(&self) {}
    fn shared_regs_unlock(&self) {}

    /// Lock protecting the gate reference counters.
    fn refcount_lock(&self) {}
    fn refcount_unlock(&self) {}

    /// The STGEN kernel clock rate changed; resync the system counter.
    fn stgen_update(&self, _rate_hz: u64) {}

    /// Record that a secure consumer depends on a shared resource.
    fn register_secure_parent(&self, _resource: SharedResource) {}

    /// Whether the SoC booted from USB (the bootrom then left PLL4 running
    /// for the USB PHY and the driver must not disturb it).
    fn boot_on_usb(&self) -> bool {
        false
    }

    /// Fill `freq_khz`/`volt_mv` with the supported MPU operating points,
    /// returning how many were written. `Err(Error::NotFound)` means the
    /// platform carries no OPP table.
    fn opp_freqvolt(
        &self,
        _freq_khz: &mut [u32],
        _volt_mv: &mut [u32],
    ) -> Result<usize, Error> {
        Err(Error::NotFound)
    }
}
