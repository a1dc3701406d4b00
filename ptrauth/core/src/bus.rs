//! Bus framework the device plugs into: address decoding plus width and alignment checks.
//!
//! Devices only ever see pre-validated, window-relative transactions.

use crate::device::MmioDevice;
use crate::registers::DeviceState;
use thiserror::Error;
use tracing::trace;

pub const ACCESS_WIDTHS: [u32; 2] = [4, 8];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("unsupported access width {width} at {addr:#x}")]
    InvalidWidth { addr: u64, width: u32 },
    #[error("misaligned {width}-byte access at {addr:#x}")]
    Misaligned { addr: u64, width: u32 },
    #[error("no device mapped at {addr:#x}")]
    Unmapped { addr: u64 },
    #[error("window {base:#x}+{size:#x} overlaps device {existing}")]
    Overlap {
        base: u64,
        size: u64,
        existing: String,
    },
}

struct Mapping {
    base: u64,
    size: u64,
    device: Box<dyn MmioDevice>,
}

impl Mapping {
    fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr - self.base < self.size
    }

    fn overlaps(&self, base: u64, size: u64) -> bool {
        base < self.base.saturating_add(self.size) && self.base < base.saturating_add(size)
    }
}

#[derive(Default)]
pub struct SystemBus {
    mappings: Vec<Mapping>,
}

fn width_mask(width: u32) -> u64 {
    if width >= 8 {
        u64::MAX
    } else {
        (1u64 << (width * 8)) - 1
    }
}

impl SystemBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `device` so that its window starts at `base`.
    pub fn map(&mut self, base: u64, device: Box<dyn MmioDevice>) -> Result<(), BusError> {
        let size = device.window_size();
        if let Some(existing) = self.mappings.iter().find(|m| m.overlaps(base, size)) {
            return Err(BusError::Overlap {
                base,
                size,
                existing: existing.device.name().to_string(),
            });
        }
        self.mappings.push(Mapping { base, size, device });
        Ok(())
    }

    pub fn devices(&self) -> impl Iterator<Item = (u64, &dyn MmioDevice)> + '_ {
        self.mappings.iter().map(|m| (m.base, m.device.as_ref()))
    }

    pub fn device_mut(&mut self, name: &str) -> Option<&mut (dyn MmioDevice + 'static)> {
        self.mappings
            .iter_mut()
            .find(|m| m.device.name() == name)
            .map(|m| m.device.as_mut())
    }

    pub fn device_state(&self, name: &str) -> Option<&DeviceState> {
        self.mappings
            .iter()
            .find(|m| m.device.name() == name)
            .and_then(|m| m.device.state())
    }

    fn check(addr: u64, width: u32) -> Result<(), BusError> {
        if !ACCESS_WIDTHS.contains(&width) {
            return Err(BusError::InvalidWidth { addr, width });
        }
        if addr % width as u64 != 0 {
            return Err(BusError::Misaligned { addr, width });
        }
        Ok(())
    }

    fn decode(&mut self, addr: u64) -> Result<(&mut Mapping, u64), BusError> {
        let mapping = self
            .mappings
            .iter_mut()
            .find(|m| m.contains(addr))
            .ok_or(BusError::Unmapped { addr })?;
        let offset = addr - mapping.base;
        Ok((mapping, offset))
    }

    /// Reads are truncated to the access width.
    pub fn read(&mut self, addr: u64, width: u32) -> Result<u64, BusError> {
        Self::check(addr, width)?;
        let (mapping, offset) = self.decode(addr)?;
        let value = mapping.device.read(offset, width) & width_mask(width);
        trace!(addr = format_args!("{addr:#x}"), width, value, "bus read");
        Ok(value)
    }

    /// Narrow writes are zero-extended before reaching the device.
    pub fn write(&mut self, addr: u64, width: u32, value: u64) -> Result<(), BusError> {
        Self::check(addr, width)?;
        let (mapping, offset) = self.decode(addr)?;
        trace!(addr = format_args!("{addr:#x}"), width, value, "bus write");
        mapping.device.write(offset, width, value & width_mask(width));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::TweakableCipher;
    use crate::device::PtrauthDevice;
    use crate::pac::SIG_MASK;

    const BASE: u64 = 0x0900_0000;

    fn bus_with_device() -> SystemBus {
        let mut bus = SystemBus::new();
        bus.map(BASE, Box::new(PtrauthDevice::new())).expect("map");
        bus
    }

    #[test]
    fn rejects_bad_width_and_alignment() {
        let mut bus = bus_with_device();
        assert_eq!(
            bus.read(BASE, 2),
            Err(BusError::InvalidWidth { addr: BASE, width: 2 })
        );
        assert_eq!(
            bus.write(BASE + 4, 8, 1),
            Err(BusError::Misaligned { addr: BASE + 4, width: 8 })
        );
    }

    #[test]
    fn unmapped_addresses_fault_at_the_bus() {
        let mut bus = bus_with_device();
        assert_eq!(bus.read(BASE + 0x2000, 8), Err(BusError::Unmapped { addr: BASE + 0x2000 }));
    }

    #[test]
    fn narrow_accesses_truncate_and_zero_extend() {
        let mut bus = bus_with_device();
        bus.write(BASE + 0x1018, 4, 0xFFFF_FFFF_1234_5678).expect("write");
        assert_eq!(bus.device_state("qarma").map(|s| s.tweak), Some(0x1234_5678));
        bus.write(BASE, 8, 0xAAAA_BBBB_CCCC_DDDD).expect("write");
        assert_eq!(bus.read(BASE, 4), Ok(0xCCCC_DDDD));
        assert_eq!(bus.read(BASE, 8), Ok(0xAAAA_BBBB_CCCC_DDDD));
    }

    /// Every signature bit comes out set, so an empty signature field never authenticates.
    struct ComplementCipher;

    impl TweakableCipher for ComplementCipher {
        fn encrypt(&self, plaintext: u64, _tweak: u64, _lo: u64, _hi: u64, _rounds: u32) -> u64 {
            !plaintext
        }
    }

    #[test]
    fn narrow_result_access_sees_low_half_and_drains_whole_mailbox() {
        let mut bus = SystemBus::new();
        bus.map(BASE, Box::new(PtrauthDevice::with_cipher(ComplementCipher)))
            .expect("map");
        let pointer = 0x0000_7FFF_0000_1000;
        let signed = pointer | SIG_MASK;

        bus.write(BASE + 0x1010, 8, pointer).expect("plaintext");
        assert_eq!(bus.read(BASE + 0x1020, 4), Ok(0x0000_1000));
        assert_eq!(bus.read(BASE + 0x1020, 8), Ok(0), "narrow read must drain all 64 bits");

        bus.write(BASE + 0x1020, 8, signed).expect("auth");
        assert_eq!(bus.read(BASE + 0x1020, 8), Ok(pointer));

        // Zero-extension strips the signature field, so the narrow write fails authentication.
        bus.write(BASE + 0x1020, 4, signed).expect("auth");
        assert_eq!(bus.read(BASE + 0x1020, 8), Ok(0));
    }

    #[test]
    fn narrow_plaintext_write_signs_zero_extended_pointer() {
        let mut bus = SystemBus::new();
        bus.map(BASE, Box::new(PtrauthDevice::with_cipher(ComplementCipher)))
            .expect("map");
        bus.write(BASE + 0x1010, 4, 0xFFFF_FFFF_1234_5678).expect("plaintext");
        assert_eq!(bus.read(BASE + 0x1010, 8), Ok(0x1234_5678));
        assert_eq!(bus.read(BASE + 0x1020, 8), Ok(0x1234_5678 | SIG_MASK));
    }

    #[test]
    fn overlapping_windows_are_refused() {
        let mut bus = bus_with_device();
        let err = bus
            .map(BASE + 0x1000, Box::new(PtrauthDevice::new().named("second")))
            .unwrap_err();
        assert!(matches!(err, BusError::Overlap { .. }));
        bus.map(BASE + 0x2000, Box::new(PtrauthDevice::new().named("second")))
            .expect("adjacent window maps");
        assert_eq!(bus.devices().count(), 2);
    }
}
