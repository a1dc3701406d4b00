use serde::{Deserialize, Serialize};

pub const DEFAULT_KEY_LO: u64 = 0xABC;
pub const DEFAULT_KEY_HI: u64 = 0xDEF;

/// Device-class identifier advertised to platform tooling. No register exposes it.
pub const CHIP_ID: u64 = 0xBA00_0002;

pub const MMIO_WINDOW_SIZE: u64 = 0x2000;
/// Trailing part of the window advertised as private in the device tree.
pub const PRIVATE_WINDOW_SIZE: u64 = 0x1000;

const UNMAPPED_READ_BASE: u64 = 0xF000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterOffset {
    KeyLo,
    KeyHi,
    Plaintext,
    Tweak,
    Result,
}

impl RegisterOffset {
    pub const ALL: [RegisterOffset; 5] = [
        RegisterOffset::KeyLo,
        RegisterOffset::KeyHi,
        RegisterOffset::Plaintext,
        RegisterOffset::Tweak,
        RegisterOffset::Result,
    ];

    pub fn offset(self) -> u64 {
        match self {
            RegisterOffset::KeyLo => 0x0,
            RegisterOffset::KeyHi => 0x8,
            RegisterOffset::Plaintext => 0x1010,
            RegisterOffset::Tweak => 0x1018,
            RegisterOffset::Result => 0x1020,
        }
    }

    pub fn from_offset(offset: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|reg| reg.offset() == offset)
    }

    pub fn name(self) -> &'static str {
        match self {
            RegisterOffset::KeyLo => "KEY_LO",
            RegisterOffset::KeyHi => "KEY_HI",
            RegisterOffset::Plaintext => "PLAINTEXT",
            RegisterOffset::Tweak => "TWEAK",
            RegisterOffset::Result => "RESULT",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL.into_iter().find(|reg| reg.name() == trimmed)
    }
}

/// Register file. `result` is a one-shot mailbox; everything else persists until rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub key_lo: u64,
    pub key_hi: u64,
    pub tweak: u64,
    pub plaintext: u64,
    pub result: u64,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            key_lo: DEFAULT_KEY_LO,
            key_hi: DEFAULT_KEY_HI,
            tweak: 0,
            plaintext: 0,
            result: 0,
        }
    }
}

impl DeviceState {
    /// Plain load with no side effects. RESULT draining lives in the device.
    pub fn get(&self, reg: RegisterOffset) -> u64 {
        match reg {
            RegisterOffset::KeyLo => self.key_lo,
            RegisterOffset::KeyHi => self.key_hi,
            RegisterOffset::Plaintext => self.plaintext,
            RegisterOffset::Tweak => self.tweak,
            RegisterOffset::Result => self.result,
        }
    }

    /// Plain store with no side effects. Sign/auth triggers live in the device.
    pub fn set(&mut self, reg: RegisterOffset, value: u64) {
        match reg {
            RegisterOffset::KeyLo => self.key_lo = value,
            RegisterOffset::KeyHi => self.key_hi = value,
            RegisterOffset::Plaintext => self.plaintext = value,
            RegisterOffset::Tweak => self.tweak = value,
            RegisterOffset::Result => self.result = value,
        }
    }

    pub fn take_result(&mut self) -> u64 {
        std::mem::take(&mut self.result)
    }
}

/// Value returned for reads that hit no register, so bus probes can see offset and width.
pub fn unmapped_read_pattern(offset: u64, width: u32) -> u64 {
    UNMAPPED_READ_BASE
        .wrapping_add(offset)
        .wrapping_add((width as u64) << 16)
}
