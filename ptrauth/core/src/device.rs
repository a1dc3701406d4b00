use crate::cipher::{Qarma64, TweakableCipher};
use crate::pac::{self, AuthOutcome};
use crate::registers::{unmapped_read_pattern, DeviceState, RegisterOffset, MMIO_WINDOW_SIZE};
use tracing::{debug, trace, warn};

/// A peripheral reachable through offset-addressed, fixed-width bus transactions.
///
/// The bus has already validated width and alignment and translated the address into an
/// offset relative to the device's window.
pub trait MmioDevice {
    fn read(&mut self, offset: u64, width: u32) -> u64;
    fn write(&mut self, offset: u64, width: u32, value: u64);
    fn name(&self) -> &str;
    fn window_size(&self) -> u64;

    /// Register file, for devices that expose one to snapshots.
    fn state(&self) -> Option<&DeviceState> {
        None
    }

    fn state_mut(&mut self) -> Option<&mut DeviceState> {
        None
    }
}

/// Details of a rejected authentication, handed to the failure hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthFailure {
    pub signed_pointer: u64,
    pub tweak: u64,
    pub expected_signature: u64,
    pub found_signature: u64,
}

pub type AuthFailureHook = Box<dyn FnMut(&AuthFailure)>;

pub struct PtrauthDevice<C = Qarma64> {
    name: String,
    state: DeviceState,
    cipher: C,
    window_size: u64,
    on_auth_failure: Option<AuthFailureHook>,
}

impl Default for PtrauthDevice<Qarma64> {
    fn default() -> Self {
        Self::new()
    }
}

impl PtrauthDevice<Qarma64> {
    pub fn new() -> Self {
        Self::with_cipher(Qarma64)
    }
}

impl<C: TweakableCipher> PtrauthDevice<C> {
    pub fn with_cipher(cipher: C) -> Self {
        Self {
            name: "qarma".to_string(),
            state: DeviceState::default(),
            cipher,
            window_size: MMIO_WINDOW_SIZE,
            on_auth_failure: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_window_size(mut self, size: u64) -> Self {
        self.window_size = size;
        self
    }

    /// Installs a callback run on every authentication mismatch. RESULT still receives the
    /// tamper sentinel; the hook only observes.
    pub fn set_auth_failure_hook(&mut self, hook: impl FnMut(&AuthFailure) + 'static) {
        self.on_auth_failure = Some(Box::new(hook));
    }

    pub fn clear_auth_failure_hook(&mut self) {
        self.on_auth_failure = None;
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut DeviceState {
        &mut self.state
    }

    pub fn cipher(&self) -> &C {
        &self.cipher
    }

    /// Back to attach-time defaults. The failure hook stays installed.
    pub fn reset(&mut self) {
        self.state = DeviceState::default();
    }

    pub fn read_register(&mut self, reg: RegisterOffset) -> u64 {
        match reg {
            RegisterOffset::Result => self.state.take_result(),
            other => self.state.get(other),
        }
    }

    pub fn write_register(&mut self, reg: RegisterOffset, value: u64) {
        match reg {
            RegisterOffset::Plaintext => {
                self.state.plaintext = value;
                self.state.result = self.sign_current(value);
            }
            RegisterOffset::Result => {
                self.state.result = self.authenticate_current(value);
            }
            other => self.state.set(other, value),
        }
    }

    fn sign_current(&self, pointer: u64) -> u64 {
        let DeviceState {
            key_lo,
            key_hi,
            tweak,
            ..
        } = self.state;
        let signed = pac::sign(pointer, tweak, key_lo, key_hi, &self.cipher);
        debug!(
            device = %self.name,
            pointer = format_args!("{pointer:#018x}"),
            signed = format_args!("{signed:#018x}"),
            "sign"
        );
        signed
    }

    fn authenticate_current(&mut self, signed_pointer: u64) -> u64 {
        let DeviceState {
            key_lo,
            key_hi,
            tweak,
            ..
        } = self.state;
        let outcome =
            pac::authenticate_checked(signed_pointer, tweak, key_lo, key_hi, &self.cipher);
        match outcome {
            AuthOutcome::Valid(addr) => {
                debug!(
                    device = %self.name,
                    pointer = format_args!("{signed_pointer:#018x}"),
                    addr = format_args!("{addr:#018x}"),
                    "auth ok"
                );
            }
            AuthOutcome::Tampered { expected, found } => {
                warn!(
                    device = %self.name,
                    pointer = format_args!("{signed_pointer:#018x}"),
                    expected = format_args!("{expected:#x}"),
                    found = format_args!("{found:#x}"),
                    "auth failed"
                );
                if let Some(hook) = self.on_auth_failure.as_mut() {
                    hook(&AuthFailure {
                        signed_pointer,
                        tweak,
                        expected_signature: expected,
                        found_signature: found,
                    });
                }
            }
        }
        outcome.register_value()
    }
}

impl<C: TweakableCipher> MmioDevice for PtrauthDevice<C> {
    fn read(&mut self, offset: u64, width: u32) -> u64 {
        match RegisterOffset::from_offset(offset) {
            Some(reg) => self.read_register(reg),
            None => {
                trace!(device = %self.name, offset, width, "read from unmapped offset");
                unmapped_read_pattern(offset, width)
            }
        }
    }

    fn write(&mut self, offset: u64, width: u32, value: u64) {
        match RegisterOffset::from_offset(offset) {
            Some(reg) => self.write_register(reg, value),
            None => {
                trace!(device = %self.name, offset, width, value, "unmapped write dropped");
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn window_size(&self) -> u64 {
        self.window_size
    }

    fn state(&self) -> Option<&DeviceState> {
        Some(&self.state)
    }

    fn state_mut(&mut self) -> Option<&mut DeviceState> {
        Some(&mut self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::IdentityCipher;
    use crate::pac::SIG_MASK;
    use std::cell::RefCell;
    use std::rc::Rc;

    const KEY_LO: u64 = 0x0;
    const KEY_HI: u64 = 0x8;
    const PLAINTEXT: u64 = 0x1010;
    const TWEAK: u64 = 0x1018;
    const RESULT: u64 = 0x1020;

    #[test]
    fn key_and_tweak_writes_are_plain_stores() {
        let mut dev = PtrauthDevice::new();
        dev.write(KEY_LO, 8, 0x1111);
        dev.write(KEY_HI, 8, 0x2222);
        dev.write(TWEAK, 8, 0x3333);
        assert_eq!(dev.read(KEY_LO, 8), 0x1111);
        assert_eq!(dev.read(KEY_HI, 8), 0x2222);
        assert_eq!(dev.read(TWEAK, 8), 0x3333);
        assert_eq!(dev.read(RESULT, 8), 0, "stores must not latch a result");
    }

    #[test]
    fn plaintext_write_latches_signature_and_read_drains_it() {
        let mut dev = PtrauthDevice::with_cipher(IdentityCipher);
        dev.write(PLAINTEXT, 8, 0x0000_0000_1234_5678);
        assert_eq!(dev.read(PLAINTEXT, 8), 0x1234_5678);
        assert_eq!(dev.read(RESULT, 8), 0x1234_5678);
        assert_eq!(dev.read(RESULT, 8), 0);
    }

    #[test]
    fn result_write_authenticates_in_place() {
        let mut dev = PtrauthDevice::new();
        dev.write(TWEAK, 8, 0x77);
        dev.write(PLAINTEXT, 8, 0x8000_0000_0000_2000);
        let signed = dev.read(RESULT, 8);
        dev.write(RESULT, 8, signed);
        assert_eq!(dev.read(RESULT, 8), 0xFFFF_0000_0000_2000);
    }

    #[test]
    fn result_write_overwrites_pending_signature() {
        let mut dev = PtrauthDevice::with_cipher(IdentityCipher);
        dev.write(PLAINTEXT, 8, 0x4000);
        dev.write(RESULT, 8, 0x4000 | (1 << 52));
        assert_eq!(dev.read(RESULT, 8), 0);
    }

    #[test]
    fn engines_use_keys_current_at_trigger_time() {
        let mut dev = PtrauthDevice::new();
        dev.write(PLAINTEXT, 8, 0x1000);
        let signed = dev.read(RESULT, 8);
        dev.write(KEY_HI, 8, 0x1234);
        let resigned = pac::sign(0x1000, 0, 0xABC, 0x1234, &Qarma64);
        dev.write(PLAINTEXT, 8, 0x1000);
        assert_eq!(dev.read(RESULT, 8), resigned);
        assert_eq!(signed, pac::sign(0x1000, 0, 0xABC, 0xDEF, &Qarma64));
    }

    #[test]
    fn unmapped_offsets_read_diagnostic_and_ignore_writes() {
        let mut dev = PtrauthDevice::new();
        let before = *dev.state();
        dev.write(0x10, 8, 0xFFFF);
        dev.write(0x1028, 4, 0xFFFF);
        assert_eq!(*dev.state(), before);
        assert_eq!(dev.read(0x10, 8), 0xF008_0010);
        assert_eq!(dev.read(0x1028, 4), 0xF004_1028);
    }

    #[test]
    fn failure_hook_sees_mismatch_and_result_stays_sentinel() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut dev = PtrauthDevice::new();
        dev.set_auth_failure_hook(move |failure| sink.borrow_mut().push(*failure));

        dev.write(PLAINTEXT, 8, 0x5000);
        let signed = dev.read(RESULT, 8);
        dev.write(RESULT, 8, signed);
        assert!(seen.borrow().is_empty(), "valid pointer must not fire the hook");
        assert_eq!(dev.read(RESULT, 8), 0x5000);

        let forged = signed ^ (1 << 48);
        dev.write(RESULT, 8, forged);
        assert_eq!(dev.read(RESULT, 8), 0);
        let failures = seen.borrow();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].signed_pointer, forged);
        assert_eq!(failures[0].expected_signature, signed & SIG_MASK);
        assert_eq!(failures[0].found_signature, forged & SIG_MASK);
    }

    #[test]
    fn reset_restores_defaults() {
        let mut dev = PtrauthDevice::new();
        dev.write(KEY_LO, 8, 1);
        dev.write(PLAINTEXT, 8, 0x42);
        dev.reset();
        assert_eq!(*dev.state(), DeviceState::default());
    }
}
