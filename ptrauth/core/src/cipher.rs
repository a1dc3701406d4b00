//! Seam between the device and its block cipher.

use rust_qarma::qarma64_enc;

/// Round count the sign and auth engines always request.
pub const PAC_ROUNDS: u32 = 7;

/// Deterministic, stateless tweakable block cipher.
pub trait TweakableCipher {
    fn encrypt(&self, plaintext: u64, tweak: u64, key_lo: u64, key_hi: u64, rounds: u32) -> u64;
}

/// QARMA-64 with `key_lo` as the whitening key and `key_hi` as the core key.
#[derive(Debug, Clone, Copy, Default)]
pub struct Qarma64;

impl TweakableCipher for Qarma64 {
    fn encrypt(&self, plaintext: u64, tweak: u64, key_lo: u64, key_hi: u64, rounds: u32) -> u64 {
        qarma64_enc(plaintext, tweak, key_lo, key_hi, rounds)
    }
}

/// Returns the plaintext unchanged. Useful for asserting exact register values in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCipher;

impl TweakableCipher for IdentityCipher {
    fn encrypt(
        &self,
        plaintext: u64,
        _tweak: u64,
        _key_lo: u64,
        _key_hi: u64,
        _rounds: u32,
    ) -> u64 {
        plaintext
    }
}

impl<C: TweakableCipher + ?Sized> TweakableCipher for &C {
    fn encrypt(&self, plaintext: u64, tweak: u64, key_lo: u64, key_hi: u64, rounds: u32) -> u64 {
        (**self).encrypt(plaintext, tweak, key_lo, key_hi, rounds)
    }
}

impl<C: TweakableCipher + ?Sized> TweakableCipher for Box<C> {
    fn encrypt(&self, plaintext: u64, tweak: u64, key_lo: u64, key_hi: u64, rounds: u32) -> u64 {
        (**self).encrypt(plaintext, tweak, key_lo, key_hi, rounds)
    }
}
