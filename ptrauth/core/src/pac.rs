//! Sign and authenticate engines.
//!
//! Layout of a signed pointer:
//!
//! ```text
//! 63 | 62         48 | 47          0
//! +--+--------------+--------------+
//! |HI|  signature   |   address    |
//! +--+--------------+--------------+
//! ```
//!
//! Bit 63 selects the high (kernel) or low (user) half of the address space and is never
//! overwritten by the signature.

use crate::cipher::{TweakableCipher, PAC_ROUNDS};

/// Bits 48..=62 carry the signature.
pub const SIG_MASK: u64 = 0x7FFF << 48;

/// Bits forced to one when canonicalizing a high-half address.
pub const CANONICAL_HIGH_MASK: u64 = 0xFFFF << 48;

/// Returned by [`authenticate`] on mismatch. Shares its value with a genuine null pointer.
pub const TAMPER_SENTINEL: u64 = 0;

const HIGH_HALF_BIT: u64 = 1 << 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Signature matched; holds the canonical address.
    Valid(u64),
    /// Signature did not match the one recomputed from the address bits.
    Tampered { expected: u64, found: u64 },
}

impl AuthOutcome {
    /// Value the device latches into RESULT.
    pub fn register_value(self) -> u64 {
        match self {
            AuthOutcome::Valid(addr) => addr,
            AuthOutcome::Tampered { .. } => TAMPER_SENTINEL,
        }
    }

    pub fn is_valid(self) -> bool {
        matches!(self, AuthOutcome::Valid(_))
    }
}

/// Extracts the raw signature field, left in place.
pub fn signature_of(pointer: u64) -> u64 {
    pointer & SIG_MASK
}

/// Sign-extends bit 63 over bits 48..=63. Expects the signature field already cleared.
pub fn canonicalize(cleaned: u64) -> u64 {
    if cleaned & HIGH_HALF_BIT == 0 {
        cleaned
    } else {
        cleaned | CANONICAL_HIGH_MASK
    }
}

/// Drops the signature without checking it.
pub fn strip(pointer: u64) -> u64 {
    canonicalize(pointer & !SIG_MASK)
}

fn expected_signature<C>(cleaned: u64, tweak: u64, key_lo: u64, key_hi: u64, cipher: &C) -> u64
where
    C: TweakableCipher + ?Sized,
{
    cipher.encrypt(cleaned, tweak, key_lo, key_hi, PAC_ROUNDS) & SIG_MASK
}

pub fn sign<C>(pointer: u64, tweak: u64, key_lo: u64, key_hi: u64, cipher: &C) -> u64
where
    C: TweakableCipher + ?Sized,
{
    let cleaned = pointer & !SIG_MASK;
    cleaned | expected_signature(cleaned, tweak, key_lo, key_hi, cipher)
}

pub fn authenticate_checked<C>(
    signed_pointer: u64,
    tweak: u64,
    key_lo: u64,
    key_hi: u64,
    cipher: &C,
) -> AuthOutcome
where
    C: TweakableCipher + ?Sized,
{
    let cleaned = signed_pointer & !SIG_MASK;
    let found = signature_of(signed_pointer);
    let expected = expected_signature(cleaned, tweak, key_lo, key_hi, cipher);
    if expected != found {
        return AuthOutcome::Tampered { expected, found };
    }
    AuthOutcome::Valid(canonicalize(cleaned))
}

pub fn authenticate<C>(
    signed_pointer: u64,
    tweak: u64,
    key_lo: u64,
    key_hi: u64,
    cipher: &C,
) -> u64
where
    C: TweakableCipher + ?Sized,
{
    authenticate_checked(signed_pointer, tweak, key_lo, key_hi, cipher).register_value()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{IdentityCipher, Qarma64};

    #[test]
    fn signature_mask_leaves_bit_63_alone() {
        assert_eq!(SIG_MASK, 0x7FFF_0000_0000_0000);
        assert_eq!(SIG_MASK & (1 << 63), 0);
        assert_eq!(SIG_MASK.count_ones(), 15);
    }

    #[test]
    fn sign_preserves_address_and_high_half_bit() {
        let pointer = 0x8000_7FFF_DEAD_BEEF;
        let signed = sign(pointer, 3, 0xABC, 0xDEF, &Qarma64);
        assert_eq!(signed & !SIG_MASK, pointer & !SIG_MASK);
        assert_eq!(signed >> 63, 1);
    }

    #[test]
    fn sign_overwrites_existing_signature_bits() {
        let with_junk = 0x1234_0000_0000_1000;
        let clean = 0x0000_0000_0000_1000;
        assert_eq!(
            sign(with_junk, 0, 0xABC, 0xDEF, &Qarma64),
            sign(clean, 0, 0xABC, 0xDEF, &Qarma64)
        );
    }

    #[test]
    fn identity_cipher_yields_empty_signature_for_low_addresses() {
        assert_eq!(sign(0x1234_5678, 0, 0xABC, 0xDEF, &IdentityCipher), 0x1234_5678);
    }

    #[test]
    fn authenticate_reconstructs_canonical_high_address() {
        let pointer = 0x8000_0000_0000_4000;
        let signed = sign(pointer, 9, 1, 2, &Qarma64);
        assert_eq!(authenticate(signed, 9, 1, 2, &Qarma64), 0xFFFF_0000_0000_4000);
    }

    #[test]
    fn tampered_signature_reports_expected_and_found() {
        let signed = sign(0x4000, 0, 0xABC, 0xDEF, &Qarma64);
        let forged = signed ^ (1 << 50);
        match authenticate_checked(forged, 0, 0xABC, 0xDEF, &Qarma64) {
            AuthOutcome::Tampered { expected, found } => {
                assert_eq!(expected, signature_of(signed));
                assert_eq!(found, signature_of(forged));
            }
            other => panic!("expected tamper, got {other:?}"),
        }
        assert_eq!(authenticate(forged, 0, 0xABC, 0xDEF, &Qarma64), TAMPER_SENTINEL);
    }

    #[test]
    fn strip_canonicalizes_without_checking() {
        assert_eq!(strip(0x7FFF_0000_0000_1000), 0x1000);
        assert_eq!(strip(0x8123_0000_0000_1000), 0xFFFF_0000_0000_1000);
    }
}
