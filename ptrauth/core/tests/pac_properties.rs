use proptest::prelude::*;
use ptrauth_core::{
    authenticate, sign, IdentityCipher, MmioDevice, PtrauthDevice, Qarma64, RegisterOffset,
    CANONICAL_HIGH_MASK, SIG_MASK, TAMPER_SENTINEL,
};
use std::collections::HashSet;

proptest! {
    #[test]
    fn low_half_round_trip(p in any::<u64>(), tweak in any::<u64>(), lo in any::<u64>(), hi in any::<u64>()) {
        let p = p & !(1 << 63);
        let signed = sign(p, tweak, lo, hi, &Qarma64);
        prop_assert_eq!(authenticate(signed, tweak, lo, hi, &Qarma64), p & !SIG_MASK);
    }

    #[test]
    fn high_half_round_trip_canonicalizes(p in any::<u64>(), tweak in any::<u64>(), lo in any::<u64>(), hi in any::<u64>()) {
        let p = p | (1 << 63);
        let signed = sign(p, tweak, lo, hi, &Qarma64);
        prop_assert_eq!(
            authenticate(signed, tweak, lo, hi, &Qarma64),
            (p & !SIG_MASK) | CANONICAL_HIGH_MASK
        );
    }

    #[test]
    fn flipping_a_signature_bit_is_detected(p in any::<u64>(), tweak in any::<u64>(), bit in 48u32..63) {
        let signed = sign(p, tweak, 0xABC, 0xDEF, &Qarma64);
        prop_assert_eq!(authenticate(signed ^ (1 << bit), tweak, 0xABC, 0xDEF, &Qarma64), TAMPER_SENTINEL);
    }

    #[test]
    fn stub_cipher_detects_any_signature_flip(p in 0u64..(1 << 48), bit in 48u32..63) {
        let signed = sign(p, 0, 0xABC, 0xDEF, &IdentityCipher);
        prop_assert_eq!(signed, p);
        prop_assert_eq!(authenticate(signed ^ (1 << bit), 0, 0xABC, 0xDEF, &IdentityCipher), 0);
    }

    #[test]
    fn result_register_is_one_shot(p in any::<u64>()) {
        let mut dev = PtrauthDevice::new();
        dev.write(RegisterOffset::Plaintext.offset(), 8, p);
        let first = dev.read(RegisterOffset::Result.offset(), 8);
        prop_assert_eq!(first, sign(p, 0, 0xABC, 0xDEF, &Qarma64));
        prop_assert_eq!(dev.read(RegisterOffset::Result.offset(), 8), 0);
    }
}

#[test]
fn signatures_depend_on_keys_and_tweak() {
    let pointer = 0x0000_5555_0000_1000;
    let by_key_hi: HashSet<u64> = (0..8u64)
        .map(|hi| sign(pointer, 0, 0xABC, hi, &Qarma64))
        .collect();
    let by_key_lo: HashSet<u64> = (0..8u64)
        .map(|lo| sign(pointer, 0, lo, 0xDEF, &Qarma64))
        .collect();
    let by_tweak: HashSet<u64> = (0..8u64)
        .map(|tweak| sign(pointer, tweak, 0xABC, 0xDEF, &Qarma64))
        .collect();
    assert!(by_key_hi.len() > 1, "key_hi must influence the signature");
    assert!(by_key_lo.len() > 1, "key_lo must influence the signature");
    assert!(by_tweak.len() > 1, "tweak must influence the signature");
}
