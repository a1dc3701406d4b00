/// Number of round constants; callers asking for more rounds are clamped to this.
pub const MAX_ROUNDS: u32 = 8;

pub const ROUND_CONSTANTS: [u64; MAX_ROUNDS as usize] = [
    0x0000_0000_0000_0000,
    0x1319_8A2E_0370_7344,
    0xA409_3822_299F_31D0,
    0x082E_FA98_EC4E_6C89,
    0x4528_21E6_38D0_1377,
    0xBE54_66CF_34E9_0C6C,
    0x3F84_D5B5_B547_0917,
    0x9216_D5D9_8979_FB1B,
];

/// Reflection constant folded into the backward half.
pub const ALPHA: u64 = 0xC0AC_29B7_C97C_50DD;

/// Sigma-2 S-box.
pub const SBOX: [u8; 16] = [11, 6, 8, 15, 12, 0, 9, 14, 3, 7, 4, 5, 13, 2, 1, 10];
pub const SBOX_INV: [u8; 16] = invert(&SBOX);

/// Cell shuffle applied before MixColumns.
pub const TAU: [u8; 16] = [0, 11, 6, 13, 10, 1, 12, 7, 5, 14, 3, 8, 15, 4, 9, 2];
pub const TAU_INV: [u8; 16] = invert(&TAU);

/// Tweak cell permutation.
pub const TWEAK_PERM: [u8; 16] = [6, 5, 14, 15, 0, 1, 2, 3, 7, 12, 13, 4, 8, 9, 10, 11];
pub const TWEAK_PERM_INV: [u8; 16] = invert(&TWEAK_PERM);

/// Cells that go through the omega LFSR on every tweak update.
pub const TWEAK_LFSR_CELLS: [usize; 7] = [0, 1, 3, 4, 8, 11, 13];

/// Rotation exponents of `circ(0, rho, rho^2, rho)`; `0` marks a zero entry.
pub const MIX_ROTATIONS: [[u8; 4]; 4] = [[0, 1, 2, 1], [1, 0, 1, 2], [2, 1, 0, 1], [1, 2, 1, 0]];

const fn invert(table: &[u8; 16]) -> [u8; 16] {
    let mut out = [0u8; 16];
    let mut i = 0;
    while i < 16 {
        out[table[i] as usize] = i as u8;
        i += 1;
    }
    out
}
