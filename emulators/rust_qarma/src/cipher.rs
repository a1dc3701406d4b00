use crate::tables::{
    ALPHA, MAX_ROUNDS, MIX_ROTATIONS, ROUND_CONSTANTS, SBOX, SBOX_INV, TAU, TAU_INV,
    TWEAK_LFSR_CELLS, TWEAK_PERM, TWEAK_PERM_INV,
};

/// 64-bit block viewed as sixteen 4-bit cells, cell 0 being the most significant nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cells([u8; 16]);

impl Cells {
    pub fn from_u64(value: u64) -> Self {
        let mut cells = [0u8; 16];
        for (i, cell) in cells.iter_mut().enumerate() {
            *cell = ((value >> (60 - 4 * i)) & 0xF) as u8;
        }
        Self(cells)
    }

    pub fn to_u64(self) -> u64 {
        self.0
            .iter()
            .fold(0u64, |acc, cell| (acc << 4) | (*cell as u64 & 0xF))
    }

    fn permute(self, table: &[u8; 16]) -> Self {
        let mut out = [0u8; 16];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.0[table[i] as usize];
        }
        Self(out)
    }

    fn substitute(self, table: &[u8; 16]) -> Self {
        let mut out = self.0;
        for cell in out.iter_mut() {
            *cell = table[*cell as usize];
        }
        Self(out)
    }

    // circ(0, rho, rho^2, rho) is its own inverse, so this also undoes itself.
    fn mix_columns(self) -> Self {
        let mut out = [0u8; 16];
        for col in 0..4 {
            for row in 0..4 {
                let mut acc = 0u8;
                for (j, exp) in MIX_ROTATIONS[row].iter().enumerate() {
                    if *exp != 0 {
                        acc ^= rotl4(self.0[4 * j + col], *exp);
                    }
                }
                out[4 * row + col] = acc;
            }
        }
        Self(out)
    }
}

fn rotl4(nibble: u8, amount: u8) -> u8 {
    ((nibble << amount) | (nibble >> (4 - amount))) & 0xF
}

fn omega(cell: u8) -> u8 {
    let feedback = (cell ^ (cell >> 1)) & 1;
    (cell >> 1) | (feedback << 3)
}

fn omega_inv(cell: u8) -> u8 {
    let low = ((cell >> 3) ^ cell) & 1;
    ((cell << 1) & 0xE) | low
}

fn tweak_update(tweak: u64) -> u64 {
    let mut cells = Cells::from_u64(tweak).permute(&TWEAK_PERM);
    for idx in TWEAK_LFSR_CELLS {
        cells.0[idx] = omega(cells.0[idx]);
    }
    cells.to_u64()
}

fn tweak_update_inv(tweak: u64) -> u64 {
    let mut cells = Cells::from_u64(tweak);
    for idx in TWEAK_LFSR_CELLS {
        cells.0[idx] = omega_inv(cells.0[idx]);
    }
    cells.permute(&TWEAK_PERM_INV).to_u64()
}

/// Round 0 skips the shuffle and diffusion layers.
fn forward(state: u64, tweakey: u64, round: usize) -> u64 {
    let mut cells = Cells::from_u64(state ^ tweakey);
    if round != 0 {
        cells = cells.permute(&TAU).mix_columns();
    }
    cells.substitute(&SBOX).to_u64()
}

fn backward(state: u64, tweakey: u64, round: usize) -> u64 {
    let mut cells = Cells::from_u64(state).substitute(&SBOX_INV);
    if round != 0 {
        cells = cells.mix_columns().permute(&TAU_INV);
    }
    cells.to_u64() ^ tweakey
}

fn reflect(state: u64, key: u64) -> u64 {
    let cells = Cells::from_u64(state).permute(&TAU).mix_columns();
    Cells::from_u64(cells.to_u64() ^ key)
        .permute(&TAU_INV)
        .to_u64()
}

fn reflect_inv(state: u64, key: u64) -> u64 {
    let cells = Cells::from_u64(state).permute(&TAU);
    Cells::from_u64(cells.to_u64() ^ key)
        .mix_columns()
        .permute(&TAU_INV)
        .to_u64()
}

fn whitening_keys(w0: u64) -> (u64, u64) {
    (w0, w0.rotate_right(1) ^ (w0 >> 63))
}

fn clamp_rounds(rounds: u32) -> usize {
    rounds.min(MAX_ROUNDS) as usize
}

/// Encrypts one block. `w0` is the whitening key, `k0` the core key.
pub fn qarma64_enc(plaintext: u64, tweak: u64, w0: u64, k0: u64, rounds: u32) -> u64 {
    let rounds = clamp_rounds(rounds);
    let (w0, w1) = whitening_keys(w0);
    let k1 = k0;
    let mut tweak = tweak;

    let mut state = plaintext ^ w0;
    for (round, constant) in ROUND_CONSTANTS.iter().enumerate().take(rounds) {
        state = forward(state, k0 ^ tweak ^ constant, round);
        tweak = tweak_update(tweak);
    }
    state = forward(state, w1 ^ tweak, 1);
    state = reflect(state, k1);
    state = backward(state, w0 ^ tweak, 1);
    for round in (0..rounds).rev() {
        tweak = tweak_update_inv(tweak);
        state = backward(state, k0 ^ tweak ^ ROUND_CONSTANTS[round] ^ ALPHA, round);
    }
    state ^ w1
}

/// Inverts [`qarma64_enc`] for the same tweak, keys and round count.
pub fn qarma64_dec(ciphertext: u64, tweak: u64, w0: u64, k0: u64, rounds: u32) -> u64 {
    let rounds = clamp_rounds(rounds);
    let (w0, w1) = whitening_keys(w0);
    let k1 = k0;
    let mut tweak = tweak;

    let mut state = ciphertext ^ w1;
    for (round, constant) in ROUND_CONSTANTS.iter().enumerate().take(rounds) {
        state = forward(state, k0 ^ tweak ^ constant ^ ALPHA, round);
        tweak = tweak_update(tweak);
    }
    state = forward(state, w0 ^ tweak, 1);
    state = reflect_inv(state, k1);
    state = backward(state, w1 ^ tweak, 1);
    for round in (0..rounds).rev() {
        tweak = tweak_update_inv(tweak);
        state = backward(state, k0 ^ tweak ^ ROUND_CONSTANTS[round], round);
    }
    state ^ w0
}
