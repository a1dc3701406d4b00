use rust_qarma::{qarma64_dec, qarma64_enc, MAX_ROUNDS};
use serde::{Deserialize, Serialize};
use std::io::{self, Read};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Op {
    Enc,
    Dec,
}

#[derive(Deserialize)]
struct Input {
    op: Op,
    text: u64,
    #[serde(default)]
    tweak: u64,
    w0: u64,
    k0: u64,
    #[serde(default = "default_rounds")]
    rounds: u32,
}

fn default_rounds() -> u32 {
    7
}

#[derive(Serialize)]
struct Output {
    result: u64,
    rounds: u32,
}

fn main() -> anyhow::Result<()> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    let input: Input = serde_json::from_str(&buffer)?;
    if input.rounds > MAX_ROUNDS {
        anyhow::bail!("rounds must be at most {MAX_ROUNDS}, got {}", input.rounds);
    }

    let result = match input.op {
        Op::Enc => qarma64_enc(input.text, input.tweak, input.w0, input.k0, input.rounds),
        Op::Dec => qarma64_dec(input.text, input.tweak, input.w0, input.k0, input.rounds),
    };
    let output = Output {
        result,
        rounds: input.rounds,
    };
    serde_json::to_writer(io::stdout(), &output)?;
    Ok(())
}
