use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use ptrauth_core::{
    authenticate_checked, capture, load_snapshot, parse_script, parse_u64, restore, run_script,
    save_snapshot, sign, AuthOutcome, DeviceRegistry, IdentityCipher, Platform, PlatformConfig,
    Qarma64, TweakableCipher, DEFAULT_KEY_HI, DEFAULT_KEY_LO,
};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum CipherKind {
    Qarma,
    Identity,
}

impl CipherKind {
    fn build(self) -> Box<dyn TweakableCipher> {
        match self {
            Self::Qarma => Box::new(Qarma64),
            Self::Identity => Box::new(IdentityCipher),
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
struct KeyArgs {
    /// Tweak (domain separator).
    #[arg(long, default_value = "0", value_parser = parse_u64)]
    tweak: u64,

    #[arg(long, default_value_t = DEFAULT_KEY_LO, value_parser = parse_u64)]
    key_lo: u64,

    #[arg(long, default_value_t = DEFAULT_KEY_HI, value_parser = parse_u64)]
    key_hi: u64,

    #[arg(long, value_enum, default_value_t = CipherKind::Qarma)]
    cipher: CipherKind,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign a pointer and print the result.
    Sign {
        #[arg(value_parser = parse_u64)]
        pointer: u64,
        #[command(flatten)]
        keys: KeyArgs,
    },
    /// Authenticate a signed pointer; exits non-zero on mismatch.
    Auth {
        #[arg(value_parser = parse_u64)]
        pointer: u64,
        #[command(flatten)]
        keys: KeyArgs,
    },
    /// Replay a JSON transaction list against a platform and print each result.
    Script {
        /// Transaction list, or `-` for stdin.
        #[arg(value_name = "PATH")]
        script: PathBuf,
        /// Restore register files from this snapshot before running.
        #[arg(long, value_name = "PATH")]
        snapshot_in: Option<PathBuf>,
        /// Save register files to this snapshot after running.
        #[arg(long, value_name = "PATH")]
        snapshot_out: Option<PathBuf>,
    },
    /// Print the device-tree fragment for the configured platform.
    Dts,
}

#[derive(Parser, Debug)]
#[command(
    name = "ptrauth",
    about = "Drive the pointer-authentication coprocessor model from the command line."
)]
struct Args {
    /// Platform description (JSON). Defaults to one device at the default base.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset.
    #[arg(long, global = true, default_value_t = Level::WARN)]
    log_level: Level,

    #[command(subcommand)]
    command: Command,
}

fn init_tracing(level: Level) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn load_platform(config: Option<&Path>) -> anyhow::Result<Platform> {
    let config = match config {
        Some(path) => PlatformConfig::load(path)
            .with_context(|| format!("loading platform config {}", path.display()))?,
        None => PlatformConfig::default(),
    };
    Ok(Platform::build(&config, &DeviceRegistry::with_builtin())?)
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        return Ok(buffer);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level)?;

    match args.command {
        Command::Sign { pointer, keys } => {
            let cipher = keys.cipher.build();
            let signed = sign(pointer, keys.tweak, keys.key_lo, keys.key_hi, &cipher);
            println!("{signed:#018x}");
        }
        Command::Auth { pointer, keys } => {
            let cipher = keys.cipher.build();
            match authenticate_checked(pointer, keys.tweak, keys.key_lo, keys.key_hi, &cipher) {
                AuthOutcome::Valid(addr) => println!("{addr:#018x}"),
                AuthOutcome::Tampered { expected, found } => {
                    println!("{:#018x}", 0u64);
                    anyhow::bail!(
                        "signature mismatch: expected {expected:#x}, found {found:#x}"
                    );
                }
            }
        }
        Command::Script {
            script,
            snapshot_in,
            snapshot_out,
        } => {
            let mut platform = load_platform(args.config.as_deref())?;
            if let Some(path) = snapshot_in.as_deref() {
                let snap = load_snapshot(path)
                    .with_context(|| format!("loading snapshot {}", path.display()))?;
                restore(platform.bus_mut(), &snap)?;
            }
            let transactions = parse_script(&read_input(&script)?)?;
            let records = run_script(&mut platform, &transactions)?;
            for record in &records {
                println!("{}", serde_json::to_string(record)?);
            }
            if let Some(path) = snapshot_out.as_deref() {
                save_snapshot(path, &capture(platform.bus()))
                    .with_context(|| format!("saving snapshot {}", path.display()))?;
            }
        }
        Command::Dts => {
            let platform = load_platform(args.config.as_deref())?;
            print!("{}", platform.render_dts());
        }
    }
    Ok(())
}
