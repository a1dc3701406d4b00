//! Register-level model of a memory-mapped pointer-authentication coprocessor.
//!
//! The device signs pointers by folding a QARMA-64 tag into address bits 48..=62 and
//! authenticates them by recomputing that tag. Callers drive it through an MMIO window:
//! writing PLAINTEXT signs, writing RESULT authenticates, reading RESULT drains the mailbox.

use thiserror::Error;

pub mod bus;
pub mod cipher;
pub mod device;
pub mod pac;
pub mod platform;
pub mod registers;
pub mod script;
pub mod snapshot;

pub use bus::{BusError, SystemBus};
pub use cipher::{IdentityCipher, Qarma64, TweakableCipher, PAC_ROUNDS};
pub use device::{AuthFailure, AuthFailureHook, MmioDevice, PtrauthDevice};
pub use pac::{
    authenticate, authenticate_checked, canonicalize, sign, signature_of, strip, AuthOutcome,
    CANONICAL_HIGH_MASK, SIG_MASK, TAMPER_SENTINEL,
};
pub use platform::{
    parse_u64, DeviceClass, DeviceConfig, DeviceRegistry, DeviceTreeNode, Platform, PlatformConfig,
};
pub use registers::{
    DeviceState, RegisterOffset, CHIP_ID, DEFAULT_KEY_HI, DEFAULT_KEY_LO, MMIO_WINDOW_SIZE,
    PRIVATE_WINDOW_SIZE,
};
pub use script::{parse_script, run_script, Transaction, TransactionRecord};
pub use snapshot::{
    capture, load_snapshot, restore, save_snapshot, Snapshot, SNAPSHOT_MAGIC, SNAPSHOT_VERSION,
};

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
    #[error("snapshot error: {0}")]
    InvalidSnapshot(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("unknown device type: {0}")]
    UnknownDevice(String),
    #[error("{0}")]
    Other(String),
}
