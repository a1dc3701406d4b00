//! Batch driver: replays a JSON list of bus transactions against a [`Platform`].

use crate::platform::{deserialize_opt_addr, Platform};
use crate::registers::RegisterOffset;
use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Read,
    Write,
}

fn default_width() -> u32 {
    8
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Transaction {
    pub op: Op,
    /// Absolute bus address. Mutually exclusive with `reg`.
    #[serde(default, deserialize_with = "deserialize_opt_addr")]
    pub addr: Option<u64>,
    /// Register name, resolved against `device` (or the first device).
    #[serde(default)]
    pub reg: Option<RegisterOffset>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default, deserialize_with = "deserialize_opt_addr")]
    pub value: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRecord {
    pub op: Op,
    pub addr: String,
    pub width: u32,
    pub value: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScriptSerde {
    List(Vec<Transaction>),
    Object { transactions: Vec<Transaction> },
}

pub fn parse_script(raw: &str) -> Result<Vec<Transaction>> {
    Ok(match serde_json::from_str::<ScriptSerde>(raw)? {
        ScriptSerde::List(items) => items,
        ScriptSerde::Object { transactions } => transactions,
    })
}

impl Transaction {
    pub fn read(reg: RegisterOffset) -> Self {
        Self {
            op: Op::Read,
            addr: None,
            reg: Some(reg),
            device: None,
            width: default_width(),
            value: None,
        }
    }

    pub fn write(reg: RegisterOffset, value: u64) -> Self {
        Self {
            op: Op::Write,
            value: Some(value),
            ..Self::read(reg)
        }
    }

    fn resolve(&self, platform: &Platform) -> Result<u64> {
        match (self.addr, self.reg) {
            (Some(addr), None) => Ok(addr),
            (None, Some(reg)) => {
                let base = platform.device_base(self.device.as_deref()).ok_or_else(|| {
                    CoreError::Other(format!(
                        "no device {} on the platform",
                        self.device.as_deref().unwrap_or("<first>")
                    ))
                })?;
                base.checked_add(reg.offset()).ok_or_else(|| {
                    CoreError::Other(format!("{} past end of address space", reg.name()))
                })
            }
            _ => Err(CoreError::Other(
                "transaction needs exactly one of addr or reg".to_string(),
            )),
        }
    }
}

pub fn run_script(
    platform: &mut Platform,
    script: &[Transaction],
) -> Result<Vec<TransactionRecord>> {
    let mut records = Vec::with_capacity(script.len());
    for txn in script {
        let addr = txn.resolve(platform)?;
        let value = match txn.op {
            Op::Read => platform.bus_mut().read(addr, txn.width)?,
            Op::Write => {
                let value = txn
                    .value
                    .ok_or_else(|| CoreError::Other(format!("write to {addr:#x} has no value")))?;
                platform.bus_mut().write(addr, txn.width, value)?;
                value
            }
        };
        records.push(TransactionRecord {
            op: txn.op,
            addr: format!("{addr:#x}"),
            width: txn.width,
            value: format!("{value:#018x}"),
        });
    }
    Ok(records)
}
