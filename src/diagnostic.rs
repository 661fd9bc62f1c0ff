//! Declarative diagnostics: an ordered list of reads, writes and balance
//! checks against registered contracts, executed once into a [`Report`].
//!
//! Reads fail soft and are recorded. The first failed write stops the run.

use crate::report::{
    Entry,
    Outcome,
    Report,
};
use alloy::primitives::{
    Address,
    U256,
    utils::parse_ether,
};
use chain_client::{
    Connection,
    ContractHandle,
    Format,
    value,
};
use deployments::{
    Registry,
    RegistryError,
};
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::json;
use std::{
    fmt,
    path::Path,
    str::FromStr,
};

pub const DEFAULT_CONFIRMATIONS: u64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Chain(#[from] chain_client::Error),
    #[error("no ABI registered for `{0}`")]
    MissingAbi(String),
    #[error("invalid ether amount `{0}`")]
    InvalidValue(String),
}

impl StepError {
    pub fn revert_data(&self) -> Option<String> {
        match self {
            StepError::Chain(err) => err
                .revert_data()
                .filter(|data| !data.is_empty())
                .map(ToString::to_string),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Diagnostic {
    pub fn load(path: impl AsRef<Path>) -> color_eyre::Result<Self> {
        use color_eyre::eyre::WrapErr;

        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read diagnostic {}", path.display()))?;
        serde_json::from_str(&raw)
            .wrap_err_with(|| format!("malformed diagnostic {}", path.display()))
    }

    pub fn has_writes(&self) -> bool {
        self.steps.iter().any(|step| matches!(step, Step::Write { .. }))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Step {
    Read {
        contract: String,
        method: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        format: Format,
    },
    Write {
        contract: String,
        method: String,
        #[serde(default)]
        args: Vec<String>,
        /// Native value in ether units.
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        confirmations: Option<u64>,
        #[serde(default)]
        label: Option<String>,
    },
    /// Native balance of a registered contract or a literal address.
    Balance {
        contract: String,
        #[serde(default)]
        label: Option<String>,
        #[serde(default = "ether")]
        format: Format,
    },
}

fn ether() -> Format {
    Format::ETHER
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Read,
    Write,
    Balance,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepKind::Read => "read",
            StepKind::Write => "write",
            StepKind::Balance => "balance",
        };
        f.pad(name)
    }
}

impl Step {
    pub fn kind(&self) -> StepKind {
        match self {
            Step::Read { .. } => StepKind::Read,
            Step::Write { .. } => StepKind::Write,
            Step::Balance { .. } => StepKind::Balance,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Step::Read {
                label: Some(label), ..
            }
            | Step::Write {
                label: Some(label), ..
            }
            | Step::Balance {
                label: Some(label), ..
            } => label.clone(),
            Step::Read {
                contract, method, ..
            }
            | Step::Write {
                contract, method, ..
            } => format!("{contract}.{method}"),
            Step::Balance { contract, .. } => format!("{contract} balance"),
        }
    }
}

pub fn parse_value(raw: Option<&str>) -> Result<U256, StepError> {
    match raw {
        None => Ok(U256::ZERO),
        Some(raw) => {
            parse_ether(raw.trim()).map_err(|_| StepError::InvalidValue(raw.to_string()))
        }
    }
}

/// Runs every step in order against `connection`, resolving names through
/// `registry`.
pub async fn run<C: Connection>(
    diagnostic: &Diagnostic,
    registry: &Registry,
    connection: &C,
) -> Report {
    let mut report = Report::new(&diagnostic.name, connection.chain_id());
    tracing::info!(
        name = %diagnostic.name,
        steps = diagnostic.steps.len(),
        "running diagnostic"
    );

    for (index, step) in diagnostic.steps.iter().enumerate() {
        let outcome = match execute(step, registry, connection).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(index, label = %step.label(), "step failed: {err}");
                Outcome::Failed {
                    revert_data: err.revert_data(),
                    error: err.to_string(),
                }
            }
        };
        let failed = outcome.is_failed();
        report.entries.push(Entry {
            index: index + 1,
            kind: step.kind(),
            label: step.label(),
            outcome,
        });
        if failed && step.kind() == StepKind::Write {
            tracing::error!(index, "write failed; aborting remaining steps");
            report.aborted = true;
            break;
        }
    }
    report
}

async fn execute<C: Connection>(
    step: &Step,
    registry: &Registry,
    connection: &C,
) -> Result<Outcome, StepError> {
    match step {
        Step::Read {
            contract,
            method,
            args,
            format,
            ..
        } => {
            let handle = bind(registry, connection, contract)?;
            let values = handle.read_str(method, args.as_slice()).await?;
            Ok(Outcome::Ok {
                rendered: values
                    .iter()
                    .map(|v| value::render_with(v, *format))
                    .collect::<Vec<_>>()
                    .join(", "),
                value: match values.as_slice() {
                    [single] => value::to_json(single, *format),
                    many => json!(
                        many.iter()
                            .map(|v| value::to_json(v, *format))
                            .collect::<Vec<_>>()
                    ),
                },
            })
        }
        Step::Write {
            contract,
            method,
            args,
            value,
            confirmations,
            ..
        } => {
            let amount = parse_value(value.as_deref())?;
            let handle = bind(registry, connection, contract)?;
            let hash = handle.write_str(method, args.as_slice(), amount).await?;
            let receipt = connection
                .wait_for_receipt(hash, confirmations.unwrap_or(DEFAULT_CONFIRMATIONS))
                .await
                .map_err(|err| {
                    err.explained_by(std::iter::once(handle.abi()).chain(registry.abis()))
                })?;
            Ok(Outcome::Ok {
                rendered: format!(
                    "{} (block {}, gas {})",
                    receipt.transaction_hash, receipt.block_number, receipt.gas_used
                ),
                value: json!({
                    "transactionHash": receipt.transaction_hash.to_string(),
                    "blockNumber": receipt.block_number,
                    "gasUsed": receipt.gas_used,
                }),
            })
        }
        Step::Balance {
            contract, format, ..
        } => {
            let address = match Address::from_str(contract) {
                Ok(address) => address,
                Err(_) => registry.resolve(contract)?.0,
            };
            let balance = connection.balance(address).await?;
            let balance = chain_client::DynSolValue::Uint(balance, 256);
            Ok(Outcome::Ok {
                rendered: value::render_with(&balance, *format),
                value: value::to_json(&balance, *format),
            })
        }
    }
}

fn bind<'c, C: Connection>(
    registry: &Registry,
    connection: &'c C,
    contract: &str,
) -> Result<ContractHandle<'c, C>, StepError> {
    let (address, abi) = registry.resolve(contract)?;
    let abi = abi.ok_or_else(|| StepError::MissingAbi(contract.to_string()))?;
    Ok(ContractHandle::new(connection, address, abi.clone()))
}
