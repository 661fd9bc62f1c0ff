use chain_client::{
    Address,
    Connection,
    ContractHandle,
    NodeConnection,
    TxHash,
    abi,
    proxy,
    value,
};
use clap::{
    ArgAction,
    ArgGroup,
    Parser,
    Subcommand,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use deployments::{
    DeploymentEnv,
    DeploymentFile,
    Registry,
};
use dream_ops::{
    Diagnostic,
    config::{
        DEFAULT_PRIVATE_KEY_ENV,
        NetworkConfig,
        SignerSource,
    },
    diagnostic::{
        DEFAULT_CONFIRMATIONS,
        parse_value,
    },
    logging,
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    process::ExitCode,
    str::FromStr,
    time::Duration,
};

#[derive(Parser, Debug)]
#[command(
    name = "dream-ops",
    about = "Read, write and diagnose the Dream contract suite",
    version,
    group(
        ArgGroup::new("network")
            .args(["local", "testnet"])
            .required(true)
    )
)]
struct Cli {
    /// Local hardhat node (chain 1337)
    #[arg(long)]
    local: bool,

    /// BSC testnet (chain 97)
    #[arg(long)]
    testnet: bool,

    /// Override RPC URL
    #[arg(long, env = "DREAM_RPC_URL")]
    rpc_url: Option<String>,

    /// Deployment file (defaults to .deployments/<network>/deployments.json)
    #[arg(long, env = "DREAM_DEPLOYMENT")]
    deployment: Option<PathBuf>,

    /// Environment variable holding the signer's private key
    #[arg(long, default_value = DEFAULT_PRIVATE_KEY_ENV)]
    private_key_env: String,

    /// Sign with an encrypted keystore instead of a raw key
    #[arg(long)]
    keystore: Option<String>,

    /// Keystore directory (defaults to ~/.foundry/keystores)
    #[arg(long)]
    keystore_dir: Option<String>,

    /// Seconds to wait for a receipt before giving up
    #[arg(long)]
    receipt_timeout: Option<u64>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a diagnostic file and print its report
    Run {
        path: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Call a view function
    Read {
        contract: String,
        method: String,
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
        /// raw, ether, gwei or units:<n>
        #[arg(long, default_value = "raw")]
        format: value::Format,
    },
    /// Send a transaction and wait for its receipt
    Send {
        contract: String,
        method: String,
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
        /// Native value in ether
        #[arg(long)]
        value: Option<String>,
        #[arg(long, default_value_t = DEFAULT_CONFIRMATIONS)]
        confirmations: u64,
        /// Estimate gas and execute against current state without signing
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the registered address of a contract
    Resolve { name: String },
    /// Show status, gas and logs of a transaction, decoding known events
    Receipt { hash: TxHash },
    /// Show the EIP-1967 implementation and admin of a proxy
    Proxy { target: String },
    /// Report whether an address holds contract code
    Code { target: String },
    /// Decode revert data against the registered ABIs
    DecodeError { data: String },
    /// Store an ABI (raw array or hardhat artifact) in the deployment file
    SetAbi { name: String, path: PathBuf },
    /// Record a deployed address in the deployment file
    Register { name: String, address: Address },
    /// Print decoded events emitted by a contract
    Events {
        contract: String,
        event: String,
        #[arg(long, default_value_t = 0)]
        from_block: u64,
        #[arg(long)]
        to_block: Option<u64>,
    },
}

impl Cli {
    fn env(&self) -> DeploymentEnv {
        if self.testnet {
            DeploymentEnv::Testnet
        } else {
            DeploymentEnv::Local
        }
    }

    fn network(&self) -> NetworkConfig {
        NetworkConfig::new(self.env())
            .with_rpc_url(self.rpc_url.clone())
            .with_deployment(self.deployment.clone())
            .with_receipt_timeout(self.receipt_timeout.map(Duration::from_secs))
    }

    fn signer_source(&self) -> SignerSource {
        match &self.keystore {
            Some(name) => SignerSource::Keystore {
                name: name.clone(),
                dir: self.keystore_dir.clone(),
            },
            None => SignerSource::Env(self.private_key_env.clone()),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_dir.as_deref())?;
    execute(cli).await
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    let network = cli.network();
    tracing::debug!(env = %network.env, rpc = %network.rpc_url, "network selected");

    match &cli.command {
        Command::Run { path, json } => {
            let diagnostic = Diagnostic::load(path)?;
            let registry = load_registry(&network.deployment)?;
            let signer = if diagnostic.has_writes() {
                cli.signer_source().load()?
            } else {
                None
            };
            let connection = connect(&network, signer).await?;
            let report = dream_ops::run(&diagnostic, &registry, &connection).await;
            if *json {
                println!("{}", report.to_json()?);
            } else {
                println!("{report}");
            }
            if report.aborted {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Read {
            contract,
            method,
            args,
            format,
        } => {
            let registry = load_registry(&network.deployment)?;
            let connection = connect(&network, None).await?;
            let handle = bind(&registry, &connection, contract)?;
            let values = handle
                .read_str(method, args.as_slice())
                .await
                .wrap_err_with(|| format!("{contract}.{method} failed"))?;
            for item in &values {
                println!("{}", value::render_with(item, *format));
            }
        }
        Command::Send {
            contract,
            method,
            args,
            value,
            dry_run: true,
            ..
        } => {
            let amount = parse_value(value.as_deref())?;
            let registry = load_registry(&network.deployment)?;
            let connection = connect(&network, None).await?;
            let handle = bind(&registry, &connection, contract)?;
            let simulation = handle
                .simulate_str(method, args.as_slice(), amount)
                .await
                .map_err(|err| err.explained_by(registry.abis()))
                .wrap_err_with(|| format!("{contract}.{method} would fail"))?;
            println!("{contract}.{method} would succeed");
            println!("gas estimate: {}", simulation.gas);
            for item in &simulation.output {
                println!("returns: {}", value::render(item));
            }
        }
        Command::Send {
            contract,
            method,
            args,
            value,
            confirmations,
            dry_run: false,
        } => {
            let amount = parse_value(value.as_deref())?;
            let registry = load_registry(&network.deployment)?;
            let signer = cli
                .signer_source()
                .load()?
                .ok_or(chain_client::Error::NoSigner)?;
            let connection = connect(&network, Some(signer)).await?;
            if let Some(from) = connection.signer_address() {
                println!("from {from}");
            }
            let handle = bind(&registry, &connection, contract)?;
            let hash = handle
                .write_str(method, args.as_slice(), amount)
                .await
                .wrap_err_with(|| format!("{contract}.{method} was not sent"))?;
            println!("sent {hash}");
            let receipt = connection
                .wait_for_receipt(hash, *confirmations)
                .await
                .map_err(|err| err.explained_by(registry.abis()))
                .wrap_err_with(|| format!("{contract}.{method} failed"))?;
            println!("{receipt}");
        }
        Command::Resolve { name } => {
            let registry = load_registry(&network.deployment)?;
            let record = registry.record(name)?;
            println!("{name}: {}", record.address);
            match &record.abi {
                Some(abi) => println!("abi: {} function(s)", abi.functions().count()),
                None => println!("abi: not registered"),
            }
        }
        Command::Receipt { hash } => {
            let registry = optional_registry(&network)?;
            let connection = connect(&network, None).await?;
            let Some(receipt) = connection.receipt(*hash).await? else {
                return Err(eyre!("no receipt for {hash} (pending or unknown)"));
            };
            println!("{receipt}");
            if !receipt.logs.is_empty() {
                println!("events:");
            }
            for (index, log) in receipt.logs.iter().enumerate() {
                match abi::decode_log(log, registry.abis()) {
                    Some(event) => println!("  [{index}] {event}"),
                    None => println!("  [{index}] unknown event at {}", log.address),
                }
            }
        }
        Command::Proxy { target } => {
            let registry = optional_registry(&network)?;
            let address = target_address(&registry, target)?;
            let connection = connect(&network, None).await?;
            let info = proxy::inspect(&connection, address).await?;
            match info.implementation {
                Some(implementation) => {
                    println!("proxy:          {address}");
                    println!("implementation: {implementation}");
                    match info.admin {
                        Some(admin) => println!("admin:          {admin}"),
                        None => println!("admin:          none"),
                    }
                }
                None => {
                    println!("{address} has an empty EIP-1967 implementation slot");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Command::Code { target } => {
            let registry = optional_registry(&network)?;
            let address = target_address(&registry, target)?;
            let connection = connect(&network, None).await?;
            let code = connection.code_at(address).await?;
            if code.is_empty() {
                println!("{address}: no code (externally owned account)");
            } else {
                println!("{address}: contract, {} bytes of code", code.len());
            }
        }
        Command::DecodeError { data } => {
            let bytes = hex::decode(data.trim().trim_start_matches("0x"))
                .wrap_err("revert data is not hex")?;
            let registry = optional_registry(&network)?;
            match abi::decode_revert(&bytes, registry.abis()) {
                Some(reason) => println!("{reason}"),
                None => return Err(eyre!("unrecognised revert data 0x{}", hex::encode(&bytes))),
            }
        }
        Command::SetAbi { name, path } => {
            let raw = std::fs::read_to_string(path)
                .wrap_err_with(|| format!("failed to read {}", path.display()))?;
            let fragment: serde_json::Value = serde_json::from_str(&raw)
                .wrap_err_with(|| format!("{} is not JSON", path.display()))?;
            let target = writable_deployment(&network)?;
            let mut file = DeploymentFile::load(&target)?;
            file.set_abi(name, fragment)?;
            file.save(&target)?;
            println!("abi for {name} written to {}", target.display());
        }
        Command::Register { name, address } => {
            let target = writable_deployment(&network)?;
            let mut file = if target.exists() {
                DeploymentFile::load(&target)?
            } else {
                DeploymentFile::default()
            };
            file.record_contract(name, *address);
            file.save(&target)?;
            println!("{name} registered at {address} in {}", target.display());
        }
        Command::Events {
            contract,
            event,
            from_block,
            to_block,
        } => {
            let registry = load_registry(&network.deployment)?;
            let connection = connect(&network, None).await?;
            let handle = bind(&registry, &connection, contract)?;
            let events = handle.events(event, *from_block, *to_block).await?;
            for record in &events {
                let fields: Vec<String> = record
                    .indexed
                    .iter()
                    .chain(&record.body)
                    .map(value::render)
                    .collect();
                println!(
                    "block {} tx {}: {event}({})",
                    record
                        .block_number
                        .map_or_else(|| "?".to_string(), |b| b.to_string()),
                    record
                        .transaction_hash
                        .map_or_else(|| "?".to_string(), |h| h.to_string()),
                    fields.join(", ")
                );
            }
            println!("{} event(s)", events.len());
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn connect(
    network: &NetworkConfig,
    signer: Option<chain_client::PrivateKeySigner>,
) -> Result<NodeConnection> {
    NodeConnection::connect(&network.connection_settings(), signer)
        .await
        .wrap_err_with(|| format!("failed to connect to {}", network.rpc_url))
}

fn load_registry(path: &Path) -> Result<Registry> {
    Registry::load(path)
        .wrap_err_with(|| format!("failed to load deployments from {}", path.display()))
}

/// The deployment registry when the file exists, an empty one otherwise.
fn optional_registry(network: &NetworkConfig) -> Result<Registry> {
    if network.deployment.exists() {
        load_registry(&network.deployment)
    } else {
        Ok(Registry::default())
    }
}

fn target_address(registry: &Registry, target: &str) -> Result<Address> {
    match Address::from_str(target) {
        Ok(address) => Ok(address),
        Err(_) => Ok(registry.resolve(target)?.0),
    }
}

fn bind<'c, C: Connection>(
    registry: &Registry,
    connection: &'c C,
    contract: &str,
) -> Result<ContractHandle<'c, C>> {
    let (address, abi) = registry.resolve(contract)?;
    let abi = abi
        .cloned()
        .ok_or_else(|| eyre!("no ABI registered for `{contract}`; use set-abi first"))?;
    Ok(ContractHandle::new(connection, address, abi))
}

fn writable_deployment(network: &NetworkConfig) -> Result<PathBuf> {
    if network.uses_default_deployment() {
        deployments::ensure_structure()?;
    }
    Ok(network.deployment.clone())
}
