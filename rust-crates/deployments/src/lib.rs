use alloy::{
    json_abi::JsonAbi,
    primitives::Address,
};
use chain_client::abi;
use chrono::Utc;
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fmt,
    fs,
    io,
    path::{
        Path,
        PathBuf,
    },
    str::FromStr,
};

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
const DEPLOYMENTS_FILE: &str = "deployments.json";

pub const LOCAL_RPC_URL: &str = "http://127.0.0.1:8545";
pub const LOCAL_CHAIN_ID: u64 = 1337;
pub const TESTNET_RPC_URL: &str = "https://bsc-testnet.publicnode.com";
pub const TESTNET_CHAIN_ID: u64 = 97;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no deployment named `{0}` in registry")]
    MissingKey(String),
    #[error("invalid address `{value}` for `{name}`")]
    InvalidAddress { name: String, value: String },
    #[error("invalid ABI for `{name}`: {source}")]
    InvalidAbi {
        name: String,
        #[source]
        source: chain_client::Error,
    },
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed deployment file: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = RegistryError> = std::result::Result<T, E>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeploymentEnv {
    Local,
    Testnet,
}

impl DeploymentEnv {
    pub fn dir_name(self) -> &'static str {
        match self {
            DeploymentEnv::Local => "local",
            DeploymentEnv::Testnet => "testnet",
        }
    }

    pub fn rpc_url(self) -> &'static str {
        match self {
            DeploymentEnv::Local => LOCAL_RPC_URL,
            DeploymentEnv::Testnet => TESTNET_RPC_URL,
        }
    }

    pub fn chain_id(self) -> u64 {
        match self {
            DeploymentEnv::Local => LOCAL_CHAIN_ID,
            DeploymentEnv::Testnet => TESTNET_CHAIN_ID,
        }
    }

    pub fn default_path(self) -> PathBuf {
        Path::new(DEPLOYMENTS_ROOT)
            .join(self.dir_name())
            .join(DEPLOYMENTS_FILE)
    }
}

impl fmt::Display for DeploymentEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentEnv::Local => "Local",
            DeploymentEnv::Testnet => "Testnet",
        };
        write!(f, "{name}")
    }
}

/// On-disk deployment document. Fields other than `contracts`, `abis` and
/// `deployedAt` are carried through untouched on save.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentFile {
    #[serde(default)]
    pub contracts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub abis: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_at: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl DeploymentFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        data.parse()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "deployment file written");
        Ok(())
    }

    /// Stores `fragment` as the ABI for `name`. Hardhat artifacts are reduced
    /// to their `abi` field; anything that does not parse is rejected.
    pub fn set_abi(&mut self, name: &str, fragment: Value) -> Result<()> {
        abi::parse_fragment(&fragment).map_err(|source| RegistryError::InvalidAbi {
            name: name.to_string(),
            source,
        })?;
        let stored = match fragment {
            Value::Object(mut artifact) => artifact.remove("abi").unwrap_or_default(),
            raw => raw,
        };
        self.abis.insert(name.to_string(), stored);
        Ok(())
    }

    pub fn record_contract(&mut self, name: &str, address: Address) {
        self.contracts
            .insert(name.to_string(), address.to_checksum(None));
        self.deployed_at = Some(Utc::now().to_rfc3339());
    }
}

impl FromStr for DeploymentFile {
    type Err = RegistryError;

    fn from_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeploymentRecord {
    pub address: Address,
    pub abi: Option<JsonAbi>,
}

/// Name to address (and ABI) lookups, validated once at load.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    records: BTreeMap<String, DeploymentRecord>,
    unbound_abis: BTreeMap<String, JsonAbi>,
}

impl Registry {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let registry = Self::from_file(&DeploymentFile::load(path)?)?;
        tracing::debug!(
            path = %path.display(),
            contracts = registry.records.len(),
            "deployment registry loaded"
        );
        Ok(registry)
    }

    pub fn from_file(file: &DeploymentFile) -> Result<Self> {
        let mut abis = file
            .abis
            .iter()
            .map(|(name, fragment)| {
                abi::parse_fragment(fragment)
                    .map(|abi| (name.clone(), abi))
                    .map_err(|source| RegistryError::InvalidAbi {
                        name: name.clone(),
                        source,
                    })
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        let mut records = BTreeMap::new();
        for (name, value) in &file.contracts {
            let address = Address::from_str(value.trim()).map_err(|_| {
                RegistryError::InvalidAddress {
                    name: name.clone(),
                    value: value.clone(),
                }
            })?;
            let abi = abis.remove(name);
            records.insert(name.clone(), DeploymentRecord { address, abi });
        }
        for name in abis.keys() {
            tracing::warn!(%name, "ABI registered without a deployed address");
        }
        Ok(Self {
            records,
            unbound_abis: abis,
        })
    }

    pub fn resolve(&self, name: &str) -> Result<(Address, Option<&JsonAbi>)> {
        self.record(name)
            .map(|record| (record.address, record.abi.as_ref()))
    }

    pub fn record(&self, name: &str) -> Result<&DeploymentRecord> {
        self.records
            .get(name)
            .ok_or_else(|| RegistryError::MissingKey(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Every ABI in the file, including ones without an address.
    pub fn abis(&self) -> impl Iterator<Item = &JsonAbi> {
        self.records
            .values()
            .filter_map(|record| record.abi.as_ref())
            .chain(self.unbound_abis.values())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromStr for Registry {
    type Err = RegistryError;

    fn from_str(raw: &str) -> Result<Self> {
        Self::from_file(&raw.parse()?)
    }
}

pub fn ensure_structure() -> Result<()> {
    for env in [DeploymentEnv::Local, DeploymentEnv::Testnet] {
        let _ = ensure_store_in(DEPLOYMENTS_ROOT, env)?;
    }
    Ok(())
}

/// Creates `<root>/<env>/deployments.json` with an empty document if missing.
pub fn ensure_store_in(root: impl AsRef<Path>, env: DeploymentEnv) -> Result<PathBuf> {
    let env_dir = root.as_ref().join(env.dir_name());
    fs::create_dir_all(&env_dir).map_err(|source| RegistryError::Io {
        path: env_dir.clone(),
        source,
    })?;

    let file_path = env_dir.join(DEPLOYMENTS_FILE);
    if !file_path.exists() {
        DeploymentFile::default().save(&file_path)?;
        tracing::info!(%env, path = %file_path.display(), "created deployment file");
    }
    Ok(file_path)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use alloy::primitives::address;
    use serde_json::json;
    use tempdir::TempDir;

    const TREASURY: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    #[test]
    fn resolve__treasury_only_registry__returns_address_without_abi() {
        // given
        let registry: Registry = json!({ "contracts": { "Treasury": TREASURY } })
            .to_string()
            .parse()
            .unwrap();

        // when
        let (address, abi) = registry.resolve("Treasury").unwrap();

        // then
        assert_eq!(address, address!("5fbdb2315678afecb367f032d93f642f64180aa3"));
        assert!(abi.is_none());
    }

    #[test]
    fn resolve__absent_name__is_missing_key() {
        // given
        let registry: Registry = json!({ "contracts": { "Treasury": TREASURY } })
            .to_string()
            .parse()
            .unwrap();

        // when
        let result = registry.resolve("Oracle");

        // then
        let Err(RegistryError::MissingKey(name)) = result else {
            panic!("expected missing key, got {result:?}");
        };
        assert_eq!(name, "Oracle");
    }

    #[test]
    fn from_str__human_readable_abi__is_parsed_at_load() {
        // given
        let raw = json!({
            "contracts": { "DreamSeeker": TREASURY },
            "abis": { "DreamSeeker": ["function seekCost() view returns (uint256)"] }
        })
        .to_string();

        // when
        let registry: Registry = raw.parse().unwrap();

        // then
        let (_, abi) = registry.resolve("DreamSeeker").unwrap();
        assert!(abi.unwrap().function("seekCost").is_some());
    }

    #[test]
    fn from_str__bad_address__is_invalid_address() {
        // given
        let raw = json!({ "contracts": { "Treasury": "0xabc" } }).to_string();

        // when
        let result = raw.parse::<Registry>();

        // then
        assert!(matches!(
            result,
            Err(RegistryError::InvalidAddress { ref name, .. }) if name == "Treasury"
        ));
    }

    #[test]
    fn from_str__bad_abi__names_the_contract() {
        // given
        let raw = json!({
            "contracts": { "Treasury": TREASURY },
            "abis": { "Treasury": 7 }
        })
        .to_string();

        // when
        let result = raw.parse::<Registry>();

        // then
        assert!(matches!(
            result,
            Err(RegistryError::InvalidAbi { ref name, .. }) if name == "Treasury"
        ));
    }

    #[test]
    fn names__multiple_contracts__are_sorted() {
        // given
        let registry: Registry = json!({
            "contracts": {
                "DreamTreasury": TREASURY,
                "CloudDreamCore": TREASURY,
                "DreamOracle": TREASURY
            }
        })
        .to_string()
        .parse()
        .unwrap();

        // when
        let names: Vec<&str> = registry.names().collect();

        // then
        assert_eq!(names, vec!["CloudDreamCore", "DreamOracle", "DreamTreasury"]);
    }

    #[test]
    fn set_abi__hardhat_artifact__is_saved_and_reloaded() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let path = dir.path().join("deployment-modular.json");
        let mut file: DeploymentFile = json!({
            "contracts": { "DreamSeeker": TREASURY },
            "subscriptionId": "4242"
        })
        .to_string()
        .parse()
        .unwrap();
        let artifact = json!({
            "contractName": "DreamSeeker",
            "abi": [{
                "type": "function",
                "name": "seekCost",
                "inputs": [],
                "outputs": [{ "name": "", "type": "uint256" }],
                "stateMutability": "view"
            }]
        });

        // when
        file.set_abi("DreamSeeker", artifact).unwrap();
        file.save(&path).unwrap();
        let reloaded = DeploymentFile::load(&path).unwrap();
        let registry = Registry::load(&path).unwrap();

        // then
        assert!(reloaded.abis["DreamSeeker"].is_array());
        assert_eq!(reloaded.extra.get("subscriptionId"), Some(&json!("4242")));
        let (_, abi) = registry.resolve("DreamSeeker").unwrap();
        assert!(abi.unwrap().function("seekCost").is_some());
    }

    #[test]
    fn set_abi__unparsable_fragment__leaves_file_untouched() {
        // given
        let mut file = DeploymentFile::default();

        // when
        let result = file.set_abi("DreamSeeker", json!({ "bytecode": "0x00" }));

        // then
        assert!(matches!(result, Err(RegistryError::InvalidAbi { .. })));
        assert!(file.abis.is_empty());
    }

    #[test]
    fn record_contract__new_address__stamps_deployed_at() {
        // given
        let mut file = DeploymentFile::default();
        let oracle = address!("e7f1725e7734ce288f8367e1bb143e90bb3f0512");

        // when
        file.record_contract("DreamOracle", oracle);

        // then
        let registry = Registry::from_file(&file).unwrap();
        assert_eq!(registry.resolve("DreamOracle").unwrap().0, oracle);
        assert!(file.deployed_at.is_some());
    }

    #[test]
    fn ensure_store_in__missing_tree__creates_empty_document() {
        // given
        let dir = TempDir::new("deployments").unwrap();

        // when
        let path = ensure_store_in(dir.path(), DeploymentEnv::Testnet).unwrap();

        // then
        assert!(path.ends_with("testnet/deployments.json"));
        assert!(Registry::load(&path).unwrap().is_empty());
    }

    #[test]
    fn load__missing_file__is_io_error() {
        // given
        let dir = TempDir::new("deployments").unwrap();

        // when
        let result = Registry::load(dir.path().join("absent.json"));

        // then
        assert!(matches!(result, Err(RegistryError::Io { .. })));
    }
}
