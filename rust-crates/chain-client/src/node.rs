use crate::{
    Connection,
    Error,
    LogEntry,
    LogFilter,
    Receipt,
    Result,
    WaitPolicy,
};
use alloy::{
    eips::BlockId,
    network::EthereumWallet,
    primitives::{
        Address,
        Bytes,
        TxHash,
        U256,
    },
    providers::{
        DynProvider,
        Provider,
        ProviderBuilder,
    },
    rpc::{
        client::RpcClient,
        types::{
            Filter,
            TransactionRequest,
        },
    },
    signers::local::PrivateKeySigner,
    transports::http::{
        Http,
        reqwest,
    },
};
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct ConnectionSettings {
    pub rpc_url: String,
    /// When set, connecting to a node that reports a different chain id fails.
    pub expected_chain_id: Option<u64>,
    pub request_timeout: Duration,
    pub wait: WaitPolicy,
}

impl ConnectionSettings {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            expected_chain_id: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            wait: WaitPolicy::default(),
        }
    }

    pub fn with_expected_chain_id(mut self, chain_id: u64) -> Self {
        self.expected_chain_id = Some(chain_id);
        self
    }

    pub fn with_wait_policy(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }
}

/// A JSON-RPC node reached over HTTP.
pub struct NodeConnection {
    provider: DynProvider,
    chain_id: u64,
    signer: Option<Address>,
    wait: WaitPolicy,
}

impl NodeConnection {
    pub async fn connect(
        settings: &ConnectionSettings,
        signer: Option<PrivateKeySigner>,
    ) -> Result<Self> {
        let url: reqwest::Url = settings.rpc_url.parse().map_err(|e| {
            Error::Network(format!("invalid RPC URL '{}': {e}", settings.rpc_url))
        })?;
        let is_local = matches!(url.host_str(), Some("localhost" | "127.0.0.1"));
        let http_client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;
        let client = RpcClient::new(Http::with_client(http_client, url), is_local);

        let signer_address = signer.as_ref().map(|signer| signer.address());
        let provider = match signer {
            Some(signer) => ProviderBuilder::new()
                .wallet(EthereumWallet::from(signer))
                .connect_client(client)
                .erased(),
            None => ProviderBuilder::new().connect_client(client).erased(),
        };

        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(Error::from_transport)?;
        check_chain_id(settings.expected_chain_id, chain_id, &settings.rpc_url)?;
        tracing::info!(
            rpc_url = %settings.rpc_url,
            chain_id,
            signer = ?signer_address,
            "connected to node"
        );

        Ok(Self {
            provider,
            chain_id,
            signer: signer_address,
            wait: settings.wait,
        })
    }

    async fn estimate(&self, request: TransactionRequest) -> Result<u64> {
        self.provider
            .estimate_gas(request)
            .await
            .map_err(Error::from_transport)
    }

    fn request(&self, to: Address, calldata: Bytes) -> TransactionRequest {
        let request = TransactionRequest::default().to(to).input(calldata.into());
        match self.signer {
            Some(from) => request.from(from),
            None => request,
        }
    }
}

impl Connection for NodeConnection {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn signer_address(&self) -> Option<Address> {
        self.signer
    }

    fn wait_policy(&self) -> WaitPolicy {
        self.wait
    }

    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes> {
        tracing::debug!(%to, selector = %hex_selector(&calldata), "eth_call");
        self.provider
            .call(self.request(to, calldata))
            .await
            .map_err(Error::from_transport)
    }

    async fn send(&self, to: Address, calldata: Bytes, value: U256) -> Result<TxHash> {
        let from = self.signer.ok_or(Error::NoSigner)?;
        let request = self.request(to, calldata).value(value);

        let gas = self.estimate(request.clone()).await?;
        let gas_price = self
            .provider
            .get_gas_price()
            .await
            .map_err(Error::from_transport)?;
        let balance = self
            .provider
            .get_balance(from)
            .await
            .map_err(Error::from_transport)?;
        check_affordable(from, balance, value, gas, gas_price)?;

        let pending = self
            .provider
            .send_transaction(request)
            .await
            .map_err(Error::from_transport)?;
        let hash = *pending.tx_hash();
        tracing::info!(%hash, %to, %value, gas, "transaction submitted");
        Ok(hash)
    }

    async fn receipt(&self, hash: TxHash) -> Result<Option<Receipt>> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(Error::from_transport)?;
        Ok(receipt.map(|receipt| Receipt {
            transaction_hash: receipt.transaction_hash,
            success: receipt.status(),
            block_number: receipt.block_number.unwrap_or_default(),
            gas_used: receipt.gas_used,
            logs: receipt.inner.logs().iter().map(LogEntry::from).collect(),
        }))
    }

    async fn replay(&self, hash: TxHash, block: u64) -> Result<Bytes> {
        let transaction = self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .map_err(Error::from_transport)?
            .ok_or_else(|| Error::Network(format!("transaction {hash} not found")))?;
        let mut request = transaction.into_request();
        request.nonce = None;
        request.gas_price = None;
        request.max_fee_per_gas = None;
        request.max_priority_fee_per_gas = None;
        self.provider
            .call(request)
            .block(BlockId::number(block.saturating_sub(1)))
            .await
            .map_err(Error::from_transport)
    }

    async fn block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .map_err(Error::from_transport)
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        self.provider
            .get_balance(address)
            .await
            .map_err(Error::from_transport)
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>> {
        let filter = Filter::from(filter);
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(Error::from_transport)?;
        Ok(logs.iter().map(LogEntry::from).collect())
    }

    async fn storage_at(&self, address: Address, slot: U256) -> Result<U256> {
        self.provider
            .get_storage_at(address, slot)
            .await
            .map_err(Error::from_transport)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes> {
        self.provider
            .get_code_at(address)
            .await
            .map_err(Error::from_transport)
    }

    async fn estimate_gas(&self, to: Address, calldata: Bytes, value: U256) -> Result<u64> {
        tracing::debug!(%to, selector = %hex_selector(&calldata), %value, "eth_estimateGas");
        self.estimate(self.request(to, calldata).value(value)).await
    }
}

fn check_chain_id(expected: Option<u64>, actual: u64, rpc_url: &str) -> Result<()> {
    match expected {
        Some(expected) if expected != actual => Err(Error::Network(format!(
            "node at {rpc_url} reports chain id {actual}, expected {expected}"
        ))),
        _ => Ok(()),
    }
}

/// Fails unless `balance` covers `value` plus `gas` at `gas_price`.
fn check_affordable(
    from: Address,
    balance: U256,
    value: U256,
    gas: u64,
    gas_price: u128,
) -> Result<()> {
    let required = value + U256::from(gas) * U256::from(gas_price);
    if balance < required {
        return Err(Error::InsufficientFunds(format!(
            "{from} holds {balance} wei but needs {required} (value {value} + {gas} gas at {gas_price})"
        )));
    }
    Ok(())
}

fn hex_selector(calldata: &[u8]) -> String {
    calldata
        .get(..4)
        .map(|selector| format!("0x{}", hex::encode(selector)))
        .unwrap_or_else(|| "<none>".to_string())
}
