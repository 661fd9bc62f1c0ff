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
    dyn_abi::DynSolValue,
    primitives::{
        Address,
        Bytes,
        Selector,
        TxHash,
        U256,
        keccak256,
    },
};
use std::{
    collections::{
        HashMap,
        VecDeque,
    },
    sync::{
        Mutex,
        MutexGuard,
    },
    time::Duration,
};

pub const MOCK_CHAIN_ID: u64 = 1337;
pub const MOCK_GAS_ESTIMATE: u64 = 48_000;

pub fn mock_signer() -> Address {
    Address::repeat_byte(0xaa)
}

pub fn selector(signature: &str) -> Selector {
    Selector::from_slice(&keccak256(signature.as_bytes())[..4])
}

/// Return data for `values` as a function would encode its outputs.
pub fn encode_outputs(values: Vec<DynSolValue>) -> Bytes {
    DynSolValue::Tuple(values).abi_encode_params().into()
}

#[derive(Clone, Debug)]
pub enum MockResponse {
    Return(Bytes),
    Revert(Bytes),
    Fail(Error),
}

#[derive(Clone, Debug)]
pub enum SendOutcome {
    Mined,
    Reverted(Bytes),
    NeverMined,
    Rejected(Error),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentTransaction {
    pub to: Address,
    pub calldata: Bytes,
    pub value: U256,
    pub hash: TxHash,
}

#[derive(Default)]
struct MockState {
    responses: HashMap<(Address, Selector), MockResponse>,
    calls: Vec<(Address, Bytes)>,
    send_outcomes: VecDeque<SendOutcome>,
    sent: Vec<SentTransaction>,
    receipts: HashMap<TxHash, Receipt>,
    reverts: HashMap<TxHash, Bytes>,
    balances: HashMap<Address, U256>,
    logs: Vec<LogEntry>,
    storage: HashMap<(Address, U256), U256>,
    code: HashMap<Address, Bytes>,
    gas_estimate: u64,
    block_number: u64,
}

/// Scripted in-memory node. Unscripted calls return empty data, the way an
/// address without code answers.
pub struct MockConnection {
    signer: Option<Address>,
    wait: WaitPolicy,
    state: Mutex<MockState>,
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            signer: Some(mock_signer()),
            wait: WaitPolicy {
                poll_interval: Duration::from_millis(10),
                timeout: Duration::from_secs(1),
            },
            state: Mutex::new(MockState {
                block_number: 100,
                gas_estimate: MOCK_GAS_ESTIMATE,
                ..MockState::default()
            }),
        }
    }

    pub fn read_only() -> Self {
        Self {
            signer: None,
            ..Self::new()
        }
    }

    pub fn with_wait_policy(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }

    pub fn respond(&self, to: Address, signature: &str, response: MockResponse) {
        self.state()
            .responses
            .insert((to, selector(signature)), response);
    }

    pub fn returns(&self, to: Address, signature: &str, values: Vec<DynSolValue>) {
        self.respond(to, signature, MockResponse::Return(encode_outputs(values)));
    }

    pub fn push_send_outcome(&self, outcome: SendOutcome) {
        self.state().send_outcomes.push_back(outcome);
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.state().balances.insert(address, balance);
    }

    pub fn set_block_number(&self, block: u64) {
        self.state().block_number = block;
    }

    pub fn push_log(&self, log: LogEntry) {
        self.state().logs.push(log);
    }

    pub fn set_storage(&self, address: Address, slot: U256, word: U256) {
        self.state().storage.insert((address, slot), word);
    }

    pub fn set_code(&self, address: Address, code: impl Into<Bytes>) {
        self.state().code.insert(address, code.into());
    }

    pub fn set_gas_estimate(&self, gas: u64) {
        self.state().gas_estimate = gas;
    }

    pub fn calls(&self) -> Vec<(Address, Bytes)> {
        self.state().calls.clone()
    }

    pub fn sent(&self) -> Vec<SentTransaction> {
        self.state().sent.clone()
    }
}

impl MockConnection {
    fn scripted(&self, to: Address, calldata: &[u8]) -> Result<Bytes> {
        let Some(selector) = calldata.get(..4).map(Selector::from_slice) else {
            return Ok(Bytes::new());
        };
        match self.state().responses.get(&(to, selector)).cloned() {
            Some(MockResponse::Return(data)) => Ok(data),
            Some(MockResponse::Revert(data)) => Err(Error::revert(data)),
            Some(MockResponse::Fail(err)) => Err(err),
            None => Ok(Bytes::new()),
        }
    }
}

impl Connection for MockConnection {
    fn chain_id(&self) -> u64 {
        MOCK_CHAIN_ID
    }

    fn signer_address(&self) -> Option<Address> {
        self.signer
    }

    fn wait_policy(&self) -> WaitPolicy {
        self.wait
    }

    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes> {
        self.state().calls.push((to, calldata.clone()));
        self.scripted(to, &calldata)
    }

    async fn send(&self, to: Address, calldata: Bytes, value: U256) -> Result<TxHash> {
        if self.signer.is_none() {
            return Err(Error::NoSigner);
        }
        let mut state = self.state();
        let outcome = state.send_outcomes.pop_front().unwrap_or(SendOutcome::Mined);
        if let SendOutcome::Rejected(err) = outcome {
            return Err(err);
        }
        let hash = keccak256((state.sent.len() as u64).to_be_bytes());
        state.sent.push(SentTransaction {
            to,
            calldata,
            value,
            hash,
        });
        let block_number = state.block_number;
        let mined = |success| Receipt {
            transaction_hash: hash,
            success,
            block_number,
            gas_used: 21_000,
            logs: Vec::new(),
        };
        match outcome {
            SendOutcome::Mined => {
                state.receipts.insert(hash, mined(true));
            }
            SendOutcome::Reverted(data) => {
                state.receipts.insert(hash, mined(false));
                state.reverts.insert(hash, data);
            }
            SendOutcome::NeverMined | SendOutcome::Rejected(_) => {}
        }
        Ok(hash)
    }

    async fn receipt(&self, hash: TxHash) -> Result<Option<Receipt>> {
        Ok(self.state().receipts.get(&hash).cloned())
    }

    async fn replay(&self, hash: TxHash, _block: u64) -> Result<Bytes> {
        match self.state().reverts.get(&hash) {
            Some(data) => Err(Error::revert(data.clone())),
            None => Ok(Bytes::new()),
        }
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.state().block_number)
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        Ok(self
            .state()
            .balances
            .get(&address)
            .copied()
            .unwrap_or_default())
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>> {
        Ok(self
            .state()
            .logs
            .iter()
            .filter(|log| filter.matches(log))
            .cloned()
            .collect())
    }

    async fn storage_at(&self, address: Address, slot: U256) -> Result<U256> {
        Ok(self
            .state()
            .storage
            .get(&(address, slot))
            .copied()
            .unwrap_or_default())
    }

    async fn code_at(&self, address: Address) -> Result<Bytes> {
        Ok(self.state().code.get(&address).cloned().unwrap_or_default())
    }

    /// Reverts exactly where the scripted call for the same selector reverts.
    async fn estimate_gas(&self, to: Address, calldata: Bytes, _value: U256) -> Result<u64> {
        self.scripted(to, &calldata)?;
        Ok(self.state().gas_estimate)
    }
}
