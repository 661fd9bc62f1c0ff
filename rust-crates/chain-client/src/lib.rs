pub mod abi;
pub mod contract;
pub mod error;
pub mod node;
pub mod proxy;
pub mod receipt;
pub mod rpc;
pub mod value;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use contract::{
    CallDescriptor,
    ContractHandle,
    EventRecord,
    Simulation,
};
pub use error::{
    Error,
    Result,
};
pub use node::{
    ConnectionSettings,
    NodeConnection,
};
pub use proxy::ProxyInfo;
pub use receipt::{
    LogEntry,
    LogFilter,
    Receipt,
};
pub use rpc::{
    Connection,
    WaitPolicy,
};
pub use value::Format;

pub use alloy::{
    dyn_abi::DynSolValue,
    json_abi::JsonAbi,
    primitives::{
        Address,
        Bytes,
        TxHash,
        U256,
    },
    signers::local::PrivateKeySigner,
};
