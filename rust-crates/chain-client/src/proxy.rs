//! EIP-1967 proxy inspection and account code checks.

use crate::{
    Connection,
    Result,
};
use alloy::primitives::{
    Address,
    U256,
    uint,
};

/// `bytes32(uint256(keccak256("eip1967.proxy.implementation")) - 1)`
pub const IMPLEMENTATION_SLOT: U256 =
    uint!(0x360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc_U256);

/// `bytes32(uint256(keccak256("eip1967.proxy.admin")) - 1)`
pub const ADMIN_SLOT: U256 =
    uint!(0xb53127684a568b3173ae13b9f8a6016e243e63b6e8ee1178d6a717850b5d6103_U256);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProxyInfo {
    pub proxy: Address,
    pub implementation: Option<Address>,
    pub admin: Option<Address>,
}

impl ProxyInfo {
    pub fn is_proxy(&self) -> bool {
        self.implementation.is_some()
    }
}

pub async fn inspect<C: Connection>(connection: &C, proxy: Address) -> Result<ProxyInfo> {
    let implementation = slot_address(connection, proxy, IMPLEMENTATION_SLOT).await?;
    let admin = slot_address(connection, proxy, ADMIN_SLOT).await?;
    tracing::debug!(%proxy, ?implementation, ?admin, "read proxy slots");
    Ok(ProxyInfo {
        proxy,
        implementation,
        admin,
    })
}

pub async fn is_contract<C: Connection>(connection: &C, address: Address) -> Result<bool> {
    Ok(!connection.code_at(address).await?.is_empty())
}

/// The address packed in the low 20 bytes of a storage word; `None` for an
/// empty slot.
async fn slot_address<C: Connection>(
    connection: &C,
    address: Address,
    slot: U256,
) -> Result<Option<Address>> {
    let word = connection.storage_at(address, slot).await?;
    if word.is_zero() {
        return Ok(None);
    }
    let bytes = word.to_be_bytes::<32>();
    Ok(Some(Address::from_slice(&bytes[12..])))
}
