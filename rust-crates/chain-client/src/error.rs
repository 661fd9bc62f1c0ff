use crate::abi;
use alloy::{
    json_abi::JsonAbi,
    primitives::{
        Bytes,
        TxHash,
    },
    sol_types::decode_revert_reason,
    transports::TransportError,
};
use std::time::Duration;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    /// Connection refused, transport timeout, malformed node response.
    #[error("network error: {0}")]
    Network(String),
    /// The node reported an execution failure. `data` is the raw revert payload.
    #[error("execution reverted: {}", describe_revert(.reason, .data))]
    Revert {
        data: Bytes,
        reason: Option<String>,
    },
    #[error("failed to decode result of `{method}`: {reason}")]
    Decode { method: String, reason: String },
    #[error("failed to encode call to `{method}`: {reason}")]
    Encode { method: String, reason: String },
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("no receipt for {hash} after waiting {waited:?}")]
    Timeout { hash: TxHash, waited: Duration },
    #[error("invalid ABI: {0}")]
    InvalidAbi(String),
    #[error("no signing key configured; sending transactions requires a signer")]
    NoSigner,
}

impl Error {
    pub fn revert(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let reason = if data.is_empty() {
            None
        } else {
            decode_revert_reason(&data)
        };
        Error::Revert { data, reason }
    }

    pub fn revert_data(&self) -> Option<&Bytes> {
        match self {
            Error::Revert { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Re-names a revert against `abis`, keeping the earlier reason when none
    /// of them declares the error. Other variants pass through.
    pub fn explained_by<'a>(self, abis: impl IntoIterator<Item = &'a JsonAbi>) -> Self {
        match self {
            Error::Revert { data, reason } => {
                let reason = abi::decode_revert(&data, abis).or(reason);
                Error::Revert { data, reason }
            }
            other => other,
        }
    }

    pub(crate) fn from_transport(err: TransportError) -> Self {
        match err.as_error_resp() {
            Some(payload) => Error::from_node(
                payload.code,
                &payload.message,
                payload.as_revert_data(),
            ),
            None => Error::Network(err.to_string()),
        }
    }

    /// Classifies a JSON-RPC error response.
    pub(crate) fn from_node(code: i64, message: &str, revert_data: Option<Bytes>) -> Self {
        if let Some(data) = revert_data {
            return Error::revert(data);
        }
        let lowered = message.to_lowercase();
        if lowered.contains("insufficient funds") {
            return Error::InsufficientFunds(message.to_string());
        }
        if lowered.contains("revert") {
            let reason = message
                .split_once("reverted:")
                .map(|(_, reason)| reason.trim().to_string())
                .filter(|reason| !reason.is_empty());
            return Error::Revert {
                data: Bytes::new(),
                reason,
            };
        }
        Error::Network(format!("node error {code}: {message}"))
    }
}

fn describe_revert(reason: &Option<String>, data: &Bytes) -> String {
    match reason {
        Some(reason) => format!("{reason} (data: {data})"),
        None if data.is_empty() => "no revert data".to_string(),
        None => format!("undecoded revert data {data}"),
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use alloy::{
        primitives::hex,
        sol_types::{
            Revert,
            SolError,
        },
    };

    #[test]
    fn revert__error_string_payload__decodes_reason() {
        // given
        let data = Revert {
            reason: "Not owner".to_string(),
        }
        .abi_encode();

        // when
        let err = Error::revert(data.clone());

        // then
        let Error::Revert {
            data: actual,
            reason,
        } = err
        else {
            panic!("expected revert");
        };
        assert_eq!(actual.as_ref(), data.as_slice());
        assert!(reason.unwrap().contains("Not owner"));
    }

    #[test]
    fn revert__unknown_selector__keeps_raw_bytes() {
        // given
        let data = hex!("ce98791e").to_vec();

        // when
        let err = Error::revert(data.clone());

        // then
        assert_eq!(err.revert_data().map(|d| d.to_vec()), Some(data));
        assert!(err.to_string().contains("0xce98791e"));
    }

    #[test]
    fn from_node__insufficient_funds_message__is_insufficient_funds() {
        // when
        let err = Error::from_node(
            -32000,
            "insufficient funds for gas * price + value: balance 0",
            None,
        );

        // then
        assert!(matches!(err, Error::InsufficientFunds(message) if message.contains("balance 0")));
    }

    #[test]
    fn from_node__reverted_message_without_data__keeps_reason() {
        // when
        let err = Error::from_node(3, "execution reverted: Not owner", None);

        // then
        let Error::Revert { data, reason } = err else {
            panic!("expected revert, got {err:?}");
        };
        assert!(data.is_empty());
        assert_eq!(reason.as_deref(), Some("Not owner"));
    }

    #[test]
    fn from_node__revert_data__decodes_payload() {
        // given
        let data = Revert {
            reason: "Threshold not met".to_string(),
        }
        .abi_encode();

        // when
        let err = Error::from_node(3, "execution reverted", Some(data.clone().into()));

        // then
        assert_eq!(err.revert_data().map(|d| d.to_vec()), Some(data));
        assert!(err.to_string().contains("Threshold not met"));
    }

    #[test]
    fn from_node__unrelated_failure__is_network_error() {
        // when
        let err = Error::from_node(-32601, "method not found", None);

        // then
        assert!(matches!(err, Error::Network(message) if message.contains("-32601")));
    }

    #[test]
    fn explained_by__declared_custom_error__names_it() {
        // given
        let abi = JsonAbi::parse(["error NotOperator(address caller)"]).unwrap();
        let error = abi.errors().next().unwrap();
        let mut data = error.selector().to_vec();
        data.extend([0u8; 32]);

        // when
        let err = Error::revert(data).explained_by([&abi]);

        // then
        let Error::Revert { reason, .. } = err else {
            panic!("expected revert");
        };
        assert!(reason.unwrap().starts_with("NotOperator("));
    }

    #[test]
    fn explained_by__other_variant__is_unchanged() {
        // when
        let err = Error::NoSigner.explained_by(std::iter::empty());

        // then
        assert!(matches!(err, Error::NoSigner));
    }
}
