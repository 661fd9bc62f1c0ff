use crate::{
    Connection,
    Error,
    LogFilter,
    Result,
    abi,
};
use alloy::{
    dyn_abi::{
        DecodedEvent,
        DynSolValue,
        EventExt,
        FunctionExt,
        JsonAbiExt,
    },
    json_abi::{
        Function,
        JsonAbi,
    },
    primitives::{
        Address,
        Bytes,
        TxHash,
        U256,
    },
};

/// One prepared invocation: the resolved function and its arguments.
#[derive(Clone, Debug)]
pub struct CallDescriptor {
    pub function: Function,
    pub args: Vec<DynSolValue>,
}

impl CallDescriptor {
    pub fn method(&self) -> String {
        self.function.signature()
    }

    pub fn calldata(&self) -> Result<Bytes> {
        self.function
            .abi_encode_input(&self.args)
            .map(Bytes::from)
            .map_err(|e| Error::Encode {
                method: self.method(),
                reason: e.to_string(),
            })
    }

    pub fn decode_output(&self, data: &[u8]) -> Result<Vec<DynSolValue>> {
        self.function
            .abi_decode_output(data)
            .map_err(|e| Error::Decode {
                method: self.method(),
                reason: if data.is_empty() {
                    "empty return data (wrong address or ABI?)".to_string()
                } else {
                    format!("{e} ({} bytes returned)", data.len())
                },
            })
    }
}

#[derive(Clone, Debug)]
pub struct EventRecord {
    pub block_number: Option<u64>,
    pub transaction_hash: Option<TxHash>,
    pub indexed: Vec<DynSolValue>,
    pub body: Vec<DynSolValue>,
}

/// Result of executing a write against current state without sending it.
#[derive(Clone, Debug, PartialEq)]
pub struct Simulation {
    pub gas: u64,
    /// Decoded return values; empty when the call carried native value and
    /// was only estimated.
    pub output: Vec<DynSolValue>,
}

/// A deployed contract addressed by method name rather than raw selector.
pub struct ContractHandle<'c, C> {
    connection: &'c C,
    address: Address,
    abi: JsonAbi,
}

impl<'c, C: Connection> ContractHandle<'c, C> {
    pub fn new(connection: &'c C, address: Address, abi: JsonAbi) -> Self {
        Self {
            connection,
            address,
            abi,
        }
    }

    /// Binds a raw ABI fragment, failing with [`Error::InvalidAbi`] if it does
    /// not parse.
    pub fn at(
        connection: &'c C,
        address: Address,
        fragment: &serde_json::Value,
    ) -> Result<Self> {
        let abi = abi::parse_fragment(fragment)?;
        Ok(Self::new(connection, address, abi))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    pub fn describe(
        &self,
        method: &str,
        args: Vec<DynSolValue>,
    ) -> Result<CallDescriptor> {
        let function = abi::resolve_function(&self.abi, method, Some(args.len()))?;
        Ok(CallDescriptor {
            function: function.clone(),
            args,
        })
    }

    pub fn describe_str<S: AsRef<str>>(
        &self,
        method: &str,
        args: &[S],
    ) -> Result<CallDescriptor> {
        let function = abi::resolve_function(&self.abi, method, Some(args.len()))?;
        let args = abi::coerce_args(function, args)?;
        Ok(CallDescriptor {
            function: function.clone(),
            args,
        })
    }

    pub async fn read(
        &self,
        method: &str,
        args: Vec<DynSolValue>,
    ) -> Result<Vec<DynSolValue>> {
        let descriptor = self.describe(method, args)?;
        self.execute_read(&descriptor).await
    }

    pub async fn read_str<S: AsRef<str>>(
        &self,
        method: &str,
        args: &[S],
    ) -> Result<Vec<DynSolValue>> {
        let descriptor = self.describe_str(method, args)?;
        self.execute_read(&descriptor).await
    }

    pub async fn write(
        &self,
        method: &str,
        args: Vec<DynSolValue>,
        value: U256,
    ) -> Result<TxHash> {
        let descriptor = self.describe(method, args)?;
        self.execute_write(&descriptor, value).await
    }

    pub async fn write_str<S: AsRef<str>>(
        &self,
        method: &str,
        args: &[S],
        value: U256,
    ) -> Result<TxHash> {
        let descriptor = self.describe_str(method, args)?;
        self.execute_write(&descriptor, value).await
    }

    pub async fn execute_read(
        &self,
        descriptor: &CallDescriptor,
    ) -> Result<Vec<DynSolValue>> {
        let calldata = descriptor.calldata()?;
        tracing::debug!(
            address = %self.address,
            method = %descriptor.method(),
            "read"
        );
        let output = self
            .connection
            .call(self.address, calldata)
            .await
            .map_err(|err| self.explain(err))?;
        descriptor.decode_output(&output)
    }

    pub async fn execute_write(
        &self,
        descriptor: &CallDescriptor,
        value: U256,
    ) -> Result<TxHash> {
        let calldata = descriptor.calldata()?;
        tracing::debug!(
            address = %self.address,
            method = %descriptor.method(),
            %value,
            "write"
        );
        self.connection
            .send(self.address, calldata, value)
            .await
            .map_err(|err| self.explain(err))
    }

    pub async fn simulate_str<S: AsRef<str>>(
        &self,
        method: &str,
        args: &[S],
        value: U256,
    ) -> Result<Simulation> {
        let descriptor = self.describe_str(method, args)?;
        self.execute_simulation(&descriptor, value).await
    }

    /// Estimates gas for the write and, for zero-value calls, executes it
    /// with `eth_call` to decode what it would return. Needs no signer.
    pub async fn execute_simulation(
        &self,
        descriptor: &CallDescriptor,
        value: U256,
    ) -> Result<Simulation> {
        let calldata = descriptor.calldata()?;
        tracing::debug!(
            address = %self.address,
            method = %descriptor.method(),
            from = ?self.connection.signer_address(),
            %value,
            "simulate"
        );
        let gas = self
            .connection
            .estimate_gas(self.address, calldata.clone(), value)
            .await
            .map_err(|err| self.explain(err))?;
        let output = if value.is_zero() {
            let data = self
                .connection
                .call(self.address, calldata)
                .await
                .map_err(|err| self.explain(err))?;
            descriptor.decode_output(&data)?
        } else {
            Vec::new()
        };
        Ok(Simulation { gas, output })
    }

    /// Logs of the named event emitted by this contract, decoded. `name` is a
    /// bare name or, for overloaded events, the full signature.
    pub async fn events(
        &self,
        name: &str,
        from_block: u64,
        to_block: Option<u64>,
    ) -> Result<Vec<EventRecord>> {
        let event = abi::resolve_event(&self.abi, name)?;
        let filter = LogFilter {
            address: Some(self.address),
            event_signature: Some(event.selector()),
            topic1: None,
            from_block,
            to_block,
        };
        let logs = self.connection.logs(&filter).await?;
        logs.into_iter()
            .map(|log| {
                event
                    .decode_log_parts(log.topics.iter().copied(), &log.data)
                    .map(|decoded: DecodedEvent| EventRecord {
                        block_number: log.block_number,
                        transaction_hash: log.transaction_hash,
                        indexed: decoded.indexed,
                        body: decoded.body,
                    })
                    .map_err(|e| Error::Decode {
                        method: event.signature(),
                        reason: e.to_string(),
                    })
            })
            .collect()
    }

    /// Prefers this contract's custom errors when naming a revert.
    fn explain(&self, err: Error) -> Error {
        err.explained_by([&self.abi])
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use crate::{
        Connection,
        LogEntry,
        abi::parse_fragment,
        test_helpers::{
            MockConnection,
            MockResponse,
            SendOutcome,
            mock_signer,
        },
    };
    use alloy::{
        primitives::{
            B256,
            address,
        },
        sol_types::{
            Revert,
            SolError,
        },
    };
    use proptest::prelude::*;
    use serde_json::json;

    const TREASURY: Address = address!("5fbdb2315678afecb367f032d93f642f64180aa3");

    fn treasury_abi() -> JsonAbi {
        parse_fragment(&json!([
            "function balanceOf(address owner) view returns (uint256)",
            "function pendingTaxBuyback() view returns (uint256)",
            "function setOperator(address operator, bool enabled)",
            "function transfer(address to, uint256 amount) returns (bool)",
            "event Settled(bytes32 indexed topicId, uint8 outcome)",
            "event Swept(uint256 amount)",
            "event Swept(address indexed to, uint256 amount)",
            "error NotOperator(address caller)"
        ]))
        .unwrap()
    }

    #[tokio::test]
    async fn read__zero_word_returned__decodes_zero_balance() {
        // given
        let connection = MockConnection::new();
        connection.respond(
            TREASURY,
            "balanceOf(address)",
            MockResponse::Return(Bytes::from(vec![0u8; 32])),
        );
        let handle = ContractHandle::new(&connection, TREASURY, treasury_abi());

        // when
        let values = handle
            .read("balanceOf", vec![DynSolValue::Address(Address::ZERO)])
            .await
            .unwrap();

        // then
        assert_eq!(values, vec![DynSolValue::Uint(U256::ZERO, 256)]);
    }

    #[tokio::test]
    async fn read__no_code_at_address__is_decode_error() {
        // given
        let connection = MockConnection::new();
        let handle = ContractHandle::new(&connection, TREASURY, treasury_abi());

        // when
        let result = handle.read("pendingTaxBuyback", vec![]).await;

        // then
        let Err(Error::Decode { method, reason }) = result else {
            panic!("expected decode error, got {result:?}");
        };
        assert_eq!(method, "pendingTaxBuyback()");
        assert!(reason.contains("empty return data"));
    }

    #[tokio::test]
    async fn read_str__textual_arguments__are_encoded_into_calldata() {
        // given
        let connection = MockConnection::new();
        connection.returns(
            TREASURY,
            "balanceOf(address)",
            vec![DynSolValue::Uint(U256::from(7), 256)],
        );
        let handle = ContractHandle::new(&connection, TREASURY, treasury_abi());

        // when
        let values = handle
            .read_str("balanceOf", &["0x193575b640ccd6c079ce01aebc75190f13c6b22c"])
            .await
            .unwrap();

        // then
        assert_eq!(values, vec![DynSolValue::Uint(U256::from(7), 256)]);
        let calls = connection.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.len(), 4 + 32);
    }

    #[tokio::test]
    async fn read__custom_error_revert__is_named_from_contract_abi() {
        // given
        let connection = MockConnection::new();
        let abi = treasury_abi();
        let error = abi.errors().next().unwrap();
        let mut data = error.selector().to_vec();
        data.extend(DynSolValue::Address(Address::repeat_byte(0xbb)).abi_encode());
        connection.respond(
            TREASURY,
            "pendingTaxBuyback()",
            MockResponse::Revert(data.into()),
        );
        let handle = ContractHandle::new(&connection, TREASURY, abi);

        // when
        let result = handle.read("pendingTaxBuyback", vec![]).await;

        // then
        let Err(Error::Revert { reason, .. }) = result else {
            panic!("expected revert, got {result:?}");
        };
        assert!(reason.unwrap().starts_with("NotOperator("));
    }

    #[tokio::test]
    async fn write__mined_revert__wait_surfaces_revert_data() {
        // given
        let connection = MockConnection::new();
        let revert = Revert {
            reason: "Not owner".to_string(),
        }
        .abi_encode();
        connection.push_send_outcome(SendOutcome::Reverted(revert.clone().into()));
        let handle = ContractHandle::new(&connection, TREASURY, treasury_abi());

        // when
        let hash = handle
            .write_str(
                "setOperator",
                &["0x193575b640ccd6c079ce01aebc75190f13c6b22c", "true"],
                U256::ZERO,
            )
            .await
            .unwrap();
        let result = connection.wait_for_receipt(hash, 1).await;

        // then
        let Err(Error::Revert { data, reason }) = result else {
            panic!("expected revert, got {result:?}");
        };
        assert_eq!(data.as_ref(), revert.as_slice());
        assert!(reason.unwrap().contains("Not owner"));
    }

    #[tokio::test]
    async fn write__read_only_connection__is_no_signer() {
        // given
        let connection = MockConnection::read_only();
        let handle = ContractHandle::new(&connection, TREASURY, treasury_abi());

        // when
        let result = handle
            .write(
                "transfer",
                vec![
                    DynSolValue::Address(Address::ZERO),
                    DynSolValue::Uint(U256::from(1), 256),
                ],
                U256::ZERO,
            )
            .await;

        // then
        assert!(matches!(result, Err(Error::NoSigner)));
        assert!(connection.sent().is_empty());
    }

    #[tokio::test]
    async fn write__unknown_method__fails_before_sending() {
        // given
        let connection = MockConnection::new();
        let handle = ContractHandle::new(&connection, TREASURY, treasury_abi());

        // when
        let result = handle.write_str::<&str>("withdrawAll", &[], U256::ZERO).await;

        // then
        assert!(matches!(result, Err(Error::Encode { .. })));
        assert!(connection.sent().is_empty());
    }

    #[tokio::test]
    async fn events__matching_logs__are_decoded() {
        // given
        let connection = MockConnection::new();
        let abi = treasury_abi();
        let event = abi.event("Settled").unwrap()[0].clone();
        let topic_id = B256::repeat_byte(0x11);
        connection.push_log(LogEntry {
            address: TREASURY,
            topics: vec![event.selector(), topic_id],
            data: DynSolValue::Uint(U256::from(2), 8).abi_encode().into(),
            block_number: Some(120),
            transaction_hash: None,
        });
        connection.push_log(LogEntry {
            address: Address::repeat_byte(0x01),
            topics: vec![event.selector(), topic_id],
            data: DynSolValue::Uint(U256::from(1), 8).abi_encode().into(),
            block_number: Some(121),
            transaction_hash: None,
        });
        let handle = ContractHandle::new(&connection, TREASURY, abi);

        // when
        let events = handle.events("Settled", 100, None).await.unwrap();

        // then
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].block_number, Some(120));
        assert_eq!(events[0].indexed, vec![DynSolValue::FixedBytes(topic_id, 32)]);
        assert_eq!(events[0].body, vec![DynSolValue::Uint(U256::from(2), 8)]);
    }

    #[tokio::test]
    async fn events__overloaded_bare_name__is_ambiguous() {
        // given
        let connection = MockConnection::new();
        let handle = ContractHandle::new(&connection, TREASURY, treasury_abi());

        // when
        let result = handle.events("Swept", 0, None).await;

        // then
        let Err(Error::Encode { reason, .. }) = result else {
            panic!("expected ambiguity error, got {result:?}");
        };
        assert!(reason.contains("Swept(uint256)"));
        assert!(reason.contains("Swept(address,uint256)"));
    }

    #[tokio::test]
    async fn events__full_signature__selects_overload() {
        // given
        let connection = MockConnection::new();
        let abi = treasury_abi();
        let event = abi
            .events()
            .find(|event| event.signature() == "Swept(address,uint256)")
            .unwrap()
            .clone();
        let to = Address::repeat_byte(0x22);
        connection.push_log(LogEntry {
            address: TREASURY,
            topics: vec![event.selector(), to.into_word()],
            data: DynSolValue::Uint(U256::from(9), 256).abi_encode().into(),
            block_number: Some(130),
            transaction_hash: None,
        });
        let handle = ContractHandle::new(&connection, TREASURY, abi);

        // when
        let events = handle
            .events("Swept(address,uint256)", 0, None)
            .await
            .unwrap();

        // then
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].indexed, vec![DynSolValue::Address(to)]);
        assert_eq!(events[0].body, vec![DynSolValue::Uint(U256::from(9), 256)]);
    }

    #[test]
    fn at__human_readable_fragment__binds_functions() {
        // given
        let connection = MockConnection::new();
        let fragment = json!(["function seekCost() view returns (uint256)"]);

        // when
        let handle = ContractHandle::at(&connection, TREASURY, &fragment).unwrap();

        // then
        assert_eq!(handle.address(), TREASURY);
        assert!(handle.abi().function("seekCost").is_some());
    }

    #[test]
    fn at__unparsable_fragment__is_invalid_abi() {
        // given
        let connection = MockConnection::new();

        // when
        let result = ContractHandle::at(&connection, TREASURY, &json!({ "bytecode": "0x" }));

        // then
        assert!(matches!(result, Err(Error::InvalidAbi(_))));
    }

    #[tokio::test]
    async fn simulate_str__succeeding_write__estimates_gas_without_sending() {
        // given
        let connection = MockConnection::read_only();
        connection.set_gas_estimate(61_234);
        connection.returns(
            TREASURY,
            "transfer(address,uint256)",
            vec![DynSolValue::Bool(true)],
        );
        let handle = ContractHandle::new(&connection, TREASURY, treasury_abi());

        // when
        let simulation = handle
            .simulate_str(
                "transfer",
                &["0x193575b640ccd6c079ce01aebc75190f13c6b22c", "5"],
                U256::ZERO,
            )
            .await
            .unwrap();

        // then
        assert_eq!(simulation.gas, 61_234);
        assert_eq!(simulation.output, vec![DynSolValue::Bool(true)]);
        assert!(connection.sent().is_empty());
    }

    #[tokio::test]
    async fn simulate_str__reverting_write__names_custom_error() {
        // given
        let connection = MockConnection::new();
        let mut data = crate::test_helpers::selector("NotOperator(address)").to_vec();
        data.extend(DynSolValue::Address(mock_signer()).abi_encode());
        connection.respond(
            TREASURY,
            "setOperator(address,bool)",
            MockResponse::Revert(data.into()),
        );
        let handle = ContractHandle::new(&connection, TREASURY, treasury_abi());

        // when
        let result = handle
            .simulate_str(
                "setOperator",
                &["0x193575b640ccd6c079ce01aebc75190f13c6b22c", "true"],
                U256::ZERO,
            )
            .await;

        // then
        let Err(Error::Revert { reason, .. }) = result else {
            panic!("expected revert, got {result:?}");
        };
        assert!(reason.unwrap().starts_with("NotOperator("));
        assert!(connection.sent().is_empty());
    }

    #[tokio::test]
    async fn simulate_str__payable_write__only_estimates() {
        // given
        let connection = MockConnection::new();
        let handle = ContractHandle::new(&connection, TREASURY, treasury_abi());

        // when
        let simulation = handle
            .simulate_str(
                "setOperator",
                &["0x193575b640ccd6c079ce01aebc75190f13c6b22c", "true"],
                U256::from(1),
            )
            .await
            .unwrap();

        // then
        assert_eq!(simulation.gas, crate::test_helpers::MOCK_GAS_ESTIMATE);
        assert!(simulation.output.is_empty());
        assert!(connection.calls().is_empty());
    }

    proptest! {
        #[test]
        fn describe__transfer_arguments__survive_encode_and_decode(
            to in any::<[u8; 20]>(),
            amount in any::<[u8; 32]>(),
        ) {
            let connection = MockConnection::new();
            let handle = ContractHandle::new(&connection, TREASURY, treasury_abi());
            let args = vec![
                DynSolValue::Address(Address::from(to)),
                DynSolValue::Uint(U256::from_be_bytes(amount), 256),
            ];
            let descriptor = handle.describe("transfer", args.clone()).unwrap();

            let calldata = descriptor.calldata().unwrap();
            let decoded = descriptor.function.abi_decode_input(&calldata[4..]).unwrap();

            let selector = descriptor.function.selector();
            prop_assert_eq!(&calldata[..4], selector.as_slice());
            prop_assert_eq!(decoded, args);
        }
    }
}
