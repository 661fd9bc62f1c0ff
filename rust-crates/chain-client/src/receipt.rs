use alloy::{
    primitives::{
        Address,
        B256,
        Bytes,
        TxHash,
    },
    rpc::types::{
        Filter,
        Log,
    },
};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: TxHash,
    pub success: bool,
    pub block_number: u64,
    pub gas_used: u64,
    pub logs: Vec<LogEntry>,
}

impl fmt::Display for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.success { "success" } else { "reverted" };
        writeln!(f, "tx:       {}", self.transaction_hash)?;
        writeln!(f, "status:   {status}")?;
        writeln!(f, "block:    {}", self.block_number)?;
        writeln!(f, "gas used: {}", self.gas_used)?;
        write!(f, "logs:     {}", self.logs.len())?;
        for (index, log) in self.logs.iter().enumerate() {
            write!(f, "\n  [{index}] {}", log.address)?;
            for topic in &log.topics {
                write!(f, "\n      topic {topic}")?;
            }
            if !log.data.is_empty() {
                write!(f, "\n      data  {}", log.data)?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<TxHash>,
}

impl From<&Log> for LogEntry {
    fn from(log: &Log) -> Self {
        Self {
            address: log.address(),
            topics: log.topics().to_vec(),
            data: log.data().data.clone(),
            block_number: log.block_number,
            transaction_hash: log.transaction_hash,
        }
    }
}

/// Log query over an inclusive block range. `to_block: None` means latest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Option<Address>,
    pub event_signature: Option<B256>,
    pub topic1: Option<B256>,
    pub from_block: u64,
    pub to_block: Option<u64>,
}

impl LogFilter {
    pub fn matches(&self, log: &LogEntry) -> bool {
        if self.address.is_some_and(|address| address != log.address) {
            return false;
        }
        if self
            .event_signature
            .is_some_and(|sig| log.topics.first() != Some(&sig))
        {
            return false;
        }
        if self
            .topic1
            .is_some_and(|topic| log.topics.get(1) != Some(&topic))
        {
            return false;
        }
        match log.block_number {
            Some(block) => {
                block >= self.from_block && self.to_block.is_none_or(|to| block <= to)
            }
            None => true,
        }
    }
}

impl From<&LogFilter> for Filter {
    fn from(query: &LogFilter) -> Self {
        let mut filter = Filter::new().from_block(query.from_block);
        if let Some(to) = query.to_block {
            filter = filter.to_block(to);
        }
        if let Some(address) = query.address {
            filter = filter.address(address);
        }
        if let Some(signature) = query.event_signature {
            filter = filter.event_signature(signature);
        }
        if let Some(topic) = query.topic1 {
            filter = filter.topic1(topic);
        }
        filter
    }
}
