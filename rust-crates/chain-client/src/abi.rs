//! ABI fragments: parsing, function lookup, argument coercion and revert decoding.
//!
//! Fragments arrive in the two shapes deployment files carry: the Solidity JSON
//! ABI array, and arrays of human-readable signatures such as
//! `"function seekCost() view returns (uint256)"`. Hardhat artifacts (an
//! object with an `abi` field) and JSON-encoded strings are unwrapped first.

use crate::{
    Error,
    LogEntry,
    Result,
};
use alloy::{
    dyn_abi::{
        DynSolValue,
        EventExt,
        JsonAbiExt,
        Specifier,
    },
    json_abi::{
        Event,
        Function,
        JsonAbi,
    },
    sol_types::decode_revert_reason,
};
use serde_json::Value;
use std::fmt;

pub fn parse_fragment(fragment: &Value) -> Result<JsonAbi> {
    match fragment {
        Value::Array(items) if items.iter().all(Value::is_string) => {
            let signatures = items.iter().filter_map(Value::as_str);
            JsonAbi::parse(signatures)
                .map_err(|e| Error::InvalidAbi(format!("bad signature: {e}")))
        }
        Value::Array(_) => serde_json::from_value(fragment.clone())
            .map_err(|e| Error::InvalidAbi(e.to_string())),
        Value::Object(artifact) => match artifact.get("abi") {
            Some(abi) => parse_fragment(abi),
            None => Err(Error::InvalidAbi(
                "object fragment has no `abi` field".to_string(),
            )),
        },
        Value::String(encoded) => {
            let decoded: Value = serde_json::from_str(encoded)
                .map_err(|e| Error::InvalidAbi(format!("string fragment: {e}")))?;
            if decoded.is_string() {
                return Err(Error::InvalidAbi("doubly encoded fragment".to_string()));
            }
            parse_fragment(&decoded)
        }
        other => Err(Error::InvalidAbi(format!(
            "expected an ABI array, found {}",
            json_kind(other)
        ))),
    }
}

/// Finds a function by bare name or by full signature `name(type,...)`.
///
/// Overloads are disambiguated by `arity` when given.
pub fn resolve_function<'a>(
    abi: &'a JsonAbi,
    method: &str,
    arity: Option<usize>,
) -> Result<&'a Function> {
    let unknown = |reason: String| Error::Encode {
        method: method.to_string(),
        reason,
    };

    if method.contains('(') {
        return abi
            .functions()
            .find(|function| function.signature() == method)
            .ok_or_else(|| unknown("no function with this signature".to_string()));
    }

    let overloads = abi
        .function(method)
        .ok_or_else(|| unknown("no such function in ABI".to_string()))?;
    let candidates: Vec<&Function> = overloads
        .iter()
        .filter(|function| arity.is_none_or(|n| function.inputs.len() == n))
        .collect();
    match candidates.as_slice() {
        [function] => Ok(*function),
        [] => Err(unknown(format!(
            "no overload takes {} argument(s)",
            arity.unwrap_or_default()
        ))),
        many => Err(unknown(format!(
            "ambiguous between {}; pass the full signature",
            many.iter()
                .map(|function| function.signature())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

/// Finds an event by bare name or full signature. A bare name shared by
/// several overloads is an error listing them.
pub fn resolve_event<'a>(abi: &'a JsonAbi, name: &str) -> Result<&'a Event> {
    let unknown = |reason: String| Error::Encode {
        method: name.to_string(),
        reason,
    };

    if name.contains('(') {
        return abi
            .events()
            .find(|event| event.signature() == name)
            .ok_or_else(|| unknown("no event with this signature".to_string()));
    }

    match abi.event(name).map(Vec::as_slice) {
        Some([event]) => Ok(event),
        Some(many) if !many.is_empty() => Err(unknown(format!(
            "ambiguous between {}; pass the full signature",
            many.iter()
                .map(|event| event.signature())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
        _ => Err(unknown("no such event in ABI".to_string())),
    }
}

/// Coerces textual arguments into the function's declared input types.
pub fn coerce_args<S: AsRef<str>>(
    function: &Function,
    args: &[S],
) -> Result<Vec<DynSolValue>> {
    let encode_error = |reason: String| Error::Encode {
        method: function.signature(),
        reason,
    };
    if function.inputs.len() != args.len() {
        return Err(encode_error(format!(
            "expected {} argument(s), got {}",
            function.inputs.len(),
            args.len()
        )));
    }
    function
        .inputs
        .iter()
        .zip(args)
        .map(|(param, raw)| {
            let ty = param
                .resolve()
                .map_err(|e| encode_error(format!("parameter `{}`: {e}", param.name)))?;
            ty.coerce_str(raw.as_ref()).map_err(|e| {
                encode_error(format!(
                    "`{}` is not a valid {} for `{}`: {e}",
                    raw.as_ref(),
                    ty.sol_type_name(),
                    param.name
                ))
            })
        })
        .collect()
}

/// Human-readable revert reason: custom errors declared in `abis` first, then
/// the standard `Error(string)` and `Panic(uint256)` payloads.
pub fn decode_revert<'a>(
    data: &[u8],
    abis: impl IntoIterator<Item = &'a JsonAbi>,
) -> Option<String> {
    if data.is_empty() {
        return None;
    }
    if let Some(selector) = data.get(..4) {
        for abi in abis {
            let Some(error) = abi.errors().find(|e| e.selector().as_slice() == selector)
            else {
                continue;
            };
            let rendered = match error.abi_decode_input(&data[4..]) {
                Ok(values) => values
                    .iter()
                    .map(crate::value::render)
                    .collect::<Vec<_>>()
                    .join(", "),
                Err(_) => "<undecodable arguments>".to_string(),
            };
            return Some(format!("{}({rendered})", error.name));
        }
    }
    decode_revert_reason(data)
}

/// A receipt log matched to an event declared in one of the known ABIs.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedLog {
    pub name: String,
    /// Parameter names and values in declaration order, indexed and body
    /// fields interleaved as the event declares them.
    pub fields: Vec<(String, DynSolValue)>,
}

impl fmt::Display for DecodedLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self
            .fields
            .iter()
            .map(|(name, value)| match name.as_str() {
                "" => crate::value::render(value),
                name => format!("{name}={}", crate::value::render(value)),
            })
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}({fields})", self.name)
    }
}

/// Decodes `log` against the first ABI declaring an event whose selector
/// equals topic0. Anonymous events and unknown topics yield `None`.
pub fn decode_log<'a>(
    log: &LogEntry,
    abis: impl IntoIterator<Item = &'a JsonAbi>,
) -> Option<DecodedLog> {
    let topic0 = log.topics.first()?;
    for abi in abis {
        let candidates = abi
            .events()
            .filter(|event| !event.anonymous && event.selector() == *topic0);
        for event in candidates {
            let Ok(decoded) = event.decode_log_parts(log.topics.iter().copied(), &log.data)
            else {
                continue;
            };
            let mut indexed = decoded.indexed.into_iter();
            let mut body = decoded.body.into_iter();
            let fields = event
                .inputs
                .iter()
                .map(|param| {
                    let value = if param.indexed {
                        indexed.next()
                    } else {
                        body.next()
                    };
                    value.map(|value| (param.name.clone(), value))
                })
                .collect::<Option<Vec<_>>>()?;
            return Some(DecodedLog {
                name: event.name.clone(),
                fields,
            });
        }
    }
    None
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
