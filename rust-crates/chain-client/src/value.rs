use alloy::{
    dyn_abi::DynSolValue,
    primitives::{
        U256,
        utils::format_units,
    },
};
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::{
    Value,
    json,
};
use std::{
    fmt,
    str::FromStr,
};

/// How unsigned integers are shown. Other value kinds are unaffected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Format {
    #[default]
    Raw,
    /// Fixed-point with the given number of decimals (`ether` is 18).
    Units(u8),
}

impl Format {
    pub const ETHER: Format = Format::Units(18);
    pub const GWEI: Format = Format::Units(9);
}

impl FromStr for Format {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "raw" => Ok(Format::Raw),
            "ether" | "bnb" => Ok(Format::ETHER),
            "gwei" => Ok(Format::GWEI),
            other => match other.strip_prefix("units:") {
                Some(decimals) => decimals
                    .parse::<u8>()
                    .ok()
                    .filter(|d| *d <= 77)
                    .map(Format::Units)
                    .ok_or_else(|| format!("invalid decimals in format '{other}'")),
                None => Err(format!(
                    "unknown format '{other}' (expected raw, ether, gwei or units:<n>)"
                )),
            },
        }
    }
}

impl TryFrom<String> for Format {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<Format> for String {
    fn from(format: Format) -> Self {
        format.to_string()
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Raw => write!(f, "raw"),
            Format::Units(18) => write!(f, "ether"),
            Format::Units(9) => write!(f, "gwei"),
            Format::Units(decimals) => write!(f, "units:{decimals}"),
        }
    }
}

pub fn render(value: &DynSolValue) -> String {
    render_with(value, Format::Raw)
}

pub fn render_with(value: &DynSolValue, format: Format) -> String {
    match value {
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::Uint(u, _) => render_uint(*u, format),
        DynSolValue::Int(i, _) => i.to_string(),
        DynSolValue::Address(address) => address.to_string(),
        DynSolValue::FixedBytes(word, size) => {
            format!("0x{}", hex::encode(&word[..*size]))
        }
        DynSolValue::Bytes(bytes) => format!("0x{}", hex::encode(bytes)),
        DynSolValue::String(s) => format!("{s:?}"),
        DynSolValue::Array(items)
        | DynSolValue::FixedArray(items) => {
            let inner: Vec<String> =
                items.iter().map(|item| render_with(item, format)).collect();
            format!("[{}]", inner.join(", "))
        }
        DynSolValue::Tuple(items) => {
            let inner: Vec<String> =
                items.iter().map(|item| render_with(item, format)).collect();
            format!("({})", inner.join(", "))
        }
        other => format!("{other:?}"),
    }
}

fn render_uint(value: U256, format: Format) -> String {
    match format {
        Format::Raw => value.to_string(),
        Format::Units(decimals) => {
            format_units(value, decimals).unwrap_or_else(|_| value.to_string())
        }
    }
}

/// JSON form for machine-readable reports. Integers are decimal strings so
/// 256-bit values survive.
pub fn to_json(value: &DynSolValue, format: Format) -> Value {
    match value {
        DynSolValue::Bool(b) => json!(b),
        DynSolValue::Array(items)
        | DynSolValue::FixedArray(items)
        | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(|item| to_json(item, format)).collect())
        }
        DynSolValue::String(s) => json!(s),
        other => json!(render_with(other, format)),
    }
}
