//! Legacy network attribute table.
//!
//! Each entry reads `name,type,radio,priority`. A network type is
//! default-capable when it is its own radio; higher priorities win failover.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One row of the legacy attribute table.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct NetworkAttributes {
    /// Lower-case type name, for example `wifi` or `mobile_mms`.
    pub name: String,
    /// Legacy network type number.
    pub network_type: i32,
    /// Legacy type of the radio carrying this network.
    pub radio: i32,
    /// Failover priority; larger values are preferred.
    pub priority: i32,
}

impl NetworkAttributes {
    /// Builds a row, normalising the name to lower case.
    #[must_use]
    pub fn new(name: impl Into<String>, network_type: i32, radio: i32, priority: i32) -> Self {
        Self {
            name: name.into().trim().to_lowercase(),
            network_type,
            radio,
            priority,
        }
    }

    /// Whether the type can act as the default network.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.network_type == self.radio
    }
}

impl fmt::Display for NetworkAttributes {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{},{},{},{}",
            self.name, self.network_type, self.radio, self.priority
        )
    }
}

/// Errors produced when parsing [`NetworkAttributes`] rows.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetworkAttributesParseError {
    /// The row did not carry exactly four comma-separated fields.
    #[error("attribute row '{0}' must have the form name,type,radio,priority")]
    FieldCount(String),
    /// The name was empty.
    #[error("attribute row '{0}' has an empty name")]
    EmptyName(String),
    /// A numeric field failed to parse.
    #[error("attribute row '{row}' has a non-numeric {field}")]
    InvalidNumber {
        /// The offending row.
        row: String,
        /// Which field failed.
        field: &'static str,
    },
}

impl FromStr for NetworkAttributes {
    type Err = NetworkAttributesParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = input.split(',').map(str::trim).collect();
        let [name, network_type, radio, priority] = fields.as_slice() else {
            return Err(NetworkAttributesParseError::FieldCount(input.to_string()));
        };
        if name.is_empty() {
            return Err(NetworkAttributesParseError::EmptyName(input.to_string()));
        }
        let number = |value: &str, field: &'static str| {
            value
                .parse::<i32>()
                .map_err(|_| NetworkAttributesParseError::InvalidNumber {
                    row: input.to_string(),
                    field,
                })
        };
        Ok(Self::new(
            *name,
            number(network_type, "type")?,
            number(radio, "radio")?,
            number(priority, "priority")?,
        ))
    }
}

/// Built-in table used when no rows are configured.
#[must_use]
pub fn default_network_attributes() -> Vec<NetworkAttributes> {
    [
        "mobile,0,0,0",
        "wifi,1,1,1",
        "mobile_mms,2,0,2",
        "mobile_supl,3,0,2",
        "mobile_dun,4,0,2",
        "mobile_hipri,5,0,3",
        "bluetooth,7,7,0",
        "ethernet,9,9,2",
    ]
    .iter()
    .filter_map(|row| row.parse().ok())
    .collect()
}
