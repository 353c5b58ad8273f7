use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use serde::Serialize;

/// Network identifier reported alongside discovered services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NetId(pub u32);

impl NetId {
    /// No network was reported.
    pub const UNSET: Self = Self(0);
    /// Local-only interfaces that applications cannot bind to.
    pub const LOCAL: Self = Self(99);
}

impl fmt::Display for NetId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "net{}", self.0)
    }
}

/// A service as seen by discovery clients.
///
/// Requests fill in the name, type and, for registrations, the port and
/// TXT record. Found, lost and resolved callbacks carry whatever the
/// backend learned about the instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceInfo {
    /// Instance name, unescaped.
    pub name: String,
    /// Service type such as `_ipp._tcp`.
    pub service_type: String,
    /// Port the service listens on.
    pub port: u16,
    /// TXT record in wire format.
    pub txt_record: Vec<u8>,
    /// Resolved host address.
    pub host: Option<IpAddr>,
    /// Network the service was seen on.
    pub network: Option<NetId>,
    /// Interface index kept for services on local-only networks.
    pub interface_index: Option<u32>,
}

impl ServiceInfo {
    /// Describes a service by name and type.
    #[must_use]
    pub fn new(name: impl Into<String>, service_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service_type: service_type.into(),
            ..Self::default()
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Replaces the TXT record with `attributes` encoded in wire format.
    #[must_use]
    pub fn with_attributes(mut self, attributes: &BTreeMap<String, Vec<u8>>) -> Self {
        self.txt_record = encode_txt(attributes);
        self
    }

    /// Pins discovery or resolution to `network`.
    #[must_use]
    pub const fn on_network(mut self, network: NetId) -> Self {
        self.network = Some(network);
        self
    }

    /// Decodes the TXT record into key/value attributes.
    ///
    /// Entries without `=` map to an empty value; empty or truncated
    /// entries are skipped.
    #[must_use]
    pub fn attributes(&self) -> BTreeMap<String, Vec<u8>> {
        let mut attributes = BTreeMap::new();
        let mut rest = self.txt_record.as_slice();
        while let Some((&len, tail)) = rest.split_first() {
            let Some((entry, next)) = tail.split_at_checked(usize::from(len)) else {
                break;
            };
            rest = next;
            let (key, value) = match entry.iter().position(|&byte| byte == b'=') {
                Some(split) => {
                    let (key, value) = entry.split_at(split);
                    (key, value.get(1..).unwrap_or_default())
                }
                None => (entry, &[][..]),
            };
            if !key.is_empty() {
                attributes.insert(String::from_utf8_lossy(key).into_owned(), value.to_vec());
            }
        }
        attributes
    }

    /// Tags the service with the network it was seen on.
    ///
    /// An unset network id leaves the service unattributed. Local-only
    /// networks are hidden and the interface index is kept instead so a
    /// follow-up resolve targets the same interface.
    pub fn attribute_network(&mut self, net_id: NetId, interface_index: u32) {
        match net_id {
            NetId::UNSET => self.network = None,
            NetId::LOCAL => {
                self.network = None;
                self.interface_index = Some(interface_index);
            }
            other => self.network = Some(other),
        }
    }
}

/// Encodes attributes as length-prefixed `key=value` strings. Entries that
/// do not fit in 255 bytes are dropped.
#[must_use]
pub fn encode_txt(attributes: &BTreeMap<String, Vec<u8>>) -> Vec<u8> {
    let mut record = Vec::new();
    for (key, value) in attributes {
        let mut entry = Vec::with_capacity(key.len() + value.len() + 1);
        entry.extend_from_slice(key.as_bytes());
        entry.push(b'=');
        entry.extend_from_slice(value);
        if let Ok(len) = u8::try_from(entry.len()) {
            record.push(len);
            record.append(&mut entry);
        }
    }
    record
}
