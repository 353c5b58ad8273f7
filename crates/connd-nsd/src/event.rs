//! Unsolicited resolver daemon lines decoded into typed events.

use std::str::FromStr;

use connd_native::DaemonEvent;
use thiserror::Error;

use crate::client::TransactionId;
use crate::info::NetId;

/// Daemon response codes for asynchronous mDNS results.
pub mod code {
    pub const DISCOVERY_FAILED: u16 = 602;
    pub const SERVICE_FOUND: u16 = 603;
    pub const SERVICE_LOST: u16 = 604;
    pub const REGISTRATION_FAILED: u16 = 605;
    pub const SERVICE_REGISTERED: u16 = 606;
    pub const RESOLUTION_FAILED: u16 = 607;
    pub const SERVICE_RESOLVED: u16 = 608;
    pub const SERVICE_UPDATED: u16 = 609;
    pub const SERVICE_UPDATE_FAILED: u16 = 610;
    pub const GET_ADDR_FAILED: u16 = 611;
    pub const GET_ADDR_SUCCESS: u16 = 612;
}

/// A service reported by a found or lost event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundService {
    pub name: String,
    pub service_type: String,
    pub domain: String,
    pub interface_index: u32,
    pub net_id: NetId,
}

/// First half of a resolution: everything but the address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedService {
    /// Escaped `<instance>.<type>.local.` name.
    pub full_name: String,
    pub hostname: String,
    pub port: u16,
    pub txt_record: Vec<u8>,
    pub interface_index: u32,
}

/// Second half of a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressInfo {
    pub hostname: String,
    pub ttl: u32,
    pub address: String,
    pub interface_index: u32,
    pub net_id: NetId,
}

/// What happened to a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MdnsEventKind {
    DiscoveryFailed,
    ServiceFound(FoundService),
    ServiceLost(FoundService),
    RegistrationFailed,
    ServiceRegistered { name: String },
    ResolutionFailed,
    ServiceResolved(ResolvedService),
    ServiceUpdated,
    ServiceUpdateFailed,
    GetAddrFailed,
    GetAddrSucceeded(AddressInfo),
}

/// An asynchronous result for one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdnsEvent {
    pub transaction: TransactionId,
    pub kind: MdnsEventKind,
}

impl MdnsEvent {
    /// Builds an event directly, as backends other than the daemon do.
    #[must_use]
    pub const fn new(transaction: TransactionId, kind: MdnsEventKind) -> Self {
        Self { transaction, kind }
    }

    /// Decodes an unsolicited daemon line.
    ///
    /// # Errors
    ///
    /// Returns [`MdnsEventError::UnknownCode`] for codes outside the mDNS
    /// range and the other variants for malformed payloads.
    pub fn from_daemon(event: &DaemonEvent) -> Result<Self, MdnsEventError> {
        let code = event.code();
        if !(code::DISCOVERY_FAILED..=code::GET_ADDR_SUCCESS).contains(&code) {
            return Err(MdnsEventError::UnknownCode { code });
        }
        let cooked = event.cooked();
        let mut fields = Fields {
            code,
            words: cooked.iter().skip(1),
        };
        let transaction = TransactionId(fields.number("id")?);
        let kind = match code {
            code::DISCOVERY_FAILED => MdnsEventKind::DiscoveryFailed,
            code::SERVICE_FOUND => MdnsEventKind::ServiceFound(fields.found_service()?),
            code::SERVICE_LOST => MdnsEventKind::ServiceLost(fields.found_service()?),
            code::REGISTRATION_FAILED => MdnsEventKind::RegistrationFailed,
            code::SERVICE_REGISTERED => MdnsEventKind::ServiceRegistered {
                name: fields.text("name")?,
            },
            code::RESOLUTION_FAILED => MdnsEventKind::ResolutionFailed,
            code::SERVICE_RESOLVED => MdnsEventKind::ServiceResolved(fields.resolved_service()?),
            code::SERVICE_UPDATED => MdnsEventKind::ServiceUpdated,
            code::SERVICE_UPDATE_FAILED => MdnsEventKind::ServiceUpdateFailed,
            code::GET_ADDR_FAILED => MdnsEventKind::GetAddrFailed,
            code::GET_ADDR_SUCCESS => MdnsEventKind::GetAddrSucceeded(fields.address_info()?),
            other => return Err(MdnsEventError::UnknownCode { code: other }),
        };
        Ok(Self { transaction, kind })
    }
}

/// Reasons a daemon line could not be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MdnsEventError {
    /// The code is not an mDNS event.
    #[error("event code {code} is not an mDNS result")]
    UnknownCode {
        /// Code received.
        code: u16,
    },
    /// A required field is absent.
    #[error("event {code} is missing its {field}")]
    Missing {
        /// Event code.
        code: u16,
        /// Field name.
        field: &'static str,
    },
    /// A field could not be parsed.
    #[error("event {code} has an invalid {field}: '{value}'")]
    Invalid {
        /// Event code.
        code: u16,
        /// Field name.
        field: &'static str,
        /// Raw text.
        value: String,
    },
}

struct Fields<'a, I: Iterator<Item = &'a String>> {
    code: u16,
    words: I,
}

impl<'a, I: Iterator<Item = &'a String>> Fields<'a, I> {
    fn text(&mut self, field: &'static str) -> Result<String, MdnsEventError> {
        self.words.next().cloned().ok_or(MdnsEventError::Missing {
            code: self.code,
            field,
        })
    }

    fn number<T: FromStr>(&mut self, field: &'static str) -> Result<T, MdnsEventError> {
        let value = self.text(field)?;
        self.parse(field, value)
    }

    fn optional_number<T: FromStr + Default>(
        &mut self,
        field: &'static str,
    ) -> Result<T, MdnsEventError> {
        match self.words.next() {
            Some(value) => self.parse(field, value.clone()),
            None => Ok(T::default()),
        }
    }

    fn parse<T: FromStr>(&self, field: &'static str, value: String) -> Result<T, MdnsEventError> {
        value.parse().map_err(|_| MdnsEventError::Invalid {
            code: self.code,
            field,
            value,
        })
    }

    fn found_service(&mut self) -> Result<FoundService, MdnsEventError> {
        Ok(FoundService {
            name: self.text("name")?,
            service_type: self.text("type")?,
            domain: self.text("domain")?,
            interface_index: self.optional_number("interface index")?,
            net_id: NetId(self.optional_number("net id")?),
        })
    }

    fn resolved_service(&mut self) -> Result<ResolvedService, MdnsEventError> {
        let full_name = self.text("full name")?;
        let hostname = self.text("hostname")?;
        let port = self.number("port")?;
        let txt_len: usize = self.optional_number("txt length")?;
        let txt_record = if txt_len == 0 {
            let _hex = self.words.next();
            Vec::new()
        } else {
            let text = self.text("txt record")?;
            hex::decode(&text).map_err(|_| MdnsEventError::Invalid {
                code: self.code,
                field: "txt record",
                value: text,
            })?
        };
        Ok(ResolvedService {
            full_name,
            hostname,
            port,
            txt_record,
            interface_index: self.optional_number("interface index")?,
        })
    }

    fn address_info(&mut self) -> Result<AddressInfo, MdnsEventError> {
        Ok(AddressInfo {
            hostname: self.text("hostname")?,
            ttl: self.number("ttl")?,
            address: self.text("address")?,
            interface_index: self.optional_number("interface index")?,
            net_id: NetId(self.optional_number("net id")?),
        })
    }
}
