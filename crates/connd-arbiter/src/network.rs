//! Network identities, capability sets and the provider-facing state of a
//! network.

use std::fmt;
use std::net::IpAddr;

use bitflags::bitflags;
use serde::Serialize;
use strum::{Display, EnumIter, IntoEnumIterator};

/// Identifier of a network record.
///
/// Identifiers are allocated from 100 upwards and are never reused while
/// the daemon runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NetworkId(u32);

impl NetworkId {
    /// First identifier handed out.
    pub const FIRST: u32 = 100;

    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw identifier value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Link technology carrying a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Mobile data.
    Cellular,
    /// Wi-Fi.
    Wifi,
    /// Bluetooth tethering.
    Bluetooth,
    /// Wired ethernet.
    Ethernet,
    /// Virtual private network.
    Vpn,
    /// Synthetic networks used by tests.
    Test,
}

impl Transport {
    /// Tie-break rank; higher wins.
    pub(crate) const fn preference_rank(self) -> u8 {
        match self {
            Self::Ethernet => 4,
            Self::Wifi => 3,
            Self::Bluetooth => 2,
            Self::Cellular => 1,
            Self::Vpn | Self::Test => 0,
        }
    }

    const fn bit(self) -> u32 {
        1 << self as u32
    }

    /// Single-member set holding `self`.
    #[must_use]
    pub const fn flag(self) -> TransportSet {
        TransportSet::from_bits_retain(self.bit())
    }
}

/// Network capability bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    Mms,
    Supl,
    Dun,
    Fota,
    Ims,
    Cbs,
    WifiP2p,
    Ia,
    Rcs,
    Xcap,
    Eims,
    NotMetered,
    Internet,
    NotRestricted,
    Trusted,
    NotVpn,
    Validated,
    CaptivePortal,
}

impl Capability {
    /// Capabilities only found on operator-restricted networks.
    pub const RESTRICTED: [Self; 10] = [
        Self::Mms,
        Self::Supl,
        Self::Dun,
        Self::Fota,
        Self::Ims,
        Self::Cbs,
        Self::Ia,
        Self::Rcs,
        Self::Xcap,
        Self::Eims,
    ];

    /// Capabilities set by the engine from probe results. Requests may not
    /// ask for them.
    pub const MUTABLE: [Self; 2] = [Self::Validated, Self::CaptivePortal];

    const fn bit(self) -> u32 {
        1 << self as u32
    }

    /// Single-member set holding `self`.
    #[must_use]
    pub const fn flag(self) -> CapabilitySet {
        CapabilitySet::from_bits_retain(self.bit())
    }
}

bitflags! {
    /// Set of [`Transport`] values.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
    pub struct TransportSet: u32 {
        const CELLULAR = Transport::Cellular.bit();
        const WIFI = Transport::Wifi.bit();
        const BLUETOOTH = Transport::Bluetooth.bit();
        const ETHERNET = Transport::Ethernet.bit();
        const VPN = Transport::Vpn.bit();
        const TEST = Transport::Test.bit();
    }
}

bitflags! {
    /// Set of [`Capability`] values.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
    pub struct CapabilitySet: u32 {
        const MMS = Capability::Mms.bit();
        const SUPL = Capability::Supl.bit();
        const DUN = Capability::Dun.bit();
        const FOTA = Capability::Fota.bit();
        const IMS = Capability::Ims.bit();
        const CBS = Capability::Cbs.bit();
        const WIFI_P2P = Capability::WifiP2p.bit();
        const IA = Capability::Ia.bit();
        const RCS = Capability::Rcs.bit();
        const XCAP = Capability::Xcap.bit();
        const EIMS = Capability::Eims.bit();
        const NOT_METERED = Capability::NotMetered.bit();
        const INTERNET = Capability::Internet.bit();
        const NOT_RESTRICTED = Capability::NotRestricted.bit();
        const TRUSTED = Capability::Trusted.bit();
        const NOT_VPN = Capability::NotVpn.bit();
        const VALIDATED = Capability::Validated.bit();
        const CAPTIVE_PORTAL = Capability::CaptivePortal.bit();
    }
}

impl TransportSet {
    /// Members in declaration order.
    pub fn members(self) -> impl Iterator<Item = Transport> {
        Transport::iter().filter(move |transport| self.contains(transport.flag()))
    }
}

impl CapabilitySet {
    /// Members in declaration order.
    pub fn members(self) -> impl Iterator<Item = Capability> {
        Capability::iter().filter(move |capability| self.contains(capability.flag()))
    }
}

/// Capabilities of a network, or the capabilities a request asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetworkCapabilities {
    /// Transports; on a request an empty set accepts any transport.
    pub transports: TransportSet,
    /// Capability bits.
    pub capabilities: CapabilitySet,
    /// Interface specifier pinning a request to one network.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specifier: Option<String>,
}

impl NetworkCapabilities {
    /// Empty capabilities.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a transport.
    #[must_use]
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transports.insert(transport.flag());
        self
    }

    /// Adds a capability.
    #[must_use]
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability.flag());
        self
    }

    /// Pins to the network whose specifier equals `specifier`.
    #[must_use]
    pub fn with_specifier(mut self, specifier: impl Into<String>) -> Self {
        self.specifier = Some(specifier.into());
        self
    }

    /// Whether `self` carries `capability`.
    #[must_use]
    pub const fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(capability.flag())
    }

    /// Whether a network with capabilities `offered` satisfies `self`.
    #[must_use]
    pub fn satisfied_by(&self, offered: &Self) -> bool {
        if !offered.capabilities.contains(self.capabilities) {
            return false;
        }
        if !self.transports.is_empty() && !self.transports.intersects(offered.transports) {
            return false;
        }
        match &self.specifier {
            Some(pinned) => offered.specifier.as_ref() == Some(pinned),
            None => true,
        }
    }

    /// Whether a factory whose filter is `filter` could provide a network
    /// for `self`. Specifiers are left to the factory to judge.
    #[must_use]
    pub fn can_be_provided_by(&self, filter: &Self) -> bool {
        filter.capabilities.contains(self.capabilities)
            && (self.transports.is_empty() || self.transports.intersects(filter.transports))
    }

    /// Whether a requested capability set names a restricted-only
    /// capability.
    #[must_use]
    pub fn requests_restricted(&self) -> bool {
        Capability::RESTRICTED
            .iter()
            .any(|capability| self.has(*capability))
    }
}

/// Addressing of a network's interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkProperties {
    /// Kernel interface name.
    pub interface_name: Option<String>,
    /// Addresses assigned to the interface.
    pub addresses: Vec<IpAddr>,
    /// DNS servers for the network.
    pub dns_servers: Vec<IpAddr>,
}

impl LinkProperties {
    /// Link properties for interface `name` without addresses.
    #[must_use]
    pub fn for_interface(name: impl Into<String>) -> Self {
        Self {
            interface_name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// Link-layer state reported by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NetworkState {
    Connecting,
    Connected,
    Suspended,
    Disconnected,
    Failed,
}

/// Legacy identity of a network, used by the attributes table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInfo {
    /// Legacy network type number.
    pub legacy_type: i32,
    /// Human readable type, for broadcasts.
    pub type_name: String,
    /// Link-layer state.
    pub state: NetworkState,
    /// Provider supplied reason for the last state change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl NetworkInfo {
    /// Info in the `Connecting` state.
    #[must_use]
    pub fn connecting(legacy_type: i32, type_name: impl Into<String>) -> Self {
        Self {
            legacy_type,
            type_name: type_name.into(),
            state: NetworkState::Connecting,
            reason: None,
        }
    }
}

/// Registration flags that alter scoring and validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetworkMisc {
    /// The user chose this network explicitly.
    pub explicitly_selected: bool,
    /// The user accepted the network even if it never validates.
    pub accept_unvalidated: bool,
    /// No connectivity probe runs for this network.
    pub skip_validation: bool,
}

/// Arbitration lifecycle of a network record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Connecting,
    Validating,
    Connected,
    Lingering,
    Disconnected,
    Failed,
}

impl Lifecycle {
    /// Whether the network may be matched against requests.
    #[must_use]
    pub const fn is_eligible(self) -> bool {
        matches!(self, Self::Validating | Self::Connected | Self::Lingering)
    }
}

/// Outcome of a connectivity probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProbeResult {
    /// The network reaches the internet.
    Validated,
    /// The network is behind a captive portal.
    CaptivePortal,
    /// The probe failed.
    Invalid,
}
