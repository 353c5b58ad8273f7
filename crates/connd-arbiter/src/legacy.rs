//! Legacy network types: the attributes table, feature names and the
//! statuses returned to feature users.

use connd_config::NetworkAttributes;
use serde::Serialize;
use strum::Display;

use crate::network::{Capability, NetworkCapabilities, Transport};

pub const TYPE_MOBILE: i32 = 0;
pub const TYPE_WIFI: i32 = 1;
pub const TYPE_MOBILE_MMS: i32 = 2;
pub const TYPE_MOBILE_SUPL: i32 = 3;
pub const TYPE_MOBILE_DUN: i32 = 4;
pub const TYPE_MOBILE_HIPRI: i32 = 5;
pub const TYPE_BLUETOOTH: i32 = 7;
pub const TYPE_ETHERNET: i32 = 9;
pub const TYPE_MOBILE_FOTA: i32 = 10;
pub const TYPE_MOBILE_IMS: i32 = 11;
pub const TYPE_MOBILE_CBS: i32 = 12;

/// Result of `start_using_network_feature`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
    /// A network already serves the feature.
    AlreadyActive,
    /// The feature request is filed and waits for a network.
    RequestStarted,
    /// The feature is not known for this network type.
    TypeNotAvailable,
    /// The network type is not configured.
    RequestFailed,
}

/// Read-only view of the configured attributes table.
#[derive(Debug, Clone, Default)]
pub struct LegacyTable {
    attributes: Vec<NetworkAttributes>,
}

impl LegacyTable {
    /// Wraps the configured rows. Later rows for the same type win.
    #[must_use]
    pub fn new(attributes: Vec<NetworkAttributes>) -> Self {
        Self { attributes }
    }

    /// Row for `network_type`.
    #[must_use]
    pub fn get(&self, network_type: i32) -> Option<&NetworkAttributes> {
        self.attributes
            .iter()
            .rev()
            .find(|row| row.network_type == network_type)
    }

    /// Row whose name matches `name`, ignoring case.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&NetworkAttributes> {
        let name = name.trim();
        self.attributes
            .iter()
            .rev()
            .find(|row| row.name.eq_ignore_ascii_case(name))
    }

    /// Whether `network_type` may carry default traffic.
    #[must_use]
    pub fn is_default(&self, network_type: i32) -> bool {
        self.get(network_type).is_some_and(NetworkAttributes::is_default)
    }

    /// Priority of `network_type`; unknown types rank lowest.
    #[must_use]
    pub fn priority(&self, network_type: i32) -> i32 {
        self.get(network_type).map_or(i32::MIN, |row| row.priority)
    }

    /// Capabilities and legacy type of a keep-alive request for `feature`
    /// on `network_type`.
    ///
    /// # Errors
    ///
    /// Returns the status to report when the request cannot be built.
    pub fn feature_request(
        &self,
        network_type: i32,
        feature: &str,
    ) -> Result<(NetworkCapabilities, i32), FeatureStatus> {
        let row = self.get(network_type).ok_or(FeatureStatus::RequestFailed)?;
        let transport = transport_for_radio(row.radio).ok_or(FeatureStatus::RequestFailed)?;
        let base = NetworkCapabilities::new().with_transport(transport);
        if network_type != TYPE_MOBILE {
            return Ok((base.with_capability(Capability::Internet), network_type));
        }
        let (capability, legacy_type) = match feature {
            "enableMMS" => (Capability::Mms, TYPE_MOBILE_MMS),
            "enableSUPL" => (Capability::Supl, TYPE_MOBILE_SUPL),
            "enableDUN" | "enableDUNAlways" => (Capability::Dun, TYPE_MOBILE_DUN),
            "enableHIPRI" => (Capability::Internet, TYPE_MOBILE_HIPRI),
            "enableFOTA" => (Capability::Fota, TYPE_MOBILE_FOTA),
            "enableIMS" => (Capability::Ims, TYPE_MOBILE_IMS),
            "enableCBS" => (Capability::Cbs, TYPE_MOBILE_CBS),
            _ => return Err(FeatureStatus::TypeNotAvailable),
        };
        Ok((base.with_capability(capability), legacy_type))
    }
}

/// Transport carrying a legacy radio kind.
#[must_use]
pub const fn transport_for_radio(radio: i32) -> Option<Transport> {
    match radio {
        TYPE_MOBILE => Some(Transport::Cellular),
        TYPE_WIFI => Some(Transport::Wifi),
        TYPE_BLUETOOTH => Some(Transport::Bluetooth),
        TYPE_ETHERNET => Some(Transport::Ethernet),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use connd_config::default_network_attributes;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::network::TransportSet;

    #[fixture]
    fn table() -> LegacyTable {
        LegacyTable::new(default_network_attributes())
    }

    #[rstest]
    #[case::mobile(TYPE_MOBILE, true)]
    #[case::wifi(TYPE_WIFI, true)]
    #[case::mms(TYPE_MOBILE_MMS, false)]
    #[case::unknown(42, false)]
    fn default_capability_follows_radio(table: LegacyTable, #[case] network_type: i32, #[case] expected: bool) {
        assert_eq!(table.is_default(network_type), expected);
    }

    #[rstest]
    fn unknown_types_rank_lowest(table: LegacyTable) {
        assert_eq!(table.priority(42), i32::MIN);
        assert!(table.priority(TYPE_WIFI) > table.priority(TYPE_MOBILE));
    }

    #[rstest]
    #[case("enableMMS", Capability::Mms, TYPE_MOBILE_MMS)]
    #[case("enableDUNAlways", Capability::Dun, TYPE_MOBILE_DUN)]
    #[case("enableHIPRI", Capability::Internet, TYPE_MOBILE_HIPRI)]
    fn mobile_features_map_to_capabilities(
        table: LegacyTable,
        #[case] feature: &str,
        #[case] capability: Capability,
        #[case] legacy_type: i32,
    ) {
        let (capabilities, mapped) = table
            .feature_request(TYPE_MOBILE, feature)
            .expect("feature should be known");
        assert!(capabilities.has(capability));
        assert!(capabilities.transports.contains(TransportSet::CELLULAR));
        assert_eq!(mapped, legacy_type);
    }

    #[rstest]
    fn unknown_features_and_types_are_refused(table: LegacyTable) {
        assert_eq!(
            table.feature_request(TYPE_MOBILE, "enableTelepathy"),
            Err(FeatureStatus::TypeNotAvailable)
        );
        assert_eq!(
            table.feature_request(42, "enableMMS"),
            Err(FeatureStatus::RequestFailed)
        );
    }

    #[rstest]
    fn lookup_by_name_ignores_case(table: LegacyTable) {
        let row = table.by_name(" WiFi ").expect("wifi row");
        assert_eq!(row.network_type, TYPE_WIFI);
    }
}
