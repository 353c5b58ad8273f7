//! Legacy policy: single-default mode, network preference and feature
//! users.

use std::net::{IpAddr, Ipv4Addr};

use rstest::{fixture, rstest};

use super::support::{DnsChange, Lab, RESTORE, owner};
use crate::legacy::{TYPE_MOBILE, TYPE_MOBILE_MMS, TYPE_WIFI};
use crate::{
    Capability, FeatureStatus, Lifecycle, LinkProperties, NetworkCapabilities, NetworkId,
    NetworkMisc, NetworkState, Transport,
};

#[fixture]
fn lab() -> Lab {
    Lab::default()
}

fn single_default(preference: Option<i32>) -> Lab {
    let mut settings = Lab::settings();
    settings.single_default_mode = true;
    settings.network_preference = preference;
    Lab::with_settings(settings)
}

fn mms_network(lab: &mut Lab) -> (crate::NetworkId, std::sync::Arc<super::support::TestAgent>) {
    let capabilities = NetworkCapabilities::new().with_capability(Capability::Mms);
    let (network, agent) =
        lab.register(Transport::Cellular, 50, capabilities, NetworkMisc::default());
    lab.set_state(network, NetworkState::Connected);
    (network, agent)
}

#[rstest]
fn higher_priority_network_replaces_the_default() {
    let mut lab = single_default(None);
    let (cell, cell_agent) = lab.connect(Transport::Cellular, 50, true);

    let (wifi, _) = lab.connect(Transport::Wifi, 10, false);

    assert_eq!(cell_agent.unwanted_count(), 1);
    assert_eq!(lab.arbiter.lifecycle(cell), None);
    assert_eq!(lab.active(), Some(wifi));
}

#[rstest]
fn lower_priority_network_is_torn_down() {
    let mut lab = single_default(None);
    let (wifi, _) = lab.connect(Transport::Wifi, 60, true);

    let (cell, cell_agent) = lab.connect(Transport::Cellular, 90, false);

    assert_eq!(cell_agent.unwanted_count(), 1);
    assert_eq!(lab.arbiter.lifecycle(cell), None);
    assert_eq!(lab.active(), Some(wifi));
}

#[rstest]
fn preferred_type_wins_over_priority() {
    let mut lab = single_default(Some(TYPE_MOBILE));
    let (wifi, wifi_agent) = lab.connect(Transport::Wifi, 60, true);

    let (cell, _) = lab.connect(Transport::Cellular, 50, false);

    assert_eq!(wifi_agent.unwanted_count(), 1);
    assert_eq!(lab.arbiter.lifecycle(wifi), None);
    assert_eq!(lab.active(), Some(cell));
}

#[rstest]
fn declined_teardown_keeps_the_previous_default() {
    let mut lab = single_default(None);
    let (cell, cell_agent) = lab.connect(Transport::Cellular, 50, true);
    cell_agent.decline_teardown();

    let (wifi, _) = lab.connect(Transport::Wifi, 10, false);

    assert!(cell_agent.unwanted_count() >= 1);
    assert!(lab.arbiter.lifecycle(cell).is_some());
    assert_eq!(lab.active(), Some(wifi));
}

#[rstest]
fn preference_reorders_the_default(mut lab: Lab) {
    let (cell, _) = lab.connect(Transport::Cellular, 50, true);
    let (wifi, _) = lab.connect(Transport::Wifi, 60, true);
    assert_eq!(lab.active(), Some(wifi));

    lab.arbiter.set_network_preference(TYPE_MOBILE, lab.now);

    assert_eq!(lab.active(), Some(cell));
    assert_eq!(lab.arbiter.lifecycle(cell), Some(Lifecycle::Connected));
    assert_eq!(lab.arbiter.lifecycle(wifi), Some(Lifecycle::Lingering));
    assert_eq!(lab.arbiter.snapshot().network_preference, Some(TYPE_MOBILE));
}

#[rstest]
fn preference_for_a_non_default_type_is_ignored(mut lab: Lab) {
    lab.arbiter.set_network_preference(TYPE_MOBILE_MMS, lab.now);

    assert_eq!(lab.arbiter.snapshot().network_preference, None);
}

#[rstest]
fn preferred_network_connecting_clears_the_way() {
    let mut lab = single_default(None);
    let (wifi, wifi_agent) = lab.connect(Transport::Wifi, 60, true);
    lab.register(
        Transport::Cellular,
        50,
        super::support::internet(),
        NetworkMisc::default(),
    );

    lab.arbiter.set_network_preference(TYPE_MOBILE, lab.now);

    assert_eq!(wifi_agent.unwanted_count(), 1);
    assert_eq!(lab.arbiter.lifecycle(wifi), None);
}

#[rstest]
fn feature_request_starts_then_reports_active(mut lab: Lab) {
    let status = lab
        .arbiter
        .start_using_network_feature(owner(), TYPE_MOBILE, "enableMMS", lab.now);
    assert_eq!(status, FeatureStatus::RequestStarted);

    let (network, _) = mms_network(&mut lab);
    let status = lab
        .arbiter
        .start_using_network_feature(owner(), TYPE_MOBILE, "enableMMS", lab.now);
    assert_eq!(status, FeatureStatus::AlreadyActive);
    assert_eq!(lab.arbiter.lifecycle(network), Some(Lifecycle::Validating));
}

#[rstest]
fn restore_timer_releases_the_feature(mut lab: Lab) {
    lab.arbiter
        .start_using_network_feature(owner(), TYPE_MOBILE, "enableMMS", lab.now);
    let (network, agent) = mms_network(&mut lab);

    lab.advance(RESTORE);

    assert_eq!(agent.unwanted_count(), 1);
    assert_eq!(lab.arbiter.lifecycle(network), None);
    assert!(!lab
        .arbiter
        .stop_using_network_feature(owner(), TYPE_MOBILE, "enableMMS", lab.now));
}

#[rstest]
fn repeating_a_feature_request_rearms_the_timer(mut lab: Lab) {
    lab.arbiter
        .start_using_network_feature(owner(), TYPE_MOBILE, "enableMMS", lab.now);
    let (network, agent) = mms_network(&mut lab);

    lab.advance(RESTORE / 2);
    lab.arbiter
        .start_using_network_feature(owner(), TYPE_MOBILE, "enableMMS", lab.now);
    lab.advance(RESTORE / 2);
    assert_eq!(agent.unwanted_count(), 0);

    lab.advance(RESTORE / 2);
    assert_eq!(lab.arbiter.lifecycle(network), None);
}

#[rstest]
fn stopping_a_feature_releases_it_once(mut lab: Lab) {
    lab.arbiter
        .start_using_network_feature(owner(), TYPE_MOBILE, "enableMMS", lab.now);
    let (network, _) = mms_network(&mut lab);

    assert!(lab
        .arbiter
        .stop_using_network_feature(owner(), TYPE_MOBILE, "enableMMS", lab.now));
    assert!(!lab
        .arbiter
        .stop_using_network_feature(owner(), TYPE_MOBILE, "enableMMS", lab.now));
    assert_eq!(lab.arbiter.lifecycle(network), None);
}

#[rstest]
#[case(TYPE_MOBILE, "enableTELEPORT", FeatureStatus::TypeNotAvailable)]
#[case(42, "enableMMS", FeatureStatus::RequestFailed)]
fn unusable_features_are_refused(
    mut lab: Lab,
    #[case] network_type: i32,
    #[case] feature: &str,
    #[case] expected: FeatureStatus,
) {
    let status = lab
        .arbiter
        .start_using_network_feature(owner(), network_type, feature, lab.now);

    assert_eq!(status, expected);
    assert_eq!(lab.arbiter.snapshot().requests.len(), 1);
}

#[rstest]
fn wifi_feature_asks_for_an_internet_network(mut lab: Lab) {
    let (wifi, _) = lab.connect(Transport::Wifi, 60, true);

    let status = lab
        .arbiter
        .start_using_network_feature(owner(), TYPE_WIFI, "enableHIPRI", lab.now);

    assert_eq!(status, FeatureStatus::AlreadyActive);
    assert_eq!(lab.active(), Some(wifi));
}

fn server(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(192, 0, 2, last))
}

fn set_name_servers(lab: &mut Lab, network: NetworkId, servers: &[IpAddr]) {
    let link_properties = LinkProperties {
        dns_servers: servers.to_vec(),
        ..LinkProperties::for_interface(format!("if{network}"))
    };
    lab.arbiter.update_link_properties(network, link_properties);
}

#[rstest]
fn default_name_servers_follow_the_default_network(mut lab: Lab) {
    let (cell, _) = lab.connect(Transport::Cellular, 50, true);
    set_name_servers(&mut lab, cell, &[server(1), IpAddr::V4(Ipv4Addr::UNSPECIFIED)]);

    let (wifi, _) = lab.connect(Transport::Wifi, 60, true);
    set_name_servers(&mut lab, wifi, &[server(2)]);

    assert_eq!(
        lab.dns.take(),
        vec![
            DnsChange::Default(vec![server(1)]),
            DnsChange::Default(Vec::new()),
            DnsChange::Default(vec![server(2)]),
        ]
    );
    assert_eq!(lab.arbiter.snapshot().default_dns, vec![server(2)]);
}

#[rstest]
fn feature_users_resolve_through_the_feature_network(mut lab: Lab) {
    let (wifi, _) = lab.connect(Transport::Wifi, 60, true);
    set_name_servers(&mut lab, wifi, &[server(53)]);
    let status = lab
        .arbiter
        .start_using_network_feature(owner(), TYPE_MOBILE, "enableMMS", lab.now);
    assert_eq!(status, FeatureStatus::RequestStarted);
    let (mms, _) = mms_network(&mut lab);

    set_name_servers(&mut lab, mms, &[server(7), server(8)]);

    assert_eq!(
        lab.dns.take(),
        vec![
            DnsChange::Default(vec![server(53)]),
            DnsChange::Pid(owner().pid, vec![server(7), server(8)]),
        ]
    );
    assert_eq!(
        lab.arbiter.snapshot().pid_dns.get(&owner().pid),
        Some(&vec![server(7), server(8)])
    );

    assert!(
        lab.arbiter
            .stop_using_network_feature(owner(), TYPE_MOBILE, "enableMMS", lab.now)
    );

    assert_eq!(lab.dns.take(), vec![DnsChange::Pid(owner().pid, Vec::new())]);
    assert!(lab.arbiter.snapshot().pid_dns.is_empty());
}

#[rstest]
fn unchanged_name_servers_are_not_republished(mut lab: Lab) {
    let status = lab
        .arbiter
        .start_using_network_feature(owner(), TYPE_MOBILE, "enableMMS", lab.now);
    assert_eq!(status, FeatureStatus::RequestStarted);
    let (mms, _) = mms_network(&mut lab);
    set_name_servers(&mut lab, mms, &[server(7)]);
    lab.dns.take();

    let status = lab
        .arbiter
        .start_using_network_feature(owner(), TYPE_MOBILE, "enableMMS", lab.now);
    assert_eq!(status, FeatureStatus::AlreadyActive);
    lab.arbiter.update_score(mms, 55, lab.now);

    assert!(lab.dns.take().is_empty());
}
