//! Request, listen and network lifecycles as seen through callbacks and
//! broadcasts.

use std::sync::Arc;
use std::time::Duration;

use mockall::mock;
use rstest::{fixture, rstest};

use super::support::{Lab, RecordingCallback, internet, lifecycle, owner};
use crate::{
    AgentRegistration, BroadcastKind, CallbackEvent, Capability, Lifecycle, LinkProperties,
    NetworkAgent, NetworkCapabilities, NetworkId, NetworkInfo, NetworkMisc, NetworkState,
    ProbeResult, ProviderId, RequestError, Transport,
};

mock! {
    pub Agent {}
    impl NetworkAgent for Agent {
        fn on_network_unwanted(&self, network: NetworkId) -> bool;
    }
}

#[fixture]
fn lab() -> Lab {
    Lab::default()
}

fn mms() -> NetworkCapabilities {
    NetworkCapabilities::new().with_capability(Capability::Mms)
}

#[rstest]
fn default_failover_reports_each_change_once(mut lab: Lab) {
    let (_, tracker) = lab.track_default();
    let (cell, _) = lab.connect(Transport::Cellular, 70, true);
    let (app, app_callback) = lab.request(internet());
    let (_, _wifi_keeper) = lab.request(internet().with_transport(Transport::Wifi));
    let (wifi, _) = lab.connect(Transport::Wifi, 60, true);
    assert_eq!(lab.active(), Some(cell));
    tracker.take();
    app_callback.take();
    lab.broadcasts.take();

    lab.set_state(cell, NetworkState::Disconnected);

    let expected = vec![
        CallbackEvent::Lost { network: cell },
        CallbackEvent::Available { network: wifi },
    ];
    assert_eq!(lifecycle(tracker.take()), expected);
    assert_eq!(lifecycle(app_callback.take()), expected);
    assert_eq!(lab.arbiter.network_for_request(app).ok(), Some(Some(wifi)));

    let broadcasts = lab.broadcasts.take();
    assert_eq!(broadcasts.len(), 1);
    assert_eq!(broadcasts[0].kind, BroadcastKind::Connected);
    assert_eq!(broadcasts[0].network.network, wifi);
    assert!(broadcasts[0].is_failover);
}

#[rstest]
fn losing_the_last_network_broadcasts_disconnected(mut lab: Lab) {
    let (wifi, _) = lab.connect(Transport::Wifi, 60, true);
    let (cell, cell_agent) = lab.register(
        Transport::Cellular,
        50,
        internet(),
        NetworkMisc::default(),
    );
    lab.broadcasts.take();

    lab.set_state(wifi, NetworkState::Disconnected);

    let broadcasts = lab.broadcasts.take();
    assert_eq!(broadcasts.len(), 1);
    let broadcast = &broadcasts[0];
    assert_eq!(broadcast.kind, BroadcastKind::Disconnected);
    assert_eq!(broadcast.network.network, wifi);
    assert_eq!(broadcast.network.state, NetworkState::Disconnected);
    assert_eq!(
        broadcast.other_network.as_ref().map(|other| other.network),
        Some(cell)
    );
    assert!(!broadcast.no_connectivity);
    assert_eq!(cell_agent.reconnect_count(), 1);
}

#[rstest]
fn failed_attempt_broadcasts_connection_failed(mut lab: Lab) {
    let (wifi, _) = lab.register(Transport::Wifi, 60, internet(), NetworkMisc::default());

    lab.set_state(wifi, NetworkState::Failed);

    assert_eq!(lab.arbiter.lifecycle(wifi), None);
    let broadcasts = lab.broadcasts.take();
    assert_eq!(broadcasts.len(), 1);
    assert_eq!(broadcasts[0].kind, BroadcastKind::ConnectionFailed);
    assert!(broadcasts[0].no_connectivity);
    assert!(broadcasts[0].other_network.is_none());
}

#[rstest]
fn request_without_network_times_out(mut lab: Lab) {
    let ethernet = internet().with_transport(Transport::Ethernet);
    let (request, callback) = lab.request_with_timeout(ethernet, Some(Duration::from_secs(5)));

    lab.advance(Duration::from_secs(4));
    assert!(callback.events().is_empty());

    lab.advance(Duration::from_secs(1));
    assert_eq!(callback.take(), vec![CallbackEvent::Unavailable]);
    assert!(matches!(
        lab.arbiter.network_for_request(request),
        Err(RequestError::UnknownRequest { .. })
    ));
}

#[rstest]
fn satisfied_request_does_not_time_out(mut lab: Lab) {
    let (request, callback) = lab.request_with_timeout(internet(), Some(Duration::from_secs(5)));
    let (cell, _) = lab.connect(Transport::Cellular, 50, true);

    lab.advance(Duration::from_secs(10));

    assert_eq!(
        lifecycle(callback.take()),
        vec![CallbackEvent::Available { network: cell }]
    );
    assert_eq!(lab.arbiter.network_for_request(request).ok(), Some(Some(cell)));
}

#[rstest]
fn released_request_gets_no_more_callbacks(mut lab: Lab) {
    let (cell, _) = lab.connect(Transport::Cellular, 50, true);
    let (request, callback) = lab.request(internet());
    assert_eq!(callback.take(), vec![CallbackEvent::Available { network: cell }]);

    assert!(lab.arbiter.release_request(request, lab.now));
    assert!(!lab.arbiter.release_request(request, lab.now));
    lab.set_state(cell, NetworkState::Disconnected);

    assert!(callback.take().is_empty());
}

#[rstest]
fn default_request_cannot_be_released(mut lab: Lab) {
    assert!(!lab.arbiter.release_request(crate::RequestId::DEFAULT, lab.now));
    assert_eq!(lab.arbiter.network_for_request(crate::RequestId::DEFAULT).ok(), Some(None));
}

#[rstest]
fn mms_network_serves_only_its_request(mut lab: Lab) {
    lab.connect(Transport::Cellular, 50, true);
    let (request, callback) = lab.request(mms());
    assert!(callback.events().is_empty());

    let (network, agent) = lab.register(Transport::Cellular, 50, mms(), NetworkMisc::default());
    lab.set_state(network, NetworkState::Connected);

    assert_eq!(
        lifecycle(callback.take()),
        vec![CallbackEvent::Available { network }]
    );
    assert_ne!(lab.active(), Some(network));

    lab.arbiter.release_request(request, lab.now);
    assert_eq!(agent.unwanted_count(), 1);
    assert_eq!(lab.arbiter.lifecycle(network), None);
}

#[rstest]
fn restricted_network_does_not_serve_default(mut lab: Lab) {
    let capabilities = NetworkCapabilities::new()
        .with_capability(Capability::Internet)
        .with_capability(Capability::Mms);
    let (network, agent) =
        lab.register(Transport::Cellular, 90, capabilities, NetworkMisc::default());
    lab.set_state(network, NetworkState::Connected);

    assert_eq!(lab.active(), None);
    assert_eq!(agent.unwanted_count(), 1);
}

#[rstest]
fn mutable_capabilities_are_rejected(mut lab: Lab) {
    let callback = Arc::new(RecordingCallback::default());
    let request = lab.arbiter.ids().next_request();
    let result = lab.arbiter.request_network(
        request,
        internet().with_capability(Capability::Validated),
        callback,
        owner(),
        None,
        lab.now,
    );

    assert!(matches!(
        result,
        Err(RequestError::MutableCapability {
            capability: Capability::Validated
        })
    ));
    assert!(lab.arbiter.network_for_request(request).is_err());
}

#[rstest]
fn owner_death_releases_its_requests(mut lab: Lab) {
    lab.connect(Transport::Cellular, 50, true);
    let (request, _) = lab.request(mms());
    let (network, agent) = lab.register(Transport::Cellular, 50, mms(), NetworkMisc::default());
    lab.set_state(network, NetworkState::Connected);

    lab.arbiter.owner_died(owner(), lab.now);

    assert!(lab.arbiter.network_for_request(request).is_err());
    assert_eq!(agent.unwanted_count(), 1);
}

#[rstest]
fn provider_death_disconnects_its_networks(mut lab: Lab) {
    let (_, tracker) = lab.track_default();
    let (wifi, _) = lab.connect(Transport::Wifi, 60, true);
    lab.broadcasts.take();

    lab.arbiter.provider_died(ProviderId(wifi.get()), lab.now);

    assert_eq!(lab.arbiter.lifecycle(wifi), None);
    assert_eq!(lab.active(), None);
    assert_eq!(
        lifecycle(tracker.take()),
        vec![
            CallbackEvent::Available { network: wifi },
            CallbackEvent::Lost { network: wifi },
        ]
    );
    let broadcasts = lab.broadcasts.take();
    assert_eq!(broadcasts.len(), 1);
    assert!(broadcasts[0].no_connectivity);
}

#[rstest]
fn captive_portal_and_validated_listens(mut lab: Lab) {
    let (_, portal) = lab.listen(NetworkCapabilities::new().with_capability(Capability::CaptivePortal));
    let (_, validated) = lab.listen(NetworkCapabilities::new().with_capability(Capability::Validated));
    let (wifi, _) = lab.connect(Transport::Wifi, 60, false);

    lab.probe_result(wifi, ProbeResult::CaptivePortal);
    assert_eq!(
        lifecycle(portal.take()),
        vec![CallbackEvent::Available { network: wifi }]
    );
    assert!(lifecycle(validated.take()).is_empty());

    lab.probe_result(wifi, ProbeResult::Validated);
    assert_eq!(
        lifecycle(portal.take()),
        vec![CallbackEvent::Lost { network: wifi }]
    );
    assert_eq!(
        lifecycle(validated.take()),
        vec![CallbackEvent::Available { network: wifi }]
    );

    lab.arbiter
        .report_network_connectivity(wifi, false)
        .expect("wifi is registered");
    lab.probe_result(wifi, ProbeResult::Invalid);
    assert_eq!(
        lifecycle(validated.take()),
        vec![CallbackEvent::Lost { network: wifi }]
    );
}

#[rstest]
fn capability_and_link_changes_reach_paired_requests(mut lab: Lab) {
    let (_, tracker) = lab.track_default();
    let (cell, _) = lab.connect(Transport::Cellular, 50, false);
    tracker.take();

    lab.probe_result(cell, ProbeResult::Validated);
    let renamed = LinkProperties::for_interface("rmnet1");
    lab.arbiter.update_link_properties(cell, renamed.clone());

    let events = tracker.take();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[0],
        CallbackEvent::CapabilitiesChanged { network, capabilities }
            if *network == cell && capabilities.has(Capability::Validated)
    ));
    assert_eq!(
        events[1],
        CallbackEvent::LinkPropertiesChanged {
            network: cell,
            link_properties: renamed,
        }
    );
}

#[rstest]
fn provider_cannot_set_probe_owned_capabilities(mut lab: Lab) {
    let (cell, _) = lab.connect(Transport::Cellular, 50, false);

    lab.arbiter.update_capabilities(
        cell,
        internet()
            .with_transport(Transport::Cellular)
            .with_capability(Capability::Validated),
        lab.now,
    );

    let snapshot = lab.arbiter.snapshot();
    let network = snapshot.network(cell).expect("cell is registered");
    assert!(!network.capabilities.has(Capability::Validated));
}

#[rstest]
fn suspension_keeps_the_network_in_place(mut lab: Lab) {
    let (_, tracker) = lab.track_default();
    let (cell, _) = lab.connect(Transport::Cellular, 50, true);
    tracker.take();

    lab.set_state(cell, NetworkState::Suspended);
    let snapshot = lab.arbiter.snapshot();
    assert!(snapshot.network(cell).is_some_and(|network| network.suspended));
    assert_eq!(lab.active(), Some(cell));

    lab.set_state(cell, NetworkState::Connected);
    let snapshot = lab.arbiter.snapshot();
    assert!(snapshot.network(cell).is_some_and(|network| !network.suspended));
    assert!(tracker.take().is_empty());
}

#[rstest]
fn declined_reap_leaves_the_network_registered(mut lab: Lab) {
    lab.connect(Transport::Wifi, 60, true);
    let mut agent = MockAgent::new();
    agent.expect_on_network_unwanted().times(1).return_const(false);
    let network = lab.arbiter.ids().next_network();
    lab.arbiter.register_agent(
        network,
        AgentRegistration {
            provider: ProviderId(7),
            agent: Arc::new(agent),
            info: NetworkInfo::connecting(0, "mobile"),
            capabilities: internet().with_transport(Transport::Cellular),
            link_properties: LinkProperties::for_interface("rmnet0"),
            score: 50,
            misc: NetworkMisc::default(),
        },
        lab.now,
    );

    lab.set_state(network, NetworkState::Connected);

    assert_eq!(lab.arbiter.lifecycle(network), Some(Lifecycle::Validating));
}

#[rstest]
fn broadcast_before_system_ready_is_resent(mut lab: Lab) {
    let (cell, _) = lab.connect(Transport::Cellular, 50, true);
    let early = lab.broadcasts.take();
    assert_eq!(early.len(), 1);

    lab.arbiter.system_ready();
    let resent = lab.broadcasts.take();
    assert_eq!(resent, early);
    assert_eq!(resent[0].network.network, cell);

    lab.arbiter.system_ready();
    assert!(lab.broadcasts.take().is_empty());
}

#[rstest]
fn snapshot_serialises_to_json(mut lab: Lab) {
    let (cell, _) = lab.connect(Transport::Cellular, 50, true);
    lab.track_default();

    let value = serde_json::to_value(lab.arbiter.snapshot()).expect("snapshot serialises");

    assert_eq!(value["active_network"], serde_json::json!(cell.get()));
    assert_eq!(value["networks"].as_array().map(Vec::len), Some(1));
    assert_eq!(value["requests"].as_array().map(Vec::len), Some(2));
}
