//! Service registry.

use rstest::rstest;

use connd_config::Config;

use super::support::{ProviderCall, RecordingServiceProvider};
use crate::{ManagedServices, ServiceKind};

fn registry() -> (ManagedServices<RecordingServiceProvider>, RecordingServiceProvider) {
    let provider = RecordingServiceProvider::default();
    (ManagedServices::new(Config::default(), provider.clone()), provider)
}

#[rstest]
#[case("connector", ServiceKind::Connector)]
#[case(" Arbiter", ServiceKind::Arbiter)]
#[case("DISCOVERY", ServiceKind::Discovery)]
fn kinds_parse_case_insensitively(#[case] text: &str, #[case] expected: ServiceKind) {
    assert_eq!(text.trim().parse::<ServiceKind>().expect("known kind"), expected);
    assert_eq!(expected.to_string(), text.trim().to_ascii_lowercase());
}

#[test]
fn unknown_kinds_are_rejected() {
    assert!("resolver".parse::<ServiceKind>().is_err());
}

#[test]
fn starting_is_idempotent() {
    let (mut services, provider) = registry();

    services.ensure_started(ServiceKind::Arbiter).expect("start");
    services.ensure_started(ServiceKind::Arbiter).expect("again");

    assert_eq!(provider.starts(), vec![ServiceKind::Arbiter]);
    assert!(services.is_started(ServiceKind::Arbiter));
}

#[test]
fn a_failed_dependency_blocks_the_dependent() {
    let (mut services, provider) = registry();
    provider.fail_on(ServiceKind::Connector, "socket missing");

    let error = services
        .ensure_started(ServiceKind::Discovery)
        .expect_err("connector fails");

    assert_eq!(error.kind, ServiceKind::Connector);
    assert_eq!(error.message(), "socket missing");
    assert_eq!(provider.calls(), vec![ProviderCall::Start(ServiceKind::Connector)]);
    assert!(services.started().is_empty());
}

#[test]
fn stopping_empties_the_registry() {
    let (mut services, provider) = registry();
    for kind in ServiceKind::ALL {
        services.ensure_started(kind).expect("start");
    }

    assert_eq!(services.stop_all().len(), 3);
    assert!(services.stop_all().is_empty());
    assert_eq!(provider.stops().len(), 3);
}
