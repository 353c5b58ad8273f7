//! Bootstrap and run loop.

use std::sync::Arc;

use rstest::{fixture, rstest};

use connd_config::{Config, LogFormat};

use super::support::{
    FailingConfigLoader, FailingSignal, HealthEvent, ImmediateSignal, ProviderCall,
    RecordingHealthReporter, RecordingServiceProvider, TestConfigLoader,
};
use crate::telemetry::{self, TelemetryError};
use crate::{BootstrapError, GuardError, LaunchError, ServiceKind, bootstrap_with, run_daemon};

struct Harness {
    loader: TestConfigLoader,
    reporter: Arc<RecordingHealthReporter>,
    provider: RecordingServiceProvider,
}

#[fixture]
fn harness() -> Harness {
    Harness {
        loader: TestConfigLoader::new(),
        reporter: Arc::new(RecordingHealthReporter::default()),
        provider: RecordingServiceProvider::default(),
    }
}

#[rstest]
fn bootstrap_takes_the_lock_without_starting_services(harness: Harness) {
    let daemon = bootstrap_with(
        &harness.loader,
        harness.reporter.clone(),
        harness.provider.clone(),
    )
    .expect("bootstrap should succeed");

    let paths = harness.loader.paths();
    assert!(paths.lock_path().exists());
    let recorded = std::fs::read_to_string(paths.pid_path()).expect("pid file");
    assert_eq!(recorded.trim(), std::process::id().to_string());
    assert_eq!(
        harness.reporter.events(),
        vec![HealthEvent::BootstrapStarting, HealthEvent::BootstrapSucceeded]
    );
    assert!(harness.provider.calls().is_empty());
    assert!(daemon.started_services().is_empty());
}

#[rstest]
fn configuration_errors_stop_bootstrap(harness: Harness) {
    let error = bootstrap_with(
        &FailingConfigLoader,
        harness.reporter.clone(),
        harness.provider.clone(),
    )
    .err()
    .expect("bootstrap should fail");

    assert!(matches!(error, BootstrapError::Configuration { .. }));
    assert!(matches!(
        harness.reporter.events().as_slice(),
        [HealthEvent::BootstrapStarting, HealthEvent::BootstrapFailed(_)]
    ));
}

#[rstest]
fn a_second_daemon_is_refused(harness: Harness) {
    let first = bootstrap_with(
        &harness.loader,
        harness.reporter.clone(),
        harness.provider.clone(),
    )
    .expect("first bootstrap");

    let error = bootstrap_with(
        &harness.loader,
        harness.reporter.clone(),
        harness.provider.clone(),
    )
    .err()
    .expect("second bootstrap should fail");

    let running = std::process::id();
    assert!(matches!(
        error,
        BootstrapError::Guard {
            source: GuardError::AlreadyRunning { pid }
        } if pid == running
    ));
    drop(first);
    assert!(!harness.loader.paths().lock_path().exists());
}

#[rstest]
fn services_start_after_their_dependencies(harness: Harness) {
    let mut daemon = bootstrap_with(
        &harness.loader,
        harness.reporter.clone(),
        harness.provider.clone(),
    )
    .expect("bootstrap");

    daemon
        .ensure_service(ServiceKind::Discovery)
        .expect("discovery should start");
    daemon
        .ensure_service(ServiceKind::Connector)
        .expect("connector is already running");

    assert_eq!(
        harness.provider.starts(),
        vec![ServiceKind::Connector, ServiceKind::Discovery]
    );
    assert_eq!(
        daemon.started_services(),
        [ServiceKind::Connector, ServiceKind::Discovery]
    );
    let events = harness.reporter.events();
    assert!(events.contains(&HealthEvent::ServiceReady(ServiceKind::Discovery)));
}

#[rstest]
fn failed_starts_are_reported_and_retried(harness: Harness) {
    harness
        .provider
        .fail_on(ServiceKind::Arbiter, "deliberate failure");
    let mut daemon = bootstrap_with(
        &harness.loader,
        harness.reporter.clone(),
        harness.provider.clone(),
    )
    .expect("bootstrap");

    let error = daemon
        .ensure_service(ServiceKind::Arbiter)
        .expect_err("arbiter should fail");
    assert_eq!(error.kind, ServiceKind::Arbiter);
    assert!(harness.reporter.events().contains(&HealthEvent::ServiceFailed {
        kind: ServiceKind::Arbiter,
        message: "deliberate failure".to_owned(),
    }));

    harness.provider.recover(ServiceKind::Arbiter);
    daemon
        .ensure_service(ServiceKind::Arbiter)
        .expect("retry should succeed");
    assert_eq!(
        harness.provider.starts(),
        vec![ServiceKind::Arbiter, ServiceKind::Arbiter]
    );
}

#[rstest]
fn shutdown_stops_services_in_reverse_order(harness: Harness) {
    let mut daemon = bootstrap_with(
        &harness.loader,
        harness.reporter.clone(),
        harness.provider.clone(),
    )
    .expect("bootstrap");
    daemon.start_all().expect("services start");

    let stopped = daemon.shutdown();

    assert_eq!(
        stopped,
        vec![
            ServiceKind::Discovery,
            ServiceKind::Arbiter,
            ServiceKind::Connector
        ]
    );
    assert_eq!(harness.provider.stops(), stopped);
    let paths = harness.loader.paths();
    assert!(!paths.lock_path().exists());
    assert!(!paths.pid_path().exists());
}

#[rstest]
fn the_run_loop_serves_until_signalled(harness: Harness) {
    run_daemon(
        &harness.loader,
        harness.reporter.clone(),
        harness.provider.clone(),
        &ImmediateSignal,
    )
    .expect("daemon should run");

    assert_eq!(
        harness.provider.calls(),
        vec![
            ProviderCall::Start(ServiceKind::Connector),
            ProviderCall::Start(ServiceKind::Arbiter),
            ProviderCall::Start(ServiceKind::Discovery),
            ProviderCall::Stop(ServiceKind::Discovery),
            ProviderCall::Stop(ServiceKind::Arbiter),
            ProviderCall::Stop(ServiceKind::Connector),
        ]
    );
    assert!(
        harness
            .reporter
            .events()
            .ends_with(&[HealthEvent::ServiceStopped(ServiceKind::Connector)])
    );
    assert!(!harness.loader.paths().lock_path().exists());
}

#[rstest]
fn a_failed_start_unwinds_the_running_services(harness: Harness) {
    harness
        .provider
        .fail_on(ServiceKind::Discovery, "resolver unavailable");

    let error = run_daemon(
        &harness.loader,
        harness.reporter.clone(),
        harness.provider.clone(),
        &ImmediateSignal,
    )
    .expect_err("run should fail");

    assert!(matches!(error, LaunchError::Service(ref failure) if failure.kind == ServiceKind::Discovery));
    assert_eq!(
        harness.provider.stops(),
        vec![ServiceKind::Arbiter, ServiceKind::Connector]
    );
    assert!(!harness.loader.paths().lock_path().exists());
}

#[rstest]
fn a_broken_signal_listener_still_stops_services(harness: Harness) {
    let error = run_daemon(
        &harness.loader,
        harness.reporter.clone(),
        harness.provider.clone(),
        &FailingSignal,
    )
    .expect_err("run should fail");

    assert!(matches!(error, LaunchError::Shutdown { .. }));
    assert_eq!(harness.provider.stops().len(), 3);
}

#[test]
fn telemetry_initialises_once() {
    let first = telemetry::initialise(&Config::default()).expect("telemetry");
    let compact = Config {
        log_format: LogFormat::Compact,
        ..Config::default()
    };
    let second = telemetry::initialise(&compact).expect("repeat initialisation");

    assert_eq!(first, second);
}

#[test]
fn invalid_log_filters_are_rejected() {
    let config = Config {
        log_filter: "connd=loud".to_owned(),
        ..Config::default()
    };

    assert!(matches!(
        telemetry::install_subscriber(&config),
        Err(TelemetryError::Filter(_))
    ));
}
