//! End-to-end hosting through isolation contexts.

use std::sync::Arc;
use std::time::Duration;

use busrun::BootstrapError;
use busrun::BootstrapPolicy;
use busrun::Bootstrapper;
use busrun::ConsumerType;
use busrun::EndpointAddress;
use busrun::Environment;
use busrun::HostingConfig;
use busrun::IsolationError;
use busrun::Launcher;
use busrun::MessageConsumer;
use busrun::Protocol;
use busrun::ServiceBus;
use busrun::ServiceDefinition;
use busrun::ShellSpec;
use busrun::ShellState;
use busrun::TypeName;
use busrun::bus::BusConfiguration;
use busrun::bus::BusEvent;
use busrun::bus::BusProbe;
use busrun::consumes;
use busrun::overlay::OverlayError;
use busrun::scanner::Assembly;
use busrun::shell::ConfigurationError;
use busrun::shell::ShellError;

struct PingMessage;
struct PongMessage;

struct Ping;

impl MessageConsumer for Ping {
    fn consumes() -> Vec<TypeName> {
        consumes![PingMessage]
    }
}

struct Pong;

impl MessageConsumer for Pong {
    fn consumes() -> Vec<TypeName> {
        consumes![PongMessage]
    }
}

fn environment(config: HostingConfig) -> Arc<Environment> {
    Arc::new(Environment::new(config))
}

fn definition<C: MessageConsumer>(protocol: Protocol, probe: &BusProbe) -> ServiceDefinition {
    let assembly = Assembly::new("test-services").consumer::<C>().into_shared();
    ServiceDefinition::new(
        ConsumerType::of::<C>(assembly),
        ShellSpec::new(protocol, probe.factory()),
    )
}

/// A bus that misbehaves on start.
struct FaultyBus {
    hang: Option<Duration>,
}

impl ServiceBus for FaultyBus {
    fn configure(&mut self, _configuration: BusConfiguration) -> busrun::bus::Result<()> {
        Ok(())
    }

    fn start(&mut self, _policy: &BootstrapPolicy) -> busrun::bus::Result<()> {
        match self.hang {
            Some(duration) => {
                std::thread::sleep(duration);
                Ok(())
            }
            None => panic!("bus exploded on start"),
        }
    }

    fn initial_deployment(
        &mut self,
        _policy: &BootstrapPolicy,
        _principal: &str,
    ) -> busrun::bus::Result<()> {
        Ok(())
    }

    fn dispose(&mut self) -> busrun::bus::Result<()> {
        Ok(())
    }
}

fn faulty(hang: Option<Duration>) -> ServiceDefinition {
    let assembly = Assembly::new("faulty").consumer::<Ping>().into_shared();
    let bus: busrun::bus::BusFactory =
        Arc::new(move || Box::new(FaultyBus { hang }) as Box<dyn ServiceBus>);
    ServiceDefinition::new(ConsumerType::of::<Ping>(assembly), ShellSpec::new(Protocol::Msmq, bus))
}

// --- Bootstrapper ---

#[tokio::test]
async fn test_build_and_start_ping() {
    let env = environment(HostingConfig::default());
    let probe = BusProbe::new();
    let service = Bootstrapper::new(definition::<Ping>(Protocol::Msmq, &probe), env.clone());

    let handle = service.build_hosted_service().await.unwrap();
    service.on_started(&handle).await.unwrap();
    assert_eq!(handle.state().await.unwrap(), ShellState::Started);
    assert_eq!(handle.name(), "Ping");

    let config = probe.last_configuration().unwrap();
    let ping = EndpointAddress::for_type(Protocol::Msmq, "localhost", &Ping::type_name());
    assert_eq!(config.send_endpoint, ping);
    assert_eq!(config.receive_endpoints, vec![(TypeName::of::<PingMessage>(), ping)]);
    assert_eq!(handle.configuration().await.unwrap(), Some(config));

    assert_eq!(env.live_contexts().len(), 1);
    service.on_stopped(handle).await;
    assert!(env.live_contexts().is_empty());
    assert_eq!(probe.count(|e| *e == BusEvent::Disposed), 1);
}

#[tokio::test]
async fn test_missing_override_file() {
    let dir = tempfile::tempdir().unwrap();
    let env = environment(HostingConfig::default().with_config_dir(dir.path()));
    let probe = BusProbe::new();
    let service = Bootstrapper::new(definition::<Ping>(Protocol::Msmq, &probe), env);

    assert_eq!(service.configuration_path(), dir.path().join("Ping.config"));
    assert_eq!(service.standalone_configuration_filename(), None);

    let handle = service.build_hosted_service().await.unwrap();
    let config = probe.last_configuration().unwrap();
    assert_eq!(config.number_of_retries, None);
    assert_eq!(config.thread_count, None);
    service.on_stopped(handle).await;
}

#[tokio::test]
async fn test_override_file_next_to_service_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("Ping.config"),
        r#"
        [[facility]]
        id = "rhino.esb"

        [facility.bus]
        numberOfRetries = 12
        threadCount = 2
        "#,
    )
    .unwrap();
    let env = environment(HostingConfig::default().with_config_dir(dir.path()));
    let probe = BusProbe::new();
    let service = Bootstrapper::new(definition::<Ping>(Protocol::Msmq, &probe), env);

    assert!(service.standalone_configuration_filename().is_some());
    let handle = service.build_hosted_service().await.unwrap();
    let config = probe.last_configuration().unwrap();
    assert_eq!(config.number_of_retries, Some(12));
    assert_eq!(config.thread_count, Some(2));
    service.on_stopped(handle).await;
}

#[tokio::test]
async fn test_malformed_override_leaks_no_context() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("Ping.config"), "[[facility]\nid = ").unwrap();
    let env = environment(HostingConfig::default().with_config_dir(dir.path()));
    let probe = BusProbe::new();
    let service = Bootstrapper::new(definition::<Ping>(Protocol::Msmq, &probe), env.clone());

    let err = service.build_hosted_service().await.unwrap_err();
    assert!(matches!(
        err,
        BootstrapError::Configuration(ShellError::Configuration(ConfigurationError::Overlay(
            OverlayError::Parse { .. }
        )))
    ));
    assert!(env.live_contexts().is_empty());
    assert_eq!(probe.count(|e| matches!(e, BusEvent::Configured(_))), 0);
    assert_eq!(probe.count(|e| *e == BusEvent::Disposed), 1);
}

#[tokio::test]
async fn test_inaccessible_override_is_not_skipped() {
    let not_a_dir = tempfile::NamedTempFile::new().unwrap();
    let env = environment(HostingConfig::default().with_config_dir(not_a_dir.path()));
    let probe = BusProbe::new();
    let service = Bootstrapper::new(definition::<Ping>(Protocol::Msmq, &probe), env.clone());

    assert!(service.standalone_configuration_filename().is_some());
    let err = service.build_hosted_service().await.unwrap_err();
    assert!(matches!(
        err,
        BootstrapError::Configuration(ShellError::Configuration(ConfigurationError::Overlay(
            OverlayError::Read { .. }
        )))
    ));
    assert!(env.live_contexts().is_empty());
}

#[tokio::test]
async fn test_concurrent_builds_claim_distinct_ports() {
    let env = environment(HostingConfig::default());
    let ping_probe = BusProbe::new();
    let pong_probe = BusProbe::new();
    let ping = Bootstrapper::new(
        definition::<Ping>(Protocol::RhinoQueues, &ping_probe),
        env.clone(),
    );
    let pong = Bootstrapper::new(
        definition::<Pong>(Protocol::RhinoQueues, &pong_probe),
        env.clone(),
    );

    let (ping_handle, pong_handle) =
        tokio::join!(ping.build_hosted_service(), pong.build_hosted_service());
    let (ping_handle, pong_handle) = (ping_handle.unwrap(), pong_handle.unwrap());
    tokio::try_join!(ping.on_started(&ping_handle), pong.on_started(&pong_handle)).unwrap();

    let ping_port = ping_probe.last_configuration().unwrap().send_endpoint.port().unwrap();
    let pong_port = pong_probe.last_configuration().unwrap().send_endpoint.port().unwrap();
    assert_ne!(ping_port, pong_port);
    let mut ports = vec![ping_port, pong_port];
    ports.sort();
    assert_eq!(ports, vec![2200, 2201]);

    // The first context spawned owns the table.
    let owner = env.port_owner().unwrap();
    assert!(owner == ping_handle.context_id() || owner == pong_handle.context_id());

    ping.on_stopped(ping_handle).await;
    pong.on_stopped(pong_handle).await;

    // Assignments survive their services, including the owner.
    assert_eq!(env.port_allocator().unwrap().assignments().len(), 2);
    assert!(env.live_contexts().is_empty());
}

#[tokio::test]
async fn test_rebuild_reuses_assigned_port() {
    let env = environment(HostingConfig::default().with_base_port(7000));
    let probe = BusProbe::new();
    let service = Bootstrapper::new(definition::<Ping>(Protocol::RhinoQueues, &probe), env);

    let first = service.build_hosted_service().await.unwrap();
    let first_endpoint = probe.last_configuration().unwrap().send_endpoint;
    service.on_stopped(first).await;

    let second = service.build_hosted_service().await.unwrap();
    assert_eq!(probe.last_configuration().unwrap().send_endpoint, first_endpoint);
    assert_eq!(first_endpoint.port(), Some(7000));
    service.on_stopped(second).await;
}

#[tokio::test]
async fn test_crash_inside_context_is_contained() {
    let env = environment(HostingConfig::default());
    let service = Bootstrapper::new(faulty(None), env.clone());

    let handle = service.build_hosted_service().await.unwrap();
    let err = service.on_started(&handle).await.unwrap_err();
    match err {
        BootstrapError::Isolation(IsolationError::Crashed { message, .. }) => {
            assert!(message.contains("bus exploded"));
        }
        other => panic!("expected a crash, got {:?}", other),
    }

    // The crashed context no longer answers, and stopping it still succeeds.
    assert!(handle.state().await.is_err());
    service.on_stopped(handle).await;
    assert!(env.live_contexts().is_empty());
}

#[tokio::test]
async fn test_hung_bus_times_out_and_is_abandoned() {
    let config = HostingConfig::default()
        .with_call_timeout(Duration::from_millis(50))
        .with_stop_timeout(Duration::from_millis(50));
    let env = environment(config);
    let service = Bootstrapper::new(faulty(Some(Duration::from_millis(500))), env.clone());

    let handle = service.build_hosted_service().await.unwrap();
    assert!(matches!(
        service.on_started(&handle).await,
        Err(BootstrapError::Isolation(IsolationError::Timeout { .. }))
    ));

    service.on_stopped(handle).await;
    assert!(env.live_contexts().is_empty());
}

#[tokio::test]
async fn test_initial_deployment_uses_throwaway_context() {
    let env = environment(HostingConfig::default().with_deployment_user("svc-bus"));
    let probe = BusProbe::new();
    let definition =
        definition::<Ping>(Protocol::Msmq, &probe).with_policy(BootstrapPolicy::new("install"));
    let service = Bootstrapper::new(definition, env.clone());

    service.initial_deployment().await.unwrap();

    assert!(env.live_contexts().is_empty());
    assert_eq!(
        probe.events().into_iter().skip(1).collect::<Vec<_>>(),
        vec![
            BusEvent::Deployed {
                policy: "install".to_string(),
                principal: "svc-bus".to_string(),
            },
            BusEvent::Disposed,
        ]
    );
    assert_eq!(probe.count(|e| matches!(e, BusEvent::Started { .. })), 0);
}

#[tokio::test]
async fn test_failed_deployment_still_unloads() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("Ping.config"), "not = [valid").unwrap();
    let env = environment(HostingConfig::default().with_config_dir(dir.path()));
    let probe = BusProbe::new();
    let service = Bootstrapper::new(definition::<Ping>(Protocol::Msmq, &probe), env.clone());

    assert!(matches!(
        service.initial_deployment().await,
        Err(BootstrapError::Configuration(_))
    ));
    assert!(env.live_contexts().is_empty());
}

// --- Launcher ---

#[tokio::test]
async fn test_launcher_starts_and_stops_in_reverse() {
    let env = environment(HostingConfig::default());
    let probe = BusProbe::new();
    let launcher = Launcher::new(env.clone())
        .register(definition::<Ping>(Protocol::Msmq, &probe))
        .register(definition::<Pong>(Protocol::Msmq, &probe));

    let running = launcher.start_all().await.unwrap();
    assert_eq!(running.len(), 2);
    let names: Vec<_> = running.handles().map(|h| h.name().to_string()).collect();
    assert_eq!(names, vec!["Ping", "Pong"]);
    assert_eq!(env.live_contexts().len(), 2);

    running.stop_all().await;
    assert!(env.live_contexts().is_empty());
    assert_eq!(probe.count(|e| *e == BusEvent::Disposed), 2);
}

#[tokio::test]
async fn test_launcher_rolls_back_on_start_failure() {
    let env = environment(HostingConfig::default());
    let good = BusProbe::new();
    let bad = BusProbe::new();
    bad.fail_start("queue missing");
    let launcher = Launcher::new(env.clone())
        .register(definition::<Ping>(Protocol::Msmq, &good))
        .register(definition::<Pong>(Protocol::Msmq, &bad));

    let err = launcher.start_all().await.err().unwrap();
    assert!(format!("{:#}", err).contains("queue missing"));

    assert!(env.live_contexts().is_empty());
    assert_eq!(good.count(|e| matches!(e, BusEvent::Started { .. })), 1);
    assert_eq!(good.count(|e| *e == BusEvent::Disposed), 1);
    assert_eq!(bad.count(|e| *e == BusEvent::Disposed), 1);
}

#[tokio::test]
async fn test_launcher_install_argument_routes_to_deployment() {
    let env = environment(HostingConfig::default());
    let probe = BusProbe::new();
    let launcher = Launcher::new(env.clone()).register(definition::<Ping>(Protocol::Msmq, &probe));

    launcher.run(["ping-host", "install"], async {}).await.unwrap();
    assert_eq!(probe.count(|e| matches!(e, BusEvent::Deployed { .. })), 1);
    assert_eq!(probe.count(|e| matches!(e, BusEvent::Started { .. })), 0);

    launcher.run(["ping-host"], async {}).await.unwrap();
    assert_eq!(probe.count(|e| matches!(e, BusEvent::Started { .. })), 1);
    assert!(env.live_contexts().is_empty());
}
