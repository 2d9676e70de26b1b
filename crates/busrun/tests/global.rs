//! The process-wide environment. Kept in its own test binary so no other
//! test can create it first.

use std::sync::Arc;

use busrun::ConsumerType;
use busrun::Environment;
use busrun::HostingConfig;
use busrun::Launcher;
use busrun::MessageConsumer;
use busrun::Protocol;
use busrun::ServiceDefinition;
use busrun::ShellSpec;
use busrun::TypeName;
use busrun::bus::BusProbe;
use busrun::consumes;
use busrun::scanner::Assembly;

struct Tick;
struct Clock;

impl MessageConsumer for Clock {
    fn consumes() -> Vec<TypeName> {
        consumes![Tick]
    }
}

#[tokio::test]
async fn test_global_environment_is_configured_once() {
    assert!(Environment::init_global(HostingConfig::default().with_base_port(9100)));
    assert!(!Environment::init_global(HostingConfig::default().with_base_port(9200)));
    assert_eq!(Environment::global().config().base_port, 9100);

    let probe = BusProbe::new();
    let assembly = Assembly::new("clocks").consumer::<Clock>().into_shared();
    let launcher = Launcher::global().register(ServiceDefinition::new(
        ConsumerType::of::<Clock>(assembly),
        ShellSpec::new(Protocol::RhinoQueues, probe.factory()),
    ));
    assert!(Arc::ptr_eq(launcher.environment(), &Environment::global()));

    let running = launcher.start_all().await.unwrap();
    let send = probe.last_configuration().unwrap().send_endpoint;
    assert_eq!(send.port(), Some(9100));

    running.stop_all().await;
    assert!(Environment::global().live_contexts().is_empty());
}
