//! Override files on disk.

use std::io::Write;

use busrun::BusConfiguration;
use busrun::EndpointAddress;
use busrun::Protocol;
use busrun::overlay;
use busrun::overlay::OverlayError;

fn generated() -> BusConfiguration {
    let send = EndpointAddress::new(Protocol::Msmq, "localhost", "orders.Ping");
    BusConfiguration::new(send.clone())
        .receive("orders.PingMessage".into(), send)
        .retries(5)
}

fn override_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_override_wins_over_generated_value() {
    let file = override_file(
        r#"
        [[facility]]
        id = "rhino.esb"

        [facility.bus]
        numberOfRetries = 12
        "#,
    );

    let patched = overlay::patch(generated(), Some(file.path())).unwrap();
    assert_eq!(patched.number_of_retries, Some(12));
    // Untouched attributes keep their generated values.
    assert_eq!(patched.thread_count, None);
    assert_eq!(patched.send_endpoint, generated().send_endpoint);
    assert_eq!(patched.receive_endpoints, generated().receive_endpoints);
}

#[test]
fn test_all_attributes_apply() {
    let file = override_file(
        r#"
        [[facility]]
        id = "unrelated"

        [[facility]]
        id = "rhino.esb"

        [facility.bus]
        numberOfRetries = 1
        threadCount = 8
        loadBalancerEndpoint = "msmq://balancer/pool"
        logEndpoint = "msmq://localhost/audit"
        "#,
    );

    let patched = overlay::patch(generated(), Some(file.path())).unwrap();
    assert_eq!(patched.number_of_retries, Some(1));
    assert_eq!(patched.thread_count, Some(8));
    assert_eq!(
        patched.load_balancer_endpoint,
        Some(EndpointAddress::new(Protocol::Msmq, "balancer", "pool"))
    );
    assert_eq!(
        patched.logging_endpoint,
        Some(EndpointAddress::new(Protocol::Msmq, "localhost", "audit"))
    );
}

#[test]
fn test_missing_file_leaves_config_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let absent = dir.path().join("Ping.config");

    assert_eq!(overlay::patch(generated(), Some(&absent)).unwrap(), generated());
    assert_eq!(overlay::patch(generated(), None).unwrap(), generated());
}

#[test]
fn test_file_without_bus_section_means_no_overrides() {
    let file = override_file(
        r#"
        [[facility]]
        id = "rhino.esb"
        "#,
    );
    assert_eq!(overlay::patch(generated(), Some(file.path())).unwrap(), generated());
}

#[test]
fn test_malformed_file_is_an_error() {
    let file = override_file("[[facility]\nid = ");
    match overlay::patch(generated(), Some(file.path())) {
        Err(OverlayError::Parse { path, .. }) => {
            assert_eq!(path, file.path().display().to_string());
        }
        other => panic!("expected a parse error, got {:?}", other),
    }
}

#[test]
fn test_wrong_attribute_type_is_an_error() {
    let file = override_file(
        r#"
        [[facility]]
        id = "rhino.esb"

        [facility.bus]
        threadCount = "four"
        "#,
    );
    assert!(matches!(
        overlay::patch(generated(), Some(file.path())),
        Err(OverlayError::Parse { .. })
    ));
}

#[test]
fn test_uncheckable_path_is_a_read_error() {
    // Checking a path below a regular file fails with "not a directory".
    let file = override_file("");
    let below = file.path().join("Ping.config");

    assert!(matches!(
        overlay::patch(generated(), Some(&below)),
        Err(OverlayError::Read { .. })
    ));
}
