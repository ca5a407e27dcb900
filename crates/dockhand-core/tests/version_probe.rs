//! HTTP engine version probe against a local tiny_http server.

use dockhand_core::{CoreError, HttpVersionProbe, Machine, VersionProbe};
use dockhand_driver::MockDriver;
use dockhand_schema::HostOptions;
use std::sync::Arc;
use tiny_http::{Header, Response, Server, StatusCode};

/// Serve `body` with `status` for every request; returns the engine URL.
fn serve(status: u16, body: &'static str) -> String {
    let server = Arc::new(Server::http("127.0.0.1:0").expect("failed to bind test HTTP server"));
    let port = server.server_addr().to_ip().expect("not an IP addr").port();
    let srv = Arc::clone(&server);
    std::thread::spawn(move || {
        for request in srv.incoming_requests() {
            let path_ok = request.url() == "/version";
            let header =
                Header::from_bytes("Content-Type", "application/json").expect("valid header");
            let response = if path_ok {
                Response::from_string(body)
                    .with_status_code(StatusCode(status))
                    .with_header(header)
            } else {
                Response::from_string("not found").with_status_code(StatusCode(404))
            };
            let _ = request.respond(response);
        }
    });
    format!("tcp://127.0.0.1:{port}")
}

fn machine_at(url: &str) -> Machine {
    Machine::new(
        "dev",
        Box::new(MockDriver::new("dev").with_url(url)),
        HostOptions::default(),
    )
    .unwrap()
    .with_version_probe(Arc::new(HttpVersionProbe::new()))
}

#[test]
fn reads_version_field_from_engine_api() {
    let url = serve(200, r#"{"Version":"24.0.7","ApiVersion":"1.43","Os":"linux"}"#);
    let machine = machine_at(&url);
    assert_eq!(machine.docker_version().unwrap(), "24.0.7");
}

#[test]
fn probe_can_be_used_directly() {
    let url = serve(200, r#"{"Version":"20.10.17"}"#);
    let machine = machine_at(&url);
    let version = HttpVersionProbe::default()
        .engine_version(&machine)
        .unwrap();
    assert_eq!(version, "20.10.17");
}

#[test]
fn missing_version_field_is_an_error() {
    let url = serve(200, r#"{"ApiVersion":"1.43"}"#);
    let err = machine_at(&url).docker_version().unwrap_err();
    assert!(matches!(err, CoreError::Version(_)));
    assert!(err.to_string().contains("no Version field"));
}

#[test]
fn http_error_status_is_reported() {
    let url = serve(500, "engine exploded");
    let err = machine_at(&url).docker_version().unwrap_err();
    assert!(err.to_string().contains("HTTP 500"));
}

#[test]
fn malformed_json_is_an_error() {
    let url = serve(200, "not json");
    assert!(matches!(
        machine_at(&url).docker_version().unwrap_err(),
        CoreError::Version(_)
    ));
}

#[test]
fn unix_socket_endpoint_is_unsupported() {
    let err = machine_at("unix:///var/run/docker.sock")
        .docker_version()
        .unwrap_err();
    assert!(err.to_string().contains("unsupported engine URL"));
}
