//! Unit tests for runtime errors and faults.

use peerlink::errors::{Fault, RPC_BOUNDARY_FRAME};
use peerlink::AppError;

#[test]
fn display_prefixes_error_kind() {
    let cases = [
        (AppError::Internal("x".into()), "internal: x"),
        (AppError::NullReference("x".into()), "null reference: x"),
        (AppError::Closed("x".into()), "closed: x"),
        (AppError::Config("x".into()), "config: x"),
        (AppError::Protocol("x".into()), "protocol: x"),
        (AppError::Interrupted("x".into()), "interrupted: x"),
        (AppError::Argument("x".into()), "argument: x"),
        (AppError::Codec("x".into()), "codec: x"),
        (AppError::Ipc("x".into()), "ipc: x"),
        (AppError::Io("x".into()), "io: x"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }

    let invocation = AppError::Invocation(Fault::new("sql", "table missing"));
    assert_eq!(invocation.to_string(), "invocation: sql: table missing");
}

#[test]
fn into_fault_keeps_application_faults() {
    let fault = Fault::new("class_cast", "wrong type").with_frame("Api::cast");
    let folded = AppError::Invocation(fault.clone()).into_fault();
    assert_eq!(folded, fault);
}

#[test]
fn into_fault_classifies_runtime_errors() {
    let fault = AppError::NullReference("instance gone".into()).into_fault();
    assert_eq!(fault.kind, "null_reference");
    assert_eq!(fault.message, "instance gone");
    assert!(fault.trace.is_empty());
}

#[test]
fn crossed_boundary_appends_marker_then_call_site() {
    let fault = Fault::new("sql", "boom")
        .with_frame("Api::fail")
        .crossed_boundary("Api", "fail");

    assert_eq!(
        fault.trace,
        vec![
            "Api::fail".to_owned(),
            RPC_BOUNDARY_FRAME.to_owned(),
            "Api::fail".to_owned(),
        ]
    );
}

#[test]
fn conversions_map_to_matching_variants() {
    let toml_err = toml::from_str::<toml::Value>("= nope").expect_err("invalid toml");
    assert!(matches!(AppError::from(toml_err), AppError::Config(_)));

    let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
    assert!(matches!(AppError::from(io_err), AppError::Io(ref msg) if msg.contains("pipe closed")));

    let json_err = serde_json::from_str::<serde_json::Value>("{").expect_err("invalid json");
    assert!(matches!(AppError::from(json_err), AppError::Codec(_)));
}
