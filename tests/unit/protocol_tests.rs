//! Unit tests for protocol messages and their JSON shape.

use uuid::Uuid;

use peerlink::capability::{MethodDesc, TypeDesc};
use peerlink::errors::Fault;
use peerlink::marshal::RpcOverride;
use peerlink::protocol::codec::{decode_frame, encode_frame};
use peerlink::protocol::{
    Command, CommandRequest, CommandResponse, InvokeRequest, InvokeResponse, Reference,
    RequestBody, ResponseBody, WireValue,
};

#[test]
fn every_request_gets_a_fresh_message_id() {
    let a = CommandRequest::exit();
    let b = CommandRequest::exit();
    assert_ne!(a.message_id, b.message_id);
}

#[test]
fn op_names_match_wire_tags() {
    let id = Uuid::new_v4();
    let register = CommandRequest::register("calc".into(), id, vec!["Calculator".into()]);
    assert_eq!(register.op(), "register");
    assert_eq!(CommandRequest::deregister(id).op(), "deregister");
    assert_eq!(CommandRequest::exit().op(), "exit");
    assert!(CommandRequest::exit().is_exit());

    let line = encode_frame(&Command::from(register)).expect("encode");
    let json: serde_json::Value = serde_json::from_str(&line).expect("json");
    assert_eq!(json["request"]["body"]["op"], "register");
    assert_eq!(json["request"]["body"]["name"], "calc");

    let response = CommandResponse::new(id, ResponseBody::AddRpcOverride);
    assert_eq!(response.op(), "add_rpc_override");
    assert!(!response.is_exit());
}

#[test]
fn invoke_request_survives_the_wire() {
    let target = Uuid::new_v4();
    let request = CommandRequest::new(RequestBody::Invoke(InvokeRequest {
        instance_id: Some(target),
        declaring_type: "Api".into(),
        method_name: "sum".into(),
        parameter_types: vec![TypeDesc::Int, TypeDesc::interface("Supplier")],
        arguments: vec![
            WireValue::Int(7),
            WireValue::Reference(Reference::new(Uuid::new_v4())),
        ],
    }));
    let command = Command::from(request);

    let line = encode_frame(&command).expect("encode");
    assert_eq!(decode_frame(&line).expect("decode"), Some(command));
}

#[test]
fn invocation_exception_is_tagged_with_its_outcome() {
    let response = CommandResponse::new(
        Uuid::new_v4(),
        ResponseBody::Invoke(InvokeResponse::invocation_exception(Fault::new(
            "sql", "boom",
        ))),
    );

    let line = encode_frame(&Command::from(response)).expect("encode");
    let json: serde_json::Value = serde_json::from_str(&line).expect("json");
    let outcome = &json["response"]["body"]["outcome"];

    assert_eq!(outcome["type"], "invocation_exception");
    assert_eq!(outcome["value"]["kind"], "sql");
    assert_eq!(outcome["value"]["message"], "boom");
}

#[test]
fn override_request_survives_the_wire() {
    let method = MethodDesc::interface("Api", "compute")
        .param(TypeDesc::interface("Supplier"))
        .returns(TypeDesc::Int)
        .build()
        .expect("valid descriptor");
    let rpc_override = RpcOverride::for_parameter(&method, 0).expect("valid override");
    let command = Command::from(CommandRequest::new(RequestBody::AddRpcOverride {
        rpc_override,
    }));

    let line = encode_frame(&command).expect("encode");
    assert_eq!(decode_frame(&line).expect("decode"), Some(command));
}
