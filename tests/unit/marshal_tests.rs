//! Unit tests for by-reference policy and runtime overrides.

use peerlink::capability::{MethodDesc, TypeDesc};
use peerlink::marshal::{param_by_ref, result_by_ref, OverrideSet, OverrideTarget, RpcOverride};
use peerlink::AppError;

fn supplier() -> TypeDesc {
    TypeDesc::interface("Supplier")
}

fn compute() -> MethodDesc {
    MethodDesc::interface("Api", "m")
        .param(supplier())
        .returns(supplier())
        .build()
        .expect("valid descriptor")
}

#[test]
fn parameter_override_requires_interface_or_array() {
    let method = MethodDesc::interface("Api", "count")
        .param(TypeDesc::Int)
        .param(TypeDesc::Bytes)
        .build()
        .expect("valid descriptor");

    assert!(matches!(
        RpcOverride::for_parameter(&method, 0),
        Err(AppError::Config(_))
    ));
    let array = RpcOverride::for_parameter(&method, 1).expect("bytes may cross by reference");
    assert_eq!(array.target(), OverrideTarget::Parameter(1));
}

#[test]
fn parameter_override_index_must_be_in_range() {
    assert!(matches!(
        RpcOverride::for_parameter(&compute(), 3),
        Err(AppError::Config(_))
    ));
}

#[test]
fn result_override_requires_interface_return() {
    let method = MethodDesc::interface("Api", "count")
        .returns(TypeDesc::Int)
        .build()
        .expect("valid descriptor");
    assert!(matches!(
        RpcOverride::for_result(&method),
        Err(AppError::Config(_))
    ));
    RpcOverride::for_result(&compute()).expect("interface result");
}

#[test]
fn concrete_instance_methods_cannot_be_overridden() {
    let method = MethodDesc::concrete("Impl", "m")
        .param(supplier())
        .build()
        .expect("valid descriptor");
    assert!(matches!(
        RpcOverride::for_parameter(&method, 0),
        Err(AppError::Config(_))
    ));
}

#[test]
fn override_display_names_position_and_signature() {
    let method = compute();
    let param = RpcOverride::for_parameter(&method, 0).expect("param override");
    let result = RpcOverride::for_result(&method).expect("result override");

    assert_eq!(param.to_string(), "parameterIndex=0 Api::m(Supplier)");
    assert_eq!(result.to_string(), "Api::m(Supplier)");
    assert_eq!(param.declaring_type(), "Api");
    assert_eq!(param.method_name(), "m");
}

#[test]
fn overrides_built_separately_are_equal() {
    let a = RpcOverride::for_parameter(&compute(), 0).expect("override");
    let b = RpcOverride::for_parameter(&compute(), 0).expect("override");
    let c = RpcOverride::for_result(&compute()).expect("override");
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn override_set_add_and_remove_report_changes() {
    let set = OverrideSet::new();
    let rpc_override = RpcOverride::for_parameter(&compute(), 0).expect("override");

    assert!(set.is_empty());
    assert!(set.add(rpc_override.clone()));
    assert!(!set.add(rpc_override.clone()));
    assert_eq!(set.len(), 1);
    assert!(set.contains(&compute(), OverrideTarget::Parameter(0)));
    assert!(!set.contains(&compute(), OverrideTarget::Return));

    assert!(set.remove(&rpc_override));
    assert!(!set.remove(&rpc_override));
    assert!(set.is_empty());
}

#[test]
fn by_ref_decision_combines_marker_and_overrides() {
    let marked = MethodDesc::interface("Api", "marked")
        .param_by_ref(supplier())
        .returns_by_ref(supplier())
        .build()
        .expect("valid descriptor");
    let plain = compute();
    let set = OverrideSet::new();

    assert!(param_by_ref(&marked, 0, &set));
    assert!(result_by_ref(&marked, &set));
    assert!(!param_by_ref(&plain, 0, &set));
    assert!(!result_by_ref(&plain, &set));

    let _ = set.add(RpcOverride::for_parameter(&plain, 0).expect("override"));
    let _ = set.add(RpcOverride::for_result(&plain).expect("override"));
    assert!(param_by_ref(&plain, 0, &set));
    assert!(result_by_ref(&plain, &set));
}
