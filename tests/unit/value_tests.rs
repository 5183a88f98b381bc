//! Unit tests for local values, wire values, and array copy-back.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use uuid::Uuid;

use peerlink::capability::MethodDesc;
use peerlink::object::{Object, ObjectRef, Value};
use peerlink::protocol::{Reference, ReferenceArray, WireValue};
use peerlink::{AppError, Result};

struct Noop;

impl Object for Noop {
    fn invoke<'a>(
        &'a self,
        _method: &'a MethodDesc,
        _args: &'a mut [Value],
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async { Ok(Value::Unit) })
    }
}

fn object() -> ObjectRef {
    Arc::new(Noop)
}

#[test]
fn objects_never_cross_by_copy() {
    assert!(matches!(
        WireValue::from_plain(&Value::Object(object())),
        Err(AppError::Argument(_))
    ));

    let nested = Value::Array(vec![Value::Int(1), Value::Object(object())]);
    assert!(matches!(
        WireValue::from_plain(&nested),
        Err(AppError::Argument(_))
    ));
}

#[test]
fn plain_values_convert_both_ways() {
    let value = Value::Array(vec![
        Value::Int(1),
        Value::Str("two".into()),
        Value::Bytes(vec![3]),
        Value::Unit,
    ]);
    let wire = WireValue::from_plain(&value).expect("plain data");
    assert_eq!(wire.into_plain().expect("plain data"), value);
}

#[test]
fn reference_markers_are_not_plain_data() {
    let wire = WireValue::Array(vec![WireValue::Reference(Reference::new(Uuid::new_v4()))]);
    assert!(matches!(wire.into_plain(), Err(AppError::Internal(_))));
}

#[test]
fn objects_compare_by_identity() {
    let a = object();
    let b = object();
    assert_eq!(Value::Object(Arc::clone(&a)), Value::Object(Arc::clone(&a)));
    assert_ne!(Value::Object(a), Value::Object(b));
}

#[test]
fn snapshot_requires_an_array() {
    let err = ReferenceArray::snapshot(2, &Value::Int(5)).expect_err("not an array");
    assert!(matches!(err, AppError::Argument(ref msg) if msg.contains("parameter 2")));

    let snapshot = ReferenceArray::snapshot(0, &Value::Bytes(vec![1, 2, 3])).expect("bytes");
    assert_eq!(snapshot.len(), 3);
    assert!(!snapshot.is_empty());
}

#[test]
fn copy_back_overwrites_leading_bytes() {
    let snapshot = ReferenceArray::snapshot(0, &Value::Bytes(vec![9, 8])).expect("bytes");
    let mut dst = Value::Bytes(vec![0, 0, 0]);

    snapshot.copy_into(&mut dst).expect("copy back");

    assert_eq!(dst, Value::Bytes(vec![9, 8, 0]));
}

#[test]
fn copy_back_overwrites_array_elements() {
    let snapshot = ReferenceArray::snapshot(1, &Value::Array(vec![Value::Int(4), Value::Int(6)]))
        .expect("array");
    let mut dst = Value::Array(vec![Value::Int(2), Value::Int(3)]);

    snapshot.copy_into(&mut dst).expect("copy back");

    assert_eq!(dst, Value::Array(vec![Value::Int(4), Value::Int(6)]));
}

#[test]
fn copy_back_into_shorter_array_fails() {
    let snapshot = ReferenceArray::snapshot(0, &Value::Bytes(vec![1, 2, 3])).expect("bytes");
    let mut dst = Value::Bytes(vec![0]);

    let err = snapshot.copy_into(&mut dst).expect_err("too short");
    assert!(matches!(err, AppError::Argument(_)));
    assert_eq!(dst, Value::Bytes(vec![0]));
}

#[test]
fn copy_back_with_mismatched_shape_fails() {
    let snapshot = ReferenceArray::snapshot(0, &Value::Bytes(vec![1])).expect("bytes");
    let mut dst = Value::Array(vec![Value::Int(0)]);

    assert!(matches!(
        snapshot.copy_into(&mut dst),
        Err(AppError::Argument(_))
    ));
}
