//! Integration tests for method calls between two runners.

use std::sync::Arc;

use peerlink::object::Value;
use peerlink::AppError;

use super::test_helpers::{connected_pair, exported_api, methods, TestApi, API, API_EXPORT};

#[tokio::test]
async fn call_through_stand_in_returns_result() {
    let peers = connected_pair();
    let api = exported_api(&peers).await;
    let m = methods();

    let value = api
        .invoke(&m.sum, &mut [Value::Int(2), Value::Int(3)])
        .await
        .expect("sum");

    assert_eq!(value, Value::Int(5));
}

#[tokio::test]
async fn invoke_named_resolves_the_export() {
    let peers = connected_pair();
    let _api = exported_api(&peers).await;
    let m = methods();

    let value = peers
        .left
        .invoke_named(API_EXPORT, &m.sum, &mut [Value::Int(40), Value::Int(2)])
        .await
        .expect("sum");

    assert_eq!(value, Value::Int(42));
}

#[tokio::test]
async fn static_method_runs_on_peer_receiver() {
    let peers = connected_pair();
    let m = methods();

    let value = peers
        .left
        .invoke_static(&m.twice, &mut [Value::Int(21)])
        .await
        .expect("twice");

    assert_eq!(value, Value::Int(42));
}

#[tokio::test]
async fn both_sides_can_export_and_call() {
    let peers = connected_pair();
    let left_api = exported_api(&peers).await;
    peers
        .left
        .register(Some("left-api"), Arc::new(TestApi), &[API])
        .await
        .expect("export from left");
    let right_api = peers.right.get("left-api").await.expect("stand-in on right");
    let m = methods();

    let from_left = left_api
        .invoke(&m.sum, &mut [Value::Int(1), Value::Int(1)])
        .await
        .expect("left to right");
    let from_right = right_api
        .invoke(&m.sum, &mut [Value::Int(2), Value::Int(2)])
        .await
        .expect("right to left");

    assert_eq!(from_left, Value::Int(2));
    assert_eq!(from_right, Value::Int(4));
}

#[tokio::test]
async fn concurrent_calls_are_matched_to_their_callers() {
    let peers = connected_pair();
    let api = exported_api(&peers).await;

    let calls: Vec<_> = (0..16_i64)
        .map(|i| {
            let api = Arc::clone(&api);
            tokio::spawn(async move {
                let m = methods();
                let value = api
                    .invoke(&m.sum, &mut [Value::Int(i), Value::Int(1000)])
                    .await
                    .expect("sum");
                (i, value)
            })
        })
        .collect();

    for call in calls {
        let (i, value) = call.await.expect("task joined");
        assert_eq!(value, Value::Int(i + 1000));
    }
}

#[tokio::test]
async fn instance_method_without_target_is_rejected() {
    let peers = connected_pair();
    let m = methods();

    let err = peers
        .left
        .invoke(None, &m.sum, &mut [Value::Int(1), Value::Int(2)])
        .await
        .expect_err("needs a target");

    assert!(matches!(err, AppError::Argument(_)));
}

#[tokio::test]
async fn wrong_argument_count_is_rejected() {
    let peers = connected_pair();
    let api = exported_api(&peers).await;
    let m = methods();

    let err = api
        .invoke(&m.sum, &mut [Value::Int(1)])
        .await
        .expect_err("too few arguments");

    assert!(matches!(err, AppError::Argument(_)));
}

#[tokio::test]
async fn stand_in_rejects_methods_outside_its_capabilities() {
    let peers = connected_pair();
    let api = exported_api(&peers).await;
    let m = methods();

    let err = api
        .invoke(&m.supplier_get, &mut [])
        .await
        .expect_err("api is not a supplier");

    assert!(matches!(err, AppError::Argument(ref msg) if msg.contains("does not implement Supplier")));
}
