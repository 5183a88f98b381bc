//! Unit tests for the instance registry and lazy stand-ins.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use uuid::Uuid;

use peerlink::capability::MethodDesc;
use peerlink::object::{Object, ObjectRef, Value};
use peerlink::registry::{anonymous_name, Backing, InstanceKey, InstanceRegistry, LazyInstance};
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

fn backing() -> Backing {
    Backing::Object(Arc::new(Noop))
}

fn caps() -> Vec<String> {
    vec!["Api".to_owned()]
}

#[tokio::test]
async fn registered_entry_is_found_by_name_and_id() {
    let registry = InstanceRegistry::new();
    let id = Uuid::new_v4();
    let _ = registry.register(Some("api".into()), id, caps(), backing());

    let by_name = registry
        .get_or_wait(&InstanceKey::from("api"))
        .await
        .expect("by name");
    let by_id = registry
        .get_or_wait(&InstanceKey::from(id))
        .await
        .expect("by id");

    assert_eq!(by_name.id, id);
    assert_eq!(by_id.name, "api");
    assert_eq!(by_id.capabilities, caps());
    assert!(registry.contains(id));
    assert_eq!(registry.len(), 1);
}

#[test]
fn unnamed_registration_uses_anonymous_name() {
    let registry = InstanceRegistry::new();
    let id = Uuid::new_v4();
    let entry = registry.register(None, id, caps(), backing());

    assert_eq!(entry.name, anonymous_name(id));
    assert!(entry.name.starts_with("anonymous-"));
    assert!(registry
        .try_get(&InstanceKey::Name(anonymous_name(id)))
        .is_some());
}

#[tokio::test]
async fn lookup_before_registration_waits_for_it() {
    let registry = Arc::new(InstanceRegistry::new());
    let waiter = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.get_or_wait(&InstanceKey::from("late")).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished(), "lookup should block until registration");
    assert_eq!(registry.len(), 0, "pending slots are not entries");

    let id = Uuid::new_v4();
    let _ = registry.register(Some("late".into()), id, caps(), backing());

    let entry = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("waiter woke")
        .expect("task joined")
        .expect("entry");
    assert_eq!(entry.id, id);
}

#[tokio::test]
async fn lookup_by_id_waits_for_registration() {
    let registry = Arc::new(InstanceRegistry::new());
    let id = Uuid::new_v4();
    let waiter = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.get_or_wait(&InstanceKey::from(id)).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    let _ = registry.register(None, id, caps(), backing());

    let entry = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("waiter woke")
        .expect("task joined")
        .expect("entry");
    assert_eq!(entry.name, anonymous_name(id));
}

#[tokio::test]
async fn shutdown_interrupts_waiters() {
    let registry = Arc::new(InstanceRegistry::new());
    let waiter = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.get_or_wait(&InstanceKey::from("never")).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    registry.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("waiter woke")
        .expect("task joined");
    assert!(matches!(result, Err(AppError::Interrupted(_))));

    let after = registry.get_or_wait(&InstanceKey::from("never")).await;
    assert!(matches!(after, Err(AppError::Interrupted(_))));
}

#[test]
fn remove_drops_both_keys() {
    let registry = InstanceRegistry::new();
    let id = Uuid::new_v4();
    let _ = registry.register(Some("api".into()), id, caps(), backing());

    let removed = registry.remove(id).expect("entry removed");
    assert_eq!(removed.name, "api");
    assert!(registry.try_get(&InstanceKey::from("api")).is_none());
    assert!(registry.try_get(&InstanceKey::from(id)).is_none());
    assert!(registry.is_empty());

    assert!(registry.remove(id).is_none());
    assert!(registry.remove(Uuid::new_v4()).is_none());
}

#[test]
fn rebinding_a_name_replaces_the_old_instance() {
    let registry = InstanceRegistry::new();
    let old = Uuid::new_v4();
    let new = Uuid::new_v4();
    let _ = registry.register(Some("api".into()), old, caps(), backing());
    let _ = registry.register(Some("api".into()), new, caps(), backing());

    let entry = registry
        .try_get(&InstanceKey::from("api"))
        .expect("name bound");
    assert_eq!(entry.id, new);
    assert!(!registry.contains(old));
    assert_eq!(registry.len(), 1);
}

#[test]
fn lazy_instance_builds_once_and_is_not_rebuilt_after_release() {
    let builds = Arc::new(AtomicUsize::new(0));
    let lazy = {
        let builds = Arc::clone(&builds);
        LazyInstance::new(move || -> ObjectRef {
            builds.fetch_add(1, Ordering::SeqCst);
            Arc::new(Noop)
        })
    };

    assert!(!lazy.is_released());
    let first = lazy.get().expect("built on first access");
    let second = lazy.get().expect("cached while held");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(builds.load(Ordering::SeqCst), 1);

    drop(first);
    drop(second);

    assert!(lazy.is_released());
    assert!(lazy.get().is_none());
    assert_eq!(builds.load(Ordering::SeqCst), 1);
}

#[test]
fn lazy_entry_reports_released_instance_as_absent() {
    let registry = InstanceRegistry::new();
    let id = Uuid::new_v4();
    let lazy = Arc::new(LazyInstance::new(|| -> ObjectRef { Arc::new(Noop) }));
    let entry = registry.register(None, id, caps(), Backing::Lazy(lazy));

    assert!(entry.is_lazy());
    let instance = entry.instance().expect("built");
    drop(instance);
    assert!(entry.instance().is_none());
}
