use odm_object::{
    async_trait, FailureVisibility, Lifecycle, Model, ObjectConfig, ObjectContext, ObjectError,
    ObjectResult, Phase,
};
use odm_path::Location;
use odm_store::{InMemorySource, ObjectStore, RemoteStore, StaticStore, StoreError};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PageRecord {
    title: String,
    parent: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct PageState {
    slug: String,
    parent_title: Option<String>,
}

struct Page;

#[async_trait]
impl Model for Page {
    const TYPE_NAME: &'static str = "Page";
    type Serialized = PageRecord;
    type Derived = PageState;

    fn init_sync(value: &PageRecord) -> PageState {
        PageState {
            slug: value.title.to_lowercase().replace(' ', "-"),
            parent_title: None,
        }
    }

    async fn init_async(
        value: &PageRecord,
        mut derived: PageState,
        context: &ObjectContext,
    ) -> ObjectResult<PageState> {
        if let Some(parent) = &value.parent {
            let parent = context.object::<Page>(parent).await?;
            parent.ready().await?;
            derived.parent_title = Some(parent.value().title.clone());
        }
        Ok(derived)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Timed {
    label: String,
    delay_ms: u64,
    fail: bool,
}

struct Slow;

#[async_trait]
impl Model for Slow {
    const TYPE_NAME: &'static str = "Slow";
    type Serialized = Timed;
    type Derived = String;

    fn init_sync(value: &Timed) -> String {
        format!("sync:{}", value.label)
    }

    async fn init_async(value: &Timed, _derived: String, _context: &ObjectContext) -> ObjectResult<String> {
        tokio::time::sleep(Duration::from_millis(value.delay_ms)).await;
        if value.fail {
            return Err(ObjectError::init("boom"));
        }
        Ok(format!("async:{}", value.label))
    }
}

fn timed(label: &str, delay_ms: u64) -> Timed {
    Timed {
        label: label.into(),
        delay_ms,
        fail: false,
    }
}

fn site() -> ObjectStore {
    ObjectStore::new(StaticStore::new(json!({
        "site": {
            "pages": {
                "home": { "record": { "title": "Home", "parent": null } },
                "child": {
                    "record": { "title": "Child Page", "parent": "static#site.pages.home.record" }
                }
            }
        }
    })))
}

#[tokio::test(start_paused = true)]
async fn sync_phase_runs_during_construction() {
    let context = ObjectContext::new(site());
    let object = context.construct::<Slow>(timed("a", 50)).unwrap();

    assert_eq!(object.state().phase(), Phase::SyncInitDone);
    assert_eq!(*object.derived(), "sync:a");

    object.ready().await.unwrap();
    assert!(object.is_ready());
    assert_eq!(*object.derived(), "async:a");

    // Settled objects answer immediately
    object.ready().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn waiters_are_released_in_call_order() {
    let context = ObjectContext::new(site());
    let object = context.construct::<Slow>(timed("a", 30)).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for i in 0..3 {
        let object = Arc::clone(&object);
        let order = Arc::clone(&order);
        handles.push(tokio::spawn(async move {
            object.ready().await.unwrap();
            order.lock().push(i);
        }));
        tokio::task::yield_now().await;
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(*order.lock(), vec![0, 1, 2]);
}

#[tokio::test(start_paused = true)]
async fn failure_is_annotated_and_broadcast() {
    let context = ObjectContext::new(site());
    let mut failures = context.failures();

    let value = Timed {
        label: "bad".into(),
        delay_ms: 5,
        fail: true,
    };
    let object = context.construct::<Slow>(value).unwrap();

    let err = object.ready().await.unwrap_err();
    let ObjectError::Failed(shared) = &err else {
        panic!("expected shared failure, got {err:?}");
    };
    match shared.as_ref() {
        ObjectError::InitFailed { type_name, value, .. } => {
            assert_eq!(*type_name, "Slow");
            assert!(value.contains(r#""label":"bad""#));
        }
        other => panic!("expected annotated failure, got {other:?}"),
    }
    assert!(matches!(err.root_cause(), ObjectError::Init(msg) if msg == "boom"));
    assert!(matches!(object.state(), Lifecycle::Failed(_)));

    let broadcast = failures.recv().await.unwrap();
    assert!(Arc::ptr_eq(&broadcast, shared));

    // Later waiters see the same terminal failure
    assert!(object.ready().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn silent_visibility_still_broadcasts() {
    let config = ObjectConfig::new().with_failure_visibility(FailureVisibility::Silent);
    let context = ObjectContext::with_config(site(), config);
    let mut failures = context.failures();

    let object = context
        .construct::<Slow>(Timed {
            label: "quiet".into(),
            delay_ms: 1,
            fail: true,
        })
        .unwrap();

    // Nobody awaits ready(); the failure still surfaces
    let failure = failures.recv().await.unwrap();
    assert!(failure.to_string().contains("Slow"));
    drop(object);
}

#[tokio::test]
async fn identical_values_share_one_instance() {
    let context = ObjectContext::new(site());

    let a = context.construct::<Slow>(timed("same", 0)).unwrap();
    let b = context.construct::<Slow>(timed("same", 0)).unwrap();
    let c = context.construct::<Slow>(timed("other", 0)).unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(context.live_objects(), 2);

    drop((a, b, c));
    assert_eq!(context.live_objects(), 0);
    context.prune();
}

#[tokio::test]
async fn nested_objects_resolve_through_the_store() {
    let context = ObjectContext::new(site());

    let child = context.object::<Page>("static#site.pages.child.record").await.unwrap();
    assert_eq!(child.derived().slug, "child-page");

    child.ready().await.unwrap();
    assert_eq!(child.derived().parent_title.as_deref(), Some("Home"));

    let home = context.object_sync::<Page>("static#site.pages.home.record").unwrap();
    home.ready().await.unwrap();
    assert_eq!(home.value().title, "Home");
}

#[tokio::test]
async fn options_wrap_every_child() {
    let context = ObjectContext::new(site());

    let pages = context.options_sync::<Page>("static#site.pages").unwrap();
    let keys: Vec<_> = pages.keys().cloned().collect();
    assert_eq!(
        keys,
        vec!["static#site.pages.home.record", "static#site.pages.child.record"]
    );

    let again = context.options::<Page>("static#site.pages").await.unwrap();
    assert!(Arc::ptr_eq(
        &pages["static#site.pages.home.record"],
        &again["static#site.pages.home.record"]
    ));
}

#[tokio::test(start_paused = true)]
async fn replace_discards_superseded_generation() {
    let context = ObjectContext::new(site());
    let object = context.construct::<Slow>(timed("a", 100)).unwrap();

    object.replace(timed("b", 10)).unwrap();
    assert_eq!(object.generation(), 1);
    assert_eq!(*object.derived(), "sync:b");

    object.ready().await.unwrap();
    assert_eq!(*object.derived(), "async:b");

    // The first generation settles later and must not overwrite
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(*object.derived(), "async:b");
    assert!(object.is_ready());
    assert_eq!(object.value().label, "b");
}

#[tokio::test(start_paused = true)]
async fn replace_moves_the_registered_identity() {
    let context = ObjectContext::new(site());
    let object = context.construct::<Slow>(timed("one", 0)).unwrap();
    object.replace(timed("two", 0)).unwrap();

    let two = context.construct::<Slow>(timed("two", 0)).unwrap();
    assert!(Arc::ptr_eq(&object, &two));

    let one = context.construct::<Slow>(timed("one", 0)).unwrap();
    assert!(!Arc::ptr_eq(&object, &one));
    assert_eq!(one.value().label, "one");
    assert_eq!(context.live_objects(), 2);
}

#[tokio::test(start_paused = true)]
async fn replace_onto_a_live_value_keeps_that_instance_registered() {
    let context = ObjectContext::new(site());
    let first = context.construct::<Slow>(timed("one", 0)).unwrap();
    let second = context.construct::<Slow>(timed("two", 0)).unwrap();
    first.replace(timed("two", 0)).unwrap();

    let two = context.construct::<Slow>(timed("two", 0)).unwrap();
    assert!(Arc::ptr_eq(&second, &two));

    let one = context.construct::<Slow>(timed("one", 0)).unwrap();
    assert!(!Arc::ptr_eq(&first, &one));
}

#[tokio::test]
async fn sync_resolution_of_remote_location_fails() {
    let source = Arc::new(InMemorySource::with_payload(json!({})));
    let context = ObjectContext::new(site().with_store(Arc::new(RemoteStore::page(source))));
    let err = context.object_sync::<Page>("page#site.pages.home.record").unwrap_err();
    assert!(matches!(err, ObjectError::Store(StoreError::UnsupportedLocation(Location::Page))));

    let err = context.object_sync::<Page>("document#site.pages.home.record").unwrap_err();
    assert!(matches!(err, ObjectError::Store(StoreError::UnsupportedLocation(Location::Document))));
}

#[test]
fn construction_requires_a_runtime() {
    let context = ObjectContext::new(site());
    let err = context.construct::<Slow>(timed("a", 0)).unwrap_err();
    assert!(matches!(err, ObjectError::NoRuntime));
}
