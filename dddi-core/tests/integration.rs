//! Integration Tests for the Binding Engine
//!
//! These tests drive an [`Engine`] through its public surface: scalar and
//! array registrations, async providers, and linked arrays.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use dddi_core::utils::ResizeHooks;
use dddi_core::{
    ChangeDetector, Computation, DddiError, DepSpec, Digest, Engine, ProviderError, ProviderSpec,
    Value,
};
use serde_json::json;
use tokio::sync::oneshot;

type Reply = oneshot::Sender<Result<Value, ProviderError>>;

fn engine(scope: serde_json::Value) -> Engine {
    Engine::new(Value::from(scope)).unwrap()
}

fn set(engine: &Engine, key: &str, value: serde_json::Value) {
    engine
        .scope()
        .as_object()
        .unwrap()
        .insert(key, Value::from(value));
}

/// An async provider over `q` whose computations complete when the test
/// answers them, in any order.
fn deferred_provider(replies: &Rc<RefCell<Vec<Reply>>>) -> ProviderSpec {
    let replies = Rc::clone(replies);
    ProviderSpec::new(["q"], move |_, _| {
        let (tx, rx) = oneshot::channel();
        replies.borrow_mut().push(tx);
        Computation::pending(async move {
            rx.await
                .unwrap_or_else(|_| Err(ProviderError::new("reply dropped")))
        })
    })
}

/// Let every ready task on the engine's local set run.
async fn drain(engine: &Engine) {
    let tasks = engine.local_tasks().unwrap();
    tasks
        .run_until(async {
            for _ in 0..8 {
                tokio::task::yield_now().await;
            }
        })
        .await;
}

fn answer(replies: &Rc<RefCell<Vec<Reply>>>, index: usize, result: Result<Value, ProviderError>) {
    let reply = std::mem::replace(&mut replies.borrow_mut()[index], oneshot::channel().0);
    let _ = reply.send(result);
}

// ----------------------------------------------------------------------------
// Scalar bindings
// ----------------------------------------------------------------------------

/// Test the basic sum scenario end to end.
#[test]
fn sum_follows_its_inputs() {
    let engine = engine(json!({"a": 1, "b": 2}));
    let _sum = engine
        .register(
            "sum",
            ProviderSpec::new(["a", "b"], |_, args| {
                Computation::ready(args.iter().filter_map(Value::as_f64).sum::<f64>())
            }),
        )
        .unwrap();

    // Correct before any digest.
    assert_eq!(engine.scope().get("sum"), Value::from(3));

    set(&engine, "a", json!(5));
    engine.digest().unwrap();
    assert_eq!(engine.scope().get("sum"), Value::from(7));
}

/// Test that an absent required dependency short-circuits the provider.
#[test]
fn required_dependency_short_circuits() {
    let engine = engine(json!({"requiredField": null, "other": 1}));
    let calls = Rc::new(Cell::new(0));
    let calls_clone = Rc::clone(&calls);
    let _out = engine
        .register(
            "out",
            ProviderSpec::new(["requiredField", "?other"], move |_, _| {
                calls_clone.set(calls_clone.get() + 1);
                Computation::ready("ran")
            }),
        )
        .unwrap();
    engine.digest().unwrap();

    assert!(engine.scope().get("out").is_null());
    assert_eq!(calls.get(), 0);

    set(&engine, "requiredField", json!("present"));
    engine.digest().unwrap();
    assert_eq!(engine.scope().get("out"), Value::from("ran"));
    assert_eq!(calls.get(), 1);

    // Back to absent: the last value is replaced by null, not kept.
    set(&engine, "requiredField", json!(null));
    engine.digest().unwrap();
    assert!(engine.scope().get("out").is_null());
    assert_eq!(calls.get(), 1);
}

/// Test that bindings chain through the digest.
#[test]
fn bindings_chain() {
    let engine = engine(json!({"base": 2}));
    let _square = engine
        .register(
            "square",
            ProviderSpec::new(["base"], |_, args| {
                let n = args[0].as_f64().unwrap_or_default();
                Computation::ready(n * n)
            }),
        )
        .unwrap();
    let _label = engine
        .register(
            "view.label",
            ProviderSpec::new(["square"], |_, args| {
                Computation::ready(format!("{} units", args[0].as_f64().unwrap_or_default()))
            }),
        )
        .unwrap();
    assert_eq!(engine.scope().get("view").get("label"), Value::from("4 units"));

    set(&engine, "base", json!(3));
    engine.digest().unwrap();
    assert_eq!(engine.scope().get("view").get("label"), Value::from("9 units"));
}

/// Test a bare function provider and a function dependency.
#[test]
fn function_providers_and_dependencies() {
    let engine = engine(json!({"factor": 10}));
    let external = Rc::new(Cell::new(1.0));

    let external_clone = Rc::clone(&external);
    let _mirror = engine
        .register(
            "mirror",
            ProviderSpec::function(move || Value::from(external_clone.get())),
        )
        .unwrap();

    let external_clone = Rc::clone(&external);
    let _scaled = engine
        .register(
            "scaled",
            ProviderSpec::new(
                [
                    DepSpec::from("factor"),
                    DepSpec::function(move || Value::from(external_clone.get())),
                ],
                |_, args| {
                    let product: f64 = args.iter().filter_map(Value::as_f64).product();
                    Computation::ready(product)
                },
            ),
        )
        .unwrap();
    assert_eq!(engine.scope().get("mirror"), Value::from(1));
    assert_eq!(engine.scope().get("scaled"), Value::from(10));

    external.set(4.0);
    engine.digest().unwrap();
    assert_eq!(engine.scope().get("mirror"), Value::from(4));
    assert_eq!(engine.scope().get("scaled"), Value::from(40));
}

/// Test that comparison modes decide what counts as a change.
#[test]
fn comparison_modes() {
    let engine = engine(json!({"cfg": {"depth": 1}, "tags": ["a"]}));
    let runs = Rc::new(RefCell::new(Vec::new()));

    for (target, dep) in [("byRef", "cfg"), ("byValue", "=cfg"), ("byItems", "@tags")] {
        let runs = Rc::clone(&runs);
        let _registration = engine
            .register(
                target,
                ProviderSpec::new([dep], move |_, _| {
                    runs.borrow_mut().push(target);
                    Computation::ready(true)
                }),
            )
            .unwrap();
    }
    engine.digest().unwrap();
    runs.borrow_mut().clear();

    // In-place nested mutation: only the deep watch sees it.
    engine.scope().get("cfg").as_object().unwrap().insert("depth", Value::from(2));
    engine.digest().unwrap();
    assert_eq!(*runs.borrow(), vec!["byValue"]);
    runs.borrow_mut().clear();

    // In-place element churn: only the shallow-array watch sees it.
    engine.scope().get("tags").as_array().unwrap().push(Value::from("b"));
    engine.digest().unwrap();
    assert_eq!(*runs.borrow(), vec!["byItems"]);
    runs.borrow_mut().clear();

    // A new but equal object: reference changes, value does not.
    set(&engine, "cfg", json!({"depth": 2}));
    engine.digest().unwrap();
    assert_eq!(*runs.borrow(), vec!["byRef"]);
}

/// Test that a failing provider leaves the last committed value in place.
#[test]
fn provider_failure_keeps_last_value() {
    let engine = engine(json!({"n": 4}));
    let _root = engine
        .register(
            "root",
            ProviderSpec::new(["n"], |_, args| match args[0].as_f64() {
                Some(n) if n >= 0.0 => Computation::ready(n.sqrt()),
                _ => Computation::fail("negative input"),
            }),
        )
        .unwrap();
    assert_eq!(engine.scope().get("root"), Value::from(2));

    set(&engine, "n", json!(-1));
    engine.digest().unwrap();
    assert_eq!(engine.scope().get("root"), Value::from(2));
}

/// Test that a target index far past the end of an array fails the commit
/// and leaves the array untouched.
#[test]
fn out_of_range_target_index_is_not_written() {
    let engine = engine(json!({"big": [], "a": 1}));
    let _big = engine
        .register(
            "big[18446744073709551615]",
            ProviderSpec::new(["a"], |_, args| Computation::Ready(args[0].clone())),
        )
        .unwrap();
    assert!(engine.scope().get("big").as_array().unwrap().is_empty());

    set(&engine, "a", json!(2));
    engine.digest().unwrap();
    assert!(engine.scope().get("big").as_array().unwrap().is_empty());
}

/// Test that registration-time errors abort the registration.
#[test]
fn structural_errors_are_synchronous() {
    let engine = engine(json!({}));
    let spec = || ProviderSpec::new(["a"], |_, _| Computation::ready(0));

    assert!(matches!(
        engine.register("true", spec()),
        Err(DddiError::NonWritableTarget { .. })
    ));
    assert!(matches!(
        engine.register("a..b", spec()),
        Err(DddiError::InvalidExpression { .. })
    ));
    assert!(matches!(
        engine.register(
            "out",
            ProviderSpec::new([DepSpec::from(Value::from(1))], |_, _| Computation::ready(0))
        ),
        Err(DddiError::UnsupportedSpecKind { .. })
    ));

    // Nothing was installed.
    assert_eq!(engine.digest().unwrap().fired, 0);
}

/// Test sharing a host-owned digest with the engine.
#[test]
fn host_supplied_detector() {
    let digest = Digest::new();
    let engine = Engine::builder(Value::from(json!({"x": 1})))
        .detector(Rc::new(digest.clone()))
        .build()
        .unwrap();
    let _copy = engine
        .register("copy", ProviderSpec::new(["x"], |_, args| Computation::Ready(args[0].clone())))
        .unwrap();
    assert_eq!(digest.watch_count(), 1);

    set(&engine, "x", json!(2));
    digest.digest().unwrap();
    assert_eq!(engine.scope().get("copy"), Value::from(2));
}

// ----------------------------------------------------------------------------
// Async providers
// ----------------------------------------------------------------------------

/// Test that a later computation wins when it completes first.
#[tokio::test(flavor = "current_thread")]
async fn later_computation_wins_when_it_finishes_first() {
    let engine = engine(json!({"q": "a"}));
    let replies = Rc::new(RefCell::new(Vec::new()));
    let _result = engine.register("result", deferred_provider(&replies)).unwrap();

    set(&engine, "q", json!("b"));
    engine.digest().unwrap();
    let latest = replies.borrow().len() - 1;
    assert!(latest >= 1);

    answer(&replies, latest, Ok(Value::from("B")));
    drain(&engine).await;
    assert_eq!(engine.scope().get("result"), Value::from("B"));

    // Every earlier computation is stale now.
    for index in 0..latest {
        answer(&replies, index, Ok(Value::from("A")));
    }
    drain(&engine).await;
    assert_eq!(engine.scope().get("result"), Value::from("B"));
}

/// Test that an earlier computation completing first is still discarded.
#[tokio::test(flavor = "current_thread")]
async fn earlier_computation_is_discarded_when_it_finishes_first() {
    let engine = engine(json!({"q": "a"}));
    let replies = Rc::new(RefCell::new(Vec::new()));
    let _result = engine.register("result", deferred_provider(&replies)).unwrap();

    set(&engine, "q", json!("b"));
    engine.digest().unwrap();
    let latest = replies.borrow().len() - 1;

    answer(&replies, latest - 1, Ok(Value::from("A")));
    drain(&engine).await;
    assert!(engine.scope().get("result").is_null());

    answer(&replies, latest, Ok(Value::from("B")));
    drain(&engine).await;
    assert_eq!(engine.scope().get("result"), Value::from("B"));
}

/// Test that a failing latest computation leaves the prior value.
#[tokio::test(flavor = "current_thread")]
async fn failed_latest_computation_keeps_prior_value() {
    let engine = engine(json!({"q": "a"}));
    let replies = Rc::new(RefCell::new(Vec::new()));
    let _result = engine.register("result", deferred_provider(&replies)).unwrap();

    answer(&replies, 0, Ok(Value::from("first")));
    drain(&engine).await;
    assert_eq!(engine.scope().get("result"), Value::from("first"));

    set(&engine, "q", json!("b"));
    engine.digest().unwrap();
    let count = replies.borrow().len();
    for index in 1..count - 1 {
        answer(&replies, index, Ok(Value::from("stale")));
    }
    answer(&replies, count - 1, Err(ProviderError::new("backend down")));
    drain(&engine).await;
    assert_eq!(engine.scope().get("result"), Value::from("first"));
}

/// Test that superseded cancellable computations are cancelled.
#[tokio::test(flavor = "current_thread")]
async fn superseded_computations_are_cancelled() {
    let engine = engine(json!({"q": 1}));
    let cancelled = Rc::new(RefCell::new(Vec::new()));
    let started = Rc::new(Cell::new(0));

    let cancelled_clone = Rc::clone(&cancelled);
    let started_clone = Rc::clone(&started);
    let _result = engine
        .register(
            "result",
            ProviderSpec::new(["q"], move |_, args| {
                let id = started_clone.get();
                started_clone.set(id + 1);
                let cancelled = Rc::clone(&cancelled_clone);
                let value = args[0].clone();
                Computation::cancellable(
                    async move { Ok(value) },
                    move || cancelled.borrow_mut().push(id),
                )
            }),
        )
        .unwrap();

    set(&engine, "q", json!(2));
    engine.digest().unwrap();

    // All but the newest were cancelled, oldest first.
    let newest = started.get() - 1;
    assert_eq!(*cancelled.borrow(), (0..newest).collect::<Vec<_>>());

    drain(&engine).await;
    assert_eq!(engine.scope().get("result"), Value::from(2));
}

/// Test that an async commit runs a digest so dependents catch up.
#[tokio::test(flavor = "current_thread")]
async fn async_commit_propagates_to_dependents() {
    let engine = engine(json!({"q": "x"}));
    let replies = Rc::new(RefCell::new(Vec::new()));
    let _result = engine.register("result", deferred_provider(&replies)).unwrap();
    let _shout = engine
        .register(
            "shout",
            ProviderSpec::new(["result"], |_, args| {
                Computation::ready(format!("{}!", args[0].as_str().unwrap_or_default()))
            }),
        )
        .unwrap();
    assert!(engine.scope().get("shout").is_null());

    answer(&replies, 0, Ok(Value::from("hey")));
    drain(&engine).await;
    assert_eq!(engine.scope().get("shout"), Value::from("hey!"));
}

/// Test that unregistering discards results still in flight.
#[tokio::test(flavor = "current_thread")]
async fn unregister_discards_pending_results() {
    let engine = engine(json!({"q": "a"}));
    let replies = Rc::new(RefCell::new(Vec::new()));
    let result = engine.register("result", deferred_provider(&replies)).unwrap();

    result.unregister();
    answer(&replies, 0, Ok(Value::from("late")));
    drain(&engine).await;
    assert!(engine.scope().get("result").is_null());
}

// ----------------------------------------------------------------------------
// Arrays
// ----------------------------------------------------------------------------

/// Test per-item bindings across array growth, shrinkage and unregistration.
#[test]
fn array_bindings_follow_the_array() {
    let engine = engine(json!({
        "currency": "EUR",
        "lines": [{"price": 3, "qty": 2}, {"price": 5, "qty": 1}],
    }));
    let lines = engine.for_array("lines").unwrap();

    let subtotal = lines
        .register(
            "subtotal",
            ProviderSpec::new(["price", "qty"], |_, args| {
                Computation::ready(args.iter().filter_map(Value::as_f64).product::<f64>())
            }),
        )
        .unwrap();
    let _caption = lines
        .register(
            "caption",
            ProviderSpec::new(["$index", "$scope.currency"], |_, args| {
                let index = args[0].as_f64().unwrap_or_default();
                Computation::ready(format!("#{index} in {}", args[1].as_str().unwrap_or_default()))
            }),
        )
        .unwrap();

    let items = || engine.scope().get("lines");
    assert_eq!(items().at(0).get("subtotal"), Value::from(6));
    assert_eq!(items().at(1).get("caption"), Value::from("#1 in EUR"));

    items().as_array().unwrap().push(Value::from(json!({"price": 2, "qty": 2})));
    engine.digest().unwrap();
    assert_eq!(lines.len(), 3);
    assert_eq!(items().at(2).get("subtotal"), Value::from(4));

    set(&engine, "currency", json!("USD"));
    engine.digest().unwrap();
    assert_eq!(items().at(0).get("caption"), Value::from("#0 in USD"));

    subtotal.unregister();
    items().at(0).as_object().unwrap().insert("qty", Value::from(10));
    engine.digest().unwrap();
    assert_eq!(items().at(0).get("subtotal"), Value::from(6));

    items().as_array().unwrap().borrow_mut().truncate(1);
    engine.digest().unwrap();
    assert_eq!(lines.len(), 1);
}

/// Test that a replaced array is picked up through its path.
#[test]
fn replacing_the_array_rebinds_every_slot() {
    let engine = engine(json!({"rows": [{"v": 1}]}));
    let rows = engine.for_array("rows").unwrap();
    let _double = rows
        .register(
            "double",
            ProviderSpec::new(["v"], |_, args| {
                Computation::ready(args[0].as_f64().unwrap_or_default() * 2.0)
            }),
        )
        .unwrap();

    set(&engine, "rows", json!([{"v": 10}, {"v": 20}]));
    engine.digest().unwrap();
    let doubles: Vec<Value> = engine
        .scope()
        .get("rows")
        .as_array()
        .unwrap()
        .to_vec()
        .iter()
        .map(|row| row.get("double"))
        .collect();
    assert_eq!(doubles, vec![Value::from(20), Value::from(40)]);
}

// ----------------------------------------------------------------------------
// Linked arrays
// ----------------------------------------------------------------------------

struct Cells;

impl ResizeHooks<Value> for Cells {
    fn pre_create(&mut self, index: usize, _seq: &[Value]) -> Value {
        Value::from(json!({ "cell": index, "selected": false }))
    }
}

/// Test that a linked array follows its source's length.
#[test]
fn linked_array_tracks_source_length() {
    let engine = engine(json!({"source": ["a", "b"]}));
    let link = engine.link_array("ui.cells", "source", Cells).unwrap();

    let cells = || engine.scope().get("ui").get("cells");
    assert_eq!(cells().as_array().unwrap().len(), 2);

    // Slot state survives growth.
    cells().at(0).as_object().unwrap().insert("selected", Value::from(true));
    engine.scope().get("source").as_array().unwrap().push(Value::from("c"));
    engine.digest().unwrap();
    assert_eq!(cells().as_array().unwrap().len(), 3);
    assert_eq!(cells().at(0).get("selected"), Value::from(true));
    assert_eq!(cells().at(2), Value::from(json!({"cell": 2, "selected": false})));

    link.unwatch();
    engine.scope().get("source").as_array().unwrap().push(Value::from("d"));
    engine.digest().unwrap();
    assert_eq!(cells().as_array().unwrap().len(), 3);
}
