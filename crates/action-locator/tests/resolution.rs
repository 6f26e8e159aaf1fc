//! End-to-end resolution tests against the in-memory document

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use waypoint_core_types::{ComputedStyle, Display, NodeId, Rect, ResolutionId, Viewport, Visibility};
use waypoint_dom::{Document, ElementSpec, InMemoryDocument, Scope};
use waypoint_locator::*;

fn page(children: Vec<ElementSpec>) -> (Arc<InMemoryDocument>, NodeId) {
    let doc = InMemoryDocument::new(Viewport::default());
    let mut body = ElementSpec::new("body").rect(Rect::new(0.0, 0.0, 1280.0, 800.0));
    for child in children {
        body = body.child(child);
    }
    let body = doc.append_child(doc.root(), body).unwrap();
    (doc, body)
}

fn list_page() -> (Arc<InMemoryDocument>, NodeId) {
    page(vec![ElementSpec::new("ul")
        .id("list")
        .child(ElementSpec::new("li").text("first"))
        .child(ElementSpec::new("li").text("second"))
        .child(ElementSpec::new("li").text("third"))])
}

fn quick() -> Option<WaitConfig> {
    Some(
        WaitConfig::default()
            .with_retry_interval_ms(50)
            .with_mutation_timeout_ms(200),
    )
}

fn labels(result: &ResolutionResult) -> Vec<String> {
    result.attempts.iter().map(Attempt::label).collect()
}

#[derive(Default)]
struct CountingObserver {
    attempts: AtomicUsize,
    retries: AtomicUsize,
    settled: Mutex<Vec<(ResolutionId, bool)>>,
}

impl ResolutionObserver for CountingObserver {
    fn on_attempt(&self, _id: &ResolutionId, _attempt: &Attempt) {
        self.attempts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_retry(&self, _id: &ResolutionId, _trigger: SettleTrigger, _count: u32) {
        self.retries.fetch_add(1, Ordering::SeqCst);
    }

    fn on_settle(&self, id: &ResolutionId, result: &ResolutionResult) {
        self.settled.lock().push((id.clone(), result.succeeded));
    }
}

/// A visible element matched by the primary resolves in one attempt.
#[tokio::test(start_paused = true)]
async fn test_primary_identifier_resolves_immediately() {
    let (doc, _) = page(vec![ElementSpec::new("button").id("save-btn").text("Save")]);
    let engine = LocatorEngine::new(doc.clone());
    let set = SelectorSet::new(SelectorDescriptor::identifier("#save-btn"));

    let result = engine.resolve(&set, Scope::Document, None).await;

    assert!(result.succeeded);
    assert_eq!(
        result.selector_used,
        Some(SelectorUsed::Descriptor(set.primary.clone()))
    );
    assert_eq!(result.attempts.len(), 1);
    assert_eq!(result.total_elapsed_ms, 0);
    assert_eq!(doc.text_content(result.element.unwrap()).as_deref(), Some("Save"));
}

/// An element inserted later is found through the insertion trigger.
#[tokio::test(start_paused = true)]
async fn test_late_insertion_settles_on_mutation() {
    let (doc, body) = page(vec![]);
    let engine = LocatorEngine::new(doc.clone());
    let set = SelectorSet::new(SelectorDescriptor::identifier("#save-btn"));

    let writer = doc.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(800)).await;
        writer
            .append_child(body, ElementSpec::new("button").id("save-btn"))
            .unwrap();
    });

    let config = WaitConfig {
        max_retries: 10,
        retry_interval_ms: 500,
        mutation_timeout_ms: 5000,
    };
    let result = engine.resolve(&set, Scope::Document, Some(config)).await;

    assert!(result.succeeded);
    assert_eq!(result.settled_by, Some(SettleTrigger::Mutation));
    assert_eq!(result.total_elapsed_ms, 800);
    assert_eq!(labels(&result), vec!["primary", "wait-retry"]);
    // Initial, the 500ms poll, then the insertion.
    assert_eq!(result.retries, 3);
    assert!(!result.timed_out);
    assert_eq!(doc.subscriber_count(), 0);
}

/// A hidden element that becomes visible through a style change is picked up
/// by the polling trigger; style changes alone never wake the race.
#[tokio::test(start_paused = true)]
async fn test_style_reveal_settles_on_poll() {
    let hidden = ComputedStyle {
        display: Display::None,
        ..ComputedStyle::default()
    };
    let (doc, _) = page(vec![ElementSpec::new("button").id("save-btn").style(hidden)]);
    let button = doc.query_first("#save-btn").unwrap().unwrap();
    let engine = LocatorEngine::new(doc.clone());
    let observer = Arc::new(CountingObserver::default());
    let engine = engine.with_observer(observer.clone());
    let set = SelectorSet::new(SelectorDescriptor::identifier("#save-btn"));

    let writer = doc.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(700)).await;
        writer.set_style(button, ComputedStyle::default()).unwrap();
    });

    let result = engine.resolve(&set, Scope::Document, None).await;

    assert!(result.succeeded);
    assert_eq!(result.element, Some(button));
    assert_eq!(result.settled_by, Some(SettleTrigger::Poll));
    assert_eq!(result.total_elapsed_ms, 1000);
    // Initial, the 500ms poll, then the 1000ms poll.
    assert_eq!(result.retries, 3);
    assert_eq!(observer.retries.load(Ordering::SeqCst), 3);
    assert_eq!(labels(&result), vec!["primary", "wait-retry"]);
    assert!(!result.timed_out);
    assert_eq!(doc.subscriber_count(), 0);
}

/// The structural layer picks the zero-based child of the parent.
#[tokio::test(start_paused = true)]
async fn test_structural_layer_picks_indexed_child() {
    let (doc, _) = list_page();
    let engine = LocatorEngine::new(doc.clone());
    let set = SelectorSet::new(SelectorDescriptor::identifier("missing"))
        .with_structural(StructuralSpec::new("#list", 2));

    let result = engine.resolve(&set, Scope::Document, quick()).await;

    assert!(result.succeeded);
    assert_eq!(labels(&result), vec!["primary", "structural"]);
    assert!(matches!(result.selector_used, Some(SelectorUsed::Structural(_))));
    assert_eq!(doc.text_content(result.element.unwrap()).as_deref(), Some("third"));
}

/// An out-of-range child index fails the structural layer and moves on to waiting.
#[tokio::test(start_paused = true)]
async fn test_structural_miss_enters_wait_phase() {
    let (doc, _) = list_page();
    let engine = LocatorEngine::new(doc.clone());
    let set = SelectorSet::new(SelectorDescriptor::identifier("missing"))
        .with_structural(StructuralSpec::new("#list", 5));

    let result = engine.resolve(&set, Scope::Document, quick()).await;

    assert!(!result.succeeded);
    assert_eq!(labels(&result), vec!["primary", "structural", "wait-retry"]);
    assert!(result.timed_out);
    assert_eq!(result.settled_by, Some(SettleTrigger::Timeout));
}

/// A bare test-id primary scores exactly half.
#[test]
fn test_bare_test_id_set_scores_half() {
    let set: SelectorSet =
        serde_json::from_str(r#"{"primary": {"kind": "test-id", "value": "save"}, "fallbacks": []}"#)
            .unwrap();
    assert_eq!(score_set(&set), 0.5);
}

/// The primary wins whenever it resolves, even if a fallback would too.
#[tokio::test(start_paused = true)]
async fn test_primary_has_priority_over_fallbacks() {
    let (doc, _) = page(vec![
        ElementSpec::new("button").attr("data-testid", "save").text("Save"),
        ElementSpec::new("button").id("save-btn").text("Save as"),
    ]);
    let engine = LocatorEngine::new(doc.clone());
    let set = SelectorSet::new(SelectorDescriptor::test_id("save"))
        .with_fallback(SelectorDescriptor::identifier("save-btn"))
        .with_text_match(TextMatchSpec::exact("Save as"));

    let result = engine.resolve(&set, Scope::Document, None).await;
    assert_eq!(
        result.selector_used,
        Some(SelectorUsed::Descriptor(set.primary.clone()))
    );
    assert_eq!(labels(&result), vec!["primary"]);

    // With the primary gone, fallbacks run in declared order before text.
    let set = SelectorSet::new(SelectorDescriptor::test_id("gone"))
        .with_fallback(SelectorDescriptor::class("nope"))
        .with_fallback(SelectorDescriptor::identifier("save-btn"))
        .with_text_match(TextMatchSpec::exact("Save"));
    let result = engine.resolve(&set, Scope::Document, None).await;
    assert_eq!(labels(&result), vec!["primary", "fallback[0]", "fallback[1]"]);
    assert_eq!(
        result.selector_used,
        Some(SelectorUsed::Descriptor(SelectorDescriptor::identifier(
            "save-btn"
        )))
    );
    assert_eq!(result.failed_attempt_count, 2);
}

/// Many insertions and poll ticks still settle exactly once, and nothing fires afterwards.
#[tokio::test(start_paused = true)]
async fn test_settles_exactly_once_and_tears_down() {
    let (doc, body) = page(vec![]);
    let observer = Arc::new(CountingObserver::default());
    let engine = LocatorEngine::new(doc.clone()).with_observer(observer.clone());
    let set = SelectorSet::new(SelectorDescriptor::test_id("target"));

    let writer = doc.clone();
    tokio::spawn(async move {
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            writer.append_child(body, ElementSpec::new("div")).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(900)).await;
        writer
            .append_child(body, ElementSpec::new("button").attr("data-testid", "target"))
            .unwrap();
    });

    let result = engine.resolve(&set, Scope::Document, None).await;
    assert!(result.succeeded);
    assert_eq!(result.settled_by, Some(SettleTrigger::Mutation));
    assert_eq!(result.total_elapsed_ms, 1200);
    // Initial, three insertions, polls at 500 and 1000, the final insertion.
    assert_eq!(result.retries, 7);
    assert_eq!(observer.retries.load(Ordering::SeqCst), 7);
    assert_eq!(observer.settled.lock().len(), 1);
    assert_eq!(doc.subscriber_count(), 0);

    // Post-settlement activity must not reach the finished resolution.
    doc.append_child(body, ElementSpec::new("button").attr("data-testid", "target"))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(observer.retries.load(Ordering::SeqCst), 7);
    assert_eq!(observer.settled.lock().len(), 1);
    assert_eq!(observer.attempts.load(Ordering::SeqCst), result.attempts.len());
}

/// With nothing ever matching, the timeout ends the call regardless of the retry budget.
#[tokio::test(start_paused = true)]
async fn test_timeout_backstop_ignores_retry_budget() {
    let (doc, _) = list_page();
    let engine = LocatorEngine::new(doc.clone());
    let set = SelectorSet::new(SelectorDescriptor::identifier("never"))
        .with_fallback(SelectorDescriptor::xpath_query("//button"));

    for max_retries in [0, 1, 10, 1000] {
        let config = WaitConfig::default().with_max_retries(max_retries);
        let result = engine.resolve(&set, Scope::Document, Some(config)).await;
        assert!(!result.succeeded);
        assert!(result.timed_out, "max_retries={max_retries}");
        assert_eq!(result.total_elapsed_ms, 5000);
        assert_eq!(result.settled_by, Some(SettleTrigger::Timeout));
        assert!(!result.suggestions.is_empty());
        assert_eq!(doc.subscriber_count(), 0);
    }
}

/// Insertions beyond the budget end the wait early, without a timeout.
#[tokio::test(start_paused = true)]
async fn test_retry_budget_exhaustion_is_not_a_timeout() {
    let (doc, body) = page(vec![]);
    let engine = LocatorEngine::new(doc.clone());
    let set = SelectorSet::new(SelectorDescriptor::identifier("never"));

    let writer = doc.clone();
    tokio::spawn(async move {
        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.append_child(body, ElementSpec::new("span")).unwrap();
        }
    });

    let config = WaitConfig::default().with_max_retries(3);
    let result = engine.resolve(&set, Scope::Document, Some(config)).await;
    assert!(!result.succeeded);
    assert!(!result.timed_out);
    assert_eq!(result.settled_by, Some(SettleTrigger::RetryBudget));
    assert_eq!(result.total_elapsed_ms, 30);
}

/// Hidden, empty, transparent or far-away elements are never returned.
#[tokio::test(start_paused = true)]
async fn test_invalid_targets_are_never_returned() {
    let hidden = |style: ComputedStyle| {
        ElementSpec::new("button")
            .attr("data-testid", "target")
            .style(style)
    };
    let (doc, _) = page(vec![
        ElementSpec::new("button")
            .attr("data-testid", "target")
            .rect(Rect::new(0.0, 0.0, 0.0, 0.0)),
        hidden(ComputedStyle {
            display: Display::None,
            ..ComputedStyle::default()
        }),
        hidden(ComputedStyle {
            visibility: Visibility::Hidden,
            ..ComputedStyle::default()
        }),
        hidden(ComputedStyle {
            opacity: 0.0,
            ..ComputedStyle::default()
        }),
        ElementSpec::new("button")
            .attr("data-testid", "target")
            .rect(Rect::new(0.0, 10_000.0, 80.0, 20.0)),
    ]);
    let engine = LocatorEngine::new(doc.clone());
    let set = SelectorSet::new(SelectorDescriptor::test_id("target"))
        .with_fallback(SelectorDescriptor::path_query("button"))
        .with_text_match(TextMatchSpec::partial(""))
        .with_structural(StructuralSpec::new("body", 0));

    let result = engine.resolve(&set, Scope::Document, quick()).await;
    assert!(!result.succeeded);
    assert!(result.element.is_none());

    // A valid duplicate later in the document is picked over the invalid ones.
    let body = doc.query_first("body").unwrap().unwrap();
    let good = doc
        .append_child(
            body,
            ElementSpec::new("button")
                .attr("data-testid", "target")
                .rect(Rect::new(10.0, 10.0, 80.0, 20.0)),
        )
        .unwrap();
    let result = engine.resolve(&set, Scope::Document, quick()).await;
    assert_eq!(result.element, Some(good));
}

/// Scores stay in bounds for every descriptor kind.
#[test]
fn test_scores_are_bounded() {
    let descriptors = vec![
        SelectorDescriptor::identifier("#a1b2c3d4e5f6"),
        SelectorDescriptor::class(".x"),
        SelectorDescriptor::attribute("role", "button"),
        SelectorDescriptor::custom_attribute("data-qa", "save"),
        SelectorDescriptor::accessibility_label("Save"),
        SelectorDescriptor::test_id("save"),
        SelectorDescriptor::path_query("a b c d e f g h i j k l m n o p"),
        SelectorDescriptor::xpath_query("/html/body/div[1]/div[2]/div[3]/span[4]"),
    ];
    for descriptor in &descriptors {
        let value = score(descriptor);
        assert!((0.0..=1.0).contains(&value), "{descriptor}: {value}");
    }
    let generated = score(&SelectorDescriptor::class("sc-AxjAm9"));
    let semantic = score(&SelectorDescriptor::class("nav-link"));
    assert!(generated < semantic);
}

/// Destroying the engine aborts in-flight waits and refuses new calls.
#[tokio::test(start_paused = true)]
async fn test_destroy_aborts_in_flight_resolutions() {
    let (doc, _) = page(vec![]);
    let observer = Arc::new(CountingObserver::default());
    let engine = Arc::new(LocatorEngine::new(doc.clone()).with_observer(observer.clone()));
    let set = SelectorSet::new(SelectorDescriptor::identifier("never"));

    let pending = {
        let engine = engine.clone();
        let set = set.clone();
        tokio::spawn(async move { engine.resolve(&set, Scope::Document, None).await })
    };
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(doc.subscriber_count(), 1);
    engine.destroy();

    let result = pending.await.unwrap();
    assert!(!result.succeeded);
    assert!(!result.timed_out);
    assert_eq!(result.settled_by, Some(SettleTrigger::Aborted));
    assert!(result
        .error_message
        .as_deref()
        .unwrap()
        .to_lowercase()
        .contains("resolution aborted"));
    assert_eq!(result.total_elapsed_ms, 1000);
    assert_eq!(doc.subscriber_count(), 0);

    let later = engine.resolve(&set, Scope::Document, None).await;
    assert!(!later.succeeded);
    assert!(later.attempts.is_empty());
    assert_eq!(observer.settled.lock().len(), 2);
}

/// Dropping the resolve future releases the subscription and timers.
#[tokio::test(start_paused = true)]
async fn test_dropped_resolution_releases_subscription() {
    let (doc, _) = page(vec![]);
    let engine = LocatorEngine::new(doc.clone());
    let set = SelectorSet::new(SelectorDescriptor::identifier("never"));

    let outcome = tokio::time::timeout(
        Duration::from_millis(300),
        engine.resolve(&set, Scope::Document, None),
    )
    .await;
    assert!(outcome.is_err());
    assert_eq!(doc.subscriber_count(), 0);
}

/// Concurrent calls run independent races.
#[tokio::test(start_paused = true)]
async fn test_concurrent_resolutions_are_independent() {
    let (doc, body) = page(vec![]);
    let observer = Arc::new(CountingObserver::default());
    let engine = LocatorEngine::new(doc.clone()).with_observer(observer.clone());
    let found = SelectorSet::new(SelectorDescriptor::identifier("late"));
    let missing = SelectorSet::new(SelectorDescriptor::identifier("never"));

    let writer = doc.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        writer
            .append_child(body, ElementSpec::new("div").id("late"))
            .unwrap();
    });

    let config = WaitConfig::default().with_mutation_timeout_ms(1000);
    let (a, b) = tokio::join!(
        engine.resolve(&found, Scope::Document, Some(config)),
        engine.resolve(&missing, Scope::Document, Some(config)),
    );
    assert!(a.succeeded);
    assert_eq!(a.total_elapsed_ms, 300);
    assert!(!b.succeeded);
    assert!(b.timed_out);
    assert_ne!(a.resolution_id, b.resolution_id);
    assert_eq!(a.attempts.len(), 2);
    assert_eq!(b.attempts.len(), 2);

    let settled = observer.settled.lock();
    assert_eq!(settled.len(), 2);
    assert!(settled.contains(&(a.resolution_id.clone(), true)));
    assert!(settled.contains(&(b.resolution_id.clone(), false)));
}

/// Matches are confined to the scope element.
#[tokio::test(start_paused = true)]
async fn test_scope_limits_matches() {
    let (doc, _) = page(vec![
        ElementSpec::new("section")
            .id("left")
            .child(ElementSpec::new("button").class("action").text("Left")),
        ElementSpec::new("section")
            .id("right")
            .child(ElementSpec::new("button").class("action").text("Right")),
    ]);
    let engine = LocatorEngine::new(doc.clone());
    let right = doc.query_first("#right").unwrap().unwrap();
    let set = SelectorSet::new(SelectorDescriptor::class("action"));

    let result = engine.resolve(&set, Scope::Element(right), None).await;
    assert!(result.succeeded);
    assert_eq!(doc.text_content(result.element.unwrap()).as_deref(), Some("Right"));
}

/// Text matching prefers exact matches and falls back to substrings.
#[tokio::test(start_paused = true)]
async fn test_text_layer_matches_exact_then_partial() {
    let (doc, _) = page(vec![
        ElementSpec::new("a").text("Sign in to continue"),
        ElementSpec::new("button").text("Sign in"),
    ]);
    let engine = LocatorEngine::new(doc.clone());
    let set = SelectorSet::new(SelectorDescriptor::test_id("login")).with_text_match(TextMatchSpec {
        exact_text: Some("Sign in".into()),
        partial_text: Some("sign in".into()),
        scope_selector: None,
    });
    let result = engine.resolve(&set, Scope::Document, None).await;
    assert_eq!(doc.tag_name(result.element.unwrap()).as_deref(), Some("button"));

    let set = SelectorSet::new(SelectorDescriptor::test_id("login"))
        .with_text_match(TextMatchSpec::partial("TO CONTINUE"));
    let result = engine.resolve(&set, Scope::Document, None).await;
    assert_eq!(doc.tag_name(result.element.unwrap()).as_deref(), Some("a"));
    assert_eq!(labels(&result), vec!["primary", "text-match"]);
}
