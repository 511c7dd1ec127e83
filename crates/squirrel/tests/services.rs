use serde_json::{Value, json};
use squirrel::host::{Host, ListenerOptions, ManualScheduler, MemoryDocument, NodeKey, Rect};
use squirrel::{Callback, Squirrel, SquirrelConfig, telemetry};
use std::cell::RefCell;
use std::rc::Rc;

struct Page {
    document: Rc<MemoryDocument>,
    scheduler: Rc<ManualScheduler>,
    squirrel: Squirrel,
    menu: NodeKey,
    items: Vec<NodeKey>,
}

/// root > nav#menu > (a.item * 3)
fn page(config: SquirrelConfig) -> Page {
    let _ = env_logger::builder().is_test(true).try_init();
    let document = Rc::new(MemoryDocument::new());
    let scheduler = Rc::new(ManualScheduler::new());
    let menu = document.append_element(NodeKey::ROOT, "nav").unwrap();
    document.set_attribute(menu, "id", "menu").unwrap();
    let items = (0..3_u8)
        .map(|index| {
            let item = document.append_element(menu, "a").unwrap();
            document.set_attribute(item, "class", "item").unwrap();
            document
                .set_rect(item, Rect::new(0.0, f64::from(index) * 20.0, 100.0, 20.0))
                .unwrap();
            item
        })
        .collect();
    let squirrel = Squirrel::new(Host::in_memory(&document, &scheduler), config);
    Page {
        document,
        scheduler,
        squirrel,
        menu,
        items,
    }
}

#[test]
fn widget_reads_are_cached_until_the_menu_changes() {
    let page = page(SquirrelConfig::default());
    let cache = page.squirrel.cache();

    let first = cache.lookup(".item", Some(page.menu)).unwrap();
    assert_eq!(first, Some(page.items[0]));
    assert_eq!(cache.lookup(".item", Some(page.menu)).unwrap(), first);
    assert_eq!(page.document.reads().queries, 1);

    page.document.remove(page.items[0]).unwrap();
    let next = cache.lookup(".item", Some(page.menu)).unwrap();
    assert_eq!(next, Some(page.items[1]));
    assert_eq!(page.document.reads().queries, 2);

    let rect = cache.read_rect(page.items[2]).unwrap();
    assert!((rect.top - 40.0).abs() < f64::EPSILON);
    let metrics = page.squirrel.metrics();
    assert_eq!(metrics.cache.hits, 1);
    assert!(metrics.cache.misses >= 3);
}

#[test]
fn delegated_menu_clicks_reach_the_matched_item() {
    let page = page(SquirrelConfig::default());
    let router = page.squirrel.router();
    let clicked = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&clicked);
    let cleanup = router.delegate(
        page.menu,
        ".item",
        "click",
        Callback::infallible(move |event| {
            sink.borrow_mut()
                .push((event.current_target, event.detail.clone()));
        }),
        None,
    );

    page.document
        .dispatch(page.items[1], "click", json!({ "button": 0 }))
        .unwrap();
    page.document
        .dispatch(page.menu, "click", Value::Null)
        .unwrap();
    assert_eq!(*clicked.borrow(), vec![(page.items[1], json!({ "button": 0 }))]);

    cleanup.run();
    assert_eq!(page.document.total_listeners(), 0);
    assert_eq!(page.squirrel.metrics().router.delegated_calls, 1);
}

#[test]
fn shutdown_releases_every_host_resource() {
    let page = page(SquirrelConfig::default());
    let cache = page.squirrel.cache();
    let router = page.squirrel.router();
    cache.lookup("a", Some(page.menu)).unwrap();
    cache.read_rect(page.items[0]).unwrap();
    router.on(
        page.items[0],
        "focus",
        Callback::infallible(|_| {}),
        ListenerOptions::default(),
    );
    router.on_resize(
        page.items[1],
        Callback::infallible(|_| {}),
        None,
        ListenerOptions::default(),
    );
    assert_ne!(page.document.observer_counts(), (0, 0));
    assert_eq!(page.scheduler.pending_timers(), 2);

    page.squirrel.shutdown();
    assert_eq!(page.document.total_listeners(), 0);
    assert_eq!(page.document.observer_counts(), (0, 0));
    assert_eq!(page.scheduler.pending_timers(), 1);
    assert_eq!(page.squirrel.metrics().cache.entries(), 0);

    assert_eq!(
        cache.lookup("a", Some(page.menu)).unwrap(),
        Some(page.items[0])
    );
}

#[test]
fn dropping_squirrel_cancels_its_timers() {
    let page = page(SquirrelConfig::default());
    page.squirrel
        .router()
        .on_scroll(page.menu, Callback::infallible(|_| {}), None, None);
    assert_eq!(page.scheduler.pending_timers(), 2);
    drop(page.squirrel);
    assert_eq!(page.scheduler.pending_timers(), 0);
    assert_eq!(page.document.total_listeners(), 0);
}

#[test]
fn telemetry_snapshot_is_one_json_line() {
    let page = page(SquirrelConfig {
        telemetry_enabled: true,
        ..SquirrelConfig::default()
    });
    page.squirrel.cache().lookup(".item", None).unwrap();
    let line = telemetry::snapshot_json(&page.squirrel.metrics()).unwrap();
    let parsed: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(parsed["cache"]["misses"], 1);
    assert_eq!(parsed["router"]["delegate_groups"], 0);
    page.squirrel.emit_telemetry();
}
