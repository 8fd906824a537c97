mod common;

use common::{expect_event, expect_no_event, init_tracing, Project, EVENT_TIMEOUT, QUIET_WINDOW};
use regen::{Context, Engine, EngineEvent, EngineOptions};

#[tokio::test]
async fn write_creates_parents_and_emits_write_event() {
    init_tracing();

    let project = Project::new();

    let engine = Engine::new(
        EngineOptions::new(&project.root).name("writer"),
        move |ctx: Context| async move {
            let written = ctx.fs().write("generated/deep/out.txt", b"payload")?;
            Ok(written)
        },
    )
    .unwrap();

    let mut events = engine.events().subscribe();

    assert!(engine.result().await.unwrap(), "first write must happen");
    expect_event(&mut events, EVENT_TIMEOUT, "write event", |e| {
        matches!(e, EngineEvent::Write { path, .. } if path.ends_with("generated/deep/out.txt"))
    })
    .await;

    assert_eq!(
        std::fs::read_to_string(project.path("generated/deep/out.txt")).unwrap(),
        "payload"
    );

    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn identical_contents_skip_the_write() {
    init_tracing();

    let project = Project::new();
    project.write("out.txt", "same");

    let engine = Engine::new(
        EngineOptions::new(&project.root).name("idempotent"),
        move |ctx: Context| async move {
            let written = ctx.fs().write("out.txt", b"same")?;
            Ok(written)
        },
    )
    .unwrap();

    let mut events = engine.events().subscribe();

    assert!(
        !engine.result().await.unwrap(),
        "byte-equal contents must not be rewritten"
    );
    expect_no_event(&mut events, QUIET_WINDOW, "write event for identical bytes", |e| {
        matches!(e, EngineEvent::Write { .. })
    })
    .await;

    // The mtime-visible content is untouched.
    assert_eq!(
        std::fs::read_to_string(project.path("out.txt")).unwrap(),
        "same"
    );

    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn differing_contents_are_rewritten() {
    init_tracing();

    let project = Project::new();
    project.write("out.txt", "old");

    let engine = Engine::new(
        EngineOptions::new(&project.root).name("rewriter"),
        move |ctx: Context| async move {
            let written = ctx.fs().write("out.txt", b"new")?;
            Ok(written)
        },
    )
    .unwrap();

    assert!(engine.result().await.unwrap());
    assert_eq!(
        std::fs::read_to_string(project.path("out.txt")).unwrap(),
        "new"
    );

    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn writes_are_not_self_dependencies() {
    init_tracing();

    let project = Project::new();

    let engine = Engine::new(
        EngineOptions::new(&project.root).watch(true).name("no-self-dep"),
        move |ctx: Context| async move {
            ctx.fs().write("out.txt", b"generated")?;
            Ok(())
        },
    )
    .unwrap();

    let mut events = engine.events().subscribe();
    engine.result().await.unwrap();

    // The engine's own write lands on disk but is not watched; nothing
    // reruns.
    expect_no_event(&mut events, QUIET_WINDOW, "self-triggered rerun", |e| {
        matches!(e, EngineEvent::Start { .. })
    })
    .await;

    engine.destroy().await.unwrap();
}
