mod common;

use std::sync::{Arc, Mutex};

use common::{expect_event, expect_no_event, init_tracing, is_finish, is_start, Project, EVENT_TIMEOUT, QUIET_WINDOW};
use regen::{Context, Engine, EngineOptions};

#[tokio::test]
async fn existence_probe_reruns_when_the_path_appears() {
    init_tracing();

    let project = Project::new();
    let seen: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));

    let engine = {
        let seen = Arc::clone(&seen);
        Engine::new(
            EngineOptions::new(&project.root).watch(true).name("prober"),
            move |ctx: Context| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().unwrap().push(ctx.fs().exists("flag.txt"));
                    Ok(())
                }
            },
        )
        .unwrap()
    };

    let mut events = engine.events().subscribe();
    expect_event(&mut events, EVENT_TIMEOUT, "first finish", is_finish).await;
    assert_eq!(seen.lock().unwrap().as_slice(), &[false]);

    project.write("flag.txt", "here");
    expect_event(&mut events, EVENT_TIMEOUT, "rerun finish", is_finish).await;

    common::wait_until(EVENT_TIMEOUT, "second probe recorded", || {
        seen.lock().unwrap().len() >= 2
    })
    .await;
    assert_eq!(seen.lock().unwrap().last(), Some(&true));

    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn existence_probe_ignores_content_changes() {
    init_tracing();

    let project = Project::new();
    project.write("flag.txt", "v1");

    let engine = Engine::new(
        EngineOptions::new(&project.root).watch(true).name("prober-quiet"),
        move |ctx: Context| async move {
            ctx.fs().exists("flag.txt");
            Ok(())
        },
    )
    .unwrap();

    let mut events = engine.events().subscribe();
    expect_event(&mut events, EVENT_TIMEOUT, "first finish", is_finish).await;

    // Existence was probed, contents were not read.
    std::fs::write(project.path("flag.txt"), "v2").unwrap();
    expect_no_event(&mut events, QUIET_WINDOW, "rerun for content change", is_start).await;

    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn directory_probe_ignores_file_creation() {
    init_tracing();

    let project = Project::new();

    let engine = Engine::new(
        EngineOptions::new(&project.root).watch(true).name("dir-prober"),
        move |ctx: Context| async move {
            ctx.fs().directory_exists("maybe");
            Ok(())
        },
    )
    .unwrap();

    let mut events = engine.events().subscribe();
    expect_event(&mut events, EVENT_TIMEOUT, "first finish", is_finish).await;

    // A file of the probed name is not a directory.
    project.write("maybe", "i am a file");
    expect_no_event(&mut events, QUIET_WINDOW, "rerun for file add", is_start).await;

    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn missing_read_target_reruns_once_created() {
    init_tracing();

    let project = Project::new();
    let seen: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));

    let engine = {
        let seen = Arc::clone(&seen);
        Engine::new(
            EngineOptions::new(&project.root).watch(true).name("try-reader"),
            move |ctx: Context| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock()
                        .unwrap()
                        .push(ctx.fs().try_read_to_string("gen/out.txt"));
                    Ok(())
                }
            },
        )
        .unwrap()
    };

    let mut events = engine.events().subscribe();
    expect_event(&mut events, EVENT_TIMEOUT, "first finish", is_finish).await;
    assert_eq!(seen.lock().unwrap().as_slice(), &[None]);

    // The target and its parent directory did not exist; the fallback
    // ancestors keep the path observable.
    project.write("gen/out.txt", "built");
    expect_event(&mut events, EVENT_TIMEOUT, "rerun finish", is_finish).await;

    common::wait_until(EVENT_TIMEOUT, "second read recorded", || {
        seen.lock().unwrap().len() >= 2
    })
    .await;
    assert_eq!(
        seen.lock().unwrap().last().cloned().unwrap(),
        Some("built".to_string())
    );

    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn initial_watch_list_is_honored() {
    init_tracing();

    let project = Project::new();
    project.write("watched.cfg", "v1");
    let run_count = Arc::new(Mutex::new(0u32));

    let engine = {
        let run_count = Arc::clone(&run_count);
        Engine::new(
            EngineOptions::new(&project.root)
                .watch_initial(["watched.cfg"])
                .name("initial"),
            move |_ctx: Context| {
                let run_count = Arc::clone(&run_count);
                async move {
                    *run_count.lock().unwrap() += 1;
                    Ok(())
                }
            },
        )
        .unwrap()
    };

    let mut events = engine.events().subscribe();
    expect_event(&mut events, EVENT_TIMEOUT, "first finish", is_finish).await;

    // The body never touched the file; the option-provided watch still
    // reruns.
    std::fs::write(project.path("watched.cfg"), "v2").unwrap();
    expect_event(&mut events, EVENT_TIMEOUT, "rerun finish", is_finish).await;
    assert!(*run_count.lock().unwrap() >= 2);

    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn negated_initial_watch_entries_are_rejected() {
    init_tracing();

    let project = Project::new();
    let result = Engine::new(
        EngineOptions::new(&project.root)
            .watch_initial(["!nope"])
            .name("invalid"),
        move |_ctx: Context| async move { Ok(()) },
    );

    assert!(matches!(
        result,
        Err(regen::EngineError::InvalidWatchPattern(_))
    ));
}
