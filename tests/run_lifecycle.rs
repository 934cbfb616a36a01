use std::sync::{Arc, Mutex};

use expvisor::{
    Event, EventKind, Experiment, ExperimentError, ListenerFn, Params, ParamsetContext,
    RunStatus, RunnerConfig, Status, StepRegistry, Topic,
};
use serde_json::json;

fn config(dir: &tempfile::TempDir) -> RunnerConfig {
    RunnerConfig {
        handle_signals: false,
        cache_dir: dir.path().to_path_buf(),
        ..RunnerConfig::default()
    }
}

/// Collects every delivered event.
fn recorder() -> (Arc<Mutex<Vec<Event>>>, expvisor::ListenerRef) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener = ListenerFn::arc("recorder", move |ev: &Event| {
        sink.lock().unwrap().push(ev.clone());
    });
    (seen, listener)
}

fn count(events: &[Event], kind: EventKind) -> usize {
    events.iter().filter(|e| e.kind == kind).count()
}

#[tokio::test]
async fn failing_paramset_ends_run_with_errors() {
    let dir = tempfile::tempdir().unwrap();
    let (seen, listener) = recorder();

    let experiment = Experiment::builder("lifecycle_mixed")
        .paramsets([("a", json!({"x": 1})), ("b", json!({"x": 2})), ("c", json!({"x": 3}))])
        .on_event(Topic::Any, listener)
        .function(|ctx: ParamsetContext, params: Params| async move {
            if ctx.paramset() == "b" {
                return Err(ExperimentError::fail("b is broken"));
            }
            let x: i64 = params.get("x")?;
            Ok::<_, ExperimentError>(json!(x * 10))
        })
        .build()
        .unwrap();

    let report = experiment.run(config(&dir)).await.unwrap();

    assert_eq!(report.status, RunStatus::EndedWithErrors);
    let mut finished = report.finished().to_vec();
    finished.sort();
    assert_eq!(finished, vec!["a", "c"]);
    assert_eq!(report.failed(), ["b"]);
    assert!(report.state.running.is_empty());
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.results["a"], json!(10));
    assert_eq!(report.results["c"], json!(30));
    assert!(!report.results.contains_key("b"));

    let events = seen.lock().unwrap();
    assert_eq!(count(&events, EventKind::ParamsetEnd), 3);
    assert_eq!(count(&events, EventKind::ParamsetError), 1);
    assert_eq!(count(&events, EventKind::ExperimentSuccess), 0);
    assert_eq!(events.last().map(|e| e.kind), Some(EventKind::ExperimentEnd));
    assert!(events.iter().all(Event::is_generic));
}

#[tokio::test]
async fn single_paramset_emits_full_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let (seen, listener) = recorder();

    let mut steps = StepRegistry::new();
    let prepare = steps.register("prepare");
    let compute = steps.register("compute");

    let experiment = Experiment::builder("lifecycle_sequence")
        .paramset("only", json!({}))
        .steps(steps)
        .on_event(Topic::Any, listener)
        .function(move |ctx: ParamsetContext, _params: Params| {
            let (prepare, compute) = (prepare.clone(), compute.clone());
            async move {
                prepare.run(&ctx, async { Ok::<_, ExperimentError>(()) }).await?;
                let v = compute.run(&ctx, async { Ok::<_, ExperimentError>(42) }).await?;
                Ok::<_, ExperimentError>(json!(v))
            }
        })
        .build()
        .unwrap();

    let report = experiment.run(config(&dir)).await.unwrap();
    assert_eq!(report.status, RunStatus::Successful);

    let kinds: Vec<EventKind> = seen.lock().unwrap().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::ExperimentStart,
            EventKind::ParamsetStart,
            EventKind::StepStart,
            EventKind::StepSuccess,
            EventKind::StepEnd,
            EventKind::StepStart,
            EventKind::StepSuccess,
            EventKind::StepEnd,
            EventKind::ParamsetSuccess,
            EventKind::ParamsetEnd,
            EventKind::ExperimentSuccess,
            EventKind::ExperimentEnd,
        ]
    );

    let only = &report.state.paramsets["only"];
    assert_eq!(only.status, Status::Successful);
    assert!(only.steps.values().all(|s| s.status == Status::Successful));
}

#[tokio::test]
async fn every_paramset_ends_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let (seen, listener) = recorder();

    let experiment = Experiment::builder("lifecycle_many")
        .paramsets((0..12).map(|i| (format!("p{i}"), json!({ "i": i }))))
        .n_jobs(3)
        .on_event(EventKind::ParamsetEnd, listener)
        .function(|_ctx: ParamsetContext, params: Params| async move {
            let i: u64 = params.get("i")?;
            tokio::time::sleep(std::time::Duration::from_millis(i % 4)).await;
            if i % 5 == 0 {
                return Err(ExperimentError::fail("multiple of five"));
            }
            Ok::<_, ExperimentError>(json!(i))
        })
        .build()
        .unwrap();

    let report = experiment.run(config(&dir)).await.unwrap();

    let ends = seen.lock().unwrap();
    assert_eq!(ends.len(), 12);
    assert!(ends.iter().all(|e| e.kind == EventKind::ParamsetEnd));
    assert!(report.state.running.is_empty());
    assert_eq!(report.finished().len() + report.failed().len(), 12);
    for name in report.state.paramsets.keys() {
        let in_finished = report.finished().contains(name);
        let in_failed = report.failed().contains(name);
        assert!(in_finished ^ in_failed, "{name} must be finished xor failed");
    }
    assert_eq!(report.failed().len(), 3);
}

#[tokio::test]
async fn failing_step_stops_later_steps() {
    let dir = tempfile::tempdir().unwrap();

    let mut steps = StepRegistry::new();
    let load = steps.register("load");
    let train = steps.register("train");

    let experiment = Experiment::builder("lifecycle_step_failure")
        .paramsets([("good", json!({"ok": true})), ("bad", json!({"ok": false}))])
        .steps(steps)
        .function(move |ctx: ParamsetContext, params: Params| {
            let (load, train) = (load.clone(), train.clone());
            async move {
                let ok: bool = params.get("ok")?;
                load.run(&ctx, async move {
                    if ok { Ok(()) } else { Err("disk unavailable") }
                })
                .await?;
                train.run(&ctx, async { Ok::<_, ExperimentError>(()) }).await?;
                Ok::<_, ExperimentError>(json!(null))
            }
        })
        .build()
        .unwrap();

    let report = experiment.run(config(&dir)).await.unwrap();

    let bad = &report.state.paramsets["bad"];
    assert_eq!(bad.status, Status::Failed);
    assert_eq!(bad.steps["load"].status, Status::Failed);
    assert_eq!(bad.steps["train"].status, Status::NotStarted);
    let err = bad.error.as_ref().unwrap();
    assert!(err.message.contains("disk unavailable"));

    let good = &report.state.paramsets["good"];
    assert_eq!(good.status, Status::Successful);
    assert_eq!(good.steps["train"].status, Status::Successful);
}

#[tokio::test]
async fn panicking_body_is_reported_as_failure() {
    let dir = tempfile::tempdir().unwrap();

    let experiment = Experiment::builder("lifecycle_panic")
        .paramsets([("calm", json!({})), ("boom", json!({}))])
        .function(|ctx: ParamsetContext, _params: Params| async move {
            if ctx.paramset() == "boom" {
                panic!("exploded");
            }
            Ok::<_, ExperimentError>(json!("calm"))
        })
        .build()
        .unwrap();

    let report = experiment.run(config(&dir)).await.unwrap();
    assert_eq!(report.status, RunStatus::EndedWithErrors);
    assert_eq!(report.failed(), ["boom"]);
    let err = report.state.paramsets["boom"].error.as_ref().unwrap();
    assert!(err.message.contains("exploded"));
}

#[tokio::test]
async fn panicking_step_ends_failed() {
    let dir = tempfile::tempdir().unwrap();
    let (seen, listener) = recorder();

    let mut steps = StepRegistry::new();
    let fit = steps.register("fit");

    let experiment = Experiment::builder("lifecycle_step_panic")
        .paramset("only", json!({}))
        .steps(steps)
        .on_event(Topic::Any, listener)
        .function(move |ctx: ParamsetContext, _params: Params| {
            let fit = fit.clone();
            async move {
                fit.run(&ctx, async {
                    if true {
                        panic!("nan");
                    }
                    Ok::<_, ExperimentError>(())
                })
                .await?;
                Ok::<_, ExperimentError>(json!(null))
            }
        })
        .build()
        .unwrap();

    let report = experiment.run(config(&dir)).await.unwrap();

    let only = &report.state.paramsets["only"];
    assert_eq!(only.status, Status::Failed);
    assert_eq!(only.steps["fit"].status, Status::Failed);
    assert!(only.error.as_ref().unwrap().message.contains("nan"));

    let kinds: Vec<EventKind> = seen.lock().unwrap().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::ExperimentStart,
            EventKind::ParamsetStart,
            EventKind::StepStart,
            EventKind::StepError,
            EventKind::StepEnd,
            EventKind::ParamsetError,
            EventKind::ParamsetEnd,
            EventKind::ExperimentEnd,
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn named_end_of_every_paramset_is_delivered() {
    let dir = tempfile::tempdir().unwrap();

    for round in 0..20 {
        let (named, listener) = recorder();
        let names: Vec<String> = (0..8).map(|i| format!("p{i}")).collect();

        let mut builder = Experiment::builder(format!("lifecycle_named_all_{round}"))
            .paramsets(names.iter().map(|n| (n.clone(), json!({}))))
            .n_jobs(8);
        for name in &names {
            builder = builder.on_event(
                Topic::specific(name, EventKind::ParamsetEnd),
                Arc::clone(&listener),
            );
        }
        let experiment = builder
            .function(|_ctx: ParamsetContext, _params: Params| async move {
                tokio::task::yield_now().await;
                Ok::<_, ExperimentError>(json!(null))
            })
            .build()
            .unwrap();

        experiment.run(config(&dir)).await.unwrap();
        assert_eq!(named.lock().unwrap().len(), names.len(), "round {round}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_keep_their_own_offset() {
    let dir = tempfile::tempdir().unwrap();

    let run_with = |name: &'static str, offset: i32| {
        let (seen, listener) = recorder();
        let cfg = RunnerConfig {
            utc_offset_secs: offset,
            ..config(&dir)
        };
        let experiment = Experiment::builder(name)
            .paramsets((0..4).map(|i| (format!("p{i}"), json!({}))))
            .on_event(Topic::Any, listener)
            .function(|_ctx: ParamsetContext, _params: Params| async move {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                Ok::<_, ExperimentError>(json!(null))
            })
            .build()
            .unwrap();
        (seen, experiment.run(cfg))
    };

    let (east, east_run) = run_with("lifecycle_offset_east", 3 * 3600);
    let (west, west_run) = run_with("lifecycle_offset_west", -5 * 3600);
    let (a, b) = tokio::join!(east_run, west_run);
    a.unwrap();
    b.unwrap();

    let east = east.lock().unwrap();
    let west = west.lock().unwrap();
    assert!(!east.is_empty() && !west.is_empty());
    assert!(east.iter().all(|e| e.at.offset().local_minus_utc() == 3 * 3600));
    assert!(west.iter().all(|e| e.at.offset().local_minus_utc() == -5 * 3600));
}

#[tokio::test]
async fn named_topic_receives_only_specific_copy() {
    let dir = tempfile::tempdir().unwrap();
    let (named, named_listener) = recorder();
    let (kinds, kind_listener) = recorder();

    let experiment = Experiment::builder("lifecycle_named")
        .paramsets([("alpha", json!({})), ("beta", json!({}))])
        .on_event(Topic::specific("alpha", EventKind::ParamsetEnd), named_listener)
        .on_event(EventKind::ParamsetEnd, kind_listener)
        .function(|_ctx: ParamsetContext, _params: Params| async move {
            Ok::<_, ExperimentError>(json!(1))
        })
        .build()
        .unwrap();

    experiment.run(config(&dir)).await.unwrap();

    let named = named.lock().unwrap();
    assert_eq!(named.len(), 1);
    assert!(!named[0].is_generic());
    assert_eq!(named[0].topic(), "alpha__PARAMSET_END");

    let kinds = kinds.lock().unwrap();
    assert_eq!(kinds.len(), 2);
    assert!(kinds.iter().all(Event::is_generic));
}

#[tokio::test]
async fn experiment_level_named_topic() {
    let dir = tempfile::tempdir().unwrap();
    let (seen, listener) = recorder();

    let experiment = Experiment::builder("lifecycle_exp_named")
        .paramset("p", json!({}))
        .on_event(
            Topic::specific("lifecycle_exp_named", EventKind::ExperimentEnd),
            listener,
        )
        .function(|_ctx: ParamsetContext, _params: Params| async move {
            Ok::<_, ExperimentError>(json!(null))
        })
        .build()
        .unwrap();

    experiment.run(config(&dir)).await.unwrap();
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn builder_rejects_invalid_definitions() {
    let no_paramsets = Experiment::builder("empty")
        .function(|_ctx: ParamsetContext, _p: Params| async move {
            Ok::<_, ExperimentError>(json!(null))
        })
        .build()
        .unwrap_err();
    assert_eq!(no_paramsets.as_label(), "run_no_paramsets");

    let duplicate = Experiment::builder("dup")
        .paramset("x", json!({}))
        .paramset("x", json!({}))
        .function(|_ctx: ParamsetContext, _p: Params| async move {
            Ok::<_, ExperimentError>(json!(null))
        })
        .build()
        .unwrap_err();
    assert_eq!(duplicate.as_label(), "run_duplicate_paramset");

    let no_body = Experiment::builder("no_body")
        .paramset("x", json!({}))
        .build()
        .unwrap_err();
    assert!(no_body.is_configuration());
}
