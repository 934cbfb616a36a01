use std::fs;

use expvisor::logging::ParamsetLogLayer;
use expvisor::{Experiment, ExperimentError, Params, ParamsetContext, RunnerConfig, StepRegistry};
use serde_json::json;
use tracing_subscriber::layer::SubscriberExt;

#[tokio::test]
async fn each_paramset_logs_into_its_own_directory() {
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("logs");
    let subscriber = tracing_subscriber::registry().with(ParamsetLogLayer::new(&logs));
    let _default = tracing::subscriber::set_default(subscriber);

    let mut steps = StepRegistry::new();
    let fit = steps.register("fit");

    let experiment = Experiment::builder("logging_routes")
        .paramsets([("small", json!({"lr": 0.1})), ("large", json!({"lr": 1.0}))])
        .steps(steps)
        .function(move |ctx: ParamsetContext, params: Params| {
            let fit = fit.clone();
            async move {
                let lr: f64 = params.get("lr")?;
                tracing::warn!("preparing {}", ctx.paramset());
                fit.run(&ctx, async {
                    tracing::info!(lr, "fitting {}", ctx.paramset());
                    Ok::<_, ExperimentError>(())
                })
                .await?;
                Ok::<_, ExperimentError>(json!(lr))
            }
        })
        .build()
        .unwrap();

    let cfg = RunnerConfig {
        handle_signals: false,
        cache_dir: dir.path().to_path_buf(),
        ..RunnerConfig::default()
    };
    let report = experiment.run(cfg).await.unwrap();
    assert!(report.is_successful());

    for (name, other) in [("small", "large"), ("large", "small")] {
        let body = fs::read_to_string(logs.join(name).join("paramset.WARN.log")).unwrap();
        assert!(body.contains(&format!("preparing {name}")));
        assert!(!body.contains(other));

        let step = fs::read_to_string(logs.join(name).join("fit/fit.INFO.log")).unwrap();
        assert!(step.contains(&format!("fitting {name}")));
        assert!(!step.contains("preparing"));
    }
}
