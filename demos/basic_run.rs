//! # Example: basic_run
//!
//! Grid search over a tiny "training" function with two steps and a variable cache.
//!
//! Demonstrates how to:
//! - Register steps with [`StepRegistry`] and run them inside the body.
//! - Build an [`Experiment`] from a set of named paramsets.
//! - Cache intermediate values with [`Store::for_context`] so a re-run skips work.
//! - Install logging with [`init_logging`] and inspect the [`RunReport`](expvisor::RunReport).
//!
//! ## Flow
//! ```text
//! Experiment ──► Runner::run()
//!     ├─► publish(ExperimentStart)
//!     ├─► worker per paramset (n_jobs = 2)
//!     │     ├─► publish(ParamsetStart)
//!     │     ├─► step "prepare" ─► StepStart / StepSuccess / StepEnd
//!     │     ├─► step "train"   ─► StepStart / StepSuccess|StepError / StepEnd
//!     │     └─► publish(ParamsetSuccess | ParamsetError) ─► ParamsetEnd
//!     └─► publish(ExperimentSuccess?) ─► ExperimentEnd
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example basic_run
//! RUST_LOG=expvisor=debug cargo run --example basic_run
//! ```

use std::time::Duration;

use expvisor::{
    Experiment, ExperimentError, LoggingConfig, Params, ParamsetContext, RunnerConfig, Store,
    StepRegistry, init_logging,
};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _guard = init_logging(&LoggingConfig {
        remote: false,
        ..LoggingConfig::default()
    })?;

    let mut steps = StepRegistry::new();
    let prepare = steps.register("prepare");
    let train = steps.register("train");

    let grid = [0.001, 0.01, 0.1, 1.0]
        .into_iter()
        .map(|lr| (format!("lr={lr}"), json!({ "lr": lr, "epochs": 5 })));

    let experiment = Experiment::builder("grid_search")
        .version("v1")
        .paramsets(grid)
        .n_jobs(2)
        .steps(steps)
        .function(move |ctx: ParamsetContext, params: Params| {
            let (prepare, train) = (prepare.clone(), train.clone());
            async move {
                let lr: f64 = params.get("lr")?;
                let epochs: u32 = params.get("epochs")?;
                let store = Store::for_context(&ctx);

                let data: Vec<f64> = match store.get("data").await {
                    Ok(data) => data,
                    Err(err) if err.is_not_found() => {
                        let data = prepare
                            .run(&ctx, async {
                                tokio::time::sleep(Duration::from_millis(100)).await;
                                Ok::<_, ExperimentError>((1..=8).map(f64::from).collect::<Vec<_>>())
                            })
                            .await?;
                        store.set("data", &data).await?;
                        data
                    }
                    Err(err) => return Err(err.into()),
                };

                let loss = train
                    .run(&ctx, async {
                        if lr >= 1.0 {
                            return Err(format!("diverged with lr={lr}"));
                        }
                        let mut loss: f64 = data.iter().sum();
                        for _ in 0..epochs {
                            loss *= 1.0 - lr;
                            tokio::time::sleep(Duration::from_millis(20)).await;
                        }
                        Ok(loss)
                    })
                    .await?;

                Ok::<_, ExperimentError>(json!({ "loss": loss }))
            }
        })
        .build()?;

    let report = experiment.run(RunnerConfig::default()).await?;

    println!("status: {:?}", report.status);
    for (name, result) in &report.results {
        println!("  {name}: {result}");
    }
    for name in report.failed() {
        println!("  {name}: failed");
    }
    Ok(())
}
