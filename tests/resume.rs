mod common;

use std::path::PathBuf;

use common::{Toy, raw};
use orchestra_optim::{
    Environment, JsonStateStore, OptimErr, OptimizerHandle, StateDict, build_optimizer,
};
use serde_json::{Value, json};

const STEPS: u64 = 6;

fn config() -> Value {
    json!({
        "class": "adam",
        "lr": {"class": "linear_warmup", "rate": 0.05, "warmup_steps": 3, "total_steps": 20},
        "betas": "(0.9, 0.98)",
        "no_decay": ["bias", "LayerNorm.weight"],
        "weight_decay": 0.1,
        "update_frequency": 2,
        "clip_norm": 1.0,
    })
}

async fn build(model: &Toy) -> OptimizerHandle {
    let (_, handle) = build_optimizer(model.clone(), &raw(config()), Environment::local(), false)
        .await
        .unwrap();

    handle
}

async fn train(model: &Toy, handle: &mut OptimizerHandle, steps: std::ops::Range<u64>) {
    for step in steps {
        for micro in 0..handle.update_frequency() {
            model.backward(step as f32 + micro as f32 * 0.5);
            handle.backward_pass().await.unwrap();
        }

        handle.step().await.unwrap();
        handle.zero_grad();
    }
}

fn copy_values(from: &Toy, to: &Toy) {
    for ((_, src), (_, dst)) in from.params.iter().zip(&to.params) {
        dst.lock().data = src.data();
    }
}

#[tokio::test]
async fn resuming_matches_an_uninterrupted_run() {
    let reference = Toy::layers();
    let mut uninterrupted = build(&reference).await;
    train(&reference, &mut uninterrupted, 0..2 * STEPS).await;

    let first = Toy::layers();
    let mut handle = build(&first).await;
    train(&first, &mut handle, 0..STEPS).await;
    let saved = serde_json::to_string(&handle.state_dict()).unwrap();

    let second = Toy::layers();
    copy_values(&first, &second);
    let mut resumed = build(&second).await;
    assert_eq!(resumed.step_count(), 0);

    let state: StateDict = serde_json::from_str(&saved).unwrap();
    resumed.load_state_dict(state).unwrap();
    assert_eq!(resumed.step_count(), STEPS);
    assert_eq!(resumed.rate(), handle.rate());

    train(&second, &mut resumed, STEPS..2 * STEPS).await;

    assert_eq!(second.values(), reference.values());
    assert_eq!(resumed.state_dict(), uninterrupted.state_dict());
}

#[tokio::test]
async fn state_survives_the_json_store() {
    let model = Toy::layers();
    let mut handle = build(&model).await;
    train(&model, &mut handle, 0..3).await;

    let path: PathBuf = std::env::temp_dir().join(format!(
        "orchestra-optim-state-{}.json",
        std::process::id()
    ));

    handle.save(&JsonStateStore, &path).unwrap();

    let mut fresh = build(&Toy::layers()).await;
    fresh.load(&JsonStateStore, &path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(fresh.state_dict(), handle.state_dict());
}

#[tokio::test]
async fn missing_state_file_is_a_persistence_error() {
    let mut handle = build(&Toy::layers()).await;
    let path = std::env::temp_dir().join("orchestra-optim-does-not-exist.json");

    assert!(matches!(
        handle.load(&JsonStateStore, &path),
        Err(OptimErr::Persistence(_))
    ));
}

#[tokio::test]
async fn incompatible_layouts_are_rejected() {
    let model = Toy::layers();
    let mut handle = build(&model).await;
    train(&model, &mut handle, 0..2).await;
    let state = handle.state_dict();

    let single_group = raw(json!({"class": "adam", "lr": 0.1}));
    let (_, mut other) = build_optimizer(Toy::layers(), &single_group, Environment::local(), false)
        .await
        .unwrap();

    assert!(matches!(
        other.load_state_dict(state.clone()),
        Err(OptimErr::ResumeMismatch(_))
    ));
    assert_eq!(other.step_count(), 0);

    let sgd = raw(json!({
        "class": "sgd",
        "lr": 0.1,
        "no_decay": ["bias", "LayerNorm.weight"],
        "weight_decay": 0.1,
    }));
    let (_, mut other) = build_optimizer(Toy::layers(), &sgd, Environment::local(), false)
        .await
        .unwrap();

    assert!(matches!(
        other.load_state_dict(state.clone()),
        Err(OptimErr::ResumeMismatch(_))
    ));

    let smaller = Toy::new(&[
        ("encoder.weight", &[0.5, -0.5]),
        ("encoder.bias", &[0.1]),
        ("encoder.LayerNorm.weight", &[1.0, 1.0]),
        ("decoder.weight", &[-1.0, 2.0]),
    ]);
    let mut other = build(&smaller).await;

    assert!(matches!(
        other.load_state_dict(state.clone()),
        Err(OptimErr::ResumeMismatch(_))
    ));

    let (_, mut mixed) = build_optimizer(Toy::layers(), &raw(config()), Environment::local(), true)
        .await
        .unwrap();

    assert!(matches!(
        mixed.load_state_dict(state),
        Err(OptimErr::ResumeMismatch(_))
    ));
}

#[tokio::test]
async fn exhausted_step_counter_keeps_training() {
    let model = Toy::layers();
    let mut handle = build(&model).await;

    let mut state = handle.state_dict();
    state.step = u64::MAX;
    handle.load_state_dict(state).unwrap();

    assert!(handle.rate().is_finite());

    train(&model, &mut handle, 0..1).await;

    assert_eq!(handle.step_count(), u64::MAX);
    assert!(model.values().iter().flatten().all(|w| w.is_finite()));
}
