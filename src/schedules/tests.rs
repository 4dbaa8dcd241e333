use std::collections::BTreeMap;

use super::*;
use crate::{configs::ConfigValue, error::OptimErr};

fn schedule(class: &str, params: &[(&str, ConfigValue)]) -> Result<Scheduler> {
    let mut map: BTreeMap<_, _> = params
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();

    map.insert("class".to_string(), ConfigValue::Str(class.to_string()));
    ScheduleConfig::from_map(map)?.build()
}

fn rates(mut scheduler: Scheduler, n: usize) -> Vec<f32> {
    (0..n)
        .map(|_| {
            let rate = scheduler.rate();
            scheduler.advance();
            rate
        })
        .collect()
}

fn assert_close(got: f32, expected: f32) {
    assert!((got - expected).abs() < 1e-6, "{got} != {expected}");
}

#[test]
fn constant_is_flat_and_reading_is_pure() {
    let scheduler = ScheduleConfig::constant(0.1).build().unwrap();

    assert_eq!(scheduler.rate(), scheduler.rate());
    assert_eq!(scheduler.step_count(), 0);
    assert!(rates(scheduler, 5).iter().all(|&r| r == 0.1));
}

#[test]
fn linear_warmup_peaks_then_decays_to_end_rate() {
    let scheduler = schedule(
        "Linear_Warmup",
        &[
            ("rate", ConfigValue::Float(1.0)),
            ("warmup_steps", ConfigValue::Int(4)),
            ("total_steps", ConfigValue::Int(8)),
        ],
    )
    .unwrap();

    let r = rates(scheduler, 12);
    assert_close(r[0], 0.25);
    assert_close(r[3], 1.0);
    assert_close(r[5], 0.5);
    assert_close(r[7], 0.0);
    assert_close(r[11], 0.0);

    assert!(r[..4].windows(2).all(|w| w[0] < w[1]));
    assert!(r[3..].windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn linear_warmup_without_total_holds_the_peak() {
    let scheduler = schedule(
        "linear",
        &[
            ("rate", ConfigValue::Float(0.5)),
            ("warmup_steps", ConfigValue::Int(2)),
        ],
    )
    .unwrap();

    let r = rates(scheduler, 6);
    assert_close(r[0], 0.25);
    assert!(r[1..].iter().all(|&rate| rate == 0.5));
}

#[test]
fn cosine_reaches_min_rate() {
    let scheduler = schedule(
        "cosine",
        &[
            ("rate", ConfigValue::Float(1.0)),
            ("total_steps", ConfigValue::Int(10)),
            ("min_rate", ConfigValue::Float(0.1)),
        ],
    )
    .unwrap();

    let r = rates(scheduler, 20);
    assert_close(r[4], 0.55);
    assert_close(r[9], 0.1);
    assert_close(r[19], 0.1);
    assert!(r.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn inverse_sqrt_decays_after_warmup() {
    let scheduler = schedule(
        "inverse_sqrt",
        &[
            ("rate", ConfigValue::Float(1.0)),
            ("warmup_steps", ConfigValue::Int(4)),
        ],
    )
    .unwrap();

    let r = rates(scheduler, 16);
    assert_close(r[1], 0.5);
    assert_close(r[3], 1.0);
    assert_close(r[15], 0.5);
}

#[test]
fn noam_matches_the_transformer_formula() {
    let scheduler = schedule(
        "noam",
        &[
            ("d_model", ConfigValue::Int(16)),
            ("warmup_steps", ConfigValue::Int(4)),
        ],
    )
    .unwrap();

    let r = rates(scheduler, 16);
    assert_close(r[3], 0.125);
    assert!(r[3] > r[2] && r[3] > r[4]);
    assert_close(r[15], 0.25 * 0.25);
}

#[test]
fn restore_repositions_the_counter() {
    let mut scheduler = schedule(
        "inverse_square_root",
        &[
            ("rate", ConfigValue::Float(1.0)),
            ("warmup_steps", ConfigValue::Int(4)),
        ],
    )
    .unwrap();

    scheduler.restore(15);
    assert_eq!(scheduler.step_count(), 15);
    assert_close(scheduler.rate(), 0.5);
}

#[test]
fn invalid_schedules_are_configuration_errors() {
    let unknown = schedule("step_decay", &[("rate", ConfigValue::Float(1.0))]);
    assert!(matches!(unknown, Err(OptimErr::Configuration(_))));

    let extra = schedule(
        "constant",
        &[
            ("rate", ConfigValue::Float(1.0)),
            ("gamma", ConfigValue::Float(0.5)),
        ],
    );
    assert!(matches!(extra, Err(OptimErr::Configuration(msg)) if msg.contains("gamma")));

    let missing = schedule("constant", &[]);
    assert!(matches!(missing, Err(OptimErr::Configuration(_))));

    let backwards = schedule(
        "linear",
        &[
            ("rate", ConfigValue::Float(1.0)),
            ("warmup_steps", ConfigValue::Int(10)),
            ("total_steps", ConfigValue::Int(5)),
        ],
    );
    assert!(matches!(backwards, Err(OptimErr::Configuration(_))));

    let no_class = ScheduleConfig::from_map(BTreeMap::new());
    assert!(matches!(no_class, Err(OptimErr::Configuration(_))));
}

#[test]
fn saturated_counter_still_yields_a_rate() {
    let schedules = [
        schedule("constant", &[("rate", ConfigValue::Float(1.0))]),
        schedule(
            "linear",
            &[
                ("rate", ConfigValue::Float(1.0)),
                ("warmup_steps", ConfigValue::Int(4)),
                ("total_steps", ConfigValue::Int(8)),
            ],
        ),
        schedule(
            "cosine",
            &[
                ("rate", ConfigValue::Float(1.0)),
                ("total_steps", ConfigValue::Int(10)),
            ],
        ),
        schedule(
            "inverse_sqrt",
            &[
                ("rate", ConfigValue::Float(1.0)),
                ("warmup_steps", ConfigValue::Int(4)),
            ],
        ),
        schedule(
            "noam",
            &[
                ("d_model", ConfigValue::Int(16)),
                ("warmup_steps", ConfigValue::Int(4)),
            ],
        ),
    ];

    for scheduler in schedules {
        let mut scheduler = scheduler.unwrap();
        scheduler.restore(u64::MAX);

        assert!(scheduler.rate().is_finite());
        scheduler.advance();
        assert_eq!(scheduler.step_count(), u64::MAX);
    }
}
