use std::{env, net::SocketAddr, path::PathBuf};

use anyhow::Context;
use log::info;

use orchestra_optim::{
    Environment, JsonStateStore, Model, OptimizerHandle, Parameter, build_optimizer,
    distributed::TcpStar, read_config,
};

const DEFAULT_STEPS: u64 = 10;
const DEFAULT_ROOT_ADDR: &str = "127.0.0.1:40000";

/// A quadratic bowl centered at `target`, enough to watch an optimizer converge.
struct Quadratic {
    weight: Parameter,
    target: Vec<f32>,
}

impl Quadratic {
    fn new(target: Vec<f32>) -> Self {
        Self {
            weight: Parameter::new(vec![0.; target.len()]),
            target,
        }
    }

    /// Computes `0.5 * |w - target|^2` and accumulates its gradient times `scale`.
    fn forward_backward(&self, scale: f32) -> anyhow::Result<f32> {
        let diff: Vec<f32> = self
            .weight
            .data()
            .iter()
            .zip(&self.target)
            .map(|(w, t)| w - t)
            .collect();

        let grad: Vec<f32> = diff.iter().map(|d| d * scale).collect();
        self.weight.accumulate_grad(&grad)?;

        Ok(0.5 * diff.iter().map(|d| d * d).sum::<f32>())
    }
}

impl Model for Quadratic {
    fn named_parameters(&self) -> Vec<(String, Parameter)> {
        vec![("weight".to_string(), self.weight.clone())]
    }
}

fn flag(name: &str) -> bool {
    env::var(name).is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value.parse().with_context(|| format!("invalid {name}={value}")),
        Err(_) => Ok(default),
    }
}

async fn environment() -> anyhow::Result<Environment> {
    let world_size: usize = parsed("WORLD_SIZE", 1)?;
    let rank: usize = parsed("RANK", 0)?;
    let fp16 = flag("FP16_COMPRESSION");

    if world_size <= 1 {
        return Ok(Environment::local().with_fp16_compression(fp16));
    }

    let addr: SocketAddr = parsed("ROOT_ADDR", DEFAULT_ROOT_ADDR.parse()?)?;
    let collective = if rank == 0 {
        info!("waiting for {} peer(s) at {addr}", world_size - 1);
        TcpStar::bind_root(addr, world_size).await?
    } else {
        info!("joining the run at {addr} as rank {rank}");
        TcpStar::connect_peer(addr, rank, world_size).await?
    };

    Ok(Environment::distributed(collective).with_fp16_compression(fp16))
}

async fn train(model: &Quadratic, handle: &mut OptimizerHandle, steps: u64) -> anyhow::Result<()> {
    for _ in 0..steps {
        let mut loss = 0.;

        for micro in 0..handle.update_frequency() {
            let scale = handle.scale_loss(1., micro) / handle.update_frequency() as f32;
            loss += model.forward_backward(scale)?;
            handle.backward_pass().await?;
        }

        let lr = handle.rate();
        handle.step().await?;
        handle.zero_grad();

        info!(
            "step={} lr={lr:.6} loss={:.6}",
            handle.step_count(),
            loss / handle.update_frequency() as f32
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let path: PathBuf = env::args()
        .nth(1)
        .context("usage: orchestra-optim <optimizer-config.json>")?
        .into();

    let raw = read_config(&path)?;
    let steps = parsed("STEPS", DEFAULT_STEPS)?;
    let checkpoint = env::var("CHECKPOINT").ok().map(PathBuf::from);

    let env = environment().await?;
    let model = Quadratic::new(vec![1., -2., 0.5, 3.]);
    let (model, mut handle) = build_optimizer(model, &raw, env, flag("MIXED_PRECISION")).await?;

    if let Some(path) = checkpoint.as_deref().filter(|p| p.exists()) {
        handle.load(&JsonStateStore, path)?;
        info!("resumed from {} at step {}", path.display(), handle.step_count());
    }

    let model = model.into_inner();
    train(&model, &mut handle, steps).await?;

    if let Some(path) = checkpoint.as_deref() {
        handle.save(&JsonStateStore, path)?;
        info!("saved optimizer state to {}", path.display());
    }

    info!("final weights {:?}", model.weight.data());
    Ok(())
}
