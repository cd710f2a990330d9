//! camopt-refine: learn pose corrections on a synthetic camera rig
//!
//! Usage:
//!   camopt-refine [--config camera_opt.json] [--cameras N] [--rays N] [--iters N]
//!                 [--lr LR] [--seed U64] [--freeze I] [--log-interval N]

use anyhow::{anyhow, Context};
use camopt_rs::optim::trainer::{refine_synthetic_rig, RefineConfig};
use camopt_rs::CameraOptimizerConfig;
use std::path::PathBuf;
use tracing::info;

fn next_value<T: std::str::FromStr>(args: &mut impl Iterator<Item = String>, flag: &str) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw = args
        .next()
        .ok_or_else(|| anyhow!("{flag} expects a value"))?;
    raw.parse::<T>()
        .map_err(|e| anyhow!("invalid value {raw:?} for {flag}: {e}"))
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  camopt-refine [--config <json>] [--cameras N] [--rays N] [--iters N] [--lr LR]");
    eprintln!("                [--seed U64] [--freeze I]... [--log-interval N]");
    eprintln!();
    eprintln!("  --config        camera optimizer config (mode, trans_l2_penalty, rot_l2_penalty, penalty_scale)");
    eprintln!("  --freeze I      keep camera I at its input pose (repeatable)");
}

fn main() -> anyhow::Result<()> {
    camopt_rs::init_logger();
    info!("camopt-refine v{}", camopt_rs::VERSION);

    let mut cfg = RefineConfig::default();
    let mut config_path: Option<PathBuf> = None;

    let mut args = std::env::args().skip(1);
    while let Some(a) = args.next() {
        match a.as_str() {
            "--config" => config_path = Some(next_value::<PathBuf>(&mut args, "--config")?),
            "--cameras" => cfg.num_cameras = next_value(&mut args, "--cameras")?,
            "--rays" => cfg.rays_per_camera = next_value(&mut args, "--rays")?,
            "--iters" => cfg.iters = next_value(&mut args, "--iters")?,
            "--lr" => cfg.lr = next_value(&mut args, "--lr")?,
            "--seed" => cfg.seed = next_value(&mut args, "--seed")?,
            "--freeze" => cfg.non_trainable.push(next_value(&mut args, "--freeze")?),
            "--log-interval" => cfg.log_interval = next_value(&mut args, "--log-interval")?,
            "-h" | "--help" => {
                print_usage();
                return Ok(());
            }
            other => {
                print_usage();
                return Err(anyhow!("unknown argument: {other}"));
            }
        }
    }

    if let Some(path) = &config_path {
        cfg.camera_opt = CameraOptimizerConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?;
    }

    info!(
        mode = %cfg.camera_opt.mode,
        cameras = cfg.num_cameras,
        rays_per_camera = cfg.rays_per_camera,
        iters = cfg.iters,
        "starting refinement"
    );

    let out = refine_synthetic_rig(&cfg)?;

    info!(
        initial_loss = out.initial_loss,
        final_loss = out.final_loss,
        "loss"
    );
    info!(
        before = out.initial_rotation_error.to_degrees(),
        after = out.final_rotation_error.to_degrees(),
        "mean rotation error (deg)"
    );
    info!(
        before = out.initial_translation_error,
        after = out.final_translation_error,
        "mean translation error"
    );
    for (key, value) in &out.metrics {
        info!(metric = %key, value, "final metric");
    }

    Ok(())
}
