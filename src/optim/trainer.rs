//! Reference refinement loop on a synthetic camera rig.
//!
//! A ring of cameras looks at the origin. Each camera gets a known world-frame
//! pose error (rotation `R_err`, offset `t_err`), so its rays are
//! `o = o* - t_err`, `d = R_errᵀ d*` relative to the true rays `o*`, `d*`.
//! The loop learns corrections that map the perturbed rays back onto the true
//! ones, which is exactly the ray correction `o' = o + t`, `d' = R d` with
//! `t = t_err`, `R = R_err`.
//!
//! The "scene" loss is the squared ray misalignment. Everything else (the
//! regularizer, backward passes, Adam over the `camera_opt` group) is what a
//! real trainer would do.

use anyhow::ensure;
use nalgebra::{Matrix3, Matrix3x4, Rotation3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::core::math::{from_rotation_translation, rotation_block, translation_column};
use crate::core::{Camera, Device, RayBundle};
use crate::optim::adam::Adam;
use crate::optim::camera_optimizer::{CameraOptimizer, DEFAULT_PARAM_GROUP};
use crate::optim::config::{CameraOptimizerConfig, CameraOptimizerMode};
use crate::optim::loss::{ray_alignment_loss_and_grad, total_loss, LossDict, MetricsDict};
use crate::optim::params::ParamGroups;

#[derive(Clone, Debug)]
pub struct RefineConfig {
    pub num_cameras: usize,
    pub rays_per_camera: usize,
    pub iters: usize,
    pub lr: f32,
    pub seed: u64,
    /// Max per-axis rotation error (radians).
    pub rotation_noise: f32,
    /// Max per-axis translation error (scene units).
    pub translation_noise: f32,
    pub camera_opt: CameraOptimizerConfig,
    pub non_trainable: Vec<usize>,
    pub log_interval: usize,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            num_cameras: 8,
            rays_per_camera: 64,
            iters: 400,
            lr: 5e-3,
            seed: 0,
            rotation_noise: 0.05,
            translation_noise: 0.1,
            camera_opt: CameraOptimizerConfig::with_mode(CameraOptimizerMode::SO3xR3),
            non_trainable: Vec::new(),
            log_interval: 50,
        }
    }
}

pub struct RefineOutputs {
    pub initial_loss: f32,
    pub final_loss: f32,
    pub loss_history: Vec<f32>,
    /// Mean angle (radians) between learned and true corrections, before and after.
    pub initial_rotation_error: f32,
    pub final_rotation_error: f32,
    /// Mean distance between learned and true correction offsets, before and after.
    pub initial_translation_error: f32,
    pub final_translation_error: f32,
    pub corrections: Vec<Matrix3x4<f32>>,
    pub metrics: MetricsDict,
}

/// Camera on a ring of radius `radius`, looking at the origin.
fn ring_camera(index: usize, count: usize, radius: f32) -> Camera {
    let angle = index as f32 / count as f32 * std::f32::consts::TAU;
    let center = Vector3::new(radius * angle.cos(), 0.5, radius * angle.sin());

    // Camera looks down -Z, so +Z points away from the target.
    let back = center.normalize();
    let right = Vector3::y().cross(&back).normalize();
    let up = back.cross(&right);
    let rotation = Matrix3::from_columns(&[right, up, back]);

    Camera::new(64.0, 64.0, 32.0, 32.0, 64, 64, from_rotation_translation(&rotation, &center))
        .with_camera_index(index)
}

fn mean_errors(learned: &[Matrix3x4<f32>], truth: &[(Rotation3<f32>, Vector3<f32>)]) -> (f32, f32) {
    let n = learned.len().max(1) as f32;
    let (rot, trans) = learned
        .iter()
        .zip(truth)
        .fold((0.0f32, 0.0f32), |(r, t), (m, (r_err, t_err))| {
            let r_learned = Rotation3::from_matrix_unchecked(rotation_block(m));
            let angle = (r_learned.inverse() * r_err).angle();
            (r + angle, t + (translation_column(m) - t_err).norm())
        });
    (rot / n, trans / n)
}

pub fn refine_synthetic_rig(cfg: &RefineConfig) -> anyhow::Result<RefineOutputs> {
    ensure!(cfg.num_cameras > 0, "need at least one camera");
    ensure!(cfg.rays_per_camera > 0, "need at least one ray per camera");

    let mut rng = StdRng::seed_from_u64(cfg.seed);

    let mut truth = Vec::with_capacity(cfg.num_cameras);
    let mut rays = RayBundle::new(Vec::new(), Vec::new(), Vec::<usize>::new());
    let mut target_origins = Vec::new();
    let mut target_directions = Vec::new();

    for index in 0..cfg.num_cameras {
        let camera = ring_camera(index, cfg.num_cameras, 4.0);
        let rn = cfg.rotation_noise;
        let tn = cfg.translation_noise;
        let r_err = Rotation3::from_scaled_axis(Vector3::new(
            rng.gen_range(-rn..=rn),
            rng.gen_range(-rn..=rn),
            rng.gen_range(-rn..=rn),
        ));
        let t_err = Vector3::new(
            rng.gen_range(-tn..=tn),
            rng.gen_range(-tn..=tn),
            rng.gen_range(-tn..=tn),
        );

        let pixels: Vec<(f32, f32)> = (0..cfg.rays_per_camera)
            .map(|_| {
                (
                    rng.gen_range(0.0..camera.width as f32),
                    rng.gen_range(0.0..camera.height as f32),
                )
            })
            .collect();
        let true_rays = RayBundle::from_camera_pixels(&camera, index, &pixels);

        let perturbed_origins: Vec<Vector3<f32>> =
            true_rays.origins.iter().map(|o| o - t_err).collect();
        let perturbed_directions: Vec<Vector3<f32>> = true_rays
            .directions
            .iter()
            .map(|d| r_err.inverse() * d)
            .collect();

        target_origins.extend(true_rays.origins.iter().copied());
        target_directions.extend(true_rays.directions.iter().copied());
        rays.extend(RayBundle::new(
            perturbed_origins,
            perturbed_directions,
            vec![index; cfg.rays_per_camera],
        ));
        truth.push((r_err, t_err));
    }

    let mut camera_opt = CameraOptimizer::new(
        cfg.camera_opt.clone(),
        cfg.num_cameras,
        Device::Cpu,
        (!cfg.non_trainable.is_empty()).then_some(cfg.non_trainable.as_slice()),
    )?;

    let mut param_groups = ParamGroups::new();
    camera_opt.get_param_groups(&mut param_groups, DEFAULT_PARAM_GROUP);
    let mut adam = Adam::with_lr(
        param_groups.remove(DEFAULT_PARAM_GROUP).unwrap_or_default(),
        cfg.lr,
    );

    let (initial_rotation_error, initial_translation_error) =
        mean_errors(&camera_opt.snapshot_corrections()?, &truth);

    let mut loss_history = Vec::with_capacity(cfg.iters);
    for iter in 0..cfg.iters {
        let mut batch = rays.clone();
        let tape = camera_opt.apply_to_raybundle(&mut batch)?;

        let (scene_loss, d_origins, d_directions) = ray_alignment_loss_and_grad(
            &batch.origins,
            &batch.directions,
            &target_origins,
            &target_directions,
        );

        let mut losses = LossDict::new();
        losses.insert("ray_alignment".to_string(), scene_loss);
        camera_opt.get_loss_dict(&mut losses);
        let loss = total_loss(&losses);
        loss_history.push(loss);

        adam.zero_grad();
        if let Some(tape) = &tape {
            camera_opt.raybundle_backward(tape, &d_origins, &d_directions)?;
        }
        camera_opt.regularization_backward(1.0);
        adam.step();

        if cfg.log_interval > 0 && (iter % cfg.log_interval == 0 || iter + 1 == cfg.iters) {
            let mut metrics = MetricsDict::new();
            camera_opt.get_metrics_dict(&mut metrics);
            info!(
                iter,
                loss,
                scene_loss,
                translation = metrics.get("camera_opt_translation").copied().unwrap_or(0.0),
                rotation = metrics.get("camera_opt_rotation").copied().unwrap_or(0.0),
                "refine step"
            );
        }
    }

    let corrections = camera_opt.snapshot_corrections()?;
    let (final_rotation_error, final_translation_error) = mean_errors(&corrections, &truth);

    let mut metrics = MetricsDict::new();
    camera_opt.get_metrics_dict(&mut metrics);

    Ok(RefineOutputs {
        initial_loss: loss_history.first().copied().unwrap_or(0.0),
        final_loss: loss_history.last().copied().unwrap_or(0.0),
        loss_history,
        initial_rotation_error,
        final_rotation_error,
        initial_translation_error,
        final_translation_error,
        corrections,
        metrics,
    })
}
