//! Behavioral properties of the camera optimizer: identity fast paths,
//! shared and masked corrections, ray/camera application, regularization and
//! parameter exposure.

use std::f32::consts::FRAC_PI_2;

use approx::assert_relative_eq;
use nalgebra::{Matrix3, Matrix3x4, Vector3, Vector6};
use camopt_rs::core::{identity_3x4, Camera, CameraIndices, Device, RayBundle};
use camopt_rs::optim::{
    CameraOptimizer, CameraOptimizerConfig, CameraOptimizerMode, LossDict, MetricsDict,
    ParamGroups, DEFAULT_PARAM_GROUP,
};
use camopt_rs::CameraOptError;

const ALL_MODES: [CameraOptimizerMode; 4] = [
    CameraOptimizerMode::Off,
    CameraOptimizerMode::SO3xR3,
    CameraOptimizerMode::SE3,
    CameraOptimizerMode::SharedSO3xR3,
];

const ACTIVE_MODES: [CameraOptimizerMode; 3] = [
    CameraOptimizerMode::SO3xR3,
    CameraOptimizerMode::SE3,
    CameraOptimizerMode::SharedSO3xR3,
];

fn optimizer(mode: CameraOptimizerMode, n: usize, masked: Option<&[usize]>) -> CameraOptimizer {
    CameraOptimizer::new(CameraOptimizerConfig::with_mode(mode), n, Device::Cpu, masked)
        .expect("valid optimizer")
}

fn set_row(opt: &CameraOptimizer, row: usize, v: Vector6<f32>) {
    opt.pose_adjustment()
        .expect("active mode has parameters")
        .borrow_mut()
        .set_row6(row, &v);
}

fn sample_rays() -> RayBundle {
    RayBundle::new(
        vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(-1.0, 0.5, 4.0),
        ],
        vec![
            Vector3::new(0.0, 0.0, -1.0),
            Vector3::new(0.6, 0.0, -0.8),
            Vector3::new(0.0, 1.0, 0.0),
        ],
        vec![[0usize], [1], [2]],
    )
}

#[test]
fn test_off_mode_returns_identity_for_any_batch() {
    let mut opt = optimizer(CameraOptimizerMode::Off, 4, None);
    for batch in [vec![], vec![0], vec![3, 3, 1, 0, 2]] {
        let out = opt.corrections(&batch).unwrap();
        assert_eq!(out.len(), batch.len());
        assert!(out.iter().all(|m| *m == identity_3x4()));
    }
}

#[test]
fn test_empty_batch_for_every_mode() {
    for mode in ALL_MODES {
        let mut opt = optimizer(mode, 3, Some(&[0]));
        assert!(opt.corrections(&[]).unwrap().is_empty(), "mode {mode}");
    }
}

#[test]
fn test_zero_parameters_give_exact_identity() {
    for mode in ACTIVE_MODES {
        let mut opt = optimizer(mode, 3, None);
        let out = opt.corrections(&[0, 1, 2, 1]).unwrap();
        assert!(out.iter().all(|m| *m == identity_3x4()), "mode {mode}");
    }
}

#[test]
fn test_shared_mode_gives_same_correction_to_every_camera() {
    let mut opt = optimizer(CameraOptimizerMode::SharedSO3xR3, 5, None);
    set_row(&opt, 0, Vector6::new(0.2, -0.1, 0.4, 0.3, 0.1, -0.5));
    let out = opt.corrections(&[0, 4, 2]).unwrap();
    assert_ne!(out[0], identity_3x4());
    assert_eq!(out[0], out[1]);
    assert_eq!(out[1], out[2]);
}

#[test]
fn test_masked_cameras_always_identity() {
    for mode in ACTIVE_MODES {
        let mut opt = optimizer(mode, 3, Some(&[1]));
        let rows = opt.pose_adjustment().unwrap().borrow().rows();
        for r in 0..rows {
            set_row(&opt, r, Vector6::new(0.5, 0.4, -0.3, 0.2, -0.6, 0.1));
        }
        let out = opt.corrections(&[1, 0, 1, 2]).unwrap();
        assert_eq!(out[0], identity_3x4(), "mode {mode}");
        assert_eq!(out[2], identity_3x4(), "mode {mode}");
        assert_ne!(out[1], identity_3x4(), "mode {mode}");
        assert_ne!(out[3], identity_3x4(), "mode {mode}");
    }
}

#[test]
fn test_end_to_end_three_cameras_with_frozen_middle() {
    let mut opt = optimizer(CameraOptimizerMode::SO3xR3, 3, Some(&[1]));
    set_row(&opt, 0, Vector6::new(0.1, -0.2, 0.3, 0.0, 0.0, FRAC_PI_2));
    set_row(&opt, 1, Vector6::new(1.0, 1.0, 1.0, 0.5, 0.5, 0.5));
    set_row(&opt, 2, Vector6::zeros());

    let out = opt.corrections(&[0, 1, 2]).unwrap();

    // Quarter turn about +Z, translation passed through.
    let expected = Matrix3x4::new(
        0.0, -1.0, 0.0, 0.1, //
        1.0, 0.0, 0.0, -0.2, //
        0.0, 0.0, 1.0, 0.3,
    );
    assert_relative_eq!(out[0], expected, epsilon = 1e-6);
    assert_eq!(out[1], identity_3x4());
    assert_eq!(out[2], identity_3x4());

    let snapshot = opt.snapshot_corrections().unwrap();
    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot, out);
}

#[test]
fn test_apply_to_raybundle_is_noop_when_off() {
    let mut opt = optimizer(CameraOptimizerMode::Off, 3, None);
    let mut rays = sample_rays();
    let before = rays.clone();
    let tape = opt.apply_to_raybundle(&mut rays).unwrap();
    assert!(tape.is_none());
    assert_eq!(rays.origins, before.origins);
    assert_eq!(rays.directions, before.directions);
    assert_eq!(rays.camera_indices, before.camera_indices);
}

#[test]
fn test_apply_to_raybundle_translates_origins_and_rotates_directions() {
    let mut opt = optimizer(CameraOptimizerMode::SO3xR3, 3, None);
    set_row(&opt, 1, Vector6::new(0.5, 0.0, -1.0, 0.0, 0.0, FRAC_PI_2));

    let mut rays = sample_rays();
    let before = rays.clone();
    let tape = opt.apply_to_raybundle(&mut rays).unwrap().expect("active mode");
    assert_eq!(tape.indices(), &[0, 1, 2]);

    // Cameras 0 and 2 have zero corrections.
    assert_eq!(rays.origins[0], before.origins[0]);
    assert_eq!(rays.directions[2], before.directions[2]);

    assert_relative_eq!(rays.origins[1], Vector3::new(1.5, 2.0, 2.0), epsilon = 1e-6);
    assert_relative_eq!(rays.directions[1], Vector3::new(0.0, 0.6, -0.8), epsilon = 1e-6);
}

#[test]
fn test_apply_to_raybundle_rejects_bad_input_without_mutation() {
    let mut opt = optimizer(CameraOptimizerMode::SE3, 2, None);
    set_row(&opt, 0, Vector6::new(1.0, 0.0, 0.0, 0.0, 0.0, 0.0));

    // Index 2 is out of range for two cameras.
    let mut rays = sample_rays();
    let before = rays.clone();
    let err = opt.apply_to_raybundle(&mut rays).unwrap_err();
    assert_eq!(err, CameraOptError::CameraIndexOutOfRange { index: 2, num_cameras: 2 });
    assert_eq!(rays.origins, before.origins);

    let mut ragged = sample_rays();
    ragged.camera_indices = CameraIndices::Flat(vec![0, 1]);
    assert!(matches!(
        opt.apply_to_raybundle(&mut ragged),
        Err(CameraOptError::RayBundleShapeMismatch { .. })
    ));
}

#[test]
fn test_apply_to_camera_requires_identifier() {
    for mode in ACTIVE_MODES {
        let mut opt = optimizer(mode, 2, None);
        let mut camera = Camera::new(50.0, 50.0, 25.0, 25.0, 50, 50, Matrix3x4::identity());
        let before = camera.camera_to_world;
        let err = opt.apply_to_camera(&mut camera).unwrap_err();
        assert_eq!(err, CameraOptError::MissingCameraIndex, "mode {mode}");
        assert_eq!(camera.camera_to_world, before);
    }

    // Off never looks at the metadata.
    let mut opt = optimizer(CameraOptimizerMode::Off, 2, None);
    let mut camera = Camera::new(50.0, 50.0, 25.0, 25.0, 50, 50, Matrix3x4::identity());
    assert!(opt.apply_to_camera(&mut camera).unwrap().is_none());
}

#[test]
fn test_apply_to_camera_right_multiplies_pose() {
    let mut opt = optimizer(CameraOptimizerMode::SO3xR3, 2, None);
    set_row(&opt, 1, Vector6::new(0.0, 0.0, 1.0, 0.0, 0.0, FRAC_PI_2));

    let rotation = Matrix3::new(0.0, 0.0, 1.0, 0.0, 1.0, 0.0, -1.0, 0.0, 0.0);
    let mut pose = Matrix3x4::zeros();
    pose.fixed_view_mut::<3, 3>(0, 0).copy_from(&rotation);
    pose.fixed_view_mut::<3, 1>(0, 3).copy_from(&Vector3::new(1.0, 2.0, 3.0));

    let mut camera = Camera::new(50.0, 50.0, 25.0, 25.0, 50, 50, pose).with_camera_index(1);
    let tape = opt.apply_to_camera(&mut camera).unwrap().expect("active mode");
    assert_eq!(tape.camera_index(), 1);
    assert_eq!(*tape.original_camera_to_world(), pose);

    // New center = old center + R_old · t_corr = (1,2,3) + (1,0,0).
    assert_relative_eq!(camera.center(), Vector3::new(2.0, 2.0, 3.0), epsilon = 1e-6);
    let expected_rot = rotation * Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
    assert_relative_eq!(camera.rotation(), expected_rot, epsilon = 1e-6);
}

#[test]
fn test_regularization_zero_when_off_and_positive_otherwise() {
    let off = optimizer(CameraOptimizerMode::Off, 3, None);
    let mut losses = LossDict::new();
    off.get_loss_dict(&mut losses);
    assert!(losses.is_empty());
    assert_eq!(off.regularization(), 0.0);

    for mode in ACTIVE_MODES {
        let opt = optimizer(mode, 3, None);
        let mut losses = LossDict::new();
        opt.get_loss_dict(&mut losses);
        assert_eq!(losses["camera_opt_regularizer"], 0.0, "mode {mode}");

        set_row(&opt, 0, Vector6::new(0.0, 0.0, 0.0, 0.0, 0.01, 0.0));
        opt.get_loss_dict(&mut losses);
        assert!(losses["camera_opt_regularizer"] > 0.0, "mode {mode}");
    }
}

#[test]
fn test_regularization_value_matches_formula() {
    let config = CameraOptimizerConfig {
        penalty_scale: 2.0,
        ..CameraOptimizerConfig::with_mode(CameraOptimizerMode::SE3)
    };
    let opt = CameraOptimizer::new(config, 2, Device::Cpu, None).unwrap();
    set_row(&opt, 0, Vector6::new(3.0, 4.0, 0.0, 0.0, 0.0, 1.0));
    set_row(&opt, 1, Vector6::new(0.0, 0.0, 1.0, 0.0, 3.0, 0.0));

    // mean |t| = (5 + 1)/2 = 3, mean |r| = (1 + 3)/2 = 2
    let expected = (3.0 * 1e-2 + 2.0 * 1e-3) * 2.0;
    assert_relative_eq!(opt.regularization(), expected, epsilon = 1e-6);
}

#[test]
fn test_negative_penalty_scale_forces_off() {
    let config = CameraOptimizerConfig {
        penalty_scale: -1.0,
        ..CameraOptimizerConfig::with_mode(CameraOptimizerMode::SO3xR3)
    };
    let mut opt = CameraOptimizer::new(config, 3, Device::Cpu, Some(&[0])).unwrap();
    assert_eq!(opt.mode(), CameraOptimizerMode::Off);
    assert!(opt.parameters().is_empty());
    assert!(opt.corrections(&[0, 1, 2]).unwrap().iter().all(|m| *m == identity_3x4()));

    let mut metrics = MetricsDict::new();
    opt.get_metrics_dict(&mut metrics);
    assert!(metrics.is_empty());
}

#[test]
fn test_param_groups_per_mode() {
    let mut groups = ParamGroups::new();
    optimizer(CameraOptimizerMode::Off, 3, None).get_param_groups(&mut groups, DEFAULT_PARAM_GROUP);
    assert!(groups.is_empty());

    for mode in ACTIVE_MODES {
        let mut groups = ParamGroups::new();
        optimizer(mode, 3, None).get_param_groups(&mut groups, "poses");
        assert_eq!(groups["poses"].len(), 1, "mode {mode}");
    }
}

#[test]
fn test_metrics_reported_for_active_modes() {
    for mode in ACTIVE_MODES {
        let opt = optimizer(mode, 2, None);
        set_row(&opt, 0, Vector6::new(0.0, 3.0, 4.0, 0.0, 0.0, 0.0));
        let mut metrics = MetricsDict::new();
        opt.get_metrics_dict(&mut metrics);
        assert_relative_eq!(metrics["camera_opt_translation"], 5.0, epsilon = 1e-6);
        assert_eq!(metrics["camera_opt_rotation"], 0.0);
    }
}
