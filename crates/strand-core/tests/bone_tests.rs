use std::collections::HashSet;

use glam::{Quat, Vec3};
use strand_core::actor::Actor;
use strand_core::blueprint::{BlueprintError, BoneBlueprint, BonePose, PropertyCurve};
use strand_core::bone::Bone;
use strand_core::observer::NoOpStepObserver;
use strand_core::solver::Solver;

const DT: f32 = 1.0 / 60.0;

/// Straight chain of `n` bones spaced 1 apart along +y.
fn chain_blueprint(n: usize) -> BoneBlueprint {
    let poses: Vec<BonePose> = (0..n)
        .map(|i| BonePose::new(Vec3::new(0.0, i as f32, 0.0), Quat::IDENTITY))
        .collect();
    let parents: Vec<Option<usize>> = (0..n)
        .map(|i| if i == 0 { None } else { Some(i - 1) })
        .collect();
    BoneBlueprint::new(poses, parents).unwrap()
}

#[test]
fn test_blueprint_validation() {
    let one = vec![BonePose::new(Vec3::ZERO, Quat::IDENTITY)];
    assert!(matches!(
        BoneBlueprint::new(one, vec![None]),
        Err(BlueprintError::HierarchyTooSmall)
    ));

    let poses = vec![
        BonePose::new(Vec3::ZERO, Quat::IDENTITY),
        BonePose::new(Vec3::Y, Quat::IDENTITY),
    ];
    assert!(matches!(
        BoneBlueprint::new(poses.clone(), vec![None]),
        Err(BlueprintError::MismatchedParents { .. })
    ));
    // a bone cannot parent itself or a later bone:
    assert!(matches!(
        BoneBlueprint::new(poses, vec![None, Some(1)]),
        Err(BlueprintError::InvalidParent { bone: 1 })
    ));
}

#[test]
fn test_blueprint_normalized_lengths() {
    let blueprint = chain_blueprint(3);
    assert_eq!(blueprint.normalized_lengths[0], 0.0);
    assert!((blueprint.normalized_lengths[1] - 0.5).abs() < 1e-6);
    assert!((blueprint.normalized_lengths[2] - 1.0).abs() < 1e-6);
}

#[test]
fn test_property_curve_interpolates_and_clamps() {
    let curve = PropertyCurve::from_keys(2.0, vec![(0.0, 0.0), (1.0, 1.0)]);
    assert_eq!(curve.evaluate(0.5), 1.0);
    assert_eq!(curve.evaluate(-1.0), 0.0);
    assert_eq!(curve.evaluate(2.0), 2.0);

    let baked = curve.bake(&[0.0, 0.25, 1.0]);
    assert_eq!(baked, vec![0.0, 0.5, 2.0]);

    let flat = PropertyCurve::constant(3.0);
    assert_eq!(flat.evaluate(0.7), 3.0);
}

#[test]
fn test_fixed_root_tracks_animation_exactly() {
    let mut solver = Solver::new();
    let mut bone = Bone::new(&mut solver, &chain_blueprint(3));

    let target = BonePose::new(Vec3::new(0.5, 0.0, 0.0), Quat::IDENTITY);
    for _ in 0..30 {
        bone.set_pose(0, target);
        solver.step(&mut [&mut bone as &mut dyn Actor], DT, 4, &mut NoOpStepObserver);
    }

    let root = bone.solver_indices()[0] as usize;
    assert_eq!(solver.particles.position[root], target.position);
    assert_eq!(bone.pose(0).position, target.position);
}

#[test]
fn test_skin_keeps_particles_near_pose() {
    let mut solver = Solver::new();
    let mut bone = Bone::new(&mut solver, &chain_blueprint(4));

    bone.curves_mut().skin_compliance = PropertyCurve::constant(0.0);
    bone.curves_mut().skin_radius = PropertyCurve::constant(0.05);

    let targets: Vec<BonePose> = (0..4)
        .map(|i| BonePose::new(Vec3::new(0.0, i as f32, 0.0), Quat::IDENTITY))
        .collect();

    for _ in 0..120 {
        for (i, t) in targets.iter().enumerate() {
            bone.set_pose(i, *t);
        }
        solver.step(&mut [&mut bone as &mut dyn Actor], DT, 4, &mut NoOpStepObserver);
    }

    for (i, t) in targets.iter().enumerate() {
        let g = bone.solver_indices()[i] as usize;
        let distance = (solver.particles.position[g] - t.position).length();
        assert!(
            distance < 0.08,
            "bone {} drifted {} from its skin target",
            i,
            distance
        );
    }
}

#[test]
fn test_unstretchable_bones_keep_lengths_on_write_back() {
    let mut solver = Solver::new();
    let mut bone = Bone::new(&mut solver, &chain_blueprint(4));
    bone.stretch_bones = false;
    // soft skin, so gravity actually bends the chain:
    bone.curves_mut().skin_compliance = PropertyCurve::constant(5.0);

    let targets: Vec<BonePose> = (0..4)
        .map(|i| BonePose::new(Vec3::new(0.0, i as f32, 0.0), Quat::IDENTITY))
        .collect();

    for _ in 0..60 {
        for (i, t) in targets.iter().enumerate() {
            bone.set_pose(i, *t);
        }
        solver.step(&mut [&mut bone as &mut dyn Actor], DT, 4, &mut NoOpStepObserver);
    }

    for i in 1..4 {
        let length = (bone.pose(i).position - bone.pose(i - 1).position).length();
        assert!(
            (length - 1.0).abs() < 1e-3,
            "bone {} length not preserved: {}",
            i,
            length
        );
    }
}

#[test]
fn test_edge_batches_never_share_a_bone() {
    let mut solver = Solver::new();
    let _bone = Bone::new(&mut solver, &chain_blueprint(6));

    for batch in &solver.stretch_shear {
        let mut seen = HashSet::new();
        for c in 0..batch.active_count() {
            for &p in &batch.particle_indices[c * 2..c * 2 + 2] {
                assert!(seen.insert(p), "bone {} twice in one stretch-shear batch", p);
            }
        }
    }

    for batch in &solver.bend_twist {
        let mut seen = HashSet::new();
        for c in 0..batch.active_count() {
            for &q in &batch.orientation_indices[c * 2..c * 2 + 2] {
                assert!(seen.insert(q), "bone {} twice in one bend-twist batch", q);
            }
        }
    }

    // a chain needs at least two batches per kind:
    assert!(solver.stretch_shear.len() >= 2);
    assert!(solver.bend_twist.len() >= 2);
}

#[test]
fn test_reset_to_current_shape() {
    let mut solver = Solver::new();
    let mut bone = Bone::new(&mut solver, &chain_blueprint(3));

    bone.set_pose(2, BonePose::new(Vec3::new(1.0, 2.0, 3.0), Quat::IDENTITY));
    bone.reset_to_current_shape(&mut solver);

    let g = bone.solver_indices()[2] as usize;
    assert_eq!(solver.particles.position[g], Vec3::new(1.0, 2.0, 3.0));
    assert_eq!(solver.particles.velocity[g], Vec3::ZERO);
}

#[test]
fn test_simulated_chain_stays_finite() {
    let mut solver = Solver::new();
    let mut bone = Bone::new(&mut solver, &chain_blueprint(5));
    bone.curves_mut().skin_compliance = PropertyCurve::constant(2.0);
    bone.curves_mut().plastic_yield = PropertyCurve::constant(0.1);
    bone.curves_mut().plastic_creep = PropertyCurve::constant(0.5);

    for _ in 0..300 {
        solver.step(&mut [&mut bone as &mut dyn Actor], DT, 4, &mut NoOpStepObserver);
    }

    for &g in bone.solver_indices() {
        let g = g as usize;
        assert!(solver.particles.position[g].is_finite());
        assert!(solver.particles.orientation[g].is_finite());
    }
}
