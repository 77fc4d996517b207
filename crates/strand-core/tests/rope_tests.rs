use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;

use glam::Vec3;
use strand_core::actor::Actor;
use strand_core::blueprint::{BlueprintError, RopeBlueprint};
use strand_core::math::rest_bending_constraint;
use strand_core::observer::NoOpStepObserver;
use strand_core::rope::Rope;
use strand_core::solver::Solver;

const DT: f32 = 1.0 / 60.0;

fn straight_blueprint(pool: usize) -> RopeBlueprint {
    let path = [Vec3::ZERO, Vec3::new(0.9, 0.0, 0.0)];
    RopeBlueprint::from_path(&path, 0.05, 1.0, 0.1, pool).unwrap()
}

#[test]
fn test_blueprint_sampling() {
    let blueprint = straight_blueprint(0);
    assert_eq!(blueprint.particle_count(), 10);
    assert!(!blueprint.closed);
    assert!((blueprint.inter_particle_distance - 0.1).abs() < 1e-5);

    // particles are evenly spaced along the path:
    for w in blueprint.positions.windows(2) {
        assert!(((w[1] - w[0]).length() - 0.1).abs() < 1e-4);
    }
}

#[test]
fn test_blueprint_detects_closed_path() {
    let square = [
        Vec3::ZERO,
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(1.0, 1.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
        Vec3::ZERO,
    ];
    let blueprint = RopeBlueprint::from_path(&square, 0.05, 1.0, 0.1, 0).unwrap();
    assert!(blueprint.closed);
    assert_eq!(blueprint.particle_count(), 40);
}

#[test]
fn test_blueprint_rejects_bad_input() {
    let path = [Vec3::ZERO, Vec3::X];
    assert!(matches!(
        RopeBlueprint::from_path(&path, 0.0, 1.0, 0.1, 0),
        Err(BlueprintError::InvalidSampling { .. })
    ));
    assert!(matches!(
        RopeBlueprint::from_path(&path, 0.05, 1.0, 0.0, 0),
        Err(BlueprintError::InvalidMass(_))
    ));
    assert!(matches!(
        RopeBlueprint::from_path(&[Vec3::ZERO], 0.05, 1.0, 0.1, 0),
        Err(BlueprintError::PathTooShort)
    ));
}

#[test]
fn test_rope_rest_length() {
    let mut solver = Solver::new();
    let rope = Rope::new(&mut solver, &straight_blueprint(0));
    assert!((rope.rest_length() - 0.9).abs() < 1e-4, "{}", rope.rest_length());
    assert_eq!(rope.elements.len(), 9);
}

fn assert_batches_disjoint(solver: &Solver) {
    for batch in &solver.distance {
        let mut seen = HashSet::new();
        for c in 0..batch.active_count() {
            for &p in &batch.particle_indices[c * 2..c * 2 + 2] {
                assert!(seen.insert(p), "particle {} twice in one distance batch", p);
            }
        }
    }

    for batch in &solver.bending {
        let mut seen = HashSet::new();
        for c in 0..batch.active_count() {
            for &p in &batch.particle_indices[c * 3..c * 3 + 3] {
                assert!(seen.insert(p), "particle {} twice in one bending batch", p);
            }
        }
    }
}

#[test]
fn test_batches_never_share_a_particle() {
    let mut solver = Solver::new();
    let _rope = Rope::new(&mut solver, &straight_blueprint(0));

    assert_batches_disjoint(&solver);
}

#[test]
fn test_batches_stay_disjoint_after_tear() {
    let mut solver = Solver::new();
    let mut rope = Rope::new(&mut solver, &straight_blueprint(4));

    assert!(rope.tear(&mut solver, 4));
    rope.rebuild_constraints_from_elements(&mut solver);

    assert_batches_disjoint(&solver);

    // every element keeps a distance constraint; the hinge across the
    // split disappears:
    let active_distance: usize = solver.distance.iter().map(|b| b.active_count()).sum();
    let active_bends: usize = solver.bending.iter().map(|b| b.active_count()).sum();
    assert_eq!(active_distance, rope.elements.len());
    assert_eq!(active_bends, 7);
}

#[test]
fn test_closed_rope_gets_loop_closing_batches() {
    let square = [
        Vec3::ZERO,
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(1.0, 1.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
        Vec3::ZERO,
    ];
    let blueprint = RopeBlueprint::from_path(&square, 0.05, 1.0, 0.1, 0).unwrap();
    let mut solver = Solver::new();
    let rope = Rope::new(&mut solver, &blueprint);

    assert_eq!(rope.elements.len(), 40);
    assert_eq!(solver.distance.len(), 3);
    assert_eq!(solver.bending.len(), 5);
    assert_eq!(solver.distance[2].active_count(), 1);
    assert_eq!(solver.bending[3].active_count(), 1);
    assert_eq!(solver.bending[4].active_count(), 1);

    // seam hinges get their rest bend from rest geometry, like interior ones:
    for batch in [&solver.bending[3], &solver.bending[4]] {
        let expected = rest_bending_constraint(
            solver.particles.rest_position[batch.particle_indices[0] as usize],
            solver.particles.rest_position[batch.particle_indices[1] as usize],
            solver.particles.rest_position[batch.particle_indices[2] as usize],
        );
        assert!((batch.rest_bends[0] - expected).abs() < 1e-6);
    }
    // the sampled square starts on a corner, so that seam hinge is bent at
    // rest rather than straight:
    assert!(
        solver.bending[4].rest_bends[0] > 0.04,
        "corner seam rest bend too small: {}",
        solver.bending[4].rest_bends[0]
    );
}

#[test]
fn test_tear_splits_and_redirects_element() {
    let mut solver = Solver::new();
    let mut rope = Rope::new(&mut solver, &straight_blueprint(4));

    let split = rope.elements[4].particle1 as usize;
    let inv_mass_before = solver.particles.inv_mass[split];

    assert!(rope.tear(&mut solver, 4));

    let new_index = rope.solver_indices()[10];
    assert_eq!(rope.active_particle_count(), 11);
    assert_eq!(rope.elements[4].particle1, new_index);
    assert_eq!(rope.elements.len(), 9, "tearing must not change element count");

    // mass is split between the two halves:
    assert!((solver.particles.inv_mass[split] - inv_mass_before * 2.0).abs() < 1e-6);
    assert!(
        (solver.particles.inv_mass[new_index as usize] - inv_mass_before * 2.0).abs() < 1e-6
    );
}

#[test]
fn test_tear_refuses_kinematic_first_particle() {
    let mut solver = Solver::new();
    let mut rope = Rope::new(&mut solver, &straight_blueprint(4));

    let anchor = rope.solver_indices()[0] as usize;
    solver.particles.inv_mass[anchor] = 0.0;

    assert!(!rope.tear(&mut solver, 0));
    assert_eq!(rope.active_particle_count(), 10);
}

#[test]
fn test_tear_refuses_when_pool_exhausted() {
    let mut solver = Solver::new();
    let mut rope = Rope::new(&mut solver, &straight_blueprint(0));

    assert!(!rope.tear(&mut solver, 4));
    assert_eq!(rope.active_particle_count(), 10);
}

#[test]
fn test_tear_refuses_already_split_predecessor() {
    let mut solver = Solver::new();
    let mut rope = Rope::new(&mut solver, &straight_blueprint(4));

    assert!(rope.tear(&mut solver, 4));
    // element 5 is still continuous with element 4's second particle:
    assert!(rope.tear(&mut solver, 5));
    // after its own split, element 5 no longer connects to its predecessor:
    assert!(!rope.tear(&mut solver, 5));
}

#[test]
fn test_overstressed_rope_tears_once_per_substep() {
    let mut solver = Solver::new();
    solver.config.gravity = Vec3::ZERO;
    let mut rope = Rope::new(&mut solver, &straight_blueprint(4));

    let anchor = rope.solver_indices()[0] as usize;
    solver.particles.inv_mass[anchor] = 0.0;

    // stretch the rope to double its rest length:
    for (k, &g) in rope.solver_indices()[..10].iter().enumerate() {
        let g = g as usize;
        let stretched = Vec3::new(0.2 * k as f32, 0.0, 0.0);
        solver.particles.position[g] = stretched;
        solver.particles.predicted[g] = stretched;
        solver.particles.velocity[g] = Vec3::ZERO;
    }

    rope.tearing_enabled = true;
    rope.tear_resistance_multiplier = 1.0;
    rope.tear_rate = 1;

    let torn = Rc::new(Cell::new(0u32));
    let counter = torn.clone();
    rope.on_torn(move |event| {
        assert!(event.element.constraint_force < 0.0, "torn under compression?");
        counter.set(counter.get() + 1);
    });

    solver.step(&mut [&mut rope as &mut dyn Actor], DT, 1, &mut NoOpStepObserver);

    assert_eq!(torn.get(), 1, "expected exactly one tear in one substep");
    assert_eq!(rope.active_particle_count(), 11);
    assert_eq!(rope.elements.len(), 9);
}

#[test]
fn test_tunable_edits_rebuild_constraints_lazily() {
    let mut solver = Solver::new();
    let mut rope = Rope::new(&mut solver, &straight_blueprint(0));

    rope.set_stretch_compliance(0.01);
    // not visible until the next step regenerates the batches:
    assert_eq!(solver.distance[0].stiffnesses[0].x, 0.0);

    solver.step(&mut [&mut rope as &mut dyn Actor], DT, 1, &mut NoOpStepObserver);
    assert_eq!(solver.distance[0].stiffnesses[0].x, 0.01);
}

#[test]
fn test_rebuild_elements_from_constraints_roundtrip() {
    let mut solver = Solver::new();
    let mut rope = Rope::new(&mut solver, &straight_blueprint(0));

    let before: Vec<(u32, u32)> = rope
        .elements
        .iter()
        .map(|e| (e.particle1, e.particle2))
        .collect();

    rope.rebuild_elements_from_constraints(&mut solver);

    let after: Vec<(u32, u32)> = rope
        .elements
        .iter()
        .map(|e| (e.particle1, e.particle2))
        .collect();
    assert_eq!(before, after);
}
