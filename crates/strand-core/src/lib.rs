//! Particle-based strand simulation: XPBD ropes and bone chains plus a PBF
//! fluid stage, sharing one particle arena.
//!
//! Actors ([`rope::Rope`], [`bone::Bone`]) are built from blueprints, bind
//! to a [`solver::Solver`] and own their constraint batches; the solver runs
//! the fixed-order substep loop over every batch of every actor. Topology
//! changes (tearing) happen through actor hooks between substeps.

pub mod actor;
pub mod blueprint;
pub mod bone;
pub mod config;
pub mod constraints;
pub mod fluids;
pub mod grid;
pub mod math;
pub mod observer;
pub mod particle;
pub mod rope;
pub mod solver;

pub use actor::Actor;
pub use blueprint::{BlueprintError, BoneBlueprint, BonePose, PropertyCurve, RopeBlueprint};
pub use bone::Bone;
pub use config::SolverConfig;
pub use observer::{NoOpStepObserver, StepObserver};
pub use particle::ParticleStore;
pub use rope::{Rope, RopeTornEvent, StructuralElement};
pub use solver::Solver;
