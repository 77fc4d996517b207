use crate::constraints::ConstraintKind;
use crate::particle::ParticleStore;

/// Hooks into the solver step loop, for instrumentation and diagnostics.
///
/// All methods have empty default implementations, so implementors only
/// override the phases they care about.
pub trait StepObserver {
    /// Called after forces are integrated and positions predicted, once per
    /// substep.
    fn on_integrate(&mut self, _particles: &ParticleStore, _dt: f32) {}

    /// Called after each constraint kind finishes its evaluate/apply pass.
    fn on_constraint_pass(&mut self, _kind: ConstraintKind, _particles: &ParticleStore) {}

    /// Called after the velocity update at the end of each substep.
    fn on_substep_complete(&mut self, _particles: &ParticleStore, _dt: f32) {}

    /// Called once per frame after all substeps and actor hooks have run.
    fn on_step_complete(&mut self, _particles: &ParticleStore, _step_time: f32) {}
}

/// Observer that does nothing. Use when no instrumentation is needed.
pub struct NoOpStepObserver;

impl StepObserver for NoOpStepObserver {}
