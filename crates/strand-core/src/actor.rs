use crate::solver::Solver;

/// A simulated object (rope, bone hierarchy) bound to a solver.
///
/// The solver drives these hooks from [`Solver::step`]; actors use them to
/// refresh constraint data from external state, run topology changes such
/// as tearing, and write results back out.
pub trait Actor {
    /// Called once per frame before anything else. Dirty constraint data
    /// should be regenerated here.
    fn prepare_frame(&mut self, solver: &mut Solver) {
        let _ = solver;
    }

    /// Called once per frame after `prepare_frame`, before the first
    /// substep.
    fn begin_step(&mut self, solver: &mut Solver, step_time: f32, substeps: u32) {
        let _ = (solver, step_time, substeps);
    }

    /// Called at the end of every substep, after the velocity update.
    /// Tearing happens here.
    fn substep(&mut self, solver: &mut Solver, substep_time: f32) {
        let _ = (solver, substep_time);
    }

    /// Called once per frame after the last substep.
    fn end_step(&mut self, solver: &mut Solver, substep_time: f32) {
        let _ = (solver, substep_time);
    }
}
