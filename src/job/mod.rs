//! Job orchestration: planning, per-job render contexts, and batch runs.

pub mod batch;
pub mod render;
pub mod scene;

pub use batch::{BatchReport, run_batch};
pub use render::{JobKind, JobPlan, RenderContext, RenderJob, RenderStats, plan_job, run_job};
pub use scene::Scene;
