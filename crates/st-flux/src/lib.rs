pub mod beliefs;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod fusion;
pub mod intake;
pub mod kernels;
pub mod planner;
pub mod profiler;
pub mod sensors;
pub mod task;
pub mod telemetry;

pub use beliefs::BeliefStore;
pub use config::EngineConfig;
pub use engine::{Engine, ExecutionReport};
pub use error::{EngineError, Result};
pub use planner::{ExecutionPlan, PlanStep};
pub use profiler::DataProfile;
pub use sensors::{SensorContext, SensorOracle};
pub use task::{BufferMut, BufferRef, GemmDims, Task, TaskKind};
