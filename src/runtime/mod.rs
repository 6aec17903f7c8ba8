//! Runtime system
//!
//! Threads, the scheduler that drives them, the primitive registry and the
//! stage of targets the primitives act on.

pub mod events;
pub mod ids;
pub mod primitives;
pub mod scheduler;
pub mod stage;
pub mod thread;
pub mod uid;
pub mod value;

pub use events::{EventSubscriber, RuntimeEvent, WorkerStatus};
pub use ids::{ReplyToken, ScriptId, TargetId, ThreadId, TokenGenerator};
pub use primitives::{BlockError, BlockPackage, BlockUtility, HatInfo, PrimitiveExport, PrimitiveRegistry};
pub use scheduler::{HatMatch, Scheduler, SchedulerConfig, SchedulerError, StepReport};
pub use stage::{Stage, Target, TargetSpec};
pub use thread::{StackFrame, Thread, ThreadStatus};
pub use value::{BlockArgs, Value};
