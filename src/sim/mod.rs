/// Model tree descriptors and their validation.
pub mod architecture;
/// Coupled models and routing tables.
pub mod coupled;
pub mod error;
/// Timestamped events and their priorities.
pub mod event;
/// The atomic model contract.
pub mod model;
pub mod params;
/// Wall-clock pacing on a kernel thread.
pub mod realtime;
/// Run driver, external event queue and run reports.
pub mod run;
pub mod simulator;
/// Simulated time, durations and units.
pub mod time;
pub mod variable;

// Re-export the main types for convenience
pub use architecture::{Architecture, ArchitectureBuilder, CreationMode};
pub use coupled::{CoupledModel, CouplingTables, ModelNode};
pub use error::{SimError, SimResult};
pub use event::{Event, EventContent, EventKind};
pub use model::{AtomicModel, InitContext, ModelReport, TransitionContext};
pub use params::{HostTracer, ParamValue, RunParameters};
pub use realtime::{RealTimeConfig, RealTimeScheduler, SchedulerHandle};
pub use run::{RunReport, SimulationRun, StopReason};
pub use simulator::{TraceRecord, TransitionKind};
pub use time::{Duration, Time, TimeUnit};
pub use variable::{StateBoard, Variable, VariableKey};
