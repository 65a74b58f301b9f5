pub mod context;
pub mod orchestrator;
pub mod recorder;
pub mod trap;

pub use context::{ContextAssembler, PriorTurn};
pub use orchestrator::{TurnOrchestrator, TurnRequest};
pub use recorder::{RecorderSettings, TurnRecorder};
pub use trap::{TrapCatalog, TrapGate, TurnOutcome};
