pub mod dba;
pub mod error;
pub mod history;
pub mod onu;
pub mod simulator;
pub mod tcont;

// Re-export for easier testing
pub use dba::{Allocation, DbaEngine, Group};
pub use error::DbaError;
pub use onu::{Burst, Onu, OnuMetrics};
pub use simulator::{Arrival, CycleDriver, CycleRecord, SimulationLoop};
pub use tcont::{ClassTable, TrafficClass};
