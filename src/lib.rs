//! Runs the RISC-V architectural test suite on an external simulator and
//! checks every memory dump against its golden signature.

pub mod catalog;
pub mod compare;
pub mod driver;
pub mod orchestrator;
pub mod report;

pub use catalog::{Catalog, TestCase};
pub use compare::{compare_dump, Comparison, HexValue};
pub use driver::{Driver, SimOption, Simulator};
pub use orchestrator::{Orchestrator, RunOption, RunReport, RunSummary};
pub use report::{Console, Reporter};
