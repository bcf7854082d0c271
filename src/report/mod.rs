pub mod checks;
pub mod writer;

pub use checks::{CheckRecord, Checks, ScenarioReport, Verdict};
pub use writer::VerdictWriter;
