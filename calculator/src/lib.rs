mod calculate;
mod load;
pub mod model;
pub mod policy;
mod report;

pub use calculate::{calculate, CalculateOptions};
pub use load::load_result_stores;
pub use report::{
    load_verdict, render_table, report, write_verdict, VerdictExitCode, VERDICT_FILE_NAME,
};
