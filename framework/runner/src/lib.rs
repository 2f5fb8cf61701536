mod catalog;
mod collector;
mod config;
mod executor;
mod monitor;
mod process_group;
mod progress;
mod shutdown;
mod timing_tool;

pub mod prelude {
    pub use crate::catalog::{load as load_catalog, CatalogError, Scenario, SCENARIO_FILE_NAME};
    pub use crate::collector::{
        CollectionCause, CollectionError, CollectionReport, SampleCollector,
    };
    pub use crate::config::{
        CollectorConfig, DEFAULT_BACKGROUND_LOAD_THRESHOLD, DEFAULT_SCENARIO_TIMEOUT,
    };
    pub use crate::executor::{Executor, Interruption};
    pub use crate::shutdown::{ShutdownHandle, ShutdownListener};
    pub use crate::timing_tool::{hyperfine_path, Hyperfine, PERF_GATE_HYPERFINE_PATH_ENV};
}
