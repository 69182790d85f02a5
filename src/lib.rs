pub mod xtc_pipeline;
pub mod logger;
