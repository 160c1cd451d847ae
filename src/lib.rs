pub mod broker;
pub mod chunk_plan;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod document;
pub mod engine;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod poller;
pub mod postprocess;
pub mod report;
pub mod runtime;
pub mod task;
pub mod util;
pub mod worker;
