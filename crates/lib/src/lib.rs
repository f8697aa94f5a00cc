//! buildbox-lib: sandboxed firmware builds for hosted watch projects
//!
//! A build turns a [`project::Project`] into a packaged binary:
//! - `workspace`: materialize the project into an isolated build directory
//! - `invoke`: run the SDK toolchain there under hard resource limits
//! - `archive` / `debug_info`: read sizes and debug maps from the outputs
//! - `pipeline`: drive a [`job::BuildJob`] to exactly one terminal state
//!
//! Results are stored per job through `store`; `worker` runs many jobs at once.

pub mod archive;
pub mod config;
pub mod consts;
pub mod debug_info;
pub mod events;
pub mod invoke;
pub mod job;
pub mod manifest;
pub mod paths;
pub mod pipeline;
pub mod preprocess;
pub mod project;
pub mod store;
pub mod target;
pub mod util;
pub mod worker;
pub mod workspace;
