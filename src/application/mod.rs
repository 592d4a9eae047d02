//! Application layer - Use cases and orchestration
//!
//! This layer contains:
//! - Errors: error types shared across the runtime
//! - Publish: the command re-publication seam invoked after reload passes

pub mod errors;
pub mod publish;
