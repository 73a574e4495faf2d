//! procshim shared - code for both sides of the helper boundary
//!
//! This crate contains the error taxonomy, protocol constants, on-disk
//! layout and serialisable process spec used by the supervisor (procshim)
//! and the helper process it launches.

pub mod constants;
pub mod errors;
pub mod layout;
pub mod spec;

pub use errors::{ShimError, ShimResult, SupervisorError};
pub use layout::ProcessLayout;
pub use spec::{PreparedSpec, ProcessSpec, TtySpec, User, WindowSize};
