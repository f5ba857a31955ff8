//! CLI command implementations

pub mod augment;
pub mod evaluate;
pub mod inspect;
pub mod predict;
pub mod remote;
pub mod report;
pub mod train;
