//! Command implementations

pub mod backup;
pub mod instance;
pub mod module;
pub mod serve;
pub mod tier;
