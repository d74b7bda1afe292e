//! Services: listing backends, contributors and process-wide setup

pub mod actions;
pub mod cloud;
pub mod contributors;
pub mod tracing_setup;
