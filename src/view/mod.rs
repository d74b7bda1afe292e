//! View layer
//!
//! The explorer tree model and the host-side state that presents it.

pub mod explorer_tree;
