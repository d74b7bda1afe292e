// Cloud explorer library - exposes all core modules for hosts and tests

pub mod config;
pub mod services;
pub mod view;
