pub mod completions;
pub mod config;
pub mod root;
pub mod transfer;
pub mod tree;
