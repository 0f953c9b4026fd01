pub mod collapse;
pub mod config;
pub mod data_core;
pub mod drag;
pub mod edit_session;
pub mod mutation;
pub mod path;
pub mod performance;
pub mod search;
pub mod shadow_tree;
pub mod sort;
pub mod tree_state;
