pub mod config;
pub mod ids;
pub mod links;
pub mod mode;
pub mod outline;
pub mod tree;
