pub mod app;
pub mod clipboard;
pub mod command;
pub mod error;
pub mod model;
pub mod msg;
pub mod storage;
pub mod workspace;
