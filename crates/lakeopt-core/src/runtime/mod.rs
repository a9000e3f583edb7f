pub mod manager;
pub mod runner;
pub mod storage;
pub mod types;
