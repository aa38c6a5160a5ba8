// Library for tests to access modules

pub mod assembler;
pub mod budget;
pub mod cli;
pub mod config;
pub mod correlator;
pub mod demo;
pub mod detail;
pub mod docker_repo;
pub mod enumerator;
pub mod error;
pub mod export;
pub mod models;
pub mod nvml_repo;
pub mod process_repo;
pub mod triton;
pub mod ui;
pub mod version;
pub mod worker;
