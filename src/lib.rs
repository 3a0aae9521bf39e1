pub mod catalog;
pub mod config;
pub mod fuzzer;
pub mod llm;
