pub mod audit;
pub mod config;
pub mod llm;
pub mod sqlite;
