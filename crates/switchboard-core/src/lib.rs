pub mod audit;
pub mod extract;
pub mod llm;
pub mod repository;
pub mod service;
pub mod vault;
