//! Natural-language questions about a training institute's data, answered by
//! generating, sanitizing and executing read-only SQL.

pub mod api;
pub mod chain;
pub mod config;
pub mod database;
pub mod error;
pub mod executor;
pub mod generator;
pub mod llm;
pub mod normalizer;
pub mod pivot;
pub mod renderer;
pub mod retry;
pub mod schema;
pub mod shortcuts;
pub mod text_to_sql_chain;
pub mod validator;
