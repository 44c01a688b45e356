use anyhow::Error;
use async_trait::async_trait;

use crate::config::Config;

#[async_trait]
pub trait Chain {
    async fn initialize(config: &Config) -> Result<Self, Error>
    where
        Self: Sized;

    async fn run(&self, input: String) -> Result<String, Error>;
}
