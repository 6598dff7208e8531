use anyhow::{Context, Result};

const DEFAULT_MEMBER_CODE_PREFIX: &str = "KSP";

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub database_url: String,
    pub http_addr: String,
    pub member_code_prefix: String,
}

impl ServiceConfig {
    pub fn from_env(default_http_addr: &str) -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let http_addr =
            std::env::var("HTTP_ADDR").unwrap_or_else(|_| default_http_addr.to_string());
        let member_code_prefix = std::env::var("KSP_MEMBER_CODE_PREFIX")
            .ok()
            .filter(|prefix| !prefix.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MEMBER_CODE_PREFIX.to_string());

        Ok(Self {
            database_url,
            http_addr,
            member_code_prefix,
        })
    }
}
