//! CLI subcommands.

pub mod migrate;
pub mod seed;

use secrecy::SecretString;

/// Read the storefront database URL (`STOREFRONT_DATABASE_URL`, falling back
/// to `DATABASE_URL`).
pub fn database_url() -> Option<SecretString> {
    dotenvy::dotenv().ok();

    ["STOREFRONT_DATABASE_URL", "DATABASE_URL"]
        .into_iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
        .map(SecretString::from)
}
