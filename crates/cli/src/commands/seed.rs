//! Seed the storefront catalog from a YAML file.
//!
//! Categories, products and coupons are upserted by slug (or code), so
//! running the same file twice leaves the catalog unchanged. Products and
//! coupons refer to categories and products by slug.
//!
//! ```yaml
//! categories:
//!   - { name: Teas, slug: teas }
//! products:
//!   - { category: teas, name: Sencha, slug: sencha, price: "12.50", stock: 40 }
//! coupons:
//!   - code: welcome10
//!     discount_type: percentage
//!     discount_value: "10"
//!     valid_from: 2026-01-01T00:00:00Z
//!     valid_to: 2026-12-31T23:59:59Z
//!     categories: [teas]
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use boutique_core::coupon::{Coupon, CouponScope, canonical_code};
use boutique_core::{CategoryId, CouponId, DiscountType, Money, ProductId};
use boutique_storefront::db::{PgStore, RepositoryError, Store, StoreTx, create_pool, finish};
use boutique_storefront::models::{NewCategory, NewProduct};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid catalog file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Unknown category slug: {0}")]
    UnknownCategory(String),

    #[error("Unknown product slug: {0}")]
    UnknownProduct(String),

    #[error("Invalid entry {0}: {1}")]
    Invalid(String, &'static str),
}

/// Catalog file contents.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub categories: Vec<NewCategory>,
    #[serde(default)]
    pub products: Vec<ProductSeed>,
    #[serde(default)]
    pub coupons: Vec<CouponSeed>,
}

#[derive(Debug, Deserialize)]
pub struct ProductSeed {
    /// Category slug.
    pub category: String,
    pub name: String,
    pub slug: String,
    pub price: Money,
    #[serde(default)]
    pub stock: i32,
}

#[derive(Debug, Deserialize)]
pub struct CouponSeed {
    pub code: String,
    #[serde(default)]
    pub description: String,
    pub discount_type: DiscountType,
    #[serde(default)]
    pub discount_value: Decimal,
    #[serde(default)]
    pub minimum_amount: Money,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    /// Zero means unlimited.
    #[serde(default)]
    pub max_usage: i32,
    #[serde(default = "enabled")]
    pub active: bool,
    #[serde(default)]
    pub single_use_per_user: bool,
    /// Category slugs the coupon is restricted to.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Product slugs the coupon is restricted to.
    #[serde(default)]
    pub products: Vec<String>,
}

const fn enabled() -> bool {
    true
}

/// What a seed run wrote.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub categories: usize,
    pub products: usize,
    pub coupons: usize,
}

/// Seed the catalog from a YAML file in one transaction.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, a slug is unknown,
/// or a database operation fails. Nothing is written on error.
pub async fn catalog(file_path: &str) -> Result<SeedSummary, SeedError> {
    let path = Path::new(file_path);
    info!(path = %file_path, "Loading catalog from file");

    // Read and parse before connecting to the database
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SeedError::Io {
            path: file_path.to_owned(),
            source,
        })?;
    let seed: CatalogSeed = serde_yaml::from_str(&content)?;

    let database_url =
        super::database_url().ok_or(SeedError::MissingEnvVar("STOREFRONT_DATABASE_URL"))?;
    let pool = create_pool(&database_url).await?;
    let store = PgStore::new(pool);

    let mut tx = store.begin().await?;
    let result = apply(tx.as_mut(), &seed).await;
    finish(tx, result).await
}

/// Upsert every entry of `seed`.
///
/// # Errors
///
/// Returns `SeedError::UnknownCategory`/`UnknownProduct` for dangling slugs
/// and `SeedError::Invalid` for inconsistent coupons.
pub async fn apply(tx: &mut dyn StoreTx, seed: &CatalogSeed) -> Result<SeedSummary, SeedError> {
    let mut categories: HashMap<String, CategoryId> = HashMap::new();
    for category in &seed.categories {
        let stored = tx.upsert_category(category).await?;
        categories.insert(stored.slug, stored.id);
    }

    let mut products: HashMap<String, ProductId> = HashMap::new();
    for product in &seed.products {
        if product.stock < 0 {
            return Err(SeedError::Invalid(product.slug.clone(), "stock is negative"));
        }
        let category_id = *categories
            .get(&product.category)
            .ok_or_else(|| SeedError::UnknownCategory(product.category.clone()))?;
        let stored = tx
            .upsert_product(&NewProduct {
                category_id,
                name: product.name.clone(),
                slug: product.slug.clone(),
                price: product.price.round_minor(),
                stock: product.stock,
            })
            .await?;
        products.insert(stored.slug, stored.id);
    }

    for coupon in &seed.coupons {
        let coupon = build_coupon(coupon, &categories, &products)?;
        let stored = tx.upsert_coupon(&coupon).await?;
        info!(code = %stored.code, "Coupon seeded");
    }

    Ok(SeedSummary {
        categories: seed.categories.len(),
        products: seed.products.len(),
        coupons: seed.coupons.len(),
    })
}

fn build_coupon(
    seed: &CouponSeed,
    categories: &HashMap<String, CategoryId>,
    products: &HashMap<String, ProductId>,
) -> Result<Coupon, SeedError> {
    let code = canonical_code(&seed.code);
    if code.is_empty() {
        return Err(SeedError::Invalid(seed.code.clone(), "code is empty"));
    }
    if seed.valid_to < seed.valid_from {
        return Err(SeedError::Invalid(code, "valid_to is before valid_from"));
    }
    if seed.discount_value.is_sign_negative() || seed.minimum_amount.is_negative() {
        return Err(SeedError::Invalid(code, "amounts must not be negative"));
    }
    if seed.discount_type == DiscountType::Percentage && seed.discount_value > Decimal::ONE_HUNDRED
    {
        return Err(SeedError::Invalid(code, "percentage is above 100"));
    }
    if seed.max_usage < 0 {
        return Err(SeedError::Invalid(code, "max_usage is negative"));
    }

    let scope = CouponScope {
        categories: seed
            .categories
            .iter()
            .map(|slug| {
                categories
                    .get(slug)
                    .copied()
                    .ok_or_else(|| SeedError::UnknownCategory(slug.clone()))
            })
            .collect::<Result<BTreeSet<_>, _>>()?,
        products: seed
            .products
            .iter()
            .map(|slug| {
                products
                    .get(slug)
                    .copied()
                    .ok_or_else(|| SeedError::UnknownProduct(slug.clone()))
            })
            .collect::<Result<BTreeSet<_>, _>>()?,
    };

    Ok(Coupon {
        id: CouponId::new(0),
        code,
        description: seed.description.clone(),
        discount_type: seed.discount_type,
        discount_value: seed.discount_value,
        minimum_amount: seed.minimum_amount,
        valid_from: seed.valid_from,
        valid_to: seed.valid_to,
        max_usage: seed.max_usage,
        used_count: 0,
        active: seed.active,
        single_use_per_user: seed.single_use_per_user,
        scope,
    })
}
