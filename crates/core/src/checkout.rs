//! Shipping details captured at checkout.

use serde::{Deserialize, Serialize};

/// Errors found while validating [`ShippingInfo`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ShippingInfoError {
    /// A required field is blank.
    #[error("{field} is required")]
    Missing {
        /// Name of the blank field.
        field: &'static str,
    },
    /// A field exceeds its column length.
    #[error("{field} must be at most {max} characters")]
    TooLong {
        /// Name of the offending field.
        field: &'static str,
        /// Maximum allowed length.
        max: usize,
    },
    /// The email has no local part, no domain, or no @ symbol.
    #[error("email address is invalid")]
    InvalidEmail,
}

/// Where an order ships and who to contact about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub address: String,
    pub postal_code: String,
    pub city: String,
}

impl ShippingInfo {
    /// Maximum length of an email address (RFC 5321).
    pub const MAX_EMAIL_LENGTH: usize = 254;

    /// Trim every field and check presence, lengths and email shape.
    ///
    /// # Errors
    ///
    /// Returns the first [`ShippingInfoError`] found, in field order.
    pub fn normalized(&self) -> Result<Self, ShippingInfoError> {
        let first_name = required("first_name", &self.first_name, 50)?;
        let last_name = required("last_name", &self.last_name, 50)?;
        let email = required("email", &self.email, Self::MAX_EMAIL_LENGTH)?;
        let address = required("address", &self.address, 250)?;
        let postal_code = required("postal_code", &self.postal_code, 20)?;
        let city = required("city", &self.city, 100)?;

        match email.split_once('@') {
            Some((local, domain))
                if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {}
            _ => return Err(ShippingInfoError::InvalidEmail),
        }

        Ok(Self {
            first_name,
            last_name,
            email: email.to_lowercase(),
            address,
            postal_code,
            city,
        })
    }
}

fn required(field: &'static str, value: &str, max: usize) -> Result<String, ShippingInfoError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ShippingInfoError::Missing { field });
    }
    if value.chars().count() > max {
        return Err(ShippingInfoError::TooLong { field, max });
    }
    Ok(value.to_owned())
}
