//! Operator input checks that run before any request is issued.

use chrono::NaiveDate;
use shared::{
    domain::{OrderId, TelegramId},
    protocol::{Address, NewOrder, Parcel},
};
use thiserror::Error;

pub const MAX_DISCOUNT_PERCENT: u8 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Please enter a valid amount")]
    InvalidAmount { raw: String },
    #[error("Discount must be a whole number between 0 and 100")]
    InvalidDiscount { raw: String },
    #[error("{field} is required")]
    MissingField { field: &'static str },
    #[error("{field} '{raw}' is not a valid identifier")]
    InvalidPathId { field: &'static str, raw: String },
    #[error("Please enter a valid Telegram ID")]
    InvalidTelegramId { raw: String },
    #[error("{side} {field} is required")]
    MissingAddressField {
        side: &'static str,
        field: &'static str,
    },
    #[error("Parcel {field} must be a positive number")]
    InvalidDimension { field: &'static str, raw: String },
    #[error("Invalid date '{raw}', expected YYYY-MM-DD")]
    InvalidDate { raw: String },
    #[error("Start date {from} is after end date {to}")]
    InvertedDateRange { from: NaiveDate, to: NaiveDate },
    #[error("Order {0} is already refunded")]
    AlreadyRefunded(OrderId),
    #[error("Order {0} is not paid and cannot be refunded")]
    NotRefundable(OrderId),
}

/// Parses a positive, finite money amount.
pub fn parse_amount(raw: &str) -> Result<f64, InputError> {
    let invalid = || InputError::InvalidAmount {
        raw: raw.to_string(),
    };
    let amount: f64 = raw.trim().parse().map_err(|_| invalid())?;
    if !amount.is_finite() || amount <= 0.0 {
        return Err(invalid());
    }
    Ok(amount)
}

/// Parses a whole discount percentage in `0..=100`.
pub fn parse_discount(raw: &str) -> Result<u8, InputError> {
    let invalid = || InputError::InvalidDiscount {
        raw: raw.to_string(),
    };
    let value: i64 = raw.trim().parse().map_err(|_| invalid())?;
    if !(0..=i64::from(MAX_DISCOUNT_PERCENT)).contains(&value) {
        return Err(invalid());
    }
    u8::try_from(value).map_err(|_| invalid())
}

pub fn require_text<'a>(field: &'static str, raw: &'a str) -> Result<&'a str, InputError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(InputError::MissingField { field });
    }
    Ok(trimmed)
}

/// Required text that becomes one URL path segment. Dot segments would be
/// collapsed by URL normalization and address a different endpoint.
pub fn require_path_id<'a>(field: &'static str, raw: &'a str) -> Result<&'a str, InputError> {
    let id = require_text(field, raw)?;
    if matches!(id, "." | "..") {
        return Err(InputError::InvalidPathId {
            field,
            raw: id.to_string(),
        });
    }
    Ok(id)
}

pub fn parse_telegram_id(raw: &str) -> Result<TelegramId, InputError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .map(TelegramId)
        .ok_or_else(|| InputError::InvalidTelegramId {
            raw: raw.to_string(),
        })
}

fn parse_dimension(field: &'static str, raw: &str) -> Result<f64, InputError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value > 0.0)
        .ok_or_else(|| InputError::InvalidDimension {
            field,
            raw: raw.to_string(),
        })
}

/// Address as typed into the order form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressDraft {
    pub name: String,
    pub street1: String,
    pub street2: Option<String>,
    pub city: String,
    pub state: String,
    pub zip: String,
    /// Blank means `US`.
    pub country: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl AddressDraft {
    fn validate(&self, side: &'static str) -> Result<Address, InputError> {
        let required = |field: &'static str, raw: &str| {
            require_text(field, raw)
                .map(str::to_string)
                .map_err(|_| InputError::MissingAddressField { side, field })
        };
        let optional = |raw: &Option<String>| optional_text(raw.as_deref()).map(str::to_string);
        Ok(Address {
            name: required("name", &self.name)?,
            street1: required("street", &self.street1)?,
            street2: optional(&self.street2),
            city: required("city", &self.city)?,
            state: required("state", &self.state)?,
            zip: required("zip", &self.zip)?,
            country: optional_text(Some(self.country.as_str()))
                .unwrap_or("US")
                .to_uppercase(),
            phone: optional(&self.phone),
            email: optional(&self.email),
        })
    }
}

/// Parcel dimensions as typed; units fall back to inches and pounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParcelDraft {
    pub length: String,
    pub width: String,
    pub height: String,
    pub weight: String,
    pub distance_unit: Option<String>,
    pub mass_unit: Option<String>,
}

impl Default for ParcelDraft {
    fn default() -> Self {
        let parcel = Parcel::default();
        Self {
            length: parcel.length.to_string(),
            width: parcel.width.to_string(),
            height: parcel.height.to_string(),
            weight: parcel.weight.to_string(),
            distance_unit: None,
            mass_unit: None,
        }
    }
}

impl ParcelDraft {
    fn validate(&self) -> Result<Parcel, InputError> {
        let defaults = Parcel::default();
        Ok(Parcel {
            length: parse_dimension("length", &self.length)?,
            width: parse_dimension("width", &self.width)?,
            height: parse_dimension("height", &self.height)?,
            weight: parse_dimension("weight", &self.weight)?,
            distance_unit: optional_text(self.distance_unit.as_deref())
                .map_or(defaults.distance_unit, str::to_string),
            mass_unit: optional_text(self.mass_unit.as_deref())
                .map_or(defaults.mass_unit, str::to_string),
        })
    }
}

/// The create-order form before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderDraft {
    pub telegram_id: String,
    pub amount: String,
    pub address_from: AddressDraft,
    pub address_to: AddressDraft,
    pub parcel: ParcelDraft,
}

impl OrderDraft {
    /// Checks fields in form order and stops at the first problem.
    pub fn validate(&self) -> Result<NewOrder, InputError> {
        Ok(NewOrder {
            telegram_id: parse_telegram_id(&self.telegram_id)?,
            amount: parse_amount(&self.amount)?,
            address_from: self.address_from.validate("Sender")?,
            address_to: self.address_to.validate("Recipient")?,
            parcel: self.parcel.validate()?,
        })
    }
}

/// Blank optional text collapses to `None`.
pub fn optional_text(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|value| !value.is_empty())
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, InputError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| InputError::InvalidDate {
        raw: raw.to_string(),
    })
}

/// Inclusive date filter for the expense report. Both ends are optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpenseRange {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

impl ExpenseRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<Self, InputError> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(InputError::InvertedDateRange { from, to });
            }
        }
        Ok(Self { from, to })
    }

    pub fn parse(from: Option<&str>, to: Option<&str>) -> Result<Self, InputError> {
        let from = optional_text(from).map(parse_date).transpose()?;
        let to = optional_text(to).map(parse_date).transpose()?;
        Self::new(from, to)
    }

    pub fn from(&self) -> Option<NaiveDate> {
        self.from
    }

    pub fn to(&self) -> Option<NaiveDate> {
        self.to
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(from) = self.from {
            pairs.push(("date_from", from.format("%Y-%m-%d").to_string()));
        }
        if let Some(to) = self.to {
            pairs.push(("date_to", to.format("%Y-%m-%d").to_string()));
        }
        pairs
    }
}

#[cfg(test)]
#[path = "tests/input_tests.rs"]
mod tests;
