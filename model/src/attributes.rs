use std::{collections::BTreeMap, str::FromStr};

use anyhow::bail;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use typed_floats::tf64::NonNaN;

/// Descriptive fields of a place besides its name, address and position.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<NonNaN>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_status: Option<BusinessStatus>,
    /// Anything a source supplied that has no typed field.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusinessStatus {
    Operational,
    ClosedTemporarily,
    ClosedPermanently,
}

impl FromStr for BusinessStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "OPERATIONAL" => Self::Operational,
            "CLOSED_TEMPORARILY" => Self::ClosedTemporarily,
            "CLOSED_PERMANENTLY" => Self::ClosedPermanently,
            _ => bail!("Unknown business status: {s}"),
        })
    }
}

/// One attribute value. Sources hand attributes over one at a time so the
/// merge can decide per field.
#[derive(Clone, Debug, PartialEq)]
pub enum Attribute {
    Phone(String),
    Website(String),
    Rating(NonNaN),
    ReviewCount(u32),
    Hours(Vec<String>),
    BusinessStatus(BusinessStatus),
    Other(String, Value),
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttributeKey {
    Phone,
    Website,
    Rating,
    ReviewCount,
    Hours,
    BusinessStatus,
    Other(String),
}

impl Attribute {
    /// Classifies a loosely typed field. Known names with values of the wrong
    /// shape are kept as `Other` rather than dropped.
    pub fn parse(key: &str, value: Value) -> Option<Self> {
        if value.is_null() {
            return None;
        }
        let typed = match key {
            "phone" | "internationalPhoneNumber" | "nationalPhoneNumber" => {
                non_empty(&value).map(Self::Phone)
            }
            "website" | "websiteUri" => non_empty(&value).map(Self::Website),
            "rating" => number(&value)
                .and_then(|x| NonNaN::new(x).ok())
                .map(Self::Rating),
            "review_count" | "userRatingCount" => number(&value)
                .filter(|x| *x >= 0.0 && *x <= u32::MAX as f64)
                .map(|x| Self::ReviewCount(x as u32)),
            "hours" | "weekdayDescriptions" => value.as_array().map(|x| {
                Self::Hours(
                    x.iter()
                        .filter_map(|x| x.as_str().map(|x| x.to_string()))
                        .collect(),
                )
            }),
            "businessStatus" | "business_status" => value
                .as_str()
                .and_then(|x| x.parse().ok())
                .map(Self::BusinessStatus),
            _ => None,
        };
        Some(typed.unwrap_or_else(|| Self::Other(key.to_string(), value)))
    }

    pub fn key(&self) -> AttributeKey {
        match self {
            Self::Phone(_) => AttributeKey::Phone,
            Self::Website(_) => AttributeKey::Website,
            Self::Rating(_) => AttributeKey::Rating,
            Self::ReviewCount(_) => AttributeKey::ReviewCount,
            Self::Hours(_) => AttributeKey::Hours,
            Self::BusinessStatus(_) => AttributeKey::BusinessStatus,
            Self::Other(k, _) => AttributeKey::Other(k.clone()),
        }
    }
}

impl Attributes {
    pub fn set(&mut self, attribute: Attribute) {
        match attribute {
            Attribute::Phone(x) => self.phone = Some(x),
            Attribute::Website(x) => self.website = Some(x),
            Attribute::Rating(x) => self.rating = Some(x),
            Attribute::ReviewCount(x) => self.review_count = Some(x),
            Attribute::Hours(x) => self.hours = Some(x),
            Attribute::BusinessStatus(x) => self.business_status = Some(x),
            Attribute::Other(k, v) => {
                self.extra.insert(k, v);
            }
        }
    }

    pub fn has(&self, key: &AttributeKey) -> bool {
        match key {
            AttributeKey::Phone => self.phone.is_some(),
            AttributeKey::Website => self.website.is_some(),
            AttributeKey::Rating => self.rating.is_some(),
            AttributeKey::ReviewCount => self.review_count.is_some(),
            AttributeKey::Hours => self.hours.is_some(),
            AttributeKey::BusinessStatus => self.business_status.is_some(),
            AttributeKey::Other(k) => self.extra.contains_key(k),
        }
    }

    /// Classifies and stores every field of a loosely typed map.
    pub fn absorb(&mut self, fields: BTreeMap<String, Value>) {
        for (k, v) in fields {
            if let Some(x) = Attribute::parse(&k, v) {
                self.set(x);
            }
        }
    }

    pub fn into_attributes(self) -> Vec<Attribute> {
        let mut output = Vec::new();
        output.extend(self.phone.map(Attribute::Phone));
        output.extend(self.website.map(Attribute::Website));
        output.extend(self.rating.map(Attribute::Rating));
        output.extend(self.review_count.map(Attribute::ReviewCount));
        output.extend(self.hours.map(Attribute::Hours));
        output.extend(self.business_status.map(Attribute::BusinessStatus));
        output.extend(self.extra.into_iter().map(|(k, v)| Attribute::Other(k, v)));
        output
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn non_empty(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(|x| x.trim())
        .filter(|x| !x.is_empty())
        .map(|x| x.to_string())
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(x) => x.as_f64(),
        Value::String(x) => x.trim().parse().ok(),
        _ => None,
    }
}
