//! Document shapes read from the `books` collection and its aggregations
//!
//! The collection has no schema. Every field is optional, and numbers are
//! accepted as any BSON numeric type, so one oddly typed document shows up
//! as a missing value instead of failing the whole read.

use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};

/// A book as stored in the collection. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Book {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Bson>,
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub title: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub author: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub genre: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::integer",
        skip_serializing_if = "Option::is_none"
    )]
    pub published_year: Option<i64>,
    #[serde(
        default,
        deserialize_with = "lenient::number",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient::boolean",
        skip_serializing_if = "Option::is_none"
    )]
    pub in_stock: Option<bool>,
}

/// Title (and year, when projected) of a book in a find result
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Listing {
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient::integer")]
    pub published_year: Option<i64>,
}

impl Listing {
    pub fn title_or_placeholder(&self) -> &str {
        self.title.as_deref().unwrap_or("<untitled>")
    }

    /// `Title (1949)`, or `Title (unknown year)`
    pub fn label(&self) -> String {
        match self.published_year {
            Some(year) => format!("{} ({year})", self.title_or_placeholder()),
            None => format!("{} (unknown year)", self.title_or_placeholder()),
        }
    }
}

/// One row of the average-price-by-genre aggregation
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenreAverage {
    #[serde(rename = "_id", default, deserialize_with = "lenient::string")]
    pub genre: Option<String>,
    #[serde(rename = "averagePrice", default, deserialize_with = "lenient::number")]
    pub average_price: Option<f64>,
}

/// One row of the books-per-author aggregation
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthorCount {
    #[serde(rename = "_id", default, deserialize_with = "lenient::string")]
    pub author: Option<String>,
    #[serde(rename = "bookCount", default, deserialize_with = "lenient::count")]
    pub book_count: i64,
}

/// One row of the books-by-decade aggregation.
///
/// `decade` is `None` when the grouping key resolved to a missing field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DecadeGroup {
    #[serde(rename = "_id", default, deserialize_with = "lenient::integer")]
    pub decade: Option<i64>,
    #[serde(default, deserialize_with = "lenient::count")]
    pub count: i64,
    #[serde(default, deserialize_with = "lenient::strings")]
    pub titles: Vec<String>,
}

/// `deserialize_with` helpers that read a field as raw BSON first and then
/// coerce it, yielding `None` instead of an error for unexpected types.
mod lenient {
    use mongodb::bson::Bson;
    use serde::{Deserialize, Deserializer};

    /// Exponent bias of IEEE 754 decimal128
    const DECIMAL128_BIAS: i32 = 6176;

    /// Numeric value of any BSON number.
    ///
    /// Decimal128 is decoded from its binary integer encoding. NaN, the
    /// infinities, and non-canonical encodings yield `None`.
    pub(crate) fn as_f64(value: &Bson) -> Option<f64> {
        match value {
            Bson::Double(v) => Some(*v),
            Bson::Int32(v) => Some(f64::from(*v)),
            Bson::Int64(v) => Some(*v as f64),
            Bson::Decimal128(d) => decimal128_to_f64(d.bytes()),
            _ => None,
        }
    }

    fn decimal128_to_f64(bytes: [u8; 16]) -> Option<f64> {
        let bits = u128::from_le_bytes(bytes);
        // Combination field starting with 11: special values or a coefficient
        // too large to be canonical
        if (bits >> 125) & 0b11 == 0b11 {
            return None;
        }
        let negative = bits >> 127 == 1;
        let exponent = ((bits >> 113) & 0x3FFF) as i32 - DECIMAL128_BIAS;
        let coefficient = bits & ((1u128 << 113) - 1);
        if coefficient >= 10u128.pow(34) {
            return None;
        }

        let magnitude = coefficient as f64;
        let value = if exponent >= 0 {
            magnitude * 10f64.powi(exponent)
        } else {
            magnitude / 10f64.powi(-exponent)
        };
        Some(if negative { -value } else { value })
    }

    pub fn number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Bson>::deserialize(deserializer)?
            .as_ref()
            .and_then(as_f64))
    }

    /// Whole numbers only; `1949.5` is `None`
    pub fn integer<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Bson>::deserialize(deserializer)? {
            Some(Bson::Int32(v)) => Some(i64::from(v)),
            Some(Bson::Int64(v)) => Some(v),
            Some(other) => as_f64(&other)
                .filter(|v| v.fract() == 0.0 && v.abs() < i64::MAX as f64)
                .map(|v| v as i64),
            None => None,
        })
    }

    pub fn count<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(integer(deserializer)?.unwrap_or(0))
    }

    /// Strings as-is; other non-null values in their BSON display form
    pub fn string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Bson>::deserialize(deserializer)? {
            Some(Bson::String(s)) => Some(s),
            Some(Bson::Null) | None => None,
            Some(other) => Some(other.to_string()),
        })
    }

    pub fn strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let values = Option::<Vec<Bson>>::deserialize(deserializer)?.unwrap_or_default();
        Ok(values
            .into_iter()
            .filter_map(|value| match value {
                Bson::String(s) => Some(s),
                Bson::Null => None,
                other => Some(other.to_string()),
            })
            .collect())
    }

    pub fn boolean<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Bson>::deserialize(deserializer)? {
            Some(Bson::Boolean(b)) => Some(b),
            _ => None,
        })
    }
}
