//! Typed extraction of Steam `appdetails` payloads.
//!
//! The store API is loose about types (prices and review totals arrive as
//! numbers or numeric strings depending on endpoint revision), so fields are
//! read through small helpers that distinguish a missing field from one that
//! is present with the wrong shape.
use std::sync::OnceLock;

use bigdecimal::BigDecimal;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::database_ops::steam::models::{
    AppDetails, CatalogEntry, DetailResponse, Genre, PriceQuote, ReleaseInfo,
};

/// Annotation appended to `supported_languages` after the audio footnote marker.
pub const FULL_AUDIO_NOTE: &str = "languages with full audio support";

type Object = Map<String, Value>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("field `{0}` is missing")]
    MissingField(&'static str),
    #[error("field `{field}` has the wrong type, expected {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("field `{field}` is out of range or not numeric: {value}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Read one region's raw body for `appid`.
///
/// Empty bodies, non-JSON bodies, a JSON `null` (what the store answers for
/// malformed requests) and bodies without the `appid` key are all `NoData`.
pub fn parse_detail_body(appid: &str, body: &str) -> Result<DetailResponse, NormalizeError> {
    if body.trim().is_empty() {
        return Ok(DetailResponse::NoData);
    }
    let root: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(err) => {
            tracing::debug!(appid, error = %err, "appdetails body is not JSON");
            return Ok(DetailResponse::NoData);
        }
    };
    let entry = match root.get(appid) {
        None | Some(Value::Null) => return Ok(DetailResponse::NoData),
        Some(Value::Object(obj)) => obj,
        Some(_) => {
            return Err(NormalizeError::WrongType {
                field: "appid entry",
                expected: "object",
            })
        }
    };

    let success = match entry.get("success") {
        None | Some(Value::Null) => return Err(NormalizeError::MissingField("success")),
        Some(Value::Bool(b)) => *b,
        Some(_) => {
            return Err(NormalizeError::WrongType {
                field: "success",
                expected: "bool",
            })
        }
    };
    if !success {
        return Ok(DetailResponse::Unavailable);
    }

    let data = required_object(entry, "data")?;
    normalize_app_data(appid, data).map(|d| DetailResponse::Available(Box::new(d)))
}

/// Map the `data` object of a successful response into the record set.
pub fn normalize_app_data(appid: &str, data: &Object) -> Result<AppDetails, NormalizeError> {
    let app_type = required_str(data, "type")?.to_string();
    let name = required_str(data, "name")?.to_string();
    let is_free = optional_bool(data, "is_free")?.unwrap_or(false);

    let entry = CatalogEntry {
        appid: appid.to_string(),
        name,
        app_type,
        recommendations: review_count(data),
        is_free,
    };

    // free titles carry no price block worth recording
    let price = if is_free {
        None
    } else {
        optional_object(data, "price_overview")?
            .map(price_quote)
            .transpose()?
    };

    let languages = optional_str(data, "supported_languages")?
        .map(split_languages)
        .unwrap_or_default();

    let genres = match optional_array(data, "genres")? {
        Some(items) => items.iter().map(genre).collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    let release = optional_object(data, "release_date")?
        .map(release_info)
        .transpose()?;

    Ok(AppDetails {
        entry,
        price,
        developers: string_list(data, "developers")?,
        publishers: string_list(data, "publishers")?,
        genres,
        languages,
        release,
    })
}

/// Convert integer minor units (cents) into exact major units.
pub fn price_from_minor(minor: i64) -> BigDecimal {
    BigDecimal::new(minor.into(), 2)
}

/// Strip markup and the audio footnote from a `supported_languages` string
/// and split it into names.
pub fn split_languages(raw: &str) -> Vec<String> {
    static MARKUP_BLOCK: OnceLock<Regex> = OnceLock::new();
    static LONE_TAG: OnceLock<Regex> = OnceLock::new();
    // footnote markers: `<strong>*</strong>`, `<b>*</b>`
    let block = MARKUP_BLOCK.get_or_init(|| {
        Regex::new(r"(?is)<(?:strong|b)\b[^>]*>.*?</(?:strong|b)>").expect("valid regex")
    });
    let tag = LONE_TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"));

    let without_note = raw.replace(FULL_AUDIO_NOTE, "");
    let without_blocks = block.replace_all(&without_note, "");
    let plain = tag.replace_all(&without_blocks, "");
    plain
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn review_count(data: &Object) -> i64 {
    data.get("recommendations")
        .and_then(|r| r.get("total"))
        .and_then(lenient_i64)
        .filter(|n| *n >= 0)
        .unwrap_or(0)
}

fn price_quote(block: &Object) -> Result<PriceQuote, NormalizeError> {
    let discount = required_int(block, "discount_percent")?;
    let discount_percent =
        i16::try_from(discount).map_err(|_| NormalizeError::InvalidNumber {
            field: "discount_percent",
            value: discount.to_string(),
        })?;
    Ok(PriceQuote {
        currency: required_str(block, "currency")?.to_string(),
        initial: price_from_minor(required_int(block, "initial")?),
        final_amount: price_from_minor(required_int(block, "final")?),
        discount_percent,
    })
}

fn genre(value: &Value) -> Result<Genre, NormalizeError> {
    let obj = value.as_object().ok_or(NormalizeError::WrongType {
        field: "genres",
        expected: "array of objects",
    })?;
    let id = required_int(obj, "id")?;
    let id = i32::try_from(id).map_err(|_| NormalizeError::InvalidNumber {
        field: "id",
        value: id.to_string(),
    })?;
    Ok(Genre {
        id,
        name: required_str(obj, "description")?.to_string(),
    })
}

fn release_info(block: &Object) -> Result<ReleaseInfo, NormalizeError> {
    Ok(ReleaseInfo {
        date: optional_str(block, "date")?.unwrap_or_default().to_string(),
        coming_soon: optional_bool(block, "coming_soon")?.unwrap_or(false),
    })
}

fn string_list(obj: &Object, field: &'static str) -> Result<Vec<String>, NormalizeError> {
    let Some(items) = optional_array(obj, field)? else {
        return Ok(Vec::new());
    };
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or(NormalizeError::WrongType {
                    field,
                    expected: "array of strings",
                })
        })
        .collect()
}

// -------- field accessors --------

/// Accepts a JSON number or a numeric string.
fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn present<'a>(obj: &'a Object, field: &str) -> Option<&'a Value> {
    obj.get(field).filter(|v| !v.is_null())
}

fn required_str<'a>(obj: &'a Object, field: &'static str) -> Result<&'a str, NormalizeError> {
    optional_str(obj, field)?.ok_or(NormalizeError::MissingField(field))
}

fn optional_str<'a>(obj: &'a Object, field: &'static str) -> Result<Option<&'a str>, NormalizeError> {
    match present(obj, field) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(NormalizeError::WrongType {
            field,
            expected: "string",
        }),
    }
}

fn optional_bool(obj: &Object, field: &'static str) -> Result<Option<bool>, NormalizeError> {
    match present(obj, field) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(NormalizeError::WrongType {
            field,
            expected: "bool",
        }),
    }
}

fn required_object<'a>(obj: &'a Object, field: &'static str) -> Result<&'a Object, NormalizeError> {
    optional_object(obj, field)?.ok_or(NormalizeError::MissingField(field))
}

fn optional_object<'a>(
    obj: &'a Object,
    field: &'static str,
) -> Result<Option<&'a Object>, NormalizeError> {
    match present(obj, field) {
        None => Ok(None),
        Some(Value::Object(inner)) => Ok(Some(inner)),
        Some(_) => Err(NormalizeError::WrongType {
            field,
            expected: "object",
        }),
    }
}

fn optional_array<'a>(
    obj: &'a Object,
    field: &'static str,
) -> Result<Option<&'a Vec<Value>>, NormalizeError> {
    match present(obj, field) {
        None => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(_) => Err(NormalizeError::WrongType {
            field,
            expected: "array",
        }),
    }
}

fn required_int(obj: &Object, field: &'static str) -> Result<i64, NormalizeError> {
    match present(obj, field) {
        None => Err(NormalizeError::MissingField(field)),
        Some(v @ (Value::Number(_) | Value::String(_))) => {
            lenient_i64(v).ok_or_else(|| NormalizeError::InvalidNumber {
                field,
                value: v.to_string(),
            })
        }
        Some(_) => Err(NormalizeError::WrongType {
            field,
            expected: "integer",
        }),
    }
}
