//! Query-string parameters.
//!
//! Lists arrive as repeated keys (`pages=1&pages=3`); comma-separated values
//! are accepted too.

use crate::error::AppError;
use serde::de::value::StrDeserializer;
use serde::de::{DeserializeOwned, IntoDeserializer};
use serde::Deserialize;
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "Vec<(String, String)>")]
pub struct Params {
    pairs: Vec<(String, String)>,
}

impl From<Vec<(String, String)>> for Params {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }
}

impl Params {
    /// Last value given for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn parse<T>(&self, key: &str) -> Result<Option<T>, AppError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key).map(str::trim).filter(|v| !v.is_empty()) {
            None => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|e| AppError::BadRequest(format!("Invalid value for '{key}': {e}"))),
        }
    }

    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T, AppError>
    where
        T: FromStr,
        T::Err: Display,
    {
        Ok(self.parse(key)?.unwrap_or(default))
    }

    /// A required string, kept verbatim including surrounding whitespace.
    pub fn text(&self, key: &str) -> Result<String, AppError> {
        self.get(key).map(str::to_string).ok_or_else(|| missing(key))
    }

    /// Every integer given under any of `keys`, or `None` when absent.
    pub fn int_list(&self, keys: &[&str]) -> Result<Option<Vec<i64>>, AppError> {
        let mut values = Vec::new();
        let mut seen = false;
        for (key, raw) in &self.pairs {
            if !keys.contains(&key.as_str()) {
                continue;
            }
            seen = true;
            for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let value = item.parse().map_err(|_| {
                    AppError::BadRequest(format!("Invalid value for '{key}': {item}"))
                })?;
                values.push(value);
            }
        }
        Ok(seen.then_some(values))
    }

    /// Parses a kebab-case enum value through its serde representation.
    pub fn choice<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        let deserializer: StrDeserializer<'_, serde::de::value::Error> = raw.into_deserializer();
        T::deserialize(deserializer)
            .map(Some)
            .map_err(|e| AppError::BadRequest(format!("Invalid value for '{key}': {e}")))
    }
}

pub fn missing(key: &str) -> AppError {
    AppError::BadRequest(format!("Missing required parameter '{key}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tooltown_core::PageLayout;

    fn params(query: &[(&str, &str)]) -> Params {
        Params::from(
            query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_repeated_and_comma_separated_lists() {
        let p = params(&[("pages", "1"), ("pages", "3,4"), ("other", "9")]);
        assert_eq!(p.int_list(&["pages"]).unwrap(), Some(vec![1, 3, 4]));
        assert_eq!(p.int_list(&["page_numbers"]).unwrap(), None);
        assert!(params(&[("pages", "x")]).int_list(&["pages"]).is_err());
    }

    #[test]
    fn test_scalar_parsing() {
        let p = params(&[("start", "2"), ("end", ""), ("degrees", "ninety")]);
        assert_eq!(p.parse::<i64>("start").unwrap(), Some(2));
        assert_eq!(p.parse::<i64>("end").unwrap(), None);
        assert_eq!(p.parse_or("resolution", 150u32).unwrap(), 150);
        assert!(p.parse::<i64>("degrees").is_err());
    }

    #[test]
    fn test_text_keeps_whitespace_and_requires_key() {
        let p = params(&[("password", " spaced ")]);
        assert_eq!(p.text("password").unwrap(), " spaced ");
        let err = p.text("user_password").unwrap_err();
        assert!(err.to_string().contains("'user_password'"));
    }

    #[test]
    fn test_choice_uses_serde_names() {
        let p = params(&[("layout", "two-column-left"), ("mode", "sideways")]);
        assert_eq!(p.choice::<PageLayout>("layout").unwrap(), Some(PageLayout::TwoColumnLeft));
        assert!(p.choice::<tooltown_core::PageMode>("mode").is_err());
    }
}
