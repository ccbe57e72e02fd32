//! A transparent wrapper resolving environment-variable indirection during
//! deserialization, so secrets can be literal values or `$VAR`/`${VAR}`
//! references. This is the seam an external Secrets-Manager fetcher plugs
//! into (spec §1: that fetcher itself is out of scope).

use serde::{Deserialize, Deserializer, Serialize};
use std::ops::Deref;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    pub fn inner(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }

    fn parse_env_var_syntax(s: &str) -> Option<String> {
        if let Some(inner) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
            Some(inner.to_string())
        } else if let Some(rest) = s.strip_prefix('$') {
            if !rest.is_empty() && rest.chars().all(|c| c.is_alphanumeric() || c == '_') {
                Some(rest.to_string())
            } else {
                None
            }
        } else {
            None
        }
    }
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let value = if let Some(var_name) = Self::parse_env_var_syntax(&s) {
            std::env::var(&var_name).map_err(|_| {
                serde::de::Error::custom(format!(
                    "environment variable '{var_name}' not found (referenced as '{s}')"
                ))
            })?
        } else {
            s
        };
        value
            .parse::<T>()
            .map_err(|e| serde::de::Error::custom(format!("failed to parse value: {e}")))
            .map(LiteralOrEnv)
    }
}

impl<T: Serialize> Serialize for LiteralOrEnv<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        value: LiteralOrEnv<u32>,
    }

    #[test]
    fn resolves_literal() {
        let w: Wrapper = serde_json::from_str(r#"{"value": "42"}"#).unwrap();
        assert_eq!(*w.value, 42);
    }

    #[test]
    fn resolves_braced_env_var() {
        unsafe { std::env::set_var("WDP_TEST_LITERAL_OR_ENV", "7") };
        let w: Wrapper = serde_json::from_str(r#"{"value": "${WDP_TEST_LITERAL_OR_ENV}"}"#).unwrap();
        assert_eq!(*w.value, 7);
        unsafe { std::env::remove_var("WDP_TEST_LITERAL_OR_ENV") };
    }
}
