//! Configuration values that may point at the environment.
//!
//! Any string field wrapped in [`LiteralOrEnv`] accepts either a literal or a
//! reference to an environment variable, so payout addresses and facilitator
//! endpoints stay out of the config file:
//!
//! ```json
//! {
//!   "facilitatorUrl": "$FACILITATOR_URL",
//!   "payTo": "${EVM_ADDRESS}",
//!   "network": "eip155:84532"
//! }
//! ```
//!
//! A reference to a variable that is not set, or is set to nothing but
//! whitespace, fails deserialization. A missing `FACILITATOR_URL` or an
//! `EVM_ADDRESS=""` is therefore a startup error.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

/// A value given literally or as `$VAR` / `${VAR}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

/// A referenced variable is unset or blank, or its value does not parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LiteralOrEnvError {
    #[error("Environment variable '{name}' not set or empty (referenced as '{reference}')")]
    MissingVariable { name: String, reference: String },
    #[error("Failed to parse value: {0}")]
    Parse(String),
}

impl<T> LiteralOrEnv<T> {
    pub fn from_literal(value: T) -> Self {
        Self(value)
    }

    pub fn inner(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    /// Resolves `raw` against the process environment and parses the result.
    pub fn resolve(raw: &str) -> Result<Self, LiteralOrEnvError> {
        let value = match env_var_name(raw) {
            Some(name) => std::env::var(name)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| LiteralOrEnvError::MissingVariable {
                    name: name.to_string(),
                    reference: raw.to_string(),
                })?,
            None => raw.to_string(),
        };
        value
            .parse::<T>()
            .map(LiteralOrEnv)
            .map_err(|e| LiteralOrEnvError::Parse(e.to_string()))
    }
}

/// Variable name of a `$VAR` or `${VAR}` reference.
fn env_var_name(s: &str) -> Option<&str> {
    if let Some(braced) = s.strip_prefix("${").and_then(|r| r.strip_suffix('}')) {
        return (!braced.is_empty()).then_some(braced);
    }
    let bare = s.strip_prefix('$')?;
    let is_name = !bare.is_empty() && bare.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    is_name.then_some(bare)
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
    T::Err: fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        LiteralOrEnv::resolve(&raw).map_err(serde::de::Error::custom)
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
    use url::Url;

    #[test]
    fn env_var_syntax() {
        assert_eq!(env_var_name("$EVM_ADDRESS"), Some("EVM_ADDRESS"));
        assert_eq!(env_var_name("${FACILITATOR_URL}"), Some("FACILITATOR_URL"));
        assert_eq!(env_var_name("$"), None);
        assert_eq!(env_var_name("${}"), None);
        assert_eq!(env_var_name("$0.01"), None);
        assert_eq!(env_var_name("0xc2983537"), None);
    }

    #[test]
    fn literal_passes_through() {
        let value: LiteralOrEnv<Url> =
            serde_json::from_str("\"https://facilitator.example/\"").unwrap();
        assert_eq!(value.as_str(), "https://facilitator.example/");
    }

    #[test]
    fn missing_variable_is_an_error() {
        let err = LiteralOrEnv::<String>::resolve("$X402_TYPES_TEST_SURELY_UNSET").unwrap_err();
        assert_eq!(
            err,
            LiteralOrEnvError::MissingVariable {
                name: "X402_TYPES_TEST_SURELY_UNSET".into(),
                reference: "$X402_TYPES_TEST_SURELY_UNSET".into(),
            }
        );
        let json = serde_json::from_str::<LiteralOrEnv<String>>("\"${X402_TYPES_TEST_SURELY_UNSET}\"");
        assert!(json.is_err());
    }

    #[test]
    fn blank_variable_counts_as_missing() {
        // SAFETY: the variable name is unique to this test.
        unsafe {
            std::env::set_var("X402_TYPES_TEST_BLANK_EVM_ADDRESS", "");
            std::env::set_var("X402_TYPES_TEST_SPACES_EVM_ADDRESS", "  ");
        }
        let err = LiteralOrEnv::<String>::resolve("$X402_TYPES_TEST_BLANK_EVM_ADDRESS").unwrap_err();
        assert!(matches!(err, LiteralOrEnvError::MissingVariable { ref name, .. } if name == "X402_TYPES_TEST_BLANK_EVM_ADDRESS"));
        let err =
            LiteralOrEnv::<String>::resolve("${X402_TYPES_TEST_SPACES_EVM_ADDRESS}").unwrap_err();
        assert!(matches!(err, LiteralOrEnvError::MissingVariable { .. }));
    }

    #[test]
    fn unparsable_literal_is_an_error() {
        let err = LiteralOrEnv::<Url>::resolve("not a url").unwrap_err();
        assert!(matches!(err, LiteralOrEnvError::Parse(_)));
    }
}
