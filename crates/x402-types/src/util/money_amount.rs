//! Money prices such as `"$0.01"`, `"0.01"` or `"1,000"`.
//!
//! A [`MoneyAmount`] keeps the precision the operator wrote, so a scheme can
//! refuse a price that its token cannot represent instead of rounding it.
//!
//! ```
//! use x402_types::util::money_amount::MoneyAmount;
//!
//! let price = MoneyAmount::parse("$0.01").unwrap();
//! assert_eq!(price.scale(), 2);
//! assert_eq!(price.mantissa(), 1);
//! ```

use regex::Regex;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// A non-negative decimal amount of money.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoneyAmount(pub Decimal);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyAmountParseError {
    #[error("Invalid number format")]
    InvalidFormat,
    #[error("Amount must be between {MIN_STR} and {MAX_STR}")]
    OutOfRange,
    #[error("Negative value is not allowed")]
    Negative,
    /// More fractional digits than the token has decimals.
    #[error("Too big of a precision: {money} vs {token} on token")]
    WrongPrecision { money: u32, token: u32 },
}

const MIN_STR: &str = "0.000000001";
const MAX_STR: &str = "999999999";

static MIN: LazyLock<Decimal> = LazyLock::new(|| Decimal::from_str(MIN_STR).unwrap_or_default());
static MAX: LazyLock<Decimal> = LazyLock::new(|| Decimal::from_str(MAX_STR).unwrap_or_default());
static NOT_NUMERIC: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[^\d\.\-]+").ok());

impl MoneyAmount {
    /// Strips currency symbols, separators and whitespace, then parses.
    pub fn parse(input: &str) -> Result<Self, MoneyAmountParseError> {
        let cleaned = match NOT_NUMERIC.as_ref() {
            Some(re) => re.replace_all(input, "").into_owned(),
            None => input.trim().to_string(),
        };
        let parsed =
            Decimal::from_str(&cleaned).map_err(|_| MoneyAmountParseError::InvalidFormat)?;
        if parsed.is_sign_negative() && !parsed.is_zero() {
            return Err(MoneyAmountParseError::Negative);
        }
        if parsed < *MIN || parsed > *MAX {
            return Err(MoneyAmountParseError::OutOfRange);
        }
        Ok(MoneyAmount(parsed))
    }

    /// Fractional digits as written, `"0.010"` has scale 3.
    pub fn scale(&self) -> u32 {
        self.0.scale()
    }

    /// The digits without the decimal point, `"12.34"` gives `1234`.
    pub fn mantissa(&self) -> u128 {
        self.0.mantissa().unsigned_abs()
    }

    /// Converts to atomic units of a token with `decimals` decimals.
    ///
    /// Returns the mantissa and the power of ten it still has to be multiplied
    /// by, leaving the wide multiplication to the caller's integer type.
    pub fn to_token_scale(&self, decimals: u32) -> Result<(u128, u32), MoneyAmountParseError> {
        let scale = self.scale();
        if scale > decimals {
            return Err(MoneyAmountParseError::WrongPrecision {
                money: scale,
                token: decimals,
            });
        }
        Ok((self.mantissa(), decimals - scale))
    }
}

impl FromStr for MoneyAmount {
    type Err = MoneyAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MoneyAmount::parse(s)
    }
}

impl TryFrom<&str> for MoneyAmount {
    type Error = MoneyAmountParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        MoneyAmount::parse(value)
    }
}

impl fmt::Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}
