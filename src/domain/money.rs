use std::fmt;

/// Amounts are held as integer minor units (kobo for naira) so balances never
/// pick up floating-point drift. ₦50.00 is 5000.
pub type Cents = i64;

/// Symbol prefixed to amounts shown to members.
pub const CURRENCY_SYMBOL: &str = "₦";

/// Format minor units as a plain decimal string.
/// Example: 500000 -> "5000.00", -1234 -> "-12.34"
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs_cents = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs_cents / 100, abs_cents % 100)
}

/// Format minor units for display, with currency symbol and thousands separators.
/// Example: 500000 -> "₦5,000.00"
pub fn format_naira(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs_cents = cents.unsigned_abs();
    let units = (abs_cents / 100).to_string();

    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (i, digit) in units.chars().enumerate() {
        if i > 0 && (units.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{}{}{}.{:02}", sign, CURRENCY_SYMBOL, grouped, abs_cents % 100)
}

/// Parse an amount typed by a member into minor units.
///
/// Accepts an optional leading currency symbol and comma grouping:
/// "5000" -> 500000, "5,000.5" -> 500050, "₦20,000.00" -> 2000000.
/// More than two fractional digits is an error, never a truncation.
pub fn parse_cents(input: &str) -> Result<Cents, ParseCentsError> {
    let input = input.trim();
    let negative = input.starts_with('-');
    let cleaned: String = input
        .trim_start_matches('-')
        .trim_start_matches(CURRENCY_SYMBOL)
        .chars()
        .filter(|c| *c != ',')
        .collect();

    if cleaned.is_empty() {
        return Err(ParseCentsError::InvalidFormat);
    }

    let (units_str, decimal_str) = match cleaned.split_once('.') {
        Some((units, decimals)) => (units, decimals),
        None => (cleaned.as_str(), ""),
    };

    if !units_str.chars().all(|c| c.is_ascii_digit())
        || !decimal_str.chars().all(|c| c.is_ascii_digit())
    {
        return Err(ParseCentsError::InvalidFormat);
    }
    if units_str.is_empty() && decimal_str.is_empty() {
        return Err(ParseCentsError::InvalidFormat);
    }

    let units: i64 = if units_str.is_empty() {
        0
    } else {
        units_str.parse().map_err(|_| ParseCentsError::Overflow)?
    };

    let decimal_cents: i64 = match decimal_str.len() {
        0 => 0,
        1 => decimal_str.parse::<i64>().map_err(|_| ParseCentsError::InvalidFormat)? * 10,
        2 => decimal_str.parse().map_err(|_| ParseCentsError::InvalidFormat)?,
        _ => return Err(ParseCentsError::TooManyDecimals),
    };

    let cents = units
        .checked_mul(100)
        .and_then(|c| c.checked_add(decimal_cents))
        .ok_or(ParseCentsError::Overflow)?;

    Ok(if negative { -cents } else { cents })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseCentsError {
    InvalidFormat,
    TooManyDecimals,
    Overflow,
}

impl fmt::Display for ParseCentsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseCentsError::InvalidFormat => write!(f, "invalid money format"),
            ParseCentsError::TooManyDecimals => write!(f, "at most two decimal places allowed"),
            ParseCentsError::Overflow => write!(f, "amount is too large"),
        }
    }
}

impl std::error::Error for ParseCentsError {}
