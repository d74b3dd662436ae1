//! Normalisation applied to every order before it reaches the ledger.

use crate::error::CoreError;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

const MAX_SYMBOL_LEN: usize = 16;

/// Trims and uppercases a ticker symbol, rejecting empty or malformed input.
pub fn normalize_symbol(raw: &str) -> Result<String, CoreError> {
    let symbol = raw.trim().to_ascii_uppercase();
    if symbol.is_empty() {
        return Err(CoreError::InvalidInput(
            "symbol".to_string(),
            "stock symbol is required".to_string(),
        ));
    }
    if symbol.len() > MAX_SYMBOL_LEN {
        return Err(CoreError::InvalidInput(
            "symbol".to_string(),
            format!("'{}' is longer than {} characters", symbol, MAX_SYMBOL_LEN),
        ));
    }
    if !symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(CoreError::InvalidInput(
            "symbol".to_string(),
            format!("'{}' contains unsupported characters", symbol),
        ));
    }
    Ok(symbol)
}

/// Checks that an order quantity is strictly positive.
pub fn validate_quantity(quantity: Decimal) -> Result<Decimal, CoreError> {
    if quantity <= Decimal::ZERO {
        return Err(CoreError::InvalidInput(
            "quantity".to_string(),
            format!("must be greater than zero, got {}", quantity),
        ));
    }
    Ok(quantity)
}

/// Converts a client-supplied floating point quantity, rejecting NaN and infinities.
pub fn quantity_from_f64(raw: f64) -> Result<Decimal, CoreError> {
    if !raw.is_finite() {
        return Err(CoreError::InvalidInput(
            "quantity".to_string(),
            format!("must be a finite number, got {}", raw),
        ));
    }
    let quantity = Decimal::from_f64(raw).ok_or_else(|| {
        CoreError::InvalidInput("quantity".to_string(), format!("{} is out of range", raw))
    })?;
    validate_quantity(quantity.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_symbol_is_trimmed_and_uppercased() {
        assert_eq!(normalize_symbol("  aapl ").unwrap(), "AAPL");
        assert_eq!(normalize_symbol("brk.b").unwrap(), "BRK.B");
    }

    #[test]
    fn test_symbol_rejects_blank_and_garbage() {
        assert!(normalize_symbol("   ").is_err());
        assert!(normalize_symbol("AA PL").is_err());
        assert!(normalize_symbol("ABCDEFGHIJKLMNOPQ").is_err());
    }

    #[test]
    fn test_quantity_must_be_positive() {
        assert!(validate_quantity(dec!(0)).is_err());
        assert!(validate_quantity(dec!(-1)).is_err());
        assert_eq!(validate_quantity(dec!(0.5)).unwrap(), dec!(0.5));
    }

    #[test]
    fn test_quantity_from_f64_rejects_non_finite() {
        assert!(quantity_from_f64(f64::NAN).is_err());
        assert!(quantity_from_f64(f64::INFINITY).is_err());
        assert!(quantity_from_f64(-2.0).is_err());
        assert_eq!(quantity_from_f64(2.5).unwrap(), dec!(2.5));
    }
}
