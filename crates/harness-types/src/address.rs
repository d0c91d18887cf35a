//! Address parsing and formatting utilities.
//!
//! This module is the canonical source for address literals in the workspace.
//! Script authors write addresses in several forms:
//! - Hex form: "0x42"
//! - Full hex form: "0x0000000000000000000000000000000000000000000000000000000000000042"
//! - Decimal form: "66"
//!
//! Everything rendered by the harness uses the short hex literal ("0x42").

use move_core_types::account_address::AccountAddress;
use move_core_types::language_storage::ModuleId;

/// Move standard library address (0x1).
pub const STD_ADDRESS: AccountAddress = AccountAddress::ONE;

/// Parse an address literal (hex with `0x` prefix, or decimal).
///
/// Returns `None` for anything else, including alias names. Callers that
/// accept aliases fall back to a symbol lookup on `None`.
///
/// # Examples
///
/// ```
/// use txn_harness_types::address::parse_address_literal;
///
/// let addr = parse_address_literal("0x42").unwrap();
/// assert_eq!(addr.to_hex_literal(), "0x42");
/// assert_eq!(parse_address_literal("66"), Some(addr));
/// assert_eq!(parse_address_literal("A"), None);
/// ```
pub fn parse_address_literal(s: &str) -> Option<AccountAddress> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if hex.is_empty() || hex.len() > AccountAddress::LENGTH * 2 {
            return None;
        }
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        return AccountAddress::from_hex_literal(&format!("0x{}", hex.to_lowercase())).ok();
    }
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let number: u128 = s.parse().ok()?;
    Some(address_from_u128(number))
}

/// Build an address whose low 16 bytes hold `value` (big-endian).
pub fn address_from_u128(value: u128) -> AccountAddress {
    let mut bytes = [0u8; AccountAddress::LENGTH];
    bytes[AccountAddress::LENGTH - 16..].copy_from_slice(&value.to_be_bytes());
    AccountAddress::new(bytes)
}

/// Render an address in its short literal form ("0x42").
pub fn format_address(addr: &AccountAddress) -> String {
    addr.to_hex_literal()
}

/// Render a module id as `0x42::name`.
pub fn format_module_id(id: &ModuleId) -> String {
    format!("{}::{}", format_address(id.address()), id.name())
}

/// Check whether an address is the standard library address (0x1).
pub fn is_std_address(addr: &AccountAddress) -> bool {
    *addr == STD_ADDRESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use move_core_types::identifier::Identifier;

    #[test]
    fn test_parse_hex_literal() {
        let addr = parse_address_literal("0x42").unwrap();
        assert_eq!(format_address(&addr), "0x42");

        let upper = parse_address_literal("0XAbC").unwrap();
        assert_eq!(format_address(&upper), "0xabc");
    }

    #[test]
    fn test_parse_decimal_literal() {
        assert_eq!(parse_address_literal("1"), Some(STD_ADDRESS));
        assert_eq!(
            parse_address_literal("255").map(|a| format_address(&a)),
            Some("0xff".to_string())
        );
    }

    #[test]
    fn test_rejects_non_literals() {
        assert!(parse_address_literal("A").is_none());
        assert!(parse_address_literal("0x").is_none());
        assert!(parse_address_literal("0xZZ").is_none());
        assert!(parse_address_literal("").is_none());
        let too_long = format!("0x{}", "1".repeat(65));
        assert!(parse_address_literal(&too_long).is_none());
    }

    #[test]
    fn test_format_module_id() {
        let id = ModuleId::new(STD_ADDRESS, Identifier::new("string").unwrap());
        assert_eq!(format_module_id(&id), "0x1::string");
        assert!(is_std_address(id.address()));
    }
}
