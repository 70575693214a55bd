/// Client-side checks that run before any request is dispatched.
///
/// Every function here returns `AppError::Validation` with an operator-readable message, so the
/// caller can surface it as an alert and skip the network call.
use crate::errors::AppError;
use bigdecimal::BigDecimal;
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use regex::Regex;
use std::sync::OnceLock;

fn invalid(message: &str) -> AppError {
    AppError::Validation(message.to_string())
}

/// Parses a KYB client id typed by an operator.
///
/// Rejects blank, non-numeric and non-positive values.
pub fn parse_client_id(raw: &str) -> Result<u64, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid("Client ID is required"));
    }

    let parsed: i64 = trimmed
        .parse()
        .map_err(|_| invalid("Client ID must be a valid number"))?;

    if parsed <= 0 {
        return Err(invalid("Client ID must be greater than zero"));
    }

    Ok(parsed as u64)
}

/// Parses any other positive record id (tiers, top-up requests, connectors).
pub fn require_positive_id(id: u64, label: &str) -> Result<u64, AppError> {
    if id == 0 {
        return Err(AppError::Validation(format!("{} is required", label)));
    }
    Ok(id)
}

/// Returns the trimmed text or a "<label> is required" error.
pub fn require_text(raw: &str, label: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} is required", label)));
    }
    Ok(trimmed.to_string())
}

pub fn require_positive_amount(amount: &BigDecimal, label: &str) -> Result<(), AppError> {
    if *amount <= BigDecimal::from(0) {
        return Err(AppError::Validation(format!(
            "{} must be greater than zero",
            label
        )));
    }
    Ok(())
}

/// Validates an ISO-4217 style currency code and returns it upper-cased.
pub fn normalize_currency(raw: &str) -> Result<String, AppError> {
    static CURRENCY: OnceLock<Regex> = OnceLock::new();
    let re = CURRENCY.get_or_init(|| Regex::new(r"^[A-Z]{3}$").expect("valid currency regex"));

    let upper = raw.trim().to_uppercase();
    if !re.is_match(&upper) {
        return Err(invalid("Currency must be a three-letter code (e.g. KES)"));
    }
    Ok(upper)
}

/// Validates an invoice number: letters, digits and `-`, `/`, `_`, `.` only.
pub fn normalize_invoice_number(raw: &str) -> Result<String, AppError> {
    static INVOICE: OnceLock<Regex> = OnceLock::new();
    let re = INVOICE
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9/_.\-]{0,63}$").expect("valid invoice regex"));

    let trimmed = require_text(raw, "Invoice number")?;
    if !re.is_match(&trimmed) {
        return Err(invalid(
            "Invoice number may only contain letters, digits, '-', '/', '_' and '.'",
        ));
    }
    Ok(trimmed)
}

/// Validate and normalize a Kenyan mobile number for MPESA / MNO payloads.
///
/// Uses phonenumber library (port of Google's libphonenumber) to:
/// - Parse with the Kenyan region (KE), so local `07..` numbers are accepted
/// - Reject numbers libphonenumber considers invalid
/// - Return the international form without `+` (254712345678), as the payment APIs expect
pub fn normalize_msisdn(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid("Phone number is required"));
    }

    match phonenumber::parse(Some(CountryId::KE), trimmed) {
        Ok(number) if phonenumber::is_valid(&number) => {
            let formatted = number.format().mode(Mode::E164).to_string();
            tracing::debug!("Valid MSISDN: {} -> {}", trimmed, formatted);
            Ok(formatted.trim_start_matches('+').to_string())
        }
        Ok(_) => {
            tracing::warn!("Invalid MSISDN: {}", trimmed);
            Err(invalid("Please enter a valid phone number"))
        }
        Err(e) => {
            tracing::warn!("Failed to parse MSISDN '{}': {:?}", trimmed, e);
            Err(invalid("Please enter a valid phone number"))
        }
    }
}
