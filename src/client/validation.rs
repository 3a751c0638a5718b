//! Local argument checks. A failure here never reaches the network.

use std::net::IpAddr;

use crate::error::{BitnodesError, BitnodesResult};

/// Largest page size the API serves.
pub const MAX_PAGE_SIZE: u32 = 100;

fn invalid(message: &str) -> BitnodesError {
    BitnodesError::InvalidArgument(message.to_string())
}

pub fn validate_page(page: Option<u32>) -> BitnodesResult<()> {
    match page {
        Some(0) => Err(invalid("Page must be a positive integer.")),
        _ => Ok(()),
    }
}

pub fn validate_limit(limit: Option<u32>) -> BitnodesResult<()> {
    match limit {
        Some(l) if l == 0 || l > MAX_PAGE_SIZE => Err(invalid("Limit must be an integer between 1 and 100.")),
        _ => Ok(()),
    }
}

pub fn validate_address_port(address: &str, port: u16) -> BitnodesResult<String> {
    let address = address.trim();
    if address.is_empty() {
        return Err(invalid("Address must be a non-empty string."));
    }
    // Bracketed IPv6 literals are sent bare.
    let address = address
        .strip_prefix('[')
        .and_then(|a| a.strip_suffix(']'))
        .unwrap_or(address);
    if address.parse::<IpAddr>().is_err() && !is_hostname(address) {
        return Err(invalid("Address must be an IP address or a hostname."));
    }
    if port == 0 {
        return Err(invalid("Port must be an integer between 1 and 65535."));
    }
    Ok(address.to_string())
}

/// Letters, digits, dots and hyphens only, e.g. `node.example.org` or an
/// `.onion` address.
fn is_hostname(address: &str) -> bool {
    address
        .split('.')
        .all(|label| !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
}

pub fn validate_timestamp(timestamp: &str) -> BitnodesResult<()> {
    if timestamp == "latest" || (!timestamp.is_empty() && timestamp.chars().all(|c| c.is_ascii_digit())) {
        Ok(())
    } else {
        Err(invalid("Timestamp must be a string representation of integer or 'latest'."))
    }
}

pub fn validate_inv_hash(inv_hash: &str) -> BitnodesResult<()> {
    if inv_hash.is_empty() {
        return Err(invalid("Inventory hash must be a non-empty string."));
    }
    if !inv_hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid("Inventory hash must be hexadecimal."));
    }
    Ok(())
}

pub fn validate_query(terms: &[String]) -> BitnodesResult<()> {
    if terms.iter().any(|t| t.trim().is_empty()) {
        return Err(invalid("q must be a list of non-empty strings."));
    }
    Ok(())
}
