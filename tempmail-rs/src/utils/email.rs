use crate::error::{MailError, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use std::sync::OnceLock;

/// Length of generated mailbox local parts
const LOCAL_PART_LENGTH: usize = 10;

/// Placeholder used when a message carries no Subject header
pub const NO_SUBJECT: &str = "(no subject)";

/// Extract the address from a MAIL/RCPT argument.
///
/// `<user@example.com> SIZE=100` yields `user@example.com`; without angle
/// brackets the trimmed argument is returned as-is.
pub fn extract_address(arg: &str) -> String {
    if let Some(start) = arg.find('<') {
        if let Some(len) = arg[start + 1..].find('>') {
            return arg[start + 1..start + 1 + len].trim().to_string();
        }
    }
    arg.trim().to_string()
}

/// Domain part of an address, if it has a non-empty one
pub fn domain_of(address: &str) -> Option<&str> {
    match address.rsplit_once('@') {
        Some((_, domain)) if !domain.is_empty() => Some(domain),
        _ => None,
    }
}

/// Value of the first `Subject:` header line (case-insensitive)
pub fn extract_subject(data: &str) -> String {
    data.split("\r\n")
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("subject")
                .then(|| value.trim().to_string())
        })
        .unwrap_or_else(|| NO_SUBJECT.to_string())
}

/// Random lowercase alphanumeric local part, e.g. `k3v9x0q2ab`
pub fn generate_local_part() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(LOCAL_PART_LENGTH)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect()
}

fn domain_regex() -> &'static Regex {
    static DOMAIN_RE: OnceLock<Regex> = OnceLock::new();
    DOMAIN_RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9-]{0,61}[a-zA-Z0-9]?(\.[a-zA-Z0-9-]+)*\.[a-zA-Z]{2,}$")
            .expect("domain regex is valid")
    })
}

/// Basic domain name validation
pub fn validate_domain(domain: &str) -> Result<()> {
    if domain_regex().is_match(domain) {
        Ok(())
    } else {
        Err(MailError::InvalidDomain(domain.to_string()))
    }
}
