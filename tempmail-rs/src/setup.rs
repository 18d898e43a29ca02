//! Non-interactive setup: builds a configuration file from a domain list

use std::collections::HashSet;
use std::fmt::Write;

use crate::config::{Config, DomainSeed};
use crate::error::{MailError, Result};
use crate::utils::validate_domain;

/// Options of the `init` subcommand
#[derive(Debug, Clone)]
pub struct InitOptions {
    pub domains: Vec<String>,
    /// SMTP port of the first domain; the others follow consecutively
    pub base_port: u16,
    pub web_port: u16,
    pub max_accepted: u64,
    pub retention_hours: u64,
    pub cleanup_hours: u64,
}

impl Default for InitOptions {
    fn default() -> Self {
        InitOptions {
            domains: Vec::new(),
            base_port: 2525,
            web_port: 3000,
            max_accepted: 100,
            retention_hours: 24,
            cleanup_hours: 1,
        }
    }
}

pub fn build_config(opts: &InitOptions) -> Result<Config> {
    if opts.domains.is_empty() {
        return Err(MailError::Config("at least one domain is required".to_string()));
    }
    if opts.cleanup_hours == 0 {
        return Err(MailError::Config("cleanup interval must be at least one hour".to_string()));
    }

    let mut seen = HashSet::new();
    let mut seeds = Vec::with_capacity(opts.domains.len());
    for (i, name) in opts.domains.iter().enumerate() {
        let name = name.trim().to_ascii_lowercase();
        validate_domain(&name)?;
        if !seen.insert(name.clone()) {
            return Err(MailError::Config(format!("domain {} listed twice", name)));
        }

        let port = u16::try_from(i)
            .ok()
            .and_then(|i| opts.base_port.checked_add(i))
            .ok_or_else(|| MailError::Config("SMTP ports exceed 65535".to_string()))?;

        seeds.push(DomainSeed {
            name,
            port,
            max_accepted: opts.max_accepted,
            enabled: true,
        });
    }

    let mut config = Config {
        domains: seeds,
        ..Config::default()
    };
    config.api.listen_addr = format!("0.0.0.0:{}", opts.web_port);
    config.retention.retention_secs = hours_to_secs(opts.retention_hours, "retention")?;
    config.retention.cleanup_interval_secs = hours_to_secs(opts.cleanup_hours, "cleanup interval")?;
    Ok(config)
}

fn hours_to_secs(hours: u64, what: &str) -> Result<u64> {
    hours
        .checked_mul(3600)
        .ok_or_else(|| MailError::Config(format!("{} of {} hours is too large", what, hours)))
}

/// DNS and firewall checklist printed after `init`
pub fn next_steps(config: &Config) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "1. Point an MX record of each domain at this server:");
    for domain in &config.domains {
        let _ = writeln!(out, "   {} MX -> <server address>", domain.name);
    }

    let ports: Vec<String> = config.domains.iter().map(|d| d.port.to_string()).collect();
    let _ = writeln!(out, "2. Open the firewall ports:");
    let _ = writeln!(out, "   - API: {}", config.api.listen_addr);
    let _ = writeln!(out, "   - SMTP: {}", ports.join(", "));
    let _ = writeln!(out, "3. Start the server: tempmail-rs --config <file> serve");

    out
}
