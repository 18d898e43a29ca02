use crate::error::{MailError, Result};
use crate::utils::extract_address;

#[derive(Debug, Clone, PartialEq)]
pub enum SmtpCommand {
    Helo(String),
    Ehlo(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    Rset,
    Quit,
    Noop,
    Unknown(String),
}

impl SmtpCommand {
    /// Parse one command line (terminator already removed).
    ///
    /// The verb is the first whitespace-delimited token, case-folded.
    /// Errors are syntax errors in MAIL/RCPT arguments.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (verb, args) = match line.split_once(char::is_whitespace) {
            Some((verb, args)) => (verb, args.trim()),
            None => (line, ""),
        };

        match verb.to_ascii_uppercase().as_str() {
            "HELO" => Ok(SmtpCommand::Helo(args.to_string())),
            "EHLO" => Ok(SmtpCommand::Ehlo(args.to_string())),
            "MAIL" => Ok(SmtpCommand::MailFrom(Self::parse_path(args, "FROM:")?)),
            "RCPT" => Ok(SmtpCommand::RcptTo(Self::parse_path(args, "TO:")?)),
            "DATA" => Ok(SmtpCommand::Data),
            "RSET" => Ok(SmtpCommand::Rset),
            "QUIT" => Ok(SmtpCommand::Quit),
            "NOOP" => Ok(SmtpCommand::Noop),
            other => Ok(SmtpCommand::Unknown(other.to_string())),
        }
    }

    /// `FROM:<addr>` / `TO:<addr>`, prefix matched case-insensitively
    fn parse_path(args: &str, prefix: &str) -> Result<String> {
        let has_prefix = args
            .get(..prefix.len())
            .is_some_and(|p| p.eq_ignore_ascii_case(prefix));
        if !has_prefix {
            return Err(MailError::SmtpProtocol(format!(
                "expected {} in {:?}",
                prefix, args
            )));
        }

        Ok(extract_address(&args[prefix.len()..]))
    }
}
