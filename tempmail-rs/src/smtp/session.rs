use crate::error::Result;
use crate::smtp::codec::{LineBuffer, LineTooLong};
use crate::smtp::commands::SmtpCommand;
use crate::storage::{MailStore, Message};
use crate::utils::domain_of;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Maximum number of recipients per message
const MAX_RECIPIENTS: usize = 100;

/// Maximum command line length (RFC 5321)
const MAX_LINE_LENGTH: usize = 1000;

/// Socket read chunk size
const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpState {
    /// Connected, greeting sent, no HELO/EHLO yet
    Greeting,
    Ready,
    Mail,
    Rcpt,
    Data,
}

/// Per-session limits taken from configuration
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub max_message_size: usize,
    pub idle_timeout: Duration,
    pub enforce_quota: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            max_message_size: 10_240_000,
            idle_timeout: Duration::from_secs(300),
            enforce_quota: true,
        }
    }
}

/// Replies produced by one chunk of input
#[derive(Debug, Default, PartialEq)]
pub struct Output {
    pub replies: Vec<String>,
    /// The connection must be closed once the replies are written
    pub close: bool,
}

/// SMTP session bound to one receiving domain.
///
/// Owns everything about one connection: protocol state, envelope, body
/// buffer and the partial-line buffer. Completed messages go to the shared
/// [`MailStore`].
pub struct SmtpSession {
    state: SmtpState,
    from: Option<String>,
    to: Vec<String>,
    body: String,
    /// DATA exceeded `max_message_size`; the rest is consumed and dropped
    oversized: bool,
    lines: LineBuffer,
    domain: String,
    store: Arc<MailStore>,
    settings: SessionSettings,
}

impl SmtpSession {
    pub fn new(domain: String, store: Arc<MailStore>, settings: SessionSettings) -> Self {
        Self {
            state: SmtpState::Greeting,
            from: None,
            to: Vec::new(),
            body: String::new(),
            oversized: false,
            lines: LineBuffer::new(),
            domain,
            store,
            settings,
        }
    }

    pub fn state(&self) -> SmtpState {
        self.state
    }

    pub fn sender(&self) -> Option<&str> {
        self.from.as_deref()
    }

    pub fn recipients(&self) -> &[String] {
        &self.to
    }

    pub fn greeting(&self) -> String {
        format!("220 {} Ready\r\n", self.domain)
    }

    /// Serve one connection until QUIT, idle timeout, EOF, transport error
    /// or `shutdown`.
    pub async fn handle<S>(mut self, mut stream: S, shutdown: CancellationToken) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        stream.write_all(self.greeting().as_bytes()).await?;

        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let read = tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Closing session on {} for shutdown", self.domain);
                    let _ = stream.write_all(b"421 Service shutting down\r\n").await;
                    break;
                }
                read = timeout(self.settings.idle_timeout, stream.read(&mut buf)) => read,
            };

            let n = match read {
                Ok(Ok(0)) => {
                    debug!("Client disconnected");
                    break;
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    error!("IO error reading from client: {}", e);
                    return Err(e.into());
                }
                Err(_) => {
                    warn!("Idle timeout on {}, disconnecting", self.domain);
                    let _ = stream.write_all(b"421 Timeout\r\n").await;
                    break;
                }
            };

            let output = self.feed(&buf[..n]).await;
            if !output.replies.is_empty() {
                stream.write_all(output.replies.concat().as_bytes()).await?;
                stream.flush().await?;
            }
            if output.close {
                break;
            }
        }

        let _ = stream.shutdown().await;
        Ok(())
    }

    /// Process one chunk of input bytes.
    ///
    /// Only complete lines are acted on; a trailing partial line waits for
    /// the next chunk. Lines after a QUIT in the same chunk are ignored.
    pub async fn feed(&mut self, data: &[u8]) -> Output {
        self.lines.extend(data);
        let mut output = Output::default();

        loop {
            let limit = match self.state {
                SmtpState::Data => self.settings.max_message_size,
                _ => MAX_LINE_LENGTH,
            };
            let Some(line) = self.lines.next_line(limit) else {
                break;
            };

            let reply = match line {
                Ok(line) if self.state == SmtpState::Data => self.handle_data_line(&line).await,
                Ok(line) => self.handle_command_line(&line).await,
                Err(LineTooLong) if self.state == SmtpState::Data => {
                    self.oversized = true;
                    None
                }
                Err(LineTooLong) => {
                    warn!("Command line too long");
                    Some("500 Line too long\r\n".to_string())
                }
            };

            if let Some(reply) = reply {
                output.close = reply.starts_with("221");
                output.replies.push(reply);
                if output.close {
                    self.lines.clear();
                    break;
                }
            }
        }

        output
    }

    async fn handle_command_line(&mut self, line: &str) -> Option<String> {
        if line.trim().is_empty() {
            return None;
        }
        debug!("Received [{}]: {}", self.domain, line);

        let reply = match SmtpCommand::parse(line) {
            Ok(cmd) => self.handle_command(cmd).await,
            Err(e) => {
                debug!("Syntax error: {}", e);
                "501 Syntax error\r\n".to_string()
            }
        };
        Some(reply)
    }

    async fn handle_command(&mut self, cmd: SmtpCommand) -> String {
        match (self.state, cmd) {
            (_, SmtpCommand::Helo(client)) => {
                info!("HELO from {}", client);
                self.reset_envelope();
                format!("250 {} Hello\r\n", self.domain)
            }
            (_, SmtpCommand::Ehlo(client)) => {
                info!("EHLO from {}", client);
                self.reset_envelope();
                format!(
                    "250-{} Hello\r\n250-SIZE {}\r\n250 OK\r\n",
                    self.domain, self.settings.max_message_size
                )
            }
            (SmtpState::Ready, SmtpCommand::MailFrom(from)) => {
                info!("MAIL FROM: {}", from);
                self.from = Some(from);
                self.to.clear();
                self.state = SmtpState::Mail;
                "250 OK\r\n".to_string()
            }
            (SmtpState::Mail | SmtpState::Rcpt, SmtpCommand::RcptTo(to)) => self.accept_recipient(to).await,
            (SmtpState::Rcpt, SmtpCommand::Data) => {
                debug!("DATA command received");
                self.body.clear();
                self.oversized = false;
                self.state = SmtpState::Data;
                "354 Start mail input; end with <CRLF>.<CRLF>\r\n".to_string()
            }
            (_, SmtpCommand::Rset) => {
                debug!("RSET command");
                self.reset_envelope();
                "250 OK\r\n".to_string()
            }
            (_, SmtpCommand::Noop) => "250 OK\r\n".to_string(),
            (_, SmtpCommand::Quit) => {
                debug!("QUIT command");
                "221 Bye\r\n".to_string()
            }
            (_, SmtpCommand::Unknown(verb)) => {
                debug!("Unknown command: {}", verb);
                "500 Command not recognized\r\n".to_string()
            }
            (state, cmd) => {
                debug!("{:?} not valid in state {:?}", cmd, state);
                "503 Bad sequence of commands\r\n".to_string()
            }
        }
    }

    async fn accept_recipient(&mut self, to: String) -> String {
        let same_domain = domain_of(&to).is_some_and(|d| d.eq_ignore_ascii_case(&self.domain));
        if !same_domain {
            warn!("RCPT TO {} rejected: not a {} mailbox", to, self.domain);
            return "550 Mailbox unavailable\r\n".to_string();
        }

        if self.to.len() >= MAX_RECIPIENTS {
            warn!("Too many recipients: {}", self.to.len());
            return format!("452 Too many recipients (max {})\r\n", MAX_RECIPIENTS);
        }

        if self.settings.enforce_quota {
            match self.store.registry().get(&self.domain).await {
                Some(domain) if !domain.enabled => {
                    warn!("RCPT TO {} rejected: {} is disabled", to, self.domain);
                    return "550 Mailbox unavailable\r\n".to_string();
                }
                Some(domain) if domain.is_quota_reached() => {
                    warn!("RCPT TO {} rejected: {} is full", to, self.domain);
                    return "452 Mailbox full\r\n".to_string();
                }
                Some(_) => {}
                None => {
                    warn!("Domain {} is no longer registered", self.domain);
                    return "550 Mailbox unavailable\r\n".to_string();
                }
            }
        }

        info!("RCPT TO: {}", to);
        self.to.push(to);
        self.state = SmtpState::Rcpt;
        "250 OK\r\n".to_string()
    }

    async fn handle_data_line(&mut self, line: &str) -> Option<String> {
        if line == "." {
            return Some(self.finish_message().await);
        }
        if self.oversized {
            return None;
        }

        // Transparency: a leading ".." carries one escaped dot
        let line = line.strip_prefix('.').filter(|_| line.starts_with("..")).unwrap_or(line);

        if self.body.len() + line.len() + 2 > self.settings.max_message_size {
            warn!(
                "Message too large (max {} bytes)",
                self.settings.max_message_size
            );
            self.oversized = true;
            self.body.clear();
            return None;
        }

        self.body.push_str(line);
        self.body.push_str("\r\n");
        None
    }

    async fn finish_message(&mut self) -> String {
        if self.oversized {
            self.reset_envelope();
            return "552 Message size exceeds fixed maximum\r\n".to_string();
        }

        info!("End of DATA received, total size: {} bytes", self.body.len());
        let message = Message::received(
            self.from.take().unwrap_or_default(),
            std::mem::take(&mut self.to),
            self.domain.clone(),
            std::mem::take(&mut self.body),
        );
        self.store.ingest(message).await;

        self.reset_envelope();
        "250 OK Message accepted\r\n".to_string()
    }

    fn reset_envelope(&mut self) {
        self.from = None;
        self.to.clear();
        self.body.clear();
        self.oversized = false;
        self.state = SmtpState::Ready;
    }
}
