use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::utils::extract_subject;

/// A received message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    /// Envelope sender (MAIL FROM)
    pub from: String,
    /// Envelope recipients (RCPT TO), in acceptance order
    pub to: Vec<String>,
    /// Domain whose listener received the message
    pub domain: String,
    pub subject: String,
    /// Raw DATA content with dot-stuffing removed
    pub body: String,
    pub received_at: DateTime<Utc>,
    pub read: bool,
}

impl Message {
    /// Build a freshly received, unread message
    pub fn received(from: String, to: Vec<String>, domain: String, body: String) -> Self {
        Message {
            id: Uuid::new_v4().to_string(),
            subject: extract_subject(&body),
            from,
            to,
            domain,
            body,
            received_at: Utc::now(),
            read: false,
        }
    }

    /// Case-insensitive match against subject, sender, recipients and body.
    /// `needle` must already be lowercase.
    pub(crate) fn matches_text(&self, needle: &str) -> bool {
        self.subject.to_lowercase().contains(needle)
            || self.from.to_lowercase().contains(needle)
            || self.body.to_lowercase().contains(needle)
            || self.to.iter().any(|to| to.to_lowercase().contains(needle))
    }
}

/// Filters for [`crate::storage::MailStore::query`]; all set filters must match
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageQuery {
    /// Exact domain name
    pub domain: Option<String>,
    /// Substring of any recipient address
    pub recipient: Option<String>,
    /// Free text over subject, sender and body
    pub search: Option<String>,
}

/// One page of query results, newest first
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub emails: Vec<Message>,
    pub total: usize,
    pub page: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MailStats {
    pub total: usize,
    pub unread: usize,
    pub by_domain: BTreeMap<String, usize>,
}

/// Broadcast to subscribers after every successful ingestion
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageNotification {
    pub id: String,
    pub domain: String,
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub received_at: DateTime<Utc>,
}

impl From<&Message> for MessageNotification {
    fn from(message: &Message) -> Self {
        MessageNotification {
            id: message.id.clone(),
            domain: message.domain.clone(),
            from: message.from.clone(),
            to: message.to.clone(),
            subject: message.subject.clone(),
            received_at: message.received_at,
        }
    }
}
