//! Quote-submission email path.
//!
//! A quote request is rendered into a small HTML email and handed to a
//! [`QuoteMailer`]. The mailer is constructed once at startup and injected
//! through shared state; nothing here is process-global.

use crate::config::MailConfig;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

/// Inbound quote-submission body. Validation happens in
/// [`QuoteRequest::validate`], which names the first missing field.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub message: Option<String>,
}

/// A validated quote submission.
#[derive(Debug, Clone)]
pub struct Quote {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub message: Option<String>,
}

impl QuoteRequest {
    /// Require name and email; returns the missing field's wire name.
    pub fn validate(self) -> Result<Quote, &'static str> {
        let name = non_blank(self.name).ok_or("name")?;
        let email = non_blank(self.email).ok_or("email")?;
        Ok(Quote {
            name,
            email,
            phone: non_blank(self.phone),
            address: non_blank(self.address),
            message: non_blank(self.message),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// A rendered, ready-to-send email.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteEmail {
    pub subject: String,
    pub html_body: String,
    pub reply_to: String,
}

/// Render the notification email for a quote submission. All
/// caller-supplied text is HTML-escaped.
pub fn render_quote_email(quote: &Quote) -> QuoteEmail {
    let mut rows = vec![
        ("Name", quote.name.clone()),
        ("Email", quote.email.clone()),
    ];
    if let Some(ref phone) = quote.phone {
        rows.push(("Phone", phone.clone()));
    }
    if let Some(ref address) = quote.address {
        rows.push(("Property", address.clone()));
    }
    if let Some(ref message) = quote.message {
        rows.push(("Message", message.clone()));
    }

    let mut body = String::from("<h2>New quote request</h2>\n<table>\n");
    for (label, value) in &rows {
        body.push_str(&format!(
            "<tr><td><b>{}</b></td><td>{}</td></tr>\n",
            label,
            escape_html(value)
        ));
    }
    body.push_str("</table>\n");

    QuoteEmail {
        subject: format!("Quote request from {}", quote.name),
        html_body: body,
        reply_to: quote.email.clone(),
    }
}

/// Minimal HTML entity escaping for user-supplied text.
fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Transactional-mail delivery seam.
#[async_trait]
pub trait QuoteMailer: Send + Sync {
    async fn send(&self, email: &QuoteEmail) -> Result<()>;
}

/// Mailer backed by a third-party transactional-email HTTP API.
pub struct HttpMailer {
    client: reqwest::Client,
    config: MailConfig,
}

impl HttpMailer {
    pub fn new(config: MailConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl QuoteMailer for HttpMailer {
    async fn send(&self, email: &QuoteEmail) -> Result<()> {
        let payload = serde_json::json!({
            "from": self.config.from,
            "to": self.config.to,
            "reply_to": email.reply_to,
            "subject": email.subject,
            "html": email.html_body,
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .context("transactional mail request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("mail API returned {status}");
        }
        info!(subject = %email.subject, "quote email delivered");
        Ok(())
    }
}
