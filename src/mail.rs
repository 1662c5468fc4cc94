use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::config::MailConfig;

#[derive(Debug, Clone, Serialize)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Outbound email capability.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> anyhow::Result<()>;
}

/// Resend HTTP API client.
#[derive(Clone)]
pub struct ResendMailer {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct SendEmailBody<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

impl ResendMailer {
    pub fn new(cfg: &MailConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("build mail http client")?;
        Ok(Self {
            http,
            api_url: cfg.api_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
        })
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    #[instrument(skip(self, message), fields(to = %message.to))]
    async fn send(&self, message: &MailMessage) -> anyhow::Result<()> {
        let body = SendEmailBody {
            from: &message.from,
            to: [&message.to],
            subject: &message.subject,
            html: &message.html,
        };
        self.http
            .post(format!("{}/emails", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("send email request")?
            .error_for_status()
            .context("email provider rejected message")?;
        debug!("email sent");
        Ok(())
    }
}

pub fn otp_message(from: &str, to: &str, code: &str) -> MailMessage {
    MailMessage {
        from: from.to_string(),
        to: to.to_string(),
        subject: "Your OTP code".to_string(),
        html: format!(
            "<p>Your one-time code is <strong>{code}</strong>.</p>\
             <p>It expires in 10 minutes. If you did not request it, ignore this email.</p>"
        ),
    }
}
