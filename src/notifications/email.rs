//! Account confirmation emails.
//!
//! Uses the SMTP settings from the config file. When SMTP is not configured
//! the mailer logs and skips instead of failing the request that triggered it.

use anyhow::Result;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::EmailConfig;

/// Link a user follows to confirm their address
pub fn confirmation_link(public_url: &str, email_token: &str) -> String {
    format!(
        "{}/api/auth/confirmed_email/{}",
        public_url.trim_end_matches('/'),
        email_token
    )
}

pub struct ConfirmationMailer {
    config: EmailConfig,
}

impl ConfirmationMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Check if email sending is configured and enabled
    pub fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    /// Send the "confirm your email" message
    pub async fn send_confirmation(
        &self,
        to_email: &str,
        username: &str,
        confirm_url: &str,
    ) -> Result<()> {
        if !self.is_enabled() {
            tracing::warn!(
                "Email not configured, skipping confirmation email to {}",
                to_email
            );
            return Ok(());
        }

        let subject = "Confirm your email";
        let html_body = render_confirmation_html(username, confirm_url);
        let text_body = render_confirmation_text(username, confirm_url);

        self.send_email(to_email, subject, &html_body, &text_body)
            .await
    }

    /// Send an email with HTML and plain text versions
    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<()> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP host not configured"))?;
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("From address not configured"))?;

        let from_mailbox = format!("{} <{}>", self.config.from_name, from_address);
        let from: Mailbox = from_mailbox.parse()?;
        let to: Mailbox = to_email.parse()?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        let mailer = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        mailer.build().send(email).await?;

        tracing::info!(
            to = %to_email,
            subject = %subject,
            "Email sent successfully"
        );

        Ok(())
    }
}

fn render_confirmation_html(username: &str, confirm_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Confirm your email</title>
    <style>
        body {{ font-family: -apple-system, 'Segoe UI', Roboto, Arial, sans-serif; background-color: #f5f5f5; margin: 0; }}
        .card {{ max-width: 520px; margin: 40px auto; background: #ffffff; border-radius: 8px; padding: 32px 24px; }}
        .card p {{ color: #374151; line-height: 1.6; }}
        .button {{ display: inline-block; background: #2563eb; color: white !important; text-decoration: none; padding: 12px 28px; border-radius: 6px; }}
    </style>
</head>
<body>
    <div class="card">
        <p>Hi {username},</p>
        <p>Thanks for signing up. Please confirm your email address to finish setting up your account.</p>
        <p style="text-align: center;"><a class="button" href="{confirm_url}">Confirm email</a></p>
        <p style="color: #6b7280; font-size: 13px;">If you did not create an account, you can ignore this message.</p>
    </div>
</body>
</html>"#
    )
}

fn render_confirmation_text(username: &str, confirm_url: &str) -> String {
    format!(
        "Hi {username},\n\n\
         Thanks for signing up. Please confirm your email address by opening this link:\n\n\
         {confirm_url}\n\n\
         If you did not create an account, you can ignore this message.\n"
    )
}
