use async_trait::async_trait;
use aws_sdk_sesv2::error::DisplayErrorContext;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::error::MailError;

pub const CHARSET: &str = "UTF-8";

/// Recipient list for one email. A single address converts into a
/// one-element list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipients(Vec<String>);

impl Recipients {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl From<&str> for Recipients {
    fn from(addr: &str) -> Self {
        Self(vec![addr.to_string()])
    }
}

impl From<String> for Recipients {
    fn from(addr: String) -> Self {
        Self(vec![addr])
    }
}

impl From<Vec<String>> for Recipients {
    fn from(addrs: Vec<String>) -> Self {
        Self(addrs)
    }
}

impl From<&[String]> for Recipients {
    fn from(addrs: &[String]) -> Self {
        Self(addrs.to_vec())
    }
}

impl From<&[&str]> for Recipients {
    fn from(addrs: &[&str]) -> Self {
        Self(addrs.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Recipients {
    fn from(addrs: [&str; N]) -> Self {
        Self(addrs.iter().map(|s| s.to_string()).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub charset: &'static str,
}

/// Mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email(&self, email: &OutboundEmail) -> Result<(), MailError>;
}

pub struct Notifier<M> {
    mailer: M,
    sender: String,
}

impl<M: Mailer> Notifier<M> {
    pub fn new<S: Into<String>>(mailer: M, sender: S) -> Self {
        Self {
            mailer,
            sender: sender.into(),
        }
    }

    /// Send one plain-text email to every recipient.
    pub async fn send_mail<R: Into<Recipients>>(
        &self,
        subject: &str,
        body: &str,
        recipients: R,
    ) -> Result<(), MailError> {
        let to = recipients.into().into_vec();
        if to.is_empty() {
            return Err(MailError::NoRecipients);
        }
        let email = OutboundEmail {
            from: self.sender.clone(),
            to,
            subject: subject.to_string(),
            body: body.to_string(),
            charset: CHARSET,
        };
        debug!(subject = %email.subject, recipients = ?email.to, "sending email");
        self.mailer.send_email(&email).await
    }
}

/// Amazon SES (v2 API) transport.
pub struct SesMailer {
    client: aws_sdk_sesv2::Client,
}

impl SesMailer {
    pub fn new(client: aws_sdk_sesv2::Client) -> Self {
        Self { client }
    }

    pub fn from_sdk_config(sdk_config: &aws_config::SdkConfig) -> Self {
        Self::new(aws_sdk_sesv2::Client::new(sdk_config))
    }
}

#[async_trait]
impl Mailer for SesMailer {
    async fn send_email(&self, email: &OutboundEmail) -> Result<(), MailError> {
        let subject = Content::builder()
            .data(&email.subject)
            .charset(email.charset)
            .build()
            .map_err(|e| MailError::Build(e.to_string()))?;
        let text = Content::builder()
            .data(&email.body)
            .charset(email.charset)
            .build()
            .map_err(|e| MailError::Build(e.to_string()))?;
        let message = Message::builder()
            .subject(subject)
            .body(Body::builder().text(text).build())
            .build();

        let resp = self
            .client
            .send_email()
            .from_email_address(&email.from)
            .destination(
                Destination::builder()
                    .set_to_addresses(Some(email.to.clone()))
                    .build(),
            )
            .content(EmailContent::builder().simple(message).build())
            .send()
            .await
            .map_err(|e| MailError::Send(DisplayErrorContext(&e).to_string()))?;

        info!(
            message_id = resp.message_id().unwrap_or("-"),
            subject = %email.subject,
            "email sent"
        );
        Ok(())
    }
}

/// Recording transport for testing
#[derive(Debug, Clone, Default)]
pub struct MockMailer {
    sent: Arc<Mutex<Vec<OutboundEmail>>>,
    fail_subjects: Vec<String>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail sends whose subject matches, after recording them.
    pub fn failing_on<S: Into<String>>(mut self, subject: S) -> Self {
        self.fail_subjects.push(subject.into());
        self
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send_email(&self, email: &OutboundEmail) -> Result<(), MailError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(email.clone());
        }
        if self.fail_subjects.iter().any(|s| s == &email.subject) {
            return Err(MailError::Send(format!("rejected: {}", email.subject)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_sesv2::config::{retry::RetryConfig, BehaviorVersion, Credentials, Region};
    use mockito::Matcher;

    fn ses_client(url: &str) -> aws_sdk_sesv2::Client {
        let conf = aws_sdk_sesv2::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("AKIDTEST", "secret", None, None, "test"))
            .endpoint_url(url)
            .retry_config(RetryConfig::disabled())
            .build();
        aws_sdk_sesv2::Client::from_conf(conf)
    }

    #[tokio::test]
    async fn test_single_recipient_matches_one_element_list() {
        let mailer = MockMailer::new();
        let notifier = Notifier::new(mailer.clone(), "alerts <noreply@example.com>");

        notifier.send_mail("subj", "body", "ops@example.com").await.unwrap();
        notifier
            .send_mail("subj", "body", vec!["ops@example.com".to_string()])
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);
        assert_eq!(sent[0].to, vec!["ops@example.com"]);
        assert_eq!(sent[0].from, "alerts <noreply@example.com>");
        assert_eq!(sent[0].charset, "UTF-8");
    }

    #[tokio::test]
    async fn test_multiple_recipients_in_one_send() {
        let mailer = MockMailer::new();
        let notifier = Notifier::new(mailer.clone(), "noreply@example.com");

        notifier
            .send_mail("subj", "body", ["a@example.com", "b@example.com"])
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["a@example.com", "b@example.com"]);
    }

    #[tokio::test]
    async fn test_empty_recipients_rejected() {
        let mailer = MockMailer::new();
        let notifier = Notifier::new(mailer.clone(), "noreply@example.com");

        let err = notifier
            .send_mail("subj", "body", Vec::<String>::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MailError::NoRecipients));
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_mock_failure_propagates() {
        let mailer = MockMailer::new().failing_on("bad");
        let notifier = Notifier::new(mailer.clone(), "noreply@example.com");

        assert!(notifier.send_mail("bad", "x", "a@example.com").await.is_err());
        assert!(notifier.send_mail("good", "x", "a@example.com").await.is_ok());
        assert_eq!(mailer.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_ses_mailer_sends_simple_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/email/outbound-emails")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "FromEmailAddress": "awslimitchecker <noreply@example.com>",
                "Destination": {"ToAddresses": ["warning@example.com"]},
                "Content": {"Simple": {
                    "Subject": {"Data": "awslimitchecker - warning", "Charset": "UTF-8"},
                    "Body": {"Text": {"Data": "line one\nline two", "Charset": "UTF-8"}}
                }}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"MessageId": "0100-test"}"#)
            .expect(1)
            .create_async()
            .await;

        let notifier = Notifier::new(
            SesMailer::new(ses_client(&server.url())),
            "awslimitchecker <noreply@example.com>",
        );
        notifier
            .send_mail("awslimitchecker - warning", "line one\nline two", "warning@example.com")
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_ses_mailer_surfaces_api_errors() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v2/email/outbound-emails")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_header("x-amzn-errortype", "MessageRejected")
            .with_body(r#"{"message": "Email address is not verified."}"#)
            .create_async()
            .await;

        let notifier = Notifier::new(SesMailer::new(ses_client(&server.url())), "noreply@example.com");
        let err = notifier
            .send_mail("subj", "body", "nobody@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, MailError::Send(_)));
    }
}
