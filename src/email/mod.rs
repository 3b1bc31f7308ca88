use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use log::info;
use thiserror::Error;

use crate::config::SmtpConfig;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct NotifyError(pub String);

/// Payload of the new-ticket notification, a verbatim summary of what the
/// customer entered.
#[derive(Debug, Clone)]
pub struct TicketCreatedEmail {
    pub customer_name: String,
    pub email: String,
    pub product_type: String,
    pub description: String,
}

/// Outbound notification collaborator. Called synchronously after a ticket
/// insert; nothing is queued or retried.
pub trait Notifier: Send + Sync {
    fn ticket_created(&self, payload: &TicketCreatedEmail) -> Result<(), NotifyError>;
}

pub fn render_subject(payload: &TicketCreatedEmail) -> String {
    format!("Nouveau ticket SAV - {}", payload.customer_name)
}

pub fn render_body(payload: &TicketCreatedEmail) -> String {
    format!(
        "<h2>Nouveau ticket SAV</h2>\n\
         <p><strong>Client:</strong> {}</p>\n\
         <p><strong>Email:</strong> {}</p>\n\
         <p><strong>Produit:</strong> {}</p>\n\
         <p><strong>Description:</strong> {}</p>",
        payload.customer_name, payload.email, payload.product_type, payload.description
    )
}

pub struct SmtpNotifier {
    config: SmtpConfig,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }
}

impl Notifier for SmtpNotifier {
    fn ticket_created(&self, payload: &TicketCreatedEmail) -> Result<(), NotifyError> {
        let email = Message::builder()
            .from(
                self.config
                    .from
                    .parse()
                    .map_err(|e| NotifyError(format!("Invalid from address: {e}")))?,
            )
            .to(self
                .config
                .notify_to
                .parse()
                .map_err(|e| NotifyError(format!("Invalid to address: {e}")))?)
            .subject(render_subject(payload))
            .header(ContentType::TEXT_HTML)
            .body(render_body(payload))
            .map_err(|e| NotifyError(format!("Failed to build email: {e}")))?;

        let creds = Credentials::new(self.config.username.clone(), self.config.password.clone());
        let mailer = SmtpTransport::relay(&self.config.server)
            .map_err(|e| NotifyError(format!("Failed to create SMTP transport: {e}")))?
            .port(self.config.port)
            .credentials(creds)
            .build();

        mailer
            .send(&email)
            .map_err(|e| NotifyError(format!("Failed to send email: {e}")))?;

        info!("Sent ticket notification for {}", payload.customer_name);
        Ok(())
    }
}
