//! Settlement receipt dispatch over SMTP.
//!
//! Strictly a fire-and-forget sink: callers spawn sends in the background
//! and a failure is logged, never propagated into the financial
//! transaction that triggered it.

use crate::config::SmtpConfig;
use crate::models::Settlement;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use tracing::{debug, info};

#[derive(Clone)]
pub struct Notifier {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from_email: String,
    from_name: String,
}

impl Notifier {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let transport = if config.enabled {
            let creds = Credentials::new(
                config.username.clone(),
                config.password.expose_secret().clone(),
            );
            let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| AppError::EmailError(format!("Failed to create SMTP relay: {}", e)))?
                .port(config.port)
                .credentials(creds)
                .build();
            Some(transport)
        } else {
            None
        };

        Ok(Self {
            transport,
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Email the receipt for a fully collected settlement.
    pub async fn send_settlement_receipt(&self, settlement: &Settlement) -> Result<(), AppError> {
        let Some(transport) = self.transport.as_ref() else {
            debug!("SMTP disabled; skipping settlement receipt");
            return Ok(());
        };
        let Some(to) = settlement.receipt_email.as_deref() else {
            debug!(
                settlement_id = %settlement.settlement_id,
                "No receipt email on settlement; skipping"
            );
            return Ok(());
        };

        let from_mailbox: Mailbox = format!("{} <{}>", self.from_name, self.from_email)
            .parse()
            .map_err(|e| AppError::EmailError(format!("Invalid from address: {}", e)))?;
        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| AppError::EmailError(format!("Invalid recipient: {}", e)))?;

        let body = format!(
            "Your rental charge for reservation {} is fully settled.\n\n\
             Return:     {}\n\
             Base fare:  {}\n\
             Late fee:   {}\n\
             Damage fee: {}\n\
             Total:      {}\n\n\
             Thank you for riding with us.",
            settlement.reservation_id,
            settlement.parsed_timing(),
            settlement.base_fare,
            settlement.late_fee,
            settlement.damage_fee,
            settlement.total_due,
        );

        let message = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(format!(
                "Receipt for reservation {}",
                settlement.reservation_id
            ))
            .header(ContentType::TEXT_PLAIN)
            .body(body)?;

        transport
            .send(message)
            .await
            .map_err(|e| AppError::EmailError(format!("Failed to send receipt: {}", e)))?;

        info!(
            settlement_id = %settlement.settlement_id,
            to = %to,
            "Settlement receipt sent"
        );

        Ok(())
    }
}
