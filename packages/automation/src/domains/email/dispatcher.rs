//! Per-recipient batch dispatch.
//!
//! One recipient's failure never aborts the batch: resolution misses,
//! provider rejections, and timeouts all become `failed` SendLog rows and
//! the stream moves on. The two exceptions are a fatal provider error
//! (auth), which flips a batch-wide flag so remaining recipients are
//! `skipped` instead of hammering a dead credential, and a store failure,
//! which is fatal to the whole operation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crm::models::Contact;
use futures::{stream, StreamExt};
use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::common::PipelineError;
use crate::kernel::deps::DispatchSettings;
use crate::kernel::traits::{BaseContactResolver, BaseEmailSender};
use crate::store::{EmailStore, StoreError};

use super::models::{EmailSchedule, EmailTemplate, SendLog, SendStatus};
use super::renderer::Template;

pub struct Dispatcher {
    store: Arc<dyn EmailStore>,
    resolver: Arc<dyn BaseContactResolver>,
    sender: Arc<dyn BaseEmailSender>,
    settings: DispatchSettings,
}

enum Outcome {
    Sent { message_id: String },
    Failed { error: String },
    Skipped { reason: String },
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn EmailStore>,
        resolver: Arc<dyn BaseContactResolver>,
        sender: Arc<dyn BaseEmailSender>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            resolver,
            sender,
            settings,
        }
    }

    /// Send `template` to every recipient for one fire window, writing
    /// exactly one SendLog row per recipient. Returns the rows in no
    /// particular order.
    pub async fn dispatch(
        &self,
        schedule: &EmailSchedule,
        template: &EmailTemplate,
        recipients: &[String],
        fire_window: DateTime<Utc>,
    ) -> Result<Vec<SendLog>, PipelineError> {
        // Broken placeholder syntax fails the batch before any row exists.
        let subject = Template::parse(&template.subject)?;
        let body = Template::parse(&template.body)?;

        let provider_down = AtomicBool::new(false);

        // Materialized up-front so the batch future stays Send.
        let sends: Vec<_> = recipients
            .iter()
            .map(|email| {
                self.send_and_record(schedule, &subject, &body, email, fire_window, &provider_down)
            })
            .collect();

        let logs: Vec<Result<SendLog, StoreError>> = stream::iter(sends)
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        logs.into_iter()
            .collect::<Result<Vec<_>, _>>()
            .map_err(PipelineError::from)
    }

    async fn send_and_record(
        &self,
        schedule: &EmailSchedule,
        subject: &Template,
        body: &Template,
        email: &str,
        fire_window: DateTime<Utc>,
        provider_down: &AtomicBool,
    ) -> Result<SendLog, StoreError> {
        let outcome = self
            .send_one(schedule, subject, body, email, fire_window, provider_down)
            .await?;
        self.record(schedule, email, fire_window, outcome).await
    }

    async fn send_one(
        &self,
        schedule: &EmailSchedule,
        subject: &Template,
        body: &Template,
        email: &str,
        fire_window: DateTime<Utc>,
        provider_down: &AtomicBool,
    ) -> Result<Outcome, StoreError> {
        if provider_down.load(Ordering::SeqCst) {
            return Ok(Outcome::Skipped {
                reason: "provider unavailable".to_string(),
            });
        }

        // Idempotent resend guard: a `sent` row for this window stands.
        if self
            .store
            .find_sent_log(schedule.id, email, fire_window)
            .await?
            .is_some()
        {
            debug!(schedule_id = %schedule.id, email, "already sent for this fire window");
            return Ok(Outcome::Skipped {
                reason: "already sent for this fire window".to_string(),
            });
        }

        let contact = match timeout(self.settings.send_timeout, self.resolver.resolve(email)).await
        {
            Err(_) => {
                return Ok(Outcome::Failed {
                    error: "contact resolution timed out".to_string(),
                })
            }
            Ok(Err(e)) => {
                if e.is_provider_fatal() {
                    warn!(schedule_id = %schedule.id, error = %e, "provider rejected credentials, skipping remaining recipients");
                    provider_down.store(true, Ordering::SeqCst);
                }
                return Ok(Outcome::Failed {
                    error: format!("contact resolution failed: {e}"),
                });
            }
            Ok(Ok(None)) => {
                return Ok(Outcome::Failed {
                    error: "contact not found".to_string(),
                })
            }
            Ok(Ok(Some(contact))) => contact,
        };

        let data = personalization(&contact);
        let rendered_subject = subject.render(&data);
        let rendered_body = body.render(&data);

        let outcome = match timeout(
            self.settings.send_timeout,
            self.sender
                .send(&contact.contact_id, &rendered_subject, &rendered_body),
        )
        .await
        {
            Err(_) => Outcome::Failed {
                error: "send timed out".to_string(),
            },
            Ok(Err(e)) => {
                if e.is_provider_fatal() {
                    warn!(schedule_id = %schedule.id, error = %e, "provider rejected credentials, skipping remaining recipients");
                    provider_down.store(true, Ordering::SeqCst);
                }
                Outcome::Failed {
                    error: format!("send failed: {e}"),
                }
            }
            Ok(Ok(receipt)) => Outcome::Sent {
                message_id: receipt.message_id,
            },
        };

        Ok(outcome)
    }

    async fn record(
        &self,
        schedule: &EmailSchedule,
        email: &str,
        fire_window: DateTime<Utc>,
        outcome: Outcome,
    ) -> Result<SendLog, StoreError> {
        let builder = SendLog::builder()
            .schedule_id(schedule.id)
            .recipient_email(email)
            .provider(self.sender.provider())
            .fire_window(fire_window);

        let log = match outcome {
            Outcome::Sent { message_id } => builder
                .provider_message_id(message_id)
                .status(SendStatus::Sent)
                .build(),
            Outcome::Failed { error } => {
                builder.status(SendStatus::Failed).error(error).build()
            }
            Outcome::Skipped { reason } => {
                builder.status(SendStatus::Skipped).error(reason).build()
            }
        };

        self.store.insert_send_log(log).await
    }
}

/// Flat personalization object handed to the renderer: the contact's CRM
/// fields plus the recipient address under `email`.
fn personalization(contact: &Contact) -> Value {
    let mut data = match &contact.fields {
        Value::Object(map) => Value::Object(map.clone()),
        _ => json!({}),
    };
    if let Value::Object(map) = &mut data {
        map.insert("email".to_string(), Value::String(contact.email.clone()));
    }
    data
}
