//! Async RabbitMQ publisher for verified events.
//!
//! The publisher is shared across request handlers and keeps one connection
//! and channel open, reconnecting when they drop.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions},
    publisher_confirm::Confirmation,
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::types::{QueueMessage, EVENTS_QUEUE};

/// Async RabbitMQ publisher with connection management.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<PublisherInner>,
}

struct PublisherInner {
    url: String,
    connection: RwLock<Option<Connection>>,
    channel: RwLock<Option<Channel>>,
}

impl Publisher {
    /// Create a new publisher. No connection is made until the first publish.
    pub fn new(url: String) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                url,
                connection: RwLock::new(None),
                channel: RwLock::new(None),
            }),
        }
    }

    async fn ensure_connected(&self) -> Result<Channel> {
        {
            let channel = self.inner.channel.read().await;
            if let Some(ch) = channel.as_ref() {
                if ch.status().connected() {
                    return Ok(ch.clone());
                }
            }
        }

        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        // Another task may have reconnected while we waited for the lock.
        if let Some(ch) = channel.as_ref() {
            if ch.status().connected() {
                return Ok(ch.clone());
            }
        }

        info!("rabbitmq_publisher_connecting");

        let conn = Connection::connect(&self.inner.url, ConnectionProperties::default())
            .await
            .context("Failed to connect to RabbitMQ")?;

        info!("rabbitmq_publisher_connected");

        let ch = conn
            .create_channel()
            .await
            .context("Failed to create channel")?;

        ch.confirm_select(ConfirmSelectOptions::default())
            .await
            .context("Failed to enable publisher confirms")?;

        ch.queue_declare(
            EVENTS_QUEUE,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .context("Failed to declare events queue")?;

        info!(queue = EVENTS_QUEUE, "rabbitmq_queue_declared");

        *connection = Some(conn);
        *channel = Some(ch.clone());

        Ok(ch)
    }

    /// Publish a message to the `webhook_events` queue and wait for the
    /// broker's confirmation.
    pub async fn publish(&self, message: &QueueMessage) -> Result<String> {
        let channel = self.ensure_connected().await?;

        let body = serde_json::to_vec(message).context("Failed to serialize message")?;
        let message_id = message.message_id();

        let confirmation = channel
            .basic_publish(
                "",
                EVENTS_QUEUE,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default()
                    .with_delivery_mode(2) // Persistent
                    .with_content_type("application/json".into())
                    .with_message_id(message_id.clone().into()),
            )
            .await
            .context("Failed to publish to events queue")?
            .await
            .context("Failed to confirm publish")?;

        ensure_confirmed(&confirmation, &message_id)?;

        info!(
            queue = EVENTS_QUEUE,
            message_id = %message_id,
            body_length = body.len(),
            "rabbitmq_event_published"
        );

        Ok(message_id)
    }

    /// Close the connection gracefully.
    pub async fn close(&self) {
        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        if let Some(ch) = channel.take() {
            if let Err(e) = ch.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_channel_close_error");
            }
        }

        if let Some(conn) = connection.take() {
            if let Err(e) = conn.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_connection_close_error");
            }
        }

        info!("rabbitmq_publisher_closed");
    }
}

/// The channel runs in confirm mode, so anything but an ack is a failure.
fn ensure_confirmed(confirmation: &Confirmation, message_id: &str) -> Result<()> {
    match confirmation {
        Confirmation::Ack(_) => Ok(()),
        Confirmation::Nack(_) => bail!("Broker rejected message {message_id}"),
        Confirmation::NotRequested => {
            bail!("Publisher confirms not enabled for message {message_id}")
        }
    }
}
