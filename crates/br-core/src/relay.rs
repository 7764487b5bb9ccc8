//! Glue between a validated payload and the broker.

use tracing::info;

use crate::alert::{NormalizedAlertMessage, Priority};
use crate::messaging::{
    BrokerError, ConnectionManager, PublishOptions, PublishOutcome, QoS, TopicBuilder,
};
use crate::payload::WebhookPayload;
use crate::transform::AlertTransformer;

/// What happened to one relayed alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReceipt {
    pub message_id: String,
    pub topic: String,
    pub priority: Priority,
    pub outcome: PublishOutcome,
}

/// Transforms payloads and hands them to the [`ConnectionManager`].
#[derive(Debug, Clone)]
pub struct AlertRelay {
    transformer: AlertTransformer,
    topics: TopicBuilder,
    qos: QoS,
    manager: ConnectionManager,
}

impl AlertRelay {
    pub fn new(
        transformer: AlertTransformer,
        topics: TopicBuilder,
        qos: QoS,
        manager: ConnectionManager,
    ) -> Self {
        Self {
            transformer,
            topics,
            qos,
            manager,
        }
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn topics(&self) -> &TopicBuilder {
        &self.topics
    }

    pub fn qos(&self) -> QoS {
        self.qos
    }

    /// Builds the message for `payload` without publishing it.
    pub fn prepare(&self, payload: &WebhookPayload) -> (NormalizedAlertMessage, String) {
        let message = self.transformer.transform(payload);
        let topic = self.topics.topic_for(message.priority, &message.kind);
        (message, topic)
    }

    /// Transforms and publishes one payload.
    ///
    /// Only fails if the message cannot be serialized. Broker trouble is
    /// absorbed by the connection manager and shows up in the outcome.
    pub async fn relay(&self, payload: &WebhookPayload) -> Result<RelayReceipt, BrokerError> {
        let (message, topic) = self.prepare(payload);
        let bytes = message.to_json_bytes()?;

        let outcome = self
            .manager
            .publish(&topic, bytes, PublishOptions::new(self.qos))
            .await;

        info!(
            message_id = %message.id,
            topic = %topic,
            priority = %message.priority,
            outcome = outcome.as_str(),
            "Relayed alert"
        );

        Ok(RelayReceipt {
            message_id: message.id,
            topic,
            priority: message.priority,
            outcome,
        })
    }
}
