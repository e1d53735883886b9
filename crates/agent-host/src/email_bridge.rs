//! Bridges `agent-email`'s `EmailDelivery` seam onto the running instance
//! registry: a resolved inbound email becomes a chat message appended to
//! that agent's own message store.

use std::sync::Arc;

use agent_common::AgentKey;
use agent_email::{EmailDelivery, InboundEmail};
use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use crate::registry::InstanceRegistry;

pub struct EmailDeliveryBridge {
    registry: Arc<InstanceRegistry>,
}

impl EmailDeliveryBridge {
    pub fn new(registry: Arc<InstanceRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl EmailDelivery for EmailDeliveryBridge {
    async fn deliver(&self, agent: AgentKey, email: InboundEmail) -> agent_common::Result<()> {
        let instance = self
            .registry
            .get_agent_by_name(&agent.namespace, &agent.name)
            .await
            .map_err(Into::<agent_common::Error>::into)?;

        let message = json!({
            "id": Uuid::new_v4().to_string(),
            "role": "user",
            "parts": [{"type": "text", "text": format!("inbound email to {}", email.to)}],
            "metadata": {"source": "email", "headers": email.headers},
        });
        instance.chat.handle_chat_messages(vec![message]).await.map_err(crate::error::Error::Agent)?;
        Ok(())
    }
}
