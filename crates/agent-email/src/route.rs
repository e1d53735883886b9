//! `routeAgentEmail(email, env, {resolver})`: resolve the target agent and
//! hand the message to whatever delivers it into that instance's inbox.

use async_trait::async_trait;

use agent_common::AgentKey;

use crate::error::Result;
use crate::resolver::{EmailResolver, InboundEmail};

/// Decouples email routing from the instance registry, same seam as
/// `McpReadinessGate` in the chat subsystem: `agent-host` implements this
/// against its own running instances.
#[async_trait]
pub trait EmailDelivery: Send + Sync {
    async fn deliver(&self, agent: AgentKey, email: InboundEmail) -> agent_common::Result<()>;
}

pub async fn route_agent_email(email: InboundEmail, resolver: &dyn EmailResolver, delivery: &dyn EmailDelivery) -> Result<()> {
    let agent = resolver.resolve(&email)?;
    delivery.deliver(agent, email).await?;
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::CatchAllResolver;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingDelivery {
        delivered: Mutex<Vec<AgentKey>>,
    }

    #[async_trait]
    impl EmailDelivery for RecordingDelivery {
        async fn deliver(&self, agent: AgentKey, _email: InboundEmail) -> agent_common::Result<()> {
            self.delivered.lock().unwrap().push(agent);
            Ok(())
        }
    }

    #[tokio::test]
    async fn routes_to_the_resolved_agent() {
        let resolver = CatchAllResolver { agent_name: "support".to_string(), agent_id: "default".to_string() };
        let delivery = RecordingDelivery::default();
        let email = InboundEmail { to: "anything@example.com".to_string(), headers: HashMap::new() };

        route_agent_email(email, &resolver, &delivery).await.unwrap();

        let delivered = delivery.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0], AgentKey::new("support", "default"));
    }
}
