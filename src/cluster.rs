use async_trait::async_trait;

/// Supplies the hypervisor node an API call should target.
///
/// Resolution runs once per orchestration call rather than once per
/// orchestrator, so implementations are free to rotate across a fleet,
/// probe for liveness, or consult an inventory service on every call.
#[async_trait]
pub trait NodeResolver: Send + Sync {
    /// Address (hostname or IP) of a node currently able to take API calls.
    async fn reachable_node(&self) -> anyhow::Result<String>;
}

/// Resolver that always targets one fixed node.
#[derive(Debug, Clone)]
pub struct StaticNode {
    address: String,
}

impl StaticNode {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl NodeResolver for StaticNode {
    async fn reachable_node(&self) -> anyhow::Result<String> {
        Ok(self.address.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_node_returns_its_address() {
        let resolver = StaticNode::new("10.0.0.7");
        assert_eq!(resolver.reachable_node().await.unwrap(), "10.0.0.7");
    }
}
