//! Tenant-scoped topic names

use crate::config::TopicConfig;
use crate::constants::topics;

/// Builds `{product}.{instance}.tenant.{tenant}.{suffix}` topic names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicNaming {
    prefix: String,
}

impl TopicNaming {
    pub fn new(product_id: &str, instance_id: &str, tenant_token: &str) -> Self {
        Self {
            prefix: format!("{product_id}.{instance_id}.tenant.{tenant_token}."),
        }
    }

    pub fn from_config(config: &TopicConfig) -> Self {
        Self::new(&config.product_id, &config.instance_id, &config.tenant_token)
    }

    pub fn unprocessed_batch_operations(&self) -> String {
        self.topic(topics::UNPROCESSED_BATCH_OPERATIONS)
    }

    pub fn unprocessed_batch_elements(&self) -> String {
        self.topic(topics::UNPROCESSED_BATCH_ELEMENTS)
    }

    pub fn failed_batch_elements(&self) -> String {
        self.topic(topics::FAILED_BATCH_ELEMENTS)
    }

    pub fn all(&self) -> Vec<String> {
        vec![
            self.unprocessed_batch_operations(),
            self.unprocessed_batch_elements(),
            self.failed_batch_elements(),
        ]
    }

    fn topic(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.prefix)
    }
}
