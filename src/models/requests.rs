//! Request DTOs for the HTTP API
//!
//! Defines the structure of incoming HTTP request bodies.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;

use crate::content::{ContentType, Priority};
use crate::pipeline::ProcessingRequest;
use crate::tenant::TenantId;

/// Longest accepted client-supplied request id.
pub const MAX_ID_LENGTH: usize = 128;

/// Largest accepted batch.
pub const MAX_BATCH_ITEMS: usize = 100;

/// Request body for POST /v1/content
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitContentRequest {
    /// Client-chosen id; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    pub content_type: ContentType,
    pub content: Value,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub hotfix: bool,
}

impl SubmitContentRequest {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if let Some(id) = &self.id {
            if id.trim().is_empty() {
                return Some("id cannot be empty".to_string());
            }
            if id.len() > MAX_ID_LENGTH {
                return Some(format!("id exceeds maximum length of {} characters", MAX_ID_LENGTH));
            }
        }
        if self.content.is_null() {
            return Some("content is required".to_string());
        }
        None
    }

    pub fn into_processing(self, tenant: TenantId) -> ProcessingRequest {
        let mut request = ProcessingRequest::new(tenant, self.content_type, self.content)
            .with_priority(self.priority);
        if let Some(id) = self.id {
            request = request.with_id(id);
        }
        if self.hotfix {
            request = request.hotfix();
        }
        request
    }
}

/// Request body for POST /v1/content/batch
#[derive(Debug, Clone, Deserialize)]
pub struct BatchSubmitRequest {
    pub items: Vec<SubmitContentRequest>,
}

impl BatchSubmitRequest {
    pub fn validate(&self) -> Option<String> {
        if self.items.is_empty() {
            return Some("items cannot be empty".to_string());
        }
        if self.items.len() > MAX_BATCH_ITEMS {
            return Some(format!("batch exceeds {} items", MAX_BATCH_ITEMS));
        }
        if let Some(error) = self
            .items
            .iter()
            .enumerate()
            .find_map(|(i, item)| item.validate().map(|e| format!("items[{}]: {}", i, e)))
        {
            return Some(error);
        }
        let mut seen = HashSet::new();
        self.items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| item.id.as_deref().map(|id| (i, id)))
            .find(|(_, id)| !seen.insert(*id))
            .map(|(i, id)| format!("items[{}]: duplicate id {}", i, id))
    }
}

/// Request body for POST /v1/cache/invalidate
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvalidateRequest {
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Glob relative to the tenant namespace
    #[serde(default)]
    pub pattern: Option<String>,
}

impl InvalidateRequest {
    pub fn validate(&self) -> Option<String> {
        let has_tags = self.tags.as_ref().is_some_and(|tags| !tags.is_empty());
        match &self.pattern {
            Some(pattern) if pattern.is_empty() => Some("pattern cannot be empty".to_string()),
            None if !has_tags => Some("tags or pattern is required".to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_submit_request_deserialize() {
        let json = r#"{"content_type": "dialogue", "content": {"lines": []}, "priority": "critical"}"#;
        let req: SubmitContentRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.content_type, ContentType::Dialogue);
        assert_eq!(req.priority, Priority::Urgent);
        assert!(req.id.is_none());
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_into_processing_keeps_client_id() {
        let req = SubmitContentRequest {
            id: Some("client-1".into()),
            content_type: ContentType::Game,
            content: json!({"title": "x"}),
            priority: Priority::High,
            hotfix: true,
        };
        let processing = req.into_processing(TenantId::parse("springfield").unwrap());
        assert_eq!(processing.id, "client-1");
        assert!(processing.metadata.hotfix);
        assert_eq!(processing.metadata.priority, Priority::High);
    }

    #[test]
    fn test_validate_rejects_long_id() {
        let req = SubmitContentRequest {
            id: Some("x".repeat(MAX_ID_LENGTH + 1)),
            content_type: ContentType::Scene,
            content: json!({}),
            priority: Priority::Normal,
            hotfix: false,
        };
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_batch_validation_points_at_item() {
        let batch: BatchSubmitRequest = serde_json::from_value(json!({
            "items": [
                {"content_type": "scene", "content": {"id": "a"}},
                {"content_type": "scene", "content": null}
            ]
        }))
        .unwrap();
        assert_eq!(batch.validate(), Some("items[1]: content is required".to_string()));
    }

    #[test]
    fn test_batch_validation_rejects_repeated_ids() {
        let batch: BatchSubmitRequest = serde_json::from_value(json!({
            "items": [
                {"id": "a", "content_type": "scene", "content": {"id": "a"}},
                {"content_type": "scene", "content": {"id": "b"}},
                {"id": "a", "content_type": "scene", "content": {"id": "c"}}
            ]
        }))
        .unwrap();
        assert_eq!(batch.validate(), Some("items[2]: duplicate id a".to_string()));
    }

    #[test]
    fn test_invalidate_requires_a_selector() {
        assert!(InvalidateRequest::default().validate().is_some());
        let by_tags = InvalidateRequest {
            tags: Some(vec!["quiz".into()]),
            pattern: None,
        };
        assert!(by_tags.validate().is_none());
        let empty_pattern = InvalidateRequest {
            tags: None,
            pattern: Some(String::new()),
        };
        assert!(empty_pattern.validate().is_some());
    }
}
