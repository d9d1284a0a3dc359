use uuid::Uuid;

/// Wire form of a travel request status change, published for downstream consumers.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct RequestChangedEvent {
    pub request_id: Uuid,
    pub from: String,
    pub to: String,
    pub actor_id: String,
    pub guide_id: Option<String>,
    pub timestamp: i64,
}
