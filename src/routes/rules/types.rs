use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

#[derive(Debug, Deserialize, IntoParams)]
pub struct RulesQuery {
    /// Only return rules owned by this user
    pub user_id: Option<Uuid>,
}
