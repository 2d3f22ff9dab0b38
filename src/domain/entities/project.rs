use uuid::Uuid;

/// A shared project. The owner is fixed at creation and is never stored as a
/// membership row; ownership resolves to an implicit admin role.
#[derive(Debug, Clone)]
pub struct Project {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: Option<chrono::NaiveDateTime>,
}
