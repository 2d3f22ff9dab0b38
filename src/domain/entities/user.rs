use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub created_at: Option<chrono::NaiveDateTime>,
}

impl User {
    /// Name shown to other collaborators: display name when set, email otherwise.
    pub fn display_identity(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.email)
    }
}
