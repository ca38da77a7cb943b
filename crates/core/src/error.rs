use crate::types::EntryId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} {name}")]
    NotFound { entity: &'static str, name: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Port range exhausted: requested {requested}, only {available} free")]
    RangeExhausted { requested: usize, available: usize },
}

impl CoreError {
    /// Shorthand for a missing device-side entry addressed by id.
    pub fn missing_entry(entity: &'static str, id: EntryId) -> Self {
        Self::NotFound {
            entity,
            name: id.to_string(),
        }
    }
}
