use serde::{Deserialize, Serialize};

crate::define_id_type!(i64, UserId, "user");

/// The operator on whose behalf a mutation runs.
///
/// Identity is the operator's Telegram id; the name is only for display and
/// audit output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub name: String,
}

impl Actor {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id: UserId(id),
            name: name.into(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        self.id.ensure_positive()?;
        if self.name.trim().is_empty() {
            return Err("user name cannot be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_validation() {
        assert!(Actor::new(12345, "knabe").validate().is_ok());
        assert!(Actor::new(0, "knabe").validate().is_err());
        assert!(Actor::new(12345, "").validate().is_err());
    }
}
