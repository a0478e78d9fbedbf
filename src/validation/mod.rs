// src/validation/mod.rs
use crate::registry::CheckerRegistry;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown module {0:?}")]
    UnknownModule(String),

    #[error("unknown check {check:?} for module {module:?}")]
    UnknownCheck { module: String, check: String },

    #[error("check {0:?} requested without a module")]
    CheckWithoutModule(String),
}

/// Static allow-list of (module, check) pairs. Empty strings select everything.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    allowed: HashMap<String, HashSet<String>>,
}

impl Validator {
    pub fn new(allowed: HashMap<String, HashSet<String>>) -> Self {
        Self { allowed }
    }

    pub fn from_registry(registry: &CheckerRegistry) -> Self {
        let allowed = registry
            .modules()
            .iter()
            .map(|m| (m.name.clone(), m.checks.iter().cloned().collect()))
            .collect();
        Self::new(allowed)
    }

    pub fn authorize(&self, module: &str, check: &str) -> Result<(), ValidationError> {
        if module.is_empty() {
            return if check.is_empty() {
                Ok(())
            } else {
                Err(ValidationError::CheckWithoutModule(check.to_string()))
            };
        }

        let checks = self
            .allowed
            .get(module)
            .ok_or_else(|| ValidationError::UnknownModule(module.to_string()))?;

        if check.is_empty() || checks.contains(check) {
            Ok(())
        } else {
            Err(ValidationError::UnknownCheck {
                module: module.to_string(),
                check: check.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> Validator {
        let mut allowed = HashMap::new();
        allowed.insert(
            "tracer".to_string(),
            ["agent", "collector"].iter().map(|s| s.to_string()).collect(),
        );
        allowed.insert(
            "idgen".to_string(),
            ["nextid"].iter().map(|s| s.to_string()).collect(),
        );
        Validator::new(allowed)
    }

    #[test]
    fn test_accepts_known_pairs_and_wildcards() {
        let v = validator();
        assert!(v.authorize("", "").is_ok());
        assert!(v.authorize("tracer", "").is_ok());
        assert!(v.authorize("tracer", "agent").is_ok());
        assert!(v.authorize("idgen", "nextid").is_ok());
    }

    #[test]
    fn test_rejects_unknown_module() {
        assert_eq!(
            validator().authorize("redis", ""),
            Err(ValidationError::UnknownModule("redis".to_string()))
        );
    }

    #[test]
    fn test_rejects_check_of_another_module() {
        assert_eq!(
            validator().authorize("idgen", "agent"),
            Err(ValidationError::UnknownCheck {
                module: "idgen".to_string(),
                check: "agent".to_string(),
            })
        );
    }

    #[test]
    fn test_rejects_check_without_module() {
        assert!(matches!(
            validator().authorize("", "ping"),
            Err(ValidationError::CheckWithoutModule(_))
        ));
    }
}
