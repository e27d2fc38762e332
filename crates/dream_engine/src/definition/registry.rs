//! UUID allocation and validation within one project

use std::collections::HashSet;

use super::DefinitionError;
use crate::foundation::uuid::Uuid;

/// Tracks every identifier in use by a project's definitions.
///
/// Each project owns its own registry, so two projects loaded in one
/// process never see each other's identifiers.
#[derive(Debug, Clone, Default)]
pub struct UuidRegistry {
    used: HashSet<Uuid>,
}

impl UuidRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh identifier and reserve it
    pub fn allocate(&mut self) -> Uuid {
        loop {
            let candidate = Uuid::random();
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    /// Check that `uuid` can name a definition
    pub fn validate(uuid: &Uuid) -> Result<(), DefinitionError> {
        if uuid.is_valid() {
            Ok(())
        } else {
            Err(DefinitionError::InvalidUuid(uuid.to_string()))
        }
    }

    /// Reserve an identifier read from storage
    pub fn register(&mut self, uuid: &Uuid) -> Result<(), DefinitionError> {
        Self::validate(uuid)?;
        if self.used.insert(uuid.clone()) {
            Ok(())
        } else {
            Err(DefinitionError::DuplicateUuid(uuid.clone()))
        }
    }

    /// Free an identifier whose definition was removed
    pub fn release(&mut self, uuid: &Uuid) -> bool {
        self.used.remove(uuid)
    }

    /// Whether `uuid` is reserved
    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.used.contains(uuid)
    }

    /// Number of reserved identifiers
    pub fn len(&self) -> usize {
        self.used.len()
    }

    /// Whether nothing is reserved
    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_reserves() {
        let mut registry = UuidRegistry::new();
        let a = registry.allocate();
        let b = registry.allocate();
        assert_ne!(a, b);
        assert!(registry.contains(&a));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_register_rejects_duplicates_and_blanks() {
        let mut registry = UuidRegistry::new();
        registry.register(&Uuid::new("a")).unwrap();
        assert!(matches!(
            registry.register(&Uuid::new("a")),
            Err(DefinitionError::DuplicateUuid(_))
        ));
        assert!(matches!(
            registry.register(&Uuid::nil()),
            Err(DefinitionError::InvalidUuid(_))
        ));
    }

    #[test]
    fn test_release_allows_reuse() {
        let mut registry = UuidRegistry::new();
        let uuid = Uuid::new("a");
        registry.register(&uuid).unwrap();
        assert!(registry.release(&uuid));
        assert!(registry.register(&uuid).is_ok());
    }

    #[test]
    fn test_registries_are_independent() {
        let mut first = UuidRegistry::new();
        let mut second = UuidRegistry::new();
        first.register(&Uuid::new("shared")).unwrap();
        assert!(second.register(&Uuid::new("shared")).is_ok());
    }
}
