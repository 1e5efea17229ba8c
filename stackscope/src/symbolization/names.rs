//! Names of method identities and event subjects
//!
//! Filled by the runtime collaborator as methods and classes become known;
//! only read while building report snapshots.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::domain::MethodId;

#[derive(Default)]
pub struct NameRegistry {
    methods: RwLock<HashMap<MethodId, Arc<str>>>,
    subjects: RwLock<HashMap<u64, Arc<str>>>,
}

impl NameRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_method(&self, method: MethodId, name: &str) {
        self.methods.write().unwrap_or_else(PoisonError::into_inner).insert(method, Arc::from(name));
    }

    pub fn register_subject(&self, subject: u64, name: &str) {
        self.subjects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(subject, Arc::from(name));
    }

    pub fn method(&self, method: MethodId) -> Option<Arc<str>> {
        self.methods.read().unwrap_or_else(PoisonError::into_inner).get(&method).cloned()
    }

    pub fn subject(&self, subject: u64) -> Option<Arc<str>> {
        self.subjects.read().unwrap_or_else(PoisonError::into_inner).get(&subject).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let names = NameRegistry::new();
        names.register_method(MethodId(1), "app.Main.run");
        names.register_subject(9, "byte[]");

        assert_eq!(names.method(MethodId(1)).as_deref(), Some("app.Main.run"));
        assert_eq!(names.method(MethodId(2)), None);
        assert_eq!(names.subject(9).as_deref(), Some("byte[]"));
    }
}
