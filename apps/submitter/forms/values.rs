use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};

/// Raw or resolved form input, keyed by field name.
pub type FormValues = BTreeMap<String, String>;

/// Shared handle to the values of one mounted form.
///
/// Field resolvers and wrapped async actions write through this handle, the
/// submission flow reads a snapshot of it.
#[derive(Debug, Clone, Default)]
pub struct FormHandle {
    values: Arc<Mutex<FormValues>>,
}

impl FormHandle {
    pub fn new(values: FormValues) -> Self {
        Self {
            values: Arc::new(Mutex::new(values)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FormValues> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_value(&self, name: &str, value: impl Into<String>) {
        self.lock().insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.lock().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<String> {
        self.lock().remove(name)
    }

    pub fn values(&self) -> FormValues {
        self.lock().clone()
    }
}
