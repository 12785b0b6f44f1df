//! Call-scoped metadata attached to a response
//!
//! The set is created per request, handed to the called function by mutable
//! reference and serialized into the `meta` field of the response when it is
//! not empty.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::Error;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetaData(Map<String, Value>);

impl MetaData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new field. An existing field is never overwritten.
    pub fn add_field(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), Error> {
        let key = key.into();
        if self.0.contains_key(&key) {
            return Err(Error::DuplicateMetaField(key));
        }

        self.0.insert(key, value.into());
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the field already exists.
    pub fn add_field_or_panic(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        if let Err(err) = self.add_field(key, value) {
            panic!("{err}");
        }
    }

    pub fn get_field(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove_field(&mut self, key: &str) -> Result<Value, Error> {
        self.0
            .remove(key)
            .ok_or_else(|| Error::MetaFieldNotFound(key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
