//! Registry of persisted entity types.
//!
//! Records carry no type tag; a save's type database lists type names, and
//! each index entry points into it. The catalog turns those names back into
//! load-time constructors: a serial plus the record bytes in, a live entity
//! out.

use std::collections::HashMap;

use crate::persist::errors::PersistError;
use crate::persist::reader::GenericReader;
use crate::persist::serial::Serial;

/// Load-time constructor for one concrete type.
pub type Constructor<T> = fn(Serial, &mut GenericReader<'_>) -> Result<Box<T>, PersistError>;

pub struct CatalogEntry<T: ?Sized> {
    pub name: &'static str,
    pub decode: Constructor<T>,
}

pub struct Catalog<T: ?Sized> {
    category: &'static str,
    entries: Vec<CatalogEntry<T>>,
    by_name: HashMap<&'static str, usize>,
}

impl<T: ?Sized> Catalog<T> {
    pub fn new(category: &'static str) -> Self {
        Self {
            category,
            entries: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn category(&self) -> &'static str {
        self.category
    }

    pub fn register(&mut self, name: &'static str, decode: Constructor<T>) -> Result<(), PersistError> {
        if self.by_name.contains_key(name) {
            return Err(PersistError::DuplicateType(name.to_string()));
        }
        self.by_name.insert(name, self.entries.len());
        self.entries.push(CatalogEntry { name, decode });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry<T>> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.name)
    }

    /// Construct an entity of type `name` from its record bytes.
    pub fn decode(
        &self,
        name: &str,
        serial: Serial,
        r: &mut GenericReader<'_>,
    ) -> Result<Box<T>, PersistError> {
        let entry = self
            .get(name)
            .ok_or_else(|| PersistError::UnknownType(name.to_string()))?;
        (entry.decode)(serial, r)
    }
}
