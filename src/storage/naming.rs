//! Resource Naming Policy
//!
//! Maps an entity type's logical name to the physical table that stores it.
//! Known types are registered explicitly at startup by the service; anything
//! else falls back to the pluralized type name.

use std::collections::HashMap;

use super::entity::TableEntity;
use super::error::StorageResult;
use super::resource::{validate_resource_name, ResourceKind};

/// Registration table of type name → physical table name.
#[derive(Debug, Clone, Default)]
pub struct ResourceNaming {
    overrides: HashMap<&'static str, String>,
}

impl ResourceNaming {
    /// Naming policy with no registered overrides.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            overrides: HashMap::new(),
        }
    }

    /// Register an explicit table for `type_name`, replacing any earlier one.
    ///
    /// # Errors
    /// Returns `InvalidName` if `table` is not a valid table name.
    pub fn register(&mut self, type_name: &'static str, table: impl Into<String>) -> StorageResult<()> {
        let table = table.into();
        validate_resource_name(ResourceKind::Table, &table)?;
        self.overrides.insert(type_name, table);
        Ok(())
    }

    /// Physical table for `T`.
    #[must_use]
    pub fn table_name<T: TableEntity>(&self) -> String {
        self.table_name_for(T::TYPE_NAME)
    }

    /// Physical table for a logical type name.
    #[must_use]
    pub fn table_name_for(&self, type_name: &str) -> String {
        match self.overrides.get(type_name) {
            Some(table) => table.clone(),
            None => pluralize(type_name),
        }
    }
}

/// English plural of a type name: `Category` → `Categories`,
/// `Address` → `Addresses`, `Invoice` → `Invoices`.
#[must_use]
pub fn pluralize(name: &str) -> String {
    let lower = name.to_ascii_lowercase();

    if let Some(stem) = name.strip_suffix(['y', 'Y']) {
        let before_y = stem.chars().last();
        if before_y.is_some_and(|c| !"aeiouAEIOU".contains(c)) {
            return format!("{stem}ies");
        }
    }

    if ["s", "x", "z", "ch", "sh"].iter().any(|suffix| lower.ends_with(suffix)) {
        return format!("{name}es");
    }

    format!("{name}s")
}
