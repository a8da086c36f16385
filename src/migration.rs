//! Deprecated field aliases.
//!
//! When the data model renames a field, readers keep accepting the old name
//! and map it onto the new storage slot.  Each resolution of an old name
//! yields a [`Deprecation`] and a `log::warn!`; occurrences are not
//! de-duplicated.

use std::fmt;

use crate::version::VersionId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMigration {
    pub collection: &'static str,
    pub old_field:  &'static str,
    pub new_field:  &'static str,
    /// First format version in which `old_field` is deprecated.
    pub since:      VersionId,
}

/// Diagnostic emitted when an old field name is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deprecation {
    pub collection:   &'static str,
    pub old_field:    &'static str,
    pub new_field:    &'static str,
    pub file_version: VersionId,
}

impl fmt::Display for Deprecation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{} is deprecated, use {}::{} (file {})",
            self.collection, self.old_field, self.collection, self.new_field, self.file_version
        )
    }
}

/// Where a field name lands after migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<'a> {
    pub field:       &'a str,
    pub deprecation: Option<Deprecation>,
}

#[derive(Debug, Clone, Default)]
pub struct MigrationTable {
    entries: Vec<FieldMigration>,
}

impl MigrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aliases known to the LCIO data model.
    pub fn lcio() -> Self {
        let mut table = Self::new();
        table.add(FieldMigration {
            collection: "SimTrackerHit",
            old_field:  "dEdx",
            new_field:  "EDep",
            since:      VersionId::new(2, 0),
        });
        table
    }

    pub fn add(&mut self, migration: FieldMigration) {
        self.entries.push(migration);
    }

    pub fn entries(&self) -> &[FieldMigration] {
        &self.entries
    }

    /// Map `field` of `collection` to its current name.
    ///
    /// Fields without an alias resolve to themselves.  An alias only applies
    /// to files at or beyond its `since` version; older files still store the
    /// old field under its own name.
    pub fn resolve<'a>(&'a self, collection: &str, field: &'a str, file_version: VersionId) -> Resolved<'a> {
        let hit = self.entries.iter().find(|m| {
            m.collection == collection && m.old_field == field && file_version >= m.since
        });
        match hit {
            Some(m) => {
                let deprecation = Deprecation {
                    collection:   m.collection,
                    old_field:    m.old_field,
                    new_field:    m.new_field,
                    file_version,
                };
                log::warn!("{deprecation}");
                Resolved { field: m.new_field, deprecation: Some(deprecation) }
            }
            None => Resolved { field, deprecation: None },
        }
    }
}
