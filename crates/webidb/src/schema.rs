//! Declarative schema: versioned store/index changes and their replay.
//!
//! A [`Schema`] is an immutable description of every version the database
//! has ever had. Opening a database replays the steps between the on-disk
//! version and the target version inside the engine's versionchange
//! transaction; nothing here has side effects on its own.

use std::collections::BTreeMap;

/// Key path of a store or index: a single field or an ordered field list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPath {
    Single(String),
    Composite(Vec<String>),
}

impl From<&str> for KeyPath {
    fn from(field: &str) -> Self {
        KeyPath::Single(field.to_owned())
    }
}

impl From<Vec<&str>> for KeyPath {
    fn from(fields: Vec<&str>) -> Self {
        KeyPath::Composite(fields.into_iter().map(str::to_owned).collect())
    }
}

impl<const N: usize> From<[&str; N]> for KeyPath {
    fn from(fields: [&str; N]) -> Self {
        KeyPath::Composite(fields.iter().map(|f| (*f).to_owned()).collect())
    }
}

/// How a store derives record keys.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// In-line key path; `None` means explicit (out-of-line) keys.
    pub key_path: Option<KeyPath>,
    /// Use the engine's key generator when no key is supplied.
    pub auto_increment: bool,
}

#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    pub unique: bool,
    /// Index every element of array-valued keys individually.
    pub multi_entry: bool,
}

/// One schema change, applied during a version upgrade.
#[derive(Debug, Clone)]
pub enum MigrationStep {
    CreateStore {
        name: String,
        options: StoreOptions,
    },
    DeleteStore {
        name: String,
    },
    CreateIndex {
        store: String,
        name: String,
        key_path: KeyPath,
        options: IndexOptions,
    },
    DeleteIndex {
        store: String,
        name: String,
    },
}

/// Version history of a database.
///
/// Built by chaining [`Schema::version`] with store/index declarations:
///
/// ```
/// use webidb::{IndexOptions, Schema, StoreOptions};
///
/// let schema = Schema::new()
///     .version(1)
///     .add_store_with("books", StoreOptions { key_path: Some("isbn".into()), ..Default::default() })
///     .add_index("books", "byTitle", "title", IndexOptions::default())
///     .version(2)
///     .add_store("magazines");
/// assert_eq!(schema.target_version(), 2);
/// ```
///
/// Builder methods panic on misuse (non-increasing versions, duplicate or
/// missing stores); these are programming errors in a static declaration,
/// not runtime conditions.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    versions: BTreeMap<u32, Vec<MigrationStep>>,
    current: u32,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins declaring version `n`. Must be strictly greater than every
    /// previously declared version.
    pub fn version(mut self, n: u32) -> Self {
        assert!(n > 0, "database versions start at 1");
        assert!(
            n > self.current,
            "version {n} must be greater than already-declared version {}",
            self.current
        );
        self.current = n;
        self.versions.insert(n, Vec::new());
        self
    }

    /// Adds a store with explicit out-of-line keys.
    pub fn add_store(self, name: &str) -> Self {
        self.add_store_with(name, StoreOptions::default())
    }

    pub fn add_store_with(mut self, name: &str, options: StoreOptions) -> Self {
        assert!(
            !self.store_exists(name),
            "store {name:?} already exists in this schema"
        );
        self.push(MigrationStep::CreateStore {
            name: name.to_owned(),
            options,
        });
        self
    }

    /// Removes a store (the engine drops its indexes with it).
    pub fn del_store(mut self, name: &str) -> Self {
        assert!(
            self.store_exists(name),
            "cannot remove unknown store {name:?}"
        );
        self.push(MigrationStep::DeleteStore {
            name: name.to_owned(),
        });
        self
    }

    pub fn add_index(
        mut self,
        store: &str,
        name: &str,
        key_path: impl Into<KeyPath>,
        options: IndexOptions,
    ) -> Self {
        assert!(
            self.store_exists(store),
            "cannot index unknown store {store:?}"
        );
        self.push(MigrationStep::CreateIndex {
            store: store.to_owned(),
            name: name.to_owned(),
            key_path: key_path.into(),
            options,
        });
        self
    }

    pub fn del_index(mut self, store: &str, name: &str) -> Self {
        assert!(
            self.store_exists(store),
            "cannot drop index on unknown store {store:?}"
        );
        self.push(MigrationStep::DeleteIndex {
            store: store.to_owned(),
            name: name.to_owned(),
        });
        self
    }

    /// Highest declared version; 0 for an empty schema.
    pub fn target_version(&self) -> u32 {
        self.current
    }

    /// Effective store set after replaying the full history, sorted.
    pub fn store_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for step in self.steps_between(0, self.current) {
            match step {
                MigrationStep::CreateStore { name, .. } => names.push(name.clone()),
                MigrationStep::DeleteStore { name } => names.retain(|n| n != name),
                _ => {}
            }
        }
        names.sort();
        names
    }

    /// Ordered steps to migrate an on-disk version `from` up to `to`: the
    /// concatenation of every declared version `v` with `from < v <= to`.
    pub fn steps_between(&self, from: u32, to: u32) -> impl Iterator<Item = &MigrationStep> {
        let versions = (to > from).then(|| self.versions.range(from + 1..=to));
        versions
            .into_iter()
            .flatten()
            .flat_map(|(_, steps)| steps.iter())
    }

    fn push(&mut self, step: MigrationStep) {
        assert!(self.current > 0, "declare a version before adding steps");
        self.versions
            .get_mut(&self.current)
            .expect("current version present")
            .push(step);
    }

    fn store_exists(&self, name: &str) -> bool {
        self.store_names().iter().any(|n| n == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Schema {
        Schema::new()
            .version(1)
            .add_store_with(
                "books",
                StoreOptions {
                    key_path: Some("isbn".into()),
                    ..Default::default()
                },
            )
            .add_index("books", "byTitle", "title", IndexOptions::default())
            .version(2)
            .add_store("magazines")
            .version(3)
            .add_index(
                "magazines",
                "byFrequency",
                "frequency",
                IndexOptions::default(),
            )
            .del_index("books", "byTitle")
            .version(4)
            .del_store("books")
    }

    #[test]
    fn replay_is_ordered_and_complete() {
        let schema = sample();
        let steps: Vec<_> = schema.steps_between(0, 4).collect();
        assert_eq!(steps.len(), 6);
        // Version order, then declaration order within a version.
        assert!(matches!(steps[0], MigrationStep::CreateStore { name, .. } if name == "books"));
        assert!(matches!(steps[1], MigrationStep::CreateIndex { name, .. } if name == "byTitle"));
        assert!(matches!(steps[2], MigrationStep::CreateStore { name, .. } if name == "magazines"));
        assert!(
            matches!(steps[3], MigrationStep::CreateIndex { name, .. } if name == "byFrequency")
        );
        assert!(matches!(steps[4], MigrationStep::DeleteIndex { name, .. } if name == "byTitle"));
        assert!(matches!(steps[5], MigrationStep::DeleteStore { name } if name == "books"));
    }

    #[test]
    fn replay_is_partial_from_on_disk_version() {
        let schema = sample();
        assert_eq!(schema.steps_between(2, 4).count(), 4);
        assert_eq!(schema.steps_between(3, 4).count(), 1);
        assert_eq!(schema.steps_between(4, 4).count(), 0);
    }

    #[test]
    fn effective_store_set_reflects_removals() {
        let schema = sample();
        assert_eq!(schema.store_names(), vec!["magazines".to_owned()]);
        assert_eq!(schema.target_version(), 4);
    }

    #[test]
    fn empty_schema_has_no_stores_and_version_zero() {
        let schema = Schema::new();
        assert_eq!(schema.target_version(), 0);
        assert!(schema.store_names().is_empty());
        assert_eq!(schema.steps_between(0, 0).count(), 0);
    }

    #[test]
    #[should_panic(expected = "must be greater")]
    fn versions_must_increase() {
        let _ = Schema::new().version(2).version(2);
    }

    #[test]
    #[should_panic(expected = "already exists")]
    fn duplicate_store_panics() {
        let _ = Schema::new().version(1).add_store("a").add_store("a");
    }

    #[test]
    #[should_panic(expected = "unknown store")]
    fn index_on_missing_store_panics() {
        let _ = Schema::new()
            .version(1)
            .add_index("nope", "idx", "field", IndexOptions::default());
    }

    #[test]
    #[should_panic(expected = "declare a version")]
    fn steps_require_a_version() {
        let _ = Schema::new().add_store("a");
    }

    #[test]
    fn composite_key_paths() {
        let kp: KeyPath = ["name", "frequency"].into();
        assert_eq!(
            kp,
            KeyPath::Composite(vec!["name".to_owned(), "frequency".to_owned()])
        );
    }
}
