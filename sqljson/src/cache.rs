//!
//! Named row sets preloaded for one build and queried in memory.
//!

use parking_lot::Mutex;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use crate::database::Row;

type EngineState = Box<dyn Any + Send>;

/// Tables fetched by `preLoadTables`.
///
/// One cache exists per `execute` call. It is written only while preloading,
/// read during the walk, and cleared when the call ends.
///
/// An in-memory engine may attach its own state to the cache (a database
/// holding the loaded tables, say). That state is dropped whenever the
/// tables change, so it never outlives the call either.
#[derive(Default)]
pub struct TableCache {
    tables: BTreeMap<String, Vec<Row>>,
    engine_state: Mutex<Option<EngineState>>,
}

impl fmt::Debug for TableCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableCache")
            .field("tables", &self.tables)
            .finish_non_exhaustive()
    }
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a table, replacing any earlier table of the same name.
    pub fn insert(&mut self, name: impl Into<String>, rows: Vec<Row>) {
        self.tables.insert(name.into(), rows);
        self.engine_state.get_mut().take();
    }

    pub fn get(&self, name: &str) -> Option<&[Row]> {
        self.tables.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Row])> {
        self.tables
            .iter()
            .map(|(name, rows)| (name.as_str(), rows.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn clear(&mut self) {
        self.tables.clear();
        self.engine_state.get_mut().take();
    }

    ///
    /// Run `f` on the engine state of type `T` attached to this cache,
    /// building it with `init` first if there is none yet.
    ///
    /// Calls are serialized. State of another type is replaced.
    ///
    pub fn with_engine_state<T, R, E>(
        &self,
        init: impl FnOnce(&Self) -> Result<T, E>,
        f: impl FnOnce(&mut T) -> Result<R, E>,
    ) -> Result<R, E>
    where
        T: Send + 'static,
    {
        let mut slot = self.engine_state.lock();
        let mut state = match slot.take().map(|state| state.downcast::<T>()) {
            Some(Ok(state)) => state,
            _ => Box::new(init(self)?),
        };

        let result = f(&mut state);
        *slot = Some(state);
        result
    }
}

///
/// The tables an in-memory query can see: the preloaded cache, plus
/// optionally the rows the current node just fetched remotely, published
/// under a configured name. The latter shadows a cached table of that name.
///
#[derive(Clone, Copy, Debug)]
pub struct NamedTables<'a> {
    cache: &'a TableCache,
    fetched: Option<(&'a str, &'a [Row])>,
}

impl<'a> NamedTables<'a> {
    pub fn new(cache: &'a TableCache) -> Self {
        Self {
            cache,
            fetched: None,
        }
    }

    pub fn with_fetched(mut self, name: &'a str, rows: &'a [Row]) -> Self {
        self.fetched = Some((name, rows));
        self
    }

    pub fn cache(&self) -> &'a TableCache {
        self.cache
    }

    /// The rows published for the current node, if any, with their name.
    pub fn fetched(&self) -> Option<(&'a str, &'a [Row])> {
        self.fetched
    }

    pub fn get(&self, name: &str) -> Option<&'a [Row]> {
        match self.fetched {
            Some((fetched_name, rows)) if fetched_name == name => Some(rows),
            _ => self.cache.tables.get(name).map(Vec::as_slice),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a [Row])> + 'a {
        let shadowed = self.fetched.map(|(name, _)| name);
        self.cache
            .tables
            .iter()
            .filter(move |(name, _)| Some(name.as_str()) != shadowed)
            .map(|(name, rows)| (name.as_str(), rows.as_slice()))
            .chain(self.fetched)
    }

    pub fn names(&self) -> Vec<&'a str> {
        self.iter().map(|(name, _)| name).collect()
    }
}
