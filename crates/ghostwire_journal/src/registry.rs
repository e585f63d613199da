//! # Entry Registry
//!
//! Maps entry-point names to typed handlers on a dispatch target `T`.
//! Handlers are registered once at startup; the journal records only the
//! name, so recording and replaying binaries must register the same names
//! with the same argument types.

use std::collections::BTreeMap;

use ghostwire_shared::StreamResult;
use tracing::warn;

use crate::args::JournalArgs;
use crate::journal::EntryContext;

/// Longest entry name; names are recorded as 8-bit-length wire strings.
pub const MAX_ENTRY_NAME_LEN: usize = 255;

type Handler<T> = Box<dyn Fn(&mut T, &mut EntryContext<'_>) -> StreamResult<()>>;

/// Named, typed entry points on `T`.
pub struct JournalRegistry<T> {
    entries: BTreeMap<String, Handler<T>>,
}

impl<T> JournalRegistry<T> {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Registers `handler` under `name`. A second registration of the same
    /// name replaces the first. Names longer than [`MAX_ENTRY_NAME_LEN`]
    /// bytes are not registered, so calls to them fail as unknown.
    pub fn register<A, F>(&mut self, name: &str, handler: F) -> &mut Self
    where
        A: JournalArgs + 'static,
        F: Fn(&mut T, &mut EntryContext<'_>, A) + 'static,
    {
        if name.len() > MAX_ENTRY_NAME_LEN {
            warn!(len = name.len(), "journal entry name too long, not registered");
            return self;
        }
        let wrapped: Handler<T> = Box::new(move |target: &mut T, ctx: &mut EntryContext<'_>| {
            let args = ctx.unmarshal_args::<A>()?;
            handler(target, ctx, args);
            Ok(())
        });
        if self.entries.insert(name.to_owned(), wrapped).is_some() {
            warn!(name, "journal entry registered twice");
        }
        self
    }

    /// True if `name` has a handler.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs the handler for `name`. Returns `None` for unknown names.
    pub(crate) fn dispatch(&self, name: &str, target: &mut T, ctx: &mut EntryContext<'_>) -> Option<StreamResult<()>> {
        self.entries.get(name).map(|handler| handler(target, ctx))
    }
}

impl<T> Default for JournalRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for JournalRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}
