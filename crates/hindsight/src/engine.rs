//! The engine instance: watch registration and change archival.
//!
//! # Overview
//!
//! A [`History`] owns, per scope id and path, the archived history line, the
//! rendered description, the lazy-sampling options, the active watch handle,
//! and the handler bundle. Registration wires the path resolver, the
//! observation primitive, and the archival callback together; the archival
//! callback normalizes every detected change into a history append and a
//! published [`HistoryEvent::Archived`].
//!
//! All state lives behind one shared cell so that archival callbacks (held
//! by the scope tree's watchers) and the public API see the same maps. The
//! run-loop model is single-threaded; no locking is involved.

use crate::error::HistoryError;
use crate::event::HistoryEvent;
use crate::expr;
use crate::handlers::{HandlerBundle, HandlerKind};
use crate::store::{Append, HistoryStore};
use hindsight_scope::{
    interpolate, Bus, ScopeId, ScopeTree, SubscriptionId, WatchCallback, WatchHandle,
};
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

/// Default sampling interval for lazy watches.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Options for lazily-sampled observation: the watched value is re-read at
/// most once per `interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LazyOptions {
    pub interval: Duration,
}

impl Default for LazyOptions {
    fn default() -> Self {
        LazyOptions {
            interval: DEFAULT_SAMPLE_INTERVAL,
        }
    }
}

/// Description template plus its latest rendering.
#[derive(Debug, Clone)]
pub(crate) struct DescriptionSlot {
    pub(crate) template: String,
    pub(crate) rendered: String,
}

/// Bookkeeping for one element scope spawned by a deep watch.
pub(crate) struct DeepMember {
    pub(crate) group: u64,
    pub(crate) target: String,
}

#[derive(Default)]
pub(crate) struct EngineState {
    pub(crate) store: HistoryStore,
    pub(crate) watches: HashMap<ScopeId, HashMap<String, WatchHandle>>,
    pub(crate) bundles: HashMap<ScopeId, HashMap<String, Rc<HandlerBundle>>>,
    pub(crate) descriptions: HashMap<ScopeId, HashMap<String, DescriptionSlot>>,
    pub(crate) lazy: HashMap<ScopeId, HashMap<String, Option<LazyOptions>>>,
    // Deep-watch group ids: per scope, expression string -> group.
    pub(crate) deep_groups: HashMap<ScopeId, HashMap<String, u64>>,
    pub(crate) deep_members: HashMap<ScopeId, DeepMember>,
    // Transactional children created by `batch`, with their bundles.
    pub(crate) transactions: HashMap<ScopeId, Rc<HandlerBundle>>,
    // Shadow grandchild -> the live scope it captured a baseline for.
    pub(crate) shadows: HashMap<ScopeId, ScopeId>,
    pub(crate) batching: bool,
    pub(crate) next_group: u64,
}

impl EngineState {
    /// Removes every per-path record for the key; the caller cancels the
    /// returned handle outside the state borrow.
    fn forget_path(&mut self, scope: ScopeId, path: &str) -> Option<WatchHandle> {
        self.store.forget_path(scope, path);
        if let Some(paths) = self.descriptions.get_mut(&scope) {
            paths.remove(path);
        }
        if let Some(paths) = self.lazy.get_mut(&scope) {
            paths.remove(path);
        }
        self.watches.get_mut(&scope).and_then(|paths| paths.remove(path))
    }

    fn forget_scope(&mut self, scope: ScopeId) -> Vec<WatchHandle> {
        self.store.forget_scope(scope);
        self.descriptions.remove(&scope);
        self.lazy.remove(&scope);
        self.bundles.remove(&scope);
        self.deep_groups.remove(&scope);
        self.deep_members.remove(&scope);
        self.transactions.remove(&scope);
        self.shadows.remove(&scope);
        self.watches
            .remove(&scope)
            .map(|paths| paths.into_values().collect())
            .unwrap_or_default()
    }
}

pub(crate) fn purge_scope(state: &Rc<RefCell<EngineState>>, scope: ScopeId) {
    let handles = { state.borrow_mut().forget_scope(scope) };
    for handle in handles {
        handle.cancel();
    }
}

/// Change-tracking and undo/redo engine over a [`ScopeTree`].
pub struct History {
    pub(crate) tree: ScopeTree,
    pub(crate) state: Rc<RefCell<EngineState>>,
    pub(crate) bus: Rc<Bus<HistoryEvent>>,
}

impl History {
    pub fn new(tree: ScopeTree) -> Self {
        History {
            tree,
            state: Rc::new(RefCell::new(EngineState::default())),
            bus: Rc::new(Bus::new()),
        }
    }

    pub fn tree(&self) -> &ScopeTree {
        &self.tree
    }

    /// Subscribes to the engine's event stream.
    pub fn subscribe(&self, subscriber: impl Fn(&HistoryEvent) + 'static) -> SubscriptionId {
        self.bus.subscribe(subscriber)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    // ── Registration ──────────────────────────────────────────────────────

    /// Registers `paths` for observation on `scope`.
    ///
    /// Every path must be assignable (checked by assigning its current value
    /// to itself). Any existing watch for a key is deregistered first —
    /// exactly one active handle per `(scope, path)`. The first capture
    /// after registration is the baseline and is not notified.
    ///
    /// Returns the handler bundle for the first path; a bundle exists for
    /// every registered path.
    pub fn watch(
        &self,
        paths: &[&str],
        scope: ScopeId,
        description: Option<&str>,
        lazy: Option<LazyOptions>,
    ) -> Result<Rc<HandlerBundle>, HistoryError> {
        let Some(first) = paths.first() else {
            return Err(HistoryError::PathsRequired);
        };
        self.ensure_scope(scope)?;
        for path in paths {
            let current = self
                .tree
                .resolve(scope, path)
                .map_err(|source| HistoryError::NotAssignable {
                    path: path.to_string(),
                    source,
                })?
                .unwrap_or(Value::Null);
            self.tree
                .assign(scope, path, current)
                .map_err(|source| HistoryError::NotAssignable {
                    path: path.to_string(),
                    source,
                })?;
            self.cancel_watch(scope, path);
            {
                let mut st = self.state.borrow_mut();
                st.lazy
                    .entry(scope)
                    .or_default()
                    .insert(path.to_string(), lazy);
                st.bundles
                    .entry(scope)
                    .or_default()
                    .entry(path.to_string())
                    .or_insert_with(|| Rc::new(HandlerBundle::new()));
            }
            self.set_description(scope, path, description);
            self.install_watch(scope, path, false, lazy)?;
        }
        Ok(self.bundle(scope, first))
    }

    /// Watches one property of every element of a collection.
    ///
    /// `expression` follows `<target> for (<key>,)? <value> in <collection>`.
    /// The collection is enumerated once; each element gets a child scope
    /// with the value name bound as a write-through alias (and the key name
    /// as a literal), its own history line for `target`, and a destroy hook
    /// that forgets its entries. Returns one bundle keyed by `scope` and
    /// `target`, shared by all elements.
    pub fn deep_watch(
        &self,
        expression: &str,
        scope: ScopeId,
        description: Option<&str>,
        lazy: Option<LazyOptions>,
    ) -> Result<Rc<HandlerBundle>, HistoryError> {
        self.ensure_scope(scope)?;
        let parsed = expr::parse(expression).ok_or_else(|| HistoryError::BadDeepWatchExpression {
            expression: expression.to_string(),
        })?;
        let collection = self
            .tree
            .resolve(scope, &parsed.collection)?
            .unwrap_or(Value::Null);
        let group = {
            let mut st = self.state.borrow_mut();
            st.next_group += 1;
            let group = st.next_group;
            st.deep_groups
                .entry(scope)
                .or_default()
                .insert(expression.to_string(), group);
            group
        };
        let elements: Vec<(Value, String)> = match &collection {
            Value::Array(items) => (0..items.len()).map(|i| (json!(i), i.to_string())).collect(),
            Value::Object(map) => map.keys().map(|k| (json!(k), k.clone())).collect(),
            _ => Vec::new(),
        };
        tracing::debug!(scope = %scope, expression, elements = elements.len(), "deep watch installed");
        for (key_value, segment) in elements {
            let element = self.tree.spawn_child(scope);
            let element_path = format!("{}.{}", parsed.collection, segment);
            self.tree
                .bind_alias(element, &parsed.value, scope, &element_path)?;
            if let Some(key_name) = &parsed.key {
                self.tree.assign(element, key_name, key_value)?;
            }
            {
                let mut st = self.state.borrow_mut();
                st.deep_members.insert(
                    element,
                    DeepMember {
                        group,
                        target: parsed.target.clone(),
                    },
                );
                st.lazy
                    .entry(element)
                    .or_default()
                    .insert(parsed.target.clone(), lazy);
            }
            self.set_description(element, &parsed.target, description);
            self.install_watch(element, &parsed.target, false, lazy)?;
            let state = Rc::downgrade(&self.state);
            self.tree.on_destroy(element, move |_, sid| {
                if let Some(state) = state.upgrade() {
                    purge_scope(&state, sid);
                }
            });
        }
        {
            let mut st = self.state.borrow_mut();
            st.bundles
                .entry(scope)
                .or_default()
                .entry(parsed.target.clone())
                .or_insert_with(|| Rc::new(HandlerBundle::new()));
        }
        Ok(self.bundle(scope, &parsed.target))
    }

    /// Deregisters watched paths and purges their history lines,
    /// descriptions, and lazy flags. A deep-watch expression also purges
    /// every element scope tagged with its group id.
    pub fn forget(&self, paths: &[&str], scope: ScopeId) -> Result<(), HistoryError> {
        if paths.is_empty() {
            return Err(HistoryError::PathsRequired);
        }
        for path in paths {
            let group = self
                .state
                .borrow()
                .deep_groups
                .get(&scope)
                .and_then(|groups| groups.get(*path))
                .copied();
            if let Some(group) = group {
                for child in self.tree.children(scope) {
                    let target = {
                        let st = self.state.borrow();
                        st.deep_members
                            .get(&child)
                            .filter(|member| member.group == group)
                            .map(|member| member.target.clone())
                    };
                    if let Some(target) = target {
                        self.purge_path(child, &target);
                        self.state.borrow_mut().deep_members.remove(&child);
                    }
                }
                if let Some(groups) = self.state.borrow_mut().deep_groups.get_mut(&scope) {
                    groups.remove(*path);
                }
            }
            self.purge_path(scope, path);
        }
        Ok(())
    }

    /// Purges everything tracked for a scope: every history line,
    /// description, lazy flag, bundle, and watch handle.
    pub fn forget_scope(&self, scope: ScopeId) {
        purge_scope(&self.state, scope);
    }

    // ── Diagnostics ───────────────────────────────────────────────────────

    /// Archived snapshots for a path, oldest first.
    pub fn entries(&self, scope: ScopeId, path: &str) -> Option<Vec<Value>> {
        self.state
            .borrow()
            .store
            .line(scope, path)
            .map(|line| line.entries.clone())
    }

    /// Current cursor position for a path, if any history exists.
    pub fn cursor(&self, scope: ScopeId, path: &str) -> Option<usize> {
        self.state
            .borrow()
            .store
            .line(scope, path)
            .map(|line| line.cursor)
    }

    /// Latest rendered description for a path.
    pub fn description(&self, scope: ScopeId, path: &str) -> Option<String> {
        self.state
            .borrow()
            .descriptions
            .get(&scope)
            .and_then(|paths| paths.get(path))
            .map(|slot| slot.rendered.clone())
    }

    pub fn is_watched(&self, scope: ScopeId, path: &str) -> bool {
        self.state
            .borrow()
            .watches
            .get(&scope)
            .is_some_and(|paths| paths.contains_key(path))
    }

    // ── Internals ─────────────────────────────────────────────────────────

    pub(crate) fn ensure_scope(&self, scope: ScopeId) -> Result<(), HistoryError> {
        if self.tree.contains(scope) {
            Ok(())
        } else {
            Err(HistoryError::UnknownScope { scope })
        }
    }

    pub(crate) fn bundle(&self, scope: ScopeId, path: &str) -> Rc<HandlerBundle> {
        self.state
            .borrow_mut()
            .bundles
            .entry(scope)
            .or_default()
            .entry(path.to_string())
            .or_insert_with(|| Rc::new(HandlerBundle::new()))
            .clone()
    }

    /// The bundle notified for a key: element scopes report through their
    /// parent, where the deep watch was registered.
    pub(crate) fn owner_bundle(&self, scope: ScopeId, path: &str) -> Option<Rc<HandlerBundle>> {
        let st = self.state.borrow();
        let owner = if st.deep_members.contains_key(&scope) {
            self.tree.parent(scope).unwrap_or(scope)
        } else {
            scope
        };
        st.bundles
            .get(&owner)
            .and_then(|paths| paths.get(path))
            .cloned()
    }

    fn set_description(&self, scope: ScopeId, path: &str, description: Option<&str>) {
        match description {
            Some(template) => {
                let rendered = interpolate(&self.tree, scope, template);
                self.state
                    .borrow_mut()
                    .descriptions
                    .entry(scope)
                    .or_default()
                    .insert(
                        path.to_string(),
                        DescriptionSlot {
                            template: template.to_string(),
                            rendered,
                        },
                    );
            }
            None => {
                if let Some(paths) = self.state.borrow_mut().descriptions.get_mut(&scope) {
                    paths.remove(path);
                }
            }
        }
    }

    fn cancel_watch(&self, scope: ScopeId, path: &str) {
        let handle = {
            self.state
                .borrow_mut()
                .watches
                .get_mut(&scope)
                .and_then(|paths| paths.remove(path))
        };
        if let Some(handle) = handle {
            handle.cancel();
        }
    }

    fn purge_path(&self, scope: ScopeId, path: &str) {
        let handle = { self.state.borrow_mut().forget_path(scope, path) };
        if let Some(handle) = handle {
            handle.cancel();
        }
    }

    /// Installs the observation for a key and records its handle.
    /// `suppress_first` swallows the synthetic capture that follows
    /// (re-)installation, so undo/redo do not re-archive the value they just
    /// restored.
    pub(crate) fn install_watch(
        &self,
        scope: ScopeId,
        path: &str,
        suppress_first: bool,
        lazy: Option<LazyOptions>,
    ) -> Result<(), HistoryError> {
        let callback = self.archiver(scope, path.to_string(), suppress_first);
        let handle = match lazy {
            Some(options) => {
                let eval = self.tree.sampled(path, options.interval)?;
                self.tree.observe_with(scope, eval, callback)
            }
            None => self.tree.observe(scope, path, callback)?,
        };
        self.state
            .borrow_mut()
            .watches
            .entry(scope)
            .or_default()
            .insert(path.to_string(), handle);
        Ok(())
    }

    /// Builds the observation callback for a key.
    fn archiver(&self, scope: ScopeId, path: String, suppress_first: bool) -> WatchCallback {
        let state = Rc::downgrade(&self.state);
        let bus = self.bus.clone();
        let pass = Cell::new(suppress_first);
        Rc::new(move |tree, _sid, new, old| {
            let Some(state) = state.upgrade() else {
                return;
            };
            // Re-render the description against the firing scope on every
            // invocation, including suppressed ones.
            let template = state
                .borrow()
                .descriptions
                .get(&scope)
                .and_then(|paths| paths.get(&path))
                .map(|slot| slot.template.clone());
            if let Some(template) = template {
                let rendered = interpolate(tree, scope, &template);
                if let Some(slot) = state
                    .borrow_mut()
                    .descriptions
                    .get_mut(&scope)
                    .and_then(|paths| paths.get_mut(&path))
                {
                    slot.rendered = rendered;
                }
            }
            if pass.get() {
                pass.set(false);
                return;
            }
            let (outcome, description, bundle, batching) = {
                let mut st = state.borrow_mut();
                let outcome = st.store.append(scope, &path, new);
                let description = st
                    .descriptions
                    .get(&scope)
                    .and_then(|paths| paths.get(&path))
                    .map(|slot| slot.rendered.clone());
                let owner = if st.deep_members.contains_key(&scope) {
                    tree.parent(scope).unwrap_or(scope)
                } else {
                    scope
                };
                let bundle = st
                    .bundles
                    .get(&owner)
                    .and_then(|paths| paths.get(&path))
                    .cloned();
                (outcome, description, bundle, st.batching)
            };
            if let Append::Archived { .. } = outcome {
                if !batching {
                    if let Some(bundle) = bundle {
                        bundle.fire(HandlerKind::Change, tree, Some(scope));
                    }
                }
                bus.publish(&HistoryEvent::Archived {
                    scope,
                    path: path.clone(),
                    old_value: old.clone(),
                    new_value: new.clone(),
                    description,
                });
            }
        })
    }

    /// Shared seek primitive: deregister the active watch, assign the entry
    /// at `index` through the path resolver, re-arm the watch identically
    /// (same lazy options) with the first capture suppressed. Returns the
    /// value transition.
    pub(crate) fn reassign(
        &self,
        scope: ScopeId,
        path: &str,
        index: usize,
    ) -> Result<(Value, Value), HistoryError> {
        self.cancel_watch(scope, path);
        let target = {
            let st = self.state.borrow();
            st.store
                .line(scope, path)
                .and_then(|line| line.entries.get(index))
                .cloned()
        }
        .ok_or_else(|| HistoryError::NoHistory {
            scope,
            path: path.to_string(),
        })?;
        let old = self.tree.resolve(scope, path)?.unwrap_or(Value::Null);
        self.tree.assign(scope, path, target.clone())?;
        let lazy = {
            let st = self.state.borrow();
            st.lazy
                .get(&scope)
                .and_then(|paths| paths.get(path))
                .copied()
                .flatten()
        };
        self.install_watch(scope, path, true, lazy)?;
        Ok((old, target))
    }
}
