//! Hierarchical scope tree with dirty-checking observation.
//!
//! # Overview
//!
//! A [`ScopeTree`] owns an arena of scopes addressed by opaque [`ScopeId`]s.
//! Each scope holds a namespace of named JSON values, inherits reads from its
//! ancestors, and may carry *aliases* — bindings that redirect a name to a
//! path in another scope, giving child scopes write-through access to a
//! parent's collection elements.
//!
//! Observation is cooperative and single-threaded: watchers are evaluated by
//! [`ScopeTree::digest`], which repeats passes over the watcher list until a
//! pass detects no change (or [`DIGEST_TTL`] passes elapse). A freshly
//! installed watcher fires once with `new == old` on its first pass so the
//! observer can capture a baseline. [`ScopeTree::defer`] queues work for the
//! next [`ScopeTree::turn`]; two turns never overlap.

use crate::path::{parse_path, value_at, value_at_mut_create, PathError, Step};
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

/// Maximum number of digest passes before the loop gives up and warns.
pub const DIGEST_TTL: usize = 10;

/// Opaque identifier of a scope in a [`ScopeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Change callback invoked with `(tree, scope, new_value, old_value)`.
pub type WatchCallback = Rc<dyn Fn(&ScopeTree, ScopeId, &Value, &Value)>;

/// Watched-value producer for function watches.
pub type EvalFn = Rc<dyn Fn(&ScopeTree, ScopeId) -> Value>;

type DestroyHook = Box<dyn FnOnce(&ScopeTree, ScopeId)>;

struct Watcher {
    eval: EvalFn,
    callback: WatchCallback,
    last: RefCell<Option<Value>>,
    cancelled: Cell<bool>,
}

#[derive(Default)]
struct ScopeNode {
    parent: Option<ScopeId>,
    children: Vec<ScopeId>,
    values: Map<String, Value>,
    aliases: HashMap<String, (ScopeId, Vec<Step>)>,
    destroy_hooks: Vec<DestroyHook>,
}

#[derive(Default)]
struct TreeInner {
    scopes: RefCell<HashMap<ScopeId, ScopeNode>>,
    // Installation-order watcher list; digest iterates a snapshot of it.
    watchers: RefCell<Vec<(ScopeId, Rc<Watcher>)>>,
    deferred: RefCell<VecDeque<Box<dyn FnOnce(&ScopeTree)>>>,
    next_scope: Cell<u64>,
}

/// Cheaply clonable handle to the scope arena.
#[derive(Clone)]
pub struct ScopeTree {
    inner: Rc<TreeInner>,
}

/// Non-owning handle to a [`ScopeTree`], for long-lived subscribers.
#[derive(Clone)]
pub struct WeakScopeTree {
    inner: Weak<TreeInner>,
}

impl WeakScopeTree {
    pub fn upgrade(&self) -> Option<ScopeTree> {
        self.inner.upgrade().map(|inner| ScopeTree { inner })
    }
}

/// Deregistration token for an installed watch. Cancellation is the sole
/// cancellation primitive and is idempotent.
pub struct WatchHandle {
    watcher: Rc<Watcher>,
    inner: Weak<TreeInner>,
}

impl WatchHandle {
    pub fn cancel(&self) {
        self.watcher.cancelled.set(true);
        if let Some(inner) = self.inner.upgrade() {
            inner
                .watchers
                .borrow_mut()
                .retain(|(_, w)| !w.cancelled.get());
        }
    }
}

impl ScopeTree {
    /// Creates a tree containing only the root scope.
    pub fn new() -> Self {
        let tree = ScopeTree {
            inner: Rc::new(TreeInner::default()),
        };
        tree.inner.next_scope.set(1);
        tree.inner
            .scopes
            .borrow_mut()
            .insert(ScopeId(0), ScopeNode::default());
        tree
    }

    pub fn downgrade(&self) -> WeakScopeTree {
        WeakScopeTree {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn contains(&self, scope: ScopeId) -> bool {
        self.inner.scopes.borrow().contains_key(&scope)
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.inner.scopes.borrow().get(&scope).and_then(|n| n.parent)
    }

    /// Ordered child list (spawn order).
    pub fn children(&self, scope: ScopeId) -> Vec<ScopeId> {
        self.inner
            .scopes
            .borrow()
            .get(&scope)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Spawns a child scope. The child reads through to `parent` for any
    /// name it does not define locally.
    pub fn spawn_child(&self, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.inner.next_scope.get());
        self.inner.next_scope.set(id.0 + 1);
        let mut scopes = self.inner.scopes.borrow_mut();
        scopes.insert(
            id,
            ScopeNode {
                parent: Some(parent),
                ..ScopeNode::default()
            },
        );
        if let Some(node) = scopes.get_mut(&parent) {
            node.children.push(id);
        }
        id
    }

    /// Registers a hook fired when `scope` is destroyed.
    pub fn on_destroy(&self, scope: ScopeId, hook: impl FnOnce(&ScopeTree, ScopeId) + 'static) {
        if let Some(node) = self.inner.scopes.borrow_mut().get_mut(&scope) {
            node.destroy_hooks.push(Box::new(hook));
        }
    }

    /// Destroys a scope and its descendants, children first. Hooks run while
    /// the scope is still present; its watchers are cancelled afterwards.
    pub fn destroy(&self, scope: ScopeId) {
        for child in self.children(scope) {
            self.destroy(child);
        }
        let hooks = match self.inner.scopes.borrow_mut().get_mut(&scope) {
            Some(node) => std::mem::take(&mut node.destroy_hooks),
            None => return,
        };
        for hook in hooks {
            hook(self, scope);
        }
        self.inner.watchers.borrow_mut().retain(|(sid, w)| {
            if *sid == scope {
                w.cancelled.set(true);
                false
            } else {
                true
            }
        });
        let mut scopes = self.inner.scopes.borrow_mut();
        let parent = scopes.remove(&scope).and_then(|n| n.parent);
        if let Some(node) = parent.and_then(|p| scopes.get_mut(&p)) {
            node.children.retain(|c| *c != scope);
        }
    }

    // ── Values, aliases, and path resolution ──────────────────────────────

    /// Finds the scope owning the first path segment, walking aliases, local
    /// values, then the ancestor chain. Returns the owner and the absolute
    /// prefix inside it.
    fn locate(&self, scope: ScopeId, first: &Step) -> Option<(ScopeId, Vec<Step>)> {
        let Step::Key(name) = first else { return None };
        let scopes = self.inner.scopes.borrow();
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            let node = scopes.get(&id)?;
            if let Some((target, steps)) = node.aliases.get(name) {
                return Some((*target, steps.clone()));
            }
            if node.values.contains_key(name) {
                return Some((id, vec![first.clone()]));
            }
            cursor = node.parent;
        }
        None
    }

    /// Reads the value at `path`, seen from `scope`. Returns `Ok(None)` when
    /// the path does not currently lead anywhere.
    pub fn resolve(&self, scope: ScopeId, path: &str) -> Result<Option<Value>, PathError> {
        let steps = parse_path(path)?;
        let (owner, mut abs) = match self.locate(scope, &steps[0]) {
            Some(found) => found,
            None => return Ok(None),
        };
        abs.extend(steps[1..].iter().cloned());
        let scopes = self.inner.scopes.borrow();
        let node = match scopes.get(&owner) {
            Some(node) => node,
            None => return Ok(None),
        };
        let Some(Step::Key(root_name)) = abs.first() else {
            return Ok(None);
        };
        let Some(root_value) = node.values.get(root_name) else {
            return Ok(None);
        };
        Ok(value_at(root_value, &abs[1..]).cloned())
    }

    /// Assigns `value` at `path`, seen from `scope`.
    ///
    /// A single-segment path writes a local slot on `scope` (shadowing any
    /// inherited or aliased binding, which is dropped). A multi-segment path
    /// writes through to the owning scope in place, auto-creating missing
    /// intermediates, so collection elements can be mutated from child
    /// scopes.
    pub fn assign(&self, scope: ScopeId, path: &str, value: Value) -> Result<(), PathError> {
        let steps = parse_path(path)?;
        if steps.len() == 1 {
            if let Step::Key(name) = &steps[0] {
                let mut scopes = self.inner.scopes.borrow_mut();
                let node = scopes.get_mut(&scope).ok_or_else(|| PathError::NotAssignable {
                    path: path.to_string(),
                    reason: format!("unknown scope {scope}"),
                })?;
                node.aliases.remove(name);
                node.values.insert(name.clone(), value);
                return Ok(());
            }
        }
        let (owner, mut abs) = self
            .locate(scope, &steps[0])
            .unwrap_or_else(|| (scope, vec![steps[0].clone()]));
        abs.extend(steps[1..].iter().cloned());
        self.assign_absolute(owner, &abs, value, path)
    }

    fn assign_absolute(
        &self,
        owner: ScopeId,
        abs: &[Step],
        value: Value,
        path: &str,
    ) -> Result<(), PathError> {
        let mut scopes = self.inner.scopes.borrow_mut();
        let node = scopes.get_mut(&owner).ok_or_else(|| PathError::NotAssignable {
            path: path.to_string(),
            reason: format!("unknown scope {owner}"),
        })?;
        let Some(Step::Key(root_name)) = abs.first() else {
            return Err(PathError::NotAssignable {
                path: path.to_string(),
                reason: "path must start with a name".to_string(),
            });
        };
        let root_value = node.values.entry(root_name.clone()).or_insert(Value::Null);
        let slot = value_at_mut_create(root_value, &abs[1..], path)?;
        *slot = value;
        Ok(())
    }

    /// Binds `name` in `scope` as a write-through alias for `path` as seen
    /// from `origin`. Reads and multi-segment writes against `name` then
    /// operate on the aliased location.
    pub fn bind_alias(
        &self,
        scope: ScopeId,
        name: &str,
        origin: ScopeId,
        path: &str,
    ) -> Result<(), PathError> {
        let steps = parse_path(path)?;
        let (owner, mut abs) = self
            .locate(origin, &steps[0])
            .unwrap_or_else(|| (origin, vec![steps[0].clone()]));
        abs.extend(steps[1..].iter().cloned());
        let mut scopes = self.inner.scopes.borrow_mut();
        let node = scopes.get_mut(&scope).ok_or_else(|| PathError::NotAssignable {
            path: path.to_string(),
            reason: format!("unknown scope {scope}"),
        })?;
        node.aliases.insert(name.to_string(), (owner, abs));
        Ok(())
    }

    // ── Observation ───────────────────────────────────────────────────────

    /// Installs a watch on a path. The callback fires on every digest pass
    /// where the resolved value differs from the last-seen one; the first
    /// pass fires with `new == old`.
    pub fn observe(
        &self,
        scope: ScopeId,
        path: &str,
        callback: WatchCallback,
    ) -> Result<WatchHandle, PathError> {
        parse_path(path)?;
        let path = path.to_string();
        let eval: EvalFn = Rc::new(move |tree, sid| {
            tree.resolve(sid, &path)
                .ok()
                .flatten()
                .unwrap_or(Value::Null)
        });
        Ok(self.observe_with(scope, eval, callback))
    }

    /// Installs a watch on an arbitrary value producer.
    pub fn observe_with(&self, scope: ScopeId, eval: EvalFn, callback: WatchCallback) -> WatchHandle {
        let watcher = Rc::new(Watcher {
            eval,
            callback,
            last: RefCell::new(None),
            cancelled: Cell::new(false),
        });
        self.inner
            .watchers
            .borrow_mut()
            .push((scope, watcher.clone()));
        WatchHandle {
            watcher,
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Wraps a path evaluation in a rate-limited sampler: the cached value is
    /// returned until `interval` has elapsed since the last sample.
    pub fn sampled(&self, path: &str, interval: Duration) -> Result<EvalFn, PathError> {
        parse_path(path)?;
        let path = path.to_string();
        let cache: RefCell<Option<(Instant, Value)>> = RefCell::new(None);
        Ok(Rc::new(move |tree, sid| {
            let now = Instant::now();
            let mut cache = cache.borrow_mut();
            if let Some((at, value)) = &*cache {
                if now.duration_since(*at) < interval {
                    return value.clone();
                }
            }
            let value = tree
                .resolve(sid, &path)
                .ok()
                .flatten()
                .unwrap_or(Value::Null);
            *cache = Some((now, value.clone()));
            value
        }))
    }

    /// Runs dirty-checking passes until the watcher list settles. Watchers
    /// fire in installation order; callbacks may install or cancel watches
    /// and mutate scopes while a pass is running.
    pub fn digest(&self) {
        let mut ttl = DIGEST_TTL;
        loop {
            let mut dirty = false;
            let snapshot: Vec<(ScopeId, Rc<Watcher>)> = self.inner.watchers.borrow().clone();
            for (scope, watcher) in snapshot {
                if watcher.cancelled.get() || !self.contains(scope) {
                    continue;
                }
                let new = (watcher.eval)(self, scope);
                let old = {
                    let last = watcher.last.borrow();
                    match &*last {
                        None => Some(new.clone()),
                        Some(seen) if *seen != new => Some(seen.clone()),
                        Some(_) => None,
                    }
                };
                if let Some(old) = old {
                    *watcher.last.borrow_mut() = Some(new.clone());
                    dirty = true;
                    (watcher.callback)(self, scope, &new, &old);
                }
            }
            if !dirty {
                return;
            }
            ttl -= 1;
            if ttl == 0 {
                tracing::warn!("digest did not settle after {DIGEST_TTL} passes");
                return;
            }
        }
    }

    // ── Deferred scheduler ────────────────────────────────────────────────

    /// Queues `task` for the next turn.
    pub fn defer(&self, task: impl FnOnce(&ScopeTree) + 'static) {
        self.inner.deferred.borrow_mut().push_back(Box::new(task));
    }

    /// Runs one scheduling turn: the tasks queued before the turn started,
    /// then a digest. Tasks deferred during the turn wait for the next one.
    pub fn turn(&self) {
        let queued = self.inner.deferred.borrow().len();
        for _ in 0..queued {
            let task = self.inner.deferred.borrow_mut().pop_front();
            match task {
                Some(task) => task(self),
                None => break,
            }
        }
        self.digest();
    }
}
