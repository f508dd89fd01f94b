//! Batching and rollback.
//!
//! A batch runs a unit of work against a transactional child scope on the
//! *next* scheduling turn, with an archived-event subscription guaranteed
//! active before the body runs. Every archive that fires elsewhere while the
//! batch is open spawns a shadow grandchild capturing the pre-change cursor
//! for that path, so `rollback` can later replay undo steps across the whole
//! subtree back to the pre-batch baseline.

use crate::engine::purge_scope;
use crate::error::HistoryError;
use crate::event::{HistoryEvent, RollbackEntry, RollbackReport, ValueChange};
use crate::handlers::{HandlerBundle, HandlerKind};
use crate::History;
use hindsight_scope::{ScopeId, ScopeTree};
use std::rc::Rc;

/// Handle to an open (or finished) batch: the transactional child scope and
/// the bundle its `rollback` handlers live on.
pub struct Transaction {
    pub scope: ScopeId,
    pub handlers: Rc<HandlerBundle>,
}

impl History {
    /// Stages `body` as a transaction under `scope`.
    ///
    /// The body is deferred to the next turn ([`ScopeTree::turn`]) so the
    /// internal archived-event subscription is wired before any mutation,
    /// then a reconciliation is forced. While the batch is open, `change`
    /// handlers are suppressed; archived events still publish. Returns the
    /// transaction handle immediately.
    pub fn batch(
        &self,
        scope: ScopeId,
        description: Option<&str>,
        body: impl FnOnce(&ScopeTree, ScopeId) + 'static,
    ) -> Result<Transaction, HistoryError> {
        self.ensure_scope(scope)?;
        let child = self.tree.spawn_child(scope);
        let handlers = Rc::new(HandlerBundle::new());
        self.state
            .borrow_mut()
            .transactions
            .insert(child, handlers.clone());

        let state = Rc::downgrade(&self.state);
        self.tree.on_destroy(child, move |_, sid| {
            if let Some(state) = state.upgrade() {
                purge_scope(&state, sid);
            }
        });

        // Every archive fired outside the transactional child spawns a
        // shadow grandchild holding that path's pre-change baseline cursor.
        let state = Rc::downgrade(&self.state);
        let weak_tree = self.tree.downgrade();
        let subscription = self.bus.subscribe(move |event| {
            let HistoryEvent::Archived {
                scope: firing,
                path,
                ..
            } = event
            else {
                return;
            };
            if *firing == child {
                return;
            }
            let (Some(state), Some(tree)) = (state.upgrade(), weak_tree.upgrade()) else {
                return;
            };
            let shadow = tree.spawn_child(child);
            {
                let mut st = state.borrow_mut();
                st.shadows.insert(shadow, *firing);
                if let Some(mut line) = st.store.line(*firing, path).cloned() {
                    line.cursor = line.cursor.saturating_sub(1);
                    st.store.put_line(shadow, path, line);
                }
            }
            let hook_state = Rc::downgrade(&state);
            tree.on_destroy(shadow, move |_, sid| {
                if let Some(state) = hook_state.upgrade() {
                    purge_scope(&state, sid);
                }
            });
        });

        let description: Option<String> = description.map(str::to_string);
        self.bus.publish(&HistoryEvent::BatchBegan {
            transaction: child,
            description: description.clone(),
        });
        self.state.borrow_mut().batching = true;

        let state = Rc::downgrade(&self.state);
        let bus = self.bus.clone();
        self.tree.defer(move |tree| {
            body(tree, child);
            tree.digest();
            if let Some(state) = state.upgrade() {
                state.borrow_mut().batching = false;
            }
            bus.unsubscribe(subscription);
            bus.publish(&HistoryEvent::BatchEnded {
                transaction: child,
                description,
            });
        });
        Ok(Transaction {
            scope: child,
            handlers,
        })
    }

    /// Replays undo steps across a transaction's shadowed scopes back to
    /// their pre-batch baselines.
    ///
    /// Replayed entries are popped off the live history lines, so later
    /// undo/redo calls never step back into the rolled-back range. Fires the
    /// transaction's `rollback` handlers (without a firing scope) and
    /// publishes the per-path report.
    pub fn rollback(&self, transaction: ScopeId) -> Result<RollbackReport, HistoryError> {
        let handlers = self
            .state
            .borrow()
            .transactions
            .get(&transaction)
            .cloned()
            .ok_or(HistoryError::NotATransaction { scope: transaction })?;

        let mut report = RollbackReport::default();
        if let Some(parent) = self.tree.parent(transaction) {
            let tracked = self.state.borrow().store.contains_scope(parent);
            if tracked {
                self.rollback_pair(transaction, parent, &mut report)?;
            }
        }
        for child in self.tree.children(transaction) {
            let live = self.state.borrow().shadows.get(&child).copied();
            if let Some(live) = live {
                self.rollback_pair(child, live, &mut report)?;
            }
        }
        handlers.fire(HandlerKind::Rollback, &self.tree, None);
        self.bus.publish(&HistoryEvent::RolledBack {
            transaction,
            report: report.clone(),
        });
        Ok(report)
    }

    /// Walks one (shadow, live) pair: for every path the shadow captured,
    /// steps the live cursor down to the shadow's baseline cursor, recording
    /// each transition and popping the replayed entry.
    fn rollback_pair(
        &self,
        shadow: ScopeId,
        live: ScopeId,
        report: &mut RollbackReport,
    ) -> Result<(), HistoryError> {
        let paths = { self.state.borrow().store.paths(shadow) };
        for path in paths {
            let mut steps = Vec::new();
            let mut descriptions = Vec::new();
            loop {
                let next = {
                    let st = self.state.borrow();
                    let (Some(shadow_line), Some(live_line)) =
                        (st.store.line(shadow, &path), st.store.line(live, &path))
                    else {
                        break;
                    };
                    if live_line.cursor <= shadow_line.cursor {
                        break;
                    }
                    live_line.cursor - 1
                };
                {
                    let mut st = self.state.borrow_mut();
                    if let Some(line) = st.store.line_mut(live, &path) {
                        line.cursor = next;
                    }
                }
                let (old_value, new_value) = self.reassign(live, &path, next)?;
                descriptions.push(self.description(live, &path));
                steps.push(ValueChange {
                    old_value,
                    new_value,
                });
                let mut st = self.state.borrow_mut();
                if let Some(line) = st.store.line_mut(live, &path) {
                    line.entries.pop();
                }
            }
            if !steps.is_empty() {
                report.paths.insert(
                    path.clone(),
                    RollbackEntry {
                        steps,
                        descriptions,
                        scope: live,
                        shadow,
                    },
                );
            }
        }
        Ok(())
    }
}
