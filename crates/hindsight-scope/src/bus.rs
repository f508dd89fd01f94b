//! Minimal publish/subscribe bus for in-process events.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Token returned by [`Bus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Single-threaded subscriber registry. Delivery snapshots the subscriber
/// list first, so subscribers may subscribe or unsubscribe reentrantly.
pub struct Bus<E> {
    next: Cell<u64>,
    subscribers: RefCell<Vec<(SubscriptionId, Rc<dyn Fn(&E)>)>>,
}

impl<E> Default for Bus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Bus<E> {
    pub fn new() -> Self {
        Bus {
            next: Cell::new(1),
            subscribers: RefCell::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, subscriber: impl Fn(&E) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next.get());
        self.next.set(id.0 + 1);
        self.subscribers
            .borrow_mut()
            .push((id, Rc::new(subscriber)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn publish(&self, event: &E) {
        let snapshot: Vec<Rc<dyn Fn(&E)>> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, f)| f.clone())
            .collect();
        for subscriber in snapshot {
            subscriber(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_to_all_subscribers_in_order() {
        let bus: Bus<u32> = Bus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (a, b) = (seen.clone(), seen.clone());
        bus.subscribe(move |e| a.borrow_mut().push(("a", *e)));
        bus.subscribe(move |e| b.borrow_mut().push(("b", *e)));
        bus.publish(&7);
        assert_eq!(&*seen.borrow(), &[("a", 7), ("b", 7)]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus: Bus<u32> = Bus::new();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let id = bus.subscribe(move |_| c.set(c.get() + 1));
        bus.publish(&1);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(&2);
        assert_eq!(count.get(), 1);
    }
}
