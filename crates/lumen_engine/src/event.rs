//! Named events delivered once per frame
//!
//! Events sent during a frame are queued and handed to the listeners registered for
//! their name when the frame loop calls [`EventQueue::update`]. A listener returning
//! `true` consumes the event and later listeners do not see it.

use std::collections::HashMap;

use crate::foundation::math::Vec3;

/// Value carried by an event
#[derive(Debug, Clone, PartialEq)]
pub enum EventValue {
    /// No payload
    None,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// Text
    Text(String),
    /// Position or direction
    Vec3(Vec3),
}

/// A named event
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event name listeners subscribe to
    pub name: String,
    /// Payload
    pub value: EventValue,
}

impl Event {
    /// Event `name` carrying `value`
    pub fn new(name: impl Into<String>, value: EventValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

type Listener = Box<dyn FnMut(&Event) -> bool>;

/// Queue of pending events and the listeners interested in them
#[derive(Default)]
pub struct EventQueue {
    pending: Vec<Event>,
    deferred: Vec<(f64, Event)>,
    listeners: HashMap<String, Vec<Listener>>,
    current_time: f64,
}

impl EventQueue {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen to events named `name`; return `true` from `listener` to consume
    pub fn add_listener(&mut self, name: &str, listener: impl FnMut(&Event) -> bool + 'static) {
        self.listeners
            .entry(name.to_string())
            .or_default()
            .push(Box::new(listener));
    }

    /// Deliver `event` at the next update
    pub fn send(&mut self, event: Event) {
        self.pending.push(event);
    }

    /// Deliver `event` at the first update at or after `delay` seconds from now
    pub fn post(&mut self, delay: f64, event: Event) {
        self.deferred.push((self.current_time + delay, event));
    }

    /// Number of events waiting for delivery
    pub fn pending_count(&self) -> usize {
        self.pending.len() + self.deferred.len()
    }

    /// Deliver queued events and deferred events that are due at `now`
    pub fn update(&mut self, now: f64) {
        self.current_time = now;
        for event in std::mem::take(&mut self.pending) {
            self.dispatch(&event);
        }

        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.deferred)
            .into_iter()
            .partition(|(time, _)| *time <= now);
        self.deferred = waiting;
        for (_, event) in due {
            self.dispatch(&event);
        }
    }

    /// Drop every queued event
    pub fn clear(&mut self) {
        self.pending.clear();
        self.deferred.clear();
    }

    fn dispatch(&mut self, event: &Event) {
        let Some(listeners) = self.listeners.get_mut(&event.name) else {
            log::trace!("Event {} has no listeners", event.name);
            return;
        };
        for listener in listeners {
            if listener(event) {
                break;
            }
        }
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("pending", &self.pending)
            .field("deferred", &self.deferred)
            .field("listeners", &self.listeners.keys().collect::<Vec<_>>())
            .field("current_time", &self.current_time)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder(log: &Rc<RefCell<Vec<String>>>, tag: &'static str, consume: bool) -> impl FnMut(&Event) -> bool {
        let log = Rc::clone(log);
        move |event| {
            log.borrow_mut().push(format!("{tag}:{}", event.name));
            consume
        }
    }

    #[test]
    fn test_events_wait_for_update() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut queue = EventQueue::new();
        queue.add_listener("door", recorder(&log, "a", false));

        queue.send(Event::new("door", EventValue::Bool(true)));
        assert!(log.borrow().is_empty());

        queue.update(0.0);
        assert_eq!(*log.borrow(), ["a:door"]);
        assert_eq!(queue.pending_count(), 0);
    }

    #[test]
    fn test_only_named_listeners_receive() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut queue = EventQueue::new();
        queue.add_listener("door", recorder(&log, "door", false));
        queue.add_listener("light", recorder(&log, "light", false));

        queue.send(Event::new("light", EventValue::None));
        queue.update(0.0);
        assert_eq!(*log.borrow(), ["light:light"]);
    }

    #[test]
    fn test_consuming_listener_stops_delivery() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut queue = EventQueue::new();
        queue.add_listener("hit", recorder(&log, "first", true));
        queue.add_listener("hit", recorder(&log, "second", false));

        queue.send(Event::new("hit", EventValue::Int(3)));
        queue.update(0.0);
        assert_eq!(*log.borrow(), ["first:hit"]);
    }

    #[test]
    fn test_deferred_events_fire_when_due() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut queue = EventQueue::new();
        queue.add_listener("timer", recorder(&log, "t", false));

        queue.update(1.0);
        queue.post(0.5, Event::new("timer", EventValue::None));
        queue.update(1.25);
        assert!(log.borrow().is_empty());
        queue.update(1.5);
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(queue.pending_count(), 0);
    }
}
