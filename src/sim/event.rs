//! Timestamped events exchanged between models.
//!
//! An [`Event`] is immutable once created. Its [`EventKind`] carries the
//! per-type priority used to order coincident events delivered to the same
//! model.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

use super::time::Time;

/// The type of an event: a name plus its priority rank.
///
/// Lower `priority` values win. Two kinds with the same rank are not ordered
/// by [`Event::has_priority_over`]; [`Event::priority_cmp`] still orders them
/// deterministically by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EventKind {
    name: Cow<'static, str>,
    priority: u8,
}

impl EventKind {
    /// Declares a kind with a static name, usable in `const` items.
    pub const fn new(name: &'static str, priority: u8) -> Self {
        Self {
            name: Cow::Borrowed(name),
            priority,
        }
    }

    /// Declares a kind whose name comes from configuration.
    pub fn named(name: impl Into<String>, priority: u8) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            priority,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Optional payload attached to an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EventContent {
    Real(f64),
    Flag(bool),
    Text(String),
}

impl EventContent {
    pub fn as_real(&self) -> Option<f64> {
        match self {
            EventContent::Real(v) => Some(*v),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            EventContent::Real(_) => 0,
            EventContent::Flag(_) => 1,
            EventContent::Text(_) => 2,
        }
    }

    fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (EventContent::Real(a), EventContent::Real(b)) => a.total_cmp(b),
            (EventContent::Flag(a), EventContent::Flag(b)) => a.cmp(b),
            (EventContent::Text(a), EventContent::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// A timestamped occurrence.
///
/// # Examples
///
/// ```
/// use appliance_sim::sim::event::{Event, EventKind};
/// use appliance_sim::sim::time::{Time, TimeUnit};
///
/// const SWITCH_OFF: EventKind = EventKind::new("SwitchOff", 0);
/// const SET_LOW: EventKind = EventKind::new("SetLow", 1);
///
/// let t = Time::zero(TimeUnit::Seconds);
/// let off = Event::new(SWITCH_OFF, t);
/// let low = Event::new(SET_LOW, t);
/// assert!(off.has_priority_over(&low));
/// assert!(!low.has_priority_over(&off));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    kind: EventKind,
    time: Time,
    content: Option<EventContent>,
}

impl Event {
    pub fn new(kind: EventKind, time: Time) -> Self {
        Self {
            kind,
            time,
            content: None,
        }
    }

    pub fn with_content(kind: EventKind, time: Time, content: EventContent) -> Self {
        Self {
            kind,
            time,
            content: Some(content),
        }
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn time(&self) -> Time {
        self.time
    }

    pub fn content(&self) -> Option<&EventContent> {
        self.content.as_ref()
    }

    /// Returns `true` when this event must be applied before `other` when
    /// both occur at the same instant.
    pub fn has_priority_over(&self, other: &Event) -> bool {
        self.kind.priority < other.kind.priority
    }

    /// Total order used to sort a bag of coincident inputs: priority rank,
    /// then kind name, then content.
    pub fn priority_cmp(&self, other: &Event) -> Ordering {
        self.kind
            .priority
            .cmp(&other.kind.priority)
            .then_with(|| self.kind.name.cmp(&other.kind.name))
            .then_with(|| match (&self.content, &other.content) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(a), Some(b)) => a.total_cmp(b),
            })
    }

    /// Copy of this event under another kind, same time and content.
    pub fn relabelled(&self, kind: EventKind) -> Event {
        Event {
            kind,
            time: self.time,
            content: self.content.clone(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.kind, self.time)?;
        if let Some(c) = &self.content {
            write!(f, "({c:?})")?;
        }
        Ok(())
    }
}
