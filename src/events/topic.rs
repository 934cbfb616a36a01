//! # Subscription topics.
//!
//! A [`Topic`] decides which events a listener receives:
//! - [`Topic::Any`]: every **generic** event (wildcard)
//! - [`Topic::Kind`]: generic events of exactly one [`EventKind`]
//! - [`Topic::Named`]: the **specific** copy whose topic equals the name,
//!   e.g. `"paramset-1__PARAMSET_END"` or `"train__STEP_ERROR"`
//!
//! Generic and specific copies never reach the same subscription, so a
//! listener sees each occurrence once.

use std::fmt;

use super::event::{Event, EventKind};

/// What a listener subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    /// Every generic event.
    Any,
    /// Generic events of one kind.
    Kind(EventKind),
    /// Specific events with this exact topic name.
    Named(String),
}

impl Topic {
    /// Specific topic for an owner name and kind (`{owner}__{suffix}`).
    ///
    /// ```
    /// use expvisor::{EventKind, Topic};
    ///
    /// let t = Topic::specific("p1", EventKind::ParamsetEnd);
    /// assert_eq!(t, Topic::Named("p1__PARAMSET_END".into()));
    /// ```
    pub fn specific(owner: &str, kind: EventKind) -> Self {
        Topic::Named(format!("{owner}__{}", kind.suffix()))
    }

    /// True if `event` should be delivered to a subscriber of this topic.
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            Topic::Any => event.is_generic(),
            Topic::Kind(kind) => event.is_generic() && event.kind == *kind,
            Topic::Named(name) => !event.is_generic() && event.topic() == *name,
        }
    }
}

impl From<EventKind> for Topic {
    fn from(kind: EventKind) -> Self {
        Topic::Kind(kind)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Any => f.write_str("*"),
            Topic::Kind(kind) => f.write_str(kind.as_str()),
            Topic::Named(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_skips_specific_copies() {
        let ev = Event::paramset(EventKind::ParamsetStart, "exp", "p1");
        assert!(Topic::Any.matches(&ev));
        assert!(!Topic::Any.matches(&ev.to_specific()));
    }

    #[test]
    fn test_kind_matches_exactly() {
        let ev = Event::paramset(EventKind::ParamsetEnd, "exp", "p1");
        assert!(Topic::Kind(EventKind::ParamsetEnd).matches(&ev));
        assert!(!Topic::Kind(EventKind::ParamsetStart).matches(&ev));
        assert!(!Topic::Kind(EventKind::ParamsetEnd).matches(&ev.to_specific()));
    }

    #[test]
    fn test_named_matches_specific_copy_only() {
        let ev = Event::step(EventKind::StepEnd, "exp", "p1", "fit");
        let topic = Topic::specific("fit", EventKind::StepEnd);
        assert!(!topic.matches(&ev));
        assert!(topic.matches(&ev.to_specific()));
        assert!(!Topic::specific("other", EventKind::StepEnd).matches(&ev.to_specific()));
    }
}
