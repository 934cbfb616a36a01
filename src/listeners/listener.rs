//! # Core listener trait
//!
//! `Listener` is the extension point for reacting to lifecycle events. Listeners
//! are registered on a [`ListenerRegistry`](crate::listeners::ListenerRegistry)
//! under a [`Topic`](crate::events::Topic) before the run starts.
//!
//! ## Contract
//! - Called **inline** on the coordinator task, one event at a time, in
//!   registration order. A slow listener delays every later event.
//! - A panic is caught and logged; the run continues.
//!
//! ## Example
//! ```rust
//! use expvisor::{Event, Listener};
//! use async_trait::async_trait;
//!
//! struct Audit;
//!
//! #[async_trait]
//! impl Listener for Audit {
//!     async fn on_event(&self, ev: &Event) {
//!         let _ = ev.topic();
//!     }
//!     fn name(&self) -> &str { "audit" }
//! }
//! ```

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;

use crate::events::Event;

/// Contract for event listeners.
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Handles a single event.
    async fn on_event(&self, event: &Event);

    /// Human-readable name (for logs).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Shared listener handle.
pub type ListenerRef = Arc<dyn Listener>;

/// Closure-backed listener.
///
/// ```rust
/// use expvisor::{Event, ListenerFn, ListenerRef};
///
/// let l: ListenerRef = ListenerFn::arc("printer", |ev: &Event| println!("{}", ev.topic()));
/// assert_eq!(l.name(), "printer");
/// ```
pub struct ListenerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> ListenerFn<F>
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    /// Creates a closure-backed listener.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self { name: name.into(), f }
    }

    /// Creates the listener and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F> Listener for ListenerFn<F>
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    async fn on_event(&self, event: &Event) {
        (self.f)(event)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
