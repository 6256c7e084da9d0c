//! Event-handler registry and dispatch.
//!
//! The registry maps opaque target ids (the `target` of a `layout-event`
//! message) to their registered [`HandlerSpec`]s. The render stream is the
//! only writer; the serve loop's incoming side reads it through
//! [`EventRegistry::dispatch`], which spawns every callback as an
//! independent task so a blocking handler never delays its siblings or the
//! next incoming event.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::vdom::HandlerSpec;

/// One registered target id with its current spec and owner count.
///
/// Target ids are derived from tree positions, so during a single render
/// pass two components can legitimately hold the same id while handlers
/// move between them (a keyed reorder, or a replaced child). The id stays
/// live until every owner has released its claim.
#[derive(Debug)]
struct Registration {
	spec: HandlerSpec,
	owners: usize,
}

/// Shared handler registry.
///
/// Cheap to clone; all clones observe the same map. Dispatch to an id that
/// was never registered, or was unregistered by an unmount, is a normal
/// race and logs at debug level.
#[derive(Debug, Clone, Default)]
pub struct EventRegistry {
	handlers: Arc<RwLock<HashMap<String, Registration>>>,
}

impl EventRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers the handler for `target`, claiming one owner.
	///
	/// The latest spec wins; the id stays live until every owner has
	/// called [`unregister`](Self::unregister).
	pub fn register(&self, target: impl Into<String>, spec: HandlerSpec) {
		match self.handlers.write().entry(target.into()) {
			Entry::Occupied(mut occupied) => {
				let registration = occupied.get_mut();
				registration.spec = spec;
				registration.owners += 1;
			}
			Entry::Vacant(vacant) => {
				vacant.insert(Registration { spec, owners: 1 });
			}
		}
	}

	/// Replaces the spec for a target the caller already owns, without
	/// claiming another owner.
	pub fn refresh(&self, target: impl Into<String>, spec: HandlerSpec) {
		match self.handlers.write().entry(target.into()) {
			Entry::Occupied(mut occupied) => occupied.get_mut().spec = spec,
			Entry::Vacant(vacant) => {
				vacant.insert(Registration { spec, owners: 1 });
			}
		}
	}

	/// Returns the handler registered for `target`, if any.
	pub fn lookup(&self, target: &str) -> Option<HandlerSpec> {
		self.handlers.read().get(target).map(|registration| registration.spec.clone())
	}

	/// Releases one owner's claim on `target`; the handler is removed once
	/// no owners remain.
	pub fn unregister(&self, target: &str) {
		let mut handlers = self.handlers.write();
		if let Some(registration) = handlers.get_mut(target) {
			registration.owners -= 1;
			if registration.owners == 0 {
				handlers.remove(target);
			}
		}
	}

	/// Number of live registrations.
	pub fn len(&self) -> usize {
		self.handlers.read().len()
	}

	/// True when no handlers are registered.
	pub fn is_empty(&self) -> bool {
		self.handlers.read().is_empty()
	}

	/// Dispatches an event payload to the handler registered for `target`.
	///
	/// Each callback runs as its own detached task. Returns immediately;
	/// never waits on callback completion.
	pub fn dispatch(&self, target: &str, data: Vec<Value>) {
		let Some(spec) = self.lookup(target) else {
			// Unmount races drop handlers between the client observing a
			// binding and the event arriving.
			tracing::debug!(target_id = %target, "event for unregistered handler dropped");
			return;
		};

		tracing::trace!(
			target_id = %target,
			callbacks = spec.callbacks.len(),
			"dispatching event"
		);
		for callback in spec.callbacks {
			let data = data.clone();
			tokio::spawn(async move {
				callback(data);
			});
		}
	}

	/// Removes every registration.
	pub fn clear(&self) {
		self.handlers.write().clear();
	}
}
