//! Typed, subtree-scoped context values.
//!
//! A [`Context<T>`] is a process-unique channel for one value type with a
//! default. A [`ContextProvider`] component makes a value available to every
//! component below it; consumers read the innermost provided value with
//! [`RenderContext::use_context`](crate::hooks::RenderContext::use_context),
//! or the default when no provider is in scope.
//!
//! Providers always re-render their children, so a provider value change is
//! guaranteed to reach descendants even through memoized subtrees.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::component::{Component, View};
use crate::hooks::RenderContext;
use crate::vdom::{VdomChild, fragment};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one [`Context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
	fn next() -> Self {
		ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
	}
}

/// A typed context channel with a default value.
///
/// Create once (typically in a `static` or at app setup) and share the
/// handle between providers and consumers; two separately created contexts
/// never match, even with the same `T`.
///
/// # Example
///
/// ```
/// use tremolo_core::context::Context;
///
/// let theme: Context<String> = Context::new("light".to_string());
/// assert_ne!(theme.id(), Context::new("light".to_string()).id());
/// ```
pub struct Context<T> {
	id: ContextId,
	default: Arc<T>,
}

impl<T: Send + Sync + 'static> Context<T> {
	/// Creates a context with a fresh identity and the given default.
	pub fn new(default: T) -> Self {
		Self {
			id: ContextId::next(),
			default: Arc::new(default),
		}
	}

	/// This context's identity.
	pub fn id(&self) -> ContextId {
		self.id
	}

	pub(crate) fn default_value(&self) -> Arc<T> {
		Arc::clone(&self.default)
	}
}

impl<T> Clone for Context<T> {
	fn clone(&self) -> Self {
		Self {
			id: self.id,
			default: Arc::clone(&self.default),
		}
	}
}

impl<T: fmt::Debug> fmt::Debug for Context<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Context")
			.field("id", &self.id)
			.field("default", &self.default)
			.finish()
	}
}

/// The ambient provider values visible at one point of the tree.
///
/// Snapshotted onto each mounted component so a partial re-render rooted
/// below a provider still sees the provider's values.
#[derive(Clone, Default)]
pub struct ContextMap {
	entries: HashMap<ContextId, Arc<dyn Any + Send + Sync>>,
}

impl ContextMap {
	pub(crate) fn insert(&mut self, id: ContextId, value: Arc<dyn Any + Send + Sync>) {
		self.entries.insert(id, value);
	}

	/// The innermost provided value for `context`, or its default.
	pub(crate) fn get<T: Send + Sync + 'static>(&self, context: &Context<T>) -> Arc<T> {
		self.entries
			.get(&context.id())
			.and_then(|value| Arc::clone(value).downcast::<T>().ok())
			.unwrap_or_else(|| context.default_value())
	}
}

impl fmt::Debug for ContextMap {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ContextMap")
			.field("entries", &self.entries.len())
			.finish()
	}
}

/// A component that provides a context value to its children.
///
/// Renders as a transparent fragment wrapping the children. The provider
/// re-renders its children on every one of its own renders, so consumers
/// below always observe the current value.
pub struct ContextProvider<T> {
	context: Context<T>,
	value: Arc<T>,
	children: Vec<VdomChild>,
}

impl<T: Send + Sync + 'static> ContextProvider<T> {
	/// Provides `value` for `context` to the children added below.
	pub fn new(context: &Context<T>, value: T) -> Self {
		Self {
			context: context.clone(),
			value: Arc::new(value),
			children: Vec::new(),
		}
	}

	/// Appends one child.
	pub fn child(mut self, child: impl Into<VdomChild>) -> Self {
		self.children.push(child.into());
		self
	}

	/// Appends children in order.
	pub fn children<I>(mut self, children: I) -> Self
	where
		I: IntoIterator,
		I::Item: Into<VdomChild>,
	{
		self.children.extend(children.into_iter().map(Into::into));
		self
	}
}

impl<T: Send + Sync + 'static> Component for ContextProvider<T> {
	fn render(&self, _ctx: &mut RenderContext<'_>) -> View {
		fragment().children(self.children.iter().cloned()).into()
	}

	fn provided_context(&self) -> Option<(ContextId, Arc<dyn Any + Send + Sync>)> {
		Some((self.context.id(), Arc::clone(&self.value) as Arc<dyn Any + Send + Sync>))
	}
}
