//! The component abstraction.
//!
//! A component is a plain struct implementing [`Component`]: its fields are
//! the captured props, and [`Component::render`] describes the UI for the
//! current state. Renders receive an explicit [`RenderContext`] carrying the
//! hook primitives; there is no ambient or thread-local lookup.
//!
//! [`ComponentInstance`] is one *invocation* of a component inside a parent's
//! render output. Instances are created fresh on every parent render and are
//! not themselves stateful; durable state lives in the reconciler, matched
//! to instances by component type and reconciliation key.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::context::ContextId;
use crate::hooks::RenderContext;
use crate::vdom::{Key, VdomNode};

/// The output of one render: a node subtree, a nested component, text, or
/// nothing.
#[derive(Debug, Clone, Default)]
pub enum View {
	/// An element subtree
	Node(VdomNode),
	/// A single nested component
	Component(ComponentInstance),
	/// Bare text
	Text(String),
	/// Renders nothing
	#[default]
	Empty,
}

impl From<VdomNode> for View {
	fn from(node: VdomNode) -> Self {
		View::Node(node)
	}
}

impl From<ComponentInstance> for View {
	fn from(instance: ComponentInstance) -> Self {
		View::Component(instance)
	}
}

impl From<String> for View {
	fn from(text: String) -> Self {
		View::Text(text)
	}
}

impl From<&str> for View {
	fn from(text: &str) -> Self {
		View::Text(text.to_string())
	}
}

/// A declarative UI component.
///
/// # Example
///
/// ```
/// use tremolo_core::component::{Component, View};
/// use tremolo_core::hooks::RenderContext;
/// use tremolo_core::vdom::elem;
///
/// struct Greeting {
/// 	name: String,
/// }
///
/// impl Component for Greeting {
/// 	fn render(&self, _ctx: &mut RenderContext<'_>) -> View {
/// 		elem("p").child(format!("hello, {}", self.name)).into()
/// 	}
/// }
/// ```
pub trait Component: Send + Sync + 'static {
	/// Produces the component's view for its current props and state.
	///
	/// Must call the same hook primitives in the same order on every
	/// render of the same mounted instance.
	fn render(&self, ctx: &mut RenderContext<'_>) -> View;

	/// The context value this component provides to its children, if any.
	///
	/// Implemented by [`ContextProvider`](crate::context::ContextProvider);
	/// ordinary components keep the default.
	fn provided_context(&self) -> Option<(ContextId, Arc<dyn Any + Send + Sync>)> {
		None
	}

	/// Human-readable type name, for diagnostics.
	fn type_name(&self) -> &'static str {
		std::any::type_name::<Self>()
	}
}

/// One invocation of a component within a render output.
///
/// Carries the component behind an `Arc` (cheap to clone), the concrete
/// type's identity for reconciliation matching, and an optional key.
#[derive(Clone)]
pub struct ComponentInstance {
	component: Arc<dyn Component>,
	type_id: TypeId,
	key: Option<Key>,
}

impl ComponentInstance {
	/// Wraps a component for placement in a view.
	pub fn new<C: Component>(component: C) -> Self {
		Self {
			component: Arc::new(component),
			type_id: TypeId::of::<C>(),
			key: None,
		}
	}

	/// Wraps a component with an explicit reconciliation key.
	pub fn keyed<C: Component>(component: C, key: impl Into<Key>) -> Self {
		Self {
			key: Some(key.into()),
			..Self::new(component)
		}
	}

	/// The reconciliation key, if any.
	pub fn key(&self) -> Option<&Key> {
		self.key.as_ref()
	}

	/// Identity of the concrete component type, used for matching.
	pub fn component_type(&self) -> TypeId {
		self.type_id
	}

	/// The component's type name, for diagnostics.
	pub fn type_name(&self) -> &'static str {
		self.component.type_name()
	}

	pub(crate) fn render(&self, ctx: &mut RenderContext<'_>) -> View {
		self.component.render(ctx)
	}

	pub(crate) fn provided_context(&self) -> Option<(ContextId, Arc<dyn Any + Send + Sync>)> {
		self.component.provided_context()
	}
}

impl fmt::Debug for ComponentInstance {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ComponentInstance")
			.field("type", &self.type_name())
			.field("key", &self.key)
			.finish()
	}
}
