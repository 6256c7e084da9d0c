//! The virtual DOM model.
//!
//! [`VdomNode`] is the immutable description of one UI node produced by a
//! component render: tag, attributes, ordered children, event-handler
//! bindings, and an optional reconciliation key. [`Model`] is its serialized
//! counterpart — the component-free, handler-free tree that goes on the wire
//! inside a `layout-update` message.
//!
//! Attribute values are a tagged union ([`AttrValue`]): either a plain
//! scalar or a handler binding. That makes the reconciler's "lift callables
//! into the event registry" step a type-level transform instead of a runtime
//! type check.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::component::ComponentInstance;
use crate::error::ModelError;

/// A reconciliation key, unique among siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
	/// String key
	Str(String),
	/// Integer key
	Int(i64),
}

impl fmt::Display for Key {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Key::Str(s) => write!(f, "\"{s}\""),
			Key::Int(n) => write!(f, "{n}"),
		}
	}
}

impl From<&str> for Key {
	fn from(value: &str) -> Self {
		Key::Str(value.to_string())
	}
}

impl From<String> for Key {
	fn from(value: String) -> Self {
		Key::Str(value)
	}
}

impl From<i64> for Key {
	fn from(value: i64) -> Self {
		Key::Int(value)
	}
}

/// A callback invoked when the remote surface dispatches an event.
///
/// Receives the event payload (`data` of the `layout-event` message).
/// Callbacks run as detached tasks; a blocking callback never delays its
/// siblings or the next incoming event.
pub type EventCallback = Arc<dyn Fn(Vec<Value>) + Send + Sync>;

/// An event-handler binding before registration: the callbacks plus the
/// wire-visible dispatch flags.
#[derive(Clone)]
pub struct HandlerSpec {
	/// Callbacks invoked in order (each as an independent task)
	pub callbacks: Vec<EventCallback>,
	/// Ask the client to call `preventDefault()`
	pub prevent_default: bool,
	/// Ask the client to call `stopPropagation()`
	pub stop_propagation: bool,
}

impl HandlerSpec {
	/// Wraps a single callback with default flags.
	pub fn new<F>(callback: F) -> Self
	where
		F: Fn(Vec<Value>) + Send + Sync + 'static,
	{
		Self {
			callbacks: vec![Arc::new(callback)],
			prevent_default: false,
			stop_propagation: false,
		}
	}

	/// Sets the `preventDefault` flag.
	pub fn prevent_default(mut self, on: bool) -> Self {
		self.prevent_default = on;
		self
	}

	/// Sets the `stopPropagation` flag.
	pub fn stop_propagation(mut self, on: bool) -> Self {
		self.stop_propagation = on;
		self
	}
}

impl fmt::Debug for HandlerSpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("HandlerSpec")
			.field("callbacks", &self.callbacks.len())
			.field("prevent_default", &self.prevent_default)
			.field("stop_propagation", &self.stop_propagation)
			.finish()
	}
}

/// An attribute value: a scalar, or a handler binding awaiting lifting.
#[derive(Debug, Clone)]
pub enum AttrValue {
	/// A plain JSON scalar (or structured value) sent to the client as-is
	Scalar(Value),
	/// A handler binding; the reconciler lifts it into `event_handlers`
	/// under the attribute's name before serialization
	Handler(HandlerSpec),
}

/// One child position of a [`VdomNode`].
#[derive(Debug, Clone)]
pub enum VdomChild {
	/// A nested element
	Node(VdomNode),
	/// A nested component invocation, resolved during reconciliation
	Component(ComponentInstance),
	/// Literal text
	Text(String),
}

impl From<VdomNode> for VdomChild {
	fn from(node: VdomNode) -> Self {
		VdomChild::Node(node)
	}
}

impl From<ComponentInstance> for VdomChild {
	fn from(instance: ComponentInstance) -> Self {
		VdomChild::Component(instance)
	}
}

impl From<String> for VdomChild {
	fn from(text: String) -> Self {
		VdomChild::Text(text)
	}
}

impl From<&str> for VdomChild {
	fn from(text: &str) -> Self {
		VdomChild::Text(text.to_string())
	}
}

/// An immutable description of one UI node.
///
/// Children order is render order and semantically significant. An empty
/// tag marks a transparent fragment that expands into its children.
///
/// # Example
///
/// ```
/// use tremolo_core::vdom::elem;
///
/// let node = elem("div")
/// 	.attr("class", "toolbar")
/// 	.child(elem("button").on("click", |_| {}).child("save"))
/// 	.child("unsaved changes");
/// assert_eq!(node.tag, "div");
/// assert_eq!(node.children.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct VdomNode {
	/// Tag name; empty string marks a fragment
	pub tag: String,
	/// Reconciliation key, unique among siblings
	pub key: Option<Key>,
	/// Attribute map; handler-valued attributes are lifted before the wire
	pub attributes: BTreeMap<String, AttrValue>,
	/// Ordered children
	pub children: Vec<VdomChild>,
	/// Event bindings keyed by event name
	pub event_handlers: BTreeMap<String, HandlerSpec>,
	/// Opaque client-side module reference, forwarded verbatim
	pub import_source: Option<Value>,
}

/// Starts building an element node.
pub fn elem(tag: impl Into<String>) -> VdomNode {
	VdomNode {
		tag: tag.into(),
		..VdomNode::default()
	}
}

/// Starts building a transparent fragment.
pub fn fragment() -> VdomNode {
	VdomNode::default()
}

impl VdomNode {
	/// Sets the reconciliation key.
	pub fn key(mut self, key: impl Into<Key>) -> Self {
		self.key = Some(key.into());
		self
	}

	/// Sets a scalar attribute.
	pub fn attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.attributes
			.insert(name.into(), AttrValue::Scalar(value.into()));
		self
	}

	/// Sets a handler-valued attribute, lifted into the event registry
	/// under the attribute's name during reconciliation.
	pub fn attr_handler(mut self, name: impl Into<String>, spec: HandlerSpec) -> Self {
		self.attributes.insert(name.into(), AttrValue::Handler(spec));
		self
	}

	/// Binds an event handler with default flags.
	pub fn on<F>(self, event: impl Into<String>, callback: F) -> Self
	where
		F: Fn(Vec<Value>) + Send + Sync + 'static,
	{
		self.on_spec(event, HandlerSpec::new(callback))
	}

	/// Binds a fully specified event handler.
	pub fn on_spec(mut self, event: impl Into<String>, spec: HandlerSpec) -> Self {
		self.event_handlers.insert(event.into(), spec);
		self
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

	/// Sets the opaque import source forwarded to the client.
	pub fn import_source(mut self, source: Value) -> Self {
		self.import_source = Some(source);
		self
	}

	/// True if this node is a transparent fragment.
	pub fn is_fragment(&self) -> bool {
		self.tag.is_empty()
	}

	/// Structural validation.
	///
	/// Fragments must not carry attributes or handlers; tags with singular
	/// text content (`script`, `style`) allow at most one text child.
	pub fn validate(&self) -> Result<(), ModelError> {
		if self.is_fragment()
			&& (!self.attributes.is_empty() || !self.event_handlers.is_empty())
		{
			return Err(ModelError::FragmentAttributes);
		}

		const SINGULAR_TEXT_TAGS: &[&str] = &["script", "style"];
		if SINGULAR_TEXT_TAGS.contains(&self.tag.as_str()) {
			let ok = match self.children.as_slice() {
				[] => true,
				[VdomChild::Text(_)] => true,
				_ => false,
			};
			if !ok {
				return Err(ModelError::SingularTextContent {
					tag: self.tag.clone(),
					count: self.children.len(),
				});
			}
		}

		Ok(())
	}
}

/// The registered, wire-visible form of an event binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerRef {
	/// Opaque correlation id used as the `layout-event` target
	pub target: String,
	/// Ask the client to call `preventDefault()`
	#[serde(rename = "preventDefault")]
	pub prevent_default: bool,
	/// Ask the client to call `stopPropagation()`
	#[serde(rename = "stopPropagation")]
	pub stop_propagation: bool,
}

/// One child position of a serialized [`Model`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelChild {
	/// Literal text
	Text(String),
	/// A nested element
	Element(Model),
}

/// A serialized node tree: components resolved, handlers lifted.
///
/// Field names follow the reference JSON encoding of the wire protocol.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Model {
	/// Tag name; empty string marks a fragment
	#[serde(rename = "tagName")]
	pub tag_name: String,

	/// Reconciliation key
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub key: Option<Key>,

	/// Scalar attributes only
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub attributes: BTreeMap<String, Value>,

	/// Ordered children
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub children: Vec<ModelChild>,

	/// Registered event bindings keyed by event name
	#[serde(
		rename = "eventHandlers",
		default,
		skip_serializing_if = "BTreeMap::is_empty"
	)]
	pub event_handlers: BTreeMap<String, HandlerRef>,

	/// Opaque client-side module reference
	#[serde(rename = "importSource", default, skip_serializing_if = "Option::is_none")]
	pub import_source: Option<Value>,
}

impl Model {
	/// A fragment model wrapping the given children.
	pub fn fragment(children: Vec<ModelChild>) -> Self {
		Model {
			children,
			..Model::default()
		}
	}
}
