//! The reconciler.
//!
//! A [`Layout`] owns the durable state of every mounted component in an
//! arena keyed by [`SlotId`], pulls slots needing re-render from the
//! scheduler one at a time, re-renders them, matches the fresh output
//! against the previous render to reuse or unmount child component state,
//! and serializes the result into a [`LayoutUpdate`] addressing the
//! re-rendered subtree by path.
//!
//! Paths are slash-delimited child indices from the root (the root itself
//! is the empty path); a `layout-update` replaces the whole subtree at its
//! path. Event-handler target ids are derived from the owning node's path
//! and event name, so an unchanged element keeps its target id across
//! re-renders.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};

use serde_json::Value;

use crate::component::{ComponentInstance, View};
use crate::context::ContextMap;
use crate::error::UiError;
use crate::event::EventRegistry;
use crate::hooks::{LifeCycleHook, QueuedEffect, RenderContext, panic_message};
use crate::scheduler::{RenderScheduler, SlotId};
use crate::serve::{LayoutEvent, LayoutUpdate};
use crate::vdom::{AttrValue, HandlerRef, HandlerSpec, Key, Model, ModelChild, VdomChild, VdomNode};

/// How a child component position is matched against the previous render:
/// by explicit key, or by position within its sibling list.
///
/// `scope` is the containing node's position within the owning component's
/// output, so keys only need to be unique among siblings and positional
/// matches never cross sibling lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MatchKey {
	Keyed { scope: String, key: Key },
	Index { scope: String, index: usize },
}

type ChildKey = (TypeId, MatchKey);

/// Durable bookkeeping for one mounted component.
struct ComponentState {
	instance: ComponentInstance,
	path: String,
	last_model: Option<Model>,
	/// Child components of the previous render, by match key
	children: HashMap<ChildKey, SlotId>,
	/// Children in render order, for recursive unmount
	child_order: Vec<SlotId>,
	owned_handlers: HashSet<String>,
	hook: LifeCycleHook,
	/// Ambient provider values at the last render, so a partial re-render
	/// rooted here still sees providers above it
	contexts: ContextMap,
}

/// Per-render bookkeeping while walking one component's fresh output.
struct ChildWalk {
	prev: HashMap<ChildKey, SlotId>,
	next: HashMap<ChildKey, SlotId>,
	order: Vec<SlotId>,
	handlers: HashSet<String>,
	/// Handler ids this component owned before the pass; re-registrations
	/// of these must not claim another owner
	prev_owned: HashSet<String>,
}

impl ChildWalk {
	fn new(prev: HashMap<ChildKey, SlotId>, prev_owned: HashSet<String>) -> Self {
		Self {
			prev,
			next: HashMap::new(),
			order: Vec::new(),
			handlers: HashSet::new(),
			prev_owned,
		}
	}
}

/// One component position within its containing node's child list.
struct SiblingSlot<'a> {
	scope: &'a str,
	position: usize,
	seen_keys: &'a mut HashSet<Key>,
}

/// An effect collected during a render pass, run after the whole touched
/// subtree has finished serializing.
struct EffectRun {
	slot: SlotId,
	component: &'static str,
	effect: QueuedEffect,
}

/// A cloneable handle that forwards wire events into the registry.
///
/// Delivery never blocks on handler completion; callbacks are spawned as
/// detached tasks.
#[derive(Debug, Clone)]
pub struct EventSink {
	registry: EventRegistry,
}

impl EventSink {
	/// Routes `event` to the handler registered for its target.
	pub fn deliver(&self, event: LayoutEvent) {
		self.registry.dispatch(&event.target, event.data);
	}
}

/// The component tree and its render stream.
///
/// Not reentrant: renders run one at a time through `&mut self`, preserving
/// a total order of state mutations and effect observations. Event handlers
/// run concurrently and signal changes only through their state setters,
/// which funnel back through the scheduler.
pub struct Layout {
	scheduler: RenderScheduler,
	registry: EventRegistry,
	states: HashMap<SlotId, ComponentState>,
	root: SlotId,
	next_slot: u64,
	reports: Vec<UiError>,
}

impl Layout {
	/// Mounts `root` and schedules its first render.
	pub fn new(root: ComponentInstance) -> Self {
		let mut layout = Self {
			scheduler: RenderScheduler::new(),
			registry: EventRegistry::new(),
			states: HashMap::new(),
			root: SlotId::new(0),
			next_slot: 0,
			reports: Vec::new(),
		};
		layout.root = layout.mount(root, String::new());
		layout.scheduler.schedule(layout.root);
		layout
	}

	/// Waits for the next slot needing a render, re-renders it, and returns
	/// the update.
	///
	/// Slots scheduled before their owner unmounted are silently dropped.
	pub async fn render(&mut self) -> LayoutUpdate {
		loop {
			let slot = self.scheduler.next().await;
			if !self.states.contains_key(&slot) {
				tracing::trace!(%slot, "dropping schedule for unmounted slot");
				continue;
			}
			return self.render_slot(slot);
		}
	}

	/// Renders the next pending slot, if any, without waiting.
	pub fn try_render(&mut self) -> Option<LayoutUpdate> {
		loop {
			let slot = self.scheduler.try_next()?;
			if self.states.contains_key(&slot) {
				return Some(self.render_slot(slot));
			}
		}
	}

	/// Forwards a wire event to its registered handler without blocking.
	pub fn deliver_event(&self, event: LayoutEvent) {
		self.registry.dispatch(&event.target, event.data);
	}

	/// A cloneable sink for the serve loop's incoming side.
	pub fn event_sink(&self) -> EventSink {
		EventSink {
			registry: self.registry.clone(),
		}
	}

	/// The root component's last serialized model, if it has rendered.
	pub fn root_model(&self) -> Option<&Model> {
		self.states.get(&self.root).and_then(|state| state.last_model.as_ref())
	}

	/// Drains the component-scoped error reports collected so far.
	pub fn take_reports(&mut self) -> Vec<UiError> {
		std::mem::take(&mut self.reports)
	}

	/// Unmounts the whole tree: cancels in-flight async effects, runs every
	/// live cleanup exactly once, and releases all states and handler ids.
	/// Dispatching to any previously valid target afterwards is a no-op.
	pub fn teardown(&mut self) {
		tracing::debug!("tearing down layout");
		self.unmount_slot(self.root);
	}

	fn alloc_slot(&mut self) -> SlotId {
		let slot = SlotId::new(self.next_slot);
		self.next_slot += 1;
		slot
	}

	fn mount(&mut self, instance: ComponentInstance, path: String) -> SlotId {
		let slot = self.alloc_slot();
		let hook = LifeCycleHook::new(self.scheduler.handle(slot));
		tracing::debug!(%slot, path = %path, component = instance.type_name(), "component mounted");
		self.states.insert(
			slot,
			ComponentState {
				instance,
				path,
				last_model: None,
				children: HashMap::new(),
				child_order: Vec::new(),
				owned_handlers: HashSet::new(),
				hook,
				contexts: ContextMap::default(),
			},
		);
		slot
	}

	/// Partial re-render rooted at `slot`. Effects queued anywhere in the
	/// touched subtree run only after the entire subtree has serialized.
	fn render_slot(&mut self, slot: SlotId) -> LayoutUpdate {
		let (path, ambient) = match self.states.get(&slot) {
			Some(state) => (state.path.clone(), state.contexts.clone()),
			None => return LayoutUpdate::default(),
		};
		let mut effects = Vec::new();
		let model = self.render_component(slot, ambient, &mut effects);
		self.run_effects(effects);
		LayoutUpdate { path, model }
	}

	fn render_component(
		&mut self,
		slot: SlotId,
		mut ambient: ContextMap,
		effects: &mut Vec<EffectRun>,
	) -> Model {
		let Some(mut state) = self.states.remove(&slot) else {
			tracing::warn!(%slot, "render requested for missing component state");
			return Model::default();
		};

		if let Some((id, value)) = state.instance.provided_context() {
			ambient.insert(id, value);
		}
		state.contexts = ambient.clone();
		state.hook.begin_render();

		let component = state.instance.type_name();
		let path = state.path.clone();

		let rendered = {
			let instance = &state.instance;
			let mut ctx = RenderContext::new(&mut state.hook, &ambient);
			catch_unwind(AssertUnwindSafe(|| instance.render(&mut ctx)))
		};

		let model = match rendered {
			Ok(view) => {
				let mut walk = ChildWalk::new(
					std::mem::take(&mut state.children),
					std::mem::take(&mut state.owned_handlers),
				);
				let model = self.serialize_view(view, &path, &mut walk, &ambient, effects);

				let ChildWalk {
					prev,
					next,
					order,
					handlers,
					prev_owned,
				} = walk;
				// Previous children not claimed by this pass are gone.
				for old in prev.into_values() {
					self.unmount_slot(old);
				}
				for stale in prev_owned.difference(&handlers) {
					self.registry.unregister(stale);
				}
				state.owned_handlers = handlers;
				state.children = next;
				state.child_order = order;
				model
			}
			Err(panic) => {
				let message = panic_message(panic);
				tracing::error!(component, path = %path, error = %message, "component render failed");
				self.reports.push(UiError::Render {
					component: component.to_string(),
					message,
				});
				// Siblings keep rendering; this subtree degrades to a
				// placeholder and keeps its previous children's state.
				error_placeholder(component)
			}
		};

		for effect in state.hook.take_effects() {
			effects.push(EffectRun {
				slot,
				component,
				effect,
			});
		}

		state.last_model = Some(model.clone());
		self.states.insert(slot, state);
		model
	}

	fn serialize_view(
		&mut self,
		view: View,
		path: &str,
		walk: &mut ChildWalk,
		ambient: &ContextMap,
		effects: &mut Vec<EffectRun>,
	) -> Model {
		match view {
			View::Node(node) => self.serialize_node(node, path, "", walk, ambient, effects),
			View::Component(instance) => self.serialize_component(
				instance,
				path,
				SiblingSlot {
					scope: "",
					position: 0,
					seen_keys: &mut HashSet::new(),
				},
				walk,
				ambient,
				effects,
			),
			View::Text(text) => Model::fragment(vec![ModelChild::Text(text)]),
			View::Empty => Model::default(),
		}
	}

	/// `local` is this node's position within the owning component's output;
	/// it scopes key uniqueness and positional matching to sibling lists and
	/// stays stable when the component itself moves.
	fn serialize_node(
		&mut self,
		node: VdomNode,
		path: &str,
		local: &str,
		walk: &mut ChildWalk,
		ambient: &ContextMap,
		effects: &mut Vec<EffectRun>,
	) -> Model {
		if let Err(source) = node.validate() {
			tracing::warn!(path, error = %source, "node failed validation");
			self.reports.push(UiError::Model {
				path: path.to_string(),
				source,
			});
		}

		let VdomNode {
			tag,
			key,
			attributes,
			children,
			event_handlers,
			import_source,
		} = node;
		let mut model = Model {
			tag_name: tag,
			key,
			import_source,
			..Model::default()
		};

		for (name, value) in attributes {
			match value {
				AttrValue::Scalar(scalar) => {
					model.attributes.insert(name, scalar);
				}
				AttrValue::Handler(spec) => {
					let handler_ref = self.register_handler(path, &name, spec, walk);
					model.event_handlers.insert(name, handler_ref);
				}
			}
		}
		for (event, spec) in event_handlers {
			let handler_ref = self.register_handler(path, &event, spec, walk);
			model.event_handlers.insert(event, handler_ref);
		}

		let mut seen_keys = HashSet::new();
		for (index, child) in children.into_iter().enumerate() {
			let child_path = format!("{path}/{index}");
			let serialized = match child {
				VdomChild::Text(text) => ModelChild::Text(text),
				VdomChild::Node(node) => {
					let child_local = format!("{local}/{index}");
					ModelChild::Element(self.serialize_node(
						node,
						&child_path,
						&child_local,
						walk,
						ambient,
						effects,
					))
				}
				VdomChild::Component(instance) => ModelChild::Element(self.serialize_component(
					instance,
					&child_path,
					SiblingSlot {
						scope: local,
						position: index,
						seen_keys: &mut seen_keys,
					},
					walk,
					ambient,
					effects,
				)),
			};
			model.children.push(serialized);
		}
		model
	}

	/// Resolves one component position: match against the previous render
	/// by `(component type, key-or-position)` within the sibling scope,
	/// reuse or mount, and recurse.
	fn serialize_component(
		&mut self,
		instance: ComponentInstance,
		path: &str,
		sibling: SiblingSlot<'_>,
		walk: &mut ChildWalk,
		ambient: &ContextMap,
		effects: &mut Vec<EffectRun>,
	) -> Model {
		let match_key = match instance.key() {
			Some(key) if !sibling.seen_keys.insert(key.clone()) => {
				tracing::warn!(path, key = %key, "duplicate sibling key, using positional match");
				self.reports.push(UiError::DuplicateKey {
					path: path.to_string(),
					key: key.clone(),
				});
				MatchKey::Index {
					scope: sibling.scope.to_string(),
					index: sibling.position,
				}
			}
			Some(key) => MatchKey::Keyed {
				scope: sibling.scope.to_string(),
				key: key.clone(),
			},
			None => MatchKey::Index {
				scope: sibling.scope.to_string(),
				index: sibling.position,
			},
		};

		let child_key = (instance.component_type(), match_key);
		let slot = match walk.prev.remove(&child_key) {
			Some(existing) => {
				if let Some(state) = self.states.get_mut(&existing) {
					state.instance = instance;
					state.path = path.to_string();
				}
				existing
			}
			None => self.mount(instance, path.to_string()),
		};
		walk.next.insert(child_key, slot);
		walk.order.push(slot);

		self.render_component(slot, ambient.clone(), effects)
	}

	fn register_handler(
		&mut self,
		path: &str,
		event: &str,
		spec: HandlerSpec,
		walk: &mut ChildWalk,
	) -> HandlerRef {
		let target = format!("{path}@{event}");
		let handler_ref = HandlerRef {
			target: target.clone(),
			prevent_default: spec.prevent_default,
			stop_propagation: spec.stop_propagation,
		};
		// An id this component already owns is re-bound, not re-claimed;
		// claiming again would leak the registration past unmount.
		if walk.handlers.contains(&target) || walk.prev_owned.contains(&target) {
			self.registry.refresh(target.clone(), spec);
		} else {
			self.registry.register(target.clone(), spec);
		}
		walk.handlers.insert(target);
		handler_ref
	}

	/// Recursively deletes `slot` and its descendants: children first, then
	/// handler ids, then this hook's cleanups.
	fn unmount_slot(&mut self, slot: SlotId) {
		let Some(mut state) = self.states.remove(&slot) else {
			return;
		};
		let children = std::mem::take(&mut state.child_order);
		for child in children {
			self.unmount_slot(child);
		}
		for target in &state.owned_handlers {
			self.registry.unregister(target);
		}
		let errors = state.hook.unmount(state.instance.type_name());
		self.reports.extend(errors);
		tracing::debug!(%slot, path = %state.path, component = state.instance.type_name(), "component unmounted");
	}

	/// Runs the did-render effects of one pass, in render order. Sync
	/// effect failures are isolated; async effects are spawned detached
	/// under their cancellation tokens.
	fn run_effects(&mut self, runs: Vec<EffectRun>) {
		for run in runs {
			match run.effect {
				QueuedEffect::Sync {
					cell,
					prev_cleanup,
					body,
				} => {
					if let Some(cleanup) = prev_cleanup {
						if let Err(panic) = catch_unwind(AssertUnwindSafe(cleanup)) {
							let message = panic_message(panic);
							tracing::error!(component = run.component, error = %message, "effect cleanup failed");
							self.reports.push(UiError::Cleanup {
								component: run.component.to_string(),
								message,
							});
						}
					}
					match catch_unwind(AssertUnwindSafe(body)) {
						Ok(cleanup) => {
							if let Some(state) = self.states.get_mut(&run.slot) {
								state.hook.store_cleanup(cell, cleanup);
							}
						}
						Err(panic) => {
							let message = panic_message(panic);
							tracing::error!(component = run.component, error = %message, "effect failed");
							self.reports.push(UiError::Effect {
								component: run.component.to_string(),
								message,
							});
						}
					}
				}
				QueuedEffect::Async {
					prev_token,
					token,
					future,
				} => {
					if let Some(prev) = prev_token {
						prev.cancel();
					}
					tokio::spawn(async move {
						tokio::select! {
							_ = token.cancelled() => {}
							_ = future => {}
						}
					});
				}
			}
		}
	}
}

fn error_placeholder(component: &str) -> Model {
	let mut model = Model {
		tag_name: "div".to_string(),
		..Model::default()
	};
	model
		.attributes
		.insert("data-render-error".to_string(), Value::String(component.to_string()));
	model
}
