//! End-to-end reconciler behavior through the public API.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tremolo_core::{
	Component, ComponentInstance, Context, ContextProvider, Deps, Layout, LayoutEvent, Model,
	ModelChild, RenderContext, View, elem,
};

async fn next_update(layout: &mut Layout) -> tremolo_core::LayoutUpdate {
	tokio::time::timeout(Duration::from_secs(1), layout.render())
		.await
		.expect("a render should be pending")
}

struct Counter;

impl Component for Counter {
	fn render(&self, ctx: &mut RenderContext<'_>) -> View {
		let (count, set_count) = ctx.use_state(0i64);
		elem("button")
			.attr("data-count", count)
			.on("click", move |_| set_count.update(|n| n + 1))
			.into()
	}
}

#[tokio::test]
async fn test_three_clicks_yield_counts_one_two_three() {
	// Arrange
	let mut layout = Layout::new(ComponentInstance::new(Counter));
	let first = next_update(&mut layout).await;
	let target = first.model.event_handlers["click"].target.clone();
	assert_eq!(first.model.attributes["data-count"], json!(0));

	// Act / Assert
	for expected in 1..=3i64 {
		layout.deliver_event(LayoutEvent {
			target: target.clone(),
			data: vec![],
		});
		let update = next_update(&mut layout).await;
		assert_eq!(update.model.attributes["data-count"], json!(expected));
	}
}

#[tokio::test]
async fn test_setting_an_equal_value_schedules_nothing() {
	// Arrange: the handler always sets the same constant.
	struct Pinned;

	impl Component for Pinned {
		fn render(&self, ctx: &mut RenderContext<'_>) -> View {
			let (value, set_value) = ctx.use_state(0i64);
			elem("div")
				.attr("value", value)
				.on("pin", move |_| set_value.set(5))
				.into()
		}
	}

	let mut layout = Layout::new(ComponentInstance::new(Pinned));
	next_update(&mut layout).await;

	// Act: first pin changes 0 -> 5 and renders.
	layout.deliver_event(LayoutEvent {
		target: "@pin".to_string(),
		data: vec![],
	});
	let update = next_update(&mut layout).await;
	assert_eq!(update.model.attributes["value"], json!(5));

	// Second pin is a no-op: no render may arrive.
	layout.deliver_event(LayoutEvent {
		target: "@pin".to_string(),
		data: vec![],
	});
	let outcome = tokio::time::timeout(Duration::from_millis(100), layout.render()).await;

	// Assert
	assert!(outcome.is_err(), "equal-value set must not schedule a render");
}

struct Item {
	start: i64,
}

impl Component for Item {
	fn render(&self, ctx: &mut RenderContext<'_>) -> View {
		let (n, set_n) = ctx.use_state_with(|| self.start);
		elem("span")
			.attr("value", n)
			.on("bump", move |_| set_n.update(|n| n + 1))
			.into()
	}
}

#[tokio::test]
async fn test_key_change_resets_component_state() {
	// Arrange: the item's key follows the parent's state.
	struct KeySwitcher;

	impl Component for KeySwitcher {
		fn render(&self, ctx: &mut RenderContext<'_>) -> View {
			let (generation, set_generation) = ctx.use_state(0i64);
			elem("div")
				.on("switch", move |_| set_generation.update(|g| g + 1))
				.child(ComponentInstance::keyed(Item { start: 0 }, generation))
				.into()
		}
	}

	let mut layout = Layout::new(ComponentInstance::new(KeySwitcher));
	next_update(&mut layout).await;

	// Act: bump the item, then switch its key. The bump re-renders only
	// the item, so the update addresses its subtree directly.
	layout.deliver_event(LayoutEvent {
		target: "/0@bump".to_string(),
		data: vec![],
	});
	let bumped = next_update(&mut layout).await;
	assert_eq!(bumped.path, "/0");
	assert_eq!(bumped.model.attributes["value"], json!(1));

	layout.deliver_event(LayoutEvent {
		target: "@switch".to_string(),
		data: vec![],
	});
	let switched = next_update(&mut layout).await;

	// Assert: a new key mounts fresh state.
	let ModelChild::Element(item) = &switched.model.children[0] else {
		panic!("expected the item element");
	};
	assert_eq!(item.attributes["value"], json!(0));
}

#[tokio::test]
async fn test_same_key_across_renders_preserves_state() {
	// Arrange: the parent re-renders but the item keeps its key.
	struct StableParent;

	impl Component for StableParent {
		fn render(&self, ctx: &mut RenderContext<'_>) -> View {
			let (_, set_tick) = ctx.use_state(0i64);
			elem("div")
				.on("tick", move |_| set_tick.update(|t| t + 1))
				.child(ComponentInstance::keyed(Item { start: 7 }, "stable"))
				.into()
		}
	}

	let mut layout = Layout::new(ComponentInstance::new(StableParent));
	next_update(&mut layout).await;

	layout.deliver_event(LayoutEvent {
		target: "/0@bump".to_string(),
		data: vec![],
	});
	next_update(&mut layout).await;

	// Act: an unrelated parent re-render.
	layout.deliver_event(LayoutEvent {
		target: "@tick".to_string(),
		data: vec![],
	});
	let update = next_update(&mut layout).await;

	// Assert: the bumped value survived.
	let ModelChild::Element(item) = &update.model.children[0] else {
		panic!("expected the item element");
	};
	assert_eq!(item.attributes["value"], json!(8));
}

#[tokio::test]
async fn test_keyed_swap_keeps_advertised_handlers_live() {
	// Arrange: two keyed items that swap positions.
	struct Swapper;

	impl Component for Swapper {
		fn render(&self, ctx: &mut RenderContext<'_>) -> View {
			let (flipped, set_flipped) = ctx.use_state(false);
			let mut items = vec![
				ComponentInstance::keyed(Item { start: 10 }, "a"),
				ComponentInstance::keyed(Item { start: 20 }, "b"),
			];
			if flipped {
				items.reverse();
			}
			elem("ul")
				.on("flip", move |_| set_flipped.set(true))
				.children(items)
				.into()
		}
	}

	let mut layout = Layout::new(ComponentInstance::new(Swapper));
	next_update(&mut layout).await;

	layout.deliver_event(LayoutEvent {
		target: "@flip".to_string(),
		data: vec![],
	});
	let flipped = next_update(&mut layout).await;
	let ModelChild::Element(front) = &flipped.model.children[0] else {
		panic!("expected the front item");
	};
	assert_eq!(front.attributes["value"], json!(20));
	let target = front.event_handlers["bump"].target.clone();
	assert_eq!(target, "/0@bump");

	// Act: dispatch to the handler the fresh model advertises.
	layout.deliver_event(LayoutEvent {
		target,
		data: vec![],
	});
	let update = next_update(&mut layout).await;

	// Assert: the item now in front received the bump.
	assert_eq!(update.path, "/0");
	assert_eq!(update.model.attributes["value"], json!(21));
}

#[tokio::test]
async fn test_type_switch_keeps_replacement_handler_live() {
	// Arrange: the child component type changes at a fixed position.
	struct AltCounter;

	impl Component for AltCounter {
		fn render(&self, ctx: &mut RenderContext<'_>) -> View {
			let (n, set_n) = ctx.use_state(0i64);
			elem("button")
				.attr("data-alt", n)
				.on("click", move |_| set_n.update(|n| n + 1))
				.into()
		}
	}

	struct TypeSwitcher;

	impl Component for TypeSwitcher {
		fn render(&self, ctx: &mut RenderContext<'_>) -> View {
			let (switched, set_switched) = ctx.use_state(false);
			let child = if switched {
				ComponentInstance::new(AltCounter)
			} else {
				ComponentInstance::new(Counter)
			};
			elem("div")
				.on("swap", move |_| set_switched.set(true))
				.child(child)
				.into()
		}
	}

	let mut layout = Layout::new(ComponentInstance::new(TypeSwitcher));
	next_update(&mut layout).await;

	layout.deliver_event(LayoutEvent {
		target: "@swap".to_string(),
		data: vec![],
	});
	let swapped = next_update(&mut layout).await;
	let ModelChild::Element(button) = &swapped.model.children[0] else {
		panic!("expected the replacement's element");
	};
	assert_eq!(button.attributes["data-alt"], json!(0));
	let target = button.event_handlers["click"].target.clone();

	// Act: dispatch to the handler the fresh model advertises; the
	// replaced child's unmount must only release its own claim on the id.
	layout.deliver_event(LayoutEvent {
		target,
		data: vec![],
	});
	let update = next_update(&mut layout).await;

	// Assert
	assert_eq!(update.path, "/0");
	assert_eq!(update.model.attributes["data-alt"], json!(1));
}

struct CleanupProbe {
	name: &'static str,
	log: Arc<Mutex<Vec<&'static str>>>,
	child: Option<ComponentInstance>,
}

impl Component for CleanupProbe {
	fn render(&self, ctx: &mut RenderContext<'_>) -> View {
		let log = Arc::clone(&self.log);
		let name = self.name;
		ctx.use_effect(Deps::once(), move || move || log.lock().push(name));
		let mut node = elem("div").attr("name", self.name);
		if let Some(child) = &self.child {
			node = node.child(child.clone());
		}
		node.into()
	}
}

#[tokio::test]
async fn test_teardown_runs_every_cleanup_once_deepest_first() {
	// Arrange: a three-deep chain of components with unmount cleanups.
	let log = Arc::new(Mutex::new(Vec::new()));
	let grandchild = ComponentInstance::new(CleanupProbe {
		name: "grandchild",
		log: Arc::clone(&log),
		child: None,
	});
	let child = ComponentInstance::new(CleanupProbe {
		name: "child",
		log: Arc::clone(&log),
		child: Some(grandchild),
	});
	let root = ComponentInstance::new(CleanupProbe {
		name: "root",
		log: Arc::clone(&log),
		child: Some(child),
	});

	let mut layout = Layout::new(root);
	next_update(&mut layout).await;
	assert!(log.lock().is_empty());

	// Act
	layout.teardown();
	layout.teardown();

	// Assert: every cleanup ran exactly once, children before parents.
	assert_eq!(*log.lock(), vec!["grandchild", "child", "root"]);
}

#[tokio::test]
async fn test_dispatch_after_teardown_is_a_noop() {
	// Arrange
	let mut layout = Layout::new(ComponentInstance::new(Counter));
	let first = next_update(&mut layout).await;
	let target = first.model.event_handlers["click"].target.clone();

	// Act
	layout.teardown();
	layout.deliver_event(LayoutEvent {
		target,
		data: vec![],
	});

	// Assert: nothing is scheduled, nothing renders.
	let outcome = tokio::time::timeout(Duration::from_millis(100), layout.render()).await;
	assert!(outcome.is_err());
	assert!(layout.take_reports().is_empty());
}

struct ThemedLabel {
	theme: Context<String>,
}

impl Component for ThemedLabel {
	fn render(&self, ctx: &mut RenderContext<'_>) -> View {
		let theme = ctx.use_context(&self.theme);
		// Memoized content must not pin the context value.
		let prefix = ctx.use_memo(Deps::once(), || "theme".to_string());
		elem("p")
			.attr("data-theme", format!("{prefix}: {theme}"))
			.into()
	}
}

#[tokio::test]
async fn test_provider_value_change_reaches_memoized_child() {
	// Arrange
	struct ThemedApp {
		theme: Context<String>,
	}

	impl Component for ThemedApp {
		fn render(&self, ctx: &mut RenderContext<'_>) -> View {
			let (value, set_value) = ctx.use_state("light".to_string());
			let provider = ContextProvider::new(&self.theme, value).child(
				ComponentInstance::new(ThemedLabel {
					theme: self.theme.clone(),
				}),
			);
			elem("div")
				.on("darken", move |_| set_value.set("dark".to_string()))
				.child(ComponentInstance::new(provider))
				.into()
		}
	}

	let theme: Context<String> = Context::new("unset".to_string());
	let mut layout = Layout::new(ComponentInstance::new(ThemedApp {
		theme: theme.clone(),
	}));

	let label_attr = |model: &Model| -> String {
		let ModelChild::Element(provider) = &model.children[0] else {
			panic!("expected the provider fragment");
		};
		let ModelChild::Element(label) = &provider.children[0] else {
			panic!("expected the label element");
		};
		label.attributes["data-theme"].as_str().unwrap().to_string()
	};

	let first = next_update(&mut layout).await;
	assert_eq!(label_attr(&first.model), "theme: light");

	// Act
	layout.deliver_event(LayoutEvent {
		target: "@darken".to_string(),
		data: vec![],
	});
	let second = next_update(&mut layout).await;

	// Assert
	assert_eq!(label_attr(&second.model), "theme: dark");
}

#[tokio::test]
async fn test_remount_after_teardown_is_structurally_identical() {
	// Arrange
	struct App;

	impl Component for App {
		fn render(&self, _ctx: &mut RenderContext<'_>) -> View {
			elem("div")
				.child(ComponentInstance::new(Counter))
				.child(ComponentInstance::keyed(Item { start: 3 }, "item"))
				.into()
		}
	}

	let mut first_layout = Layout::new(ComponentInstance::new(App));
	let first = next_update(&mut first_layout).await;

	// Mutate some state so the first session is not pristine.
	first_layout.deliver_event(LayoutEvent {
		target: "/0@click".to_string(),
		data: vec![],
	});
	next_update(&mut first_layout).await;

	// Act
	first_layout.teardown();
	let mut second_layout = Layout::new(ComponentInstance::new(App));
	let second = next_update(&mut second_layout).await;

	// Assert: no state leaks between sessions.
	assert_eq!(second.model, first.model);
	assert_eq!(second.path, first.path);
}
