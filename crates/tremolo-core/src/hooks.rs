//! Hook primitives and the per-component life-cycle record.
//!
//! Every mounted component owns one [`LifeCycleHook`]: an ordered sequence of
//! positional state cells plus the effects queued by the current render.
//! Components reach the primitives through the [`RenderContext`] handle
//! passed explicitly into [`Component::render`](crate::component::Component::render);
//! hook state is never looked up through thread-locals or globals.
//!
//! Cells are positional: a component must call the same primitives in the
//! same order on every render. A positional type mismatch panics with a
//! hook-order message, which the reconciler catches and isolates to the
//! offending component.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::context::{Context, ContextMap};
use crate::error::UiError;
use crate::scheduler::ScheduleHandle;

/// A deferred teardown action returned by an effect body.
pub type Cleanup = Box<dyn FnOnce() + Send>;

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Conversion of an effect body's return value into an optional cleanup.
///
/// Lets effect bodies return nothing (`()`) or a cleanup closure without
/// wrapping either in an `Option` by hand.
pub trait IntoCleanup: Sized {
	fn into_cleanup(self) -> Option<Cleanup>;
}

impl IntoCleanup for () {
	fn into_cleanup(self) -> Option<Cleanup> {
		None
	}
}

impl<F: FnOnce() + Send + 'static> IntoCleanup for F {
	fn into_cleanup(self) -> Option<Cleanup> {
		Some(Box::new(self))
	}
}

/// Dependency guard for effects, memos, and callbacks.
///
/// - [`Deps::always`] — re-run on every render
/// - [`Deps::once`] — run on the first render only
/// - [`Deps::on`] — re-run when the carried value changes (`PartialEq`)
pub struct Deps {
	kind: DepsKind,
}

enum DepsKind {
	Always,
	Once,
	On(Box<dyn DepValue>),
}

trait DepValue: Send {
	fn eq_value(&self, other: &dyn Any) -> bool;
	fn as_any(&self) -> &dyn Any;
}

impl<T: PartialEq + Send + 'static> DepValue for T {
	fn eq_value(&self, other: &dyn Any) -> bool {
		other.downcast_ref::<T>().is_some_and(|value| value == self)
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}

impl Deps {
	/// Re-run on every render.
	pub fn always() -> Self {
		Deps { kind: DepsKind::Always }
	}

	/// Run on the first render only.
	pub fn once() -> Self {
		Deps { kind: DepsKind::Once }
	}

	/// Re-run whenever `value` differs from the previous render's value.
	pub fn on<T: PartialEq + Send + 'static>(value: T) -> Self {
		Deps {
			kind: DepsKind::On(Box::new(value)),
		}
	}

	/// True when this render's deps require a re-run relative to `previous`.
	fn changed_from(&self, previous: &Deps) -> bool {
		match (&self.kind, &previous.kind) {
			(DepsKind::Once, DepsKind::Once) => false,
			(DepsKind::On(new), DepsKind::On(old)) => !old.eq_value(new.as_any()),
			_ => true,
		}
	}
}

impl fmt::Debug for Deps {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.kind {
			DepsKind::Always => write!(f, "Deps::Always"),
			DepsKind::Once => write!(f, "Deps::Once"),
			DepsKind::On(_) => write!(f, "Deps::On(..)"),
		}
	}
}

/// Setter half of [`RenderContext::use_state`].
///
/// Identity-stable across renders of the same mounted component: the same
/// setter instance is returned every render, so it can be captured in
/// handler closures and dependency values. Setting a value equal to the
/// current one schedules nothing.
pub struct SetState<T> {
	shared: Arc<Mutex<T>>,
	schedule: ScheduleHandle,
}

impl<T: PartialEq + Send + 'static> SetState<T> {
	/// Replaces the value, scheduling a re-render unless unchanged.
	pub fn set(&self, value: T) {
		let mut guard = self.shared.lock();
		if *guard == value {
			return;
		}
		*guard = value;
		drop(guard);
		self.schedule.trigger();
	}

	/// Computes the next value from the current one.
	pub fn update(&self, f: impl FnOnce(&T) -> T) {
		let mut guard = self.shared.lock();
		let next = f(&guard);
		if *guard == next {
			return;
		}
		*guard = next;
		drop(guard);
		self.schedule.trigger();
	}
}

impl<T> Clone for SetState<T> {
	fn clone(&self) -> Self {
		Self {
			shared: Arc::clone(&self.shared),
			schedule: self.schedule.clone(),
		}
	}
}

impl<T> fmt::Debug for SetState<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SetState")
			.field("slot", &self.schedule.slot())
			.finish()
	}
}

/// Action dispatcher returned by [`RenderContext::use_reducer`].
pub struct Dispatch<A> {
	inner: Arc<dyn Fn(A) + Send + Sync>,
}

impl<A> Dispatch<A> {
	/// Applies the reducer to the current state with `action`.
	pub fn dispatch(&self, action: A) {
		(self.inner)(action);
	}
}

impl<A> Clone for Dispatch<A> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<A> fmt::Debug for Dispatch<A> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("Dispatch")
	}
}

/// A persistent mutable cell whose mutation never schedules a render.
pub struct RefHandle<T> {
	inner: Arc<Mutex<T>>,
}

impl<T: Send + 'static> RefHandle<T> {
	/// A clone of the current value.
	pub fn get(&self) -> T
	where
		T: Clone,
	{
		self.inner.lock().clone()
	}

	/// Replaces the value.
	pub fn set(&self, value: T) {
		*self.inner.lock() = value;
	}

	/// Runs `f` with mutable access to the value.
	pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
		f(&mut self.inner.lock())
	}
}

impl<T> Clone for RefHandle<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T: fmt::Debug> fmt::Debug for RefHandle<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("RefHandle").field(&*self.inner.lock()).finish()
	}
}

/// A cloneable, shareable function handle.
///
/// Returned by [`RenderContext::use_callback`] so children receive the same
/// handle across renders while the dependencies are unchanged. Equality is
/// handle identity, not behavior.
pub struct Callback<Args = (), Ret = ()> {
	func: Arc<dyn Fn(Args) -> Ret + Send + Sync>,
}

impl<Args, Ret> Callback<Args, Ret> {
	/// Wraps a function.
	pub fn new<F>(func: F) -> Self
	where
		F: Fn(Args) -> Ret + Send + Sync + 'static,
	{
		Self {
			func: Arc::new(func),
		}
	}

	/// Invokes the callback.
	pub fn emit(&self, args: Args) -> Ret {
		(self.func)(args)
	}
}

impl<Args, Ret> Clone for Callback<Args, Ret> {
	fn clone(&self) -> Self {
		Self {
			func: Arc::clone(&self.func),
		}
	}
}

impl<Args, Ret> PartialEq for Callback<Args, Ret> {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.func, &other.func)
	}
}

impl<Args, Ret> fmt::Debug for Callback<Args, Ret> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("Callback")
	}
}

// Positional cell payloads. Each is a concrete type so unmount can probe
// cells for cleanup state without knowing the hook sequence.

struct StateCell<T> {
	shared: Arc<Mutex<T>>,
	setter: SetState<T>,
}

struct ReducerCell<T, A> {
	shared: Arc<Mutex<T>>,
	dispatch: Dispatch<A>,
}

#[derive(Default)]
struct EffectCell {
	deps: Option<Deps>,
	cleanup: Option<Cleanup>,
}

struct AsyncEffectCell {
	deps: Option<Deps>,
	token: Option<CancellationToken>,
}

struct MemoCell<T> {
	deps: Option<Deps>,
	value: Option<T>,
}

/// An effect queued during a render, run after the whole touched subtree
/// has finished serializing.
pub(crate) enum QueuedEffect {
	Sync {
		/// Cell index the returned cleanup is stored back into
		cell: usize,
		/// Previous instance's cleanup; runs strictly before `body`
		prev_cleanup: Option<Cleanup>,
		body: Box<dyn FnOnce() -> Option<Cleanup> + Send>,
	},
	Async {
		/// Token of the previous in-flight task; cancelled before spawning
		prev_token: Option<CancellationToken>,
		/// Token handed to the new task
		token: CancellationToken,
		future: BoxFuture,
	},
}

/// Per-mounted-component state cells and pending effects.
pub(crate) struct LifeCycleHook {
	cells: Vec<Box<dyn Any + Send>>,
	cursor: usize,
	schedule: ScheduleHandle,
	queued: Vec<QueuedEffect>,
	cancel_root: CancellationToken,
}

impl LifeCycleHook {
	pub(crate) fn new(schedule: ScheduleHandle) -> Self {
		Self {
			cells: Vec::new(),
			cursor: 0,
			schedule,
			queued: Vec::new(),
			cancel_root: CancellationToken::new(),
		}
	}

	/// Resets the cell cursor; call at the start of each render.
	pub(crate) fn begin_render(&mut self) {
		self.cursor = 0;
	}

	fn schedule_handle(&self) -> ScheduleHandle {
		self.schedule.clone()
	}

	/// Returns the cell at the current cursor position, installing it with
	/// `init` on first use. Panics on a positional type mismatch.
	fn cell_with_index<T: Send + 'static>(
		&mut self,
		init: impl FnOnce() -> T,
	) -> (usize, &mut T) {
		let index = self.cursor;
		self.cursor += 1;
		if index == self.cells.len() {
			self.cells.push(Box::new(init()));
		}
		let cell = self.cells[index].downcast_mut::<T>().unwrap_or_else(|| {
			panic!(
				"hook order violated: cell {index} holds a different hook type (expected {})",
				std::any::type_name::<T>()
			)
		});
		(index, cell)
	}

	fn queue_effect(&mut self, effect: QueuedEffect) {
		self.queued.push(effect);
	}

	/// Drains the effects queued by the current render.
	pub(crate) fn take_effects(&mut self) -> Vec<QueuedEffect> {
		std::mem::take(&mut self.queued)
	}

	/// Stores an effect body's returned cleanup back into its cell.
	pub(crate) fn store_cleanup(&mut self, cell: usize, cleanup: Option<Cleanup>) {
		let effect_cell = self
			.cells
			.get_mut(cell)
			.and_then(|slot| slot.downcast_mut::<EffectCell>());
		if let Some(effect_cell) = effect_cell {
			effect_cell.cleanup = cleanup;
		}
	}

	/// Tears the hook down: cancels in-flight async effects and runs every
	/// live cleanup exactly once, in cell order. Cleanup panics are caught
	/// and reported; remaining cleanups still run.
	pub(crate) fn unmount(&mut self, component: &str) -> Vec<UiError> {
		self.cancel_root.cancel();

		let mut errors = Vec::new();
		for cell in &mut self.cells {
			let Some(effect_cell) = cell.downcast_mut::<EffectCell>() else {
				continue;
			};
			let Some(cleanup) = effect_cell.cleanup.take() else {
				continue;
			};
			if let Err(panic) = catch_unwind(AssertUnwindSafe(cleanup)) {
				let message = panic_message(panic);
				tracing::error!(component, error = %message, "unmount cleanup failed");
				errors.push(UiError::Cleanup {
					component: component.to_string(),
					message,
				});
			}
		}
		errors
	}
}

/// Best-effort extraction of a panic payload's message.
pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
	if let Some(message) = panic.downcast_ref::<&str>() {
		(*message).to_string()
	} else if let Some(message) = panic.downcast_ref::<String>() {
		message.clone()
	} else {
		"non-string panic payload".to_string()
	}
}

/// The render-scoped handle to a component's hook state.
///
/// Passed into [`Component::render`](crate::component::Component::render);
/// only exists while that render is active, which makes calling a hook
/// outside a render structurally impossible.
pub struct RenderContext<'a> {
	hook: &'a mut LifeCycleHook,
	contexts: &'a ContextMap,
}

impl<'a> RenderContext<'a> {
	pub(crate) fn new(hook: &'a mut LifeCycleHook, contexts: &'a ContextMap) -> Self {
		Self { hook, contexts }
	}

	/// A persistent state cell.
	///
	/// Returns the current value and an identity-stable setter. Setting a
	/// value equal (`PartialEq`) to the current one schedules nothing;
	/// otherwise the owning component is enqueued for re-render.
	pub fn use_state<T>(&mut self, initial: T) -> (T, SetState<T>)
	where
		T: Clone + PartialEq + Send + 'static,
	{
		self.use_state_with(|| initial)
	}

	/// Like [`use_state`](Self::use_state) with a lazy initializer, invoked
	/// only on the mounting render.
	pub fn use_state_with<T, F>(&mut self, init: F) -> (T, SetState<T>)
	where
		T: Clone + PartialEq + Send + 'static,
		F: FnOnce() -> T,
	{
		let schedule = self.hook.schedule_handle();
		let (_, cell) = self.hook.cell_with_index(move || {
			let shared = Arc::new(Mutex::new(init()));
			StateCell {
				setter: SetState {
					shared: Arc::clone(&shared),
					schedule,
				},
				shared,
			}
		});
		let value = cell.shared.lock().clone();
		(value, cell.setter.clone())
	}

	/// Reducer-style state: dispatching an action folds it into the state
	/// with `reducer`, scheduling a re-render when the result differs.
	pub fn use_reducer<T, A, R>(&mut self, reducer: R, initial: T) -> (T, Dispatch<A>)
	where
		T: Clone + PartialEq + Send + 'static,
		A: 'static,
		R: Fn(&T, A) -> T + Send + Sync + 'static,
	{
		let schedule = self.hook.schedule_handle();
		let (_, cell) = self.hook.cell_with_index(move || {
			let shared = Arc::new(Mutex::new(initial));
			let state = Arc::clone(&shared);
			let dispatch = Dispatch {
				inner: Arc::new(move |action: A| {
					let mut guard = state.lock();
					let next = reducer(&guard, action);
					if *guard != next {
						*guard = next;
						drop(guard);
						schedule.trigger();
					}
				}),
			};
			ReducerCell { shared, dispatch }
		});
		let value = cell.shared.lock().clone();
		(value, cell.dispatch.clone())
	}

	/// A did-render effect.
	///
	/// `body` runs after the whole touched subtree has finished rendering,
	/// when `deps` changed. The previous instance's cleanup (if it returned
	/// one) runs strictly before the new body; the latest cleanup runs
	/// exactly once on unmount.
	pub fn use_effect<F, C>(&mut self, deps: Deps, body: F)
	where
		F: FnOnce() -> C + Send + 'static,
		C: IntoCleanup,
	{
		let (index, prev_cleanup, changed) = {
			let (index, cell) = self.hook.cell_with_index(EffectCell::default);
			let changed = cell
				.deps
				.as_ref()
				.is_none_or(|prev| deps.changed_from(prev));
			if changed {
				cell.deps = Some(deps);
				(index, cell.cleanup.take(), true)
			} else {
				(index, None, false)
			}
		};
		if changed {
			self.hook.queue_effect(QueuedEffect::Sync {
				cell: index,
				prev_cleanup,
				body: Box::new(move || body().into_cleanup()),
			});
		}
	}

	/// An asynchronous did-render effect.
	///
	/// `body` receives a cancellation token and returns the task future.
	/// The task is spawned detached after the render; re-running the effect
	/// or unmounting the component cancels the token and drops the task, so
	/// cancellation is observable inside the future.
	pub fn use_async_effect<F, Fut>(&mut self, deps: Deps, body: F)
	where
		F: FnOnce(CancellationToken) -> Fut,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let root = self.hook.cancel_root.clone();
		let replaced = {
			let (_, cell) = self.hook.cell_with_index(|| AsyncEffectCell {
				deps: None,
				token: None,
			});
			let changed = cell
				.deps
				.as_ref()
				.is_none_or(|prev| deps.changed_from(prev));
			if changed {
				cell.deps = Some(deps);
				let prev_token = cell.token.take();
				let token = root.child_token();
				cell.token = Some(token.clone());
				Some((prev_token, token))
			} else {
				None
			}
		};
		if let Some((prev_token, token)) = replaced {
			let future = Box::pin(body(token.clone()));
			self.hook.queue_effect(QueuedEffect::Async {
				prev_token,
				token,
				future,
			});
		}
	}

	/// A memoized value, recomputed when `deps` changed.
	pub fn use_memo<T, F>(&mut self, deps: Deps, compute: F) -> T
	where
		T: Clone + Send + 'static,
		F: FnOnce() -> T,
	{
		let (_, cell) = self.hook.cell_with_index(|| MemoCell::<T> {
			deps: None,
			value: None,
		});
		let changed = cell
			.deps
			.as_ref()
			.is_none_or(|prev| deps.changed_from(prev));
		if changed {
			cell.deps = Some(deps);
			cell.value = Some(compute());
		}
		cell.value
			.clone()
			.unwrap_or_else(|| unreachable!("memo cell is filled before read"))
	}

	/// A memoized [`Callback`] handle, identity-stable while `deps` are
	/// unchanged.
	pub fn use_callback<Args, Ret, F>(&mut self, deps: Deps, func: F) -> Callback<Args, Ret>
	where
		Args: 'static,
		Ret: 'static,
		F: Fn(Args) -> Ret + Send + Sync + 'static,
	{
		self.use_memo(deps, move || Callback::new(func))
	}

	/// A persistent mutable cell; mutation never schedules a render.
	pub fn use_ref<T, F>(&mut self, init: F) -> RefHandle<T>
	where
		T: Send + 'static,
		F: FnOnce() -> T,
	{
		let (_, cell) = self.hook.cell_with_index(|| RefHandle {
			inner: Arc::new(Mutex::new(init())),
		});
		cell.clone()
	}

	/// The innermost provided value for `context`, or its default.
	pub fn use_context<T: Send + Sync + 'static>(&mut self, context: &Context<T>) -> Arc<T> {
		self.contexts.get(context)
	}
}
