//! The tremolo reconciliation engine.
//!
//! Declarative components render a virtual node tree; the reconciler keeps
//! durable per-component state across renders, diffs component children by
//! type and key, and streams whole-subtree `layout-update` messages to a
//! remote display surface while routing `layout-event` messages back to
//! registered handlers.
//!
//! The flow through the engine:
//!
//! 1. an event arrives over the transport and the [`event`] registry
//!    dispatches it to a handler,
//! 2. the handler calls a state setter from [`hooks`], which enqueues the
//!    owning component on the [`scheduler`],
//! 3. the [`layout`] reconciler pulls the slot, re-renders it, reconciles
//!    children, and emits a [`serve::LayoutUpdate`],
//! 4. the [`serve`] loop forwards the update to the transport.
//!
//! See the `tremolo` facade crate for a runnable quick-start example.

pub mod component;
pub mod context;
pub mod error;
pub mod event;
pub mod hooks;
pub mod layout;
pub mod scheduler;
pub mod serve;
pub mod vdom;

pub use component::{Component, ComponentInstance, View};
pub use context::{Context, ContextId, ContextProvider};
pub use error::{ModelError, ServeError, UiError};
pub use event::EventRegistry;
pub use hooks::{
	Callback, Cleanup, Deps, Dispatch, IntoCleanup, RefHandle, RenderContext, SetState,
};
pub use layout::{EventSink, Layout};
pub use scheduler::{RenderScheduler, ScheduleHandle, SlotId};
pub use serve::{
	ChannelRemote, ChannelTransport, ClientInfo, LayoutEvent, LayoutReceiver, LayoutSender,
	LayoutUpdate, ServerInfo, Transport, WireMessage, serve,
};
pub use vdom::{
	AttrValue, HandlerRef, HandlerSpec, Key, Model, ModelChild, VdomChild, VdomNode, elem,
	fragment,
};
