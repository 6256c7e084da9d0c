//! # Tremolo
//!
//! A server-driven declarative UI runtime for Rust.
//!
//! Tremolo lets a program describe a user interface as a tree of declarative
//! components that re-render in response to state changes, and serves that
//! tree to a remote display surface as a stream of incremental
//! `layout-update` messages. UI events travel back over the same transport
//! as `layout-event` messages and are routed to the handler that registered
//! for them.
//!
//! ## Core Principles
//!
//! - **Explicit hook passing**: every render receives a `RenderContext`
//!   handle; there are no thread-locals or ambient lookups
//! - **Arena ownership**: component state lives in a map owned by the
//!   reconciler, keyed by stable slot ids; unmounting is an explicit,
//!   recursive delete
//! - **Async-First**: built on tokio; event handlers and async effects run
//!   as detached tasks that never block the render stream
//!
//! ## Quick Start
//!
//! ```ignore
//! use tremolo::{elem, serve, Component, ComponentInstance, Layout, RenderContext, View};
//!
//! #[derive(Debug)]
//! struct Counter;
//!
//! impl Component for Counter {
//!     fn render(&self, ctx: &mut RenderContext<'_>) -> View {
//!         let (count, set_count) = ctx.use_state(0i64);
//!         elem("button")
//!             .on("click", move |_| set_count.update(|n| n + 1))
//!             .child(format!("count: {count}"))
//!             .into()
//!     }
//! }
//!
//! # async fn run(transport: impl tremolo::Transport) {
//! let layout = Layout::new(ComponentInstance::new(Counter));
//! serve(layout, transport).await.unwrap();
//! # }
//! ```

pub use tremolo_core::*;
