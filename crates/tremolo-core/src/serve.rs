//! The serve protocol: wire messages, the transport seam, and the two-loop
//! session driver.
//!
//! [`serve`] pairs an outgoing loop (await the next render, send the
//! `layout-update`) with an incoming loop (await the next `layout-event`,
//! hand it to the registry, loop immediately) under one `tokio::select!`
//! scope. Either loop ending — a stop signal or the transport closing —
//! cancels the other and tears the layout down before returning.
//!
//! Transports adapt a concrete socket or channel to [`Transport::split`];
//! a [`ChannelTransport`] over tokio mpsc channels ships for embedding and
//! tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::ServeError;
use crate::layout::Layout;
use crate::vdom::Model;

/// A whole-subtree replacement at `path` (`""` is the root, child steps are
/// slash-delimited indices).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LayoutUpdate {
	/// Address of the replaced subtree
	pub path: String,
	/// The new subtree
	pub model: Model,
}

/// A UI event raised by the remote surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutEvent {
	/// Correlation id of the registered handler
	pub target: String,
	/// Event payload, forwarded to the handler's callbacks
	#[serde(default)]
	pub data: Vec<Value>,
}

/// Server half of the optional version handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
	pub version: String,
}

impl ServerInfo {
	/// Info for this build.
	pub fn current() -> Self {
		Self {
			version: env!("CARGO_PKG_VERSION").to_string(),
		}
	}
}

/// Client half of the optional version handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
	pub version: String,
}

/// Every message of the wire protocol, in the reference JSON encoding.
///
/// ```
/// use tremolo_core::serve::{LayoutEvent, WireMessage};
///
/// let msg: WireMessage =
/// 	serde_json::from_str(r#"{"type":"layout-event","target":"/0@click","data":[]}"#).unwrap();
/// assert!(matches!(msg, WireMessage::LayoutEvent(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WireMessage {
	LayoutUpdate(LayoutUpdate),
	LayoutEvent(LayoutEvent),
	ServerInfo(ServerInfo),
	ClientInfo(ClientInfo),
}

/// Outgoing half of a transport.
#[async_trait]
pub trait LayoutSender: Send + 'static {
	/// Sends one update to the remote surface.
	async fn send(&mut self, update: LayoutUpdate) -> Result<(), ServeError>;
}

/// Incoming half of a transport.
#[async_trait]
pub trait LayoutReceiver: Send + 'static {
	/// Waits for the next event from the remote surface.
	///
	/// Returns [`ServeError::Closed`] once the transport is gone, or
	/// [`ServeError::Stop`] to end the session gracefully.
	async fn recv(&mut self) -> Result<LayoutEvent, ServeError>;
}

/// A bidirectional connection to one remote display surface.
pub trait Transport: Send + 'static {
	type Sender: LayoutSender;
	type Receiver: LayoutReceiver;

	/// Splits into independently owned send and receive halves.
	fn split(self) -> (Self::Sender, Self::Receiver);
}

/// In-process transport over tokio mpsc channels.
///
/// The paired [`ChannelRemote`] plays the remote surface: it receives
/// updates and sends events. Dropping the remote closes the transport.
#[derive(Debug)]
pub struct ChannelTransport {
	updates: mpsc::Sender<LayoutUpdate>,
	events: mpsc::Receiver<LayoutEvent>,
}

/// The far end of a [`ChannelTransport`].
#[derive(Debug)]
pub struct ChannelRemote {
	updates: mpsc::Receiver<LayoutUpdate>,
	events: mpsc::Sender<LayoutEvent>,
}

impl ChannelTransport {
	/// A connected transport/remote pair with the given channel capacity.
	pub fn pair(capacity: usize) -> (ChannelTransport, ChannelRemote) {
		let (update_tx, update_rx) = mpsc::channel(capacity);
		let (event_tx, event_rx) = mpsc::channel(capacity);
		(
			ChannelTransport {
				updates: update_tx,
				events: event_rx,
			},
			ChannelRemote {
				updates: update_rx,
				events: event_tx,
			},
		)
	}
}

impl ChannelRemote {
	/// The next update from the server, or `None` once the session ended.
	pub async fn recv_update(&mut self) -> Option<LayoutUpdate> {
		self.updates.recv().await
	}

	/// Sends an event toward the server.
	pub async fn send_event(&self, event: LayoutEvent) -> Result<(), ServeError> {
		self.events
			.send(event)
			.await
			.map_err(|_| ServeError::Closed)
	}
}

/// Sender half of a [`ChannelTransport`].
#[derive(Debug)]
pub struct ChannelSender(mpsc::Sender<LayoutUpdate>);

/// Receiver half of a [`ChannelTransport`].
#[derive(Debug)]
pub struct ChannelReceiver(mpsc::Receiver<LayoutEvent>);

#[async_trait]
impl LayoutSender for ChannelSender {
	async fn send(&mut self, update: LayoutUpdate) -> Result<(), ServeError> {
		self.0.send(update).await.map_err(|_| ServeError::Closed)
	}
}

#[async_trait]
impl LayoutReceiver for ChannelReceiver {
	async fn recv(&mut self) -> Result<LayoutEvent, ServeError> {
		self.0.recv().await.ok_or(ServeError::Closed)
	}
}

impl Transport for ChannelTransport {
	type Sender = ChannelSender;
	type Receiver = ChannelReceiver;

	fn split(self) -> (Self::Sender, Self::Receiver) {
		(ChannelSender(self.updates), ChannelReceiver(self.events))
	}
}

/// Drives one session: renders from `layout` flow out, events flow in,
/// until the transport closes or a stop is signalled. The layout is torn
/// down before returning, so every unmount cleanup runs exactly once.
///
/// `Stop` and a closed transport end the session gracefully (`Ok`); any
/// other transport failure is returned after teardown.
pub async fn serve<T: Transport>(mut layout: Layout, transport: T) -> Result<(), ServeError> {
	let (mut sender, mut receiver) = transport.split();
	let sink = layout.event_sink();
	tracing::debug!("serve session started");

	let outcome = {
		let outgoing = async {
			loop {
				let update = layout.render().await;
				if let Err(error) = sender.send(update).await {
					break error;
				}
			}
		};
		let incoming = async {
			loop {
				match receiver.recv().await {
					Ok(event) => sink.deliver(event),
					Err(error) => break error,
				}
			}
		};
		tokio::select! {
			error = outgoing => error,
			error = incoming => error,
		}
	};

	layout.teardown();
	match outcome {
		ServeError::Stop | ServeError::Closed => {
			tracing::debug!("serve session ended");
			Ok(())
		}
		error => {
			tracing::error!(error = %error, "serve session failed");
			Err(error)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	use rstest::rstest;
	use serde_json::json;

	use crate::component::{Component, ComponentInstance, View};
	use crate::hooks::RenderContext;
	use crate::vdom::elem;

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

	#[rstest]
	fn test_wire_messages_use_kebab_case_tags() {
		// Arrange
		let event = WireMessage::LayoutEvent(LayoutEvent {
			target: "/0@click".to_string(),
			data: vec![json!({"shiftKey": false})],
		});
		let info = WireMessage::ServerInfo(ServerInfo::current());

		// Act / Assert
		let encoded = serde_json::to_value(&event).unwrap();
		assert_eq!(encoded["type"], json!("layout-event"));
		assert_eq!(encoded["target"], json!("/0@click"));

		let encoded = serde_json::to_value(&info).unwrap();
		assert_eq!(encoded["type"], json!("server-info"));
		assert_eq!(encoded["version"], json!(env!("CARGO_PKG_VERSION")));
	}

	#[rstest]
	fn test_layout_event_data_defaults_to_empty() {
		let event: LayoutEvent =
			serde_json::from_str(r#"{"target":"/2@change"}"#).unwrap();

		assert_eq!(event.target, "/2@change");
		assert!(event.data.is_empty());
	}

	#[rstest]
	fn test_update_round_trips_as_wire_message() {
		let update = WireMessage::LayoutUpdate(LayoutUpdate {
			path: "/1".to_string(),
			model: Model {
				tag_name: "p".to_string(),
				..Model::default()
			},
		});

		let encoded = serde_json::to_string(&update).unwrap();
		let decoded: WireMessage = serde_json::from_str(&encoded).unwrap();

		assert_eq!(decoded, update);
	}

	#[tokio::test]
	async fn test_serve_streams_updates_and_routes_events() {
		// Arrange
		let (transport, mut remote) = ChannelTransport::pair(16);
		let layout = Layout::new(ComponentInstance::new(Counter));
		let session = tokio::spawn(serve(layout, transport));

		// Act: first update arrives unprompted (mount render).
		let first = tokio::time::timeout(Duration::from_secs(1), remote.recv_update())
			.await
			.expect("mount render should arrive")
			.expect("session is open");
		assert_eq!(first.model.attributes["data-count"], json!(0));

		let target = first.model.event_handlers["click"].target.clone();
		remote
			.send_event(LayoutEvent {
				target,
				data: vec![],
			})
			.await
			.expect("event should be accepted");

		// Assert: the click produced a fresh render.
		let second = tokio::time::timeout(Duration::from_secs(1), remote.recv_update())
			.await
			.expect("click should re-render")
			.expect("session is open");
		assert_eq!(second.model.attributes["data-count"], json!(1));

		// Closing the remote ends the session gracefully.
		drop(remote);
		let result = tokio::time::timeout(Duration::from_secs(1), session)
			.await
			.expect("session should end after close")
			.expect("serve task should not panic");
		assert!(result.is_ok());
	}

	#[tokio::test]
	async fn test_serve_ends_when_update_side_closes() {
		// Arrange
		let (transport, remote) = ChannelTransport::pair(1);
		let ChannelRemote { updates, events } = remote;
		drop(updates);

		// Act
		let layout = Layout::new(ComponentInstance::new(Counter));
		let result = tokio::time::timeout(Duration::from_secs(1), serve(layout, transport))
			.await
			.expect("session should end when the update channel closes");

		// Assert
		assert!(result.is_ok());
		drop(events);
	}
}
