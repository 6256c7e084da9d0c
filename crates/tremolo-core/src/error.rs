//! Error taxonomy for the reconciliation engine.
//!
//! Failures that originate inside a single component's render or effect are
//! isolated to that component and surfaced as [`UiError`] reports; failures
//! in the serve wiring or the transport are session-fatal and surfaced as
//! [`ServeError`].

use crate::vdom::Key;

/// A structural problem in a [`VdomNode`](crate::vdom::VdomNode).
///
/// Validation failures are reported, never silently coerced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
	/// A fragment (empty tag) carried attributes or event handlers.
	///
	/// Fragments are transparent: they expand into their children and have
	/// no element of their own that attributes could attach to.
	#[error("fragment nodes cannot carry attributes or event handlers")]
	FragmentAttributes,

	/// A leaf tag that requires singular text content had other children.
	#[error("`{tag}` elements allow at most one text child, found {count} children")]
	SingularTextContent {
		/// The offending tag
		tag: String,
		/// Number of children found
		count: usize,
	},
}

/// Component-scoped errors reported during a render pass.
///
/// These never abort the pass: siblings keep rendering, and the offending
/// component degrades to a placeholder where applicable. They are logged via
/// `tracing` and collected on the [`Layout`](crate::layout::Layout) for
/// inspection through [`take_reports`](crate::layout::Layout::take_reports).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UiError {
	/// Two siblings were rendered with the same explicit key.
	///
	/// The duplicate falls back to positional matching; the render continues.
	#[error("duplicate key {key} among siblings at `{path}`")]
	DuplicateKey {
		/// Model path of the offending child
		path: String,
		/// The duplicated key
		key: Key,
	},

	/// A component's render function panicked.
	///
	/// The component's model becomes an error placeholder node so its
	/// siblings still render.
	#[error("render of `{component}` failed: {message}")]
	Render {
		/// Type name of the failing component
		component: String,
		/// Panic message
		message: String,
	},

	/// A hook primitive was invoked while no render was active.
	///
	/// Explicit `RenderContext` passing makes this unreachable from safe
	/// component code; it remains in the taxonomy for engine-internal
	/// assertions.
	#[error("hook called outside of an active render")]
	NoActiveRender,

	/// A did-render effect body panicked. Sibling effects still run.
	#[error("effect of `{component}` failed: {message}")]
	Effect {
		/// Type name of the owning component
		component: String,
		/// Panic message
		message: String,
	},

	/// An effect cleanup panicked. Remaining cleanups still run.
	#[error("effect cleanup of `{component}` failed: {message}")]
	Cleanup {
		/// Type name of the owning component
		component: String,
		/// Panic message
		message: String,
	},

	/// A rendered node failed structural validation.
	#[error("invalid node at `{path}`: {source}")]
	Model {
		/// Model path of the offending node
		path: String,
		/// The structural problem
		#[source]
		source: ModelError,
	},
}

/// Session-level outcomes of [`serve`](crate::serve::serve).
///
/// `Stop` and `Closed` are control signals, not failures: either one ends
/// the serve session gracefully after teardown.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
	/// A handler or transport requested a graceful stop.
	#[error("serve session stopped")]
	Stop,

	/// The transport closed; the session is over.
	#[error("transport closed")]
	Closed,

	/// The transport failed in a way that is fatal to the session.
	#[error("transport failure: {0}")]
	Transport(String),
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_duplicate_key_display_includes_path_and_key() {
		let err = UiError::DuplicateKey {
			path: "/0/1".to_string(),
			key: Key::from("dup"),
		};

		let rendered = err.to_string();
		assert!(rendered.contains("/0/1"));
		assert!(rendered.contains("dup"));
	}

	#[rstest]
	fn test_model_error_is_source_of_ui_error() {
		use std::error::Error;

		let err = UiError::Model {
			path: "/2".to_string(),
			source: ModelError::FragmentAttributes,
		};

		assert!(err.source().is_some());
	}

	#[rstest]
	#[case(ServeError::Stop, "serve session stopped")]
	#[case(ServeError::Closed, "transport closed")]
	fn test_serve_error_display(#[case] err: ServeError, #[case] expected: &str) {
		assert_eq!(err.to_string(), expected);
	}
}
