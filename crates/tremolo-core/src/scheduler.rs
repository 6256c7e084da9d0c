//! The render scheduler: a deduplicating work queue of slots needing a
//! re-render.
//!
//! State setters enqueue their owner's [`SlotId`]; the reconciler drains the
//! queue one slot at a time. Scheduling an already-pending slot is a no-op,
//! so a burst of setter calls between two renders coalesces into exactly one
//! re-render.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Stable identity of one mounted component, issued once per mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u64);

impl SlotId {
	pub(crate) fn new(raw: u64) -> Self {
		SlotId(raw)
	}

	/// The raw id, for diagnostics.
	pub fn as_u64(self) -> u64 {
		self.0
	}
}

impl std::fmt::Display for SlotId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "slot#{}", self.0)
	}
}

#[derive(Debug, Default)]
struct Queue {
	order: VecDeque<SlotId>,
	pending: HashSet<SlotId>,
}

/// Set-backed FIFO of slots awaiting a re-render.
///
/// Clones share the same queue. The single consumer is the reconciler's
/// render stream; producers are setter callbacks running on any task.
#[derive(Debug, Clone, Default)]
pub struct RenderScheduler {
	queue: Arc<Mutex<Queue>>,
	notify: Arc<Notify>,
}

impl RenderScheduler {
	pub fn new() -> Self {
		Self::default()
	}

	/// Enqueues `slot` unless it is already pending.
	pub fn schedule(&self, slot: SlotId) {
		let mut queue = self.queue.lock();
		if queue.pending.insert(slot) {
			queue.order.push_back(slot);
			drop(queue);
			tracing::trace!(%slot, "render scheduled");
			self.notify.notify_one();
		}
	}

	/// Dequeues the next pending slot without waiting.
	pub fn try_next(&self) -> Option<SlotId> {
		let mut queue = self.queue.lock();
		let slot = queue.order.pop_front()?;
		queue.pending.remove(&slot);
		Some(slot)
	}

	/// Waits until a slot is pending and dequeues it.
	///
	/// The notification is armed before the queue is checked, so a schedule
	/// racing with the check is never lost.
	pub async fn next(&self) -> SlotId {
		loop {
			let notified = self.notify.notified();
			tokio::pin!(notified);
			notified.as_mut().enable();

			if let Some(slot) = self.try_next() {
				return slot;
			}
			notified.await;
		}
	}

	/// True when nothing is pending.
	pub fn is_idle(&self) -> bool {
		self.queue.lock().order.is_empty()
	}

	/// A schedule handle bound to `slot`, for setters owned by that slot.
	pub fn handle(&self, slot: SlotId) -> ScheduleHandle {
		ScheduleHandle {
			scheduler: self.clone(),
			slot,
		}
	}
}

/// A cloneable trigger that enqueues one fixed slot.
#[derive(Debug, Clone)]
pub struct ScheduleHandle {
	scheduler: RenderScheduler,
	slot: SlotId,
}

impl ScheduleHandle {
	/// Enqueues the bound slot.
	pub fn trigger(&self) {
		self.scheduler.schedule(self.slot);
	}

	/// The bound slot.
	pub fn slot(&self) -> SlotId {
		self.slot
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[rstest::rstest]
	fn test_schedule_deduplicates_pending_slots() {
		// Arrange
		let scheduler = RenderScheduler::new();

		// Act
		scheduler.schedule(SlotId::new(1));
		scheduler.schedule(SlotId::new(1));
		scheduler.schedule(SlotId::new(2));

		// Assert
		assert_eq!(scheduler.try_next(), Some(SlotId::new(1)));
		assert_eq!(scheduler.try_next(), Some(SlotId::new(2)));
		assert_eq!(scheduler.try_next(), None);
	}

	#[rstest::rstest]
	fn test_drained_slot_can_be_rescheduled() {
		let scheduler = RenderScheduler::new();

		scheduler.schedule(SlotId::new(1));
		assert_eq!(scheduler.try_next(), Some(SlotId::new(1)));

		scheduler.schedule(SlotId::new(1));
		assert_eq!(scheduler.try_next(), Some(SlotId::new(1)));
	}

	#[tokio::test]
	async fn test_next_wakes_on_schedule() {
		// Arrange
		let scheduler = RenderScheduler::new();
		let producer = scheduler.clone();

		// Act
		let waiter = tokio::spawn(async move { scheduler.next().await });
		tokio::task::yield_now().await;
		producer.schedule(SlotId::new(7));

		// Assert
		let slot = tokio::time::timeout(Duration::from_secs(1), waiter)
			.await
			.expect("next() should wake")
			.expect("waiter task should not panic");
		assert_eq!(slot, SlotId::new(7));
	}

	#[tokio::test]
	async fn test_schedule_before_next_is_not_lost() {
		let scheduler = RenderScheduler::new();

		scheduler.schedule(SlotId::new(3));

		let slot = tokio::time::timeout(Duration::from_secs(1), scheduler.next())
			.await
			.expect("pending slot should be returned immediately");
		assert_eq!(slot, SlotId::new(3));
	}

	#[rstest::rstest]
	fn test_handle_triggers_its_bound_slot() {
		let scheduler = RenderScheduler::new();
		let handle = scheduler.handle(SlotId::new(9));

		handle.trigger();
		handle.trigger();

		assert_eq!(scheduler.try_next(), Some(SlotId::new(9)));
		assert!(scheduler.is_idle());
	}
}
