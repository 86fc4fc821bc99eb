//! Listener registry with disposer guards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use folio_protocol::{CompileFailure, CompileStatus, CompileSuccess};
use parking_lot::Mutex;
use slab::Slab;

/// Observer of compile outcomes.
///
/// Callbacks run on the service task and must not block.
pub trait CompileListener: Send + Sync + 'static {
	fn on_status_change(&self, _status: CompileStatus) {}

	fn on_success(&self, _success: &CompileSuccess) {}

	fn on_error(&self, _failure: &CompileFailure) {}
}

struct Entry {
	seq: u64,
	listener: Arc<dyn CompileListener>,
}

/// Registered listeners, keyed by slab slot.
///
/// Slots are reused after removal, so each entry also carries a registration
/// sequence number; snapshots are ordered by it and guards match on it.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
	entries: Slab<Entry>,
	next_seq: u64,
}

pub(crate) type SharedRegistry = Arc<Mutex<ListenerRegistry>>;

impl ListenerRegistry {
	pub(crate) fn insert(registry: &SharedRegistry, listener: Arc<dyn CompileListener>) -> ListenerGuard {
		let mut guard = registry.lock();
		let seq = guard.next_seq;
		guard.next_seq += 1;
		let key = guard.entries.insert(Entry { seq, listener });
		ListenerGuard {
			registry: Arc::downgrade(registry),
			key,
			seq,
			disposed: AtomicBool::new(false),
		}
	}

	fn remove(&mut self, key: usize, seq: u64) -> bool {
		match self.entries.get(key) {
			Some(entry) if entry.seq == seq => {
				self.entries.remove(key);
				true
			}
			_ => false,
		}
	}

	/// Listeners in registration order.
	pub(crate) fn snapshot(&self) -> Vec<Arc<dyn CompileListener>> {
		let mut entries: Vec<&Entry> = self.entries.iter().map(|(_, entry)| entry).collect();
		entries.sort_unstable_by_key(|entry| entry.seq);
		entries.into_iter().map(|entry| Arc::clone(&entry.listener)).collect()
	}

	#[cfg(test)]
	pub(crate) fn len(&self) -> usize {
		self.entries.len()
	}
}

/// Disposer returned by [`CompileService::add_listener`](crate::CompileService::add_listener).
///
/// Removes exactly its own listener, on [`dispose`](Self::dispose) or drop.
#[must_use = "dropping the guard removes the listener"]
pub struct ListenerGuard {
	registry: Weak<Mutex<ListenerRegistry>>,
	key: usize,
	seq: u64,
	disposed: AtomicBool,
}

impl ListenerGuard {
	/// Removes the listener. Further calls do nothing.
	pub fn dispose(&self) {
		if self.disposed.swap(true, Ordering::AcqRel) {
			return;
		}
		if let Some(registry) = self.registry.upgrade() {
			registry.lock().remove(self.key, self.seq);
		}
	}

	pub fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::Acquire)
	}
}

impl Drop for ListenerGuard {
	fn drop(&mut self) {
		self.dispose();
	}
}

impl std::fmt::Debug for ListenerGuard {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ListenerGuard").field("key", &self.key).field("seq", &self.seq).finish()
	}
}
