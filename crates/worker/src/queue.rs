//! Bounded FIFO job queue.
//!
//! Jobs leave the queue in exactly the order they entered it. A full queue
//! applies backpressure to [`JobSender::send`] and rejects
//! [`JobSender::try_send`]; nothing is ever dropped or reordered.

use std::collections::VecDeque;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, Notify};

/// Enqueue error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
	/// Queue is closed.
	#[error("queue closed")]
	Closed,
	/// Queue is at capacity and a non-blocking send was used.
	#[error("queue full")]
	Full,
}

struct QueueState<T> {
	items: VecDeque<T>,
	closed: bool,
}

struct QueueInner<T> {
	capacity: usize,
	state: Mutex<QueueState<T>>,
	notify_recv: Notify,
	notify_send: Notify,
}

/// Multi-producer job sender.
pub struct JobSender<T> {
	inner: Arc<QueueInner<T>>,
}

/// Job receiver. Clones share one queue; each job is received once.
pub struct JobReceiver<T> {
	inner: Arc<QueueInner<T>>,
}

/// Bounded FIFO queue.
pub struct JobQueue<T> {
	inner: Arc<QueueInner<T>>,
}

impl<T> Clone for JobSender<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T> Clone for JobReceiver<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T> JobQueue<T> {
	/// Creates a queue holding at most `capacity` jobs.
	///
	/// # Panics
	///
	/// Panics if `capacity` is zero.
	pub fn new(capacity: usize) -> Self {
		assert!(capacity > 0, "queue capacity must be > 0");
		Self {
			inner: Arc::new(QueueInner {
				capacity,
				state: Mutex::new(QueueState {
					items: VecDeque::with_capacity(capacity),
					closed: false,
				}),
				notify_recv: Notify::new(),
				notify_send: Notify::new(),
			}),
		}
	}

	/// Returns a sender handle.
	pub fn sender(&self) -> JobSender<T> {
		JobSender {
			inner: Arc::clone(&self.inner),
		}
	}

	/// Returns a receiver handle.
	pub fn receiver(&self) -> JobReceiver<T> {
		JobReceiver {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T> QueueInner<T> {
	fn mark_closed(&self, state: &mut QueueState<T>) {
		state.closed = true;
		self.notify_recv.notify_waiters();
		self.notify_send.notify_waiters();
	}
}

impl<T> JobSender<T> {
	/// Closes the queue. Receivers drain queued jobs, then see `None`.
	pub async fn close(&self) {
		let mut state = self.inner.state.lock().await;
		self.inner.mark_closed(&mut state);
	}

	/// Closes the queue without waiting; a no-op if the lock is contended.
	pub fn close_now(&self) {
		if let Ok(mut state) = self.inner.state.try_lock() {
			self.inner.mark_closed(&mut state);
		}
	}

	/// Non-blocking enqueue.
	pub async fn try_send(&self, job: T) -> Result<(), QueueError> {
		let mut state = self.inner.state.lock().await;
		if state.closed {
			return Err(QueueError::Closed);
		}
		if state.items.len() >= self.inner.capacity {
			return Err(QueueError::Full);
		}
		state.items.push_back(job);
		self.inner.notify_recv.notify_one();
		Ok(())
	}

	/// Enqueues, waiting for capacity when full.
	pub async fn send(&self, job: T) -> Result<(), QueueError> {
		loop {
			// Register before checking capacity to avoid a lost wakeup.
			let notified = self.inner.notify_send.notified();

			let mut state = self.inner.state.lock().await;
			if state.closed {
				return Err(QueueError::Closed);
			}
			if state.items.len() < self.inner.capacity {
				state.items.push_back(job);
				self.inner.notify_recv.notify_one();
				return Ok(());
			}
			drop(state);
			notified.await;
		}
	}

	/// Returns the number of queued jobs.
	pub async fn len(&self) -> usize {
		self.inner.state.lock().await.items.len()
	}

	/// Returns queue capacity.
	pub fn capacity(&self) -> usize {
		self.inner.capacity
	}
}

impl<T> JobReceiver<T> {
	/// Receives the oldest job. Returns `None` once closed and drained.
	pub async fn recv(&self) -> Option<T> {
		loop {
			let notified = self.inner.notify_recv.notified();

			let mut state = self.inner.state.lock().await;
			if let Some(job) = state.items.pop_front() {
				drop(state);
				self.inner.notify_send.notify_one();
				return Some(job);
			}
			if state.closed {
				return None;
			}
			drop(state);
			notified.await;
		}
	}

	/// Closes the queue and takes every job still queued, oldest first.
	pub async fn close_and_drain(&self) -> Vec<T> {
		let mut state = self.inner.state.lock().await;
		self.inner.mark_closed(&mut state);
		state.items.drain(..).collect()
	}
}
