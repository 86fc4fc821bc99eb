use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

/// Ownership of the supervisor join handle.
///
/// Only one shutdown caller awaits the handle at a time; concurrent callers
/// park on `done` until it reaches `Joined`.
enum JoinSlot {
	Pending(JoinHandle<()>),
	Joining,
	Joined,
}

pub(super) struct WorkerJoinCtrl {
	slot: Mutex<JoinSlot>,
	done: Notify,
}

impl WorkerJoinCtrl {
	pub(super) fn new(handle: JoinHandle<()>) -> Self {
		Self {
			slot: Mutex::new(JoinSlot::Pending(handle)),
			done: Notify::new(),
		}
	}

	/// Waits for the supervisor task to finish.
	pub(super) async fn join(&self) {
		self.join_until(None).await;
	}

	/// Waits at most `timeout`. Returns `true` if the task finished.
	pub(super) async fn join_with_timeout(&self, timeout: Duration) -> bool {
		self.join_until(Some(tokio::time::Instant::now() + timeout)).await
	}

	async fn join_until(&self, deadline: Option<tokio::time::Instant>) -> bool {
		loop {
			let mut handle = {
				let mut slot = self.slot.lock().await;
				match std::mem::replace(&mut *slot, JoinSlot::Joining) {
					JoinSlot::Pending(handle) => handle,
					JoinSlot::Joined => {
						*slot = JoinSlot::Joined;
						return true;
					}
					JoinSlot::Joining => {
						// Another caller leads; register before unlocking so its
						// notify_waiters cannot be missed.
						let notified = self.done.notified();
						drop(slot);
						match deadline {
							Some(deadline) => {
								tokio::select! {
									_ = notified => continue,
									_ = tokio::time::sleep_until(deadline) => return false,
								}
							}
							None => {
								notified.await;
								continue;
							}
						}
					}
				}
			};

			let finished = match deadline {
				Some(deadline) => tokio::select! {
					_ = &mut handle => true,
					_ = tokio::time::sleep_until(deadline) => false,
				},
				None => {
					let _ = (&mut handle).await;
					true
				}
			};

			*self.slot.lock().await = if finished { JoinSlot::Joined } else { JoinSlot::Pending(handle) };
			self.done.notify_waiters();
			return finished;
		}
	}
}
