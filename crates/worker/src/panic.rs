use tokio::task::JoinError;

/// Extracts the panic message from a join error.
///
/// Returns `None` when the task was cancelled rather than panicked.
pub fn join_error_panic_message(err: JoinError) -> Option<String> {
	let payload = err.try_into_panic().ok()?;
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		return Some((*msg).to_string());
	}
	if let Some(msg) = payload.downcast_ref::<String>() {
		return Some(msg.clone());
	}
	Some("<non-string panic payload>".to_string())
}

#[cfg(test)]
mod tests {
	use super::join_error_panic_message;

	#[tokio::test]
	async fn typed_payload_gets_a_placeholder() {
		let handle = tokio::spawn(async { std::panic::panic_any(404u32) });
		let err = handle.await.unwrap_err();
		assert_eq!(join_error_panic_message(err).as_deref(), Some("<non-string panic payload>"));
	}

	#[tokio::test]
	async fn aborted_task_is_not_a_panic() {
		let handle = tokio::spawn(std::future::pending::<()>());
		handle.abort();
		let err = handle.await.unwrap_err();
		assert_eq!(join_error_panic_message(err), None);
	}
}
