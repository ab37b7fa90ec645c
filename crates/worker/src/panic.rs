use tokio::task::JoinError;

/// Extracts the panic payload message from a failed join, if it panicked.
pub(crate) fn join_error_panic_message(err: JoinError) -> Option<String> {
	let payload = err.try_into_panic().ok()?;
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		return Some((*msg).to_string());
	}
	if let Some(msg) = payload.downcast_ref::<String>() {
		return Some(msg.clone());
	}
	Some("non-string panic payload".to_string())
}

#[cfg(test)]
#[path = "panic_tests.rs"]
mod tests;
