
use std::sync::Arc;
use std::sync::atomic::{self, AtomicUsize};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;


/// A guard to be held in scope while a task is working.
///
/// Dropping it deregisters the task from the [RuntimeManager].
pub struct RuntimeWorker {
	mgr: RuntimeManager,
	name: &'static str,
	critical: bool,
}

impl std::ops::Drop for RuntimeWorker {
	fn drop(&mut self) {
		self.mgr.drop_worker(self.name, self.critical);
	}
}

struct Inner {
	shutdown: CancellationToken,
	workers: AtomicUsize,
	notify: Notify,
}

/// Coordinates the tower's long-running tasks and their shutdown.
#[derive(Clone)]
pub struct RuntimeManager {
	inner: Arc<Inner>,
}

impl RuntimeManager {
	pub fn new() -> RuntimeManager {
		RuntimeManager {
			inner: Arc::new(Inner {
				shutdown: CancellationToken::new(),
				workers: AtomicUsize::new(0),
				notify: Notify::new(),
			}),
		}
	}

	fn register(&self, name: &'static str, critical: bool) -> RuntimeWorker {
		self.inner.workers.fetch_add(1, atomic::Ordering::SeqCst);
		self.inner.notify.notify_waiters();
		slog!(WorkerStarted, name: name.into(), critical);
		RuntimeWorker { mgr: self.clone(), name, critical }
	}

	/// Register a worker that informs the [RuntimeManager] when it goes out of scope.
	pub fn spawn(&self, name: &'static str) -> RuntimeWorker {
		self.register(name, false)
	}

	/// Register a worker that informs the [RuntimeManager] when it goes out of scope.
	///
	/// When a critical worker ends before shutdown was requested, shutdown is triggered.
	pub fn spawn_critical(&self, name: &'static str) -> RuntimeWorker {
		self.register(name, true)
	}

	fn drop_worker(&self, name: &'static str, critical: bool) {
		let old = self.inner.workers.fetch_sub(1, atomic::Ordering::SeqCst);
		assert_ne!(old, 0);
		if critical && !self.inner.shutdown.is_cancelled() {
			slog!(CriticalWorkerStopped, name: name.into());
			self.shutdown();
		} else {
			slog!(WorkerStopped, name: name.into());
		}
		self.inner.notify.notify_waiters();
	}

	/// Start system shutdown.
	pub fn shutdown(&self) {
		self.inner.shutdown.cancel();
	}

	pub fn is_shutting_down(&self) -> bool {
		self.inner.shutdown.is_cancelled()
	}

	pub fn shutdown_done(&self) -> bool {
		self.inner.workers.load(atomic::Ordering::SeqCst) == 0
	}

	/// Wait for all workers to finish.
	pub async fn wait(&self) {
		loop {
			let notified = self.inner.notify.notified();
			if self.shutdown_done() {
				return;
			}
			notified.await;
		}
	}

	/// Start system shutdown and wait for it to finish.
	pub async fn shutdown_wait(&self) {
		self.shutdown();
		self.wait().await;
	}

	pub fn shutdown_signal(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
		self.inner.shutdown.cancelled()
	}
}
