use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sql_gate::executor::TransactionExecutor;
use sql_gate::pipeline::{self, Outcome, Prepared};
use sql_gate_core::config::GateConfig;

pub(super) fn io_timeout(config: &GateConfig) -> Duration {
    Duration::from_millis(config.limits.max_io_ms.saturating_add(250))
}

struct CancelState {
    requested: AtomicBool,
    handle: Mutex<Option<super::backend::CancelHandle>>,
}

impl CancelState {
    fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    fn request_cancel(&self) {
        self.requested.store(true, Ordering::Release);
        if let Ok(guard) = self.handle.try_lock()
            && let Some(handle) = guard.as_ref()
        {
            handle.cancel();
        }
    }

    fn set_handle(&self, handle: super::backend::CancelHandle) {
        if let Ok(mut guard) = self.handle.lock() {
            let should_cancel = self.requested.load(Ordering::Acquire);
            *guard = Some(handle);
            if should_cancel && let Some(handle) = guard.as_ref() {
                handle.cancel();
            }
        }
    }
}

async fn run_blocking<T>(
    timeout: Option<Duration>,
    cancel: Option<Arc<CancelState>>,
    f: impl FnOnce() -> sql_gate::Result<T> + Send + 'static,
) -> Result<T, super::ErrorResponse>
where
    T: Send + 'static,
{
    let mut handle = tokio::task::spawn_blocking(f);
    let join = if let Some(timeout) = timeout {
        let sleep = tokio::time::sleep(timeout);
        tokio::pin!(sleep);
        tokio::select! {
            res = &mut handle => res,
            _ = &mut sleep => {
                if let Some(cancel) = cancel {
                    cancel.request_cancel();
                }
                handle.abort();
                let timeout_ms = timeout.as_millis() as u64;
                tracing::warn!(timeout_ms, "sql-gate statement timed out");
                return Err(super::map_err(sql_gate::Error::Timeout(format!("statement exceeded {timeout_ms}ms"))));
            }
        }
    } else {
        handle.await
    };

    let result = join.map_err(|err| super::map_err(sql_gate::Error::Db(err.to_string())))?;
    result.map_err(super::map_err)
}

/// Check out a connection and run an already classified statement on the blocking pool.
pub(super) async fn run_statement(
    state: super::AppState,
    permit: tokio::sync::OwnedSemaphorePermit,
    prepared: Prepared,
) -> Result<Outcome, super::ErrorResponse> {
    let _permit = permit;
    let backend = state.inner.backend.clone();
    let fetch_batch_size = state.inner.config.limits.fetch_batch_size;
    let timeout = Some(io_timeout(&state.inner.config));

    let cancel = Arc::new(CancelState::new());
    let cancel_for_worker = cancel.clone();

    run_blocking(timeout, Some(cancel), move || -> sql_gate::Result<Outcome> {
        let (store, cancel_handle) = super::backend::BackendStore::open(backend)?;
        if let Some(cancel_handle) = cancel_handle {
            cancel_for_worker.set_handle(cancel_handle);
        }
        let mut executor = TransactionExecutor::new(store, fetch_batch_size);
        Ok(pipeline::execute(&prepared, &mut executor))
    })
    .await
}
