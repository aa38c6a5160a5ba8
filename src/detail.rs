// On-demand fetches for the detail modals. Each runs outside the tick with
// its own timeout; closing the modal cancels it and the result is never delivered.

use crate::budget::{BudgetExceeded, CallBudget};
use crate::error::{DetailError, ProbeError};
use crate::models::{DetailLimits, InferenceServerInfo, PortMapping, ProcessDetail, ProcessRecord};
use crate::process_repo::ProcessTable;
use crate::triton::{InferenceProber, MODEL_REPOSITORY_ENV};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// An in-flight fetch. Dropping the handle cancels it.
pub struct DetailHandle<T> {
    pub request_id: u64,
    pub pid: u32,
    cancel: CancellationToken,
    rx: oneshot::Receiver<Result<T, DetailError>>,
}

impl<T> DetailHandle<T> {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Non-blocking poll for the render loop. `None` while pending or once cancelled.
    pub fn try_take(&mut self) -> Option<Result<T, DetailError>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(DetailError::Cancelled)),
        }
    }

    pub async fn wait(mut self) -> Result<T, DetailError> {
        if self.cancel.is_cancelled() {
            return Err(DetailError::Cancelled);
        }
        let result = (&mut self.rx).await.map_err(|_| DetailError::Cancelled)?;
        if self.cancel.is_cancelled() {
            return Err(DetailError::Cancelled);
        }
        result
    }
}

impl<T> Drop for DetailHandle<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct DetailService {
    table: Arc<dyn ProcessTable>,
    prober: Option<Arc<InferenceProber>>,
    limits: DetailLimits,
    timeout: Duration,
    next_id: AtomicU64,
}

impl DetailService {
    pub fn new(
        table: Arc<dyn ProcessTable>,
        prober: Option<Arc<InferenceProber>>,
        limits: DetailLimits,
        timeout: Duration,
    ) -> Self {
        Self {
            table,
            prober,
            limits,
            timeout,
            next_id: AtomicU64::new(1),
        }
    }

    /// Gate for the models modal: a marker match, or failing that the model
    /// repository variable in the process environment. Blocks on /proc.
    pub fn is_inference_process(&self, record: &ProcessRecord) -> bool {
        let Some(prober) = &self.prober else {
            return false;
        };
        prober.is_candidate(&record.name, &record.cmdline, record.exe.as_deref())
            || self.table.environ_var(record.pid, MODEL_REPOSITORY_ENV).is_some()
    }

    pub fn process_detail(&self, pid: u32) -> DetailHandle<ProcessDetail> {
        let table = self.table.clone();
        let limits = self.limits;
        self.spawn(pid, "process_detail", move |budget| async move {
            let task = tokio::task::spawn_blocking(move || table.detail(pid, limits));
            match budget.run(task).await {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(e)) => Ok(Err(DetailError::Io(e.to_string()))),
                Err(e) => Err(e),
            }
        })
    }

    pub fn inference(&self, pid: u32, container_ports: Vec<PortMapping>) -> DetailHandle<InferenceServerInfo> {
        let prober = self.prober.clone();
        self.spawn(pid, "inference_detail", move |budget| async move {
            let Some(prober) = prober else {
                return Ok(Err(DetailError::Probe(ProbeError::NoServer)));
            };
            budget
                .run(prober.probe_full(&container_ports, &budget))
                .await
                .map(|r| r.map_err(DetailError::from))
        })
    }

    fn spawn<T, F, Fut>(&self, pid: u32, operation: &'static str, fetch: F) -> DetailHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(CallBudget) -> Fut,
        Fut: std::future::Future<Output = Result<Result<T, DetailError>, BudgetExceeded>> + Send + 'static,
    {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();
        let budget = CallBudget::with_token(self.timeout, cancel.clone());
        let token = cancel.clone();
        let fut = fetch(budget);
        let span = tracing::debug_span!("detail", operation, request_id, pid);

        tokio::spawn(
            async move {
                let result = match fut.await {
                    Ok(result) => result,
                    Err(BudgetExceeded::TimedOut) => Err(DetailError::TimedOut),
                    Err(BudgetExceeded::Cancelled) => {
                        tracing::debug!("fetch cancelled");
                        return;
                    }
                };
                if let Err(e) = &result {
                    tracing::debug!(error = %e, "fetch failed");
                }
                if !token.is_cancelled() {
                    let _ = tx.send(result);
                }
            }
            .instrument(span),
        );

        DetailHandle {
            request_id,
            pid,
            cancel,
            rx,
        }
    }
}
