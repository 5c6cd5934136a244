// Pinned Thread Orchestrator

/*
 * ALPHA SOVEREIGN - PINNED THREAD HANDLE
 * =================================================================
 * Component Name: src/thread/mod.rs
 * Core Responsibility: تشغيل خيط نظام مخصص مثبت على أنوية محددة، مع إقلاع محدود بمهلة وتخلص مُتحقق منه (Performance Pillar).
 * Design Pattern: Aggregate Root / Handle-Body
 * Forensic Impact: كل مقبض يحمل وسماً فريداً (pt-xxxxxxxx) يظهر في اسم الخيط وفي كل سطر سجل.
 * =================================================================
 */

use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::utils::Backoff;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::affinity::{Affinity, AffinityController};
use crate::error::{ErrorKind, ThreadError, ThreadResult};
use crate::hardware::{self, AffinityBackend, Tid};
use crate::lifecycle::{BootstrapCoordinator, CancellationSignal, DisposeCoordinator, Participant};
use crate::utils::config_loader::PinningConfig;

mod proxy;
mod worker;

pub use proxy::ThreadHandleProxy;
use worker::WorkerRun;

/// المرحلة القابلة للملاحظة لمقبض الخيط.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Idle = 0,
    Starting = 1,
    Bootstrapping = 2,
    Running = 3,
    Completed = 4,
    Cancelled = 5,
    Faulted = 6,
    Disposed = 7,
}

impl Phase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Phase::Idle,
            1 => Phase::Starting,
            2 => Phase::Bootstrapping,
            3 => Phase::Running,
            4 => Phase::Completed,
            5 => Phase::Cancelled,
            6 => Phase::Faulted,
            _ => Phase::Disposed,
        }
    }
}

struct WorkerSlot {
    handle: JoinHandle<ThreadResult<()>>,
    run_signal: CancellationSignal,
}

/// الحالة المشتركة بين المقبض والخيط العامل ومهام start_async.
pub(crate) struct Shared {
    pub(crate) label: String,
    timeout: Duration,
    pub(crate) controller: Arc<AffinityController>,
    dispose: Arc<DisposeCoordinator>,
    signal: CancellationSignal,
    worker: Mutex<Option<WorkerSlot>>,
    phase: AtomicU8,
}

impl Shared {
    pub(crate) fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    fn checkpoint(&self) -> ThreadResult<()> {
        if self.dispose.is_disposing() {
            return Err(ThreadError::disposing());
        }
        self.signal.check()
    }

    /// قلب start: يُستدعى والمشارك START مسجل مسبقاً.
    fn launch<S, F>(self: &Arc<Self>, state: S, callback: F) -> ThreadResult<()>
    where
        S: Send + 'static,
        F: FnOnce(S, ThreadHandleProxy, CancellationSignal) -> anyhow::Result<()> + Send + 'static,
    {
        self.checkpoint()?;

        // الرفض قبل إنشاء أي خيط
        let requested = self.controller.get_affinity();
        requested.mask().validate()?;

        let mut slot = self.worker.lock();
        if let Some(current) = slot.as_ref() {
            if !current.handle.is_finished() {
                return Err(ThreadError::new(
                    ErrorKind::AlreadyRunning,
                    format!("label={} worker is still alive", self.label),
                ));
            }
        }
        if let Some(previous) = slot.take() {
            reap(&self.label, previous);
        }

        self.set_phase(Phase::Starting);
        let run_signal = self.signal.child();
        let bootstrap = Arc::new(BootstrapCoordinator::new());
        bootstrap.begin();

        let run = WorkerRun {
            shared: Arc::clone(self),
            bootstrap: Arc::clone(&bootstrap),
            signal: run_signal.clone(),
            exit: self.dispose.enter(Participant::WORKER)?,
        };

        self.set_phase(Phase::Bootstrapping);
        let spawned = thread::Builder::new()
            .name(self.label.clone())
            .spawn(move || run.execute(state, callback));

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                let err = ThreadError::new(ErrorKind::ThreadSpawn, format!("label={} {}", self.label, e));
                bootstrap.fail(err.clone());
                self.set_phase(Phase::Faulted);
                warn!("PINNED_THREAD: [{}] OS refused to spawn worker: {}", self.label, e);
                return Err(err);
            }
        };

        *slot = Some(WorkerSlot { handle, run_signal: run_signal.clone() });
        drop(slot);

        debug!("PINNED_THREAD: [{}] worker spawned, awaiting bootstrap ({:?})", self.label, self.timeout);

        let outcome = bootstrap.await_outcome(self.timeout, &run_signal, || {
            if self.dispose.is_disposing() {
                Some(ThreadError::disposing())
            } else if run_signal.is_cancelled() {
                Some(ThreadError::cancelled())
            } else {
                None
            }
        });

        match &outcome {
            Ok(()) => info!(
                label = %self.label,
                tid = self.controller.get_tid(),
                "PINNED_THREAD: bootstrapped"
            ),
            Err(err) if err.is_cooperative_exit() => {
                debug!("PINNED_THREAD: [{}] start interrupted: {}", self.label, err)
            }
            Err(err) => warn!("PINNED_THREAD: [{}] start failed: {}", self.label, err),
        }
        outcome
    }
}

/// تجميع خيط منتهٍ قبل تشغيل جديد. نتيجته تُسجل فقط.
fn reap(label: &str, finished: WorkerSlot) {
    match join_outcome(finished.handle) {
        Ok(()) => debug!("PINNED_THREAD: [{}] reaped previous worker", label),
        Err(err) => debug!("PINNED_THREAD: [{}] reaped previous worker ({})", label, err),
    }
}

fn join_outcome(handle: JoinHandle<ThreadResult<()>>) -> ThreadResult<()> {
    handle.join().unwrap_or_else(|_| {
        Err(ThreadError::new(ErrorKind::ThreadRuntime, "worker thread panicked outside the callback"))
    })
}

/// مقبض خيط مثبت. `S` هي الحالة التي تُسلم للـ callback في كل تشغيل.
pub struct PinnedThread<S> {
    shared: Arc<Shared>,
    _state: PhantomData<fn(S)>,
}

impl<S> PinnedThread<S> {
    /// مقبض على الطبقة الأصلية الافتراضية لهذه المنصة.
    pub fn new(affinity: Affinity, timeout: Duration, parent: Option<&CancellationSignal>) -> Self {
        Self::with_backend(affinity, timeout, parent, hardware::default_backend())
    }

    pub fn with_backend(
        affinity: Affinity,
        timeout: Duration,
        parent: Option<&CancellationSignal>,
        backend: Arc<dyn AffinityBackend>,
    ) -> Self {
        Self::build("pt", affinity, timeout, parent, backend)
    }

    /// بناء المقبض من ملف الإعدادات (الأنوية + المهلة + اسم الخيط).
    pub fn from_config(config: &PinningConfig, parent: Option<&CancellationSignal>) -> ThreadResult<Self> {
        config.validate()?;
        Ok(Self::build(
            &config.worker_name,
            config.affinity(),
            config.timeout(),
            parent,
            hardware::default_backend(),
        ))
    }

    fn build(
        prefix: &str,
        affinity: Affinity,
        timeout: Duration,
        parent: Option<&CancellationSignal>,
        backend: Arc<dyn AffinityBackend>,
    ) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        let label = format!("{}-{}", prefix, &id[..8]);

        debug!(
            "PINNED_THREAD: [{}] created (cores={:?}, timeout={:?}, backend={})",
            label,
            affinity.cores(),
            timeout,
            backend.name()
        );

        Self {
            shared: Arc::new(Shared {
                controller: Arc::new(AffinityController::new(affinity, backend, label.clone())),
                dispose: Arc::new(DisposeCoordinator::new(label.clone())),
                signal: CancellationSignal::linked(parent),
                worker: Mutex::new(None),
                phase: AtomicU8::new(Phase::Idle as u8),
                timeout,
                label,
            }),
            _state: PhantomData,
        }
    }

    /// تشغيل الـ callback على خيط مثبت. يعود بعد نجاح الإقلاع، والـ callback يستمر على الخيط العامل.
    pub fn start<F>(&self, state: S, callback: F) -> ThreadResult<()>
    where
        S: Send + 'static,
        F: FnOnce(S, ThreadHandleProxy, CancellationSignal) -> anyhow::Result<()> + Send + 'static,
    {
        let _start = self.shared.dispose.enter(Participant::START)?;
        self.shared.launch(state, callback)
    }

    /// نفس عقد `start`، لكن الانتظار الدوار يجري على مجمع المهام الحاجبة في tokio.
    ///
    /// التسجيل يتم فوراً عند الاستدعاء، والمستقبل (Future) المعاد يحمل نتيجة `start`.
    pub fn start_async<F>(&self, state: S, callback: F) -> impl Future<Output = ThreadResult<()>> + Send + 'static
    where
        S: Send + 'static,
        F: FnOnce(S, ThreadHandleProxy, CancellationSignal) -> anyhow::Result<()> + Send + 'static,
    {
        let task = self.spawn_start_task(state, callback);
        async move {
            match task?.await {
                Ok(outcome) => outcome,
                Err(e) => Err(ThreadError::new(ErrorKind::ThreadRuntime, format!("start task failed: {}", e))),
            }
        }
    }

    fn spawn_start_task<F>(&self, state: S, callback: F) -> ThreadResult<tokio::task::JoinHandle<ThreadResult<()>>>
    where
        S: Send + 'static,
        F: FnOnce(S, ThreadHandleProxy, CancellationSignal) -> anyhow::Result<()> + Send + 'static,
    {
        let wrapper = self.shared.dispose.enter(Participant::START_ASYNC)?;
        let runtime = Handle::try_current()
            .map_err(|e| ThreadError::new(ErrorKind::ThreadSpawn, format!("no tokio runtime: {}", e)))?;

        let shared = Arc::clone(&self.shared);
        Ok(runtime.spawn_blocking(move || {
            let _wrapper = wrapper;
            let _start = shared.dispose.enter(Participant::START)?;
            shared.launch(state, callback)
        }))
    }

    /// طلب التخلص: إلغاء كل التشغيلات ووسم المقبض. لا يحجب، وتكراره آمن.
    pub fn dispose(&self) {
        if self.shared.dispose.begin_dispose() {
            info!(
                "PINNED_THREAD: [{}] dispose requested (phase={:?}, pending={:?})",
                self.shared.label,
                self.phase(),
                self.shared.dispose.pending()
            );
            self.shared.signal.cancel();
        }
    }

    pub fn get_affinity(&self) -> Affinity {
        self.shared.controller.get_affinity()
    }

    pub fn get_applied_affinity(&self) -> Affinity {
        self.shared.controller.get_applied_affinity()
    }

    pub fn get_tid(&self) -> Tid {
        self.shared.controller.get_tid()
    }

    /// بدأ التخلص ولم يكتمل بعد.
    pub fn is_disposing(&self) -> bool {
        self.shared.dispose.is_disposing() && !self.shared.dispose.is_disposed()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.dispose.is_disposed()
    }

    /// هل يوجد خيط عامل لم ينتهِ بعد؟
    pub fn is_alive(&self) -> bool {
        self.shared
            .worker
            .lock()
            .as_ref()
            .map(|slot| !slot.handle.is_finished())
            .unwrap_or(false)
    }

    /// إشارة الإلغاء الخاصة بالمقبض (ابن للأب الممرر عند الإنشاء إن وُجد).
    pub fn cancellation(&self) -> CancellationSignal {
        self.shared.signal.clone()
    }

    /// إلغاء التشغيل الحالي فقط، دون التخلص من المقبض.
    pub fn cancel_run(&self) {
        if let Some(slot) = self.shared.worker.lock().as_ref() {
            slot.run_signal.cancel();
        }
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    pub fn phase(&self) -> Phase {
        if self.shared.dispose.is_disposed() {
            return Phase::Disposed;
        }
        Phase::from_u8(self.shared.phase.load(Ordering::Acquire))
    }

    /// نتيجة الخيط العامل المنتهي (دون حجب). None إذا لم ينتهِ أو لا يوجد.
    pub fn take_outcome(&self) -> Option<ThreadResult<()>> {
        let mut slot = self.shared.worker.lock();
        if !slot.as_ref()?.handle.is_finished() {
            return None;
        }
        slot.take().map(|finished| join_outcome(finished.handle))
    }

    /// انتظار غير متزامن لاكتمال التخلص. بدون مهلة ينتظر إلى الأبد.
    pub async fn await_disposed(&self, timeout: Option<Duration>) -> ThreadResult<()> {
        let started = Instant::now();
        while !self.is_disposed() {
            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    return Err(self.dispose_timeout(limit));
                }
            }
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    /// نسخة متزامنة من `await_disposed` لمن لا يملك runtime.
    pub fn wait_disposed(&self, timeout: Option<Duration>) -> ThreadResult<()> {
        let started = Instant::now();
        let backoff = Backoff::new();
        while !self.is_disposed() {
            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    return Err(self.dispose_timeout(limit));
                }
            }
            backoff.snooze();
        }
        Ok(())
    }

    fn dispose_timeout(&self, limit: Duration) -> ThreadError {
        ThreadError::new(
            ErrorKind::DisposeTimeout,
            format!("label={} timeout={:?} pending={:?}", self.shared.label, limit, self.shared.dispose.pending()),
        )
    }
}

impl<S> Drop for PinnedThread<S> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<S> std::fmt::Debug for PinnedThread<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinnedThread")
            .field("label", &self.shared.label)
            .field("phase", &self.phase())
            .field("tid", &self.get_tid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::simulated::SimulatedBackend;

    fn handle(backend: Arc<SimulatedBackend>) -> PinnedThread<()> {
        PinnedThread::with_backend(Affinity::from_words(vec![0b0110]), Duration::from_millis(250), None, backend)
    }

    #[test]
    fn test_label_and_initial_phase() {
        let pt = handle(Arc::new(SimulatedBackend::default()));
        assert!(pt.label().starts_with("pt-"));
        assert_eq!(pt.label().len(), 11);
        assert_eq!(pt.phase(), Phase::Idle);
        assert_eq!(pt.get_tid(), 0);
        assert!(!pt.is_alive());
        assert!(pt.take_outcome().is_none());
    }

    #[test]
    fn test_start_then_completed_outcome() {
        let backend = Arc::new(SimulatedBackend::default());
        let pt = handle(backend.clone());
        pt.start((), |_, proxy, _| {
            assert!(proxy.tid() > 0);
            Ok(())
        })
        .unwrap();

        let outcome = loop {
            if let Some(outcome) = pt.take_outcome() {
                break outcome;
            }
            thread::yield_now();
        };
        assert!(outcome.is_ok());
        assert_eq!(pt.phase(), Phase::Completed);
        assert_eq!(backend.reset_calls(), 1);
    }

    #[test]
    fn test_unused_handle_disposes_immediately() {
        let pt = handle(Arc::new(SimulatedBackend::default()));
        pt.dispose();
        assert!(pt.is_disposed());
        assert!(!pt.is_disposing());
        assert_eq!(pt.phase(), Phase::Disposed);
        assert!(pt.wait_disposed(Some(Duration::from_millis(10))).is_ok());

        let err = pt.start((), |_, _, _| Ok(())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Disposing);
    }

    #[test]
    fn test_cancel_run_stops_only_current_worker() {
        let backend = Arc::new(SimulatedBackend::default());
        let pt = handle(backend);
        pt.start((), |_, _, signal| {
            while !signal.is_cancelled() {
                thread::yield_now();
            }
            Err(ThreadError::cancelled().into())
        })
        .unwrap();

        pt.cancel_run();
        while pt.is_alive() {
            thread::yield_now();
        }
        assert_eq!(pt.phase(), Phase::Cancelled);
        assert!(pt.take_outcome().unwrap().is_ok());
        assert!(!pt.cancellation().is_cancelled());
    }
}
