// Worker Body

/*
 * ALPHA SOVEREIGN - PINNED WORKER BODY
 * =================================================================
 * Component Name: src/thread/worker.rs
 * Core Responsibility: ما يحدث داخل الخيط المثبت من أول تعليمة إلى آخرها (Stability Pillar).
 * Design Pattern: Run-To-Completion / Single Exit Path
 * Forensic Impact: reset يُستدعى مرة واحدة بالضبط في كل مسار خروج، فلا يبقى خيط من خيوط النظام "عالقاً" على نواة.
 * =================================================================
 */

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{ErrorKind, ThreadError, ThreadResult};
use crate::hardware::Tid;
use crate::lifecycle::{BootstrapCoordinator, CancellationSignal, ExitGuard};
use super::proxy::ThreadHandleProxy;
use super::{Phase, Shared};

/// كل ما يحتاجه تشغيل واحد (run). يُنقل بالكامل إلى الخيط العامل.
pub(crate) struct WorkerRun {
    pub(crate) shared: Arc<Shared>,
    pub(crate) bootstrap: Arc<BootstrapCoordinator>,
    pub(crate) signal: CancellationSignal,
    pub(crate) exit: ExitGuard,
}

impl WorkerRun {
    pub(crate) fn execute<S, F>(self, state: S, callback: F) -> ThreadResult<()>
    where
        F: FnOnce(S, ThreadHandleProxy, CancellationSignal) -> anyhow::Result<()>,
    {
        let WorkerRun { shared, bootstrap, signal, exit } = self;

        let outcome = run(&shared, &bootstrap, &signal, state, callback);

        // الترتيب مهم: فك الملكية ثم تأكيد الخروج (آخر لمسة للحالة المشتركة)
        shared.controller.release();
        drop(exit);
        outcome
    }
}

fn run<S, F>(
    shared: &Shared,
    bootstrap: &BootstrapCoordinator,
    signal: &CancellationSignal,
    state: S,
    callback: F,
) -> ThreadResult<()>
where
    F: FnOnce(S, ThreadHandleProxy, CancellationSignal) -> anyhow::Result<()>,
{
    // 1. التثبيت + نقطة التفتيش الأولى
    let pinned = shared
        .controller
        .apply(shared.controller.get_affinity())
        .and_then(|tid| signal.check().map(|_| tid));

    let tid = match pinned {
        Ok(tid) => tid,
        Err(err) => {
            reset_quietly(shared);
            if err.is_cooperative_exit() {
                debug!("PINNED_THREAD: [{}] cancelled during bootstrap", shared.label);
                shared.set_phase(Phase::Cancelled);
                return Ok(());
            }
            bootstrap.fail(err.clone());
            shared.set_phase(Phase::Faulted);
            return Err(ThreadError::wrap(ErrorKind::ThreadBootstrap, "worker failed to pin itself", err));
        }
    };

    // 2. حسم الإقلاع ونشر الـ tid معاً: إذا سبقنا المستدعي (مهلة/تخلص) نخرج بهدوء دون نشر
    if !shared.controller.publish_with(tid, || bootstrap.mark_bootstrapped()) {
        debug!("PINNED_THREAD: [{}] bootstrap already settled by caller ({:?})", shared.label, bootstrap.state());
        reset_quietly(shared);
        shared.set_phase(Phase::Cancelled);
        return Ok(());
    }

    shared.set_phase(Phase::Running);
    info!(
        label = %shared.label,
        tid = tid,
        "PINNED_THREAD: running on cores {:?}",
        shared.controller.get_applied_affinity().cores()
    );

    // 3. نقطة التفتيش قبل الـ callback
    if signal.is_cancelled() {
        reset_quietly(shared);
        shared.set_phase(Phase::Cancelled);
        return Ok(());
    }

    // 4. الـ callback (الأخطاء والـ panic تُلتقط هنا)
    let proxy = ThreadHandleProxy::new(Arc::clone(&shared.controller));
    let callback_signal = signal.clone();
    let outcome = panic::catch_unwind(AssertUnwindSafe(move || callback(state, proxy, callback_signal)));

    // 5. reset واحد بعد الـ callback، مهما كانت النتيجة
    let reset = shared.controller.reset();

    finish(shared, tid, signal, outcome, reset)
}

fn finish(
    shared: &Shared,
    tid: Tid,
    signal: &CancellationSignal,
    outcome: Result<anyhow::Result<()>, Box<dyn Any + Send>>,
    reset: ThreadResult<Tid>,
) -> ThreadResult<()> {
    match outcome {
        Ok(Ok(())) => {
            if let Err(err) = reset {
                error!("PINNED_THREAD: [{}] affinity reset failed after callback: {}", shared.label, err);
                shared.set_phase(Phase::Faulted);
                return Err(ThreadError::wrap(ErrorKind::ThreadRuntime, "affinity reset failed", err));
            }
            let phase = if signal.is_cancelled() { Phase::Cancelled } else { Phase::Completed };
            info!("PINNED_THREAD: [{}] tid={} finished ({:?})", shared.label, tid, phase);
            shared.set_phase(phase);
            Ok(())
        }
        Ok(Err(err)) => {
            log_reset_failure(shared, &reset);
            if let Some(inner) = err.downcast_ref::<ThreadError>() {
                if inner.is_cooperative_exit() {
                    debug!("PINNED_THREAD: [{}] callback exited on cancellation", shared.label);
                    shared.set_phase(Phase::Cancelled);
                    return Ok(());
                }
            }
            error!("PINNED_THREAD: [{}] tid={} callback failed: {:#}", shared.label, tid, err);
            shared.set_phase(Phase::Faulted);
            Err(runtime_failure(err))
        }
        Err(payload) => {
            log_reset_failure(shared, &reset);
            let message = panic_message(payload.as_ref());
            error!("PINNED_THREAD: [{}] tid={} callback panicked: {}", shared.label, tid, message);
            shared.set_phase(Phase::Faulted);
            Err(ThreadError::new(ErrorKind::ThreadRuntime, format!("callback panicked: {}", message)))
        }
    }
}

/// فشل الـ callback كـ ThreadRuntime. إذا كان الخطأ نفسه ThreadError يبقى سبباً ملفوفاً.
fn runtime_failure(err: anyhow::Error) -> ThreadError {
    let detail = format!("callback failed: {:#}", err);
    match err.downcast::<ThreadError>() {
        Ok(inner) => ThreadError::wrap(ErrorKind::ThreadRuntime, detail, inner),
        Err(_) => ThreadError::new(ErrorKind::ThreadRuntime, detail),
    }
}

/// reset "أفضل جهد" في مسارات الخطأ والإلغاء: الفشل يُسجل ولا يُخفي السبب الأصلي.
fn reset_quietly(shared: &Shared) {
    if let Err(err) = shared.controller.reset() {
        warn!("PINNED_THREAD: [{}] best-effort reset failed: {}", shared.label, err);
    }
}

fn log_reset_failure(shared: &Shared, reset: &ThreadResult<Tid>) {
    if let Err(err) = reset {
        warn!("PINNED_THREAD: [{}] reset after failed callback also failed: {}", shared.label, err);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_failure_keeps_thread_error_as_cause() {
        let inner = ThreadError::new(ErrorKind::AppliedMaskMismatch, "word=0 requested=0x22 applied=0x2");
        let wrapped = runtime_failure(anyhow::Error::new(inner));
        assert_eq!(wrapped.kind(), ErrorKind::ThreadRuntime);
        assert_eq!(wrapped.cause().map(|c| c.kind()), Some(ErrorKind::AppliedMaskMismatch));

        let plain = runtime_failure(anyhow::anyhow!("socket closed"));
        assert_eq!(plain.kind(), ErrorKind::ThreadRuntime);
        assert!(plain.cause().is_none());
        assert!(plain.detail().contains("socket closed"));
    }

    #[test]
    fn test_panic_message_extracts_text() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(panic_message(boxed.as_ref()), "kaboom");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }
}
