// ALPHA SOVEREIGN - LIFECYCLE & DISPOSAL INTEGRATION TESTS
// Status: PRODUCTION

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use alpha_affinity::hardware::simulated::SimulatedBackend;
use alpha_affinity::{Affinity, CancellationSignal, ErrorKind, Phase, PinnedThread, ThreadError};

fn pinned<S>(backend: &Arc<SimulatedBackend>, parent: Option<&CancellationSignal>) -> PinnedThread<S> {
    PinnedThread::with_backend(Affinity::from_cores(&[1, 2]), Duration::from_millis(250), parent, backend.clone())
}

fn wait_for_exit<S>(handle: &PinnedThread<S>) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while handle.is_alive() {
        assert!(Instant::now() < deadline, "worker did not exit");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_second_start_while_alive_is_refused_then_reuse_succeeds() {
    let backend = Arc::new(SimulatedBackend::default());
    let handle: PinnedThread<Arc<AtomicBool>> = pinned(&backend, None);
    let release = Arc::new(AtomicBool::new(false));

    handle
        .start(Arc::clone(&release), |release, _, _| {
            while !release.load(Ordering::Acquire) {
                thread::yield_now();
            }
            Ok(())
        })
        .unwrap();
    let first_tid = handle.get_tid();

    let err = handle.start(Arc::new(AtomicBool::new(true)), |_, _, _| Ok(())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyRunning);

    release.store(true, Ordering::Release);
    wait_for_exit(&handle);
    assert_eq!(handle.phase(), Phase::Completed);

    handle.start(Arc::new(AtomicBool::new(true)), |_, _, _| Ok(())).unwrap();
    assert_ne!(handle.get_tid(), first_tid, "a fresh OS thread owns the second run");
    wait_for_exit(&handle);
    assert_eq!(backend.reset_calls(), 2);
}

#[test]
fn test_disposed_only_after_worker_confirms_exit() {
    let backend = Arc::new(SimulatedBackend::default());
    let handle: PinnedThread<()> = pinned(&backend, None);

    handle
        .start((), |_, _, signal| {
            while !signal.is_cancelled() {
                thread::yield_now();
            }
            // تأخير متعمد بعد رؤية الإلغاء
            thread::sleep(Duration::from_millis(100));
            Ok(())
        })
        .unwrap();

    handle.dispose();
    assert!(handle.is_disposing());
    assert!(!handle.is_disposed());

    thread::sleep(Duration::from_millis(30));
    assert!(!handle.is_disposed(), "callback still sleeping");

    handle.wait_disposed(Some(Duration::from_secs(5))).unwrap();
    assert!(handle.is_disposed());
    assert!(!handle.is_disposing());
    assert_eq!(handle.phase(), Phase::Disposed);

    // dispose مكرر لا يغير شيئاً
    handle.dispose();
    assert!(handle.is_disposed());
}

#[test]
fn test_callback_error_becomes_runtime_failure_after_reset() {
    let backend = Arc::new(SimulatedBackend::default());
    let handle: PinnedThread<()> = pinned(&backend, None);

    handle.start((), |_, _, _| Err(anyhow::anyhow!("feed handler lost its socket"))).unwrap();
    wait_for_exit(&handle);

    let err = handle.take_outcome().unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ThreadRuntime);
    assert!(err.detail().contains("lost its socket"));
    assert_eq!(handle.phase(), Phase::Faulted);
    assert_eq!(backend.reset_calls(), 1);
    assert!(handle.take_outcome().is_none(), "outcome is taken once");
}

#[test]
fn test_callback_thread_error_is_kept_as_cause() {
    let backend = Arc::new(SimulatedBackend::with_cpu_count(4));
    let handle: PinnedThread<()> = pinned(&backend, None);

    // النواة 5 غير موجودة على جهاز بـ 4 أنوية: القناع المطبق لا يطابق
    handle
        .start((), |_, proxy, _| {
            proxy.set_affinity(Affinity::from_cores(&[1, 5]))?;
            Ok(())
        })
        .unwrap();
    wait_for_exit(&handle);

    let err = handle.take_outcome().unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ThreadRuntime);
    assert_eq!(err.cause().map(|c| c.kind()), Some(ErrorKind::AppliedMaskMismatch));
    assert_eq!(handle.phase(), Phase::Faulted);
}

#[test]
fn test_callback_panic_is_contained() {
    let backend = Arc::new(SimulatedBackend::default());
    let handle: PinnedThread<()> = pinned(&backend, None);

    handle.start((), |_, _, _| panic!("strategy invariant broken")).unwrap();
    wait_for_exit(&handle);

    let err = handle.take_outcome().unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ThreadRuntime);
    assert!(err.detail().contains("strategy invariant broken"));
    assert_eq!(backend.reset_calls(), 1);
}

#[test]
fn test_cooperative_error_from_callback_is_quiet() {
    let backend = Arc::new(SimulatedBackend::default());
    let handle: PinnedThread<()> = pinned(&backend, None);

    handle
        .start((), |_, _, signal| {
            loop {
                signal.check()?;
                thread::yield_now();
            }
        })
        .unwrap();

    handle.dispose();
    handle.wait_disposed(Some(Duration::from_secs(5))).unwrap();
    assert!(handle.take_outcome().map(|o| o.is_ok()).unwrap_or(true));
}

#[test]
fn test_parent_cancellation_reaches_worker() {
    let backend = Arc::new(SimulatedBackend::default());
    let parent = CancellationSignal::new();
    let handle: PinnedThread<()> = pinned(&backend, Some(&parent));

    handle
        .start((), |_, _, signal| {
            while !signal.is_cancelled() {
                thread::yield_now();
            }
            Ok(())
        })
        .unwrap();

    parent.cancel();
    wait_for_exit(&handle);
    assert_eq!(handle.phase(), Phase::Cancelled);
    assert!(!handle.is_disposed(), "cancellation does not dispose the handle");

    let err = handle.start((), |_, _, _| Ok(())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[test]
fn test_proxy_repins_the_running_thread() {
    let backend = Arc::new(SimulatedBackend::default());
    let handle: PinnedThread<Arc<AtomicUsize>> = pinned(&backend, None);
    let observed = Arc::new(AtomicUsize::new(0));

    handle
        .start(Arc::clone(&observed), |observed, proxy, _| {
            let tid = proxy.set_affinity(Affinity::from_cores(&[3]))?;
            assert_eq!(tid, proxy.tid());
            observed.store(proxy.observe()?.cores()[0], Ordering::Release);

            let err = proxy.set_affinity(Affinity::from_words(vec![0])).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
            proxy.reset_affinity()?;
            Ok(())
        })
        .unwrap();

    wait_for_exit(&handle);
    assert!(handle.take_outcome().unwrap().is_ok());
    assert_eq!(observed.load(Ordering::Acquire), 3);
    // reset من الـ callback + reset الخروج
    assert_eq!(backend.reset_calls(), 2);
    assert_eq!(handle.get_applied_affinity().cores().len(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_async_and_await_disposed() {
    let backend = Arc::new(SimulatedBackend::default());
    let handle: PinnedThread<()> = pinned(&backend, None);

    handle
        .start_async((), |_, _, signal| {
            while !signal.is_cancelled() {
                thread::yield_now();
            }
            Ok(())
        })
        .await
        .unwrap();
    assert!(handle.get_tid() > 0);

    handle.dispose();
    handle.await_disposed(Some(Duration::from_secs(5))).await.unwrap();
    assert_eq!(backend.reset_calls(), 1);
}

#[tokio::test]
async fn test_start_async_surfaces_validation_error() {
    let backend = Arc::new(SimulatedBackend::default());
    let handle: PinnedThread<()> =
        PinnedThread::with_backend(Affinity::from_words(vec![0]), Duration::from_millis(50), None, backend.clone());

    let err = handle.start_async((), |_, _, _| Ok(())).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(backend.set_calls(), 0);

    handle.dispose();
    handle.await_disposed(Some(Duration::from_secs(1))).await.unwrap();
}

#[test]
fn test_start_async_without_runtime_is_a_spawn_error() {
    let backend = Arc::new(SimulatedBackend::default());
    let handle: PinnedThread<()> = pinned(&backend, None);

    let err = futures::executor::block_on(handle.start_async((), |_, _, _| Ok(()))).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ThreadSpawn);
    assert!(!handle.is_alive());
}

#[tokio::test]
async fn test_await_disposed_times_out_while_worker_lingers() {
    let backend = Arc::new(SimulatedBackend::default());
    let handle: PinnedThread<()> = pinned(&backend, None);
    let hold = Arc::new(AtomicBool::new(true));
    let held = Arc::clone(&hold);

    handle
        .start((), move |_, _, _| {
            // يتجاهل الإلغاء عمداً
            while held.load(Ordering::Acquire) {
                thread::yield_now();
            }
            Ok(())
        })
        .unwrap();

    handle.dispose();
    let err = handle.await_disposed(Some(Duration::from_millis(20))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DisposeTimeout);

    hold.store(false, Ordering::Release);
    handle.await_disposed(Some(Duration::from_secs(5))).await.unwrap();
}

#[test]
fn test_cancelled_error_is_cooperative() {
    let err: anyhow::Error = ThreadError::cancelled().into();
    assert!(err.downcast_ref::<ThreadError>().unwrap().is_cooperative_exit());
}
