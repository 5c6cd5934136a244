/*
 * ALPHA SOVEREIGN - PINNED WORKER ENTRY POINT
 * =================================================================
 * Component: src/main.rs
 * Responsibility: تشغيل خيط مثبت على الأنوية المحددة في الإعدادات حتى إشارة الإغلاق.
 * Status: LIVE OPERATION
 * =================================================================
 */

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};

use alpha_affinity::hardware::topology;
use alpha_affinity::utils::logger::init_logger;
use alpha_affinity::{LifecycleEvent, PinnedThread, PinningConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // أ. البيئة والإعدادات
    dotenv::dotenv().ok();
    let config_path = std::env::var("ALPHA_PIN_CONFIG")
        .ok()
        .or_else(|| std::env::args().nth(1))
        .map(PathBuf::from);
    let config = PinningConfig::load(config_path.as_deref()).context("loading pinning configuration")?;

    // ب. الصندوق الأسود (Logging)
    let _guard = init_logger(&config.log_dir, &config.log_file, &config.log_level);
    info!("ALPHA PIN: Boot sequence initiated...");

    // ج. فحص العتاد مقابل الطلب
    let affinity = config.affinity();
    topology::audit_request(&affinity);

    // د. الخيط المثبت
    let worker: PinnedThread<Arc<AtomicU64>> =
        PinnedThread::from_config(&config, None).context("building pinned thread")?;
    let ticks = Arc::new(AtomicU64::new(0));

    let started = worker.start_async(Arc::clone(&ticks), |ticks, proxy, signal| {
        info!("WORKER: tid={} pinned to {}", proxy.tid(), proxy.get_applied_affinity());
        while !signal.is_cancelled() {
            ticks.fetch_add(1, Ordering::Relaxed);
            std::thread::yield_now();
        }
        Ok(())
    });

    if let Err(e) = started.await {
        error!("ALPHA PIN: worker failed to start: {}", e);
        LifecycleEvent::capture(&worker).with_detail(e.to_string()).emit();
        return Err(e.into());
    }
    LifecycleEvent::capture(&worker).emit();

    // هـ. انتظار إشارة الإغلاق (Ctrl+C)
    match signal::ctrl_c().await {
        Ok(()) => warn!("SHUTDOWN SIGNAL RECEIVED: disposing pinned worker..."),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }

    worker.dispose();
    if let Err(e) = worker.await_disposed(Some(Duration::from_secs(5))).await {
        error!("ALPHA PIN: {}", e);
    }
    if let Some(Err(e)) = worker.take_outcome() {
        error!("ALPHA PIN: worker ended with error: {}", e);
    }

    LifecycleEvent::capture(&worker)
        .with_detail(format!("ticks={}", ticks.load(Ordering::Relaxed)))
        .emit();
    info!("ALPHA PIN: Shutdown complete.");
    Ok(())
}
