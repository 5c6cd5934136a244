// Non-blocking Logger & Lifecycle Record

/*
 * ALPHA SOVEREIGN - NON-BLOCKING ASYNC LOGGER
 * =================================================================
 * Component Name: src/utils/logger.rs
 * Core Responsibility:
 * 1. تسجيل الأحداث محلياً دون تعطيل الخيوط المثبتة (Performance Pillar).
 * 2. تعريف سجل انتقالات المقبض القابل للنقل (Integration Pillar).
 * Design Pattern: Async Appender / DTO
 * =================================================================
 */

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::hardware::Tid;
use crate::thread::{Phase, PinnedThread};

// =================================================================
// 1. سجل الانتقالات (Lifecycle Record)
// =================================================================

/// لقطة قابلة للتسلسل لحالة مقبض خيط مثبت في لحظة معينة.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub label: String,
    pub phase: String,
    pub tid: Tid,
    pub cores: Vec<usize>,
    pub detail: Option<String>,
    pub timestamp: i64, // Epoch Millis
}

impl LifecycleEvent {
    pub fn new(label: &str, phase: Phase, tid: Tid, cores: Vec<usize>) -> Self {
        Self {
            label: label.to_string(),
            phase: format!("{:?}", phase),
            tid,
            cores,
            detail: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// لقطة من مقبض حي.
    pub fn capture<S>(handle: &PinnedThread<S>) -> Self {
        Self::new(handle.label(), handle.phase(), handle.get_tid(), handle.get_applied_affinity().cores())
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// كتابة السجل كحدث مهيكل في قناة التدقيق.
    pub fn emit(&self) {
        tracing::info!(
            target: "LIFECYCLE_AUDIT",
            label = %self.label,
            phase = %self.phase,
            tid = self.tid,
            cores = ?self.cores,
            detail = self.detail.as_deref().unwrap_or(""),
            timestamp = self.timestamp,
            "PINNED_THREAD TRANSITION"
        );
    }
}

// =================================================================
// 2. نظام التسجيل غير المتزامن (Async Tracing System)
// =================================================================

/// تهيئة نظام التسجيل العالمي.
/// يجب استدعاء هذه الدالة مرة واحدة فقط في `main.rs`.
/// تعيد `WorkerGuard` الذي يجب الاحتفاظ به حياً حتى نهاية البرنامج.
pub fn init_logger(log_dir: &str, file_name: &str, level: &str) -> WorkerGuard {
    // أ. ملف يومي دوار
    let file_appender = tracing_appender::rolling::daily(log_dir, file_name);

    // ب. الخيط المثبت يكتب في Buffer، والـ Guard يدير الخيط الخلفي
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    // ج. أسماء الخيوط تحمل وسم المقبض (pt-xxxxxxxx)، لذلك نبقيها في السجل
    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false)
        .compact();

    let stdout_layer = fmt::layer()
        .with_thread_names(true)
        .with_target(true)
        .compact();

    // د. RUST_LOG يتقدم على مستوى الإعدادات
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    tracing::info!("LOGGER: Initialized non-blocking logging system at {}/{}", log_dir, file_name);

    guard
}
