// Windows Core Pinning

/*
 * ALPHA SOVEREIGN - WINDOWS NATIVE AFFINITY
 * =================================================================
 * Component Name: src/hardware/windows_native.rs
 * Core Responsibility: تطبيق/إعادة/قراءة تقارب الخيط الحالي عبر SetThreadAffinityMask.
 * Design Pattern: Syscall Wrapper
 * Forensic Impact: SetThreadAffinityMask يعيد القناع السابق فقط، لذلك نستدعيه مرتين: الاستدعاء الثاني يكشف ما طُبق فعلاً.
 * =================================================================
 */

use windows_sys::Win32::System::Threading::{
    GetCurrentProcess, GetCurrentThread, GetCurrentThreadId, GetProcessAffinityMask, SetThreadAffinityMask,
};

use super::{NativeAffinity, RawOutcome, Tid};

// المقبض الوهمي للخيط الحالي ثابت في Windows
const CURRENT_THREAD_PSEUDO_HANDLE: isize = -2;

// رموز النتيجة (لكل فعل جدوله الخاص)
mod set_codes {
    pub const INVALID_ARG: i32 = -1;
    pub const SET_AFFINITY_FAILED: i32 = -4;
    pub const THREAD_HANDLE_FAILED: i32 = -10;
}

mod reset_codes {
    pub const CPU_COUNT_FAILED: i32 = -2;
    pub const SET_AFFINITY_FAILED: i32 = -5;
    pub const THREAD_HANDLE_FAILED: i32 = -9;
}

mod get_codes {
    pub const CPU_COUNT_FAILED: i32 = -2;
    pub const GET_AFFINITY_FAILED: i32 = -5;
    pub const THREAD_HANDLE_FAILED: i32 = -7;
}

/// مجموعة معالجات واحدة: 64 نواة على الأكثر، في كلمة واحدة.
fn as_words(mask: usize) -> Vec<u64> {
    vec![mask as u64]
}

fn current_tid() -> Tid {
    // SAFETY: GetCurrentThreadId لا يأخذ معاملات ولا يفشل.
    unsafe { GetCurrentThreadId() as Tid }
}

fn current_thread() -> Option<isize> {
    // SAFETY: يعيد مقبضاً وهمياً لا يحتاج إغلاقاً.
    let handle = unsafe { GetCurrentThread() };
    (handle == CURRENT_THREAD_PSEUDO_HANDLE).then_some(handle)
}

/// قناع العملية: الحد الأعلى لأي قناع خيط.
fn process_mask() -> Option<usize> {
    let mut process: usize = 0;
    let mut system: usize = 0;
    // SAFETY: المؤشران يشيران إلى متغيرات محلية صالحة طوال الاستدعاء.
    let ok = unsafe { GetProcessAffinityMask(GetCurrentProcess(), &mut process, &mut system) };
    (ok != 0 && process != 0).then_some(process)
}

/// تطبيق القناع مرتين: الأول يعيد القناع السابق، الثاني يعيد ما طُبق فعلاً.
/// 0 من أي منهما يعني الفشل.
fn apply_twice(handle: isize, mask: usize) -> Option<usize> {
    // SAFETY: handle هو المقبض الوهمي للخيط الحالي.
    let prior = unsafe { SetThreadAffinityMask(handle, mask) };
    if prior == 0 {
        return None;
    }
    // SAFETY: كما سبق.
    let applied = unsafe { SetThreadAffinityMask(handle, mask) };
    (applied != 0).then_some(applied)
}

#[derive(Debug, Default)]
pub struct WindowsNativeBackend;

impl WindowsNativeBackend {
    pub fn new() -> Self {
        Self
    }
}

impl NativeAffinity for WindowsNativeBackend {
    fn name(&self) -> &'static str {
        "WINDOWS_THREAD_AFFINITY_MASK"
    }

    fn set_affinity_raw(&self, mask: &[u64]) -> RawOutcome {
        // الكلمة الأخيرة = الأنوية 0..63. الكلمات الأعلى خارج مجموعة المعالجات ولا تُقارن
        let Some(&low) = mask.last() else {
            return RawOutcome::failure(set_codes::INVALID_ARG);
        };
        let Ok(low) = usize::try_from(low) else {
            return RawOutcome::failure(set_codes::INVALID_ARG);
        };
        if low == 0 {
            return RawOutcome::failure(set_codes::INVALID_ARG);
        }

        let Some(handle) = current_thread() else {
            return RawOutcome::failure(set_codes::THREAD_HANDLE_FAILED);
        };

        match apply_twice(handle, low) {
            Some(applied) => RawOutcome::success(current_tid(), as_words(applied)),
            None => RawOutcome::failure(set_codes::SET_AFFINITY_FAILED),
        }
    }

    fn reset_affinity_raw(&self) -> RawOutcome {
        let Some(handle) = current_thread() else {
            return RawOutcome::failure(reset_codes::THREAD_HANDLE_FAILED);
        };
        // كل البتات (0xFFFF...) يرفضها النظام إذا تجاوزت قناع العملية
        let Some(everything) = process_mask() else {
            return RawOutcome::failure(reset_codes::CPU_COUNT_FAILED);
        };

        match apply_twice(handle, everything) {
            Some(applied) if applied == everything => RawOutcome::success(current_tid(), as_words(applied)),
            _ => RawOutcome::failure(reset_codes::SET_AFFINITY_FAILED),
        }
    }

    fn get_affinity_raw(&self) -> RawOutcome {
        let Some(handle) = current_thread() else {
            return RawOutcome::failure(get_codes::THREAD_HANDLE_FAILED);
        };
        let Some(everything) = process_mask() else {
            return RawOutcome::failure(get_codes::CPU_COUNT_FAILED);
        };

        // لا توجد GetThreadAffinityMask: نوسع مؤقتاً ونقرأ القناع السابق ثم نعيده كما كان
        // SAFETY: handle هو المقبض الوهمي للخيط الحالي.
        let current = unsafe { SetThreadAffinityMask(handle, everything) };
        if current == 0 {
            return RawOutcome::failure(get_codes::GET_AFFINITY_FAILED);
        }
        // SAFETY: كما سبق، و current قناع قبله النظام للتو.
        if unsafe { SetThreadAffinityMask(handle, current) } == 0 {
            return RawOutcome::failure(get_codes::GET_AFFINITY_FAILED);
        }

        RawOutcome::success(current_tid(), as_words(current))
    }
}
