// Linux Core Pinning

/*
 * ALPHA SOVEREIGN - LINUX NATIVE AFFINITY
 * =================================================================
 * Component Name: src/hardware/linux_native.rs
 * Core Responsibility: تطبيق/إعادة/قراءة تقارب الخيط الحالي عبر sched_setaffinity و sched_getaffinity.
 * Design Pattern: Syscall Wrapper
 * Forensic Impact: بعد كل تطبيق نقرأ القناع من النواة مجدداً، لأن النواة قد تسقط بتات بصمت (cgroups).
 * =================================================================
 */

use std::mem;
use libc::{c_ulong, cpu_set_t, pid_t};

use super::{NativeAffinity, RawOutcome, Tid};

const WORD_BITS: usize = 64;
const ULONG_BITS: usize = mem::size_of::<c_ulong>() * 8;

/// النواة ترفض sched_getaffinity إذا كان الحجم أصغر من قناعها الداخلي.
/// نستخدم على الأقل حجم cpu_set_t الخاص بـ glibc.
const MIN_QUERY_BITS: usize = mem::size_of::<cpu_set_t>() * 8;

// رموز النتيجة (لكل فعل جدوله الخاص)
mod set_codes {
    pub const INVALID_ARG: i32 = -1;
    pub const BIT_POSITION_TOO_LARGE: i32 = -3;
    pub const SET_AFFINITY_FAILED: i32 = -4;
    pub const CPU_COUNT_FAILED: i32 = -5;
    pub const TOO_MANY_CPUS: i32 = -6;
    pub const GET_AFFINITY_FAILED: i32 = -8;
}

mod reset_codes {
    pub const CPU_COUNT_FAILED: i32 = -2;
    pub const TOO_MANY_CPUS: i32 = -3;
    pub const SET_AFFINITY_FAILED: i32 = -5;
    pub const GET_AFFINITY_FAILED: i32 = -7;
}

mod get_codes {
    pub const CPU_COUNT_FAILED: i32 = -2;
    pub const TOO_MANY_CPUS: i32 = -3;
    pub const GET_AFFINITY_FAILED: i32 = -5;
}

/// مخزن cpu set بحجم ديناميكي (مكافئ CPU_ALLOC).
struct CpuSetBuf {
    bits: Vec<c_ulong>,
}

impl CpuSetBuf {
    fn with_bits(count: usize) -> Self {
        let longs = count.max(1).div_ceil(ULONG_BITS);
        Self { bits: vec![0; longs] }
    }

    fn set(&mut self, cpu: usize) {
        self.bits[cpu / ULONG_BITS] |= (1 as c_ulong) << (cpu % ULONG_BITS);
    }

    fn is_set(&self, cpu: usize) -> bool {
        self.bits
            .get(cpu / ULONG_BITS)
            .map(|l| l & ((1 as c_ulong) << (cpu % ULONG_BITS)) != 0)
            .unwrap_or(false)
    }

    fn byte_len(&self) -> usize {
        self.bits.len() * mem::size_of::<c_ulong>()
    }

    /// تحويل إلى كلمات 64-بت بترتيب اليمين-إلى-اليسار (الكلمة الأخيرة = الأنوية 0..63).
    fn to_words(&self, cpu_count: usize) -> Vec<u64> {
        let len = cpu_count.max(1).div_ceil(WORD_BITS);
        let mut words = vec![0u64; len];
        for cpu in 0..cpu_count {
            if self.is_set(cpu) {
                words[len - 1 - cpu / WORD_BITS] |= 1u64 << (cpu % WORD_BITS);
            }
        }
        words
    }

    fn apply_to_current(&self) -> i32 {
        // SAFETY: المخزن مخصص بحجم byte_len ومحاذاة c_ulong، وهي نفس بنية cpu_set_t.
        // pid = 0 يعني الخيط المستدعي.
        unsafe {
            libc::sched_setaffinity(0 as pid_t, self.byte_len(), self.bits.as_ptr() as *const cpu_set_t)
        }
    }

    fn load_from_current(&mut self) -> i32 {
        // SAFETY: نفس شروط apply_to_current، والنواة تكتب ضمن byte_len فقط.
        unsafe {
            libc::sched_getaffinity(0 as pid_t, self.byte_len(), self.bits.as_mut_ptr() as *mut cpu_set_t)
        }
    }
}

fn current_tid() -> Tid {
    // SAFETY: SYS_gettid لا يأخذ معاملات ولا يفشل.
    unsafe { libc::syscall(libc::SYS_gettid) as Tid }
}

/// عدد الأنوية المُعدّة (_SC_NPROCESSORS_CONF)، أو None عند الفشل.
fn configured_cpus() -> Option<i64> {
    // SAFETY: sysconf آمن للاستدعاء من أي خيط.
    let count = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_CONF) } as i64;
    (count > 0).then_some(count)
}

/// قراءة القناع الحالي كما تراه النواة.
fn read_current(cpu_count: usize) -> Option<Vec<u64>> {
    let mut real = CpuSetBuf::with_bits(cpu_count.max(MIN_QUERY_BITS));
    if real.load_from_current() < 0 {
        return None;
    }
    Some(real.to_words(cpu_count))
}

#[derive(Debug, Default)]
pub struct LinuxNativeBackend;

impl LinuxNativeBackend {
    pub fn new() -> Self {
        Self
    }
}

impl NativeAffinity for LinuxNativeBackend {
    fn name(&self) -> &'static str {
        "LINUX_SCHED_AFFINITY"
    }

    fn set_affinity_raw(&self, mask: &[u64]) -> RawOutcome {
        if mask.is_empty() {
            return RawOutcome::failure(set_codes::INVALID_ARG);
        }

        let tid = current_tid();
        let mut cpuset = CpuSetBuf::with_bits(mask.len() * WORD_BITS);

        // من اليمين إلى اليسار: الكلمة الأخيرة هي الأنوية 0..63
        for (offset, word) in mask.iter().rev().enumerate() {
            for bit in 0..WORD_BITS {
                if word & (1u64 << bit) == 0 {
                    continue;
                }
                let cpu = offset * WORD_BITS + bit;
                if cpu > i32::MAX as usize {
                    return RawOutcome::failure(set_codes::BIT_POSITION_TOO_LARGE);
                }
                cpuset.set(cpu);
            }
        }

        if cpuset.apply_to_current() < 0 {
            return RawOutcome::failure(set_codes::SET_AFFINITY_FAILED);
        }

        let Some(cpu_count) = configured_cpus() else {
            return RawOutcome::failure(set_codes::CPU_COUNT_FAILED);
        };
        if cpu_count > i32::MAX as i64 {
            return RawOutcome::failure(set_codes::TOO_MANY_CPUS);
        }

        match read_current(cpu_count as usize) {
            Some(applied) => RawOutcome::success(tid, applied),
            None => RawOutcome::failure(set_codes::GET_AFFINITY_FAILED),
        }
    }

    fn reset_affinity_raw(&self) -> RawOutcome {
        let Some(cpu_count) = configured_cpus() else {
            return RawOutcome::failure(reset_codes::CPU_COUNT_FAILED);
        };
        if cpu_count > i32::MAX as i64 {
            return RawOutcome::failure(reset_codes::TOO_MANY_CPUS);
        }
        let cpu_count = cpu_count as usize;

        let mut cpuset = CpuSetBuf::with_bits(cpu_count);
        for cpu in 0..cpu_count {
            cpuset.set(cpu);
        }

        if cpuset.apply_to_current() < 0 {
            return RawOutcome::failure(reset_codes::SET_AFFINITY_FAILED);
        }

        match read_current(cpu_count) {
            Some(applied) => RawOutcome::success(current_tid(), applied),
            None => RawOutcome::failure(reset_codes::GET_AFFINITY_FAILED),
        }
    }

    fn get_affinity_raw(&self) -> RawOutcome {
        let Some(cpu_count) = configured_cpus() else {
            return RawOutcome::failure(get_codes::CPU_COUNT_FAILED);
        };
        if cpu_count > i32::MAX as i64 {
            return RawOutcome::failure(get_codes::TOO_MANY_CPUS);
        }

        match read_current(cpu_count as usize) {
            Some(current) => RawOutcome::success(current_tid(), current),
            None => RawOutcome::failure(get_codes::GET_AFFINITY_FAILED),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpuset_words_layout() {
        let mut buf = CpuSetBuf::with_bits(130);
        buf.set(1);
        buf.set(2);
        buf.set(129);
        let words = buf.to_words(130);
        assert_eq!(words.len(), 3);
        assert_eq!(words[2], 0b0110);
        assert_eq!(words[1], 0);
        assert_eq!(words[0], 0b10);
    }

    #[test]
    fn test_tid_is_positive_and_per_thread() {
        let here = current_tid();
        let there = std::thread::spawn(current_tid).join().unwrap();
        assert!(here > 0);
        assert!(there > 0);
        assert_ne!(here, there);
    }
}
