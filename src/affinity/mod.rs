/*
 * ALPHA SOVEREIGN - AFFINITY MASK MODEL
 * =================================================================
 * Component Name: src/affinity/mod.rs
 * Core Responsibility: تمثيل "جغرافيا الأنوية" كقناع بتات بعرض غير محدود (Performance Pillar).
 * Design Pattern: Value Object (Immutable)
 * Forensic Impact: القناع المطلوب والقناع المطبق فعلياً يُحفظان معاً، فنعرف دائماً ما الذي أسقطته النواة (cgroups).
 * =================================================================
 */

use std::fmt;
use crate::error::{ThreadError, ThreadResult};

pub mod controller;

pub use controller::AffinityController;

const WORD_BITS: usize = 64;

/// قناع الأنوية: مصفوفة كلمات 64-بت تُقرأ من اليمين إلى اليسار.
/// الكلمة الأخيرة تحمل الأنوية 0..63، والتي قبلها 64..127، وهكذا.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AffinityMask {
    words: Vec<u64>,
}

impl AffinityMask {
    pub fn new(words: Vec<u64>) -> Self {
        Self { words }
    }

    /// بناء القناع من أرقام الأنوية مباشرة.
    pub fn from_cores(cores: &[usize]) -> Self {
        let highest = cores.iter().copied().max().unwrap_or(0);
        let len = highest / WORD_BITS + 1;
        let mut words = vec![0u64; len];

        for &core in cores {
            let index = len - 1 - core / WORD_BITS;
            words[index] |= 1u64 << (core % WORD_BITS);
        }

        Self { words }
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// الكلمة رقم `i` بدءاً من الأقل أهمية (i = 0 تعني الأنوية 0..63).
    pub fn word(&self, i: usize) -> Option<u64> {
        if i >= self.words.len() {
            return None;
        }
        Some(self.words[self.words.len() - 1 - i])
    }

    pub fn has_marked_core(&self) -> bool {
        self.words.iter().any(|w| *w != 0)
    }

    /// الشرط المسبق لأي استدعاء `set_affinity`: كلمة واحدة على الأقل ونواة واحدة على الأقل.
    pub fn validate(&self) -> ThreadResult<()> {
        if self.words.is_empty() {
            return Err(ThreadError::validation("Supplied affinity mask needs at least one element."));
        }
        if !self.has_marked_core() {
            return Err(ThreadError::validation("Supplied affinity mask needs at least one marked core."));
        }
        Ok(())
    }

    /// أرقام الأنوية المفعلة، تصاعدياً.
    pub fn cores(&self) -> Vec<usize> {
        let mut cores = Vec::new();
        for i in 0..self.words.len() {
            let word = self.word(i).unwrap_or(0);
            for bit in 0..WORD_BITS {
                if word & (1u64 << bit) != 0 {
                    cores.push(i * WORD_BITS + bit);
                }
            }
        }
        cores
    }

    pub fn count_cores(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// مقارنة كلمة بكلمة من الطرف الأقل أهمية، حيثما وُجدت كلمة في الطرفين.
    /// يعيد أول موضع اختلاف: (index من اليمين، المطلوب، المطبق).
    pub fn first_mismatch(&self, applied: &AffinityMask) -> Option<(usize, u64, u64)> {
        let shared = self.len().min(applied.len());
        (0..shared).find_map(|i| {
            let requested = self.word(i).unwrap_or(0);
            let actual = applied.word(i).unwrap_or(0);
            (requested != actual).then_some((i, requested, actual))
        })
    }

    /// هل كل نواة في `self` موجودة في `other` (بمحاذاة اليمين)؟
    pub fn is_subset_of(&self, other: &AffinityMask) -> bool {
        (0..self.len()).all(|i| {
            let mine = self.word(i).unwrap_or(0);
            let theirs = other.word(i).unwrap_or(0);
            mine & !theirs == 0
        })
    }
}

impl fmt::Display for AffinityMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, word) in self.words.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{:#018x}", word)?;
        }
        f.write_str("]")
    }
}

/// التقارب (Affinity): ما طلبه المستدعي، أو ما طبقته النواة فعلاً.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Affinity {
    mask: AffinityMask,
}

impl Affinity {
    pub fn new(mask: AffinityMask) -> Self {
        Self { mask }
    }

    pub fn from_words(words: Vec<u64>) -> Self {
        Self::new(AffinityMask::new(words))
    }

    pub fn from_cores(cores: &[usize]) -> Self {
        Self::new(AffinityMask::from_cores(cores))
    }

    /// تقارب فارغ (قبل أي تطبيق).
    pub fn empty() -> Self {
        Self::new(AffinityMask::new(Vec::new()))
    }

    pub fn mask(&self) -> &AffinityMask {
        &self.mask
    }

    pub fn cores(&self) -> Vec<usize> {
        self.mask.cores()
    }
}

impl From<AffinityMask> for Affinity {
    fn from(mask: AffinityMask) -> Self {
        Self::new(mask)
    }
}

impl fmt::Display for Affinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mask)
    }
}
