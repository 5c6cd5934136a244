// Pinning Config

/*
 * ALPHA SOVEREIGN - PINNING CONFIGURATION LOADER
 * =================================================================
 * Component Name: src/utils/config_loader.rs
 * Core Responsibility: تحميل إعدادات التثبيت (الأنوية، المهلة، السجلات) من ملف TOML ومتغيرات البيئة (Adaptability Pillar).
 * Design Pattern: Layered Sources (File < Environment)
 * Forensic Impact: الإعدادات غير الصالحة تُرفض قبل إنشاء أي خيط، مع سبب واضح.
 * =================================================================
 */

use std::path::Path;
use std::time::Duration;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use tracing::info;

use crate::affinity::{Affinity, AffinityMask};
use crate::error::{ErrorKind, ThreadError, ThreadResult};

/// البادئة الافتراضية لمتغيرات البيئة: ALPHA_PIN_TIMEOUT_MS، ALPHA_PIN_CORES=1,2 ...
pub const ENV_PREFIX: &str = "ALPHA_PIN";

/// أعلى فهرس نواة مقبول من الإعدادات (128 كلمة من 64 بت).
pub const MAX_CORE_INDEX: usize = 8191;
const MAX_MASK_WORDS: usize = MAX_CORE_INDEX / 64 + 1;

// =================================================================
// تعريفات هيكل الإعدادات (Configuration Schema)
// =================================================================

#[derive(Debug, Deserialize, Clone)]
pub struct PinningConfig {
    /// فهارس الأنوية (الأبسط للبشر).
    #[serde(default)]
    pub cores: Option<Vec<usize>>,
    /// أو القناع الخام بالكلمات (الكلمة الأخيرة = الأنوية 0..63).
    #[serde(default)]
    pub mask_words: Option<Vec<u64>>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_log_file")]
    pub log_file: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_worker_name")]
    pub worker_name: String,
}

fn default_timeout_ms() -> u64 {
    50
}

fn default_log_dir() -> String {
    "./logs".to_string()
}

fn default_log_file() -> String {
    "alpha_pin.log".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_worker_name() -> String {
    "pt".to_string()
}

impl Default for PinningConfig {
    fn default() -> Self {
        Self {
            cores: None,
            mask_words: None,
            timeout_ms: default_timeout_ms(),
            log_dir: default_log_dir(),
            log_file: default_log_file(),
            log_level: default_log_level(),
            worker_name: default_worker_name(),
        }
    }
}

impl PinningConfig {
    /// تحميل الإعدادات: ملف اختياري ثم متغيرات ALPHA_PIN_* فوقه.
    pub fn load(path: Option<&Path>) -> ThreadResult<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> ThreadResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(env_prefix)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("cores")
                    .with_list_parse_key("mask_words"),
            )
            .build()
            .map_err(|e| ThreadError::new(ErrorKind::Config, format!("Build Error: {}", e)))?;

        let loaded = settings
            .try_deserialize::<PinningConfig>()
            .map_err(|e| ThreadError::new(ErrorKind::Config, format!("Parse Error: {}", e)))?;

        loaded.validate()?;
        info!(
            "CONFIG: Pinning configuration loaded (cores={:?}, timeout={}ms)",
            loaded.affinity().cores(),
            loaded.timeout_ms
        );
        Ok(loaded)
    }

    pub fn validate(&self) -> ThreadResult<()> {
        if self.cores.is_some() && self.mask_words.is_some() {
            return Err(ThreadError::new(ErrorKind::Config, "set either cores or mask_words, not both"));
        }
        if let Some(cores) = &self.cores {
            if cores.is_empty() {
                return Err(ThreadError::new(ErrorKind::Config, "cores must list at least one core"));
            }
            // قبل بناء القناع: فهرس ضخم يعني تخصيصاً بحجمه
            if let Some(core) = cores.iter().find(|c| **c > MAX_CORE_INDEX) {
                return Err(ThreadError::new(
                    ErrorKind::Config,
                    format!("core {} exceeds the highest supported index {}", core, MAX_CORE_INDEX),
                ));
            }
        }
        if let Some(words) = &self.mask_words {
            if words.len() > MAX_MASK_WORDS {
                return Err(ThreadError::new(
                    ErrorKind::Config,
                    format!("mask_words has {} words, at most {} are supported", words.len(), MAX_MASK_WORDS),
                ));
            }
        }
        self.affinity()
            .mask()
            .validate()
            .map_err(|e| ThreadError::wrap(ErrorKind::Config, "mask rejected", e))?;
        if self.timeout_ms == 0 {
            return Err(ThreadError::new(ErrorKind::Config, "timeout_ms must be positive"));
        }
        if self.worker_name.is_empty() {
            return Err(ThreadError::new(ErrorKind::Config, "worker_name must not be empty"));
        }
        Ok(())
    }

    /// التقارب المطلوب. بدون أنوية ولا قناع: النواة 0.
    pub fn affinity(&self) -> Affinity {
        match (&self.mask_words, &self.cores) {
            (Some(words), _) => Affinity::new(AffinityMask::new(words.clone())),
            (None, Some(cores)) => Affinity::from_cores(cores),
            (None, None) => Affinity::from_cores(&[0]),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
