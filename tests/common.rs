use h5ar::config::ArchiveConfig;
use h5ar::facade::ArchiveFacade;
use h5ar::os_capability::UnixOs;
use h5ar::storage::memory::MemoryStorage;

/// Owns the pieces an [`ArchiveFacade`] borrows, so each test gets one
/// long-lived fixture instead of juggling lifetimes itself.
pub struct Fixture {
    pub storage: MemoryStorage,
    pub os: UnixOs,
    pub config: ArchiveConfig,
}

impl Fixture {
    pub fn new() -> Self {
        Fixture { storage: MemoryStorage::new(), os: UnixOs, config: ArchiveConfig::default() }
    }

    pub fn with_config(config: ArchiveConfig) -> Self {
        Fixture { storage: MemoryStorage::new(), os: UnixOs, config }
    }

    pub fn facade(&self) -> ArchiveFacade<'_> {
        ArchiveFacade::new(&self.storage, &self.os, self.config.clone())
    }
}

#[allow(dead_code)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).try_init();
}
