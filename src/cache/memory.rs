use crate::cache::{CacheError, CacheResult, UrlCache};
use std::collections::HashSet;
use std::sync::Mutex;

/// In-memory URL cache for crawls that are never resumed
#[derive(Debug, Default)]
pub struct MemoryUrlCache {
    urls: Mutex<HashSet<String>>,
}

impl MemoryUrlCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> CacheResult<std::sync::MutexGuard<'_, HashSet<String>>> {
        self.urls.lock().map_err(|_| CacheError::Poisoned)
    }
}

impl UrlCache for MemoryUrlCache {
    fn add(&self, url: &str) -> CacheResult<bool> {
        Ok(self.lock()?.insert(url.to_string()))
    }

    fn add_many(&self, urls: &[String]) -> CacheResult<usize> {
        let mut set = self.lock()?;
        Ok(urls.iter().filter(|url| set.insert((*url).clone())).count())
    }

    fn contains(&self, url: &str) -> CacheResult<bool> {
        Ok(self.lock()?.contains(url))
    }

    fn len(&self) -> CacheResult<usize> {
        Ok(self.lock()?.len())
    }

    fn items(&self) -> CacheResult<Vec<String>> {
        Ok(self.lock()?.iter().cloned().collect())
    }
}
