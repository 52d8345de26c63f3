/// Scripted content source for tests.
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::content::{ContentSnapshot, ContentSource, FetchError};

type Script = Box<dyn FnMut(usize) -> Result<ContentSnapshot, FetchError> + Send>;

pub struct ScriptedSource {
    script: Script,
    auth: Box<dyn FnMut(usize) -> Result<(), FetchError> + Send>,
    delay: Option<Duration>,
    fetches: Arc<AtomicUsize>,
    auths: Arc<AtomicUsize>,
}

impl ScriptedSource {
    /// `script` receives the zero-based fetch number
    pub fn new(
        script: impl FnMut(usize) -> Result<ContentSnapshot, FetchError> + Send + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            auth: Box::new(|_| Ok(())),
            delay: None,
            fetches: Arc::new(AtomicUsize::new(0)),
            auths: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_auth(
        mut self,
        auth: impl FnMut(usize) -> Result<(), FetchError> + Send + 'static,
    ) -> Self {
        self.auth = Box::new(auth);
        self
    }

    /// Every fetch waits this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Count into shared counters, so a rebuilt source continues the script numbering
    pub fn with_counters(mut self, fetches: Arc<AtomicUsize>, auths: Arc<AtomicUsize>) -> Self {
        self.fetches = fetches;
        self.auths = auths;
        self
    }

    pub fn fetch_counter(&self) -> Arc<AtomicUsize> {
        self.fetches.clone()
    }

    pub fn auth_counter(&self) -> Arc<AtomicUsize> {
        self.auths.clone()
    }
}

impl ContentSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn authenticate(&mut self) -> Result<(), FetchError> {
        let n = self.auths.fetch_add(1, Ordering::SeqCst);
        (self.auth)(n)
    }

    async fn fetch(&mut self) -> Result<ContentSnapshot, FetchError> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.script)(n)
    }
}
