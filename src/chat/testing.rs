//! Scripted completion backend for handler and controller tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;

use super::error::{ChatError, UpstreamFailureKind};
use super::upstream::{CompletionBackend, CompletionRequest, DeltaStream};

/// What the backend does when called.
pub(crate) enum Script {
    /// Stream these deltas, then finish.
    Deltas(Vec<&'static str>),
    /// Fail before streaming.
    Fail(UpstreamFailureKind, &'static str),
    /// Stream these deltas, then never finish.
    Hang(Vec<&'static str>),
    /// Never return the stream at all.
    Stall,
}

/// Sets its flag when the owning stream is dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

pub(crate) struct ScriptedBackend {
    script: Script,
    calls: AtomicUsize,
    last_request: Mutex<Option<CompletionRequest>>,
    stream_dropped: Arc<AtomicBool>,
}

impl ScriptedBackend {
    pub(crate) fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
            stream_dropped: Arc::new(AtomicBool::new(false)),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_request(&self) -> Option<CompletionRequest> {
        self.last_request.lock().ok().and_then(|guard| guard.clone())
    }

    pub(crate) fn stream_dropped(&self) -> bool {
        self.stream_dropped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn stream_completion(&self, request: CompletionRequest) -> Result<DeltaStream, ChatError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.last_request.lock() {
            *guard = Some(request);
        }

        let owned = |deltas: &[&'static str]| -> Vec<Result<String, ChatError>> {
            deltas.iter().map(|delta| Ok((*delta).to_string())).collect()
        };

        let deltas: DeltaStream = match &self.script {
            Script::Deltas(deltas) => Box::pin(stream::iter(owned(deltas))),
            Script::Fail(kind, detail) => return Err(ChatError::upstream(*kind, *detail)),
            Script::Stall => std::future::pending().await,
            Script::Hang(deltas) => {
                Box::pin(stream::iter(owned(deltas)).chain(stream::pending()))
            }
        };

        let flag = DropFlag(Arc::clone(&self.stream_dropped));
        Ok(Box::pin(deltas.map(move |item| {
            let _owner = &flag;
            item
        })))
    }
}
