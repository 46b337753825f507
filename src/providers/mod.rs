//! External provider contracts
//!
//! The language model and embedding provider are host concerns. The core
//! consumes them through these object-safe traits and never references a
//! concrete backend. Futures are boxed so providers can live behind
//! `Arc<dyn ...>` the way the store traits do.

pub mod local;

use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use tokio::sync::watch;

pub use local::HashProjectionEmbedder;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Language model invocation: prompt in, text out.
///
/// Implementations should poll `cancel` and abort in-flight work when it
/// fires; the caller owns the timeout that fires it.
pub trait LanguageModel: Send + Sync {
    fn invoke<'a>(&'a self, prompt: &'a str, cancel: CancelToken) -> BoxFuture<'a, Result<String>>;
}

/// Fixed-dimension text embeddings
pub trait EmbeddingProvider: Send + Sync {
    fn embed_query<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>>;

    fn embed_documents<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;

    fn dimension(&self) -> usize;
}

// ============================================================================
// Cancellation
// ============================================================================

/// Create a linked cancellation pair. The source side fires the signal; any
/// number of token clones observe it.
pub fn cancel_pair() -> (CancelSource, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelSource { tx }, CancelToken { rx })
}

/// Owner side of a cancellation signal. One per request; dropping it without
/// calling `cancel` leaves the tokens unsignalled.
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Observer side of a cancellation signal, passed by value through every
/// awaiting call.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Non-blocking check
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve when the signal fires. Also resolves if the source is dropped
    /// unsignalled, so providers never hang on a dead request.
    pub async fn cancelled(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
    }

    /// A token that never fires, for call sites without a request scope
    pub fn never() -> Self {
        lazy_static::lazy_static! {
            static ref NEVER: watch::Sender<bool> = {
                let (tx, _rx) = watch::channel(false);
                tx
            };
        }
        Self {
            rx: NEVER.subscribe(),
        }
    }
}
