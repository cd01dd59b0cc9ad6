//! Content generators that turn a prompt into a stream of HTML fragments.

mod chat;

pub use chat::{ChatCompletionGenerator, ChatSettings};

use std::future::Future;

use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::Result;

/// Lazy, finite, non-restartable sequence of generated fragments.
///
/// Fragments are delivered in production order. An `Err` item ends the
/// generation; nothing after it is read.
pub type FragmentStream = BoxStream<'static, Result<Bytes>>;

/// Trait for generators that produce HTML incrementally from a prompt.
///
/// # Implementing a custom generator
///
/// ```rust,no_run
/// use bytes::Bytes;
/// use futures::StreamExt;
/// use site_forge::{ContentGenerator, FragmentStream, Result};
///
/// struct Echo;
///
/// impl ContentGenerator for Echo {
///     async fn generate(&self, prompt: &str) -> Result<FragmentStream> {
///         let page = format!("<html><body>{prompt}</body></html>");
///         Ok(futures::stream::iter([Ok(Bytes::from(page))]).boxed())
///     }
/// }
/// ```
pub trait ContentGenerator: Send + Sync + 'static {
    /// Open a fragment stream for `prompt`.
    ///
    /// Failing here means generation never started.
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<FragmentStream>> + Send;
}
