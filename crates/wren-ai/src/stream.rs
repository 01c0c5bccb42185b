//! Streaming text utilities

use std::pin::Pin;
use tokio_stream::Stream;

use crate::error::Result;

/// A stream of text deltas from a completion
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Build a stream that yields the given chunks in order.
pub fn from_chunks<I, S>(chunks: I) -> TextStream
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let items: Vec<Result<String>> = chunks.into_iter().map(|c| Ok(c.into())).collect();
    Box::pin(tokio_stream::iter(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_from_chunks_yields_in_order() {
        let chunks: Vec<String> = from_chunks(["Hel", "lo", "!"])
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec!["Hel", "lo", "!"]);
    }
}
