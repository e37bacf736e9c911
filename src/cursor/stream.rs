//! `futures::Stream` view of a cursor.

use futures::Stream;
use tracing::debug;

use super::Cursor;
use crate::connection::ChannelProvider;
use crate::error::{CursorError, Result};

impl<T, P> Cursor<T, P>
where
    T: Clone + Send + 'static,
    P: ChannelProvider,
{
    /// Turn the cursor into a stream of documents
    ///
    /// The cursor is disposed when the stream reaches the end or yields an
    /// error. A stream dropped early releases the server cursor through the
    /// cursor's drop handling.
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> {
        futures::stream::try_unfold(self, |mut cursor| async move {
            match cursor.advance().await {
                Ok(true) => {
                    let item = cursor.current()?.clone();
                    Ok::<_, CursorError>(Some((item, cursor)))
                }
                Ok(false) => {
                    cursor.dispose().await?;
                    Ok(None)
                }
                Err(e) => {
                    if let Err(dispose_err) = cursor.dispose().await {
                        debug!("Dispose after stream error failed: {}", dispose_err);
                    }
                    Err(e)
                }
            }
        })
    }

    /// Read every remaining document, then dispose
    ///
    /// # Returns
    /// * `Result<Vec<T>>` - Remaining documents in server order
    pub async fn collect_remaining(mut self) -> Result<Vec<T>> {
        let mut documents = Vec::new();
        let drained = self.drain_into(&mut documents).await;
        let disposed = self.dispose().await;
        drained?;
        disposed?;
        Ok(documents)
    }

    async fn drain_into(&mut self, out: &mut Vec<T>) -> Result<()> {
        while self.advance().await? {
            out.push(self.current()?.clone());
        }
        Ok(())
    }
}
