//! Adapts native engine cursors into a uniform pull-based sequence of pairs.
//!
//! Engines hand out either pull cursors (async `next`/`close`) or callback
//! cursors (`next(cb)`/`end(cb)`). The shape is picked once when the cursor
//! is opened; callback cursors are bridged with one oneshot channel per step.
//!
//! The native cursor is released exactly once: on exhaustion, on error, or
//! on an explicit [`Cursor::close`]. A cursor dropped while still open is
//! closed on a best-effort basis and logged.

use common::storage::{CallbackCursor, EngineError, EngineRecord, EngineResult};
use common::{Engine, IteratorOptions, NativeCursor};
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::key::Key;
use crate::model::Pair;

/// A live, non-restartable cursor over an engine range scan.
pub(crate) struct Cursor {
    native: Option<NativeCursor>,
}

impl Cursor {
    /// Opens a fresh cursor on `engine`.
    pub(crate) async fn open(engine: &dyn Engine, options: IteratorOptions) -> Result<Self> {
        let native = engine
            .iterator(options)
            .await
            .map_err(|e| Error::ReadFailed(e.to_string()))?;
        tracing::trace!(shape = %native.shape(), "opened cursor");
        Ok(Self {
            native: Some(native),
        })
    }

    #[cfg(test)]
    pub(crate) fn from_native(native: NativeCursor) -> Self {
        Self {
            native: Some(native),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.native.is_none()
    }

    /// Pulls the next pair. Returns `None` forever once the cursor is closed.
    pub(crate) async fn next(&mut self) -> Result<Option<Pair>> {
        let step = match self.native.as_mut() {
            None => return Ok(None),
            Some(NativeCursor::Pull(cursor)) => cursor.next().await,
            Some(NativeCursor::Callback(cursor)) => next_via_callback(cursor.as_mut()).await,
        };

        match step {
            Ok(Some(record)) => match decode(record) {
                Ok(pair) => Ok(Some(pair)),
                Err(err) => {
                    self.close_after_error().await;
                    Err(err)
                }
            },
            Ok(None) => {
                self.close().await?;
                Ok(None)
            }
            Err(e) => {
                self.close_after_error().await;
                Err(Error::ReadFailed(e.to_string()))
            }
        }
    }

    /// Releases the native cursor. Idempotent.
    pub(crate) async fn close(&mut self) -> Result<()> {
        let result = match self.native.take() {
            None => return Ok(()),
            Some(NativeCursor::Pull(mut cursor)) => cursor.close().await,
            Some(NativeCursor::Callback(mut cursor)) => end_via_callback(cursor.as_mut()).await,
        };
        tracing::trace!("closed cursor");
        result.map_err(|e| Error::ReadFailed(format!("failed to close cursor: {}", e)))
    }

    /// Closes the cursor while another error is already propagating.
    async fn close_after_error(&mut self) {
        if let Err(err) = self.close().await {
            tracing::warn!(error = %err, "failed to close cursor after error");
        }
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        let Some(native) = self.native.take() else {
            return;
        };
        tracing::warn!("cursor dropped without being closed");
        match native {
            NativeCursor::Callback(mut cursor) => cursor.end(Box::new(|result| {
                if let Err(err) = result {
                    tracing::warn!(error = %err, "failed to end dropped cursor");
                }
            })),
            NativeCursor::Pull(mut cursor) => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(err) = cursor.close().await {
                            tracing::warn!(error = %err, "failed to close dropped cursor");
                        }
                    });
                }
                Err(_) => tracing::warn!("no runtime available to close dropped cursor"),
            },
        }
    }
}

/// Engine keys outside the canonical form are corrupt data, not caller error.
fn decode(record: EngineRecord) -> Result<Pair> {
    let key = Key::from_bytes(&record.key).map_err(|e| match e {
        Error::InvalidKey(msg) => Error::ReadFailed(format!("undecodable engine key: {}", msg)),
        other => other,
    })?;
    Ok(Pair {
        key,
        value: record.value,
    })
}

async fn next_via_callback(cursor: &mut dyn CallbackCursor) -> EngineResult<Option<EngineRecord>> {
    let (tx, rx) = oneshot::channel();
    cursor.next(Box::new(move |result| {
        let _ = tx.send(result);
    }));
    rx.await
        .map_err(|_| EngineError::Internal("cursor dropped its next callback".to_string()))?
}

async fn end_via_callback(cursor: &mut dyn CallbackCursor) -> EngineResult<()> {
    let (tx, rx) = oneshot::channel();
    cursor.end(Box::new(move |result| {
        let _ = tx.send(result);
    }));
    rx.await
        .map_err(|_| EngineError::Internal("cursor dropped its end callback".to_string()))?
}
