// src/services/uploader.rs

//! Batched chapter upload.

use crate::error::{AppError, Result};
use crate::models::{Book, Chapter};
use crate::services::RemoteStore;
use crate::utils::{CancelFlag, log};

/// How far an upload got.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadProgress {
    pub uploaded: usize,
    pub total: usize,
}

impl UploadProgress {
    pub fn is_complete(&self) -> bool {
        self.uploaded == self.total
    }
}

/// Sends chapters to the remote in fixed-size batches, in the given order.
pub struct BatchUploader<'a> {
    remote: &'a dyn RemoteStore,
    batch_size: usize,
}

impl<'a> BatchUploader<'a> {
    pub fn new(remote: &'a dyn RemoteStore, batch_size: usize) -> Self {
        Self {
            remote,
            batch_size: batch_size.max(1),
        }
    }

    /// Upload `chapters` with the book's metadata attached to every batch.
    ///
    /// A failed batch stops the loop; the error carries the count of
    /// chapters acknowledged before it, whatever the cause. Cancellation is honored between
    /// batches and returns the partial progress.
    pub async fn upload(
        &self,
        book: &Book,
        chapters: &[Chapter],
        cancel: &CancelFlag,
    ) -> Result<UploadProgress> {
        let metadata = book.metadata();
        let mut progress = UploadProgress {
            uploaded: 0,
            total: chapters.len(),
        };

        for batch in chapters.chunks(self.batch_size) {
            if cancel.is_cancelled() {
                ::log::warn!(
                    "Upload of {} interrupted at {}/{}",
                    book.key(),
                    progress.uploaded,
                    progress.total
                );
                break;
            }

            let accepted = self
                .remote
                .upload_book(&metadata, batch)
                .await
                .map_err(|e| AppError::upload(progress.uploaded, progress.total, e))?;
            if accepted != batch.len() {
                ::log::warn!(
                    "Remote accepted {} of {} chapters in a batch for {}",
                    accepted,
                    batch.len(),
                    book.key()
                );
            }

            progress.uploaded += batch.len();
            log::progress("upload", progress.uploaded, progress.total, book.key());
        }

        Ok(progress)
    }
}
