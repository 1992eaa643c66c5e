//! Background writer thread for disk persistence.
//!
//! Encoding a page to PNG and writing it out is slow compared to a frame,
//! so warm pages are handed to a dedicated thread. Writes are best-effort:
//! failures are logged and dropped. Jobs run in submission order, which keeps
//! a warm-complete marker behind the page blobs it vouches for.

use image::RgbaImage;
use std::io;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::codec::encode_png;
use crate::disk::BlobStore;
use crate::CacheError;

enum PersistJob {
    Blob { key: String, bytes: Vec<u8> },
    Bitmap { key: String, image: Arc<RgbaImage> },
    Flush(Sender<()>),
}

/// Dedicated persistence thread
///
/// Dropping the writer closes its queue, lets pending writes finish and
/// joins the thread.
pub struct PersistWriter {
    sender: Option<Sender<PersistJob>>,
    thread: Option<JoinHandle<()>>,
}

impl PersistWriter {
    /// Spawn a writer thread over `store`
    pub fn spawn(store: Arc<dyn BlobStore>) -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<PersistJob>();

        let thread = thread::Builder::new().name("pageflow-persist".to_string()).spawn(move || {
            while let Ok(job) = receiver.recv() {
                match job {
                    PersistJob::Blob { key, bytes } => {
                        if let Err(e) = store.put(&key, &bytes) {
                            log::debug!("persist {} failed: {}", key, e);
                        }
                    }
                    PersistJob::Bitmap { key, image } => {
                        let result = encode_png(&image).and_then(|bytes| store.put(&key, &bytes));
                        if let Err(e) = result {
                            log::debug!("persist {} failed: {}", key, e);
                        }
                    }
                    PersistJob::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            log::trace!("persist writer exiting");
        })?;

        Ok(Self { sender: Some(sender), thread: Some(thread) })
    }

    fn submit(&self, job: PersistJob) -> Result<(), CacheError> {
        let sender = self.sender.as_ref().ok_or(CacheError::WriterClosed)?;
        sender.send(job).map_err(|_| CacheError::WriterClosed)
    }

    /// Queue raw bytes under `key`
    pub fn submit_blob(&self, key: String, bytes: Vec<u8>) -> Result<(), CacheError> {
        self.submit(PersistJob::Blob { key, bytes })
    }

    /// Queue a bitmap to be PNG-encoded and stored under `key`
    pub fn submit_bitmap(&self, key: String, image: Arc<RgbaImage>) -> Result<(), CacheError> {
        self.submit(PersistJob::Bitmap { key, image })
    }

    /// Block until every job queued so far has been processed
    pub fn flush(&self) {
        let (done, wait) = mpsc::channel();
        if self.submit(PersistJob::Flush(done)).is_ok() {
            let _ = wait.recv();
        }
    }
}

impl Drop for PersistWriter {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_png;
    use crate::disk::MemoryBlobStore;

    #[test]
    fn test_blob_written_after_flush() {
        let store = MemoryBlobStore::new();
        let writer = PersistWriter::spawn(Arc::new(store.clone())).unwrap();

        writer.submit_blob("k".to_string(), vec![1, 2]).unwrap();
        writer.flush();

        assert_eq!(store.get("k").unwrap(), Some(vec![1, 2]));
    }

    #[test]
    fn test_bitmap_is_encoded() {
        let store = MemoryBlobStore::new();
        let writer = PersistWriter::spawn(Arc::new(store.clone())).unwrap();

        writer.submit_bitmap("page".to_string(), Arc::new(RgbaImage::new(5, 3))).unwrap();
        writer.flush();

        let blob = store.get("page").unwrap().expect("bitmap should be stored");
        assert_eq!(decode_png(&blob).unwrap().dimensions(), (5, 3));
    }

    #[test]
    fn test_drop_drains_queue() {
        let store = MemoryBlobStore::new();
        {
            let writer = PersistWriter::spawn(Arc::new(store.clone())).unwrap();
            for i in 0..10 {
                writer.submit_blob(format!("k{i}"), vec![i as u8]).unwrap();
            }
        }

        assert_eq!(store.len(), 10);
    }
}
