//! Bounded message pipes.
//!
//! A [`Pipe`] carries messages in one direction between two sockets. Its
//! capacity is the high-water mark agreed when the two ends were joined
//! (`0` = unbounded). The writer and reader ends hold the [`Readiness`] of
//! the socket currently on that side so that a push wakes the reader and a
//! pop out of a full pipe wakes the writer.
//!
//! Connect-side pipes outlive individual connections: they are created by
//! `connect` and handed to every peer the connection reaches, which is how
//! messages sent while reconnecting are delivered once a peer is back.

use crate::readiness::Readiness;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug)]
struct PipeInner {
    messages: VecDeque<Bytes>,
    hwm: usize,
    reader: Option<Arc<Readiness>>,
    writer: Option<Arc<Readiness>>,
}

impl PipeInner {
    fn is_full(&self) -> bool {
        self.hwm != 0 && self.messages.len() >= self.hwm
    }
}

#[derive(Debug)]
pub(crate) struct Pipe {
    inner: Mutex<PipeInner>,
}

impl Pipe {
    pub(crate) fn new(hwm: usize) -> Self {
        Self {
            inner: Mutex::new(PipeInner {
                messages: VecDeque::new(),
                hwm,
                reader: None,
                writer: None,
            }),
        }
    }

    /// Queue `msg`, handing it back if the pipe is at its high-water mark.
    pub(crate) fn push(&self, msg: Bytes) -> Result<(), Bytes> {
        let mut inner = self.inner.lock();
        if inner.is_full() {
            return Err(msg);
        }
        inner.messages.push_back(msg);
        let reader = inner.reader.clone();
        drop(inner);

        if let Some(reader) = reader {
            reader.notify();
        }
        Ok(())
    }

    pub(crate) fn pop(&self) -> Option<Bytes> {
        let mut inner = self.inner.lock();
        let was_full = inner.is_full();
        let msg = inner.messages.pop_front()?;
        let writer = if was_full { inner.writer.clone() } else { None };
        drop(inner);

        if let Some(writer) = writer {
            writer.notify();
        }
        Some(msg)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.lock().messages.is_empty()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.inner.lock().is_full()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    pub(crate) fn set_hwm(&self, hwm: usize) {
        let mut inner = self.inner.lock();
        let was_full = inner.is_full();
        inner.hwm = hwm;
        let writer = if was_full && !inner.is_full() {
            inner.writer.clone()
        } else {
            None
        };
        drop(inner);

        if let Some(writer) = writer {
            writer.notify();
        }
    }

    pub(crate) fn set_reader(&self, reader: Option<Arc<Readiness>>) {
        self.inner.lock().reader = reader;
    }

    pub(crate) fn set_writer(&self, writer: Option<Arc<Readiness>>) {
        self.inner.lock().writer = writer;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let pipe = Pipe::new(0);
        for i in 0..5u8 {
            pipe.push(Bytes::from(vec![i])).unwrap();
        }
        assert_eq!(pipe.len(), 5);
        for i in 0..5u8 {
            assert_eq!(pipe.pop().unwrap(), Bytes::from(vec![i]));
        }
        assert!(pipe.pop().is_none());
        assert!(pipe.is_empty());
    }

    #[test]
    fn test_hwm_hands_message_back() {
        let pipe = Pipe::new(2);
        pipe.push(Bytes::from_static(b"a")).unwrap();
        pipe.push(Bytes::from_static(b"b")).unwrap();
        assert!(pipe.is_full());

        let rejected = pipe.push(Bytes::from_static(b"c")).unwrap_err();
        assert_eq!(rejected, Bytes::from_static(b"c"));

        pipe.pop();
        assert!(pipe.push(rejected).is_ok());
    }

    #[test]
    fn test_push_notifies_reader() {
        let pipe = Pipe::new(0);
        let reader = Arc::new(Readiness::new());
        pipe.set_reader(Some(Arc::clone(&reader)));

        let before = reader.generation();
        pipe.push(Bytes::from_static(b"x")).unwrap();
        assert_ne!(reader.generation(), before);
    }

    #[test]
    fn test_pop_from_full_pipe_notifies_writer() {
        let pipe = Pipe::new(1);
        let writer = Arc::new(Readiness::new());
        pipe.set_writer(Some(Arc::clone(&writer)));

        pipe.push(Bytes::from_static(b"x")).unwrap();
        let before = writer.generation();
        pipe.pop();
        assert_ne!(writer.generation(), before);
    }

    #[test]
    fn test_raising_hwm_unblocks_writer() {
        let pipe = Pipe::new(1);
        let writer = Arc::new(Readiness::new());
        pipe.set_writer(Some(Arc::clone(&writer)));
        pipe.push(Bytes::from_static(b"x")).unwrap();

        let before = writer.generation();
        pipe.set_hwm(4);
        assert!(!pipe.is_full());
        assert_ne!(writer.generation(), before);
    }
}
