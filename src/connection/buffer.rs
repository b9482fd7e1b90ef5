//! FIFO store for messages sent while the connection is not open.

use std::collections::{VecDeque, vec_deque};

use super::payload::Payload;

/// Ordered queue of messages awaiting a live connection.
///
/// The buffer has no size bound. It is drained exactly once per transition
/// into the open state, in insertion order.
#[derive(Debug, Default)]
pub struct OutboundBuffer {
    pending: VecDeque<Payload>,
}

impl OutboundBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to the back of the queue.
    pub fn push(&mut self, payload: Payload) {
        self.pending.push_back(payload);
    }

    /// Take every queued message in insertion order, leaving the buffer empty.
    pub fn drain(&mut self) -> vec_deque::IntoIter<Payload> {
        std::mem::take(&mut self.pending).into_iter()
    }

    /// Put unsent messages back at the front, ahead of anything queued since.
    pub fn requeue_front(&mut self, unsent: impl IntoIterator<Item = Payload>) {
        let mut restored: VecDeque<Payload> = unsent.into_iter().collect();
        restored.append(&mut self.pending);
        self.pending = restored;
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> vec_deque::Iter<'_, Payload> {
        self.pending.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn texts(buffer: &OutboundBuffer) -> Vec<String> {
        buffer
            .iter()
            .map(|p| p.as_text().unwrap_or_default().to_owned())
            .collect()
    }

    #[rstest]
    fn drain_yields_insertion_order_and_empties() {
        let mut buffer = OutboundBuffer::new();
        buffer.push("a".into());
        buffer.push("b".into());
        buffer.push("c".into());

        let drained: Vec<Payload> = buffer.drain().collect();
        assert_eq!(drained, vec!["a".into(), "b".into(), "c".into()]);
        assert!(buffer.is_empty());
    }

    #[rstest]
    fn requeue_front_keeps_unsent_ahead_of_new_messages() {
        let mut buffer = OutboundBuffer::new();
        buffer.push("late".into());
        buffer.requeue_front(vec!["first".into(), "second".into()]);
        assert_eq!(texts(&buffer), ["first", "second", "late"]);
    }

    #[rstest]
    fn duplicates_are_kept() {
        let mut buffer = OutboundBuffer::new();
        buffer.push("ping".into());
        buffer.push("ping".into());
        assert_eq!(buffer.len(), 2);
    }
}
