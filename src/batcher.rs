use crate::types::Message;
use std::mem;

/// Buffers translated messages until a batch is due.
#[derive(Debug)]
pub struct Batcher {
    batch_size: usize,
    buffer: Vec<Message>,
}

impl Batcher {
    /// `batch_size` of zero is treated as one.
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            buffer: Vec::with_capacity(batch_size),
        }
    }

    pub fn offer(&mut self, message: Message) {
        self.buffer.push(message);
    }

    /// Due once the buffer is full, or when the last file of the run is done
    /// and anything is left over. Never due while empty.
    pub fn should_flush(&self, is_last_file: bool) -> bool {
        self.buffer.len() >= self.batch_size || (is_last_file && !self.buffer.is_empty())
    }

    pub fn pending(&self) -> &[Message] {
        &self.buffer
    }

    pub fn drain(&mut self) -> Vec<Message> {
        mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size))
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AliasMessage;

    fn message(n: usize) -> Message {
        AliasMessage::new(&format!("u{n}"), "d", "2022-01-01T00:00:00.000Z").into()
    }

    /// Streams `per_file` counts through a batcher, flushing the way the
    /// importer does, and returns the size of every flush.
    fn flush_sizes(batch_size: usize, per_file: &[usize]) -> Vec<usize> {
        let mut batcher = Batcher::new(batch_size);
        let mut flushes = Vec::new();
        let mut n = 0;
        for (index, &count) in per_file.iter().enumerate() {
            for _ in 0..count {
                batcher.offer(message(n));
                n += 1;
                if batcher.should_flush(false) {
                    flushes.push(batcher.drain().len());
                }
            }
            if batcher.should_flush(index + 1 == per_file.len()) {
                flushes.push(batcher.drain().len());
            }
        }
        flushes
    }

    #[test]
    fn not_due_below_threshold() {
        let mut batcher = Batcher::new(3);
        batcher.offer(message(0));
        batcher.offer(message(1));
        assert!(!batcher.should_flush(false));
    }

    #[test]
    fn due_at_threshold() {
        let mut batcher = Batcher::new(2);
        batcher.offer(message(0));
        batcher.offer(message(1));
        assert!(batcher.should_flush(false));
    }

    #[test]
    fn last_file_forces_partial_flush() {
        let mut batcher = Batcher::new(10);
        batcher.offer(message(0));
        assert!(batcher.should_flush(true));
    }

    #[test]
    fn empty_buffer_is_never_due() {
        let batcher = Batcher::new(1);
        assert!(!batcher.should_flush(true));
        assert!(!batcher.should_flush(false));
    }

    #[test]
    fn drain_preserves_order_and_empties_buffer() {
        let mut batcher = Batcher::new(5);
        for n in 0..3 {
            batcher.offer(message(n));
        }
        let drained = batcher.drain();
        assert!(batcher.is_empty());
        let primaries: Vec<_> = drained
            .iter()
            .map(|m| match m {
                Message::Alias(a) => a.primary().to_string(),
                Message::Event(_) => unreachable!(),
            })
            .collect();
        assert_eq!(primaries, ["u0", "u1", "u2"]);
    }

    #[test]
    fn remainder_lands_in_last_flush() {
        // 13 messages, batch size 5 -> 5, 5, 3
        assert_eq!(flush_sizes(5, &[4, 6, 3]), vec![5, 5, 3]);
    }

    #[test]
    fn exact_multiple_has_no_empty_flush() {
        assert_eq!(flush_sizes(5, &[5, 5]), vec![5, 5]);
        assert_eq!(flush_sizes(3, &[2, 0, 4]), vec![3, 3]);
    }

    #[test]
    fn flush_count_is_ceiling_of_messages_over_batch_size() {
        let cases: [&[usize]; 4] = [&[1, 2, 3], &[7], &[0, 0, 9], &[4, 4, 4, 1]];
        for batch_size in 1..7 {
            for per_file in cases {
                let total: usize = per_file.iter().sum();
                let sizes = flush_sizes(batch_size, per_file);
                assert_eq!(sizes.len(), total.div_ceil(batch_size));
                assert_eq!(sizes.iter().sum::<usize>(), total);
                assert!(sizes.iter().all(|&s| s > 0 && s <= batch_size));
                let expected_last = match total % batch_size {
                    0 => batch_size,
                    r => r,
                };
                assert_eq!(sizes.last().copied(), Some(expected_last));
            }
        }
    }

    #[test]
    fn zero_batch_size_is_clamped() {
        assert_eq!(Batcher::new(0).batch_size(), 1);
    }
}
