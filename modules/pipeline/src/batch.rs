use std::time::Duration;

/// Records of one kind waiting for the next bulk write. A flush is due when
/// the batch is non-empty and either `max_size` records are held or
/// `max_age` has passed since the last flush.
#[derive(Debug)]
pub struct Batch<R> {
    records: Vec<R>,
    max_size: usize,
    max_age: Duration,
}

impl<R> Batch<R> {
    pub fn new(max_size: usize, max_age: Duration) -> Self {
        let max_size = max_size.max(1);
        Batch { records: Vec::with_capacity(max_size), max_size, max_age }
    }

    pub fn add(&mut self, record: R) {
        self.records.push(record);
    }

    pub fn should_flush(&self, elapsed_since_last_flush: Duration) -> bool {
        !self.records.is_empty()
            && (self.records.len() >= self.max_size || elapsed_since_last_flush >= self.max_age)
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
