use std::collections::VecDeque;

/// Time-ordered buffer that keeps only items within `span` seconds of the newest one.
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
    span: f64,
    items: VecDeque<(f64, T)>,
}

impl<T> RollingWindow<T> {
    pub fn new(span: f64) -> Self {
        Self {
            span,
            items: VecDeque::new(),
        }
    }

    /// Appends and evicts everything older than `ts - span`.
    pub fn push(&mut self, ts: f64, item: T) {
        self.items.push_back((ts, item));
        while let Some((front, _)) = self.items.front() {
            if ts - *front > self.span {
                self.items.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &(f64, T)> + ExactSizeIterator {
        self.items.iter()
    }

    pub fn values(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter().map(|(_, item)| item)
    }

    /// Items whose timestamp lies within `radius` of `center`.
    pub fn around(&self, center: f64, radius: f64) -> impl Iterator<Item = &T> {
        self.items
            .iter()
            .filter(move |(ts, _)| (ts - center).abs() <= radius)
            .map(|(_, item)| item)
    }
}
