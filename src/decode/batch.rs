// src/decode/batch.rs

/// Groups a fallible row stream into fixed-size batches.
///
/// The last batch may be short. With a row cap, the stream ends once `cap`
/// rows have been emitted and the inner iterator is not polled again.
pub struct Batches<I> {
    inner: I,
    size: usize,
    remaining: Option<usize>,
    done: bool,
}

impl<I> Batches<I> {
    pub fn new(inner: I, size: usize, cap: Option<usize>) -> Self {
        Self {
            inner,
            size: size.max(1),
            remaining: cap,
            done: false,
        }
    }

    pub fn inner(&self) -> &I {
        &self.inner
    }
}

impl<I, T, E> Iterator for Batches<I>
where
    I: Iterator<Item = Result<T, E>>,
{
    type Item = Result<Vec<T>, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let want = match self.remaining {
            Some(0) => {
                self.done = true;
                return None;
            }
            Some(left) => left.min(self.size),
            None => self.size,
        };

        let mut batch = Vec::with_capacity(want);
        while batch.len() < want {
            match self.inner.next() {
                Some(Ok(row)) => batch.push(row),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        if let Some(left) = self.remaining.as_mut() {
            *left -= batch.len();
        }
        if batch.is_empty() {
            None
        } else {
            Some(Ok(batch))
        }
    }
}

/// Batch `rows` into groups of `size`, stopping after `cap` rows if given.
pub fn batched<I>(rows: I, size: usize, cap: Option<usize>) -> Batches<I> {
    Batches::new(rows, size, cap)
}
