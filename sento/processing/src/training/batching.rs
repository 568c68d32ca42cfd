/// Endless sequence of batch sizes growing (or shrinking) geometrically from `start` towards `stop`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Compounding {
    current: f64,
    stop: f64,
    factor: f64,
}

/// Batch sizes `start`, `start * factor`, `start * factor²`, … clipped at `stop`.
#[must_use]
pub const fn compounding(start: f64, stop: f64, factor: f64) -> Compounding {
    Compounding {
        current: start,
        stop,
        factor,
    }
}

impl Compounding {
    fn clip(&self, value: f64) -> f64 {
        if self.factor >= 1.0 {
            value.min(self.stop)
        } else {
            value.max(self.stop)
        }
    }
}

impl Iterator for Compounding {
    type Item = usize;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn next(&mut self) -> Option<usize> {
        let size = self.clip(self.current);
        self.current *= self.factor;
        Some((size as usize).max(1))
    }
}

/// Consecutive slices of `items`, each as long as the next size yielded by `sizes`.
#[derive(Debug, Clone)]
pub struct Minibatches<'a, T, S> {
    items: &'a [T],
    sizes: S,
}

/// Splits `items` into minibatches following `sizes`. The last batch may be shorter.
pub fn minibatch<T, S>(items: &[T], sizes: S) -> Minibatches<'_, T, S>
where
    S: Iterator<Item = usize>,
{
    Minibatches { items, sizes }
}

impl<'a, T, S> Iterator for Minibatches<'a, T, S>
where
    S: Iterator<Item = usize>,
{
    type Item = &'a [T];

    fn next(&mut self) -> Option<Self::Item> {
        if self.items.is_empty() {
            return None;
        }
        let size = self.sizes.next()?.clamp(1, self.items.len());
        let (batch, rest) = self.items.split_at(size);
        self.items = rest;
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compounding_grows_until_stop() {
        let sizes: Vec<usize> = compounding(1.0, 8.0, 2.0).take(6).collect();
        assert_eq!(sizes, vec![1, 2, 4, 8, 8, 8]);
    }

    #[test]
    fn slow_compounding_holds_start_size() {
        let mut sizes = compounding(4.0, 32.0, 1.001);
        assert!(sizes.by_ref().take(200).all(|size| size == 4));
        assert_eq!(sizes.nth(10_000), Some(32));
    }

    #[test]
    fn shrinking_schedule_clips_at_stop() {
        let sizes: Vec<usize> = compounding(8.0, 2.0, 0.5).take(4).collect();
        assert_eq!(sizes, vec![8, 4, 2, 2]);
    }

    #[test]
    fn minibatch_covers_every_item_once() {
        let items: Vec<u32> = (0..10).collect();
        let batches: Vec<&[u32]> = minibatch(&items, compounding(3.0, 4.0, 2.0)).collect();
        assert_eq!(batches, vec![&[0, 1, 2][..], &[3, 4, 5, 6], &[7, 8, 9]]);
    }
}
