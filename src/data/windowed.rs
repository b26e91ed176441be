//! Indexable (features, target) view used for batching

use crate::error::{ChainPerfError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::Rng;

/// Paired features and targets with random access by row.
///
/// Borrows the arrays it wraps and holds no derived state.
#[derive(Debug, Clone, Copy)]
pub struct WindowedDataset<'a> {
    features: ArrayView2<'a, f64>,
    targets: ArrayView1<'a, f64>,
}

impl<'a> WindowedDataset<'a> {
    pub fn new(features: ArrayView2<'a, f64>, targets: ArrayView1<'a, f64>) -> Result<Self> {
        if features.nrows() != targets.len() {
            return Err(ChainPerfError::ShapeError {
                expected: format!("{} targets", features.nrows()),
                actual: format!("{} targets", targets.len()),
            });
        }
        Ok(Self { features, targets })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Record `index` as `(feature_vector, target)`
    pub fn get(&self, index: usize) -> Result<(ArrayView1<'a, f64>, f64)> {
        if index >= self.len() {
            return Err(ChainPerfError::IndexOutOfBounds {
                index,
                len: self.len(),
            });
        }
        Ok((self.features.index_axis_move(Axis(0), index), self.targets[index]))
    }

    pub fn features(&self) -> ArrayView2<'a, f64> {
        self.features
    }

    pub fn targets(&self) -> ArrayView1<'a, f64> {
        self.targets
    }

    /// Mini-batches of `batch_size` rows. With an RNG the row order is
    /// shuffled first; without one rows come out in storage order.
    pub fn batches<R: Rng + ?Sized>(&self, batch_size: usize, rng: Option<&mut R>) -> BatchIter<'a> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        if let Some(rng) = rng {
            order.shuffle(rng);
        }
        BatchIter {
            data: *self,
            order,
            batch_size: batch_size.max(1),
            position: 0,
        }
    }

    /// The whole split as one batch, in storage order
    pub fn full_batch(&self) -> (Array2<f64>, Array1<f64>) {
        (self.features.to_owned(), self.targets.to_owned())
    }
}

/// Iterator over owned mini-batches
#[derive(Debug)]
pub struct BatchIter<'a> {
    data: WindowedDataset<'a>,
    order: Vec<usize>,
    batch_size: usize,
    position: usize,
}

impl Iterator for BatchIter<'_> {
    type Item = (Array2<f64>, Array1<f64>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.order.len() {
            return None;
        }
        let end = (self.position + self.batch_size).min(self.order.len());
        let rows = &self.order[self.position..end];
        self.position = end;

        Some((
            self.data.features.select(Axis(0), rows),
            self.data.targets.select(Axis(0), rows),
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.order.len() - self.position;
        let n = remaining.div_ceil(self.batch_size);
        (n, Some(n))
    }
}

impl ExactSizeIterator for BatchIter<'_> {}
