use ndarray::ArrayViewMut1;

/// Decides which incoming edges of a node stay eligible for sampling.
///
/// Implementations receive the softmax probabilities of one argument and may
/// zero some of them; the network renormalises the remainder.
pub trait Sparsifier: Send + Sync {
    fn sparsify(&self, probabilities: ArrayViewMut1<f64>);
}

/// Keep every edge
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSparse;

impl Sparsifier for NoSparse {
    fn sparsify(&self, _probabilities: ArrayViewMut1<f64>) {}
}

/// Drop edges whose probability is below a threshold.
///
/// The most probable edge is always kept so every argument stays connected.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdSparse {
    threshold: f64,
}

impl ThresholdSparse {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Sparsifier for ThresholdSparse {
    fn sparsify(&self, mut probabilities: ArrayViewMut1<f64>) {
        let best = probabilities
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        for (i, p) in probabilities.iter_mut().enumerate() {
            if Some(i) != best && *p < self.threshold {
                *p = 0.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_no_sparse_keeps_everything() {
        let mut p = array![0.1, 0.2, 0.7];
        NoSparse.sparsify(p.view_mut());
        assert_eq!(p, array![0.1, 0.2, 0.7]);
    }

    #[test]
    fn test_threshold_drops_small_edges() {
        let mut p = array![0.05, 0.25, 0.7];
        ThresholdSparse::new(0.1).sparsify(p.view_mut());
        assert_eq!(p, array![0.0, 0.25, 0.7]);
    }

    #[test]
    fn test_threshold_keeps_the_best_edge() {
        let mut p = array![0.3, 0.3, 0.4];
        ThresholdSparse::new(0.9).sparsify(p.view_mut());
        assert_eq!(p, array![0.0, 0.0, 0.4]);
    }
}
