//! Conditional parallel iteration.
//!
//! With the `parallel` feature, slices are iterated on the current rayon
//! pool; without it the same code runs sequentially. Call sites only use
//! methods shared by `Iterator` and `ParallelIterator` (`map`, `for_each`,
//! `filter`, `collect`, ...) and import `ParallelIterator` themselves when
//! the feature is on.
//!
//! ```ignore
//! use crate::slice_maybe_parallel;
//! #[cfg(feature = "parallel")]
//! use rayon::iter::ParallelIterator;
//!
//! slice_maybe_parallel!(paths).for_each(|path| process(path));
//! ```

/// Iterate a slice by reference, in parallel when the `parallel` feature is
/// enabled.
#[macro_export]
macro_rules! slice_maybe_parallel {
    ($expr:expr) => {{
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            $expr.par_iter()
        }
        #[cfg(not(feature = "parallel"))]
        {
            $expr.iter()
        }
    }};
}

pub use slice_maybe_parallel;
