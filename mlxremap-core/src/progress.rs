//! Terminal progress for the per-layer remap loop.

use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str = "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})";

/// Wraps a range iterator and advances a progress bar as it is consumed.
///
/// Draws to stderr and hides itself when stderr is not a terminal.
pub struct NiceProgressBar<I> {
    inner: I,
    bar: ProgressBar,
}

impl<I: ExactSizeIterator> NiceProgressBar<I> {
    pub fn new(inner: I, message: &'static str) -> Self {
        let style = ProgressStyle::with_template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        let bar = ProgressBar::new(inner.len() as u64)
            .with_style(style)
            .with_message(message);
        Self { inner, bar }
    }
}

impl<I: Iterator> Iterator for NiceProgressBar<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next() {
            Some(item) => {
                self.bar.inc(1);
                Some(item)
            }
            None => {
                self.bar.finish();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_yields_all_items() {
        let items: Vec<usize> = NiceProgressBar::new(0..5, "Remapping layers").collect();
        assert_eq!(items, vec![0, 1, 2, 3, 4]);
    }
}
