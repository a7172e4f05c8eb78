//! Progress reporting over the 24-bit prefix space.

use chdb_verifier::PREFIX_COUNT;
use indicatif::{ProgressBar, ProgressStyle};

/// Receives the encoder's position in prefix space.
pub trait Progress {
    /// Every prefix below `prefix` has its index slot filled.
    fn advance(&mut self, prefix: u32);

    /// The index is complete and written.
    fn finish(&mut self) {}
}

impl Progress for () {
    fn advance(&mut self, _prefix: u32) {}
}

impl Progress for ProgressBar {
    fn advance(&mut self, prefix: u32) {
        self.set_position(prefix.into());
    }

    fn finish(&mut self) {
        self.finish_with_message("done");
    }
}

impl<P: Progress + ?Sized> Progress for &mut P {
    fn advance(&mut self, prefix: u32) {
        (**self).advance(prefix);
    }

    fn finish(&mut self) {
        (**self).finish();
    }
}

/// A progress bar over the whole prefix space, drawn on stderr.
pub fn prefix_bar() -> ProgressBar {
    let pb = ProgressBar::new(PREFIX_COUNT as u64);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {percent}% (ETA: {eta_precise}) {msg}",
    )
    .map(|style| style.progress_chars("#>-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}
