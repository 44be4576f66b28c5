use core::{error::Error, fmt};

use snafu::{Location, Snafu};

/// A pool was torn down while objects allocated from it were still live.
///
/// Releasing the slabs would free memory still referenced by those objects,
/// so the pool keeps every slab in place when this error is returned.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[snafu(display(
    "slab pool torn down with objects still live: carved={carved}, free={free}"
))]
pub struct LeakError {
    carved: usize,
    free: usize,
    #[snafu(implicit)]
    location: Location,
}

impl LeakError {
    /// Number of units ever carved out of the pool's slabs.
    #[must_use]
    pub fn carved(&self) -> usize {
        self.carved
    }

    /// Number of units on the free list at teardown.
    #[must_use]
    pub fn free(&self) -> usize {
        self.free
    }

    /// Number of objects that were never released.
    #[must_use]
    pub fn live(&self) -> usize {
        self.carved.saturating_sub(self.free)
    }

    /// Where the teardown was attempted.
    #[must_use]
    pub fn location(&self) -> &Location {
        &self.location
    }
}

/// Renders an error together with its chain of sources.
pub struct Report<E> {
    error: E,
}

impl<E> Report<E> {
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E> fmt::Debug for Report<E>
where
    E: Error,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<E> fmt::Display for Report<E>
where
    E: Error,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Error: {}", self.error)?;
        let mut source = self.error.source();
        if source.is_some() {
            writeln!(f)?;
            writeln!(f, "Caused by:")?;
        }
        let mut index = 0;
        while let Some(s) = source {
            writeln!(f, "{index:4}: {s}")?;
            source = s.source();
            index += 1;
        }
        Ok(())
    }
}

/// Aborts the current operation with a rendered report of `err`.
#[track_caller]
pub(crate) fn report<E>(err: E) -> !
where
    E: Error,
{
    let report = Report::new(err);
    log::error!("critical slab allocator error\n{report}");
    panic!("Critical error occurred\n\n{report}");
}
