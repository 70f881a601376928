//! visitor pattern helpers
mod visit_directives;
pub use visit_directives::TryVisitDirectivesMut;

/// Visitor that visits its subjects mutably and may stop the traversal
pub trait TryVisitMut<T> {
    type Error;

    fn try_visit_mut(&mut self, value: &mut T) -> Result<(), Self::Error>;
}

// blanket impl for FnMut
impl<T, E, F> TryVisitMut<T> for F
where
    F: FnMut(&mut T) -> Result<(), E>,
{
    type Error = E;

    fn try_visit_mut(&mut self, value: &mut T) -> Result<(), E> {
        self(value)
    }
}
