use super::TryVisitMut;
use crate::payload::{ConfigFile, Directive};

/// Recursively visit all [Directive]s mutably, in pre-order
///
/// A directive is visited before the children of its block, siblings left to right.
/// The first error returned by the visitor ends the traversal.
pub trait TryVisitDirectivesMut {
    fn try_visit_directives_mut<E>(
        &mut self,
        visitor: &mut dyn TryVisitMut<Directive, Error = E>,
    ) -> Result<(), E>;
}

impl TryVisitDirectivesMut for [Directive] {
    fn try_visit_directives_mut<E>(
        &mut self,
        visitor: &mut dyn TryVisitMut<Directive, Error = E>,
    ) -> Result<(), E> {
        for directive in self {
            directive.try_visit_directives_mut(visitor)?;
        }
        Ok(())
    }
}

impl TryVisitDirectivesMut for Directive {
    fn try_visit_directives_mut<E>(
        &mut self,
        visitor: &mut dyn TryVisitMut<Directive, Error = E>,
    ) -> Result<(), E> {
        visitor.try_visit_mut(self)?;

        if let Some(block) = self.block.as_mut() {
            block.try_visit_directives_mut(visitor)?;
        }
        Ok(())
    }
}

impl TryVisitDirectivesMut for ConfigFile {
    fn try_visit_directives_mut<E>(
        &mut self,
        visitor: &mut dyn TryVisitMut<Directive, Error = E>,
    ) -> Result<(), E> {
        self.parsed.try_visit_directives_mut(visitor)
    }
}
