//! Ordered, mutable sequence of async steps run strictly one after another.
//!
//! A [`Chain`] records steps without running them. [`Chain::run`] awaits every step to
//! completion before the next one starts, in insertion order. Each appended step receives a
//! [`StepHandle`] that stays unique for the life of the chain (until [`Chain::clear`]).

use std::fmt;

use futures::future::BoxFuture;

use crate::foundation::error::{SketchError, SketchResult};

/// Future returned by a chain step.
pub type StepFuture<'a> = BoxFuture<'a, SketchResult<()>>;

type BoxedStep<C> = Box<dyn for<'a> Fn(&'a mut C) -> StepFuture<'a> + Send + Sync>;

/// Stable identifier of a step inside one [`Chain`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StepHandle(pub u64);

impl fmt::Display for StepHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct Chain<C> {
    steps: Vec<(StepHandle, BoxedStep<C>)>,
    last_handle: u64,
}

impl<C> Default for Chain<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for Chain<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("handles", &self.handles().collect::<Vec<_>>())
            .field("last_handle", &self.last_handle)
            .finish()
    }
}

impl<C> Chain<C> {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            last_handle: 0,
        }
    }

    /// Append `step` to the end of the chain without running it.
    pub fn append<F>(&mut self, step: F) -> StepHandle
    where
        F: for<'a> Fn(&'a mut C) -> StepFuture<'a> + Send + Sync + 'static,
    {
        self.last_handle += 1;
        let handle = StepHandle(self.last_handle);
        self.steps.push((handle, Box::new(step)));
        handle
    }

    /// Remove the step registered under `handle`. Returns `false` when no such step exists.
    pub fn remove(&mut self, handle: StepHandle) -> bool {
        let before = self.steps.len();
        self.steps.retain(|(h, _)| *h != handle);
        self.steps.len() != before
    }

    /// Drop every step and reset handle numbering.
    pub fn clear(&mut self) {
        self.steps.clear();
        self.last_handle = 0;
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn contains(&self, handle: StepHandle) -> bool {
        self.steps.iter().any(|(h, _)| *h == handle)
    }

    /// Handles of the remaining steps, in run order.
    pub fn handles(&self) -> impl Iterator<Item = StepHandle> + '_ {
        self.steps.iter().map(|(h, _)| *h)
    }

    /// Run every step against `ctx` in insertion order.
    ///
    /// The first failing step aborts the run; its error is returned wrapped in
    /// [`SketchError::Step`] and later steps are not started.
    pub async fn run(&self, ctx: &mut C) -> SketchResult<()> {
        for (handle, step) in &self.steps {
            tracing::debug!(step = %handle, "running step");
            step(&mut *ctx)
                .await
                .map_err(|source| SketchError::Step {
                    handle: *handle,
                    source: Box::new(source),
                })?;
            tracing::debug!(step = %handle, "step done");
        }
        Ok(())
    }
}
