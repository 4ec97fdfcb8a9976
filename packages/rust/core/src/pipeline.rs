//! Ordered stage container.
//!
//! A [`Pipeline`] is built per request, appended to during setup, and handed
//! to [`crate::driver::execute`]. Insertion order is execution order.

use tracing::warn;

use crate::stage::Stage;

/// Append-only list of stages.
#[derive(Debug, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `stage` as the new last element.
    ///
    /// Names are used to tag output events; a repeated name is accepted but
    /// makes the stream ambiguous, so it is logged.
    pub fn insert(&mut self, stage: Stage) {
        if self.stages.iter().any(|s| s.name() == stage.name()) {
            warn!(stage = stage.name(), "duplicate stage name in pipeline");
        }
        self.stages.push(stage);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.insert(stage);
        self
    }

    /// Stages in insertion order. Every call starts from the first stage.
    pub fn iter(&self) -> std::slice::Iter<'_, Stage> {
        self.stages.iter()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(Stage::name).collect()
    }
}

impl<'a> IntoIterator for &'a Pipeline {
    type Item = &'a Stage;
    type IntoIter = std::slice::Iter<'a, Stage>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Transition;
    use futures::StreamExt;

    fn noop(name: &str) -> Stage {
        Stage::transform(name, |state| async move { Ok(Transition::new(state, "")) })
    }

    #[test]
    fn iterates_in_insertion_order() {
        let pipeline = Pipeline::new()
            .with_stage(noop("A"))
            .with_stage(Stage::stream_producer("B", |_| futures::stream::empty().boxed()));

        assert_eq!(pipeline.stage_names(), vec!["A", "B"]);
        assert_eq!(pipeline.len(), 2);
    }

    #[test]
    fn iteration_is_repeatable() {
        let mut pipeline = Pipeline::new();
        pipeline.insert(noop("A"));
        pipeline.insert(noop("B"));

        for _ in 0..3 {
            let names: Vec<_> = pipeline.iter().map(Stage::name).collect();
            assert_eq!(names, vec!["A", "B"]);
        }
        let via_ref: Vec<_> = (&pipeline).into_iter().map(Stage::name).collect();
        assert_eq!(via_ref, vec!["A", "B"]);
    }

    #[test]
    fn duplicate_names_are_kept() {
        let pipeline = Pipeline::new().with_stage(noop("A")).with_stage(noop("A"));
        assert_eq!(pipeline.len(), 2);
    }

    #[test]
    fn new_pipeline_is_empty() {
        assert!(Pipeline::new().is_empty());
    }
}
