//! Declared stage dependency graph.

use std::collections::{BTreeMap, BTreeSet};

use polars::prelude::DataFrame;

use crate::{PipelineContext, PipelineError};

/// A stage's transformation: input tables (in declared order) to output.
pub type StageFn =
    Box<dyn Fn(&PipelineContext, &[DataFrame]) -> Result<DataFrame, PipelineError> + Send + Sync>;

/// One named, idempotent step of the pipeline.
pub struct Stage {
    name: String,
    inputs: Vec<String>,
    output: String,
    run: StageFn,
}

impl Stage {
    pub fn new(
        name: impl Into<String>,
        inputs: Vec<String>,
        output: impl Into<String>,
        run: impl Fn(&PipelineContext, &[DataFrame]) -> Result<DataFrame, PipelineError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            inputs,
            output: output.into(),
            run: Box::new(run),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Runs the transformation on already loaded inputs.
    ///
    /// # Errors
    ///
    /// Returns whatever the transformation returns.
    pub fn run(&self, ctx: &PipelineContext, inputs: &[DataFrame]) -> Result<DataFrame, PipelineError> {
        (self.run)(ctx, inputs)
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

/// Stages in a valid execution order.
///
/// Inputs that no stage produces are external source tables; they must
/// exist in the store when a stage needing them runs.
#[derive(Debug)]
pub struct StageGraph {
    stages: Vec<Stage>,
}

impl StageGraph {
    /// Validates the declared stages and orders them so that every stage
    /// runs after the stages producing its inputs. Among stages that are
    /// ready at the same time, declaration order wins.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Graph`] on duplicate stage names, duplicate
    /// outputs, a stage reading its own output, or a dependency cycle.
    pub fn new(stages: Vec<Stage>) -> Result<Self, PipelineError> {
        let graph_error = |message: String| PipelineError::Graph { message };

        let mut names = BTreeSet::new();
        let mut producers: BTreeMap<&str, usize> = BTreeMap::new();
        for (i, stage) in stages.iter().enumerate() {
            if !names.insert(stage.name.as_str()) {
                return Err(graph_error(format!("duplicate stage name '{}'", stage.name)));
            }
            if producers.insert(stage.output.as_str(), i).is_some() {
                return Err(graph_error(format!(
                    "table '{}' is produced by more than one stage",
                    stage.output
                )));
            }
            if stage.inputs.contains(&stage.output) {
                return Err(graph_error(format!(
                    "stage '{}' reads its own output '{}'",
                    stage.name, stage.output
                )));
            }
        }

        // Kahn's algorithm with the ready set ordered by declaration index.
        let dependencies: Vec<BTreeSet<usize>> = stages
            .iter()
            .map(|s| {
                s.inputs
                    .iter()
                    .filter_map(|input| producers.get(input.as_str()).copied())
                    .collect()
            })
            .collect();

        let mut remaining: Vec<usize> = dependencies.iter().map(BTreeSet::len).collect();
        let mut ready: BTreeSet<usize> = (0..stages.len()).filter(|&i| remaining[i] == 0).collect();
        let mut order = Vec::with_capacity(stages.len());

        while let Some(next) = ready.pop_first() {
            order.push(next);
            for (i, deps) in dependencies.iter().enumerate() {
                if deps.contains(&next) {
                    remaining[i] -= 1;
                    if remaining[i] == 0 {
                        ready.insert(i);
                    }
                }
            }
        }

        if order.len() != stages.len() {
            let stuck: Vec<&str> = (0..stages.len())
                .filter(|i| !order.contains(i))
                .map(|i| stages[i].name.as_str())
                .collect();
            return Err(graph_error(format!(
                "dependency cycle among stages: {}",
                stuck.join(", ")
            )));
        }

        let mut slots: Vec<Option<Stage>> = stages.into_iter().map(Some).collect();
        let stages = order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect();

        Ok(Self { stages })
    }

    /// Stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Tables read by some stage but produced by none, sorted.
    #[must_use]
    pub fn source_tables(&self) -> Vec<&str> {
        let outputs: BTreeSet<&str> = self.stages.iter().map(|s| s.output.as_str()).collect();
        let sources: BTreeSet<&str> = self
            .stages
            .iter()
            .flat_map(|s| s.inputs.iter().map(String::as_str))
            .filter(|input| !outputs.contains(input))
            .collect();
        sources.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(name: &str, inputs: &[&str], output: &str) -> Stage {
        Stage::new(
            name,
            inputs.iter().map(ToString::to_string).collect(),
            output,
            |_, _| Ok(DataFrame::empty()),
        )
    }

    fn names(graph: &StageGraph) -> Vec<&str> {
        graph.stages().iter().map(Stage::name).collect()
    }

    #[test]
    fn orders_dependencies_first_and_keeps_declaration_order() {
        let graph = StageGraph::new(vec![
            stage("aggregate", &["b_out", "a_out"], "agg"),
            stage("b", &["raw"], "b_out"),
            stage("a", &["raw"], "a_out"),
            stage("report", &["agg"], "final"),
        ])
        .unwrap();

        assert_eq!(names(&graph), vec!["b", "a", "aggregate", "report"]);
        assert_eq!(graph.source_tables(), vec!["raw"]);
    }

    #[test]
    fn already_ordered_graph_is_unchanged() {
        let graph = StageGraph::new(vec![
            stage("one", &["raw"], "t1"),
            stage("two", &["t1"], "t2"),
            stage("three", &["t2", "raw"], "t3"),
        ])
        .unwrap();
        assert_eq!(names(&graph), vec!["one", "two", "three"]);
    }

    #[test]
    fn rejects_duplicate_outputs() {
        let err = StageGraph::new(vec![stage("a", &[], "t"), stage("b", &[], "t")]).unwrap_err();
        assert!(matches!(err, PipelineError::Graph { .. }));
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = StageGraph::new(vec![stage("a", &[], "t1"), stage("a", &[], "t2")]).unwrap_err();
        assert!(matches!(err, PipelineError::Graph { .. }));
    }

    #[test]
    fn rejects_cycles() {
        let err = StageGraph::new(vec![
            stage("a", &["t2"], "t1"),
            stage("b", &["t1"], "t2"),
            stage("c", &[], "t3"),
        ])
        .unwrap_err();
        assert!(matches!(err, PipelineError::Graph { message } if message.contains("a, b")));
    }

    #[test]
    fn rejects_self_loops() {
        assert!(StageGraph::new(vec![stage("a", &["t"], "t")]).is_err());
    }
}
