//! # Action Registry
//!
//! Maps rule names to a matcher and a rewriter over one shared pattern.
//! The registry owns no graph; every call borrows the graph it works on,
//! so a match can only be applied to a graph nobody else is mutating.

use std::sync::Arc;

use hashbrown::HashMap;
use tracing::{debug, instrument};

use crate::config::EngineConfig;
use crate::matcher::{Match, MatchLimit, Matcher};
use crate::model::{Element, TypeModel};
use crate::pattern::{PatternGraph, Role};
use crate::rewrite::{EditScript, Rewriter};
use crate::storage::MemoryGraph;
use crate::{Error, Result};

pub use crate::rewrite::ExecutionStats;

/// A registered rule: pattern, search state and edit script.
#[derive(Debug)]
pub struct Rule {
    name: String,
    matcher: Matcher,
    rewriter: Rewriter,
}

impl Rule {
    pub fn name(&self) -> &str { &self.name }
    pub fn pattern(&self) -> &Arc<PatternGraph> { self.matcher.pattern() }
    pub fn script(&self) -> &EditScript { self.rewriter.script() }

    /// Number of presets `find_matches` expects.
    pub fn input_arity(&self) -> usize {
        self.pattern().inputs().len()
    }

    /// Number of elements `apply` returns.
    pub fn output_arity(&self) -> usize {
        self.script().outputs().len()
    }
}

/// Rule registry and the control program's interface to the engine.
#[derive(Debug)]
pub struct Actions {
    model: Arc<TypeModel>,
    config: EngineConfig,
    rules: HashMap<String, Rule>,
    /// Registration order, for listing.
    order: Vec<String>,
    stats: ExecutionStats,
}

impl Actions {
    pub fn new(model: Arc<TypeModel>) -> Self {
        Self::with_config(model, EngineConfig::default())
    }

    pub fn with_config(model: Arc<TypeModel>, config: EngineConfig) -> Self {
        Self {
            model,
            config,
            rules: HashMap::new(),
            order: Vec::new(),
            stats: ExecutionStats::default(),
        }
    }

    pub fn model(&self) -> &Arc<TypeModel> { &self.model }
    pub fn config(&self) -> &EngineConfig { &self.config }
    pub fn stats(&self) -> ExecutionStats { self.stats }

    pub fn reset_stats(&mut self) {
        self.stats = ExecutionStats::default();
    }

    /// Rule names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.order.iter().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    pub fn rule(&self, name: &str) -> Result<&Rule> {
        self.rules.get(name).ok_or_else(|| Error::UnknownRule(name.to_owned()))
    }

    /// Register `pattern` with the edit script applied to its matches.
    /// The script must have been built against this pattern.
    pub fn register_rule(
        &mut self,
        name: impl Into<String>,
        mut pattern: PatternGraph,
        script: EditScript,
    ) -> Result<()> {
        let name = name.into();
        if self.rules.contains_key(&name) {
            return Err(Error::DuplicateRule(name));
        }
        let depth = pattern.nesting_depth();
        if depth > self.config.max_negative_depth {
            return Err(Error::NestingTooDeep { depth, limit: self.config.max_negative_depth });
        }

        pattern.mark_outputs(script.outputs());
        let pattern = Arc::new(pattern);
        let rewriter = Rewriter::new(Arc::clone(&pattern), script)?;
        let matcher = Matcher::new(pattern, self.config.locality);

        let rule = Rule { name: name.clone(), matcher, rewriter };
        debug!(
            rule = %name,
            inputs = rule.input_arity(),
            outputs = rule.output_arity(),
            plan = rule.pattern().plan().len(),
            negatives = depth,
            "rule registered"
        );
        self.order.push(name.clone());
        self.rules.insert(name, rule);
        Ok(())
    }

    /// Up to `limit` matches of rule `name` (non-positive means all).
    #[instrument(skip_all, fields(rule = %name))]
    pub fn find_matches(
        &mut self,
        graph: &mut MemoryGraph,
        name: &str,
        presets: &[Option<Element>],
        limit: impl Into<MatchLimit>,
    ) -> Result<Vec<Match>> {
        let rule = self.rules.get_mut(name).ok_or_else(|| Error::UnknownRule(name.to_owned()))?;
        let found = rule.matcher.find_matches(graph, presets, limit)?;
        self.stats.matches_found += found.len() as u64;
        Ok(found)
    }

    /// Rewrite one match of rule `name`; returns the declared outputs.
    #[instrument(skip_all, fields(rule = %name))]
    pub fn apply(&mut self, graph: &mut MemoryGraph, name: &str, m: &Match) -> Result<Vec<Element>> {
        let rule = self.rules.get(name).ok_or_else(|| Error::UnknownRule(name.to_owned()))?;
        let outcome = rule.rewriter.apply(graph, m)?;
        self.stats += outcome.stats;
        Ok(outcome.outputs)
    }

    /// Find the first match and apply it. `None` when nothing matches.
    pub fn apply_first(
        &mut self,
        graph: &mut MemoryGraph,
        name: &str,
        presets: &[Option<Element>],
    ) -> Result<Option<Vec<Element>>> {
        let Some(m) = self.find_matches(graph, name, presets, 1)?.into_iter().next() else {
            return Ok(None);
        };
        self.apply(graph, name, &m).map(Some)
    }

    /// Apply rule `name` until it stops matching or `max` rewrites were made
    /// (capped by the configured `max_repeat`). Returns the rewrite count.
    pub fn apply_repeatedly(
        &mut self,
        graph: &mut MemoryGraph,
        name: &str,
        presets: &[Option<Element>],
        max: Option<usize>,
    ) -> Result<usize> {
        let cap = max.map_or(self.config.max_repeat, |m| m.min(self.config.max_repeat));
        let mut count = 0;
        while count < cap {
            if self.apply_first(graph, name, presets)?.is_none() {
                break;
            }
            count += 1;
        }
        debug!(rule = name, count, "repeated application finished");
        Ok(count)
    }

    /// Roles of the pattern nodes of rule `name`, by node name.
    pub fn roles(&self, name: &str) -> Result<Vec<(&str, Role)>> {
        let pattern = self.rule(name)?.pattern();
        Ok(pattern.nodes().iter().map(|n| (n.name(), n.role())).collect())
    }
}
