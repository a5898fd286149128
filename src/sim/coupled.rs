//! Hierarchical composition of models.
//!
//! A [`CoupledModel`] owns its children and a set of immutable routing
//! tables. An instant is executed in two passes: every imminent descendant
//! first produces its output, which is routed into inboxes (or reexported
//! upward); only then do the transitions run. No model can observe an event
//! that another model has not yet produced at the same instant.

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use super::error::{SimError, SimResult};
use super::event::{Event, EventKind};
use super::model::ModelReport;
use super::params::RunParameters;
use super::simulator::{AtomicSimulator, TraceRecord};
use super::time::{Time, TimeUnit};
use super::variable::{StateBoard, VariableKey};

/// Destination of a routed event, optionally relabelling its kind.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSink {
    pub model: String,
    pub rename: Option<EventKind>,
}

impl EventSink {
    fn apply(&self, event: &Event) -> Event {
        match &self.rename {
            Some(kind) => event.relabelled(kind.clone()),
            None => event.clone(),
        }
    }
}

/// A child's output re-emitted as the coupled model's own output.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReexportRule {
    pub rename: Option<EventKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VariableSource {
    pub model: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VariableSink {
    pub model: String,
    pub local_name: String,
}

/// Static routing of a coupled model, keyed by event kind name.
#[derive(Debug, Clone, Default)]
pub struct CouplingTables {
    /// Events entering the coupled model, by kind.
    pub imports: BTreeMap<String, Vec<EventSink>>,
    /// Child output `(child, kind)` delivered to sibling children.
    pub couplings: BTreeMap<(String, String), Vec<EventSink>>,
    /// Child output `(child, kind)` emitted upward.
    pub reexports: BTreeMap<(String, String), ReexportRule>,
    /// Child variable read by sibling children.
    pub bindings: BTreeMap<VariableSource, Vec<VariableSink>>,
    /// Variable bound into this coupled model, forwarded to children.
    pub variable_imports: BTreeMap<String, Vec<VariableSink>>,
    /// Variable this coupled model exposes to its parent.
    pub variable_exports: BTreeMap<String, VariableSource>,
}

impl CouplingTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn import(self, kind: &str, sink: &str) -> Self {
        self.import_as(kind, sink, None)
    }

    pub fn import_as(mut self, kind: &str, sink: &str, rename: Option<EventKind>) -> Self {
        self.imports.entry(kind.to_string()).or_default().push(EventSink {
            model: sink.to_string(),
            rename,
        });
        self
    }

    pub fn couple(self, source: &str, kind: &str, sink: &str) -> Self {
        self.couple_as(source, kind, sink, None)
    }

    pub fn couple_as(
        mut self,
        source: &str,
        kind: &str,
        sink: &str,
        rename: Option<EventKind>,
    ) -> Self {
        self.couplings
            .entry((source.to_string(), kind.to_string()))
            .or_default()
            .push(EventSink {
                model: sink.to_string(),
                rename,
            });
        self
    }

    pub fn reexport(self, source: &str, kind: &str) -> Self {
        self.reexport_as(source, kind, None)
    }

    pub fn reexport_as(mut self, source: &str, kind: &str, rename: Option<EventKind>) -> Self {
        self.reexports
            .insert((source.to_string(), kind.to_string()), ReexportRule { rename });
        self
    }

    pub fn bind(mut self, source: &str, variable: &str, sink: &str, local_name: &str) -> Self {
        self.bindings
            .entry(VariableSource {
                model: source.to_string(),
                name: variable.to_string(),
            })
            .or_default()
            .push(VariableSink {
                model: sink.to_string(),
                local_name: local_name.to_string(),
            });
        self
    }

    pub fn import_variable(mut self, name: &str, sink: &str, local_name: &str) -> Self {
        self.variable_imports
            .entry(name.to_string())
            .or_default()
            .push(VariableSink {
                model: sink.to_string(),
                local_name: local_name.to_string(),
            });
        self
    }

    pub fn export_variable(mut self, name: &str, source: &str, variable: &str) -> Self {
        self.variable_exports.insert(
            name.to_string(),
            VariableSource {
                model: source.to_string(),
                name: variable.to_string(),
            },
        );
        self
    }

    /// Checks that every table endpoint names one of `children`.
    pub fn validate(&self, owner: &str, children: &BTreeSet<String>) -> SimResult<()> {
        let check = |model: &str, table: &str| {
            if children.contains(model) {
                Ok(())
            } else {
                Err(SimError::MalformedArchitecture(format!(
                    "{owner}: {table} references {model}, which is not a child"
                )))
            }
        };
        for sinks in self.imports.values() {
            for s in sinks {
                check(&s.model, "event import")?;
            }
        }
        for ((source, _), sinks) in &self.couplings {
            check(source, "coupling")?;
            for s in sinks {
                check(&s.model, "coupling")?;
            }
        }
        for (source, _) in self.reexports.keys() {
            check(source, "reexport")?;
        }
        for (source, sinks) in &self.bindings {
            check(&source.model, "binding")?;
            for s in sinks {
                check(&s.model, "binding")?;
            }
        }
        for sinks in self.variable_imports.values() {
            for s in sinks {
                check(&s.model, "variable import")?;
            }
        }
        for source in self.variable_exports.values() {
            check(&source.model, "variable export")?;
        }
        Ok(())
    }
}

/// A node of the model tree.
#[derive(Debug)]
pub enum ModelNode {
    Atomic(AtomicSimulator),
    Coupled(CoupledModel),
}

impl ModelNode {
    pub fn uri(&self) -> &str {
        match self {
            ModelNode::Atomic(a) => a.uri(),
            ModelNode::Coupled(c) => &c.uri,
        }
    }

    pub fn time_next(&self) -> Time {
        match self {
            ModelNode::Atomic(a) => a.time_next(),
            ModelNode::Coupled(c) => c.time_next(),
        }
    }

    pub fn has_inputs(&self) -> bool {
        match self {
            ModelNode::Atomic(a) => a.has_inputs(),
            ModelNode::Coupled(c) => c.children.iter().any(ModelNode::has_inputs),
        }
    }

    /// Delivers an event to this node at the current instant.
    pub(crate) fn receive(&mut self, event: Event) -> SimResult<()> {
        match self {
            ModelNode::Atomic(a) => {
                a.receive(event);
                Ok(())
            }
            ModelNode::Coupled(c) => c.receive(event),
        }
    }

    pub(crate) fn initialise(
        &mut self,
        start: Time,
        params: &RunParameters,
        board: &mut StateBoard,
    ) -> SimResult<()> {
        match self {
            ModelNode::Atomic(a) => a.initialise(start, params, board),
            ModelNode::Coupled(c) => {
                for child in &mut c.children {
                    child.initialise(start, params, board)?;
                }
                Ok(())
            }
        }
    }

    pub(crate) fn output(&mut self, now: Time, board: &StateBoard) -> SimResult<Vec<Event>> {
        match self {
            ModelNode::Atomic(a) => a.output(now, board),
            ModelNode::Coupled(c) => c.output(now, board),
        }
    }

    pub(crate) fn transition(
        &mut self,
        now: Time,
        board: &mut StateBoard,
        trace: &mut Vec<TraceRecord>,
    ) -> SimResult<()> {
        match self {
            ModelNode::Atomic(a) => {
                if let Some(record) = a.transition(now, board)? {
                    trace.push(record);
                }
                Ok(())
            }
            ModelNode::Coupled(c) => c.transition(now, board, trace),
        }
    }

    pub(crate) fn end_simulation(&mut self, end: Time, reports: &mut Vec<ModelReport>) {
        match self {
            ModelNode::Atomic(a) => reports.extend(a.end_simulation(end)),
            ModelNode::Coupled(c) => {
                for child in &mut c.children {
                    child.end_simulation(end, reports);
                }
            }
        }
    }

    /// Depth-first search for the node named `uri`.
    pub fn find_mut(&mut self, uri: &str) -> Option<&mut ModelNode> {
        if self.uri() == uri {
            return Some(self);
        }
        match self {
            ModelNode::Atomic(_) => None,
            ModelNode::Coupled(c) => c.children.iter_mut().find_map(|ch| ch.find_mut(uri)),
        }
    }

    pub fn find(&self, uri: &str) -> Option<&ModelNode> {
        if self.uri() == uri {
            return Some(self);
        }
        match self {
            ModelNode::Atomic(_) => None,
            ModelNode::Coupled(c) => c.children.iter().find_map(|ch| ch.find(uri)),
        }
    }

    /// All URIs in the subtree, parents before children.
    pub fn uris(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_uris(&mut out);
        out
    }

    fn collect_uris(&self, out: &mut Vec<String>) {
        out.push(self.uri().to_string());
        if let ModelNode::Coupled(c) = self {
            for child in &c.children {
                child.collect_uris(out);
            }
        }
    }

    /// Every atomic simulator in the subtree, in declared order.
    pub fn atomics(&self) -> Vec<&AtomicSimulator> {
        match self {
            ModelNode::Atomic(a) => vec![a],
            ModelNode::Coupled(c) => c.children.iter().flat_map(ModelNode::atomics).collect(),
        }
    }

    /// Atomic variable a source endpoint ultimately refers to.
    fn resolve_source(&self, name: &str) -> SimResult<VariableKey> {
        match self {
            ModelNode::Atomic(a) => Ok(VariableKey::new(a.uri(), name)),
            ModelNode::Coupled(c) => {
                let source = c.tables.variable_exports.get(name).ok_or_else(|| {
                    SimError::MalformedArchitecture(format!(
                        "{} does not export variable {name}",
                        c.uri
                    ))
                })?;
                c.child(&source.model)?.resolve_source(&source.name)
            }
        }
    }

    /// Atomic `(uri, local name)` pairs a sink endpoint fans out to.
    fn resolve_sinks(&self, local_name: &str, out: &mut Vec<(String, String)>) -> SimResult<()> {
        match self {
            ModelNode::Atomic(a) => {
                out.push((a.uri().to_string(), local_name.to_string()));
                Ok(())
            }
            ModelNode::Coupled(c) => {
                let sinks = c.tables.variable_imports.get(local_name).ok_or_else(|| {
                    SimError::MalformedArchitecture(format!(
                        "{} does not import variable {local_name}",
                        c.uri
                    ))
                })?;
                for sink in sinks {
                    c.child(&sink.model)?.resolve_sinks(&sink.local_name, out)?;
                }
                Ok(())
            }
        }
    }
}

/// A simulation entity composed of child models plus static routing.
#[derive(Debug)]
pub struct CoupledModel {
    uri: String,
    unit: TimeUnit,
    children: Vec<ModelNode>,
    index: BTreeMap<String, usize>,
    tables: CouplingTables,
}

impl CoupledModel {
    /// Assembles a coupled model, validating its routing tables against its
    /// children.
    pub fn new(
        uri: impl Into<String>,
        unit: TimeUnit,
        children: Vec<ModelNode>,
        tables: CouplingTables,
    ) -> SimResult<Self> {
        let uri = uri.into();
        let mut index = BTreeMap::new();
        for (i, child) in children.iter().enumerate() {
            if index.insert(child.uri().to_string(), i).is_some() {
                return Err(SimError::MalformedArchitecture(format!(
                    "{uri}: duplicate child {}",
                    child.uri()
                )));
            }
        }
        let names: BTreeSet<String> = index.keys().cloned().collect();
        tables.validate(&uri, &names)?;
        Ok(Self {
            uri,
            unit,
            children,
            index,
            tables,
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn children(&self) -> &[ModelNode] {
        &self.children
    }

    pub fn tables(&self) -> &CouplingTables {
        &self.tables
    }

    fn child(&self, uri: &str) -> SimResult<&ModelNode> {
        self.index
            .get(uri)
            .map(|&i| &self.children[i])
            .ok_or_else(|| SimError::UnknownModel(uri.to_string()))
    }

    pub fn time_next(&self) -> Time {
        self.children
            .iter()
            .map(ModelNode::time_next)
            .fold(Time::infinite(self.unit), Time::min)
    }

    fn receive(&mut self, event: Event) -> SimResult<()> {
        let Some(sinks) = self.tables.imports.get(event.kind().name()) else {
            return Err(SimError::UnexpectedEvent {
                model: self.uri.clone(),
                event: event.kind().name().to_string(),
            });
        };
        for sink in sinks {
            let i = self.index[&sink.model];
            self.children[i].receive(sink.apply(&event))?;
        }
        Ok(())
    }

    fn output(&mut self, now: Time, board: &StateBoard) -> SimResult<Vec<Event>> {
        let mut upward = Vec::new();
        for i in 0..self.children.len() {
            if self.children[i].time_next() != now {
                continue;
            }
            let produced = self.children[i].output(now, board)?;
            if produced.is_empty() {
                continue;
            }
            let source = self.children[i].uri().to_string();
            for event in produced {
                self.route(&source, event, &mut upward)?;
            }
        }
        Ok(upward)
    }

    fn route(&mut self, source: &str, event: Event, upward: &mut Vec<Event>) -> SimResult<()> {
        let key = (source.to_string(), event.kind().name().to_string());
        let Self {
            children,
            index,
            tables,
            uri,
            ..
        } = self;
        let mut routed = false;
        if let Some(sinks) = tables.couplings.get(&key) {
            for sink in sinks {
                children[index[&sink.model]].receive(sink.apply(&event))?;
            }
            routed = true;
        }
        if let Some(rule) = tables.reexports.get(&key) {
            upward.push(match &rule.rename {
                Some(kind) => event.relabelled(kind.clone()),
                None => event.clone(),
            });
            routed = true;
        }
        if !routed {
            trace!(coupled = %uri, source, event = %event, "unrouted output dropped");
        }
        Ok(())
    }

    fn transition(
        &mut self,
        now: Time,
        board: &mut StateBoard,
        trace: &mut Vec<TraceRecord>,
    ) -> SimResult<()> {
        for child in &mut self.children {
            if child.time_next() == now || child.has_inputs() {
                child.transition(now, board, trace)?;
            }
        }
        Ok(())
    }

    /// Resolves every variable binding in this subtree down to atomic
    /// sources and sinks, and installs the imports on the sink simulators.
    pub(crate) fn resolve_bindings(&mut self) -> SimResult<()> {
        for child in &mut self.children {
            if let ModelNode::Coupled(c) = child {
                c.resolve_bindings()?;
            }
        }
        let mut resolved = Vec::new();
        for (source, sinks) in &self.tables.bindings {
            let key = self.child(&source.model)?.resolve_source(&source.name)?;
            let mut targets = Vec::new();
            for sink in sinks {
                self.child(&sink.model)?
                    .resolve_sinks(&sink.local_name, &mut targets)?;
            }
            for (uri, local) in targets {
                resolved.push((uri, local, key.clone()));
            }
        }
        for (uri, local, key) in resolved {
            let Some(ModelNode::Atomic(sim)) = self
                .children
                .iter_mut()
                .find_map(|c| c.find_mut(&uri))
            else {
                return Err(SimError::UnknownModel(uri));
            };
            sim.add_import(local, key);
        }
        Ok(())
    }
}
