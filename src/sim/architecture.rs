//! Static description of a model tree.
//!
//! An [`Architecture`] is built once, validated, and can then be
//! instantiated any number of times; every instantiation yields fresh model
//! state, so runs never share models.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::coupled::{CoupledModel, CouplingTables, ModelNode};
use super::error::{SimError, SimResult};
use super::model::AtomicModel;
use super::simulator::AtomicSimulator;
use super::time::TimeUnit;

/// How the tree is meant to be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreationMode {
    /// As fast as possible.
    #[default]
    Simulated,
    /// Paced against the wall clock by the real-time scheduler.
    RealTime,
}

type ModelFactory = Box<dyn Fn() -> Box<dyn AtomicModel> + Send + Sync>;

struct AtomicDescriptor {
    unit: TimeUnit,
    factory: ModelFactory,
}

struct CoupledDescriptor {
    unit: TimeUnit,
    children: Vec<String>,
    tables: CouplingTables,
}

/// Validated description of a model tree.
pub struct Architecture {
    root: String,
    mode: CreationMode,
    atomics: BTreeMap<String, AtomicDescriptor>,
    coupled: BTreeMap<String, CoupledDescriptor>,
}

impl fmt::Debug for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Architecture")
            .field("root", &self.root)
            .field("mode", &self.mode)
            .field("atomics", &self.atomics.keys().collect::<Vec<_>>())
            .field("coupled", &self.coupled.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Architecture {
    pub fn builder(root: impl Into<String>) -> ArchitectureBuilder {
        ArchitectureBuilder::new(root)
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn mode(&self) -> CreationMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: CreationMode) {
        self.mode = mode;
    }

    /// Time unit of the root coupled model.
    pub fn unit(&self) -> TimeUnit {
        self.coupled[&self.root].unit
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.atomics.contains_key(uri) || self.coupled.contains_key(uri)
    }

    pub fn model_uris(&self) -> impl Iterator<Item = &str> {
        self.atomics
            .keys()
            .chain(self.coupled.keys())
            .map(String::as_str)
    }

    /// Creates a fresh model tree with variable bindings resolved.
    pub fn instantiate(&self) -> SimResult<ModelNode> {
        let node = self.instantiate_node(&self.root)?;
        match node {
            ModelNode::Coupled(mut root) => {
                root.resolve_bindings()?;
                Ok(ModelNode::Coupled(root))
            }
            ModelNode::Atomic(_) => Err(SimError::MalformedArchitecture(format!(
                "root {} must be a coupled model",
                self.root
            ))),
        }
    }

    fn instantiate_node(&self, uri: &str) -> SimResult<ModelNode> {
        if let Some(a) = self.atomics.get(uri) {
            return Ok(ModelNode::Atomic(AtomicSimulator::new(
                uri,
                (a.factory)(),
                a.unit,
            )));
        }
        let c = self
            .coupled
            .get(uri)
            .ok_or_else(|| SimError::UnknownModel(uri.to_string()))?;
        let children = c
            .children
            .iter()
            .map(|child| self.instantiate_node(child))
            .collect::<SimResult<Vec<_>>>()?;
        Ok(ModelNode::Coupled(CoupledModel::new(
            uri,
            c.unit,
            children,
            c.tables.clone(),
        )?))
    }
}

/// Collects model descriptors; [`ArchitectureBuilder::build`] validates
/// them.
pub struct ArchitectureBuilder {
    root: String,
    mode: CreationMode,
    atomics: Vec<(String, AtomicDescriptor)>,
    coupled: Vec<(String, CoupledDescriptor)>,
}

impl ArchitectureBuilder {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            mode: CreationMode::default(),
            atomics: Vec::new(),
            coupled: Vec::new(),
        }
    }

    pub fn mode(mut self, mode: CreationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Declares an atomic model. `factory` is called once per
    /// instantiation.
    pub fn atomic<F>(mut self, uri: impl Into<String>, unit: TimeUnit, factory: F) -> Self
    where
        F: Fn() -> Box<dyn AtomicModel> + Send + Sync + 'static,
    {
        self.atomics.push((
            uri.into(),
            AtomicDescriptor {
                unit,
                factory: Box::new(factory),
            },
        ));
        self
    }

    pub fn coupled<I, S>(
        mut self,
        uri: impl Into<String>,
        unit: TimeUnit,
        children: I,
        tables: CouplingTables,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.coupled.push((
            uri.into(),
            CoupledDescriptor {
                unit,
                children: children.into_iter().map(Into::into).collect(),
                tables,
            },
        ));
        self
    }

    pub fn build(self) -> SimResult<Architecture> {
        let malformed = |msg: String| Err(SimError::MalformedArchitecture(msg));

        let mut seen = BTreeSet::new();
        for uri in self
            .atomics
            .iter()
            .map(|(u, _)| u)
            .chain(self.coupled.iter().map(|(u, _)| u))
        {
            if uri.is_empty() {
                return malformed("empty model URI".into());
            }
            if !seen.insert(uri.clone()) {
                return malformed(format!("duplicate model URI {uri}"));
            }
        }

        let atomics: BTreeMap<_, _> = self.atomics.into_iter().collect();
        let coupled: BTreeMap<_, _> = self.coupled.into_iter().collect();

        if !coupled.contains_key(&self.root) {
            return malformed(format!("root {} is not a declared coupled model", self.root));
        }

        let mut parent: BTreeMap<&str, &str> = BTreeMap::new();
        for (uri, c) in &coupled {
            if c.children.is_empty() {
                return malformed(format!("coupled model {uri} has no children"));
            }
            for child in &c.children {
                if !seen.contains(child) {
                    return malformed(format!("{uri} references undeclared model {child}"));
                }
                if child == &self.root {
                    return malformed(format!("root {child} cannot be a child of {uri}"));
                }
                if let Some(other) = parent.insert(child, uri) {
                    return malformed(format!("{child} is a child of both {other} and {uri}"));
                }
            }
            let names: BTreeSet<String> = c.children.iter().cloned().collect();
            c.tables.validate(uri, &names)?;
        }

        // Every model hangs off the root, which also rules out cycles.
        for uri in &seen {
            let mut cursor = uri.as_str();
            let mut hops = 0;
            while cursor != self.root {
                match parent.get(cursor) {
                    Some(p) => cursor = *p,
                    None => return malformed(format!("{uri} is not reachable from the root")),
                }
                hops += 1;
                if hops > seen.len() {
                    return malformed(format!("{uri} is part of a containment cycle"));
                }
            }
        }

        Ok(Architecture {
            root: self.root,
            mode: self.mode,
            atomics,
            coupled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::appliance::ApplianceModel;
    use crate::devices::profiles;
    use crate::devices::relay::RelayModel;

    fn fan() -> Box<dyn AtomicModel> {
        Box::new(ApplianceModel::new(profiles::fan_profile()))
    }

    fn relay() -> Box<dyn AtomicModel> {
        Box::new(RelayModel::new(vec![profiles::SWITCH_ON]))
    }

    const S: TimeUnit = TimeUnit::Seconds;

    #[test]
    fn builds_and_instantiates_fresh_trees() {
        let arch = Architecture::builder("home")
            .atomic("fan", S, fan)
            .atomic("relay", S, relay)
            .coupled(
                "home",
                S,
                ["relay", "fan"],
                CouplingTables::new()
                    .import("SwitchOn", "relay")
                    .couple("relay", "SwitchOn", "fan"),
            )
            .build()
            .expect("valid architecture");
        let a = arch.instantiate().expect("first");
        let b = arch.instantiate().expect("second");
        assert_eq!(a.uris(), vec!["home", "relay", "fan"]);
        assert_eq!(a.uris(), b.uris());
        assert_eq!(arch.unit(), S);
        assert_eq!(arch.mode(), CreationMode::Simulated);
    }

    #[test]
    fn duplicate_uri_is_malformed() {
        let err = Architecture::builder("home")
            .atomic("fan", S, fan)
            .atomic("fan", S, fan)
            .coupled("home", S, ["fan"], CouplingTables::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, SimError::MalformedArchitecture(_)));
    }

    #[test]
    fn missing_root_is_malformed() {
        let err = Architecture::builder("home")
            .atomic("fan", S, fan)
            .build()
            .unwrap_err();
        assert!(matches!(err, SimError::MalformedArchitecture(_)));
    }

    #[test]
    fn orphan_model_is_malformed() {
        let err = Architecture::builder("home")
            .atomic("fan", S, fan)
            .atomic("dryer", S, fan)
            .coupled("home", S, ["fan"], CouplingTables::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, SimError::MalformedArchitecture(m) if m.contains("dryer")));
    }

    #[test]
    fn shared_child_is_malformed() {
        let err = Architecture::builder("home")
            .atomic("fan", S, fan)
            .coupled("a", S, ["fan"], CouplingTables::new())
            .coupled("b", S, ["fan"], CouplingTables::new())
            .coupled("home", S, ["a", "b"], CouplingTables::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, SimError::MalformedArchitecture(_)));
    }

    #[test]
    fn coupling_to_non_child_is_malformed() {
        let err = Architecture::builder("home")
            .atomic("fan", S, fan)
            .atomic("relay", S, relay)
            .coupled("room", S, ["fan"], CouplingTables::new())
            .coupled(
                "home",
                S,
                ["room", "relay"],
                CouplingTables::new().couple("relay", "SwitchOn", "fan"),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SimError::MalformedArchitecture(_)));
    }
}
