//! Deferred-computation graph
//!
//! A [`Graph`] maps [`Key`]s, `(array name, block coordinate)` pairs, to
//! [`Task`] descriptors. Edges are implied by the keys a task references.
//! Graphs are immutable values: building a derived array produces a new
//! graph that shares the task descriptors of its inputs.

use crate::block::{Block, DType};
use crate::errors::{BlockwiseError, Result};
use crate::reductions::kernels::{ArgPlacement, Kernel, KernelConfig};
use crate::reductions::operations::ArgReduction;
use serde_json::{json, Value as JsonValue};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Identity of one block of one array
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    pub name: String,
    pub coord: Vec<usize>,
}

impl Key {
    #[must_use]
    pub fn new(name: impl Into<String>, coord: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            coord,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "('{}'", self.name)?;
        for i in &self.coord {
            write!(f, ", {i}")?;
        }
        f.write_str(")")
    }
}

/// Positional or keyword argument of an element function
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Bool(bool),
    Int(i64),
    Float(f64),
    Shape(Vec<usize>),
}

impl Param {
    fn to_json(&self) -> JsonValue {
        match self {
            Self::Bool(b) => json!(b),
            Self::Int(i) => json!(i),
            Self::Float(x) => json!(x),
            Self::Shape(shape) => json!({ "shape": shape }),
        }
    }
}

/// Keyword arguments, ordered by name
pub type Params = BTreeMap<String, Param>;

/// Signature of an element-producing function
///
/// Called with the block shape, the fixed positional arguments, the
/// dtype (`None` only for the dtype probe) and the keyword arguments.
pub type ElementFn = fn(&[usize], &[Param], Option<DType>, &Params) -> Result<Block>;

/// A named element-producing function
#[derive(Clone, Copy)]
pub struct ElementFunction {
    name: &'static str,
    func: ElementFn,
}

impl ElementFunction {
    #[must_use]
    pub const fn new(name: &'static str, func: ElementFn) -> Self {
        Self { name, func }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Invoke the function for a block of `shape`
    ///
    /// # Errors
    ///
    /// Propagates whatever the function itself returns.
    pub fn call(
        &self,
        shape: &[usize],
        args: &[Param],
        dtype: Option<DType>,
        kwargs: &Params,
    ) -> Result<Block> {
        (self.func)(shape, args, dtype, kwargs)
    }
}

impl fmt::Debug for ElementFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ElementFunction").field(&self.name).finish()
    }
}

impl PartialEq for ElementFunction {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Task descriptor stored under one key
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    /// Produce a block by calling an element function
    Create {
        function: ElementFunction,
        shape: Vec<usize>,
        args: Vec<Param>,
        dtype: DType,
        kwargs: Params,
    },
    /// A block that is already in memory
    Literal(Block),
    /// Reduce one block locally, keeping reduced axes as length 1
    Partial {
        input: Key,
        kernel: Kernel,
        config: KernelConfig,
    },
    /// Reduce one block locally, tracking global indices of the winners
    ArgPartial {
        input: Key,
        kind: ArgReduction,
        config: KernelConfig,
        placement: ArgPlacement,
    },
    /// Merge partial results into one partial result
    Combine {
        inputs: Vec<Key>,
        kernel: Kernel,
        config: KernelConfig,
        block_shape: Vec<usize>,
    },
    /// Merge partial results and finalize them into an output block
    Aggregate {
        inputs: Vec<Key>,
        kernel: Kernel,
        config: KernelConfig,
        keepdims: bool,
        block_shape: Vec<usize>,
    },
}

impl Task {
    /// Keys this task reads
    #[must_use]
    pub fn dependencies(&self) -> Vec<&Key> {
        match self {
            Self::Create { .. } | Self::Literal(_) => Vec::new(),
            Self::Partial { input, .. } | Self::ArgPartial { input, .. } => vec![input],
            Self::Combine { inputs, .. } | Self::Aggregate { inputs, .. } => inputs.iter().collect(),
        }
    }

    fn to_json(&self) -> JsonValue {
        let keys = |keys: &[Key]| keys.iter().map(ToString::to_string).collect::<Vec<_>>();
        let config_json = |config: &KernelConfig| {
            json!({
                "axes": config.axes,
                "dtype": config.dtype.as_str(),
                "ddof": config.ddof,
            })
        };
        match self {
            Self::Create {
                function,
                shape,
                args,
                dtype,
                kwargs,
            } => json!({
                "op": "create",
                "function": function.name(),
                "shape": shape,
                "args": args.iter().map(Param::to_json).collect::<Vec<_>>(),
                "dtype": dtype.as_str(),
                "kwargs": kwargs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<serde_json::Map<_, _>>(),
            }),
            Self::Literal(block) => json!({
                "op": "literal",
                "dtype": block.dtype().as_str(),
                "shape": block.shape(),
            }),
            Self::Partial {
                input,
                kernel,
                config,
            } => json!({
                "op": "partial",
                "kernel": kernel.name(),
                "input": input.to_string(),
                "config": config_json(config),
            }),
            Self::ArgPartial {
                input,
                kind,
                config,
                placement,
            } => json!({
                "op": "arg-partial",
                "kernel": kind.as_str(),
                "input": input.to_string(),
                "config": config_json(config),
                "offsets": placement.offsets,
                "extents": placement.extents,
            }),
            Self::Combine {
                inputs,
                kernel,
                config,
                block_shape,
            } => json!({
                "op": "combine",
                "kernel": kernel.name(),
                "inputs": keys(inputs.as_slice()),
                "config": config_json(config),
                "block_shape": block_shape,
            }),
            Self::Aggregate {
                inputs,
                kernel,
                config,
                keepdims,
                block_shape,
            } => json!({
                "op": "aggregate",
                "kernel": kernel.name(),
                "inputs": keys(inputs.as_slice()),
                "config": config_json(config),
                "keepdims": keepdims,
                "block_shape": block_shape,
            }),
        }
    }
}

/// Immutable mapping from keys to task descriptors
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    tasks: BTreeMap<Key, Arc<Task>>,
}

impl Graph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A graph holding exactly `tasks`
    #[must_use]
    pub fn from_tasks(tasks: BTreeMap<Key, Task>) -> Self {
        Self {
            tasks: tasks.into_iter().map(|(k, t)| (k, Arc::new(t))).collect(),
        }
    }

    /// A new graph with the entries of `self` and `tasks`
    #[must_use]
    pub fn extend(&self, tasks: BTreeMap<Key, Task>) -> Self {
        let mut merged = self.tasks.clone();
        merged.extend(tasks.into_iter().map(|(k, t)| (k, Arc::new(t))));
        Self { tasks: merged }
    }

    /// Union of several graphs
    #[must_use]
    pub fn merge<'a>(graphs: impl IntoIterator<Item = &'a Self>) -> Self {
        let mut tasks = BTreeMap::new();
        for graph in graphs {
            tasks.extend(graph.tasks.iter().map(|(k, t)| (k.clone(), Arc::clone(t))));
        }
        Self { tasks }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &Key) -> Option<&Task> {
        self.tasks.get(key).map(AsRef::as_ref)
    }

    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        self.tasks.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.tasks.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Task)> {
        self.tasks.iter().map(|(k, t)| (k, t.as_ref()))
    }

    /// The subgraph needed to compute `outputs`
    ///
    /// # Errors
    ///
    /// Returns [`BlockwiseError::MissingKey`] if an output or a dependency
    /// is not in the graph.
    pub fn cull(&self, outputs: &[Key]) -> Result<Self> {
        let mut seen: BTreeSet<&Key> = BTreeSet::new();
        let mut stack: Vec<&Key> = outputs.iter().collect();
        let mut tasks = BTreeMap::new();
        while let Some(key) = stack.pop() {
            if !seen.insert(key) {
                continue;
            }
            let task = self.tasks.get(key).ok_or_else(|| BlockwiseError::MissingKey {
                key: key.to_string(),
            })?;
            stack.extend(task.dependencies());
            tasks.insert(key.clone(), Arc::clone(task));
        }
        Ok(Self { tasks })
    }

    /// Render the graph as JSON, keys in sorted order
    #[must_use]
    pub fn to_json(&self) -> String {
        let entries: serde_json::Map<String, JsonValue> = self
            .tasks
            .iter()
            .map(|(key, task)| (key.to_string(), task.to_json()))
            .collect();
        JsonValue::Object(entries).to_string()
    }
}
