use std::collections::HashMap;

use crate::error::{ErrorKind, Result};

/// Values of a list with their 1-based positions in the source list.
/// Exclusion removes entries but never renumbers the survivors.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListValues {
    pub values: Vec<String>,
    pub counters: Vec<usize>,
}

impl ListValues {
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = tokens.into_iter().map(Into::into).collect();
        let counters = (1..=values.len()).collect();
        Self { values, counters }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.values
            .iter()
            .map(String::as_str)
            .zip(self.counters.iter().copied())
    }

    /// Removes every value that also appears in `excluded`.
    pub fn exclude(&self, excluded: &ListValues) -> ListValues {
        let (values, counters) = self
            .iter()
            .filter(|(value, _)| !excluded.values.iter().any(|e| e == value))
            .map(|(value, counter)| (value.to_string(), counter))
            .unzip();
        ListValues { values, counters }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalValue {
    Scalar(String),
    List(ListValues),
}

impl LocalValue {
    /// A scalar behaves as a one-element list.
    pub fn as_list(&self) -> ListValues {
        match self {
            LocalValue::Scalar(value) => ListValues::from_tokens([value.as_str()]),
            LocalValue::List(list) => list.clone(),
        }
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            LocalValue::Scalar(value) => Some(value),
            LocalValue::List(_) => None,
        }
    }
}

pub type LocalHeap = HashMap<String, LocalValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundValue {
    pub value: String,
    pub counter: usize,
}

/// One axis of a binding product. A plain iterator has one name; a parallel
/// group zips several equal-length lists into one axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Axis {
    pub names: Vec<String>,
    pub rows: Vec<Vec<BoundValue>>,
}

impl Axis {
    pub fn single(name: &str, list: &ListValues) -> Self {
        Self {
            names: vec![name.to_string()],
            rows: list
                .iter()
                .map(|(value, counter)| {
                    vec![BoundValue {
                        value: value.to_string(),
                        counter,
                    }]
                })
                .collect(),
        }
    }

    pub fn zip(names: &[&str], lists: &[ListValues]) -> Result<Self> {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        if names.len() != lists.len() || lists.iter().any(|l| l.len() != lists[0].len()) {
            return Err(ErrorKind::ArityMismatch { names }.into());
        }
        let len = lists.first().map_or(0, ListValues::len);
        let rows = (0..len)
            .map(|i| {
                lists
                    .iter()
                    .map(|list| BoundValue {
                        value: list.values[i].clone(),
                        counter: list.counters[i],
                    })
                    .collect()
            })
            .collect();
        Ok(Self { names, rows })
    }

    pub fn declares(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Iterators declared by standalone `name in list` statements, in
/// registration order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AmbientIterators {
    axes: Vec<Axis>,
}

impl AmbientIterators {
    /// The axis declaring `name` with its registration position.
    pub fn find(&self, name: &str) -> Option<(usize, &Axis)> {
        self.axes.iter().enumerate().find(|(_, a)| a.declares(name))
    }

    /// Registers `axis`, dropping earlier axes that declare any of its names.
    pub fn declare(&mut self, axis: Axis) {
        self.axes
            .retain(|a| !a.names.iter().any(|n| axis.declares(n)));
        self.axes.push(axis);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Axis> {
        self.axes.iter()
    }

    pub fn len(&self) -> usize {
        self.axes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }
}

/// Symbol state threaded from one statement to the next.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Context {
    pub heap: LocalHeap,
    pub ambient: AmbientIterators,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local(&self, name: &str) -> Option<&LocalValue> {
        self.heap.get(name)
    }

    pub fn with_locals<I>(mut self, locals: I) -> Self
    where
        I: IntoIterator<Item = (String, LocalValue)>,
    {
        self.heap.extend(locals);
        self
    }

    pub fn with_ambient(mut self, axis: Axis) -> Self {
        self.ambient.declare(axis);
        self
    }
}
