//! AND/OR composition of column predicates
//!
//! When a group is encoded, every distinct schema payload in the tree is
//! written once, in the outermost group's bundle, and the leaves that used it
//! travel without it. Decoding hands each bundled payload back to every leaf
//! that names its schema.
//!
//! ```text
//! group = [len:varint] gzip([operator:u8][count:varint]{child}[entries:varint]{[name:string][payload:len-prefixed]})
//! child = [1] predicate | [2] group
//! ```

use std::collections::BTreeMap;

use bytes::Bytes;
use tracing::debug;

use crate::cache::SchemaCache;
use crate::compare::ComparatorRegistry;
use crate::compress::{self, DEFAULT_LEVEL};
use crate::error::{FilterError, Result};
use crate::predicate::{ColumnEvaluator, ColumnPredicate, ReturnCode, RowFilter};
use crate::wire::{WireReader, WireWriter};

const COLUMN_TAG: u8 = 1;
const GROUP_TAG: u8 = 2;

/// Nesting limit when decoding groups
const MAX_GROUP_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Every child must pass
    And,
    /// At least one child must pass
    Or,
}

impl Operator {
    pub fn tag(self) -> u8 {
        match self {
            Operator::And => 0,
            Operator::Or => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Operator::And),
            1 => Ok(Operator::Or),
            other => Err(FilterError::UnknownOperator(other)),
        }
    }
}

/// A node of a predicate tree
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Column(ColumnPredicate),
    Group(PredicateGroup),
}

impl From<ColumnPredicate> for Filter {
    fn from(predicate: ColumnPredicate) -> Self {
        Filter::Column(predicate)
    }
}

impl From<PredicateGroup> for Filter {
    fn from(group: PredicateGroup) -> Self {
        Filter::Group(group)
    }
}

impl Filter {
    pub fn evaluator(&self, cache: &SchemaCache) -> Result<FilterEvaluator> {
        match self {
            Filter::Column(predicate) => predicate.evaluator(cache).map(FilterEvaluator::Column),
            Filter::Group(group) => group.evaluator(cache).map(FilterEvaluator::Group),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredicateGroup {
    operator: Operator,
    filters: Vec<Filter>,
    bundle: BTreeMap<String, Bytes>,
}

impl PredicateGroup {
    pub fn new(operator: Operator, filters: impl IntoIterator<Item = Filter>) -> Self {
        Self {
            operator,
            filters: filters.into_iter().collect(),
            bundle: BTreeMap::new(),
        }
    }

    pub fn and<F: Into<Filter>>(filters: impl IntoIterator<Item = F>) -> Self {
        Self::new(Operator::And, filters.into_iter().map(Into::into))
    }

    pub fn or<F: Into<Filter>>(filters: impl IntoIterator<Item = F>) -> Self {
        Self::new(Operator::Or, filters.into_iter().map(Into::into))
    }

    pub fn push(&mut self, filter: impl Into<Filter>) {
        self.filters.push(filter.into());
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Payloads hoisted out of the leaves, by schema name
    pub fn bundle(&self) -> &BTreeMap<String, Bytes> {
        &self.bundle
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Leaves at any depth
    pub fn leaf_count(&self) -> usize {
        self.filters
            .iter()
            .map(|filter| match filter {
                Filter::Column(_) => 1,
                Filter::Group(group) => group.leaf_count(),
            })
            .sum()
    }

    /// Copy of this tree with every distinct payload moved into the
    /// outermost bundle.
    ///
    /// A leaf whose schema name is already bundled with a different payload
    /// keeps its own payload inline.
    pub fn deduplicated(&self) -> PredicateGroup {
        let mut copy = self.clone();
        copy.hoist_payloads();
        copy
    }

    fn hoist_payloads(&mut self) {
        let mut children = Vec::new();
        for (i, filter) in self.filters.iter_mut().enumerate() {
            match filter {
                Filter::Column(predicate) => {
                    let Some(payload) = predicate.payload() else {
                        continue;
                    };
                    if payload.is_empty() {
                        predicate.take_payload();
                        continue;
                    }
                    match self.bundle.get(predicate.schema_name()) {
                        None => {
                            self.bundle.insert(predicate.schema_name().to_string(), payload.clone());
                            predicate.take_payload();
                        }
                        Some(bundled) if bundled == payload => {
                            predicate.take_payload();
                        }
                        Some(_) => {}
                    }
                }
                Filter::Group(group) => {
                    group.hoist_payloads();
                    children.push(i);
                }
            }
        }

        for i in children {
            let Filter::Group(group) = &mut self.filters[i] else {
                continue;
            };
            for (name, payload) in std::mem::take(&mut group.bundle) {
                match self.bundle.get(&name) {
                    None => {
                        self.bundle.insert(name, payload);
                    }
                    Some(bundled) if *bundled == payload => {}
                    Some(_) => group.restore_payload(&name, &payload),
                }
            }
        }
    }

    /// Give `payload` to every leaf named `name` that has none
    fn restore_payload(&mut self, name: &str, payload: &Bytes) {
        for filter in &mut self.filters {
            match filter {
                Filter::Column(predicate) => {
                    if predicate.payload().is_none() && predicate.schema_name() == name {
                        predicate.set_payload(payload.clone());
                    }
                }
                Filter::Group(group) => group.restore_payload(name, payload),
            }
        }
    }

    fn distribute_bundle(&mut self, bundle: &BTreeMap<String, Bytes>) {
        for filter in &mut self.filters {
            match filter {
                Filter::Column(predicate) => {
                    if predicate.payload().map_or(true, Bytes::is_empty) {
                        if let Some(payload) = bundle.get(predicate.schema_name()).filter(|p| !p.is_empty()) {
                            predicate.set_payload(payload.clone());
                        }
                    }
                }
                Filter::Group(group) => group.distribute_bundle(bundle),
            }
        }
    }

    /// Encode with the default compression level
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.encode(DEFAULT_LEVEL)
    }

    pub fn encode(&self, level: u32) -> Result<Vec<u8>> {
        let compacted = self.deduplicated();
        let mut writer = WireWriter::new();
        compacted.write(&mut writer, level)?;
        debug!(
            leaves = compacted.leaf_count(),
            bundled = compacted.bundle.len(),
            "Encoded predicate group"
        );
        Ok(writer.into_inner())
    }

    fn write(&self, writer: &mut WireWriter, level: u32) -> Result<()> {
        let mut body = WireWriter::new();
        body.put_u8(self.operator.tag());
        body.put_varint(self.filters.len() as u64);
        for filter in &self.filters {
            match filter {
                Filter::Column(predicate) => {
                    body.put_u8(COLUMN_TAG);
                    predicate.write(&mut body);
                }
                Filter::Group(group) => {
                    body.put_u8(GROUP_TAG);
                    group.write(&mut body, level)?;
                }
            }
        }
        body.put_varint(self.bundle.len() as u64);
        for (name, payload) in &self.bundle {
            body.put_str(name);
            body.put_bytes(payload);
        }

        writer.put_bytes(&compress::compress(&body.into_inner(), level)?);
        Ok(())
    }

    /// Decode a group, rebuilding byte comparators through `comparators`
    pub fn from_bytes(bytes: &[u8], comparators: &ComparatorRegistry) -> Result<Self> {
        let mut reader = WireReader::new(bytes);
        let group = Self::read(&mut reader, comparators, 0)?;
        if !reader.is_empty() {
            return Err(FilterError::malformed("trailing bytes after predicate group"));
        }
        Ok(group)
    }

    fn read(reader: &mut WireReader<'_>, comparators: &ComparatorRegistry, depth: usize) -> Result<Self> {
        if depth > MAX_GROUP_DEPTH {
            return Err(FilterError::malformed("predicate groups nested too deeply"));
        }
        let body = compress::decompress(reader.read_bytes()?)?;
        let mut body = WireReader::new(&body);

        let operator = Operator::from_tag(body.read_u8()?)?;
        let count = body.read_len()?;
        let mut filters = Vec::with_capacity(count);
        for _ in 0..count {
            let filter = match body.read_u8()? {
                COLUMN_TAG => Filter::Column(ColumnPredicate::read(&mut body, comparators)?),
                GROUP_TAG => Filter::Group(Self::read(&mut body, comparators, depth + 1)?),
                other => return Err(FilterError::UnknownFilterKind(other)),
            };
            filters.push(filter);
        }

        let entries = body.read_len()?;
        let mut bundle = BTreeMap::new();
        for _ in 0..entries {
            let name = body.read_string()?;
            let payload = body.read_bytes()?;
            if !payload.is_empty() {
                bundle.insert(name, Bytes::copy_from_slice(payload));
            }
        }
        if !body.is_empty() {
            return Err(FilterError::malformed("trailing bytes in predicate group body"));
        }

        let mut group = Self {
            operator,
            filters,
            bundle: BTreeMap::new(),
        };
        group.distribute_bundle(&bundle);
        Ok(group)
    }

    /// Fresh evaluation state for one scan
    pub fn evaluator(&self, cache: &SchemaCache) -> Result<GroupEvaluator> {
        let children = self
            .filters
            .iter()
            .map(|filter| filter.evaluator(cache))
            .collect::<Result<Vec<_>>>()?;
        Ok(GroupEvaluator {
            operator: self.operator,
            children,
        })
    }
}

/// Row-scoped evaluation of any predicate tree node
#[derive(Debug)]
pub enum FilterEvaluator {
    Column(ColumnEvaluator),
    Group(GroupEvaluator),
}

impl RowFilter for FilterEvaluator {
    fn on_value(&mut self, family: &[u8], qualifier: &[u8], value: &[u8]) -> Result<ReturnCode> {
        match self {
            FilterEvaluator::Column(column) => column.on_value(family, qualifier, value),
            FilterEvaluator::Group(group) => group.on_value(family, qualifier, value),
        }
    }

    fn row_verdict(&self) -> bool {
        match self {
            FilterEvaluator::Column(column) => column.row_verdict(),
            FilterEvaluator::Group(group) => group.row_verdict(),
        }
    }

    fn reset(&mut self) {
        match self {
            FilterEvaluator::Column(column) => column.reset(),
            FilterEvaluator::Group(group) => group.reset(),
        }
    }

    fn is_satisfied(&self) -> bool {
        match self {
            FilterEvaluator::Column(column) => column.is_satisfied(),
            FilterEvaluator::Group(group) => group.is_satisfied(),
        }
    }
}

/// Row-scoped evaluation of a [`PredicateGroup`]
#[derive(Debug)]
pub struct GroupEvaluator {
    operator: Operator,
    children: Vec<FilterEvaluator>,
}

impl GroupEvaluator {
    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn children(&self) -> &[FilterEvaluator] {
        &self.children
    }
}

impl RowFilter for GroupEvaluator {
    fn on_value(&mut self, family: &[u8], qualifier: &[u8], value: &[u8]) -> Result<ReturnCode> {
        match self.operator {
            Operator::And => {
                let mut code = ReturnCode::Include;
                for child in &mut self.children {
                    match child.on_value(family, qualifier, value)? {
                        ReturnCode::SkipRow => return Ok(ReturnCode::SkipRow),
                        ReturnCode::IncludeAndStopRow => code = ReturnCode::IncludeAndStopRow,
                        ReturnCode::Include => {}
                    }
                }
                Ok(code)
            }
            Operator::Or => {
                if self.children.iter().any(RowFilter::is_satisfied) {
                    return Ok(ReturnCode::Include);
                }
                let mut include = false;
                let mut stop = false;
                for child in &mut self.children {
                    match child.on_value(family, qualifier, value)? {
                        ReturnCode::Include => include = true,
                        ReturnCode::IncludeAndStopRow => stop = true,
                        ReturnCode::SkipRow => {}
                    }
                }
                Ok(if include {
                    ReturnCode::Include
                } else if stop {
                    ReturnCode::IncludeAndStopRow
                } else {
                    ReturnCode::SkipRow
                })
            }
        }
    }

    fn row_verdict(&self) -> bool {
        match self.operator {
            Operator::And => self.children.iter().all(RowFilter::row_verdict),
            Operator::Or => self.children.iter().any(RowFilter::row_verdict),
        }
    }

    fn reset(&mut self) {
        for child in &mut self.children {
            child.reset();
        }
    }

    fn is_satisfied(&self) -> bool {
        match self.operator {
            Operator::And => !self.children.is_empty() && self.children.iter().all(RowFilter::is_satisfied),
            Operator::Or => self.children.iter().any(RowFilter::is_satisfied),
        }
    }
}
