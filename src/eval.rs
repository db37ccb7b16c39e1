//! Row evaluation: applies a filter tree to one encoded row, decoding only
//! the columns a comparison actually needs.
//!
//! Evaluation keeps two column caches, one per encoded buffer (key and
//! value). Each cache records, per column ordinal, whether the column's start
//! offset is known and whether its value has been materialized. Offsets are
//! discovered prefix-ordered: locating column `i` skips over columns
//! `0..i`. Short-circuit groups snapshot and restore the caches' high-water
//! marks around speculative children so sibling branches observe consistent
//! state.

use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use thiserror::Error;

use crate::{
    catalog::{ColumnDescriptor, ColumnLocation, TableSchema},
    codec::{self, CodecError},
    filter::{Filter, FilterNode, GroupKind, Operand},
    logging::sift_log,
    value::Value,
};

/// Outcome of evaluating a filter against one row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// The row satisfies the filter.
    Pass,
    /// The row does not satisfy the filter.
    Fail,
    /// The row fails on the designated stop comparison: given the scan's
    /// ordering, no later row can pass it either, so the cursor should
    /// terminate instead of advancing.
    StopScan,
}

/// Errors raised while evaluating a filter against a row.
///
/// Codec errors mean the on-disk bytes are malformed and abort the whole
/// scan; the evaluator propagates them without reinterpretation. Because
/// evaluation is lazy, reordering filter children changes which columns get
/// decoded and therefore which codec errors are observed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvalError {
    /// A column's encoded bytes could not be decoded or skipped.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The filter references an argument index with no bound value.
    #[error("argument ?{index} is not bound")]
    UnboundArgument {
        /// The unbound argument index.
        index: u32,
    },
    /// An argument is bound, but as the wrong kind for its use site.
    #[error("argument ?{index} is bound as a {got}, expected a {expected}")]
    ArgumentKind {
        /// The offending argument index.
        index: u32,
        /// Kind the use site requires.
        expected: &'static str,
        /// Kind actually bound.
        got: &'static str,
    },
    /// A comparison paired values of incompatible types.
    #[error("cannot compare column '{column}' ({left}) with {right}")]
    TypeMismatch {
        /// Column on the left of the comparison.
        column: String,
        /// Type of the column's value.
        left: &'static str,
        /// Type of the operand.
        right: &'static str,
    },
    /// The filter references a column the schema does not declare.
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    /// The external value source failed to produce the row's value bytes.
    #[error("failed to fetch row value bytes: {0}")]
    ValueFetch(String),
}

/// A value bound to one filter argument index.
#[derive(Clone, Debug)]
pub enum BoundArgument {
    /// Operand of a relational comparison.
    Scalar(Value),
    /// Operand of a membership test.
    Collection(Vec<Value>),
}

impl BoundArgument {
    fn kind(&self) -> &'static str {
        match self {
            BoundArgument::Scalar(_) => "scalar",
            BoundArgument::Collection(_) => "collection",
        }
    }
}

/// Argument values for one evaluation, indexed by `?N` position.
#[derive(Clone, Debug, Default)]
pub struct Bindings {
    arguments: HashMap<u32, BoundArgument>,
}

impl Bindings {
    /// Creates an empty binding set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds an argument index, replacing any previous binding.
    pub fn bind(&mut self, index: u32, argument: BoundArgument) {
        self.arguments.insert(index, argument);
    }

    /// Binds a scalar value to an argument index.
    pub fn bind_scalar<V>(&mut self, index: u32, value: V)
    where
        V: Into<Value>,
    {
        self.bind(index, BoundArgument::Scalar(value.into()));
    }

    /// Binds a collection of values to an argument index.
    pub fn bind_collection<I>(&mut self, index: u32, values: I)
    where
        I: IntoIterator<Item = Value>,
    {
        self.bind(
            index,
            BoundArgument::Collection(values.into_iter().collect()),
        );
    }

    fn scalar(&self, index: u32) -> Result<&Value, EvalError> {
        match self.arguments.get(&index) {
            Some(BoundArgument::Scalar(value)) => Ok(value),
            Some(other) => Err(EvalError::ArgumentKind {
                index,
                expected: "scalar",
                got: other.kind(),
            }),
            None => Err(EvalError::UnboundArgument { index }),
        }
    }

    fn collection(&self, index: u32) -> Result<&[Value], EvalError> {
        match self.arguments.get(&index) {
            Some(BoundArgument::Collection(values)) => Ok(values),
            Some(other) => Err(EvalError::ArgumentKind {
                index,
                expected: "collection",
                got: other.kind(),
            }),
            None => Err(EvalError::UnboundArgument { index }),
        }
    }
}

/// Supplies a row's encoded value bytes on demand.
///
/// The evaluator calls this only when a comparison touches a value-encoded
/// column, so a cursor backed by separate key and value storage can defer
/// the value fetch entirely for key-only filters. The call may be slow but
/// must be synchronous.
pub trait ValueSource {
    /// Returns the current row's encoded value buffer.
    fn value_bytes(&mut self) -> Result<&[u8], EvalError>;
}

impl ValueSource for &[u8] {
    fn value_bytes(&mut self) -> Result<&[u8], EvalError> {
        Ok(*self)
    }
}

/// Designates the one comparison whose failure terminates the scan.
///
/// Matched by identity against `column op ?argument` comparisons. The
/// evaluator trusts that the cursor's traversal order is monotonic on the
/// column; it does not verify this.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StopCondition {
    column: Arc<str>,
    argument: u32,
}

impl StopCondition {
    /// Designates `column` compared against argument `?argument`.
    pub fn new<C>(column: C, argument: u32) -> Self
    where
        C: Into<Arc<str>>,
    {
        Self {
            column: column.into(),
            argument,
        }
    }
}

/// Decode state of one column within its buffer.
#[derive(Clone, Debug)]
enum Slot {
    /// Start offset unknown.
    Unlocated,
    /// Start offset known, value not materialized.
    Located(usize),
    /// Start offset known and value materialized.
    Decoded(usize, Value),
}

/// Per-buffer column cache with a high-water mark over located slots.
///
/// Invariant: every slot below `high` is `Located` or `Decoded`; every slot
/// at or above it is `Unlocated`.
#[derive(Debug)]
struct ColumnCache {
    slots: Vec<Slot>,
    high: usize,
}

impl ColumnCache {
    fn new(count: usize) -> Self {
        let mut cache = Self {
            slots: vec![Slot::Unlocated; count],
            high: 0,
        };
        cache.reset();
        cache
    }

    fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = Slot::Unlocated;
        }
        if let Some(first) = self.slots.first_mut() {
            *first = Slot::Located(0);
        }
        self.high = self.slots.len().min(1);
    }

    fn restore(&mut self, mark: usize) {
        for slot in &mut self.slots[mark..self.high] {
            *slot = Slot::Unlocated;
        }
        self.high = mark;
    }

    /// Records the end offset of `ordinal` as the start of the next slot.
    fn note_end(&mut self, ordinal: usize, end: usize) {
        let next = ordinal + 1;
        if next < self.slots.len() && self.high == next {
            self.slots[next] = Slot::Located(end);
            self.high = next + 1;
        }
    }

    /// Ensures the slot's start offset is known and returns it, skipping
    /// over earlier columns as needed. A start offset equal to the buffer
    /// length marks a column absent from this row's schema version.
    fn start_of(
        &mut self,
        schema: &TableSchema,
        location: ColumnLocation,
        buf: &[u8],
        ordinal: usize,
    ) -> Result<usize, CodecError> {
        while self.high <= ordinal {
            let prev = self.high - 1;
            let prev_start = match self.slots[prev] {
                Slot::Located(start) | Slot::Decoded(start, _) => start,
                Slot::Unlocated => unreachable!("slots below the high-water mark are located"),
            };
            let end = if prev_start == buf.len() {
                buf.len()
            } else {
                let column = schema.column_at(location, prev);
                codec::skip(column.column_type(), column.is_nullable(), buf, prev_start)?
            };
            self.slots[self.high] = Slot::Located(end);
            self.high += 1;
        }
        match self.slots[ordinal] {
            Slot::Located(start) | Slot::Decoded(start, _) => Ok(start),
            Slot::Unlocated => unreachable!("slot below the high-water mark is located"),
        }
    }

    /// Materializes the slot's value, decoding at most once. Absent columns
    /// fall back to the descriptor's declared default.
    fn decode(
        &mut self,
        schema: &TableSchema,
        location: ColumnLocation,
        buf: &[u8],
        ordinal: usize,
    ) -> Result<&Value, EvalError> {
        let start = self.start_of(schema, location, buf, ordinal)?;
        if !matches!(self.slots[ordinal], Slot::Decoded(..)) {
            let column = schema.column_at(location, ordinal);
            let value = if start == buf.len() {
                self.note_end(ordinal, start);
                column.default_value().clone()
            } else {
                let (value, end) =
                    codec::decode(column.column_type(), column.is_nullable(), buf, start)?;
                self.note_end(ordinal, end);
                value
            };
            self.slots[ordinal] = Slot::Decoded(start, value);
        }
        match &self.slots[ordinal] {
            Slot::Decoded(_, value) => Ok(value),
            _ => unreachable!("slot was just decoded"),
        }
    }

    /// Orders the column's value against a typed operand.
    ///
    /// Uses the already-decoded value when one exists. Otherwise, when the
    /// operand encodes under the column's codec, compares the encoded bytes
    /// directly without materializing a value; the codecs are
    /// order-preserving, so the byte ordering is the value ordering. Falls
    /// back to a full decode when the operand cannot be encoded (a cross-type
    /// operand surfaces as [`EvalError::TypeMismatch`] there).
    fn compare_against(
        &mut self,
        schema: &TableSchema,
        location: ColumnLocation,
        buf: &[u8],
        ordinal: usize,
        operand: &Value,
    ) -> Result<Ordering, EvalError> {
        let start = self.start_of(schema, location, buf, ordinal)?;
        let column = schema.column_at(location, ordinal);
        if let Slot::Decoded(_, value) = &self.slots[ordinal] {
            return compare_typed(column, value, operand);
        }
        if start == buf.len() {
            let default = column.default_value();
            let ordering = compare_typed(column, default, operand)?;
            let default = default.clone();
            self.slots[ordinal] = Slot::Decoded(start, default);
            self.note_end(ordinal, start);
            return Ok(ordering);
        }
        let mut encoded = Vec::new();
        if codec::encode(column.column_type(), column.is_nullable(), operand, &mut encoded).is_ok()
        {
            let (ordering, end) =
                codec::quick_compare(column.column_type(), column.is_nullable(), buf, start, &encoded)?;
            self.note_end(ordinal, end);
            return Ok(ordering);
        }
        let value = self.decode(schema, location, buf, ordinal)?;
        compare_typed(column, value, operand)
    }
}

fn compare_typed(
    column: &ColumnDescriptor,
    value: &Value,
    operand: &Value,
) -> Result<Ordering, EvalError> {
    value.compare(operand).ok_or_else(|| EvalError::TypeMismatch {
        column: column.name().to_string(),
        left: value.type_name(),
        right: operand.type_name(),
    })
}

/// Scan-local decode caches for one row, one per encoded buffer.
///
/// Owned exclusively by a single in-progress row evaluation; call
/// [`DecodeContext::reset`] before reusing it for the next row of the same
/// scan.
#[derive(Debug)]
pub struct DecodeContext {
    key: ColumnCache,
    value: ColumnCache,
}

impl DecodeContext {
    /// Creates caches sized for the schema's key and value buffers.
    #[must_use]
    pub fn new(schema: &TableSchema) -> Self {
        Self {
            key: ColumnCache::new(schema.column_count(ColumnLocation::Key)),
            value: ColumnCache::new(schema.column_count(ColumnLocation::Value)),
        }
    }

    /// Discards all located offsets and decoded values.
    pub fn reset(&mut self) {
        self.key.reset();
        self.value.reset();
    }

    fn marks(&self) -> (usize, usize) {
        (self.key.high, self.value.high)
    }

    fn restore(&mut self, (key, value): (usize, usize)) {
        self.key.restore(key);
        self.value.restore(value);
    }
}

struct RowAccess<'r> {
    key: &'r [u8],
    source: &'r mut dyn ValueSource,
}

/// Evaluates filter trees against encoded rows of one table.
///
/// Holds the schema and argument bindings for a scan; per-row state lives in
/// the [`DecodeContext`] passed to [`RowEvaluator::evaluate`].
pub struct RowEvaluator<'a> {
    schema: &'a TableSchema,
    bindings: &'a Bindings,
    stop: Option<StopCondition>,
}

impl<'a> RowEvaluator<'a> {
    /// Creates an evaluator with no stop condition.
    #[must_use]
    pub fn new(schema: &'a TableSchema, bindings: &'a Bindings) -> Self {
        Self {
            schema,
            bindings,
            stop: None,
        }
    }

    /// Designates the comparison whose failure yields [`Verdict::StopScan`].
    #[must_use]
    pub fn with_stop(mut self, stop: StopCondition) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Evaluates `filter` against the row given by `key` and `source`.
    ///
    /// `context` must be freshly created or [`DecodeContext::reset`] for
    /// this row. Value bytes are requested from `source` only when a
    /// comparison touches a value-encoded column.
    pub fn evaluate(
        &self,
        filter: &Filter,
        key: &[u8],
        source: &mut dyn ValueSource,
        context: &mut DecodeContext,
    ) -> Result<Verdict, EvalError> {
        let mut row = RowAccess { key, source };
        self.eval_node(filter, &mut row, context)
    }

    fn eval_node(
        &self,
        filter: &Filter,
        row: &mut RowAccess<'_>,
        context: &mut DecodeContext,
    ) -> Result<Verdict, EvalError> {
        match filter.node() {
            FilterNode::True => Ok(Verdict::Pass),
            FilterNode::False => Ok(Verdict::Fail),
            FilterNode::Compare {
                column,
                op,
                operand,
            } => match operand {
                Operand::Argument(index) => {
                    let operand = self.bindings.scalar(*index)?;
                    let ordering = self.compare_ordering(column, operand, row, context)?;
                    if op.test(ordering) {
                        Ok(Verdict::Pass)
                    } else if self.is_stop(column, *index) {
                        sift_log!(
                            log::Level::Trace,
                            "scan_stop",
                            "column={column} argument={index}"
                        );
                        Ok(Verdict::StopScan)
                    } else {
                        Ok(Verdict::Fail)
                    }
                }
                Operand::Column(other) => {
                    let left = self.column_value(column, row, context)?.clone();
                    // The right column is ordered against the left value, so
                    // the operator's sides flip.
                    let ordering = self.compare_ordering(other, &left, row, context)?;
                    Ok(if op.reversed().test(ordering) {
                        Verdict::Pass
                    } else {
                        Verdict::Fail
                    })
                }
            },
            FilterNode::Membership {
                column,
                argument,
                negated,
            } => {
                let elements = self.bindings.collection(*argument)?;
                let value = self.column_value(column, row, context)?;
                let mut contained = false;
                for element in elements {
                    match value.compare(element) {
                        Some(Ordering::Equal) => {
                            contained = true;
                            break;
                        }
                        Some(_) => {}
                        None => {
                            return Err(EvalError::TypeMismatch {
                                column: column.to_string(),
                                left: value.type_name(),
                                right: element.type_name(),
                            })
                        }
                    }
                }
                Ok(if contained != *negated {
                    Verdict::Pass
                } else {
                    Verdict::Fail
                })
            }
            FilterNode::Group { kind, children } => {
                self.eval_group(*kind, children, row, context)
            }
        }
    }

    /// Left-to-right short-circuit evaluation. Progress along the
    /// conjunction path is never speculative: a passing `And` child keeps
    /// its located offsets and decoded values. An `Or` alternative that
    /// fails is an abandoned branch, so its decode progress is rolled back
    /// and later siblings observe the cache state from before it ran; the
    /// first child runs unconditionally and always keeps its progress.
    fn eval_group(
        &self,
        kind: GroupKind,
        children: &[Filter],
        row: &mut RowAccess<'_>,
        context: &mut DecodeContext,
    ) -> Result<Verdict, EvalError> {
        let mut saw_stop = false;
        for (index, child) in children.iter().enumerate() {
            let marks = (kind == GroupKind::Or && index > 0).then(|| context.marks());
            let verdict = self.eval_node(child, row, context)?;
            match (verdict, kind) {
                (Verdict::Pass, GroupKind::Or) => return Ok(Verdict::Pass),
                (Verdict::Fail | Verdict::StopScan, GroupKind::And) => return Ok(verdict),
                (Verdict::Pass, GroupKind::And) => {}
                (Verdict::StopScan, GroupKind::Or) => {
                    saw_stop = true;
                    if let Some(marks) = marks {
                        context.restore(marks);
                    }
                }
                (Verdict::Fail, GroupKind::Or) => {
                    if let Some(marks) = marks {
                        context.restore(marks);
                    }
                }
            }
        }
        Ok(match kind {
            GroupKind::And => Verdict::Pass,
            GroupKind::Or if saw_stop => Verdict::StopScan,
            GroupKind::Or => Verdict::Fail,
        })
    }

    fn compare_ordering(
        &self,
        name: &str,
        operand: &Value,
        row: &mut RowAccess<'_>,
        context: &mut DecodeContext,
    ) -> Result<Ordering, EvalError> {
        let position = self
            .schema
            .position(name)
            .ok_or_else(|| EvalError::UnknownColumn(name.to_string()))?;
        match position.location {
            ColumnLocation::Key => context.key.compare_against(
                self.schema,
                ColumnLocation::Key,
                row.key,
                position.ordinal,
                operand,
            ),
            ColumnLocation::Value => {
                let buf = row.source.value_bytes()?;
                context.value.compare_against(
                    self.schema,
                    ColumnLocation::Value,
                    buf,
                    position.ordinal,
                    operand,
                )
            }
        }
    }

    fn column_value<'c>(
        &self,
        name: &str,
        row: &mut RowAccess<'_>,
        context: &'c mut DecodeContext,
    ) -> Result<&'c Value, EvalError> {
        let position = self
            .schema
            .position(name)
            .ok_or_else(|| EvalError::UnknownColumn(name.to_string()))?;
        match position.location {
            ColumnLocation::Key => {
                context
                    .key
                    .decode(self.schema, ColumnLocation::Key, row.key, position.ordinal)
            }
            ColumnLocation::Value => {
                let buf = row.source.value_bytes()?;
                context.value.decode(
                    self.schema,
                    ColumnLocation::Value,
                    buf,
                    position.ordinal,
                )
            }
        }
    }

    fn is_stop(&self, column: &str, argument: u32) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|stop| &*stop.column == column && stop.argument == argument)
    }
}
