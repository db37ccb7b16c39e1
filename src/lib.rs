//! Predicate layer for an embedded row-oriented storage engine.
//!
//! `siftdb` parses textual row filters into an immutable boolean-algebra
//! tree, transforms that tree for index planning (normal forms, reordering,
//! projection, splitting), and evaluates it against binary-encoded rows
//! while decoding only the columns a comparison actually needs.
//!
//! ```
//! use siftdb::{
//!     parse, Bindings, ColumnDescriptor, ColumnLocation, ColumnType, DecodeContext,
//!     RowEvaluator, TableSchema, Value, Verdict,
//! };
//!
//! let schema = TableSchema::new(vec![
//!     ColumnDescriptor::new("id", ColumnType::Int64, ColumnLocation::Key),
//!     ColumnDescriptor::new("name", ColumnType::Text, ColumnLocation::Value),
//! ])
//! .unwrap();
//! let filter = parse(&schema, "id >= ? && name == ?").unwrap();
//!
//! let (key, value) = schema
//!     .encode_row(&[Value::from(3i64), Value::from("ada")])
//!     .unwrap();
//! let mut bindings = Bindings::new();
//! bindings.bind_scalar(0, 1i64);
//! bindings.bind_scalar(1, "ada");
//!
//! let evaluator = RowEvaluator::new(&schema, &bindings);
//! let mut context = DecodeContext::new(&schema);
//! let mut source: &[u8] = &value;
//! let verdict = evaluator
//!     .evaluate(&filter, &key, &mut source, &mut context)
//!     .unwrap();
//! assert_eq!(verdict, Verdict::Pass);
//! ```
//!
//! Filter trees are immutable and safe to share across concurrent scans;
//! all per-row mutable state lives in [`DecodeContext`].
#![deny(missing_docs)]

mod catalog;
mod codec;
mod eval;
mod filter;
pub(crate) mod logging;
mod value;

pub use catalog::{
    ColumnDescriptor, ColumnLocation, ColumnPosition, ColumnType, SchemaError, TableSchema,
};
pub use codec::CodecError;
pub use eval::{
    Bindings, BoundArgument, DecodeContext, EvalError, RowEvaluator, StopCondition, ValueSource,
    Verdict,
};
pub use filter::{
    parse, ColumnSet, CompareOp, Filter, FilterNode, GroupKind, MalformedFilterError,
    MalformedReason, Operand,
};
pub use value::Value;
