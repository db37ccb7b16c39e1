//! Column catalog: descriptors and the table schema consumed by the parser
//! and the row evaluator.

use std::{collections::HashMap, sync::Arc};

use thiserror::Error;

use crate::{
    codec::{self, CodecError},
    value::Value,
};

/// Semantic type of a column, which selects its binary codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    /// Boolean, one byte.
    Bool,
    /// Signed 64-bit integer, fixed width.
    Int64,
    /// Unsigned 64-bit integer, fixed width.
    UInt64,
    /// 64-bit floating point, fixed width.
    Float64,
    /// UTF-8 string, NUL-terminated.
    Text,
    /// Binary blob, escaped and terminated.
    Bytes,
}

impl ColumnType {
    /// Returns the zero value of the type, the implicit column default.
    #[must_use]
    pub fn zero_value(self) -> Value {
        match self {
            ColumnType::Bool => Value::Bool(false),
            ColumnType::Int64 => Value::Int64(0),
            ColumnType::UInt64 => Value::UInt64(0),
            ColumnType::Float64 => Value::Float64(0.0),
            ColumnType::Text => Value::Text(String::new()),
            ColumnType::Bytes => Value::Bytes(Vec::new()),
        }
    }
}

/// Physical placement of a column within an encoded row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnLocation {
    /// Encoded into the row key; participates in scan ordering.
    Key,
    /// Encoded into the row value.
    Value,
}

/// Immutable description of a single column.
#[derive(Clone, Debug)]
pub struct ColumnDescriptor {
    name: Arc<str>,
    ty: ColumnType,
    location: ColumnLocation,
    nullable: bool,
    default: Value,
}

impl ColumnDescriptor {
    /// Creates a non-nullable descriptor whose default is the type's zero value.
    #[must_use]
    pub fn new<N>(name: N, ty: ColumnType, location: ColumnLocation) -> Self
    where
        N: Into<Arc<str>>,
    {
        Self {
            name: name.into(),
            ty,
            location,
            nullable: false,
            default: ty.zero_value(),
        }
    }

    /// Marks the column nullable; the default becomes `Null`.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self.default = Value::Null;
        self
    }

    /// Overrides the declared default value, used when a row predates the column.
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = default;
        self
    }

    /// Column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Semantic type.
    #[must_use]
    pub fn column_type(&self) -> ColumnType {
        self.ty
    }

    /// Which encoded buffer holds the column.
    #[must_use]
    pub fn location(&self) -> ColumnLocation {
        self.location
    }

    /// Whether the column admits `Null`.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Declared default value.
    #[must_use]
    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }
}

/// Position of a column within one of the two encoded buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnPosition {
    /// Buffer holding the column.
    pub location: ColumnLocation,
    /// Zero-based index of the column within that buffer's encoded order.
    pub ordinal: usize,
}

/// Errors raised while building a schema or encoding a row against it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// Two columns share a name.
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),
    /// `encode_row` received the wrong number of values.
    #[error("row has {got} values, schema declares {expected} columns")]
    RowArity {
        /// Number of columns the schema declares.
        expected: usize,
        /// Number of values supplied.
        got: usize,
    },
    /// A value could not be encoded under its column's codec.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// The column catalog for one table: descriptors in declaration order plus
/// derived per-buffer encoded orders.
///
/// Shared read-only across scans; the parser resolves names against it and
/// the evaluator consults it for codec and placement information.
#[derive(Clone, Debug)]
pub struct TableSchema {
    columns: Vec<ColumnDescriptor>,
    by_name: HashMap<Arc<str>, usize>,
    key_order: Vec<usize>,
    value_order: Vec<usize>,
}

impl TableSchema {
    /// Builds a schema from descriptors in declaration order.
    pub fn new(columns: Vec<ColumnDescriptor>) -> Result<Self, SchemaError> {
        let mut by_name = HashMap::with_capacity(columns.len());
        let mut key_order = Vec::new();
        let mut value_order = Vec::new();
        for (index, column) in columns.iter().enumerate() {
            if by_name.insert(column.shared_name(), index).is_some() {
                return Err(SchemaError::DuplicateColumn(column.name().to_string()));
            }
            match column.location() {
                ColumnLocation::Key => key_order.push(index),
                ColumnLocation::Value => value_order.push(index),
            }
        }
        Ok(Self {
            columns,
            by_name,
            key_order,
            value_order,
        })
    }

    /// Whether a column with the given name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Looks up a column descriptor by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.by_name.get(name).map(|&index| &self.columns[index])
    }

    /// Looks up a column's buffer and ordinal by name.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<ColumnPosition> {
        let &index = self.by_name.get(name)?;
        let column = &self.columns[index];
        let order = self.buffer_order(column.location());
        let ordinal = order
            .iter()
            .position(|&i| i == index)
            .expect("column is indexed under its own location");
        Some(ColumnPosition {
            location: column.location(),
            ordinal,
        })
    }

    /// Number of columns encoded into the given buffer.
    #[must_use]
    pub fn column_count(&self, location: ColumnLocation) -> usize {
        self.buffer_order(location).len()
    }

    /// Descriptor of the column at `ordinal` within the given buffer.
    ///
    /// # Panics
    ///
    /// Panics when the ordinal is out of range for the buffer.
    #[must_use]
    pub fn column_at(&self, location: ColumnLocation, ordinal: usize) -> &ColumnDescriptor {
        let index = self.buffer_order(location)[ordinal];
        &self.columns[index]
    }

    /// All descriptors in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Encodes one row's values (in declaration order) into its key and
    /// value buffers. Writer-side helper; the evaluator only reads.
    pub fn encode_row(&self, values: &[Value]) -> Result<(Vec<u8>, Vec<u8>), SchemaError> {
        if values.len() != self.columns.len() {
            return Err(SchemaError::RowArity {
                expected: self.columns.len(),
                got: values.len(),
            });
        }
        let mut key = Vec::new();
        let mut value = Vec::new();
        for (column, item) in self.columns.iter().zip(values) {
            let out = match column.location() {
                ColumnLocation::Key => &mut key,
                ColumnLocation::Value => &mut value,
            };
            codec::encode(column.column_type(), column.is_nullable(), item, out)?;
        }
        Ok((key, value))
    }

    fn buffer_order(&self, location: ColumnLocation) -> &[usize] {
        match location {
            ColumnLocation::Key => &self.key_order,
            ColumnLocation::Value => &self.value_order,
        }
    }
}
