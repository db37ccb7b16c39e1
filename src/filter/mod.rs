//! Immutable boolean filter trees over row columns.
//!
//! A [`Filter`] is built once — by the parser or by an algebra transform —
//! and then shared read-only across scans. Groups flatten same-kind children
//! at construction, equality ignores display labels and child order inside a
//! group, and the canonical rendering is itself valid filter text.

mod algebra;
pub mod parse;

use std::{
    cmp::Ordering,
    collections::{hash_map::DefaultHasher, HashSet},
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

pub use parse::{parse, MalformedFilterError, MalformedReason};

/// Relational operator used by comparison nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// Equals (`==`).
    Equal,
    /// Not equals (`!=`).
    NotEqual,
    /// Less than (`<`).
    LessThan,
    /// Less than or equal to (`<=`).
    LessThanOrEqual,
    /// Greater than (`>`).
    GreaterThan,
    /// Greater than or equal to (`>=`).
    GreaterThanOrEqual,
}

impl CompareOp {
    /// Returns a textual representation of the operator.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Equal => "==",
            CompareOp::NotEqual => "!=",
            CompareOp::LessThan => "<",
            CompareOp::LessThanOrEqual => "<=",
            CompareOp::GreaterThan => ">",
            CompareOp::GreaterThanOrEqual => ">=",
        }
    }

    /// Returns the operator that swaps the left/right side of the comparison.
    #[must_use]
    pub fn reversed(self) -> Self {
        match self {
            CompareOp::Equal => CompareOp::Equal,
            CompareOp::NotEqual => CompareOp::NotEqual,
            CompareOp::LessThan => CompareOp::GreaterThan,
            CompareOp::LessThanOrEqual => CompareOp::GreaterThanOrEqual,
            CompareOp::GreaterThan => CompareOp::LessThan,
            CompareOp::GreaterThanOrEqual => CompareOp::LessThanOrEqual,
        }
    }

    /// Returns the logical complement of this operator (De Morgan negation).
    #[must_use]
    pub fn complemented(self) -> Self {
        match self {
            CompareOp::Equal => CompareOp::NotEqual,
            CompareOp::NotEqual => CompareOp::Equal,
            CompareOp::LessThan => CompareOp::GreaterThanOrEqual,
            CompareOp::LessThanOrEqual => CompareOp::GreaterThan,
            CompareOp::GreaterThan => CompareOp::LessThanOrEqual,
            CompareOp::GreaterThanOrEqual => CompareOp::LessThan,
        }
    }

    /// Evaluates the operator against a comparison ordering.
    #[must_use]
    pub fn test(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Equal => ordering == Ordering::Equal,
            CompareOp::NotEqual => ordering != Ordering::Equal,
            CompareOp::LessThan => ordering == Ordering::Less,
            CompareOp::LessThanOrEqual => ordering != Ordering::Greater,
            CompareOp::GreaterThan => ordering == Ordering::Greater,
            CompareOp::GreaterThanOrEqual => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connective of a group node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GroupKind {
    /// Conjunction; all children must pass.
    And,
    /// Disjunction; one passing child suffices.
    Or,
}

impl GroupKind {
    /// Returns the other connective (used by De Morgan negation).
    #[must_use]
    pub fn dual(self) -> Self {
        match self {
            GroupKind::And => GroupKind::Or,
            GroupKind::Or => GroupKind::And,
        }
    }

    fn separator(self) -> &'static str {
        match self {
            GroupKind::And => " && ",
            GroupKind::Or => " || ",
        }
    }
}

/// Right-hand side of a comparison node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    /// Positional reference into the query's runtime argument list.
    Argument(u32),
    /// Another column of the same table.
    Column(Arc<str>),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Argument(index) => write!(f, "?{index}"),
            Operand::Column(name) => f.write_str(name),
        }
    }
}

/// Variants of the filter tree.
#[derive(Clone, Debug)]
pub enum FilterNode {
    /// Always passes.
    True,
    /// Always fails.
    False,
    /// Compares a column against an argument or another column.
    Compare {
        /// Column on the left of the operator.
        column: Arc<str>,
        /// Relational operator.
        op: CompareOp,
        /// Right-hand operand.
        operand: Operand,
    },
    /// Tests a column for membership in an argument collection.
    Membership {
        /// Column under test.
        column: Arc<str>,
        /// Argument index of the collection.
        argument: u32,
        /// True when representing the negated test.
        negated: bool,
    },
    /// Conjunction or disjunction over two or more child filters.
    Group {
        /// Connective joining the children.
        kind: GroupKind,
        /// Ordered child filters; never empty, never a same-kind group.
        children: Vec<Filter>,
    },
}

/// Immutable boolean filter over row columns.
///
/// Wraps a [`FilterNode`] plus an optional display label. The label is
/// ignored by equality, hashing, and rendering.
#[derive(Clone, Debug)]
pub struct Filter {
    node: FilterNode,
    label: Option<Arc<str>>,
}

impl Filter {
    /// The filter that passes every row.
    #[must_use]
    pub fn always() -> Self {
        Self::from_node(FilterNode::True)
    }

    /// The filter that fails every row.
    #[must_use]
    pub fn never() -> Self {
        Self::from_node(FilterNode::False)
    }

    /// The constant filter for the given truth value.
    #[must_use]
    pub fn constant(value: bool) -> Self {
        if value {
            Self::always()
        } else {
            Self::never()
        }
    }

    /// A comparison of a column against an arbitrary operand.
    #[must_use]
    pub fn compare<C>(column: C, op: CompareOp, operand: Operand) -> Self
    where
        C: Into<Arc<str>>,
    {
        Self::from_node(FilterNode::Compare {
            column: column.into(),
            op,
            operand,
        })
    }

    /// A comparison of a column against a positional argument.
    #[must_use]
    pub fn compare_argument<C>(column: C, op: CompareOp, argument: u32) -> Self
    where
        C: Into<Arc<str>>,
    {
        Self::compare(column, op, Operand::Argument(argument))
    }

    /// A comparison of one column against another.
    #[must_use]
    pub fn compare_column<A, B>(column: A, op: CompareOp, other: B) -> Self
    where
        A: Into<Arc<str>>,
        B: Into<Arc<str>>,
    {
        Self::compare(column, op, Operand::Column(other.into()))
    }

    /// A membership test of a column against an argument collection.
    #[must_use]
    pub fn membership<C>(column: C, argument: u32) -> Self
    where
        C: Into<Arc<str>>,
    {
        Self::from_node(FilterNode::Membership {
            column: column.into(),
            argument,
            negated: false,
        })
    }

    /// Builds a conjunction, flattening nested conjunctions and collapsing a
    /// single clause to itself.
    ///
    /// # Panics
    ///
    /// Panics if no clauses are provided.
    #[must_use]
    pub fn and<I>(clauses: I) -> Self
    where
        I: IntoIterator<Item = Filter>,
    {
        Self::group(GroupKind::And, clauses)
    }

    /// Builds a disjunction, flattening nested disjunctions and collapsing a
    /// single clause to itself.
    ///
    /// # Panics
    ///
    /// Panics if no clauses are provided.
    #[must_use]
    pub fn or<I>(clauses: I) -> Self
    where
        I: IntoIterator<Item = Filter>,
    {
        Self::group(GroupKind::Or, clauses)
    }

    /// Builds a group of the given kind with construction-time flattening.
    ///
    /// # Panics
    ///
    /// Panics if no clauses are provided.
    #[must_use]
    pub fn group<I>(kind: GroupKind, clauses: I) -> Self
    where
        I: IntoIterator<Item = Filter>,
    {
        let mut acc = Vec::new();
        for clause in clauses {
            match clause.node {
                FilterNode::Group {
                    kind: child_kind,
                    children,
                } if child_kind == kind => acc.extend(children),
                _ => acc.push(clause),
            }
        }
        assert!(!acc.is_empty(), "Filter::group requires at least one clause");
        if acc.len() == 1 {
            acc.pop().expect("length checked")
        } else {
            Self::from_node(FilterNode::Group {
                kind,
                children: acc,
            })
        }
    }

    /// Returns a reference to the underlying node.
    #[must_use]
    pub fn node(&self) -> &FilterNode {
        &self.node
    }

    /// Display label attached to this filter, if any.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Attaches a display label. Labels never affect equality or rendering.
    #[must_use]
    pub fn with_label<L>(mut self, label: L) -> Self
    where
        L: Into<Arc<str>>,
    {
        self.label = Some(label.into());
        self
    }

    /// Whether any comparison in the filter references a column in `set`.
    #[must_use]
    pub fn references(&self, set: &ColumnSet) -> bool {
        match &self.node {
            FilterNode::True | FilterNode::False => false,
            FilterNode::Compare { column, operand, .. } => {
                set.contains(column)
                    || matches!(operand, Operand::Column(other) if set.contains(other))
            }
            FilterNode::Membership { column, .. } => set.contains(column),
            FilterNode::Group { children, .. } => {
                children.iter().any(|child| child.references(set))
            }
        }
    }

    /// Whether every column referenced by the filter is in `set`.
    /// Constant filters reference no columns and trivially qualify.
    #[must_use]
    pub fn references_only(&self, set: &ColumnSet) -> bool {
        match &self.node {
            FilterNode::True | FilterNode::False => true,
            FilterNode::Compare { column, operand, .. } => {
                set.contains(column)
                    && match operand {
                        Operand::Argument(_) => true,
                        Operand::Column(other) => set.contains(other),
                    }
            }
            FilterNode::Membership { column, .. } => set.contains(column),
            FilterNode::Group { children, .. } => {
                children.iter().all(|child| child.references_only(set))
            }
        }
    }

    /// Collects every column name referenced by the filter.
    #[must_use]
    pub fn columns(&self) -> ColumnSet {
        let mut set = ColumnSet::new();
        self.collect_columns(&mut set);
        set
    }

    fn collect_columns(&self, set: &mut ColumnSet) {
        match &self.node {
            FilterNode::True | FilterNode::False => {}
            FilterNode::Compare { column, operand, .. } => {
                set.insert(Arc::clone(column));
                if let Operand::Column(other) = operand {
                    set.insert(Arc::clone(other));
                }
            }
            FilterNode::Membership { column, .. } => set.insert(Arc::clone(column)),
            FilterNode::Group { children, .. } => {
                for child in children {
                    child.collect_columns(set);
                }
            }
        }
    }

    pub(crate) fn from_node(node: FilterNode) -> Self {
        Self { node, label: None }
    }

    pub(crate) fn with_negated_membership<C>(column: C, argument: u32, negated: bool) -> Self
    where
        C: Into<Arc<str>>,
    {
        Self::from_node(FilterNode::Membership {
            column: column.into(),
            argument,
            negated,
        })
    }

    pub(crate) fn into_node(self) -> FilterNode {
        self.node
    }

    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node {
            FilterNode::True => f.write_str("true"),
            FilterNode::False => f.write_str("false"),
            FilterNode::Compare {
                column,
                op,
                operand,
            } => write!(f, "{column} {op} {operand}"),
            FilterNode::Membership {
                column,
                argument,
                negated,
            } => {
                if *negated {
                    write!(f, "!({column} in ?{argument})")
                } else {
                    write!(f, "{column} in ?{argument}")
                }
            }
            FilterNode::Group { kind, children } => {
                for (index, child) in children.iter().enumerate() {
                    if index > 0 {
                        f.write_str(kind.separator())?;
                    }
                    if matches!(child.node, FilterNode::Group { .. }) {
                        f.write_str("(")?;
                        child.render(f)?;
                        f.write_str(")")?;
                    } else {
                        child.render(f)?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Filter {
    /// Canonical filter text: re-parsing it reproduces an equal tree.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f)
    }
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

impl Eq for Filter {}

impl PartialEq for FilterNode {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FilterNode::True, FilterNode::True) | (FilterNode::False, FilterNode::False) => true,
            (
                FilterNode::Compare {
                    column: lc,
                    op: lo,
                    operand: lr,
                },
                FilterNode::Compare {
                    column: rc,
                    op: ro,
                    operand: rr,
                },
            ) => lc == rc && lo == ro && lr == rr,
            (
                FilterNode::Membership {
                    column: lc,
                    argument: la,
                    negated: ln,
                },
                FilterNode::Membership {
                    column: rc,
                    argument: ra,
                    negated: rn,
                },
            ) => lc == rc && la == ra && ln == rn,
            (
                FilterNode::Group {
                    kind: lk,
                    children: lc,
                },
                FilterNode::Group {
                    kind: rk,
                    children: rc,
                },
            ) => lk == rk && multiset_eq(lc, rc),
            _ => false,
        }
    }
}

impl Eq for FilterNode {}

// Group children compare as a multiset, so the hash must combine child
// hashes commutatively.
impl Hash for FilterNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            FilterNode::True => state.write_u8(0),
            FilterNode::False => state.write_u8(1),
            FilterNode::Compare {
                column,
                op,
                operand,
            } => {
                state.write_u8(2);
                column.hash(state);
                op.hash(state);
                operand.hash(state);
            }
            FilterNode::Membership {
                column,
                argument,
                negated,
            } => {
                state.write_u8(3);
                column.hash(state);
                argument.hash(state);
                negated.hash(state);
            }
            FilterNode::Group { kind, children } => {
                state.write_u8(4);
                kind.hash(state);
                let mut combined: u64 = 0;
                for child in children {
                    let mut hasher = DefaultHasher::new();
                    child.hash(&mut hasher);
                    combined ^= hasher.finish();
                }
                state.write_u64(combined);
            }
        }
    }
}

impl Hash for Filter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node.hash(state);
    }
}

fn multiset_eq(left: &[Filter], right: &[Filter]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut used = vec![false; right.len()];
    'outer: for item in left {
        for (index, candidate) in right.iter().enumerate() {
            if !used[index] && item == candidate {
                used[index] = true;
                continue 'outer;
            }
        }
        return false;
    }
    true
}

/// Set of column names consumed by the planner-facing transforms.
#[derive(Clone, Debug, Default)]
pub struct ColumnSet {
    names: HashSet<Arc<str>>,
}

impl ColumnSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column name.
    pub fn insert<N>(&mut self, name: N)
    where
        N: Into<Arc<str>>,
    {
        self.names.insert(name.into());
    }

    /// Whether the set contains `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of names in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<N> FromIterator<N> for ColumnSet
where
    N: Into<Arc<str>>,
{
    fn from_iter<I: IntoIterator<Item = N>>(iter: I) -> Self {
        let mut set = Self::new();
        for name in iter {
            set.insert(name);
        }
        set
    }
}
