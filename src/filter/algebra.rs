//! Transformations over filter trees: negation, conjunctive normal form,
//! reduction, and the planner-facing prioritize/retain/extract operations.
//!
//! Every transform is pure: it consumes the input tree and returns a new one
//! with the same boolean meaning (or the documented superset/subset relation
//! for `retain`). Nothing here is mutated in place.

use std::ops;

use crate::{
    filter::{ColumnSet, Filter, FilterNode, GroupKind},
    logging::sift_log,
};

impl Filter {
    /// Returns the logical negation, applying De Morgan's laws so the result
    /// contains no explicit negation nodes: group kinds flip, comparison
    /// operators are complemented, membership toggles its flag, and the
    /// constants swap.
    #[must_use]
    pub fn negate(self) -> Self {
        match self.into_node() {
            FilterNode::True => Filter::never(),
            FilterNode::False => Filter::always(),
            FilterNode::Compare {
                column,
                op,
                operand,
            } => Filter::compare(column, op.complemented(), operand),
            FilterNode::Membership {
                column,
                argument,
                negated,
            } => Filter::with_negated_membership(column, argument, !negated),
            FilterNode::Group { kind, children } => Filter::group(
                kind.dual(),
                children.into_iter().map(Filter::negate),
            ),
        }
    }

    /// Rewrites the filter into an AND of ORs with identical meaning.
    ///
    /// Distribution can grow the tree exponentially in the number of
    /// subfilters; that is an accepted property of the algebra, and any size
    /// guard belongs to the caller, not here.
    #[must_use]
    pub fn conjunctive_normal_form(self) -> Self {
        match self.into_node() {
            node @ (FilterNode::True
            | FilterNode::False
            | FilterNode::Compare { .. }
            | FilterNode::Membership { .. }) => Filter::from_node(node),
            FilterNode::Group {
                kind: GroupKind::And,
                children,
            } => Filter::and(children.into_iter().map(Filter::conjunctive_normal_form)),
            FilterNode::Group {
                kind: GroupKind::Or,
                children,
            } => children
                .into_iter()
                .map(Filter::conjunctive_normal_form)
                .reduce(distribute_or)
                .expect("groups are never empty"),
        }
    }

    /// Applies local simplifications: constants are absorbed, duplicate
    /// children dropped, and singleton groups collapsed. Idempotent; never
    /// expands the tree the way [`Filter::conjunctive_normal_form`] can.
    #[must_use]
    pub fn reduce(self) -> Self {
        let (kind, children) = match self.into_node() {
            FilterNode::Group { kind, children } => (kind, children),
            node => return Filter::from_node(node),
        };
        let mut kept: Vec<Filter> = Vec::with_capacity(children.len());
        for child in children {
            match child.reduce().into_node() {
                // A neutral constant disappears; an absorbing one decides the
                // whole group.
                FilterNode::True => {
                    if kind == GroupKind::Or {
                        return Filter::always();
                    }
                }
                FilterNode::False => {
                    if kind == GroupKind::And {
                        return Filter::never();
                    }
                }
                FilterNode::Group {
                    kind: child_kind,
                    children: grandchildren,
                } if child_kind == kind => {
                    for grandchild in grandchildren {
                        if !kept.contains(&grandchild) {
                            kept.push(grandchild);
                        }
                    }
                }
                node => {
                    let child = Filter::from_node(node);
                    if !kept.contains(&child) {
                        kept.push(child);
                    }
                }
            }
        }
        match kept.len() {
            // Every child was neutral.
            0 => Filter::constant(kind == GroupKind::And),
            1 => kept.pop().expect("length checked"),
            _ => Filter::group(kind, kept),
        }
    }

    /// Reorders group children (recursively) so children mentioning a
    /// preferred column come first, preserving relative order within each
    /// bucket. Only commutative reordering; the child set never changes.
    #[must_use]
    pub fn prioritize(self, preferred: &ColumnSet) -> Self {
        match self.into_node() {
            FilterNode::Group { kind, children } => {
                let (hits, misses): (Vec<Filter>, Vec<Filter>) = children
                    .into_iter()
                    .map(|child| child.prioritize(preferred))
                    .partition(|child| child.references(preferred));
                Filter::group(kind, hits.into_iter().chain(misses))
            }
            node => Filter::from_node(node),
        }
    }

    /// Projects the filter onto `keep`: every comparison referencing a column
    /// outside the set becomes the `when_dropped` constant, and the result is
    /// reduced.
    ///
    /// With `when_dropped = true` the result is implied by the original (safe
    /// to AND with other logic); with `false` it implies the original (safe
    /// to OR).
    #[must_use]
    pub fn retain(self, keep: &ColumnSet, when_dropped: bool) -> Self {
        self.project(keep, when_dropped).reduce()
    }

    fn project(self, keep: &ColumnSet, when_dropped: bool) -> Self {
        match self.into_node() {
            node @ (FilterNode::True | FilterNode::False) => Filter::from_node(node),
            node @ (FilterNode::Compare { .. } | FilterNode::Membership { .. }) => {
                let filter = Filter::from_node(node);
                if filter.references_only(keep) {
                    filter
                } else {
                    Filter::constant(when_dropped)
                }
            }
            FilterNode::Group { kind, children } => Filter::group(
                kind,
                children
                    .into_iter()
                    .map(|child| child.project(keep, when_dropped)),
            ),
        }
    }

    /// Splits the filter into a part expressible purely over `keep` and a
    /// remainder such that `retained AND remainder` is equivalent to the
    /// original.
    ///
    /// Implemented by partitioning the conjuncts of the conjunctive normal
    /// form; conjuncts mixing kept and dropped columns land in the remainder
    /// wholesale. The split is correct, not guaranteed minimal.
    #[must_use]
    pub fn extract(self, keep: &ColumnSet) -> (Self, Self) {
        let normal = self.conjunctive_normal_form();
        let conjuncts = match normal.into_node() {
            FilterNode::Group {
                kind: GroupKind::And,
                children,
            } => children,
            node => vec![Filter::from_node(node)],
        };
        let mut retained = Vec::new();
        let mut remainder = Vec::new();
        for conjunct in conjuncts {
            if conjunct.references_only(keep) {
                retained.push(conjunct);
            } else {
                remainder.push(conjunct);
            }
        }
        sift_log!(
            log::Level::Debug,
            "filter_extract",
            "retained={} remainder={}",
            retained.len(),
            remainder.len(),
        );
        (rebuild_conjunction(retained), rebuild_conjunction(remainder))
    }
}

impl ops::Not for Filter {
    type Output = Filter;

    fn not(self) -> Filter {
        self.negate()
    }
}

/// Distributes two CNF operands of an OR: pairs every conjunct of `left`
/// with every conjunct of `right` into OR clauses, ANDed together.
fn distribute_or(left: Filter, right: Filter) -> Filter {
    let left_conjuncts = conjuncts_of(left);
    let right_conjuncts = conjuncts_of(right);
    let mut clauses = Vec::with_capacity(left_conjuncts.len() * right_conjuncts.len());
    for left_clause in &left_conjuncts {
        for right_clause in &right_conjuncts {
            clauses.push(Filter::or([left_clause.clone(), right_clause.clone()]));
        }
    }
    Filter::and(clauses)
}

fn conjuncts_of(filter: Filter) -> Vec<Filter> {
    match filter.into_node() {
        FilterNode::Group {
            kind: GroupKind::And,
            children,
        } => children,
        node => vec![Filter::from_node(node)],
    }
}

fn rebuild_conjunction(conjuncts: Vec<Filter>) -> Filter {
    if conjuncts.is_empty() {
        Filter::always()
    } else {
        Filter::and(conjuncts)
    }
}
