//! Truth-table laws for filter parsing and algebra.
//!
//! Filters are compared semantically: the atoms of a tree (one per distinct
//! column/operand pair) are enumerated, every coherent assignment of
//! outcomes to those atoms is generated, and both trees are evaluated under
//! each assignment. Assigning an *ordering* per comparison atom (rather than
//! a boolean per leaf) keeps complementary operators coherent, so `a == ?0`
//! and `a != ?0` disagree under every assignment by construction.

use std::collections::BTreeMap;

use proptest::prelude::*;
use siftdb::{
    parse, ColumnDescriptor, ColumnLocation, ColumnSet, ColumnType, CompareOp, Filter,
    FilterNode, GroupKind, Operand, TableSchema,
};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum AtomOperand {
    Argument(u32),
    Column(String),
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Atom {
    Comparison { column: String, operand: AtomOperand },
    Membership { column: String, argument: u32 },
}

#[derive(Clone, Copy, Debug)]
enum Outcome {
    Ordering(std::cmp::Ordering),
    Member(bool),
}

type Assignment = BTreeMap<Atom, Outcome>;

fn collect_atoms(filter: &Filter, atoms: &mut Vec<Atom>) {
    let atom = match filter.node() {
        FilterNode::True | FilterNode::False => return,
        FilterNode::Compare {
            column, operand, ..
        } => Atom::Comparison {
            column: column.to_string(),
            operand: match operand {
                Operand::Argument(index) => AtomOperand::Argument(*index),
                Operand::Column(other) => AtomOperand::Column(other.to_string()),
            },
        },
        FilterNode::Membership {
            column, argument, ..
        } => Atom::Membership {
            column: column.to_string(),
            argument: *argument,
        },
        FilterNode::Group { children, .. } => {
            for child in children {
                collect_atoms(child, atoms);
            }
            return;
        }
    };
    if !atoms.contains(&atom) {
        atoms.push(atom);
    }
}

fn truth(filter: &Filter, assignment: &Assignment) -> bool {
    match filter.node() {
        FilterNode::True => true,
        FilterNode::False => false,
        FilterNode::Compare {
            column, op, operand,
        } => {
            let atom = Atom::Comparison {
                column: column.to_string(),
                operand: match operand {
                    Operand::Argument(index) => AtomOperand::Argument(*index),
                    Operand::Column(other) => AtomOperand::Column(other.to_string()),
                },
            };
            match assignment[&atom] {
                Outcome::Ordering(ordering) => op.test(ordering),
                Outcome::Member(_) => unreachable!("comparison atom carries an ordering"),
            }
        }
        FilterNode::Membership {
            column,
            argument,
            negated,
        } => {
            let atom = Atom::Membership {
                column: column.to_string(),
                argument: *argument,
            };
            match assignment[&atom] {
                Outcome::Member(member) => member != *negated,
                Outcome::Ordering(_) => unreachable!("membership atom carries a boolean"),
            }
        }
        FilterNode::Group { kind, children } => match kind {
            GroupKind::And => children.iter().all(|child| truth(child, assignment)),
            GroupKind::Or => children.iter().any(|child| truth(child, assignment)),
        },
    }
}

/// Invokes `check` with every coherent assignment over the atoms of the
/// given filters.
fn for_all_assignments(filters: &[&Filter], mut check: impl FnMut(&Assignment)) {
    use std::cmp::Ordering;

    let mut atoms = Vec::new();
    for filter in filters {
        collect_atoms(filter, &mut atoms);
    }
    let choices: Vec<Vec<Outcome>> = atoms
        .iter()
        .map(|atom| match atom {
            Atom::Comparison { .. } => vec![
                Outcome::Ordering(Ordering::Less),
                Outcome::Ordering(Ordering::Equal),
                Outcome::Ordering(Ordering::Greater),
            ],
            Atom::Membership { .. } => vec![Outcome::Member(false), Outcome::Member(true)],
        })
        .collect();
    let total: usize = choices.iter().map(Vec::len).product();
    for mut index in 0..total {
        let mut assignment = Assignment::new();
        for (atom, options) in atoms.iter().zip(&choices) {
            assignment.insert(atom.clone(), options[index % options.len()]);
            index /= options.len();
        }
        check(&assignment);
    }
}

fn equivalent(left: &Filter, right: &Filter) -> bool {
    let mut same = true;
    for_all_assignments(&[left, right], |assignment| {
        same &= truth(left, assignment) == truth(right, assignment);
    });
    same
}

fn implies(weaker: &Filter, stronger: &Filter) -> bool {
    let mut holds = true;
    for_all_assignments(&[weaker, stronger], |assignment| {
        holds &= !truth(weaker, assignment) || truth(stronger, assignment);
    });
    holds
}

fn schema() -> TableSchema {
    TableSchema::new(
        ["a", "b", "c", "d"]
            .into_iter()
            .map(|name| ColumnDescriptor::new(name, ColumnType::Text, ColumnLocation::Value))
            .collect(),
    )
    .expect("valid schema")
}

fn filter(text: &str) -> Filter {
    parse(&schema(), text).expect("parse")
}

fn columns<const N: usize>(names: [&str; N]) -> ColumnSet {
    names.into_iter().collect()
}

const SAMPLE_FILTERS: &[&str] = &[
    "a == ?0",
    "a in ?0",
    "!(a in ?0)",
    "a < b",
    "true || a == ?0",
    "a == ?0 && b != ?1",
    "(a == ?0 || b <= ?1) && c > ?2",
    "a == ? || (b != ? && a == ?)",
    "(a == ?0 && b == ?1) || (c == ?2 && d == ?3)",
    "!(a == ?0 && (b in ?1 || c >= ?2))",
];

#[test]
fn rendering_round_trips_through_the_parser() {
    for text in SAMPLE_FILTERS {
        let original = filter(text);
        let reparsed = parse(&schema(), &original.to_string()).expect("rendered text parses");
        assert_eq!(reparsed, original, "{text}");
    }
}

#[test]
fn negation_disagrees_under_every_assignment() {
    for text in SAMPLE_FILTERS {
        let original = filter(text);
        let negated = original.clone().negate();
        for_all_assignments(&[&original, &negated], |assignment| {
            assert_ne!(
                truth(&original, assignment),
                truth(&negated, assignment),
                "{text}"
            );
        });
    }
}

#[test]
fn double_negation_restores_the_tree() {
    for text in SAMPLE_FILTERS {
        let original = filter(text);
        assert_eq!(original.clone().negate().negate(), original, "{text}");
    }
}

#[test]
fn cnf_preserves_truth() {
    for text in SAMPLE_FILTERS {
        let original = filter(text);
        let normal = original.clone().conjunctive_normal_form();
        assert!(equivalent(&original, &normal), "{text} vs {normal}");
    }
}

#[test]
fn reduce_preserves_truth_and_is_idempotent() {
    for text in SAMPLE_FILTERS {
        let original = filter(text);
        let reduced = original.clone().reduce();
        assert!(equivalent(&original, &reduced), "{text} vs {reduced}");
        assert_eq!(reduced.clone().reduce(), reduced, "{text}");
    }
}

#[test]
fn prioritize_preserves_truth() {
    for text in SAMPLE_FILTERS {
        for preferred in [columns(["a"]), columns(["b", "c"]), columns([])] {
            let original = filter(text);
            let reordered = original.clone().prioritize(&preferred);
            assert!(equivalent(&original, &reordered), "{text} vs {reordered}");
        }
    }
}

#[test]
fn retain_relaxes_in_the_chosen_direction() {
    for text in SAMPLE_FILTERS {
        for keep in [columns(["a"]), columns(["a", "b"]), columns([])] {
            let original = filter(text);
            let superset = original.clone().retain(&keep, true);
            assert!(implies(&original, &superset), "{text} vs {superset}");
            let subset = original.clone().retain(&keep, false);
            assert!(implies(&subset, &original), "{text} vs {subset}");
        }
    }
}

#[test]
fn extract_recomposes_to_the_original() {
    for text in SAMPLE_FILTERS {
        for keep in [columns(["a"]), columns(["a", "c"]), columns([])] {
            let original = filter(text);
            let (retained, remainder) = original.clone().extract(&keep);
            assert!(
                retained.references_only(&keep) || retained == Filter::always(),
                "{text}: {retained}"
            );
            let recomposed = Filter::and([retained, remainder]);
            assert!(equivalent(&original, &recomposed), "{text} vs {recomposed}");
        }
    }
}

/// The typical planner workflow: reorder for an index on `a`, project a key
/// range, and split the remainder for post-filtering.
#[test]
fn planner_workflow_end_to_end() {
    let reordered = filter("(a == ? || (b != ? && a == ?)) && (c == ?)").prioritize(&columns(["a"]));
    assert_eq!(
        reordered.to_string(),
        "(a == ?0 || (a == ?2 && b != ?1)) && c == ?3"
    );

    let projected = reordered.retain(&columns(["b", "c"]), true);
    assert_eq!(projected.to_string(), "c == ?3");

    let (retained, remainder) = filter("(a==?&&b==?&&c==?&&d==?)||a==?").extract(&columns(["a"]));
    assert_eq!(retained.to_string(), "a == ?0 || a == ?4");
    assert_eq!(
        remainder.to_string(),
        "(b == ?1 || a == ?4) && (c == ?2 || a == ?4) && (d == ?3 || a == ?4)"
    );
}

// Random trees stay small (two columns, two argument indexes) so exhaustive
// assignment enumeration stays cheap.
fn leaf() -> impl Strategy<Value = Filter> {
    let op = prop::sample::select(vec![
        CompareOp::Equal,
        CompareOp::NotEqual,
        CompareOp::LessThan,
        CompareOp::LessThanOrEqual,
        CompareOp::GreaterThan,
        CompareOp::GreaterThanOrEqual,
    ]);
    let column = prop::sample::select(vec!["a", "b"]);
    prop_oneof![
        (column.clone(), op, 0u32..2).prop_map(|(c, op, i)| Filter::compare_argument(c, op, i)),
        (column, 0u32..2).prop_map(|(c, i)| Filter::membership(c, i)),
        Just(Filter::always()),
        Just(Filter::never()),
    ]
}

fn tree() -> impl Strategy<Value = Filter> {
    leaf().prop_recursive(3, 12, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4).prop_map(Filter::and),
            prop::collection::vec(inner, 1..4).prop_map(Filter::or),
        ]
    })
}

proptest! {
    #[test]
    fn random_trees_round_trip_through_rendering(original in tree()) {
        let reparsed = parse(&schema(), &original.to_string()).expect("rendered text parses");
        prop_assert_eq!(reparsed, original);
    }

    #[test]
    fn random_trees_negate_to_their_complement(original in tree()) {
        let negated = original.clone().negate();
        for_all_assignments(&[&original, &negated], |assignment| {
            assert_ne!(truth(&original, assignment), truth(&negated, assignment));
        });
        prop_assert_eq!(negated.negate(), original);
    }

    #[test]
    fn random_trees_normalize_equivalently(original in tree()) {
        let normal = original.clone().conjunctive_normal_form();
        prop_assert!(equivalent(&original, &normal));
        let reduced = original.clone().reduce();
        prop_assert!(equivalent(&original, &reduced));
    }

    #[test]
    fn random_trees_extract_and_recompose(original in tree()) {
        let keep = ColumnSet::from_iter(["a"]);
        let (retained, remainder) = original.clone().extract(&keep);
        let recomposed = Filter::and([retained, remainder]);
        prop_assert!(equivalent(&original, &recomposed));
    }
}
