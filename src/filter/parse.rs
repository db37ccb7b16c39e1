//! Textual filter grammar and its recursive-descent parser.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! Or         := And { '|' And }
//! And        := Entity { '&' Entity }
//! Entity     := ['!'] '(' Or ')' | Comparison | 'true' | 'false'
//! Comparison := Name RelOp (ArgRef | Name) | Name 'in' ArgRef
//! RelOp      := '==' | '!=' | '<' | '<=' | '>' | '>='
//! ArgRef     := '?' [digits]
//! ```
//!
//! `&&` and `||` are accepted as synonyms for the single-character
//! connectives; the canonical renderer emits the doubled forms. Whitespace
//! (including NUL) is insignificant between tokens. The word operator `in`
//! lexes by maximal munch, so a column literally named `inx` is an
//! identifier and never half an operator.

use std::sync::Arc;

use thiserror::Error;

use crate::{
    catalog::TableSchema,
    filter::{CompareOp, Filter},
    logging::sift_log,
};

/// Largest argument index the grammar accepts.
const MAX_ARGUMENT: u32 = u16::MAX as u32;

/// Why a filter string was rejected.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MalformedReason {
    /// The named column is not in the catalog.
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    /// The characters at the offset do not form an operator.
    #[error("unknown operator")]
    UnknownOperator,
    /// A column name was not followed by an operator.
    #[error("expected a relational operator")]
    MissingOperator,
    /// An operator was not followed by a column or argument reference.
    #[error("expected a column or argument reference")]
    MissingOperand,
    /// `!` was not followed by a parenthesized group.
    #[error("expected '(' after '!'")]
    GroupExpected,
    /// A parenthesized group was not closed.
    #[error("expected a closing parenthesis")]
    MissingCloseParen,
    /// An explicit argument number does not fit the argument index range.
    #[error("argument number is too large")]
    OversizedArgument,
    /// Input continued after a complete filter.
    #[error("trailing characters after filter")]
    TrailingCharacters,
}

/// Rejection of a filter string, carrying the text and offending offset.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed filter at offset {offset}: {reason}: {text:?}")]
pub struct MalformedFilterError {
    /// The full filter text that was rejected.
    pub text: String,
    /// Byte offset of the offending character.
    pub offset: usize,
    /// What went wrong.
    pub reason: MalformedReason,
}

/// Parses filter text against a column catalog.
pub fn parse(schema: &TableSchema, text: &str) -> Result<Filter, MalformedFilterError> {
    let mut parser = Parser {
        schema,
        text,
        pos: 0,
        next_argument: 0,
    };
    let result = parser.parse_filter();
    if let Err(error) = &result {
        sift_log!(
            log::Level::Debug,
            "filter_rejected",
            "offset={} reason=\"{}\"",
            error.offset,
            error.reason,
        );
    }
    result
}

struct Parser<'a> {
    schema: &'a TableSchema,
    text: &'a str,
    pos: usize,
    next_argument: u32,
}

impl<'a> Parser<'a> {
    fn parse_filter(&mut self) -> Result<Filter, MalformedFilterError> {
        let filter = self.parse_or()?;
        self.skip_whitespace();
        if self.pos < self.text.len() {
            return Err(self.fail(self.pos, MalformedReason::TrailingCharacters));
        }
        Ok(filter)
    }

    fn parse_or(&mut self) -> Result<Filter, MalformedFilterError> {
        let mut clauses = vec![self.parse_and()?];
        loop {
            self.skip_whitespace();
            if self.eat('|') {
                let _ = self.eat('|');
                clauses.push(self.parse_and()?);
            } else {
                break;
            }
        }
        Ok(if clauses.len() == 1 {
            clauses.pop().expect("length checked")
        } else {
            Filter::or(clauses)
        })
    }

    fn parse_and(&mut self) -> Result<Filter, MalformedFilterError> {
        let mut clauses = vec![self.parse_entity()?];
        loop {
            self.skip_whitespace();
            if self.eat('&') {
                let _ = self.eat('&');
                clauses.push(self.parse_entity()?);
            } else {
                break;
            }
        }
        Ok(if clauses.len() == 1 {
            clauses.pop().expect("length checked")
        } else {
            Filter::and(clauses)
        })
    }

    fn parse_entity(&mut self) -> Result<Filter, MalformedFilterError> {
        self.skip_whitespace();
        match self.peek() {
            Some('!') => {
                self.bump();
                self.skip_whitespace();
                if !self.eat('(') {
                    return Err(self.fail(self.pos, MalformedReason::GroupExpected));
                }
                let inner = self.parse_group_body()?;
                Ok(inner.negate())
            }
            Some('(') => {
                self.bump();
                self.parse_group_body()
            }
            Some(c) if is_ident_start(c) => self.parse_comparison(),
            _ => Err(self.fail(self.pos, MalformedReason::MissingOperand)),
        }
    }

    fn parse_group_body(&mut self) -> Result<Filter, MalformedFilterError> {
        let inner = self.parse_or()?;
        self.skip_whitespace();
        if !self.eat(')') {
            return Err(self.fail(self.pos, MalformedReason::MissingCloseParen));
        }
        Ok(inner)
    }

    fn parse_comparison(&mut self) -> Result<Filter, MalformedFilterError> {
        let name_start = self.pos;
        let name = self.parse_identifier();
        let column = match self.schema.column(name) {
            Some(descriptor) => descriptor.shared_name(),
            None => {
                // Constants are keywords only where no column shadows them.
                if name == "true" {
                    return Ok(Filter::always());
                }
                if name == "false" {
                    return Ok(Filter::never());
                }
                return Err(self.fail(
                    name_start,
                    MalformedReason::UnknownColumn(name.to_string()),
                ));
            }
        };
        self.skip_whitespace();
        let op_start = self.pos;
        match self.peek() {
            Some('=') => {
                self.bump();
                if !self.eat('=') {
                    return Err(self.fail(op_start, MalformedReason::UnknownOperator));
                }
                self.finish_relational(column, CompareOp::Equal)
            }
            Some('!') => {
                self.bump();
                if !self.eat('=') {
                    return Err(self.fail(op_start, MalformedReason::UnknownOperator));
                }
                self.finish_relational(column, CompareOp::NotEqual)
            }
            Some('<') => {
                self.bump();
                let op = if self.eat('=') {
                    CompareOp::LessThanOrEqual
                } else {
                    CompareOp::LessThan
                };
                self.finish_relational(column, op)
            }
            Some('>') => {
                self.bump();
                let op = if self.eat('=') {
                    CompareOp::GreaterThanOrEqual
                } else {
                    CompareOp::GreaterThan
                };
                self.finish_relational(column, op)
            }
            Some(c) if is_ident_start(c) => {
                let word = self.parse_identifier();
                if word == "in" {
                    self.parse_membership(column)
                } else {
                    Err(self.fail(op_start, MalformedReason::UnknownOperator))
                }
            }
            Some(_) => Err(self.fail(op_start, MalformedReason::UnknownOperator)),
            None => Err(self.fail(op_start, MalformedReason::MissingOperator)),
        }
    }

    fn finish_relational(
        &mut self,
        column: Arc<str>,
        op: CompareOp,
    ) -> Result<Filter, MalformedFilterError> {
        self.skip_whitespace();
        match self.peek() {
            Some('?') => {
                let argument = self.parse_argument()?;
                Ok(Filter::compare_argument(column, op, argument))
            }
            Some(c) if is_ident_start(c) => {
                let other_start = self.pos;
                let other = self.parse_identifier();
                match self.schema.column(other) {
                    Some(descriptor) => {
                        Ok(Filter::compare_column(column, op, descriptor.shared_name()))
                    }
                    None => Err(self.fail(
                        other_start,
                        MalformedReason::UnknownColumn(other.to_string()),
                    )),
                }
            }
            _ => Err(self.fail(self.pos, MalformedReason::MissingOperand)),
        }
    }

    fn parse_membership(&mut self, column: Arc<str>) -> Result<Filter, MalformedFilterError> {
        self.skip_whitespace();
        if self.peek() != Some('?') {
            return Err(self.fail(self.pos, MalformedReason::MissingOperand));
        }
        let argument = self.parse_argument()?;
        Ok(Filter::membership(column, argument))
    }

    fn parse_argument(&mut self) -> Result<u32, MalformedFilterError> {
        let ref_start = self.pos;
        self.bump(); // '?'
        let digits_start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        let digits = &self.text[digits_start..self.pos];
        if digits.is_empty() {
            let index = self.next_argument;
            self.next_argument += 1;
            return Ok(index);
        }
        let index: u32 = digits
            .parse()
            .map_err(|_| self.fail(ref_start, MalformedReason::OversizedArgument))?;
        if index > MAX_ARGUMENT {
            return Err(self.fail(ref_start, MalformedReason::OversizedArgument));
        }
        if index >= self.next_argument {
            self.next_argument = index + 1;
        }
        Ok(index)
    }

    fn parse_identifier(&mut self) -> &'a str {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if is_ident_continue(c)) {
            self.bump();
        }
        &self.text[start..self.pos]
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace() || c == '\0') {
            self.bump();
        }
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn fail(&self, offset: usize, reason: MalformedReason) -> MalformedFilterError {
        MalformedFilterError {
            text: self.text.to_string(),
            offset,
            reason,
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::{parse, MalformedReason};
    use crate::{
        catalog::{ColumnDescriptor, ColumnLocation, ColumnType, TableSchema},
        filter::{CompareOp, Filter, FilterNode, GroupKind, Operand},
    };

    fn schema() -> TableSchema {
        TableSchema::new(
            ["a", "b", "c", "d"]
                .into_iter()
                .map(|name| ColumnDescriptor::new(name, ColumnType::Text, ColumnLocation::Value))
                .collect(),
        )
        .expect("valid schema")
    }

    fn reason(text: &str) -> (MalformedReason, usize) {
        let error = parse(&schema(), text).expect_err("filter should be rejected");
        (error.reason, error.offset)
    }

    #[test]
    fn parses_single_comparison() {
        let filter = parse(&schema(), "a == ?").expect("parse");
        assert_eq!(filter, Filter::compare_argument("a", CompareOp::Equal, 0));
    }

    #[test]
    fn parses_all_operators() {
        for (text, op) in [
            ("a == ?0", CompareOp::Equal),
            ("a != ?0", CompareOp::NotEqual),
            ("a < ?0", CompareOp::LessThan),
            ("a <= ?0", CompareOp::LessThanOrEqual),
            ("a > ?0", CompareOp::GreaterThan),
            ("a >= ?0", CompareOp::GreaterThanOrEqual),
        ] {
            let filter = parse(&schema(), text).expect("parse");
            assert_eq!(filter, Filter::compare_argument("a", op, 0), "{text}");
        }
    }

    #[test]
    fn parses_column_to_column_without_spaces() {
        let filter = parse(&schema(), "a<b").expect("parse");
        assert_eq!(
            filter,
            Filter::compare_column("a", CompareOp::LessThan, "b")
        );
    }

    #[test]
    fn parses_membership() {
        let filter = parse(&schema(), "a in ?2").expect("parse");
        assert_eq!(filter, Filter::membership("a", 2));
        // No space needed between the keyword and the argument reference.
        assert_eq!(parse(&schema(), "a in?2").expect("parse"), filter);
    }

    #[test]
    fn connectives_single_or_doubled() {
        let expected = Filter::and([
            Filter::compare_argument("a", CompareOp::Equal, 0),
            Filter::compare_argument("b", CompareOp::Equal, 1),
        ]);
        assert_eq!(parse(&schema(), "a == ? & b == ?").expect("parse"), expected);
        assert_eq!(parse(&schema(), "a == ? && b == ?").expect("parse"), expected);

        let either = Filter::or([
            Filter::compare_argument("a", CompareOp::Equal, 0),
            Filter::compare_argument("b", CompareOp::Equal, 1),
        ]);
        assert_eq!(parse(&schema(), "a == ? | b == ?").expect("parse"), either);
        assert_eq!(parse(&schema(), "a == ? || b == ?").expect("parse"), either);
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let filter = parse(&schema(), "a == ? | b == ? & c == ?").expect("parse");
        match filter.node() {
            FilterNode::Group { kind, children } => {
                assert_eq!(*kind, GroupKind::Or);
                assert_eq!(children.len(), 2);
                assert!(matches!(
                    children[1].node(),
                    FilterNode::Group {
                        kind: GroupKind::And,
                        ..
                    }
                ));
            }
            other => panic!("expected Or group, got {other:?}"),
        }
    }

    #[test]
    fn chains_flatten_during_parse() {
        let filter = parse(&schema(), "a == ? & b == ? & c == ? & d == ?").expect("parse");
        match filter.node() {
            FilterNode::Group { children, .. } => assert_eq!(children.len(), 4),
            other => panic!("expected group, got {other:?}"),
        }
    }

    #[test]
    fn whitespace_including_nul_is_insignificant() {
        let text = "a\0==\t?0\r\n&&\u{0}b\u{a0}!= ?1";
        let filter = parse(&schema(), text).expect("parse");
        assert_eq!(filter.to_string(), "a == ?0 && b != ?1");
    }

    #[test]
    fn bare_arguments_number_sequentially() {
        let filter = parse(&schema(), "(a == ? || (b != ? && a == ?)) && (c == ?)")
            .expect("parse");
        assert_eq!(
            filter.to_string(),
            "(a == ?0 || (b != ?1 && a == ?2)) && c == ?3"
        );
    }

    #[test]
    fn explicit_arguments_advance_the_counter() {
        let filter = parse(&schema(), "a == ?5 && b == ? && c == ?").expect("parse");
        assert_eq!(filter.to_string(), "a == ?5 && b == ?6 && c == ?7");

        // An explicit index below the counter does not rewind it.
        let filter = parse(&schema(), "a == ? && b == ?0 && c == ?").expect("parse");
        assert_eq!(filter.to_string(), "a == ?0 && b == ?0 && c == ?1");
    }

    #[test]
    fn negated_group_is_pushed_to_leaves() {
        let filter = parse(&schema(), "!(a == ?0 && b < ?1)").expect("parse");
        assert_eq!(filter.to_string(), "a != ?0 || b >= ?1");
        let membership = parse(&schema(), "!(a in ?0)").expect("parse");
        assert_eq!(membership.to_string(), "!(a in ?0)");
    }

    #[test]
    fn constants_parse_when_not_shadowed() {
        assert_eq!(parse(&schema(), "true").expect("parse"), Filter::always());
        assert_eq!(
            parse(&schema(), "false | a == ?").expect("parse").to_string(),
            "false || a == ?0"
        );
    }

    #[test]
    fn column_named_in_is_usable() {
        let schema = TableSchema::new(vec![
            ColumnDescriptor::new("in", ColumnType::Text, ColumnLocation::Value),
            ColumnDescriptor::new("a", ColumnType::Text, ColumnLocation::Value),
        ])
        .expect("valid schema");
        let filter = parse(&schema, "in == ?0").expect("parse");
        assert_eq!(
            filter,
            Filter::compare_argument("in", CompareOp::Equal, 0)
        );
    }

    #[test]
    fn word_operator_requires_exact_keyword() {
        let schema = schema();
        let error = parse(&schema, "a inx ?0").expect_err("rejected");
        assert_eq!(error.reason, MalformedReason::UnknownOperator);
        assert_eq!(error.offset, 2);
    }

    #[test]
    fn rejection_reasons_and_offsets() {
        assert_eq!(
            reason("zz == ?"),
            (MalformedReason::UnknownColumn("zz".into()), 0)
        );
        assert_eq!(reason("a = ?"), (MalformedReason::UnknownOperator, 2));
        assert_eq!(reason("a"), (MalformedReason::MissingOperator, 1));
        assert_eq!(reason("a =="), (MalformedReason::MissingOperand, 4));
        assert_eq!(reason("a == ?0 )"), (MalformedReason::TrailingCharacters, 8));
        assert_eq!(
            reason("(a == ?0"),
            (MalformedReason::MissingCloseParen, 8)
        );
        assert_eq!(reason("! a == ?"), (MalformedReason::GroupExpected, 2));
        assert_eq!(
            reason("a == ?70000"),
            (MalformedReason::OversizedArgument, 5)
        );
        assert_eq!(
            reason("a == ?99999999999999999999"),
            (MalformedReason::OversizedArgument, 5)
        );
        assert_eq!(reason("a in b"), (MalformedReason::MissingOperand, 5));
        assert_eq!(reason(""), (MalformedReason::MissingOperand, 0));
    }

    #[test]
    fn error_carries_filter_text() {
        let error = parse(&schema(), "a @@ ?").expect_err("rejected");
        assert_eq!(error.text, "a @@ ?");
        assert_eq!(error.reason, MalformedReason::UnknownOperator);
        let message = error.to_string();
        assert!(message.contains("offset 2"), "{message}");
    }
}
