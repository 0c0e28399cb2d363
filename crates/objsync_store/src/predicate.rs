//! Predicates, sort descriptors and fetch requests.

use crate::value::{AttributeValue, Row};
use std::cmp::Ordering;
use std::fmt;

/// A filter over rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Property equals a value.
    Equals {
        /// Property name.
        property: String,
        /// Value to compare with.
        value: AttributeValue,
        /// Whether string comparison ignores case.
        case_insensitive: bool,
    },
    /// Every sub-predicate holds. An empty conjunction holds.
    And(Vec<Predicate>),
    /// At least one sub-predicate holds. An empty disjunction fails.
    Or(Vec<Predicate>),
    /// The sub-predicate does not hold.
    Not(Box<Predicate>),
}

impl Predicate {
    /// Equality on one property.
    pub fn equals(property: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self::Equals {
            property: property.into(),
            value: value.into(),
            case_insensitive: false,
        }
    }

    /// Case-insensitive equality on one property.
    pub fn equals_ignore_case(property: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self::Equals {
            property: property.into(),
            value: value.into(),
            case_insensitive: true,
        }
    }

    /// Conjunction. A single predicate is returned unwrapped.
    #[must_use]
    pub fn and(mut predicates: Vec<Predicate>) -> Self {
        if predicates.len() == 1 {
            predicates.remove(0)
        } else {
            Self::And(predicates)
        }
    }

    /// Disjunction.
    #[must_use]
    pub fn or(predicates: Vec<Predicate>) -> Self {
        Self::Or(predicates)
    }

    /// Negation.
    #[must_use]
    pub fn negate(predicate: Predicate) -> Self {
        Self::Not(Box::new(predicate))
    }

    /// Evaluates the predicate against a row. Unset properties match nothing.
    #[must_use]
    pub fn evaluate(&self, row: &Row) -> bool {
        match self {
            Self::Equals {
                property,
                value,
                case_insensitive,
            } => row
                .get(property)
                .is_some_and(|stored| stored.matches(value, *case_insensitive)),
            Self::And(all) => all.iter().all(|p| p.evaluate(row)),
            Self::Or(any) => any.iter().any(|p| p.evaluate(row)),
            Self::Not(inner) => !inner.evaluate(row),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, parts: &[Predicate], op: &str) -> fmt::Result {
            f.write_str("(")?;
            for (i, p) in parts.iter().enumerate() {
                if i > 0 {
                    write!(f, " {op} ")?;
                }
                write!(f, "{p}")?;
            }
            f.write_str(")")
        }

        match self {
            Self::Equals {
                property,
                value,
                case_insensitive,
            } => {
                let op = if *case_insensitive { "==[c]" } else { "==" };
                write!(f, "{property} {op} {value:?}")
            }
            Self::And(all) => join(f, all, "AND"),
            Self::Or(any) => join(f, any, "OR"),
            Self::Not(inner) => write!(f, "NOT {inner}"),
        }
    }
}

/// Orders fetch results by one property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortDescriptor {
    /// Property to sort by.
    pub key: String,
    /// Ascending when true.
    pub ascending: bool,
}

impl SortDescriptor {
    /// Creates a sort descriptor.
    pub fn new(key: impl Into<String>, ascending: bool) -> Self {
        Self {
            key: key.into(),
            ascending,
        }
    }
}

/// Compares two rows under a list of sort descriptors.
///
/// Unset values sort before set values in ascending order.
#[must_use]
pub fn compare_rows(a: &Row, b: &Row, sort: &[SortDescriptor]) -> Ordering {
    for descriptor in sort {
        let ord = match (a.get(&descriptor.key), b.get(&descriptor.key)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.compare(y),
        };
        let ord = if descriptor.ascending { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Describes which objects a fetch returns.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    /// Entity to fetch.
    pub entity: String,
    /// Optional filter.
    pub predicate: Option<Predicate>,
    /// Result ordering.
    pub sort: Vec<SortDescriptor>,
    /// Whether objects may be returned as faults with values loaded lazily.
    pub want_fault: bool,
    /// Maximum number of results. Zero means unlimited.
    pub limit: usize,
}

impl FetchRequest {
    /// Fetches every object of `entity`.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            predicate: None,
            sort: Vec::new(),
            want_fault: true,
            limit: 0,
        }
    }

    /// Sets the filter.
    #[must_use]
    pub fn predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Sets an optional filter.
    #[must_use]
    pub fn maybe_predicate(mut self, predicate: Option<Predicate>) -> Self {
        self.predicate = predicate;
        self
    }

    /// Appends a sort descriptor.
    #[must_use]
    pub fn sort_by(mut self, key: impl Into<String>, ascending: bool) -> Self {
        self.sort.push(SortDescriptor::new(key, ascending));
        self
    }

    /// Sets whether faults are acceptable.
    #[must_use]
    pub const fn want_fault(mut self, value: bool) -> Self {
        self.want_fault = value;
        self
    }

    /// Sets the result limit. Zero means unlimited.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Returns true if a row passes the filter.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        self.predicate.as_ref().map_or(true, |p| p.evaluate(row))
    }
}
