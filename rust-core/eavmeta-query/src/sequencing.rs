// SPDX-License-Identifier: PMPL-1.0-or-later
//! Sequencing and paging.
//!
//! Appends a deterministic order and an offset/limit window to a compiled
//! query. Every order is total: ties fall back to the record key.

use eavmeta_model::attribute::header;
use eavmeta_model::AttributeKey;
use eavmeta_store::{Clause, ConstraintQuery, Direction, OrderKey, Var};
use serde::{Deserialize, Serialize};

use crate::config::QueryConfig;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencingOrder {
    /// Store order (by record key).
    #[default]
    Any,
    Guid,
    CreationDateRecent,
    CreationDateOldest,
    LastUpdateRecent,
    LastUpdateOldest,
    PropertyAscending(String),
    PropertyDescending(String),
}

impl SequencingOrder {
    /// Name of the property this order sorts on, if any.
    pub fn property(&self) -> Option<&str> {
        match self {
            SequencingOrder::PropertyAscending(p) | SequencingOrder::PropertyDescending(p) => Some(p),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Paging {
    /// Index of the first row returned.
    pub offset: usize,
    /// Rows per page; 0 means the configured maximum.
    pub page_size: usize,
}

impl Paging {
    pub fn new(offset: usize, page_size: usize) -> Self {
        Self { offset, page_size }
    }

    pub fn effective_limit(&self, config: &QueryConfig) -> usize {
        if self.page_size == 0 {
            config.max_page_size
        } else {
            self.page_size.min(config.max_page_size)
        }
    }
}

/// Apply `order` and `paging` to `query`, whose records are bound to
/// `record`.
///
/// `property_keys` are the qualified keys of the sort property, if the
/// order sorts on one; the first key present on a record is used so that
/// a record is never counted twice.
pub fn apply(
    query: &mut ConstraintQuery,
    record: &Var,
    order: &SequencingOrder,
    property_keys: &[AttributeKey],
    paging: Paging,
    config: &QueryConfig,
) {
    let sort = Var::new("sort");
    let keyed = |attributes: Vec<String>, direction: Direction, query: &mut ConstraintQuery| {
        query.push(Clause::FirstOf {
            entity: record.clone(),
            attributes,
            bind: sort.clone(),
        });
        query.project(&sort);
        query.order_by.push(OrderKey { var: sort.clone(), direction });
    };

    match order {
        SequencingOrder::Any => {}
        SequencingOrder::Guid => query.order_by.push(OrderKey {
            var: record.clone(),
            direction: Direction::Asc,
        }),
        SequencingOrder::CreationDateRecent => keyed(vec![header::CREATE_TIME.into()], Direction::Desc, query),
        SequencingOrder::CreationDateOldest => keyed(vec![header::CREATE_TIME.into()], Direction::Asc, query),
        SequencingOrder::LastUpdateRecent => keyed(
            vec![header::UPDATE_TIME.into(), header::CREATE_TIME.into()],
            Direction::Desc,
            query,
        ),
        SequencingOrder::LastUpdateOldest => keyed(
            vec![header::UPDATE_TIME.into(), header::CREATE_TIME.into()],
            Direction::Asc,
            query,
        ),
        SequencingOrder::PropertyAscending(_) | SequencingOrder::PropertyDescending(_) => {
            let direction = if matches!(order, SequencingOrder::PropertyAscending(_)) {
                Direction::Asc
            } else {
                Direction::Desc
            };
            keyed(property_keys.iter().map(AttributeKey::queryable).collect(), direction, query);
        }
    }

    query.offset = paging.offset;
    query.limit = Some(paging.effective_limit(config));
    query.timeout = Some(config.query_timeout());
}

#[cfg(test)]
mod tests {
    use super::*;
    use eavmeta_model::Namespace;

    #[test]
    fn test_page_size_clamped() {
        let config = QueryConfig { max_page_size: 100, ..QueryConfig::default() };
        assert_eq!(Paging::new(0, 0).effective_limit(&config), 100);
        assert_eq!(Paging::new(0, 10).effective_limit(&config), 10);
        assert_eq!(Paging::new(0, 5000).effective_limit(&config), 100);
    }

    #[test]
    fn test_property_order_uses_first_of() {
        let e = Var::new("e");
        let mut query = ConstraintQuery::find(e.clone());
        let keys = vec![
            AttributeKey::new(Namespace::EntityProperties, "name", Some("A".into())),
            AttributeKey::new(Namespace::EntityProperties, "name", Some("B".into())),
        ];
        apply(
            &mut query,
            &e,
            &SequencingOrder::PropertyDescending("name".into()),
            &keys,
            Paging::new(5, 10),
            &QueryConfig::default(),
        );
        match query.clauses.last() {
            Some(Clause::FirstOf { attributes, .. }) => assert_eq!(attributes.len(), 2),
            other => panic!("unexpected clause {other:?}"),
        }
        assert_eq!(query.find.len(), 2);
        assert_eq!(query.order_by[0].direction, Direction::Desc);
        assert_eq!((query.offset, query.limit), (5, Some(10)));
        assert!(query.timeout.is_some());
    }

    #[test]
    fn test_any_adds_no_sort_column() {
        let e = Var::new("e");
        let mut query = ConstraintQuery::find(e.clone());
        apply(&mut query, &e, &SequencingOrder::Any, &[], Paging::default(), &QueryConfig::default());
        assert_eq!(query.find.len(), 1);
        assert!(query.order_by.is_empty());
    }
}
