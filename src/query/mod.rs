//! Translates list-endpoint query strings into a [`ListQuery`].
//!
//! Stages run in a fixed order (filter, sort, fields, paginate) and do no I/O;
//! the store decides which field names and operators it can execute.

mod params;

pub use params::{ParamValue, QueryParams};

use serde_json::Value;

/// Keys consumed by the sort/fields/paginate stages.
const RESERVED_KEYS: [&str; 4] = ["page", "sort", "limit", "fields"];

pub const DEFAULT_SORT: &str = "-createdAt";
pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 100;
/// Internal metadata hidden from responses unless requested.
pub const VERSION_FIELD: &str = "__v";
/// Identifier kept by every include projection.
pub const ID_FIELD: &str = "id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Gte,
    Lt,
    Lte,
    /// Operator the builder does not recognise; left for the executor.
    Other(String),
}

impl Comparison {
    fn parse(op: &str) -> Self {
        match op {
            "gt" => Comparison::Gt,
            "gte" => Comparison::Gte,
            "lt" => Comparison::Lt,
            "lte" => Comparison::Lte,
            other => Comparison::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Eq(String),
    Cmp(Comparison, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    pub field: String,
    pub condition: Condition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: Direction,
}

impl SortKey {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (field, direction) = match raw.strip_prefix('-') {
            Some(rest) => (rest, Direction::Desc),
            None => (raw.strip_prefix('+').unwrap_or(raw), Direction::Asc),
        };
        if field.is_empty() {
            return None;
        }
        Some(Self {
            field: field.to_string(),
            direction,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    #[default]
    All,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl Projection {
    /// Applies the projection to a serialized record (a JSON object).
    /// An include list always keeps the record's `id`.
    pub fn apply(&self, value: Value) -> Value {
        let Value::Object(mut map) = value else {
            return value;
        };
        match self {
            Projection::All => {}
            Projection::Include(fields) => {
                map.retain(|k, _| k == ID_FIELD || fields.iter().any(|f| f == k))
            }
            Projection::Exclude(fields) => map.retain(|k, _| !fields.iter().any(|f| f == k)),
        }
        Value::Object(map)
    }
}

/// Fully parameterised list query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListQuery {
    pub filters: Vec<FieldFilter>,
    pub sort: Vec<SortKey>,
    pub projection: Projection,
    pub skip: u64,
    /// No upper bound is applied.
    pub limit: Option<u64>,
}

impl ListQuery {
    /// Runs every stage in order.
    pub fn from_params(params: &QueryParams) -> Self {
        QueryFeatures::new(params)
            .filter()
            .sort()
            .limit_fields()
            .paginate()
            .build()
    }
}

/// Stage-by-stage builder; stages not invoked leave their part of the
/// query at its neutral value.
pub struct QueryFeatures<'a> {
    params: &'a QueryParams,
    query: ListQuery,
}

impl<'a> QueryFeatures<'a> {
    pub fn new(params: &'a QueryParams) -> Self {
        Self {
            params,
            query: ListQuery::default(),
        }
    }

    pub fn filter(mut self) -> Self {
        for (key, value) in self.params.iter() {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            match value {
                ParamValue::Scalar(v) => self.query.filters.push(FieldFilter {
                    field: key.clone(),
                    condition: Condition::Eq(v.clone()),
                }),
                ParamValue::Nested(ops) => {
                    for (op, v) in ops {
                        self.query.filters.push(FieldFilter {
                            field: key.clone(),
                            condition: Condition::Cmp(Comparison::parse(op), v.clone()),
                        });
                    }
                }
            }
        }
        self
    }

    pub fn sort(mut self) -> Self {
        let raw = self.params.scalar("sort").unwrap_or(DEFAULT_SORT);
        self.query.sort = raw.split(',').filter_map(SortKey::parse).collect();
        self
    }

    pub fn limit_fields(mut self) -> Self {
        self.query.projection = match self.params.scalar("fields") {
            Some(raw) => Projection::Include(
                raw.split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(String::from)
                    .collect(),
            ),
            None => Projection::Exclude(vec![VERSION_FIELD.to_string()]),
        };
        self
    }

    pub fn paginate(mut self) -> Self {
        let page = positive(self.params.scalar("page")).unwrap_or(DEFAULT_PAGE);
        let limit = positive(self.params.scalar("limit")).unwrap_or(DEFAULT_LIMIT);
        self.query.skip = (page - 1).saturating_mul(limit);
        self.query.limit = Some(limit);
        self
    }

    pub fn build(self) -> ListQuery {
        self.query
    }
}

fn positive(raw: Option<&str>) -> Option<u64> {
    raw?.trim().parse::<u64>().ok().filter(|n| *n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_filter_sort_projection_and_page() {
        let params = QueryParams::from_pairs([
            ("price[gte]", "100"),
            ("sort", "-price,name"),
            ("fields", "name,price"),
            ("page", "2"),
            ("limit", "5"),
        ]);
        let q = ListQuery::from_params(&params);

        assert_eq!(
            q.filters,
            vec![FieldFilter {
                field: "price".into(),
                condition: Condition::Cmp(Comparison::Gte, "100".into()),
            }]
        );
        assert_eq!(
            q.sort,
            vec![
                SortKey { field: "price".into(), direction: Direction::Desc },
                SortKey { field: "name".into(), direction: Direction::Asc },
            ]
        );
        assert_eq!(
            q.projection,
            Projection::Include(vec!["name".into(), "price".into()])
        );
        assert_eq!(q.skip, 5);
        assert_eq!(q.limit, Some(5));
    }

    #[test]
    fn defaults_when_params_absent() {
        let q = ListQuery::from_params(&QueryParams::default());
        assert!(q.filters.is_empty());
        assert_eq!(
            q.sort,
            vec![SortKey { field: "createdAt".into(), direction: Direction::Desc }]
        );
        assert_eq!(q.projection, Projection::Exclude(vec![VERSION_FIELD.into()]));
        assert_eq!(q.skip, 0);
        assert_eq!(q.limit, Some(DEFAULT_LIMIT));
    }

    #[test]
    fn scalars_are_equality_and_unknown_ops_pass_through() {
        let params = QueryParams::from_pairs([("role", "manager"), ("age[ne]", "3")]);
        let q = QueryFeatures::new(&params).filter().build();
        assert_eq!(
            q.filters,
            vec![
                FieldFilter {
                    field: "age".into(),
                    condition: Condition::Cmp(Comparison::Other("ne".into()), "3".into()),
                },
                FieldFilter {
                    field: "role".into(),
                    condition: Condition::Eq("manager".into()),
                },
            ]
        );
    }

    #[test]
    fn reserved_keys_never_become_filters() {
        let params = QueryParams::from_pairs([
            ("page", "1"),
            ("sort", "name"),
            ("limit", "3"),
            ("fields", "name"),
        ]);
        let q = QueryFeatures::new(&params).filter().build();
        assert!(q.filters.is_empty());
    }

    #[test]
    fn bad_pagination_falls_back_to_defaults() {
        for (page, limit) in [("abc", "x"), ("0", "0"), ("-2", "-5"), ("1.5", "")] {
            let params = QueryParams::from_pairs([("page", page), ("limit", limit)]);
            let q = QueryFeatures::new(&params).paginate().build();
            assert_eq!(q.skip, 0, "page={page}");
            assert_eq!(q.limit, Some(DEFAULT_LIMIT), "limit={limit}");
        }
    }

    #[test]
    fn limit_is_not_capped() {
        let params = QueryParams::from_pairs([("limit", "100000")]);
        let q = QueryFeatures::new(&params).paginate().build();
        assert_eq!(q.limit, Some(100_000));
    }

    #[test]
    fn stages_are_independent() {
        let params = QueryParams::from_pairs([("sort", "name"), ("role", "admin")]);
        let q = QueryFeatures::new(&params).sort().build();
        assert!(q.filters.is_empty());
        assert_eq!(q.projection, Projection::All);
        assert_eq!(q.limit, None);
        assert_eq!(q.sort.len(), 1);
    }

    #[test]
    fn projection_include_and_exclude() {
        let record = json!({ "id": 1, "name": "Ada", "price": 3, "__v": 0 });

        let only = Projection::Include(vec!["name".into(), "price".into()]);
        assert_eq!(only.apply(record.clone()), json!({ "id": 1, "name": "Ada", "price": 3 }));

        let without_id = json!({ "name": "Ada", "price": 3 });
        assert_eq!(only.apply(without_id.clone()), without_id);

        let hidden = Projection::Exclude(vec![VERSION_FIELD.into()]);
        assert_eq!(hidden.apply(record.clone()), json!({ "id": 1, "name": "Ada", "price": 3 }));

        assert_eq!(Projection::All.apply(record.clone()), record);
    }
}
