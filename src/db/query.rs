//! Translation of list query strings into MongoDB aggregation pipelines.
//!
//! A request such as
//! `?averageCost[lte]=10000&careers[in]=Business,UI/UX&select=name&sort=-name&page=2&limit=5`
//! is parsed against the entity's [`QuerySchema`]. Only declared fields may be
//! filtered, selected or sorted, and each field only accepts the operators it
//! whitelists. Values are typed by the field's [`FieldKind`] before they reach
//! the database.

use std::collections::BTreeMap;

use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::Collection;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 25;

const RESERVED_KEYS: &[&str] = &["select", "sort", "page", "limit"];

/// Comparison operators a client may use in `field[op]=value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Operator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
}

impl Operator {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "gt" => Some(Operator::Gt),
            "gte" => Some(Operator::Gte),
            "lt" => Some(Operator::Lt),
            "lte" => Some(Operator::Lte),
            "in" => Some(Operator::In),
            _ => None,
        }
    }

    fn mongo(&self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::In => "$in",
        }
    }
}

/// Operator sets shared by most schemas.
pub const EQUALITY: &[Operator] = &[Operator::Eq, Operator::In];
pub const COMPARISON: &[Operator] = &[
    Operator::Eq,
    Operator::Gt,
    Operator::Gte,
    Operator::Lt,
    Operator::Lte,
    Operator::In,
];
pub const RANGE: &[Operator] = &[Operator::Gt, Operator::Gte, Operator::Lt, Operator::Lte];
pub const EXACT: &[Operator] = &[Operator::Eq];

/// How a raw query-string value is typed before it is sent to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    ObjectId,
    /// RFC 3339 timestamp.
    Date,
}

impl FieldKind {
    fn parse(&self, field: &str, raw: &str) -> Result<Bson, AppError> {
        let invalid = || AppError::BadRequest(format!("Invalid value '{raw}' for field '{field}'"));

        match self {
            FieldKind::String => Ok(Bson::String(raw.to_string())),
            FieldKind::Number => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(Bson::Double)
                .ok_or_else(invalid),
            FieldKind::Boolean => match raw.trim() {
                "true" => Ok(Bson::Boolean(true)),
                "false" => Ok(Bson::Boolean(false)),
                _ => Err(invalid()),
            },
            FieldKind::ObjectId => ObjectId::parse_str(raw.trim())
                .map(Bson::ObjectId)
                .map_err(|_| invalid()),
            FieldKind::Date => chrono::DateTime::parse_from_rfc3339(raw.trim())
                .map(|dt| Bson::DateTime(bson::DateTime::from_chrono(dt.with_timezone(&chrono::Utc))))
                .map_err(|_| invalid()),
        }
    }
}

/// A filterable field and the operators it accepts.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub operators: &'static [Operator],
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind, operators: &'static [Operator]) -> Self {
        Self {
            name,
            kind,
            operators,
        }
    }
}

/// Declares what a list endpoint lets clients query.
#[derive(Debug, Clone, Copy)]
pub struct QuerySchema {
    /// Fields usable as filters.
    pub filters: &'static [FieldSpec],
    /// Fields usable in `select` and `sort`.
    pub fields: &'static [&'static str],
    /// Fields never returned by list queries.
    pub hidden: &'static [&'static str],
}

impl QuerySchema {
    fn filter(&self, name: &str) -> Option<&FieldSpec> {
        self.filters.iter().find(|f| f.name == name)
    }

    fn is_known_field(&self, name: &str) -> bool {
        name == "_id" || self.fields.contains(&name) || self.filter(name).is_some()
    }
}

/// Whether `pagination.next` is decided against the whole collection or only
/// the records matching the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountBasis {
    #[default]
    Collection,
    Filtered,
}

/// Inline records of another collection into each result.
#[derive(Debug, Clone, Copy)]
pub struct Join {
    pub from: &'static str,
    pub local_field: &'static str,
    pub foreign_field: &'static str,
    pub as_field: &'static str,
    /// Projected fields of the joined record; empty means all of them.
    pub fields: &'static [&'static str],
    /// `true` inlines a single record instead of an array.
    pub single: bool,
}

impl Join {
    fn stages(&self) -> Vec<Document> {
        let mut lookup = doc! {
            "from": self.from,
            "localField": self.local_field,
            "foreignField": self.foreign_field,
            "as": self.as_field,
        };
        if !self.fields.is_empty() {
            let projection: Document = self.fields.iter().map(|f| (f.to_string(), Bson::Int32(1))).collect();
            lookup.insert("pipeline", vec![doc! { "$project": projection }]);
        }

        let mut stages = vec![doc! { "$lookup": lookup }];
        if self.single {
            stages.push(doc! {
                "$unwind": {
                    "path": format!("${}", self.as_field),
                    "preserveNullAndEmptyArrays": true,
                }
            });
        }
        stages
    }
}

/// A single typed filter condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: &'static str,
    pub operator: Operator,
    pub value: Bson,
}

/// Conjunction of conditions, grouped per field when rendered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterExpr {
    conditions: Vec<Condition>,
}

impl FilterExpr {
    pub fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn to_document(&self) -> Document {
        let mut grouped: BTreeMap<&'static str, Vec<&Condition>> = BTreeMap::new();
        for condition in &self.conditions {
            grouped.entry(condition.field).or_default().push(condition);
        }

        let mut filter = Document::new();
        for (field, conditions) in grouped {
            if let [single] = conditions.as_slice() {
                if single.operator == Operator::Eq {
                    filter.insert(field, single.value.clone());
                    continue;
                }
            }

            let mut equal: Vec<Bson> = Vec::new();
            let mut members: Vec<Bson> = Vec::new();
            let mut operators = Document::new();
            for condition in conditions {
                match condition.operator {
                    Operator::Eq => equal.push(condition.value.clone()),
                    Operator::In => match &condition.value {
                        Bson::Array(values) => members.extend(values.iter().cloned()),
                        value => members.push(value.clone()),
                    },
                    op => {
                        operators.insert(op.mongo(), condition.value.clone());
                    }
                }
            }

            // Repeated equality on one field means "any of these".
            match equal.len() {
                0 => {}
                1 if members.is_empty() => {
                    operators.insert(Operator::Eq.mongo(), equal.remove(0));
                }
                _ => members.extend(equal),
            }
            if !members.is_empty() {
                operators.insert(Operator::In.mongo(), members);
            }

            filter.insert(field, operators);
        }
        filter
    }
}

/// `{ page, limit }` of an adjacent page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRef {
    pub page: u64,
    pub limit: u64,
}

/// Links to neighbouring pages; absent links are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<PageRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<PageRef>,
}

/// One page of list results.
#[derive(Debug, Clone)]
pub struct ListPage {
    pub pagination: Pagination,
    pub data: Vec<Document>,
}

impl ListPage {
    pub fn count(&self) -> usize {
        self.data.len()
    }
}

/// A fully parsed list request.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub filter: FilterExpr,
    pub select: Option<Vec<String>>,
    pub sort: Vec<(String, i32)>,
    pub page: u64,
    pub limit: u64,
}

impl ListQuery {
    /// Parse a raw (still percent-encoded) query string against `schema`.
    pub fn parse(raw: Option<&str>, schema: &QuerySchema) -> Result<Self, AppError> {
        let pairs: Vec<(String, String)> = raw
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();

        let reserved = |key: &str| -> Option<&str> {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        let select = reserved("select")
            .map(|value| parse_field_list(value, schema, "select"))
            .transpose()?
            .filter(|fields| !fields.is_empty());

        let sort = match reserved("sort") {
            Some(value) => parse_sort(value, schema)?,
            None => Vec::new(),
        };

        let page = parse_positive(reserved("page"), DEFAULT_PAGE);
        let limit = parse_positive(reserved("limit"), DEFAULT_LIMIT);

        let mut filter = FilterExpr::default();
        for (key, value) in &pairs {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            filter.push(parse_condition(key, value, schema)?);
        }

        Ok(Self {
            filter,
            select,
            sort,
            page,
            limit,
        })
    }

    /// Index of the first record on this page.
    pub fn start_index(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    /// Neighbour links given the total used for the `next` decision.
    pub fn pagination(&self, total: u64) -> Pagination {
        let start = self.start_index();
        Pagination {
            next: (start.saturating_add(self.limit) < total).then(|| PageRef {
                page: self.page.saturating_add(1),
                limit: self.limit,
            }),
            prev: (start > 0).then(|| PageRef {
                page: self.page.saturating_sub(1),
                limit: self.limit,
            }),
        }
    }

    fn sort_document(&self) -> Document {
        let mut sort = Document::new();
        if self.sort.is_empty() {
            sort.insert("createdAt", -1);
            sort.insert("_id", -1);
            return sort;
        }
        for (field, direction) in &self.sort {
            sort.insert(field.clone(), *direction);
        }
        if !sort.contains_key("_id") {
            // Stable order across pages when sort keys tie.
            sort.insert("_id", 1);
        }
        sort
    }

    fn projection(&self, schema: &QuerySchema, join: Option<&Join>) -> Option<Document> {
        match &self.select {
            Some(fields) => {
                let mut projection: Document =
                    fields.iter().map(|f| (f.clone(), Bson::Int32(1))).collect();
                if let Some(join) = join {
                    projection.insert(join.local_field, 1);
                }
                Some(projection)
            }
            None if !schema.hidden.is_empty() => Some(
                schema
                    .hidden
                    .iter()
                    .map(|f| (f.to_string(), Bson::Int32(0)))
                    .collect(),
            ),
            None => None,
        }
    }

    /// Aggregation pipeline producing this page.
    pub fn pipeline(&self, schema: &QuerySchema, join: Option<&Join>) -> Vec<Document> {
        let mut pipeline = vec![
            doc! { "$match": self.filter.to_document() },
            doc! { "$sort": self.sort_document() },
            doc! { "$skip": to_i64(self.start_index()) },
            doc! { "$limit": to_i64(self.limit) },
        ];
        if let Some(projection) = self.projection(schema, join) {
            pipeline.push(doc! { "$project": projection });
        }
        if let Some(join) = join {
            pipeline.extend(join.stages());
        }
        pipeline
    }
}

/// Run `query` against `collection`.
pub async fn execute<T: Send + Sync>(
    collection: &Collection<T>,
    schema: &QuerySchema,
    query: &ListQuery,
    join: Option<&Join>,
    basis: CountBasis,
) -> Result<ListPage, AppError> {
    let total = match basis {
        CountBasis::Collection => collection.count_documents(doc! {}).await?,
        CountBasis::Filtered => collection.count_documents(query.filter.to_document()).await?,
    };

    let data: Vec<Document> = collection
        .aggregate(query.pipeline(schema, join))
        .await?
        .try_collect()
        .await?;

    Ok(ListPage {
        pagination: query.pagination(total),
        data,
    })
}

/// Fetch one record by id with `join` applied.
pub async fn find_one_joined<T: Send + Sync>(
    collection: &Collection<T>,
    id: &ObjectId,
    join: &Join,
) -> Result<Option<Document>, AppError> {
    let mut pipeline = vec![doc! { "$match": { "_id": id } }];
    pipeline.extend(join.stages());

    let mut cursor = collection.aggregate(pipeline).await?;
    Ok(cursor.try_next().await?)
}

fn parse_condition(key: &str, value: &str, schema: &QuerySchema) -> Result<Condition, AppError> {
    let (name, operator) = match key.split_once('[') {
        Some((name, rest)) => {
            let token = rest.strip_suffix(']').ok_or_else(|| {
                AppError::BadRequest(format!("Malformed filter '{key}'"))
            })?;
            let operator = Operator::parse(token).ok_or_else(|| {
                AppError::BadRequest(format!("Unknown operator '{token}' in filter '{key}'"))
            })?;
            (name, operator)
        }
        None => (key, Operator::Eq),
    };

    let spec = schema
        .filter(name)
        .ok_or_else(|| AppError::BadRequest(format!("Cannot filter on field '{name}'")))?;

    if !spec.operators.contains(&operator) {
        return Err(AppError::BadRequest(format!(
            "Operator '{}' is not allowed on field '{}'",
            operator.mongo().trim_start_matches('$'),
            spec.name
        )));
    }

    let value = match operator {
        Operator::In => Bson::Array(
            value
                .split(',')
                .filter(|v| !v.is_empty())
                .map(|v| spec.kind.parse(spec.name, v))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        _ => spec.kind.parse(spec.name, value)?,
    };

    Ok(Condition {
        field: spec.name,
        operator,
        value,
    })
}

fn parse_field_list(value: &str, schema: &QuerySchema, param: &str) -> Result<Vec<String>, AppError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(|field| {
            if schema.is_known_field(field) && !schema.hidden.contains(&field) {
                Ok(field.to_string())
            } else {
                Err(AppError::BadRequest(format!("Unknown field '{field}' in {param}")))
            }
        })
        .collect()
}

fn parse_sort(value: &str, schema: &QuerySchema) -> Result<Vec<(String, i32)>, AppError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(|token| {
            let (field, direction) = match token.strip_prefix('-') {
                Some(field) => (field, -1),
                None => (token.strip_prefix('+').unwrap_or(token), 1),
            };
            if schema.is_known_field(field) && !schema.hidden.contains(&field) {
                Ok((field.to_string(), direction))
            } else {
                Err(AppError::BadRequest(format!("Unknown field '{field}' in sort")))
            }
        })
        .collect()
}

/// Leading-digit integer parse; non-positive or missing values fall back.
fn parse_positive(raw: Option<&str>, default: u64) -> u64 {
    raw.map(str::trim_start)
        .map(|s| s.strip_prefix('+').unwrap_or(s))
        .and_then(|s| {
            let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u64>().ok()
        })
        .filter(|n| *n > 0)
        .unwrap_or(default)
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
