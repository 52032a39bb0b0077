//! Compiles an endpoint definition plus resolved params into dialect-specific
//! parameterized SQL. Identifiers come from config only; values always bind
//! through placeholders.

use crate::config::{Dialect, EndpointDef, Logic};
use crate::error::EngineError;
use crate::params::plain_text;
use serde_json::Value;
use std::collections::HashMap;

const DEFAULT_PAGE_SIZE: i64 = 10;

/// A compiled statement: every placeholder in `sql` corresponds positionally
/// to one entry in `args`.
#[derive(Clone, Debug)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<Value>,
}

/// Per-compilation placeholder state. Confined to one thread; the builder
/// itself is stateless and shareable.
struct BuildContext {
    dialect: Dialect,
    param_index: usize,
}

impl BuildContext {
    fn new(dialect: Dialect) -> Self {
        BuildContext {
            dialect,
            param_index: 0,
        }
    }

    fn placeholder(&mut self) -> String {
        let ph = self.dialect.placeholder(self.param_index);
        self.param_index += 1;
        ph
    }
}

pub struct SqlBuilder;

impl SqlBuilder {
    /// LIST: projection, optional WHERE, optional ORDER BY. `max_total` is
    /// a pagination concern and is ignored here.
    pub fn build_query(
        endpoint: &EndpointDef,
        params: &HashMap<String, Value>,
    ) -> Result<Statement, EngineError> {
        let mut ctx = BuildContext::new(endpoint.db_drive.drive);
        let mut args = Vec::new();
        let mut sql = format!("SELECT {} FROM {}", endpoint.field, endpoint.table_name);
        if let Some(where_clause) = where_clause(endpoint, params, &mut ctx, &mut args)? {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        if let Some(order) = order_clause(endpoint) {
            sql.push(' ');
            sql.push_str(&order);
        }
        Ok(Statement { sql, args })
    }

    /// Shallow page: a CTE carrying a windowed `TotalCount` column so one
    /// statement returns rows and total. Switches to the deep form past the
    /// endpoint's threshold.
    pub fn build_page(
        endpoint: &EndpointDef,
        params: &HashMap<String, Value>,
    ) -> Result<Statement, EngineError> {
        let (current_page, page_size, offset) = page_window(params);
        if endpoint.shallow_to_deep_threshold > 0
            && current_page > endpoint.shallow_to_deep_threshold as i64
        {
            return Self::build_deep_page(endpoint, params);
        }

        let mut ctx = BuildContext::new(endpoint.db_drive.drive);
        let mut args = Vec::new();

        // The total expression precedes the WHERE clause in the emitted SQL,
        // so its placeholders must be generated first.
        let total_expr = match non_null(params, "max_total") {
            Some(max_total) => {
                let compare = ctx.placeholder();
                args.push(max_total.clone());
                let capped = ctx.placeholder();
                args.push(max_total.clone());
                format!(
                    "CASE WHEN COUNT(*) OVER () > {} THEN {} ELSE COUNT(*) OVER () END AS TotalCount",
                    compare, capped
                )
            }
            None => "COUNT(*) OVER () AS TotalCount".to_string(),
        };

        let mut inner = format!(
            "SELECT {}, {} FROM {}",
            endpoint.field, total_expr, endpoint.table_name
        );
        if let Some(where_clause) = where_clause(endpoint, params, &mut ctx, &mut args)? {
            inner.push_str(" WHERE ");
            inner.push_str(&where_clause);
        }
        if let Some(order) = order_clause(endpoint) {
            inner.push(' ');
            inner.push_str(&order);
        }

        let sql = format!(
            "WITH all_rows AS ({}) SELECT * FROM all_rows {}",
            inner,
            endpoint
                .db_drive
                .drive
                .page_clause(offset as u64, page_size.max(0) as u64)
        );
        Ok(Statement { sql, args })
    }

    /// Deep page: ROW_NUMBER over the configured sort, bounded by literal
    /// row numbers, so the offset cost does not grow with the page number.
    pub fn build_deep_page(
        endpoint: &EndpointDef,
        params: &HashMap<String, Value>,
    ) -> Result<Statement, EngineError> {
        let order = order_clause(endpoint)
            .ok_or_else(|| EngineError::Build("Deep pagination requires 'sort'".into()))?;
        let (_, page_size, offset) = page_window(params);

        let mut ctx = BuildContext::new(endpoint.db_drive.drive);
        let mut args = Vec::new();
        let mut inner = format!(
            "SELECT {}, ROW_NUMBER() OVER ({}) AS rn, COUNT(*) OVER () AS TotalCount FROM {}",
            endpoint.field, order, endpoint.table_name
        );
        if let Some(where_clause) = where_clause(endpoint, params, &mut ctx, &mut args)? {
            inner.push_str(" WHERE ");
            inner.push_str(&where_clause);
        }

        let low = offset + 1;
        let high = offset + page_size.max(0);
        let sql = format!(
            "SELECT * FROM ({}) AS numbered_rows WHERE rn BETWEEN {} AND {}",
            inner, low, high
        );
        Ok(Statement { sql, args })
    }

    /// MODIFY: decide INSERT vs UPDATE, then compile. UPDATE without any
    /// filter is rejected outright.
    pub fn build_modify(
        endpoint: &EndpointDef,
        params: &HashMap<String, Value>,
    ) -> Result<Statement, EngineError> {
        let action = non_null(params, "action").map(plain_text);
        let has_pk = non_null(params, &endpoint.pk).is_some();
        let has_condition = endpoint
            .condition_schema
            .iter()
            .any(|(k, cs)| !cs.fields.is_empty() && non_null(params, k).is_some());

        // An explicit `update` action always takes the update path; the
        // filter requirement is enforced there, not by falling back to
        // INSERT.
        let is_update = match action.as_deref() {
            None => has_pk,
            Some("update") => true,
            Some(_) => false,
        };

        if is_update {
            Self::build_update(endpoint, params, has_condition)
        } else {
            Self::build_insert(endpoint, params)
        }
    }

    fn build_insert(
        endpoint: &EndpointDef,
        params: &HashMap<String, Value>,
    ) -> Result<Statement, EngineError> {
        let mut ctx = BuildContext::new(endpoint.db_drive.drive);
        let mut args = Vec::new();
        let mut columns = Vec::new();
        let mut placeholders = Vec::new();
        for field in &endpoint.mutable_fields {
            if let Some(value) = non_null(params, field) {
                columns.push(field.as_str());
                placeholders.push(ctx.placeholder());
                args.push(value.clone());
            }
        }
        if columns.is_empty() {
            return Err(EngineError::Build("empty insert is not allowed".into()));
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            endpoint.table_name,
            columns.join(", "),
            placeholders.join(", ")
        );
        Ok(Statement { sql, args })
    }

    fn build_update(
        endpoint: &EndpointDef,
        params: &HashMap<String, Value>,
        has_condition: bool,
    ) -> Result<Statement, EngineError> {
        let mut ctx = BuildContext::new(endpoint.db_drive.drive);
        let mut args = Vec::new();
        let mut sets = Vec::new();
        for field in &endpoint.mutable_fields {
            if field == &endpoint.pk {
                continue;
            }
            if let Some(value) = non_null(params, field) {
                let ph = ctx.placeholder();
                sets.push(format!("{} = {}", field, ph));
                args.push(value.clone());
            }
        }
        if sets.is_empty() {
            return Err(EngineError::Build("update requires at least one field".into()));
        }

        let where_sql = if has_condition {
            where_clause(endpoint, params, &mut ctx, &mut args)?.ok_or_else(|| {
                EngineError::Build("no filter; full-table update forbidden".into())
            })?
        } else if let Some(pk_value) = non_null(params, &endpoint.pk) {
            let ph = ctx.placeholder();
            args.push(pk_value.clone());
            format!("{} = {}", endpoint.pk, ph)
        } else {
            return Err(EngineError::Build(
                "no filter; full-table update forbidden".into(),
            ));
        };

        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            endpoint.table_name,
            sets.join(", "),
            where_sql
        );
        Ok(Statement { sql, args })
    }
}

/// Expand every condition whose parameter is present. Groups join with the
/// condition's own logic (parenthesized when it spans several columns), and
/// the groups join with AND.
fn where_clause(
    endpoint: &EndpointDef,
    params: &HashMap<String, Value>,
    ctx: &mut BuildContext,
    args: &mut Vec<Value>,
) -> Result<Option<String>, EngineError> {
    let mut groups = Vec::new();
    for (param_key, condition) in &endpoint.condition_schema {
        let Some(value) = non_null(params, param_key) else {
            continue;
        };
        let mut fragments = Vec::new();
        for field in &condition.fields {
            fragments.push(fragment(field, &condition.operator, value, ctx, args)?);
        }
        if fragments.is_empty() {
            continue;
        }
        let joined = fragments.join(&format!(" {} ", condition.logic.as_sql()));
        if fragments.len() > 1 || condition.logic == Logic::Or {
            groups.push(format!("({})", joined));
        } else {
            groups.push(joined);
        }
    }
    if groups.is_empty() {
        Ok(None)
    } else {
        Ok(Some(groups.join(" AND ")))
    }
}

fn fragment(
    field: &str,
    operator: &str,
    value: &Value,
    ctx: &mut BuildContext,
    args: &mut Vec<Value>,
) -> Result<String, EngineError> {
    let op = operator.trim().to_ascii_lowercase();
    match op.as_str() {
        "=" | ">" | "<" | ">=" | "<=" => {
            let ph = ctx.placeholder();
            args.push(value.clone());
            Ok(format!("{} {} {}", field, op, ph))
        }
        "!=" | "<>" => {
            let ph = ctx.placeholder();
            args.push(value.clone());
            Ok(format!("{} <> {}", field, ph))
        }
        "like" | "not like" => {
            let ph = ctx.placeholder();
            args.push(Value::String(format!("%{}%", plain_text(value))));
            let keyword = if op == "like" { "LIKE" } else { "NOT LIKE" };
            Ok(format!("{} {} {}", field, keyword, ph))
        }
        "in" | "not in" => {
            let items = list_items(value);
            if items.is_empty() {
                // Empty membership has a fixed truth value.
                return Ok(if op == "in" { "1=0".into() } else { "1=1".into() });
            }
            if ctx.dialect == Dialect::Mssql && items.len() > 1000 {
                tracing::warn!(
                    target: "datagate::sql",
                    field,
                    size = items.len(),
                    "IN list exceeds the MSSQL 1000-element guideline"
                );
            }
            let mut placeholders = Vec::with_capacity(items.len());
            for item in items {
                placeholders.push(ctx.placeholder());
                args.push(item);
            }
            let keyword = if op == "in" { "IN" } else { "NOT IN" };
            Ok(format!("{} {} ({})", field, keyword, placeholders.join(", ")))
        }
        "between" | "not between" => {
            let items = list_items(value);
            if items.len() != 2 {
                return Err(EngineError::Build(format!(
                    "'{}' on {} requires exactly two values",
                    op, field
                )));
            }
            let low = ctx.placeholder();
            args.push(items[0].clone());
            let high = ctx.placeholder();
            args.push(items[1].clone());
            let keyword = if op == "between" { "BETWEEN" } else { "NOT BETWEEN" };
            Ok(format!("{} {} {} AND {}", field, keyword, low, high))
        }
        "is null" => Ok(format!("{} IS NULL", field)),
        "is not null" => Ok(format!("{} IS NOT NULL", field)),
        other => Err(EngineError::Build(format!("unsupported operator: {}", other))),
    }
}

/// Coerce a condition value into a list: arrays as-is, strings comma-split
/// with numeric parts parsed, any other scalar as a one-element list.
fn list_items(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::String(s) => s
            .split(',')
            .map(|part| {
                let part = part.trim();
                if let Ok(n) = part.parse::<i64>() {
                    Value::from(n)
                } else if let Ok(f) = part.parse::<f64>() {
                    serde_json::Number::from_f64(f)
                        .map(Value::Number)
                        .unwrap_or_else(|| Value::String(part.to_string()))
                } else {
                    Value::String(part.to_string())
                }
            })
            .collect(),
        other => vec![other.clone()],
    }
}

fn order_clause(endpoint: &EndpointDef) -> Option<String> {
    if endpoint.sort.is_empty() {
        return None;
    }
    let parts: Vec<String> = endpoint
        .sort
        .iter()
        .map(|s| format!("{} {}", s.field, s.order.as_sql()))
        .collect();
    Some(format!("ORDER BY {}", parts.join(", ")))
}

/// (current_page, page_size, offset) with the defaults and the non-positive
/// page clamp.
fn page_window(params: &HashMap<String, Value>) -> (i64, i64, i64) {
    let current_page = int_param(params, "current_page").unwrap_or(1);
    let page_size = int_param(params, "page_size").unwrap_or(DEFAULT_PAGE_SIZE);
    let offset = ((current_page - 1) * page_size).max(0);
    (current_page, page_size, offset)
}

fn int_param(params: &HashMap<String, Value>, key: &str) -> Option<i64> {
    match params.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn non_null<'p>(params: &'p HashMap<String, Value>, key: &str) -> Option<&'p Value> {
    params.get(key).filter(|v| !v.is_null())
}
