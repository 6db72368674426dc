//! Greedy index narrowing for WHERE clauses.
//!
//! The planner only understands AND-ed `column = literal` and
//! `column IN (literals)` conjuncts. It picks the index covering the
//! longest prefix of constrained columns, probes it, and reports
//! `all_matched` when the predicate was fully discharged so the caller can
//! skip the row-by-row filter.

use std::collections::HashSet;

use itertools::Itertools;
use sqlfake_lib::expr::{BinOp, Expr};
use sqlfake_lib::row::{Dataset, RowKey};
use sqlfake_lib::schema::IndexDef;
use sqlfake_lib::value::Value;

use crate::db::index_refs::IndexRefs;
use crate::error::DbError;
use crate::query::plan::PlannerHints;

/// A `column = literal` or `column IN (literals)` conjunct.
struct EqConstraint<'a> {
    column: &'a str,
    values: Vec<&'a Value>,
}

pub fn filter_with_indexes(
    dataset: Dataset,
    index_refs: &IndexRefs,
    hints: &PlannerHints<'_>,
    where_clause: &Expr,
) -> Result<(Dataset, bool), DbError> {
    let Some(constraints) = decompose(where_clause) else {
        return Ok((dataset, false));
    };
    // Only real columns qualify; anything else falls back to a scan.
    if constraints
        .iter()
        .any(|c| !hints.columns.iter().any(|col| col.name == c.column))
    {
        return Ok((dataset, false));
    }

    let mut best: Option<(&IndexDef, usize)> = None;
    for index in hints.indexes {
        let depth = index
            .fields
            .iter()
            .take_while(|f| constraints.iter().any(|c| c.column == f.as_str()))
            .count();
        if depth > 0 && best.map_or(true, |(_, d)| depth > d) {
            best = Some((index, depth));
        }
    }
    let Some((index, depth)) = best else {
        return Ok((dataset, false));
    };
    let all_matched = depth == index.fields.len() && constraints.len() == depth;

    let mut alternatives: Vec<Vec<RowKey>> = Vec::with_capacity(depth);
    for field in &index.fields[..depth] {
        match constraints.iter().find(|c| c.column == field.as_str()) {
            Some(c) => alternatives.push(c.values.iter().map(|v| RowKey::from(*v)).collect()),
            None => return Ok((dataset, false)),
        }
    }

    let mut wanted: HashSet<RowKey> = HashSet::new();
    for path in alternatives.into_iter().multi_cartesian_product() {
        if index.is_primary_single() {
            // The dataset key is the primary index.
            wanted.extend(path.into_iter().filter(|key| dataset.contains_key(key)));
        } else {
            wanted.extend(index_refs.rows_at(&index.name, &path));
        }
    }

    let reduced: Dataset = dataset
        .into_iter()
        .filter(|(row_id, _)| wanted.contains(row_id))
        .collect();
    tracing::debug!(
        index = %index.name,
        rows = reduced.len(),
        all_matched,
        "narrowed dataset through index"
    );
    Ok((reduced, all_matched))
}

// TODO: narrow `<`/`>` range predicates through the ordered branch maps.
fn decompose(expr: &Expr) -> Option<Vec<EqConstraint<'_>>> {
    let mut out = Vec::new();
    collect(expr, &mut out)?;
    // One constraint per column; duplicates stay conservative.
    let distinct: HashSet<&str> = out.iter().map(|c| c.column).collect();
    (distinct.len() == out.len()).then_some(out)
}

fn collect<'a>(expr: &'a Expr, out: &mut Vec<EqConstraint<'a>>) -> Option<()> {
    match expr {
        Expr::BinaryOp {
            op: BinOp::And,
            lhs,
            rhs,
        } => {
            collect(lhs, out)?;
            collect(rhs, out)
        }
        Expr::BinaryOp {
            op: BinOp::Eq,
            lhs,
            rhs,
        } => {
            let (column, value) = match (lhs.as_ref(), rhs.as_ref()) {
                (Expr::Column(c), Expr::Literal(v)) | (Expr::Literal(v), Expr::Column(c))
                    if !v.is_null() =>
                {
                    (c.column.as_str(), v)
                }
                _ => return None,
            };
            out.push(EqConstraint {
                column,
                values: vec![value],
            });
            Some(())
        }
        Expr::InList {
            expr,
            list,
            negated: false,
        } => {
            let Expr::Column(c) = expr.as_ref() else {
                return None;
            };
            let mut values = Vec::with_capacity(list.len());
            for item in list {
                match item {
                    Expr::Literal(v) if !v.is_null() => values.push(v),
                    _ => return None,
                }
            }
            out.push(EqConstraint {
                column: c.column.as_str(),
                values,
            });
            Some(())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sqlfake_lib::row;
    use sqlfake_lib::row::Row;
    use sqlfake_lib::schema::{ColumnDef, ColumnType};

    fn fixture() -> (Dataset, IndexRefs, Vec<ColumnDef>, Vec<IndexDef>) {
        let mut dataset = Dataset::new();
        let mut refs = IndexRefs::new();
        for (id, name) in [(1, "a"), (2, "b"), (3, "a")] {
            let row: Row = row! { "id" => id, "name" => name };
            refs.add(
                "i_name",
                &[RowKey::from(name)],
                false,
                RowKey::Int(id.into()),
            );
            dataset.insert(RowKey::Int(id.into()), row);
        }
        let columns = vec![
            ColumnDef::new("id", ColumnType::Int),
            ColumnDef::new("name", ColumnType::String),
        ];
        let indexes = vec![IndexDef::primary(["id"]), IndexDef::index("i_name", ["name"])];
        (dataset, refs, columns, indexes)
    }

    fn keys(dataset: &Dataset) -> Vec<RowKey> {
        dataset.keys().cloned().collect()
    }

    #[test]
    fn primary_key_equality_fully_matches() {
        let (dataset, refs, columns, indexes) = fixture();
        let hints = PlannerHints {
            columns: &columns,
            indexes: &indexes,
        };
        let clause = Expr::col("id").eq(Expr::lit(2));
        let (out, all_matched) = filter_with_indexes(dataset, &refs, &hints, &clause).unwrap();
        assert!(all_matched);
        assert_eq!(keys(&out), vec![RowKey::Int(2)]);
    }

    #[test]
    fn in_list_probes_every_alternative() {
        let (dataset, refs, columns, indexes) = fixture();
        let hints = PlannerHints {
            columns: &columns,
            indexes: &indexes,
        };
        let clause = Expr::col("id").in_list(vec![Expr::lit(1), Expr::lit(3), Expr::lit(9)]);
        let (out, all_matched) = filter_with_indexes(dataset, &refs, &hints, &clause).unwrap();
        assert!(all_matched);
        assert_eq!(keys(&out), vec![RowKey::Int(1), RowKey::Int(3)]);
    }

    #[test]
    fn secondary_index_narrows() {
        let (dataset, refs, columns, indexes) = fixture();
        let hints = PlannerHints {
            columns: &columns,
            indexes: &indexes,
        };
        let clause = Expr::col("name").eq(Expr::lit("a"));
        let (out, all_matched) = filter_with_indexes(dataset, &refs, &hints, &clause).unwrap();
        assert!(all_matched);
        assert_eq!(keys(&out), vec![RowKey::Int(1), RowKey::Int(3)]);
    }

    #[test]
    fn residual_conjuncts_defeat_full_match() {
        let (dataset, refs, columns, indexes) = fixture();
        let hints = PlannerHints {
            columns: &columns,
            indexes: &indexes,
        };
        // `id` is indexable, the comparison on `name` is not an equality.
        let clause = Expr::col("id")
            .eq(Expr::lit(1))
            .and(Expr::col("name").gt(Expr::lit("a")));
        let (out, all_matched) = filter_with_indexes(dataset, &refs, &hints, &clause).unwrap();
        // Non-decomposable clause: nothing narrowed, nothing promised.
        assert!(!all_matched);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn or_clauses_fall_back_to_scan() {
        let (dataset, refs, columns, indexes) = fixture();
        let hints = PlannerHints {
            columns: &columns,
            indexes: &indexes,
        };
        let clause = Expr::col("id")
            .eq(Expr::lit(1))
            .or(Expr::col("id").eq(Expr::lit(2)));
        let (out, all_matched) = filter_with_indexes(dataset, &refs, &hints, &clause).unwrap();
        assert!(!all_matched);
        assert_eq!(out.len(), 3);
    }
}
