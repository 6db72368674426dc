//! Property tests for the execution core: index reachability and unique
//! leaf integrity across random update sequences, ORDER BY stability,
//! dataset-order preservation, PK-collision handling, and the replica
//! read-after-write guard.

use proptest::prelude::*;
use sqlfake::db::index_refs::{compute_index_keys, ApplicableIndex};
use sqlfake::query::ast::{
    Assignment, InsertStatement, OrderByRule, SelectStatement, UpdateStatement,
};
use sqlfake::query::plan::apply_order_by;
use sqlfake::{Connection, DbError, QueryContext, Server};
use sqlfake_lib::expr::Expr;
use sqlfake_lib::row;
use sqlfake_lib::row::{Dataset, Row, RowKey};
use sqlfake_lib::schema::{ColumnDef, ColumnType, IndexDef, TableSchema};
use sqlfake_lib::value::Value;

fn table_schema() -> TableSchema {
    TableSchema::new(
        "t",
        [
            ColumnDef::new("id", ColumnType::Int),
            ColumnDef::new("name", ColumnType::String),
            ColumnDef::new("val", ColumnType::Int).nullable(),
            ColumnDef::new("note", ColumnType::String).nullable(),
        ],
        [
            IndexDef::primary(["id"]),
            IndexDef::index("i_name", ["name"]),
            IndexDef::unique("u_nv", ["name", "val"]),
        ],
    )
}

fn new_conn() -> (Connection, QueryContext) {
    let mut server = Server::new();
    server.create_database("testdb").create_table(table_schema());
    let conn = Connection::with_database(server.into_shared(), "testdb");
    (conn, QueryContext::for_testing())
}

/// Seeds the table, skipping rows that collide on `id` or `(name, val)`.
fn insert_seed(conn: &Connection, ctx: &mut QueryContext, seed: &[(i64, String, Option<i64>)]) {
    let rows: Vec<Row> = seed
        .iter()
        .map(|(id, name, val)| {
            let val = val.map(Value::Int).unwrap_or(Value::Null);
            row! { "id" => *id, "name" => name.as_str(), "val" => val }
        })
        .collect();
    InsertStatement::new("t", rows)
        .ignore()
        .execute(conn, ctx)
        .unwrap();
}

/// I1/I2/I4: every row is reachable through every applicable index, unique
/// leaves hold exactly the owning row, the dataset key equals the PK value,
/// and no index holds a stale row-id.
fn check_index_invariants(conn: &Connection) {
    let (data, schema) = conn.server().lock().snapshot("testdb", "t").unwrap();
    let schema = schema.unwrap();
    let applicable: Vec<ApplicableIndex> = schema
        .indexes
        .iter()
        .map(ApplicableIndex::from_def)
        .collect();

    for (row_id, row) in &data.rows {
        assert_eq!(RowKey::from(&row["id"]), *row_id, "dataset key != PK value");
        for entry in compute_index_keys(&applicable, row) {
            let reachable = data.index_refs.rows_at(&entry.index, &entry.path);
            assert!(
                reachable.contains(row_id),
                "row {row_id} unreachable through index {} at {:?}",
                entry.index,
                entry.path
            );
            if entry.store_as_unique {
                assert_eq!(
                    data.index_refs.unique_leaf(&entry.index, &entry.path),
                    Some(row_id),
                    "unique leaf of {} does not hold its row",
                    entry.index
                );
            }
        }
    }

    let names: Vec<String> = data.index_refs.index_names().map(str::to_owned).collect();
    for index in names {
        for id in data.index_refs.row_ids(&index) {
            assert!(
                data.rows.contains_key(&id),
                "index {index} holds stale row-id {id}"
            );
        }
    }
}

#[derive(Debug, Clone)]
enum Op {
    SetVal { target: i64, val: Option<i64> },
    SetName { target: i64, name: String },
    SetId { target: i64, new_id: i64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..8i64, proptest::option::of(0..3i64))
            .prop_map(|(target, val)| Op::SetVal { target, val }),
        (0..8i64, "[a-c]").prop_map(|(target, name)| Op::SetName { target, name }),
        (0..8i64, 0..12i64).prop_map(|(target, new_id)| Op::SetId { target, new_id }),
    ]
}

fn seed_rows() -> impl Strategy<Value = Vec<(i64, String, Option<i64>)>> {
    prop::collection::vec((0..8i64, "[a-c]", proptest::option::of(0..3i64)), 1..8)
}

fn apply_op(conn: &Connection, ctx: &mut QueryContext, op: &Op) {
    let statement = match op {
        Op::SetVal { target, val } => {
            let value = val.map(Value::Int).unwrap_or(Value::Null);
            UpdateStatement::new("t", vec![Assignment::new("val", Expr::lit(value))])
                .filter(Expr::col("id").eq(Expr::lit(*target)))
        }
        Op::SetName { target, name } => {
            UpdateStatement::new("t", vec![Assignment::new("name", Expr::lit(name.as_str()))])
                .filter(Expr::col("id").eq(Expr::lit(*target)))
        }
        Op::SetId { target, new_id } => {
            UpdateStatement::new("t", vec![Assignment::new("id", Expr::lit(*new_id))])
                .filter(Expr::col("id").eq(Expr::lit(*target)))
        }
    };
    // IGNORE keeps random sequences running: conflicting rows are skipped.
    statement.ignore().execute(conn, ctx).unwrap();
}

proptest! {
    /// P1/P2: after every statement of a random update sequence, all
    /// secondary indexes stay consistent with the dataset.
    #[test]
    fn indexes_stay_consistent_under_updates(
        seed in seed_rows(),
        ops in prop::collection::vec(op_strategy(), 0..12),
    ) {
        let (conn, mut ctx) = new_conn();
        insert_seed(&conn, &mut ctx, &seed);
        check_index_invariants(&conn);

        for op in &ops {
            apply_op(&conn, &mut ctx, op);
            check_index_invariants(&conn);
        }
    }

    /// P4: assigning every column its current value changes nothing.
    #[test]
    fn self_assignment_changes_nothing(seed in seed_rows()) {
        let (conn, mut ctx) = new_conn();
        insert_seed(&conn, &mut ctx, &seed);
        let (before, _) = conn.server().lock().snapshot("testdb", "t").unwrap();

        let assignments = ["id", "name", "val", "note"]
            .into_iter()
            .map(|col| Assignment::new(col, Expr::col(col)))
            .collect();
        let count = UpdateStatement::new("t", assignments)
            .execute(&conn, &mut ctx)
            .unwrap();

        let (after, _) = conn.server().lock().snapshot("testdb", "t").unwrap();
        prop_assert_eq!(count, 0);
        prop_assert_eq!(before.rows, after.rows);
        prop_assert_eq!(before.index_refs, after.index_refs);
    }

    /// P3/I5: ORDER BY is idempotent, and equal keys keep their pre-sort
    /// relative order. Each case draws one value flavor: mixing ints with
    /// numeric-looking strings in a single column has no total order under
    /// MySQL's pairwise comparison rule.
    #[test]
    fn order_by_is_idempotent_and_stable(
        values in prop_oneof![
            prop::collection::vec(
                prop_oneof![(-50..50i64).prop_map(Value::Int), Just(Value::Null)],
                0..12,
            ),
            prop::collection::vec(
                prop_oneof!["[0-9]{1,3}".prop_map(Value::Str), Just(Value::Null)],
                0..12,
            ),
        ]
    ) {
        let dataset: Dataset = values
            .iter()
            .enumerate()
            .map(|(i, v)| (RowKey::Int(i as i64), row! { "id" => i as i64, "x" => v.clone() }))
            .collect();
        let rules = [OrderByRule::asc(Expr::col("x"))];

        let once = apply_order_by(dataset, &rules).unwrap();
        let twice = apply_order_by(once.clone(), &rules).unwrap();
        let once_keys: Vec<RowKey> = once.keys().cloned().collect();
        let twice_keys: Vec<RowKey> = twice.keys().cloned().collect();
        prop_assert_eq!(&once_keys, &twice_keys);

        // Ties keep ascending original ordinals (the row-id here).
        for window in once.values().collect::<Vec<_>>().windows(2) {
            let (a, b) = (window[0], window[1]);
            if a["x"].compare(&b["x"]) == std::cmp::Ordering::Equal {
                prop_assert!(RowKey::from(&a["id"]) < RowKey::from(&b["id"]));
            }
        }
    }

    /// P5: updating a non-indexed column never reorders the dataset.
    #[test]
    fn non_indexed_updates_preserve_order(
        seed in seed_rows(),
        notes in prop::collection::vec((0..8i64, "[x-z]"), 0..6),
    ) {
        let (conn, mut ctx) = new_conn();
        insert_seed(&conn, &mut ctx, &seed);
        let (before, _) = conn.server().lock().snapshot("testdb", "t").unwrap();
        let before_keys: Vec<RowKey> = before.rows.keys().cloned().collect();

        for (target, note) in &notes {
            UpdateStatement::new("t", vec![Assignment::new("note", Expr::lit(note.as_str()))])
                .filter(Expr::col("id").eq(Expr::lit(*target)))
                .execute(&conn, &mut ctx)
                .unwrap();
        }

        let (after, _) = conn.server().lock().snapshot("testdb", "t").unwrap();
        let after_keys: Vec<RowKey> = after.rows.keys().cloned().collect();
        prop_assert_eq!(before_keys, after_keys);
    }

    /// P6: reassigning the PK onto an already-present key raises the
    /// violation or, under IGNORE, skips the row as an uncounted no-op —
    /// and neither path publishes anything.
    #[test]
    fn pk_reassignment_onto_existing_key_violates_or_skips(
        seed in seed_rows(),
        source in 0..8i64,
        target in 0..8i64,
    ) {
        let (conn, mut ctx) = new_conn();
        insert_seed(&conn, &mut ctx, &seed);
        let (before, _) = conn.server().lock().snapshot("testdb", "t").unwrap();
        let before_keys: Vec<RowKey> = before.rows.keys().cloned().collect();

        let stmt = UpdateStatement::new("t", vec![Assignment::new("id", Expr::lit(target))])
            .filter(Expr::col("id").eq(Expr::lit(source)));

        let collides = source != target
            && before.rows.contains_key(&RowKey::Int(source))
            && before.rows.contains_key(&RowKey::Int(target));
        if collides {
            let err = stmt.execute(&conn, &mut ctx).unwrap_err();
            prop_assert!(matches!(err, DbError::Index(_)));

            let count = stmt.ignore().execute(&conn, &mut ctx).unwrap();
            prop_assert_eq!(count, 0);

            let (after, _) = conn.server().lock().snapshot("testdb", "t").unwrap();
            let after_keys: Vec<RowKey> = after.rows.keys().cloned().collect();
            prop_assert_eq!(before_keys, after_keys);
            prop_assert_eq!(&before.index_refs, &after.index_refs);
        } else {
            stmt.ignore().execute(&conn, &mut ctx).unwrap();
        }
        check_index_invariants(&conn);
    }

    /// P7: with the replica guard armed, a WHERE result containing any
    /// dirty primary key fails with ReadAfterWrite naming the query.
    #[test]
    fn replica_reads_of_dirty_rows_fail(
        seed in seed_rows(),
        dirty in prop::collection::hash_set(0..8i64, 0..5),
        targets in prop::collection::hash_set(0..8i64, 1..4),
    ) {
        let (conn, mut ctx) = new_conn();
        insert_seed(&conn, &mut ctx, &seed);
        // The inserts dirtied their own keys; start the replica read from a
        // chosen dirty set instead.
        ctx.reset();
        ctx.use_replica = true;
        ctx.prevent_replica_reads_after_writes = true;
        for id in &dirty {
            ctx.record_dirty(RowKey::Int(*id));
        }

        let (data, _) = conn.server().lock().snapshot("testdb", "t").unwrap();
        let stmt = SelectStatement::new("t").filter(
            Expr::col("id").in_list(targets.iter().map(|t| Expr::lit(*t)).collect()),
        );
        let should_fail = targets
            .iter()
            .any(|t| dirty.contains(t) && data.rows.contains_key(&RowKey::Int(*t)));

        let result = stmt.execute(&conn, &mut ctx);
        if should_fail {
            let err = result.unwrap_err();
            prop_assert!(matches!(&err, DbError::Replica(_)));
            prop_assert!(err.to_string().contains(&stmt.to_string()));
        } else {
            let out = result.unwrap();
            prop_assert!(out.keys().all(|k| !ctx.dirty_row_ids.contains(k)));
        }
    }
}
