use crate::db::connection::Connection;
use crate::db::query_context::QueryContext;
use crate::error::DbError;
use crate::query::ast::UpdateStatement;
use crate::query::plan::{
    apply_limit, apply_order_by, apply_set, apply_where, parse_table_name, snapshot,
    PlannerHints, SetParams,
};

impl UpdateStatement {
    /// Executes against `conn`, returning the number of rows changed.
    #[tracing::instrument(skip_all, fields(table = %self.table))]
    pub fn execute(&self, conn: &Connection, ctx: &mut QueryContext) -> Result<u64, DbError> {
        ctx.query = Some(self.to_string());
        let (database, table) = parse_table_name(conn, &self.table)?;
        let (data, schema) = snapshot(conn, &database, &table)?;

        let hints = schema.as_ref().map(PlannerHints::from_schema);
        let filtered = apply_where(
            ctx,
            self.where_clause.as_ref(),
            data.rows.clone(),
            &data.index_refs,
            hints,
        )?;
        let filtered = apply_order_by(filtered, &self.order_by)?;
        let filtered = apply_limit(filtered, self.limit.as_ref());

        let (count, _, _) = apply_set(
            ctx,
            SetParams {
                conn,
                database: &database,
                table: &table,
                filtered_rows: filtered,
                original_table: data.rows,
                index_refs: data.index_refs,
                assignments: &self.assignments,
                schema: schema.as_ref(),
                values: None,
                ignore_dupes: self.ignore,
            },
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::server::Server;
    use crate::error::DbError;
    use crate::query::ast::{Assignment, InsertStatement, SelectStatement};
    use pretty_assertions::assert_eq;
    use sqlfake_lib::expr::Expr;
    use sqlfake_lib::row;
    use sqlfake_lib::row::{Dataset, RowKey};
    use sqlfake_lib::schema::{ColumnDef, ColumnType, IndexDef, TableSchema};
    use sqlfake_lib::value::Value;

    fn setup() -> (Connection, QueryContext) {
        let schema = TableSchema::new(
            "users",
            [
                ColumnDef::new("id", ColumnType::Int),
                ColumnDef::new("name", ColumnType::String),
            ],
            [
                IndexDef::primary(["id"]),
                IndexDef::unique("u_name", ["name"]),
            ],
        );
        let mut server = Server::new();
        server.create_database("testdb").create_table(schema);
        let conn = Connection::with_database(server.into_shared(), "testdb");
        let mut ctx = QueryContext::for_testing();

        let mut table = Dataset::new();
        let mut refs = crate::db::index_refs::IndexRefs::new();
        for (id, name) in [(1i64, "a"), (2, "b")] {
            refs.add("u_name", &[RowKey::from(name)], true, RowKey::Int(id));
            table.insert(RowKey::Int(id), row! { "id" => id, "name" => name });
        }
        conn.server()
            .lock()
            .save_table("testdb", "users", table, refs)
            .unwrap();
        ctx.reset();
        (conn, ctx)
    }

    #[test]
    fn update_changes_rows_and_persists() {
        let (conn, mut ctx) = setup();
        let count = UpdateStatement::new("users", vec![Assignment::new("name", Expr::lit("z"))])
            .filter(Expr::col("id").eq(Expr::lit(2)))
            .execute(&conn, &mut ctx)
            .unwrap();
        assert_eq!(count, 1);

        let out = SelectStatement::new("users")
            .filter(Expr::col("name").eq(Expr::lit("z")))
            .execute(&conn, &mut ctx)
            .unwrap();
        assert_eq!(out.keys().cloned().collect::<Vec<_>>(), vec![RowKey::Int(2)]);
    }

    #[test]
    fn update_to_existing_unique_value_fails_unless_relaxed() {
        let (conn, mut ctx) = setup();
        let stmt = UpdateStatement::new("users", vec![Assignment::new("name", Expr::lit("a"))])
            .filter(Expr::col("id").eq(Expr::lit(2)));

        let err = stmt.execute(&conn, &mut ctx).unwrap_err();
        assert!(matches!(err, DbError::Index(_)));

        ctx.relax_unique_constraints = true;
        assert_eq!(stmt.execute(&conn, &mut ctx).unwrap(), 1);
    }

    #[test]
    fn update_cannot_move_a_row_onto_an_occupied_shard_key() {
        let schema = TableSchema::new(
            "orders",
            [
                ColumnDef::new("id", ColumnType::Int),
                ColumnDef::new("owner", ColumnType::Int),
            ],
            [IndexDef::primary(["id"])],
        )
        .with_sharding("ks_orders", "owner");
        let mut server = Server::new();
        server.create_database("testdb").create_table(schema);
        let conn = Connection::with_database(server.into_shared(), "testdb");
        let mut ctx = QueryContext::for_testing();

        InsertStatement::new(
            "orders",
            vec![
                row! { "id" => 1, "owner" => 10 },
                row! { "id" => 2, "owner" => 20 },
            ],
        )
        .execute(&conn, &mut ctx)
        .unwrap();

        let stmt = UpdateStatement::new("orders", vec![Assignment::new("owner", Expr::lit(20))])
            .filter(Expr::col("id").eq(Expr::lit(1)));
        let err = stmt.execute(&conn, &mut ctx).unwrap_err();
        assert!(matches!(err, DbError::Index(_)));

        let count = stmt.ignore().execute(&conn, &mut ctx).unwrap();
        assert_eq!(count, 0);

        // Both rows still reach their shard-key leaves.
        let (data, _) = conn.server().lock().snapshot("testdb", "orders").unwrap();
        assert_eq!(
            data.index_refs.rows_at("ks_orders", &[RowKey::Int(10)]),
            vec![RowKey::Int(1)]
        );
        assert_eq!(
            data.index_refs.rows_at("ks_orders", &[RowKey::Int(20)]),
            vec![RowKey::Int(2)]
        );
    }

    #[test]
    fn update_ignore_skips_conflicts() {
        let (conn, mut ctx) = setup();
        let count = UpdateStatement::new("users", vec![Assignment::new("name", Expr::lit("a"))])
            .ignore()
            .execute(&conn, &mut ctx)
            .unwrap();
        // Row 1 already holds "a" (no change), row 2 conflicts (skipped).
        assert_eq!(count, 0);
        let out = SelectStatement::new("users").execute(&conn, &mut ctx).unwrap();
        assert_eq!(out[&RowKey::Int(2)]["name"], Value::from("b"));
    }
}
