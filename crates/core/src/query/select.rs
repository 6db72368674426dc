use sqlfake_lib::row::Dataset;

use crate::db::connection::Connection;
use crate::db::query_context::QueryContext;
use crate::error::DbError;
use crate::query::ast::SelectStatement;
use crate::query::plan::{
    apply_limit, apply_order_by, apply_where, parse_table_name, snapshot, PlannerHints,
};

impl SelectStatement {
    /// Executes against `conn`, returning matching rows keyed by row-id in
    /// result order.
    #[tracing::instrument(skip_all, fields(table = %self.table))]
    pub fn execute(&self, conn: &Connection, ctx: &mut QueryContext) -> Result<Dataset, DbError> {
        ctx.query = Some(self.to_string());
        let (database, table) = parse_table_name(conn, &self.table)?;
        let (data, schema) = snapshot(conn, &database, &table)?;

        let hints = schema.as_ref().map(PlannerHints::from_schema);
        let filtered = apply_where(
            ctx,
            self.where_clause.as_ref(),
            data.rows,
            &data.index_refs,
            hints,
        )?;
        let ordered = apply_order_by(filtered, &self.order_by)?;
        Ok(apply_limit(ordered, self.limit.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::server::Server;
    use crate::query::ast::{Limit, OrderByRule};
    use pretty_assertions::assert_eq;
    use sqlfake_lib::error::ResultTest;
    use sqlfake_lib::expr::Expr;
    use sqlfake_lib::row;
    use sqlfake_lib::row::RowKey;
    use sqlfake_lib::schema::{ColumnDef, ColumnType, IndexDef, TableSchema};

    fn setup() -> (Connection, QueryContext) {
        let schema = TableSchema::new(
            "inventory",
            [
                ColumnDef::new("id", ColumnType::Int),
                ColumnDef::new("name", ColumnType::String),
            ],
            [IndexDef::primary(["id"])],
        );
        let mut server = Server::new();
        server.create_database("testdb").create_table(schema);
        let conn = Connection::with_database(server.into_shared(), "testdb");
        let mut ctx = QueryContext::for_testing();

        let mut table = sqlfake_lib::Dataset::new();
        for (id, name) in [(1, "health"), (2, "mana"), (3, "armor")] {
            table.insert(RowKey::Int(id), row! { "id" => id, "name" => name });
        }
        conn.server()
            .lock()
            .save_table("testdb", "inventory", table, Default::default())
            .unwrap();
        ctx.reset();
        (conn, ctx)
    }

    #[test]
    fn select_star() -> ResultTest<()> {
        let (conn, mut ctx) = setup();
        let out = SelectStatement::new("inventory").execute(&conn, &mut ctx)?;
        assert_eq!(out.len(), 3);
        Ok(())
    }

    #[test]
    fn select_filters_orders_and_limits() -> ResultTest<()> {
        let (conn, mut ctx) = setup();
        let out = SelectStatement::new("inventory")
            .filter(Expr::col("id").gt(Expr::lit(1)))
            .order_by(OrderByRule::desc(Expr::col("id")))
            .limit(Limit::new(1))
            .execute(&conn, &mut ctx)?;
        let keys: Vec<_> = out.keys().cloned().collect();
        assert_eq!(keys, vec![RowKey::Int(3)]);
        Ok(())
    }

    #[test]
    fn statement_text_reaches_the_context() -> ResultTest<()> {
        let (conn, mut ctx) = setup();
        SelectStatement::new("inventory")
            .filter(Expr::col("id").eq(Expr::lit(1)))
            .execute(&conn, &mut ctx)?;
        assert_eq!(
            ctx.query.as_deref(),
            Some("SELECT * FROM inventory WHERE (id = 1)")
        );
        Ok(())
    }
}
