//! Statement text builders.
//!
//! Every builder takes [`Ident`]s only, so the sole dynamic parts of a
//! statement are catalog-sourced or validated names in quoted form.

use crate::ident::{qualified, quoted_list, Ident};
use crate::store::Dialect;

/// Quoted reference to a session-local staging table.
pub fn staging_relation(dialect: Dialect, staging: &Ident) -> String {
    format!("{}.{}", dialect.temp_namespace(), staging.quoted())
}

/// Empty temporary table with exactly `columns`, typed like the target's.
pub fn create_staging(
    dialect: Dialect,
    staging: &Ident,
    namespace: &Ident,
    target: &Ident,
    columns: &[Ident],
) -> String {
    let source = qualified(namespace, target);
    let cols = quoted_list(columns);
    match dialect {
        Dialect::Postgres => format!(
            "CREATE TEMP TABLE {} ON COMMIT DROP AS SELECT {cols} FROM {source} WITH NO DATA",
            staging.quoted()
        ),
        Dialect::Sqlite => format!(
            "CREATE TEMP TABLE {} AS SELECT {cols} FROM {source} WHERE 0",
            staging.quoted()
        ),
    }
}

pub fn drop_staging(dialect: Dialect, staging: &Ident) -> String {
    format!(
        "DROP TABLE IF EXISTS {}",
        staging_relation(dialect, staging)
    )
}

/// Set-based update of `target` from `staging`, matching every key at once.
pub fn update_from_staging(
    target: &str,
    staging: &str,
    keys: &[Ident],
    updates: &[Ident],
) -> String {
    let set = updates
        .iter()
        .map(|c| format!("{} = s.{}", c.quoted(), c.quoted()))
        .collect::<Vec<_>>()
        .join(", ");
    let on = keys
        .iter()
        .map(|k| format!("t.{} = s.{}", k.quoted(), k.quoted()))
        .collect::<Vec<_>>()
        .join(" AND ");
    format!("UPDATE {target} AS t SET {set} FROM {staging} AS s WHERE {on}")
}

pub fn delete_all(target: &str) -> String {
    format!("DELETE FROM {target}")
}

/// Returns a row iff `target` holds at least one.
pub fn probe_rows(target: &str) -> String {
    format!("SELECT 1 FROM {target} LIMIT 1")
}

pub fn insert_default_returning(table: &str, id_column: &Ident) -> String {
    format!(
        "INSERT INTO {table} DEFAULT VALUES RETURNING {}",
        id_column.quoted()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<Ident> {
        names.iter().map(|n| Ident::from_catalog(*n)).collect()
    }

    #[test]
    fn update_matches_on_every_key() {
        let sql = update_from_staging(
            "\"ods\".\"positions\"",
            "pg_temp.\"stg_positions\"",
            &ids(&["account", "symbol"]),
            &ids(&["shares", "updated_at"]),
        );
        assert_eq!(
            sql,
            "UPDATE \"ods\".\"positions\" AS t SET \"shares\" = s.\"shares\", \
             \"updated_at\" = s.\"updated_at\" FROM pg_temp.\"stg_positions\" AS s \
             WHERE t.\"account\" = s.\"account\" AND t.\"symbol\" = s.\"symbol\""
        );
    }

    #[test]
    fn staging_tables_copy_target_column_types() {
        let ns = Ident::from_catalog("ods");
        let target = Ident::from_catalog("positions");
        let staging = Ident::from_catalog("stg_positions");
        let cols = ids(&["symbol", "shares"]);
        assert_eq!(
            create_staging(Dialect::Postgres, &staging, &ns, &target, &cols),
            "CREATE TEMP TABLE \"stg_positions\" ON COMMIT DROP AS SELECT \"symbol\", \"shares\" \
             FROM \"ods\".\"positions\" WITH NO DATA"
        );
        assert_eq!(
            create_staging(Dialect::Sqlite, &staging, &ns, &target, &cols),
            "CREATE TEMP TABLE \"stg_positions\" AS SELECT \"symbol\", \"shares\" \
             FROM \"ods\".\"positions\" WHERE 0"
        );
    }

    #[test]
    fn drop_targets_the_temp_namespace() {
        let staging = Ident::from_catalog("stg_positions");
        assert_eq!(
            drop_staging(Dialect::Sqlite, &staging),
            "DROP TABLE IF EXISTS temp.\"stg_positions\""
        );
        assert_eq!(
            drop_staging(Dialect::Postgres, &staging),
            "DROP TABLE IF EXISTS pg_temp.\"stg_positions\""
        );
    }

    #[test]
    fn hostile_column_names_stay_inside_quotes() {
        let sql = update_from_staging(
            "\"main\".\"t\"",
            "temp.\"s\"",
            &ids(&["k\"; DROP TABLE t; --"]),
            &ids(&["v"]),
        );
        assert!(sql.contains("t.\"k\"\"; DROP TABLE t; --\""));
    }
}
