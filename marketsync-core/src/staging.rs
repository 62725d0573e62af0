//! Staging table lifecycle.
//!
//! A staging table lives for exactly one call to [`with_staging`]: it is
//! created empty from the target's own column definitions, filled with one
//! bulk load, handed to the body, and dropped before the call returns.

use tracing::debug;

use crate::error::StoreError;
use crate::ident::Ident;
use crate::schema::TableDescriptor;
use crate::sql;
use crate::store::Executor;
use crate::value::SqlValue;

/// Deterministic staging name for `target`: the validated prefix followed by
/// the catalog name.
pub fn staging_name(prefix: &Ident, target: &Ident) -> Ident {
    Ident::from_catalog(format!("{}{}", prefix.as_str(), target.as_str()))
}

/// Create, populate and drop a staging table around `body`. The body gets
/// the executor and the staging relation's quoted reference.
pub fn with_staging<T, F>(
    exec: &mut dyn Executor,
    target: &TableDescriptor,
    prefix: &Ident,
    columns: &[Ident],
    rows: &[Vec<SqlValue>],
    body: F,
) -> Result<T, StoreError>
where
    F: FnOnce(&mut dyn Executor, &str) -> Result<T, StoreError>,
{
    let dialect = exec.dialect();
    let staging = staging_name(prefix, &target.name);
    let relation = sql::staging_relation(dialect, &staging);

    exec.execute(&sql::drop_staging(dialect, &staging))?;
    exec.execute(&sql::create_staging(
        dialect,
        &staging,
        &target.namespace,
        &target.name,
        columns,
    ))?;
    let outcome = exec.bulk_load(&relation, columns, rows).and_then(|loaded| {
        debug!(staging = staging.as_str(), rows = loaded, "staging table loaded");
        body(&mut *exec, &relation)
    });

    let dropped = exec.execute(&sql::drop_staging(dialect, &staging));
    match (outcome, dropped) {
        (Ok(value), Ok(_)) => Ok(value),
        (Ok(_), Err(err)) | (Err(err), Ok(_)) => Err(err),
        (Err(err), Err(drop_err)) => {
            debug!(staging = staging.as_str(), error = %drop_err, "staging drop skipped; rollback discards it");
            Err(err)
        }
    }
}
