//! Live schema introspection.

use tracing::warn;

use crate::error::StoreError;
use crate::ident::{qualified, Ident};
use crate::store::Executor;

/// A target table as the catalog reports it right now. Never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub namespace: Ident,
    pub name: Ident,
    pub columns: Vec<Ident>,
}

impl TableDescriptor {
    /// Read the descriptor of `namespace.table`. An absent table yields an
    /// empty column list.
    pub fn load(
        exec: &mut dyn Executor,
        namespace: &Ident,
        table: &str,
    ) -> Result<Self, StoreError> {
        let columns = exec
            .catalog_columns(namespace.as_str(), table)?
            .into_iter()
            .map(Ident::from_catalog)
            .collect();
        Ok(Self {
            namespace: namespace.clone(),
            name: Ident::from_catalog(table),
            columns,
        })
    }

    pub fn is_visible(&self) -> bool {
        !self.columns.is_empty()
    }

    pub fn qualified(&self) -> String {
        qualified(&self.namespace, &self.name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.as_str().to_string()).collect()
    }

    /// Catalog idents for `names`, in the order given. Names the catalog does
    /// not know are skipped.
    pub fn idents_for(&self, names: &[String]) -> Vec<Ident> {
        names
            .iter()
            .filter_map(|name| self.columns.iter().find(|c| c.as_str() == name))
            .cloned()
            .collect()
    }
}

/// Ordered column names of `table`, or an empty list when the table is absent
/// or the catalog cannot be read. The cause is logged.
pub fn columns_of(exec: &mut dyn Executor, namespace: &Ident, table: &str) -> Vec<String> {
    match TableDescriptor::load(exec, namespace, table) {
        Ok(desc) => {
            if !desc.is_visible() {
                warn!(table, namespace = namespace.as_str(), "table not found in catalog");
            }
            desc.column_names()
        }
        Err(err) => {
            warn!(table, namespace = namespace.as_str(), error = %err, "catalog lookup failed");
            Vec::new()
        }
    }
}

/// Like [`columns_of`] but keeps the catalog failure.
pub fn try_columns_of(
    exec: &mut dyn Executor,
    namespace: &Ident,
    table: &str,
) -> Result<Vec<String>, StoreError> {
    Ok(TableDescriptor::load(exec, namespace, table)?.column_names())
}
