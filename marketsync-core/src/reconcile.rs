//! Column reconciliation between a batch and a live target table.

use thiserror::Error;

/// Batch columns that also exist in the target, in batch order.
pub fn reconcile_for_write(batch_columns: &[String], table_columns: &[String]) -> Vec<String> {
    batch_columns
        .iter()
        .filter(|c| table_columns.contains(c))
        .cloned()
        .collect()
}

/// Batch columns the target does not have.
pub fn dropped_columns(batch_columns: &[String], table_columns: &[String]) -> Vec<String> {
    batch_columns
        .iter()
        .filter(|c| !table_columns.contains(c))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("no key columns given")]
    NoKeys,

    #[error("key columns {0:?} are not columns of the target")]
    NotInTable(Vec<String>),

    #[error("key columns {0:?} are not columns of the batch")]
    NotInBatch(Vec<String>),
}

/// Validated keys and the update columns that go with them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySplit {
    pub keys: Vec<String>,
    pub updates: Vec<String>,
}

/// Validate `keys` against the target and the batch, and resolve the update
/// columns. Without an explicit list every non-key batch column is an update
/// candidate. Either way updates are limited to target columns and never
/// include a key.
pub fn split_keys(
    table_columns: &[String],
    batch_columns: &[String],
    keys: &[String],
    updates: Option<&[String]>,
) -> Result<KeySplit, KeyError> {
    let mut validated: Vec<String> = Vec::with_capacity(keys.len());
    for key in keys {
        if !validated.contains(key) {
            validated.push(key.clone());
        }
    }
    if validated.is_empty() {
        return Err(KeyError::NoKeys);
    }

    let missing: Vec<String> = validated
        .iter()
        .filter(|k| !table_columns.contains(k))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(KeyError::NotInTable(missing));
    }
    let missing: Vec<String> = validated
        .iter()
        .filter(|k| !batch_columns.contains(k))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(KeyError::NotInBatch(missing));
    }

    let candidates = updates.unwrap_or(batch_columns);
    let mut resolved: Vec<String> = Vec::new();
    for column in candidates {
        if table_columns.contains(column)
            && batch_columns.contains(column)
            && !validated.contains(column)
            && !resolved.contains(column)
        {
            resolved.push(column.clone());
        }
    }

    Ok(KeySplit {
        keys: validated,
        updates: resolved,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn s(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn write_columns_keep_batch_order() {
        let batch = s(&["updated_at", "bogus", "symbol"]);
        let table = s(&["symbol", "shares", "updated_at"]);
        assert_eq!(reconcile_for_write(&batch, &table), s(&["updated_at", "symbol"]));
        assert_eq!(dropped_columns(&batch, &table), s(&["bogus"]));
    }

    #[test]
    fn default_updates_are_non_key_batch_columns() {
        let split = split_keys(
            &s(&["symbol", "shares", "updated_at"]),
            &s(&["symbol", "shares", "extra"]),
            &s(&["symbol"]),
            None,
        )
        .unwrap();
        assert_eq!(split.keys, s(&["symbol"]));
        assert_eq!(split.updates, s(&["shares"]));
    }

    #[test]
    fn explicit_key_in_updates_is_removed() {
        let split = split_keys(
            &s(&["symbol", "shares"]),
            &s(&["symbol", "shares"]),
            &s(&["symbol"]),
            Some(&s(&["symbol", "shares"])),
        )
        .unwrap();
        assert_eq!(split.updates, s(&["shares"]));
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = split_keys(&s(&["symbol"]), &s(&["ticker"]), &s(&["ticker"]), None).unwrap_err();
        assert_eq!(err, KeyError::NotInTable(s(&["ticker"])));
    }

    #[test]
    fn key_missing_from_batch_is_rejected() {
        let err = split_keys(&s(&["symbol", "shares"]), &s(&["shares"]), &s(&["symbol"]), None)
            .unwrap_err();
        assert_eq!(err, KeyError::NotInBatch(s(&["symbol"])));
    }

    #[test]
    fn keys_only_batch_resolves_to_no_updates() {
        let split = split_keys(&s(&["symbol", "shares"]), &s(&["symbol"]), &s(&["symbol"]), None)
            .unwrap();
        assert!(split.updates.is_empty());
    }

    fn names() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-e]{1,2}", 0..8).prop_map(|mut v| {
            let mut seen = Vec::new();
            v.retain(|n| {
                let fresh = !seen.contains(n);
                seen.push(n.clone());
                fresh
            });
            v
        })
    }

    proptest! {
        #[test]
        fn reconciled_columns_are_an_ordered_subset(batch in names(), table in names()) {
            let kept = reconcile_for_write(&batch, &table);
            prop_assert!(kept.iter().all(|c| table.contains(c)));
            let positions: Vec<usize> = kept
                .iter()
                .map(|c| batch.iter().position(|b| b == c).unwrap())
                .collect();
            prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
        }

        #[test]
        fn updates_never_contain_keys(table in names(), batch in names(), k in 0usize..4) {
            let keys: Vec<String> = batch.iter().filter(|c| table.contains(c)).take(k).cloned().collect();
            if let Ok(split) = split_keys(&table, &batch, &keys, None) {
                prop_assert!(split.updates.iter().all(|u| !split.keys.contains(u)));
                prop_assert!(split.updates.iter().all(|u| table.contains(u)));
            }
        }
    }
}
