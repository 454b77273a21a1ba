//! Two-step changes that keep ordering arrays and records in agreement.

use std::future::Future;

use crate::db::store::{EntityStore, OrderKey, StoreResult};
use crate::error::ApiError;

/// Awaits `step`, the second half of a two-step change. If it fails, `undo`
/// reverts the first half and the request fails with a store error.
///
/// A failed `undo` leaves the ordering and the records out of step. That is
/// logged at error level for an operator to repair.
pub(crate) async fn complete_or_compensate<S, U, UF>(
    entity: &'static str,
    id: i32,
    step: S,
    undo: U,
) -> Result<(), ApiError>
where
    S: Future<Output = StoreResult<()>>,
    U: FnOnce() -> UF,
    UF: Future<Output = StoreResult<()>>,
{
    let Err(step_err) = step.await else {
        return Ok(());
    };
    tracing::warn!(entity, id, err = %step_err, "ordering update failed; compensating");

    match undo().await {
        Ok(()) => Err(ApiError::store(format!(
            "Failed to update the {entity} ordering"
        ))),
        Err(undo_err) => {
            tracing::error!(
                entity,
                id,
                step_err = %step_err,
                undo_err = %undo_err,
                "compensation failed; ordering and records disagree"
            );
            Err(ApiError::store(format!(
                "The {entity} ordering is inconsistent"
            )))
        }
    }
}

/// Takes `id` out of the ordering under `key`, then runs `delete`. If the
/// delete fails the id is linked back at its old position.
pub(crate) async fn unlink_then_delete<D, DF>(
    store: &dyn EntityStore,
    entity: &'static str,
    key: OrderKey,
    id: i32,
    delete: D,
) -> Result<(), ApiError>
where
    D: FnOnce() -> DF,
    DF: Future<Output = StoreResult<()>>,
{
    let position = store.unlink_ordered(key, id).await?;
    complete_or_compensate(entity, id, delete(), || async move {
        match position {
            Some(index) => store.link_ordered(key, id, Some(index)).await,
            None => Ok(()),
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use axum::http::StatusCode;

    use super::*;
    use crate::db::store::StoreError;

    #[tokio::test]
    async fn success_skips_undo() {
        let undone = AtomicBool::new(false);
        let result = complete_or_compensate("room", 1, async { Ok(()) }, || async {
            undone.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await;
        assert!(result.is_ok());
        assert!(!undone.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failure_runs_undo_and_reports_store_error() {
        let undone = AtomicBool::new(false);
        let err = complete_or_compensate(
            "room",
            1,
            async { Err(StoreError::Backend("down".into())) },
            || async {
                undone.store(true, Ordering::SeqCst);
                Ok(())
            },
        )
        .await
        .unwrap_err();
        assert!(undone.load(Ordering::SeqCst));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, "STORE_ERROR");
    }

    #[tokio::test]
    async fn failed_undo_is_still_a_store_error() {
        let err = complete_or_compensate(
            "role",
            4,
            async { Err(StoreError::Backend("down".into())) },
            || async { Err(StoreError::Backend("still down".into())) },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, "STORE_ERROR");
        assert!(err.message.contains("inconsistent"));
    }
}
