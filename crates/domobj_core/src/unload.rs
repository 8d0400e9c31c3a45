//! Unloading of object data and relation end-points.
//!
//! Unloading makes a transaction forget data it has loaded so that the
//! next access loads it again. Only unchanged data can be unloaded.

use crate::end_point::RelationEndPointId;
use crate::error::{CoreError, CoreResult};
use crate::transaction::ClientTransaction;
use domobj_codec::ObjectId;

/// Unloads the data of an unchanged object.
///
/// Returns `false` if no data was loaded for `id`. Afterwards the object's
/// state is NotLoadedYet; its virtual end-points stay loaded.
///
/// # Errors
///
/// Returns [`CoreError::InvalidOperation`] if the object is new, changed or
/// deleted, and any error raised by an `objects_unloading` handler.
pub fn unload_data(tx: &ClientTransaction, id: &ObjectId) -> CoreResult<bool> {
    tx.ensure_active()?;
    let data_manager = tx.data_manager();
    let Some(object) = data_manager.unloadable_object(id)? else {
        return Ok(false);
    };
    let objects = [object];
    tx.event_broker().raise_objects_unloading(tx, &objects)?;
    data_manager.unload_container(id)?;
    tracing::debug!(transaction = %tx.id(), object = %id, "object data unloaded");
    tx.event_broker().raise_objects_unloaded(tx, &objects)?;
    Ok(true)
}

/// Returns a complete virtual end-point to the not-loaded state.
///
/// Returns `false` if the end-point was not loaded.
///
/// # Errors
///
/// Returns [`CoreError::InvalidArgument`] for real end-points and
/// [`CoreError::InvalidOperation`] if the end-point has changed or its
/// owner is new.
pub fn unload_virtual_end_point(
    tx: &ClientTransaction,
    end_point: &RelationEndPointId,
) -> CoreResult<bool> {
    tx.ensure_active()?;
    if !tx.is_writeable() {
        return Err(CoreError::read_only(tx.id(), "unload_virtual_end_point"));
    }
    let definition = tx
        .mapping()
        .end_point(end_point.object_id().class_id(), end_point.property_name())?;
    if !definition.is_virtual {
        return Err(CoreError::invalid_argument(format!(
            "'{end_point}' is a real end-point; unload the data of its object instead"
        )));
    }
    let unloaded = tx.data_manager().unload_end_point(end_point)?;
    if unloaded {
        tracing::debug!(transaction = %tx.id(), end_point = %end_point, "end-point unloaded");
    }
    Ok(unloaded)
}
