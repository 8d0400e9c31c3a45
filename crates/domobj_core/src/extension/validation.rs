//! Mandatory relation validation on commit.

use super::ClientTransactionExtension;
use crate::end_point::RelationEndPointId;
use crate::error::{CoreError, CoreResult};
use crate::persistence::PersistableData;
use crate::transaction::ClientTransaction;
use crate::types::ValueAccess;

/// Rejects a commit that leaves a mandatory relation empty.
///
/// Foreign keys are always checked. Virtual end-points are checked when
/// they are loaded; an end-point that was never loaded cannot have been
/// emptied by this transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitValidationExtension;

impl CommitValidationExtension {
    /// The key under which the extension is installed.
    pub const KEY: &'static str = "domobj.CommitValidation";
}

impl ClientTransactionExtension for CommitValidationExtension {
    fn key(&self) -> &str {
        Self::KEY
    }

    fn commit_validate(&self, tx: &ClientTransaction, data: &[PersistableData]) -> CoreResult<()> {
        for item in data.iter().filter(|item| !item.state.is_deleted()) {
            let Some(container) = &item.data_container else {
                continue;
            };
            for definition in container.class().end_points().iter().filter(|d| d.is_mandatory) {
                let is_set = if definition.is_virtual {
                    let id = RelationEndPointId::new(container.id().clone(), &definition.property_name);
                    tx.data_manager()
                        .get_relation_end_point_without_loading(&id)
                        .is_none_or(|end_point| !end_point.current_ids().is_empty())
                } else {
                    container
                        .foreign_key(&definition.property_name, ValueAccess::Current)
                        .is_some()
                };
                if !is_set {
                    return Err(CoreError::MandatoryRelationNotSet {
                        id: container.id().clone(),
                        property: definition.property_name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
