//! Who may change a rehearsal.
//!
//! A rehearsal's creator may always modify it. Anyone else needs the
//! `admin` role in the rehearsal's band. Membership is read from the store
//! on every check, so role changes apply to the very next request.

use tracing::warn;
use uuid::Uuid;

use crate::db::BandStore;
use crate::error::{CadenceError, CadenceResult};
use crate::models::rehearsal::Rehearsal;

pub async fn can_modify<B>(user_id: Uuid, rehearsal: &Rehearsal, bands: &B) -> CadenceResult<bool>
where
    B: BandStore + ?Sized,
{
    if rehearsal.created_by == user_id {
        return Ok(true);
    }

    Ok(bands
        .band(rehearsal.band_id)
        .await?
        .map(|band| band.is_admin(user_id))
        .unwrap_or(false))
}

pub async fn ensure_can_modify<B>(
    user_id: Uuid,
    rehearsal: &Rehearsal,
    bands: &B,
) -> CadenceResult<()>
where
    B: BandStore + ?Sized,
{
    if can_modify(user_id, rehearsal, bands).await? {
        Ok(())
    } else {
        warn!(user = %user_id, rehearsal = %rehearsal.id, "refused rehearsal change");
        Err(CadenceError::Forbidden(
            "Not authorized to modify this rehearsal".to_owned(),
        ))
    }
}
