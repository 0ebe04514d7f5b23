//! Ownership linkage between Directus and its managed objects
//!
//! Every managed object carries a controller owner reference to its Directus,
//! so the API server's garbage collector deletes it when the Directus goes.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

use crate::crd::Directus;
use crate::Error;

/// Controller owner reference pointing at the given Directus
///
/// Requires a persisted resource (with a uid). Deletion of the owner blocks
/// on its dependents under foreground cascading.
pub fn owner_reference(directus: &Directus) -> Result<OwnerReference, Error> {
    let mut owner = directus.controller_owner_ref(&()).ok_or_else(|| {
        Error::missing_field(format!("metadata.uid of Directus {}", directus.name_any()))
    })?;
    owner.block_owner_deletion = Some(true);
    Ok(owner)
}

/// Add the owner reference to `meta` unless an edge to the same owner exists
pub fn attach_owner(meta: &mut ObjectMeta, owner: &OwnerReference) {
    let refs = meta.owner_references.get_or_insert_with(Vec::new);
    if !refs.iter().any(|r| r.uid == owner.uid) {
        refs.push(owner.clone());
    }
}

/// Returns true if `meta` carries a controller edge to `owner`
pub fn is_owned_by(meta: &ObjectMeta, owner: &OwnerReference) -> bool {
    meta.owner_references
        .as_ref()
        .map(|refs| {
            refs.iter()
                .any(|r| r.uid == owner.uid && r.controller == Some(true))
        })
        .unwrap_or(false)
}
