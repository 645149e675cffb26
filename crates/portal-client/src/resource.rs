//! Logical resource names and URL resolution.
//!
//! Each REST resource the portal exposes is a variant of [`Resource`]
//! carrying its path template as data, so an unknown resource name is
//! unrepresentable rather than a runtime lookup failure. Resolution is
//! pure: the same (resource, id, subregister, id2) tuple always yields
//! the same URL for a fixed base address.

use crate::error::{ClientError, Result};

/// A logical REST resource on the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// API root, used for the legacy base-location probe
    Base,
    /// Collection of all packages
    PackageRegister,
    /// A single package, addressed by name; relationship subregisters
    /// hang off this entity
    PackageEntity,
    /// Collection of all tags
    TagRegister,
    /// A single tag; its entity body is the list of packages carrying it
    TagEntity,
    /// Collection of all groups
    GroupRegister,
    /// A single group, addressed by name
    GroupEntity,
    /// Full-text package search
    PackageSearch,
    /// HTML form for creating a package
    PackageCreateForm,
    /// HTML form for editing an existing package
    PackageEditForm,
    /// Collection of changesets
    ChangesetRegister,
    /// A single changeset, addressed by id
    ChangesetEntity,
    /// Metadata record for a stored blob
    StorageMetadata,
    /// Upload authorization for a storage key
    StorageAuth,
}

impl Resource {
    /// Path template relative to the configured base address.
    pub fn path(self) -> &'static str {
        match self {
            Resource::Base => "/",
            Resource::PackageRegister | Resource::PackageEntity => "/package",
            Resource::TagRegister | Resource::TagEntity => "/tag",
            Resource::GroupRegister | Resource::GroupEntity => "/group",
            Resource::PackageSearch => "/search/package",
            Resource::PackageCreateForm => "/form/package/create",
            Resource::PackageEditForm => "/form/package/edit",
            Resource::ChangesetRegister | Resource::ChangesetEntity => "/changeset",
            Resource::StorageMetadata => "/storage/metadata",
            Resource::StorageAuth => "/storage/auth",
        }
    }
}

/// Resolve a resource plus optional path segments against a base address.
///
/// Segments are appended strictly in the order entity id, subregister,
/// second entity id; supplying an outer segment without the inner ones
/// is a caller error surfaced as [`ClientError::Config`]. Segments are
/// percent-encoded, so entity names containing `/` or spaces address
/// the intended entity rather than a deeper path.
pub fn resolve(
    base: &str,
    resource: Resource,
    entity_id: Option<&str>,
    subregister: Option<&str>,
    entity2_id: Option<&str>,
) -> Result<String> {
    if (subregister.is_some() && entity_id.is_none())
        || (entity2_id.is_some() && subregister.is_none())
    {
        return Err(ClientError::Config(
            "path segments must be supplied innermost-first".to_string(),
        ));
    }

    let mut url = format!("{}{}", base, resource.path());
    for segment in [entity_id, subregister, entity2_id].into_iter().flatten() {
        url.push('/');
        url.push_str(&urlencoding::encode(segment));
    }
    Ok(url)
}

/// Resolve the action pseudo-resource: `base + "/action/" + name`.
///
/// Actions live outside the [`Resource`] table because their resolution
/// rule is simpler (a single dynamic segment, no subregisters).
pub fn resolve_action(base: &str, action_name: &str) -> String {
    format!("{}/action/{}", base, urlencoding::encode(action_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://x/api/rest";

    #[test]
    fn resolves_entity_url() {
        let url = resolve(BASE, Resource::PackageEntity, Some("mypkg"), None, None).unwrap();
        assert_eq!(url, "http://x/api/rest/package/mypkg");
    }

    #[test]
    fn resolves_registers() {
        assert_eq!(
            resolve(BASE, Resource::PackageRegister, None, None, None).unwrap(),
            "http://x/api/rest/package"
        );
        assert_eq!(
            resolve(BASE, Resource::TagRegister, None, None, None).unwrap(),
            "http://x/api/rest/tag"
        );
        assert_eq!(
            resolve(BASE, Resource::GroupEntity, Some("roger"), None, None).unwrap(),
            "http://x/api/rest/group/roger"
        );
        assert_eq!(
            resolve(BASE, Resource::PackageSearch, None, None, None).unwrap(),
            "http://x/api/rest/search/package"
        );
    }

    #[test]
    fn resolves_relationship_paths() {
        let url = resolve(
            BASE,
            Resource::PackageEntity,
            Some("annakarenina"),
            Some("relationships"),
            None,
        )
        .unwrap();
        assert_eq!(url, "http://x/api/rest/package/annakarenina/relationships");

        let url = resolve(
            BASE,
            Resource::PackageEntity,
            Some("annakarenina"),
            Some("child_of"),
            Some("warandpeace"),
        )
        .unwrap();
        assert_eq!(
            url,
            "http://x/api/rest/package/annakarenina/child_of/warandpeace"
        );
    }

    #[test]
    fn rejects_missing_intermediate_segments() {
        let err = resolve(BASE, Resource::PackageEntity, None, Some("relationships"), None);
        assert!(matches!(err, Err(ClientError::Config(_))));

        let err = resolve(
            BASE,
            Resource::PackageEntity,
            Some("annakarenina"),
            None,
            Some("warandpeace"),
        );
        assert!(matches!(err, Err(ClientError::Config(_))));
    }

    #[test]
    fn encodes_segments() {
        let url = resolve(BASE, Resource::PackageEntity, Some("my pkg/x"), None, None).unwrap();
        assert_eq!(url, "http://x/api/rest/package/my%20pkg%2Fx");
    }

    #[test]
    fn resolution_is_pure() {
        let a = resolve(BASE, Resource::StorageAuth, Some("2011/file.csv"), None, None).unwrap();
        let b = resolve(BASE, Resource::StorageAuth, Some("2011/file.csv"), None, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn action_url() {
        assert_eq!(
            resolve_action(BASE, "package_show"),
            "http://x/api/rest/action/package_show"
        );
    }
}
