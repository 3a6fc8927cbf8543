//! Permission resolution and role checks through the facade.

mod common;

use common::{ou, Setup};
use palisade_security::{LockType, RequestContext, SecurityError, Verdict};
use palisade_test_utils::assert_err_matches;
use palisade_vfs::{
    PermissionSet, Permissions, Principal, ResourceFilter, ResourceState, ResourceType, Role, StorageDriver,
};
use proptest::prelude::*;
use test_case::test_case;

fn permissions_strategy() -> impl Strategy<Value = Permissions> {
    (1u32..32).prop_map(Permissions::from_bits_truncate)
}

proptest! {
    #[test]
    fn vfs_manager_is_allowed_everything_offline(required in permissions_strategy()) {
        let setup = Setup::new();
        let doc = setup.storage.import_resource("/doc.txt", ResourceType::PLAIN).unwrap();
        let manager = setup.storage.add_user("vfs", ou("/"));
        setup.storage.grant_role(&manager, Role::VfsManager, ou("/"));
        setup
            .storage
            .set_acl("/doc.txt", Principal::User(manager.id), PermissionSet::denying(Permissions::all()), false)
            .unwrap();

        let verdict = setup
            .manager
            .has_permissions(&setup.offline(&manager), &doc, required, false, ResourceFilter::ALL)
            .unwrap();
        prop_assert_eq!(verdict, Verdict::Allowed);
    }

    #[test]
    fn online_write_is_always_denied(required in permissions_strategy()) {
        let setup = Setup::new();
        let doc = setup.storage.import_resource("/doc.txt", ResourceType::PLAIN).unwrap();
        let admin = setup.storage.admin().unwrap();
        let verdict = setup
            .manager
            .has_permissions(&setup.online(&admin), &doc, required | Permissions::WRITE, false, ResourceFilter::ALL)
            .unwrap();
        prop_assert_eq!(verdict, Verdict::Denied);
    }

    #[test]
    fn resolution_is_idempotent(required in permissions_strategy(), granted in permissions_strategy()) {
        let setup = Setup::new();
        let doc = setup.storage.import_resource("/doc.txt", ResourceType::PLAIN).unwrap();
        let user = setup.user_with("u", PermissionSet::allowing(granted));
        let ctx = setup.offline(&user);

        let first = setup.manager.has_permissions(&ctx, &doc, required, false, ResourceFilter::ALL).unwrap();
        let second = setup.manager.has_permissions(&ctx, &doc, required, false, ResourceFilter::ALL).unwrap();
        prop_assert_eq!(first, second);
        prop_assert_eq!(setup.manager.permission_cache().stats().hits, 1);
    }
}

#[test]
fn online_read_is_allowed_for_the_vfs_manager() {
    let setup = Setup::new();
    let doc = setup.storage.import_resource("/doc.txt", ResourceType::PLAIN).unwrap();
    let admin = setup.storage.admin().unwrap();
    let online = setup.online(&admin);
    assert_eq!(
        setup
            .manager
            .has_permissions(&online, &doc, Permissions::READ, false, ResourceFilter::ALL)
            .unwrap(),
        Verdict::Allowed
    );
    assert_err_matches!(
        setup
            .manager
            .check_permissions(&online, &doc, Permissions::WRITE, false, ResourceFilter::ALL),
        SecurityError::PermissionDenied { .. }
    );
}

#[test]
fn acl_change_invalidates_cached_verdicts() {
    let setup = Setup::new();
    let admin = setup.admin();
    let doc = setup.storage.import_resource("/doc.txt", ResourceType::PLAIN).unwrap();
    let user = setup.storage.add_user("u", ou("/"));
    let ctx = setup.offline(&user);

    let before = setup
        .manager
        .has_permissions(&ctx, &doc, Permissions::WRITE, false, ResourceFilter::ALL)
        .unwrap();
    assert_eq!(before, Verdict::Denied);

    setup.manager.lock_resource(&admin, "/doc.txt", LockType::Exclusive).unwrap();
    setup
        .manager
        .write_access_control_entry(&admin, "/doc.txt", Principal::User(user.id), PermissionSet::ACCESS_WRITE, false)
        .unwrap();

    let after = setup
        .manager
        .has_permissions(&ctx, &doc, Permissions::WRITE, false, ResourceFilter::ALL)
        .unwrap();
    assert_eq!(after, Verdict::Allowed);
}

#[test]
fn role_change_invalidates_cached_verdicts() {
    let setup = Setup::new();
    let admin = setup.admin();
    let doc = setup.storage.import_resource("/doc.txt", ResourceType::PLAIN).unwrap();
    let user = setup.storage.add_user("u", ou("/"));
    let ctx = setup.offline(&user);
    let vfs_managers = setup
        .storage
        .grant_role(&setup.storage.admin().unwrap(), Role::VfsManager, ou("/"));

    assert_eq!(
        setup
            .manager
            .has_permissions(&ctx, &doc, Permissions::CONTROL, false, ResourceFilter::ALL)
            .unwrap(),
        Verdict::Denied
    );
    setup.manager.add_user_to_group(&admin, user.id, vfs_managers.id).unwrap();
    assert_eq!(
        setup
            .manager
            .has_permissions(&ctx, &doc, Permissions::CONTROL, false, ResourceFilter::ALL)
            .unwrap(),
        Verdict::Allowed
    );
}

#[test_case(Role::Developer => true; "developer may write scripts")]
#[test_case(Role::WorkplaceUser => false; "workplace user may not")]
fn script_write_floor(role: Role) -> bool {
    let setup = Setup::new();
    let script = setup.storage.import_resource("/run.js", ResourceType::SCRIPT).unwrap();
    let user = setup.user_with("author", PermissionSet::allowing(Permissions::READ | Permissions::WRITE));
    setup.storage.grant_role(&user, role, ou("/"));

    setup
        .manager
        .has_permissions(&setup.offline(&user), &script, Permissions::WRITE, false, ResourceFilter::ALL)
        .unwrap()
        .is_allowed()
}

#[test]
fn script_floor_leaves_plain_files_alone() {
    let setup = Setup::new();
    let doc = setup.storage.import_resource("/doc.txt", ResourceType::PLAIN).unwrap();
    let user = setup.user_with("author", PermissionSet::ACCESS_WRITE);
    assert_eq!(
        setup
            .manager
            .has_permissions(&setup.offline(&user), &doc, Permissions::WRITE, false, ResourceFilter::ALL)
            .unwrap(),
        Verdict::Allowed
    );
}

#[test]
fn not_locked_and_filtered_are_never_cached() {
    let setup = Setup::new();
    let doc = setup.storage.import_resource("/doc.txt", ResourceType::PLAIN).unwrap();
    let deleted = setup.storage.import_resource("/old.txt", ResourceType::PLAIN).unwrap();
    let deleted = setup
        .storage
        .set_state(&deleted.root_path, ResourceState::Deleted)
        .unwrap();
    let ctx = setup.admin();

    let not_locked = setup
        .manager
        .has_permissions(&ctx, &doc, Permissions::WRITE, true, ResourceFilter::ALL)
        .unwrap();
    assert_eq!(not_locked, Verdict::NotLocked);
    let filtered = setup
        .manager
        .has_permissions(&ctx, &deleted, Permissions::READ, false, ResourceFilter::DEFAULT)
        .unwrap();
    assert_eq!(filtered, Verdict::Filtered);
    assert!(setup.manager.permission_cache().is_empty());

    setup.manager.lock_resource(&ctx, "/doc.txt", LockType::Exclusive).unwrap();
    let locked = setup
        .manager
        .has_permissions(&ctx, &doc, Permissions::WRITE, true, ResourceFilter::ALL)
        .unwrap();
    assert_eq!(locked, Verdict::Allowed);
}

#[test]
fn filtered_resource_reads_as_not_found() {
    let setup = Setup::new();
    setup.storage.import_resource("/old.txt", ResourceType::PLAIN).unwrap();
    setup
        .storage
        .set_state("/old.txt", ResourceState::Deleted)
        .unwrap();
    assert_err_matches!(
        setup.manager.read_resource(&setup.admin(), "/old.txt", ResourceFilter::DEFAULT),
        SecurityError::ResourceNotFound { .. }
    );
}

#[test_case("/a/", true; "own unit")]
#[test_case("/a/b/", true; "unit below")]
#[test_case("/a/b/c/", true; "unit further below")]
#[test_case("/c/", false; "sibling unit")]
#[test_case("/", false; "parent unit")]
fn role_propagates_down_the_unit_tree(queried: &str, expected: bool) {
    let setup = Setup::new();
    let user = setup.storage.add_user("ou-admin", ou("/a/"));
    setup.storage.grant_role(&user, Role::Administrator, ou("/a/"));
    assert_eq!(
        setup.manager.has_role_for_org_unit(&setup.offline(&user), Role::Administrator, &ou(queried)),
        expected
    );
}

#[test]
fn role_implies_the_roles_below_it() {
    let setup = Setup::new();
    let user = setup.storage.add_user("admin2", ou("/"));
    setup.storage.grant_role(&user, Role::Administrator, ou("/"));
    let ctx = setup.offline(&user);
    assert!(setup.manager.has_role(&ctx, Role::Developer));
    assert!(setup.manager.has_role(&ctx, Role::AccountManager));
    assert!(!setup.manager.has_role(&ctx, Role::RootAdmin));
}

#[test]
fn principal_backend_failure_counts_as_missing_role() {
    let setup = Setup::new();
    let doc = setup.storage.import_resource("/doc.txt", ResourceType::PLAIN).unwrap();
    let ctx = setup.admin();
    assert!(setup.manager.has_role(&ctx, Role::RootAdmin));

    setup.storage.set_fail_principal_reads(true);
    assert!(!setup.manager.has_role(&ctx, Role::RootAdmin));
    assert!(!setup.manager.has_role_for_resource(&ctx, Role::VfsManager, &doc));
    assert_err_matches!(
        setup.manager.check_role(&ctx, Role::Administrator),
        SecurityError::RoleViolation { .. }
    );
    assert!(!setup.manager.is_manager_of_project(&RequestContext::new(
        setup.storage.add_user("other", ou("/")),
        setup.storage.offline_project().unwrap(),
    )));
}

#[test]
fn group_members_inherit_group_entries() {
    let setup = Setup::new();
    let doc = setup.storage.import_resource("/doc.txt", ResourceType::PLAIN).unwrap();
    let user = setup.storage.add_user("member", ou("/"));
    let editors = setup.storage.add_group("Editors", ou("/"));
    setup.storage.add_member(&user, &editors);
    setup
        .storage
        .set_acl("/", Principal::Group(editors.id), PermissionSet::ACCESS_READ, true)
        .unwrap();
    let group = setup.storage.read_group(editors.id).unwrap();
    assert_eq!(group.name, "Editors");
    assert_eq!(
        setup
            .manager
            .has_permissions(&setup.offline(&user), &doc, Permissions::READ, false, ResourceFilter::ALL)
            .unwrap(),
        Verdict::Allowed
    );
}
