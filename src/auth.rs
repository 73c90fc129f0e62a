/// Permission levels for bot users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionLevel {
    /// The single configured operator
    Owner,
    /// Anyone else
    Denied,
}

/// Determine the permission level of `user_id` given the configured owner.
pub fn get_permission_level(user_id: u64, owner_user_id: u64) -> PermissionLevel {
    if user_id == owner_user_id {
        PermissionLevel::Owner
    } else {
        PermissionLevel::Denied
    }
}

/// Every command has side effects on the service, so only the owner may run any.
pub fn can_execute(permission: PermissionLevel) -> bool {
    matches!(permission, PermissionLevel::Owner)
}
