//! Group expansion for the read path.
//!
//! A user receives messages addressed to themselves, to any of their OS
//! groups (each `@`-prefixed), and to the `#all` broadcast. A group login
//! expands to just itself. OS lookup failures are swallowed: the caller
//! always gets at least `{login, "#all"}`.

use courier_types::{LoginKind, BROADCAST, GROUP_PREFIX};

/// Source of a user's group memberships.
pub trait GroupResolver: Send + Sync {
    /// Bare group names for `user`, or `None` when the lookup failed or the
    /// user is unknown.
    fn groups_of(&self, user: &str) -> Option<Vec<String>>;
}

/// Resolves group membership against the operating system's user database.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsGroups;

#[cfg(unix)]
impl GroupResolver for OsGroups {
    fn groups_of(&self, user: &str) -> Option<Vec<String>> {
        let account = nix::unistd::User::from_name(user).ok().flatten()?;
        let cname = std::ffi::CString::new(user).ok()?;
        let gids = nix::unistd::getgrouplist(&cname, account.gid).ok()?;
        Some(
            gids.into_iter()
                .filter_map(|gid| nix::unistd::Group::from_gid(gid).ok().flatten())
                .map(|group| group.name)
                .collect(),
        )
    }
}

#[cfg(not(unix))]
impl GroupResolver for OsGroups {
    fn groups_of(&self, _user: &str) -> Option<Vec<String>> {
        None
    }
}

/// The addressee set `load` should match for `login`.
pub fn expand_addressees(login: &str, resolver: &dyn GroupResolver) -> Vec<String> {
    if LoginKind::of(login) == LoginKind::Group {
        return vec![login.to_string()];
    }

    let mut addressees = Vec::new();
    if let Some(groups) = resolver.groups_of(login) {
        addressees.extend(groups.into_iter().map(|g| format!("{GROUP_PREFIX}{g}")));
    }
    addressees.push(login.to_string());
    addressees.push(BROADCAST.to_string());
    addressees
}
