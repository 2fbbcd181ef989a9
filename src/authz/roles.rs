use std::collections::{HashMap, HashSet};

use crate::authz::errors::AuthzError;

/// Maps granted roles to the permissions they confer.
pub trait RoleMapper: Send + Sync {
    fn grants(&self, role: &str, permission: &str) -> bool;
}

/// The role token is the permission token.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleIsPermission;

impl RoleMapper for RoleIsPermission {
    fn grants(&self, role: &str, permission: &str) -> bool {
        role == permission
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleDef {
    pub name: String,
    pub permissions: Vec<String>,
    /// Other role names this role includes (inherits from)
    pub includes: Vec<String>,
}

/// Compiled role definitions: role name -> every permission it grants,
/// following `includes`.
#[derive(Debug, Clone, Default)]
pub struct RoleCatalog {
    closure: HashMap<String, HashSet<String>>,
}

impl RoleCatalog {
    pub fn compile(defs: Vec<RoleDef>) -> Result<Self, AuthzError> {
        let mut roles: HashMap<String, RoleDef> = HashMap::new();
        for def in defs {
            roles.insert(def.name.clone(), def);
        }

        for role in roles.values() {
            if let Some(missing) = role.includes.iter().find(|i| !roles.contains_key(*i)) {
                return Err(AuthzError::UndefinedRole(missing.clone()));
            }
        }
        check_role_cycles(&roles)?;

        let closure = roles
            .keys()
            .map(|name| {
                let perms = collect_role_permissions(name, &roles, &mut HashSet::new());
                (name.clone(), perms.into_iter().collect())
            })
            .collect();

        Ok(Self { closure })
    }

    pub fn len(&self) -> usize {
        self.closure.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closure.is_empty()
    }

    /// Permissions granted by `role`, sorted. Empty for unknown roles.
    pub fn permissions_of(&self, role: &str) -> Vec<&str> {
        let mut perms: Vec<&str> = self
            .closure
            .get(role)
            .map(|p| p.iter().map(String::as_str).collect())
            .unwrap_or_default();
        perms.sort_unstable();
        perms
    }
}

impl RoleMapper for RoleCatalog {
    /// A role always grants its own token; catalogued roles also grant their
    /// permission closure.
    fn grants(&self, role: &str, permission: &str) -> bool {
        role == permission
            || self
                .closure
                .get(role)
                .is_some_and(|perms| perms.contains(permission))
    }
}

/// Check for cycles in role inheritance using DFS.
fn check_role_cycles(roles: &HashMap<String, RoleDef>) -> Result<(), AuthzError> {
    let mut visited = HashSet::new();
    let mut in_stack = HashSet::new();

    let mut names: Vec<&String> = roles.keys().collect();
    names.sort();
    for name in names {
        if !visited.contains(name.as_str()) {
            dfs_cycle_check(name, roles, &mut visited, &mut in_stack)?;
        }
    }
    Ok(())
}

fn dfs_cycle_check(
    name: &str,
    roles: &HashMap<String, RoleDef>,
    visited: &mut HashSet<String>,
    in_stack: &mut HashSet<String>,
) -> Result<(), AuthzError> {
    visited.insert(name.to_string());
    in_stack.insert(name.to_string());

    if let Some(role) = roles.get(name) {
        for included in &role.includes {
            if in_stack.contains(included.as_str()) {
                return Err(AuthzError::CyclicRoleInheritance(format!(
                    "{name} -> {included}"
                )));
            }
            if !visited.contains(included.as_str()) {
                dfs_cycle_check(included, roles, visited, in_stack)?;
            }
        }
    }

    in_stack.remove(name);
    Ok(())
}

fn collect_role_permissions(
    role_name: &str,
    roles: &HashMap<String, RoleDef>,
    visited: &mut HashSet<String>,
) -> Vec<String> {
    if !visited.insert(role_name.to_string()) {
        return Vec::new();
    }

    let Some(role) = roles.get(role_name) else {
        return Vec::new();
    };

    let mut perms = role.permissions.clone();
    for included in &role.includes {
        perms.extend(collect_role_permissions(included, roles, visited));
    }
    perms
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gcp_roles() -> Vec<RoleDef> {
        vec![
            RoleDef {
                name: "viewer".into(),
                permissions: vec!["projects.get".into()],
                includes: vec![],
            },
            RoleDef {
                name: "editor".into(),
                permissions: vec!["projects.update".into()],
                includes: vec!["viewer".into()],
            },
            RoleDef {
                name: "owner".into(),
                permissions: vec!["projects.delete".into()],
                includes: vec!["editor".into()],
            },
        ]
    }

    #[test]
    fn test_role_is_permission() {
        assert!(RoleIsPermission.grants("owner", "owner"));
        assert!(!RoleIsPermission.grants("owner", "viewer"));
    }

    #[test]
    fn test_catalog_closure() {
        let catalog = RoleCatalog::compile(gcp_roles()).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(
            catalog.permissions_of("owner"),
            vec!["projects.delete", "projects.get", "projects.update"]
        );
        assert_eq!(catalog.permissions_of("viewer"), vec!["projects.get"]);
        assert!(catalog.permissions_of("ghost").is_empty());

        assert!(catalog.grants("owner", "projects.get"));
        assert!(catalog.grants("owner", "owner"));
        assert!(!catalog.grants("viewer", "projects.delete"));
        assert!(catalog.grants("auditor", "auditor"));
    }

    #[test]
    fn test_diamond_includes() {
        let defs = vec![
            RoleDef {
                name: "base".into(),
                permissions: vec!["read".into()],
                includes: vec![],
            },
            RoleDef {
                name: "left".into(),
                permissions: vec![],
                includes: vec!["base".into()],
            },
            RoleDef {
                name: "right".into(),
                permissions: vec![],
                includes: vec!["base".into()],
            },
            RoleDef {
                name: "top".into(),
                permissions: vec![],
                includes: vec!["left".into(), "right".into()],
            },
        ];
        let catalog = RoleCatalog::compile(defs).unwrap();
        assert_eq!(catalog.permissions_of("top"), vec!["read"]);
    }

    #[test]
    fn test_cyclic_roles_detected() {
        let defs = vec![
            RoleDef {
                name: "a".into(),
                permissions: vec![],
                includes: vec!["b".into()],
            },
            RoleDef {
                name: "b".into(),
                permissions: vec![],
                includes: vec!["a".into()],
            },
        ];
        let err = RoleCatalog::compile(defs).unwrap_err();
        assert!(matches!(err, AuthzError::CyclicRoleInheritance(_)));
    }

    #[test]
    fn test_undefined_include() {
        let defs = vec![RoleDef {
            name: "a".into(),
            permissions: vec![],
            includes: vec!["nope".into()],
        }];
        let err = RoleCatalog::compile(defs).unwrap_err();
        assert!(matches!(err, AuthzError::UndefinedRole(name) if name == "nope"));
    }
}
