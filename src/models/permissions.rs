use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize, Serializer};

/// A single named permission bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    Registered,
    Editor,
    Administrator,
}

impl Permission {
    pub const ALL: [Permission; 3] = [
        Permission::Registered,
        Permission::Editor,
        Permission::Administrator,
    ];

    pub const fn bit(self) -> u32 {
        match self {
            Permission::Registered => 1,
            Permission::Editor => 1 << 1,
            Permission::Administrator => 1 << 2,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Permission::Registered => "REGISTERED",
            Permission::Editor => "EDITOR",
            Permission::Administrator => "ADMINISTRATOR",
        }
    }
}

/// Set of [`Permission`] bits, stored on a role as `raw_permissions`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Permissions(u32);

impl Permissions {
    pub const REGISTERED: Permissions = Permissions(Permission::Registered.bit());
    pub const EDITOR: Permissions = Permissions(Permission::Editor.bit());
    pub const ADMINISTRATOR: Permissions = Permissions(Permission::Administrator.bit());

    pub const fn empty() -> Self {
        Permissions(0)
    }

    pub const fn all() -> Self {
        Self::REGISTERED.union(Self::EDITOR).union(Self::ADMINISTRATOR)
    }

    pub const fn union(self, other: Permissions) -> Self {
        Permissions(self.0 | other.0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Rebuilds the set from a stored integer, dropping unknown bits.
    pub fn from_bits_truncate(raw: i64) -> Self {
        Permissions((raw & i64::from(Self::all().0)) as u32)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: impl Into<Permissions>) -> bool {
        let other = other.into();
        self.0 & other.0 == other.0
    }

    pub fn is_strict_subset_of(self, other: Permissions) -> bool {
        self != other && other.contains(self)
    }

    pub fn iter(self) -> impl Iterator<Item = Permission> {
        Permission::ALL
            .into_iter()
            .filter(move |permission| self.contains(*permission))
    }
}

impl From<Permission> for Permissions {
    fn from(permission: Permission) -> Self {
        Permissions(permission.bit())
    }
}

impl BitOr for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Permissions) -> Permissions {
        self.union(rhs)
    }
}

impl BitOr<Permission> for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Permission) -> Permissions {
        self.union(rhs.into())
    }
}

impl BitOr for Permission {
    type Output = Permissions;

    fn bitor(self, rhs: Permission) -> Permissions {
        Permissions::from(self) | rhs
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("(empty)");
        }
        let names: Vec<&str> = self.iter().map(Permission::name).collect();
        f.write_str(&names.join("|"))
    }
}

impl fmt::Debug for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Permissions({})", self)
    }
}

impl Serialize for Permissions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_are_distinct_powers_of_two() {
        let bits: Vec<u32> = Permission::ALL.iter().map(|p| p.bit()).collect();
        assert_eq!(bits, vec![1, 2, 4]);
        assert_eq!(Permissions::all().bits(), 7);
    }

    #[test]
    fn union_of_tagged_permissions() {
        let editor = Permission::Registered | Permission::Editor;
        assert_eq!(editor, Permissions::REGISTERED | Permissions::EDITOR);
        assert!(editor.contains(Permission::Editor));
        assert!(!editor.contains(Permission::Administrator));
    }

    #[test]
    fn strict_subset_chain() {
        let user = Permissions::REGISTERED;
        let editor = user | Permission::Editor;
        let admin = editor | Permission::Administrator;

        assert!(user.is_strict_subset_of(editor));
        assert!(editor.is_strict_subset_of(admin));
        assert!(!admin.is_strict_subset_of(admin));
        assert!(!admin.is_strict_subset_of(user));
    }

    #[test]
    fn unknown_bits_are_truncated() {
        assert_eq!(
            Permissions::from_bits_truncate(0b1_0011),
            Permission::Registered | Permission::Editor
        );
        assert_eq!(Permissions::from_bits_truncate(-1), Permissions::all());
        assert!(Permissions::from_bits_truncate(0).is_empty());
    }

    #[test]
    fn display_lists_flag_names() {
        assert_eq!(Permissions::all().to_string(), "REGISTERED|EDITOR|ADMINISTRATOR");
        assert_eq!(Permissions::empty().to_string(), "(empty)");
    }

    #[test]
    fn serializes_as_name_list() {
        let value =
            serde_json::to_value(Permission::Registered | Permission::Administrator).unwrap();
        assert_eq!(value, serde_json::json!(["REGISTERED", "ADMINISTRATOR"]));
    }
}
