//! Authorization checks gating the certificate store.

pub use crate::error::Permission;
use crate::error::{Result, TrustError};

/// Answers whether the current caller may read or manage certificates.
pub trait PermissionChecker: Send + Sync {
    /// Whether `permission` is granted.
    fn is_permitted(&self, permission: Permission) -> bool;

    fn is_read_allowed(&self) -> bool {
        self.is_permitted(Permission::Read)
    }

    /// Managing certificates needs both read and write.
    fn is_write_allowed(&self) -> bool {
        self.is_permitted(Permission::Read) && self.is_permitted(Permission::Write)
    }

    fn check_read(&self) -> Result<()> {
        if self.is_read_allowed() {
            Ok(())
        } else {
            Err(TrustError::Unauthorized {
                permission: Permission::Read,
            })
        }
    }

    fn check_write(&self) -> Result<()> {
        if self.is_write_allowed() {
            Ok(())
        } else {
            Err(TrustError::Unauthorized {
                permission: Permission::Write,
            })
        }
    }
}

/// Fixed grants, decided once when the context is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaticPermissions {
    read: bool,
    write: bool,
}

impl StaticPermissions {
    pub const fn denied() -> Self {
        Self {
            read: false,
            write: false,
        }
    }

    pub const fn read_only() -> Self {
        Self {
            read: true,
            write: false,
        }
    }

    pub const fn read_write() -> Self {
        Self {
            read: true,
            write: true,
        }
    }
}

impl PermissionChecker for StaticPermissions {
    fn is_permitted(&self, permission: Permission) -> bool {
        match permission {
            Permission::Read => self.read,
            Permission::Write => self.write,
        }
    }
}
