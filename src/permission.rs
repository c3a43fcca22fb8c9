//! Owner / other permission checks.

use crate::structs::{Inode, InodeId, Permission, Uid};
use crate::{BlockDevice, Error, FileSystem, Result};

/// True iff every bit of `requested` is granted to `uid`.
///
/// The owner is checked against the owner triplet, everyone else against the
/// other triplet. The group triplet is never consulted, and the superuser is
/// not special here.
pub fn has_permission(inode: &Inode, uid: Uid, requested: Permission) -> bool {
    let granted = if uid == inode.owner_uid {
        inode.mode.owner()
    } else {
        inode.mode.other()
    };
    granted.contains(requested)
}

impl<D: BlockDevice> FileSystem<D> {
    /// The single enforcement point: the superuser always passes, everyone
    /// else goes through `has_permission`.
    pub fn authorize(&self, id: InodeId, uid: Uid, requested: Permission) -> Result<()> {
        if uid.is_superuser() || has_permission(self.inode(id)?, uid, requested) {
            Ok(())
        } else {
            Err(Error::PermissionDenied)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::structs::Mode;

    fn owned_by(uid: u32, mode: Mode) -> Inode {
        let mut inode = Inode::EMPTY;
        inode.owner_uid = Uid(uid);
        inode.mode = mode;
        inode
    }

    #[test]
    fn test_owner_uses_owner_triplet() {
        let inode = owned_by(1000, Mode::new(Permission::RW, Permission::empty(), Permission::empty()));
        assert!(has_permission(&inode, Uid(1000), Permission::READ));
        assert!(has_permission(&inode, Uid(1000), Permission::RW));
        assert!(!has_permission(&inode, Uid(1000), Permission::EXEC));
        assert!(!has_permission(&inode, Uid(1001), Permission::READ));
    }

    #[test]
    fn test_other_uses_other_triplet() {
        let inode = owned_by(1000, Mode::new(Permission::empty(), Permission::empty(), Permission::RX));
        assert!(!has_permission(&inode, Uid(1000), Permission::READ));
        assert!(has_permission(&inode, Uid(7), Permission::RX));
        assert!(!has_permission(&inode, Uid(7), Permission::WRITE));
    }

    #[test]
    fn test_group_bits_are_ignored() {
        let inode = owned_by(1000, Mode::new(Permission::empty(), Permission::RWX, Permission::empty()));
        assert!(!has_permission(&inode, Uid(1000), Permission::READ));
        assert!(!has_permission(&inode, Uid(2000), Permission::READ));
    }

    #[test]
    fn test_every_requested_bit_is_required() {
        let inode = owned_by(1, Mode::new(Permission::READ, Permission::empty(), Permission::empty()));
        assert!(!has_permission(&inode, Uid(1), Permission::RW));
        assert!(has_permission(&inode, Uid(1), Permission::empty()));
    }

    #[test]
    fn test_gate_does_not_special_case_root() {
        let inode = owned_by(1000, Mode::NONE);
        assert!(!has_permission(&inode, Uid::ROOT, Permission::READ));
    }
}
