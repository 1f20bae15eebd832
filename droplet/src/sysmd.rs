//! System metadata record (spec.md §3): fixed, typed per-object
//! attributes, as opposed to the free-form user metadata dictionary.
//! Every optional field is only meaningful when its bit is set in
//! `mask`, mirroring the original's `dpl_sysmd_t` + `dpl_sysmd_mask_t`.

use bitflags::bitflags;

bitflags! {
    /// Which fields of a [`SysMetadata`] are present. Reading a field
    /// whose bit is unset is a logic error in the caller, not UB, since
    /// every field still has a default value — but callers must check
    /// the mask first (spec.md §9: "absent fields are never read").
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SysMdMask: u32 {
        const SIZE               = 1 << 0;
        const ATIME              = 1 << 1;
        const MTIME               = 1 << 2;
        const CTIME               = 1 << 3;
        const OWNER               = 1 << 4;
        const GROUP               = 1 << 5;
        const FTYPE               = 1 << 6;
        const ID                  = 1 << 7;
        const PARENT_ID           = 1 << 8;
        const ENTERPRISE_NUMBER   = 1 << 9;
        const ETAG                = 1 << 10;
        const VERSION             = 1 << 11;
        const LOCATION_CONSTRAINT = 1 << 12;
        const CANNED_ACL          = 1 << 13;
        const STORAGE_CLASS       = 1 << 14;
        const ACL                 = 1 << 15;
    }
}

/// Object type, mirroring CDMI's object-type enumeration plus the POSIX
/// file types the original's `dpl_ftype_t` adds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    Capability,
    Domain,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
    Symlink,
    Any,
    Undefined,
}

/// Canned ACL, as accepted by S3's `x-amz-acl` and mapped onto CDMI's
/// ACE array (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CannedAcl {
    Private,
    PublicRead,
    PublicReadWrite,
    AuthenticatedRead,
    BucketOwnerRead,
    BucketOwnerFullControl,
}

impl CannedAcl {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CannedAcl::Private => "private",
            CannedAcl::PublicRead => "public-read",
            CannedAcl::PublicReadWrite => "public-read-write",
            CannedAcl::AuthenticatedRead => "authenticated-read",
            CannedAcl::BucketOwnerRead => "bucket-owner-read",
            CannedAcl::BucketOwnerFullControl => "bucket-owner-full-control",
        }
    }
}

/// A single CDMI-style access control entry: `{identifier, acetype,
/// aceflags, acemask}` (spec.md §4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ace {
    pub identifier: String,
    pub acetype: u32,
    pub aceflags: u32,
    pub acemask: u32,
}

/// The fixed, typed system metadata record. Fields are only meaningful
/// when their corresponding [`SysMdMask`] bit is set.
#[derive(Debug, Clone, Default)]
pub struct SysMetadata {
    pub mask: SysMdMaskBits,
    pub size: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub owner: String,
    pub group: String,
    pub ftype: Option<FileType>,
    pub id: String,
    pub parent_id: String,
    pub enterprise_number: u32,
    pub etag: String,
    pub version: String,
    pub location_constraint: String,
    pub canned_acl: Option<CannedAcl>,
    pub storage_class: String,
    pub acl: Vec<Ace>,
}

/// Newtype so `SysMetadata` can `#[derive(Default)]` (`SysMdMask`'s
/// bitflags type does implement `Default` as empty, but naming it here
/// keeps the field self-documenting).
pub type SysMdMaskBits = SysMdMask;

impl SysMetadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn has(&self, bit: SysMdMask) -> bool {
        self.mask.contains(bit)
    }

    pub fn set_size(&mut self, size: u64) -> &mut Self {
        self.size = size;
        self.mask |= SysMdMask::SIZE;
        self
    }

    pub fn set_etag(&mut self, etag: impl Into<String>) -> &mut Self {
        self.etag = etag.into();
        self.mask |= SysMdMask::ETAG;
        self
    }

    pub fn set_mtime(&mut self, mtime: i64) -> &mut Self {
        self.mtime = mtime;
        self.mask |= SysMdMask::MTIME;
        self
    }

    pub fn set_atime(&mut self, atime: i64) -> &mut Self {
        self.atime = atime;
        self.mask |= SysMdMask::ATIME;
        self
    }

    pub fn set_ftype(&mut self, ftype: FileType) -> &mut Self {
        self.ftype = Some(ftype);
        self.mask |= SysMdMask::FTYPE;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_fields_report_absent() {
        let sysmd = SysMetadata::new();
        assert!(!sysmd.has(SysMdMask::SIZE));
    }

    #[test]
    fn setter_marks_mask_bit() {
        let mut sysmd = SysMetadata::new();
        sysmd.set_size(1024);
        assert!(sysmd.has(SysMdMask::SIZE));
        assert_eq!(sysmd.size, 1024);
        assert!(!sysmd.has(SysMdMask::ETAG));
    }
}
