//! Wire images of `struct stat` and `struct statx` as the guest ABI lays
//! them out.
//!
//! We never let the compiler pick the layout.  Each field is written at a
//! fixed byte offset, in the guest's byte order, and every padding word is
//! left zero.  The offsets below are the contract; the tests pin them.

use crate::interface::Endianness;

/// Size of the guest `struct stat`.
pub const STAT_IMAGE_SIZE: usize = 128;
/// Size of the guest `struct statx`.
pub const STATX_IMAGE_SIZE: usize = 256;

// guest struct stat
pub const STAT_DEV: usize = 0;
pub const STAT_INO: usize = 8;
pub const STAT_MODE: usize = 16;
pub const STAT_NLINK: usize = 20;
pub const STAT_UID: usize = 24;
pub const STAT_GID: usize = 28;
pub const STAT_RDEV: usize = 32;
// 40: 8 bytes of padding
pub const STAT_SIZE: usize = 48;
pub const STAT_BLKSIZE: usize = 56;
// 60: 4 bytes of padding
pub const STAT_BLOCKS: usize = 64;
pub const STAT_ATIME: usize = 72;
// 80: 8 bytes of padding
pub const STAT_MTIME: usize = 88;
// 96: 8 bytes of padding
pub const STAT_CTIME: usize = 104;
// 112..128: padding and two unused words

// guest struct statx
pub const STATX_MASK: usize = 0;
pub const STATX_BLKSIZE: usize = 4;
pub const STATX_ATTRIBUTES: usize = 8;
pub const STATX_NLINK: usize = 16;
pub const STATX_UID: usize = 20;
pub const STATX_GID: usize = 24;
pub const STATX_MODE: usize = 28;
// 30: u16 spare
pub const STATX_INO: usize = 32;
pub const STATX_SIZE: usize = 40;
pub const STATX_BLOCKS: usize = 48;
pub const STATX_ATTRIBUTES_MASK: usize = 56;
pub const STATX_ATIME: usize = 64;
pub const STATX_BTIME: usize = 80;
pub const STATX_CTIME: usize = 96;
pub const STATX_MTIME: usize = 112;
pub const STATX_RDEV_MAJOR: usize = 128;
pub const STATX_RDEV_MINOR: usize = 132;
pub const STATX_DEV_MAJOR: usize = 136;
pub const STATX_DEV_MINOR: usize = 140;
pub const STATX_MNT_ID: usize = 144;
// 152..256: spare words

/// Size of one `statx_timestamp`: i64 seconds, u32 nanoseconds, i32 reserved.
pub const STATX_TIMESTAMP_SIZE: usize = 16;

/// Writes named fields into a fixed-size image in a given byte order.
struct ImageWriter<'a> {
    buf: &'a mut [u8],
    endianness: Endianness,
}

impl ImageWriter<'_> {
    fn put(&mut self, offset: usize, bytes: &[u8]) {
        self.buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn u16(&mut self, offset: usize, v: u16) {
        let bytes = self.endianness.u16_to_target(v);
        self.put(offset, &bytes);
    }

    fn u32(&mut self, offset: usize, v: u32) {
        let bytes = self.endianness.u32_to_target(v);
        self.put(offset, &bytes);
    }

    fn u64(&mut self, offset: usize, v: u64) {
        let bytes = self.endianness.u64_to_target(v);
        self.put(offset, &bytes);
    }

    fn i64(&mut self, offset: usize, v: i64) {
        let bytes = self.endianness.i64_to_target(v);
        self.put(offset, &bytes);
    }

    fn timestamp(&mut self, offset: usize, ts: StatxTimestamp) {
        self.i64(offset, ts.tv_sec);
        self.u32(offset + 8, ts.tv_nsec);
        // reserved word stays zero
    }
}

/// The subset of `struct stat` the guest sees, already narrowed to the
/// guest's field widths.
#[derive(Eq, PartialEq, Default, Debug, Clone, Copy)]
pub struct StatData {
    pub st_dev: u64,
    pub st_ino: u64,
    pub st_mode: u32,
    pub st_nlink: u32,
    pub st_uid: u32,
    pub st_gid: u32,
    pub st_rdev: u64,
    pub st_size: u64,
    pub st_blksize: u32,
    pub st_blocks: u64,
    // whole seconds only, the guest layout has no room for nanoseconds
    pub st_atime: u64,
    pub st_mtime: u64,
    pub st_ctime: u64,
}

impl StatData {
    pub fn from_libc(s: &libc::stat) -> Self {
        StatData {
            st_dev: s.st_dev as u64,
            st_ino: s.st_ino as u64,
            st_mode: s.st_mode as u32,
            st_nlink: s.st_nlink as u32,
            st_uid: s.st_uid,
            st_gid: s.st_gid,
            st_rdev: s.st_rdev as u64,
            st_size: s.st_size as u64,
            st_blksize: s.st_blksize as u32,
            st_blocks: s.st_blocks as u64,
            st_atime: s.st_atime as u64,
            st_mtime: s.st_mtime as u64,
            st_ctime: s.st_ctime as u64,
        }
    }

    pub fn encode(&self, endianness: Endianness) -> [u8; STAT_IMAGE_SIZE] {
        let mut image = [0u8; STAT_IMAGE_SIZE];
        let mut w = ImageWriter {
            buf: &mut image,
            endianness,
        };
        w.u64(STAT_DEV, self.st_dev);
        w.u64(STAT_INO, self.st_ino);
        w.u32(STAT_MODE, self.st_mode);
        w.u32(STAT_NLINK, self.st_nlink);
        w.u32(STAT_UID, self.st_uid);
        w.u32(STAT_GID, self.st_gid);
        w.u64(STAT_RDEV, self.st_rdev);
        w.u64(STAT_SIZE, self.st_size);
        w.u32(STAT_BLKSIZE, self.st_blksize);
        w.u64(STAT_BLOCKS, self.st_blocks);
        w.u64(STAT_ATIME, self.st_atime);
        w.u64(STAT_MTIME, self.st_mtime);
        w.u64(STAT_CTIME, self.st_ctime);
        image
    }
}

#[derive(Eq, PartialEq, Default, Debug, Clone, Copy)]
pub struct StatxTimestamp {
    pub tv_sec: i64,
    pub tv_nsec: u32,
}

/// Extended status, one field per guest `statx` member that carries data.
#[derive(Eq, PartialEq, Default, Debug, Clone, Copy)]
pub struct StatxData {
    pub stx_mask: u32,
    pub stx_blksize: u32,
    pub stx_attributes: u64,
    pub stx_nlink: u32,
    pub stx_uid: u32,
    pub stx_gid: u32,
    pub stx_mode: u16,
    pub stx_ino: u64,
    pub stx_size: u64,
    pub stx_blocks: u64,
    pub stx_attributes_mask: u64,
    pub stx_atime: StatxTimestamp,
    pub stx_btime: StatxTimestamp,
    pub stx_ctime: StatxTimestamp,
    pub stx_mtime: StatxTimestamp,
    pub stx_rdev_major: u32,
    pub stx_rdev_minor: u32,
    pub stx_dev_major: u32,
    pub stx_dev_minor: u32,
    pub stx_mnt_id: u64,
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
impl StatxData {
    pub fn from_libc(s: &libc::statx) -> Self {
        fn ts(t: &libc::statx_timestamp) -> StatxTimestamp {
            StatxTimestamp {
                tv_sec: t.tv_sec,
                tv_nsec: t.tv_nsec,
            }
        }
        StatxData {
            stx_mask: s.stx_mask,
            stx_blksize: s.stx_blksize,
            stx_attributes: s.stx_attributes,
            stx_nlink: s.stx_nlink,
            stx_uid: s.stx_uid,
            stx_gid: s.stx_gid,
            stx_mode: s.stx_mode,
            stx_ino: s.stx_ino,
            stx_size: s.stx_size,
            stx_blocks: s.stx_blocks,
            stx_attributes_mask: s.stx_attributes_mask,
            stx_atime: ts(&s.stx_atime),
            stx_btime: ts(&s.stx_btime),
            stx_ctime: ts(&s.stx_ctime),
            stx_mtime: ts(&s.stx_mtime),
            stx_rdev_major: s.stx_rdev_major,
            stx_rdev_minor: s.stx_rdev_minor,
            stx_dev_major: s.stx_dev_major,
            stx_dev_minor: s.stx_dev_minor,
            stx_mnt_id: s.stx_mnt_id,
        }
    }
}

impl StatxData {
    pub fn encode(&self, endianness: Endianness) -> [u8; STATX_IMAGE_SIZE] {
        let mut image = [0u8; STATX_IMAGE_SIZE];
        let mut w = ImageWriter {
            buf: &mut image,
            endianness,
        };
        w.u32(STATX_MASK, self.stx_mask);
        w.u32(STATX_BLKSIZE, self.stx_blksize);
        w.u64(STATX_ATTRIBUTES, self.stx_attributes);
        w.u32(STATX_NLINK, self.stx_nlink);
        w.u32(STATX_UID, self.stx_uid);
        w.u32(STATX_GID, self.stx_gid);
        w.u16(STATX_MODE, self.stx_mode);
        w.u64(STATX_INO, self.stx_ino);
        w.u64(STATX_SIZE, self.stx_size);
        w.u64(STATX_BLOCKS, self.stx_blocks);
        w.u64(STATX_ATTRIBUTES_MASK, self.stx_attributes_mask);
        w.timestamp(STATX_ATIME, self.stx_atime);
        w.timestamp(STATX_BTIME, self.stx_btime);
        w.timestamp(STATX_CTIME, self.stx_ctime);
        w.timestamp(STATX_MTIME, self.stx_mtime);
        w.u32(STATX_RDEV_MAJOR, self.stx_rdev_major);
        w.u32(STATX_RDEV_MINOR, self.stx_rdev_minor);
        w.u32(STATX_DEV_MAJOR, self.stx_dev_major);
        w.u32(STATX_DEV_MINOR, self.stx_dev_minor);
        w.u64(STATX_MNT_ID, self.stx_mnt_id);
        image
    }
}
