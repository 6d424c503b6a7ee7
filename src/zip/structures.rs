use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use std::io::Cursor;

use crate::error::{ArchiveError, Result};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// General purpose flag bit 11: file name is UTF-8.
pub const FLAG_UTF8: u16 = 1 << 11;

/// "Version made by" for Unix hosts, APPNOTE 2.0.
pub const VERSION_MADE_BY_UNIX: u16 = (3 << 8) | 20;
pub const VERSION_NEEDED: u16 = 20;

/// External attributes: Unix mode in the high word, MS-DOS directory bit in the low byte.
pub const EXTERNAL_ATTR_FILE: u32 = 0o100644 << 16;
pub const EXTERNAL_ATTR_DIR: u32 = (0o040755 << 16) | 0x10;

/// End of Central Directory (EOCD) - 22 bytes minimum
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(ArchiveError::not_an_archive("invalid end of central directory"));
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    /// Single-disk EOCD with no comment.
    pub fn to_bytes(&self) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(Self::SIGNATURE);
        buf.write_u16::<LittleEndian>(self.disk_number)?;
        buf.write_u16::<LittleEndian>(self.disk_with_cd)?;
        buf.write_u16::<LittleEndian>(self.disk_entries)?;
        buf.write_u16::<LittleEndian>(self.total_entries)?;
        buf.write_u32::<LittleEndian>(self.cd_size)?;
        buf.write_u32::<LittleEndian>(self.cd_offset)?;
        buf.write_u16::<LittleEndian>(self.comment_len)?;
        Ok(buf)
    }

    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFFFFFF
            || self.cd_offset == 0xFFFFFFFF
    }

    pub fn is_multi_disk(&self) -> bool {
        self.disk_number != 0 || self.disk_with_cd != 0
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(ArchiveError::not_an_archive("invalid ZIP64 locator"));
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_with_eocd64: cursor.read_u32::<LittleEndian>()?,
            eocd64_offset: cursor.read_u64::<LittleEndian>()?,
            total_disks: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
pub struct Zip64EOCD {
    pub eocd64_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(ArchiveError::not_an_archive("invalid ZIP64 end of central directory"));
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            eocd64_size: cursor.read_u64::<LittleEndian>()?,
            version_made_by: cursor.read_u16::<LittleEndian>()?,
            version_needed: cursor.read_u16::<LittleEndian>()?,
            disk_number: cursor.read_u32::<LittleEndian>()?,
            disk_with_cd: cursor.read_u32::<LittleEndian>()?,
            disk_entries: cursor.read_u64::<LittleEndian>()?,
            total_entries: cursor.read_u64::<LittleEndian>()?,
            cd_size: cursor.read_u64::<LittleEndian>()?,
            cd_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// Header fields shared by the local and central records of one member.
#[derive(Debug, Clone)]
pub struct MemberHeader {
    pub file_name: String,
    pub compression_method: CompressionMethod,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub modified: DosDateTime,
    pub is_directory: bool,
}

impl MemberHeader {
    pub fn local_header(&self) -> std::io::Result<Vec<u8>> {
        let name = self.file_name.as_bytes();
        let mut buf = Vec::with_capacity(LFH_SIZE + name.len());
        buf.extend_from_slice(LFH_SIGNATURE);
        buf.write_u16::<LittleEndian>(VERSION_NEEDED)?;
        buf.write_u16::<LittleEndian>(FLAG_UTF8)?;
        self.write_common(&mut buf)?;
        buf.write_u16::<LittleEndian>(0)?; // extra field length
        buf.extend_from_slice(name);
        Ok(buf)
    }

    pub fn central_header(&self, lfh_offset: u32) -> std::io::Result<Vec<u8>> {
        let name = self.file_name.as_bytes();
        let external_attrs = if self.is_directory {
            EXTERNAL_ATTR_DIR
        } else {
            EXTERNAL_ATTR_FILE
        };
        let mut buf = Vec::with_capacity(CDFH_MIN_SIZE + name.len());
        buf.extend_from_slice(CDFH_SIGNATURE);
        buf.write_u16::<LittleEndian>(VERSION_MADE_BY_UNIX)?;
        buf.write_u16::<LittleEndian>(VERSION_NEEDED)?;
        buf.write_u16::<LittleEndian>(FLAG_UTF8)?;
        self.write_common(&mut buf)?;
        buf.write_u16::<LittleEndian>(0)?; // extra field length
        buf.write_u16::<LittleEndian>(0)?; // comment length
        buf.write_u16::<LittleEndian>(0)?; // disk number start
        buf.write_u16::<LittleEndian>(0)?; // internal attributes
        buf.write_u32::<LittleEndian>(external_attrs)?;
        buf.write_u32::<LittleEndian>(lfh_offset)?;
        buf.extend_from_slice(name);
        Ok(buf)
    }

    /// Method through name length: the run of fields both headers share.
    fn write_common(&self, buf: &mut Vec<u8>) -> std::io::Result<()> {
        buf.write_u16::<LittleEndian>(self.compression_method.as_u16())?;
        buf.write_u16::<LittleEndian>(self.modified.time)?;
        buf.write_u16::<LittleEndian>(self.modified.date)?;
        buf.write_u32::<LittleEndian>(self.crc32)?;
        buf.write_u32::<LittleEndian>(self.compressed_size)?;
        buf.write_u32::<LittleEndian>(self.uncompressed_size)?;
        buf.write_u16::<LittleEndian>(self.file_name.len() as u16)
    }
}

/// MS-DOS packed date and time, as stored in ZIP headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosDateTime {
    pub time: u16,
    pub date: u16,
}

impl DosDateTime {
    /// 1980-01-01 00:00:00, the earliest representable instant.
    pub const EPOCH: DosDateTime = DosDateTime {
        time: 0,
        date: (1 << 5) | 1,
    };

    /// Pack a timestamp, clamping to the 1980..=2107 range DOS can express.
    /// Seconds are truncated to an even value.
    pub fn from_naive(ts: NaiveDateTime) -> Self {
        if ts.year() < 1980 {
            return Self::EPOCH;
        }
        if ts.year() > 2107 {
            return DosDateTime {
                time: (23 << 11) | (59 << 5) | 29,
                date: (127 << 9) | (12 << 5) | 31,
            };
        }
        let date = (((ts.year() - 1980) as u16) << 9) | ((ts.month() as u16) << 5) | ts.day() as u16;
        let time = ((ts.hour() as u16) << 11) | ((ts.minute() as u16) << 5) | (ts.second() as u16 / 2);
        DosDateTime { time, date }
    }

    /// Parse modification date to (year, month, day)
    pub fn date_parts(&self) -> (u16, u8, u8) {
        let day = (self.date & 0x1F) as u8;
        let month = ((self.date >> 5) & 0x0F) as u8;
        let year = ((self.date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn time_parts(&self) -> (u8, u8, u8) {
        let second = ((self.time & 0x1F) * 2) as u8;
        let minute = ((self.time >> 5) & 0x3F) as u8;
        let hour = ((self.time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }

    /// Unpack into a calendar timestamp. Out-of-range fields written by
    /// sloppy archivers fall back to the DOS epoch.
    pub fn to_naive(&self) -> NaiveDateTime {
        let (year, month, day) = self.date_parts();
        let (hour, minute, second) = self.time_parts();
        NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
            .and_then(|d| d.and_hms_opt(hour as u32, minute as u32, second as u32))
            .unwrap_or_else(dos_epoch)
    }
}

fn dos_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1980, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Parsed ZIP file entry information
#[derive(Debug, Clone)]
pub struct ZipFileEntry {
    pub file_name: String,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub lfh_offset: u64,
    pub last_modified: DosDateTime,
    pub is_directory: bool,
}

impl ZipFileEntry {
    /// Encrypted members set bit 0 of the general purpose flags.
    pub fn is_encrypted(&self) -> bool {
        self.flags & 0x1 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn dos_time_keeps_even_seconds() {
        let packed = DosDateTime::from_naive(ts(2024, 5, 17, 13, 45, 31));
        assert_eq!(packed.date_parts(), (2024, 5, 17));
        assert_eq!(packed.time_parts(), (13, 45, 30));
        assert_eq!(packed.to_naive(), ts(2024, 5, 17, 13, 45, 30));
    }

    #[test]
    fn dos_time_clamps_before_1980() {
        assert_eq!(DosDateTime::from_naive(ts(1970, 1, 1, 0, 0, 0)), DosDateTime::EPOCH);
        assert_eq!(DosDateTime::EPOCH.to_naive(), ts(1980, 1, 1, 0, 0, 0));
    }

    #[test]
    fn zeroed_dos_date_falls_back_to_epoch() {
        let zero = DosDateTime { time: 0, date: 0 };
        assert_eq!(zero.to_naive(), ts(1980, 1, 1, 0, 0, 0));
    }

    #[test]
    fn eocd_bytes_parse_back() {
        let eocd = EndOfCentralDirectory {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: 3,
            total_entries: 3,
            cd_size: 150,
            cd_offset: 4096,
            comment_len: 0,
        };
        let bytes = eocd.to_bytes().unwrap();
        assert_eq!(bytes.len(), EndOfCentralDirectory::SIZE);
        let parsed = EndOfCentralDirectory::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.total_entries, 3);
        assert_eq!(parsed.cd_offset, 4096);
        assert!(!parsed.is_zip64());
    }

    #[test]
    fn local_header_layout() {
        let header = MemberHeader {
            file_name: "docs/a.txt".into(),
            compression_method: CompressionMethod::Deflate,
            crc32: 0xDEADBEEF,
            compressed_size: 7,
            uncompressed_size: 5,
            modified: DosDateTime::EPOCH,
            is_directory: false,
        };
        let lfh = header.local_header().unwrap();
        assert_eq!(&lfh[0..4], LFH_SIGNATURE);
        assert_eq!(lfh.len(), LFH_SIZE + "docs/a.txt".len());
        assert_eq!(u16::from_le_bytes([lfh[26], lfh[27]]), 10);
        assert_eq!(&lfh[LFH_SIZE..], b"docs/a.txt");

        let cdfh = header.central_header(1234).unwrap();
        assert_eq!(cdfh.len(), CDFH_MIN_SIZE + 10);
        assert_eq!(u32::from_le_bytes([cdfh[42], cdfh[43], cdfh[44], cdfh[45]]), 1234);
    }
}
