//! Chunked file upload and download state.
//!
//! A [`FileTransfer`] only tracks progress: the caller moves one chunk at a
//! time and calls [`FileTransfer::bump_part`] after each. Uploads of small
//! files fold every chunk into a running MD5, which is finalized (and the
//! hasher dropped) when the last chunk goes through. Big files (over
//! [`BIG_FILE_THRESHOLD`]) are announced without a checksum.

use md5::{Digest, Md5};
use teleproto_tl_types::{self as tl, Serializable, enums, functions, types};

use crate::errors::TransferError;

/// Chunk size used unless the caller picks another.
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;
/// Largest chunk the server accepts.
pub const MAX_CHUNK_SIZE: usize = 512 * 1024;
/// Uploads larger than this use `upload.saveBigFilePart`.
pub const BIG_FILE_THRESHOLD: u64 = 10 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferKind {
    Upload,
    Download,
}

#[derive(Clone, Debug, PartialEq)]
enum Target {
    Upload { file_id: i64, name: String },
    Download { location: enums::InputFileLocation },
}

/// The upload checksum. `Running` is consumed into `Finished` exactly once.
#[derive(Clone)]
enum Checksum {
    Running(Md5),
    Finished([u8; 16]),
    NotRequired,
}

/// One `upload.saveFilePart` or `upload.saveBigFilePart` call.
#[derive(Clone, Debug, PartialEq)]
pub enum UploadPart {
    Small(functions::upload::SaveFilePart),
    Big(functions::upload::SaveBigFilePart),
}

impl Serializable for UploadPart {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        match self {
            Self::Small(req) => req.serialize(buf),
            Self::Big(req) => req.serialize(buf),
        }
    }
}

impl tl::RemoteCall for UploadPart {
    type Return = bool;
}

/// Progress of one chunked upload or download.
#[derive(Clone)]
pub struct FileTransfer {
    kind: TransferKind,
    dc_id: i32,
    target: Target,
    size: u64,
    offset: u64,
    part: i32,
    chunk_size: usize,
    checksum: Checksum,
}

impl FileTransfer {
    /// An upload of `size` bytes under a caller-chosen random `file_id`.
    pub fn upload(dc_id: i32, file_id: i64, name: impl Into<String>, size: u64) -> Self {
        let checksum = match size {
            0 => Checksum::Finished(Md5::new().finalize().into()),
            s if s > BIG_FILE_THRESHOLD => Checksum::NotRequired,
            _ => Checksum::Running(Md5::new()),
        };
        Self {
            kind: TransferKind::Upload,
            dc_id,
            target: Target::Upload { file_id, name: name.into() },
            size,
            offset: 0,
            part: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            checksum,
        }
    }

    /// A download of `size` bytes from `location`.
    pub fn download(dc_id: i32, location: enums::InputFileLocation, size: u64) -> Self {
        Self {
            kind: TransferKind::Download,
            dc_id,
            target: Target::Download { location },
            size,
            offset: 0,
            part: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            checksum: Checksum::NotRequired,
        }
    }

    /// Overrides the chunk size; it must be a positive multiple of 1024 no
    /// larger than [`MAX_CHUNK_SIZE`].
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Result<Self, TransferError> {
        if chunk_size == 0 || chunk_size % 1024 != 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(TransferError::InvalidChunkSize { size: chunk_size });
        }
        if self.offset != 0 {
            return Err(TransferError::InvalidChunkSize { size: chunk_size });
        }
        self.chunk_size = chunk_size;
        Ok(self)
    }

    pub fn kind(&self) -> TransferKind {
        self.kind
    }

    pub fn dc_id(&self) -> i32 {
        self.dc_id
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Index of the next chunk.
    pub fn part(&self) -> i32 {
        self.part
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn is_big(&self) -> bool {
        self.size > BIG_FILE_THRESHOLD
    }

    pub fn is_finished(&self) -> bool {
        self.offset >= self.size
    }

    pub fn total_parts(&self) -> i32 {
        self.size.div_ceil(self.chunk_size as u64) as i32
    }

    /// Length of the chunk at the current offset.
    pub fn expected_chunk_len(&self) -> usize {
        (self.size - self.offset.min(self.size)).min(self.chunk_size as u64) as usize
    }

    /// Records that `chunk` went through and moves to the next part.
    pub fn bump_part(&mut self, chunk: &[u8]) -> Result<(), TransferError> {
        if self.is_finished() {
            return Err(TransferError::Finished);
        }
        let expected = self.expected_chunk_len();
        if chunk.len() != expected {
            return Err(TransferError::UnexpectedChunk { expected, got: chunk.len() });
        }
        if let Checksum::Running(hasher) = &mut self.checksum {
            hasher.update(chunk);
        }
        self.offset = (self.offset + self.chunk_size as u64).min(self.size);
        self.part += 1;

        if self.is_finished() {
            self.checksum = match std::mem::replace(&mut self.checksum, Checksum::NotRequired) {
                Checksum::Running(hasher) => Checksum::Finished(hasher.finalize().into()),
                other => other,
            };
        }
        Ok(())
    }

    /// The MD5 of everything uploaded, once the last chunk went through.
    pub fn md5(&self) -> Option<[u8; 16]> {
        match self.checksum {
            Checksum::Finished(digest) => Some(digest),
            _ => None,
        }
    }

    /// The request that uploads `chunk` as the current part.
    pub fn upload_request(&self, chunk: Vec<u8>) -> Result<UploadPart, TransferError> {
        let Target::Upload { file_id, .. } = self.target else {
            return Err(TransferError::WrongDirection);
        };
        if self.is_finished() {
            return Err(TransferError::Finished);
        }
        Ok(if self.is_big() {
            UploadPart::Big(functions::upload::SaveBigFilePart {
                file_id,
                file_part: self.part,
                file_total_parts: self.total_parts(),
                bytes: chunk,
            })
        } else {
            UploadPart::Small(functions::upload::SaveFilePart { file_id, file_part: self.part, bytes: chunk })
        })
    }

    /// The request that fetches the chunk at the current offset.
    pub fn download_request(&self) -> Result<functions::upload::GetFile, TransferError> {
        let Target::Download { location } = &self.target else {
            return Err(TransferError::WrongDirection);
        };
        if self.is_finished() {
            return Err(TransferError::Finished);
        }
        Ok(functions::upload::GetFile {
            location: location.clone(),
            offset: self.offset as i32,
            limit: self.chunk_size as i32,
        })
    }

    /// The finished upload as an `InputFile`.
    pub fn input_file(&self) -> Result<enums::InputFile, TransferError> {
        let Target::Upload { file_id, name } = &self.target else {
            return Err(TransferError::WrongDirection);
        };
        if !self.is_finished() {
            return Err(TransferError::UnexpectedChunk { expected: self.expected_chunk_len(), got: 0 });
        }
        Ok(match self.checksum {
            Checksum::Finished(digest) => enums::InputFile::InputFile(types::InputFile {
                id: *file_id,
                parts: self.total_parts(),
                name: name.clone(),
                md5_checksum: hex(&digest),
            }),
            _ => enums::InputFile::Big(types::InputFileBig { id: *file_id, parts: self.total_parts(), name: name.clone() }),
        })
    }
}

/// Lower-case hex, as `InputFile.md5_checksum` expects.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_must_be_kib_multiple() {
        assert!(FileTransfer::upload(1, 1, "a", 10).with_chunk_size(1000).is_err());
        assert!(FileTransfer::upload(1, 1, "a", 10).with_chunk_size(0).is_err());
        assert!(FileTransfer::upload(1, 1, "a", 10).with_chunk_size(MAX_CHUNK_SIZE + 1024).is_err());
        assert_eq!(FileTransfer::upload(1, 1, "a", 10).with_chunk_size(2048).unwrap().chunk_size(), 2048);
    }

    #[test]
    fn small_upload_carries_md5() {
        let data: Vec<u8> = (0..2500u32).map(|i| i as u8).collect();
        let mut t = FileTransfer::upload(1, 77, "data.bin", data.len() as u64).with_chunk_size(1024).unwrap();
        assert_eq!(t.total_parts(), 3);

        for chunk in data.chunks(1024) {
            let UploadPart::Small(req) = t.upload_request(chunk.to_vec()).unwrap() else {
                panic!("small file used the big-file call");
            };
            assert_eq!(req.file_part, t.part());
            t.bump_part(chunk).unwrap();
        }
        assert!(t.is_finished());
        assert_eq!(t.offset(), 2500);

        let expected: [u8; 16] = Md5::digest(&data).into();
        assert_eq!(t.md5(), Some(expected));
        let enums::InputFile::InputFile(file) = t.input_file().unwrap() else {
            panic!("expected inputFile");
        };
        assert_eq!(file.parts, 3);
        assert_eq!(file.md5_checksum, hex(&expected));
        assert!(matches!(t.bump_part(&[]), Err(TransferError::Finished)));
    }

    #[test]
    fn empty_upload_is_a_small_file() {
        let t = FileTransfer::upload(1, 9, "empty.txt", 0);
        assert!(t.is_finished());
        assert!(!t.is_big());
        assert_eq!(t.md5().map(|d| hex(&d)).as_deref(), Some("d41d8cd98f00b204e9800998ecf8427e"));
        let enums::InputFile::InputFile(file) = t.input_file().unwrap() else {
            panic!("expected inputFile");
        };
        assert_eq!(file.parts, 0);
        assert_eq!(file.md5_checksum, "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn big_upload_skips_md5() {
        let mut t = FileTransfer::upload(1, 5, "big.bin", BIG_FILE_THRESHOLD + 1);
        assert!(t.is_big());
        assert_eq!(t.total_parts(), 21);
        let chunk = vec![0u8; DEFAULT_CHUNK_SIZE];
        assert!(matches!(t.upload_request(chunk.clone()).unwrap(), UploadPart::Big(_)));
        t.bump_part(&chunk).unwrap();
        assert_eq!(t.md5(), None);
    }

    #[test]
    fn wrong_chunk_length() {
        let mut t = FileTransfer::upload(1, 5, "x", 4096).with_chunk_size(2048).unwrap();
        assert!(matches!(t.bump_part(&[0; 100]), Err(TransferError::UnexpectedChunk { expected: 2048, got: 100 })));
    }

    #[test]
    fn download_offsets() {
        let location = enums::InputFileLocation::InputFileLocation(types::InputFileLocation {
            volume_id: 1,
            local_id: 2,
            secret: 3,
        });
        let mut t = FileTransfer::download(2, location, 3000).with_chunk_size(1024).unwrap();
        assert!(t.upload_request(vec![]).is_err());
        let mut offsets = Vec::new();
        while !t.is_finished() {
            let req = t.download_request().unwrap();
            offsets.push(req.offset);
            assert_eq!(req.limit, 1024);
            t.bump_part(&vec![0; t.expected_chunk_len()]).unwrap();
        }
        assert_eq!(offsets, [0, 1024, 2048]);
        assert!(t.download_request().is_err());
    }
}
