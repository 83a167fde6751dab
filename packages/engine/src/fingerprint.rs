//! Content fingerprints that match the tags S3 assigns to single-part
//! uploads (hex MD5 of the body).
//!
//! Multipart uploads get `<md5-of-part-digests>-<parts>` tags instead,
//! which never equal a plain digest. The engine only ever writes
//! single-part objects, so such a tag is simply treated as "changed".

use std::io::Read;
use std::path::Path;

/// Read buffer size used while hashing.
const CHUNK_SIZE: usize = 256 * 1024;

/// Hex MD5 of an in-memory body.
#[must_use]
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

/// Hex MD5 of everything `reader` yields, read in fixed-size chunks.
///
/// # Errors
///
/// Propagates read failures.
pub fn fingerprint_reader<R: Read>(mut reader: R) -> Result<String, std::io::Error> {
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        context.consume(&buffer[..n]);
    }
    Ok(format!("{:x}", context.finalize()))
}

/// Hex MD5 of a local file, streamed on a blocking thread.
///
/// # Errors
///
/// Returns the I/O error if the file cannot be opened or read.
pub async fn fingerprint_file(path: &Path) -> Result<String, std::io::Error> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || fingerprint_reader(std::fs::File::open(path)?))
        .await
        .map_err(std::io::Error::other)?
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn matches_known_digest() {
        assert_eq!(fingerprint_bytes(b"hi"), "49f68a5c8493ec2c0bf489821c21fc3b");
    }

    #[test]
    fn reader_agrees_with_in_memory_digest_across_chunks() {
        let data: Vec<u8> = (0..CHUNK_SIZE * 2 + 17).map(|i| u8::try_from(i % 251).unwrap()).collect();
        assert_eq!(
            fingerprint_reader(Cursor::new(&data)).unwrap(),
            fingerprint_bytes(&data)
        );
    }

    #[test]
    fn single_byte_change_changes_fingerprint() {
        let original = b"hello world".to_vec();
        let mut changed = original.clone();
        changed[4] = b'0';
        assert_ne!(fingerprint_bytes(&original), fingerprint_bytes(&changed));
        assert_eq!(fingerprint_bytes(&original), fingerprint_bytes(b"hello world"));
    }

    #[tokio::test]
    async fn hashes_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.html");
        std::fs::write(&path, "hello").unwrap();
        assert_eq!(
            fingerprint_file(&path).await.unwrap(),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(fingerprint_file(&dir.path().join("missing")).await.is_err());
    }
}
