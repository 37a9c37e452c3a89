//! Compressed sources decode to the same bytes as the plain file.

use anyhow::Result;
use bulkload::open_record_source;
use std::io::Read;
use std::path::Path;
use tempfile::TempDir;

const BODY: &str = "id,name\n1,Ann\n2,\"Bo, Jr\"\n";

fn read_all(path: &Path) -> Result<String> {
    let mut out = String::new();
    open_record_source(path)?.read_to_string(&mut out)?;
    Ok(out)
}

#[test]
fn plain_files_pass_through() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("plain.csv");
    std::fs::write(&path, BODY)?;
    assert_eq!(read_all(&path)?, BODY);
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    assert!(open_record_source("/no/such/file.csv").is_err());
}

#[cfg(feature = "compression-gzip")]
mod gzip {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(bytes)?;
        Ok(enc.finish()?)
    }

    #[test]
    fn gzip_by_extension() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("data.csv.gz");
        std::fs::write(&path, gzip(BODY.as_bytes())?)?;
        assert_eq!(read_all(&path)?, BODY);
        Ok(())
    }

    #[test]
    fn gzip_by_magic_bytes() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("misnamed.csv");
        std::fs::write(&path, gzip(BODY.as_bytes())?)?;
        assert_eq!(read_all(&path)?, BODY);
        Ok(())
    }

    #[test]
    fn concatenated_members_are_read_in_full() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("appended.jsonl.gz");
        let mut bytes = gzip(b"{\"a\":1}\n")?;
        bytes.extend(gzip(b"{\"a\":2}\n")?);
        std::fs::write(&path, bytes)?;
        assert_eq!(read_all(&path)?, "{\"a\":1}\n{\"a\":2}\n");
        Ok(())
    }
}

#[cfg(feature = "compression-zstd")]
#[test]
fn zstd_by_extension() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("data.csv.zst");
    std::fs::write(&path, zstd::stream::encode_all(BODY.as_bytes(), 3)?)?;
    assert_eq!(read_all(&path)?, BODY);
    Ok(())
}

#[cfg(feature = "compression-bzip2")]
#[test]
fn bzip2_by_extension() -> Result<()> {
    use std::io::Write;
    let dir = TempDir::new()?;
    let path = dir.path().join("data.csv.bz2");
    let mut enc = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    enc.write_all(BODY.as_bytes())?;
    std::fs::write(&path, enc.finish()?)?;
    assert_eq!(read_all(&path)?, BODY);
    Ok(())
}

#[cfg(feature = "compression-xz")]
#[test]
fn xz_by_extension() -> Result<()> {
    use std::io::Write;
    let dir = TempDir::new()?;
    let path = dir.path().join("data.csv.xz");
    let mut enc = xz2::write::XzEncoder::new(Vec::new(), 6);
    enc.write_all(BODY.as_bytes())?;
    std::fs::write(&path, enc.finish()?)?;
    assert_eq!(read_all(&path)?, BODY);
    Ok(())
}
