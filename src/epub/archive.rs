//! 容器读写模块
//!
//! 把EPUB容器解压到私有的临时目录，以及把目录树重新打包为符合规范的EPUB。

use crate::epub::error::{EpubError, Result};
use std::fs::{self, File};
use std::io::{self, BufReader, Seek, Write};
use std::path::Path;
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// mimetype文件名
pub const MIMETYPE_PATH: &str = "mimetype";

/// EPUB的mimetype内容
pub const MIMETYPE: &str = "application/epub+zip";

/// 解压EPUB容器
///
/// # 参数
/// * `container` - EPUB文件路径
///
/// # 返回值
/// * `Result<TempDir>` - 解压后的临时目录，离开作用域时自动删除
pub fn extract<P: AsRef<Path>>(container: P) -> Result<TempDir> {
    let path = container.as_ref();
    let file = File::open(path).map_err(|e| EpubError::file(path, e))?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;

    let workdir = tempfile::Builder::new().prefix("novfmt-").tempdir()?;
    archive.extract(workdir.path())?;

    debug!(
        container = %path.display(),
        entries = archive.len(),
        workdir = %workdir.path().display(),
        "解压EPUB"
    );
    Ok(workdir)
}

/// 把目录树打包为EPUB并原子地替换目标文件
///
/// 先写入目标目录中的临时文件，完整写出后再重命名到 `dest`。
/// 任何一步失败时临时文件都会被删除，已有的目标文件保持不变。
///
/// # 参数
/// * `root` - 要打包的目录
/// * `dest` - 输出的EPUB路径
/// * `compression_level` - deflate压缩级别
pub fn pack(root: &Path, dest: &Path, compression_level: Option<i64>) -> Result<()> {
    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| EpubError::file(parent, e))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".novfmt-")
        .suffix(".epub")
        .tempfile_in(parent)
        .map_err(|e| EpubError::file(parent, e))?;

    let entries = write_zip(root, tmp.as_file_mut(), compression_level)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| EpubError::file(dest, e.error))?;

    debug!(dest = %dest.display(), entries, "打包EPUB");
    Ok(())
}

/// 按EPUB规范写出zip：mimetype必须是第一个条目且不压缩，其余文件使用deflate
///
/// 返回写出的条目数。
pub fn write_zip<W: Write + Seek>(root: &Path, writer: W, compression_level: Option<i64>) -> Result<usize> {
    let mut zip = ZipWriter::new(writer);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(compression_level);

    zip.start_file(MIMETYPE_PATH, stored)?;
    zip.write_all(MIMETYPE.as_bytes())?;
    let mut count = 1;

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| EpubError::InvalidInput(e.to_string()))?;
        let name = zip_entry_name(relative);
        if name == MIMETYPE_PATH {
            continue;
        }

        zip.start_file(name.as_str(), deflated)?;
        let mut source = File::open(entry.path()).map_err(|e| EpubError::file(entry.path(), e))?;
        io::copy(&mut source, &mut zip)?;
        count += 1;
    }

    zip.finish()?;
    Ok(count)
}

/// 把相对路径转换为以 `/` 分隔的zip条目名
fn zip_entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::test_support::write_epub;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn test_mimetype_first_and_stored() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("tree");
        fs::create_dir_all(root.join("OEBPS/Text")).unwrap();
        fs::write(root.join("mimetype"), "stale content").unwrap();
        fs::write(root.join("A.txt"), "first by name").unwrap();
        fs::write(root.join("OEBPS/Text/ch1.xhtml"), "<html/>").unwrap();

        let out = dir.path().join("out.epub");
        pack(&root, &out, Some(9)).unwrap();

        let mut archive = ZipArchive::new(File::open(&out).unwrap()).unwrap();
        assert_eq!(archive.len(), 3);
        {
            let mut first = archive.by_index(0).unwrap();
            assert_eq!(first.name(), "mimetype");
            assert_eq!(first.compression(), CompressionMethod::Stored);
            let mut content = String::new();
            first.read_to_string(&mut content).unwrap();
            assert_eq!(content, MIMETYPE);
        }
        let names: Vec<String> = (1..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.contains(&"OEBPS/Text/ch1.xhtml".to_string()));
        assert_eq!(
            archive.by_name("A.txt").unwrap().compression(),
            CompressionMethod::Deflated
        );
    }

    #[test]
    fn test_extract_preserves_paths() {
        let dir = tempdir().unwrap();
        let epub = dir.path().join("book.epub");
        write_epub(
            &epub,
            &[
                ("META-INF/container.xml", "<container/>"),
                ("OEBPS/Text/ch1.xhtml", "<html>一</html>"),
            ],
        );

        let workdir = extract(&epub).unwrap();
        let chapter = fs::read_to_string(workdir.path().join("OEBPS/Text/ch1.xhtml")).unwrap();
        assert_eq!(chapter, "<html>一</html>");
        assert!(workdir.path().join("mimetype").is_file());

        let kept = workdir.path().to_path_buf();
        drop(workdir);
        assert!(!kept.exists());
    }

    #[test]
    fn test_extract_rejects_non_zip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fake.epub");
        fs::write(&path, "plain text, not a zip").unwrap();
        let err = extract(&path).unwrap_err();
        assert_eq!(err.kind(), crate::epub::error::ErrorKind::Io);
    }

    #[test]
    fn test_failed_pack_keeps_existing_output() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("existing.epub");
        fs::write(&out, "previous bytes").unwrap();

        let result = pack(&dir.path().join("no-such-tree"), &out, None);
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&out).unwrap(), "previous bytes");

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".novfmt-"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
