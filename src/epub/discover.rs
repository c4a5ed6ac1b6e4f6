//! 输入文件收集
//!
//! 从列表文件和目录中收集要处理的EPUB路径。

use crate::epub::error::{EpubError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("数字正则"));

/// 读取列表文件，每行一个路径
///
/// 空行和以 `#` 开头的行被跳过，路径按原样返回。
pub fn expand_list_files<P: AsRef<Path>>(lists: &[P]) -> Result<Vec<PathBuf>> {
    let mut volumes = Vec::new();
    for list in lists {
        let list = list.as_ref();
        let content = fs::read_to_string(list).map_err(|e| {
            EpubError::InvalidInput(format!("无法读取列表文件 {}: {}", list.display(), e))
        })?;
        volumes.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(PathBuf::from),
        );
    }
    Ok(volumes)
}

struct Candidate {
    path: PathBuf,
    name: String,
    number: Option<u64>,
}

/// 文件名（去掉扩展名）中的第一个数字
pub fn volume_number(name: &str) -> Option<u64> {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);
    DIGITS.find(stem)?.as_str().parse().ok()
}

/// 卷序比较：带数字的排在前面并按数字排序，其余按忽略大小写的文件名排序
fn compare(a: &Candidate, b: &Candidate) -> Ordering {
    let by_name = || {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name))
    };
    match (a.number, b.number) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(by_name),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => by_name(),
    }
}

/// 收集目录中的 `.epub` 文件（不递归），每个目录内按卷序排列
pub fn scan_directories<P: AsRef<Path>>(dirs: &[P]) -> Result<Vec<PathBuf>> {
    let mut volumes = Vec::new();
    for dir in dirs {
        let dir = dir.as_ref();
        let mut candidates = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| {
                EpubError::InvalidInput(format!("无法读取目录 {}: {}", dir.display(), e))
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_epub = Path::new(&name)
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("epub"));
            if !is_epub {
                continue;
            }
            candidates.push(Candidate {
                number: volume_number(&name),
                path: entry.into_path(),
                name,
            });
        }
        candidates.sort_by(compare);
        volumes.extend(candidates.into_iter().map(|c| c.path));
    }
    Ok(volumes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::error::ErrorKind;
    use tempfile::tempdir;

    #[test]
    fn test_volume_number() {
        assert_eq!(volume_number("Vol 12 - Finale.epub"), Some(12));
        assert_eq!(volume_number("book3v2.epub"), Some(3));
        assert_eq!(volume_number("2024.epub"), Some(2024));
        assert_eq!(volume_number("extras.epub"), None);
    }

    #[test]
    fn test_expand_list_files() {
        let dir = tempdir().unwrap();
        let list = dir.path().join("volumes.txt");
        fs::write(&list, "# 第一部\nvol1.epub\n\n  vol2.epub  \n#vol3.epub\n").unwrap();
        let volumes = expand_list_files(&[&list]).unwrap();
        assert_eq!(volumes, vec![PathBuf::from("vol1.epub"), PathBuf::from("vol2.epub")]);

        let err = expand_list_files(&[dir.path().join("absent.txt")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);
        assert!(err.to_string().contains("absent.txt"));
    }

    #[test]
    fn test_scan_directories_numeric_order() {
        let dir = tempdir().unwrap();
        for name in ["Vol 10.epub", "vol 2.EPUB", "Vol 1.epub", "appendix.epub", "Afterword.epub", "notes.txt"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("nested.epub")).unwrap();

        let names: Vec<String> = scan_directories(&[dir.path()])
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["Vol 1.epub", "vol 2.EPUB", "Vol 10.epub", "Afterword.epub", "appendix.epub"]
        );
    }

    #[test]
    fn test_scan_missing_directory() {
        let dir = tempdir().unwrap();
        let err = scan_directories(&[dir.path().join("absent")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);
    }
}
